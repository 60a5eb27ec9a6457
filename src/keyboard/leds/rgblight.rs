use micromath::F32Ext;
use rgb::RGB8;
use serde::{Deserialize, Serialize};
use smart_leds::hsv::{hsv2rgb, Hsv};

use crate::config::{HUE_STEP, SAT_STEP, VAL_STEP};
use crate::utils::Inc;

/// Underglow settings, persisted in the configuration store
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RgbConfig {
    pub enabled: bool,
    pub mode: Mode,
    pub hue: u8,
    pub sat: u8,
    pub val: u8,
}

/// Underglow effect
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// Constant color
    Static,
    /// Brightness pulsing
    Breathing,
    /// All LEDs slowly cycling through hues
    RainbowMood,
    /// Rainbow spread over the LEDs, rotating
    RainbowSwirl,
}

/// Time of a full breathing cycle in milliseconds
const BREATHING_PERIOD: u32 = 3000;
/// Time in milliseconds to advance hue by 1 in rainbow modes
const RAINBOW_MS_PER_HUE: u32 = 40;

impl Mode {
    pub fn next(self) -> Self {
        match self {
            Mode::Static => Mode::Breathing,
            Mode::Breathing => Mode::RainbowMood,
            Mode::RainbowMood => Mode::RainbowSwirl,
            Mode::RainbowSwirl => Mode::Static,
        }
    }
}

impl RgbConfig {
    pub fn toggle(&mut self) {
        self.enabled = !self.enabled;
    }

    pub fn step_mode(&mut self) {
        self.mode = self.mode.next();
    }

    pub fn step_hue(&mut self, inc: Inc) {
        self.hue = inc.wrapping_step(self.hue, HUE_STEP);
    }

    pub fn step_sat(&mut self, inc: Inc) {
        self.sat = inc.saturating_step(self.sat, SAT_STEP);
    }

    pub fn step_val(&mut self, inc: Inc) {
        self.val = inc.saturating_step(self.val, VAL_STEP);
    }

    /// Configured color without any effect applied
    pub fn color(&self) -> RGB8 {
        hsv2rgb(Hsv { hue: self.hue, sat: self.sat, val: self.val })
    }

    /// Color of LED `index` out of `count` LEDs in the effect range at given time
    pub fn effect_color(&self, time: u32, index: usize, count: usize) -> RGB8 {
        let hsv = match self.mode {
            Mode::Static => Hsv { hue: self.hue, sat: self.sat, val: self.val },
            Mode::Breathing => Hsv { hue: self.hue, sat: self.sat, val: breathe(time, self.val) },
            Mode::RainbowMood => Hsv { hue: rainbow_hue(time, self.hue), sat: self.sat, val: self.val },
            Mode::RainbowSwirl => {
                let offset = (index * 256 / count.max(1)) as u8;
                let hue = rainbow_hue(time, self.hue).wrapping_add(offset);
                Hsv { hue, sat: self.sat, val: self.val }
            },
        };
        hsv2rgb(hsv)
    }
}

fn rainbow_hue(time: u32, base: u8) -> u8 {
    base.wrapping_add((time / RAINBOW_MS_PER_HUE) as u8)
}

/// Scale `val` along an exp(sin(t)) curve, from 0 to `val`
fn breathe(time: u32, val: u8) -> u8 {
    use core::f32::consts::{E, PI};
    let phase = (time % BREATHING_PERIOD) as f32 / BREATHING_PERIOD as f32;
    // Start the cycle at the darkest point
    let x = (2.0 * PI * phase - PI / 2.0).sin().exp();
    let scale = (x - 1.0 / E) / (E - 1.0 / E);
    (scale.clamp(0.0, 1.0) * val as f32) as u8
}

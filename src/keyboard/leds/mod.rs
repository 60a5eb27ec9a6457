//! RGB underglow control
//!
//! The LED strip is split into an "effect range", animated according to [`RgbConfig`], and the
//! remaining LEDs that keep static indicator colors. Indicator colors are stored in a buffer
//! and stay until overwritten, so LEDs that leave the effect range show the last color set.

/// Underglow settings and effects
mod rgblight;

use core::ops::Range;

use rgb::RGB8;

use super::layers::{Level, Os};
use crate::bsp::ws2812b;
use crate::config::{colors, NLEDS};
use crate::macros::debug;

pub use rgblight::{Mode, RgbConfig};

pub type Leds = ws2812b::Leds<NLEDS>;

/// LED showing the Caps Lock state
pub const CAPS_LED: usize = 7;
/// Number of LEDs that keep the effect while layer feedback is shown
pub const INFO_LEDS: usize = 8;
/// Last LED, used as OS indicator on the adjust layer
const LAST_LED: usize = NLEDS - 1;

const BLACK: RGB8 = RGB8::new(0, 0, 0);

/// Commands for the underglow controller
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LedCommand {
    /// Show feedback for a layer level
    Layer { level: Level, os: Os },
    /// Layer feedback has been enabled/disabled
    InfoMode(bool),
    /// Host Caps Lock state
    CapsLock(bool),
    /// New effect settings
    Config(RgbConfig),
    /// Show the configured color on all LEDs but the last one, without effect
    Showcase,
    /// Host suspend state
    Suspend(bool),
}

/// Underglow controller
pub struct Underglow {
    config: RgbConfig,
    effect: Range<usize>,
    buffer: [RGB8; NLEDS],
    caps_lock: bool,
    suspended: bool,
}

impl Underglow {
    pub fn new(config: RgbConfig) -> Self {
        Self {
            config,
            effect: 0..NLEDS,
            buffer: [BLACK; NLEDS],
            caps_lock: false,
            suspended: false,
        }
    }

    /// LEDs currently running the effect
    pub fn effect_range(&self) -> Range<usize> {
        self.effect.clone()
    }

    /// Set effect range as `count` LEDs starting from `start`
    fn set_effect_range(&mut self, start: usize, count: usize) {
        let start = start.min(NLEDS);
        let end = start.saturating_add(count).min(NLEDS);
        self.effect = start..end;
    }

    fn set_leds(&mut self, leds: Range<usize>, color: RGB8) {
        for led in leds {
            if let Some(c) = self.buffer.get_mut(led) {
                *c = color;
            }
        }
    }

    pub fn apply(&mut self, command: LedCommand) {
        debug!("LED command: {}", command);
        match command {
            LedCommand::Layer { level, os } => match level {
                Level::Base => {
                    self.set_leds(LAST_LED..NLEDS, colors::BASE);
                    self.set_effect_range(0, NLEDS);
                },
                Level::Lower | Level::Raise => {
                    let color = if level == Level::Lower { colors::LOWER } else { colors::RAISE };
                    self.set_effect_range(0, INFO_LEDS);
                    self.set_leds(INFO_LEDS..NLEDS, color);
                },
                Level::Adjust => {
                    self.set_effect_range(0, INFO_LEDS);
                    self.set_leds(INFO_LEDS..LAST_LED, colors::ADJUST);
                    let os_color = match os {
                        Os::MacOs => colors::MACOS,
                        Os::Linux => colors::ADJUST,
                    };
                    self.set_leds(LAST_LED..NLEDS, os_color);
                },
            },
            LedCommand::InfoMode(on) => {
                self.set_effect_range(0, if on { INFO_LEDS } else { NLEDS });
            },
            LedCommand::CapsLock(on) => self.caps_lock = on,
            LedCommand::Config(config) => self.config = config,
            LedCommand::Showcase => {
                self.set_effect_range(0, 0);
                let color = self.config.color();
                self.set_leds(0..LAST_LED, color);
            },
            LedCommand::Suspend(on) => self.suspended = on,
        }
    }

    /// Generate colors for current time
    pub fn tick(&self, time: u32, leds: &mut Leds) {
        if self.suspended || !self.config.enabled {
            leds.leds.fill(BLACK);
            return;
        }

        let count = self.effect.len();
        for (i, color) in self.buffer.iter().enumerate() {
            let color = if self.effect.contains(&i) {
                self.config.effect_color(time, i - self.effect.start, count)
            } else {
                *color
            };
            leds.set_gamma_corrected(i, &color);
        }

        if self.caps_lock {
            leds.set_gamma_corrected(CAPS_LED, &colors::CAPS);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: RgbConfig = RgbConfig {
        enabled: true,
        mode: Mode::Static,
        hue: 0,
        sat: 0,
        val: 0,
    };

    fn render(underglow: &Underglow) -> [RGB8; NLEDS] {
        let mut leds = Leds::new();
        underglow.tick(0, &mut leds);
        leds.leds
    }

    fn gamma(color: RGB8) -> RGB8 {
        let mut leds = ws2812b::Leds::<1>::new();
        leds.set_gamma_corrected(0, &color);
        leds.leds[0]
    }

    #[test]
    fn base_layer() {
        let mut ug = Underglow::new(CONFIG);
        ug.apply(LedCommand::InfoMode(true));
        assert_eq!(ug.effect_range(), 0..8);
        ug.apply(LedCommand::Layer { level: Level::Base, os: Os::Linux });
        assert_eq!(ug.effect_range(), 0..14);
        assert_eq!(ug.buffer[13], colors::BASE);
    }

    #[test]
    fn lower_and_raise_layers() {
        let mut ug = Underglow::new(CONFIG);
        ug.apply(LedCommand::Layer { level: Level::Lower, os: Os::Linux });
        assert_eq!(ug.effect_range(), 0..8);
        assert!(ug.buffer[8..].iter().all(|c| *c == colors::LOWER));
        assert!(ug.buffer[..8].iter().all(|c| *c == BLACK));
        let leds = render(&ug);
        assert_eq!(leds[8], gamma(colors::LOWER));

        ug.apply(LedCommand::Layer { level: Level::Raise, os: Os::MacOs });
        assert!(ug.buffer[8..].iter().all(|c| *c == colors::RAISE));
    }

    #[test]
    fn adjust_layer_shows_os() {
        let mut ug = Underglow::new(CONFIG);
        ug.apply(LedCommand::Layer { level: Level::Adjust, os: Os::Linux });
        assert!(ug.buffer[8..].iter().all(|c| *c == colors::ADJUST));
        ug.apply(LedCommand::Layer { level: Level::Adjust, os: Os::MacOs });
        assert!(ug.buffer[8..13].iter().all(|c| *c == colors::ADJUST));
        assert_eq!(ug.buffer[13], colors::MACOS);
    }

    #[test]
    fn info_mode_off_restores_full_effect() {
        let mut ug = Underglow::new(CONFIG);
        ug.apply(LedCommand::InfoMode(true));
        ug.apply(LedCommand::InfoMode(false));
        assert_eq!(ug.effect_range(), 0..14);
    }

    #[test]
    fn showcase_sets_all_but_last() {
        let config = RgbConfig { hue: 0, sat: 255, val: 255, ..CONFIG };
        let mut ug = Underglow::new(config);
        ug.apply(LedCommand::Layer { level: Level::Raise, os: Os::Linux });
        ug.apply(LedCommand::Showcase);
        assert_eq!(ug.effect_range(), 0..0);
        assert!(ug.buffer[..13].iter().all(|c| *c == config.color()));
        assert_eq!(ug.buffer[13], colors::RAISE);
    }

    #[test]
    fn caps_lock_overrides_effect() {
        let config = RgbConfig { hue: 100, sat: 255, val: 255, ..CONFIG };
        let mut ug = Underglow::new(config);
        ug.apply(LedCommand::CapsLock(true));
        let leds = render(&ug);
        assert_eq!(leds[CAPS_LED], gamma(colors::CAPS));
        assert_eq!(leds[0], gamma(config.color()));
        ug.apply(LedCommand::CapsLock(false));
        assert_eq!(render(&ug)[CAPS_LED], gamma(config.color()));
    }

    #[test]
    fn disabled_or_suspended_is_black() {
        let config = RgbConfig { hue: 100, sat: 255, val: 255, ..CONFIG };
        let mut ug = Underglow::new(config);
        ug.apply(LedCommand::CapsLock(true));
        ug.apply(LedCommand::Suspend(true));
        assert!(render(&ug).iter().all(|c| *c == BLACK));
        ug.apply(LedCommand::Suspend(false));
        ug.apply(LedCommand::Config(RgbConfig { enabled: false, ..config }));
        assert!(render(&ug).iter().all(|c| *c == BLACK));
    }
}

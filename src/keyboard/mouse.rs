use bitfield::bitfield;
use usb_device::UsbError;

use super::actions::{MouseAction, MouseButton, MouseMovement};
use super::hid::{MouseReport, ReportSink};
use crate::macros::warn;

/// USB mouse emulation
pub struct Mouse {
    buttons: MouseButtons,
    movement: MovementButtons,
    xy: PlaneAccumulator<'static>,
    wheel: AxisAccumulator<'static>,
    wheel_invert: bool,
    /// Buttons state in the last report sent
    sent_buttons: u8,
}

/// Speed profiles for mouse emulation
pub struct MouseConfig {
    pub x: AxisConfig,
    pub y: AxisConfig,
    pub wheel: AxisConfig,
}

/// Configuration for single movement axis
pub struct AxisConfig {
    pub invert: bool,
    pub profile: &'static SpeedProfile,
}

/// Constant acceleration mouse speed profile.
///
/// HID mouse uses i8 [-128, 127] displacement in single USB report.
/// To keep better resolution all values are u16 and `divider` is
/// used to scale down the resulting speed.
pub struct SpeedProfile {
    /// Controls output speed scaling
    pub divider: u16,
    /// Delay from the moment key is pressed to when start_speed is applied
    pub delay: u16,
    /// Time it takes to accelerate from `start_speed` to `max_speed`
    pub acceleration_time: u16,
    /// Initial speed value applied after `delay`
    pub start_speed: u16,
    /// Final speed reached after `delay + acceleration_time` since key press
    pub max_speed: u16,
}

/// Movement emulation on a 2D plane
struct PlaneAccumulator<'a> {
    x: AxisAccumulator<'a>,
    y: AxisAccumulator<'a>,
    x_config: &'a AxisConfig,
    y_config: &'a AxisConfig,
}

/// Movement emulation along single axis
struct AxisAccumulator<'a> {
    time: u16,
    accumulated: DivAccumulator,
    profile: &'a SpeedProfile,
}

bitfield! {
    /// State of mouse buttons
    #[derive(Clone, Copy, PartialEq)]
    struct MouseButtons(u8);
    pub left, set_left: 0;
    pub right, set_right: 1;
    pub mid, set_mid: 2;
}

bitfield! {
    /// State of mouse direction button on the keyboard
    #[derive(Clone, Copy)]
    struct MovementButtons(u8);
    pub up, set_up: 0;
    pub down, set_down: 1;
    pub left, set_left: 2;
    pub right, set_right: 3;
    pub wheel_up, set_wheel_up: 4;
    pub wheel_down, set_wheel_down: 5;
}

impl Mouse {
    /// Instantiate with given speed profiles
    pub const fn new(config: &'static MouseConfig) -> Self {
        Self {
            buttons: MouseButtons(0),
            movement: MovementButtons(0),
            xy: PlaneAccumulator::new(&config.x, &config.y),
            wheel: AxisAccumulator::new(config.wheel.profile),
            wheel_invert: config.wheel.invert,
            sent_buttons: 0,
        }
    }

    /// Handle mouse action key event
    pub fn handle_action(&mut self, action: &MouseAction, pressed: bool) {
        match action {
            MouseAction::Click(button) => match button {
                MouseButton::Left => self.buttons.set_left(pressed),
                MouseButton::Mid => self.buttons.set_mid(pressed),
                MouseButton::Right => self.buttons.set_right(pressed),
            },
            MouseAction::Move(movement) => match movement {
                MouseMovement::Up => self.movement.set_up(pressed),
                MouseMovement::Down => self.movement.set_down(pressed),
                MouseMovement::Left => self.movement.set_left(pressed),
                MouseMovement::Right => self.movement.set_right(pressed),
                MouseMovement::WheelUp => self.movement.set_wheel_up(pressed),
                MouseMovement::WheelDown => self.movement.set_wheel_down(pressed),
            },
        }
    }

    /// Advance time and accumulate state
    pub fn tick(&mut self) {
        let m = &self.movement;
        self.xy.tick(m.up(), m.down(), m.left(), m.right());
        let reset = !(m.wheel_up() || m.wheel_down());
        let dir = direction(m.wheel_down(), m.wheel_up(), self.wheel_invert);
        self.wheel.tick(reset, dir);
    }

    /// Report with current state
    pub fn report(&self) -> MouseReport {
        let (x, y) = self.xy.get();
        let wheel = self.wheel.accumulated.get();
        MouseReport { buttons: self.buttons.0, x, y, wheel, pan: 0 }
    }

    /// Forget all accumulated movement that has been reported
    pub fn consume(&mut self) {
        self.xy.consume();
        self.wheel.accumulated.consume();
    }

    /// Whether there is anything to report since the last report
    pub fn has_changes(&self) -> bool {
        let report = self.report();
        report.buttons != self.sent_buttons || report.x != 0 || report.y != 0 || report.wheel != 0
    }

    /// Try to push mouse report to endpoint or keep current info for the next report.
    pub fn push_report<S: ReportSink<Report = MouseReport>>(&mut self, hid: &mut S) -> bool {
        if !self.has_changes() {
            return false;
        }
        let report = self.report();
        match hid.push_report(&report) {
            Ok(_len) => {
                self.sent_buttons = report.buttons;
                self.consume();
                true
            },
            Err(UsbError::WouldBlock) => false,
            Err(_) => {
                warn!("Mouse report push failed");
                false
            },
        }
    }
}

/// Get direction multiplier depending on state of positive and negative button
#[inline(always)]
const fn direction(positive: bool, negative: bool, invert: bool) -> i32 {
    let (positive, negative) = if invert {
        (negative, positive)
    } else {
        (positive, negative)
    };
    match (positive, negative) {
        (true, true) => 0,
        (true, false) => 1,
        (false, true) => -1,
        (false, false) => 0,
    }
}

impl SpeedProfile {
    pub fn get_speed(&self, time: u16) -> u16 {
        if time < self.delay {
            0
        } else if (self.acceleration_time != 0) && (time < self.delay + self.acceleration_time) {
            let v0 = self.start_speed;
            let v1 = self.max_speed;
            let t0 = self.delay;
            let dt = self.acceleration_time;
            let speed = v0 as u32 + (v1 - v0) as u32 * (time - t0) as u32 / dt as u32;
            speed as u16
        } else {
            self.max_speed
        }
    }
}

impl<'a> PlaneAccumulator<'a> {
    pub const fn new(x: &'a AxisConfig, y: &'a AxisConfig) -> Self {
        Self {
            x: AxisAccumulator::new(x.profile),
            y: AxisAccumulator::new(y.profile),
            x_config: x,
            y_config: y,
        }
    }

    pub fn tick(&mut self, up: bool, down: bool, left: bool, right: bool) {
        let reset = !(up || down || left || right);
        let dir_x = direction(right, left, self.x_config.invert);
        let dir_y = direction(down, up, self.y_config.invert);
        self.x.tick(reset, dir_x);
        self.y.tick(reset, dir_y);
    }

    pub fn get(&self) -> (i8, i8) {
        let (x, y) = (self.x.accumulated.get(), self.y.accumulated.get());
        // Scale down diagonal movement to keep the same speed
        if x != 0 && y != 0 {
            (Self::mul_inv_sqrt2(x), Self::mul_inv_sqrt2(y))
        } else {
            (x, y)
        }
    }

    pub fn consume(&mut self) {
        self.x.accumulated.consume();
        self.y.accumulated.consume();
    }

    /// Calculate x / sqrt(2) (181/256=0.70703125 vs 1/sqrt(2)=0.707106781)
    #[inline(always)]
    const fn mul_inv_sqrt2(val: i8) -> i8 {
        ((val as i32 * 181) / 256) as i8
    }
}

/// Accumulate values to read at lower resolution depending on divider.
struct DivAccumulator {
    value: i32,
    divider: u16,
}

impl DivAccumulator {
    pub const fn new(divider: u16) -> Self {
        Self { value: 0, divider }
    }

    pub fn accumulate(&mut self, value: i32) {
        self.value = self.value.saturating_add(value);
    }

    pub fn get(&self) -> i8 {
        (self.value / self.div())
            .clamp(i8::MIN as i32, i8::MAX as i32) as i8
    }

    pub fn consume(&mut self) {
        let rounded = self.get() as i32 * self.div();
        // Avoid loosing small accumulated values by only subtracting the consumed value
        if rounded.abs() > self.value.abs() {
            self.value = 0;
        } else {
            self.value -= rounded;
        }
    }

    fn div(&self) -> i32 {
        // Avoid division by 0, while also avoiding (div + 1)
        self.divider.max(1) as i32
    }
}

impl<'a> AxisAccumulator<'a> {
    pub const fn new(profile: &'a SpeedProfile) -> Self {
        Self { profile, time: 0, accumulated: DivAccumulator::new(profile.divider) }
    }

    pub fn tick(&mut self, reset: bool, dir: i32) {
        if reset {
            self.time = 0;
        }

        let speed = dir * self.profile.get_speed(self.time) as i32;
        self.accumulated.accumulate(speed);

        self.time = self.time.saturating_add(1);
    }
}

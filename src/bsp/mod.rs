//! Board support package
//!
//! Code that builds on top of MCU-specific HAL (hal and hal_ext) to implement
//! support for the board and the peripherals located on it.

#[cfg(target_os = "none")]
pub mod usb;
pub mod ws2812b;

pub use crate::config::{NCOLS, NLEDS, NROWS};

#[cfg(target_os = "none")]
pub use self::pins::*;

#[cfg(target_os = "none")]
mod pins {
    use embedded_hal::digital::v2::OutputPin;

    use crate::hal::gpio;
    use crate::utils::InfallibleResult;

    pub type ColPin = gpio::Pin<gpio::Input<gpio::PullUp>>;
    pub type RowPin = gpio::Pin<gpio::Output<gpio::PushPull>>;

    /// Key backlight enable output
    pub struct BacklightPin {
        pin: gpio::Pin<gpio::Output<gpio::PushPull>>,
    }

    impl BacklightPin {
        /// Take the pin and switch the backlight on
        pub fn new(pin: gpio::Pin<gpio::Output<gpio::PushPull>>) -> Self {
            let mut backlight = Self { pin };
            backlight.set(true);
            backlight
        }

        pub fn set(&mut self, on: bool) {
            if on {
                self.pin.set_high().infallible();
            } else {
                self.pin.set_low().infallible();
            }
        }
    }
}

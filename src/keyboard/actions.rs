pub use crate::keyboard::hid::ConsumerKey;
pub use crate::keyboard::layers::Os;
pub use crate::utils::Inc;

/// Additional key actions handled by the keyboard logic
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Action {
    /// Modify RGB underglow
    Rgb(RgbAction),
    /// Use mouse emulation
    Mouse(MouseAction),
    /// Send USB HID consumer page keys
    Consumer(ConsumerKey),
    /// Toggle layer feedback on the underglow
    InfoToggle,
    /// Switch the layout to the given host OS
    SwitchOs(Os),
    /// Firmware control
    Firmware(FirmwareAction),
}

/// Actions for RGB underglow control
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RgbAction {
    /// Enable/disable the underglow
    Toggle,
    /// Cycle to the next effect
    ModeForward,
    Hue(Inc),
    Saturation(Inc),
    Value(Inc),
}

/// Actions related to mouse emulation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MouseAction {
    /// Key emulates a mouse key
    Click(MouseButton),
    /// Key performs mouse movement when held
    Move(MouseMovement),
}

/// Emulate a mouse button
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MouseButton {
    Left,
    Mid,
    Right,
}

/// Emulate mouse (or mouse wheel) movement
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MouseMovement {
    Up,
    Down,
    Left,
    Right,
    WheelUp,
    WheelDown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FirmwareAction {
    /// Toggle verbose logging of key events
    Debug,
    /// Reboot into the DFU bootloader
    Bootloader,
}

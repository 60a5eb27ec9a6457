//! Keyboard configuration

use keyberon::key_code::KeyCode::{self, *};
use rgb::RGB8;

use crate::keyboard::actions::{
    Action as CustomAction, ConsumerKey, FirmwareAction, Inc, MouseAction, MouseButton,
    MouseMovement, Os, RgbAction,
};
use crate::keyboard::layers::Layer::*;
use crate::keyboard::layout::{Action, Keymap};
use crate::keyboard::leds::{Mode, RgbConfig};
use crate::keyboard::mouse::{AxisConfig, MouseConfig, SpeedProfile};

/// Number of key matrix rows
pub const NROWS: usize = 4;
/// Number of key matrix columns
pub const NCOLS: usize = 12;
/// Number of underglow LEDs
pub const NLEDS: usize = 14;

/// Number of stable scans before a key state change is reported
pub const DEBOUNCE_COUNT: u16 = 5;
/// Hold-tap keys resolve to "hold" after this many milliseconds
pub const TAPPING_TERM: u16 = 200;
/// Backlight is disabled after this many minutes without key presses
pub const BACKLIGHT_TIMEOUT: u8 = 5;
/// Period of the backlight idle counter
pub const HALF_MINUTE_MS: u16 = 30_000;

/// Underglow hue change per key press
pub const HUE_STEP: u8 = 8;
/// Underglow saturation change per key press
pub const SAT_STEP: u8 = 17;
/// Underglow brightness change per key press
pub const VAL_STEP: u8 = 17;

/// Underglow settings after a store reset
pub const RGB_DEFAULT: RgbConfig = RgbConfig {
    enabled: true,
    mode: Mode::Static,
    hue: 0,
    sat: u8::MAX,
    val: u8::MAX,
};

/// Indicator colors
pub mod colors {
    use super::RGB8;

    pub const BASE: RGB8 = RGB8::new(0x00, 0xff, 0x00);
    pub const LOWER: RGB8 = RGB8::new(0x00, 0x00, 0xff);
    pub const RAISE: RGB8 = RGB8::new(0xff, 0x33, 0x00);
    pub const ADJUST: RGB8 = RGB8::new(0x55, 0x00, 0xff);
    pub const MACOS: RGB8 = RGB8::new(0xff, 0xff, 0xff);
    pub const CAPS: RGB8 = RGB8::new(0xff, 0x00, 0x00);
}

const fn k(kc: KeyCode) -> Action {
    Action::Key(kc)
}

const fn custom(action: CustomAction) -> Action {
    Action::Custom(action)
}

const TRNS: Action = Action::Trans;

macro_rules! mod_tap {
    ($hold:expr, $tap:expr) => {
        Action::ModTap { hold: $hold, tap: $tap }
    };
}

/// Arrange a layer in the MIT layout: a 2u space bar in the middle of the bottom row
///
/// The space bar sits on column 5, column 6 of the bottom row has no switch.
macro_rules! layout_mit {
    (
        [ $($r0:expr),* $(,)? ]
        [ $($r1:expr),* $(,)? ]
        [ $($r2:expr),* $(,)? ]
        [ $b0:expr, $b1:expr, $b2:expr, $b3:expr, $b4:expr, $space:expr,
          $b7:expr, $b8:expr, $b9:expr, $b10:expr, $b11:expr $(,)? ]
    ) => {
        [
            [ $($r0),* ],
            [ $($r1),* ],
            [ $($r2),* ],
            [ $b0, $b1, $b2, $b3, $b4, $space, Action::NoOp, $b7, $b8, $b9, $b10, $b11 ],
        ]
    };
}

const CTRL_ESC: Action = mod_tap!(LCtrl, Escape);
const GUI_MINS: Action = mod_tap!(LGui, Minus);
const CTL_EQL: Action = mod_tap!(LCtrl, Equal);

const L_TAB_LOWER: Action = Action::LayerTap { layer: LinuxLower, tap: Tab };
const M_TAB_LOWER: Action = Action::LayerTap { layer: MacLower, tap: Tab };
const L_CAPSLOCK: Action = Action::OneShot(LinuxLower);
const M_CAPSLOCK: Action = Action::OneShot(MacLower);

const L_LOWER: Action = Action::Momentary(LinuxLower);
const L_RAISE: Action = Action::Momentary(LinuxRaise);
const L_ADJUST: Action = Action::Momentary(LinuxAdjust);
const M_LOWER: Action = Action::Momentary(MacLower);
const M_RAISE: Action = Action::Momentary(MacRaise);
const M_ADJUST: Action = Action::Momentary(MacAdjust);
const M_FN: Action = Action::Momentary(MacAdjust);

// Symbols for a German host keyboard layout
const L_BACKSLASH: Action = Action::Keys(&[RAlt, Minus]);
const M_BACKSLASH: Action = Action::Keys(&[LAlt, LShift, Kb7]);
const ASTERISKS: Action = Action::Keys(&[LShift, RBracket]);
const SLASH: Action = Action::Keys(&[LShift, Kb7]);

const VOL_UP: Action = custom(CustomAction::Consumer(ConsumerKey::VolumeIncrement));
const VOL_DOWN: Action = custom(CustomAction::Consumer(ConsumerKey::VolumeDecrement));
const MUTE: Action = custom(CustomAction::Consumer(ConsumerKey::Mute));
const PLAY: Action = custom(CustomAction::Consumer(ConsumerKey::PlayPause));
const FORWARDS: Action = custom(CustomAction::Consumer(ConsumerKey::AcForward));
const BACKWARDS: Action = custom(CustomAction::Consumer(ConsumerKey::AcBack));

const RGB_TOG: Action = custom(CustomAction::Rgb(RgbAction::Toggle));
const RGB_MOD: Action = custom(CustomAction::Rgb(RgbAction::ModeForward));
const RGB_HUI: Action = custom(CustomAction::Rgb(RgbAction::Hue(Inc::Up)));
const RGB_SAI: Action = custom(CustomAction::Rgb(RgbAction::Saturation(Inc::Up)));
const RGB_VAI: Action = custom(CustomAction::Rgb(RgbAction::Value(Inc::Up)));
const RGB_VAD: Action = custom(CustomAction::Rgb(RgbAction::Value(Inc::Down)));

const INF_TGL: Action = custom(CustomAction::InfoToggle);
const L_TO_M: Action = custom(CustomAction::SwitchOs(Os::MacOs));
const M_TO_L: Action = custom(CustomAction::SwitchOs(Os::Linux));
const DEBUG: Action = custom(CustomAction::Firmware(FirmwareAction::Debug));
const RESET: Action = custom(CustomAction::Firmware(FirmwareAction::Bootloader));

const BTN1: Action = custom(CustomAction::Mouse(MouseAction::Click(MouseButton::Left)));
const BTN2: Action = custom(CustomAction::Mouse(MouseAction::Click(MouseButton::Right)));
const BTN3: Action = custom(CustomAction::Mouse(MouseAction::Click(MouseButton::Mid)));
const MS_U: Action = custom(CustomAction::Mouse(MouseAction::Move(MouseMovement::Up)));
const MS_D: Action = custom(CustomAction::Mouse(MouseAction::Move(MouseMovement::Down)));
const MS_L: Action = custom(CustomAction::Mouse(MouseAction::Move(MouseMovement::Left)));
const MS_R: Action = custom(CustomAction::Mouse(MouseAction::Move(MouseMovement::Right)));
const WH_U: Action = custom(CustomAction::Mouse(MouseAction::Move(MouseMovement::WheelUp)));
const WH_D: Action = custom(CustomAction::Mouse(MouseAction::Move(MouseMovement::WheelDown)));

/// Keymap of all layers, indexed by [`crate::keyboard::layers::Layer`]
pub static KEYMAP: Keymap = [
    // Linux base
    layout_mit! {
        [ CTRL_ESC,    k(Q),    k(W),     k(E),    k(R),    k(T), k(Y), k(U),    k(I),     k(O),       k(P),        k(BSpace)   ]
        [ L_TAB_LOWER, k(A),    k(S),     k(D),    k(F),    k(G), k(H), k(J),    k(K),     k(L),       k(LBracket), k(RBracket) ]
        [ k(LShift),   k(Z),    k(X),     k(C),    k(V),    k(B), k(N), k(M),    k(Comma), k(Dot),     k(Slash),    k(Enter)    ]
        [ k(LCtrl),    k(LGui), L_ADJUST, k(LAlt), L_RAISE, k(Space),   L_LOWER, k(RAlt),  L_CAPSLOCK, GUI_MINS,    CTL_EQL     ]
    },
    // Linux lower
    layout_mit! {
        [ k(RCtrl), k(Kb1),      k(Kb2),   k(Kb3),    k(Kb4), k(Kb5),    k(Kb6),  k(Kb7),  k(Kb8),     k(Kb9),   k(Kb0),     k(BSpace) ]
        [ TRNS,     L_BACKSLASH, k(Grave), ASTERISKS, SLASH,  k(Bslash), k(Left), k(Down), k(Up),      k(Right), k(SColon),  k(Quote)  ]
        [ TRNS,     RGB_VAD,     RGB_VAI,  k(Insert), k(Home), k(PgDown), k(PgUp), k(End), k(Comma),   k(Dot),   k(Slash),   k(Delete) ]
        [ TRNS,     TRNS,        TRNS,     TRNS,      TRNS,   TRNS,                TRNS,   TRNS,       TRNS,     k(Left),    k(Right)  ]
    },
    // Linux raise
    layout_mit! {
        [ TRNS,     k(F1),   k(F2),   k(F3),    k(F4),   k(F5),      k(F6),     k(F7),     k(F8),     k(F9),    k(F10),      k(F11)      ]
        [ k(LGui),  VOL_DOWN, k(Up),  VOL_UP,   PLAY,    k(Grave),   k(Minus),  k(Equal),  k(SColon), k(Quote), k(LBracket), k(RBracket) ]
        [ TRNS,     k(Left), k(Down), k(Right), MUTE,    k(Escape),  k(Enter),  k(Bslash), k(Comma),  k(Dot),   k(Slash),    k(F12)      ]
        [ TRNS,     TRNS,    TRNS,    TRNS,     TRNS,    k(BSpace),             TRNS,      TRNS,      TRNS,     RGB_HUI,     RGB_SAI     ]
    },
    // Linux adjust
    layout_mit! {
        [ DEBUG, BTN1,    MS_U,    BTN2,    WH_U,   k(Delete), k(KpSlash),    k(Kp1), k(Kp2), k(Kp3),   k(KpMinus), RESET     ]
        [ BTN3,  MS_L,    MS_D,    MS_R,    WH_D,   k(Tab),    k(KpAsterisk), k(Kp4), k(Kp5), k(Kp6),   k(KpPlus),  FORWARDS  ]
        [ TRNS,  RGB_TOG, RGB_MOD, INF_TGL, L_TO_M, k(Escape), k(BSpace),     k(Kp7), k(Kp8), k(Kp9),   k(KpEnter), BACKWARDS ]
        [ TRNS,  TRNS,    TRNS,    TRNS,    TRNS,   k(Space),                 TRNS,   k(Kp0), k(KpDot), k(RAlt),    L_ADJUST  ]
    },
    // macOS base
    layout_mit! {
        [ CTRL_ESC,    k(Q),     k(W),    k(E),    k(R),    k(T), k(Y), k(U),    k(I),     k(O),       k(P),        k(BSpace)   ]
        [ M_TAB_LOWER, k(A),     k(S),    k(D),    k(F),    k(G), k(H), k(J),    k(K),     k(L),       k(LBracket), k(RBracket) ]
        [ k(LShift),   k(Z),     k(X),    k(C),    k(V),    k(B), k(N), k(M),    k(Comma), k(Dot),     k(Slash),    k(Enter)    ]
        [ M_FN,        k(LCtrl), k(LAlt), k(LGui), M_RAISE, k(Space),   M_LOWER, k(RAlt),  M_CAPSLOCK, GUI_MINS,    CTL_EQL     ]
    },
    // macOS lower
    layout_mit! {
        [ k(RCtrl),    k(Kb1),      k(Kb2),   k(Kb3),    k(Kb4),  k(Kb5),    k(Kb6),  k(Kb7),  k(Kb8),   k(Kb9),   k(Kb0),    k(BSpace) ]
        [ M_TAB_LOWER, M_BACKSLASH, k(Grave), ASTERISKS, SLASH,   k(Bslash), k(Left), k(Down), k(Up),    k(Right), k(SColon), k(Quote)  ]
        [ TRNS,        RGB_VAD,     RGB_VAI,  k(Insert), k(Home), k(PgDown), k(PgUp), k(End),  k(Comma), k(Dot),   k(Slash),  k(Delete) ]
        [ TRNS,        TRNS,        TRNS,     TRNS,      TRNS,    TRNS,               TRNS,    TRNS,     TRNS,     k(Left),   k(Right)  ]
    },
    // macOS raise
    layout_mit! {
        [ TRNS,    k(F1),    k(F2),   k(F3),    k(F4), k(F5),     k(F6),    k(F7),     k(F8),     k(F9),    k(F10),      k(F11)      ]
        [ k(LGui), VOL_DOWN, k(Up),   VOL_UP,   PLAY,  k(Grave),  k(Minus), k(Equal),  k(SColon), k(Quote), k(LBracket), k(RBracket) ]
        [ TRNS,    k(Left),  k(Down), k(Right), MUTE,  k(Escape), k(Enter), k(Bslash), k(Comma),  k(Dot),   k(Slash),    k(F12)      ]
        [ TRNS,    TRNS,     TRNS,    TRNS,     TRNS,  k(BSpace),           TRNS,      TRNS,      TRNS,     RGB_HUI,     RGB_SAI     ]
    },
    // macOS adjust
    layout_mit! {
        [ DEBUG, BTN1,    MS_U,    BTN2,    WH_U,   k(Delete), k(KpSlash),    k(Kp1), k(Kp2), k(Kp3),   k(KpMinus), RESET     ]
        [ BTN3,  MS_L,    MS_D,    MS_R,    WH_D,   k(Tab),    k(KpAsterisk), k(Kp4), k(Kp5), k(Kp6),   k(KpPlus),  FORWARDS  ]
        [ TRNS,  RGB_TOG, RGB_MOD, INF_TGL, M_TO_L, k(Escape), k(BSpace),     k(Kp7), k(Kp8), k(Kp9),   k(KpEnter), BACKWARDS ]
        [ TRNS,  TRNS,    TRNS,    TRNS,    TRNS,   k(Space),                 TRNS,   k(Kp0), k(KpDot), k(RAlt),    M_ADJUST  ]
    },
];

pub static MOUSE: MouseConfig = MouseConfig {
    x: AxisConfig {
        invert: false,
        profile: &MOUSE_PROFILE,
    },
    y: AxisConfig {
        invert: false,
        profile: &MOUSE_PROFILE,
    },
    wheel: AxisConfig {
        invert: true,
        profile: &WHEEL_PROFILE,
    },
};

const MOUSE_PROFILE: SpeedProfile = SpeedProfile {
    divider: 10000,
    delay: 50,
    acceleration_time: 750,
    start_speed: 5000,
    max_speed: 15000,
};

const WHEEL_PROFILE: SpeedProfile = SpeedProfile {
    divider: 1000,
    delay: 50,
    acceleration_time: 750,
    start_speed: 25,
    max_speed: 50,
};

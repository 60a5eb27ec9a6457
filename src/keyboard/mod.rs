//! Main USB keyboard logic
//!
//! Resolves key events through the layout and implements the keyboard specific behavior on
//! top of it: RGB underglow control and layer feedback, one-shot shift, host OS switching,
//! backlight timeout and persisting of user settings.

/// Special keyboard actions
pub mod actions;
/// Key backlight idle timeout
pub mod backlight;
/// Keyboard related USB HID classes
pub mod hid;
/// Keyboard matrix scanner with debouncing
#[cfg(target_os = "none")]
mod keys;
/// Layer identifiers and layer state
pub mod layers;
/// Keymap resolution
pub mod layout;
/// RGB underglow control
pub mod leds;
/// Mouse emulation
pub mod mouse;
/// Persisted user preferences
pub mod user_config;

use heapless::Vec;
use keyberon::key_code::{KbHidReport, KeyCode};
use keyberon::layout::{CustomEvent, Event};
use usb_device::device::UsbDeviceState;

use crate::config::BACKLIGHT_TIMEOUT;
use crate::macros::{debug, info, warn};
use crate::storage::Eeconfig;
use actions::{Action, FirmwareAction, RgbAction};
use backlight::Backlight;
use hid::{ConsumerKey, ConsumerReport, HidReportQueue, KeyboardLeds, MouseReport, ReportSink};
use layers::{Layer, LayerState, Level};
use layout::{Keymap, Layout};
use leds::{LedCommand, RgbConfig, Underglow};
use user_config::UserConfig;

#[cfg(target_os = "none")]
pub use keys::Keys;

const MAX_LED_COMMANDS: usize = 8;

/// Keyboard logic
pub struct Keyboard {
    layout: Layout,
    mouse: mouse::Mouse,
    backlight: Backlight,
    user: UserConfig,
    rgb: RgbConfig,
    debug: bool,
    oneshot_shift: bool,
    prev_layer_state: LayerState,
    prev_oneshot: Option<Layer>,
    prev_host_leds: KeyboardLeds,
    prev_usb_state: UsbDeviceState,
    pending_leds: LedsUpdate,
    dirty: bool,
    consumer_reports: HidReportQueue<ConsumerReport, 2>,
    consumer_key: Option<ConsumerKey>,
}

/// State reported by the USB host
#[derive(Clone, Copy)]
pub struct HostState {
    pub leds: KeyboardLeds,
    pub usb: UsbDeviceState,
}

/// Deferred update of the underglow controller
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LedsUpdate {
    commands: Vec<LedCommand, MAX_LED_COMMANDS>,
}

/// Result of a single keyboard tick
pub struct Update {
    /// Keyboard HID report with currently pressed keys
    pub report: KbHidReport,
    /// Commands for the underglow controller
    pub leds: LedsUpdate,
    /// Backlight has to be switched on/off
    pub backlight: Option<bool>,
    /// Configuration to be written to the store
    pub save: Option<Eeconfig>,
    /// Reboot into the bootloader has been requested
    pub bootloader: bool,
}

impl Keyboard {
    /// Create keyboard logic from the stored configuration
    ///
    /// When the store is blank the default configuration is used and saved on the first tick.
    pub fn new(
        keymap: &'static Keymap,
        mouse: &'static mouse::MouseConfig,
        stored: Option<Eeconfig>,
    ) -> Self {
        let (config, dirty) = match stored {
            Some(config) => (config, false),
            None => {
                info!("Config store blank, using defaults");
                (Eeconfig::default(), true)
            },
        };

        let mut layout = Layout::new(keymap);
        layout.set_default_layer(config.default_layer);

        let mut pending_leds = LedsUpdate::default();
        pending_leds.push(LedCommand::Config(config.rgb));
        pending_leds.push(LedCommand::InfoMode(config.user.info_mode()));

        Self {
            prev_layer_state: layout.layer_state(),
            layout,
            mouse: mouse::Mouse::new(mouse),
            backlight: Backlight::with_timeout(BACKLIGHT_TIMEOUT),
            user: config.user,
            rgb: config.rgb,
            debug: false,
            oneshot_shift: false,
            prev_oneshot: None,
            prev_host_leds: KeyboardLeds::default(),
            prev_usb_state: UsbDeviceState::Default,
            pending_leds,
            dirty,
            consumer_reports: HidReportQueue::new(),
            consumer_key: None,
        }
    }

    /// Underglow controller for the current settings
    pub fn underglow(&self) -> Underglow {
        Underglow::new(self.rgb)
    }

    pub fn user_config(&self) -> UserConfig {
        self.user
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Configuration to persist
    pub fn eeconfig(&self) -> Eeconfig {
        Eeconfig {
            user: self.user,
            default_layer: self.layout.default_layer_state().highest(),
            rgb: self.rgb,
        }
    }

    /// Keep the configuration pending so that it is returned again on the next tick
    ///
    /// To be used when the [`Update::save`] configuration could not be handed over to the store.
    pub fn save_failed(&mut self) {
        self.dirty = true;
    }

    /// Periodic keyboard processing, to be called every 1 ms
    ///
    /// Takes key events from the matrix scan and the current host state.
    pub fn tick(&mut self, events: impl IntoIterator<Item = Event>, host: HostState) -> Update {
        let mut backlight = None;

        for event in events {
            match event {
                Event::Press(i, j) => {
                    if self.debug {
                        info!("Press({=u8}, {=u8})", i, j);
                    }
                    if let Some(on) = self.backlight.key_pressed() {
                        backlight = Some(on);
                    }
                },
                Event::Release(i, j) => if self.debug {
                    info!("Release({=u8}, {=u8})", i, j);
                },
            }
            self.layout.event(event);
        }

        if let Some(on) = self.backlight.tick() {
            backlight = Some(on);
        }

        let mut bootloader = false;
        for event in self.layout.tick() {
            let (action, pressed) = match event {
                CustomEvent::NoEvent => continue,
                CustomEvent::Press(action) => (action, true),
                CustomEvent::Release(action) => (action, false),
            };
            bootloader |= self.handle_action(action, pressed);
        }

        self.layer_changed();
        let shift = self.oneshot_changed();
        self.host_state_changed(host);

        self.mouse.tick();

        let report = self.layout.keycodes()
            .chain(shift.then_some(KeyCode::LShift))
            .collect();

        let save = if self.dirty {
            self.dirty = false;
            Some(self.eeconfig())
        } else {
            None
        };

        Update {
            report,
            leds: core::mem::take(&mut self.pending_leds),
            backlight,
            save,
            bootloader,
        }
    }

    /// Push consumer and mouse reports to the host, or drop them when USB is not configured
    pub fn send_reports<C, M>(&mut self, usb_state: UsbDeviceState, consumer: &mut C, mouse: &mut M)
    where
        C: ReportSink<Report = ConsumerReport>,
        M: ReportSink<Report = MouseReport>,
    {
        if usb_state == UsbDeviceState::Configured {
            self.consumer_reports.send(consumer);
            self.mouse.push_report(mouse);
        } else {
            self.consumer_reports.clear();
        }
    }

    /// Returns `true` if reboot to bootloader has been requested
    fn handle_action(&mut self, action: &Action, pressed: bool) -> bool {
        match action {
            Action::Mouse(mouse) => self.mouse.handle_action(mouse, pressed),
            // Single usage report, so only the most recent key is held from the host's view
            Action::Consumer(key) => if pressed {
                self.consumer_key = Some(*key);
                self.consumer_reports.push((*key).into());
            } else if self.consumer_key == Some(*key) {
                self.consumer_key = None;
                self.consumer_reports.push(ConsumerReport::default());
            },
            _ if !pressed => {},
            Action::Rgb(rgb) => {
                match rgb {
                    RgbAction::Toggle => self.rgb.toggle(),
                    RgbAction::ModeForward => self.rgb.step_mode(),
                    RgbAction::Hue(inc) => self.rgb.step_hue(*inc),
                    RgbAction::Saturation(inc) => self.rgb.step_sat(*inc),
                    RgbAction::Value(inc) => self.rgb.step_val(*inc),
                }
                self.pending_leds.push(LedCommand::Config(self.rgb));
                if matches!(rgb, RgbAction::Hue(_) | RgbAction::Saturation(_) | RgbAction::Value(_)) {
                    self.pending_leds.push(LedCommand::Showcase);
                }
                self.dirty = true;
            },
            Action::InfoToggle => {
                let on = !self.user.info_mode();
                self.user.set_info_mode(on);
                info!("Info mode: {=bool}", on);
                self.pending_leds.push(LedCommand::InfoMode(on));
                self.dirty = true;
            },
            Action::SwitchOs(os) => {
                info!("Switching to {}", os);
                self.user.set_os(*os);
                self.layout.set_default_layer(os.base());
                self.dirty = true;
            },
            Action::Firmware(FirmwareAction::Debug) => {
                self.debug = !self.debug;
                info!("Debug: {=bool}", self.debug);
            },
            Action::Firmware(FirmwareAction::Bootloader) => {
                warn!("Rebooting to bootloader");
                return true;
            },
        }
        false
    }

    fn layer_changed(&mut self) {
        let state = self.layout.layer_state();
        if state == self.prev_layer_state {
            return;
        }
        self.prev_layer_state = state;
        let layer = state.highest();
        debug!("Layer: {}", layer);
        if self.user.info_mode() {
            self.pending_leds.push(LedCommand::Layer { level: layer.level(), os: self.user.os() });
        }
    }

    /// Returns whether the one-shot shift should be present in the current report
    ///
    /// Shift is added as soon as a lower layer one-shot is enabled. When the one-shot layer is
    /// cleared, the shift stays for the report of the key that consumed it.
    fn oneshot_changed(&mut self) -> bool {
        let prev_shift = self.oneshot_shift;
        let oneshot = self.layout.oneshot_layer();
        if oneshot == self.prev_oneshot {
            return prev_shift;
        }
        self.prev_oneshot = oneshot;
        match oneshot {
            Some(layer) if layer.level() == Level::Lower => {
                self.oneshot_shift = true;
                true
            },
            Some(_) => prev_shift,
            None => {
                self.oneshot_shift = false;
                prev_shift
            },
        }
    }

    fn host_state_changed(&mut self, host: HostState) {
        if host.leds != self.prev_host_leds {
            self.prev_host_leds = host.leds;
            self.pending_leds.push(LedCommand::CapsLock(host.leds.caps_lock()));
        }

        let prev_usb = self.prev_usb_state;
        self.prev_usb_state = host.usb;
        match (prev_usb, host.usb) {
            (UsbDeviceState::Suspend, UsbDeviceState::Suspend) => {},
            (_, UsbDeviceState::Suspend) => self.pending_leds.push(LedCommand::Suspend(true)),
            (UsbDeviceState::Suspend, _) => self.pending_leds.push(LedCommand::Suspend(false)),
            _ => {},
        }
    }
}

impl LedsUpdate {
    fn push(&mut self, command: LedCommand) {
        if self.commands.push(command).is_err() {
            warn!("Too many LED commands");
        }
    }

    pub fn commands(&self) -> &[LedCommand] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Perform underglow controller update
    pub fn apply(self, underglow: &mut Underglow) {
        for command in self.commands {
            underglow.apply(command);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HUE_STEP, KEYMAP, MOUSE, RGB_DEFAULT};
    use layers::Os;
    use std::vec::Vec as StdVec;
    use usbd_hid::descriptor::AsInputReport;

    const HOST: HostState = HostState {
        leds: KeyboardLeds(0),
        usb: UsbDeviceState::Configured,
    };

    const L_ADJUST: (u8, u8) = (3, 2);
    const L_RAISE: (u8, u8) = (3, 4);
    const L_LOWER: (u8, u8) = (3, 7);
    const L_CAPSLOCK: (u8, u8) = (3, 9);
    const RGB_HUI: (u8, u8) = (3, 10);
    const RGB_TOG: (u8, u8) = (2, 1);
    const INF_TGL: (u8, u8) = (2, 3);
    const L_TO_M: (u8, u8) = (2, 4);
    const RESET: (u8, u8) = (0, 11);
    const DEBUG: (u8, u8) = (0, 0);
    const VOL_UP: (u8, u8) = (1, 3);
    const PLAY: (u8, u8) = (1, 4);
    const MUTE: (u8, u8) = (2, 4);

    /// Collects reports instead of writing them to an endpoint
    struct ReportRecorder<R> {
        sent: StdVec<R>,
    }

    impl<R> ReportRecorder<R> {
        fn new() -> Self {
            Self { sent: StdVec::new() }
        }
    }

    impl<R: AsInputReport + Clone> ReportSink for ReportRecorder<R> {
        type Report = R;

        fn push_report(&mut self, report: &R) -> usb_device::Result<usize> {
            self.sent.push(report.clone());
            Ok(1)
        }
    }

    struct Host {
        consumer: ReportRecorder<ConsumerReport>,
        mouse: ReportRecorder<MouseReport>,
    }

    impl Host {
        fn new() -> Self {
            Self { consumer: ReportRecorder::new(), mouse: ReportRecorder::new() }
        }

        fn poll(&mut self, kb: &mut Keyboard, usb: UsbDeviceState) {
            kb.send_reports(usb, &mut self.consumer, &mut self.mouse);
        }

        fn usage_ids(&self) -> StdVec<u16> {
            self.consumer.sent.iter().map(|r| r.usage_id).collect()
        }
    }

    fn keyboard(stored: Option<Eeconfig>) -> Keyboard {
        let mut kb = Keyboard::new(&KEYMAP, &MOUSE, stored);
        // initial commands and saving
        kb.tick([], HOST);
        kb
    }

    fn stored(info_mode: bool) -> Eeconfig {
        let mut config = Eeconfig::default();
        config.user.set_info_mode(info_mode);
        config
    }

    fn press(kb: &mut Keyboard, (i, j): (u8, u8)) -> Update {
        kb.tick([Event::Press(i, j)], HOST)
    }

    fn release(kb: &mut Keyboard, (i, j): (u8, u8)) -> Update {
        kb.tick([Event::Release(i, j)], HOST)
    }

    fn keys(update: &Update) -> StdVec<u8> {
        // modifiers byte and keycodes
        update.report.as_bytes().iter().copied().filter(|b| *b != 0).collect()
    }

    #[test]
    fn blank_store_saves_defaults() {
        let mut kb = Keyboard::new(&KEYMAP, &MOUSE, None);
        let update = kb.tick([], HOST);
        assert_eq!(update.save, Some(Eeconfig::default()));
        assert_eq!(update.leds.commands(), &[
            LedCommand::Config(RGB_DEFAULT),
            LedCommand::InfoMode(false),
        ]);
        let update = kb.tick([], HOST);
        assert_eq!(update.save, None);
        assert!(update.leds.is_empty());
    }

    #[test]
    fn stored_config_applied() {
        let config = Eeconfig {
            default_layer: Layer::MacBase,
            ..stored(true)
        };
        let mut kb = Keyboard::new(&KEYMAP, &MOUSE, Some(config));
        let update = kb.tick([], HOST);
        assert_eq!(update.save, None);
        assert!(update.leds.commands().contains(&LedCommand::InfoMode(true)));
        assert_eq!(kb.layout().default_layer_state(), LayerState::single(Layer::MacBase));
        assert_eq!(kb.eeconfig(), config);
    }

    #[test]
    fn rgb_hue_persists_and_showcases() {
        let mut kb = keyboard(Some(stored(false)));
        press(&mut kb, L_RAISE);
        let update = press(&mut kb, RGB_HUI);
        let expected = RgbConfig { hue: HUE_STEP, ..RGB_DEFAULT };
        assert_eq!(update.leds.commands(), &[LedCommand::Config(expected), LedCommand::Showcase]);
        assert_eq!(update.save.map(|c| c.rgb), Some(expected));
        // nothing on release
        let update = release(&mut kb, RGB_HUI);
        assert!(update.leds.is_empty());
        assert_eq!(update.save, None);
    }

    #[test]
    fn rgb_toggle_without_showcase() {
        let mut kb = keyboard(Some(stored(false)));
        press(&mut kb, L_ADJUST);
        let update = press(&mut kb, RGB_TOG);
        let expected = RgbConfig { enabled: false, ..RGB_DEFAULT };
        assert_eq!(update.leds.commands(), &[LedCommand::Config(expected)]);
        assert!(update.save.is_some());
    }

    #[test]
    fn info_toggle_enables_layer_feedback() {
        let mut kb = keyboard(Some(stored(false)));
        let update = press(&mut kb, L_ADJUST);
        assert!(update.leds.is_empty());
        let update = press(&mut kb, INF_TGL);
        assert_eq!(update.leds.commands(), &[LedCommand::InfoMode(true)]);
        assert_eq!(update.save.map(|c| c.user.info_mode()), Some(true));
        release(&mut kb, INF_TGL);
        let update = release(&mut kb, L_ADJUST);
        assert_eq!(update.leds.commands(), &[LedCommand::Layer { level: Level::Base, os: Os::Linux }]);
    }

    #[test]
    fn tri_layer_feedback() {
        let mut kb = keyboard(Some(stored(true)));
        let update = press(&mut kb, L_LOWER);
        assert_eq!(update.leds.commands(), &[LedCommand::Layer { level: Level::Lower, os: Os::Linux }]);
        let update = press(&mut kb, L_RAISE);
        assert_eq!(update.leds.commands(), &[LedCommand::Layer { level: Level::Adjust, os: Os::Linux }]);
        let update = release(&mut kb, L_LOWER);
        assert_eq!(update.leds.commands(), &[LedCommand::Layer { level: Level::Raise, os: Os::Linux }]);
    }

    #[test]
    fn switch_os_persists_default_layer() {
        let mut kb = keyboard(Some(stored(false)));
        press(&mut kb, L_ADJUST);
        let update = press(&mut kb, L_TO_M);
        let saved = update.save.unwrap();
        assert!(!saved.user.linux_mode());
        assert_eq!(saved.default_layer, Layer::MacBase);
        assert_eq!(kb.user_config().os(), Os::MacOs);
        release(&mut kb, L_TO_M);
        release(&mut kb, L_ADJUST);
        assert_eq!(kb.layout().active_layer(), Layer::MacBase);
    }

    #[test]
    fn oneshot_lower_adds_shift() {
        let mut kb = keyboard(Some(stored(false)));
        let lshift = 0x02;
        let update = press(&mut kb, L_CAPSLOCK);
        assert_eq!(kb.layout().oneshot_layer(), Some(Layer::LinuxLower));
        assert_eq!(keys(&update), [lshift]);
        let update = release(&mut kb, L_CAPSLOCK);
        assert_eq!(keys(&update), [lshift]);
        // Kb1 on the lower layer gets shifted
        let update = press(&mut kb, (0, 1));
        assert_eq!(keys(&update), [lshift, KeyCode::Kb1 as u8]);
        assert_eq!(kb.layout().oneshot_layer(), None);
        let update = kb.tick([], HOST);
        assert_eq!(keys(&update), [KeyCode::Kb1 as u8]);
    }

    #[test]
    fn caps_lock_from_host() {
        let mut kb = keyboard(Some(stored(false)));
        let mut host = HOST;
        host.leds.set_caps_lock(true);
        let update = kb.tick([], host);
        assert_eq!(update.leds.commands(), &[LedCommand::CapsLock(true)]);
        assert!(kb.tick([], host).leds.is_empty());
        let update = kb.tick([], HOST);
        assert_eq!(update.leds.commands(), &[LedCommand::CapsLock(false)]);
    }

    #[test]
    fn usb_suspend_blanks_leds() {
        let mut kb = keyboard(Some(stored(false)));
        let suspended = HostState { usb: UsbDeviceState::Suspend, ..HOST };
        assert_eq!(kb.tick([], suspended).leds.commands(), &[LedCommand::Suspend(true)]);
        assert!(kb.tick([], suspended).leds.is_empty());
        assert_eq!(kb.tick([], HOST).leds.commands(), &[LedCommand::Suspend(false)]);
    }

    #[test]
    fn key_press_reenables_backlight() {
        let mut kb = keyboard(Some(stored(false)));
        let mut off = None;
        for _ in 0..(2 * BACKLIGHT_TIMEOUT as u32 * 30_001) {
            if let Some(on) = kb.tick([], HOST).backlight {
                off = Some(on);
                break;
            }
        }
        assert_eq!(off, Some(false));
        let update = press(&mut kb, (0, 1));
        assert_eq!(update.backlight, Some(true));
    }

    #[test]
    fn bootloader_requested() {
        let mut kb = keyboard(Some(stored(false)));
        press(&mut kb, L_ADJUST);
        assert!(press(&mut kb, RESET).bootloader);
        assert!(!release(&mut kb, RESET).bootloader);
    }

    #[test]
    fn leds_update_applies_in_order() {
        let mut kb = keyboard(Some(stored(true)));
        let mut underglow = kb.underglow();
        press(&mut kb, L_LOWER).leds.apply(&mut underglow);
        assert_eq!(underglow.effect_range(), 0..8);
        release(&mut kb, L_LOWER).leds.apply(&mut underglow);
        assert_eq!(underglow.effect_range(), 0..14);
    }

    #[test]
    fn consumer_key_press_and_release() {
        let mut kb = keyboard(Some(stored(false)));
        let mut host = Host::new();
        press(&mut kb, L_RAISE);
        press(&mut kb, VOL_UP);
        host.poll(&mut kb, UsbDeviceState::Configured);
        assert_eq!(host.usage_ids(), [0xE9]);
        release(&mut kb, VOL_UP);
        host.poll(&mut kb, UsbDeviceState::Configured);
        assert_eq!(host.usage_ids(), [0xE9, 0]);
        host.poll(&mut kb, UsbDeviceState::Configured);
        assert_eq!(host.usage_ids(), [0xE9, 0]);
        assert!(host.mouse.sent.is_empty());
    }

    #[test]
    fn consumer_reports_dropped_when_not_configured() {
        let mut kb = keyboard(Some(stored(false)));
        let mut host = Host::new();
        press(&mut kb, L_RAISE);
        press(&mut kb, VOL_UP);
        host.poll(&mut kb, UsbDeviceState::Suspend);
        host.poll(&mut kb, UsbDeviceState::Configured);
        assert!(host.usage_ids().is_empty());
        release(&mut kb, VOL_UP);
        host.poll(&mut kb, UsbDeviceState::Configured);
        assert_eq!(host.usage_ids(), [0]);
    }

    #[test]
    fn consumer_release_of_replaced_key_ignored() {
        let mut kb = keyboard(Some(stored(false)));
        let mut host = Host::new();
        press(&mut kb, L_RAISE);
        press(&mut kb, PLAY);
        host.poll(&mut kb, UsbDeviceState::Configured);
        press(&mut kb, MUTE);
        host.poll(&mut kb, UsbDeviceState::Configured);
        // Mute is still held
        release(&mut kb, PLAY);
        host.poll(&mut kb, UsbDeviceState::Configured);
        assert_eq!(host.usage_ids(), [0xCD, 0xE2]);
        release(&mut kb, MUTE);
        host.poll(&mut kb, UsbDeviceState::Configured);
        assert_eq!(host.usage_ids(), [0xCD, 0xE2, 0]);
    }

    #[test]
    fn debug_key_toggles() {
        let mut kb = keyboard(Some(stored(false)));
        press(&mut kb, L_ADJUST);
        assert!(!kb.debug());
        press(&mut kb, DEBUG);
        assert!(kb.debug());
        release(&mut kb, DEBUG);
        assert!(kb.debug());
        press(&mut kb, DEBUG);
        assert!(!kb.debug());
    }

    #[test]
    fn failed_save_returned_again() {
        let mut kb = keyboard(Some(stored(false)));
        press(&mut kb, L_ADJUST);
        let saved = press(&mut kb, INF_TGL).save;
        assert!(saved.is_some());
        kb.save_failed();
        assert_eq!(kb.tick([], HOST).save, saved);
        assert_eq!(kb.tick([], HOST).save, None);
    }
}

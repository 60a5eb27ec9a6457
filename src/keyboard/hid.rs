//! USB HID classes and reports other than the keyboard itself

use bitfield::bitfield;
use heapless::Deque;
use serde::{Serialize, Deserialize};
use usb_device::{UsbError, class_prelude::*};
use usbd_hid::descriptor::{AsInputReport, generator_prelude::*};
use usbd_hid::hid_class::HIDClass;

use crate::macros::warn;

bitfield! {
    /// State of HID keyboard LEDs
    #[derive(Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct KeyboardLeds(pub u8);
    impl Debug;
    pub num_lock, set_num_lock: 0;
    pub caps_lock, set_caps_lock: 1;
    pub scroll_lock, set_scroll_lock: 2;
    pub compose, set_compose: 3;
    pub kana, set_kana: 4;
}

impl keyberon::keyboard::Leds for KeyboardLeds {
    fn num_lock(&mut self, status: bool) { self.set_num_lock(status); }
    fn caps_lock(&mut self, status: bool) { self.set_caps_lock(status); }
    fn scroll_lock(&mut self, status: bool) { self.set_scroll_lock(status); }
    fn compose(&mut self, status: bool) { self.set_compose(status); }
    fn kana(&mut self, status: bool) { self.set_kana(status); }
}

/// Endpoint accepting HID input reports
pub trait ReportSink {
    type Report: AsInputReport;

    /// Push report to endpoint, returns the number of bytes written
    fn push_report(&mut self, report: &Self::Report) -> usb_device::Result<usize>;
}

/// Specific HID class
pub trait HidClass<'a, B: UsbBus + 'a>: ReportSink {
    /// Get underlying USB HID class
    fn class(&mut self) -> &mut HIDClass<'a, B>;
}

/// Helper queue for sending USB HID reports
///
/// Due to unpredictable host OS polling it may happen that mcu generates
/// HID reports faster than OS is consumes them. This most often happens
/// in spikes, so adding a small FIFO queue in between allows to minimize
/// number of missed reports.
pub struct HidReportQueue<R, const N: usize> {
    queue: Deque<R, N>,
    missed: bool,
}

impl<R, const N: usize> HidReportQueue<R, N>
    where R: AsInputReport + PartialEq
{
    pub const fn new() -> Self {
        Self {
            queue: Deque::new(),
            missed: false,
        }
    }

    /// Push a report to queue if it changed
    ///
    /// Adds a new report to queue if it is different from the last one.
    pub fn push(&mut self, report: R) {
        let add = self.queue.back()
            .map(|prev| &report != prev)
            .unwrap_or(true);

        // If we previously missed a report (queue overflow) then we must make sure
        // that an additional report will be sent to synchronize the final HID state.
        if add || (self.missed && self.queue.is_empty()) {
            // Overwrite the oldest report when the host is polling too rarely
            self.missed = self.queue.is_full();
            if self.missed {
                self.queue.pop_front();
            }
            // Cannot fail, there is free space now
            self.queue.push_back(report).ok();
        }
    }

    /// Try sending USB HID report
    ///
    /// This will try to send next report from queue assuming that the push is successful
    /// if it returns `Ok(n)` with `n > 0`, which corresponds to standard endpoint write
    /// function. If it returns `Ok(0)` or `Err(UsbError::WouldBlock)` then we try later.
    /// Any other error means a bug in the class implementation; the report is dropped.
    pub fn send<S: ReportSink<Report = R>>(&mut self, hid: &mut S) {
        if let Some(report) = self.queue.front() {
            match hid.push_report(report) {
                Ok(0) | Err(UsbError::WouldBlock) => {},
                Ok(_) => {
                    self.queue.pop_front();
                },
                Err(_) => {
                    warn!("HID report push failed");
                    self.queue.pop_front();
                },
            }
        }
    }

    /// Number of reports waiting
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Emtpy the report queue, to be called on USB disconnect/suspend
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

/// Report used to send consumer control commands (media keys) to the host
///
/// Reference: <https://usb.org/sites/default/files/hut1_2.pdf>
#[gen_hid_descriptor(
    (collection = APPLICATION, usage_page = CONSUMER, usage = CONSUMER_CONTROL) = {
        (usage_page = CONSUMER, usage_min = 0x00, usage_max = 0x514) = {
            #[item_settings data,array,absolute,not_null] usage_id=input;
        };
    }
)]
#[derive(Clone, Default, Debug, Eq, PartialEq)]
pub struct ConsumerReport {
    pub usage_id: u16,
}

/// HID Consumer Usage Page keys that can be used in [`ConsumerReport`]
#[repr(u16)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConsumerKey {
    PlayPause = 0xCD,
    Mute = 0xE2,
    VolumeIncrement = 0xE9,
    VolumeDecrement = 0xEA,
    /// Browser back
    AcBack = 0x224,
    /// Browser forward
    AcForward = 0x225,
}

impl From<ConsumerKey> for ConsumerReport {
    fn from(key: ConsumerKey) -> Self {
        ConsumerReport { usage_id: key as u16 }
    }
}

pub struct HidConsumer<'a, B: UsbBus> {
    hid: HIDClass<'a, B>,
}

impl<'a, B: UsbBus> HidConsumer<'a, B> {
    pub fn new(alloc: &'a UsbBusAllocator<B>) -> Self {
        Self {
            hid: HIDClass::new_ep_in_with_settings(alloc, ConsumerReport::desc(), 100, Self::settings()),
        }
    }

    const fn settings() -> usbd_hid::hid_class::HidClassSettings {
        use usbd_hid::hid_class::*;
        HidClassSettings {
            subclass: HidSubClass::NoSubClass,
            protocol: HidProtocol::Keyboard,
            config: ProtocolModeConfig::DefaultBehavior,
            locale: HidCountryCode::NotSupported,
        }
    }
}

impl<'a, B: UsbBus> ReportSink for HidConsumer<'a, B> {
    type Report = ConsumerReport;

    fn push_report(&mut self, report: &ConsumerReport) -> usb_device::Result<usize> {
        self.hid.push_input(report)
    }
}

impl<'a, B: UsbBus> HidClass<'a, B> for HidConsumer<'a, B> {
    fn class(&mut self) -> &mut HIDClass<'a, B> {
        &mut self.hid
    }
}

/// Mouse movements and button presses, with horizontal scrolling
#[gen_hid_descriptor(
    (collection = APPLICATION, usage_page = GENERIC_DESKTOP, usage = MOUSE) = {
        (collection = PHYSICAL, usage = POINTER) = {
            (usage_page = BUTTON, usage_min = BUTTON_1, usage_max = BUTTON_8) = {
                #[packed_bits 8] #[item_settings data,variable,absolute] buttons=input;
            };
            (usage_page = GENERIC_DESKTOP,) = {
                (usage = X,) = {
                    #[item_settings data,variable,relative] x=input;
                };
                (usage = Y,) = {
                    #[item_settings data,variable,relative] y=input;
                };
                (usage = WHEEL,) = {
                    #[item_settings data,variable,relative] wheel=input;
                };
            };
            (usage_page = CONSUMER,) = {
                (usage = AC_PAN,) = {
                    #[item_settings data,variable,relative] pan=input;
                };
            };
        };
    }
)]
#[derive(Clone, Default, Debug, Eq, PartialEq)]
pub struct MouseReport {
    pub buttons: u8,
    pub x: i8,
    pub y: i8,
    pub wheel: i8, // Scroll down (negative) or up (positive) this many units
    pub pan: i8,   // Scroll left (negative) or right (positive) this many units
}

pub struct HidMouse<'a, B: UsbBus> {
    hid: HIDClass<'a, B>,
}

impl<'a, B: UsbBus> HidMouse<'a, B> {
    pub fn new(alloc: &'a UsbBusAllocator<B>) -> Self {
        Self {
            hid: HIDClass::new_ep_in_with_settings(alloc, MouseReport::desc(), 10, Self::settings()),
        }
    }

    const fn settings() -> usbd_hid::hid_class::HidClassSettings {
        use usbd_hid::hid_class::*;
        HidClassSettings {
            subclass: HidSubClass::NoSubClass,
            protocol: HidProtocol::Mouse,
            config: ProtocolModeConfig::DefaultBehavior,
            locale: HidCountryCode::NotSupported,
        }
    }
}

impl<'a, B: UsbBus> ReportSink for HidMouse<'a, B> {
    type Report = MouseReport;

    fn push_report(&mut self, report: &MouseReport) -> usb_device::Result<usize> {
        self.hid.push_input(report)
    }
}

impl<'a, B: UsbBus> HidClass<'a, B> for HidMouse<'a, B> {
    fn class(&mut self) -> &mut HIDClass<'a, B> {
        &mut self.hid
    }
}

use usb_device::bus::UsbBusAllocator;
use usb_device::device::{UsbDevice, UsbDeviceState, UsbVidPid, UsbDeviceBuilder};
use usbd_dfu_rt::DfuRuntimeClass;

use crate::hal::usb;
use crate::hal_ext::reboot;
use crate::keyboard::hid::{HidClass, HidConsumer, HidMouse, KeyboardLeds};

type Bus = usb::UsbBusType;

/// USB resources and class implementations
pub struct Usb {
    pub dev: UsbDevice<'static, Bus>,
    pub keyboard: keyberon::Class<'static, Bus, KeyboardLeds>,
    pub consumer: HidConsumer<'static, Bus>,
    pub mouse: HidMouse<'static, Bus>,
    pub dfu: DfuRuntimeClass<reboot::DfuBootloader>,
}

impl Usb {
    pub fn new(bus: &'static UsbBusAllocator<Bus>) -> Self {
        // Classes
        let keyboard = keyberon::new_class(bus, KeyboardLeds::default());
        let consumer = HidConsumer::new(bus);
        let mouse = HidMouse::new(bus);
        let dfu = DfuRuntimeClass::new(bus, reboot::DfuBootloader);

        // Device
        // VID:PID recognised as Van Ooijen Technische Informatica:Keyboard
        let generic_keyboard = UsbVidPid(0x16c0, 0x27db);
        let dev = UsbDeviceBuilder::new(bus, generic_keyboard)
            .manufacturer("OLKB")
            .product("Planck MIT")
            .serial_number(env!("CARGO_PKG_VERSION"))
            .composite_with_iads()
            .build();

        Self { dev, keyboard, consumer, mouse, dfu }
    }

    pub fn state(&self) -> UsbDeviceState {
        self.dev.state()
    }

    /// Keyboard LEDs state set by the host
    pub fn keyboard_leds(&mut self) -> KeyboardLeds {
        *self.keyboard.device_mut().leds_mut()
    }

    /// Periodic USB poll
    pub fn poll(&mut self) -> bool {
        self.dev.poll(&mut [
            &mut self.keyboard,
            self.consumer.class(),
            self.mouse.class(),
            &mut self.dfu,
        ])
    }
}

#![no_main]
#![no_std]

use panic_probe as _;
use defmt_rtt as _;
use stm32f0xx_hal as hal;
use planck_mit as lib;

#[rtic::app(device = crate::hal::pac, dispatchers = [CEC_CAN, USART3_4])]
mod app {
    use cortex_m::interrupt::free as ifree;
    use super::hal;
    use hal::prelude::*;
    use usb_device::{prelude::*, class_prelude::UsbBusAllocator};

    use super::lib;
    use lib::bsp::{self, ws2812b, usb::Usb, BacklightPin};
    use lib::config;
    use lib::hal_ext::{
        dma::{DmaSplit, DmaTx, TransferOngoing},
        flash::{self, Flash},
        reboot,
        spi::SpiTx,
    };
    use lib::keyboard::{self, HostState, LedsUpdate, leds::Underglow};
    use lib::storage::{ConfigStore, Eeconfig};

    type Leds = ws2812b::Leds<{ bsp::NLEDS }>;

    #[shared]
    struct Shared {
        usb: Usb,
        underglow: Underglow,
        spi_tx: SpiTx,
    }

    #[local]
    struct Local {
        timer: hal::timers::Timer<hal::pac::TIM15>,
        keys: keyboard::Keys,
        keyboard: keyboard::Keyboard,
        backlight: BacklightPin,
        leds: Leds,
        store: Option<ConfigStore<Flash>>,
    }

    #[monotonic(binds = SysTick, default = true)]
    type Mono = systick_monotonic::Systick<MONO_HZ>;
    pub const MONO_HZ: u32 = 1000;

    #[init(local = [
        usb_bus: Option<UsbBusAllocator<hal::usb::UsbBusType>> = None,
        led_buf: [u8; Leds::BUFFER_SIZE] = [0; Leds::BUFFER_SIZE],
    ])]
    fn init(cx: init::Context) -> (Shared, Local, init::Monotonics) {
        let mut core = cx.core;
        let mut dev = cx.device;

        // Automatically enter sleep mode when leaving an ISR
        if cfg!(feature = "idle-sleep") {
            core.SCB.set_sleeponexit();
        }

        let sysclk: hal::time::Hertz = 48.mhz().into();
        let pclk: hal::time::Hertz = 24.mhz().into();
        let mut rcc = dev.RCC
            .configure()
            .enable_crs(dev.CRS) // synchronization to USB SOF
            .hsi48()
            .sysclk(sysclk)
            .pclk(pclk)
            .freeze(&mut dev.FLASH);

        let gpioa = dev.GPIOA.split(&mut rcc);
        let gpiob = dev.GPIOB.split(&mut rcc);

        // Keyboard matrix
        let cols = ifree(|cs| [
            gpioa.pa0.into_pull_up_input(cs).downgrade(),
            gpioa.pa1.into_pull_up_input(cs).downgrade(),
            gpioa.pa2.into_pull_up_input(cs).downgrade(),
            gpioa.pa3.into_pull_up_input(cs).downgrade(),
            gpioa.pa4.into_pull_up_input(cs).downgrade(),
            gpioa.pa5.into_pull_up_input(cs).downgrade(),
            gpioa.pa6.into_pull_up_input(cs).downgrade(),
            gpioa.pa7.into_pull_up_input(cs).downgrade(),
            gpiob.pb4.into_pull_up_input(cs).downgrade(),
            gpiob.pb5.into_pull_up_input(cs).downgrade(),
            gpiob.pb6.into_pull_up_input(cs).downgrade(),
            gpiob.pb7.into_pull_up_input(cs).downgrade(),
        ]);
        let rows = ifree(|cs| [
            gpiob.pb10.into_push_pull_output(cs).downgrade(),
            gpiob.pb11.into_push_pull_output(cs).downgrade(),
            gpiob.pb12.into_push_pull_output(cs).downgrade(),
            gpiob.pb13.into_push_pull_output(cs).downgrade(),
        ]);
        let keys = keyboard::Keys::new(cols, rows, config::DEBOUNCE_COUNT);

        let backlight = BacklightPin::new(ifree(|cs| gpioa.pa8.into_push_pull_output(cs).downgrade()));

        // DMA
        let dma = dev.DMA1.split(&mut rcc);

        // SPI (tx only) for RGB data, streamed by DMA so that preemption cannot stall a frame
        let mosi = ifree(|cs| gpiob.pb15.into_alternate_af0(cs));  // SPI2_MOSI
        let led_buf: &'static mut [u8] = cx.local.led_buf;
        let spi_tx = defmt::unwrap!(SpiTx::new(
            dev.SPI2,
            mosi,
            dma.ch5,
            led_buf,
            (ws2812b::SPI_FREQ as u32).hz(),
            &mut rcc,
        ));

        // Configuration store on the last flash page
        let store = match ConfigStore::new(Flash::new(dev.FLASH), flash::CONFIG_PAGE_OFFSET) {
            Ok(store) => Some(store),
            Err(e) => {
                defmt::error!("Config store unavailable: {}", e);
                None
            },
        };
        let stored = store.as_ref().and_then(|store| store.load());
        defmt::info!("Stored config: {}", stored);

        let keyboard = keyboard::Keyboard::new(&config::KEYMAP, &config::MOUSE, stored);
        let underglow = keyboard.underglow();

        // configure periodic timer
        let mut timer = hal::timers::Timer::tim15(dev.TIM15, 1.khz(), &mut rcc);
        timer.listen(hal::timers::Event::TimeOut);

        // USB
        let usb = hal::usb::Peripheral {
            usb: dev.USB,
            pin_dp: gpioa.pa12,
            pin_dm: gpioa.pa11
        };
        let usb_bus = cx.local.usb_bus.insert(hal::usb::UsbBus::new(usb));
        let usb = Usb::new(usb_bus);

        defmt::info!("Liftoff! {=str}", lib::built_info::PKG_VERSION);

        let shared = Shared {
            usb,
            underglow,
            spi_tx,
        };

        let local = Local {
            timer,
            keys,
            keyboard,
            backlight,
            leds: Leds::new(),
            store,
        };

        let mono = systick_monotonic::Systick::new(core.SYST, sysclk.0);

        (shared, local, init::Monotonics(mono))
    }

    #[task(binds = TIM15, priority = 4, local = [timer, t: u32 = 0])]
    fn tick(cx: tick::Context) {
        // Clears interrupt flag
        if cx.local.timer.wait().is_ok() {
            let t = cx.local.t;
            *t = t.wrapping_add(1);

            if *t % 10 == 0 {
                // ignore error if we're too slow
                if update_leds::spawn(*t).is_err() {
                    defmt::warn!("Spawn failed: update_leds");
                };
            }

            if keyboard_tick::spawn().is_err() {
                defmt::error!("Spawn failed: keyboard_tick");
            }
        }
    }

    /// USB poll
    ///
    /// On an USB interrput we need to handle all classes and receive/send proper data.
    /// This is always a response to USB host polling because host initializes all transactions.
    #[task(binds = USB, priority = 3, shared = [usb])]
    fn usb_poll(mut cx: usb_poll::Context) {
        cx.shared.usb.lock(|usb| {
            usb.poll();
        });
    }

    #[task(priority = 2, capacity = 1, shared = [usb], local = [keys, keyboard, backlight])]
    fn keyboard_tick(cx: keyboard_tick::Context) {
        let mut usb = cx.shared.usb;
        let keyboard = cx.local.keyboard;

        let host = usb.lock(|usb| HostState {
            leds: usb.keyboard_leds(),
            usb: usb.state(),
        });

        let update = keyboard.tick(cx.local.keys.scan(), host);

        if let Some(on) = update.backlight {
            cx.local.backlight.set(on);
        }
        if !update.leds.is_empty() && apply_leds::spawn(update.leds).is_err() {
            defmt::warn!("Spawn failed: apply_leds");
        }
        if let Some(config) = update.save {
            // store still busy, retry on next tick
            if save_config::spawn(config).is_err() {
                keyboard.save_failed();
            }
        }
        if update.bootloader {
            usb.lock(|usb| unsafe { reboot::reboot(true, Some(usb.dev.bus())) });
        }

        usb.lock(|usb| keyboard.send_reports(host.usb, &mut usb.consumer, &mut usb.mouse));

        // Set current USB report to the new one, finish if there is no change
        if host.usb != UsbDeviceState::Configured {
            return
        }
        let report = update.report;
        if !usb.lock(|usb| usb.keyboard.device_mut().set_keyboard_report(report.clone())) {
            return
        }
        // Spin until we are able to send the report.
        // Important: lock separately in each loop iterations and use higher priority for usb_poll
        // to avoid not-so-dead locks (tick may be running all the time preventing usb_poll).
        while let Ok(0) = usb.lock(|usb| usb.keyboard.write(report.as_bytes())) {}
    }

    /// Apply underglow commands from keyboard_tick
    ///
    /// This has the same priority as update_leds but we use a queue to eventually apply all
    /// the updates.
    #[task(priority = 1, shared = [underglow], capacity = 4)]
    fn apply_leds(mut cx: apply_leds::Context, update: LedsUpdate) {
        cx.shared.underglow.lock(|underglow| update.apply(underglow));
    }

    #[task(priority = 1, shared = [underglow, spi_tx], local = [leds])]
    fn update_leds(cx: update_leds::Context, t: u32) {
        let update_leds::SharedResources {
            mut underglow,
            mut spi_tx,
        } = cx.shared;
        let leds = cx.local.leds;

        underglow.lock(|underglow| underglow.tick(t, leds));

        // Serialize new colors and start DMA transfer, the frame is dropped if we're too slow
        match spi_tx.lock(|spi_tx| leds.send(spi_tx)) {
            Ok(()) => {},
            Err(nb::Error::Other(TransferOngoing)) => defmt::warn!("LED frame dropped: transfer ongoing"),
            Err(nb::Error::WouldBlock) => defmt::warn!("LED frame delayed: SPI busy"),
        }
    }

    #[task(binds = DMA1_CH4_5_6_7, priority = 4, shared = [spi_tx])]
    fn dma_spi_callback(mut cx: dma_spi_callback::Context) {
        match cx.shared.spi_tx.lock(|spi_tx| spi_tx.on_interrupt()).as_option() {
            Some(Ok(())) => {},
            Some(Err(e)) => defmt::error!("LED DMA transfer failed: {}", e),
            None => defmt::warn!("Unexpected DMA interrupt"),
        }
    }

    #[task(priority = 1, capacity = 1, local = [store])]
    fn save_config(cx: save_config::Context, config: Eeconfig) {
        match cx.local.store.as_mut().map(|store| store.save(&config)) {
            Some(Ok(true)) => defmt::info!("Config saved: {}", config),
            Some(Ok(false)) => {},
            Some(Err(e)) => defmt::error!("Config save failed: {}", e),
            None => defmt::warn!("No config store"),
        }
    }

    #[idle]
    fn idle(_cx: idle::Context) -> ! {
        loop {
            if cfg!(feature = "idle-sleep") {
                rtic::export::wfi();
            } else {
                rtic::export::nop();
            }
        }
    }
}

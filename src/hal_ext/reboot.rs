use core::mem::MaybeUninit;
use cortex_m::{peripheral::SCB, asm::bootload};
use usbd_dfu_rt::DfuRuntimeOps;

use crate::hal::{pac, usb};

const MAGIC_JUMP_BOOTLOADER: u32 = 0xdeadbeef;
/// STM32F072 System Memory holding the ROM DFU bootloader
const SYSTEM_MEMORY_BASE: u32 = 0x1fffc800;

#[link_section = ".uninit.MAGIC"]
static mut MAGIC: MaybeUninit<u32> = MaybeUninit::uninit();

/// Reboot the MCU
///
/// Triggers system reset. If `bootloader` is true, then a flag will be set
/// such that after reset, before any code execution we will jump to the embedded
/// MCU bootloader. If `usb_bus` is passed, then USB reenumeration will be triggered
/// before system reset, so that the host notices the bootloader device.
///
/// # Safety
///
/// Resets the system, any pending flash or peripheral operations are interrupted.
pub unsafe fn reboot(bootloader: bool, usb_bus: Option<&usb::UsbBusType>) -> ! {
    if bootloader {
        MAGIC.as_mut_ptr().write(MAGIC_JUMP_BOOTLOADER);
    }
    if let Some(bus) = usb_bus {
        bus.force_reenumeration(|| {
            SCB::sys_reset();
        });
    }
    SCB::sys_reset()
}

#[cortex_m_rt::pre_init]
unsafe fn jump_bootloader() {
    // Only after a software reset, else MAGIC holds garbage
    let software_reset = (*pac::RCC::ptr()).csr.read().sftrstf().bit_is_set();

    if software_reset && MAGIC.assume_init() == MAGIC_JUMP_BOOTLOADER {
        // reset the magic value not to jump again
        MAGIC.as_mut_ptr().write(0);
        bootload(SYSTEM_MEMORY_BASE as *const u32);
    }
}

/// Switching to USB DFU mode by rebooting to the embedded DFU bootloader
pub struct DfuBootloader;

impl DfuRuntimeOps for DfuBootloader {
    fn detach(&mut self) {
        unsafe { reboot(true, None); }
    }

    fn allow(&mut self, timeout: u16) -> Option<u16> {
        Some(timeout)
    }

    const WILL_DETACH: bool = false;
}

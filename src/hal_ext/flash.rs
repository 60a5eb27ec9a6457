//! Flash programming on STM32F0
//!
//! Exposes the whole main flash through [`embedded_storage`] NOR flash traits. Writes are done
//! in half-words, erases in whole pages.

use embedded_storage::nor_flash::{
    self, ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};

use crate::hal::pac;

const FLASH_BASE: u32 = 0x0800_0000;
const FLASH_SIZE: usize = 128 * 1024;
pub const PAGE_SIZE: usize = 2048;

/// Offset of the last flash page, reserved for the configuration store in memory.x
pub const CONFIG_PAGE_OFFSET: u32 = (FLASH_SIZE - PAGE_SIZE) as u32;

const KEY1: u32 = 0x4567_0123;
const KEY2: u32 = 0xcdef_89ab;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    NotAligned,
    OutOfBounds,
    /// Programming a location that has not been erased
    Programming,
    WriteProtected,
}

impl NorFlashError for FlashError {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            FlashError::NotAligned => NorFlashErrorKind::NotAligned,
            FlashError::OutOfBounds => NorFlashErrorKind::OutOfBounds,
            FlashError::Programming | FlashError::WriteProtected => NorFlashErrorKind::Other,
        }
    }
}

impl From<NorFlashErrorKind> for FlashError {
    fn from(kind: NorFlashErrorKind) -> Self {
        match kind {
            NorFlashErrorKind::NotAligned => FlashError::NotAligned,
            _ => FlashError::OutOfBounds,
        }
    }
}

/// Flash memory controller
pub struct Flash {
    regs: pac::FLASH,
}

impl Flash {
    pub fn new(regs: pac::FLASH) -> Self {
        Self { regs }
    }

    fn wait_ready(&self) {
        while self.regs.sr.read().bsy().bit_is_set() {}
    }

    /// Run `f` with the flash controller unlocked
    fn unlocked<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.wait_ready();
        if self.regs.cr.read().lock().bit_is_set() {
            self.regs.keyr.write(|w| unsafe { w.fkeyr().bits(KEY1) });
            self.regs.keyr.write(|w| unsafe { w.fkeyr().bits(KEY2) });
        }
        let result = f(self);
        self.regs.cr.modify(|_, w| w.lock().set_bit());
        result
    }

    /// Check and clear status flags after an operation
    fn status(&self) -> Result<(), FlashError> {
        let sr = self.regs.sr.read();
        let result = if sr.wrprt().bit_is_set() {
            Err(FlashError::WriteProtected)
        } else if sr.pgerr().bit_is_set() {
            Err(FlashError::Programming)
        } else {
            Ok(())
        };
        // write 1 to clear
        self.regs.sr.write(|w| w.eop().set_bit().pgerr().set_bit().wrprt().set_bit());
        result
    }

    fn erase_page(&mut self, address: u32) -> Result<(), FlashError> {
        self.regs.cr.modify(|_, w| w.per().set_bit());
        self.regs.ar.write(|w| unsafe { w.far().bits(address) });
        self.regs.cr.modify(|_, w| w.strt().set_bit());
        self.wait_ready();
        self.regs.cr.modify(|_, w| w.per().clear_bit());
        self.status()
    }

    fn write_half_word(&mut self, address: u32, value: u16) -> Result<(), FlashError> {
        self.regs.cr.modify(|_, w| w.pg().set_bit());
        unsafe { core::ptr::write_volatile(address as *mut u16, value) };
        self.wait_ready();
        self.regs.cr.modify(|_, w| w.pg().clear_bit());
        self.status()
    }
}

impl ErrorType for Flash {
    type Error = FlashError;
}

impl ReadNorFlash for Flash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        nor_flash::check_read(self, offset, bytes.len())?;
        let start = (FLASH_BASE + offset) as *const u8;
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = unsafe { core::ptr::read_volatile(start.add(i)) };
        }
        Ok(())
    }

    fn capacity(&self) -> usize {
        FLASH_SIZE
    }
}

impl NorFlash for Flash {
    const WRITE_SIZE: usize = 2;
    const ERASE_SIZE: usize = PAGE_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        nor_flash::check_erase(self, from, to)?;
        self.unlocked(|flash| {
            for page in (from..to).step_by(PAGE_SIZE) {
                flash.erase_page(FLASH_BASE + page)?;
            }
            Ok(())
        })
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        nor_flash::check_write(self, offset, bytes.len())?;
        self.unlocked(|flash| {
            for (i, chunk) in bytes.chunks_exact(2).enumerate() {
                let value = u16::from_le_bytes([chunk[0], chunk[1]]);
                flash.write_half_word(FLASH_BASE + offset + 2 * i as u32, value)?;
            }
            Ok(())
        })
    }
}

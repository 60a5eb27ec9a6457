//! Persistent configuration store
//!
//! Configuration records are kept in a single flash erase page used as an append-only log of
//! fixed-size slots. Each slot holds the payload length, postcard-encoded [`Eeconfig`] and a
//! CRC-8 of the payload. The newest valid slot wins. When the page is full it is erased and
//! writing starts from the first slot again.

use crc::{Crc, CRC_8_SMBUS};
use embedded_storage::nor_flash::NorFlash;
use serde::{Deserialize, Serialize};

use crate::config::RGB_DEFAULT;
use crate::keyboard::layers::Layer;
use crate::keyboard::leds::RgbConfig;
use crate::keyboard::user_config::UserConfig;
use crate::macros::{debug, info, warn};

/// Size of a single record slot
pub const SLOT_SIZE: usize = 16;
const MAX_PAYLOAD: usize = SLOT_SIZE - 2;
const ERASED: u8 = 0xff;

const CRC: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// Configuration persisted across power cycles
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Eeconfig {
    pub user: UserConfig,
    pub default_layer: Layer,
    pub rgb: RgbConfig,
}

impl Default for Eeconfig {
    fn default() -> Self {
        let user = UserConfig::default();
        Self {
            user,
            default_layer: user.os().base(),
            rgb: RGB_DEFAULT,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    /// Flash driver failed to read, write or erase
    Flash,
    /// Record does not fit in a slot
    Encoding,
}

/// Configuration store on a single erase page of `F`
pub struct ConfigStore<F: NorFlash> {
    flash: F,
    offset: u32,
    next_slot: usize,
    current: Option<Eeconfig>,
}

impl<F: NorFlash> ConfigStore<F> {
    const SLOTS: usize = F::ERASE_SIZE / SLOT_SIZE;

    /// Open the store located at `offset` and scan it for the newest record
    pub fn new(flash: F, offset: u32) -> Result<Self, StorageError> {
        let mut store = Self { flash, offset, next_slot: 0, current: None };
        store.scan()?;
        Ok(store)
    }

    fn slot_offset(&self, slot: usize) -> u32 {
        self.offset + (slot * SLOT_SIZE) as u32
    }

    fn scan(&mut self) -> Result<(), StorageError> {
        let mut buf = [0u8; SLOT_SIZE];
        let mut slot = 0;
        while slot < Self::SLOTS {
            self.flash.read(self.slot_offset(slot), &mut buf)
                .map_err(|_| StorageError::Flash)?;
            if buf[0] == ERASED {
                break;
            }
            match Self::decode(&buf) {
                Some(config) => self.current = Some(config),
                None => warn!("Invalid config record in slot {}", slot),
            }
            slot += 1;
        }
        self.next_slot = slot;
        debug!("Config store: {} slots used", slot);
        Ok(())
    }

    fn decode(buf: &[u8; SLOT_SIZE]) -> Option<Eeconfig> {
        let len = buf[0] as usize;
        if len > MAX_PAYLOAD {
            return None;
        }
        let payload = &buf[1..1 + len];
        if CRC.checksum(payload) != buf[1 + len] {
            return None;
        }
        postcard::from_bytes(payload).ok()
    }

    fn encode(config: &Eeconfig) -> Result<[u8; SLOT_SIZE], StorageError> {
        let mut buf = [ERASED; SLOT_SIZE];
        let len = postcard::to_slice(config, &mut buf[1..1 + MAX_PAYLOAD])
            .map_err(|_| StorageError::Encoding)?
            .len();
        buf[0] = len as u8;
        buf[1 + len] = CRC.checksum(&buf[1..1 + len]);
        Ok(buf)
    }

    /// Newest valid record, `None` for a blank or corrupted store
    pub fn load(&self) -> Option<Eeconfig> {
        self.current
    }

    /// Store configuration; returns `false` when it did not change and nothing was written
    pub fn save(&mut self, config: &Eeconfig) -> Result<bool, StorageError> {
        if self.current.as_ref() == Some(config) {
            return Ok(false);
        }
        let buf = Self::encode(config)?;
        if self.next_slot >= Self::SLOTS {
            info!("Config store full, erasing");
            self.flash.erase(self.offset, self.offset + F::ERASE_SIZE as u32)
                .map_err(|_| StorageError::Flash)?;
            self.next_slot = 0;
        }
        self.flash.write(self.slot_offset(self.next_slot), &buf)
            .map_err(|_| StorageError::Flash)?;
        self.next_slot += 1;
        self.current = Some(*config);
        Ok(true)
    }

    /// Number of slots used in the page
    pub fn used_slots(&self) -> usize {
        self.next_slot
    }

    pub fn release(self) -> F {
        self.flash
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyboard::leds::Mode;
    use embedded_storage::nor_flash::{ErrorType, NorFlashError, NorFlashErrorKind, ReadNorFlash};

    #[derive(Debug)]
    struct StubError;

    impl NorFlashError for StubError {
        fn kind(&self) -> NorFlashErrorKind {
            NorFlashErrorKind::Other
        }
    }

    /// Two 64-byte pages of NOR flash in memory
    struct FlashStub {
        buf: [u8; 128],
        fail_writes: bool,
    }

    impl FlashStub {
        fn new() -> Self {
            Self { buf: [ERASED; 128], fail_writes: false }
        }
    }

    impl ErrorType for FlashStub {
        type Error = StubError;
    }

    impl ReadNorFlash for FlashStub {
        const READ_SIZE: usize = 1;

        fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), StubError> {
            let offset = offset as usize;
            bytes.copy_from_slice(&self.buf[offset..offset + bytes.len()]);
            Ok(())
        }

        fn capacity(&self) -> usize {
            self.buf.len()
        }
    }

    impl NorFlash for FlashStub {
        const WRITE_SIZE: usize = 2;
        const ERASE_SIZE: usize = 64;

        fn erase(&mut self, from: u32, to: u32) -> Result<(), StubError> {
            self.buf[from as usize..to as usize].fill(ERASED);
            Ok(())
        }

        fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), StubError> {
            if self.fail_writes {
                return Err(StubError);
            }
            let offset = offset as usize;
            for (t, f) in self.buf[offset..offset + bytes.len()].iter_mut().zip(bytes) {
                *t &= *f;
            }
            Ok(())
        }
    }

    fn config(hue: u8) -> Eeconfig {
        Eeconfig {
            rgb: RgbConfig { hue, ..RGB_DEFAULT },
            ..Eeconfig::default()
        }
    }

    #[test]
    fn blank_store_is_empty() {
        let store = ConfigStore::new(FlashStub::new(), 64).unwrap();
        assert_eq!(store.load(), None);
        assert_eq!(store.used_slots(), 0);
    }

    #[test]
    fn record_fits_in_slot() {
        let cfg = Eeconfig {
            user: UserConfig(u32::MAX),
            default_layer: Layer::MacAdjust,
            rgb: RgbConfig { enabled: true, mode: Mode::RainbowSwirl, hue: 255, sat: 255, val: 255 },
        };
        assert!(ConfigStore::<FlashStub>::encode(&cfg).is_ok());
    }

    #[test]
    fn newest_record_survives_reopen() {
        let mut store = ConfigStore::new(FlashStub::new(), 64).unwrap();
        assert!(store.save(&config(1)).unwrap());
        assert!(store.save(&config(2)).unwrap());
        let store = ConfigStore::new(store.release(), 64).unwrap();
        assert_eq!(store.load(), Some(config(2)));
        assert_eq!(store.used_slots(), 2);
    }

    #[test]
    fn unchanged_config_not_written() {
        let mut store = ConfigStore::new(FlashStub::new(), 0).unwrap();
        assert!(store.save(&config(1)).unwrap());
        assert!(!store.save(&config(1)).unwrap());
        assert_eq!(store.used_slots(), 1);
    }

    #[test]
    fn full_page_is_erased() {
        let mut store = ConfigStore::new(FlashStub::new(), 64).unwrap();
        for hue in 0..4 {
            store.save(&config(hue)).unwrap();
        }
        assert_eq!(store.used_slots(), 4);
        store.save(&config(10)).unwrap();
        assert_eq!(store.used_slots(), 1);
        let flash = store.release();
        // other page untouched
        assert!(flash.buf[..64].iter().all(|b| *b == ERASED));
        let store = ConfigStore::new(flash, 64).unwrap();
        assert_eq!(store.load(), Some(config(10)));
    }

    #[test]
    fn corrupted_record_skipped() {
        let mut store = ConfigStore::new(FlashStub::new(), 0).unwrap();
        store.save(&config(1)).unwrap();
        store.save(&config(2)).unwrap();
        let mut flash = store.release();
        // flip payload bits in the newest record
        flash.buf[SLOT_SIZE + 2] ^= 0x0f;
        let mut store = ConfigStore::new(flash, 0).unwrap();
        assert_eq!(store.load(), Some(config(1)));
        // corrupted slot is not reused
        store.save(&config(3)).unwrap();
        assert_eq!(store.used_slots(), 3);
    }

    #[test]
    fn flash_errors_reported() {
        let mut flash = FlashStub::new();
        flash.fail_writes = true;
        let mut store = ConfigStore::new(flash, 0).unwrap();
        assert_eq!(store.save(&config(1)), Err(StorageError::Flash));
        assert_eq!(store.load(), None);
    }
}

use bitfield::bitfield;
use serde::{Deserialize, Serialize};

use super::layers::Os;

bitfield! {
    /// User preferences persisted in the configuration store
    #[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct UserConfig(pub u32);
    impl Debug;
    /// Show layer feedback on the underglow
    pub info_mode, set_info_mode: 0;
    /// Host is running Linux (else macOS)
    pub linux_mode, set_linux_mode: 1;
}

impl Default for UserConfig {
    /// Value written when the store is reset: Linux mode only
    fn default() -> Self {
        let mut config = UserConfig(0);
        config.set_linux_mode(true);
        config.set_info_mode(cfg!(feature = "info-mode-default"));
        config
    }
}

impl UserConfig {
    pub fn os(&self) -> Os {
        if self.linux_mode() {
            Os::Linux
        } else {
            Os::MacOs
        }
    }

    pub fn set_os(&mut self, os: Os) {
        self.set_linux_mode(os == Os::Linux);
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for UserConfig {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "UserConfig(info_mode={=bool}, linux_mode={=bool})",
            self.info_mode(), self.linux_mode());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_layout() {
        let mut config = UserConfig(0);
        config.set_info_mode(true);
        assert_eq!(config.0, 0b01);
        config.set_info_mode(false);
        config.set_linux_mode(true);
        assert_eq!(config.0, 0b10);
        assert!(UserConfig(0b11).info_mode());
        assert!(UserConfig(0b11).linux_mode());
    }

    #[test]
    #[cfg(not(feature = "info-mode-default"))]
    fn default_is_linux_mode_only() {
        assert_eq!(UserConfig::default().0, 0b10);
    }

    #[test]
    fn os_mapping() {
        let mut config = UserConfig::default();
        assert_eq!(config.os(), Os::Linux);
        config.set_os(Os::MacOs);
        assert!(!config.linux_mode());
        assert_eq!(config.os(), Os::MacOs);
        config.set_os(Os::Linux);
        assert!(config.linux_mode());
    }

    #[test]
    fn unknown_bits_preserved() {
        let mut config = UserConfig(0xf0);
        config.set_linux_mode(true);
        assert_eq!(config.0, 0xf2);
    }
}

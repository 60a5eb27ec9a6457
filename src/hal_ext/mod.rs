//! Hardware Abstraction Layer
//!
//! This module is an extension to `stm32f0xx_hal` that covers some more
//! project-specific hardware: DMA transfers, flash programming and rebooting.
//! Register-level parts are only built for the target, so that the hardware
//! independent logic can be tested on the host.

pub mod dma;
#[cfg(target_os = "none")]
pub mod flash;
#[cfg(target_os = "none")]
pub mod reboot;
pub mod spi;

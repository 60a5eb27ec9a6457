#![no_std]

// Use std when running tests, see: https://stackoverflow.com/a/28186509
// Make sure to use different target when testing, e.g.
//   cargo test --target x86_64-unknown-linux-gnu
#[cfg(test)]
#[macro_use]
extern crate std;

#[cfg(target_os = "none")]
use stm32f0xx_hal as hal;

mod macros;

pub mod bsp;
pub mod config;
pub mod hal_ext;
pub mod keyboard;
pub mod storage;
pub mod utils;

/// Build metadata
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

//! DMA channel access
//!
//! stm32f0xx-hal has no DMA support, so channels are driven directly through PAC registers.
//! Transmitters built on top of a channel implement [`DmaTx`].

/// New data cannot be pushed while the previous transfer is in progress
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransferOngoing;

/// DMA reported a transfer error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransferError;

/// Interrupt to wait for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interrupt {
    HalfTransfer,
    FullTransfer,
}

/// Outcome of handling a DMA interrupt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InterruptResult {
    /// The awaited interrupt flag is not set
    NotSet,
    /// Transfer finished (or failed)
    Done(Result<(), TransferError>),
}

impl InterruptResult {
    pub fn as_option(self) -> Option<Result<(), TransferError>> {
        match self {
            InterruptResult::NotSet => None,
            InterruptResult::Done(result) => Some(result),
        }
    }
}

/// Interrupt flags of a single channel (bits of DMA_ISR shifted to channel 1 position)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InterruptStatus(u8);

impl InterruptStatus {
    /// GIFx flag
    pub fn any(&self) -> bool {
        (self.0 & 0b0001) != 0
    }

    /// TCIFx flag
    pub fn complete(&self) -> bool {
        (self.0 & 0b0010) != 0
    }

    /// HTIFx flag
    pub fn half_complete(&self) -> bool {
        (self.0 & 0b0100) != 0
    }

    /// TEIFx flag
    pub fn error(&self) -> bool {
        (self.0 & 0b1000) != 0
    }

    /// Decide the outcome for the awaited interrupt; errors take precedence
    pub fn result(&self, interrupt: Interrupt) -> InterruptResult {
        if !self.any() {
            return InterruptResult::NotSet;
        }
        if self.error() {
            return InterruptResult::Done(Err(TransferError));
        }
        let done = match interrupt {
            Interrupt::HalfTransfer => self.half_complete(),
            Interrupt::FullTransfer => self.complete(),
        };
        if done {
            InterruptResult::Done(Ok(()))
        } else {
            InterruptResult::NotSet
        }
    }
}

/// Transmitter that sends data from its own buffer using DMA
///
/// Data is written to the buffer only between transfers, so a transfer in progress is never
/// disturbed by the CPU.
pub trait DmaTx {
    /// Size of the transmit buffer
    fn capacity(&self) -> usize;

    /// No transfer is in progress
    fn is_ready(&self) -> bool;

    /// Fill the buffer using `writer`, which returns the number of bytes to send
    fn push<F: FnOnce(&mut [u8]) -> usize>(&mut self, writer: F) -> Result<(), TransferOngoing>;

    /// Start sending the pushed data
    fn start(&mut self) -> nb::Result<(), TransferOngoing>;

    /// Handle DMA interrupt, to be called from the channel's interrupt handler
    fn on_interrupt(&mut self) -> InterruptResult;
}

#[cfg(target_os = "none")]
pub use channels::*;

#[cfg(target_os = "none")]
mod channels {
    use super::{Interrupt, InterruptResult, InterruptStatus};
    use crate::hal;

    /// Extension trait to split DMA into separate channels
    pub trait DmaSplit {
        /// Structure holding DMA channels
        type Channels;

        /// Split DMA into independent channels
        fn split(self, rcc: &mut hal::rcc::Rcc) -> Self::Channels;
    }

    pub struct DmaChannel<const C: u8>;

    pub struct InterruptClear(u8);

    pub struct Dma {
        pub ch1: DmaChannel<1>,
        pub ch2: DmaChannel<2>,
        pub ch3: DmaChannel<3>,
        pub ch4: DmaChannel<4>,
        pub ch5: DmaChannel<5>,
        pub ch6: DmaChannel<6>,
        pub ch7: DmaChannel<7>,
    }

    impl DmaSplit for hal::pac::DMA1 {
        type Channels = Dma;

        fn split(self, _rcc: &mut hal::rcc::Rcc) -> Self::Channels {
            // Rcc does not expose its registers
            let rcc_regs = unsafe { &*hal::pac::RCC::ptr() };
            rcc_regs.ahbenr.modify(|_, w| w.dmaen().enabled());

            Dma {
                ch1: DmaChannel,
                ch2: DmaChannel,
                ch3: DmaChannel,
                ch4: DmaChannel,
                ch5: DmaChannel,
                ch6: DmaChannel,
                ch7: DmaChannel,
            }
        }
    }

    macro_rules! dma_channels {
        ($($C:literal => $ch:ident),+ $(,)?) => {
            $(
                impl DmaChannel<$C> {
                    // Safety: each channel exists only once (split consumes DMA1) and takes &mut
                    pub fn ch(&mut self) -> &hal::pac::dma1::CH {
                        unsafe { &(*hal::pac::DMA1::ptr()).$ch }
                    }

                    const OFFSET: usize = 4 * ($C - 1);
                    const MASK: u32 = 0b1111;

                    pub fn isr(&self) -> InterruptStatus {
                        let dma = unsafe { &*hal::pac::DMA1::ptr() };
                        InterruptStatus(((dma.isr.read().bits() >> Self::OFFSET) & Self::MASK) as u8)
                    }

                    pub fn ifcr<F>(&mut self, f: F)
                    where
                        F: FnOnce(&mut InterruptClear) -> &mut InterruptClear
                    {
                        let dma = unsafe { &*hal::pac::DMA1::ptr() };
                        let mut ifcr = InterruptClear(0);
                        let ifcr = f(&mut ifcr);
                        let mask = (ifcr.0 as u32 & Self::MASK) << Self::OFFSET;
                        unsafe { dma.ifcr.write(|w| w.bits(mask)); }
                    }

                    /// Check the awaited interrupt and clear channel flags when it is done
                    pub fn handle_interrupt(&mut self, interrupt: Interrupt) -> InterruptResult {
                        let result = self.isr().result(interrupt);
                        if let InterruptResult::Done(_) = result {
                            // clearing GIFx clears all flags of the channel
                            self.ifcr(|w| w.all());
                        }
                        result
                    }
                }
            )+
        }
    }

    dma_channels!(
        1 => ch1,
        2 => ch2,
        3 => ch3,
        4 => ch4,
        5 => ch5,
        6 => ch6,
        7 => ch7,
    );

    impl InterruptClear {
        pub fn all(&mut self) -> &mut Self {
            self.0 |= 0b0001;
            self
        }

        pub fn complete(&mut self) -> &mut Self {
            self.0 |= 0b0010;
            self
        }

        pub fn half_complete(&mut self) -> &mut Self {
            self.0 |= 0b0100;
            self
        }

        pub fn error(&mut self) -> &mut Self {
            self.0 |= 0b1000;
            self
        }
    }
}

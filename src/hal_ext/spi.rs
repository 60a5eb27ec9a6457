//! Transmit-only SPI driven by DMA

/// Requested SPI frequency cannot be derived from the peripheral clock
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UnreachableFrequency;

/// Baud rate control bits (SPI_CR1.BR) for exactly `freq` from `pclk`
pub const fn baudrate_divisor(pclk: u32, freq: u32) -> Result<u8, UnreachableFrequency> {
    if freq == 0 || pclk % freq != 0 {
        return Err(UnreachableFrequency);
    }
    match pclk / freq {
        2 => Ok(0b000),
        4 => Ok(0b001),
        8 => Ok(0b010),
        16 => Ok(0b011),
        32 => Ok(0b100),
        64 => Ok(0b101),
        128 => Ok(0b110),
        256 => Ok(0b111),
        _ => Err(UnreachableFrequency),
    }
}

#[cfg(target_os = "none")]
pub use tx::SpiTx;

#[cfg(target_os = "none")]
mod tx {
    use core::{convert::Infallible, sync::atomic};
    use embedded_dma::ReadBuffer;

    use super::{baudrate_divisor, UnreachableFrequency};
    use crate::hal;
    use crate::hal_ext::dma::{self, DmaTx, TransferOngoing};
    use crate::utils::InfallibleResult;

    /// SPI2 TX request is mapped to channel 5
    type DmaChannel = dma::DmaChannel<5>;

    /// TX only, asynchronous SPI
    ///
    /// Uses SPI2 to just send data from a static buffer. MISO/SCK pins are not used.
    pub struct SpiTx {
        spi: hal::pac::SPI2,
        dma: DmaChannel,
        buf: &'static mut [u8],
        len: usize,
        ready: bool,
    }

    impl SpiTx {
        /// Initialize SPI with only the MOSI pin being used
        pub fn new<MOSIPIN, F>(
            spi: hal::pac::SPI2,
            _mosi: MOSIPIN,
            dma: DmaChannel,
            buf: &'static mut [u8],
            freq: F,
            rcc: &mut hal::rcc::Rcc,
        ) -> Result<Self, UnreachableFrequency>
        where
            MOSIPIN: hal::spi::MosiPin<hal::pac::SPI2>,
            F: Into<hal::time::Hertz>
        {
            let br = baudrate_divisor(rcc.clocks.pclk().0, freq.into().0)?;

            // Rcc does not expose its registers
            let rcc_regs = unsafe { &*hal::pac::RCC::ptr() };

            // Enable SPI clock & reset it
            rcc_regs.apb1enr.modify(|_, w| w.spi2en().enabled());
            rcc_regs.apb1rstr.modify(|_, w| w.spi2rst().set_bit());
            rcc_regs.apb1rstr.modify(|_, w| w.spi2rst().clear_bit());

            let mut s = Self { spi, dma, buf, len: 0, ready: true };

            s.spi.cr1.modify(|_, w| w.spe().disabled());
            s.dma.ch().cr.modify(|_, w| w.en().disabled());

            // CPHA/CPOL do not matter, there is no clock line
            s.spi.cr1.write(|w|  {
                w
                    .br().bits(br)
                    .lsbfirst().msbfirst()
                    .crcen().disabled()
                    .mstr().master()
                    // software slave management, must be "not selected" or nothing is sent
                    .ssm().enabled()
                    .ssi().slave_not_selected()
                    // transmit-only using half-duplex settings
                    .bidimode().bidirectional()
                    .bidioe().output_enabled()
                    .rxonly().full_duplex()
            });

            s.spi.cr2.write(|w| {
                w
                    .ssoe().disabled()
                    .ds().eight_bit()
                    .ldma_tx().even()
                    .txdmaen().disabled()  // enabled to trigger a transfer
            });

            s.dma.ch().cr.write(|w| {
                w
                    .dir().from_memory()
                    .mem2mem().disabled()
                    .circ().disabled()
                    .minc().enabled()
                    .pinc().disabled()
                    .msize().bits8()
                    .psize().bits8()
                    .pl().high()
                    .htie().disabled()
                    .teie().enabled()
                    .tcie().enabled()
            });

            s.spi.cr1.modify(|_, w| w.spe().enabled());

            Ok(s)
        }

        /// Wait until all data has been shifted out
        fn wait_spi(&self) -> nb::Result<(), Infallible> {
            let sr = self.spi.sr.read();
            if !sr.ftlvl().is_empty() || sr.bsy().is_busy() {
                Err(nb::Error::WouldBlock)
            } else {
                Ok(())
            }
        }
    }

    impl DmaTx for SpiTx {
        fn capacity(&self) -> usize {
            let (_, len) = unsafe { self.buf.read_buffer() };
            len
        }

        fn is_ready(&self) -> bool {
            self.ready
        }

        fn push<F: FnOnce(&mut [u8]) -> usize>(&mut self, writer: F) -> Result<(), TransferOngoing> {
            if !self.is_ready() {
                return Err(TransferOngoing);
            }
            self.len = writer(self.buf).min(self.capacity());
            Ok(())
        }

        fn start(&mut self) -> nb::Result<(), TransferOngoing> {
            if !self.is_ready() {
                return Err(nb::Error::Other(TransferOngoing));
            }

            // Data from the previous transfer may still be in the FIFO
            self.wait_spi().map_err(|e| match e {
                nb::Error::WouldBlock => nb::Error::WouldBlock,
                nb::Error::Other(e) => Err(e).infallible(),
            })?;

            if self.len == 0 {
                return Ok(());
            }

            self.ready = false;

            // "Preceding reads and writes cannot be moved past subsequent writes"
            atomic::compiler_fence(atomic::Ordering::Release);

            let (src, _) = unsafe { self.buf.read_buffer() };
            let dst = self.spi.dr.as_ptr() as u32;
            let len = self.len as u16;
            self.dma.ch().mar.write(|w| unsafe { w.ma().bits(src as u32) });
            self.dma.ch().par.write(|w| unsafe { w.pa().bits(dst) });
            self.dma.ch().ndtr.write(|w| w.ndt().bits(len));

            // Enable channel, then trigger DMA request
            self.dma.ch().cr.modify(|_, w| w.en().enabled());
            self.spi.cr2.modify(|_, w| w.txdmaen().enabled());

            Ok(())
        }

        fn on_interrupt(&mut self) -> dma::InterruptResult {
            let res = self.dma.handle_interrupt(dma::Interrupt::FullTransfer);
            if res.as_option().is_some() {
                // Disable DMA request and channel
                self.spi.cr2.modify(|_, w| w.txdmaen().disabled());
                self.dma.ch().cr.modify(|_, w| w.en().disabled());

                // "Subsequent reads and writes cannot be moved ahead of preceding reads"
                atomic::compiler_fence(atomic::Ordering::Acquire);

                // the channel is stopped on errors too, so the buffer is free again
                self.ready = true;
            }
            res
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baudrate_exact() {
        assert_eq!(baudrate_divisor(48_000_000, 3_000_000), Ok(0b011)); // fPCLK/16
        assert_eq!(baudrate_divisor(48_000_000, 1_500_000), Ok(0b100)); // fPCLK/32
        assert_eq!(baudrate_divisor(24_000_000, 3_000_000), Ok(0b010)); // fPCLK/8
        assert_eq!(baudrate_divisor(24_000_000, 12_000_000), Ok(0b000)); // fPCLK/2
    }

    #[test]
    fn baudrate_divider_not_available() {
        assert_eq!(baudrate_divisor(48_000_000, 2_000_000), Err(UnreachableFrequency));
        assert_eq!(baudrate_divisor(48_000_000, 48_000_000), Err(UnreachableFrequency));
    }

    #[test]
    fn baudrate_unreachable() {
        assert_eq!(baudrate_divisor(48_000_000, 3_500_000), Err(UnreachableFrequency));
        assert_eq!(baudrate_divisor(48_000_000, 0), Err(UnreachableFrequency));
    }
}

use rgb::RGB8;
use static_assertions as sa;

use crate::hal_ext::dma::{DmaTx, TransferOngoing};

/// Assumed SPI frequency: 3 MHz; Bit time: 333 ns
pub const SPI_FREQ: usize = 3_000_000;
const T0H_BITS: usize = 1;  // 333 ns (vs 220-380 ns)
const T0L_BITS: usize = 3;  // 1000 ns (vs 580-1000 ns)
const T1H_BITS: usize = 2;  // 666 ns (vs 580-1000 ns)
const T1L_BITS: usize = 2;  // 666 ns (vs 580-1000 ns)
const RESET_US: usize = 280;

// Same bit count for 0 and 1, so serialized data can be indexed
sa::const_assert_eq!(T0L_BITS + T0H_BITS, T1L_BITS + T1H_BITS);
const SERIAL_BITS: usize = T0L_BITS + T0H_BITS;

// Data for each LED with 3x8=24-bit RGB color, with each bit serialized as X bits.
const RGB_BITS: usize = 3 * 8;
const fn led_bits(leds_count: usize) -> usize {
    leds_count * RGB_BITS * SERIAL_BITS
}

// Data line is held low before the first LED bit
const RESET_BITS: usize = RESET_US * (SPI_FREQ / 1_000_000);

const fn all_bits(leds_count: usize) -> usize {
    RESET_BITS + led_bits(leds_count) + RESET_BITS
}

const fn bytes_for_bits(bits: usize) -> usize {
    (bits + 7) / 8
}

const SERIAL_SIZE: usize = bytes_for_bits(SERIAL_BITS);

/// RGB LED colors for the whole strip
///
/// Provides methods to serialize RGB data into format suitable for transmission
/// via SPI configured with frequency of [`SPI_FREQ`].
pub struct Leds<const N: usize> {
    pub leds: [RGB8; N],
}

impl<const N: usize> Leds<N> {
    /// Size of buffer needed for serialized LED data
    pub const BUFFER_SIZE: usize = bytes_for_bits(all_bits(N));

    /// Intialize with all LEDs disabled (black)
    pub const fn new() -> Self {
        Self {
            leds: [RGB8::new(0, 0, 0); N],
        }
    }

    const fn serial_bits(high_bits: usize) -> [u8; SERIAL_SIZE] {
        let mut arr = [0; SERIAL_SIZE];
        let mut i = 0;
        while i < high_bits {
            let bit = 7 - i % 8;  // msb first
            arr[i / 8] |= 1 << bit;
            i += 1;
        }
        arr
    }

    const ONE: [u8; SERIAL_SIZE] = Self::serial_bits(T1H_BITS);
    const ZERO: [u8; SERIAL_SIZE] = Self::serial_bits(T0H_BITS);

    const fn serial_mask(bit_value: bool, first_half: bool) -> u8 {
        // Two LED bits per byte
        sa::const_assert_eq!(SERIAL_BITS, 4);
        match (bit_value, first_half) {
            (false, true)  => Self::ZERO[0],
            (false, false) => Self::ZERO[0] >> 4,
            (true,  true)  => Self::ONE[0],
            (true,  false) => Self::ONE[0] >> 4,
        }
    }

    fn serialize_colors(colors: &[RGB8], buf: &mut [u8]) {
        let bit_msb = |byte: u8, i: usize| (byte & (1 << (7 - i))) != 0;
        let mut bytes = buf.iter_mut();
        for rgb in colors {
            // WS2812 expects GRB order
            for c in [rgb.g, rgb.r, rgb.b] {
                for j in 0..4 {
                    let n1 = Self::serial_mask(bit_msb(c, 2*j), true);
                    let n2 = Self::serial_mask(bit_msb(c, 2*j + 1), false);
                    if let Some(b) = bytes.next() {
                        *b = n1 | n2;
                    }
                }
            }
        }
    }

    /// Serialize all RGB values to given buffer, returns number of bytes used
    ///
    /// Only the first [`Self::BUFFER_SIZE`] bytes are used, the data is truncated if the buffer
    /// is shorter.
    pub fn serialize_to_slice(&self, buf: &mut [u8]) -> usize {
        let len = Self::BUFFER_SIZE.min(buf.len());
        let buf = &mut buf[..len];
        buf.fill(0);
        let start = (RESET_BITS / 8).min(len);
        Self::serialize_colors(&self.leds, &mut buf[start..]);
        len
    }

    /// Set LED color with gamma correction applied
    pub fn set_gamma_corrected(&mut self, led: usize, color: &RGB8) {
        if let Some(c) = self.leds.get_mut(led) {
            *c = smart_leds::gamma(core::iter::once(*color))
                .next()
                .unwrap_or(*color);
        }
    }

    /// Serialize colors into the transmitter buffer and start sending them
    ///
    /// Fails with [`TransferOngoing`] while the previous frame is still being sent, the frame in
    /// progress is left untouched.
    pub fn send<T: DmaTx>(&self, tx: &mut T) -> nb::Result<(), TransferOngoing> {
        tx.push(|buf| self.serialize_to_slice(buf))?;
        tx.start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal_ext::dma::InterruptResult;
    use std::vec::Vec;

    #[test]
    fn const_led_bits() {
        assert_eq!(led_bits(14), 1344);
    }

    #[test]
    fn const_buf_size() {
        // bits: 840 + 1344 + 840 = 3024
        assert_eq!(Leds::<14>::BUFFER_SIZE, 378);
    }

    #[test]
    fn serialize_one() {
        let leds = [RGB8::new(0xff, 0xaa, 0x31)];
        let mut buf = [0u8; 3 * 8 / 2];
        Leds::<14>::serialize_colors(&leds, &mut buf);
        let expected = [
            // green: 0xaa = 0b10101010
            0b1100_1000, 0b1100_1000, 0b1100_1000, 0b1100_1000,
            // red: 0xff = 0b11111111
            0b1100_1100, 0b1100_1100, 0b1100_1100, 0b1100_1100,
            // blue: 0x31 = 0b00110001
            0b1000_1000, 0b1100_1100, 0b1000_1000, 0b1000_1100,
        ];
        assert_eq!(buf, expected, "\n  {:02x?}\n  vs\n  {:02x?}\n", buf, expected);
    }

    #[test]
    fn serialize_with_reset_period() {
        let mut leds = Leds::<2>::new();
        leds.leds[1] = RGB8::new(0, 0xff, 0);
        let mut buf = [0xffu8; Leds::<2>::BUFFER_SIZE];
        assert_eq!(leds.serialize_to_slice(&mut buf), Leds::<2>::BUFFER_SIZE);
        let start = RESET_BITS / 8;
        assert!(buf[..start].iter().all(|b| *b == 0));
        // first LED black
        assert!(buf[start..start + 12].iter().all(|b| *b == 0b1000_1000));
        // second LED green
        assert!(buf[start + 12..start + 16].iter().all(|b| *b == 0b1100_1100));
        assert!(buf[start + 24..].iter().all(|b| *b == 0));
    }

    #[test]
    fn gamma_corrected() {
        let mut leds = Leds::<2>::new();
        leds.set_gamma_corrected(0, &RGB8::new(255, 128, 0));
        assert_eq!(leds.leds[0], RGB8::new(255, 37, 0));
        // out of range ignored
        leds.set_gamma_corrected(5, &RGB8::new(1, 2, 3));
    }

    /// Transmitter that "sends" the buffer when the transfer completes
    struct MockDmaTx {
        buf: [u8; Leds::<2>::BUFFER_SIZE],
        len: usize,
        busy: bool,
        sent: Vec<Vec<u8>>,
    }

    impl MockDmaTx {
        fn new() -> Self {
            Self { buf: [0; Leds::<2>::BUFFER_SIZE], len: 0, busy: false, sent: Vec::new() }
        }

        fn complete(&mut self) {
            self.on_interrupt();
        }
    }

    impl DmaTx for MockDmaTx {
        fn capacity(&self) -> usize {
            self.buf.len()
        }

        fn is_ready(&self) -> bool {
            !self.busy
        }

        fn push<F: FnOnce(&mut [u8]) -> usize>(&mut self, writer: F) -> Result<(), TransferOngoing> {
            if self.busy {
                return Err(TransferOngoing);
            }
            self.len = writer(&mut self.buf);
            Ok(())
        }

        fn start(&mut self) -> nb::Result<(), TransferOngoing> {
            if self.busy {
                return Err(nb::Error::Other(TransferOngoing));
            }
            self.busy = true;
            Ok(())
        }

        fn on_interrupt(&mut self) -> InterruptResult {
            if !self.busy {
                return InterruptResult::NotSet;
            }
            self.busy = false;
            self.sent.push(self.buf[..self.len].to_vec());
            InterruptResult::Done(Ok(()))
        }
    }

    fn serialized(leds: &Leds<2>) -> Vec<u8> {
        let mut buf = [0u8; Leds::<2>::BUFFER_SIZE];
        let len = leds.serialize_to_slice(&mut buf);
        buf[..len].to_vec()
    }

    #[test]
    fn send_whole_frame() {
        let mut leds = Leds::<2>::new();
        leds.leds[0] = RGB8::new(1, 2, 3);
        let mut tx = MockDmaTx::new();
        leds.send(&mut tx).unwrap();
        tx.complete();
        assert_eq!(tx.sent, [serialized(&leds)]);
    }

    #[test]
    fn frame_in_progress_not_overwritten() {
        let mut leds = Leds::<2>::new();
        leds.leds[0] = RGB8::new(0xff, 0, 0);
        let first = serialized(&leds);
        let mut tx = MockDmaTx::new();
        leds.send(&mut tx).unwrap();

        // next frame arrives before the transfer completes
        leds.leds[0] = RGB8::new(0, 0, 0xff);
        assert_eq!(leds.send(&mut tx), Err(nb::Error::Other(TransferOngoing)));
        tx.complete();
        assert_eq!(tx.sent, [first.clone()]);

        // sent on the following attempt
        leds.send(&mut tx).unwrap();
        tx.complete();
        assert_eq!(tx.sent, [first, serialized(&leds)]);
    }
}

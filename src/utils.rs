use core::convert::Infallible;

/// Helper trait to resolve Infallible Results
pub trait InfallibleResult<T> {
    fn infallible(self) -> T;
}

impl<T> InfallibleResult<T> for Result<T, Infallible> {
    fn infallible(self) -> T {
        match self {
            Ok(v) => v,
            Err(e) => match e {},
        }
    }
}

/// Direction of a stepwise setting change
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Inc {
    Up,
    Down,
}

impl Inc {
    /// Step `value` by `step`, saturating at the `u8` bounds
    pub fn saturating_step(self, value: u8, step: u8) -> u8 {
        match self {
            Inc::Up => value.saturating_add(step),
            Inc::Down => value.saturating_sub(step),
        }
    }

    /// Step `value` by `step`, wrapping around (used for hue)
    pub fn wrapping_step(self, value: u8, step: u8) -> u8 {
        match self {
            Inc::Up => value.wrapping_add(step),
            Inc::Down => value.wrapping_sub(step),
        }
    }
}

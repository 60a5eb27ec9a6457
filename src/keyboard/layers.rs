use bitfield::{Bit, BitMut};
use serde::{Deserialize, Serialize};

/// Number of keymap layers
pub const N_LAYERS: usize = 8;

/// Keymap layers
///
/// The first four are used with Linux hosts, the other four with macOS hosts.
/// Each OS has the same set of levels in the same order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Layer {
    LinuxBase = 0,
    LinuxLower,
    LinuxRaise,
    LinuxAdjust,
    MacBase,
    MacLower,
    MacRaise,
    MacAdjust,
}

/// Host operating system the layout is tailored for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Os {
    Linux,
    MacOs,
}

/// Position of a layer within the layers of a single OS
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    Base,
    Lower,
    Raise,
    Adjust,
}

/// Layers taking part in the tri-layer rule: `adjust` is on iff `lower` and `raise` are on
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TriLayer {
    pub lower: Layer,
    pub raise: Layer,
    pub adjust: Layer,
}

impl Layer {
    pub const ALL: [Layer; N_LAYERS] = [
        Layer::LinuxBase,
        Layer::LinuxLower,
        Layer::LinuxRaise,
        Layer::LinuxAdjust,
        Layer::MacBase,
        Layer::MacLower,
        Layer::MacRaise,
        Layer::MacAdjust,
    ];

    pub const fn new(os: Os, level: Level) -> Self {
        match (os, level) {
            (Os::Linux, Level::Base) => Layer::LinuxBase,
            (Os::Linux, Level::Lower) => Layer::LinuxLower,
            (Os::Linux, Level::Raise) => Layer::LinuxRaise,
            (Os::Linux, Level::Adjust) => Layer::LinuxAdjust,
            (Os::MacOs, Level::Base) => Layer::MacBase,
            (Os::MacOs, Level::Lower) => Layer::MacLower,
            (Os::MacOs, Level::Raise) => Layer::MacRaise,
            (Os::MacOs, Level::Adjust) => Layer::MacAdjust,
        }
    }

    /// Layer with given index, if there is such a layer
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn os(self) -> Os {
        if (self as u8) < Layer::MacBase as u8 {
            Os::Linux
        } else {
            Os::MacOs
        }
    }

    pub const fn level(self) -> Level {
        match self as u8 % 4 {
            0 => Level::Base,
            1 => Level::Lower,
            2 => Level::Raise,
            _ => Level::Adjust,
        }
    }

    /// Tri-layer triple for lower/raise layers
    ///
    /// Momentary lower/raise keys re-evaluate the tri-layer rule of their OS.
    /// Adjust and base layers are not part of any rule as a trigger.
    pub const fn tri_layer(self) -> Option<TriLayer> {
        match self.level() {
            Level::Lower | Level::Raise => {
                let os = self.os();
                Some(TriLayer {
                    lower: Layer::new(os, Level::Lower),
                    raise: Layer::new(os, Level::Raise),
                    adjust: Layer::new(os, Level::Adjust),
                })
            },
            Level::Base | Level::Adjust => None,
        }
    }
}

impl Os {
    /// Default (base) layer for this OS
    pub const fn base(self) -> Layer {
        Layer::new(self, Level::Base)
    }
}

/// Bit mask of active layers, bit `n` corresponds to layer with index `n`
#[derive(Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(test, derive(Debug))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LayerState(pub u32);

impl LayerState {
    pub const EMPTY: Self = Self(0);

    /// State with only the given layer active
    pub const fn single(layer: Layer) -> Self {
        Self(1 << layer as u32)
    }

    pub fn is_on(&self, layer: Layer) -> bool {
        self.0.bit(layer.index())
    }

    pub fn on(&mut self, layer: Layer) {
        self.0.set_bit(layer.index(), true);
    }

    pub fn off(&mut self, layer: Layer) {
        self.0.set_bit(layer.index(), false);
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Index of the highest active layer, 0 if no layer is active
    pub fn highest_index(&self) -> usize {
        match self.0 {
            0 => 0,
            bits => 31 - bits.leading_zeros() as usize,
        }
    }

    /// Highest active layer, base Linux layer if none is active
    pub fn highest(&self) -> Layer {
        Layer::from_index(self.highest_index()).unwrap_or(Layer::LinuxBase)
    }

    /// Apply the tri-layer rule
    pub fn update_tri_layer(&mut self, tri: TriLayer) {
        let both = self.is_on(tri.lower) && self.is_on(tri.raise);
        self.0.set_bit(tri.adjust.index(), both);
    }

    /// Iterate over active layers from the highest to the lowest one
    pub fn iter_rev(&self) -> impl Iterator<Item = Layer> + '_ {
        Layer::ALL.iter().rev().copied().filter(|l| self.is_on(*l))
    }
}

impl core::ops::BitOr for LayerState {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    #[test]
    fn layer_os_and_level_roundtrip() {
        for layer in Layer::ALL {
            assert_eq!(Layer::new(layer.os(), layer.level()), layer);
        }
        assert_eq!(Layer::MacRaise.os(), Os::MacOs);
        assert_eq!(Layer::MacRaise.level(), Level::Raise);
        assert_eq!(Layer::LinuxAdjust.level(), Level::Adjust);
        assert_eq!(Os::MacOs.base(), Layer::MacBase);
    }

    #[test]
    fn highest_of_empty_is_base() {
        let state = LayerState::EMPTY;
        assert_eq!(state.highest_index(), 0);
        assert_eq!(state.highest(), Layer::LinuxBase);
    }

    #[test]
    fn highest_picks_top_bit() {
        let mut state = LayerState::EMPTY;
        state.on(Layer::LinuxLower);
        state.on(Layer::MacRaise);
        assert_eq!(state.highest(), Layer::MacRaise);
        state.off(Layer::MacRaise);
        assert_eq!(state.highest(), Layer::LinuxLower);
    }

    #[test]
    fn tri_layer_only_for_lower_and_raise() {
        assert_eq!(Layer::MacLower.tri_layer(), Some(TriLayer {
            lower: Layer::MacLower,
            raise: Layer::MacRaise,
            adjust: Layer::MacAdjust,
        }));
        assert_eq!(Layer::LinuxRaise.tri_layer().map(|t| t.adjust), Some(Layer::LinuxAdjust));
        assert_eq!(Layer::LinuxAdjust.tri_layer(), None);
        assert_eq!(Layer::MacBase.tri_layer(), None);
    }

    #[test]
    fn tri_layer_sets_and_clears_adjust() {
        let tri = Layer::LinuxLower.tri_layer().unwrap();
        let mut state = LayerState::EMPTY;

        state.on(Layer::LinuxLower);
        state.update_tri_layer(tri);
        assert!(!state.is_on(Layer::LinuxAdjust));

        state.on(Layer::LinuxRaise);
        state.update_tri_layer(tri);
        assert!(state.is_on(Layer::LinuxAdjust));
        assert_eq!(state.highest(), Layer::LinuxAdjust);

        state.off(Layer::LinuxLower);
        state.update_tri_layer(tri);
        assert!(!state.is_on(Layer::LinuxAdjust));
        assert_eq!(state.highest(), Layer::LinuxRaise);
    }

    #[test]
    fn tri_layer_clears_directly_held_adjust() {
        let tri = Layer::MacLower.tri_layer().unwrap();
        let mut state = LayerState::EMPTY;
        state.on(Layer::MacAdjust);
        state.on(Layer::MacLower);
        state.update_tri_layer(tri);
        assert!(!state.is_on(Layer::MacAdjust));
    }

    #[test]
    fn iterates_from_top() {
        let state = LayerState::single(Layer::LinuxBase) | LayerState::single(Layer::MacLower);
        let layers: Vec<_> = state.iter_rev().collect();
        assert_eq!(layers, [Layer::MacLower, Layer::LinuxBase]);
    }
}

//! Dense channel indices for the calorimeter readout.
//!
//! Every readout path is identified by its crystal position
//! (tower, layer, column) plus a face and either a gain range or a diode.
//! Each key type packs its tuple into a single dense integer so that
//! per-channel containers can be plain arrays ([`ChannelArray`]).
//!
//! Encoding (row-major, outermost first):
//! - `XtalIdx  = (tower * N_LYRS + layer) * N_COLS + column`
//! - `FaceIdx  = XtalIdx * N_FACES + face`
//! - `RngIdx   = FaceIdx * N_RNGS + range`
//! - `DiodeIdx = FaceIdx * N_DIODES + diode`
#![allow(clippy::cast_possible_truncation)]

use crate::{Error, Result};
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of towers in the calorimeter.
pub const N_TWRS: usize = 16;
/// Number of crystal layers per tower.
pub const N_LYRS: usize = 8;
/// Number of crystal columns per layer.
pub const N_COLS: usize = 12;
/// Number of readout faces per crystal.
pub const N_FACES: usize = 2;
/// Number of gain ranges per face.
pub const N_RNGS: usize = 4;
/// Number of photodiodes per face.
pub const N_DIODES: usize = 2;

/// Crystal readout face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum Face {
    Pos,
    Neg,
}

impl Face {
    /// All faces in index order.
    pub const ALL: [Face; N_FACES] = [Face::Pos, Face::Neg];

    /// Dense index of this face.
    #[inline]
    pub fn val(self) -> usize {
        self as usize
    }

    /// Face from its dense index.
    pub fn from_val(val: usize) -> Result<Self> {
        Self::ALL.get(val).copied().ok_or(Error::InvalidChannel {
            component: "face",
            value: val,
            limit: N_FACES,
        })
    }
}

/// Photodiode selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum Diode {
    /// Large diode (low-energy ranges).
    Lrg,
    /// Small diode (high-energy ranges).
    Sm,
}

impl Diode {
    /// All diodes in index order.
    pub const ALL: [Diode; N_DIODES] = [Diode::Lrg, Diode::Sm];

    /// Dense index of this diode.
    #[inline]
    pub fn val(self) -> usize {
        self as usize
    }
}

/// Gain range of a single readout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum Range {
    Lex8,
    Lex1,
    Hex8,
    Hex1,
}

impl Range {
    /// All ranges in index order.
    pub const ALL: [Range; N_RNGS] = [Range::Lex8, Range::Lex1, Range::Hex8, Range::Hex1];

    /// Dense index of this range.
    #[inline]
    pub fn val(self) -> usize {
        self as usize
    }

    /// Range from its dense index.
    pub fn from_val(val: usize) -> Result<Self> {
        Self::ALL.get(val).copied().ok_or(Error::InvalidChannel {
            component: "range",
            value: val,
            limit: N_RNGS,
        })
    }

    /// Photodiode feeding this range.
    #[inline]
    pub fn diode(self) -> Diode {
        match self {
            Range::Lex8 | Range::Lex1 => Diode::Lrg,
            Range::Hex8 | Range::Hex1 => Diode::Sm,
        }
    }
}

impl fmt::Display for Face {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Face::Pos => "POS",
            Face::Neg => "NEG",
        })
    }
}

impl fmt::Display for Diode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Diode::Lrg => "LRG",
            Diode::Sm => "SM",
        })
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Range::Lex8 => "LEX8",
            Range::Lex1 => "LEX1",
            Range::Hex8 => "HEX8",
            Range::Hex1 => "HEX1",
        })
    }
}

/// A key type with a fixed, dense index space.
///
/// Implementors are bijective with `0..COUNT`, which lets
/// [`ChannelArray`] store one slot per key in a flat vector.
pub trait ChannelKey: Copy + Sized {
    /// Total number of distinct keys.
    const COUNT: usize;

    /// Dense index in `0..COUNT`.
    fn index(self) -> usize;

    /// Key for a dense index, or `None` when out of range.
    fn from_index(index: usize) -> Option<Self>;

    /// Iterates over every key in index order.
    fn all() -> ChannelKeyIter<Self> {
        ChannelKeyIter {
            next: 0,
            _marker: PhantomData,
        }
    }
}

/// Iterator over all keys of a [`ChannelKey`] type.
pub struct ChannelKeyIter<K> {
    next: usize,
    _marker: PhantomData<K>,
}

impl<K: ChannelKey> Iterator for ChannelKeyIter<K> {
    type Item = K;

    fn next(&mut self) -> Option<K> {
        let key = K::from_index(self.next)?;
        self.next += 1;
        Some(key)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = K::COUNT.saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

fn check(component: &'static str, value: usize, limit: usize) -> Result<()> {
    if value < limit {
        Ok(())
    } else {
        Err(Error::InvalidChannel {
            component,
            value,
            limit,
        })
    }
}

/// Crystal index: (tower, layer, column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u16"))]
pub struct XtalIdx(u16);

impl XtalIdx {
    /// Creates a crystal index, validating each component.
    ///
    /// # Errors
    /// Returns [`Error::InvalidChannel`] if any component is out of range.
    pub fn new(tower: usize, layer: usize, column: usize) -> Result<Self> {
        check("tower", tower, N_TWRS)?;
        check("layer", layer, N_LYRS)?;
        check("column", column, N_COLS)?;
        Ok(Self(((tower * N_LYRS + layer) * N_COLS + column) as u16))
    }

    /// Tower number.
    #[inline]
    pub fn tower(self) -> usize {
        self.0 as usize / (N_LYRS * N_COLS)
    }

    /// Layer number within the tower.
    #[inline]
    pub fn layer(self) -> usize {
        (self.0 as usize / N_COLS) % N_LYRS
    }

    /// Column number within the layer.
    #[inline]
    pub fn column(self) -> usize {
        self.0 as usize % N_COLS
    }

    /// Crystal in the same tower and layer at another column.
    #[must_use]
    pub fn with_column(self, column: usize) -> Option<Self> {
        Self::new(self.tower(), self.layer(), column).ok()
    }
}

impl ChannelKey for XtalIdx {
    const COUNT: usize = N_TWRS * N_LYRS * N_COLS;

    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }

    fn from_index(index: usize) -> Option<Self> {
        (index < Self::COUNT).then(|| Self(index as u16))
    }
}

/// Crystal face index: (tower, layer, column, face).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u16"))]
pub struct FaceIdx(u16);

impl FaceIdx {
    /// Creates a face index from a crystal and face.
    #[inline]
    pub fn new(xtal: XtalIdx, face: Face) -> Self {
        Self((xtal.index() * N_FACES + face.val()) as u16)
    }

    /// Owning crystal.
    #[inline]
    pub fn xtal(self) -> XtalIdx {
        XtalIdx(self.0 / N_FACES as u16)
    }

    /// Face of the crystal.
    #[inline]
    pub fn face(self) -> Face {
        Face::ALL[self.0 as usize % N_FACES]
    }
}

impl ChannelKey for FaceIdx {
    const COUNT: usize = XtalIdx::COUNT * N_FACES;

    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }

    fn from_index(index: usize) -> Option<Self> {
        (index < Self::COUNT).then(|| Self(index as u16))
    }
}

/// ADC channel index: (tower, layer, column, face, range).
///
/// This is the key of every per-channel calibration curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u16"))]
pub struct RngIdx(u16);

impl RngIdx {
    /// Creates a channel index from a crystal, face and range.
    #[inline]
    pub fn new(xtal: XtalIdx, face: Face, range: Range) -> Self {
        Self((FaceIdx::new(xtal, face).index() * N_RNGS + range.val()) as u16)
    }

    /// Creates a channel index from raw components.
    ///
    /// # Errors
    /// Returns [`Error::InvalidChannel`] if any component is out of range.
    pub fn from_parts(
        tower: usize,
        layer: usize,
        column: usize,
        face: usize,
        range: usize,
    ) -> Result<Self> {
        let xtal = XtalIdx::new(tower, layer, column)?;
        Ok(Self::new(xtal, Face::from_val(face)?, Range::from_val(range)?))
    }

    /// Owning crystal face.
    #[inline]
    pub fn face_idx(self) -> FaceIdx {
        FaceIdx(self.0 / N_RNGS as u16)
    }

    /// Owning crystal.
    #[inline]
    pub fn xtal(self) -> XtalIdx {
        self.face_idx().xtal()
    }

    /// Face of the crystal.
    #[inline]
    pub fn face(self) -> Face {
        self.face_idx().face()
    }

    /// Gain range.
    #[inline]
    pub fn range(self) -> Range {
        Range::ALL[self.0 as usize % N_RNGS]
    }

    /// Diode channel feeding this range.
    #[inline]
    pub fn diode_idx(self) -> DiodeIdx {
        DiodeIdx::new(self.xtal(), self.face(), self.range().diode())
    }
}

impl ChannelKey for RngIdx {
    const COUNT: usize = FaceIdx::COUNT * N_RNGS;

    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }

    fn from_index(index: usize) -> Option<Self> {
        (index < Self::COUNT).then(|| Self(index as u16))
    }
}

/// Photodiode index: (tower, layer, column, face, diode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u16"))]
pub struct DiodeIdx(u16);

impl DiodeIdx {
    /// Creates a diode index from a crystal, face and diode.
    #[inline]
    pub fn new(xtal: XtalIdx, face: Face, diode: Diode) -> Self {
        Self((FaceIdx::new(xtal, face).index() * N_DIODES + diode.val()) as u16)
    }

    /// Owning crystal face.
    #[inline]
    pub fn face_idx(self) -> FaceIdx {
        FaceIdx(self.0 / N_DIODES as u16)
    }

    /// Diode selector.
    #[inline]
    pub fn diode(self) -> Diode {
        Diode::ALL[self.0 as usize % N_DIODES]
    }
}

impl ChannelKey for DiodeIdx {
    const COUNT: usize = FaceIdx::COUNT * N_DIODES;

    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }

    fn from_index(index: usize) -> Option<Self> {
        (index < Self::COUNT).then(|| Self(index as u16))
    }
}

impl fmt::Display for XtalIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}L{}C{}", self.tower(), self.layer(), self.column())
    }
}

impl fmt::Display for FaceIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.xtal(), self.face())
    }
}

impl fmt::Display for RngIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.face_idx(), self.range())
    }
}

impl fmt::Display for DiodeIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.face_idx(), self.diode())
    }
}

macro_rules! impl_try_from_u16 {
    ($($key:ident),*) => {$(
        impl TryFrom<u16> for $key {
            type Error = Error;

            fn try_from(value: u16) -> Result<Self> {
                check(stringify!($key), usize::from(value), Self::COUNT)?;
                Ok(Self(value))
            }
        }
    )*};
}

impl_try_from_u16!(XtalIdx, FaceIdx, RngIdx, DiodeIdx);

/// Flat per-channel storage indexed by a [`ChannelKey`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelArray<K, T> {
    data: Vec<T>,
    _key: PhantomData<K>,
}

impl<K: ChannelKey, T> ChannelArray<K, T> {
    /// Creates an array with every slot produced by `init`.
    pub fn from_fn(mut init: impl FnMut(K) -> T) -> Self {
        Self {
            data: K::all().map(&mut init).collect(),
            _key: PhantomData,
        }
    }

    /// Number of slots (always `K::COUNT`).
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the key space is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterates over `(key, value)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> + '_ {
        K::all().zip(self.data.iter())
    }

    /// Iterates mutably over `(key, value)` pairs in index order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (K, &mut T)> + '_ {
        K::all().zip(self.data.iter_mut())
    }

    /// Returns the backing slice.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Returns the backing slice mutably.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<K: ChannelKey, T: Default> Default for ChannelArray<K, T> {
    fn default() -> Self {
        Self::from_fn(|_| T::default())
    }
}

impl<K: ChannelKey, T> Index<K> for ChannelArray<K, T> {
    type Output = T;

    #[inline]
    fn index(&self, key: K) -> &T {
        &self.data[key.index()]
    }
}

impl<K: ChannelKey, T> IndexMut<K> for ChannelArray<K, T> {
    #[inline]
    fn index_mut(&mut self, key: K) -> &mut T {
        &mut self.data[key.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xtal_roundtrip_components() {
        let xtal = XtalIdx::new(15, 7, 11).unwrap();
        assert_eq!(xtal.tower(), 15);
        assert_eq!(xtal.layer(), 7);
        assert_eq!(xtal.column(), 11);
        assert_eq!(xtal.index(), XtalIdx::COUNT - 1);
    }

    #[test]
    fn test_invalid_components_rejected() {
        assert!(XtalIdx::new(16, 0, 0).is_err());
        assert!(XtalIdx::new(0, 8, 0).is_err());
        let err = XtalIdx::new(0, 0, 12).unwrap_err();
        assert!(err.to_string().contains("column"));
        assert!(RngIdx::from_parts(0, 0, 0, 2, 0).is_err());
        assert!(RngIdx::from_parts(0, 0, 0, 0, 4).is_err());
    }

    #[test]
    fn test_rng_idx_is_bijective() {
        for (i, rng) in RngIdx::all().enumerate() {
            assert_eq!(rng.index(), i);
            let rebuilt = RngIdx::new(rng.xtal(), rng.face(), rng.range());
            assert_eq!(rebuilt, rng);
        }
        assert_eq!(RngIdx::all().count(), 12_288);
        assert!(RngIdx::from_index(RngIdx::COUNT).is_none());
    }

    #[test]
    fn test_diode_mapping() {
        let xtal = XtalIdx::new(3, 2, 5).unwrap();
        let lex1 = RngIdx::new(xtal, Face::Neg, Range::Lex1);
        let hex8 = RngIdx::new(xtal, Face::Neg, Range::Hex8);
        assert_eq!(lex1.diode_idx().diode(), Diode::Lrg);
        assert_eq!(hex8.diode_idx().diode(), Diode::Sm);
        assert_eq!(hex8.diode_idx().face_idx(), FaceIdx::new(xtal, Face::Neg));
    }

    #[test]
    fn test_display() {
        let rng = RngIdx::from_parts(1, 2, 3, 1, 2).unwrap();
        assert_eq!(rng.to_string(), "T1L2C3NEGHEX8");
    }

    #[test]
    fn test_channel_array_indexing() {
        let mut arr: ChannelArray<FaceIdx, u32> = ChannelArray::default();
        assert_eq!(arr.len(), FaceIdx::COUNT);

        let key = FaceIdx::new(XtalIdx::new(0, 1, 2).unwrap(), Face::Pos);
        arr[key] += 7;
        assert_eq!(arr[key], 7);

        let touched: Vec<_> = arr.iter().filter(|(_, v)| **v != 0).collect();
        assert_eq!(touched.len(), 1);
        assert_eq!(touched[0].0, key);
    }

    #[test]
    fn test_try_from_rejects_out_of_range_keys() {
        let last = u16::try_from(RngIdx::COUNT - 1).unwrap();
        assert_eq!(RngIdx::try_from(last).unwrap().index(), RngIdx::COUNT - 1);
        assert!(RngIdx::try_from(last + 1).is_err());
        assert!(XtalIdx::try_from(1536).is_err());
        assert!(FaceIdx::try_from(3071).is_ok());
        assert!(DiodeIdx::try_from(u16::MAX).is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_deserialize_validates_range() {
        let xtal = XtalIdx::new(15, 7, 11).unwrap();
        let json = serde_json::to_string(&xtal).unwrap();
        assert_eq!(json, "1535");
        assert_eq!(serde_json::from_str::<XtalIdx>(&json).unwrap(), xtal);

        assert!(serde_json::from_str::<XtalIdx>("1536").is_err());
        assert!(serde_json::from_str::<RngIdx>("12288").is_err());
        assert!(serde_json::from_str::<RngIdx>("12287").is_ok());
    }
}

use std::fmt::{self, Debug, Display};
use std::io::{self, Read, Write};
use std::str::FromStr;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use num_traits::Signed;

use crate::utils::errors::CalcError;

/// A single vector (one row of a table).
pub type Vector<T> = Vec<T>;

/// Row-major table of vectors sharing one dimension. Row order is significant.
pub type Table<T> = Vec<Vector<T>>;

/// The query or dataset side of a distance computation.
pub type VectorSet<T> = Table<T>;

/// `matrix[i][j]` is the distance between `query[i]` and `dataset[j]`.
pub type DistanceMatrix<T> = Table<T>;

/// Participant index in the distributed protocol; 0 is the coordinator.
pub type Rank = usize;

/// Integer identifying a logical message channel.
pub type Tag = u32;

/// Two floating point elements closer than this count as equal for Hamming.
pub const HAMMING_EPSILON: f64 = 1e-6;

/// Describes the type of distance metric used for the matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistanceMetric {
    /// Sum of absolute differences (taxicab geometry).
    L1,
    /// Euclidean distance.
    L2,
    /// Number of positions at which the elements differ.
    Hamming,
}

impl DistanceMetric {
    pub const ALL: [DistanceMetric; 3] = [DistanceMetric::L1, DistanceMetric::L2, DistanceMetric::Hamming];

    pub fn name(&self) -> &'static str {
        match self {
            DistanceMetric::L1 => "L1",
            DistanceMetric::L2 => "L2",
            DistanceMetric::Hamming => "Hamming",
        }
    }

    /// Position in [`DistanceMetric::ALL`], the form sent over a transport.
    pub fn index(&self) -> u64 {
        match self {
            DistanceMetric::L1 => 0,
            DistanceMetric::L2 => 1,
            DistanceMetric::Hamming => 2,
        }
    }

    pub fn from_index(index: u64) -> Result<Self, CalcError> {
        usize::try_from(index)
            .ok()
            .and_then(|i| DistanceMetric::ALL.get(i).copied())
            .ok_or_else(|| CalcError::InvalidMetric(format!("metric index {index}")))
    }
}

impl FromStr for DistanceMetric {
    type Err = CalcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DistanceMetric::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| CalcError::InvalidMetric(s.to_string()))
    }
}

impl Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Element type of vectors and distance matrices.
///
/// Arithmetic comes from `num_traits::Signed`; the rest covers what the
/// metrics and the transports need beyond plain arithmetic.
pub trait Scalar:
    Signed + Copy + Send + Sync + Debug + Display + FromStr + PartialOrd + 'static
{
    /// Encoded size in bytes on the wire.
    const WIDTH: usize;

    /// Converts to the wide accumulator type.
    ///
    /// Exact for `i32`, `f32` and `f64`. `i64` magnitudes above 2^53 round
    /// to the nearest representable f64, so L1 and L2 over such values are
    /// approximate.
    fn widen(self) -> f64;

    /// Converts back from the wide accumulator type, saturating at the bounds.
    fn narrow(value: f64) -> Self;

    /// Element equality as seen by the Hamming metric.
    fn same(self, other: Self) -> bool;

    fn write_le<W: Write>(self, out: &mut W) -> io::Result<()>;

    fn read_le<R: Read>(input: &mut R) -> io::Result<Self>;
}

macro_rules! impl_int_scalar {
    ($($t:ty => $write:ident, $read:ident);* $(;)?) => {$(
        impl Scalar for $t {
            const WIDTH: usize = std::mem::size_of::<$t>();

            fn widen(self) -> f64 {
                self as f64
            }

            fn narrow(value: f64) -> Self {
                value as $t
            }

            fn same(self, other: Self) -> bool {
                self == other
            }

            fn write_le<W: Write>(self, out: &mut W) -> io::Result<()> {
                out.$write::<LittleEndian>(self)
            }

            fn read_le<R: Read>(input: &mut R) -> io::Result<Self> {
                input.$read::<LittleEndian>()
            }
        }
    )*};
}

macro_rules! impl_float_scalar {
    ($($t:ty => $write:ident, $read:ident);* $(;)?) => {$(
        impl Scalar for $t {
            const WIDTH: usize = std::mem::size_of::<$t>();

            fn widen(self) -> f64 {
                self as f64
            }

            fn narrow(value: f64) -> Self {
                value as $t
            }

            fn same(self, other: Self) -> bool {
                (self - other).abs() <= HAMMING_EPSILON as $t
            }

            fn write_le<W: Write>(self, out: &mut W) -> io::Result<()> {
                out.$write::<LittleEndian>(self)
            }

            fn read_le<R: Read>(input: &mut R) -> io::Result<Self> {
                input.$read::<LittleEndian>()
            }
        }
    )*};
}

impl_int_scalar! {
    i32 => write_i32, read_i32;
    // Widening loses precision above 2^53.
    i64 => write_i64, read_i64;
}

impl_float_scalar! {
    f32 => write_f32, read_f32;
    f64 => write_f64, read_f64;
}

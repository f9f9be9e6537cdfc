use std::fmt;

/// A value that was either recognized as a known variant `T`, or is an
/// unrecognized raw wire value `Raw`.
///
/// MST streams carry several small enumerations (material tags, pixel
/// formats, compression kinds). Values outside the known set are kept as-is
/// so that re-encoding writes back exactly what was read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Recognized<T, Raw = u32> {
    Known(T),
    Unknown(Raw),
}

impl<T: Copy, Raw: Copy> Copy for Recognized<T, Raw> {}

/// An enumeration with a fixed integer encoding on the wire.
pub trait WireEnum: Sized + Copy {
    type Raw: Copy + fmt::Debug;

    fn from_raw(raw: Self::Raw) -> Option<Self>;

    fn to_raw(self) -> Self::Raw;
}

impl<T, Raw> Recognized<T, Raw> {
    pub fn known(&self) -> Option<&T> {
        match self {
            Recognized::Known(t) => Some(t),
            Recognized::Unknown(_) => None,
        }
    }

    pub fn into_known(self) -> Option<T> {
        match self {
            Recognized::Known(t) => Some(t),
            Recognized::Unknown(_) => None,
        }
    }

    pub fn unknown(&self) -> Option<&Raw> {
        match self {
            Recognized::Known(_) => None,
            Recognized::Unknown(raw) => Some(raw),
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Recognized::Known(_))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Recognized::Unknown(_))
    }

    pub fn as_ref(&self) -> Recognized<&T, &Raw> {
        match self {
            Recognized::Known(t) => Recognized::Known(t),
            Recognized::Unknown(raw) => Recognized::Unknown(raw),
        }
    }
}

impl<T: WireEnum> Recognized<T, T::Raw> {
    /// Classify a raw wire value.
    pub fn from_raw(raw: T::Raw) -> Self {
        match T::from_raw(raw) {
            Some(value) => Recognized::Known(value),
            None => Recognized::Unknown(raw),
        }
    }

    /// The value as it appears on the wire.
    pub fn raw(&self) -> T::Raw {
        match self {
            Recognized::Known(t) => t.to_raw(),
            Recognized::Unknown(raw) => *raw,
        }
    }
}

impl<T, Raw> From<T> for Recognized<T, Raw> {
    fn from(value: T) -> Self {
        Recognized::Known(value)
    }
}

impl<T: fmt::Display, Raw: fmt::Display> fmt::Display for Recognized<T, Raw> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recognized::Known(t) => t.fmt(f),
            Recognized::Unknown(raw) => write!(f, "unknown({raw})"),
        }
    }
}

//! Descriptor Codec
//!
//! A [`Descriptor`] packs a technique id and its flag set into one `u32`:
//!
//! ```text
//!  31  30 29        24 23                                   0
//! +------+------------+--------------------------------------+
//! | 0  0 | technique  |                flags                 |
//! +------+------------+--------------------------------------+
//! ```
//!
//! Encoding masks rather than rejects: a technique id wider than 6 bits keeps
//! its low 6 bits, flags keep their low 24 bits. Registry-aware validation
//! lives in [`PermutationTable`](super::PermutationTable).

use std::fmt;

use serde::{Deserialize, Serialize};

use super::technique::ShaderType;

pub const TECHNIQUE_BITS: u32 = 6;
pub const TECHNIQUE_SHIFT: u32 = 24;
pub const TECHNIQUE_MASK: u32 = (1 << TECHNIQUE_BITS) - 1;
pub const FLAGS_MASK: u32 = (1 << TECHNIQUE_SHIFT) - 1;

/// 6-bit technique identifier, scoped by [`ShaderType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct TechniqueId(pub u8);

impl TechniqueId {
    #[inline]
    #[must_use]
    pub const fn masked(raw: u32) -> Self {
        Self((raw & TECHNIQUE_MASK) as u8)
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }
}

/// Packed variant key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Descriptor(u32);

impl Descriptor {
    #[inline]
    #[must_use]
    pub const fn encode(technique: u32, flags: u32) -> Self {
        Self(((technique & TECHNIQUE_MASK) << TECHNIQUE_SHIFT) | (flags & FLAGS_MASK))
    }

    #[inline]
    #[must_use]
    pub const fn decode(self) -> (TechniqueId, u32) {
        (self.technique(), self.flags())
    }

    #[inline]
    #[must_use]
    pub const fn technique(self) -> TechniqueId {
        TechniqueId::masked(self.0 >> TECHNIQUE_SHIFT)
    }

    #[inline]
    #[must_use]
    pub const fn flags(self) -> u32 {
        self.0 & FLAGS_MASK
    }

    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn with_flags(self, flags: u32) -> Self {
        Self::encode(self.technique().0 as u32, flags)
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Descriptor({:#010x})", self.0)
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl From<TechniqueDescriptor> for Descriptor {
    fn from(td: TechniqueDescriptor) -> Self {
        td.encode()
    }
}

/// Unpacked (technique, flags) pair carried by business logic.
///
/// Flags only mean something next to their shader type, so this is the form
/// passed around until the cache boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TechniqueDescriptor {
    pub shader_type: ShaderType,
    pub technique: TechniqueId,
    pub flags: u32,
}

impl TechniqueDescriptor {
    #[must_use]
    pub fn new(shader_type: ShaderType, technique: u8, flags: u32) -> Self {
        Self {
            shader_type,
            technique: TechniqueId(technique),
            flags,
        }
    }

    #[must_use]
    pub fn from_descriptor(shader_type: ShaderType, descriptor: Descriptor) -> Self {
        let (technique, flags) = descriptor.decode();
        Self {
            shader_type,
            technique,
            flags,
        }
    }

    #[inline]
    #[must_use]
    pub fn encode(self) -> Descriptor {
        Descriptor::encode(u32::from(self.technique.0), self.flags)
    }

    #[must_use]
    pub fn has(self, bits: u32) -> bool {
        self.flags & bits == bits
    }
}

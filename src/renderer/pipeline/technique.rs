//! Technique Catalogue
//!
//! Closed enumerations of shader families, shading techniques and their
//! technique-scoped flag spaces.
//!
//! Flags are **not** global: the same bit position may mean different things
//! for different shader types (`GrassFlags::ALPHA_TEST` lives on bit 16,
//! which is `LightingFlags::ANISO_LIGHTING` for lighting shaders). Business
//! logic therefore carries flags together with their shader type and only
//! collapses them into a raw [`Descriptor`](super::Descriptor) at the cache
//! boundary.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Shader family. Selects the source file and the legal flag universe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShaderType {
    Lighting,
    Grass,
    /// Feature-owned compute passes (cubemap capture / filtering).
    Compute,
}

impl ShaderType {
    pub const ALL: [ShaderType; 3] = [ShaderType::Lighting, ShaderType::Grass, ShaderType::Compute];

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Lighting => "Lighting",
            Self::Grass => "Grass",
            Self::Compute => "Compute",
        }
    }

    /// Source file the variant is compiled from.
    #[must_use]
    pub fn source_file(self, technique: u8) -> &'static str {
        match self {
            Self::Lighting => "Lighting.hlsl",
            Self::Grass => "RunGrass.hlsl",
            Self::Compute => match ComputeTechnique::from_id(technique) {
                Some(ComputeTechnique::UpdateCubemap) => "DynamicCubemaps/UpdateCubemapCS.hlsl",
                Some(ComputeTechnique::InferCubemap) => "DynamicCubemaps/InferCubemapCS.hlsl",
                Some(ComputeTechnique::SpecularIrradiance) | None => {
                    "DynamicCubemaps/SpecularIrradianceCS.hlsl"
                }
            },
        }
    }

    /// Whether `technique` is a member of this shader type's technique enum.
    #[must_use]
    pub fn has_technique(self, technique: u8) -> bool {
        match self {
            Self::Lighting => LightingTechnique::from_id(technique).is_some(),
            Self::Grass => GrassTechnique::from_id(technique).is_some(),
            Self::Compute => ComputeTechnique::from_id(technique).is_some(),
        }
    }

    /// Every flag bit this shader type defines.
    #[must_use]
    pub fn flag_universe(self) -> u32 {
        match self {
            Self::Lighting => LightingFlags::all().bits(),
            Self::Grass => GrassFlags::all().bits(),
            Self::Compute => ComputeFlags::all().bits(),
        }
    }

    /// Define tokens contributed by a technique id.
    #[must_use]
    pub fn technique_defines(self, technique: u8) -> &'static [&'static str] {
        match self {
            Self::Lighting => {
                LightingTechnique::from_id(technique).map_or(&[], LightingTechnique::defines)
            }
            Self::Grass => match GrassTechnique::from_id(technique) {
                Some(GrassTechnique::RenderDepth) => &["RENDER_DEPTH"],
                _ => &[],
            },
            Self::Compute => ComputeTechnique::from_id(technique).map_or(&[], |t| match t {
                ComputeTechnique::UpdateCubemap => &["UPDATE_CUBEMAP"],
                ComputeTechnique::InferCubemap => &["INFER_CUBEMAP"],
                ComputeTechnique::SpecularIrradiance => &["SPECULAR_IRRADIANCE"],
            }),
        }
    }

    /// Define tokens contributed by a flag set, in bit order.
    #[must_use]
    pub fn flag_defines(self, flags: u32) -> SmallVec<[&'static str; 8]> {
        let table: &[(u32, &'static str)] = match self {
            Self::Lighting => LIGHTING_FLAG_DEFINES,
            Self::Grass => GRASS_FLAG_DEFINES,
            Self::Compute => COMPUTE_FLAG_DEFINES,
        };
        table
            .iter()
            .filter(|(bit, _)| flags & bit != 0)
            .map(|&(_, token)| token)
            .collect()
    }
}

impl fmt::Display for ShaderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Pipeline stage a variant is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShaderStage {
    Vertex,
    Pixel,
    Compute,
}

impl ShaderStage {
    #[must_use]
    pub fn define(self) -> &'static str {
        match self {
            Self::Vertex => "VSHADER",
            Self::Pixel => "PSHADER",
            Self::Compute => "CSHADER",
        }
    }

    #[must_use]
    pub fn entry_point(self) -> &'static str {
        "main"
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Vertex => "vs",
            Self::Pixel => "ps",
            Self::Compute => "cs",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Lighting
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LightingTechnique {
    None = 0,
    Envmap = 1,
    Glowmap = 2,
    Parallax = 3,
    Facegen = 4,
    FacegenRGBTint = 5,
    Hair = 6,
    ParallaxOcc = 7,
    MTLand = 8,
    LODLand = 9,
    Snow = 10,
    MultilayerParallax = 11,
    TreeAnim = 12,
    LODObjects = 13,
    MultiIndexSparkle = 14,
    LODObjectHD = 15,
    Eye = 16,
    Cloud = 17,
    LODLandNoise = 18,
    MTLandLODBlend = 19,
    Outline = 20,
}

impl LightingTechnique {
    const ALL: [LightingTechnique; 21] = [
        Self::None,
        Self::Envmap,
        Self::Glowmap,
        Self::Parallax,
        Self::Facegen,
        Self::FacegenRGBTint,
        Self::Hair,
        Self::ParallaxOcc,
        Self::MTLand,
        Self::LODLand,
        Self::Snow,
        Self::MultilayerParallax,
        Self::TreeAnim,
        Self::LODObjects,
        Self::MultiIndexSparkle,
        Self::LODObjectHD,
        Self::Eye,
        Self::Cloud,
        Self::LODLandNoise,
        Self::MTLandLODBlend,
        Self::Outline,
    ];

    #[must_use]
    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(usize::from(id)).copied()
    }

    #[inline]
    #[must_use]
    pub fn id(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn defines(self) -> &'static [&'static str] {
        match self {
            Self::None => &[],
            Self::Envmap => &["ENVMAP"],
            Self::Glowmap => &["GLOWMAP"],
            Self::Parallax => &["PARALLAX"],
            Self::Facegen => &["FACEGEN"],
            Self::FacegenRGBTint => &["FACEGEN_RGB_TINT"],
            Self::Hair => &["HAIR"],
            Self::ParallaxOcc => &["PARALLAX_OCC"],
            Self::MTLand => &["MULTI_TEXTURE", "LANDSCAPE"],
            Self::LODLand => &["LODLANDSCAPE"],
            Self::Snow => &["SNOW_FLAG"],
            Self::MultilayerParallax => &["MULTI_LAYER_PARALLAX"],
            Self::TreeAnim => &["TREE_ANIM"],
            Self::LODObjects => &["LODOBJECTS"],
            Self::MultiIndexSparkle => &["MULTI_INDEX", "SPARKLE"],
            Self::LODObjectHD => &["LODOBJECTSHD"],
            Self::Eye => &["EYE"],
            Self::Cloud => &["CLOUD"],
            Self::LODLandNoise => &["LODLANDNOISE"],
            Self::MTLandLODBlend => &["MULTI_TEXTURE", "LANDSCAPE", "LOD_LAND_BLEND"],
            Self::Outline => &["OUTLINE"],
        }
    }

    /// Landscape LOD techniques never take the PBR material path.
    #[must_use]
    pub fn is_lod_landscape(self) -> bool {
        matches!(self, Self::LODLand | Self::LODLandNoise)
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct LightingFlags: u32 {
        const VC                    = 1 << 0;
        const SKINNED               = 1 << 1;
        const MODEL_SPACE_NORMALS   = 1 << 2;
        // Bits 3..=8 are unused by the base pipeline; bit 3 carries PBR.
        const TRUE_PBR              = 1 << 3;
        const SPECULAR              = 1 << 9;
        const SOFT_LIGHTING         = 1 << 10;
        const RIM_LIGHTING          = 1 << 11;
        const BACK_LIGHTING         = 1 << 12;
        const SHADOW_DIR            = 1 << 13;
        const DEF_SHADOW            = 1 << 14;
        const PROJECTED_UV          = 1 << 15;
        const ANISO_LIGHTING        = 1 << 16;
        const AMBIENT_SPECULAR      = 1 << 17;
        const WORLD_MAP             = 1 << 18;
        const BASE_OBJECT_IS_SNOW   = 1 << 19;
        const DO_ALPHA_TEST         = 1 << 20;
        const SNOW                  = 1 << 21;
        const CHARACTER_LIGHT       = 1 << 22;
        const ADDITIONAL_ALPHA_MASK = 1 << 23;
    }
}

const LIGHTING_FLAG_DEFINES: &[(u32, &str)] = &[
    (LightingFlags::VC.bits(), "VC"),
    (LightingFlags::SKINNED.bits(), "SKINNED"),
    (LightingFlags::MODEL_SPACE_NORMALS.bits(), "MODELSPACENORMALS"),
    (LightingFlags::TRUE_PBR.bits(), "TRUE_PBR"),
    (LightingFlags::SPECULAR.bits(), "SPECULAR"),
    (LightingFlags::SOFT_LIGHTING.bits(), "SOFT_LIGHTING"),
    (LightingFlags::RIM_LIGHTING.bits(), "RIM_LIGHTING"),
    (LightingFlags::BACK_LIGHTING.bits(), "BACK_LIGHTING"),
    (LightingFlags::SHADOW_DIR.bits(), "SHADOW_DIR"),
    (LightingFlags::DEF_SHADOW.bits(), "DEFSHADOW"),
    (LightingFlags::PROJECTED_UV.bits(), "PROJECTED_UV"),
    (LightingFlags::ANISO_LIGHTING.bits(), "ANISO_LIGHTING"),
    (LightingFlags::AMBIENT_SPECULAR.bits(), "AMBIENT_SPECULAR"),
    (LightingFlags::WORLD_MAP.bits(), "WORLD_MAP"),
    (LightingFlags::BASE_OBJECT_IS_SNOW.bits(), "BASE_OBJECT_IS_SNOW"),
    (LightingFlags::DO_ALPHA_TEST.bits(), "DO_ALPHA_TEST"),
    (LightingFlags::SNOW.bits(), "SNOW"),
    (LightingFlags::CHARACTER_LIGHT.bits(), "CHARACTER_LIGHT"),
    (LightingFlags::ADDITIONAL_ALPHA_MASK.bits(), "ADDITIONAL_ALPHA_MASK"),
];

// ============================================================================
// Grass
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GrassTechnique {
    None = 0,
    RenderDepth = 8,
}

impl GrassTechnique {
    #[must_use]
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::None),
            8 => Some(Self::RenderDepth),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(self) -> u8 {
        self as u8
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct GrassFlags: u32 {
        const ALPHA_TEST = 1 << 16;
        const TRUE_PBR   = 1 << 17;
    }
}

const GRASS_FLAG_DEFINES: &[(u32, &str)] = &[
    (GrassFlags::ALPHA_TEST.bits(), "DO_ALPHA_TEST"),
    (GrassFlags::TRUE_PBR.bits(), "TRUE_PBR"),
];

// ============================================================================
// Compute
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ComputeTechnique {
    UpdateCubemap = 0,
    InferCubemap = 1,
    SpecularIrradiance = 2,
}

impl ComputeTechnique {
    #[must_use]
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::UpdateCubemap),
            1 => Some(Self::InferCubemap),
            2 => Some(Self::SpecularIrradiance),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(self) -> u8 {
        self as u8
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ComputeFlags: u32 {
        const REFLECTIONS      = 1 << 0;
        const FAKE_REFLECTIONS = 1 << 1;
    }
}

const COMPUTE_FLAG_DEFINES: &[(u32, &str)] = &[
    (ComputeFlags::REFLECTIONS.bits(), "REFLECTIONS"),
    (ComputeFlags::FAKE_REFLECTIONS.bits(), "FAKE_REFLECTIONS"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lighting_ids_round_trip() {
        for id in 0..=20u8 {
            let technique = LightingTechnique::from_id(id).unwrap();
            assert_eq!(technique.id(), id);
        }
        assert!(LightingTechnique::from_id(21).is_none());
    }

    #[test]
    fn flags_fit_in_24_bits() {
        for ty in ShaderType::ALL {
            assert_eq!(ty.flag_universe() & !0x00FF_FFFF, 0, "{ty}");
        }
    }

    #[test]
    fn flag_defines_follow_bit_order() {
        let flags = (LightingFlags::TRUE_PBR | LightingFlags::VC | LightingFlags::SKINNED).bits();
        let defines = ShaderType::Lighting.flag_defines(flags);
        assert_eq!(defines.as_slice(), &["VC", "SKINNED", "TRUE_PBR"]);
    }

    #[test]
    fn grass_and_lighting_share_bit_positions() {
        // Same bit, different meaning per shader type.
        assert_eq!(GrassFlags::ALPHA_TEST.bits(), LightingFlags::ANISO_LIGHTING.bits());
        assert_eq!(
            ShaderType::Grass.flag_defines(1 << 16).as_slice(),
            &["DO_ALPHA_TEST"]
        );
        assert_eq!(
            ShaderType::Lighting.flag_defines(1 << 16).as_slice(),
            &["ANISO_LIGHTING"]
        );
    }
}

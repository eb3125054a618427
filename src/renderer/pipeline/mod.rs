//! Shader Pipeline
//!
//! - [`technique`]: shader types, techniques and their flag spaces
//! - [`descriptor`]: packed (technique, flags) codec
//! - [`permutation`]: per-technique permutation rules and the rule table
//! - [`shader_gen`]: compile request / define preamble generation
//! - [`variant_cache`]: coalescing, versioned shader variant cache
//! - [`workers`]: background compile worker pool

pub mod descriptor;
pub mod permutation;
pub mod shader_gen;
pub mod technique;
pub mod variant_cache;
pub mod workers;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use descriptor::{Descriptor, TechniqueDescriptor, TechniqueId};
pub use permutation::{
    PermutationRule, PermutationTable, generate_flag_permutations, generate_technique_descriptors,
};
pub use shader_gen::{CompileRequest, ShaderGenerator};
pub use technique::{
    ComputeFlags, ComputeTechnique, GrassFlags, GrassTechnique, LightingFlags, LightingTechnique,
    ShaderStage, ShaderType,
};
pub use variant_cache::{
    CacheStats, PrecompileReport, ShaderCompiler, ShaderModuleHandle, ShaderVariant,
    ShaderVariantCache, VariantError, VariantLookup,
};

/// Cache key of one compiled variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariantKey {
    pub shader_type: ShaderType,
    pub descriptor: Descriptor,
    pub stage: ShaderStage,
}

impl VariantKey {
    #[inline]
    #[must_use]
    pub const fn new(shader_type: ShaderType, descriptor: Descriptor, stage: ShaderStage) -> Self {
        Self {
            shader_type,
            descriptor,
            stage,
        }
    }

    #[must_use]
    pub fn technique_descriptor(&self) -> TechniqueDescriptor {
        TechniqueDescriptor::from_descriptor(self.shader_type, self.descriptor)
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.shader_type, self.descriptor, self.stage)
    }
}

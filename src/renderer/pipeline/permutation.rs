//! Permutation Generator
//!
//! Every shading technique declares its own rule: an ordered list of
//! *independent* flags that may be toggled freely plus a *constant* mask that
//! is always on. A rule expands to the power set of its independent flags,
//! each OR-ed onto the constant mask, so a rule with N independent flags
//! yields exactly 2^N descriptors.
//!
//! Rules are hand-written tables. Enumerating per technique keeps flags that
//! are never relevant to a technique out of the product while still covering
//! every descriptor the draw path can produce, so a warm cache never stalls
//! on first use.
//!
//! [`PermutationTable`] collects the registered rules, answers
//! `valid_mask(technique)` and performs registry-aware encoding.

use log::{error, warn};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use super::descriptor::{Descriptor, FLAGS_MASK, TECHNIQUE_MASK};
use super::technique::{
    ComputeFlags, ComputeTechnique, GrassFlags, GrassTechnique, LightingFlags, LightingTechnique,
    ShaderStage, ShaderType,
};
use super::VariantKey;
use crate::errors::{PrismError, Result};

/// All combinations of `independent` OR-ed onto `constant`.
///
/// Duplicates cannot arise from distinct power-of-two flags; when `constant`
/// overlaps an independent bit the overlapping subsets collapse and a warning
/// is logged.
#[must_use]
pub fn generate_flag_permutations(independent: &[u32], constant: u32) -> FxHashSet<u32> {
    let overlap = independent.iter().fold(0, |acc, f| acc | f) & constant;
    if overlap != 0 {
        warn!("[Permutations] constant mask {constant:#x} overlaps independent flags ({overlap:#x})");
    }

    let count = 1usize << independent.len();
    let mut result = FxHashSet::with_capacity_and_hasher(count, Default::default());
    for subset in 0..count {
        let mut flags = constant;
        for (bit, flag) in independent.iter().enumerate() {
            if subset & (1 << bit) != 0 {
                flags |= flag;
            }
        }
        result.insert(flags);
    }
    result
}

/// Encodes every permutation of `rule` for its technique.
#[must_use]
pub fn generate_technique_descriptors(technique: u8, rule: &PermutationRule) -> FxHashSet<Descriptor> {
    generate_flag_permutations(&rule.independent, rule.constant)
        .into_iter()
        .map(|flags| Descriptor::encode(u32::from(technique), flags))
        .collect()
}

/// One technique's permutation rule for one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermutationRule {
    pub stage: ShaderStage,
    pub technique: u8,
    pub independent: SmallVec<[u32; 8]>,
    pub constant: u32,
}

impl PermutationRule {
    #[must_use]
    pub fn new(stage: ShaderStage, technique: u8, independent: &[u32], constant: u32) -> Self {
        Self {
            stage,
            technique,
            independent: SmallVec::from_slice(independent),
            constant,
        }
    }

    /// Union of every bit this rule can emit.
    #[must_use]
    pub fn mask(&self) -> u32 {
        self.independent.iter().fold(self.constant, |acc, f| acc | f)
    }

    #[must_use]
    pub fn descriptors(&self) -> FxHashSet<Descriptor> {
        generate_technique_descriptors(self.technique, self)
    }

    #[must_use]
    pub fn permutation_count(&self) -> usize {
        1 << self.independent.len()
    }
}

// ─── Rule Tables ─────────────────────────────────────────────────────────────

/// PBR lighting rules, vertex stage.
#[must_use]
pub fn pbr_lighting_vertex_rules() -> Vec<PermutationRule> {
    use LightingFlags as F;
    use LightingTechnique as T;

    let vs = ShaderStage::Vertex;
    vec![
        PermutationRule::new(
            vs,
            T::None.id(),
            &[F::VC.bits(), F::SKINNED.bits(), F::WORLD_MAP.bits()],
            F::TRUE_PBR.bits(),
        ),
        PermutationRule::new(
            vs,
            T::None.id(),
            &[F::VC.bits(), F::WORLD_MAP.bits()],
            (F::TRUE_PBR | F::PROJECTED_UV).bits(),
        ),
        PermutationRule::new(
            vs,
            T::TreeAnim.id(),
            &[F::VC.bits(), F::SKINNED.bits()],
            F::TRUE_PBR.bits(),
        ),
        PermutationRule::new(vs, T::MTLand.id(), &[F::VC.bits()], F::TRUE_PBR.bits()),
        PermutationRule::new(vs, T::MTLandLODBlend.id(), &[F::VC.bits()], F::TRUE_PBR.bits()),
    ]
}

/// PBR lighting rules, pixel stage.
#[must_use]
pub fn pbr_lighting_pixel_rules() -> Vec<PermutationRule> {
    use LightingFlags as F;
    use LightingTechnique as T;

    let ps = ShaderStage::Pixel;
    let pbr_vc = (F::TRUE_PBR | F::VC).bits();
    let lod_objects_flags = [
        F::WORLD_MAP.bits(),
        F::DO_ALPHA_TEST.bits(),
        F::ADDITIONAL_ALPHA_MASK.bits(),
        F::PROJECTED_UV.bits(),
    ];

    vec![
        PermutationRule::new(
            ps,
            T::None.id(),
            &[F::SKINNED.bits(), F::DO_ALPHA_TEST.bits(), F::ADDITIONAL_ALPHA_MASK.bits()],
            pbr_vc,
        ),
        PermutationRule::new(
            ps,
            T::None.id(),
            &[
                F::DO_ALPHA_TEST.bits(),
                F::ADDITIONAL_ALPHA_MASK.bits(),
                F::SNOW.bits(),
                F::BASE_OBJECT_IS_SNOW.bits(),
            ],
            (F::TRUE_PBR | F::VC | F::PROJECTED_UV).bits(),
        ),
        PermutationRule::new(ps, T::LODObjects.id(), &lod_objects_flags, pbr_vc),
        PermutationRule::new(ps, T::LODObjectHD.id(), &lod_objects_flags, pbr_vc),
        PermutationRule::new(
            ps,
            T::TreeAnim.id(),
            &[F::SKINNED.bits(), F::DO_ALPHA_TEST.bits(), F::ADDITIONAL_ALPHA_MASK.bits()],
            pbr_vc,
        ),
        PermutationRule::new(ps, T::MTLand.id(), &[], pbr_vc),
        PermutationRule::new(ps, T::MTLandLODBlend.id(), &[], pbr_vc),
    ]
}

/// PBR grass rules, both stages.
#[must_use]
pub fn pbr_grass_rules() -> Vec<PermutationRule> {
    let independent = [GrassFlags::ALPHA_TEST.bits()];
    let constant = GrassFlags::TRUE_PBR.bits();
    let technique = GrassTechnique::None.id();
    vec![
        PermutationRule::new(ShaderStage::Vertex, technique, &independent, constant),
        PermutationRule::new(ShaderStage::Pixel, technique, &independent, constant),
    ]
}

/// Cubemap compute rules. Reflection and fake-reflection variants are
/// exclusive, so they are two single-flag rules rather than one product.
#[must_use]
pub fn cubemap_compute_rules() -> Vec<PermutationRule> {
    let cs = ShaderStage::Compute;
    let reflections = [
        ComputeFlags::REFLECTIONS.bits(),
        ComputeFlags::FAKE_REFLECTIONS.bits(),
    ];

    let mut rules = Vec::with_capacity(5);
    for technique in [ComputeTechnique::UpdateCubemap, ComputeTechnique::InferCubemap] {
        for &flag in &reflections {
            rules.push(PermutationRule::new(cs, technique.id(), &[flag], 0));
        }
    }
    rules.push(PermutationRule::new(cs, ComputeTechnique::SpecularIrradiance.id(), &[], 0));
    rules
}

// ─── Permutation Table ───────────────────────────────────────────────────────

/// Registered rules per shader type plus the derived per-technique masks.
#[derive(Debug, Default, Clone)]
pub struct PermutationTable {
    rules: FxHashMap<ShaderType, Vec<PermutationRule>>,
    masks: FxHashMap<(ShaderType, u8), u32>,
}

impl PermutationTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a rule, extending its technique's valid mask.
    ///
    /// Rejects techniques outside the shader type's enum and flags outside
    /// its flag universe.
    pub fn register(&mut self, shader_type: ShaderType, rule: PermutationRule) -> Result<()> {
        if !shader_type.has_technique(rule.technique) {
            return Err(PrismError::InvariantViolation(format!(
                "technique {} is not a {shader_type} technique",
                rule.technique
            )));
        }
        let stray = rule.mask() & !shader_type.flag_universe();
        if stray != 0 {
            return Err(PrismError::InvariantViolation(format!(
                "rule for {shader_type} technique {} uses undefined flags {stray:#x}",
                rule.technique
            )));
        }

        *self.masks.entry((shader_type, rule.technique)).or_default() |= rule.mask();
        self.rules.entry(shader_type).or_default().push(rule);
        Ok(())
    }

    pub fn register_all(
        &mut self,
        shader_type: ShaderType,
        rules: impl IntoIterator<Item = PermutationRule>,
    ) -> Result<()> {
        for rule in rules {
            self.register(shader_type, rule)?;
        }
        Ok(())
    }

    /// Merges another table into this one.
    pub fn extend(&mut self, other: &PermutationTable) {
        for (&shader_type, rules) in &other.rules {
            for rule in rules {
                *self.masks.entry((shader_type, rule.technique)).or_default() |= rule.mask();
                self.rules.entry(shader_type).or_default().push(rule.clone());
            }
        }
    }

    #[must_use]
    pub fn rules(&self, shader_type: ShaderType) -> &[PermutationRule] {
        self.rules.get(&shader_type).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn is_registered(&self, shader_type: ShaderType, technique: u8) -> bool {
        self.masks.contains_key(&(shader_type, technique))
    }

    /// Flags legal for a technique; zero when it has no rule.
    #[must_use]
    pub fn valid_mask(&self, shader_type: ShaderType, technique: u8) -> u32 {
        self.masks.get(&(shader_type, technique)).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Encodes with the flags masked to the technique's valid mask. Never
    /// reports a violation.
    #[must_use]
    pub fn encode_masked(&self, shader_type: ShaderType, technique: u32, flags: u32) -> Descriptor {
        let technique = technique & TECHNIQUE_MASK;
        let mask = self.valid_mask(shader_type, technique as u8);
        Descriptor::encode(technique, flags & mask)
    }

    /// Registry-aware encode that reports unregistered techniques and stray
    /// flags.
    pub fn try_encode(&self, shader_type: ShaderType, technique: u32, flags: u32) -> Result<Descriptor> {
        if technique > TECHNIQUE_MASK {
            return Err(PrismError::InvariantViolation(format!(
                "technique {technique} does not fit in 6 bits"
            )));
        }
        let Some(&mask) = self.masks.get(&(shader_type, technique as u8)) else {
            return Err(PrismError::InvariantViolation(format!(
                "{shader_type} technique {technique} has no registered permutations"
            )));
        };
        let stray = flags & !mask;
        if stray != 0 {
            return Err(PrismError::InvariantViolation(format!(
                "{shader_type} technique {technique}: flags {stray:#x} outside valid mask {mask:#x}"
            )));
        }
        Ok(Descriptor::encode(technique, flags & FLAGS_MASK))
    }

    /// Registry-aware encode. Violations assert in debug builds; release
    /// builds log and fall back to [`Self::encode_masked`].
    #[must_use]
    pub fn encode(&self, shader_type: ShaderType, technique: u32, flags: u32) -> Descriptor {
        let result = self.try_encode(shader_type, technique, flags);
        debug_assert!(result.is_ok(), "{:?}", result.as_ref().err());
        match result {
            Ok(descriptor) => descriptor,
            Err(e) => {
                error!("[Permutations] {e}; masking");
                self.encode_masked(shader_type, technique, flags)
            }
        }
    }

    /// Every descriptor registered for a shader type and stage.
    #[must_use]
    pub fn descriptors(&self, shader_type: ShaderType, stage: ShaderStage) -> FxHashSet<Descriptor> {
        self.rules(shader_type)
            .iter()
            .filter(|rule| rule.stage == stage)
            .flat_map(PermutationRule::descriptors)
            .collect()
    }

    /// Every variant key covered by the table, sorted for deterministic
    /// precompilation order.
    #[must_use]
    pub fn variant_keys(&self) -> Vec<VariantKey> {
        let mut keys: FxHashSet<VariantKey> = FxHashSet::default();
        for (&shader_type, rules) in &self.rules {
            for rule in rules {
                keys.extend(
                    rule.descriptors()
                        .into_iter()
                        .map(|descriptor| VariantKey::new(shader_type, descriptor, rule.stage)),
                );
            }
        }
        let mut keys: Vec<_> = keys.into_iter().collect();
        keys.sort_unstable();
        keys
    }
}

//! Descriptor Codec Tests
//!
//! Tests for:
//! - Descriptor: raw packing, decode, field masking
//! - TechniqueDescriptor: typed pair round trip through the cache boundary
//! - PermutationTable: registry-aware encode, try_encode violations, masking

use prism::renderer::pipeline::permutation::{pbr_grass_rules, pbr_lighting_pixel_rules, pbr_lighting_vertex_rules};
use prism::renderer::pipeline::{
    Descriptor, GrassFlags, LightingFlags, LightingTechnique, PermutationTable, ShaderType,
    TechniqueDescriptor, TechniqueId,
};
use prism::PrismError;

fn pbr_table() -> PermutationTable {
    let mut table = PermutationTable::new();
    table.register_all(ShaderType::Lighting, pbr_lighting_vertex_rules()).unwrap();
    table.register_all(ShaderType::Lighting, pbr_lighting_pixel_rules()).unwrap();
    table.register_all(ShaderType::Grass, pbr_grass_rules()).unwrap();
    table
}

// ============================================================================
// Descriptor
// ============================================================================

#[test]
fn encode_places_technique_above_flags() {
    let d = Descriptor::encode(12, 0x0000_0009);
    assert_eq!(d.raw(), 0x0C00_0009);
}

#[test]
fn decode_recovers_every_technique() {
    let flags = [0, 1, 0x8, 0x20_0000, 0xFF_FFFF];
    for technique in 0..64u32 {
        for &f in &flags {
            let (t, decoded) = Descriptor::encode(technique, f).decode();
            assert_eq!(t, TechniqueId(technique as u8));
            assert_eq!(decoded, f);
        }
    }
}

#[test]
fn oversized_fields_are_masked_not_rejected() {
    let d = Descriptor::encode(0x41, 0x0100_0003);
    assert_eq!(d.technique(), TechniqueId(1));
    assert_eq!(d.flags(), 3);
}

#[test]
fn typed_pair_survives_the_cache_boundary() {
    let typed = TechniqueDescriptor::new(
        ShaderType::Lighting,
        LightingTechnique::TreeAnim.id(),
        (LightingFlags::TRUE_PBR | LightingFlags::SKINNED).bits(),
    );
    let packed: Descriptor = typed.into();
    let back = TechniqueDescriptor::from_descriptor(ShaderType::Lighting, packed);
    assert_eq!(back, typed);
    assert!(back.has(LightingFlags::SKINNED.bits()));
}

// ============================================================================
// PermutationTable encode
// ============================================================================

#[test]
fn decode_of_table_encode_respects_valid_mask() {
    let table = pbr_table();
    let technique = LightingTechnique::None.id();
    let mask = table.valid_mask(ShaderType::Lighting, technique);

    for flags in [0, 0x1, 0xFF_FFFF, 0x0012_3456] {
        let d = table.encode_masked(ShaderType::Lighting, u32::from(technique), flags);
        assert_eq!(d.decode(), (TechniqueId(technique), flags & mask));
    }
}

#[test]
fn try_encode_accepts_registered_flags() {
    let table = pbr_table();
    let flags = (LightingFlags::TRUE_PBR | LightingFlags::VC).bits();
    let d = table
        .try_encode(ShaderType::Lighting, u32::from(LightingTechnique::MTLand.id()), flags)
        .unwrap();
    assert_eq!(d.flags(), flags);
}

#[test]
fn try_encode_rejects_stray_flag() {
    let table = pbr_table();
    let flags = (LightingFlags::TRUE_PBR | LightingFlags::RIM_LIGHTING).bits();
    let err = table
        .try_encode(ShaderType::Lighting, u32::from(LightingTechnique::MTLand.id()), flags)
        .unwrap_err();
    assert!(matches!(err, PrismError::InvariantViolation(_)));
}

#[test]
fn try_encode_rejects_unregistered_technique() {
    let table = pbr_table();
    let err = table
        .try_encode(ShaderType::Lighting, u32::from(LightingTechnique::Eye.id()), 0)
        .unwrap_err();
    assert!(matches!(err, PrismError::InvariantViolation(_)));
    assert!(table.try_encode(ShaderType::Lighting, 64, 0).is_err());
}

#[test]
fn grass_mask_is_scoped_to_grass() {
    let table = pbr_table();
    let grass = (GrassFlags::ALPHA_TEST | GrassFlags::TRUE_PBR).bits();
    assert_eq!(table.valid_mask(ShaderType::Grass, 0), grass);
    assert_ne!(table.valid_mask(ShaderType::Lighting, 0), grass);
}

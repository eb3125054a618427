//! Shader Variant Generator
//!
//! Turns a [`VariantKey`] plus the merged feature define set into a
//! [`CompileRequest`]: the define list handed to the compiler and a generated
//! `#define` preamble rendered through minijinja.

use std::collections::BTreeMap;

use minijinja::{Environment, syntax::SyntaxConfig};
use serde::Serialize;
use xxhash_rust::xxh3::xxh3_128;

use super::VariantKey;
use super::technique::ShaderStage;
use crate::errors::Result;
use crate::resources::shader_defines::ShaderDefines;

const PREAMBLE_TEMPLATE_NAME: &str = "variant_preamble";

const PREAMBLE_TEMPLATE: &str = "\
// === Auto-generated Variant Preamble ===
// {{ shader_type }} technique {{ technique }} flags {{ flags }} ({{ stage }})
$$ for name, value in defines|items
$$ if value
#define {{ name }} {{ value }}
$$ else
#define {{ name }}
$$ endif
$$ endfor
";

/// Everything a [`ShaderCompiler`](super::ShaderCompiler) needs to build
/// one variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileRequest {
    pub key: VariantKey,
    pub source_file: &'static str,
    pub entry_point: &'static str,
    pub stage: ShaderStage,
    pub defines: ShaderDefines,
    pub preamble: String,
    /// xxh3-128 over the source file name and the preamble.
    pub source_hash: u128,
}

#[derive(Serialize)]
struct PreambleContext<'a> {
    shader_type: &'a str,
    technique: u8,
    flags: String,
    stage: String,
    defines: BTreeMap<String, String>,
}

/// Owns the template environment used for preamble generation.
pub struct ShaderGenerator {
    env: Environment<'static>,
}

impl ShaderGenerator {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();

        let syntax = SyntaxConfig::builder()
            .block_delimiters("{$", "$}")
            .variable_delimiters("{{", "}}")
            .line_statement_prefix("$$")
            .build()?;

        env.set_syntax(syntax);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_undefined_behavior(minijinja::UndefinedBehavior::SemiStrict);
        env.add_template(PREAMBLE_TEMPLATE_NAME, PREAMBLE_TEMPLATE)?;

        Ok(Self { env })
    }

    /// Define tokens a key expands to on its own: stage, technique, flags.
    #[must_use]
    pub fn key_defines(key: &VariantKey) -> ShaderDefines {
        let (technique, flags) = key.descriptor.decode();
        let mut defines = ShaderDefines::with_capacity(12);
        defines.define(key.stage.define());
        for token in key.shader_type.technique_defines(technique.raw()) {
            defines.define(token);
        }
        for token in key.shader_type.flag_defines(flags) {
            defines.define(token);
        }
        defines
    }

    /// Builds the compile request for `key` with the feature defines merged
    /// on top of the key's own defines.
    pub fn build_request(&self, key: VariantKey, feature_defines: &ShaderDefines) -> Result<CompileRequest> {
        let defines = Self::key_defines(&key).merged_with(feature_defines);
        let (technique, flags) = key.descriptor.decode();

        let ctx = PreambleContext {
            shader_type: key.shader_type.name(),
            technique: technique.raw(),
            flags: format!("{flags:#08x}"),
            stage: key.stage.to_string(),
            defines: defines.to_map(),
        };

        let template = self.env.get_template(PREAMBLE_TEMPLATE_NAME)?;
        let preamble = template.render(&ctx)?;

        let source_file = key.shader_type.source_file(technique.raw());
        let mut hashed = String::with_capacity(source_file.len() + preamble.len() + 1);
        hashed.push_str(source_file);
        hashed.push('\n');
        hashed.push_str(&preamble);

        Ok(CompileRequest {
            key,
            source_file,
            entry_point: key.stage.entry_point(),
            stage: key.stage,
            source_hash: xxh3_128(hashed.as_bytes()),
            defines,
            preamble,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::pipeline::{Descriptor, LightingFlags, LightingTechnique, ShaderType};

    fn tree_anim_key() -> VariantKey {
        let flags = (LightingFlags::TRUE_PBR | LightingFlags::VC | LightingFlags::SKINNED).bits();
        VariantKey::new(
            ShaderType::Lighting,
            Descriptor::encode(u32::from(LightingTechnique::TreeAnim.id()), flags),
            ShaderStage::Pixel,
        )
    }

    #[test]
    fn key_defines_cover_stage_technique_and_flags() {
        let defines = ShaderGenerator::key_defines(&tree_anim_key());
        for token in ["PSHADER", "TREE_ANIM", "VC", "SKINNED", "TRUE_PBR"] {
            assert!(defines.contains(token), "missing {token}");
        }
        assert!(!defines.contains("VSHADER"));
    }

    #[test]
    fn preamble_lists_defines_in_order() {
        let generator = ShaderGenerator::new().unwrap();
        let mut features = ShaderDefines::new();
        features.set("DYNAMIC_CUBEMAPS", "");
        features.set("LINEAR_LIGHTING", "1");

        let request = generator.build_request(tree_anim_key(), &features).unwrap();

        assert_eq!(request.source_file, "Lighting.hlsl");
        assert!(request.preamble.contains("#define LINEAR_LIGHTING 1\n"));
        assert!(request.preamble.contains("#define DYNAMIC_CUBEMAPS\n"));
        let cube = request.preamble.find("DYNAMIC_CUBEMAPS").unwrap();
        let tree = request.preamble.find("#define TREE_ANIM").unwrap();
        assert!(cube < tree);
    }

    #[test]
    fn feature_defines_change_source_hash() {
        let generator = ShaderGenerator::new().unwrap();
        let a = generator.build_request(tree_anim_key(), &ShaderDefines::new()).unwrap();
        let b = generator
            .build_request(tree_anim_key(), &ShaderDefines::from_tokens(["SNOW_COVER"]))
            .unwrap();
        assert_ne!(a.source_hash, b.source_hash);
    }
}

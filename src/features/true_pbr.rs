//! True PBR
//!
//! Physically based shading for materials the host marks as PBR:
//!
//! - **Records**: per-editor-id JSON configs for texture sets, material
//!   objects, lighting templates and weathers, read from directories under
//!   the data root. Malformed files are logged and skipped.
//! - **Light scales**: every frame the global light multipliers are combined
//!   with the current lighting template (interiors) or weather (exteriors)
//!   record and written to a per-frame constant buffer.
//! - **Render passes**: lighting and grass pass descriptors of PBR geometry
//!   are remapped onto the `TRUE_PBR` variants.
//! - **Permutations**: the PBR lighting and grass rule tables, precompiled at
//!   data load.
//!
//! | Directory              | Record                     |
//! |------------------------|----------------------------|
//! | `PBRTextureSets`       | [`PbrTextureSetData`]      |
//! | `PBRMaterialObjects`   | [`PbrMaterialObjectData`]  |
//! | `PBRLightingTemplates` | [`PbrLightingTemplateData`]|
//! | `PBRWeathers`          | [`PbrWeatherData`]         |

use std::any::Any;
use std::fs;
use std::path::{Path, PathBuf};

use bytemuck::{Pod, Zeroable};
use log::{error, info, warn};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::settings::load_lenient;
use super::ui::SettingsUi;
use super::weather::SkyMode;
use super::{Feature, FrameContext, FrameInput};
use crate::errors::Result;
use crate::renderer::core::{BufferDesc, BufferId, RenderDevice, write_constants};
use crate::renderer::pipeline::permutation::{pbr_grass_rules, pbr_lighting_pixel_rules, pbr_lighting_vertex_rules};
use crate::renderer::pipeline::{Descriptor, GrassFlags, GrassTechnique, LightingFlags, PermutationRule, ShaderType};

// ─── Records ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PbrTextureSetData {
    pub roughness_scale: f32,
    pub displacement_scale: f32,
    pub specular_level: f32,
    pub subsurface_color: [f32; 3],
    pub subsurface_opacity: f32,
    pub coat_color: [f32; 3],
    pub coat_strength: f32,
    pub coat_roughness: f32,
    pub coat_specular_level: f32,
    pub inner_layer_displacement_offset: f32,
    pub fuzz_color: [f32; 3],
    pub fuzz_weight: f32,
}

impl Default for PbrTextureSetData {
    fn default() -> Self {
        Self {
            roughness_scale: 1.0,
            displacement_scale: 1.0,
            specular_level: 0.04,
            subsurface_color: [0.0; 3],
            subsurface_opacity: 0.0,
            coat_color: [1.0; 3],
            coat_strength: 1.0,
            coat_roughness: 1.0,
            coat_specular_level: 0.04,
            inner_layer_displacement_offset: 0.0,
            fuzz_color: [0.0; 3],
            fuzz_weight: 0.0,
        }
    }
}

impl PbrTextureSetData {
    fn from_config(config: &Value) -> Self {
        let mut data = Self::default();
        read_float(config, "roughnessScale", &mut data.roughness_scale);
        read_float(config, "displacementScale", &mut data.displacement_scale);
        read_float(config, "specularLevel", &mut data.specular_level);
        read_color(config, "subsurfaceColor", &mut data.subsurface_color);
        read_float(config, "subsurfaceOpacity", &mut data.subsurface_opacity);
        read_color(config, "coatColor", &mut data.coat_color);
        read_float(config, "coatStrength", &mut data.coat_strength);
        read_float(config, "coatRoughness", &mut data.coat_roughness);
        read_float(config, "coatSpecularLevel", &mut data.coat_specular_level);
        read_float(config, "innerLayerDisplacementOffset", &mut data.inner_layer_displacement_offset);
        read_color(config, "fuzzColor", &mut data.fuzz_color);
        read_float(config, "fuzzWeight", &mut data.fuzz_weight);
        data
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PbrMaterialObjectData {
    pub base_color_scale: [f32; 3],
    pub roughness: f32,
    pub specular_level: f32,
}

impl Default for PbrMaterialObjectData {
    fn default() -> Self {
        Self {
            base_color_scale: [1.0; 3],
            roughness: 1.0,
            specular_level: 1.0,
        }
    }
}

impl PbrMaterialObjectData {
    fn from_config(config: &Value) -> Self {
        let mut data = Self::default();
        read_color(config, "baseColorScale", &mut data.base_color_scale);
        read_float(config, "roughness", &mut data.roughness);
        read_float(config, "specularLevel", &mut data.specular_level);
        data
    }
}

/// Light scales shared by lighting template and weather records.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PbrLightScales {
    pub directional_light_color_scale: f32,
    pub directional_ambient_light_color_scale: f32,
}

impl Default for PbrLightScales {
    fn default() -> Self {
        Self {
            directional_light_color_scale: 1.0,
            directional_ambient_light_color_scale: 1.0,
        }
    }
}

impl PbrLightScales {
    fn from_config(config: &Value) -> Self {
        let mut data = Self::default();
        read_float(config, "directionalLightColorScale", &mut data.directional_light_color_scale);
        read_float(
            config,
            "directionalAmbientLightColorScale",
            &mut data.directional_ambient_light_color_scale,
        );
        data
    }

    fn to_config(self) -> Value {
        json!({
            "directionalLightColorScale": self.directional_light_color_scale,
            "directionalAmbientLightColorScale": self.directional_ambient_light_color_scale,
        })
    }
}

pub type PbrLightingTemplateData = PbrLightScales;
pub type PbrWeatherData = PbrLightScales;

pub const TEXTURE_SETS_DIR: &str = "PBRTextureSets";
pub const MATERIAL_OBJECTS_DIR: &str = "PBRMaterialObjects";
pub const LIGHTING_TEMPLATES_DIR: &str = "PBRLightingTemplates";
pub const WEATHERS_DIR: &str = "PBRWeathers";

/// Reads a float field. Integers and other types are ignored.
fn read_float(config: &Value, key: &str, out: &mut f32) -> bool {
    match config.get(key) {
        Some(Value::Number(n)) if n.is_f64() => {
            *out = n.as_f64().unwrap_or_default() as f32;
            true
        }
        _ => false,
    }
}

/// Reads a three-float array field.
fn read_color(config: &Value, key: &str, out: &mut [f32; 3]) -> bool {
    let Some(Value::Array(items)) = config.get(key) else {
        return false;
    };
    if items.len() != 3 || !items.iter().all(|v| v.as_number().is_some_and(serde_json::Number::is_f64)) {
        return false;
    }
    for (dst, src) in out.iter_mut().zip(items) {
        *dst = src.as_f64().unwrap_or_default() as f32;
    }
    true
}

/// Calls `reader(editor_id, config)` for every `*.json` file in `root`.
///
/// A missing directory is silently empty. Unreadable or malformed files are
/// logged and skipped. Returns the number of records read.
pub fn read_record_configs(root: &Path, mut reader: impl FnMut(&str, &Value)) -> usize {
    let Ok(dir) = fs::read_dir(root) else {
        return 0;
    };

    let mut configs: Vec<PathBuf> = dir
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")))
        .collect();
    configs.sort();

    if configs.is_empty() {
        warn!(
            "[TruePBR] no .json files were found within the {} folder, aborting...",
            root.display()
        );
        return 0;
    }
    info!("[TruePBR] {} matching jsons found", configs.len());

    let mut read = 0;
    for path in configs {
        info!("[TruePBR] loading json : {}", path.display());
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                error!("[TruePBR] failed to read {} : {e}", path.display());
                continue;
            }
        };
        let config: Value = match serde_json::from_str(&text) {
            Ok(config) => config,
            Err(e) => {
                error!("[TruePBR] failed to parse {} : {e}", path.display());
                continue;
            }
        };
        let Some(editor_id) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        reader(editor_id, &config);
        read += 1;
    }
    read
}

/// Writes `{root}/{editor_id}.json`, creating `root` if needed.
pub fn save_record_config(root: &Path, editor_id: &str, config: &Value) -> Result<PathBuf> {
    fs::create_dir_all(root)?;
    let path = root.join(format!("{editor_id}.json"));

    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    config.serialize(&mut serializer)?;
    fs::write(&path, out)?;
    Ok(path)
}

fn load_records<T>(root: &Path, parse: impl Fn(&Value) -> T) -> FxHashMap<String, T> {
    let mut records = FxHashMap::default();
    read_record_configs(root, |editor_id, config| {
        records.insert(editor_id.to_string(), parse(config));
    });
    records
}

// ─── Render-pass remapping ───────────────────────────────────────────────────

/// Offset between lighting render-pass ids and lighting descriptors.
pub const LIGHTING_PASS_BASE: u32 = 0x4800_002D;
/// Grass pass rendering PBR grass.
pub const GRASS_PBR_PASS: u32 = 0x5C00_0042;
/// Grass depth pass; left untouched for PBR grass.
pub const GRASS_DEPTH_PASS: u32 = 0x5C00_005C;

/// Lighting flag bits 3..=5, reused for PBR by the remap.
const LIGHTING_REMAP_CLEAR: u32 = 0b11_1000;

/// Host material classification relevant to PBR detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialFeature {
    Default,
    MultiTexLandLodBlend,
    Other,
}

/// A lighting material is PBR when it carries the vertex-lighting property
/// flag on a default or LOD-blended landscape material.
#[must_use]
pub fn is_pbr_material(vertex_lighting: bool, feature: MaterialFeature) -> bool {
    vertex_lighting && matches!(feature, MaterialFeature::Default | MaterialFeature::MultiTexLandLodBlend)
}

/// Clears flag bits 3..=5 and sets `TRUE_PBR` for PBR materials.
#[must_use]
pub fn remap_lighting_descriptor(descriptor: Descriptor, is_pbr: bool) -> Descriptor {
    let mut flags = descriptor.flags() & !LIGHTING_REMAP_CLEAR;
    if is_pbr {
        flags |= LightingFlags::TRUE_PBR.bits();
    }
    descriptor.with_flags(flags)
}

/// [`remap_lighting_descriptor`] over a raw lighting pass id.
#[must_use]
pub fn remap_lighting_pass(pass: u32, is_pbr: bool) -> u32 {
    let descriptor = Descriptor::from_raw(pass.wrapping_sub(LIGHTING_PASS_BASE));
    remap_lighting_descriptor(descriptor, is_pbr)
        .raw()
        .wrapping_add(LIGHTING_PASS_BASE)
}

/// Moves every PBR grass pass except depth onto [`GRASS_PBR_PASS`].
#[must_use]
pub fn remap_grass_pass(pass: u32, is_pbr: bool) -> u32 {
    if is_pbr && pass != GRASS_DEPTH_PASS {
        GRASS_PBR_PASS
    } else {
        pass
    }
}

/// Descriptor used to draw [`GRASS_PBR_PASS`].
#[must_use]
pub fn grass_pbr_descriptor(early_z: bool) -> Descriptor {
    let mut flags = GrassFlags::TRUE_PBR;
    if early_z {
        flags |= GrassFlags::ALPHA_TEST;
    }
    Descriptor::encode(u32::from(GrassTechnique::None.id()), flags.bits())
}

// ─── Settings ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TruePbrConfig {
    #[serde(rename = "Use Multiple Scattering")]
    pub use_multiple_scattering: bool,
    #[serde(rename = "Use Multi-bounce AO")]
    pub use_multi_bounce_ao: bool,
    #[serde(rename = "Direct Light Color Multiplier")]
    pub direct_light_color_multiplier: f32,
    #[serde(rename = "Ambient Light Color Multiplier")]
    pub ambient_light_color_multiplier: f32,
}

impl Default for TruePbrConfig {
    fn default() -> Self {
        Self {
            use_multiple_scattering: true,
            use_multi_bounce_ao: true,
            direct_light_color_multiplier: 1.0,
            ambient_light_color_multiplier: 1.0,
        }
    }
}

/// Per-frame PBR constants.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct TruePbrPerFrame {
    pub use_multiple_scattering: u32,
    pub use_multi_bounce_ao: u32,
    pub directional_light_color_multiplier: f32,
    pub point_light_color_multiplier: f32,
    pub ambient_light_color_multiplier: f32,
    pub pad: [u32; 3],
}

/// Where the frame's light scales came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScaleSource {
    LightingTemplate(String),
    Weather(String),
    None,
}

// ─── Feature ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct TruePbr {
    pub config: TruePbrConfig,
    pub texture_sets: FxHashMap<String, PbrTextureSetData>,
    pub material_objects: FxHashMap<String, PbrMaterialObjectData>,
    pub lighting_templates: FxHashMap<String, PbrLightingTemplateData>,
    pub weathers: FxHashMap<String, PbrWeatherData>,
    /// Record scales applied this frame.
    pub frame_scales: PbrLightScales,
    pub frame_source: ScaleSource,
    data_root: PathBuf,
    per_frame: Option<BufferId>,
}

impl Default for TruePbr {
    fn default() -> Self {
        Self::new("Data")
    }
}

impl TruePbr {
    pub const SHORT_NAME: &'static str = "TruePBR";

    /// `data_root` holds the record directories.
    #[must_use]
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            config: TruePbrConfig::default(),
            texture_sets: FxHashMap::default(),
            material_objects: FxHashMap::default(),
            lighting_templates: FxHashMap::default(),
            weathers: FxHashMap::default(),
            frame_scales: PbrLightScales::default(),
            frame_source: ScaleSource::None,
            data_root: data_root.into(),
            per_frame: None,
        }
    }

    #[must_use]
    pub fn per_frame_buffer(&self) -> Option<BufferId> {
        self.per_frame
    }

    /// Reloads all four record directories.
    pub fn load_records(&mut self) {
        info!("[TruePBR] loading PBR texture set configs");
        self.texture_sets = load_records(&self.data_root.join(TEXTURE_SETS_DIR), PbrTextureSetData::from_config);
        info!("[TruePBR] loading PBR material object configs");
        self.material_objects =
            load_records(&self.data_root.join(MATERIAL_OBJECTS_DIR), PbrMaterialObjectData::from_config);
        info!("[TruePBR] loading PBR lighting template configs");
        self.lighting_templates =
            load_records(&self.data_root.join(LIGHTING_TEMPLATES_DIR), PbrLightScales::from_config);
        info!("[TruePBR] loading PBR weather configs");
        self.weathers = load_records(&self.data_root.join(WEATHERS_DIR), PbrLightScales::from_config);
    }

    #[must_use]
    pub fn is_pbr_texture_set(&self, editor_id: &str) -> bool {
        self.texture_sets.contains_key(editor_id)
    }

    #[must_use]
    pub fn is_pbr_material_object(&self, editor_id: &str) -> bool {
        self.material_objects.contains_key(editor_id)
    }

    pub fn save_lighting_template(&self, editor_id: &str) -> Result<PathBuf> {
        let data = self.lighting_templates.get(editor_id).copied().unwrap_or_default();
        save_record_config(&self.data_root.join(LIGHTING_TEMPLATES_DIR), editor_id, &data.to_config())
    }

    pub fn save_weather(&self, editor_id: &str) -> Result<PathBuf> {
        let data = self.weathers.get(editor_id).copied().unwrap_or_default();
        save_record_config(&self.data_root.join(WEATHERS_DIR), editor_id, &data.to_config())
    }

    /// Picks this frame's record scales and composes the per-frame constants.
    pub fn setup_frame(&mut self, input: &FrameInput) -> TruePbrPerFrame {
        let (source, scales) = if input.sky.mode == SkyMode::Interior {
            match &input.lighting_template {
                Some(id) => (
                    ScaleSource::LightingTemplate(id.clone()),
                    self.lighting_templates.get(id).copied().unwrap_or_default(),
                ),
                None => (ScaleSource::None, PbrLightScales::default()),
            }
        } else {
            match &input.sky.current {
                Some(weather) => (
                    ScaleSource::Weather(weather.editor_id.clone()),
                    self.weathers.get(&weather.editor_id).copied().unwrap_or_default(),
                ),
                None => (ScaleSource::None, PbrLightScales::default()),
            }
        };
        self.frame_source = source;
        self.frame_scales = scales;

        let config = &self.config;
        TruePbrPerFrame {
            use_multiple_scattering: u32::from(config.use_multiple_scattering),
            use_multi_bounce_ao: u32::from(config.use_multi_bounce_ao),
            directional_light_color_multiplier: config.direct_light_color_multiplier
                * scales.directional_light_color_scale,
            point_light_color_multiplier: config.direct_light_color_multiplier,
            ambient_light_color_multiplier: config.ambient_light_color_multiplier
                * scales.directional_ambient_light_color_scale,
            pad: [0; 3],
        }
    }

    fn draw_scale_editor(ui: &mut dyn SettingsUi, data: &mut PbrLightScales) -> bool {
        ui.slider_f32("Directional Light Scale", &mut data.directional_light_color_scale, 0.0..=5.0);
        ui.slider_f32(
            "Directional Ambient Light Scale",
            &mut data.directional_ambient_light_color_scale,
            0.0..=5.0,
        );
        ui.button("Save")
    }
}

impl Feature for TruePbr {
    fn name(&self) -> &str {
        "True PBR"
    }

    fn short_name(&self) -> &str {
        Self::SHORT_NAME
    }

    fn supports_vr(&self) -> bool {
        true
    }

    fn is_core(&self) -> bool {
        true
    }

    fn setup_resources(&mut self, device: &mut dyn RenderDevice) -> Result<()> {
        self.load_records();
        self.per_frame = Some(device.create_buffer(&BufferDesc::constant::<TruePbrPerFrame>("TruePBR::PerFrame"))?);
        Ok(())
    }

    fn prepass(&mut self, ctx: &mut FrameContext<'_>) {
        let data = self.setup_frame(ctx.input);
        if let Some(buffer) = self.per_frame {
            write_constants(ctx.device, buffer, &data);
        }
    }

    fn teardown(&mut self, device: &mut dyn RenderDevice) {
        if let Some(buffer) = self.per_frame.take() {
            device.release(buffer.into());
        }
    }

    fn load_settings(&mut self, doc: &Value) {
        self.config = load_lenient(Self::SHORT_NAME, doc);
    }

    fn save_settings(&self) -> Result<Value> {
        Ok(serde_json::to_value(self.config)?)
    }

    fn restore_default_settings(&mut self) {
        self.config = TruePbrConfig::default();
    }

    fn draw_settings(&mut self, ui: &mut dyn SettingsUi) {
        if !ui.tree_node("PBR") {
            return;
        }

        match self.frame_source.clone() {
            ScaleSource::LightingTemplate(id) => {
                if ui.tree_node("Lighting Template Settings") {
                    ui.text(&format!("Current Lighting Template : {id}"));
                    let data = self.lighting_templates.entry(id.clone()).or_default();
                    if Self::draw_scale_editor(ui, data)
                        && let Err(e) = self.save_lighting_template(&id)
                    {
                        error!("[TruePBR] failed to save lighting template {id} : {e}");
                    }
                    ui.tree_pop();
                }
            }
            ScaleSource::Weather(id) => {
                if ui.tree_node("Weather Settings") {
                    ui.text(&format!("Current Weather : {id}"));
                    let data = self.weathers.entry(id.clone()).or_default();
                    if Self::draw_scale_editor(ui, data)
                        && let Err(e) = self.save_weather(&id)
                    {
                        error!("[TruePBR] failed to save weather {id} : {e}");
                    }
                    ui.tree_pop();
                }
            }
            ScaleSource::None => {}
        }

        let config = &mut self.config;
        ui.checkbox("Use Multiple Scattering", &mut config.use_multiple_scattering);
        ui.checkbox("Use Multi-bounce AO", &mut config.use_multi_bounce_ao);
        ui.slider_f32_log(
            "Direct Light Color Multiplier",
            &mut config.direct_light_color_multiplier,
            1e-3..=1e2,
        );
        ui.slider_f32_log(
            "Ambient Light Color Multiplier",
            &mut config.ambient_light_color_multiplier,
            1e-3..=1e2,
        );
        ui.tree_pop();
    }

    fn shader_permutations(&self) -> Vec<(ShaderType, PermutationRule)> {
        let lighting = pbr_lighting_vertex_rules()
            .into_iter()
            .chain(pbr_lighting_pixel_rules())
            .map(|rule| (ShaderType::Lighting, rule));
        let grass = pbr_grass_rules().into_iter().map(|rule| (ShaderType::Grass, rule));
        lighting.chain(grass).collect()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::pipeline::LightingTechnique;

    #[test]
    fn float_reader_ignores_integers() {
        let config = json!({ "roughnessScale": 2, "specularLevel": 0.5, "coatColor": [0.5, 0.5, 1] });
        let data = PbrTextureSetData::from_config(&config);
        assert_eq!(data.roughness_scale, 1.0);
        assert_eq!(data.specular_level, 0.5);
        assert_eq!(data.coat_color, [1.0; 3]);
    }

    #[test]
    fn lighting_remap_clears_bits_and_marks_pbr() {
        let tech = u32::from(LightingTechnique::TreeAnim.id());
        let flags = LightingFlags::VC.bits() | 0b11_0000 | LightingFlags::SKINNED.bits();
        let remapped = remap_lighting_descriptor(Descriptor::encode(tech, flags), true);
        assert_eq!(remapped.technique().raw(), LightingTechnique::TreeAnim.id());
        assert_eq!(
            remapped.flags(),
            LightingFlags::VC.bits() | LightingFlags::SKINNED.bits() | LightingFlags::TRUE_PBR.bits()
        );

        let not_pbr = remap_lighting_descriptor(Descriptor::encode(tech, flags), false);
        assert_eq!(not_pbr.flags() & LIGHTING_REMAP_CLEAR, 0);
    }

    #[test]
    fn lighting_pass_round_trips_through_base() {
        let descriptor = Descriptor::encode(u32::from(LightingTechnique::MTLand.id()), LightingFlags::VC.bits());
        let pass = descriptor.raw() + LIGHTING_PASS_BASE;
        let remapped = remap_lighting_pass(pass, true);
        assert_eq!(
            remapped - LIGHTING_PASS_BASE,
            descriptor.with_flags(descriptor.flags() | LightingFlags::TRUE_PBR.bits()).raw()
        );
    }

    #[test]
    fn grass_depth_pass_is_kept() {
        assert_eq!(remap_grass_pass(GRASS_DEPTH_PASS, true), GRASS_DEPTH_PASS);
        assert_eq!(remap_grass_pass(0x5C00_0001, true), GRASS_PBR_PASS);
        assert_eq!(remap_grass_pass(0x5C00_0001, false), 0x5C00_0001);
        assert_eq!(
            grass_pbr_descriptor(true).flags(),
            (GrassFlags::TRUE_PBR | GrassFlags::ALPHA_TEST).bits()
        );
    }

    #[test]
    fn pbr_material_detection() {
        assert!(is_pbr_material(true, MaterialFeature::Default));
        assert!(is_pbr_material(true, MaterialFeature::MultiTexLandLodBlend));
        assert!(!is_pbr_material(true, MaterialFeature::Other));
        assert!(!is_pbr_material(false, MaterialFeature::Default));
    }
}

//! Dynamic Cubemaps
//!
//! Captures the surroundings into cubemaps on the GPU, spread over six frames
//! so no single frame pays for a full capture:
//!
//! ```text
//! Capture ─▶ Inference ─▶ Irradiance ─▶ Capture2 ─▶ Inference2 ─▶ Irradiance2 ─┐
//!    ▲                                                                          │
//!    └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The first three tasks refresh the environment cubemap, the last three the
//! reflection cubemap. Each task runs one compute pass:
//!
//! | Task        | Compute technique    | Output                               |
//! |-------------|----------------------|--------------------------------------|
//! | Capture     | `UpdateCubemap`      | capture, raw capture, position       |
//! | Inference   | `InferCubemap`       | inferred cubemap, copied to the face |
//! | Irradiance  | `SpecularIrradiance` | one dispatch per mip of the face     |
//!
//! Reflection work is skipped while reflections are inactive; the cycle
//! still advances and the default cubemap stands in for the reflections.

use std::any::Any;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smallvec::smallvec;

use super::settings::load_lenient;
use super::ui::{SettingsUi, checkbox_u32};
use super::{Feature, FrameContext};
use crate::errors::Result;
use crate::renderer::core::{
    AddressMode, BufferDesc, BufferId, ComputeBindings, FilterMode, RenderDevice, ResourceId,
    SamplerDesc, SamplerId, StorageViewId, TextureDesc, TextureFormat, TextureId, write_constants,
};
use crate::renderer::pipeline::permutation::cubemap_compute_rules;
use crate::renderer::pipeline::{
    ComputeFlags, ComputeTechnique, Descriptor, PermutationRule, ShaderModuleHandle, ShaderStage,
    ShaderType, ShaderVariantCache, VariantKey, VariantLookup,
};

/// Edge length of every cubemap face.
pub const CAPTURE_SIZE: u32 = 128;
/// Mips of the filtered environment cubemaps.
pub const ENV_MIP_LEVELS: u32 = 7;
/// Compute thread group edge.
pub const GROUP_SIZE: u32 = 8;
/// Pixel-shader slot of the environment cubemap; reflections follow it.
pub const ENV_TEXTURE_SLOT: u32 = 64;

// ─── Capture cycle ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CaptureTask {
    #[default]
    Capture,
    Inference,
    Irradiance,
    Capture2,
    Inference2,
    Irradiance2,
}

/// Which cubemap a task works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureFace {
    Environment = 0,
    Reflections = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureStage {
    Capture,
    Inference,
    Irradiance,
}

const TRANSITIONS: [(CaptureTask, CaptureTask); 6] = [
    (CaptureTask::Capture, CaptureTask::Inference),
    (CaptureTask::Inference, CaptureTask::Irradiance),
    (CaptureTask::Irradiance, CaptureTask::Capture2),
    (CaptureTask::Capture2, CaptureTask::Inference2),
    (CaptureTask::Inference2, CaptureTask::Irradiance2),
    (CaptureTask::Irradiance2, CaptureTask::Capture),
];

impl CaptureTask {
    #[must_use]
    pub fn next(self) -> Self {
        TRANSITIONS
            .iter()
            .find(|(from, _)| *from == self)
            .map_or(Self::Capture, |&(_, to)| to)
    }

    #[must_use]
    pub fn face(self) -> CaptureFace {
        match self {
            Self::Capture | Self::Inference | Self::Irradiance => CaptureFace::Environment,
            Self::Capture2 | Self::Inference2 | Self::Irradiance2 => CaptureFace::Reflections,
        }
    }

    #[must_use]
    pub fn stage(self) -> CaptureStage {
        match self {
            Self::Capture | Self::Capture2 => CaptureStage::Capture,
            Self::Inference | Self::Inference2 => CaptureStage::Inference,
            Self::Irradiance | Self::Irradiance2 => CaptureStage::Irradiance,
        }
    }
}

// ─── GPU data ────────────────────────────────────────────────────────────────

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
#[serde(default)]
#[allow(non_snake_case)]
pub struct DynamicCubemapsSettings {
    pub EnabledCreator: u32,
    pub EnabledSSR: u32,
    #[serde(skip)]
    pub pad0: [u32; 2],
    /// Creator tint in `rgb`, roughness in `a`.
    pub CubemapColor: [f32; 4],
}

impl Default for DynamicCubemapsSettings {
    fn default() -> Self {
        Self {
            EnabledCreator: 0,
            EnabledSSR: 1,
            pad0: [0; 2],
            CubemapColor: [1.0, 1.0, 1.0, 0.0],
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct SpecularMapFilterSettingsCB {
    pub roughness: f32,
    pub pad: [f32; 3],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct UpdateCubemapCB {
    pub camera_previous_pos_adjust: [f32; 3],
    pub pad0: u32,
}

/// Roughness filtered into `mip`.
#[must_use]
pub fn mip_roughness(mip: u32) -> f32 {
    mip as f32 / (ENV_MIP_LEVELS - 1) as f32
}

/// Thread groups covering all six faces of one mip.
#[must_use]
pub fn dispatch_groups(mip: u32) -> [u32; 3] {
    let size = (CAPTURE_SIZE >> mip).max(1);
    let groups = size.div_ceil(GROUP_SIZE);
    [groups, groups, 6]
}

/// Device resources, indexed by [`CaptureFace`] where paired.
#[derive(Debug, Clone)]
struct CubemapResources {
    capture: [TextureId; 2],
    capture_raw: [TextureId; 2],
    capture_position: [TextureId; 2],
    capture_views: [[StorageViewId; 3]; 2],
    env: [TextureId; 2],
    env_mips: [[StorageViewId; ENV_MIP_LEVELS as usize]; 2],
    inferred: TextureId,
    inferred_view: StorageViewId,
    default_cubemap: TextureId,
    sampler: SamplerId,
    update_cb: BufferId,
    filter_cb: BufferId,
    settings_cb: BufferId,
}

impl CubemapResources {
    fn create(device: &mut dyn RenderDevice) -> Result<Self> {
        let cube = |label: &str, mips, format| TextureDesc::cube(label, CAPTURE_SIZE, mips, format);
        let hdr = TextureFormat::Rgba16Float;

        let capture = [
            device.create_texture(&cube("envCapture", 1, hdr))?,
            device.create_texture(&cube("envCaptureReflections", 1, hdr))?,
        ];
        let capture_raw = [
            device.create_texture(&cube("envCaptureRaw", 1, hdr))?,
            device.create_texture(&cube("envCaptureRawReflections", 1, hdr))?,
        ];
        let capture_position = [
            device.create_texture(&cube("envCapturePosition", 1, TextureFormat::Rgba32Float))?,
            device.create_texture(&cube("envCapturePositionReflections", 1, TextureFormat::Rgba32Float))?,
        ];
        let mut capture_views = [[StorageViewId(0); 3]; 2];
        for face in 0..2 {
            capture_views[face] = [
                device.create_storage_view(capture[face], 0)?,
                device.create_storage_view(capture_raw[face], 0)?,
                device.create_storage_view(capture_position[face], 0)?,
            ];
        }

        let env = [
            device.create_texture(&cube("envTexture", ENV_MIP_LEVELS, hdr))?,
            device.create_texture(&cube("envReflectionsTexture", ENV_MIP_LEVELS, hdr))?,
        ];
        let mut env_mips = [[StorageViewId(0); ENV_MIP_LEVELS as usize]; 2];
        for face in 0..2 {
            for (mip, view) in env_mips[face].iter_mut().enumerate() {
                *view = device.create_storage_view(env[face], mip as u32)?;
            }
        }

        let inferred = device.create_texture(&cube("envInferred", 1, hdr))?;
        let inferred_view = device.create_storage_view(inferred, 0)?;

        let default_cubemap = device.create_texture(&TextureDesc {
            storage: false,
            ..TextureDesc::cube("defaultCubemap", 1, 1, TextureFormat::Rgba8Unorm)
        })?;
        device.clear_texture(default_cubemap, [0.0, 0.0, 0.0, 0.0]);

        let sampler = device.create_sampler(&SamplerDesc {
            label: "DynamicCubemaps::Sampler".to_string(),
            filter: FilterMode::Linear,
            address: AddressMode::Clamp,
        })?;

        Ok(Self {
            capture,
            capture_raw,
            capture_position,
            capture_views,
            env,
            env_mips,
            inferred,
            inferred_view,
            default_cubemap,
            sampler,
            update_cb: device.create_buffer(&BufferDesc::constant::<UpdateCubemapCB>("UpdateCubemapCB"))?,
            filter_cb: device.create_buffer(&BufferDesc::constant::<SpecularMapFilterSettingsCB>(
                "SpecularMapFilterSettingsCB",
            ))?,
            settings_cb: device.create_buffer(&BufferDesc::constant::<DynamicCubemapsSettings>(
                "DynamicCubemaps::Settings",
            ))?,
        })
    }

    fn release(self, device: &mut dyn RenderDevice) {
        let textures = self
            .capture
            .into_iter()
            .chain(self.capture_raw)
            .chain(self.capture_position)
            .chain(self.env)
            .chain([self.inferred, self.default_cubemap]);
        for texture in textures {
            device.release(texture.into());
        }
        let views = self
            .capture_views
            .into_iter()
            .flatten()
            .chain(self.env_mips.into_iter().flatten())
            .chain([self.inferred_view]);
        for view in views {
            device.release(view.into());
        }
        for buffer in [self.update_cb, self.filter_cb, self.settings_cb] {
            device.release(buffer.into());
        }
        device.release(self.sampler.into());
    }
}

// ─── Feature ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct DynamicCubemaps {
    pub settings: DynamicCubemapsSettings,
    pub next_task: CaptureTask,
    /// Pending clear of each face's raw capture.
    pub reset_capture: [bool; 2],
    /// Whether the scene currently needs the reflection cubemap.
    pub active_reflections: bool,
    /// Reflections are synthesized from the environment capture.
    pub fake_reflections: bool,
    previous_camera: [Option<Vec3>; 2],
    resources: Option<CubemapResources>,
}

impl Default for DynamicCubemaps {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamicCubemaps {
    pub const SHORT_NAME: &'static str = "DynamicCubemaps";

    #[must_use]
    pub fn new() -> Self {
        Self {
            settings: DynamicCubemapsSettings::default(),
            next_task: CaptureTask::Capture,
            reset_capture: [true, true],
            active_reflections: false,
            fake_reflections: false,
            previous_camera: [None; 2],
            resources: None,
        }
    }

    /// Environment cubemap handed to the lighting shaders.
    #[must_use]
    pub fn env_texture(&self) -> Option<TextureId> {
        self.resources.as_ref().map(|r| r.env[0])
    }

    /// Reflection cubemap, or the default cubemap while reflections are off.
    #[must_use]
    pub fn reflection_source(&self) -> Option<TextureId> {
        self.resources.as_ref().map(|r| {
            if self.active_reflections {
                r.env[1]
            } else {
                r.default_cubemap
            }
        })
    }

    /// Compute variant for a task stage on `face`.
    #[must_use]
    pub fn variant_key(&self, stage: CaptureStage, face: CaptureFace) -> VariantKey {
        let technique = match stage {
            CaptureStage::Capture => ComputeTechnique::UpdateCubemap,
            CaptureStage::Inference => ComputeTechnique::InferCubemap,
            CaptureStage::Irradiance => ComputeTechnique::SpecularIrradiance,
        };
        let flags = match (stage, face) {
            (CaptureStage::Irradiance, _) | (_, CaptureFace::Environment) => ComputeFlags::empty(),
            (_, CaptureFace::Reflections) if self.fake_reflections => ComputeFlags::FAKE_REFLECTIONS,
            (_, CaptureFace::Reflections) => ComputeFlags::REFLECTIONS,
        };
        VariantKey::new(
            ShaderType::Compute,
            Descriptor::encode(u32::from(technique.id()), flags.bits()),
            ShaderStage::Compute,
        )
    }

    /// Runs the pending task and moves to the next one.
    pub fn advance(&mut self, ctx: &mut FrameContext<'_>) -> CaptureTask {
        let task = self.next_task;
        let face = task.face();
        let skip = face == CaptureFace::Reflections && !self.active_reflections;

        if !skip && let Some(resources) = self.resources.clone() {
            match task.stage() {
                CaptureStage::Capture => self.update_capture(ctx, &resources, face),
                CaptureStage::Inference => self.inference(ctx, &resources, face),
                CaptureStage::Irradiance => self.irradiance(ctx, &resources, face),
            }
        }

        self.next_task = task.next();
        task
    }

    fn shader(&self, shaders: &ShaderVariantCache, stage: CaptureStage, face: CaptureFace) -> Option<ShaderModuleHandle> {
        let key = self.variant_key(stage, face);
        match shaders.lookup(key) {
            VariantLookup::Ready(variant) => Some(variant.module),
            VariantLookup::Compiling => {
                debug!("[DynamicCubemaps] {key} not ready, skipping");
                None
            }
            VariantLookup::Failed(e) => {
                warn!("[DynamicCubemaps] {key} unavailable: {e}");
                None
            }
        }
    }

    fn update_capture(&mut self, ctx: &mut FrameContext<'_>, res: &CubemapResources, face: CaptureFace) {
        let f = face as usize;
        let device = &mut *ctx.device;

        if self.reset_capture[f] {
            device.clear_texture(res.capture_raw[f], [0.0; 4]);
            device.clear_texture(res.capture_position[f], [0.0; 4]);
            self.reset_capture[f] = false;
            self.previous_camera[f] = None;
        }

        let camera = ctx.input.camera_position;
        let previous = self.previous_camera[f].replace(camera).unwrap_or(camera);
        write_constants(
            device,
            res.update_cb,
            &UpdateCubemapCB {
                camera_previous_pos_adjust: (previous - camera).to_array(),
                pad0: 0,
            },
        );

        let Some(shader) = self.shader(ctx.shaders, CaptureStage::Capture, face) else {
            return;
        };
        device.bind_compute(&ComputeBindings {
            constant_buffers: smallvec![res.update_cb],
            storage_views: res.capture_views[f].into_iter().collect(),
            samplers: smallvec![res.sampler],
            ..Default::default()
        });
        device.dispatch(shader, dispatch_groups(0));
        device.bind_compute(&ComputeBindings::default());
    }

    fn inference(&mut self, ctx: &mut FrameContext<'_>, res: &CubemapResources, face: CaptureFace) {
        let f = face as usize;
        let Some(shader) = self.shader(ctx.shaders, CaptureStage::Inference, face) else {
            return;
        };
        let device = &mut *ctx.device;
        device.bind_compute(&ComputeBindings {
            shader_resources: smallvec![res.capture[f], res.default_cubemap],
            storage_views: smallvec![res.inferred_view],
            samplers: smallvec![res.sampler],
            ..Default::default()
        });
        device.dispatch(shader, dispatch_groups(0));
        device.bind_compute(&ComputeBindings::default());
        device.copy_texture(res.inferred, res.env[f]);
    }

    fn irradiance(&mut self, ctx: &mut FrameContext<'_>, res: &CubemapResources, face: CaptureFace) {
        let f = face as usize;
        let Some(shader) = self.shader(ctx.shaders, CaptureStage::Irradiance, face) else {
            return;
        };
        let device = &mut *ctx.device;
        for mip in 0..ENV_MIP_LEVELS {
            write_constants(
                device,
                res.filter_cb,
                &SpecularMapFilterSettingsCB {
                    roughness: mip_roughness(mip),
                    pad: [0.0; 3],
                },
            );
            device.bind_compute(&ComputeBindings {
                constant_buffers: smallvec![res.filter_cb],
                shader_resources: smallvec![res.inferred],
                storage_views: smallvec![res.env_mips[f][mip as usize]],
                samplers: smallvec![res.sampler],
            });
            device.dispatch(shader, dispatch_groups(mip));
        }
        device.bind_compute(&ComputeBindings::default());
    }
}

impl Feature for DynamicCubemaps {
    fn name(&self) -> &str {
        "Dynamic Cubemaps"
    }

    fn short_name(&self) -> &str {
        Self::SHORT_NAME
    }

    fn shader_define_name(&self) -> Option<&str> {
        Some("DYNAMIC_CUBEMAPS")
    }

    fn has_shader_define(&self, _shader_type: ShaderType) -> bool {
        true
    }

    fn shader_define_options(&self) -> Vec<(&'static str, &'static str)> {
        let mut options = Vec::new();
        if self.settings.EnabledSSR != 0 {
            options.push(("ENABLE_SSR", ""));
        }
        if self.settings.EnabledCreator != 0 {
            options.push(("CREATOR", ""));
        }
        options
    }

    fn supports_vr(&self) -> bool {
        true
    }

    fn is_core(&self) -> bool {
        true
    }

    fn setup_resources(&mut self, device: &mut dyn RenderDevice) -> Result<()> {
        self.resources = Some(CubemapResources::create(device)?);
        info!("[DynamicCubemaps] {CAPTURE_SIZE}px capture ready");
        Ok(())
    }

    fn reset(&mut self) {
        self.reset_capture = [true, true];
    }

    fn prepass(&mut self, ctx: &mut FrameContext<'_>) {
        if let Some(res) = &self.resources {
            write_constants(ctx.device, res.settings_cb, &self.settings);
            let reflections = if self.active_reflections {
                res.env[1]
            } else {
                res.default_cubemap
            };
            ctx.device
                .bind_pixel_resources(ENV_TEXTURE_SLOT, &[ResourceId::from(res.env[0]), reflections.into()]);
        }
        self.advance(ctx);
    }

    fn teardown(&mut self, device: &mut dyn RenderDevice) {
        if let Some(resources) = self.resources.take() {
            resources.release(device);
        }
    }

    fn load_settings(&mut self, doc: &Value) {
        self.settings = load_lenient(Self::SHORT_NAME, doc);
    }

    fn save_settings(&self) -> Result<Value> {
        Ok(serde_json::to_value(self.settings)?)
    }

    fn restore_default_settings(&mut self) {
        self.settings = DynamicCubemapsSettings::default();
    }

    fn draw_settings(&mut self, ui: &mut dyn SettingsUi) {
        if !ui.tree_node("Dynamic Cubemaps") {
            return;
        }
        let s = &mut self.settings;
        checkbox_u32(ui, "Enable Screen Space Reflections", &mut s.EnabledSSR);
        ui.tooltip("Requires a shader recompile.");
        checkbox_u32(ui, "Enable Creator", &mut s.EnabledCreator);
        if s.EnabledCreator != 0 {
            let [r, g, b, roughness] = &mut s.CubemapColor;
            let mut color = [*r, *g, *b];
            if ui.color_edit("Color", &mut color) {
                [*r, *g, *b] = color;
            }
            ui.slider_f32("Roughness", roughness, 0.0..=1.0);
        }
        ui.tree_pop();
    }

    fn shader_permutations(&self) -> Vec<(ShaderType, PermutationRule)> {
        cubemap_compute_rules()
            .into_iter()
            .map(|rule| (ShaderType::Compute, rule))
            .collect()
    }

    fn clear_shader_cache(&mut self, shaders: &ShaderVariantCache) {
        shaders.invalidate(Some(ShaderType::Compute));
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

    #[test]
    fn six_steps_close_the_cycle() {
        let mut task = CaptureTask::Capture;
        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(task);
            task = task.next();
        }
        assert_eq!(task, CaptureTask::Capture);
        assert_eq!(seen.len(), 6);
        assert_eq!(seen[3], CaptureTask::Capture2);
        assert_eq!(seen[3].face(), CaptureFace::Reflections);
    }

    #[test]
    fn roughness_spans_mips() {
        assert_eq!(mip_roughness(0), 0.0);
        assert_eq!(mip_roughness(6), 1.0);
        assert_eq!(dispatch_groups(0), [16, 16, 6]);
        assert_eq!(dispatch_groups(6), [1, 1, 6]);
    }

    #[test]
    fn reflection_variants_follow_fake_flag() {
        let mut feature = DynamicCubemaps::new();
        let key = feature.variant_key(CaptureStage::Inference, CaptureFace::Reflections);
        assert_eq!(key.descriptor.flags(), ComputeFlags::REFLECTIONS.bits());

        feature.fake_reflections = true;
        let key = feature.variant_key(CaptureStage::Capture, CaptureFace::Reflections);
        assert_eq!(key.descriptor.flags(), ComputeFlags::FAKE_REFLECTIONS.bits());

        let key = feature.variant_key(CaptureStage::Irradiance, CaptureFace::Reflections);
        assert_eq!(key.descriptor.flags(), 0);
    }

    #[test]
    fn define_options_follow_settings() {
        let mut feature = DynamicCubemaps::new();
        assert_eq!(feature.shader_define_options(), [("ENABLE_SSR", "")]);
        feature.settings.EnabledSSR = 0;
        feature.settings.EnabledCreator = 1;
        assert_eq!(feature.shader_define_options(), [("CREATOR", "")]);
    }

    #[test]
    fn settings_layout() {
        assert_eq!(std::mem::size_of::<DynamicCubemapsSettings>(), 32);
        assert_eq!(std::mem::size_of::<UpdateCubemapCB>(), 16);
    }
}

//! Render Features
//!
//! A feature is a pluggable unit of rendering behaviour: it owns settings,
//! device resources and per-frame constant buffers, contributes shader
//! defines and permutations, and is driven through a fixed lifecycle by the
//! [`FeatureRegistry`].
//!
//! # Lifecycle
//!
//! ```text
//! Unregistered ─register─▶ Registered ─setup_resources─▶ ResourcesReady
//!                                                            │ data_loaded
//!                                                            ▼
//!                       TornDown ◀─teardown── Suspended ◀─▶ Active
//! ```
//!
//! `prepass` and `draw` are only delivered to `Active` features, in
//! registration order. `teardown` is accepted from every state.

pub mod dynamic_cubemaps;
pub mod linear_lighting;
pub mod registry;
pub mod settings;
pub mod snow_cover;
pub mod true_pbr;
pub mod ui;
pub mod weather;
pub mod wetness_effects;

use std::any::Any;

use glam::Vec3;
use serde_json::Value;

use crate::errors::Result;
use crate::renderer::core::RenderDevice;
use crate::renderer::pipeline::{Descriptor, PermutationRule, ShaderType, ShaderVariantCache};
use crate::utils::time::FrameClock;

pub use dynamic_cubemaps::{CaptureTask, DynamicCubemaps};
pub use linear_lighting::LinearLighting;
pub use registry::FeatureRegistry;
pub use settings::{SettingsStore, load_lenient};
pub use snow_cover::SnowCover;
pub use true_pbr::TruePbr;
pub use ui::{RecordingUi, SettingsUi, UiEdit, UiWidget};
pub use weather::{CalendarTime, SkyMode, SkyState, WeatherInfo};
pub use wetness_effects::WetnessEffects;

/// Per-feature lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureState {
    Unregistered,
    Registered,
    ResourcesReady,
    Active,
    Suspended,
    TornDown,
}

/// Host-supplied data for one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameInput {
    /// Simulation delta reported by the host, in seconds.
    pub delta_seconds: f32,
    pub paused: bool,
    pub camera_position: Vec3,
    pub sky: SkyState,
    /// `None` before the game calendar exists (main menu).
    pub calendar: Option<CalendarTime>,
    /// Editor id of the current interior cell's lighting template.
    pub lighting_template: Option<String>,
}

/// Everything a feature may touch during `prepass` and `draw`.
pub struct FrameContext<'a> {
    pub device: &'a mut dyn RenderDevice,
    pub shaders: &'a ShaderVariantCache,
    pub input: &'a FrameInput,
    pub clock: &'a FrameClock,
}

/// A pluggable render feature.
///
/// Only identity and settings are mandatory; every hook defaults to a no-op.
pub trait Feature: Send {
    /// Display name.
    fn name(&self) -> &str;

    /// Stable identifier, also the feature's settings section.
    fn short_name(&self) -> &str;

    /// Define token injected into every variant while the feature is enabled.
    fn shader_define_name(&self) -> Option<&str> {
        None
    }

    fn has_shader_define(&self, shader_type: ShaderType) -> bool {
        let _ = shader_type;
        false
    }

    /// Extra `(name, value)` defines, evaluated when the define set is built.
    fn shader_define_options(&self) -> Vec<(&'static str, &'static str)> {
        Vec::new()
    }

    fn supports_vr(&self) -> bool {
        false
    }

    /// Core features cannot be disabled from configuration.
    fn is_core(&self) -> bool {
        false
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────────

    fn setup_resources(&mut self, device: &mut dyn RenderDevice) -> Result<()> {
        let _ = device;
        Ok(())
    }

    fn reset(&mut self) {}

    fn prepass(&mut self, ctx: &mut FrameContext<'_>) {
        let _ = ctx;
    }

    fn draw(&mut self, ctx: &mut FrameContext<'_>, shader_type: ShaderType, descriptor: Descriptor) {
        let _ = (ctx, shader_type, descriptor);
    }

    fn data_loaded(&mut self) {}

    fn post_post_load(&mut self) {}

    /// Releases every device resource the feature owns.
    fn teardown(&mut self, device: &mut dyn RenderDevice) {
        let _ = device;
    }

    // ─── Settings ────────────────────────────────────────────────────────────

    /// Loads the feature's section. Must never fail: bad fields fall back to
    /// their defaults.
    fn load_settings(&mut self, doc: &Value);

    fn save_settings(&self) -> Result<Value>;

    fn restore_default_settings(&mut self);

    fn draw_settings(&mut self, ui: &mut dyn ui::SettingsUi) {
        let _ = ui;
    }

    // ─── Shaders ─────────────────────────────────────────────────────────────

    /// Permutation rules this feature wants precompiled.
    fn shader_permutations(&self) -> Vec<(ShaderType, PermutationRule)> {
        Vec::new()
    }

    fn clear_shader_cache(&mut self, shaders: &ShaderVariantCache) {
        let _ = shaders;
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

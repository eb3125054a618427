//! Snow Cover
//!
//! Accumulates snow on exterior surfaces with the weather, using the
//! [`SNOW_COVER_RATES`] table, and feeds a per-frame constant buffer plus a
//! four-texture snow material to the lighting shaders.

use std::any::Any;
use std::path::{Path, PathBuf};

use bytemuck::{Pod, Zeroable};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::settings::load_lenient;
use super::ui::{SettingsUi, checkbox_u32};
use super::weather::{SNOW_COVER_RATES, SkyMode, WeatherAccumulator};
use super::{Feature, FrameContext, FrameInput};
use crate::errors::Result;
use crate::renderer::core::{BufferDesc, BufferId, RenderDevice, ResourceId, TextureId, write_constants};
use crate::renderer::pipeline::ShaderType;
use crate::utils::time::FrameClock;

/// First pixel-shader texture slot of the snow material.
pub const SNOW_TEXTURE_SLOT: u32 = 73;

/// Albedo, normal, roughness/metal/AO/subsurface and parallax.
pub const SNOW_TEXTURES: [&str; 4] = ["snow.dds", "snow_n.dds", "snow_rmaos.dds", "snow_p.dds"];

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
#[serde(default)]
#[allow(non_snake_case)]
pub struct SnowCoverSettings {
    pub EnableSnowCover: u32,
    pub AffectFoliageColor: u32,
    pub SnowHeightOffset: f32,
    pub FoliageHeightOffset: f32,

    pub MaxSummerMonth: u32,
    pub MaxWinterMonth: u32,
    pub SummerHeightOffset: f32,
    pub WinterHeightOffset: f32,

    pub UVScale: f32,
    pub ParallaxScale: f32,
    #[serde(skip)]
    pub pad: [u32; 2],

    // Glint
    pub screenSpaceScale: f32,
    pub logMicrofacetDensity: f32,
    pub microfacetRoughness: f32,
    pub densityRandomization: f32,
}

impl Default for SnowCoverSettings {
    fn default() -> Self {
        Self {
            EnableSnowCover: 1,
            AffectFoliageColor: 1,
            SnowHeightOffset: 0.0,
            FoliageHeightOffset: -512.0,
            MaxSummerMonth: 6,
            MaxWinterMonth: 0,
            SummerHeightOffset: 0.0,
            WinterHeightOffset: -10000.0,
            UVScale: 1.0,
            ParallaxScale: 0.1,
            pad: [0; 2],
            screenSpaceScale: 1.2,
            logMicrofacetDensity: 33.0,
            microfacetRoughness: 0.15,
            densityRandomization: 2.0,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct SnowCoverPerFrame {
    pub month: f32,
    pub time_snowing: f32,
    pub snow_amount: f32,
    pub sky: u32,
    pub settings: SnowCoverSettings,
}

#[derive(Debug)]
pub struct SnowCover {
    pub settings: SnowCoverSettings,
    pub accumulator: WeatherAccumulator,
    /// Forces the next prepass to rewrite the constant buffer.
    pub requires_update: bool,
    data_root: PathBuf,
    views: Option<[TextureId; 4]>,
    per_frame: Option<BufferId>,
    last_frame: SnowCoverPerFrame,
}

impl Default for SnowCover {
    fn default() -> Self {
        Self::new("Data")
    }
}

impl SnowCover {
    pub const SHORT_NAME: &'static str = "SnowCover";

    /// `data_root` is the directory containing `Shaders/SnowCover/`.
    #[must_use]
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            settings: SnowCoverSettings::default(),
            accumulator: WeatherAccumulator::new(SNOW_COVER_RATES),
            requires_update: true,
            data_root: data_root.into(),
            views: None,
            per_frame: None,
            last_frame: SnowCoverPerFrame::default(),
        }
    }

    #[must_use]
    pub fn texture_path(&self, file: &str) -> PathBuf {
        snow_material_dir(&self.data_root).join(file)
    }

    #[must_use]
    pub fn per_frame_buffer(&self) -> Option<BufferId> {
        self.per_frame
    }

    /// Advances the snow accumulation and assembles this frame's constants.
    pub fn common_buffer_data(&mut self, input: &FrameInput, clock: &FrameClock) -> SnowCoverPerFrame {
        let mut data = SnowCoverPerFrame {
            sky: u32::from(input.sky.mode == SkyMode::Full),
            ..Default::default()
        };

        if self.settings.EnableSnowCover != 0
            && let Some(calendar) = &input.calendar
            && input.sky.active_weather().is_some()
        {
            data.month = calendar.month_fraction();
            let sample = self.accumulator.update(&input.sky, calendar.game_time_seconds());
            data.snow_amount = sample.amount;
        }

        data.time_snowing = clock.unpaused_seconds();
        data.settings = self.settings;
        data
    }

    fn load_texture(&self, device: &mut dyn RenderDevice, file: &str) -> Result<TextureId> {
        let path = self.texture_path(file);
        debug!("[SnowCover] loading {}", path.display());
        device.load_texture(&path)
    }

    fn release_resources(&mut self, device: &mut dyn RenderDevice) {
        for view in self.views.take().into_iter().flatten() {
            device.release(view.into());
        }
        if let Some(buffer) = self.per_frame.take() {
            device.release(buffer.into());
        }
    }
}

impl Feature for SnowCover {
    fn name(&self) -> &str {
        "Snow Cover"
    }

    fn short_name(&self) -> &str {
        Self::SHORT_NAME
    }

    fn shader_define_name(&self) -> Option<&str> {
        Some("SNOW_COVER")
    }

    fn has_shader_define(&self, _shader_type: ShaderType) -> bool {
        true
    }

    fn supports_vr(&self) -> bool {
        true
    }

    fn setup_resources(&mut self, device: &mut dyn RenderDevice) -> Result<()> {
        let mut views = [TextureId(0); 4];
        for (i, file) in SNOW_TEXTURES.iter().enumerate() {
            match self.load_texture(device, file) {
                Ok(view) => views[i] = view,
                Err(e) => {
                    for &loaded in &views[..i] {
                        device.release(loaded.into());
                    }
                    return Err(e);
                }
            }
        }
        self.views = Some(views);
        self.per_frame = Some(device.create_buffer(&BufferDesc::constant::<SnowCoverPerFrame>("SnowCover::PerFrame"))?);
        info!("[SnowCover] material loaded from {}", snow_material_dir(&self.data_root).display());
        Ok(())
    }

    fn reset(&mut self) {
        self.requires_update = true;
    }

    fn prepass(&mut self, ctx: &mut FrameContext<'_>) {
        let data = self.common_buffer_data(ctx.input, ctx.clock);
        if let Some(buffer) = self.per_frame
            && (self.requires_update || data != self.last_frame)
        {
            write_constants(ctx.device, buffer, &data);
            self.last_frame = data;
            self.requires_update = false;
        }

        if let Some(views) = self.views {
            let resources = views.map(ResourceId::from);
            ctx.device.bind_pixel_resources(SNOW_TEXTURE_SLOT, &resources);
        }
    }

    fn teardown(&mut self, device: &mut dyn RenderDevice) {
        self.release_resources(device);
    }

    fn load_settings(&mut self, doc: &Value) {
        self.settings = load_lenient(Self::SHORT_NAME, doc);
    }

    fn save_settings(&self) -> Result<Value> {
        Ok(serde_json::to_value(self.settings)?)
    }

    fn restore_default_settings(&mut self) {
        self.settings = SnowCoverSettings::default();
    }

    fn draw_settings(&mut self, ui: &mut dyn SettingsUi) {
        let s = &mut self.settings;
        if ui.tree_node("Snow Cover") {
            checkbox_u32(ui, "Enable Snow Cover", &mut s.EnableSnowCover);
            checkbox_u32(ui, "Affect Foliage Color", &mut s.AffectFoliageColor);
            ui.slider_f32("Snow Line Height Offset", &mut s.SnowHeightOffset, -10000.0..=10000.0);
            ui.slider_f32("Foliage Color Height Offset", &mut s.FoliageHeightOffset, -10000.0..=10000.0);
            ui.slider_u32("Maximum Summer Month", &mut s.MaxSummerMonth, 0..=11);
            ui.slider_u32("Maximum Winter Month", &mut s.MaxWinterMonth, 0..=11);
            ui.slider_f32("Summer Height Offset", &mut s.SummerHeightOffset, -10000.0..=10000.0);
            ui.slider_f32("Winter Height Offset", &mut s.WinterHeightOffset, -10000.0..=10000.0);

            if ui.tree_node("Snow Material") {
                ui.slider_f32("UV Scale", &mut s.UVScale, 0.1..=10.0);
                ui.slider_f32("Parallax Scale", &mut s.ParallaxScale, 0.0..=1.0);
                ui.slider_f32("Screenspace Scale", &mut s.screenSpaceScale, 0.0..=3.0);
                ui.slider_f32("Log Microfacet Density", &mut s.logMicrofacetDensity, 0.0..=40.0);
                ui.slider_f32("Microfacet Roughness", &mut s.microfacetRoughness, 0.0..=1.0);
                ui.slider_f32("Density Randomization", &mut s.densityRandomization, 0.0..=5.0);
                ui.tree_pop();
            }
            ui.tree_pop();
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn snow_material_dir(data_root: &Path) -> PathBuf {
    data_root.join("Shaders").join("SnowCover")
}

/// Full path of every snow material texture under `data_root`.
#[must_use]
pub fn snow_texture_paths(data_root: &Path) -> [PathBuf; 4] {
    SNOW_TEXTURES.map(|file| snow_material_dir(data_root).join(file))
}

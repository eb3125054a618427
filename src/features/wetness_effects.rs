//! Wetness Effects
//!
//! Surface wetness and puddles driven by the [`WETNESS_RATES`] accumulation,
//! plus the blended raindrop intensity of the current and fading weather.

use std::any::Any;

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::settings::load_lenient;
use super::ui::{SettingsUi, checkbox_u32};
use super::weather::{WETNESS_RATES, WeatherAccumulator};
use super::{Feature, FrameContext, FrameInput};
use crate::errors::Result;
use crate::renderer::core::{BufferDesc, BufferId, RenderDevice, write_constants};
use crate::renderer::pipeline::ShaderType;
use crate::utils::time::FrameClock;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
#[serde(default)]
#[allow(non_snake_case)]
pub struct WetnessEffectsSettings {
    pub EnableWetnessEffects: u32,
    pub MaxRainWetness: f32,
    pub MaxPuddleWetness: f32,
    pub MaxShoreWetness: f32,

    pub ShoreRange: u32,
    pub PuddleRadius: f32,
    pub PuddleMaxAngle: f32,
    pub PuddleMinWetness: f32,

    pub MinRainWetness: f32,
    pub SkinWetness: f32,
    #[serde(skip)]
    pub pad: [u32; 2],
}

impl Default for WetnessEffectsSettings {
    fn default() -> Self {
        Self {
            EnableWetnessEffects: 1,
            MaxRainWetness: 1.0,
            MaxPuddleWetness: 2.5,
            MaxShoreWetness: 0.5,
            ShoreRange: 32,
            PuddleRadius: 1.0,
            PuddleMaxAngle: 0.95,
            PuddleMinWetness: 0.85,
            MinRainWetness: 0.65,
            SkinWetness: 0.95,
            pad: [0; 2],
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct WetnessEffectsPerFrame {
    pub wetness: f32,
    pub puddle_wetness: f32,
    /// Raindrop intensity blended across the weather transition.
    pub raining: f32,
    pub time: f32,
    pub settings: WetnessEffectsSettings,
}

#[derive(Debug)]
pub struct WetnessEffects {
    pub settings: WetnessEffectsSettings,
    pub accumulator: WeatherAccumulator,
    per_frame: Option<BufferId>,
}

impl Default for WetnessEffects {
    fn default() -> Self {
        Self::new()
    }
}

impl WetnessEffects {
    pub const SHORT_NAME: &'static str = "WetnessEffects";

    #[must_use]
    pub fn new() -> Self {
        Self {
            settings: WetnessEffectsSettings::default(),
            accumulator: WeatherAccumulator::new(WETNESS_RATES),
            per_frame: None,
        }
    }

    #[must_use]
    pub fn per_frame_buffer(&self) -> Option<BufferId> {
        self.per_frame
    }

    pub fn common_buffer_data(&mut self, input: &FrameInput, clock: &FrameClock) -> WetnessEffectsPerFrame {
        let mut data = WetnessEffectsPerFrame::default();

        if self.settings.EnableWetnessEffects != 0
            && let Some(calendar) = &input.calendar
        {
            let sample = self.accumulator.update(&input.sky, calendar.game_time_seconds());
            data.wetness = sample.amount;
            data.puddle_wetness = sample.puddle;
            data.raining = sample.last_precipitation
                + (sample.current_precipitation - sample.last_precipitation) * sample.transition;
        }

        data.time = clock.unpaused_seconds();
        data.settings = self.settings;
        data
    }
}

impl Feature for WetnessEffects {
    fn name(&self) -> &str {
        "Wetness Effects"
    }

    fn short_name(&self) -> &str {
        Self::SHORT_NAME
    }

    fn shader_define_name(&self) -> Option<&str> {
        Some("WETNESS_EFFECTS")
    }

    fn has_shader_define(&self, shader_type: ShaderType) -> bool {
        shader_type == ShaderType::Lighting
    }

    fn supports_vr(&self) -> bool {
        true
    }

    fn setup_resources(&mut self, device: &mut dyn RenderDevice) -> Result<()> {
        self.per_frame = Some(device.create_buffer(&BufferDesc::constant::<WetnessEffectsPerFrame>(
            "WetnessEffects::PerFrame",
        ))?);
        Ok(())
    }

    fn prepass(&mut self, ctx: &mut FrameContext<'_>) {
        let data = self.common_buffer_data(ctx.input, ctx.clock);
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
        self.settings = load_lenient(Self::SHORT_NAME, doc);
    }

    fn save_settings(&self) -> Result<Value> {
        Ok(serde_json::to_value(self.settings)?)
    }

    fn restore_default_settings(&mut self) {
        self.settings = WetnessEffectsSettings::default();
    }

    fn draw_settings(&mut self, ui: &mut dyn SettingsUi) {
        let s = &mut self.settings;
        if ui.tree_node("Wetness Effects") {
            checkbox_u32(ui, "Enable Wetness", &mut s.EnableWetnessEffects);
            ui.slider_f32("Max Rain Wetness", &mut s.MaxRainWetness, 0.0..=1.0);
            ui.slider_f32("Min Rain Wetness", &mut s.MinRainWetness, 0.0..=0.9);
            ui.slider_f32("Skin Wetness", &mut s.SkinWetness, 0.0..=1.0);
            ui.slider_f32("Max Puddle Wetness", &mut s.MaxPuddleWetness, 0.0..=4.0);
            ui.slider_f32("Puddle Radius", &mut s.PuddleRadius, 0.3..=3.0);
            ui.slider_f32("Puddle Max Angle", &mut s.PuddleMaxAngle, 0.6..=1.0);
            ui.slider_f32("Puddle Min Wetness", &mut s.PuddleMinWetness, 0.0..=1.0);
            ui.slider_f32("Max Shore Wetness", &mut s.MaxShoreWetness, 0.0..=1.0);
            ui.slider_u32("Shore Range", &mut s.ShoreRange, 1..=64);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::weather::{CalendarTime, Precipitation, SkyMode, SkyState, WeatherFlags, WeatherInfo};

    fn rain(form_id: u32) -> WeatherInfo {
        WeatherInfo {
            form_id,
            editor_id: "SkyrimStormRain".into(),
            flags: WeatherFlags::RAINY,
            precipitation: Some(Precipitation {
                particle_density: 200.0,
                gravity_velocity: 10.0,
            }),
            precipitation_begin_fade_in: 128.0,
            precipitation_end_fade_out: 128.0,
        }
    }

    fn input(days_passed: f64) -> FrameInput {
        FrameInput {
            sky: SkyState {
                mode: SkyMode::Full,
                current: Some(rain(1)),
                last: None,
                current_weather_pct: 1.0,
            },
            calendar: Some(CalendarTime {
                days_passed,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn rain_wets_surfaces_and_reports_intensity() {
        let mut feature = WetnessEffects::new();
        let clock = FrameClock::new();
        feature.common_buffer_data(&input(3.0), &clock);
        let data = feature.common_buffer_data(&input(3.0 + 1.0 / 86400.0), &clock);

        // 1 s * 250 * 2/3600 * 2 wetness scale
        assert!((data.wetness - 250.0 * 4.0 / 3600.0).abs() < 1e-4);
        assert!((data.raining - 0.5).abs() < 1e-6);
    }

    #[test]
    fn per_frame_layout() {
        assert_eq!(std::mem::size_of::<WetnessEffectsSettings>(), 48);
        assert_eq!(std::mem::size_of::<WetnessEffectsPerFrame>() % 16, 0);
    }
}

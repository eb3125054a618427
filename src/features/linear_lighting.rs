use std::any::Any;

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Feature;
use super::settings::load_lenient;
use super::ui::{SettingsUi, checkbox_u32};
use crate::errors::Result;
use crate::renderer::pipeline::ShaderType;

/// GPU layout of the linear-lighting settings.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearLightingSettings {
    #[serde(rename = "linearLighting")]
    pub linear_lighting: u32,
    #[serde(rename = "colorMatchingPow")]
    pub color_matching_pow: f32,
    #[serde(rename = "colorMatchingMult")]
    pub color_matching_mult: f32,
    #[serde(skip)]
    pub pad0: u32,
}

impl Default for LinearLightingSettings {
    fn default() -> Self {
        Self {
            linear_lighting: 1,
            color_matching_pow: 1.8,
            color_matching_mult: 1.25,
            pad0: 0,
        }
    }
}

/// Lighting in linear space with vanilla colours converted to match.
#[derive(Debug, Default)]
pub struct LinearLighting {
    pub settings: LinearLightingSettings,
}

impl LinearLighting {
    pub const SHORT_NAME: &'static str = "LinearLighting";

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Feature for LinearLighting {
    fn name(&self) -> &str {
        "Linear Lighting"
    }

    fn short_name(&self) -> &str {
        Self::SHORT_NAME
    }

    fn shader_define_name(&self) -> Option<&str> {
        Some("LINEAR_LIGHTING")
    }

    fn has_shader_define(&self, _shader_type: ShaderType) -> bool {
        true
    }

    fn supports_vr(&self) -> bool {
        true
    }

    fn load_settings(&mut self, doc: &Value) {
        self.settings = load_lenient(Self::SHORT_NAME, doc);
    }

    fn save_settings(&self) -> Result<Value> {
        Ok(serde_json::to_value(self.settings)?)
    }

    fn restore_default_settings(&mut self) {
        self.settings = LinearLightingSettings::default();
    }

    fn draw_settings(&mut self, ui: &mut dyn SettingsUi) {
        let settings = &mut self.settings;
        checkbox_u32(ui, "Enable Linear Lighting", &mut settings.linear_lighting);
        ui.tooltip(
            "Enabled: lighting in linear, vanilla diffuse texture converted to linear.\n\
             Disabled: lighting in gamma space, PBR albedo converted to gamma.",
        );
        ui.slider_f32("Color Matching Power", &mut settings.color_matching_pow, 1.0..=2.2);
        ui.tooltip("Power applied when converting vanilla to linear or pbr to vanilla. Standard between sRGB and linear is 2.2");
        ui.slider_f32("Color Matching Multiplier", &mut settings.color_matching_mult, 1.0..=2.0);
        ui.tooltip("Multiplier applied after conversion");
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
    use crate::features::ui::{RecordingUi, UiEdit};
    use serde_json::json;

    #[test]
    fn settings_keep_their_json_names() {
        let feature = LinearLighting::new();
        let saved = feature.save_settings().unwrap();
        assert_eq!(saved["linearLighting"], json!(1));
        assert!(saved.get("pad0").is_none());
        assert_eq!(std::mem::size_of::<LinearLightingSettings>() % 16, 0);
    }

    #[test]
    fn ui_edits_reach_settings() {
        let mut feature = LinearLighting::new();
        let mut ui = RecordingUi::new();
        ui.edit("Enable Linear Lighting", UiEdit::Bool(false))
            .edit("Color Matching Power", UiEdit::Float(2.0));
        feature.draw_settings(&mut ui);

        assert_eq!(feature.settings.linear_lighting, 0);
        assert!((feature.settings.color_matching_pow - 2.0).abs() < 1e-6);
    }
}

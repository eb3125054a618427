//! Feature Registry
//!
//! Owns every [`Feature`] in registration order together with its
//! [`FeatureState`]. All lifecycle transitions go through here; features never
//! see a hook their state does not allow.
//!
//! Features listed in [`EngineSettings::disabled_features`] (or lacking VR
//! support when VR is on) stay `Registered` and receive nothing but settings
//! load/save.

use log::{debug, error, info, warn};

use super::settings::SettingsStore;
use super::ui::SettingsUi;
use super::{Feature, FeatureState, FrameContext};
use crate::errors::{PrismError, Result};
use crate::renderer::core::RenderDevice;
use crate::renderer::pipeline::{Descriptor, PermutationTable, ShaderType, ShaderVariantCache};
use crate::renderer::settings::EngineSettings;
use crate::resources::ShaderDefines;

struct FeatureEntry {
    feature: Box<dyn Feature>,
    state: FeatureState,
    disabled: bool,
    setup_failed: bool,
    post_loaded: bool,
}

impl FeatureEntry {
    fn receives_hooks(&self) -> bool {
        !self.disabled && self.state != FeatureState::TornDown
    }

    /// Suspended features keep their settings UI but leave the shaders, as
    /// do features whose setup failed.
    fn contributes_shaders(&self) -> bool {
        self.receives_hooks() && !self.setup_failed && self.state != FeatureState::Suspended
    }
}

#[derive(Default)]
pub struct FeatureRegistry {
    entries: Vec<FeatureEntry>,
}

impl FeatureRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Registration ────────────────────────────────────────────────────────

    /// Registers a feature. Returns `false` (and drops `feature`) when one
    /// with the same short name is already registered.
    pub fn register<F: Feature + 'static>(&mut self, feature: F) -> bool {
        self.register_boxed(Box::new(feature))
    }

    pub fn register_boxed(&mut self, feature: Box<dyn Feature>) -> bool {
        if self.index_of(feature.short_name()).is_some() {
            debug!("[Features] {} already registered", feature.short_name());
            return false;
        }
        info!("[Features] registered {}", feature.name());
        self.entries.push(FeatureEntry {
            feature,
            state: FeatureState::Registered,
            disabled: false,
            setup_failed: false,
            post_loaded: false,
        });
        true
    }

    /// Applies the engine's disable list. Core features ignore it.
    pub fn apply_engine_settings(&mut self, settings: &EngineSettings) {
        for entry in &mut self.entries {
            let short_name = entry.feature.short_name();
            let vr_blocked = settings.vr && !entry.feature.supports_vr();
            let disabled = !entry.feature.is_core() && (settings.is_disabled(short_name) || vr_blocked);
            if disabled && !entry.disabled {
                info!("[Features] {short_name} disabled by configuration");
            }
            entry.disabled = disabled;
        }
    }

    fn index_of(&self, short_name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.feature.short_name() == short_name)
    }

    fn entry_mut(&mut self, short_name: &str) -> Result<&mut FeatureEntry> {
        let index = self
            .index_of(short_name)
            .ok_or_else(|| PrismError::UnknownFeature(short_name.to_string()))?;
        Ok(&mut self.entries[index])
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────────

    /// Allocates resources for every enabled `Registered` feature.
    ///
    /// A feature whose setup fails is logged and stays `Registered`; the
    /// rest still set up. Returns the number of features made ready.
    pub fn setup_resources(&mut self, device: &mut dyn RenderDevice) -> usize {
        let mut ready = 0;
        for entry in &mut self.entries {
            if entry.disabled || entry.state != FeatureState::Registered {
                continue;
            }
            match entry.feature.setup_resources(device) {
                Ok(()) => {
                    entry.state = FeatureState::ResourcesReady;
                    entry.setup_failed = false;
                    ready += 1;
                }
                Err(e) => {
                    error!("[Features] {} failed to set up: {e}", entry.feature.short_name());
                    entry.setup_failed = true;
                }
            }
        }
        ready
    }

    /// Host data is available: activates every ready feature.
    pub fn data_loaded(&mut self) {
        for entry in &mut self.entries {
            if entry.disabled {
                continue;
            }
            match entry.state {
                FeatureState::ResourcesReady => {
                    entry.feature.data_loaded();
                    entry.state = FeatureState::Active;
                    debug!("[Features] {} active", entry.feature.short_name());
                }
                FeatureState::Registered => warn!(
                    "[Features] {} has no resources, not activating",
                    entry.feature.short_name()
                ),
                _ => {}
            }
        }
    }

    /// One-time late hook; repeated calls are ignored per feature.
    pub fn post_post_load(&mut self) {
        for entry in &mut self.entries {
            if entry.receives_hooks() && !entry.post_loaded {
                entry.feature.post_post_load();
                entry.post_loaded = true;
            }
        }
    }

    pub fn reset(&mut self) {
        for entry in &mut self.entries {
            if entry.receives_hooks() {
                entry.feature.reset();
            }
        }
    }

    pub fn suspend(&mut self, short_name: &str) -> Result<()> {
        self.transition(short_name, "suspend", FeatureState::Active, FeatureState::Suspended)
    }

    pub fn resume(&mut self, short_name: &str) -> Result<()> {
        self.transition(short_name, "resume", FeatureState::Suspended, FeatureState::Active)
    }

    fn transition(
        &mut self,
        short_name: &str,
        action: &'static str,
        from: FeatureState,
        to: FeatureState,
    ) -> Result<()> {
        let entry = self.entry_mut(short_name)?;
        if entry.state != from {
            return Err(PrismError::InvalidLifecycle {
                feature: short_name.to_string(),
                action,
                state: entry.state,
            });
        }
        entry.state = to;
        debug!("[Features] {short_name} {from:?} -> {to:?}");
        Ok(())
    }

    pub fn teardown(&mut self, short_name: &str, device: &mut dyn RenderDevice) -> Result<()> {
        let entry = self.entry_mut(short_name)?;
        Self::teardown_entry(entry, device);
        Ok(())
    }

    pub fn teardown_all(&mut self, device: &mut dyn RenderDevice) {
        for entry in &mut self.entries {
            Self::teardown_entry(entry, device);
        }
    }

    fn teardown_entry(entry: &mut FeatureEntry, device: &mut dyn RenderDevice) {
        if entry.state == FeatureState::TornDown {
            return;
        }
        if matches!(
            entry.state,
            FeatureState::ResourcesReady | FeatureState::Active | FeatureState::Suspended
        ) {
            entry.feature.teardown(device);
        }
        entry.state = FeatureState::TornDown;
        info!("[Features] {} torn down", entry.feature.short_name());
    }

    // ─── Per-frame ───────────────────────────────────────────────────────────

    pub fn prepass_all(&mut self, ctx: &mut FrameContext<'_>) {
        for entry in &mut self.entries {
            if entry.state == FeatureState::Active {
                entry.feature.prepass(ctx);
            }
        }
    }

    pub fn draw_all(&mut self, ctx: &mut FrameContext<'_>, shader_type: ShaderType, descriptor: Descriptor) {
        for entry in &mut self.entries {
            if entry.state == FeatureState::Active {
                entry.feature.draw(ctx, shader_type, descriptor);
            }
        }
    }

    // ─── Shaders ─────────────────────────────────────────────────────────────

    /// Defines of every enabled feature, plus their define options.
    #[must_use]
    pub fn shader_defines(&self) -> ShaderDefines {
        let mut defines = ShaderDefines::new();
        for entry in self.entries.iter().filter(|e| e.contributes_shaders()) {
            let feature = &entry.feature;
            if let Some(name) = feature.shader_define_name()
                && ShaderType::ALL.iter().any(|&ty| feature.has_shader_define(ty))
            {
                defines.define(name);
            }
            for (name, value) in feature.shader_define_options() {
                defines.set(name, value);
            }
        }
        defines
    }

    /// Permutation rules of every enabled feature.
    pub fn permutation_table(&self) -> Result<PermutationTable> {
        let mut table = PermutationTable::new();
        for entry in self.entries.iter().filter(|e| e.contributes_shaders()) {
            for (shader_type, rule) in entry.feature.shader_permutations() {
                table.register(shader_type, rule)?;
            }
        }
        Ok(table)
    }

    pub fn clear_shader_cache(&mut self, shaders: &ShaderVariantCache) {
        for entry in &mut self.entries {
            if entry.receives_hooks() {
                entry.feature.clear_shader_cache(shaders);
            }
        }
    }

    // ─── Settings ────────────────────────────────────────────────────────────

    /// Loads every feature's section; a missing section restores defaults.
    pub fn load_settings(&mut self, store: &SettingsStore) {
        for entry in &mut self.entries {
            let feature = &mut entry.feature;
            match store.section(feature.short_name()) {
                Some(doc) => feature.load_settings(doc),
                None => feature.restore_default_settings(),
            }
        }
    }

    pub fn save_settings(&self, store: &mut SettingsStore) -> Result<()> {
        for entry in &self.entries {
            let feature = &entry.feature;
            store.set_section(feature.short_name(), feature.save_settings()?);
        }
        Ok(())
    }

    pub fn restore_default_settings(&mut self) {
        for entry in &mut self.entries {
            entry.feature.restore_default_settings();
        }
    }

    pub fn draw_settings(&mut self, ui: &mut dyn SettingsUi) {
        for entry in &mut self.entries {
            if entry.receives_hooks() {
                entry.feature.draw_settings(ui);
            }
        }
    }

    // ─── Queries ─────────────────────────────────────────────────────────────

    #[must_use]
    pub fn state(&self, short_name: &str) -> Option<FeatureState> {
        self.index_of(short_name).map(|i| self.entries[i].state)
    }

    #[must_use]
    pub fn is_disabled(&self, short_name: &str) -> bool {
        self.index_of(short_name)
            .is_some_and(|i| self.entries[i].disabled)
    }

    #[must_use]
    pub fn feature(&self, short_name: &str) -> Option<&dyn Feature> {
        self.index_of(short_name)
            .map(|i| self.entries[i].feature.as_ref())
    }

    /// Typed access to a registered feature.
    #[must_use]
    pub fn get<T: Feature + 'static>(&self) -> Option<&T> {
        self.entries
            .iter()
            .find_map(|entry| entry.feature.as_any().downcast_ref::<T>())
    }

    pub fn get_mut<T: Feature + 'static>(&mut self) -> Option<&mut T> {
        self.entries
            .iter_mut()
            .find_map(|entry| entry.feature.as_any_mut().downcast_mut::<T>())
    }

    /// Short names in registration order.
    pub fn short_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.feature.short_name())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;

    use serde_json::{Value, json};

    use super::*;
    use crate::renderer::core::HeadlessDevice;

    #[derive(Default)]
    struct Probe {
        name: &'static str,
        fail_setup: bool,
        resets: u32,
        loaded: Option<Value>,
    }

    impl Feature for Probe {
        fn name(&self) -> &str {
            self.name
        }

        fn short_name(&self) -> &str {
            self.name
        }

        fn shader_define_name(&self) -> Option<&str> {
            Some("PROBE")
        }

        fn has_shader_define(&self, shader_type: ShaderType) -> bool {
            shader_type == ShaderType::Lighting
        }

        fn setup_resources(&mut self, _device: &mut dyn RenderDevice) -> Result<()> {
            if self.fail_setup {
                Err(PrismError::Device("no memory".into()))
            } else {
                Ok(())
            }
        }

        fn reset(&mut self) {
            self.resets += 1;
        }

        fn load_settings(&mut self, doc: &Value) {
            self.loaded = Some(doc.clone());
        }

        fn save_settings(&self) -> Result<Value> {
            Ok(json!({ "probe": true }))
        }

        fn restore_default_settings(&mut self) {
            self.loaded = None;
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn probe(name: &'static str) -> Probe {
        Probe {
            name,
            ..Default::default()
        }
    }

    #[test]
    fn register_is_idempotent_by_short_name() {
        let mut registry = FeatureRegistry::new();
        assert!(registry.register(probe("A")));
        assert!(!registry.register(probe("A")));
        assert!(registry.register(probe("B")));
        assert_eq!(registry.short_names().collect::<Vec<_>>(), ["A", "B"]);
    }

    #[test]
    fn failed_setup_is_not_activated() {
        let mut registry = FeatureRegistry::new();
        registry.register(probe("Good"));
        registry.register(Probe {
            fail_setup: true,
            ..probe("Bad")
        });

        let mut device = HeadlessDevice::new();
        assert_eq!(registry.setup_resources(&mut device), 1);
        registry.data_loaded();
        assert_eq!(registry.state("Good"), Some(FeatureState::Active));
        assert_eq!(registry.state("Bad"), Some(FeatureState::Registered));
    }

    #[test]
    fn suspend_requires_active() {
        let mut registry = FeatureRegistry::new();
        registry.register(probe("A"));
        let err = registry.suspend("A").unwrap_err();
        assert!(matches!(err, PrismError::InvalidLifecycle { action: "suspend", .. }));
        assert!(matches!(registry.resume("Nope"), Err(PrismError::UnknownFeature(_))));
    }

    #[test]
    fn disabled_feature_gets_no_define_or_reset() {
        let mut registry = FeatureRegistry::new();
        registry.register(probe("A"));
        assert!(registry.shader_defines().contains("PROBE"));

        let settings = EngineSettings {
            disabled_features: vec!["A".into()],
            ..Default::default()
        };
        registry.apply_engine_settings(&settings);
        registry.reset();

        assert!(registry.is_disabled("A"));
        assert!(!registry.shader_defines().contains("PROBE"));
        assert_eq!(registry.get::<Probe>().unwrap().resets, 0);
    }

    #[test]
    fn missing_section_restores_defaults() {
        let mut registry = FeatureRegistry::new();
        registry.register(probe("A"));
        registry.get_mut::<Probe>().unwrap().loaded = Some(json!(1));

        registry.load_settings(&SettingsStore::new());
        assert!(registry.get::<Probe>().unwrap().loaded.is_none());
    }
}

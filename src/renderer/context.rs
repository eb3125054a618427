//! Render Context
//!
//! [`RenderContext`] is the one object the host keeps: it owns the device
//! collaborator, the [`FeatureRegistry`], the [`ShaderVariantCache`], the
//! frame clock and the engine settings. Nothing in the crate is global.
//!
//! # Frame
//!
//! ```rust,ignore
//! ctx.begin_frame(input);          // tick + every Active prepass
//! match ctx.draw(ShaderType::Lighting, descriptor, ShaderStage::Pixel) {
//!     DrawResolution::Ready(variant) => { /* bind variant.module */ }
//!     DrawResolution::Pending | DrawResolution::Failed(_) => { /* skip */ }
//! }
//! ctx.end_frame();                 // release retired variants
//! ```

use std::sync::Arc;

use log::{debug, info, warn};

use crate::errors::{CompileError, Result};
use crate::features::{Feature, FeatureRegistry, FeatureState, FrameContext, FrameInput, SettingsStore, SettingsUi};
use crate::renderer::core::RenderDevice;
use crate::renderer::pipeline::{
    Descriptor, PrecompileReport, ShaderCompiler, ShaderStage, ShaderType, ShaderVariant,
    ShaderVariantCache, VariantKey, VariantLookup,
};
use crate::renderer::settings::EngineSettings;
use crate::utils::time::FrameClock;

/// How a draw's shader variant resolved.
#[derive(Debug, Clone)]
pub enum DrawResolution {
    Ready(Arc<ShaderVariant>),
    /// Still compiling in the background; the host skips or uses a fallback.
    Pending,
    Failed(Arc<CompileError>),
}

impl DrawResolution {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

pub struct RenderContext<D: RenderDevice> {
    device: D,
    registry: FeatureRegistry,
    shaders: ShaderVariantCache,
    clock: FrameClock,
    settings: EngineSettings,
    frame: FrameInput,
}

impl<D: RenderDevice> RenderContext<D> {
    pub fn new(device: D, compiler: Arc<dyn ShaderCompiler>, settings: EngineSettings) -> Result<Self> {
        let shaders = ShaderVariantCache::new(compiler, &settings.shader_cache)?;
        Ok(Self {
            device,
            registry: FeatureRegistry::new(),
            shaders,
            clock: FrameClock::new(),
            settings,
            frame: FrameInput::default(),
        })
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────────

    /// Registers a feature and applies the disable list to it.
    pub fn register<F: Feature + 'static>(&mut self, feature: F) -> bool {
        let added = self.registry.register(feature);
        if added {
            self.registry.apply_engine_settings(&self.settings);
        }
        added
    }

    pub fn setup_resources(&mut self) -> usize {
        self.registry.setup_resources(&mut self.device)
    }

    /// Activates ready features, publishes their defines and, when
    /// configured, precompiles their permutations.
    pub fn data_loaded(&mut self) -> Result<Option<PrecompileReport>> {
        self.registry.data_loaded();
        self.refresh_shader_defines();
        if !self.settings.shader_cache.precompile_on_load {
            return Ok(None);
        }
        self.precompile().map(Some)
    }

    pub fn post_post_load(&mut self) {
        self.registry.post_post_load();
    }

    pub fn reset(&mut self) {
        self.registry.reset();
    }

    pub fn suspend(&mut self, short_name: &str) -> Result<()> {
        self.registry.suspend(short_name)?;
        self.refresh_shader_defines();
        Ok(())
    }

    pub fn resume(&mut self, short_name: &str) -> Result<()> {
        self.registry.resume(short_name)?;
        self.refresh_shader_defines();
        Ok(())
    }

    pub fn teardown(&mut self, short_name: &str) -> Result<()> {
        self.registry.teardown(short_name, &mut self.device)?;
        self.refresh_shader_defines();
        Ok(())
    }

    // ─── Shaders ─────────────────────────────────────────────────────────────

    /// Pushes the registry's merged defines into the cache. Returns whether
    /// they changed (which invalidated every variant).
    pub fn refresh_shader_defines(&mut self) -> bool {
        let changed = self.shaders.set_feature_defines(self.registry.shader_defines());
        if changed {
            debug!("[RenderContext] feature defines changed, variants invalidated");
        }
        changed
    }

    /// Compiles every permutation the enabled features declare.
    pub fn precompile(&mut self) -> Result<PrecompileReport> {
        let keys = self.registry.permutation_table()?.variant_keys();
        let report = self.shaders.precompile(keys);
        info!(
            "[RenderContext] precompiled {}/{} variants ({} failed, {} skipped)",
            report.ready, report.requested, report.failed, report.skipped
        );
        Ok(report)
    }

    pub fn invalidate(&mut self, shader_type: Option<ShaderType>) {
        self.shaders.invalidate(shader_type);
    }

    /// Lets every feature drop the variants it owns.
    pub fn clear_shader_cache(&mut self) {
        self.registry.clear_shader_cache(&self.shaders);
    }

    // ─── Frame ───────────────────────────────────────────────────────────────

    pub fn begin_frame(&mut self, input: FrameInput) {
        self.clock.tick(input.delta_seconds, input.paused);
        self.frame = input;
        let mut ctx = FrameContext {
            device: &mut self.device,
            shaders: &self.shaders,
            input: &self.frame,
            clock: &self.clock,
        };
        self.registry.prepass_all(&mut ctx);
    }

    /// Resolves the variant for a draw without blocking and, when it is
    /// ready, runs every Active feature's draw hook.
    pub fn draw(&mut self, shader_type: ShaderType, descriptor: Descriptor, stage: ShaderStage) -> DrawResolution {
        let key = VariantKey::new(shader_type, descriptor, stage);
        let variant = match self.shaders.lookup(key) {
            VariantLookup::Ready(variant) => variant,
            VariantLookup::Compiling => return DrawResolution::Pending,
            VariantLookup::Failed(e) => {
                warn!("[RenderContext] skipping draw of {key}: {e}");
                return DrawResolution::Failed(e);
            }
        };

        let mut ctx = FrameContext {
            device: &mut self.device,
            shaders: &self.shaders,
            input: &self.frame,
            clock: &self.clock,
        };
        self.registry.draw_all(&mut ctx, shader_type, descriptor);
        DrawResolution::Ready(variant)
    }

    /// Releases variants retired by invalidation once unreferenced.
    pub fn end_frame(&mut self) -> usize {
        self.shaders.collect_retired()
    }

    // ─── Settings ────────────────────────────────────────────────────────────

    /// Loads engine and feature settings. Engine cache settings only take
    /// effect for a new context; the disable list applies immediately.
    pub fn load_settings(&mut self, store: &SettingsStore) {
        self.settings = store.engine_settings();
        self.registry.apply_engine_settings(&self.settings);
        self.registry.load_settings(store);
        self.refresh_shader_defines();
    }

    pub fn save_settings(&self, store: &mut SettingsStore) -> Result<()> {
        store.set_engine_settings(&self.settings)?;
        self.registry.save_settings(store)
    }

    pub fn restore_default_settings(&mut self) {
        self.registry.restore_default_settings();
        self.refresh_shader_defines();
    }

    /// Draws every feature's settings; edits that change defines take effect
    /// on the next lookup.
    pub fn draw_settings(&mut self, ui: &mut dyn SettingsUi) {
        self.registry.draw_settings(ui);
        self.refresh_shader_defines();
    }

    // ─── Accessors ───────────────────────────────────────────────────────────

    #[must_use]
    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    #[must_use]
    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut FeatureRegistry {
        &mut self.registry
    }

    #[must_use]
    pub fn shaders(&self) -> &ShaderVariantCache {
        &self.shaders
    }

    #[must_use]
    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    #[must_use]
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    #[must_use]
    pub fn feature<T: Feature + 'static>(&self) -> Option<&T> {
        self.registry.get::<T>()
    }

    pub fn feature_mut<T: Feature + 'static>(&mut self) -> Option<&mut T> {
        self.registry.get_mut::<T>()
    }

    #[must_use]
    pub fn feature_state(&self, short_name: &str) -> Option<FeatureState> {
        self.registry.state(short_name)
    }
}

impl<D: RenderDevice> Drop for RenderContext<D> {
    fn drop(&mut self) {
        self.registry.teardown_all(&mut self.device);
    }
}

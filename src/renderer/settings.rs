//! Engine Settings
//!
//! Engine-wide configuration stored in the `General` section of the settings
//! document. Feature settings live next to it, keyed by feature short name
//! (see [`SettingsStore`](crate::features::SettingsStore)).
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use prism::renderer::{EngineSettings, ShaderCacheSettings};
//!
//! // Default: background compilation, 2 workers, 2 s bounded wait
//! let settings = EngineSettings::default();
//!
//! // Deterministic offline setup: everything compiled on the caller's thread
//! let settings = EngineSettings {
//!     shader_cache: ShaderCacheSettings {
//!         background_compilation: false,
//!         ..Default::default()
//!     },
//!     ..Default::default()
//! };
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ShaderCacheSettings
// ---------------------------------------------------------------------------

/// Shader variant cache configuration.
///
/// | Field                    | Description                                  | Default |
/// |--------------------------|----------------------------------------------|---------|
/// | `background_compilation` | Misses on the render path go to workers      | `true`  |
/// | `worker_threads`         | Background compile threads                   | `2`     |
/// | `wait_timeout_ms`        | Bound on a blocking wait for another compile | `2000`  |
/// | `precompile_on_load`     | Compile feature permutations at data load    | `true`  |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderCacheSettings {
    #[serde(rename = "BackgroundCompilation")]
    pub background_compilation: bool,
    #[serde(rename = "WorkerThreads")]
    pub worker_threads: usize,
    #[serde(rename = "WaitTimeoutMs")]
    pub wait_timeout_ms: u64,
    #[serde(rename = "PrecompileOnLoad")]
    pub precompile_on_load: bool,
}

impl Default for ShaderCacheSettings {
    fn default() -> Self {
        Self {
            background_compilation: true,
            worker_threads: 2,
            wait_timeout_ms: 2000,
            precompile_on_load: true,
        }
    }
}

impl ShaderCacheSettings {
    #[inline]
    #[must_use]
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    /// Worker count actually spawned; zero disables background compilation.
    #[must_use]
    pub fn effective_workers(&self) -> usize {
        if self.background_compilation {
            self.worker_threads.max(1)
        } else {
            0
        }
    }
}

// ---------------------------------------------------------------------------
// EngineSettings
// ---------------------------------------------------------------------------

/// Process-wide configuration consumed by [`RenderContext`](super::RenderContext).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    #[serde(rename = "ShaderCache")]
    pub shader_cache: ShaderCacheSettings,

    /// Short names of features that stay registered but never receive hooks.
    #[serde(rename = "DisabledFeatures")]
    pub disabled_features: Vec<String>,

    /// Running in VR; features without VR support are disabled.
    #[serde(rename = "VR")]
    pub vr: bool,
}

impl EngineSettings {
    /// Section name in the settings document.
    pub const SECTION: &'static str = "General";

    #[must_use]
    pub fn is_disabled(&self, short_name: &str) -> bool {
        self.disabled_features.iter().any(|name| name == short_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let settings: EngineSettings =
            serde_json::from_str(r#"{ "ShaderCache": { "WorkerThreads": 6 } }"#).unwrap();
        assert_eq!(settings.shader_cache.worker_threads, 6);
        assert!(settings.shader_cache.background_compilation);
        assert_eq!(settings.shader_cache.wait_timeout(), Duration::from_secs(2));
        assert!(settings.disabled_features.is_empty());
    }

    #[test]
    fn disabled_background_means_no_workers() {
        let cache = ShaderCacheSettings {
            background_compilation: false,
            worker_threads: 8,
            ..Default::default()
        };
        assert_eq!(cache.effective_workers(), 0);
    }
}

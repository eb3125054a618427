//! Shader Variant Cache
//!
//! Maps a [`VariantKey`] to a compiled [`ShaderVariant`], compiling lazily on
//! miss. Shared between the render thread and the background compile
//! [`WorkerPool`].
//!
//! # Slots
//!
//! Every key is in one of three states:
//!
//! | Slot        | Meaning                                                   |
//! |-------------|-----------------------------------------------------------|
//! | `Compiling` | One compile is in flight; others wait or get `Compiling`  |
//! | `Ready`     | Compiled; handed out as `Arc<ShaderVariant>`               |
//! | `Failed`    | Compile failed; cached until the next invalidation         |
//!
//! The `Compiling` slot makes compiles coalesce: at most one compile per key
//! and generation is ever in flight.
//!
//! # Invalidation
//!
//! Each [`ShaderType`] carries a generation counter. Invalidation bumps it
//! and drops the slots; a compile that finishes for an old generation is not
//! inserted. Dropped variants move to a retired list and are released to the
//! compiler by [`ShaderVariantCache::collect_retired`] once nobody else holds
//! their `Arc`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use thiserror::Error;

use super::VariantKey;
use super::shader_gen::{CompileRequest, ShaderGenerator};
use super::technique::ShaderType;
use super::workers::WorkerPool;
use crate::errors::{CompileError, Result};
use crate::renderer::settings::ShaderCacheSettings;
use crate::resources::shader_defines::ShaderDefines;

// ─── Public Types ────────────────────────────────────────────────────────────

/// Opaque handle to a compiled shader module owned by the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderModuleHandle(pub u64);

/// Compiles shader variants. Called from the render thread and from
/// background workers.
pub trait ShaderCompiler: Send + Sync {
    fn compile(&self, request: &CompileRequest) -> std::result::Result<ShaderModuleHandle, CompileError>;

    /// Releases a module no longer referenced by the cache or any caller.
    fn release(&self, module: ShaderModuleHandle);
}

/// A compiled variant.
#[derive(Debug, PartialEq, Eq)]
pub struct ShaderVariant {
    pub key: VariantKey,
    pub module: ShaderModuleHandle,
    pub source_hash: u128,
    pub generation: u64,
}

#[derive(Error, Debug, Clone)]
pub enum VariantError {
    #[error("{0}")]
    Failed(Arc<CompileError>),

    #[error("Variant {0} is still compiling")]
    NotReady(VariantKey),

    #[error("Variant {0} was requested by its own compile")]
    RecursiveCompile(VariantKey),
}

/// Result of a non-blocking lookup.
#[derive(Debug, Clone)]
pub enum VariantLookup {
    Ready(Arc<ShaderVariant>),
    /// Being compiled; render with a fallback or skip the draw.
    Compiling,
    Failed(Arc<CompileError>),
}

impl VariantLookup {
    #[must_use]
    pub fn ready(&self) -> Option<&Arc<ShaderVariant>> {
        match self {
            Self::Ready(variant) => Some(variant),
            _ => None,
        }
    }
}

/// Outcome of a [`ShaderVariantCache::precompile`] batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrecompileReport {
    pub requested: usize,
    pub ready: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub compiles: u64,
    pub failures: u64,
    pub hits: u64,
    pub cached: usize,
    pub retired: usize,
}

// ─── Shared State ────────────────────────────────────────────────────────────

#[derive(Debug)]
enum Slot {
    Compiling {
        generation: u64,
        /// Thread running the compile; `None` while queued for a worker.
        owner: Option<ThreadId>,
    },
    Ready(Arc<ShaderVariant>),
    Failed(Arc<CompileError>),
}

struct CacheState {
    slots: FxHashMap<VariantKey, Slot>,
    generations: [u64; ShaderType::ALL.len()],
    feature_defines: ShaderDefines,
    retired: Vec<Arc<ShaderVariant>>,
}

impl CacheState {
    fn generation(&self, shader_type: ShaderType) -> u64 {
        self.generations[shader_type.index()]
    }

    fn is_current(&self, key: &VariantKey, generation: u64) -> bool {
        matches!(
            self.slots.get(key),
            Some(Slot::Compiling { generation: g, .. }) if *g == generation
        )
    }
}

/// State shared with the worker threads.
pub(crate) struct CacheShared {
    state: Mutex<CacheState>,
    compiled: Condvar,
    compiler: Arc<dyn ShaderCompiler>,
    generator: ShaderGenerator,
    wait_timeout: Duration,
    compiles: AtomicU64,
    failures: AtomicU64,
    hits: AtomicU64,
}

impl CacheShared {
    /// Runs one compile outside the lock and publishes the result if the
    /// slot still belongs to `generation`.
    fn compile_and_publish(
        &self,
        key: VariantKey,
        generation: u64,
        defines: &ShaderDefines,
    ) -> std::result::Result<Arc<ShaderVariant>, VariantError> {
        let outcome = self
            .generator
            .build_request(key, defines)
            .map_err(|e| CompileError::new(key, e.to_string()))
            .and_then(|request| {
                self.compiler
                    .compile(&request)
                    .map(|module| (module, request.source_hash))
            });
        self.compiles.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.lock();
        let current = state.is_current(&key, generation);
        let result = match outcome {
            Ok((module, source_hash)) => {
                let variant = Arc::new(ShaderVariant {
                    key,
                    module,
                    source_hash,
                    generation,
                });
                if current {
                    state.slots.insert(key, Slot::Ready(variant.clone()));
                } else {
                    debug!("[Shaders] {key} finished for stale generation {generation}, retiring");
                    state.retired.push(variant.clone());
                }
                Ok(variant)
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                error!("[Shaders] {e}");
                let e = Arc::new(e);
                if current {
                    state.slots.insert(key, Slot::Failed(e.clone()));
                }
                Err(VariantError::Failed(e))
            }
        };
        drop(state);
        self.compiled.notify_all();
        result
    }

    /// Worker entry point for a queued key.
    pub(crate) fn compile_queued(&self, key: VariantKey) {
        let mut state = self.state.lock();
        let generation = match state.slots.get_mut(&key) {
            Some(Slot::Compiling { generation, owner }) if owner.is_none() => {
                *owner = Some(thread::current().id());
                *generation
            }
            // Already taken, finished or invalidated.
            _ => return,
        };
        let defines = state.feature_defines.clone();
        drop(state);

        // Errors are cached in the slot and logged.
        let _ = self.compile_and_publish(key, generation, &defines);
    }
}

// ─── ShaderVariantCache ──────────────────────────────────────────────────────

/// Coalescing, versioned shader variant cache.
pub struct ShaderVariantCache {
    shared: Arc<CacheShared>,
    workers: Option<WorkerPool>,
}

impl ShaderVariantCache {
    pub fn new(compiler: Arc<dyn ShaderCompiler>, settings: &ShaderCacheSettings) -> Result<Self> {
        let shared = Arc::new(CacheShared {
            state: Mutex::new(CacheState {
                slots: FxHashMap::default(),
                generations: [0; ShaderType::ALL.len()],
                feature_defines: ShaderDefines::new(),
                retired: Vec::new(),
            }),
            compiled: Condvar::new(),
            compiler,
            generator: ShaderGenerator::new()?,
            wait_timeout: settings.wait_timeout(),
            compiles: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        });

        let worker_count = settings.effective_workers();
        let workers = if worker_count > 0 {
            Some(WorkerPool::new(worker_count, &shared)?)
        } else {
            None
        };

        info!("[Shaders] variant cache ready ({worker_count} background workers)");
        Ok(Self { shared, workers })
    }

    #[must_use]
    pub fn has_background_workers(&self) -> bool {
        self.workers.is_some()
    }

    /// Blocking lookup.
    ///
    /// A miss compiles on the calling thread. A key compiling elsewhere is
    /// waited on for at most the configured timeout.
    pub fn get_variant(&self, key: VariantKey) -> std::result::Result<Arc<ShaderVariant>, VariantError> {
        let deadline = Instant::now() + self.shared.wait_timeout;
        let this_thread = thread::current().id();
        let mut state = self.shared.state.lock();

        loop {
            match state.slots.get(&key) {
                Some(Slot::Ready(variant)) => {
                    self.shared.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(variant.clone());
                }
                Some(Slot::Failed(e)) => return Err(VariantError::Failed(e.clone())),
                Some(Slot::Compiling { owner, .. }) => {
                    if *owner == Some(this_thread) {
                        error!("[Shaders] {key} requested while compiling itself");
                        return Err(VariantError::RecursiveCompile(key));
                    }
                    if self.shared.compiled.wait_until(&mut state, deadline).timed_out() {
                        warn!(
                            "[Shaders] gave up waiting {:?} for {key}",
                            self.shared.wait_timeout
                        );
                        return Err(VariantError::NotReady(key));
                    }
                }
                None => {
                    let generation = state.generation(key.shader_type);
                    state.slots.insert(
                        key,
                        Slot::Compiling {
                            generation,
                            owner: Some(this_thread),
                        },
                    );
                    let defines = state.feature_defines.clone();
                    drop(state);
                    return self.shared.compile_and_publish(key, generation, &defines);
                }
            }
        }
    }

    /// Non-blocking render-path lookup. A miss is queued to the background
    /// workers, or compiled in place when there are none.
    pub fn lookup(&self, key: VariantKey) -> VariantLookup {
        let mut state = self.shared.state.lock();
        match state.slots.get(&key) {
            Some(Slot::Ready(variant)) => {
                self.shared.hits.fetch_add(1, Ordering::Relaxed);
                return VariantLookup::Ready(variant.clone());
            }
            Some(Slot::Failed(e)) => return VariantLookup::Failed(e.clone()),
            Some(Slot::Compiling { .. }) => return VariantLookup::Compiling,
            None => {}
        }

        let Some(workers) = &self.workers else {
            drop(state);
            return match self.get_variant(key) {
                Ok(variant) => VariantLookup::Ready(variant),
                Err(VariantError::Failed(e)) => VariantLookup::Failed(e),
                Err(_) => VariantLookup::Compiling,
            };
        };

        let generation = state.generation(key.shader_type);
        state.slots.insert(
            key,
            Slot::Compiling {
                generation,
                owner: None,
            },
        );
        drop(state);

        if let Err(e) = workers.submit(key) {
            error!("[Shaders] could not queue {key}: {e}");
            self.shared.state.lock().slots.remove(&key);
        }
        VariantLookup::Compiling
    }

    /// Eagerly compiles `keys` on the calling thread. Per-key failures are
    /// logged and counted; the batch always runs to completion.
    pub fn precompile(&self, keys: impl IntoIterator<Item = VariantKey>) -> PrecompileReport {
        let start = Instant::now();
        let mut report = PrecompileReport::default();

        for key in keys {
            report.requested += 1;
            match self.get_variant(key) {
                Ok(_) => report.ready += 1,
                Err(VariantError::Failed(e)) => {
                    warn!("[Shaders] precompile: {e}");
                    report.failed += 1;
                }
                Err(e) => {
                    warn!("[Shaders] precompile skipped: {e}");
                    report.skipped += 1;
                }
            }
        }

        info!(
            "[Shaders] precompiled {}/{} variants ({} failed) in {:?}",
            report.ready,
            report.requested,
            report.failed,
            start.elapsed()
        );
        report
    }

    /// Drops cached variants of one shader type, or all of them.
    ///
    /// Variants still referenced by callers stay alive until released by
    /// [`Self::collect_retired`].
    pub fn invalidate(&self, shader_type: Option<ShaderType>) {
        let targeted = |ty: ShaderType| shader_type.is_none_or(|t| t == ty);

        let mut state = self.shared.state.lock();
        for ty in ShaderType::ALL {
            if targeted(ty) {
                state.generations[ty.index()] += 1;
            }
        }

        let mut retired = Vec::new();
        state.slots.retain(|key, slot| {
            if !targeted(key.shader_type) {
                return true;
            }
            if let Slot::Ready(variant) = slot {
                retired.push(variant.clone());
            }
            false
        });
        let dropped = retired.len();
        state.retired.extend(retired);
        drop(state);

        self.shared.compiled.notify_all();
        match shader_type {
            Some(ty) => info!("[Shaders] invalidated {ty} variants ({dropped} retired)"),
            None => info!("[Shaders] invalidated all variants ({dropped} retired)"),
        }
    }

    /// Releases retired variants nobody references anymore.
    pub fn collect_retired(&self) -> usize {
        let mut state = self.shared.state.lock();
        let (free, keep): (Vec<_>, Vec<_>) = std::mem::take(&mut state.retired)
            .into_iter()
            .partition(|variant| Arc::strong_count(variant) == 1);
        state.retired = keep;
        drop(state);

        for variant in &free {
            self.shared.compiler.release(variant.module);
        }
        if !free.is_empty() {
            debug!("[Shaders] released {} retired variants", free.len());
        }
        free.len()
    }

    /// Replaces the feature-contributed defines. A change invalidates every
    /// variant since each preamble embeds them.
    pub fn set_feature_defines(&self, defines: ShaderDefines) -> bool {
        let mut state = self.shared.state.lock();
        if state.feature_defines == defines {
            return false;
        }
        state.feature_defines = defines;
        drop(state);
        self.invalidate(None);
        true
    }

    #[must_use]
    pub fn feature_defines(&self) -> ShaderDefines {
        self.shared.state.lock().feature_defines.clone()
    }

    /// Whether `key` currently holds a compiled variant.
    #[must_use]
    pub fn contains(&self, key: &VariantKey) -> bool {
        matches!(self.shared.state.lock().slots.get(key), Some(Slot::Ready(_)))
    }

    #[must_use]
    pub fn generation(&self, shader_type: ShaderType) -> u64 {
        self.shared.state.lock().generation(shader_type)
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let state = self.shared.state.lock();
        CacheStats {
            compiles: self.shared.compiles.load(Ordering::Relaxed),
            failures: self.shared.failures.load(Ordering::Relaxed),
            hits: self.shared.hits.load(Ordering::Relaxed),
            cached: state
                .slots
                .values()
                .filter(|slot| matches!(slot, Slot::Ready(_)))
                .count(),
            retired: state.retired.len(),
        }
    }
}

impl Drop for ShaderVariantCache {
    fn drop(&mut self) {
        if let Some(mut workers) = self.workers.take() {
            workers.shutdown();
        }

        let mut state = self.shared.state.lock();
        let mut modules: Vec<ShaderModuleHandle> = state
            .slots
            .drain()
            .filter_map(|(_, slot)| match slot {
                Slot::Ready(variant) => Some(variant.module),
                _ => None,
            })
            .collect();
        modules.extend(state.retired.drain(..).map(|variant| variant.module));
        drop(state);

        for module in modules {
            self.shared.compiler.release(module);
        }
    }
}

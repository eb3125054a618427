//! Shader Variant Cache Tests
//!
//! Tests for:
//! - Coalescing: concurrent misses on one key compile once
//! - Re-entrancy: a compile requesting its own key fails instead of deadlocking
//! - Background lookup: Compiling then Ready through the worker pool
//! - Failure caching, precompile reports, define-driven invalidation
//! - Invalidation racing an in-flight compile, bounded waits

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use prism::renderer::pipeline::{
    CompileRequest, Descriptor, ShaderCompiler, ShaderModuleHandle, ShaderStage, ShaderType,
    ShaderVariantCache, VariantError, VariantKey, VariantLookup,
};
use prism::renderer::settings::ShaderCacheSettings;
use prism::{CompileError, HeadlessCompiler, ShaderDefines};

fn sync_settings() -> ShaderCacheSettings {
    ShaderCacheSettings {
        background_compilation: false,
        ..Default::default()
    }
}

fn key(flags: u32) -> VariantKey {
    VariantKey::new(ShaderType::Lighting, Descriptor::encode(0, flags), ShaderStage::Pixel)
}

// ============================================================================
// Coalescing
// ============================================================================

#[test]
fn concurrent_misses_compile_once() {
    let compiler = Arc::new(HeadlessCompiler::new().with_delay(Duration::from_millis(100)));
    let cache = Arc::new(ShaderVariantCache::new(compiler.clone(), &sync_settings()).unwrap());

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let cache = cache.clone();
            thread::spawn(move || cache.get_variant(key(0x9)).unwrap())
        })
        .collect();
    let variants: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(compiler.compile_count(), 1);
    assert!(Arc::ptr_eq(&variants[0], &variants[1]));
}

#[test]
fn distinct_keys_compile_independently() {
    let compiler = Arc::new(HeadlessCompiler::new());
    let cache = ShaderVariantCache::new(compiler.clone(), &sync_settings()).unwrap();
    let a = cache.get_variant(key(0x1)).unwrap();
    let b = cache.get_variant(key(0x9)).unwrap();
    assert_ne!(a.module, b.module);
    assert_eq!(compiler.compile_count(), 2);
}

// ============================================================================
// Re-entrancy
// ============================================================================

/// Requests its own key from inside the compile.
#[derive(Default)]
struct ReentrantCompiler {
    cache: OnceLock<Weak<ShaderVariantCache>>,
    inner: OnceLock<Result<(), VariantError>>,
}

impl ShaderCompiler for ReentrantCompiler {
    fn compile(&self, request: &CompileRequest) -> Result<ShaderModuleHandle, CompileError> {
        if let Some(cache) = self.cache.get().and_then(Weak::upgrade) {
            let inner = cache.get_variant(request.key).map(|_| ());
            let _ = self.inner.set(inner);
        }
        Ok(ShaderModuleHandle(7))
    }

    fn release(&self, _module: ShaderModuleHandle) {}
}

#[test]
fn compile_requesting_itself_is_rejected() {
    let compiler = Arc::new(ReentrantCompiler::default());
    let cache = Arc::new(ShaderVariantCache::new(compiler.clone(), &sync_settings()).unwrap());
    compiler.cache.set(Arc::downgrade(&cache)).unwrap();

    let variant = cache.get_variant(key(0x9)).unwrap();
    assert_eq!(variant.module, ShaderModuleHandle(7));
    assert!(matches!(
        compiler.inner.get(),
        Some(Err(VariantError::RecursiveCompile(k))) if *k == key(0x9)
    ));
}

// ============================================================================
// Background lookup
// ============================================================================

#[test]
fn background_lookup_becomes_ready() {
    let _ = env_logger::builder().is_test(true).try_init();
    let compiler = Arc::new(HeadlessCompiler::new().with_delay(Duration::from_millis(20)));
    let settings = ShaderCacheSettings {
        worker_threads: 2,
        ..Default::default()
    };
    let cache = ShaderVariantCache::new(compiler.clone(), &settings).unwrap();
    assert!(cache.has_background_workers());

    assert!(matches!(cache.lookup(key(0x9)), VariantLookup::Compiling));

    let deadline = Instant::now() + Duration::from_secs(5);
    let variant = loop {
        if let VariantLookup::Ready(variant) = cache.lookup(key(0x9)) {
            break variant;
        }
        assert!(Instant::now() < deadline, "background compile never finished");
        thread::sleep(Duration::from_millis(5));
    };

    assert_eq!(variant.key, key(0x9));
    assert_eq!(compiler.compile_count(), 1);
}

#[test]
fn lookup_without_workers_compiles_in_place() {
    let cache = ShaderVariantCache::new(Arc::new(HeadlessCompiler::new()), &sync_settings()).unwrap();
    assert!(cache.lookup(key(0x1)).ready().is_some());
}

// ============================================================================
// Failures, precompile, defines
// ============================================================================

#[test]
fn failed_variant_is_not_recompiled() {
    let compiler = Arc::new(HeadlessCompiler::new().failing_on("WETNESS_EFFECTS"));
    let cache = ShaderVariantCache::new(compiler.clone(), &sync_settings()).unwrap();
    cache.set_feature_defines(ShaderDefines::from_tokens(["WETNESS_EFFECTS"]));

    for _ in 0..3 {
        assert!(matches!(cache.lookup(key(0x9)), VariantLookup::Failed(_)));
    }
    assert_eq!(compiler.compile_count(), 1);
    assert_eq!(cache.stats().failures, 1);
}

#[test]
fn precompile_counts_failures_without_aborting() {
    let compiler = Arc::new(HeadlessCompiler::new().failing_on("SKINNED"));
    let cache = ShaderVariantCache::new(compiler, &sync_settings()).unwrap();

    // bit 1 is SKINNED
    let report = cache.precompile([key(0x1), key(0x2), key(0x9)]);
    assert_eq!(report.requested, 3);
    assert_eq!(report.ready, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.skipped, 0);
}

#[test]
fn define_change_retires_and_releases() {
    let compiler = Arc::new(HeadlessCompiler::new());
    let cache = ShaderVariantCache::new(compiler.clone(), &sync_settings()).unwrap();
    let first = cache.get_variant(key(0x9)).unwrap();

    assert!(cache.set_feature_defines(ShaderDefines::from_tokens(["SNOW_COVER"])));
    assert!(!cache.contains(&key(0x9)));
    assert_eq!(cache.stats().retired, 1);

    drop(first);
    assert_eq!(cache.collect_retired(), 1);
    assert_eq!(compiler.released(), [ShaderModuleHandle(1)]);

    let second = cache.get_variant(key(0x9)).unwrap();
    assert!(second.generation > 0);
    let request = compiler.requests().pop().unwrap();
    assert!(request.defines.contains("SNOW_COVER"));
    assert!(request.preamble.contains("#define SNOW_COVER"));
}

// ============================================================================
// In-flight compiles
// ============================================================================

/// Parks every compile until the test sends a token on `release`.
struct GatedCompiler {
    started: flume::Sender<VariantKey>,
    release: flume::Receiver<()>,
    next: AtomicU64,
    released: Mutex<Vec<ShaderModuleHandle>>,
}

impl GatedCompiler {
    fn new() -> (Arc<Self>, flume::Receiver<VariantKey>, flume::Sender<()>) {
        let (started, on_start) = flume::unbounded();
        let (gate, release) = flume::unbounded();
        let compiler = Arc::new(Self {
            started,
            release,
            next: AtomicU64::new(1),
            released: Mutex::new(Vec::new()),
        });
        (compiler, on_start, gate)
    }

    fn compile_count(&self) -> u64 {
        self.next.load(Ordering::SeqCst) - 1
    }
}

impl ShaderCompiler for GatedCompiler {
    fn compile(&self, request: &CompileRequest) -> Result<ShaderModuleHandle, CompileError> {
        let _ = self.started.send(request.key);
        self.release
            .recv()
            .map_err(|_| CompileError::new(request.key, "gate closed".to_string()))?;
        Ok(ShaderModuleHandle(self.next.fetch_add(1, Ordering::SeqCst)))
    }

    fn release(&self, module: ShaderModuleHandle) {
        self.released.lock().push(module);
    }
}

#[test]
fn invalidation_during_compile_retires_the_result() {
    let (compiler, on_start, gate) = GatedCompiler::new();
    let cache = Arc::new(ShaderVariantCache::new(compiler.clone(), &sync_settings()).unwrap());

    let compiling = {
        let cache = cache.clone();
        thread::spawn(move || cache.get_variant(key(0x9)).unwrap())
    };
    assert_eq!(on_start.recv_timeout(Duration::from_secs(5)).unwrap(), key(0x9));

    cache.invalidate(None);
    gate.send(()).unwrap();
    let stale = compiling.join().unwrap();

    // the caller still gets its module, but the cache never publishes it
    assert_eq!(stale.generation, 0);
    assert!(!cache.contains(&key(0x9)));
    assert_eq!(cache.stats().retired, 1);

    gate.send(()).unwrap();
    let fresh = cache.get_variant(key(0x9)).unwrap();
    assert_eq!(fresh.generation, 1);
    assert_eq!(cache.generation(ShaderType::Lighting), 1);
    assert_eq!(compiler.compile_count(), 2);
    assert!(cache.contains(&key(0x9)));

    let stale_module = stale.module;
    drop(stale);
    assert_eq!(cache.collect_retired(), 1);
    assert_eq!(*compiler.released.lock(), [stale_module]);
}

#[test]
fn waiting_on_a_stuck_compile_times_out() {
    let (compiler, on_start, gate) = GatedCompiler::new();
    let settings = ShaderCacheSettings {
        wait_timeout_ms: 50,
        ..sync_settings()
    };
    let cache = Arc::new(ShaderVariantCache::new(compiler.clone(), &settings).unwrap());

    let compiling = {
        let cache = cache.clone();
        thread::spawn(move || cache.get_variant(key(0x9)).map(|variant| variant.module))
    };
    on_start.recv_timeout(Duration::from_secs(5)).unwrap();

    let started = Instant::now();
    let waited = cache.get_variant(key(0x9));
    let elapsed = started.elapsed();
    assert!(matches!(waited, Err(VariantError::NotReady(k)) if k == key(0x9)));
    assert!(elapsed >= Duration::from_millis(50), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "{elapsed:?}");

    // the owner finishes normally and later callers hit the cache
    gate.send(()).unwrap();
    let module = compiling.join().unwrap().unwrap();
    assert_eq!(cache.get_variant(key(0x9)).unwrap().module, module);
    assert_eq!(compiler.compile_count(), 1);
}

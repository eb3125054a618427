//! Reflection Capture Tests
//!
//! Tests for:
//! - CaptureTask cycle: six advances return to Capture, one task per frame
//! - Reset flags: each consumed exactly once per cycle, clearing raw captures
//! - Inactive reflections: face-1 work skipped, default cubemap bound
//! - Compute variants resolved through the cache, fake-reflection defines

use std::sync::Arc;

use glam::Vec3;

use prism::features::dynamic_cubemaps::{ENV_MIP_LEVELS, ENV_TEXTURE_SLOT, UpdateCubemapCB};
use prism::features::{CaptureTask, Feature, FrameContext, FrameInput};
use prism::renderer::core::{DeviceCommand, HeadlessCompiler, HeadlessDevice, ResourceId};
use prism::renderer::pipeline::ShaderVariantCache;
use prism::renderer::settings::ShaderCacheSettings;
use prism::utils::time::FrameClock;
use prism::DynamicCubemaps;

struct Rig {
    device: HeadlessDevice,
    compiler: Arc<HeadlessCompiler>,
    shaders: ShaderVariantCache,
    clock: FrameClock,
    feature: DynamicCubemaps,
}

impl Rig {
    fn new() -> Self {
        let compiler = Arc::new(HeadlessCompiler::new());
        let settings = ShaderCacheSettings {
            background_compilation: false,
            ..Default::default()
        };
        let shaders = ShaderVariantCache::new(compiler.clone(), &settings).unwrap();
        let mut device = HeadlessDevice::new();
        let mut feature = DynamicCubemaps::new();
        feature.setup_resources(&mut device).unwrap();
        device.take_commands();
        Self {
            device,
            compiler,
            shaders,
            clock: FrameClock::new(),
            feature,
        }
    }

    fn advance(&mut self, input: &FrameInput) -> CaptureTask {
        let mut ctx = FrameContext {
            device: &mut self.device,
            shaders: &self.shaders,
            input,
            clock: &self.clock,
        };
        self.feature.advance(&mut ctx)
    }

    fn prepass(&mut self, input: &FrameInput) {
        let mut ctx = FrameContext {
            device: &mut self.device,
            shaders: &self.shaders,
            input,
            clock: &self.clock,
        };
        self.feature.prepass(&mut ctx);
    }

    fn clears(&self) -> usize {
        self.device
            .commands
            .iter()
            .filter(|c| matches!(c, DeviceCommand::ClearTexture(..)))
            .count()
    }
}

// ============================================================================
// Cycle
// ============================================================================

#[test]
fn six_advances_return_to_capture() {
    let mut rig = Rig::new();
    rig.feature.active_reflections = true;
    let input = FrameInput::default();

    let tasks: Vec<CaptureTask> = (0..6).map(|_| rig.advance(&input)).collect();
    assert_eq!(
        tasks,
        [
            CaptureTask::Capture,
            CaptureTask::Inference,
            CaptureTask::Irradiance,
            CaptureTask::Capture2,
            CaptureTask::Inference2,
            CaptureTask::Irradiance2,
        ]
    );
    assert_eq!(rig.feature.next_task, CaptureTask::Capture);
}

#[test]
fn reset_flags_are_consumed_once_per_cycle() {
    let mut rig = Rig::new();
    rig.feature.active_reflections = true;
    assert_eq!(rig.feature.reset_capture, [true, true]);
    let input = FrameInput::default();

    for _ in 0..6 {
        rig.advance(&input);
    }
    assert_eq!(rig.feature.reset_capture, [false, false]);
    // raw + position per face
    assert_eq!(rig.clears(), 4);

    rig.device.take_commands();
    for _ in 0..6 {
        rig.advance(&input);
    }
    assert_eq!(rig.clears(), 0);

    rig.feature.reset();
    assert_eq!(rig.feature.reset_capture, [true, true]);
}

#[test]
fn full_cycle_dispatches_every_stage() {
    let mut rig = Rig::new();
    rig.feature.active_reflections = true;
    let input = FrameInput::default();
    for _ in 0..6 {
        rig.advance(&input);
    }

    let per_face = 1 + 1 + ENV_MIP_LEVELS as usize;
    assert_eq!(rig.device.dispatches().len(), per_face * 2);
    let copies = rig
        .device
        .commands
        .iter()
        .filter(|c| matches!(c, DeviceCommand::CopyTexture { .. }))
        .count();
    assert_eq!(copies, 2);
}

// ============================================================================
// Inactive reflections
// ============================================================================

#[test]
fn inactive_reflections_skip_face_one() {
    let mut rig = Rig::new();
    let input = FrameInput::default();
    for _ in 0..6 {
        rig.advance(&input);
    }

    assert_eq!(rig.feature.next_task, CaptureTask::Capture);
    assert_eq!(rig.device.dispatches().len(), 1 + 1 + ENV_MIP_LEVELS as usize);
    assert_eq!(rig.feature.reset_capture, [false, true]);
}

#[test]
fn default_cubemap_stands_in_for_reflections() {
    let mut rig = Rig::new();
    let input = FrameInput::default();
    rig.prepass(&input);

    let default_cubemap = rig.feature.reflection_source().unwrap();
    assert_ne!(Some(default_cubemap), rig.feature.env_texture());
    let bound = rig.device.commands.iter().find_map(|c| match c {
        DeviceCommand::BindPixel(slot, resources) if *slot == ENV_TEXTURE_SLOT => Some(resources.clone()),
        _ => None,
    });
    assert_eq!(bound.unwrap()[1], ResourceId::Texture(default_cubemap));
}

// ============================================================================
// Compute variants and constants
// ============================================================================

#[test]
fn fake_reflections_compile_their_own_variants() {
    let mut rig = Rig::new();
    rig.feature.active_reflections = true;
    rig.feature.fake_reflections = true;
    let input = FrameInput::default();
    for _ in 0..6 {
        rig.advance(&input);
    }

    let requests = rig.compiler.requests();
    assert_eq!(requests.len(), 5);
    assert_eq!(
        requests.iter().filter(|r| r.defines.contains("FAKE_REFLECTIONS")).count(),
        2
    );
    assert!(requests.iter().all(|r| !r.defines.contains("REFLECTIONS")));
}

#[test]
fn capture_writes_camera_delta() {
    let mut rig = Rig::new();
    let first = FrameInput {
        camera_position: Vec3::new(10.0, 0.0, 0.0),
        ..Default::default()
    };
    rig.advance(&first);
    // skip the rest of the cycle
    for _ in 0..5 {
        rig.advance(&first);
    }

    let moved = FrameInput {
        camera_position: Vec3::new(12.0, 1.0, 0.0),
        ..Default::default()
    };
    rig.device.take_commands();
    rig.advance(&moved);

    let buffer = rig.device.commands.iter().find_map(|c| match c {
        DeviceCommand::WriteBuffer(id, _) => Some(*id),
        _ => None,
    });
    let cb: UpdateCubemapCB = rig.device.read_constants(buffer.unwrap()).unwrap();
    assert_eq!(cb.camera_previous_pos_adjust, [-2.0, -1.0, 0.0]);
}

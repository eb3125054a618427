//! Recording collaborators for offline use and tests.
//!
//! [`HeadlessDevice`] allocates sequential ids, keeps the last bytes written
//! to every buffer and records every command in submission order.
//! [`HeadlessCompiler`] hands out sequential module handles and records every
//! request it was asked to compile.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use log::trace;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::device::{
    BufferDesc, BufferId, ComputeBindings, RenderDevice, ResourceId, SamplerDesc, SamplerId,
    StorageViewId, TextureDesc, TextureId,
};
use crate::errors::{CompileError, PrismError, Result};
use crate::renderer::pipeline::{CompileRequest, ShaderCompiler, ShaderModuleHandle};

/// One recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    CreateTexture(TextureId, String),
    LoadTexture(TextureId, PathBuf),
    CreateBuffer(BufferId, String),
    CreateSampler(SamplerId, String),
    CreateStorageView(StorageViewId, TextureId, u32),
    WriteBuffer(BufferId, usize),
    ClearTexture(TextureId, [f32; 4]),
    CopyTexture { src: TextureId, dst: TextureId },
    BindPixel(u32, Vec<ResourceId>),
    BindCompute(ComputeBindings),
    Dispatch(ShaderModuleHandle, [u32; 3]),
    Release(ResourceId),
}

#[derive(Debug, Default)]
pub struct HeadlessDevice {
    next_id: u32,
    pub commands: Vec<DeviceCommand>,
    textures: FxHashMap<TextureId, TextureDesc>,
    buffers: FxHashMap<BufferId, Vec<u8>>,
    /// Makes every `load_texture` fail, simulating missing files.
    pub fail_texture_loads: bool,
}

impl HeadlessDevice {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn record(&mut self, command: DeviceCommand) {
        trace!("[Headless] {command:?}");
        self.commands.push(command);
    }

    /// Last data written to `buffer`.
    #[must_use]
    pub fn buffer_data(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(Vec::as_slice)
    }

    /// Last value written to `buffer`, read back as `T`.
    #[must_use]
    pub fn read_constants<T: bytemuck::Pod>(&self, buffer: BufferId) -> Option<T> {
        let data = self.buffer_data(buffer)?;
        (data.len() == std::mem::size_of::<T>()).then(|| bytemuck::pod_read_unaligned(data))
    }

    #[must_use]
    pub fn texture(&self, id: TextureId) -> Option<&TextureDesc> {
        self.textures.get(&id)
    }

    #[must_use]
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    #[must_use]
    pub fn dispatches(&self) -> Vec<(ShaderModuleHandle, [u32; 3])> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                DeviceCommand::Dispatch(shader, groups) => Some((*shader, *groups)),
                _ => None,
            })
            .collect()
    }

    /// Drains the recorded commands.
    pub fn take_commands(&mut self) -> Vec<DeviceCommand> {
        std::mem::take(&mut self.commands)
    }
}

impl RenderDevice for HeadlessDevice {
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId> {
        if desc.width == 0 || desc.height == 0 || desc.mip_levels == 0 {
            return Err(PrismError::Device(format!(
                "texture '{}' has an empty extent",
                desc.label
            )));
        }
        let id = TextureId(self.next());
        self.textures.insert(id, desc.clone());
        self.record(DeviceCommand::CreateTexture(id, desc.label.clone()));
        Ok(id)
    }

    fn load_texture(&mut self, path: &Path) -> Result<TextureId> {
        if self.fail_texture_loads {
            return Err(PrismError::Device(format!(
                "failed to load texture {}",
                path.display()
            )));
        }
        let id = TextureId(self.next());
        self.record(DeviceCommand::LoadTexture(id, path.to_path_buf()));
        Ok(id)
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId> {
        let id = BufferId(self.next());
        self.buffers.insert(id, Vec::new());
        self.record(DeviceCommand::CreateBuffer(id, desc.label.clone()));
        Ok(id)
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerId> {
        let id = SamplerId(self.next());
        self.record(DeviceCommand::CreateSampler(id, desc.label.clone()));
        Ok(id)
    }

    fn create_storage_view(&mut self, texture: TextureId, mip_level: u32) -> Result<StorageViewId> {
        let Some(desc) = self.textures.get(&texture) else {
            return Err(PrismError::Device(format!("unknown texture {texture:?}")));
        };
        if !desc.storage || mip_level >= desc.mip_levels {
            return Err(PrismError::Device(format!(
                "texture '{}' has no storage mip {mip_level}",
                desc.label
            )));
        }
        let id = StorageViewId(self.next());
        self.record(DeviceCommand::CreateStorageView(id, texture, mip_level));
        Ok(id)
    }

    fn write_buffer(&mut self, buffer: BufferId, data: &[u8]) {
        self.buffers.insert(buffer, data.to_vec());
        self.record(DeviceCommand::WriteBuffer(buffer, data.len()));
    }

    fn clear_texture(&mut self, texture: TextureId, color: [f32; 4]) {
        self.record(DeviceCommand::ClearTexture(texture, color));
    }

    fn copy_texture(&mut self, src: TextureId, dst: TextureId) {
        self.record(DeviceCommand::CopyTexture { src, dst });
    }

    fn bind_pixel_resources(&mut self, slot: u32, resources: &[ResourceId]) {
        self.record(DeviceCommand::BindPixel(slot, resources.to_vec()));
    }

    fn bind_compute(&mut self, bindings: &ComputeBindings) {
        self.record(DeviceCommand::BindCompute(bindings.clone()));
    }

    fn dispatch(&mut self, shader: ShaderModuleHandle, groups: [u32; 3]) {
        self.record(DeviceCommand::Dispatch(shader, groups));
    }

    fn release(&mut self, resource: ResourceId) {
        match resource {
            ResourceId::Texture(id) => {
                self.textures.remove(&id);
            }
            ResourceId::Buffer(id) => {
                self.buffers.remove(&id);
            }
            ResourceId::Sampler(_) | ResourceId::StorageView(_) => {}
        }
        self.record(DeviceCommand::Release(resource));
    }
}

// ─── HeadlessCompiler ────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct HeadlessCompiler {
    next: AtomicU64,
    requests: Mutex<Vec<CompileRequest>>,
    released: Mutex<Vec<ShaderModuleHandle>>,
    failing_define: Option<String>,
    delay: Option<Duration>,
}

impl HeadlessCompiler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every request whose defines contain `define`.
    #[must_use]
    pub fn failing_on(mut self, define: impl Into<String>) -> Self {
        self.failing_define = Some(define.into());
        self
    }

    /// Sleeps for `delay` inside every compile.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[must_use]
    pub fn compile_count(&self) -> usize {
        self.requests.lock().len()
    }

    #[must_use]
    pub fn requests(&self) -> Vec<CompileRequest> {
        self.requests.lock().clone()
    }

    #[must_use]
    pub fn released(&self) -> Vec<ShaderModuleHandle> {
        self.released.lock().clone()
    }
}

impl ShaderCompiler for HeadlessCompiler {
    fn compile(&self, request: &CompileRequest) -> std::result::Result<ShaderModuleHandle, CompileError> {
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        self.requests.lock().push(request.clone());
        if let Some(define) = &self.failing_define
            && request.defines.contains(define)
        {
            return Err(CompileError::new(request.key, format!("{define} is not supported")));
        }
        Ok(ShaderModuleHandle(self.next.fetch_add(1, Ordering::Relaxed) + 1))
    }

    fn release(&self, module: ShaderModuleHandle) {
        self.released.lock().push(module);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::core::device::{TextureFormat, write_constants};

    #[test]
    fn storage_view_requires_valid_mip() {
        let mut device = HeadlessDevice::new();
        let cube = device
            .create_texture(&TextureDesc::cube("env", 128, 7, TextureFormat::Rgba16Float))
            .unwrap();
        assert!(device.create_storage_view(cube, 6).is_ok());
        assert!(device.create_storage_view(cube, 7).is_err());
    }

    #[test]
    fn constants_read_back() {
        let mut device = HeadlessDevice::new();
        let buffer = device
            .create_buffer(&BufferDesc::constant::<[f32; 4]>("cb"))
            .unwrap();
        write_constants(&mut device, buffer, &[1.0f32, 2.0, 3.0, 4.0]);
        assert_eq!(device.read_constants::<[f32; 4]>(buffer), Some([1.0, 2.0, 3.0, 4.0]));
        assert_eq!(device.read_constants::<[f32; 2]>(buffer), None);
    }
}

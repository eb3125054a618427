//! Device collaborator interface.
//!
//! Features never touch a graphics API directly. Everything they allocate,
//! bind or dispatch goes through [`RenderDevice`], implemented by the host
//! renderer (or by [`HeadlessDevice`](super::HeadlessDevice) offline).
//!
//! All calls happen on the render thread.

use std::path::Path;

use smallvec::SmallVec;

use crate::errors::Result;
use crate::renderer::pipeline::ShaderModuleHandle;

// ─── Resource Handles ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SamplerId(pub u32);

/// Writable view of one texture mip (unordered access).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageViewId(pub u32);

/// Any device resource, used for binding and release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceId {
    Texture(TextureId),
    Buffer(BufferId),
    Sampler(SamplerId),
    StorageView(StorageViewId),
}

impl From<TextureId> for ResourceId {
    fn from(id: TextureId) -> Self {
        Self::Texture(id)
    }
}

impl From<BufferId> for ResourceId {
    fn from(id: BufferId) -> Self {
        Self::Buffer(id)
    }
}

impl From<SamplerId> for ResourceId {
    fn from(id: SamplerId) -> Self {
        Self::Sampler(id)
    }
}

impl From<StorageViewId> for ResourceId {
    fn from(id: StorageViewId) -> Self {
        Self::StorageView(id)
    }
}

// ─── Descriptors ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba16Float,
    Rgba32Float,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub format: TextureFormat,
    /// Six-layer cube texture.
    pub cube: bool,
    /// Allows storage views.
    pub storage: bool,
}

impl TextureDesc {
    #[must_use]
    pub fn cube(label: impl Into<String>, size: u32, mip_levels: u32, format: TextureFormat) -> Self {
        Self {
            label: label.into(),
            width: size,
            height: size,
            mip_levels,
            format,
            cube: true,
            storage: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    Constant,
    Structured,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    pub label: String,
    pub size: u64,
    pub usage: BufferUsage,
}

impl BufferDesc {
    /// Constant buffer sized for `T`.
    #[must_use]
    pub fn constant<T: bytemuck::Pod>(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            size: std::mem::size_of::<T>() as u64,
            usage: BufferUsage::Constant,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Point,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    Clamp,
    Wrap,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerDesc {
    pub label: String,
    pub filter: FilterMode,
    pub address: AddressMode,
}

/// Compute-stage binding set. Binding a default set unbinds everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComputeBindings {
    pub constant_buffers: SmallVec<[BufferId; 2]>,
    pub shader_resources: SmallVec<[TextureId; 4]>,
    pub storage_views: SmallVec<[StorageViewId; 4]>,
    pub samplers: SmallVec<[SamplerId; 2]>,
}

// ─── RenderDevice ────────────────────────────────────────────────────────────

/// Graphics device operations used by features.
pub trait RenderDevice {
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId>;

    /// Loads a texture from disk (DDS or any format the host supports).
    fn load_texture(&mut self, path: &Path) -> Result<TextureId>;

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId>;

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerId>;

    /// Storage view over every face of one mip level.
    fn create_storage_view(&mut self, texture: TextureId, mip_level: u32) -> Result<StorageViewId>;

    fn write_buffer(&mut self, buffer: BufferId, data: &[u8]);

    fn clear_texture(&mut self, texture: TextureId, color: [f32; 4]);

    fn copy_texture(&mut self, src: TextureId, dst: TextureId);

    /// Binds pixel-stage shader resources starting at `slot`.
    fn bind_pixel_resources(&mut self, slot: u32, resources: &[ResourceId]);

    fn bind_compute(&mut self, bindings: &ComputeBindings);

    fn dispatch(&mut self, shader: ShaderModuleHandle, groups: [u32; 3]);

    fn release(&mut self, resource: ResourceId);
}

/// Writes a Pod constant buffer value.
pub fn write_constants<T: bytemuck::Pod>(device: &mut dyn RenderDevice, buffer: BufferId, value: &T) {
    device.write_buffer(buffer, bytemuck::bytes_of(value));
}

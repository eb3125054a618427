//! Device collaborator
//!
//! - [`RenderDevice`]: allocation, binding and dispatch used by features
//! - [`HeadlessDevice`] / [`HeadlessCompiler`]: recording implementations for
//!   offline runs and tests

pub mod device;
pub mod headless;

pub use device::{
    AddressMode, BufferDesc, BufferId, BufferUsage, ComputeBindings, FilterMode, RenderDevice,
    ResourceId, SamplerDesc, SamplerId, StorageViewId, TextureDesc, TextureFormat, TextureId,
    write_constants,
};
pub use headless::{DeviceCommand, HeadlessCompiler, HeadlessDevice};

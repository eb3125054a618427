#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod errors;
pub mod features;
pub mod renderer;
pub mod resources;
pub mod utils;

pub use errors::{CompileError, PrismError, Result};
pub use features::{
    DynamicCubemaps, Feature, FeatureRegistry, FeatureState, FrameInput, LinearLighting,
    SettingsStore, SettingsUi, SnowCover, TruePbr, WetnessEffects,
};
pub use renderer::core::{HeadlessCompiler, HeadlessDevice, RenderDevice};
pub use renderer::pipeline::{
    Descriptor, PermutationTable, ShaderCompiler, ShaderStage, ShaderType, ShaderVariantCache,
    VariantKey,
};
pub use renderer::{DrawResolution, EngineSettings, RenderContext};
pub use resources::ShaderDefines;
pub use utils::interner;

//! Shared resource definitions
//!
//! - [`ShaderDefines`]: interned, sorted define set merged from every feature

pub mod shader_defines;

pub use shader_defines::ShaderDefines;

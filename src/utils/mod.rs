//! Utility Module
//!
//! - [`interner`]: String interning for define tokens
//! - [`time`]: Frame clock with pause-aware accumulation
//!
//! # String Interning
//!
//! ```rust,ignore
//! use prism::utils::interner;
//!
//! let sym1 = interner::intern("TRUE_PBR");
//! let sym2 = interner::intern("TRUE_PBR");
//! assert_eq!(sym1, sym2); // O(1) comparison
//! ```

pub mod interner;
pub mod time;

pub use interner::Symbol;
pub use time::FrameClock;

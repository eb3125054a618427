//! Global String Interner
//!
//! Define tokens and feature short names are interned into compact integer
//! [`Symbol`]s so that define sets compare and hash as integers.

use std::sync::LazyLock;

use lasso::{Spur, ThreadedRodeo};

static INTERNER: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::new);

/// Compact identifier of an interned string.
pub type Symbol = Spur;

/// Interns a string, returning the existing symbol when already present.
#[inline]
pub fn intern(s: &str) -> Symbol {
    INTERNER.get_or_intern(s)
}

/// Looks up the symbol of an already interned string without allocating.
#[inline]
pub fn get(s: &str) -> Option<Symbol> {
    INTERNER.get(s)
}

/// Resolves a symbol back to its string.
#[inline]
pub fn resolve(sym: Symbol) -> &'static str {
    INTERNER.resolve(&sym)
}

/// Pre-interns the define tokens produced on every descriptor expansion,
/// keeping interning off the lookup path during steady-state rendering.
pub fn preload_common_defines() {
    let common = [
        // Stages
        "VSHADER",
        "PSHADER",
        "CSHADER",
        // Lighting flags
        "VC",
        "SKINNED",
        "MODELSPACENORMALS",
        "TRUE_PBR",
        "SPECULAR",
        "SOFT_LIGHTING",
        "RIM_LIGHTING",
        "BACK_LIGHTING",
        "SHADOW_DIR",
        "DEFSHADOW",
        "PROJECTED_UV",
        "ANISO_LIGHTING",
        "AMBIENT_SPECULAR",
        "WORLD_MAP",
        "BASE_OBJECT_IS_SNOW",
        "DO_ALPHA_TEST",
        "SNOW",
        "CHARACTER_LIGHT",
        "ADDITIONAL_ALPHA_MASK",
        // Lighting techniques
        "LANDSCAPE",
        "MULTI_TEXTURE",
        "LOD_LAND_BLEND",
        "TREE_ANIM",
        "LODOBJECTS",
        "LODOBJECTSHD",
        // Values
        "",
        "1",
    ];

    for name in common {
        intern(name);
    }
}

//! Shader Define Sets
//!
//! A define set is the preprocessor view of a shader variant: the tokens a
//! descriptor expands to (technique, flags, stage) plus the tokens every
//! active feature contributes (`SNOW_COVER`, `DYNAMIC_CUBEMAPS`, ...).
//!
//! Keys and values are interned [`Symbol`]s kept sorted by symbol id, so two
//! sets holding the same definitions hash identically no matter the order in
//! which they were built.
//!
//! ```rust,ignore
//! use prism::resources::ShaderDefines;
//!
//! let mut defines = ShaderDefines::new();
//! defines.define("TRUE_PBR");
//! defines.set("MAX_MIP_LEVEL", "7");
//! assert_eq!(defines.get("MAX_MIP_LEVEL"), Some("7"));
//! ```

use std::collections::BTreeMap;

use crate::utils::interner::{self, Symbol};

/// An ordered set of `NAME -> value` shader definitions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ShaderDefines {
    defines: Vec<(Symbol, Symbol)>,
}

impl ShaderDefines {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            defines: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            defines: Vec::with_capacity(capacity),
        }
    }

    /// Builds a set of value-less defines from bare tokens.
    #[must_use]
    pub fn from_tokens<'a>(tokens: impl IntoIterator<Item = &'a str>) -> Self {
        let mut result = Self::new();
        for token in tokens {
            result.define(token);
        }
        result
    }

    /// Sets `key` to `value`, replacing any previous value.
    pub fn set(&mut self, key: &str, value: &str) {
        self.set_symbol(interner::intern(key), interner::intern(value));
    }

    /// Declares a flag-style define with an empty value.
    pub fn define(&mut self, key: &str) {
        self.set(key, "");
    }

    fn set_symbol(&mut self, key: Symbol, value: Symbol) {
        match self.defines.binary_search_by_key(&key, |&(k, _)| k) {
            Ok(idx) => self.defines[idx].1 = value,
            Err(idx) => self.defines.insert(idx, (key, value)),
        }
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        interner::get(key).is_some_and(|key_sym| {
            self.defines
                .binary_search_by_key(&key_sym, |&(k, _)| k)
                .is_ok()
        })
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&'static str> {
        let key_sym = interner::get(key)?;
        self.defines
            .binary_search_by_key(&key_sym, |&(k, _)| k)
            .ok()
            .map(|idx| interner::resolve(self.defines[idx].1))
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.defines.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defines.is_empty()
    }

    /// Iterates definitions as resolved strings.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.defines
            .iter()
            .map(|&(k, v)| (interner::resolve(k), interner::resolve(v)))
    }

    /// Lexicographically ordered copy, used for preamble rendering so the
    /// generated source text is stable across runs.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// Merges `other` into `self`; `other` wins on conflict.
    pub fn merge(&mut self, other: &ShaderDefines) {
        for &(key, value) in &other.defines {
            self.set_symbol(key, value);
        }
    }

    #[must_use]
    pub fn merged_with(&self, other: &ShaderDefines) -> ShaderDefines {
        let mut result = self.clone();
        result.merge(other);
        result
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_and_get() {
        let mut defines = ShaderDefines::new();
        defines.define("SKINNED");
        defines.set("MAX_MIP", "7");

        assert!(defines.contains("SKINNED"));
        assert_eq!(defines.get("SKINNED"), Some(""));
        assert_eq!(defines.get("MAX_MIP"), Some("7"));
        assert!(!defines.contains("NOT_A_DEFINE_91c2"));
    }

    #[test]
    fn merge_overrides() {
        let mut base = ShaderDefines::from_tokens(["VC", "TRUE_PBR"]);
        let mut features = ShaderDefines::new();
        features.set("TRUE_PBR", "1");
        features.define("SNOW_COVER");

        base.merge(&features);

        assert_eq!(base.get("TRUE_PBR"), Some("1"));
        assert!(base.contains("VC"));
        assert!(base.contains("SNOW_COVER"));
        assert_eq!(base.len(), 3);
    }

    #[test]
    fn insert_order_does_not_matter() {
        let d1 = ShaderDefines::from_tokens(["WETNESS_EFFECTS", "SNOW_COVER"]);
        let d2 = ShaderDefines::from_tokens(["SNOW_COVER", "WETNESS_EFFECTS"]);
        assert_eq!(d1, d2);
    }

    #[test]
    fn feature_defines_override_key_defines() {
        let key = ShaderDefines::from_tokens(["VC"]);
        let mut features = ShaderDefines::new();
        features.set("VC", "0");
        let merged = key.merged_with(&features);
        assert_eq!(merged.get("VC"), Some("0"));
        assert_eq!(key.get("VC"), Some(""));
    }

    #[test]
    fn to_map_is_lexicographic() {
        let defines = ShaderDefines::from_tokens(["ZETA_DEF", "ALPHA_DEF"]);
        let keys: Vec<_> = defines.to_map().into_keys().collect();
        assert_eq!(keys, vec!["ALPHA_DEF".to_string(), "ZETA_DEF".to_string()]);
    }
}

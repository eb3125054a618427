//! Settings document.
//!
//! One JSON object per process, keyed by section: `General` holds the
//! [`EngineSettings`], every other key is a feature short name holding that
//! feature's settings object.
//!
//! Loading is lenient. Each field of a section is applied on top of the
//! declared defaults one at a time; a field that does not parse is logged
//! and left at its default, the rest of the section still loads.

use std::fs;
use std::path::Path;

use log::{info, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::errors::{PrismError, Result};
use crate::renderer::settings::EngineSettings;

/// Deserializes `doc` onto `T::default()` field by field.
///
/// Missing fields keep their defaults. Malformed fields are reported as
/// [`PrismError::ConfigParse`] warnings and keep their defaults.
#[must_use]
pub fn load_lenient<T>(section: &str, doc: &Value) -> T
where
    T: Serialize + DeserializeOwned + Default,
{
    let Ok(Value::Object(mut merged)) = serde_json::to_value(T::default()) else {
        // Non-struct settings: all or nothing.
        return serde_json::from_value(doc.clone()).unwrap_or_else(|e| {
            warn!("{}", parse_error(section, "*", &e));
            T::default()
        });
    };

    match doc {
        Value::Object(fields) => {
            for (field, value) in fields {
                let previous = merged.insert(field.clone(), value.clone());
                if let Err(e) = serde_json::from_value::<T>(Value::Object(merged.clone())) {
                    warn!("{}", parse_error(section, field, &e));
                    match previous {
                        Some(previous) => merged.insert(field.clone(), previous),
                        None => merged.remove(field),
                    };
                }
            }
        }
        Value::Null => {}
        other => warn!(
            "{}",
            PrismError::ConfigParse {
                section: section.to_string(),
                field: "*".to_string(),
                message: format!("expected an object, found {other}"),
            }
        ),
    }

    serde_json::from_value(Value::Object(merged)).unwrap_or_default()
}

fn parse_error(section: &str, field: &str, e: &serde_json::Error) -> PrismError {
    PrismError::ConfigParse {
        section: section.to_string(),
        field: field.to_string(),
        message: e.to_string(),
    }
}

/// The whole settings document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsStore {
    doc: Map<String, Value>,
}

impl SettingsStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a document. A root that is not an object is rejected.
    pub fn parse(text: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(text)? {
            Value::Object(doc) => Ok(Self { doc }),
            other => Err(PrismError::ConfigParse {
                section: "*".to_string(),
                field: "*".to_string(),
                message: format!("settings root must be an object, found {other}"),
            }),
        }
    }

    pub fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let store = Self::parse(&text)?;
        info!("[Settings] loaded {}", path.display());
        Ok(store)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.doc)?)
    }

    pub fn save_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json_string()?)?;
        info!("[Settings] saved {}", path.display());
        Ok(())
    }

    #[must_use]
    pub fn section(&self, name: &str) -> Option<&Value> {
        self.doc.get(name)
    }

    pub fn set_section(&mut self, name: &str, value: Value) {
        self.doc.insert(name.to_string(), value);
    }

    pub fn remove_section(&mut self, name: &str) -> Option<Value> {
        self.doc.remove(name)
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.doc.keys().map(String::as_str)
    }

    #[must_use]
    pub fn engine_settings(&self) -> EngineSettings {
        self.section(EngineSettings::SECTION)
            .map(|doc| load_lenient(EngineSettings::SECTION, doc))
            .unwrap_or_default()
    }

    pub fn set_engine_settings(&mut self, settings: &EngineSettings) -> Result<()> {
        self.set_section(EngineSettings::SECTION, serde_json::to_value(settings)?);
        Ok(())
    }
}

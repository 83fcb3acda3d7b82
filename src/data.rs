//! Supplied data: the configuration table and the catalog of component
//! record sheets, behind the [`DataSource`] seam the engine is given.
//!
//! Loading these from files (and include expansion) is the caller's job;
//! the types derive serde so a JSON project file deserializes straight in.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Config value meaning "defined, but deliberately empty". Distinguishes a
/// found-but-blank setting from a missing one inside the lookup; both read
/// back as the empty string.
pub const BLANK_SENTINEL: &str = "%blank%";

/// One record of a sheet: a named set of field values. A record flagged
/// `base` defines the sheet itself and is excluded from element iteration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub base: bool,
    #[serde(default)]
    pub fields: IndexMap<String, String>,
}

impl Record {
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    fn field(&self, name: &str) -> Option<&str> {
        get_ci(&self.fields, name).map(String::as_str)
    }
}

/// A component sheet: its named records, in authoring order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    #[serde(default)]
    pub records: IndexMap<String, Record>,
}

impl Sheet {
    pub fn record_mut(&mut self, name: impl Into<String>) -> &mut Record {
        self.records.entry(name.into()).or_default()
    }

    /// The record marked as the sheet's base-object definition, if any.
    pub fn base_record(&self) -> Option<&Record> {
        self.records.values().find(|r| r.base)
    }
}

/// Output captured by an explicit or end-of-render save.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedOutput {
    pub name: Option<String>,
    pub lines: Vec<String>,
}

/// In-memory project: configuration plus component sheets. The stock
/// [`DataSource`] implementation; saves are collected rather than written,
/// since file I/O stays outside the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub config: IndexMap<String, String>,
    #[serde(default)]
    pub components: IndexMap<String, Sheet>,
    #[serde(skip)]
    pub saved: Vec<SavedOutput>,
}

impl Project {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_config(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.config.insert(name.into(), value.into());
    }

    pub fn sheet_mut(&mut self, name: impl Into<String>) -> &mut Sheet {
        self.components.entry(name.into()).or_default()
    }

    fn sheet(&self, name: &str) -> Option<&Sheet> {
        get_ci(&self.components, name)
    }
}

fn get_ci<'a, V>(map: &'a IndexMap<String, V>, name: &str) -> Option<&'a V> {
    if let Some(v) = map.get(name) {
        return Some(v);
    }
    map.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

/// The data the engine consumes. Every method is a raw lookup; scope-chain
/// climbing, field scope prefixes, and command dispatch all live in the
/// engine itself.
pub trait DataSource {
    /// Raw configuration value. The explicit-blank sentinel surfaces as an
    /// empty string (found).
    fn config_value(&self, name: &str) -> Option<String>;

    /// The default component list for component-level loops: the
    /// `Components` config entry when present, otherwise every sheet.
    fn component_names(&self) -> Vec<String>;

    /// Entry names of a sheet, excluding its base-object record.
    fn entry_names(&self, component: &str) -> Vec<String>;

    /// A field of a named entry, or of the base record when `entry` is None.
    fn field(&self, component: &str, entry: Option<&str>, name: &str) -> Option<String>;

    /// A field found in any record of the sheet, authoring order.
    fn field_in_any_entry(&self, component: &str, name: &str) -> Option<String>;

    /// Receive post-processed output for an explicit or final save.
    fn save_output(&mut self, name: Option<&str>, lines: Vec<String>);
}

impl DataSource for Project {
    fn config_value(&self, name: &str) -> Option<String> {
        let raw = get_ci(&self.config, name)?;
        if raw == BLANK_SENTINEL {
            Some(String::new())
        } else {
            Some(raw.clone())
        }
    }

    fn component_names(&self) -> Vec<String> {
        if let Some(list) = get_ci(&self.config, "Components") {
            return list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        self.components.keys().cloned().collect()
    }

    fn entry_names(&self, component: &str) -> Vec<String> {
        match self.sheet(component) {
            Some(sheet) => sheet
                .records
                .iter()
                .filter(|(_, r)| !r.base)
                .map(|(name, _)| name.clone())
                .collect(),
            None => Vec::new(),
        }
    }

    fn field(&self, component: &str, entry: Option<&str>, name: &str) -> Option<String> {
        let sheet = self.sheet(component)?;
        let record = match entry {
            Some(entry) => get_ci(&sheet.records, entry)?,
            None => sheet.base_record()?,
        };
        record.field(name).map(String::from)
    }

    fn field_in_any_entry(&self, component: &str, name: &str) -> Option<String> {
        let sheet = self.sheet(component)?;
        sheet
            .records
            .values()
            .find_map(|r| r.field(name))
            .map(String::from)
    }

    fn save_output(&mut self, name: Option<&str>, lines: Vec<String>) {
        self.saved.push(SavedOutput {
            name: name.map(String::from),
            lines,
        });
    }
}

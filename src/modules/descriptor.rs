//! Module descriptor (`module.toml`) parsing and validation.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Serialize;

use super::error::DescriptorError;

/// Fixed location of the descriptor inside every module archive.
pub const DESCRIPTOR_PATH: &str = "module.toml";

/// Symbol prefix reserved for host-internal code.
pub const RESERVED_PREFIX: &str = "modhost.";

/// Validated module metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Descriptor {
    name: String,
    version: String,
    author: String,
    contributors: Vec<String>,
    #[serde(rename = "mainClass")]
    main: String,
}

impl Descriptor {
    /// Parse and validate a descriptor from a reader.
    pub fn parse<R: Read>(mut reader: R, reserved_prefix: &str) -> Result<Self, DescriptorError> {
        let mut text = String::new();
        reader
            .read_to_string(&mut text)
            .map_err(|e| DescriptorError::with_source("Could not read descriptor", e))?;
        Self::parse_str(&text, reserved_prefix)
    }

    /// Parse and validate a descriptor from its text.
    pub fn parse_str(text: &str, reserved_prefix: &str) -> Result<Self, DescriptorError> {
        let table: toml::Table = toml::from_str(text)
            .map_err(|e| DescriptorError::with_source("Descriptor is not properly structured", e))?;

        let name = required(&table, "name")?;
        if !is_valid_name(&name) {
            return Err(DescriptorError::new(format!(
                "Name '{name}' contains invalid characters"
            )));
        }
        // The name doubles as the data directory name.
        if name == "." || name == ".." {
            return Err(DescriptorError::new(format!(
                "Name '{name}' is not a valid directory name"
            )));
        }

        let version = required(&table, "version")?;
        let author = required(&table, "author")?;

        let contributors = match table.get("contributors") {
            None => Vec::new(),
            Some(toml::Value::Array(items)) => items
                .iter()
                .map(|item| {
                    as_text(item)
                        .ok_or_else(|| DescriptorError::new("Contributors are of wrong type"))
                })
                .collect::<Result<_, _>>()?,
            Some(_) => return Err(DescriptorError::new("Contributors are of wrong type")),
        };

        let main = required(&table, "mainClass")?;
        if main.is_empty() {
            return Err(DescriptorError::new("mainClass is empty"));
        }
        if main.starts_with(reserved_prefix) {
            return Err(DescriptorError::new(format!(
                "The main class may not be within the {reserved_prefix} namespace"
            )));
        }

        Ok(Self {
            name,
            version,
            author,
            contributors,
            main,
        })
    }

    /// Read the descriptor straight out of a module archive.
    pub fn from_archive(path: &Path, reserved_prefix: &str) -> Result<Self, DescriptorError> {
        let file = File::open(path).map_err(|e| {
            DescriptorError::with_source(format!("Could not open '{}'", path.display()), e)
        })?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| {
            DescriptorError::with_source(format!("'{}' is not a module archive", path.display()), e)
        })?;
        let entry = match archive.by_name(DESCRIPTOR_PATH) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => {
                return Err(DescriptorError::new(format!(
                    "Archive does not contain {DESCRIPTOR_PATH}"
                )))
            }
            Err(e) => {
                return Err(DescriptorError::with_source(
                    format!("Could not read {DESCRIPTOR_PATH}"),
                    e,
                ))
            }
        };
        Self::parse(entry, reserved_prefix)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn contributors(&self) -> &[String] {
        &self.contributors
    }

    /// Fully-qualified identifier of the entry type.
    pub fn main(&self) -> &str {
        &self.main
    }

    /// `"<name> v<version>"`, used in every lifecycle log line.
    pub fn full_name(&self) -> String {
        format!("{} v{}", self.name, self.version)
    }
}

fn required(table: &toml::Table, key: &str) -> Result<String, DescriptorError> {
    match table.get(key) {
        None => Err(DescriptorError::new(format!("{key} is not defined"))),
        Some(value) => {
            as_text(value).ok_or_else(|| DescriptorError::new(format!("{key} is of wrong type")))
        }
    }
}

/// Scalars convert to their text form; arrays and tables do not.
fn as_text(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        toml::Value::Datetime(d) => Some(d.to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => None,
    }
}

/// `^[A-Za-z0-9 _.-]+$`
fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '.' | '-'))
}

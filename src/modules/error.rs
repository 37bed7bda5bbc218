//! Error taxonomy for module loading.
//!
//! Descriptor and load failures are fatal to a single module only; the
//! registry turns them into logged diagnostics. `SymbolNotFound` is routine
//! and drives the namespace delegation chain. `AlreadyRegistered` means the
//! binding protocol itself was violated.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Boxed cause attached to an error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Malformed or missing module metadata.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DescriptorError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl DescriptorError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Human-readable reason, without the cause chain.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A namespace could not produce a definition for a symbol.
#[derive(Debug, Error)]
#[error("symbol `{symbol}` not found")]
pub struct SymbolNotFound {
    symbol: String,
    #[source]
    source: Option<BoxError>,
}

impl SymbolNotFound {
    pub(crate) fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            source: None,
        }
    }

    pub(crate) fn with_source(symbol: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            symbol: symbol.into(),
            source: Some(source.into()),
        }
    }

    /// The symbol that was queried.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

/// The binding protocol between a namespace and its module was violated.
#[derive(Debug, Error)]
#[error("module `{module}` cannot be bound: {detail}")]
pub struct AlreadyRegistered {
    pub module: String,
    pub detail: String,
}

/// Why an archive was rejected by a loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidModuleKind {
    /// The archive path does not exist.
    ArchiveMissing,
    /// The descriptor could not be parsed or validated.
    Descriptor,
    /// Something other than a directory sits where the data directory goes.
    DataDirConflict(PathBuf),
    /// The archive exists but could not be opened as an archive.
    Archive,
    /// The entry type named by the descriptor resolves nowhere.
    EntryNotFound(String),
    /// The entry type resolves, but is not a module type.
    NotAModule(String),
    /// The entry type has no accessible no-argument constructor.
    NoAccessibleConstructor(String),
    /// The entry type is abstract.
    Abstract(String),
    /// The entry type's constructor failed or panicked.
    ConstructionFailed(String),
}

impl fmt::Display for InvalidModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ArchiveMissing => f.write_str("archive does not exist"),
            Self::Descriptor => f.write_str("invalid descriptor"),
            Self::DataDirConflict(dir) => {
                write!(f, "'{}' exists and is not a directory", dir.display())
            }
            Self::Archive => f.write_str("archive could not be opened"),
            Self::EntryNotFound(main) => write!(f, "cannot find entry type {main}"),
            Self::NotAModule(main) => write!(f, "entry type {main} is not a module type"),
            Self::NoAccessibleConstructor(main) => {
                write!(f, "entry type {main} has no accessible no-argument constructor")
            }
            Self::Abstract(main) => write!(f, "entry type {main} is abstract"),
            Self::ConstructionFailed(main) => write!(f, "entry type {main} failed to construct"),
        }
    }
}

/// Failure of a single module load.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("invalid module '{}': {kind}", .path.display())]
    InvalidModule {
        path: PathBuf,
        kind: InvalidModuleKind,
        #[source]
        source: Option<BoxError>,
    },
    #[error(transparent)]
    AlreadyRegistered(#[from] AlreadyRegistered),
}

impl LoadError {
    pub(crate) fn invalid(path: &Path, kind: InvalidModuleKind) -> Self {
        Self::InvalidModule {
            path: path.to_path_buf(),
            kind,
            source: None,
        }
    }

    pub(crate) fn invalid_because(
        path: &Path,
        kind: InvalidModuleKind,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::InvalidModule {
            path: path.to_path_buf(),
            kind,
            source: Some(source.into()),
        }
    }

    /// The rejection reason, if this is an `InvalidModule` error.
    pub fn kind(&self) -> Option<&InvalidModuleKind> {
        match self {
            Self::InvalidModule { kind, .. } => Some(kind),
            Self::AlreadyRegistered(_) => None,
        }
    }
}

/// Failure of `LoadedModule::instance_for`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InstanceError {
    #[error("{type_name} was not constructed through a module namespace")]
    NotManaged { type_name: &'static str },
    #[error("cannot get the module for {type_name} before it has finished construction")]
    IllegalState { type_name: &'static str },
}

/// Failure surfaced by the module registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("'{}' is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("no loader accepts '{}'", .0.display())]
    NoLoader(PathBuf),
    #[error("a module named `{name}` is already loaded from '{}'", .existing.display())]
    DuplicateName { name: String, existing: PathBuf },
    #[error("failed to list '{}'", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Load(#[from] LoadError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_error_renders_cause_chain() {
        let inner = DescriptorError::new("name is not defined");
        let outer = LoadError::invalid_because(
            Path::new("/mods/a.zip"),
            InvalidModuleKind::Descriptor,
            inner,
        );
        let rendered = format!("{:#}", anyhow::Error::new(outer));
        assert_eq!(
            rendered,
            "invalid module '/mods/a.zip': invalid descriptor: name is not defined"
        );
    }

    #[test]
    fn load_error_exposes_kind() {
        let err = LoadError::invalid(
            Path::new("a.zip"),
            InvalidModuleKind::EntryNotFound("com.example.Main".into()),
        );
        assert_eq!(
            err.kind(),
            Some(&InvalidModuleKind::EntryNotFound("com.example.Main".into()))
        );

        let err = LoadError::from(AlreadyRegistered {
            module: "Foo".into(),
            detail: "already bound".into(),
        });
        assert!(err.kind().is_none());
    }
}

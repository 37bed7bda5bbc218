//! Module system for modhost.
//!
//! Extension modules ship as zip archives carrying a `module.toml`
//! descriptor, definition entries for the symbols they provide, and any
//! resources they need. Each archive gets its own [`ModuleNamespace`], so two
//! modules may define the same symbol differently without interfering.
//!
//! # Archive Layout
//!
//! ```text
//! weather.zip
//! ├── module.toml                  # descriptor
//! ├── com/example/weather/Station.def
//! ├── META-INF/MANIFEST.MF         # optional group metadata
//! └── assets/stations.json         # resources
//! ```
//!
//! ```toml
//! name = "Weather"
//! version = "1.2.0"
//! author = "ada"
//! contributors = ["grace"]
//! mainClass = "com.example.weather.Station"
//! ```
//!
//! # Lifecycle
//!
//! The host fills a [`Catalog`] with the module types it knows how to build,
//! runs [`ModuleRegistry::discover_and_load`], calls
//! [`ModuleRegistry::notify_loaded`] and [`ModuleRegistry::enable`] per module,
//! and [`ModuleRegistry::disable_all`] at shutdown. Hook failures are logged,
//! never propagated.

pub mod catalog;
pub mod descriptor;
pub mod error;
pub mod instance;
pub mod loader;
pub mod namespace;
pub mod registry;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use catalog::{Catalog, HostSymbols, Linker, SymbolResolver};
pub use descriptor::{Descriptor, DESCRIPTOR_PATH, RESERVED_PREFIX};
pub use error::{
    AlreadyRegistered, DescriptorError, InstanceError, InvalidModuleKind, LoadError,
    RegistryError, SymbolNotFound,
};
pub use instance::LoadedModule;
pub use loader::{ArchiveLoader, ModuleLoader, DEFAULT_FILE_FILTER};
pub use namespace::{Group, ModuleNamespace};
pub use registry::{Diagnostic, ModuleRegistry};
pub use traits::{Constructor, Definition, Module, ModuleFactory, Origin, Shape};

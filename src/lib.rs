//! Runtime host for archive-packaged extension modules.
//!
//! See [`modules`] for the archive format and lifecycle.

pub mod builtin;
pub mod config;
pub mod modules;

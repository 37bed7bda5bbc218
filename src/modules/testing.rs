//! Builders for module archives used by tests.

use std::io::Write;
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::descriptor::DESCRIPTOR_PATH;
use super::namespace::definition_path;

#[derive(Default)]
pub(crate) struct ArchiveBuilder {
    entries: Vec<(String, Vec<u8>)>,
}

impl ArchiveBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn file(mut self, path: &str, contents: impl AsRef<[u8]>) -> Self {
        self.entries
            .push((path.to_string(), contents.as_ref().to_vec()));
        self
    }

    /// A valid descriptor at version 1.0.0.
    pub(crate) fn descriptor(self, name: &str, main: &str) -> Self {
        let text = format!(
            "name = {name:?}\nversion = \"1.0.0\"\nauthor = \"tester\"\nmainClass = {main:?}\n"
        );
        self.file(DESCRIPTOR_PATH, text)
    }

    /// A definition entry for `symbol` naming `implementation` (empty: itself).
    pub(crate) fn definition(self, symbol: &str, implementation: &str) -> Self {
        self.file(&definition_path(symbol), implementation)
    }

    pub(crate) fn write(self, dir: &Path, file_name: &str) -> PathBuf {
        let path = dir.join(file_name);
        let file = std::fs::File::create(&path).unwrap();
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, contents) in self.entries {
            zip.start_file(name, options).unwrap();
            zip.write_all(&contents).unwrap();
        }
        zip.finish().unwrap();
        path
    }
}

//! Output side of stub generation: the stub jar and materialized artifacts.

use crate::artifact::ArtifactDescriptor;
use crate::error::{Result, StubError};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::debug;
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

const MANIFEST_ENTRY: &str = "META-INF/MANIFEST.MF";
const MANIFEST: &[u8] = b"Manifest-Version: 1.0\r\n\r\n";

/// The stub jar under construction.
///
/// The manifest is written at creation, before any worker runs, so it is
/// always the archive's first entry. Workers append classes through a shared
/// reference; the writer lock makes each append atomic. Entry timestamps are
/// pinned to the zip epoch so archive bytes do not depend on wall-clock time.
pub struct StubArchive {
    path: PathBuf,
    writer: Mutex<ZipWriter<File>>,
}

fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
}

impl StubArchive {
    /// Creates the output jar (and any missing parent directories) and
    /// writes the manifest entry.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        let mut writer = ZipWriter::new(file);
        writer.start_file(MANIFEST_ENTRY, entry_options())?;
        writer.write_all(MANIFEST)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(writer),
        })
    }

    /// Appends one class entry. Safe to call from multiple workers; appends
    /// land in completion order.
    pub fn append_class(&self, entry: &str, bytes: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.start_file(entry, entry_options())?;
        writer.write_all(bytes)?;
        Ok(())
    }

    /// Writes the central directory and closes the file.
    pub fn finish(self) -> Result<()> {
        let writer = self
            .writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        writer.finish()?;
        debug!(path = %self.path.display(), "stub archive finished");
        Ok(())
    }
}

/// Copies reconciled artifacts under `extras_dir`, one subdirectory per
/// component id, replacing whatever a previous run left there. Returns the
/// destination paths in input order.
pub fn materialize_artifacts(
    artifacts: &[ArtifactDescriptor],
    extras_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let mut destinations = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let dir = extras_dir.join(sanitize_component(&artifact.component_id));
        std::fs::create_dir_all(&dir)?;
        let Some(file_name) = artifact.file.file_name() else {
            return Err(StubError::ArtifactFileName {
                path: artifact.file.clone(),
            });
        };
        let destination = dir.join(file_name);
        std::fs::copy(&artifact.file, &destination)?;
        debug!(
            component = %artifact.component_id,
            destination = %destination.display(),
            "materialized artifact"
        );
        destinations.push(destination);
    }
    Ok(destinations)
}

/// Turns a component id into a directory name safe on every filesystem.
pub fn sanitize_component(component_id: &str) -> String {
    component_id
        .chars()
        .map(|c| match c {
            ':' | '/' | '\\' => '_',
            other => other,
        })
        .collect()
}

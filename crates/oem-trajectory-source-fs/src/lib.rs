//! Filesystem collaborators for trajectory loading: `.oem` directory listing and
//! asynchronous text fetch.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use oem_trajectory_core::{FetchError, SourceFetcher};
use thiserror::Error;

pub const OEM_EXTENSION: &str = "oem";
pub const DEFAULT_OEM_DIR: &str = "./static/oem_files";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to list {path}: {source}")]
    List {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A directory of ephemeris files. Source identifiers are bare file names inside it.
#[derive(Debug, Clone)]
pub struct OemDirectory {
    root: PathBuf,
}

impl OemDirectory {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File names ending in `.oem`, sorted so repeated loads see the same order.
    ///
    /// # Errors
    /// Returns [`SourceError::List`] when the directory cannot be read.
    pub async fn list(&self) -> Result<Vec<String>, SourceError> {
        let list_error = |source| SourceError::List { path: self.root.clone(), source };
        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(list_error)?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(list_error)? {
            let is_file = entry.file_type().await.map_err(list_error)?.is_file();
            let Some(name) = entry.file_name().to_str().map(ToString::to_string) else {
                tracing::debug!(path = %entry.path().display(), "skipping non UTF-8 file name");
                continue;
            };
            if !is_file {
                continue;
            }
            if is_servable_name(&name) {
                names.push(name);
            } else {
                tracing::debug!(name = %name, "skipping file that cannot be served by name");
            }
        }
        names.sort();
        tracing::debug!(root = %self.root.display(), files = names.len(), "listed ephemeris files");
        Ok(names)
    }

    /// Resolves a listed name to its path. Names [`OemDirectory::list`] would never return
    /// are treated as identifiers this source never handed out.
    ///
    /// # Errors
    /// Returns [`FetchError::Unregistered`] for names without the `.oem` extension, and
    /// for empty names, path separators, `.`, `..` or NUL.
    pub fn path_for(&self, source_id: &str) -> Result<PathBuf, FetchError> {
        if !is_servable_name(source_id) {
            return Err(FetchError::Unregistered(source_id.to_string()));
        }
        Ok(self.root.join(source_id))
    }
}

impl SourceFetcher for OemDirectory {
    fn fetch(&self, source_id: &str) -> impl Future<Output = Result<String, FetchError>> + Send {
        let path = self.path_for(source_id);
        let source_id = source_id.to_string();
        async move { read_source(&source_id, &path?).await }
    }
}

/// Explicit file paths, used verbatim as source identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathSources;

impl SourceFetcher for PathSources {
    fn fetch(&self, source_id: &str) -> impl Future<Output = Result<String, FetchError>> + Send {
        let source_id = source_id.to_string();
        async move {
            let path = PathBuf::from(&source_id);
            read_source(&source_id, &path).await
        }
    }
}

async fn read_source(source_id: &str, path: &Path) -> Result<String, FetchError> {
    tracing::debug!(source_id, path = %path.display(), "reading ephemeris file");
    tokio::fs::read_to_string(path).await.map_err(|err| FetchError::unavailable(source_id, err))
}

/// Shared by listing and lookup so every listed name can be fetched again.
fn is_servable_name(name: &str) -> bool {
    let escapes = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.contains('\0');
    !escapes && has_oem_extension(name)
}

fn has_oem_extension(name: &str) -> bool {
    Path::new(name).extension().and_then(|ext| ext.to_str()) == Some(OEM_EXTENSION)
}

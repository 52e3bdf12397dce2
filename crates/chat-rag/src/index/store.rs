//! Index persistence: one JSON file per identifier

use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{Error, Result};

use super::vector_index::VectorIndex;

const INDEX_EXTENSION: &str = "json";
const MAX_NAME_LEN: usize = 128;

/// Filesystem store for named indexes
#[derive(Debug, Clone)]
pub struct IndexStore {
    root: PathBuf,
}

impl IndexStore {
    /// Open (creating if needed) the storage directory
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist an index, replacing any previous one with the same identifier
    ///
    /// Written to a temp file in the same directory and renamed into place,
    /// so concurrent readers see either the old or the new index.
    pub fn save(&self, id: &str, index: &VectorIndex) -> Result<()> {
        let path = self.path_for(id)?;

        let mut tmp = NamedTempFile::new_in(&self.root)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer(&mut writer, index)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| Error::Io(e.error))?;

        tracing::info!(
            "Saved index '{}' ({} chunks) to {}",
            id,
            index.len(),
            path.display()
        );
        Ok(())
    }

    /// Load an index by identifier
    pub fn load(&self, id: &str) -> Result<VectorIndex> {
        let path = self.path_for(id)?;
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::IndexNotFound(id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let index: VectorIndex = serde_json::from_reader(BufReader::new(file))?;
        tracing::debug!("Loaded index '{}' ({} chunks)", id, index.len());
        Ok(index)
    }

    /// Identifiers of all persisted indexes, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(INDEX_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_index_name(stem).is_ok() {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        validate_index_name(id)?;
        Ok(self.root.join(format!("{}.{}", id, INDEX_EXTENSION)))
    }
}

/// Identifiers are plain file stems: ASCII alphanumerics, `-`, `_` and `.`,
/// not starting with `.`
pub fn validate_index_name(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id.len() <= MAX_NAME_LEN
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(Error::InvalidIndexName(id.to_string()))
    }
}

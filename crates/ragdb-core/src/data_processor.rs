use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{DocumentId, SourceDocument};

/// Loads already-extracted `.txt` files from a directory tree.
///
/// The document id is the path relative to the root without extension, using
/// `/` separators, so it stays stable across machines.
#[derive(Default)]
pub struct DataProcessor;

impl DataProcessor {
    pub fn new() -> Self {
        Self
    }

    pub fn load_directory(&self, data_dir: &Path) -> Result<Vec<SourceDocument>> {
        self.load_directory_limited(data_dir, usize::MAX)
    }

    pub fn load_directory_limited(&self, data_dir: &Path, limit: usize) -> Result<Vec<SourceDocument>> {
        if !data_dir.is_dir() {
            return Err(Error::NotFound(format!("data directory {}", data_dir.display())));
        }
        let mut files = self.list_txt_files(data_dir);
        if files.is_empty() {
            tracing::warn!(dir = %data_dir.display(), "no .txt files found");
            return Ok(vec![]);
        }
        if files.len() > limit {
            files.truncate(limit);
            tracing::info!(limit, "limited to first files");
        }
        let mut documents = Vec::with_capacity(files.len());
        for (file_index, file_path) in files.iter().enumerate() {
            tracing::debug!(file = %file_path.display(), n = file_index + 1, of = files.len(), "loading");
            let text = self.read_file_content(file_path)?;
            let filename = file_path.file_name().map(|f| f.to_string_lossy().to_string()).unwrap_or_default();
            documents.push(SourceDocument { id: self.document_id(file_path, data_dir), filename, text });
        }
        tracing::info!(files = documents.len(), dir = %data_dir.display(), "loaded documents");
        Ok(documents)
    }

    pub fn load_file(&self, file_path: &Path) -> Result<SourceDocument> {
        let text = self.read_file_content(file_path)?;
        let filename = file_path.file_name().map(|f| f.to_string_lossy().to_string()).unwrap_or_default();
        let id = file_path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_else(|| filename.clone());
        Ok(SourceDocument { id: DocumentId::from(id), filename, text })
    }

    fn read_file_content(&self, file_path: &Path) -> Result<String> {
        let bytes = fs::read(file_path).map_err(|e| Error::operation(format!("reading {}: {e}", file_path.display())))?;
        match String::from_utf8(bytes) {
            Ok(content) => Ok(content),
            Err(e) => Ok(String::from_utf8_lossy(e.as_bytes()).to_string()),
        }
    }

    fn document_id(&self, file_path: &Path, data_dir: &Path) -> DocumentId {
        let relative = file_path.strip_prefix(data_dir).unwrap_or(file_path).with_extension("");
        let parts: Vec<String> = relative.components().map(|c| c.as_os_str().to_string_lossy().to_string()).collect();
        DocumentId::from(parts.join("/"))
    }

    fn list_txt_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut txt_files: Vec<PathBuf> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("txt"))
            .map(|e| e.path().to_path_buf())
            .collect();
        txt_files.sort();
        txt_files
    }
}

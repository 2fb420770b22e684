//! Package readers.
//!
//! A package is a flat namespace of `/`-separated paths. Archives are read
//! into memory when opened; unpacked directories are read on demand.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// Largest total size of the entries read out of one archive.
pub const MAX_UNPACKED_SIZE: u64 = 256 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("`{0}` does not exist in the package")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt archive: {0}")]
    Corrupt(#[from] zip::result::ZipError),

    #[error("archive expands past {MAX_UNPACKED_SIZE} bytes")]
    TooLarge,
}

/// Read access to the files of a package.
pub trait PackageReader {
    /// Display name (the archive file name).
    fn name(&self) -> &str;

    fn read(&self, path: &str) -> Result<Vec<u8>, PackageError>;

    fn contains(&self, path: &str) -> bool;

    /// Every file path, sorted.
    fn paths(&self) -> Vec<String>;

    /// A file decoded as UTF-8, replacing invalid sequences.
    fn read_text(&self, path: &str) -> Result<String, PackageError> {
        let bytes = self.read(path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// A package held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryPackage {
    name: String,
    files: BTreeMap<String, Vec<u8>>,
}

impl MemoryPackage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            files: BTreeMap::new(),
        }
    }

    pub fn with_file(mut self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        self.insert(path, content);
        self
    }

    pub fn insert(&mut self, path: &str, content: impl Into<Vec<u8>>) {
        self.files.insert(normalize(path), content.into());
    }

    /// Unpack a zip archive (`.xpi`, `.jar`) from its bytes.
    pub fn from_zip(name: impl Into<String>, bytes: &[u8]) -> Result<Self, PackageError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
        let mut package = Self::new(name);
        let mut total: u64 = 0;
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if entry.is_dir() {
                continue;
            }
            total = total.saturating_add(entry.size());
            if total > MAX_UNPACKED_SIZE {
                return Err(PackageError::TooLarge);
            }
            let path = entry.name().to_string();
            let mut content = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut content)?;
            package.insert(&path, content);
        }
        debug!(package = %package.name, files = package.files.len(), "unpacked archive");
        Ok(package)
    }
}

impl PackageReader for MemoryPackage {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, PackageError> {
        self.files
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| PackageError::NotFound(path.to_string()))
    }

    fn contains(&self, path: &str) -> bool {
        self.files.contains_key(&normalize(path))
    }

    fn paths(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }
}

/// An unpacked package on disk.
#[derive(Debug, Clone)]
pub struct DirPackage {
    name: String,
    root: PathBuf,
    paths: Vec<String>,
}

impl DirPackage {
    pub fn open(root: &Path) -> Result<Self, PackageError> {
        let mut paths = Vec::new();
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry.map_err(|e| PackageError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(root) {
                paths.push(normalize(&relative.to_string_lossy()));
            }
        }
        paths.sort();
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());
        Ok(Self {
            name,
            root: root.to_path_buf(),
            paths,
        })
    }
}

impl PackageReader for DirPackage {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, PackageError> {
        let path = normalize(path);
        if !self.paths.contains(&path) {
            return Err(PackageError::NotFound(path));
        }
        Ok(fs::read(self.root.join(&path))?)
    }

    fn contains(&self, path: &str) -> bool {
        self.paths.contains(&normalize(path))
    }

    fn paths(&self) -> Vec<String> {
        self.paths.clone()
    }
}

/// Open a package file or directory.
pub fn open(path: &Path) -> Result<Box<dyn PackageReader>, PackageError> {
    if path.is_dir() {
        return Ok(Box::new(DirPackage::open(path)?));
    }
    let bytes = fs::read(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(Box::new(MemoryPackage::from_zip(name, &bytes)?))
}

/// Forward slashes, no leading `./` or `/`.
fn normalize(path: &str) -> String {
    let path = path.replace('\\', "/");
    let path = path.trim_start_matches("./");
    path.trim_start_matches('/').to_string()
}

/// Lower-cased extension of a package path.
pub fn extension(path: &str) -> String {
    Path::new(path)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    pub(crate) fn zip_bytes(files: &[(&str, &str)]) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            let options = zip::write::SimpleFileOptions::default();
            for (name, content) in files {
                writer.start_file(*name, options).unwrap();
                writer.write_all(content.as_bytes()).unwrap();
            }
            writer.finish().unwrap();
        }
        buffer.into_inner()
    }

    #[test]
    fn test_memory_package() {
        let package = MemoryPackage::new("a.xpi").with_file("./content/a.js", "x");
        assert!(package.contains("content/a.js"));
        assert_eq!(package.read("content/a.js").unwrap(), b"x");
        assert!(matches!(package.read("missing"), Err(PackageError::NotFound(_))));
    }

    #[test]
    fn test_zip_package() {
        let bytes = zip_bytes(&[("install.rdf", "<RDF/>"), ("chrome/content/a.js", "var a;")]);
        let package = MemoryPackage::from_zip("a.xpi", &bytes).unwrap();
        assert_eq!(package.paths(), vec!["chrome/content/a.js", "install.rdf"]);
        assert_eq!(package.read_text("install.rdf").unwrap(), "<RDF/>");
    }

    #[test]
    fn test_corrupt_zip() {
        assert!(matches!(
            MemoryPackage::from_zip("a.xpi", b"not a zip"),
            Err(PackageError::Corrupt(_))
        ));
    }

    #[test]
    fn test_dir_package() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("content")).unwrap();
        fs::write(dir.path().join("content/a.js"), "var a;").unwrap();
        let package = DirPackage::open(dir.path()).unwrap();
        assert_eq!(package.paths(), vec!["content/a.js"]);
        assert_eq!(package.read_text("content/a.js").unwrap(), "var a;");
        assert!(!package.contains("b.js"));
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension("a/B.XPI"), "xpi");
        assert_eq!(extension("README"), "");
    }
}

//! File storage for template artifacts, page images and generated output.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Blocking file store rooted at one directory. Paths handed to callers are
/// absolute; paths accepted from callers are relative to the root.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, rel_path: &str) -> PathBuf {
        self.root.join(rel_path)
    }

    pub fn save(&self, rel_path: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.resolve(rel_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::io(format!("creating {}", parent.display()), e))?;
        }
        std::fs::write(&path, bytes)
            .map_err(|e| Error::io(format!("writing {}", path.display()), e))?;
        Ok(path)
    }

    pub fn read(&self, rel_path: &str) -> Result<Vec<u8>> {
        let path = self.resolve(rel_path);
        if !path.exists() {
            return Err(Error::missing(path));
        }
        std::fs::read(&path).map_err(|e| Error::io(format!("reading {}", path.display()), e))
    }

    pub fn exists(&self, rel_path: &str) -> bool {
        self.resolve(rel_path).exists()
    }

    /// Remove a stored file. Removing something already gone is not an error.
    pub fn delete(&self, rel_path: &str) -> Result<()> {
        let path = self.resolve(rel_path);
        if path.exists() {
            std::fs::remove_file(&path)
                .map_err(|e| Error::io(format!("removing {}", path.display()), e))?;
        }
        Ok(())
    }

    // Naming scheme for per-template artifacts, shared by the annotation
    // service, the renderer and the comparison engine.

    pub fn template_pdf_name(template_id: i64) -> String {
        format!("{template_id}_original.pdf")
    }

    pub fn template_page_name(template_id: i64, page_number: u32) -> String {
        format!("{template_id}_page_{page_number}.png")
    }
}

/// Streaming SHA-256 of a file, hex-encoded.
pub fn sha256_hex(path: &Path) -> Result<String> {
    let file =
        File::open(path).map_err(|e| Error::io(format!("opening {}", path.display()), e))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();

    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .map_err(|e| Error::io(format!("reading {}", path.display()), e))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_read_exists_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        assert!(!store.exists("a/b.bin"));
        store.save("a/b.bin", b"hello").unwrap();
        assert!(store.exists("a/b.bin"));
        assert_eq!(store.read("a/b.bin").unwrap(), b"hello");

        store.delete("a/b.bin").unwrap();
        assert!(!store.exists("a/b.bin"));
        // Deleting twice is fine.
        store.delete("a/b.bin").unwrap();
    }

    #[test]
    fn read_missing_is_source_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let err = store.read("gone.pdf").unwrap_err();
        assert!(matches!(err, Error::SourceMissing { .. }));
    }

    #[test]
    fn sha256_matches_known_digest() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let path = store.save("x.txt", b"abc").unwrap();
        assert_eq!(
            sha256_hex(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn artifact_names_are_stable() {
        assert_eq!(FileStore::template_pdf_name(7), "7_original.pdf");
        assert_eq!(FileStore::template_page_name(7, 3), "7_page_3.png");
    }
}

//! Delivering finished documents.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::info;

use crate::{Error, Result};

/// `{type with spaces replaced by underscores}_{request_id}.pdf`
pub fn download_filename(certificate_type: &str, request_id: &str) -> String {
    format!("{}_{}.pdf", certificate_type.replace(' ', "_"), request_id)
}

/// Where finished documents go.
pub trait DownloadSink: Send + Sync {
    /// Store `bytes` under `filename` and report where they ended up.
    fn save(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf>;
}

/// Writes documents into a directory, creating it on first use.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DownloadSink for DirectorySink {
    fn save(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.dir.join(sanitize(filename));
        std::fs::create_dir_all(&self.dir).map_err(|source| Error::Save {
            path: self.dir.clone(),
            source,
        })?;
        std::fs::write(&path, bytes).map_err(|source| Error::Save {
            path: path.clone(),
            source,
        })?;
        info!("saved {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }
}

/// Keeps documents in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, filename: &str) -> Option<Vec<u8>> {
        self.files.lock().ok()?.get(filename).cloned()
    }

    pub fn filenames(&self) -> Vec<String> {
        self.files
            .lock()
            .map(|f| f.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl DownloadSink for MemorySink {
    fn save(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        let mut files = self
            .files
            .lock()
            .map_err(|_| Error::Save {
                path: PathBuf::from(filename),
                source: std::io::Error::new(std::io::ErrorKind::Other, "memory sink poisoned"),
            })?;
        files.insert(filename.to_string(), bytes.to_vec());
        Ok(PathBuf::from(filename))
    }
}

/// Keep a filename inside its directory.
fn sanitize(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c => c,
        })
        .collect();
    match cleaned.trim_start_matches('.') {
        "" => "certificate.pdf".to_string(),
        rest => rest.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_replaces_spaces() {
        assert_eq!(
            download_filename("Bonafide Certificate", "42"),
            "Bonafide_Certificate_42.pdf"
        );
        assert_eq!(
            download_filename("NOC (No Objection Certificate)", "7"),
            "NOC_(No_Objection_Certificate)_7.pdf"
        );
    }

    #[test]
    fn directory_sink_creates_dir_and_stays_inside_it() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(tmp.path().join("out"));
        let path = sink.save("../escape/x.pdf", b"%PDF").unwrap();
        assert!(path.starts_with(tmp.path().join("out")));
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF");
    }

    #[test]
    fn memory_sink_keeps_bytes() {
        let sink = MemorySink::new();
        sink.save("a.pdf", b"1").unwrap();
        assert_eq!(sink.get("a.pdf"), Some(b"1".to_vec()));
        assert_eq!(sink.filenames(), vec!["a.pdf".to_string()]);
    }
}

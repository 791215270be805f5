//! ============================================================================
//! CSV Credential File - Flat-file identity backend
//! ============================================================================
//! Two-column table (`username,password`) keyed on username. Uniqueness is
//! enforced by registration, not by the file. Every insert rewrites the whole
//! file through a uniquely named temp file in the same directory + rename.
//! ============================================================================

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::CredentialBackend;
use crate::auth::is_digest;
use crate::error::StoreError;

/// One row of the credential table
#[derive(Debug, Deserialize)]
struct CredentialRow {
    username: String,
    password: String,
}

/// Credentials stored in a CSV file on disk
pub struct CsvCredentialFile {
    path: PathBuf,
}

impl CsvCredentialFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_rows(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let mut reader = match csv::Reader::from_path(&self.path) {
            Ok(reader) => reader,
            Err(e) => {
                if let csv::ErrorKind::Io(io) = e.kind() {
                    if io.kind() == ErrorKind::NotFound {
                        info!("No credential file at {}, creating it", self.path.display());
                        self.write_rows(&BTreeMap::new())?;
                        return Ok(BTreeMap::new());
                    }
                }
                return Err(StoreError::Unavailable(format!(
                    "Failed to open {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        let mut users = BTreeMap::new();
        for row in reader.deserialize::<CredentialRow>() {
            let row = row.map_err(StoreError::corrupt("Failed to parse credential row"))?;
            users.insert(row.username, row.password);
        }

        let plaintext = users.values().filter(|p| !is_digest(p)).count();
        if plaintext > 0 {
            warn!(
                "{} rows in {} do not hold a SHA-256 digest; those users cannot log in",
                plaintext,
                self.path.display()
            );
        }

        debug!("Loaded {} credentials from {}", users.len(), self.path.display());
        Ok(users)
    }

    fn write_rows(&self, users: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let dir = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                fs::create_dir_all(parent)
                    .map_err(StoreError::unavailable("Failed to create credential directory"))?;
                parent
            }
            None => Path::new("."),
        };

        // Unique per writer, so concurrent rewrites never share a temp file
        let mut tmp = NamedTempFile::new_in(dir)
            .map_err(StoreError::unavailable("Failed to create credential temp file"))?;
        {
            let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
            // Header row even when empty so the file is a valid two-column table
            writer
                .write_record(["username", "password"])
                .map_err(StoreError::unavailable("Failed to write credential header"))?;
            for (username, password) in users {
                writer
                    .write_record([username.as_str(), password.as_str()])
                    .map_err(StoreError::unavailable("Failed to write credential row"))?;
            }
            writer
                .flush()
                .map_err(StoreError::unavailable("Failed to flush credential file"))?;
        }

        tmp.persist(&self.path)
            .map_err(StoreError::unavailable("Failed to replace credential file"))?;
        Ok(())
    }
}

#[async_trait]
impl CredentialBackend for CsvCredentialFile {
    fn name(&self) -> &'static str {
        "csv"
    }

    async fn load_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        self.read_rows()
    }

    async fn insert(
        &self,
        username: &str,
        digest: &str,
        existing: &BTreeMap<String, String>,
    ) -> Result<(), StoreError> {
        let mut users = existing.clone();
        users.insert(username.to_string(), digest.to_string());
        self.write_rows(&users)?;

        debug!("Wrote {} credentials to {}", users.len(), self.path.display());
        Ok(())
    }
}

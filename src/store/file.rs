//! Directory-backed store: one file per entry.
//!
//! Entry names are hex-encoded into file names so any name is safe on any
//! filesystem:
//!
//! ```text
//! <dir>/<hex(name)>.entry
//! ```
//!
//! Writes go to a temp file in the same directory, are flushed to disk and
//! renamed over the target, and the directory is flushed after the rename.
//! Readers never see a half-written blob, and a `set` that returned `Ok`
//! survives a crash.  On Unix the directory is `0700` and entries are
//! created `0600`.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::SecureKeyStore;
use crate::errors::{Result, VaultError};

/// Extension of committed entries.
const ENTRY_EXT: &str = "entry";

/// A store rooted at a directory on disk.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        if !dir.exists() {
            fs::create_dir_all(dir)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
            }
        }

        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Returns the store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, name: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{ENTRY_EXT}", hex::encode(name.as_bytes())))
    }

    fn write_atomic(&self, path: &Path, blob: &[u8]) -> std::io::Result<()> {
        let tmp_path = self.dir.join(format!(
            ".{}.tmp",
            path.file_name().unwrap_or_default().to_string_lossy()
        ));

        // Left over from an interrupted write.
        match fs::remove_file(&tmp_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        let written = (|| {
            // Created owner-only from the start (no TOCTOU window).
            let mut options = fs::OpenOptions::new();
            options.write(true).create_new(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(0o600);
            }

            let mut file = options.open(&tmp_path)?;
            file.write_all(blob)?;
            file.sync_all()?;
            drop(file);

            fs::rename(&tmp_path, path)?;
            self.sync_dir()
        })();

        if written.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        written
    }

    /// Flush the directory so a completed rename survives a crash.
    #[cfg(unix)]
    fn sync_dir(&self) -> std::io::Result<()> {
        fs::File::open(&self.dir)?.sync_all()
    }

    #[cfg(not(unix))]
    fn sync_dir(&self) -> std::io::Result<()> {
        Ok(())
    }
}

impl SecureKeyStore for FileStore {
    fn get(&self, name: &str) -> Result<Vec<u8>> {
        match fs::read(self.entry_path(name)) {
            Ok(blob) => Ok(blob),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(VaultError::NotFound(name.to_string())),
            Err(e) => Err(VaultError::StoreError(format!("failed to read '{name}': {e}"))),
        }
    }

    fn set(&self, name: &str, blob: &[u8]) -> Result<()> {
        self.write_atomic(&self.entry_path(name), blob)
            .map_err(|e| VaultError::WriteFailed(format!("'{name}': {e}")))
    }

    fn delete(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.entry_path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(VaultError::NotFound(name.to_string())),
            Err(e) => Err(VaultError::StoreError(format!(
                "failed to delete '{name}': {e}"
            ))),
        }
    }

    fn exists(&self, name: &str) -> bool {
        self.entry_path(name).is_file()
    }

    fn names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXT) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            // Foreign files that are not ours are skipped.
            if let Some(name) = hex::decode(stem)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
            {
                names.push(name);
            }
        }

        names.sort();
        Ok(names)
    }
}

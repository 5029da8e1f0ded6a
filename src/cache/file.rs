//! File-backed cookie jar with atomic writes.
//!
//! Native shells embedding the site keep their cookies under
//! `dirs::data_dir()/<namespace>/cookies.json`. Every operation reloads the
//! file, so a later read sees writes made by other jars or processes, and
//! temp file + rename keeps the file whole. Only writes within one process
//! are serialized: two processes writing at once can lose one of the
//! writes.

use crate::cache::format::SetCookie;
use crate::cache::jar::{CookieJar, CookieSet};
use crate::clock::{Clock, SystemClock};
use crate::ConsentError;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

const JAR_FILE: &str = "cookies.json";

/// File-backed cookie jar.
pub struct FileCookieJar {
    /// Directory holding the jar file.
    jar_dir: PathBuf,
    clock: Arc<dyn Clock>,
    /// Serializes read-modify-write within this process.
    write_lock: Mutex<()>,
}

impl FileCookieJar {
    /// Create a jar under `dirs::data_dir()/<namespace>/`.
    pub fn new(namespace: &str) -> Result<Self, ConsentError> {
        let base_dir = dirs::data_dir()
            .ok_or_else(|| ConsentError::StorageIO("Could not find data directory".to_string()))?;

        Self::with_path(base_dir.join(namespace), Arc::new(SystemClock))
    }

    /// Create a jar in a specific directory.
    pub fn with_path(jar_dir: PathBuf, clock: Arc<dyn Clock>) -> Result<Self, ConsentError> {
        fs::create_dir_all(&jar_dir)
            .map_err(|e| ConsentError::StorageIO(format!("Failed to create jar dir: {}", e)))?;
        Ok(Self {
            jar_dir,
            clock,
            write_lock: Mutex::new(()),
        })
    }

    /// Directory holding the jar file.
    pub fn dir(&self) -> &Path {
        &self.jar_dir
    }

    fn jar_path(&self) -> PathBuf {
        self.jar_dir.join(JAR_FILE)
    }

    fn load(&self) -> Result<CookieSet, ConsentError> {
        let path = self.jar_path();

        if !path.exists() {
            return Ok(CookieSet::default());
        }

        let json = fs::read_to_string(&path)
            .map_err(|e| ConsentError::StorageIO(format!("Failed to read jar file: {}", e)))?;

        serde_json::from_str(&json)
            .map_err(|e| ConsentError::StorageIO(format!("Failed to parse jar file: {}", e)))
    }

    fn save(&self, cookies: &CookieSet) -> Result<(), ConsentError> {
        let target_path = self.jar_path();
        let temp_path = self.jar_dir.join(format!("{}.tmp", JAR_FILE));

        let json = serde_json::to_string_pretty(cookies)
            .map_err(|e| ConsentError::StorageIO(format!("Failed to serialize jar: {}", e)))?;

        fs::write(&temp_path, &json)
            .map_err(|e| ConsentError::StorageIO(format!("Failed to write temp file: {}", e)))?;

        fs::rename(&temp_path, &target_path)
            .map_err(|e| ConsentError::StorageIO(format!("Failed to rename jar file: {}", e)))?;

        Ok(())
    }

    /// Delete every stored cookie.
    pub fn clear(&self) -> Result<(), ConsentError> {
        let path = self.jar_path();

        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| ConsentError::StorageIO(format!("Failed to delete jar: {}", e)))?;
        }

        Ok(())
    }
}

impl CookieJar for FileCookieJar {
    fn cookie_header(&self, host: &str) -> Result<String, ConsentError> {
        Ok(self.load()?.header_for(host, self.clock.now_utc()))
    }

    fn set_cookie(&self, host: &str, cookie: &SetCookie) -> Result<(), ConsentError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| ConsentError::StorageIO("jar lock poisoned".to_string()))?;

        let mut cookies = self.load()?;
        cookies.apply(host, cookie, self.clock.now_utc())?;
        self.save(&cookies)?;

        debug!(host = %host, path = %self.jar_path().display(), "persisted cookie jar");
        Ok(())
    }
}

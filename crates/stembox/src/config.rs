//! Data-directory resolution, worker runtime discovery and process-wide settings.

use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use crate::separation::SeparationQuality;

/// Application folder name under the platform data directory.
pub const APP_DIR_NAME: &str = "stembox";

/// Overrides the resolved data directory when set.
pub const DATA_DIR_ENV: &str = "STEMBOX_DATA_DIR";

/// Overrides the Python interpreter used for the separation worker.
pub const PYTHON_ENV: &str = "STEMBOX_PYTHON";

/// Overrides the separation worker script path.
pub const SEPARATOR_ENV: &str = "STEMBOX_SEPARATOR";

const DEFAULT_SEPARATOR_SCRIPT: &str = "resources/separation/separate.py";

/// Resolves the root data directory for song storage and model caches.
///
/// Priority: `STEMBOX_DATA_DIR` env var, then the platform data directory,
/// then the current directory as a last resort.
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }

    dirs::data_dir()
        .map(|base| base.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(".").join(APP_DIR_NAME))
}

/// Locations needed to launch the external separation worker.
#[derive(Debug, Clone)]
pub struct WorkerRuntime {
    /// Interpreter executable (bundled runtime or system Python).
    pub python: PathBuf,
    /// Worker entry-point script.
    pub script: PathBuf,
    /// Directory where the worker caches its models.
    pub cache_dir: PathBuf,
}

impl WorkerRuntime {
    /// Resolves the worker runtime, honoring env overrides.
    pub fn resolve(data_dir: &Path) -> Self {
        let python = std::env::var(PYTHON_ENV)
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("python3"));

        let script = std::env::var(SEPARATOR_ENV)
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::current_dir()
                    .unwrap_or_else(|_| PathBuf::from("."))
                    .join(DEFAULT_SEPARATOR_SCRIPT)
            });

        Self {
            python,
            script,
            cache_dir: data_dir.join("models"),
        }
    }
}

/// Process-wide preferences shared between the boundary layer and the
/// separation manager.
///
/// The separation quality is read once at enqueue time; changing it later
/// does not affect jobs that are already queued.
pub struct Settings {
    quality: RwLock<SeparationQuality>,
    job_timeout: RwLock<Option<Duration>>,
}

impl Settings {
    pub fn new() -> Self {
        Self {
            quality: RwLock::new(SeparationQuality::Normal),
            job_timeout: RwLock::new(None),
        }
    }

    pub fn separation_quality(&self) -> SeparationQuality {
        match self.quality.read() {
            Ok(guard) => *guard,
            Err(poisoned) => {
                log::warn!("Settings quality lock was poisoned, recovering");
                *poisoned.into_inner()
            }
        }
    }

    pub fn set_separation_quality(&self, quality: SeparationQuality) {
        match self.quality.write() {
            Ok(mut guard) => *guard = quality,
            Err(poisoned) => {
                log::warn!("Settings quality lock was poisoned, recovering");
                *poisoned.into_inner() = quality;
            }
        }
    }

    /// Optional per-job wall-clock limit. `None` disables the timeout.
    pub fn job_timeout(&self) -> Option<Duration> {
        match self.job_timeout.read() {
            Ok(guard) => *guard,
            Err(poisoned) => {
                log::warn!("Settings timeout lock was poisoned, recovering");
                *poisoned.into_inner()
            }
        }
    }

    pub fn set_job_timeout(&self, timeout: Option<Duration>) {
        match self.job_timeout.write() {
            Ok(mut guard) => *guard = timeout,
            Err(poisoned) => {
                log::warn!("Settings timeout lock was poisoned, recovering");
                *poisoned.into_inner() = timeout;
            }
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

//! Data file lookup.
//!
//! Search order, first existing match wins:
//! 1. `<cwd>/<name>`
//! 2. `<cwd>/data/<name>`
//! 3. `<install data dir>/<name>`
//!
//! The install data dir is `$REDFLASH_DATA_DIR` when set, otherwise
//! `<platform data dir>/redflash/data`.

use std::path::{Path, PathBuf};

use crate::util::{Error, Result};

/// Environment variable overriding the install data directory.
pub const DATA_DIR_ENV: &str = "REDFLASH_DATA_DIR";

/// Install data directory, if one can be determined.
pub fn install_data_dir() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
        return Some(PathBuf::from(dir));
    }
    dirs::data_dir().map(|d| d.join("redflash").join("data"))
}

/// Ordered list of directories searched for assets.
#[derive(Debug, Clone)]
pub struct AssetResolver {
    roots: Vec<PathBuf>,
}

impl AssetResolver {
    /// Resolver rooted at `cwd` with an optional install directory.
    pub fn new(cwd: impl Into<PathBuf>, install_dir: Option<PathBuf>) -> Self {
        let cwd = cwd.into();
        let mut roots = vec![cwd.clone(), cwd.join("data")];
        roots.extend(install_dir);
        Self { roots }
    }

    /// Resolver for the running process.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(std::env::current_dir()?, install_data_dir()))
    }

    /// Explicit search roots, in priority order.
    pub fn with_roots(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Every path `resolve` would try for `name`.
    pub fn candidates(&self, name: &str) -> Vec<PathBuf> {
        self.roots.iter().map(|root| root.join(name)).collect()
    }

    /// First existing candidate for `name`.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let candidates = self.candidates(name);
        for path in &candidates {
            log::debug!("resolve {name}: trying {}", path.display());
            if path.exists() {
                return Ok(path.clone());
            }
        }
        log::warn!("couldn't resolve {name} in {} location(s)", candidates.len());
        Err(Error::ResourceNotFound {
            name: name.to_string(),
            searched: candidates,
        })
    }
}

impl Default for AssetResolver {
    fn default() -> Self {
        Self::new(Path::new("."), install_data_dir())
    }
}

//! Dynamic operator loader
//!
//! Resolves a dotted module path against ordered search roots (built-in
//! operator trees plus externally mounted ones) to exactly one concrete
//! module: either a single-file module (`<root>/<path>.<ext>`) or a
//! directory holding an entry-point file (`<root>/<path>/<entry>.<ext>`).
//! The file form is the more specific and wins within a root; matches
//! under more than one root are an error, never a silent pick.
//!
//! Turning a resolved module file into a factory is the job of a
//! [`ModuleBackend`] — the language-level loading mechanism (dylib
//! loading, embedded interpreter, build-time registration table) plugs in
//! there and is not fixed by this crate.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::operator::OperatorFactory;

/// Deferred "where to find it" descriptor for an operator module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorLocation {
    /// Dotted module path relative to a search root, e.g. "text.clean_text"
    pub module: String,
}

impl OperatorLocation {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
        }
    }

    /// Final path segment, used as the default registry key
    pub fn leaf_name(&self) -> &str {
        self.module.rsplit('.').next().unwrap_or(&self.module)
    }

    fn relative_path(&self) -> PathBuf {
        self.module.split('.').collect()
    }
}

/// Errors from module resolution and loading
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("module '{module}' not found under any of {roots:?}")]
    NotFound { module: String, roots: Vec<PathBuf> },

    #[error("module '{module}' is ambiguous, candidates: {candidates:?}")]
    Ambiguous {
        module: String,
        candidates: Vec<PathBuf>,
    },

    #[error("loader has no module backend configured")]
    NoBackend,

    #[error("backend failed to load module: {0}")]
    Backend(String),
}

/// Pluggable resolution strategy for deferred registry entries
pub trait OperatorLoader: Send + Sync {
    /// Loads the factory for `name` from its module location
    fn load(
        &self,
        name: &str,
        location: &OperatorLocation,
    ) -> Result<Arc<dyn OperatorFactory>, LoaderError>;

    /// Walks `roots` and returns every module location found, for the
    /// registry's warm-up pass
    fn discover(&self, roots: &[PathBuf]) -> Vec<OperatorLocation>;
}

/// Turns one resolved module file into an operator factory
pub trait ModuleBackend: Send + Sync {
    /// File extension this backend understands (without the dot)
    fn extension(&self) -> &str;

    /// Entry-point file stem for directory modules
    fn entry_file(&self) -> &str {
        "main"
    }

    /// Loads the module at `path` and extracts the factory named `name`
    fn load_factory(
        &self,
        name: &str,
        path: &Path,
    ) -> Result<Arc<dyn OperatorFactory>, LoaderError>;
}

/// Filesystem loader over ordered search roots
pub struct SearchRootLoader {
    roots: Vec<PathBuf>,
    backend: Option<Arc<dyn ModuleBackend>>,
}

impl SearchRootLoader {
    pub fn new(roots: Vec<PathBuf>, backend: Arc<dyn ModuleBackend>) -> Self {
        Self {
            roots,
            backend: Some(backend),
        }
    }

    /// A loader with no backend, for registries that only ever hold
    /// direct factory handles
    pub fn unbacked() -> Self {
        Self {
            roots: Vec::new(),
            backend: None,
        }
    }

    /// Resolves a dotted module path to exactly one module file
    pub fn resolve_path(&self, location: &OperatorLocation) -> Result<PathBuf, LoaderError> {
        let backend = self.backend.as_ref().ok_or(LoaderError::NoBackend)?;
        let relative = location.relative_path();

        let mut matches = Vec::new();
        for root in &self.roots {
            let file = root
                .join(&relative)
                .with_extension(backend.extension());
            let entry = root
                .join(&relative)
                .join(format!("{}.{}", backend.entry_file(), backend.extension()));

            // Within one root the single-file form is the more specific.
            if file.is_file() {
                matches.push(file);
            } else if entry.is_file() {
                matches.push(entry);
            }
        }

        match matches.len() {
            0 => Err(LoaderError::NotFound {
                module: location.module.clone(),
                roots: self.roots.clone(),
            }),
            1 => Ok(matches.remove(0)),
            _ => Err(LoaderError::Ambiguous {
                module: location.module.clone(),
                candidates: matches,
            }),
        }
    }

    fn discover_in(&self, root: &Path, dir: &Path, out: &mut Vec<OperatorLocation>) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                let entry_file = path.join(format!(
                    "{}.{}",
                    backend.entry_file(),
                    backend.extension()
                ));
                if entry_file.is_file() {
                    if let Some(module) = module_name(root, &path) {
                        out.push(OperatorLocation::new(module));
                    }
                } else {
                    self.discover_in(root, &path, out);
                }
            } else if path.extension().and_then(|e| e.to_str()) == Some(backend.extension()) {
                if let Some(module) = module_name(root, &path.with_extension("")) {
                    out.push(OperatorLocation::new(module));
                }
            }
        }
    }
}

impl OperatorLoader for SearchRootLoader {
    fn load(
        &self,
        name: &str,
        location: &OperatorLocation,
    ) -> Result<Arc<dyn OperatorFactory>, LoaderError> {
        let backend = self.backend.as_ref().ok_or(LoaderError::NoBackend)?;
        let path = self.resolve_path(location)?;
        debug!("Loading operator '{}' from {}", name, path.display());
        backend.load_factory(name, &path)
    }

    fn discover(&self, roots: &[PathBuf]) -> Vec<OperatorLocation> {
        let mut out = Vec::new();
        for root in roots {
            self.discover_in(root, root, &mut out);
        }
        out
    }
}

/// Dotted module name for `path` relative to `root`
fn module_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let segments: Vec<&str> = relative
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect();
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("."))
    }
}

//! Host module loader for the registry artifact directory.
//!
//! Resolves CommonJS `require` specifiers to files inside one directory.
//! Blocks remote specifiers, filesystem escape and non-JavaScript files.

use anyhow::{anyhow, Error};
use serde::Serialize;
use std::path::{Component, Path, PathBuf};

/// Source text of a resolved host module, handed to the bootstrap's
/// CommonJS wrapper.
#[derive(Debug, Clone, Serialize)]
pub struct HostModule {
    /// Canonical path, used as cache key and as referrer for nested requires.
    pub id: String,
    pub source: String,
}

/// A loader that restricts all host modules to a single directory.
///
/// - No network access (URL specifiers rejected)
/// - No filesystem escape (canonicalized paths must stay under the root)
/// - Only .js and .cjs files
/// - Extensionless specifiers try `<name>.js`, then `<name>/index.js`
#[derive(Debug, Clone)]
pub struct HostModuleLoader {
    root: PathBuf,
}

impl HostModuleLoader {
    /// Create a loader rooted at `root`, which must be an existing directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, Error> {
        let canonical = root
            .as_ref()
            .canonicalize()
            .map_err(|e| anyhow!("Failed to canonicalize {}: {}", root.as_ref().display(), e))?;

        if !canonical.is_dir() {
            return Err(anyhow!("{} is not a directory", canonical.display()));
        }

        Ok(Self { root: canonical })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_path_allowed(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }

    fn is_extension_allowed(path: &Path) -> bool {
        matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("js") | Some("cjs")
        )
    }

    /// Resolve `specifier` as required from the module `referrer`
    /// (a canonical path, or empty for top-level requires).
    pub fn resolve(&self, specifier: &str, referrer: &str) -> Result<PathBuf, Error> {
        if specifier.contains("://")
            || specifier.starts_with("data:")
            || specifier.starts_with("blob:")
        {
            return Err(anyhow!("Remote modules are forbidden: {}", specifier));
        }

        let candidate = if specifier.starts_with("./") || specifier.starts_with("../") {
            let base = if referrer.is_empty() {
                self.root.clone()
            } else {
                Path::new(referrer)
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| self.root.clone())
            };
            base.join(specifier)
        } else if specifier.starts_with('/') {
            PathBuf::from(specifier)
        } else {
            // Bare names resolve from the artifact root, never from a package tree.
            if Path::new(specifier)
                .components()
                .any(|c| matches!(c, Component::ParentDir))
            {
                return Err(anyhow!("Cannot find module '{}'", specifier));
            }
            self.root.join(specifier)
        };

        let path = Self::find_file(&candidate)
            .ok_or_else(|| anyhow!("Cannot find module '{}'", specifier))?;

        if !self.is_path_allowed(&path) {
            return Err(anyhow!(
                "Access denied: '{}' is outside the component registry",
                specifier
            ));
        }

        if !Self::is_extension_allowed(&path) {
            return Err(anyhow!(
                "Only .js and .cjs modules can be required, got: {}",
                specifier
            ));
        }

        Ok(path)
    }

    /// Resolve and read a module.
    pub fn load(&self, specifier: &str, referrer: &str) -> Result<HostModule, Error> {
        let path = self.resolve(specifier, referrer)?;
        let source = std::fs::read_to_string(&path)
            .map_err(|e| anyhow!("Failed to read '{}': {}", path.display(), e))?;

        Ok(HostModule {
            id: path.to_string_lossy().into_owned(),
            source,
        })
    }

    fn find_file(candidate: &Path) -> Option<PathBuf> {
        if candidate.is_file() {
            return candidate.canonicalize().ok();
        }
        if candidate.extension().is_none() {
            let with_ext = candidate.with_extension("js");
            if with_ext.is_file() {
                return with_ext.canonicalize().ok();
            }
        }
        let index = candidate.join("index.js");
        if index.is_file() {
            return index.canonicalize().ok();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_blocks_remote_specifiers() {
        let dir = tempdir().unwrap();
        let loader = HostModuleLoader::new(dir.path()).unwrap();

        let result = loader.resolve("https://evil.com/payload.js", "");
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Remote modules are forbidden"));
    }

    #[test]
    fn test_blocks_path_traversal() {
        let outer = tempdir().unwrap();
        let root = outer.path().join("registry");
        fs::create_dir(&root).unwrap();
        fs::write(outer.path().join("secret.js"), "module.exports = 1;").unwrap();
        fs::write(root.join("index.js"), "module.exports = {};").unwrap();
        let loader = HostModuleLoader::new(&root).unwrap();

        let referrer = loader.root().join("index.js");
        let result = loader.resolve("../secret.js", &referrer.to_string_lossy());
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Access denied"));

        assert!(loader.resolve("../secret.js", "").is_err());
    }

    #[test]
    fn test_resolves_relative_to_referrer() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("ui")).unwrap();
        fs::write(dir.path().join("ui/button.js"), "exports.Button = 1;").unwrap();
        fs::write(dir.path().join("ui/icon.js"), "exports.Icon = 1;").unwrap();
        let loader = HostModuleLoader::new(dir.path()).unwrap();

        let referrer = loader.root().join("ui/button.js");
        let resolved = loader
            .resolve("./icon.js", &referrer.to_string_lossy())
            .unwrap();
        assert_eq!(resolved, loader.root().join("ui/icon.js"));
    }

    #[test]
    fn test_resolves_extensionless_and_directory_index() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("badge.js"), "exports.Badge = 1;").unwrap();
        fs::create_dir(dir.path().join("forms")).unwrap();
        fs::write(dir.path().join("forms/index.js"), "exports.Input = 1;").unwrap();
        let loader = HostModuleLoader::new(dir.path()).unwrap();

        assert_eq!(
            loader.resolve("badge", "").unwrap(),
            loader.root().join("badge.js")
        );
        assert_eq!(
            loader.resolve("./forms", "").unwrap(),
            loader.root().join("forms/index.js")
        );
    }

    #[test]
    fn test_blocks_non_js_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("data.json"), "{}").unwrap();
        let loader = HostModuleLoader::new(dir.path()).unwrap();

        let result = loader.resolve("./data.json", "");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Only .js and .cjs"));
    }

    #[test]
    fn test_unknown_module_names_the_specifier() {
        let dir = tempdir().unwrap();
        let loader = HostModuleLoader::new(dir.path()).unwrap();

        let error = loader.load("left-pad", "").unwrap_err();
        assert_eq!(error.to_string(), "Cannot find module 'left-pad'");
    }

    #[test]
    fn test_load_returns_canonical_id() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("index.js"), "module.exports = {};").unwrap();
        let loader = HostModuleLoader::new(dir.path()).unwrap();

        let module = loader.load("index.js", "").unwrap();
        assert_eq!(module.source, "module.exports = {};");
        assert_eq!(
            PathBuf::from(&module.id),
            loader.root().join("index.js")
        );
    }
}

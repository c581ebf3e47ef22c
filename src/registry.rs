//! Component registry loaded from the pre-built artifact directory.

use crate::error::StartupError;
use crate::runtime::{bootstrap_fn, caught_failure};
use deno_core::{serde_v8, v8, JsRuntime};
use std::path::Path;

/// Immutable `name -> component` mapping shared by every render.
///
/// The components live inside the runtime as a frozen, null-prototype
/// object; the names are mirrored on the Rust side in registry order.
pub struct ComponentRegistry {
    names: Vec<String>,
    exports: v8::Global<v8::Object>,
}

impl ComponentRegistry {
    /// Evaluate the registry entry module and normalize its exports.
    ///
    /// `default`-export objects and named exports are merged into one flat
    /// mapping and module bookkeeping keys are dropped.
    pub fn load(runtime: &mut JsRuntime, registry_dir: &Path, entry: &str) -> Result<Self, StartupError> {
        let entry_path = registry_dir.join(entry);
        if !entry_path.is_file() {
            return Err(StartupError::RegistryMissing { path: entry_path });
        }
        let malformed = |reason: String| StartupError::RegistryMalformed {
            path: entry_path.clone(),
            reason,
        };

        let scope = &mut runtime.handle_scope();
        let tc = &mut v8::TryCatch::new(scope);

        let load = bootstrap_fn(tc, "loadRegistry").map_err(|e| malformed(e.to_string()))?;
        let component_names =
            bootstrap_fn(tc, "componentNames").map_err(|e| malformed(e.to_string()))?;
        let entry_specifier = v8::String::new(tc, &format!("./{}", entry))
            .ok_or_else(|| malformed(String::from("entry name is not a valid string")))?;
        let recv: v8::Local<v8::Value> = v8::undefined(tc).into();

        let Some(exports) = load.call(tc, recv, &[entry_specifier.into()]) else {
            return Err(malformed(caught_failure(tc).message));
        };
        let exports = v8::Local::<v8::Object>::try_from(exports)
            .map_err(|_| malformed(String::from("normalized registry is not an object")))?;

        let Some(names) = component_names.call(tc, recv, &[exports.into()]) else {
            return Err(malformed(caught_failure(tc).message));
        };
        let names: Vec<String> =
            serde_v8::from_v8(tc, names).map_err(|e| malformed(e.to_string()))?;

        Ok(Self {
            names,
            exports: v8::Global::new(tc, exports),
        })
    }

    /// Component names in registry order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|known| known == name)
    }

    /// The registry object handed to sandboxed `require`.
    pub fn exports(&self) -> &v8::Global<v8::Object> {
        &self.exports
    }

    /// Fetch one component constructor.
    pub fn lookup(&self, runtime: &mut JsRuntime, name: &str) -> Option<v8::Global<v8::Value>> {
        if !self.contains(name) {
            return None;
        }
        let scope = &mut runtime.handle_scope();
        let exports = v8::Local::new(scope, &self.exports);
        let key = v8::String::new(scope, name)?;
        let value = exports.get(scope, key.into())?;
        Some(v8::Global::new(scope, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::HostModuleLoader;
    use crate::runtime::{create_runtime, SandboxConfig};
    use std::fs;
    use tempfile::tempdir;

    fn runtime_for(dir: &Path) -> JsRuntime {
        let config = SandboxConfig {
            registry_dir: dir.to_path_buf(),
            ..Default::default()
        };
        create_runtime(&config, HostModuleLoader::new(dir).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn merges_default_and_named_exports() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("index.js"),
            r#"
            const React = require("react");
            function Card() { return React.createElement("div", null, "card"); }
            function Badge() { return React.createElement("span", null, "badge"); }
            exports.__esModule = true;
            exports.Badge = Badge;
            exports.version = "1.0.0";
            exports.default = { Card, Badge };
            "#,
        )
        .unwrap();
        let mut runtime = runtime_for(dir.path());

        let registry = ComponentRegistry::load(&mut runtime, dir.path(), "index.js").unwrap();

        assert_eq!(registry.names(), ["Card", "Badge"]);
        assert_eq!(registry.len(), 2);
        assert!(registry.lookup(&mut runtime, "Card").is_some());
        assert!(registry.lookup(&mut runtime, "version").is_none());
        assert!(registry.lookup(&mut runtime, "__esModule").is_none());
    }

    #[tokio::test]
    async fn follows_requires_inside_the_artifact() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("index.js"),
            r#"module.exports = { ...require("./alert.js") };"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("alert.js"),
            r#"
            const { jsx } = require("react/jsx-runtime");
            exports.Alert = (props) => jsx("div", { role: "alert", children: props.text });
            "#,
        )
        .unwrap();
        let mut runtime = runtime_for(dir.path());

        let registry = ComponentRegistry::load(&mut runtime, dir.path(), "index.js").unwrap();
        assert_eq!(registry.names(), ["Alert"]);
    }

    #[tokio::test]
    async fn missing_entry_is_reported() {
        let dir = tempdir().unwrap();
        let mut runtime = runtime_for(dir.path());

        let error = ComponentRegistry::load(&mut runtime, dir.path(), "index.js")
            .err()
            .unwrap();
        assert!(matches!(error, StartupError::RegistryMissing { .. }));
    }

    #[tokio::test]
    async fn throwing_entry_is_malformed() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("index.js"), r#"throw new Error("bundle broken");"#).unwrap();
        let mut runtime = runtime_for(dir.path());

        let error = ComponentRegistry::load(&mut runtime, dir.path(), "index.js")
            .err()
            .unwrap();
        match error {
            StartupError::RegistryMalformed { reason, .. } => {
                assert!(reason.contains("bundle broken"), "{reason}")
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

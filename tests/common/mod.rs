#![allow(dead_code)]

use std::fs;

use component_playground::SandboxConfig;
use tempfile::TempDir;

pub const STYLES: &str = ".card { padding: 1rem; }";

/// A small CommonJS registry: `Card` from the entry and `Badge` from a sibling file.
pub fn registry() -> TempDir {
    let dir = tempfile::tempdir().expect("create registry dir");
    fs::write(
        dir.path().join("index.js"),
        r#"
        "use strict";
        const React = require("react");
        const { Badge } = require("./badge.js");

        function Card(props) {
            return React.createElement(
                "section",
                { className: "card" },
                React.createElement("h2", null, props.title),
                props.children
            );
        }

        exports.__esModule = true;
        exports.Badge = Badge;
        exports.default = { Card, Badge };
        "#,
    )
    .expect("write registry entry");
    fs::write(
        dir.path().join("badge.js"),
        r#"
        const { jsx } = require("react/jsx-runtime");
        exports.Badge = (props) => jsx("span", { className: "badge", children: props.label });
        "#,
    )
    .expect("write badge module");
    fs::write(dir.path().join("styles.css"), STYLES).expect("write stylesheet");
    dir
}

pub fn config(dir: &TempDir) -> SandboxConfig {
    SandboxConfig {
        registry_dir: dir.path().to_path_buf(),
        ..Default::default()
    }
}

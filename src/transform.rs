//! JSX source transformation.
//!
//! Compiles submitted source with swc (via `deno_ast`) using the automatic
//! JSX runtime and turns it into a function body whose return value is the
//! submitted component.

use crate::error::PipelineError;
use deno_ast::{
    EmitOptions, MediaType, ModuleSpecifier, ParseParams, SourceMapOption, TranspileOptions,
};

/// Module the automatic JSX runtime imports its factories from.
pub const JSX_IMPORT_SOURCE: &str = "react";

const SOURCE_SPECIFIER: &str = "file:///playground/component.jsx";

/// Executable function body produced from one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    body: String,
}

impl Program {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.body
    }
}

/// Turns submitted source text into a [`Program`].
pub trait Transform {
    fn transform(&self, source: &str) -> Result<Program, PipelineError>;
}

/// Compiler-backed transformer.
#[derive(Debug, Clone)]
pub struct SourceTransformer {
    component_identifier: String,
}

impl SourceTransformer {
    pub fn new(component_identifier: impl Into<String>) -> Self {
        Self {
            component_identifier: component_identifier.into(),
        }
    }

    pub fn component_identifier(&self) -> &str {
        &self.component_identifier
    }

    /// Returns the component when the identifier is bound and `undefined`
    /// otherwise, so an unmatched name surfaces as "no component".
    fn trailer(&self) -> String {
        let name = &self.component_identifier;
        format!("\nreturn typeof {name} === \"undefined\" ? undefined : {name};\n")
    }

    fn compile(&self, source: &str) -> Result<String, PipelineError> {
        let specifier = ModuleSpecifier::parse(SOURCE_SPECIFIER)
            .map_err(|e| PipelineError::transform(e.to_string()))?;

        // Parsed as a script: the automatic runtime then injects
        // `require("react/jsx-runtime")` instead of an import declaration.
        let parsed = deno_ast::parse_script(ParseParams {
            specifier,
            text: source.into(),
            media_type: MediaType::Jsx,
            capture_tokens: false,
            scope_analysis: false,
            maybe_syntax: None,
        })
        .map_err(|diagnostic| PipelineError::transform(diagnostic.to_string()))?;

        // Recovered syntax errors still reject the submission.
        if !parsed.diagnostics().is_empty() {
            let message = parsed
                .diagnostics()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n");
            return Err(PipelineError::transform(message));
        }

        let transpiled = parsed
            .transpile(
                &TranspileOptions {
                    jsx_automatic: true,
                    jsx_import_source: Some(JSX_IMPORT_SOURCE.to_string()),
                    ..Default::default()
                },
                &EmitOptions {
                    source_map: SourceMapOption::None,
                    ..Default::default()
                },
            )
            .map_err(|e| PipelineError::transform(e.to_string()))?
            .into_source()
            .into_string()
            .map_err(|e| PipelineError::transform(e.to_string()))?;

        Ok(transpiled.text)
    }
}

impl Transform for SourceTransformer {
    fn transform(&self, source: &str) -> Result<Program, PipelineError> {
        let compiled = self.compile(source)?;
        if compiled.trim().is_empty() {
            return Err(PipelineError::transform("compiler produced no output"));
        }

        let mut body = compiled;
        body.push_str(&self.trailer());
        Ok(Program::new(body))
    }
}

/// Whether `name` can be used as the component identifier.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADING: &str = r#"
        function App(props) {
            return <h1 className="title">{props.title}</h1>;
        }
    "#;

    #[test]
    fn compiles_markup_to_factory_calls() {
        let program = SourceTransformer::new("App").transform(HEADING).unwrap();
        let body = program.as_str();

        assert!(!body.contains("<h1"), "markup left in output: {body}");
        assert!(body.contains("jsx-runtime"), "factory not injected: {body}");
        assert!(!body.contains("import "), "module syntax in output: {body}");
        assert!(body
            .trim_end()
            .ends_with("return typeof App === \"undefined\" ? undefined : App;"));
    }

    #[test]
    fn is_deterministic() {
        let transformer = SourceTransformer::new("App");
        assert_eq!(
            transformer.transform(HEADING).unwrap(),
            transformer.transform(HEADING).unwrap()
        );
    }

    #[test]
    fn unclosed_tag_is_a_transform_error() {
        let source = "function App() { return <div><span>open</div>; }";
        let error = SourceTransformer::new("App").transform(source).unwrap_err();

        assert!(matches!(error, PipelineError::Transform { .. }), "{error:?}");
    }

    #[test]
    fn trailer_uses_configured_identifier() {
        let program = SourceTransformer::new("Preview")
            .transform("const Preview = () => <p>hi</p>;")
            .unwrap();
        assert!(program.as_str().contains("typeof Preview"));
    }

    #[test]
    fn identifier_validation() {
        assert!(is_valid_identifier("App"));
        assert!(is_valid_identifier("_Preview$1"));
        assert!(!is_valid_identifier("1App"));
        assert!(!is_valid_identifier("my-app"));
        assert!(!is_valid_identifier(""));
    }
}

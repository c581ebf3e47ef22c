//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::{builder::BoolishValueParser, Args, Parser, Subcommand, ValueHint};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::runtime::SandboxConfig;
use crate::transform::is_valid_identifier;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "playground";
const ENV_PREFIX: &str = "PLAYGROUND";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3001;
const DEFAULT_MAX_BODY_BYTES: u64 = 1024 * 1024;
const DEFAULT_REGISTRY_DIR: &str = "registry";
const DEFAULT_REGISTRY_ENTRY: &str = "index.js";
const DEFAULT_STYLESHEET: &str = "styles.css";
const DEFAULT_MODULE_NAME: &str = "components";
const DEFAULT_COMPONENT_IDENTIFIER: &str = "App";
const DEFAULT_MAX_HEAP_MB: u64 = 64;
const DEFAULT_QUEUE_DEPTH: usize = 64;

/// Command-line arguments for the playground binary.
#[derive(Debug, Parser)]
#[command(
    name = "component-playground",
    version,
    about = "Render JSX components to HTML inside a V8 sandbox"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "PLAYGROUND_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP server.
    Serve(Box<ServeArgs>),
    /// Render one component file and print the document.
    Render(RenderArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub sandbox: SandboxOverrides,

    /// JSX source file to render.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,

    /// Props passed to the component, as a JSON object.
    #[arg(long, value_name = "JSON")]
    pub props: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct SandboxOverrides {
    /// Override the registry artifact directory.
    #[arg(long = "registry-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub registry_dir: Option<PathBuf>,

    /// Override the identifier submitted code must define.
    #[arg(long = "component-identifier", value_name = "NAME")]
    pub component_identifier: Option<String>,

    /// Override the render timeout (0 disables it).
    #[arg(long = "render-timeout-ms", value_name = "MILLIS")]
    pub render_timeout_ms: Option<u64>,

    /// Override the V8 heap ceiling (0 means unlimited).
    #[arg(long = "max-heap-mb", value_name = "MB")]
    pub max_heap_mb: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub sandbox: SandboxOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Hide JavaScript stack traces from responses.
    #[arg(
        long = "production",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub production: Option<bool>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub registry: RegistrySettings,
    pub sandbox: SandboxSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub production: bool,
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub dir: PathBuf,
    pub entry: String,
    pub stylesheet: String,
    pub module_name: String,
}

#[derive(Debug, Clone)]
pub struct SandboxSettings {
    pub component_identifier: String,
    pub max_heap_bytes: Option<usize>,
    pub render_timeout: Option<Duration>,
    pub queue_depth: usize,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Compact,
}

impl Settings {
    /// Sandbox configuration for the render worker.
    pub fn sandbox_config(&self) -> SandboxConfig {
        SandboxConfig {
            registry_dir: self.registry.dir.clone(),
            registry_entry: self.registry.entry.clone(),
            stylesheet: self.registry.stylesheet.clone(),
            registry_module: self.registry.module_name.clone(),
            component_identifier: self.sandbox.component_identifier.clone(),
            max_heap_size: self.sandbox.max_heap_bytes,
            render_timeout: self.sandbox.render_timeout,
            include_stack: !self.server.production,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Render(args)) => raw.apply_sandbox_overrides(&args.sandbox),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    registry: RawRegistrySettings,
    sandbox: RawSandboxSettings,
    logging: RawLoggingSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    production: Option<bool>,
    max_body_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRegistrySettings {
    dir: Option<PathBuf>,
    entry: Option<String>,
    stylesheet: Option<String>,
    module_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSandboxSettings {
    component_identifier: Option<String>,
    max_heap_mb: Option<u64>,
    render_timeout_ms: Option<u64>,
    queue_depth: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        self.apply_sandbox_overrides(&overrides.sandbox);
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(production) = overrides.production {
            self.server.production = Some(production);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }

    fn apply_sandbox_overrides(&mut self, overrides: &SandboxOverrides) {
        if let Some(dir) = overrides.registry_dir.as_ref() {
            self.registry.dir = Some(dir.clone());
        }
        if let Some(identifier) = overrides.component_identifier.as_ref() {
            self.sandbox.component_identifier = Some(identifier.clone());
        }
        if let Some(timeout) = overrides.render_timeout_ms {
            self.sandbox.render_timeout_ms = Some(timeout);
        }
        if let Some(heap) = overrides.max_heap_mb {
            self.sandbox.max_heap_mb = Some(heap);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            registry,
            sandbox,
            logging,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            registry: build_registry_settings(registry)?,
            sandbox: build_sandbox_settings(sandbox)?,
            logging: build_logging_settings(logging)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.host", reason))?;

    let max_body_bytes = server.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES);
    if max_body_bytes == 0 {
        return Err(LoadError::invalid(
            "server.max_body_bytes",
            "must be greater than zero",
        ));
    }
    let max_body_bytes = usize::try_from(max_body_bytes).map_err(|_| {
        LoadError::invalid(
            "server.max_body_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    Ok(ServerSettings {
        addr,
        production: server.production.unwrap_or(false),
        max_body_bytes,
    })
}

fn build_registry_settings(registry: RawRegistrySettings) -> Result<RegistrySettings, LoadError> {
    let dir = registry
        .dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_REGISTRY_DIR));
    if dir.as_os_str().is_empty() {
        return Err(LoadError::invalid("registry.dir", "path must not be empty"));
    }

    let entry = non_empty(registry.entry, DEFAULT_REGISTRY_ENTRY, "registry.entry")?;
    let stylesheet = non_empty(registry.stylesheet, DEFAULT_STYLESHEET, "registry.stylesheet")?;
    let module_name = non_empty(registry.module_name, DEFAULT_MODULE_NAME, "registry.module_name")?;
    if matches!(
        module_name.as_str(),
        "react" | "react/jsx-runtime" | "react/jsx-dev-runtime"
    ) || module_name.starts_with('.')
        || module_name.starts_with('/')
    {
        return Err(LoadError::invalid(
            "registry.module_name",
            format!("`{module_name}` collides with a library or file specifier"),
        ));
    }

    Ok(RegistrySettings {
        dir,
        entry,
        stylesheet,
        module_name,
    })
}

fn build_sandbox_settings(sandbox: RawSandboxSettings) -> Result<SandboxSettings, LoadError> {
    let component_identifier = sandbox
        .component_identifier
        .unwrap_or_else(|| DEFAULT_COMPONENT_IDENTIFIER.to_string());
    if !is_valid_identifier(&component_identifier) {
        return Err(LoadError::invalid(
            "sandbox.component_identifier",
            format!("`{component_identifier}` is not a valid JavaScript identifier"),
        ));
    }

    let max_heap_bytes = match sandbox.max_heap_mb.unwrap_or(DEFAULT_MAX_HEAP_MB) {
        0 => None,
        mb => {
            let bytes = mb
                .checked_mul(1024 * 1024)
                .and_then(|bytes| usize::try_from(bytes).ok())
                .ok_or_else(|| {
                    LoadError::invalid("sandbox.max_heap_mb", "value exceeds supported range")
                })?;
            Some(bytes)
        }
    };

    let render_timeout = match sandbox.render_timeout_ms.unwrap_or(0) {
        0 => None,
        ms => Some(Duration::from_millis(ms)),
    };

    let queue_depth = sandbox.queue_depth.unwrap_or(DEFAULT_QUEUE_DEPTH);
    if queue_depth == 0 {
        return Err(LoadError::invalid(
            "sandbox.queue_depth",
            "must be greater than zero",
        ));
    }

    Ok(SandboxSettings {
        component_identifier,
        max_heap_bytes,
        render_timeout,
        queue_depth,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn non_empty(value: Option<String>, default: &str, key: &'static str) -> Result<String, LoadError> {
    let value = value.unwrap_or_else(|| default.to_string());
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LoadError::invalid(key, "must not be empty"));
    }
    Ok(trimmed.to_string())
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    };
    candidate
        .parse()
        .map_err(|err| format!("`{candidate}` is not a valid socket address: {err}"))
}

//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::{IpAddr, SocketAddr},
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::domain::types::{ImageFormat, RenderOptions, Viewport};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "cartolina";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_RESULT_CAPACITY: usize = 1024;
const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_OUTPUT_FORMAT: &str = "jpeg";
const DEFAULT_JPEG_QUALITY: u8 = 90;
const DEFAULT_VIEWPORT_WIDTH: u32 = 1200;
const DEFAULT_VIEWPORT_HEIGHT: u32 = 630;
const DEFAULT_DEVICE_SCALE_FACTOR: f64 = 2.0;

/// Command-line arguments for the Cartolina binary.
#[derive(Debug, Parser)]
#[command(name = "cartolina", version, about = "Cartolina social-preview image service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "CARTOLINA_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the Cartolina HTTP service.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

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

    /// Override the API key protecting generation endpoints.
    #[arg(long = "api-key", env = "CARTOLINA_API_KEY", value_name = "KEY")]
    pub api_key: Option<String>,

    /// Override how many settled task results each ledger retains.
    #[arg(long = "queue-result-capacity", value_name = "COUNT")]
    pub queue_result_capacity: Option<usize>,

    /// Override the end-to-end task timeout; 0 disables it.
    #[arg(long = "queue-task-timeout-seconds", value_name = "SECONDS")]
    pub queue_task_timeout_seconds: Option<u64>,

    /// Override the browser executable used for rendering.
    #[arg(long = "render-chrome-executable", value_name = "PATH")]
    pub render_chrome_executable: Option<PathBuf>,

    /// Override the font/image readiness budget.
    #[arg(long = "render-wait-timeout-seconds", value_name = "SECONDS")]
    pub render_wait_timeout_seconds: Option<u64>,

    /// Override the output encoding (png|jpeg).
    #[arg(long = "render-output", value_name = "FORMAT")]
    pub render_output: Option<String>,

    /// Override the JPEG quality (1-100).
    #[arg(long = "render-quality", value_name = "QUALITY")]
    pub render_quality: Option<u8>,

    /// Override the capture viewport width.
    #[arg(long = "render-viewport-width", value_name = "PIXELS")]
    pub render_viewport_width: Option<u32>,

    /// Override the capture viewport height.
    #[arg(long = "render-viewport-height", value_name = "PIXELS")]
    pub render_viewport_height: Option<u32>,

    /// Override the capture device scale factor.
    #[arg(long = "render-device-scale-factor", value_name = "FACTOR")]
    pub render_device_scale_factor: Option<f64>,

    /// Override the project base URL for storage and records.
    #[arg(long = "supabase-url", env = "CARTOLINA_SUPABASE_URL", value_name = "URL")]
    pub supabase_url: Option<String>,

    /// Override the service-role key for storage and records.
    #[arg(
        long = "supabase-service-role-key",
        env = "CARTOLINA_SUPABASE_SERVICE_ROLE_KEY",
        value_name = "KEY"
    )]
    pub supabase_service_role_key: Option<String>,

    /// Load card templates from a directory instead of the embedded set.
    #[arg(long = "templates-directory", value_name = "PATH")]
    pub templates_directory: Option<PathBuf>,
}

/// Fully-resolved deployment settings after precedence resolution and
/// validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub auth: AuthSettings,
    pub queue: QueueSettings,
    pub render: RenderSettings,
    pub supabase: SupabaseSettings,
    pub templates: TemplateSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// Required to serve; validated at startup rather than load time so
    /// offline tooling can run without credentials.
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub result_capacity: NonZeroUsize,
    pub task_timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub chrome_executable: Option<PathBuf>,
    pub wait_timeout: Duration,
    pub format: ImageFormat,
    pub quality: u8,
    pub viewport_width: NonZeroU32,
    pub viewport_height: NonZeroU32,
    pub device_scale_factor: f64,
}

impl RenderSettings {
    pub fn options(&self) -> RenderOptions {
        RenderOptions {
            format: self.format,
            quality: (self.format == ImageFormat::Jpeg).then_some(self.quality),
            viewport: Some(Viewport {
                width: self.viewport_width.get(),
                height: self.viewport_height.get(),
                device_scale_factor: self.device_scale_factor,
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SupabaseSettings {
    pub url: Option<String>,
    pub service_role_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TemplateSettings {
    pub directory: Option<PathBuf>,
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

/// Parse the CLI and load settings using the configured precedence.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let cli = CliArgs::parse();
    let settings = load(&cli)?;
    Ok((cli, settings))
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("CARTOLINA").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    auth: RawAuthSettings,
    queue: RawQueueSettings,
    render: RawRenderSettings,
    supabase: RawSupabaseSettings,
    templates: RawTemplateSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAuthSettings {
    api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawQueueSettings {
    result_capacity: Option<usize>,
    task_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    chrome_executable: Option<PathBuf>,
    wait_timeout_seconds: Option<u64>,
    output: Option<String>,
    quality: Option<u8>,
    viewport_width: Option<u32>,
    viewport_height: Option<u32>,
    device_scale_factor: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSupabaseSettings {
    url: Option<String>,
    service_role_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawTemplateSettings {
    directory: Option<PathBuf>,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(key) = overrides.api_key.as_ref() {
            self.auth.api_key = Some(key.clone());
        }
        if let Some(capacity) = overrides.queue_result_capacity {
            self.queue.result_capacity = Some(capacity);
        }
        if let Some(seconds) = overrides.queue_task_timeout_seconds {
            self.queue.task_timeout_seconds = Some(seconds);
        }
        if let Some(path) = overrides.render_chrome_executable.as_ref() {
            self.render.chrome_executable = Some(path.clone());
        }
        if let Some(seconds) = overrides.render_wait_timeout_seconds {
            self.render.wait_timeout_seconds = Some(seconds);
        }
        if let Some(output) = overrides.render_output.as_ref() {
            self.render.output = Some(output.clone());
        }
        if let Some(quality) = overrides.render_quality {
            self.render.quality = Some(quality);
        }
        if let Some(width) = overrides.render_viewport_width {
            self.render.viewport_width = Some(width);
        }
        if let Some(height) = overrides.render_viewport_height {
            self.render.viewport_height = Some(height);
        }
        if let Some(factor) = overrides.render_device_scale_factor {
            self.render.device_scale_factor = Some(factor);
        }
        if let Some(url) = overrides.supabase_url.as_ref() {
            self.supabase.url = Some(url.clone());
        }
        if let Some(key) = overrides.supabase_service_role_key.as_ref() {
            self.supabase.service_role_key = Some(key.clone());
        }
        if let Some(directory) = overrides.templates_directory.as_ref() {
            self.templates.directory = Some(directory.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            auth,
            queue,
            render,
            supabase,
            templates,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let auth = AuthSettings {
            api_key: auth.api_key.filter(|key| !key.trim().is_empty()),
        };
        let queue = build_queue_settings(queue)?;
        let render = build_render_settings(render)?;
        let supabase = SupabaseSettings {
            url: supabase.url,
            service_role_key: supabase.service_role_key,
        };
        let templates = TemplateSettings {
            directory: templates.directory,
        };

        Ok(Self {
            server,
            logging,
            auth,
            queue,
            render,
            supabase,
            templates,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(&level)
            .map_err(|err| LoadError::invalid("logging.level", err.to_string()))?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_queue_settings(queue: RawQueueSettings) -> Result<QueueSettings, LoadError> {
    let result_capacity = NonZeroUsize::new(
        queue.result_capacity.unwrap_or(DEFAULT_RESULT_CAPACITY),
    )
    .ok_or_else(|| {
        LoadError::invalid("queue.result_capacity", "capacity must be greater than zero")
    })?;

    let task_timeout = match queue.task_timeout_seconds {
        None | Some(0) => None,
        Some(seconds) => Some(Duration::from_secs(seconds)),
    };

    Ok(QueueSettings {
        result_capacity,
        task_timeout,
    })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let wait_secs = render
        .wait_timeout_seconds
        .unwrap_or(DEFAULT_WAIT_TIMEOUT_SECS);

    let output = render
        .output
        .unwrap_or_else(|| DEFAULT_OUTPUT_FORMAT.to_string());
    let format = ImageFormat::parse(&output).ok_or_else(|| {
        LoadError::invalid("render.output", format!("unknown output format `{output}`"))
    })?;

    let quality = render.quality.unwrap_or(DEFAULT_JPEG_QUALITY);
    if !(1..=100).contains(&quality) {
        return Err(LoadError::invalid(
            "render.quality",
            "quality must be between 1 and 100",
        ));
    }

    let viewport_width = NonZeroU32::new(
        render.viewport_width.unwrap_or(DEFAULT_VIEWPORT_WIDTH),
    )
    .ok_or_else(|| LoadError::invalid("render.viewport_width", "width must be greater than zero"))?;
    let viewport_height = NonZeroU32::new(
        render.viewport_height.unwrap_or(DEFAULT_VIEWPORT_HEIGHT),
    )
    .ok_or_else(|| {
        LoadError::invalid("render.viewport_height", "height must be greater than zero")
    })?;

    let device_scale_factor = render
        .device_scale_factor
        .unwrap_or(DEFAULT_DEVICE_SCALE_FACTOR);
    if !device_scale_factor.is_finite() || device_scale_factor <= 0.0 {
        return Err(LoadError::invalid(
            "render.device_scale_factor",
            "scale factor must be a positive number",
        ));
    }

    Ok(RenderSettings {
        chrome_executable: render.chrome_executable,
        wait_timeout: Duration::from_secs(wait_secs),
        format,
        quality,
        viewport_width,
        viewport_height,
        device_scale_factor,
    })
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let ip = host
        .parse::<IpAddr>()
        .map_err(|_| format!("`{host}` is not a valid IP address"))?;
    Ok(SocketAddr::new(ip, port))
}

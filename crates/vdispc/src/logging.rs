//! Log configuration and subscriber setup.

use std::env;
use std::fmt;

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn parse(spec: &str) -> Option<Self> {
        match spec.to_ascii_lowercase().as_str() {
            "text" | "plain" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
        })
    }
}

/// Logging verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn parse(spec: &str) -> Option<Self> {
        match spec.to_ascii_lowercase().as_str() {
            "error" | "err" => Some(Self::Error),
            "warn" | "warning" => Some(Self::Warn),
            "info" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            "trace" | "verbose" => Some(Self::Trace),
            _ => None,
        }
    }

    pub fn as_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogOptions {
    pub format: LogFormat,
    pub level: LogLevel,
}

impl LogOptions {
    pub const DEFAULT: Self = Self {
        format: LogFormat::Text,
        level: LogLevel::Warn,
    };

    /// Command-line values win over `VDISP_LOG_FORMAT` / `VDISP_LOG_LEVEL`.
    pub fn resolve(format: Option<&str>, level: Option<&str>) -> Result<Self, String> {
        let env_format = env::var("VDISP_LOG_FORMAT").ok();
        let env_level = env::var("VDISP_LOG_LEVEL").ok();
        Self::from_sources(
            format.or(env_format.as_deref()),
            level.or(env_level.as_deref()),
        )
    }

    fn from_sources(format: Option<&str>, level: Option<&str>) -> Result<Self, String> {
        let mut options = Self::DEFAULT;
        if let Some(spec) = format {
            options.format =
                LogFormat::parse(spec).ok_or_else(|| format!("unknown log format `{spec}`"))?;
        }
        if let Some(spec) = level {
            options.level =
                LogLevel::parse(spec).ok_or_else(|| format!("unknown log level `{spec}`"))?;
        }
        Ok(options)
    }
}

impl Default for LogOptions {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Install the global subscriber. Later calls do nothing. `RUST_LOG`, when
/// set, replaces the level filter.
pub fn init_logging(options: &LogOptions, color: bool) {
    use std::io::IsTerminal;
    use std::sync::OnceLock;
    use tracing_subscriber::fmt;

    static INITIALISED: OnceLock<()> = OnceLock::new();

    INITIALISED.get_or_init(|| {
        let use_ansi = color && std::io::stderr().is_terminal();
        let builder = fmt::fmt()
            .with_env_filter(env_filter(options.level))
            .with_ansi(use_ansi)
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true);

        let _ = match options.format {
            LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
            LogFormat::Text => tracing::subscriber::set_global_default(builder.compact().finish()),
        };
    });
}

/// `RUST_LOG` when it is set and valid, otherwise everything at `level`
/// and above.
fn env_filter(level: LogLevel) -> tracing_subscriber::EnvFilter {
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::EnvFilter;

    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::default().add_directive(LevelFilter::from_level(level.as_tracing_level()).into())
    })
}

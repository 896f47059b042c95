use std::sync::OnceLock;

use crate::error::ConfigError;

pub const ENV_UNWIND: &str = "JRT_UNWIND";
pub const ENV_STRICT_MONITORS: &str = "JRT_STRICT_MONITORS";
pub const ENV_BACKTRACE_DEPTH: &str = "JRT_BACKTRACE_DEPTH";
pub const ENV_LOG: &str = "JRT_LOG";

pub const DEFAULT_BACKTRACE_DEPTH: usize = 64;

static CONFIG: OnceLock<RuntimeConfig> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnwindMode {
    /// Walk the stack looking for a catch region.
    #[default]
    Propagate,
    /// Report and exit at the throw site. Catch regions are never entered.
    Terminate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub unwind: UnwindMode,
    /// Trap when `exit`, `wait` or `notify` is called by a thread that does
    /// not own the monitor. Off by default.
    pub strict_monitors: bool,
    pub backtrace_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            unwind: UnwindMode::Propagate,
            strict_monitors: false,
            backtrace_depth: DEFAULT_BACKTRACE_DEPTH,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup. Missing keys keep
    /// their defaults.
    pub fn from_lookup(
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_UNWIND) {
            config.unwind = match value.trim().to_ascii_lowercase().as_str() {
                "propagate" => UnwindMode::Propagate,
                "terminate" | "abort" => UnwindMode::Terminate,
                _ => {
                    return Err(ConfigError::UnknownUnwindMode {
                        key: ENV_UNWIND,
                        value,
                    });
                }
            };
        }

        if let Some(value) = lookup(ENV_STRICT_MONITORS) {
            config.strict_monitors =
                match value.trim().to_ascii_lowercase().as_str() {
                    "1" | "true" | "yes" | "on" => true,
                    "0" | "false" | "no" | "off" | "" => false,
                    _ => {
                        return Err(ConfigError::InvalidBool {
                            key: ENV_STRICT_MONITORS,
                            value,
                        });
                    }
                };
        }

        if let Some(value) = lookup(ENV_BACKTRACE_DEPTH) {
            config.backtrace_depth = match value.trim().parse::<usize>() {
                Ok(depth) if depth > 0 => depth,
                _ => {
                    return Err(ConfigError::InvalidDepth {
                        key: ENV_BACKTRACE_DEPTH,
                        value,
                    });
                }
            };
        }

        Ok(config)
    }
}

/// Installs `config` as the process-wide configuration. Fails once any
/// configuration has been installed or read.
pub fn configure(config: RuntimeConfig) -> Result<(), ConfigError> {
    CONFIG.set(config).map_err(|_| ConfigError::AlreadyInstalled)
}

/// The process-wide configuration, read from the environment on first use.
pub fn config() -> &'static RuntimeConfig {
    CONFIG.get_or_init(|| {
        RuntimeConfig::from_env().unwrap_or_else(|err| {
            log::warn!("ignoring runtime configuration: {err}");
            RuntimeConfig::default()
        })
    })
}

/// Installs the `env_logger` backend filtered by `JRT_LOG`. Later calls are
/// no-ops.
pub fn init_logging() {
    let env = env_logger::Env::new().filter_or(ENV_LOG, "warn");
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .try_init();
}

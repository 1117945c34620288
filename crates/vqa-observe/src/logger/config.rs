use std::io::IsTerminal;

use crate::logger::format::LoggerFormat;

/// Environment variable carrying the filter directive to worker processes.
pub const ENV_LOG_LEVEL: &str = "VQA_LOG";
/// Environment variable carrying the output format to worker processes.
pub const ENV_LOG_FORMAT: &str = "VQA_LOG_FORMAT";

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// `EnvFilter` directive, e.g. `info` or `info,vqa.exec=debug`.
    pub level: String,
    pub with_targets: bool,
    pub use_color: bool,
}

impl LoggerConfig {
    /// Environment pairs that make a child process log the same way as this one.
    pub fn child_env(&self) -> Vec<(String, String)> {
        vec![
            (ENV_LOG_LEVEL.to_string(), self.level.clone()),
            (ENV_LOG_FORMAT.to_string(), self.format.as_str().to_string()),
        ]
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        let use_color = cfg!(test) || std::io::stderr().is_terminal();
        Self {
            format: LoggerFormat::Text,
            level: "info".to_string(),
            with_targets: true,
            use_color,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_env_carries_level_and_format() {
        let cfg = LoggerConfig {
            format: LoggerFormat::Json,
            level: "debug".into(),
            ..Default::default()
        };
        let env = cfg.child_env();
        assert!(env.contains(&(ENV_LOG_LEVEL.to_string(), "debug".to_string())));
        assert!(env.contains(&(ENV_LOG_FORMAT.to_string(), "json".to_string())));
    }
}

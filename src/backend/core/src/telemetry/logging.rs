//! Structured logging with JSON/pretty/compact output and redaction of
//! sensitive values (database credentials, bearer tokens, e-mail addresses).

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

static REDACTOR: OnceLock<SensitiveFieldRedactor> = OnceLock::new();

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Global log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format
    #[serde(default)]
    pub format: LogFormat,

    /// Per-module log levels, e.g. `{"sqlx" = "warn"}`
    #[serde(default)]
    pub module_levels: HashMap<String, String>,

    /// Whether to include file/line information
    #[serde(default = "default_include_location")]
    pub include_location: bool,

    /// Whether to include thread information
    #[serde(default)]
    pub include_thread: bool,

    /// Whether to include target (module path)
    #[serde(default = "default_include_target")]
    pub include_target: bool,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    #[serde(default)]
    pub redaction: RedactionConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            module_levels: HashMap::new(),
            include_location: default_include_location(),
            include_thread: false,
            include_target: default_include_target(),
            span_events: SpanEventConfig::default(),
            redaction: RedactionConfig::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
    Compact,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub on_new: bool,

    /// Log when spans close (includes busy/idle timings)
    #[serde(default = "default_on_close")]
    pub on_close: bool,
}

impl Default for SpanEventConfig {
    fn default() -> Self {
        Self {
            on_new: false,
            on_close: default_on_close(),
        }
    }
}

impl SpanEventConfig {
    fn to_fmt_span(&self) -> FmtSpan {
        let mut span = FmtSpan::NONE;
        if self.on_new {
            span |= FmtSpan::NEW;
        }
        if self.on_close {
            span |= FmtSpan::CLOSE;
        }
        span
    }
}

/// Configuration for sensitive data redaction.
#[derive(Debug, Clone, Deserialize)]
pub struct RedactionConfig {
    #[serde(default = "default_redaction_enabled")]
    pub enabled: bool,

    #[serde(default = "default_redaction_patterns")]
    pub patterns: Vec<RedactionPattern>,

    #[serde(default = "default_redaction_replacement")]
    pub replacement: String,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            enabled: default_redaction_enabled(),
            patterns: default_redaction_patterns(),
            replacement: default_redaction_replacement(),
        }
    }
}

/// A named regex whose matches are replaced in logged values.
#[derive(Debug, Clone, Deserialize)]
pub struct RedactionPattern {
    pub name: String,
    pub value_pattern: String,
}

/// Redactor for sensitive values in log output.
#[derive(Debug, Clone)]
pub struct SensitiveFieldRedactor {
    patterns: Vec<regex::Regex>,
    replacement: String,
    enabled: bool,
}

impl SensitiveFieldRedactor {
    /// Compile a redactor. Patterns whose regex fails to compile are skipped
    /// with a warning.
    pub fn new(config: &RedactionConfig) -> Self {
        let patterns = config
            .patterns
            .iter()
            .filter_map(|p| match regex::Regex::new(&p.value_pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!(pattern = %p.name, error = %e, "Invalid redaction pattern");
                    None
                }
            })
            .collect();

        Self {
            patterns,
            replacement: config.replacement.clone(),
            enabled: config.enabled,
        }
    }

    /// Replace every pattern match inside `value`.
    pub fn redact_value(&self, value: &str) -> String {
        if !self.enabled {
            return value.to_string();
        }

        self.patterns
            .iter()
            .fold(value.to_string(), |acc, re| {
                re.replace_all(&acc, self.replacement.as_str()).into_owned()
            })
    }

    /// The redactor installed by [`init_logging`], or one with default patterns.
    pub fn global() -> &'static SensitiveFieldRedactor {
        REDACTOR.get_or_init(|| SensitiveFieldRedactor::new(&RedactionConfig::default()))
    }
}

// Default value functions
fn default_log_level() -> String {
    std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string())
}

fn default_include_location() -> bool {
    true
}

fn default_include_target() -> bool {
    true
}

fn default_on_close() -> bool {
    true
}

fn default_redaction_enabled() -> bool {
    true
}

fn default_redaction_replacement() -> String {
    "[REDACTED]".to_string()
}

fn default_redaction_patterns() -> Vec<RedactionPattern> {
    vec![
        RedactionPattern {
            name: "database_credentials".to_string(),
            value_pattern: r"[^:/@\s]+:[^@\s/]+@".to_string(),
        },
        RedactionPattern {
            name: "tokens".to_string(),
            value_pattern: r"eyJ[a-zA-Z0-9_-]+\.[a-zA-Z0-9_-]+\.[a-zA-Z0-9_-]+".to_string(),
        },
        RedactionPattern {
            name: "emails".to_string(),
            value_pattern: r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}".to_string(),
        },
    ]
}

/// Initialize the global tracing subscriber.
///
/// In the `development` environment the default JSON format switches to
/// pretty output.
///
/// # Errors
///
/// Returns an error if a filter directive is invalid or a subscriber is
/// already installed.
pub fn init_logging(config: &LoggingConfig, environment: &str) -> anyhow::Result<()> {
    let redactor_installed = install_redactor(&config.redaction);

    let mut filter = EnvFilter::try_new(&config.level)?;
    for (module, level) in &config.module_levels {
        filter = filter.add_directive(format!("{}={}", module, level).parse()?);
    }

    let format = if environment == "development" && config.format == LogFormat::Json {
        LogFormat::Pretty
    } else {
        config.format.clone()
    };

    let base = fmt::layer()
        .with_span_events(config.span_events.to_fmt_span())
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_thread_ids(config.include_thread)
        .with_thread_names(config.include_thread)
        .with_target(config.include_target);

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match format {
        LogFormat::Json => base.json().boxed(),
        LogFormat::Pretty => base.pretty().boxed(),
        LogFormat::Compact => base.compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .try_init()?;

    if !redactor_installed {
        tracing::warn!("Redactor was already in use; configured redaction patterns are ignored");
    }

    Ok(())
}

/// Install the process-wide redactor. Returns `false` when one was already
/// installed or handed out by [`SensitiveFieldRedactor::global`].
fn install_redactor(config: &RedactionConfig) -> bool {
    REDACTOR.set(SensitiveFieldRedactor::new(config)).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacts_bearer_tokens() {
        let redactor = SensitiveFieldRedactor::new(&RedactionConfig::default());
        assert_eq!(
            redactor.redact_value("Bearer eyJhbGciOi.eyJzdWIiOi.c2lnbmF0dXJl"),
            "Bearer [REDACTED]"
        );
    }

    #[test]
    fn test_invalid_pattern_is_skipped() {
        let config = RedactionConfig {
            patterns: vec![RedactionPattern {
                name: "broken".to_string(),
                value_pattern: "(".to_string(),
            }],
            ..RedactionConfig::default()
        };
        let redactor = SensitiveFieldRedactor::new(&config);
        assert_eq!(redactor.redact_value("lab@example.org"), "lab@example.org");
    }

    #[test]
    fn test_second_redactor_install_is_reported() {
        let _ = SensitiveFieldRedactor::global();
        assert!(!install_redactor(&RedactionConfig::default()));
    }

    #[test]
    fn test_redacts_connection_url_credentials() {
        let redactor = SensitiveFieldRedactor::new(&RedactionConfig::default());
        let redacted = redactor.redact_value("postgres://atlas:hunter2@db:5432/atlas");
        assert_eq!(redacted, "postgres://[REDACTED]db:5432/atlas");
    }

    #[test]
    fn test_redacts_email_values() {
        let redactor = SensitiveFieldRedactor::new(&RedactionConfig::default());
        assert_eq!(
            redactor.redact_value("principal lab@example.org"),
            "principal [REDACTED]"
        );
        assert_eq!(redactor.redact_value("ACGTACGT"), "ACGTACGT");
    }

    #[test]
    fn test_disabled_redactor_passes_through() {
        let config = RedactionConfig {
            enabled: false,
            ..RedactionConfig::default()
        };
        let redactor = SensitiveFieldRedactor::new(&config);
        assert_eq!(redactor.redact_value("postgres://a:b@db/x"), "postgres://a:b@db/x");
    }

    #[test]
    fn test_logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.redaction.enabled);
        assert!(config.span_events.on_close);
    }
}

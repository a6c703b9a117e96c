use std::path::Path;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

use crate::rules::glob_to_regex;

const DEFAULT_ALERT_CHANNEL_CAPACITY: usize = 64;

const VALID_LOG_LEVELS: [&str; 4] = ["debug", "info", "warn", "error"];
const VALID_RULE_TYPES: [&str; 3] = ["FILE", "NETWORK", "PROCESS"];
const VALID_SEVERITIES: [&str; 3] = ["INFO", "WARN", "CRITICAL"];

pub const PROCESS_RULE_TYPE: &str = "PROCESS";

/// A single tripwire. Only `PROCESS` rules are evaluated by this agent.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TripwireRule {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub rule_type: String,
    /// Glob matched against the executable; empty matches every process.
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub severity: String,
}

impl TripwireRule {
    pub fn is_process(&self) -> bool {
        self.rule_type == PROCESS_RULE_TYPE
    }
}

/// Which exec tracepoints get attached.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ProbeToggles {
    #[serde(default = "enabled")]
    pub execve: bool,
    #[serde(default = "enabled")]
    pub execveat: bool,
}

impl Default for ProbeToggles {
    fn default() -> Self {
        Self {
            execve: true,
            execveat: true,
        }
    }
}

fn enabled() -> bool {
    true
}

fn default_alert_channel_capacity() -> usize {
    DEFAULT_ALERT_CHANNEL_CAPACITY
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub log_level: Option<String>,
    #[serde(default)]
    pub probes: ProbeToggles,
    #[serde(default = "default_alert_channel_capacity")]
    pub alert_channel_capacity: usize,
    pub otel_exporter_otlp_endpoint: Option<String>,
    #[serde(default)]
    pub rules: Vec<TripwireRule>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: None,
            probes: ProbeToggles::default(),
            alert_channel_capacity: DEFAULT_ALERT_CHANNEL_CAPACITY,
            otel_exporter_otlp_endpoint: None,
            rules: Vec::new(),
        }
    }
}

impl Settings {
    /// Loads the optional YAML file, then environment overrides, then validates.
    pub fn new(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut builder = Config::builder();
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml).required(true));
        }

        let s = builder
            .add_source(Environment::default().separator("__").try_parsing(true))
            .build()?;

        let settings: Self = s.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks every field and reports all problems at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Message(problems.join("; ")))
        }
    }

    fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if let Some(level) = &self.log_level {
            if !VALID_LOG_LEVELS.contains(&level.as_str()) {
                problems.push(format!(
                    "log_level {:?} must be one of: debug, info, warn, error",
                    level
                ));
            }
        }

        if self.alert_channel_capacity == 0 {
            problems.push("alert_channel_capacity must be greater than zero".to_string());
        }

        for (i, rule) in self.rules.iter().enumerate() {
            let prefix = format!("rules[{}]", i);
            if rule.name.is_empty() {
                problems.push(format!("{}: name is required", prefix));
            }
            if !VALID_RULE_TYPES.contains(&rule.rule_type.as_str()) {
                problems.push(format!(
                    "{}: type {:?} must be one of: FILE, NETWORK, PROCESS",
                    prefix, rule.rule_type
                ));
            }
            if !VALID_SEVERITIES.contains(&rule.severity.as_str()) {
                problems.push(format!(
                    "{}: severity {:?} must be one of: INFO, WARN, CRITICAL",
                    prefix, rule.severity
                ));
            }
            if rule.is_process() && !rule.target.is_empty() {
                if let Err(e) = glob_to_regex(&rule.target) {
                    problems.push(format!(
                        "{}: target {:?} is not a valid glob: {}",
                        prefix, rule.target, e
                    ));
                }
            }
        }

        problems
    }

    /// Default `env_logger` filter; `RUST_LOG` still takes precedence.
    pub fn log_filter(&self, verbose: bool) -> &str {
        match self.log_level.as_deref() {
            Some(level) => level,
            None if verbose => "info",
            None => "warn",
        }
    }

    pub fn process_rules(&self) -> impl Iterator<Item = &TripwireRule> {
        self.rules.iter().filter(|r| r.is_process())
    }
}

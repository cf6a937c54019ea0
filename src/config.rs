use regex::RegexBuilder;
use serde::Deserialize;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::chatbot::engine::DEFAULT_MAX_TURNS;
use crate::chatbot::faq::{FaqEntry, FaqTable, Matcher, DEFAULT_FALLBACK};
use crate::chatbot::history::DEFAULT_MAX_CONVERSATIONS;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// A required environment variable is unset or empty.
    MissingVar(&'static str),
    /// Failed to read the FAQ file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Invalid regex pattern.
    InvalidRegex { pattern: String, source: regex::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingVar(name) => write!(f, "environment variable {} is required", name),
            Self::ReadFile { path, source } => {
                write!(f, "failed to read FAQ file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse FAQ file '{}': {}", path.display(), source)
            }
            Self::InvalidRegex { pattern, source } => {
                write!(f, "invalid regex pattern '{}': {}", pattern, source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::InvalidRegex { source, .. } => Some(source),
            Self::MissingVar(_) | Self::Validation(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct FaqFile {
    entries: Vec<FaqFileEntry>,
    /// Answer when a triggered message matches no entry.
    fallback: Option<String>,
}

/// Either `keyword` or `pattern`, plus the answer.
#[derive(Deserialize)]
struct FaqFileEntry {
    keyword: Option<String>,
    pattern: Option<String>,
    answer: String,
}

pub struct Config {
    pub line_channel_access_token: String,
    pub line_channel_secret: String,
    pub azure_openai_endpoint: String,
    pub azure_openai_api_key: String,
    pub azure_openai_api_version: String,
    /// Deployment name; also used as the model identifier.
    pub azure_openai_model: String,
    pub bind_addr: SocketAddr,
    /// When set, logs are also written to `<log_dir>/unibot.log`.
    pub log_dir: Option<PathBuf>,
    pub faq: FaqTable,
    /// Cap on non-system turns kept per user.
    pub history_max_turns: usize,
    /// Completion request timeout. `None` waits indefinitely.
    pub model_timeout: Option<Duration>,
    pub onboard_new_conversations: bool,
    /// Cap on users whose conversations are held in memory.
    pub max_conversations: usize,
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using any key lookup, so tests don't touch the real environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::MissingVar(key));

        let line_channel_access_token = require("LINE_CHANNEL_ACCESS_TOKEN")?;
        let line_channel_secret = require("LINE_CHANNEL_SECRET")?;
        let azure_openai_endpoint = require("AZURE_OPENAI_ENDPOINT")?;
        let azure_openai_api_key = require("AZURE_OPENAI_API_KEY")?;
        let azure_openai_api_version = require("AZURE_OPENAI_API_VERSION")?;
        let azure_openai_model = require("AZURE_OPENAI_MODEL")?;

        if !azure_openai_endpoint.starts_with("http://")
            && !azure_openai_endpoint.starts_with("https://")
        {
            return Err(ConfigError::Validation(
                "AZURE_OPENAI_ENDPOINT must be an http(s) URL".into(),
            ));
        }

        let bind_addr = get("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| {
                ConfigError::Validation(format!("BIND_ADDR is not a socket address: {e}"))
            })?;

        let positive = |key: &str, default: usize| match get(key) {
            Some(v) => v.parse::<usize>().ok().filter(|n| *n > 0).ok_or_else(|| {
                ConfigError::Validation(format!("{key} must be a positive integer, got '{v}'"))
            }),
            None => Ok(default),
        };
        let history_max_turns = positive("HISTORY_MAX_TURNS", DEFAULT_MAX_TURNS)?;
        let max_conversations = positive("MAX_CONVERSATIONS", DEFAULT_MAX_CONVERSATIONS)?;

        let model_timeout = match get("MODEL_TIMEOUT_SECS") {
            Some(v) => Some(v.parse::<u64>().map(Duration::from_secs).map_err(|_| {
                ConfigError::Validation(format!(
                    "MODEL_TIMEOUT_SECS must be a number of seconds, got '{v}'"
                ))
            })?),
            None => None,
        };

        let onboard_new_conversations = match get("ONBOARD_NEW_CONVERSATIONS").as_deref() {
            None | Some("0") | Some("false") => false,
            Some("1") | Some("true") => true,
            Some(other) => {
                return Err(ConfigError::Validation(format!(
                    "ONBOARD_NEW_CONVERSATIONS must be true or false, got '{other}'"
                )));
            }
        };

        let faq = match get("FAQ_PATH") {
            Some(path) => load_faq(path)?,
            None => FaqTable::default(),
        };

        Ok(Self {
            line_channel_access_token,
            line_channel_secret,
            azure_openai_endpoint,
            azure_openai_api_key,
            azure_openai_api_version,
            azure_openai_model,
            bind_addr,
            log_dir: get("LOG_DIR").map(PathBuf::from),
            faq,
            history_max_turns,
            model_timeout,
            onboard_new_conversations,
            max_conversations,
        })
    }
}

/// Load an FAQ table from a JSON file. Entry order is match priority.
///
/// Patterns are compiled case-insensitive, like keywords.
pub fn load_faq<P: AsRef<Path>>(path: P) -> Result<FaqTable, ConfigError> {
    let path = path.as_ref().to_path_buf();
    let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadFile {
        path: path.clone(),
        source: e,
    })?;
    let file: FaqFile = serde_json::from_str(&content).map_err(|e| ConfigError::ParseJson {
        path: path.clone(),
        source: e,
    })?;

    if file.entries.is_empty() {
        return Err(ConfigError::Validation("FAQ file has no entries".into()));
    }

    let entries = file
        .entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| {
            let matcher = match (entry.keyword, entry.pattern) {
                (Some(k), None) if !k.is_empty() => Matcher::Keyword(k),
                (None, Some(p)) => {
                    let re = RegexBuilder::new(&p)
                        .case_insensitive(true)
                        .build()
                        .map_err(|e| ConfigError::InvalidRegex {
                            pattern: p,
                            source: e,
                        })?;
                    Matcher::Pattern(re)
                }
                _ => {
                    return Err(ConfigError::Validation(format!(
                        "FAQ entry {i} needs exactly one non-empty keyword or pattern"
                    )));
                }
            };
            Ok(FaqEntry {
                matcher,
                answer: entry.answer,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let fallback = file.fallback.unwrap_or_else(|| DEFAULT_FALLBACK.to_string());
    Ok(FaqTable::new(entries, fallback))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_faq(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn base_vars() -> HashMap<String, String> {
        [
            ("LINE_CHANNEL_ACCESS_TOKEN", "token"),
            ("LINE_CHANNEL_SECRET", "secret"),
            ("AZURE_OPENAI_ENDPOINT", "https://example.openai.azure.com"),
            ("AZURE_OPENAI_API_KEY", "key"),
            ("AZURE_OPENAI_API_VERSION", "2024-02-01"),
            ("AZURE_OPENAI_MODEL", "gpt-4o-mini"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn load(vars: &HashMap<String, String>) -> Result<Config, ConfigError> {
        Config::from_lookup(|k| vars.get(k).cloned())
    }

    fn assert_err<T>(result: Result<T, ConfigError>) -> ConfigError {
        match result {
            Ok(_) => panic!("expected error, got Ok"),
            Err(e) => e,
        }
    }

    #[test]
    fn test_valid_config_uses_defaults() {
        let config = load(&base_vars()).expect("should load valid config");
        assert_eq!(config.line_channel_secret, "secret");
        assert_eq!(config.azure_openai_model, "gpt-4o-mini");
        assert_eq!(config.bind_addr, "0.0.0.0:8000".parse().unwrap());
        assert_eq!(config.history_max_turns, DEFAULT_MAX_TURNS);
        assert!(config.model_timeout.is_none());
        assert!(config.log_dir.is_none());
        assert!(!config.onboard_new_conversations);
        assert_eq!(config.faq.entries().len(), 5);
        assert_eq!(config.max_conversations, DEFAULT_MAX_CONVERSATIONS);
    }

    #[test]
    fn test_each_required_var_is_checked() {
        for key in [
            "LINE_CHANNEL_ACCESS_TOKEN",
            "LINE_CHANNEL_SECRET",
            "AZURE_OPENAI_ENDPOINT",
            "AZURE_OPENAI_API_KEY",
            "AZURE_OPENAI_API_VERSION",
            "AZURE_OPENAI_MODEL",
        ] {
            let mut vars = base_vars();
            vars.remove(key);
            let err = assert_err(load(&vars));
            assert!(matches!(err, ConfigError::MissingVar(k) if k == key));
            assert!(err.to_string().contains(key));
        }
    }

    #[test]
    fn test_blank_required_var_counts_as_missing() {
        let mut vars = base_vars();
        vars.insert("LINE_CHANNEL_SECRET".into(), "  ".into());
        let err = assert_err(load(&vars));
        assert!(matches!(err, ConfigError::MissingVar("LINE_CHANNEL_SECRET")));
    }

    #[test]
    fn test_endpoint_must_be_url() {
        let mut vars = base_vars();
        vars.insert("AZURE_OPENAI_ENDPOINT".into(), "example.com".into());
        assert!(matches!(assert_err(load(&vars)), ConfigError::Validation(_)));
    }

    #[test]
    fn test_optional_overrides() {
        let mut vars = base_vars();
        vars.insert("BIND_ADDR".into(), "127.0.0.1:9000".into());
        vars.insert("HISTORY_MAX_TURNS".into(), "6".into());
        vars.insert("MODEL_TIMEOUT_SECS".into(), "30".into());
        vars.insert("LOG_DIR".into(), "/tmp/unibot".into());
        vars.insert("ONBOARD_NEW_CONVERSATIONS".into(), "true".into());
        vars.insert("MAX_CONVERSATIONS".into(), "50".into());

        let config = load(&vars).unwrap();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.history_max_turns, 6);
        assert_eq!(config.model_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.log_dir, Some(PathBuf::from("/tmp/unibot")));
        assert!(config.onboard_new_conversations);
        assert_eq!(config.max_conversations, 50);
    }

    #[test]
    fn test_zero_max_turns_rejected() {
        let mut vars = base_vars();
        vars.insert("HISTORY_MAX_TURNS".into(), "0".into());
        let err = assert_err(load(&vars));
        assert!(err.to_string().contains("HISTORY_MAX_TURNS"));
    }

    #[test]
    fn test_zero_max_conversations_rejected() {
        let mut vars = base_vars();
        vars.insert("MAX_CONVERSATIONS".into(), "0".into());
        let err = assert_err(load(&vars));
        assert!(err.to_string().contains("MAX_CONVERSATIONS"));
    }

    #[test]
    fn test_bad_bind_addr_rejected() {
        let mut vars = base_vars();
        vars.insert("BIND_ADDR".into(), "not an address".into());
        assert!(matches!(assert_err(load(&vars)), ConfigError::Validation(_)));
    }

    #[test]
    fn test_bad_bool_rejected() {
        let mut vars = base_vars();
        vars.insert("ONBOARD_NEW_CONVERSATIONS".into(), "maybe".into());
        assert!(matches!(assert_err(load(&vars)), ConfigError::Validation(_)));
    }

    #[test]
    fn test_faq_file_replaces_default_table() {
        let file = write_faq(r#"{
            "entries": [
                {"keyword": "ツアー", "answer": "tour"},
                {"pattern": "live|ライブ", "answer": "live"}
            ],
            "fallback": "dunno"
        }"#);
        let mut vars = base_vars();
        vars.insert("FAQ_PATH".into(), file.path().display().to_string());

        let config = load(&vars).unwrap();
        assert_eq!(config.faq.entries().len(), 2);
        assert_eq!(config.faq.lookup("UNISON ツアー"), "tour");
        assert_eq!(config.faq.lookup("UNISON LIVE"), "live");
        assert_eq!(config.faq.lookup("UNISON"), "dunno");
    }

    #[test]
    fn test_faq_pattern_with_uppercase_literal_matches() {
        let file = write_faq(r#"{"entries": [{"pattern": "LIVE|Tour", "answer": "gig"}]}"#);
        let faq = load_faq(file.path()).unwrap();
        assert_eq!(faq.lookup("UNISON live dates"), "gig");
        assert_eq!(faq.lookup("UNISON TOUR 2025"), "gig");
        assert_eq!(faq.lookup("UNISON studio"), DEFAULT_FALLBACK);
    }

    #[test]
    fn test_faq_file_default_fallback() {
        let file = write_faq(r#"{"entries": [{"keyword": "x", "answer": "y"}]}"#);
        let faq = load_faq(file.path()).unwrap();
        assert_eq!(faq.fallback(), DEFAULT_FALLBACK);
    }

    #[test]
    fn test_faq_file_not_found() {
        let err = assert_err(load_faq("/nonexistent/path/faq.json"));
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_faq_invalid_json() {
        let file = write_faq("{ invalid json }");
        let err = assert_err(load_faq(file.path()));
        assert!(matches!(err, ConfigError::ParseJson { .. }));
    }

    #[test]
    fn test_faq_invalid_regex() {
        let file = write_faq(r#"{"entries": [{"pattern": "[invalid(regex", "answer": "a"}]}"#);
        let err = assert_err(load_faq(file.path()));
        assert!(matches!(err, ConfigError::InvalidRegex { .. }));
    }

    #[test]
    fn test_faq_entry_needs_one_matcher() {
        let file =
            write_faq(r#"{"entries": [{"keyword": "a", "pattern": "b", "answer": "c"}]}"#);
        assert!(matches!(assert_err(load_faq(file.path())), ConfigError::Validation(_)));

        let file = write_faq(r#"{"entries": [{"answer": "c"}]}"#);
        assert!(matches!(assert_err(load_faq(file.path())), ConfigError::Validation(_)));
    }

    #[test]
    fn test_faq_empty_entries() {
        let file = write_faq(r#"{"entries": []}"#);
        assert!(matches!(assert_err(load_faq(file.path())), ConfigError::Validation(_)));
    }
}

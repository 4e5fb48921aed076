#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::ScanwatchError;

pub const MIN_POLL_INTERVAL_MS: u64 = 250;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub poll: PollConfig,
    pub ui: UiConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    #[serde(alias = "url")]
    pub base_url: String,
    pub api_prefix: String,
    pub timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_owned(),
            api_prefix: "/api".to_owned(),
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PollConfig {
    pub interval_ms: u64,
    pub preview_lines: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 3000,
            preview_lines: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UiConfig {
    pub icons: bool,
    pub theme: Theme,
    /// Server-side follow-up action run from the analysis view. Empty
    /// disables the key.
    pub follow_up_action: String,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            icons: true,
            theme: Theme::Light,
            follow_up_action: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
    /// Where interactive sessions write logs. Empty means next to the config file.
    pub file: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: LogFormat::Text,
            file: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_file: PathBuf,
}

impl ConfigPaths {
    #[must_use]
    pub fn default_log_file(&self) -> PathBuf {
        self.config_file
            .parent()
            .map_or_else(|| PathBuf::from("scanwatch.log"), |p| p.join("scanwatch.log"))
    }
}

pub fn default_paths() -> anyhow::Result<ConfigPaths> {
    if let Some(p) = std::env::var_os("SCANWATCH_CONFIG") {
        return Ok(ConfigPaths {
            config_file: PathBuf::from(p),
        });
    }

    let unix = home_config_path_unix();
    if !cfg!(windows) || unix.exists() {
        return Ok(ConfigPaths { config_file: unix });
    }

    let proj = ProjectDirs::from("com", "scanwatch", "scanwatch")
        .context("failed to determine platform config directory")?;
    Ok(ConfigPaths {
        config_file: proj.config_dir().join("config.toml"),
    })
}

fn home_config_path_unix() -> PathBuf {
    let home = home_dir().unwrap_or_else(|| PathBuf::from("~"));
    home.join(".config").join("scanwatch").join("config.toml")
}

fn home_dir() -> Option<PathBuf> {
    if let Some(v) = std::env::var_os("HOME") {
        return Some(PathBuf::from(v));
    }
    std::env::var_os("USERPROFILE").map(PathBuf::from)
}

pub fn expand_path(input: &str) -> PathBuf {
    let expanded = expand_env_vars(input);
    if let Some(rest) = expanded.strip_prefix("~/")
        && let Some(home) = home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(expanded)
}

fn expand_env_vars(input: &str) -> String {
    // $VAR and ${VAR}; unknown vars stay as written.
    let Ok(re) = regex::Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?") else {
        return input.to_owned();
    };
    re.replace_all(input, |caps: &regex::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_owned())
    })
    .to_string()
}

pub fn load() -> anyhow::Result<(Config, ConfigPaths)> {
    let paths = default_paths()?;
    let (_doc, cfg) = load_from_file(&paths.config_file)?;
    cfg.validate()?;
    Ok((cfg, paths))
}

pub fn list_resolved_toml() -> anyhow::Result<String> {
    let (cfg, _paths) = load()?;
    Ok(toml::to_string_pretty(&cfg)?)
}

pub fn get_value_string(key: &str) -> anyhow::Result<Option<String>> {
    let paths = default_paths()?;
    get_value_string_at_path(&paths.config_file, key)
}

pub fn set_value_string(key: &str, value: &str) -> anyhow::Result<()> {
    let paths = default_paths()?;
    set_value_string_at_path(&paths.config_file, key, value)
}

fn load_from_file(path: &Path) -> anyhow::Result<(toml_edit::DocumentMut, Config)> {
    if !path.exists() {
        return Ok((toml_edit::DocumentMut::new(), Config::default()));
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let doc = raw
        .parse::<toml_edit::DocumentMut>()
        .with_context(|| format!("failed to parse TOML in {}", path.display()))?;

    let cfg: Config = toml::from_str(&raw)
        .with_context(|| format!("failed to deserialize TOML in {}", path.display()))?;
    Ok((doc, cfg))
}

pub fn get_value_string_at_path(path: &Path, key: &str) -> anyhow::Result<Option<String>> {
    let (_doc, cfg) = load_from_file(path)?;
    cfg.validate()?;
    Ok(lookup_value(&cfg, &normalize_key(key)).map(format_value_for_stdout))
}

pub fn set_value_string_at_path(path: &Path, key: &str, value: &str) -> anyhow::Result<()> {
    let (mut doc, cfg) = load_from_file(path)?;
    cfg.validate()?;

    let norm = normalize_key(key);
    let item = parse_value_for_key(key, &norm, value)?;
    apply_set(&mut doc, &norm, item)?;

    // Re-parse so an invalid combination never reaches disk.
    let new_raw = doc.to_string();
    let new_cfg: Config = toml::from_str(&new_raw)
        .with_context(|| format!("config update produced invalid TOML for {}", path.display()))?;
    new_cfg.validate()?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, new_raw.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;

    Ok(())
}

impl Config {
    pub fn validate(&self) -> Result<(), ScanwatchError> {
        if self.server.base_url.trim().is_empty() {
            return Err(ScanwatchError::Config(
                "server.base_url must not be empty".to_owned(),
            ));
        }
        if self.server.timeout_ms == 0 {
            return Err(ScanwatchError::Config(
                "server.timeout_ms must be >= 1".to_owned(),
            ));
        }
        if self.poll.interval_ms < MIN_POLL_INTERVAL_MS {
            return Err(ScanwatchError::Config(format!(
                "poll.interval_ms must be >= {MIN_POLL_INTERVAL_MS}"
            )));
        }
        if self.poll.preview_lines == 0 {
            return Err(ScanwatchError::Config(
                "poll.preview_lines must be >= 1".to_owned(),
            ));
        }
        if tracing_subscriber::EnvFilter::try_new(&self.log.level).is_err() {
            return Err(ScanwatchError::Config(format!(
                "log.level '{}' is not a valid filter",
                self.log.level
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn log_file(&self, paths: &ConfigPaths) -> PathBuf {
        if self.log.file.trim().is_empty() {
            paths.default_log_file()
        } else {
            expand_path(&self.log.file)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyType {
    Bool,
    Int,
    String,
    Enum(&'static [&'static str]),
}

fn normalize_key(key: &str) -> String {
    match key {
        "server" | "server.url" => "server.base_url",
        "poll.interval" => "poll.interval_ms",
        "theme" => "ui.theme",
        _ => key,
    }
    .to_owned()
}

fn key_type(key: &str) -> Option<KeyType> {
    Some(match key {
        "server.base_url" | "server.api_prefix" | "log.level" | "log.file"
        | "ui.follow_up_action" => KeyType::String,
        "ui.icons" => KeyType::Bool,
        "server.timeout_ms" | "poll.interval_ms" | "poll.preview_lines" => KeyType::Int,
        "ui.theme" => KeyType::Enum(&["light", "dark"]),
        "log.format" => KeyType::Enum(&["text", "json"]),
        _ => return None,
    })
}

fn parse_value_for_key(key: &str, norm: &str, value: &str) -> anyhow::Result<toml_edit::Item> {
    let invalid = |msg: String| ScanwatchError::InvalidConfigValue {
        key: key.to_owned(),
        msg,
    };
    let key_type = key_type(norm).ok_or_else(|| ScanwatchError::InvalidConfigKey(key.to_owned()))?;
    let item = match key_type {
        KeyType::Bool => toml_edit::value(parse_bool(value).map_err(invalid)?),
        KeyType::Int => toml_edit::value(parse_int(value).map_err(invalid)?),
        KeyType::String => toml_edit::value(value),
        KeyType::Enum(allowed) => {
            let v = value.trim();
            if !allowed.contains(&v) {
                return Err(invalid(format!("must be one of: {}", allowed.join(", "))).into());
            }
            toml_edit::value(v)
        }
    };
    Ok(item)
}

fn parse_bool(s: &str) -> Result<bool, String> {
    match s.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(format!("expected true|false, got '{other}'")),
    }
}

fn parse_int(s: &str) -> Result<i64, String> {
    let n = s
        .trim()
        .parse::<i64>()
        .map_err(|e| format!("expected integer, got '{s}': {e}"))?;
    if n < 0 {
        return Err(format!("expected a non-negative integer, got {n}"));
    }
    Ok(n)
}

fn apply_set(
    doc: &mut toml_edit::DocumentMut,
    key: &str,
    value: toml_edit::Item,
) -> anyhow::Result<()> {
    let parts: Vec<&str> = key.split('.').filter(|p| !p.is_empty()).collect();
    let Some((leaf, parents)) = parts.split_last() else {
        return Err(ScanwatchError::InvalidConfigKey(key.to_owned()).into());
    };

    let mut cur = doc.as_table_mut();
    for seg in parents {
        if !cur.contains_key(seg) {
            let mut t = toml_edit::Table::new();
            t.set_implicit(true);
            cur.insert(seg, toml_edit::Item::Table(t));
        }
        cur = cur[seg].as_table_mut().ok_or_else(|| {
            ScanwatchError::Config(format!("cannot set {key}: '{seg}' is not a table"))
        })?;
    }

    cur.insert(leaf, value);
    Ok(())
}

fn lookup_value(cfg: &Config, key: &str) -> Option<serde_json::Value> {
    let mut v = serde_json::to_value(cfg).ok()?;
    for seg in key.split('.').filter(|s| !s.is_empty()) {
        match v {
            serde_json::Value::Object(mut map) => {
                v = map.remove(seg)?;
            }
            _ => return None,
        }
    }
    Some(v)
}

fn format_value_for_stdout(v: serde_json::Value) -> String {
    match v {
        serde_json::Value::Null => "null".to_owned(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s,
        other => serde_json::to_string_pretty(&other).unwrap_or_else(|_| other.to_string()),
    }
}

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Environment override tracking
// ---------------------------------------------------------------------------

/// Tracks which configuration settings are overridden by environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    overrides: HashMap<String, String>,
}

impl EnvOverrides {
    /// Check whether a setting key (e.g. "server.host") is overridden by an env var.
    pub fn is_overridden(&self, key: &str) -> bool {
        self.overrides.contains_key(key)
    }

    /// Get the env var name that overrides the given setting key.
    pub fn env_var_for(&self, key: &str) -> Option<&str> {
        self.overrides.get(key).map(String::as_str)
    }

    pub fn all(&self) -> &HashMap<String, String> {
        &self.overrides
    }

    fn record(&mut self, key: &str, env_var: &str) {
        self.overrides.insert(key.to_string(), env_var.to_string());
    }
}

// ---------------------------------------------------------------------------
// Settings report entry
// ---------------------------------------------------------------------------

/// One effective setting, as shown by the admin settings report.
#[derive(Debug, Clone, Serialize)]
pub struct SettingEntry {
    /// Dotted key path (e.g. "ai.model_primary").
    pub key: String,
    pub section: String,
    /// Current effective value. Sensitive values are masked.
    pub value: serde_json::Value,
    /// The env var that can override this setting.
    pub env_var: String,
    pub overridden: bool,
    #[serde(default)]
    pub sensitive: bool,
}

// ---------------------------------------------------------------------------
// Main configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Env var overrides are not serialized to TOML.
    #[serde(skip)]
    pub env_overrides: EnvOverrides,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Router, budget, cache and provider settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AiConfig {
    /// `auto`, `mini_only`, `local_only` or `turbo_only`. Unknown values read as `auto`.
    #[serde(default = "default_router_mode")]
    pub router_mode: String,
    /// Low-cost tier model.
    #[serde(default = "default_model_primary")]
    pub model_primary: String,
    /// High-cost tier model.
    #[serde(default = "default_model_deep")]
    pub model_deep: String,
    #[serde(default = "default_max_tokens_quick")]
    pub max_tokens_quick: u32,
    #[serde(default = "default_max_tokens_deep")]
    pub max_tokens_deep: u32,
    #[serde(default = "default_soft_limit")]
    pub soft_limit_usd: f64,
    /// Hard daily limit.
    #[serde(default = "default_daily_limit")]
    pub daily_limit_usd: f64,
    /// Clamped to at least 60 by the cache.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    /// Provider credential. `None` disables the paid tiers.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_locale")]
    pub default_locale: String,
    #[serde(default = "default_supported_locales")]
    pub supported_locales: Vec<String>,
    /// Ledger reconciliation interval.
    #[serde(default = "default_job_interval")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_job_interval")]
    pub cache_sweep_interval_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            router_mode: default_router_mode(),
            model_primary: default_model_primary(),
            model_deep: default_model_deep(),
            max_tokens_quick: default_max_tokens_quick(),
            max_tokens_deep: default_max_tokens_deep(),
            soft_limit_usd: default_soft_limit(),
            daily_limit_usd: default_daily_limit(),
            cache_ttl_secs: default_cache_ttl(),
            api_key: None,
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            default_locale: default_locale(),
            supported_locales: default_supported_locales(),
            refresh_interval_secs: default_job_interval(),
            cache_sweep_interval_secs: default_job_interval(),
        }
    }
}

impl AiConfig {
    /// The configured API key, if non-blank.
    pub fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

const fn default_port() -> u16 {
    8410
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_db_path() -> PathBuf {
    PathBuf::from("calmgate.db")
}
fn default_router_mode() -> String {
    "auto".to_string()
}
fn default_model_primary() -> String {
    "gpt-4-mini".to_string()
}
fn default_model_deep() -> String {
    "gpt-4-turbo".to_string()
}
const fn default_max_tokens_quick() -> u32 {
    120
}
const fn default_max_tokens_deep() -> u32 {
    400
}
const fn default_soft_limit() -> f64 {
    0.35
}
const fn default_daily_limit() -> f64 {
    0.50
}
const fn default_cache_ttl() -> u64 {
    86_400
}
fn default_base_url() -> String {
    "https://api.openai.com".to_string()
}
const fn default_request_timeout() -> u64 {
    10
}
fn default_locale() -> String {
    "ru".to_string()
}
fn default_supported_locales() -> Vec<String> {
    vec!["ru".to_string(), "en".to_string()]
}
const fn default_job_interval() -> u64 {
    300
}
fn default_log_level() -> String {
    "info".to_string()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// Config loading, env overrides, and settings report
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a TOML file, then apply environment variable
    /// overrides. Any setting prefixed with `CALMGATE_` takes precedence over
    /// the file value and is tracked in `env_overrides`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            config
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    fn apply_env_overrides(&mut self) {
        let mut ov = EnvOverrides::default();

        macro_rules! env_str {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = val;
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_bool {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_parse {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    if let Ok(parsed) = val.trim().parse() {
                        $field = parsed;
                        ov.record($key, $env);
                    }
                }
            };
        }
        macro_rules! env_path {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = PathBuf::from(val);
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_opt_str {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = if val.is_empty() { None } else { Some(val) };
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_list {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = split_list(&val);
                    ov.record($key, $env);
                }
            };
        }

        // -- Server --
        env_str!("server.host", "CALMGATE_SERVER_HOST", self.server.host);
        env_parse!("server.port", "CALMGATE_SERVER_PORT", self.server.port);
        env_list!("server.cors_origins", "CALMGATE_SERVER_CORS_ORIGINS", self.server.cors_origins);

        // -- Database --
        env_path!("database.path", "CALMGATE_DATABASE_PATH", self.database.path);

        // -- AI --
        let ai = &mut self.ai;
        env_str!("ai.router_mode", "CALMGATE_AI_ROUTER_MODE", ai.router_mode);
        env_str!("ai.model_primary", "CALMGATE_AI_MODEL_PRIMARY", ai.model_primary);
        env_str!("ai.model_deep", "CALMGATE_AI_MODEL_DEEP", ai.model_deep);
        env_parse!("ai.max_tokens_quick", "CALMGATE_AI_MAX_TOKENS_QUICK", ai.max_tokens_quick);
        env_parse!("ai.max_tokens_deep", "CALMGATE_AI_MAX_TOKENS_DEEP", ai.max_tokens_deep);
        env_parse!("ai.soft_limit_usd", "CALMGATE_AI_SOFT_LIMIT_USD", ai.soft_limit_usd);
        env_parse!("ai.daily_limit_usd", "CALMGATE_AI_DAILY_LIMIT_USD", ai.daily_limit_usd);
        env_parse!("ai.cache_ttl_secs", "CALMGATE_AI_CACHE_TTL_SECS", ai.cache_ttl_secs);
        env_opt_str!("ai.api_key", "CALMGATE_AI_API_KEY", ai.api_key);
        env_str!("ai.base_url", "CALMGATE_AI_BASE_URL", ai.base_url);
        env_parse!("ai.request_timeout_secs", "CALMGATE_AI_REQUEST_TIMEOUT_SECS", ai.request_timeout_secs);
        env_str!("ai.default_locale", "CALMGATE_AI_DEFAULT_LOCALE", ai.default_locale);
        env_list!("ai.supported_locales", "CALMGATE_AI_SUPPORTED_LOCALES", ai.supported_locales);
        env_parse!("ai.refresh_interval_secs", "CALMGATE_AI_REFRESH_INTERVAL_SECS", ai.refresh_interval_secs);
        env_parse!(
            "ai.cache_sweep_interval_secs",
            "CALMGATE_AI_CACHE_SWEEP_INTERVAL_SECS",
            ai.cache_sweep_interval_secs
        );

        // -- Logging --
        env_str!("logging.level", "CALMGATE_LOG_LEVEL", self.logging.level);
        env_bool!("logging.json", "CALMGATE_LOG_JSON", self.logging.json);

        self.env_overrides = ov;
    }

    /// Every effective setting with its env var and override state.
    pub fn settings_report(&self) -> Vec<SettingEntry> {
        let ov = &self.env_overrides;
        let mut entries = Vec::new();

        let mut push = |key: &str, section: &str, value: serde_json::Value, env_var: &str, sensitive: bool| {
            let value = if sensitive && !value.is_null() {
                serde_json::json!("********")
            } else {
                value
            };
            entries.push(SettingEntry {
                key: key.to_string(),
                section: section.to_string(),
                value,
                env_var: env_var.to_string(),
                overridden: ov.is_overridden(key),
                sensitive,
            });
        };

        use serde_json::json;

        push("server.host", "Server", json!(self.server.host), "CALMGATE_SERVER_HOST", false);
        push("server.port", "Server", json!(self.server.port), "CALMGATE_SERVER_PORT", false);
        push("server.cors_origins", "Server", json!(self.server.cors_origins), "CALMGATE_SERVER_CORS_ORIGINS", false);

        push("database.path", "Database", json!(self.database.path.display().to_string()), "CALMGATE_DATABASE_PATH", false);

        let ai = &self.ai;
        push("ai.router_mode", "AI", json!(ai.router_mode), "CALMGATE_AI_ROUTER_MODE", false);
        push("ai.model_primary", "AI", json!(ai.model_primary), "CALMGATE_AI_MODEL_PRIMARY", false);
        push("ai.model_deep", "AI", json!(ai.model_deep), "CALMGATE_AI_MODEL_DEEP", false);
        push("ai.max_tokens_quick", "AI", json!(ai.max_tokens_quick), "CALMGATE_AI_MAX_TOKENS_QUICK", false);
        push("ai.max_tokens_deep", "AI", json!(ai.max_tokens_deep), "CALMGATE_AI_MAX_TOKENS_DEEP", false);
        push("ai.soft_limit_usd", "AI", json!(ai.soft_limit_usd), "CALMGATE_AI_SOFT_LIMIT_USD", false);
        push("ai.daily_limit_usd", "AI", json!(ai.daily_limit_usd), "CALMGATE_AI_DAILY_LIMIT_USD", false);
        push("ai.cache_ttl_secs", "AI", json!(ai.cache_ttl_secs), "CALMGATE_AI_CACHE_TTL_SECS", false);
        push("ai.api_key", "AI", json!(ai.api_key), "CALMGATE_AI_API_KEY", true);
        push("ai.base_url", "AI", json!(ai.base_url), "CALMGATE_AI_BASE_URL", false);
        push("ai.request_timeout_secs", "AI", json!(ai.request_timeout_secs), "CALMGATE_AI_REQUEST_TIMEOUT_SECS", false);
        push("ai.default_locale", "AI", json!(ai.default_locale), "CALMGATE_AI_DEFAULT_LOCALE", false);
        push("ai.supported_locales", "AI", json!(ai.supported_locales), "CALMGATE_AI_SUPPORTED_LOCALES", false);
        push("ai.refresh_interval_secs", "AI", json!(ai.refresh_interval_secs), "CALMGATE_AI_REFRESH_INTERVAL_SECS", false);
        push(
            "ai.cache_sweep_interval_secs",
            "AI",
            json!(ai.cache_sweep_interval_secs),
            "CALMGATE_AI_CACHE_SWEEP_INTERVAL_SECS",
            false,
        );

        push("logging.level", "Logging", json!(self.logging.level), "CALMGATE_LOG_LEVEL", false);
        push("logging.json", "Logging", json!(self.logging.json), "CALMGATE_LOG_JSON", false);

        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-mutating tests each own distinct variables so they can run in parallel.

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8410);
        assert_eq!(config.database.path, PathBuf::from("calmgate.db"));
        assert_eq!(config.ai.router_mode, "auto");
        assert_eq!(config.ai.model_primary, "gpt-4-mini");
        assert_eq!(config.ai.model_deep, "gpt-4-turbo");
        assert_eq!(config.ai.max_tokens_quick, 120);
        assert_eq!(config.ai.max_tokens_deep, 400);
        assert_eq!(config.ai.soft_limit_usd, 0.35);
        assert_eq!(config.ai.daily_limit_usd, 0.50);
        assert_eq!(config.ai.cache_ttl_secs, 86_400);
        assert!(config.ai.api_key.is_none());
        assert_eq!(config.ai.supported_locales, vec!["ru", "en"]);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_credential_ignores_blank_key() {
        let mut ai = AiConfig::default();
        assert!(ai.credential().is_none());
        ai.api_key = Some("   ".into());
        assert!(ai.credential().is_none());
        ai.api_key = Some(" sk-live ".into());
        assert_eq!(ai.credential(), Some("sk-live"));
    }

    #[test]
    fn test_env_override_applies() {
        // SAFETY: this test is the only one touching these variables.
        unsafe {
            std::env::set_var("CALMGATE_AI_MODEL_DEEP", "gpt-4o");
            std::env::set_var("CALMGATE_AI_MAX_TOKENS_DEEP", "800");
            std::env::set_var("CALMGATE_AI_DAILY_LIMIT_USD", "not-a-number");
        }
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.ai.model_deep, "gpt-4o");
        assert_eq!(config.ai.max_tokens_deep, 800);
        assert_eq!(config.ai.daily_limit_usd, 0.50);
        assert!(config.env_overrides.is_overridden("ai.model_deep"));
        assert_eq!(
            config.env_overrides.env_var_for("ai.max_tokens_deep"),
            Some("CALMGATE_AI_MAX_TOKENS_DEEP")
        );
        assert!(!config.env_overrides.is_overridden("ai.daily_limit_usd"));
        unsafe {
            std::env::remove_var("CALMGATE_AI_MODEL_DEEP");
            std::env::remove_var("CALMGATE_AI_MAX_TOKENS_DEEP");
            std::env::remove_var("CALMGATE_AI_DAILY_LIMIT_USD");
        }
    }

    #[test]
    fn test_env_bool_variants() {
        for (val, expected) in [
            ("1", true),
            ("true", true),
            ("YES", true),
            ("on", true),
            ("0", false),
            ("false", false),
            ("nope", false),
        ] {
            // SAFETY: this test is the only one touching CALMGATE_LOG_JSON.
            unsafe { std::env::set_var("CALMGATE_LOG_JSON", val); }
            let mut config = Config::default();
            config.apply_env_overrides();
            assert_eq!(config.logging.json, expected, "CALMGATE_LOG_JSON={val}");
        }
        unsafe { std::env::remove_var("CALMGATE_LOG_JSON"); }
    }

    #[test]
    fn test_env_lists_split() {
        // SAFETY: this test is the only one touching these variables.
        unsafe {
            std::env::set_var("CALMGATE_SERVER_CORS_ORIGINS", "http://a.com, http://b.com,,");
            std::env::set_var("CALMGATE_AI_SUPPORTED_LOCALES", "ru,en,kk");
        }
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.server.cors_origins, vec!["http://a.com", "http://b.com"]);
        assert_eq!(config.ai.supported_locales, vec!["ru", "en", "kk"]);
        unsafe {
            std::env::remove_var("CALMGATE_SERVER_CORS_ORIGINS");
            std::env::remove_var("CALMGATE_AI_SUPPORTED_LOCALES");
        }
    }

    #[test]
    fn test_empty_api_key_env_clears_credential() {
        // SAFETY: this test is the only one touching CALMGATE_AI_API_KEY.
        unsafe { std::env::set_var("CALMGATE_AI_API_KEY", ""); }
        let mut config = Config::default();
        config.ai.api_key = Some("sk-file".into());
        config.apply_env_overrides();
        assert!(config.ai.api_key.is_none());
        unsafe { std::env::remove_var("CALMGATE_AI_API_KEY"); }
    }

    #[test]
    fn test_settings_report() {
        // SAFETY: this test is the only one touching CALMGATE_AI_BASE_URL.
        unsafe { std::env::set_var("CALMGATE_AI_BASE_URL", "http://proxy.local"); }
        let mut config = Config::default();
        config.ai.api_key = Some("sk-secret".into());
        config.apply_env_overrides();
        let report = config.settings_report();

        let sections: Vec<&str> = report.iter().map(|e| e.section.as_str()).collect();
        for section in ["Server", "Database", "AI", "Logging"] {
            assert!(sections.contains(&section), "missing section {section}");
        }
        for entry in &report {
            assert!(entry.env_var.starts_with("CALMGATE_"), "entry {} env var", entry.key);
        }

        let key = report.iter().find(|e| e.key == "ai.api_key").unwrap();
        assert!(key.sensitive);
        assert_eq!(key.value, serde_json::json!("********"));

        let base = report.iter().find(|e| e.key == "ai.base_url").unwrap();
        assert!(base.overridden);
        assert_eq!(base.value, serde_json::json!("http://proxy.local"));

        unsafe { std::env::remove_var("CALMGATE_AI_BASE_URL"); }
    }

    #[test]
    fn test_listen_addr() {
        assert_eq!(Config::default().listen_addr(), "127.0.0.1:8410");
    }

    #[test]
    fn test_config_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.server.port, 8410);
    }

    #[test]
    fn test_config_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calmgate.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 9000

[database]
path = "/var/lib/calmgate/calmgate.db"

[ai]
router_mode = "local_only"
soft_limit_usd = 1.5
daily_limit_usd = 2.0
cache_ttl_secs = 30

[logging]
level = "debug"
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.database.path, PathBuf::from("/var/lib/calmgate/calmgate.db"));
        assert_eq!(config.ai.router_mode, "local_only");
        assert_eq!(config.ai.soft_limit_usd, 1.5);
        assert_eq!(config.ai.daily_limit_usd, 2.0);
        assert_eq!(config.ai.cache_ttl_secs, 30);
        assert_eq!(config.ai.model_primary, "gpt-4-mini");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_config_load_rejects_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[ai\nrouter_mode = ").unwrap();
        assert!(Config::load(&path).is_err());
    }
}

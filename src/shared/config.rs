use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub dedup: DedupConfig,
    pub optimistic: OptimisticConfig,
    pub session: SessionConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    /// reqwest クライアント全体のタイムアウト（秒）。0 で無効
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    pub enabled: bool,
    /// 完了済みレスポンスのキャッシュ TTL。None ならキャッシュしない
    pub cache_ttl_ms: Option<u64>,
    pub max_cached_responses: usize,
    pub max_pending: usize,
    pub grace_period_ms: u64,
    pub stale_after_ms: u64,
    pub cleanup_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimisticConfig {
    pub success_retention_ms: u64,
    pub failure_retention_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub default_timeout_minutes: u64,
    pub remember_me_days: u64,
    pub refresh_buffer_secs: u64,
    pub check_interval_secs: u64,
    pub idle_window_secs: u64,
    pub sign_in_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    pub durable_file: String,
    pub collections_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: "http://localhost:8000/api".to_string(),
                request_timeout_secs: 30,
            },
            dedup: DedupConfig::default(),
            optimistic: OptimisticConfig::default(),
            session: SessionConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_ttl_ms: None,
            max_cached_responses: 100,
            max_pending: 50,
            grace_period_ms: 100,
            stale_after_ms: 30_000,
            cleanup_interval_ms: 60_000,
        }
    }
}

impl Default for OptimisticConfig {
    fn default() -> Self {
        Self {
            success_retention_ms: 1_000,
            failure_retention_ms: 3_000,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_timeout_minutes: 30,
            remember_me_days: 30,
            refresh_buffer_secs: 300, // 5 minutes
            check_interval_secs: 60,
            idle_window_secs: 300,
            sign_in_path: "/login".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .map(|dir| dir.join("careerhub"))
            .unwrap_or_else(|| PathBuf::from("./data"));
        Self {
            data_dir: data_dir.to_string_lossy().into_owned(),
            durable_file: "local_storage.json".to_string(),
            collections_url: "sqlite::memory:".to_string(),
        }
    }
}

impl DedupConfig {
    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_ms.map(Duration::from_millis)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }
}

impl OptimisticConfig {
    pub fn success_retention(&self) -> Duration {
        Duration::from_millis(self.success_retention_ms)
    }

    pub fn failure_retention(&self) -> Duration {
        Duration::from_millis(self.failure_retention_ms)
    }
}

impl SessionConfig {
    pub fn default_timeout_millis(&self) -> i64 {
        (self.default_timeout_minutes * 60 * 1000) as i64
    }

    pub fn remember_me_millis(&self) -> i64 {
        (self.remember_me_days * 24 * 60 * 60 * 1000) as i64
    }

    pub fn refresh_buffer_millis(&self) -> i64 {
        (self.refresh_buffer_secs * 1000) as i64
    }

    pub fn idle_window_millis(&self) -> i64 {
        (self.idle_window_secs * 1000) as i64
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

impl StorageConfig {
    pub fn durable_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.durable_file)
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        // 既定値
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("CAREERHUB_API_BASE_URL") {
            let trimmed = v.trim().trim_end_matches('/');
            if !trimmed.is_empty() {
                cfg.api.base_url = trimmed.to_string();
            }
        }
        if let Some(value) = env_u64("CAREERHUB_API_TIMEOUT_SECS") {
            cfg.api.request_timeout_secs = value;
        }

        // 重複排除の設定
        if let Ok(v) = std::env::var("CAREERHUB_DEDUP_ENABLED") {
            cfg.dedup.enabled = parse_bool(&v, cfg.dedup.enabled);
        }
        if let Some(value) = env_u64("CAREERHUB_DEDUP_CACHE_TTL_MS") {
            cfg.dedup.cache_ttl_ms = if value == 0 { None } else { Some(value) };
        }
        if let Some(value) = env_u64("CAREERHUB_DEDUP_MAX_PENDING") {
            cfg.dedup.max_pending = (value as usize).max(1);
        }
        if let Some(value) = env_u64("CAREERHUB_DEDUP_STALE_AFTER_MS") {
            cfg.dedup.stale_after_ms = value.max(1);
        }
        if let Some(value) = env_u64("CAREERHUB_DEDUP_CLEANUP_INTERVAL_MS") {
            cfg.dedup.cleanup_interval_ms = value.max(1);
        }

        // セッションの設定
        if let Some(value) = env_u64("CAREERHUB_SESSION_TIMEOUT_MINUTES") {
            cfg.session.default_timeout_minutes = value.max(1);
        }
        if let Some(value) = env_u64("CAREERHUB_REMEMBER_ME_DAYS") {
            cfg.session.remember_me_days = value.max(1);
        }
        if let Some(value) = env_u64("CAREERHUB_REFRESH_BUFFER_SECS") {
            cfg.session.refresh_buffer_secs = value;
        }
        if let Some(value) = env_u64("CAREERHUB_SESSION_CHECK_INTERVAL_SECS") {
            cfg.session.check_interval_secs = value.max(1);
        }

        if let Ok(v) = std::env::var("CAREERHUB_DATA_DIR") {
            if !v.trim().is_empty() {
                cfg.storage.data_dir = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var("CAREERHUB_COLLECTIONS_URL") {
            if !v.trim().is_empty() {
                cfg.storage.collections_url = v.trim().to_string();
            }
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.api.base_url.trim().is_empty() {
            return Err("API base_url must not be empty".to_string());
        }
        if self.dedup.max_pending == 0 {
            return Err("Dedup max_pending must be greater than 0".to_string());
        }
        if self.dedup.cleanup_interval_ms == 0 {
            return Err("Dedup cleanup_interval_ms must be greater than 0".to_string());
        }
        if self.dedup.cache_ttl_ms.is_some() && self.dedup.max_cached_responses == 0 {
            return Err("Dedup max_cached_responses must be greater than 0".to_string());
        }
        if self.session.default_timeout_minutes == 0 {
            return Err("Session default_timeout_minutes must be greater than 0".to_string());
        }
        if self.session.check_interval_secs == 0 {
            return Err("Session check_interval_secs must be greater than 0".to_string());
        }
        Ok(())
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| parse_u64(&v))
}

fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {name}")]
    Invalid { name: &'static str, value: String },
}

/// 远程存储连接参数，只有 URL 和令牌都存在时才会构造
#[derive(Debug, Clone)]
pub struct RemoteStoreConfig {
    pub url: String,
    pub token: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub remote_store: Option<RemoteStoreConfig>,
    pub translate_rate_limit: u32,
    pub translate_rate_window_secs: u64,
    pub analyze_rate_limit: u32,
    pub analyze_rate_window_secs: u64,
    pub cache_ttl_secs: u64,
    pub translate_upstream_url: Option<String>,
    pub analyze_upstream_url: Option<String>,
    pub upstream_timeout_secs: u64,
    pub status_secret: Option<String>,
    /// 允许作为限流身份的 API key，逗号分隔
    pub api_keys: Vec<String>,
    /// 是否信任 x-real-ip / x-forwarded-for，只有部署在反向代理后面时才应打开
    pub trust_proxy: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// 从任意键值来源读取配置，测试时不需要修改进程环境
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let remote_store = match (non_empty("REMOTE_STORE_URL"), non_empty("REMOTE_STORE_TOKEN")) {
            (Some(url), Some(token)) => Some(RemoteStoreConfig {
                url,
                token,
                timeout: Duration::from_millis(parse_or(
                    &lookup,
                    "REMOTE_STORE_TIMEOUT_MS",
                    2000u64,
                )?),
            }),
            _ => None,
        };

        Ok(Config {
            server_host: non_empty("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            server_port: parse_or(&lookup, "SERVER_PORT", 3000)?,
            api_base_uri: non_empty("API_BASE_URI").unwrap_or_else(|| "/api".to_string()),
            remote_store,
            translate_rate_limit: parse_or(&lookup, "TRANSLATE_RATE_LIMIT", 10)?,
            translate_rate_window_secs: parse_or(&lookup, "TRANSLATE_RATE_WINDOW", 60)?,
            analyze_rate_limit: parse_or(&lookup, "ANALYZE_RATE_LIMIT", 5)?,
            analyze_rate_window_secs: parse_or(&lookup, "ANALYZE_RATE_WINDOW", 60)?,
            cache_ttl_secs: parse_or(&lookup, "CACHE_TTL_SECS", 3600)?,
            translate_upstream_url: non_empty("TRANSLATE_UPSTREAM_URL"),
            analyze_upstream_url: non_empty("ANALYZE_UPSTREAM_URL"),
            upstream_timeout_secs: parse_or(&lookup, "UPSTREAM_TIMEOUT_SECS", 30)?,
            status_secret: non_empty("STATUS_SECRET"),
            api_keys: non_empty("API_KEYS")
                .map(|keys| {
                    keys.split(',')
                        .map(str::trim)
                        .filter(|k| !k.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            trust_proxy: parse_or(&lookup, "TRUST_PROXY", false)?,
        })
    }

    pub fn translate_rate_window(&self) -> Duration {
        Duration::from_secs(self.translate_rate_window_secs)
    }

    pub fn analyze_rate_window(&self) -> Duration {
        Duration::from_secs(self.analyze_rate_window_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name).map(|v| v.trim().to_string()) {
        None => Ok(default),
        Some(v) if v.is_empty() => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::Invalid { name, value: v }),
    }
}

use std::time::Duration;

use cache::HashedCache;
use config::Config;
use rate_limit::Limiters;
use store::{StoreError, StoreGate};

pub mod cache;
pub mod config;
pub mod error;
pub mod middleware;
pub mod rate_limit;
pub mod router;
pub mod routes;
pub mod store;
pub mod utils;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub gate: StoreGate,
    pub cache: HashedCache,
    pub limiters: Limiters,
    pub http: reqwest::Client,
}

impl AppState {
    /// 按配置构造远程存储开关，再把它注入缓存和限流器
    pub fn from_config(config: Config) -> Result<Self, StoreError> {
        let gate = StoreGate::from_config(config.remote_store.as_ref())?;
        Self::with_gate(config, gate)
    }

    pub fn with_gate(config: Config, gate: StoreGate) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(config.upstream_timeout())
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            cache: HashedCache::new(gate.clone()),
            limiters: Limiters::from_config(&config, &gate),
            gate,
            http,
            config,
        })
    }
}

use std::sync::Arc;

use super::client::RemoteStoreClient;
use super::error::StoreError;
use crate::config::RemoteStoreConfig;

/// 远程存储是否可用，进程启动时确定一次
///
/// 缓存和限流在每次远程调用前都通过它判断，没有配置时直接走本地降级路径。
#[derive(Debug, Clone, Default)]
pub struct StoreGate {
    client: Option<Arc<RemoteStoreClient>>,
}

impl StoreGate {
    pub fn from_config(config: Option<&RemoteStoreConfig>) -> Result<Self, StoreError> {
        match config {
            Some(config) => {
                tracing::info!("Remote store enabled at {}", config.url);
                Ok(Self::remote(RemoteStoreClient::new(config)?))
            }
            None => {
                tracing::info!("Remote store not configured, using in-process fallback");
                Ok(Self::disabled())
            }
        }
    }

    pub fn remote(client: RemoteStoreClient) -> Self {
        Self {
            client: Some(Arc::new(client)),
        }
    }

    pub fn disabled() -> Self {
        Self { client: None }
    }

    pub fn is_remote_available(&self) -> bool {
        self.client.is_some()
    }

    pub fn client(&self) -> Option<&RemoteStoreClient> {
        self.client.as_deref()
    }
}

use thiserror::Error;

/// 远程存储调用失败的原因
///
/// 这些错误只在 `store` 模块内部和调用方边界之间传递，
/// 缓存与限流组件会把它们吞掉并降级，不会传到请求路径上。
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("remote store transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("remote store returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("remote store command failed: {0}")]
    Command(String),

    #[error("malformed remote store payload: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Decode(e.to_string())
    }
}

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::StoreError;
use crate::config::RemoteStoreConfig;

/// 一条远程存储命令：命令名加参数，全部以字符串形式发送
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Command(Vec<String>);

impl Command {
    pub fn new(name: &str) -> Self {
        Command(vec![name.to_string()])
    }

    pub fn arg(mut self, arg: impl ToString) -> Self {
        self.0.push(arg.to_string());
        self
    }
}

/// 管道响应中的一项，与提交的命令按位置一一对应
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineEntry {
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<String>,
}

impl PipelineEntry {
    pub fn into_result(self) -> Result<Value, StoreError> {
        match self.error {
            Some(e) => Err(StoreError::Command(e)),
            None => Ok(self.result),
        }
    }
}

/// `incr_window` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    pub count: i64,
    /// 键剩余的存活秒数，键不存在或没有过期时间时为负数
    pub ttl_secs: i64,
}

/// 通过 HTTP 管道协议访问远程键值存储的客户端
///
/// 不做缓存、不做重试，每次调用就是一次 POST。
#[derive(Debug, Clone)]
pub struct RemoteStoreClient {
    http: reqwest::Client,
    endpoint: String,
    token: String,
}

impl RemoteStoreClient {
    pub fn new(config: &RemoteStoreConfig) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout.min(Duration::from_secs(1)))
            .build()?;

        Ok(Self {
            http,
            endpoint: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    /// 一次往返发送所有命令，结果顺序与提交顺序一致
    pub async fn execute(&self, commands: &[Command]) -> Result<Vec<PipelineEntry>, StoreError> {
        let response = self
            .http
            .post(format!("{}/pipeline", self.endpoint))
            .bearer_auth(&self.token)
            .json(commands)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        let entries: Vec<PipelineEntry> = serde_json::from_slice(&bytes)?;

        if entries.len() != commands.len() {
            return Err(StoreError::Decode(format!(
                "expected {} pipeline results, got {}",
                commands.len(),
                entries.len()
            )));
        }

        Ok(entries)
    }

    pub async fn get_json(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let entries = self.execute(&[Command::new("GET").arg(key)]).await?;
        let value = first(entries)?.into_result()?;

        match value {
            Value::Null => Ok(None),
            // 有的存储会直接返回已经反序列化的结构
            Value::String(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            other => Ok(Some(other)),
        }
    }

    pub async fn set_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> Result<(), StoreError> {
        let payload = serde_json::to_string(value)?;
        let command = Command::new("SET")
            .arg(key)
            .arg(payload)
            .arg("EX")
            .arg(ttl_secs);

        let entries = self.execute(&[command]).await?;
        first(entries)?.into_result()?;
        Ok(())
    }

    /// 计数加一，仅在键没有过期时间时设置过期时间，并读取剩余时间
    ///
    /// 三条命令合并成一次往返，避免多进程之间先读后写的竞争。
    pub async fn incr_window(&self, key: &str, window_secs: u64) -> Result<WindowCount, StoreError> {
        let commands = [
            Command::new("INCR").arg(key),
            Command::new("EXPIRE").arg(key).arg(window_secs).arg("NX"),
            Command::new("TTL").arg(key),
        ];

        let mut results = Vec::with_capacity(commands.len());
        for entry in self.execute(&commands).await? {
            results.push(entry.into_result()?);
        }

        let count = as_integer(&results[0])
            .ok_or_else(|| StoreError::Decode(format!("INCR returned {}", results[0])))?;
        let ttl_secs = as_integer(&results[2])
            .ok_or_else(|| StoreError::Decode(format!("TTL returned {}", results[2])))?;

        Ok(WindowCount { count, ttl_secs })
    }
}

fn first(entries: Vec<PipelineEntry>) -> Result<PipelineEntry, StoreError> {
    entries
        .into_iter()
        .next()
        .ok_or_else(|| StoreError::Decode("empty pipeline response".to_string()))
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

// 远程键值存储模块
// 包含管道协议客户端和可用性开关

pub mod client;
pub mod error;
pub mod gate;

pub use client::{Command, PipelineEntry, RemoteStoreClient, WindowCount};
pub use error::StoreError;
pub use gate::StoreGate;

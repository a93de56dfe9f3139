// 缓存模块
// 哈希键的 JSON 响应缓存，后端是远程键值存储

pub mod hashed;
pub mod keys;

pub use hashed::{CacheLookup, CacheWrite, HashedCache};
pub use keys::build_key;

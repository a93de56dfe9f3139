use sha2::{Digest, Sha256};

/// 生成缓存键：`<prefix>:<sha256 十六进制>`
///
/// 原始键可能是完整的请求体，哈希后长度固定、字符集安全，
/// 相同的原始键总是得到相同的缓存键。
pub fn build_key(prefix: &str, raw_key: &str) -> String {
    let digest = Sha256::digest(raw_key.as_bytes());
    format!("{}:{}", prefix, hex::encode(digest))
}

//! 标识符生成
//!
//! - 订阅、事件使用短 ID：8 位 62 进制字符串，带用途前缀
//! - 请求使用 UUID v4，便于跨日志追踪

use rand::Rng;

/// 62 进制字符集
const BASE62_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// 短 ID 随机部分长度
const SHORT_ID_LENGTH: usize = 8;

/// 生成带前缀的短 ID，例如 `sub_4fZ0aQ9k`
///
/// ```
/// use cms_core::utils::id::short_id;
///
/// let id = short_id("sub");
/// assert!(id.starts_with("sub_"));
/// assert_eq!(id.len(), "sub_".len() + 8);
/// ```
pub fn short_id(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let random: String = (0..SHORT_ID_LENGTH)
        .map(|_| BASE62_CHARS[rng.gen_range(0..BASE62_CHARS.len())] as char)
        .collect();
    format!("{}_{}", prefix, random)
}

/// 生成请求 ID（UUID v4）
pub fn request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_short_id_format() {
        let id = short_id("evt");
        let (prefix, body) = id.split_once('_').unwrap();
        assert_eq!(prefix, "evt");
        assert_eq!(body.len(), SHORT_ID_LENGTH);
        assert!(body.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_short_id_uniqueness() {
        let mut ids = HashSet::new();
        for _ in 0..1000 {
            assert!(ids.insert(short_id("sub")), "ID collision detected");
        }
    }

    #[test]
    fn test_request_id() {
        let id = request_id();
        assert_eq!(id.len(), 36);
        assert!(id.contains('-'));
    }
}

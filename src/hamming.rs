use std::fmt;
use std::sync::Arc;

/// 64 位图片指纹，由外部的感知哈希算法计算
pub type Fingerprint = u64;

/// 默认相似阈值，两个 dHash 的汉明距离不超过 10 时视为相似
pub const DEFAULT_THRESHOLD: u32 = 10;

/// 指纹距离的度量方式
pub trait Distance: Send + Sync {
    fn distance(&self, a: Fingerprint, b: Fingerprint) -> u32;
}

/// 汉明距离
#[derive(Debug, Clone, Copy, Default)]
pub struct HammingDistance;

impl Distance for HammingDistance {
    #[inline(always)]
    fn distance(&self, a: Fingerprint, b: Fingerprint) -> u32 {
        hamming(a, b)
    }
}

#[inline(always)]
pub fn hamming(a: Fingerprint, b: Fingerprint) -> u32 {
    (a ^ b).count_ones()
}

/// 相似度判定的配置：度量方式和阈值
#[derive(Clone)]
pub struct SimilarityConfig {
    pub threshold: u32,
    pub metric: Arc<dyn Distance>,
}

impl SimilarityConfig {
    pub fn new(threshold: u32) -> Self {
        Self { threshold, metric: Arc::new(HammingDistance) }
    }

    pub fn with_metric(threshold: u32, metric: Arc<dyn Distance>) -> Self {
        Self { threshold, metric }
    }

    /// 比较两个指纹，在阈值以内时返回置信度 `(τ + 1 - d) / (τ + 1)`
    pub fn score(&self, a: Fingerprint, b: Fingerprint) -> Option<f32> {
        let d = self.metric.distance(a, b);
        if d > self.threshold {
            return None;
        }
        let t = (self.threshold + 1) as f32;
        Some((t - d as f32) / t)
    }
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl fmt::Debug for SimilarityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimilarityConfig").field("threshold", &self.threshold).finish()
    }
}

/// 指纹在数据库中按 8 字节大端序存储
pub fn decode_fingerprint(bytes: &[u8]) -> Option<Fingerprint> {
    let bytes: [u8; 8] = bytes.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

pub fn encode_fingerprint(fingerprint: Fingerprint) -> [u8; 8] {
    fingerprint.to_be_bytes()
}

/// 解析 16 位十六进制表示的指纹
pub fn parse_fingerprint(s: &str) -> anyhow::Result<Fingerprint> {
    let s = s.trim_start_matches("0x");
    if s.len() != 16 {
        return Err(anyhow::anyhow!("指纹必须是 16 位十六进制数: {}", s));
    }
    Ok(u64::from_str_radix(s, 16)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hamming_identical() {
        assert_eq!(hamming(0xdead_beef, 0xdead_beef), 0);
    }

    #[test]
    fn test_hamming_all_different() {
        assert_eq!(hamming(0, u64::MAX), 64);
    }

    #[test]
    fn test_hamming_single_bit() {
        assert_eq!(hamming(0, 1 << 17), 1);
    }

    #[test]
    fn test_score_within_threshold() {
        let config = SimilarityConfig::default();
        assert_eq!(config.score(0, 0), Some(1.0));
        // 10 个比特不同，恰好在阈值上
        let score = config.score(0, 0x3ff).unwrap();
        assert!((score - 1.0 / 11.0).abs() < 1e-6);
        // 11 个比特不同
        assert_eq!(config.score(0, 0x7ff), None);
    }

    #[test]
    fn test_custom_metric() {
        struct Never;
        impl Distance for Never {
            fn distance(&self, _: Fingerprint, _: Fingerprint) -> u32 {
                u32::MAX
            }
        }
        let config = SimilarityConfig::with_metric(64, Arc::new(Never));
        assert_eq!(config.score(1, 1), None);
    }

    #[test]
    fn test_fingerprint_codec() {
        let fp = 0x0123_4567_89ab_cdef;
        assert_eq!(decode_fingerprint(&encode_fingerprint(fp)), Some(fp));
        assert_eq!(decode_fingerprint(&[1, 2, 3]), None);
        assert_eq!(parse_fingerprint("0123456789abcdef").unwrap(), fp);
        assert_eq!(parse_fingerprint("0x0123456789abcdef").unwrap(), fp);
        assert!(parse_fingerprint("12").is_err());
    }
}

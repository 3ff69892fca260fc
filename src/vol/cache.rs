use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

/// 输入指纹策略：由计算名与序列化后的输入内容派生缓存键
///
/// 键只取决于输入的值，与对象身份无关。
pub trait InputFingerprint: Send + Sync {
    fn fingerprint(&self, calc: &str, payload: &[u8]) -> String;
}

/// SHA-256 内容指纹（默认实现）
#[derive(Debug, Default)]
pub struct Sha256Fingerprint;

impl InputFingerprint for Sha256Fingerprint {
    fn fingerprint(&self, calc: &str, payload: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(calc.as_bytes());
        hasher.update(b":");
        hasher.update(payload);
        format!("{}:{}", calc, hex::encode(hasher.finalize()))
    }
}

/// 缓存统计
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub cache_size: usize,
    /// 命中次数 / 查询总次数，清空缓存不重置计数
    pub cache_hit_rate: f64,
    /// 最近一次实际执行计算的时刻
    pub last_calculation: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, serde_json::Value>,
    hits: u64,
    misses: u64,
    last_calculation: Option<DateTime<Utc>>,
}

/// 计算结果缓存
///
/// 键为输入内容指纹，值为结果的 JSON 形式。不做自动过期，
/// 生命周期与引擎实例一致，由 clear 显式清空。
pub struct ResultCache {
    state: Mutex<CacheState>,
    fingerprint: Box<dyn InputFingerprint>,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultCache {
    pub fn new() -> Self {
        Self::with_fingerprint(Box::new(Sha256Fingerprint))
    }

    /// 注入自定义指纹策略
    pub fn with_fingerprint(fingerprint: Box<dyn InputFingerprint>) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            fingerprint,
        }
    }

    /// 命中则返回缓存结果，未命中则执行计算并写入
    pub fn get_or_compute<T, E, F>(
        &self,
        calc: &str,
        payload: &[u8],
        now: DateTime<Utc>,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, E>,
    {
        let key = self.fingerprint.fingerprint(calc, payload);
        {
            let mut state = self.state();
            if let Some(value) = state.entries.get(&key) {
                if let Ok(cached) = serde_json::from_value::<T>(value.clone()) {
                    state.hits += 1;
                    debug!("缓存命中: {}", key);
                    return Ok(cached);
                }
            }
        }

        let result = compute()?;

        let mut state = self.state();
        state.misses += 1;
        state.last_calculation = Some(now);
        if let Ok(value) = serde_json::to_value(&result) {
            state.entries.insert(key, value);
        }
        Ok(result)
    }

    /// 清空全部缓存条目
    pub fn clear(&self) {
        let mut state = self.state();
        state.entries.clear();
        debug!("结果缓存已清空");
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state();
        let total = state.hits + state.misses;
        let cache_hit_rate = if total == 0 {
            0.0
        } else {
            state.hits as f64 / total as f64
        };
        CacheStats {
            cache_size: state.entries.len(),
            cache_hit_rate,
            last_calculation: state.last_calculation,
        }
    }

    // 锁中毒时直接取回内部状态，缓存内容仍是一致的
    fn state(&self) -> MutexGuard<'_, CacheState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::time_util::{Clock, SystemClock};
use crate::vol::cache::{CacheStats, ResultCache};
use crate::vol::indicator::vix_correlation::CorrelationCutoffs;
use crate::vol::indicator::{atr, bollinger, iv_percentile, vix_correlation, CalcError};
use crate::vol::model::{
    AtrResult, BollingerBandsResult, IvPercentileResult, PriceBar, VixCorrelationResult,
    VolatilityAnalysis, VolatilityBar,
};
use crate::vol::regime::{classify_regime, RegimeThresholds};

/// 计算引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// analyze 使用的 ATR 周期
    pub atr_period: usize,
    /// analyze 使用的布林带周期
    pub bollinger_period: usize,
    /// 布林带标准差倍数
    pub bollinger_k: f64,
    /// VIX 相关性窗口
    pub vix_window: usize,
    /// squeeze 历史不足时的绝对带宽阈值
    pub squeeze_bandwidth_floor: f64,
    pub correlation_cutoffs: CorrelationCutoffs,
    pub regime: RegimeThresholds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            atr_period: 14,
            bollinger_period: 20,
            bollinger_k: 2.0,
            vix_window: 30,
            squeeze_bandwidth_floor: 0.03,
            correlation_cutoffs: CorrelationCutoffs::default(),
            regime: RegimeThresholds::default(),
        }
    }
}

/// 波动率计算引擎
///
/// 四项指标计算都是纯函数，引擎在其上叠加内容寻址的结果缓存：
/// 相同输入直接复用缓存结果，不同输入各自计算互不干扰。
pub struct VolatilityEngine {
    config: EngineConfig,
    cache: ResultCache,
    clock: Arc<dyn Clock>,
}

impl VolatilityEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_cache(config, clock, ResultCache::new())
    }

    /// 完全注入的构造方式，缓存指纹策略由 ResultCache 自带
    pub fn with_cache(config: EngineConfig, clock: Arc<dyn Clock>, cache: ResultCache) -> Self {
        Self {
            config,
            cache,
            clock,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// IV 百分位排名
    pub fn iv_percentile(
        &self,
        current_iv: f64,
        history: &[VolatilityBar],
    ) -> Result<IvPercentileResult, CalcError> {
        self.cached("iv_percentile", &(current_iv, history), || {
            iv_percentile::iv_percentile(current_iv, history)
        })
    }

    /// Wilder ATR
    pub fn atr(&self, bars: &[PriceBar], period: usize) -> Result<AtrResult, CalcError> {
        self.cached("atr", &(bars, period), || atr::atr(bars, period))
    }

    /// 布林带
    pub fn bollinger_bands(
        &self,
        bars: &[PriceBar],
        period: usize,
        k: f64,
    ) -> Result<BollingerBandsResult, CalcError> {
        self.cached("bollinger_bands", &(bars, period, k), || {
            bollinger::bollinger_bands(bars, period, k, self.config.squeeze_bandwidth_floor)
        })
    }

    /// 标的与 VIX 的滚动相关性
    pub fn vix_correlation(
        &self,
        security: &[PriceBar],
        vix: &[PriceBar],
        window: usize,
    ) -> Result<VixCorrelationResult, CalcError> {
        self.cached("vix_correlation", &(security, vix, window), || {
            vix_correlation::vix_correlation(security, vix, window, self.config.correlation_cutoffs)
        })
    }

    /// 按配置周期完成一次完整分析并给出市场状态
    ///
    /// 当前 IV 取波动率序列中最近一条有效观测（iv>0）。
    pub fn analyze(
        &self,
        symbol: &str,
        prices: &[PriceBar],
        volatility: &[VolatilityBar],
        vix: &[PriceBar],
    ) -> Result<VolatilityAnalysis, CalcError> {
        let current_iv = volatility
            .iter()
            .rev()
            .find(|bar| bar.implied_volatility > 0.0)
            .map(|bar| bar.implied_volatility)
            .ok_or(CalcError::NoValidIvData)?;

        let iv = self.iv_percentile(current_iv, volatility)?;
        let atr = self.atr(prices, self.config.atr_period)?;
        let bollinger = self.bollinger_bands(prices, self.config.bollinger_period, self.config.bollinger_k)?;
        let vix_correlation = self.vix_correlation(prices, vix, self.config.vix_window)?;
        let market_regime = classify_regime(&iv, &atr, &bollinger, &self.config.regime);

        debug!(
            "分析完成: {} 百分位{:.1} 状态{:?}",
            symbol, iv.percentile, market_regime
        );

        Ok(VolatilityAnalysis {
            symbol: symbol.to_string(),
            timestamp: self.clock.now(),
            iv_percentile: iv,
            atr,
            bollinger,
            vix_correlation,
            market_regime,
        })
    }

    /// 清空结果缓存
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// 输入可序列化时走缓存，含非有限数值等无法序列化时跳过缓存直接计算
    fn cached<I, T, F>(&self, calc: &str, input: &I, compute: F) -> Result<T, CalcError>
    where
        I: Serialize,
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, CalcError>,
    {
        match serde_json::to_vec(input) {
            Ok(payload) => self
                .cache
                .get_or_compute(calc, &payload, self.clock.now(), compute),
            Err(_) => compute(),
        }
    }
}

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// 日线价格数据
///
/// 按日期升序排列，同一标的内日期唯一由调用方保证。
/// 价格为0或负数的脏数据不做校验，各项计算保证不因其崩溃。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<u64>,
}

/// 日线波动率观测
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityBar {
    pub date: NaiveDate,
    /// 隐含波动率，小数表示（0.25 即 25%）
    pub implied_volatility: f64,
    /// 历史波动率，小数表示
    pub historical_volatility: f64,
    pub symbol: String,
}

/// IV 历史分布区间
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRange {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

/// IV 区域划分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IvZone {
    Low,
    Medium,
    High,
    Extreme,
}

impl IvZone {
    /// 按百分位划分：<25 低、<50 中、<75 高、其余极端
    pub fn from_percentile(percentile: f64) -> Self {
        if percentile < 25.0 {
            IvZone::Low
        } else if percentile < 50.0 {
            IvZone::Medium
        } else if percentile < 75.0 {
            IvZone::High
        } else {
            IvZone::Extreme
        }
    }
}

/// IV 百分位计算结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IvPercentileResult {
    pub current: f64,
    /// 百分位，0-100
    pub percentile: f64,
    pub historical_range: HistoricalRange,
    pub zone: IvZone,
}

/// ATR 趋势方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

/// ATR 计算结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtrResult {
    pub value: f64,
    pub period: usize,
    pub trend: TrendDirection,
    /// 当前 ATR 相对更长基准期 ATR 的比值，>1 代表波动抬升
    pub historical_comparison: f64,
}

/// 布林带计算结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BollingerBandsResult {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    /// (上轨-下轨)/中轨，中轨接近0时取0
    pub bandwidth: f64,
    /// 最新收盘价在带内的位置，0=下轨 1=上轨，带宽为0时取0.5
    pub position: f64,
    pub squeeze: bool,
}

/// 相关性强弱
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationStrength {
    Weak,
    Moderate,
    Strong,
}

/// 相关性方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationDirection {
    Positive,
    Negative,
}

/// VIX 相关性计算结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VixCorrelationResult {
    /// Pearson 相关系数，[-1, 1]
    pub correlation: f64,
    pub strength: CorrelationStrength,
    pub direction: CorrelationDirection,
    /// 更长基准窗口上的相关系数
    pub historical_average: f64,
}

/// 市场状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarketRegime {
    LowVol,
    Normal,
    HighVol,
    Crisis,
}

/// 单标的一次完整波动率分析的汇总结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityAnalysis {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub iv_percentile: IvPercentileResult,
    pub atr: AtrResult,
    pub bollinger: BollingerBandsResult,
    pub vix_correlation: VixCorrelationResult,
    pub market_regime: MarketRegime,
}

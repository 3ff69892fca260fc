use serde::{Deserialize, Serialize};

use crate::vol::model::{
    AtrResult, BollingerBandsResult, IvPercentileResult, MarketRegime, TrendDirection,
};

/// 市场状态判定的权重与阈值配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeThresholds {
    /// IV 百分位分量权重
    pub iv_weight: f64,
    /// 布林带宽分量权重
    pub band_weight: f64,
    /// ATR 趋势分量权重
    pub atr_weight: f64,
    /// 视为"宽带"的带宽参考值，带宽分量在此处封顶
    pub wide_bandwidth_ref: f64,
    /// 视为"窄带"的带宽上限，低IV叠加窄带直接判定低波动
    pub narrow_bandwidth_ref: f64,
    /// 综合分达到该值（且IV处于极端高位）判定危机
    pub crisis_score: f64,
    /// 综合分达到该值判定高波动
    pub high_vol_score: f64,
    /// 综合分达到该值判定正常，否则低波动
    pub normal_score: f64,
}

impl Default for RegimeThresholds {
    fn default() -> Self {
        Self {
            iv_weight: 0.5,
            band_weight: 0.3,
            atr_weight: 0.2,
            wide_bandwidth_ref: 0.10,
            narrow_bandwidth_ref: 0.03,
            crisis_score: 0.8,
            high_vol_score: 0.55,
            normal_score: 0.25,
        }
    }
}

/// 综合 IV 百分位、布林带宽、ATR 趋势判定市场状态
///
/// 三个分量各自归一化到 [0,1] 后加权求和。两条硬性规则优先于加权分：
/// 极端高IV（百分位≥90）叠加宽带必判危机，
/// 低IV（百分位<25）叠加收窄（squeeze 或窄带）必判低波动。
/// 相同输入必得相同结论。
pub fn classify_regime(
    iv: &IvPercentileResult,
    atr: &AtrResult,
    bollinger: &BollingerBandsResult,
    cfg: &RegimeThresholds,
) -> MarketRegime {
    let iv_score = (iv.percentile / 100.0).clamp(0.0, 1.0);
    let band_score = if bollinger.squeeze {
        0.0
    } else {
        (bollinger.bandwidth / cfg.wide_bandwidth_ref).clamp(0.0, 1.0)
    };
    let atr_score = match atr.trend {
        TrendDirection::Increasing => 1.0,
        TrendDirection::Stable => 0.5,
        TrendDirection::Decreasing => 0.0,
    };

    if iv.percentile >= 90.0 && band_score >= 0.75 {
        return MarketRegime::Crisis;
    }
    if iv.percentile < 25.0
        && (bollinger.squeeze || bollinger.bandwidth <= cfg.narrow_bandwidth_ref)
    {
        return MarketRegime::LowVol;
    }

    let score = cfg.iv_weight * iv_score + cfg.band_weight * band_score + cfg.atr_weight * atr_score;

    if score >= cfg.crisis_score && iv.percentile >= 90.0 {
        MarketRegime::Crisis
    } else if score >= cfg.high_vol_score {
        MarketRegime::HighVol
    } else if score >= cfg.normal_score {
        MarketRegime::Normal
    } else {
        MarketRegime::LowVol
    }
}

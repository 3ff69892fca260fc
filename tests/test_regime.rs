use vol_quant::vol::model::{
    AtrResult, BollingerBandsResult, HistoricalRange, IvPercentileResult, IvZone, MarketRegime,
    TrendDirection,
};
use vol_quant::vol::regime::{classify_regime, RegimeThresholds};

fn iv(percentile: f64) -> IvPercentileResult {
    IvPercentileResult {
        current: 0.3,
        percentile,
        historical_range: HistoricalRange {
            min: 0.1,
            max: 0.6,
            mean: 0.3,
        },
        zone: IvZone::from_percentile(percentile),
    }
}

fn atr(trend: TrendDirection) -> AtrResult {
    AtrResult {
        value: 2.0,
        period: 14,
        trend,
        historical_comparison: 1.0,
    }
}

fn boll(bandwidth: f64, squeeze: bool) -> BollingerBandsResult {
    BollingerBandsResult {
        upper: 110.0,
        middle: 100.0,
        lower: 90.0,
        bandwidth,
        position: 0.5,
        squeeze,
    }
}

#[test]
fn test_extreme_iv_with_wide_bands_is_crisis() {
    // 硬性规则：加权分只有0.715，仍判危机
    let cfg = RegimeThresholds::default();
    let regime = classify_regime(
        &iv(95.0),
        &atr(TrendDirection::Decreasing),
        &boll(0.08, false),
        &cfg,
    );
    assert_eq!(regime, MarketRegime::Crisis);
}

#[test]
fn test_low_iv_with_squeeze_is_low_vol() {
    // ATR上升把加权分推到Normal档，硬性规则仍优先
    let cfg = RegimeThresholds::default();
    let regime = classify_regime(
        &iv(10.0),
        &atr(TrendDirection::Increasing),
        &boll(0.05, true),
        &cfg,
    );
    assert_eq!(regime, MarketRegime::LowVol);
}

#[test]
fn test_low_iv_with_narrow_bands_is_low_vol() {
    let cfg = RegimeThresholds::default();
    let regime = classify_regime(
        &iv(20.0),
        &atr(TrendDirection::Increasing),
        &boll(0.02, false),
        &cfg,
    );
    assert_eq!(regime, MarketRegime::LowVol);
}

#[test]
fn test_high_score_without_extreme_iv_caps_at_high_vol() {
    // 加权分0.87超过危机线，但百分位不足90，封顶HighVol
    let cfg = RegimeThresholds::default();
    let regime = classify_regime(
        &iv(80.0),
        &atr(TrendDirection::Increasing),
        &boll(0.09, false),
        &cfg,
    );
    assert_eq!(regime, MarketRegime::HighVol);
}

#[test]
fn test_extreme_iv_with_high_score_is_crisis() {
    // 带宽分0.7不满足硬性规则，但加权分0.87叠加百分位92走危机档
    let cfg = RegimeThresholds::default();
    let regime = classify_regime(
        &iv(92.0),
        &atr(TrendDirection::Increasing),
        &boll(0.07, false),
        &cfg,
    );
    assert_eq!(regime, MarketRegime::Crisis);
}

#[test]
fn test_mid_everything_is_normal() {
    // 0.5*0.5 + 0.3*0.5 + 0.2*0.5 = 0.5，落在Normal档
    let cfg = RegimeThresholds::default();
    let regime = classify_regime(
        &iv(50.0),
        &atr(TrendDirection::Stable),
        &boll(0.05, false),
        &cfg,
    );
    assert_eq!(regime, MarketRegime::Normal);
}

#[test]
fn test_low_score_is_low_vol() {
    // 百分位30不触发硬性规则，加权分0.15按阶梯落入LowVol
    let cfg = RegimeThresholds::default();
    let regime = classify_regime(
        &iv(30.0),
        &atr(TrendDirection::Decreasing),
        &boll(0.0, false),
        &cfg,
    );
    assert_eq!(regime, MarketRegime::LowVol);
}

#[test]
fn test_squeeze_zeroes_band_score() {
    // squeeze时带宽分强制为0：同样的宽带，结论从HighVol降为Normal
    let cfg = RegimeThresholds::default();
    let open = classify_regime(&iv(60.0), &atr(TrendDirection::Increasing), &boll(0.09, false), &cfg);
    assert_eq!(open, MarketRegime::HighVol);

    let squeezed = classify_regime(&iv(60.0), &atr(TrendDirection::Increasing), &boll(0.09, true), &cfg);
    assert_eq!(squeezed, MarketRegime::Normal);
}

#[test]
fn test_same_inputs_same_regime() {
    let cfg = RegimeThresholds::default();
    let a = classify_regime(&iv(64.0), &atr(TrendDirection::Stable), &boll(0.06, false), &cfg);
    let b = classify_regime(&iv(64.0), &atr(TrendDirection::Stable), &boll(0.06, false), &cfg);
    assert_eq!(a, b);
}

#[test]
fn test_custom_thresholds_shift_ladder() {
    // 调低HighVol档位后，原本Normal的组合升档
    let cfg = RegimeThresholds {
        high_vol_score: 0.3,
        ..RegimeThresholds::default()
    };
    let regime = classify_regime(
        &iv(50.0),
        &atr(TrendDirection::Stable),
        &boll(0.05, false),
        &cfg,
    );
    assert_eq!(regime, MarketRegime::HighVol);
}

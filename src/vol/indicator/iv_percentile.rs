use super::CalcError;
use crate::vol::model::{HistoricalRange, IvPercentileResult, IvZone, VolatilityBar};

/// IV 百分位排名
///
/// 先过滤掉 iv<=0 的脏数据，百分位 = 小于等于当前值的观测占比。
/// 历史区间（min/max/mean）同样只统计过滤后的有效观测。
pub fn iv_percentile(
    current_iv: f64,
    history: &[VolatilityBar],
) -> Result<IvPercentileResult, CalcError> {
    let valid: Vec<f64> = history
        .iter()
        .map(|bar| bar.implied_volatility)
        .filter(|iv| *iv > 0.0)
        .collect();
    if valid.is_empty() {
        return Err(CalcError::NoValidIvData);
    }

    let below = valid.iter().filter(|iv| **iv <= current_iv).count();
    let percentile = (below as f64 / valid.len() as f64 * 100.0).clamp(0.0, 100.0);

    let min = valid.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = valid.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mean = valid.iter().sum::<f64>() / valid.len() as f64;

    Ok(IvPercentileResult {
        current: current_iv,
        percentile,
        historical_range: HistoricalRange { min, max, mean },
        zone: IvZone::from_percentile(percentile),
    })
}

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::CalcError;
use crate::vol::model::{CorrelationDirection, CorrelationStrength, PriceBar, VixCorrelationResult};

/// 相关性强弱阈值
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CorrelationCutoffs {
    /// |r| 低于该值视为弱相关
    pub weak_max: f64,
    /// |r| 低于该值视为中等相关，其余为强相关
    pub moderate_max: f64,
}

impl Default for CorrelationCutoffs {
    fn default() -> Self {
        Self {
            weak_max: 0.3,
            moderate_max: 0.7,
        }
    }
}

/// 标的与 VIX 的滚动相关性
///
/// 双方各自计算日收益率后按日期对齐（只保留交集），
/// 在最近 window 对上计算 Pearson 相关系数；
/// historical_average 取 2×window（不足时取全部对齐对）上的相关系数。
pub fn vix_correlation(
    security: &[PriceBar],
    vix: &[PriceBar],
    window: usize,
    cutoffs: CorrelationCutoffs,
) -> Result<VixCorrelationResult, CalcError> {
    if window == 0 {
        return Err(CalcError::InvalidPeriod(window));
    }
    let pairs = aligned_returns(security, vix);
    if pairs.len() < window {
        return Err(CalcError::InsufficientData {
            calc: "VIX相关性",
            required: window,
            actual: pairs.len(),
        });
    }

    let correlation = pearson(&pairs[pairs.len() - window..]);

    let baseline_len = (window * 2).min(pairs.len());
    let historical_average = pearson(&pairs[pairs.len() - baseline_len..]);

    Ok(VixCorrelationResult {
        correlation,
        strength: strength_of(correlation, cutoffs),
        direction: direction_of(correlation),
        historical_average,
    })
}

/// 日简单收益率：(今收-昨收)/昨收，昨收为0时跳过该日
fn daily_returns(bars: &[PriceBar]) -> Vec<(NaiveDate, f64)> {
    bars.windows(2)
        .filter_map(|pair| {
            let prev = pair[0].close;
            if prev.abs() < f64::EPSILON {
                None
            } else {
                Some((pair[1].date, (pair[1].close - prev) / prev))
            }
        })
        .collect()
}

/// 按日期求两组收益率的交集，保持标的侧的时间顺序
fn aligned_returns(security: &[PriceBar], vix: &[PriceBar]) -> Vec<(f64, f64)> {
    let vix_by_date: HashMap<NaiveDate, f64> = daily_returns(vix).into_iter().collect();
    daily_returns(security)
        .into_iter()
        .filter_map(|(date, ret)| vix_by_date.get(&date).map(|vix_ret| (ret, *vix_ret)))
        .collect()
}

/// Pearson 相关系数，任一序列方差为0时返回0而非 NaN
fn pearson(pairs: &[(f64, f64)]) -> f64 {
    if pairs.is_empty() {
        return 0.0;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return 0.0;
    }
    (cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0)
}

fn strength_of(correlation: f64, cutoffs: CorrelationCutoffs) -> CorrelationStrength {
    let abs = correlation.abs();
    if abs < cutoffs.weak_max {
        CorrelationStrength::Weak
    } else if abs < cutoffs.moderate_max {
        CorrelationStrength::Moderate
    } else {
        CorrelationStrength::Strong
    }
}

fn direction_of(correlation: f64) -> CorrelationDirection {
    if correlation >= 0.0 {
        CorrelationDirection::Positive
    } else {
        CorrelationDirection::Negative
    }
}

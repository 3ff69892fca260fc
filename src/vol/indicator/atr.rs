use super::CalcError;
use crate::vol::model::{AtrResult, PriceBar, TrendDirection};

/// 趋势判定回看的平滑步数
const TREND_LOOKBACK: usize = 5;
/// 趋势判定的相对容差，变化幅度在此之内视为平稳
const TREND_TOLERANCE: f64 = 0.02;

/// Wilder 平滑 ATR
///
/// TR 首根取 high-low，其后取 (high-low)、|high-前收|、|low-前收| 三者最大；
/// 以前 period 条 TR 的简单平均为种子，之后按 Wilder 公式递推。
/// 至少需要 period+1 条K线。
pub fn atr(bars: &[PriceBar], period: usize) -> Result<AtrResult, CalcError> {
    if period == 0 {
        return Err(CalcError::InvalidPeriod(period));
    }
    let required = period + 1;
    if bars.len() < required {
        return Err(CalcError::InsufficientData {
            calc: "ATR",
            required,
            actual: bars.len(),
        });
    }

    let trs = true_ranges(bars);
    let series = wilder_series(&trs, period);
    let value = series[series.len() - 1];

    Ok(AtrResult {
        value,
        period,
        trend: trend_of(&series),
        historical_comparison: baseline_ratio(bars, &trs, period, value),
    })
}

/// True Range 序列
fn true_ranges(bars: &[PriceBar]) -> Vec<f64> {
    let mut trs = Vec::with_capacity(bars.len());
    let mut prev_close: Option<f64> = None;
    for bar in bars {
        let tr = match prev_close {
            Some(prev) => {
                let range1 = bar.high - bar.low;
                let range2 = (bar.high - prev).abs();
                let range3 = (bar.low - prev).abs();
                range1.max(range2).max(range3)
            }
            None => bar.high - bar.low,
        };
        trs.push(tr);
        prev_close = Some(bar.close);
    }
    trs
}

/// Wilder 平滑序列：seed = 前 period 条 TR 均值，
/// 其后 atr = (prev*(period-1) + tr) / period
fn wilder_series(trs: &[f64], period: usize) -> Vec<f64> {
    let seed = trs[..period].iter().sum::<f64>() / period as f64;
    let mut series = Vec::with_capacity(trs.len() - period + 1);
    series.push(seed);
    let mut prev = seed;
    for tr in &trs[period..] {
        let next = (prev * (period - 1) as f64 + tr) / period as f64;
        series.push(next);
        prev = next;
    }
    series
}

/// 最新平滑值与回看值比较判定趋势，平滑历史不足时与种子比较
fn trend_of(series: &[f64]) -> TrendDirection {
    let current = series[series.len() - 1];
    let reference = if series.len() > TREND_LOOKBACK {
        series[series.len() - 1 - TREND_LOOKBACK]
    } else {
        series[0]
    };
    if reference.abs() < f64::EPSILON {
        return TrendDirection::Stable;
    }
    let change = (current - reference) / reference;
    if change.abs() <= TREND_TOLERANCE {
        TrendDirection::Stable
    } else if change > 0.0 {
        TrendDirection::Increasing
    } else {
        TrendDirection::Decreasing
    }
}

/// 基准比值：数据足够时取 2×period 的 ATR 为基准，否则退化为全体 TR 均值
fn baseline_ratio(bars: &[PriceBar], trs: &[f64], period: usize, current: f64) -> f64 {
    let long_period = period * 2;
    let baseline = if bars.len() >= long_period + 1 {
        let series = wilder_series(trs, long_period);
        series[series.len() - 1]
    } else {
        trs.iter().sum::<f64>() / trs.len() as f64
    };
    if baseline.abs() < f64::EPSILON {
        0.0
    } else {
        current / baseline
    }
}

// 测试用例
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use float_cmp::approx_eq;

    fn bar(day: u32, high: f64, low: f64, close: f64) -> PriceBar {
        PriceBar {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: close,
            high,
            low,
            close,
            volume: None,
        }
    }

    #[test]
    fn test_true_range_uses_prev_close() {
        // 首根只有 high-low，跳空时真实波幅应覆盖缺口
        let bars = vec![
            bar(1, 10.0, 8.0, 9.0),
            bar(2, 14.0, 13.0, 13.5), // 向上跳空：|14-9|=5 > 1
            bar(3, 13.0, 10.0, 11.0), // |10-13.5|=3.5 > 3
        ];
        let trs = true_ranges(&bars);
        assert!(approx_eq!(f64, trs[0], 2.0, epsilon = 0.001));
        assert!(approx_eq!(f64, trs[1], 5.0, epsilon = 0.001));
        assert!(approx_eq!(f64, trs[2], 3.5, epsilon = 0.001));
    }

    #[test]
    fn test_wilder_recursion() {
        // seed = SMA(2,2,2) = 2，之后 atr = (prev*2 + tr) / 3
        let trs = vec![2.0, 2.0, 2.0, 2.0, 5.0];
        let series = wilder_series(&trs, 3);
        assert!(approx_eq!(f64, series[0], 2.0, epsilon = 0.001));
        assert!(approx_eq!(f64, series[1], 2.0, epsilon = 0.001));
        assert!(approx_eq!(f64, series[2], 3.0, epsilon = 0.001));
    }
}

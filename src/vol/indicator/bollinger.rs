use super::CalcError;
use crate::vol::model::{BollingerBandsResult, PriceBar};

/// squeeze 判定回看的历史窗口数上限
const SQUEEZE_LOOKBACK: usize = 50;
/// 使用分位判定所需的最少历史窗口数，不足时退化为绝对阈值
const MIN_SQUEEZE_HISTORY: usize = 10;

/// 布林带
///
/// 中轨为收盘价 SMA，σ 取总体标准差（除以 n），上下轨 = 中轨 ± k×σ。
/// 至少需要 period 条K线。
pub fn bollinger_bands(
    bars: &[PriceBar],
    period: usize,
    k: f64,
    squeeze_floor: f64,
) -> Result<BollingerBandsResult, CalcError> {
    if period == 0 {
        return Err(CalcError::InvalidPeriod(period));
    }
    if bars.len() < period {
        return Err(CalcError::InsufficientData {
            calc: "布林带",
            required: period,
            actual: bars.len(),
        });
    }

    let closes: Vec<f64> = bars.iter().map(|bar| bar.close).collect();
    let (upper, middle, lower) = band_at(&closes[closes.len() - period..], k);
    let bandwidth = bandwidth_of(upper, middle, lower);

    let last_close = closes[closes.len() - 1];
    let width = upper - lower;
    let position = if width.abs() < f64::EPSILON {
        // 常数窗口带宽为0，价格位置取中点
        0.5
    } else {
        ((last_close - lower) / width).clamp(0.0, 1.0)
    };

    let squeeze = is_squeeze(&closes, period, k, bandwidth, squeeze_floor);

    Ok(BollingerBandsResult {
        upper,
        middle,
        lower,
        bandwidth,
        position,
        squeeze,
    })
}

/// 单窗口的上中下轨
fn band_at(window: &[f64], k: f64) -> (f64, f64, f64) {
    let n = window.len() as f64;
    let mean = window.iter().sum::<f64>() / n;
    let variance = window.iter().map(|close| (close - mean).powi(2)).sum::<f64>() / n;
    let sigma = variance.sqrt();
    (mean + k * sigma, mean, mean - k * sigma)
}

/// 中轨接近0时带宽取0，避免除0产生非有限值
fn bandwidth_of(upper: f64, middle: f64, lower: f64) -> f64 {
    if middle.abs() < f64::EPSILON {
        0.0
    } else {
        (upper - lower) / middle
    }
}

/// squeeze 判定：当前带宽严格低于历史带宽的下一成分位；
/// 历史窗口不足 MIN_SQUEEZE_HISTORY 时改用绝对阈值
fn is_squeeze(closes: &[f64], period: usize, k: f64, current_bandwidth: f64, floor: f64) -> bool {
    let total_windows = closes.len() - period + 1;
    // 不含当前窗口的历史完整窗口数
    let prior = total_windows - 1;
    let take = prior.min(SQUEEZE_LOOKBACK);

    let mut history = Vec::with_capacity(take);
    for i in (prior - take)..prior {
        let (upper, middle, lower) = band_at(&closes[i..i + period], k);
        history.push(bandwidth_of(upper, middle, lower));
    }

    if history.len() < MIN_SQUEEZE_HISTORY {
        return current_bandwidth <= floor;
    }

    history.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let idx = ((history.len() as f64) * 0.1).floor() as usize;
    let decile = history[idx.min(history.len() - 1)];
    current_bandwidth < decile
}

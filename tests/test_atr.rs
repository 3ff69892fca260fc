#[cfg(test)]
mod test {
    use chrono::NaiveDate;
    use ta::indicators::AverageTrueRange;
    use ta::{DataItem, Next};

    use vol_quant::vol::indicator::atr::atr;
    use vol_quant::vol::indicator::CalcError;
    use vol_quant::vol::model::{PriceBar, TrendDirection};

    /// (high, low, close) 列表转K线，日期逐日递增
    fn bars(data: &[(f64, f64, f64)]) -> Vec<PriceBar> {
        let start = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
        data.iter()
            .enumerate()
            .map(|(i, (high, low, close))| PriceBar {
                date: start + chrono::Duration::days(i as i64),
                open: *close,
                high: *high,
                low: *low,
                close: *close,
                volume: Some(1_000),
            })
            .collect()
    }

    #[test]
    fn test_wilder_recursion_by_hand() {
        // TR序列 [1.0, 1.0, 1.0, 1.5, 1.0]，period=3：
        // 种子 = 1.0，随后 (1.0*2+1.5)/3 = 3.5/3，再 (3.5/3*2+1.0)/3 = 10/9
        let data = bars(&[
            (10.0, 9.0, 9.5),
            (10.5, 9.5, 10.0),
            (11.0, 10.0, 10.5),
            (12.0, 10.5, 11.5),
            (11.5, 10.5, 11.0),
        ]);
        let result = atr(&data, 3).unwrap();

        approx::assert_relative_eq!(result.value, 10.0 / 9.0, epsilon = 1e-12);
        assert_eq!(result.period, 3);
        assert_eq!(result.trend, TrendDirection::Increasing);
        // 数据不足2倍周期，基准退化为全体TR均值 1.1
        approx::assert_relative_eq!(
            result.historical_comparison,
            (10.0 / 9.0) / 1.1,
            epsilon = 1e-12
        );
    }

    /// 种子 + 递推公式的手工重算
    fn manual_wilder(trs: &[f64], period: usize) -> f64 {
        let mut value = trs[..period].iter().sum::<f64>() / period as f64;
        for tr in &trs[period..] {
            value = (value * (period as f64 - 1.0) + tr) / period as f64;
        }
        value
    }

    #[test]
    fn test_twenty_bar_series_matches_manual_recursion() {
        let rows = [
            (100.0, 98.0, 99.0),
            (101.5, 99.0, 100.5),
            (102.0, 100.0, 101.0),
            (103.0, 100.5, 102.5),
            (104.5, 102.0, 103.0),
            (103.5, 101.0, 101.5),
            (102.0, 99.5, 100.0),
            (101.0, 98.5, 99.0),
            (103.5, 99.5, 103.0),
            (105.0, 102.5, 104.5),
            (106.5, 104.0, 106.0),
            (108.0, 105.5, 107.5),
            (107.0, 104.5, 105.0),
            (105.5, 103.0, 103.5),
            (104.0, 101.5, 102.0),
            (106.5, 102.0, 106.0),
            (108.5, 105.5, 108.0),
            (110.0, 107.0, 109.5),
            (109.0, 106.5, 107.0),
            (108.0, 105.0, 105.5),
        ];
        let data = bars(&rows);

        let mut trs = Vec::with_capacity(rows.len());
        for (i, (high, low, _)) in rows.iter().enumerate() {
            let tr = if i == 0 {
                high - low
            } else {
                let prev_close = rows[i - 1].2;
                (high - low)
                    .max((high - prev_close).abs())
                    .max((low - prev_close).abs())
            };
            trs.push(tr);
        }

        let result = atr(&data, 5).unwrap();
        approx::assert_relative_eq!(result.value, manual_wilder(&trs, 5), epsilon = 1e-12);
        // 20根K线满足2倍周期，基准应为10周期ATR
        approx::assert_relative_eq!(
            result.historical_comparison,
            manual_wilder(&trs, 5) / manual_wilder(&trs, 10),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_constant_range_matches_ta_atr() {
        // 恒定区间下 Wilder 平滑与 ta 的 EMA 平滑收敛于同一TR值
        let data = bars(&[(10.5, 9.5, 10.0); 8]);
        let result = atr(&data, 3).unwrap();
        approx::assert_relative_eq!(result.value, 1.0, epsilon = 1e-12);
        assert_eq!(result.trend, TrendDirection::Stable);
        approx::assert_relative_eq!(result.historical_comparison, 1.0, epsilon = 1e-12);

        let mut ta_atr = AverageTrueRange::new(3).unwrap();
        let mut ta_value = 0.0;
        for bar in &data {
            let item = DataItem::builder()
                .open(bar.open)
                .high(bar.high)
                .low(bar.low)
                .close(bar.close)
                .volume(1_000.0)
                .build()
                .unwrap();
            ta_value = ta_atr.next(&item);
        }
        approx::assert_relative_eq!(result.value, ta_value, epsilon = 1e-12);
    }

    #[test]
    fn test_gap_expands_true_range() {
        // 第二根K线整体跳空，TR 取 |high-前收|
        let data = bars(&[
            (10.0, 9.0, 9.5),
            (13.0, 12.0, 12.5),
            (13.5, 12.5, 13.0),
        ]);
        let result = atr(&data, 2).unwrap();
        // TR = [1.0, 3.5, 1.0]，种子 (1.0+3.5)/2 = 2.25，后续 (2.25+1.0)/2 = 1.625
        approx::assert_relative_eq!(result.value, 1.625, epsilon = 1e-12);
    }

    #[test]
    fn test_shrinking_range_is_decreasing() {
        let data = bars(&[
            (103.0, 100.0, 101.0),
            (104.0, 101.0, 102.0),
            (105.0, 102.0, 103.0),
            (103.5, 102.5, 103.0),
            (103.5, 102.5, 103.0),
        ]);
        let result = atr(&data, 3).unwrap();
        approx::assert_relative_eq!(result.value, 17.0 / 9.0, epsilon = 1e-12);
        assert_eq!(result.trend, TrendDirection::Decreasing);
    }

    #[test]
    fn test_insufficient_data() {
        let data = bars(&[(10.0, 9.0, 9.5), (10.5, 9.5, 10.0), (11.0, 10.0, 10.5)]);
        let err = atr(&data, 3).unwrap_err();
        assert!(matches!(
            err,
            CalcError::InsufficientData {
                required: 4,
                actual: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_zero_period_rejected() {
        let data = bars(&[(10.0, 9.0, 9.5), (10.5, 9.5, 10.0)]);
        assert!(matches!(atr(&data, 0), Err(CalcError::InvalidPeriod(0))));
    }

    #[test]
    fn test_dirty_bars_do_not_panic() {
        // 高低倒挂、零价等脏数据不崩溃，结果保持有限
        let data = bars(&[
            (9.0, 10.0, 9.5),
            (0.0, 0.0, 0.0),
            (10.5, 9.5, 10.0),
            (11.0, 10.0, 10.5),
        ]);
        let result = atr(&data, 3).unwrap();
        assert!(result.value.is_finite());
        assert!(result.historical_comparison.is_finite());
    }
}

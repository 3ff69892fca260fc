use async_trait::async_trait;
use chrono::NaiveDate;

use crate::vol::model::{PriceBar, VolatilityBar};

/// 行情数据源抽象，由调用方注入具体实现
///
/// 所有序列按日期升序返回，允许为空；数据质量由计算层各自处理。
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// 标的历史日K线
    async fn get_historical_prices(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<PriceBar>>;

    /// 标的历史波动率观测
    async fn get_volatility_data(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<VolatilityBar>>;

    /// VIX 指数日K线
    async fn get_vix_data(&self, start: NaiveDate, end: NaiveDate)
        -> anyhow::Result<Vec<PriceBar>>;
}

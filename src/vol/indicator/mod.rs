pub mod atr;
pub mod bollinger;
pub mod iv_percentile;
pub mod vix_correlation;

use thiserror::Error;

/// 指标计算错误
///
/// 全部属于输入校验失败，计算层不做重试。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalcError {
    /// 过滤脏数据后没有任何有效 IV 观测
    #[error("无有效IV数据")]
    NoValidIvData,

    /// 数据条数不足以完成计算
    #[error("{calc}数据不足: 需要{required}条, 实际{actual}条")]
    InsufficientData {
        calc: &'static str,
        required: usize,
        actual: usize,
    },

    /// 周期参数非法
    #[error("非法周期参数: {0}")]
    InvalidPeriod(usize),
}

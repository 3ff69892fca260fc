use thiserror::Error;

use crate::vol::indicator::CalcError;

/// 应用错误
///
/// 回调订阅方通过该类型区分校验失败与数据获取失败。
#[derive(Error, Debug)]
pub enum AppError {
    /// 校验错误：输入数据不满足计算前提，重试无意义
    #[error("校验错误: {0}")]
    Validation(#[from] CalcError),

    /// 暂时性错误：数据获取失败等，可重试
    #[error("暂时性错误: {0}")]
    Transient(String),

    /// 终态错误：重试次数耗尽，保留最后一次失败的根因
    #[error("重试耗尽: {symbol} 尝试{attempts}次后失败: {source}")]
    Terminal {
        symbol: String,
        attempts: u32,
        #[source]
        source: Box<AppError>,
    },
}

impl AppError {
    /// 是否为可重试的暂时性错误
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Transient(_))
    }

    /// 终态错误返回其根因，其余返回自身
    pub fn root_cause(&self) -> &AppError {
        match self {
            AppError::Terminal { source, .. } => source,
            other => other,
        }
    }
}

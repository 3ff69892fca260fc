use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::vol::model::VolatilityAnalysis;

/// 更新生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl UpdateStatus {
    /// Completed 与 Failed 为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, UpdateStatus::Completed | UpdateStatus::Failed)
    }
}

/// 一次调度更新的记录
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledUpdate {
    pub id: Uuid,
    pub symbol: String,
    pub scheduled_time: DateTime<Utc>,
    pub status: UpdateStatus,
    pub result: Option<VolatilityAnalysis>,
    pub error: Option<String>,
    /// 已失败的尝试次数
    pub retry_count: u32,
}

impl ScheduledUpdate {
    pub fn new(symbol: &str, scheduled_time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            scheduled_time,
            status: UpdateStatus::Pending,
            result: None,
            error: None,
            retry_count: 0,
        }
    }
}

/// 状态机事件
#[derive(Debug, Clone)]
pub enum UpdateEvent {
    /// 到达执行时刻
    Due,
    /// 本次尝试成功
    Succeeded(VolatilityAnalysis),
    /// 本次尝试失败
    AttemptFailed(String),
}

/// 状态迁移产生的副作用，由调度器负责执行
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateEffect {
    /// 执行一次抓取+计算
    RunCalculation,
    /// 按固定延迟安排重试
    ScheduleRetry,
    /// 通知成功订阅者
    NotifySuccess,
    /// 通知失败订阅者（每轮至多一次，重试耗尽时）
    NotifyFailure,
    /// 本轮结束，安排下一个周期
    ScheduleNext,
}

/// 纯状态迁移函数
///
/// pending --Due--> running --Succeeded--> completed
///                        \--AttemptFailed--> pending（未达上限）
///                         \--AttemptFailed--> failed（达到上限）
/// 终态不再迁移；无论成败，ScheduleNext 都会出现在终态副作用中，
/// 周期调度不因单轮失败而中断。
pub fn step(
    update: &ScheduledUpdate,
    event: UpdateEvent,
    max_retries: u32,
) -> (ScheduledUpdate, Vec<UpdateEffect>) {
    let mut next = update.clone();
    let mut effects = Vec::new();

    match (update.status, event) {
        (UpdateStatus::Pending, UpdateEvent::Due) => {
            next.status = UpdateStatus::Running;
            effects.push(UpdateEffect::RunCalculation);
        }
        (UpdateStatus::Running, UpdateEvent::Succeeded(analysis)) => {
            next.status = UpdateStatus::Completed;
            next.result = Some(analysis);
            next.error = None;
            effects.push(UpdateEffect::NotifySuccess);
            effects.push(UpdateEffect::ScheduleNext);
        }
        (UpdateStatus::Running, UpdateEvent::AttemptFailed(reason)) => {
            next.retry_count += 1;
            next.error = Some(reason);
            if next.retry_count < max_retries {
                next.status = UpdateStatus::Pending;
                effects.push(UpdateEffect::ScheduleRetry);
            } else {
                next.status = UpdateStatus::Failed;
                effects.push(UpdateEffect::NotifyFailure);
                effects.push(UpdateEffect::ScheduleNext);
            }
        }
        // 终态以及不匹配的事件一律不迁移
        _ => {}
    }

    (next, effects)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_update() -> ScheduledUpdate {
        ScheduledUpdate::new("AAPL", Utc::now())
    }

    #[test]
    fn test_due_starts_running() {
        let update = pending_update();
        let (next, effects) = step(&update, UpdateEvent::Due, 3);
        assert_eq!(next.status, UpdateStatus::Running);
        assert_eq!(effects, vec![UpdateEffect::RunCalculation]);
    }

    #[test]
    fn test_failure_below_limit_schedules_retry() {
        let mut update = pending_update();
        update.status = UpdateStatus::Running;
        let (next, effects) = step(&update, UpdateEvent::AttemptFailed("超时".to_string()), 3);
        assert_eq!(next.status, UpdateStatus::Pending);
        assert_eq!(next.retry_count, 1);
        assert_eq!(next.error.as_deref(), Some("超时"));
        assert_eq!(effects, vec![UpdateEffect::ScheduleRetry]);
    }

    #[test]
    fn test_failure_at_limit_is_terminal_and_reschedules() {
        let mut update = pending_update();
        update.status = UpdateStatus::Running;
        update.retry_count = 2;
        let (next, effects) = step(&update, UpdateEvent::AttemptFailed("超时".to_string()), 3);
        assert_eq!(next.status, UpdateStatus::Failed);
        assert_eq!(next.retry_count, 3);
        assert!(next.status.is_terminal());
        // 失败通知只出现这一次，且周期照常延续
        assert_eq!(
            effects,
            vec![UpdateEffect::NotifyFailure, UpdateEffect::ScheduleNext]
        );
    }

    #[test]
    fn test_success_completes_and_reschedules() {
        let mut update = pending_update();
        update.status = UpdateStatus::Running;
        let analysis = serde_json::from_value(sample_analysis_json());
        let analysis = analysis.expect("样例结果应可反序列化");
        let (next, effects) = step(&update, UpdateEvent::Succeeded(analysis), 3);
        assert_eq!(next.status, UpdateStatus::Completed);
        assert!(next.result.is_some());
        assert!(next.error.is_none());
        assert_eq!(
            effects,
            vec![UpdateEffect::NotifySuccess, UpdateEffect::ScheduleNext]
        );
    }

    #[test]
    fn test_terminal_state_ignores_events() {
        let mut update = pending_update();
        update.status = UpdateStatus::Failed;
        update.retry_count = 3;
        let (next, effects) = step(&update, UpdateEvent::Due, 3);
        assert_eq!(next.status, UpdateStatus::Failed);
        assert!(effects.is_empty());
    }

    fn sample_analysis_json() -> serde_json::Value {
        serde_json::json!({
            "symbol": "AAPL",
            "timestamp": "2026-01-14T15:00:00Z",
            "iv_percentile": {
                "current": 0.3,
                "percentile": 60.0,
                "historical_range": { "min": 0.1, "max": 0.5, "mean": 0.28 },
                "zone": "high"
            },
            "atr": {
                "value": 2.4,
                "period": 14,
                "trend": "stable",
                "historical_comparison": 1.05
            },
            "bollinger": {
                "upper": 110.0,
                "middle": 100.0,
                "lower": 90.0,
                "bandwidth": 0.2,
                "position": 0.6,
                "squeeze": false
            },
            "vix_correlation": {
                "correlation": -0.4,
                "strength": "moderate",
                "direction": "negative",
                "historical_average": -0.35
            },
            "market_regime": "normal"
        })
    }
}

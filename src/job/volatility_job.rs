//! 波动率更新调度模块
//!
//! 为每个标的维持独立的周期更新任务，串联数据源抓取与指标计算，
//! 内置固定延迟重试、开盘时段推迟与订阅者通知，和具体数据源解耦。

use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::error::app_error::AppError;
use crate::job::task_scheduler::TimerHub;
use crate::job::update_state::{step, ScheduledUpdate, UpdateEffect, UpdateEvent, UpdateStatus};
use crate::time_util::{self, Clock, SystemClock};
use crate::vol::data_source::MarketDataSource;
use crate::vol::engine::VolatilityEngine;
use crate::vol::model::VolatilityAnalysis;

/// 调度器操作错误
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("调度器未在运行")]
    NotRunning,

    #[error("未知标的: {0}")]
    UnknownSymbol(String),
}

/// 调度配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// 单个标的的常规更新间隔（毫秒）
    pub update_interval_ms: u64,
    /// 单轮更新的最大尝试次数（含首次）
    pub max_retries: u32,
    /// 重试间隔（毫秒，固定值不退避）
    pub retry_delay_ms: u64,
    /// 休市时是否推迟到下一次开盘
    pub enable_market_hours_check: bool,
    /// 初始标的列表
    pub symbols: Vec<String>,
    /// 是否启用盘中实时补充刷新
    pub enable_real_time_updates: bool,
    /// 实时刷新单轮最多处理的标的数
    pub batch_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: 300_000,
            max_retries: 3,
            retry_delay_ms: 5_000,
            enable_market_hours_check: true,
            symbols: Vec::new(),
            enable_real_time_updates: false,
            batch_size: 5,
        }
    }
}

/// 调度统计
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStats {
    pub total_updates: u64,
    pub successful_updates: u64,
    pub failed_updates: u64,
    pub average_latency_ms: f64,
    pub last_update_time: Option<DateTime<Utc>>,
}

/// 调度健康状态
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerHealth {
    pub is_running: bool,
    pub in_flight_updates: usize,
    pub failure_rate: f64,
    pub last_error_time: Option<DateTime<Utc>>,
}

type UpdateCallback = dyn Fn(&str, &VolatilityAnalysis) -> Result<()> + Send + Sync;
type ErrorCallback = dyn Fn(&str, &AppError) -> Result<()> + Send + Sync;

#[derive(Default)]
struct StatsState {
    total: u64,
    success: u64,
    failed: u64,
    latency_sum_ms: f64,
    last_update_time: Option<DateTime<Utc>>,
    last_error_time: Option<DateTime<Utc>>,
}

struct SchedulerShared {
    config: SchedulerConfig,
    engine: Arc<VolatilityEngine>,
    data_source: Arc<dyn MarketDataSource>,
    clock: Arc<dyn Clock>,
    running: AtomicBool,
    symbols: Mutex<HashSet<String>>,
    high_priority: Mutex<HashSet<String>>,
    in_flight: Mutex<HashSet<String>>,
    records: Mutex<HashMap<String, ScheduledUpdate>>,
    last_success: Mutex<HashMap<String, DateTime<Utc>>>,
    stats: Mutex<StatsState>,
    update_callbacks: Mutex<Vec<Arc<UpdateCallback>>>,
    error_callbacks: Mutex<Vec<Arc<ErrorCallback>>>,
    // 通知与停机互斥：stop 返回后不再有任何回调开始执行
    notify_gate: Mutex<()>,
}

/// 正在执行标记的 RAII 守卫，任务被取消时同样能释放
struct InFlightGuard {
    shared: Arc<SchedulerShared>,
    symbol: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.shared.in_flight).remove(&self.symbol);
    }
}

/// 波动率更新调度器
pub struct VolatilityScheduler {
    shared: Arc<SchedulerShared>,
    hub: Mutex<TimerHub>,
}

impl VolatilityScheduler {
    /// 常量定义
    const REALTIME_SWEEP_INTERVAL_MS: u64 = 30_000;
    const LOOKBACK_DAYS: i64 = 365;

    pub fn new(
        config: SchedulerConfig,
        engine: Arc<VolatilityEngine>,
        data_source: Arc<dyn MarketDataSource>,
    ) -> Self {
        Self::with_clock(config, engine, data_source, Arc::new(SystemClock))
    }

    /// 注入时钟的构造方式
    pub fn with_clock(
        config: SchedulerConfig,
        engine: Arc<VolatilityEngine>,
        data_source: Arc<dyn MarketDataSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let symbols: HashSet<String> = config.symbols.iter().cloned().collect();
        Self {
            shared: Arc::new(SchedulerShared {
                config,
                engine,
                data_source,
                clock,
                running: AtomicBool::new(false),
                symbols: Mutex::new(symbols),
                high_priority: Mutex::new(HashSet::new()),
                in_flight: Mutex::new(HashSet::new()),
                records: Mutex::new(HashMap::new()),
                last_success: Mutex::new(HashMap::new()),
                stats: Mutex::new(StatsState::default()),
                update_callbacks: Mutex::new(Vec::new()),
                error_callbacks: Mutex::new(Vec::new()),
                notify_gate: Mutex::new(()),
            }),
            hub: Mutex::new(TimerHub::new()),
        }
    }

    /// 启动调度：为每个标的安排首次更新并进入周期节奏
    ///
    /// 重复启动只记录告警，不产生第二套任务。
    pub fn start(&self) {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            warn!("调度器已在运行, 忽略重复启动");
            return;
        }
        let symbols: Vec<String> = {
            let guard = lock(&self.shared.symbols);
            let mut list: Vec<String> = guard.iter().cloned().collect();
            list.sort();
            list
        };
        info!(
            "启动波动率调度器: {}个标的, 更新间隔{}ms, 最大尝试{}次",
            symbols.len(),
            self.shared.config.update_interval_ms,
            self.shared.config.max_retries
        );

        let mut hub = lock(&self.hub);
        for symbol in symbols {
            Self::spawn_symbol_loop(&mut hub, Arc::clone(&self.shared), symbol);
        }
        if self.shared.config.enable_real_time_updates {
            let shared = Arc::clone(&self.shared);
            hub.add_periodic_task(
                "realtime_sweep".to_string(),
                Self::REALTIME_SWEEP_INTERVAL_MS,
                move || {
                    let shared = Arc::clone(&shared);
                    async move {
                        Self::realtime_sweep(shared).await;
                    }
                },
            );
        }
    }

    /// 停止调度：广播停止信号并等待全部任务退出
    ///
    /// 返回后不再产生任何回调；进行中的更新被取消，不通知也不重排。
    pub async fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            warn!("调度器未在运行");
            return;
        }
        let mut hub = {
            let mut guard = lock(&self.hub);
            std::mem::take(&mut *guard)
        };
        hub.shutdown().await;
        // 与进行中的通知互斥，保证返回后再无回调
        drop(lock(&self.shared.notify_gate));
        lock(&self.shared.in_flight).clear();
        info!("波动率调度器已停止");
    }

    /// 动态加入标的，运行中立即获得自己的更新任务
    pub fn add_symbols(&self, symbols: &[&str]) {
        for symbol in symbols {
            let inserted = lock(&self.shared.symbols).insert(symbol.to_string());
            if inserted {
                let mut hub = lock(&self.hub);
                // 与 stop 的任务表接管互斥：持有 hub 锁后再判定 running
                if self.shared.running.load(Ordering::SeqCst) {
                    Self::spawn_symbol_loop(&mut hub, Arc::clone(&self.shared), symbol.to_string());
                }
            }
        }
    }

    /// 移除标的并取消其更新任务
    pub fn remove_symbols(&self, symbols: &[&str]) {
        for symbol in symbols {
            let removed = lock(&self.shared.symbols).remove(*symbol);
            if removed {
                lock(&self.shared.high_priority).remove(*symbol);
                lock(&self.shared.in_flight).remove(*symbol);
                lock(&self.hub).remove_task(&Self::task_name(symbol));
                debug!("标的 {} 已移出调度", symbol);
            }
        }
    }

    /// 设置实时刷新的高优先级标的集合（整体替换）
    pub fn set_high_priority(&self, symbols: &[&str]) {
        let mut high = lock(&self.shared.high_priority);
        high.clear();
        high.extend(symbols.iter().map(|s| s.to_string()));
    }

    /// 手动触发一次立即更新，结果只经由回调可见
    pub fn trigger_immediate_update(&self, symbol: &str) -> Result<(), SchedulerError> {
        if !self.shared.running.load(Ordering::SeqCst) {
            return Err(SchedulerError::NotRunning);
        }
        if !lock(&self.shared.symbols).contains(symbol) {
            return Err(SchedulerError::UnknownSymbol(symbol.to_string()));
        }
        let shared = Arc::clone(&self.shared);
        let symbol = symbol.to_string();
        let mut shutdown = lock(&self.hub).subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = Self::run_update_cycle(&shared, &symbol) => {}
                _ = shutdown.recv() => {}
            }
        });
        Ok(())
    }

    /// 注册成功回调；回调返回错误只记录日志，不影响调度
    pub fn on_update<F>(&self, callback: F)
    where
        F: Fn(&str, &VolatilityAnalysis) -> Result<()> + Send + Sync + 'static,
    {
        lock(&self.shared.update_callbacks).push(Arc::new(callback));
    }

    /// 注册失败回调，每轮重试耗尽时触发一次
    pub fn on_error<F>(&self, callback: F)
    where
        F: Fn(&str, &AppError) -> Result<()> + Send + Sync + 'static,
    {
        lock(&self.shared.error_callbacks).push(Arc::new(callback));
    }

    pub fn get_stats(&self) -> SchedulerStats {
        let stats = lock(&self.shared.stats);
        SchedulerStats {
            total_updates: stats.total,
            successful_updates: stats.success,
            failed_updates: stats.failed,
            average_latency_ms: if stats.total == 0 {
                0.0
            } else {
                stats.latency_sum_ms / stats.total as f64
            },
            last_update_time: stats.last_update_time,
        }
    }

    pub fn get_health(&self) -> SchedulerHealth {
        let (failed, total, last_error_time) = {
            let stats = lock(&self.shared.stats);
            (stats.failed, stats.total, stats.last_error_time)
        };
        SchedulerHealth {
            is_running: self.shared.running.load(Ordering::SeqCst),
            in_flight_updates: lock(&self.shared.in_flight).len(),
            failure_rate: if total == 0 {
                0.0
            } else {
                failed as f64 / total as f64
            },
            last_error_time,
        }
    }

    /// 各标的最近一轮更新记录，按标的名排序
    pub fn get_scheduled_updates(&self) -> Vec<ScheduledUpdate> {
        let records = lock(&self.shared.records);
        let mut list: Vec<ScheduledUpdate> = records.values().cloned().collect();
        list.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        list
    }

    pub fn get_update(&self, symbol: &str) -> Option<ScheduledUpdate> {
        lock(&self.shared.records).get(symbol).cloned()
    }

    fn task_name(symbol: &str) -> String {
        format!("update_{}", symbol)
    }

    /// 单标的更新循环：首轮立即执行，此后按固定间隔推进
    fn spawn_symbol_loop(hub: &mut TimerHub, shared: Arc<SchedulerShared>, symbol: String) {
        let interval_ms = shared.config.update_interval_ms;
        hub.add_loop_task(Self::task_name(&symbol), move |mut shutdown| async move {
            let mut first = true;
            loop {
                if !first {
                    tokio::select! {
                        _ = sleep(Duration::from_millis(interval_ms)) => {}
                        _ = shutdown.recv() => break,
                    }
                }
                first = false;

                // 休市推迟：睡到下一次开盘再执行，不在醒来后二次判定
                if shared.config.enable_market_hours_check {
                    let now = shared.clock.now();
                    if !time_util::is_market_open(now) {
                        let open = time_util::next_market_open(now);
                        let wait = (open - now).to_std().unwrap_or(std::time::Duration::ZERO);
                        debug!("休市中, {} 推迟到 {} 执行", symbol, open);
                        tokio::select! {
                            _ = sleep(wait) => {}
                            _ = shutdown.recv() => break,
                        }
                    }
                }

                tokio::select! {
                    _ = Self::run_update_cycle(&shared, &symbol) => {}
                    _ = shutdown.recv() => break,
                }
            }
        });
    }

    /// 一轮完整更新：状态机驱动的尝试-重试-通知流程
    async fn run_update_cycle(shared: &Arc<SchedulerShared>, symbol: &str) {
        // 同一标的严格串行，已在执行则跳过本轮
        {
            let mut in_flight = lock(&shared.in_flight);
            if !in_flight.insert(symbol.to_string()) {
                debug!("{} 更新仍在进行, 跳过本轮", symbol);
                return;
            }
        }
        let _guard = InFlightGuard {
            shared: Arc::clone(shared),
            symbol: symbol.to_string(),
        };
        let started = Instant::now();

        let mut update = ScheduledUpdate::new(symbol, shared.clock.now());
        Self::record(shared, &update);

        let mut last_error: Option<AppError> = None;
        loop {
            let (next, effects) = step(&update, UpdateEvent::Due, shared.config.max_retries);
            update = next;
            Self::record(shared, &update);
            if !effects.contains(&UpdateEffect::RunCalculation) {
                break;
            }

            let event = match Self::attempt_update(shared, symbol).await {
                Ok(analysis) => UpdateEvent::Succeeded(analysis),
                Err(err) => {
                    let reason = err.to_string();
                    last_error = Some(err);
                    UpdateEvent::AttemptFailed(reason)
                }
            };
            let (next, effects) = step(&update, event, shared.config.max_retries);
            update = next;
            Self::record(shared, &update);

            let mut cycle_done = false;
            for effect in &effects {
                match effect {
                    UpdateEffect::NotifySuccess => {
                        if let Some(analysis) = update.result.as_ref() {
                            Self::notify_success(shared, symbol, analysis);
                            lock(&shared.last_success)
                                .insert(symbol.to_string(), shared.clock.now());
                        }
                    }
                    UpdateEffect::NotifyFailure => {
                        let terminal = AppError::Terminal {
                            symbol: symbol.to_string(),
                            attempts: update.retry_count,
                            source: Box::new(
                                last_error
                                    .take()
                                    .unwrap_or_else(|| AppError::Transient("未知原因".to_string())),
                            ),
                        };
                        error!("{} 更新重试耗尽: {}", symbol, terminal);
                        Self::notify_failure(shared, symbol, &terminal);
                    }
                    UpdateEffect::ScheduleRetry => {
                        warn!(
                            "{} 第{}次尝试失败, {}ms后重试",
                            symbol, update.retry_count, shared.config.retry_delay_ms
                        );
                        sleep(Duration::from_millis(shared.config.retry_delay_ms)).await;
                    }
                    UpdateEffect::ScheduleNext => {
                        cycle_done = true;
                    }
                    UpdateEffect::RunCalculation => {}
                }
            }
            if cycle_done {
                break;
            }
        }

        let elapsed_ms = started.elapsed().as_millis() as f64;
        let now = shared.clock.now();
        let mut stats = lock(&shared.stats);
        stats.total += 1;
        stats.latency_sum_ms += elapsed_ms;
        stats.last_update_time = Some(now);
        if update.status == UpdateStatus::Completed {
            stats.success += 1;
        } else {
            stats.failed += 1;
            stats.last_error_time = Some(now);
        }
    }

    /// 单次尝试：抓取三类行情后交给引擎计算
    async fn attempt_update(
        shared: &Arc<SchedulerShared>,
        symbol: &str,
    ) -> Result<VolatilityAnalysis, AppError> {
        let end = shared.clock.now().date_naive();
        let start = end - ChronoDuration::days(Self::LOOKBACK_DAYS);

        let prices = shared
            .data_source
            .get_historical_prices(symbol, start, end)
            .await
            .map_err(|e| AppError::Transient(format!("获取K线失败: {}", e)))?;
        let volatility = shared
            .data_source
            .get_volatility_data(symbol, start, end)
            .await
            .map_err(|e| AppError::Transient(format!("获取波动率数据失败: {}", e)))?;
        let vix = shared
            .data_source
            .get_vix_data(start, end)
            .await
            .map_err(|e| AppError::Transient(format!("获取VIX数据失败: {}", e)))?;

        let analysis = shared.engine.analyze(symbol, &prices, &volatility, &vix)?;
        info!(
            "{} 更新成功: 状态{:?} IV百分位{:.1}",
            symbol, analysis.market_regime, analysis.iv_percentile.percentile
        );
        Ok(analysis)
    }

    /// 盘中实时补充刷新：优先高优先级标的，单轮不超过 batch_size 个
    async fn realtime_sweep(shared: Arc<SchedulerShared>) {
        if !shared.running.load(Ordering::SeqCst) {
            return;
        }
        let now = shared.clock.now();
        if !time_util::is_market_open(now) {
            return;
        }
        let stale_after = ChronoDuration::milliseconds((shared.config.update_interval_ms / 2) as i64);

        let candidates: Vec<String> = {
            let symbols = lock(&shared.symbols);
            let high = lock(&shared.high_priority);
            let in_flight = lock(&shared.in_flight);
            let last_success = lock(&shared.last_success);
            let stale = |symbol: &String| {
                !in_flight.contains(symbol)
                    && last_success
                        .get(symbol)
                        .map_or(false, |t| now - *t > stale_after)
            };
            let mut picked: Vec<String> = high
                .iter()
                .filter(|s| symbols.contains(*s) && stale(s))
                .cloned()
                .collect();
            picked.sort();
            let mut rest: Vec<String> = symbols
                .iter()
                .filter(|s| !high.contains(*s) && stale(s))
                .cloned()
                .collect();
            rest.sort();
            picked.extend(rest);
            picked.truncate(shared.config.batch_size);
            picked
        };

        if candidates.is_empty() {
            return;
        }
        debug!("实时刷新 {} 个标的", candidates.len());
        let updates: Vec<_> = candidates
            .iter()
            .map(|symbol| Self::run_update_cycle(&shared, symbol))
            .collect();
        join_all(updates).await;
    }

    fn notify_success(shared: &Arc<SchedulerShared>, symbol: &str, analysis: &VolatilityAnalysis) {
        let callbacks: Vec<Arc<UpdateCallback>> = lock(&shared.update_callbacks).clone();
        let _gate = lock(&shared.notify_gate);
        if !shared.running.load(Ordering::SeqCst) {
            return;
        }
        for callback in callbacks {
            // 连panic一起兜住，订阅方不能拖垮更新循环
            match catch_unwind(AssertUnwindSafe(|| callback(symbol, analysis))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("更新回调执行失败: {} {}", symbol, e),
                Err(_) => error!("更新回调发生panic: {}", symbol),
            }
        }
    }

    fn notify_failure(shared: &Arc<SchedulerShared>, symbol: &str, err: &AppError) {
        let callbacks: Vec<Arc<ErrorCallback>> = lock(&shared.error_callbacks).clone();
        let _gate = lock(&shared.notify_gate);
        if !shared.running.load(Ordering::SeqCst) {
            return;
        }
        for callback in callbacks {
            match catch_unwind(AssertUnwindSafe(|| callback(symbol, err))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("失败回调执行失败: {} {}", symbol, e),
                Err(_) => error!("失败回调发生panic: {}", symbol),
            }
        }
    }

    fn record(shared: &Arc<SchedulerShared>, update: &ScheduledUpdate) {
        lock(&shared.records).insert(update.symbol.clone(), update.clone());
    }
}

// 锁中毒时直接取回内部状态继续使用
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

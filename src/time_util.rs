use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, TimeZone, Timelike, Utc, Weekday};

/// 美东标准时间偏移（秒）
const EST_OFFSET_SECS: i32 = -5 * 3600;
/// 美东夏令时偏移（秒）
const EDT_OFFSET_SECS: i32 = -4 * 3600;

/// 开盘 09:30（美东，分钟数）
const MARKET_OPEN_MINUTES: u32 = 9 * 60 + 30;
/// 收盘 16:00（美东，分钟数），收盘时刻本身视为休市
const MARKET_CLOSE_MINUTES: u32 = 16 * 60;

/// 计算某年某月第 n 个周日的日期
fn nth_sunday(year: i32, month: u32, nth: u32) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let offset = (7 - first.weekday().num_days_from_sunday()) % 7;
    NaiveDate::from_ymd_opt(year, month, 1 + offset + (nth - 1) * 7)
}

/// 判断给定 UTC 时刻是否处于美国夏令时
///
/// 规则：3月第二个周日当地 02:00 起，11月第一个周日当地 02:00 止，
/// 折算为 UTC 即 07:00 / 06:00。
fn in_us_dst(utc: DateTime<Utc>) -> bool {
    let year = utc.year();
    let (start_date, end_date) = match (nth_sunday(year, 3, 2), nth_sunday(year, 11, 1)) {
        (Some(s), Some(e)) => (s, e),
        _ => return false,
    };
    let start = match start_date.and_hms_opt(7, 0, 0) {
        Some(t) => Utc.from_utc_datetime(&t),
        None => return false,
    };
    let end = match end_date.and_hms_opt(6, 0, 0) {
        Some(t) => Utc.from_utc_datetime(&t),
        None => return false,
    };
    utc >= start && utc < end
}

/// 美东时间相对 UTC 的偏移，按美国夏令时规则计算
pub fn eastern_offset(utc: DateTime<Utc>) -> FixedOffset {
    let secs = if in_us_dst(utc) {
        EDT_OFFSET_SECS
    } else {
        EST_OFFSET_SECS
    };
    FixedOffset::east(secs)
}

/// 纽交所常规时段：周一至周五 09:30-16:00（美东）
pub fn is_market_open(utc: DateTime<Utc>) -> bool {
    let local = utc.with_timezone(&eastern_offset(utc));
    if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }
    let minutes = local.hour() * 60 + local.minute();
    minutes >= MARKET_OPEN_MINUTES && minutes < MARKET_CLOSE_MINUTES
}

/// 下一次开盘时刻（UTC）。处于盘中时返回当前时刻。
pub fn next_market_open(utc: DateTime<Utc>) -> DateTime<Utc> {
    if is_market_open(utc) {
        return utc;
    }
    let mut local_date = utc.with_timezone(&eastern_offset(utc)).date_naive();
    // 周末最长跨两天，余量留足
    for _ in 0..8 {
        if !matches!(local_date.weekday(), Weekday::Sat | Weekday::Sun) {
            if let Some(local_open) = local_date.and_hms_opt(9, 30, 0) {
                // 以该日自身的夏令时状态折算回 UTC
                let approx = Utc.from_utc_datetime(&(local_open + Duration::hours(5)));
                let offset = eastern_offset(approx);
                let candidate =
                    Utc.from_utc_datetime(&(local_open - Duration::seconds(offset.local_minus_utc() as i64)));
                if candidate > utc {
                    return candidate;
                }
            }
        }
        match local_date.succ_opt() {
            Some(d) => local_date = d,
            None => break,
        }
    }
    utc
}

/// 时钟抽象，调度与引擎统一经由该接口取当前时间，便于测试注入
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// 系统时钟
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 固定时钟，时间只在显式调用时变化（测试用）
#[derive(Debug)]
pub struct FixedClock {
    millis: AtomicI64,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(now.timestamp_millis()),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        self.millis.store(now.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn advance_millis(&self, millis: i64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match Utc.timestamp_millis_opt(self.millis.load(Ordering::SeqCst)) {
            chrono::LocalResult::Single(datetime) => datetime,
            _ => DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

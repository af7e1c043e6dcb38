// ============================================================================
// AgentSched - 检查间隔计算
// ============================================================================
//
// 文件: src/core/interval.rs
// 职责: 监控项检查间隔解析和下次检查时间计算
// 边界:
//   - ✅ 间隔字符串解析（含时间后缀）
//   - ✅ 灵活间隔解析与生效判断
//   - ✅ 下次检查时间计算
//   - ❌ 不支持调度间隔（md/wd/h/m/s 语法）
//   - ❌ 不应包含任务排队逻辑
//
// ============================================================================

use chrono::{DateTime, Datelike, Duration, DurationRound, Timelike, Utc};
use regex::Regex;
use std::sync::OnceLock;

use crate::error::{Result, SchedulerError};

/// 最大检查间隔（一天）
pub const MAX_DELAY_SECONDS: i64 = 86_400;

/// 不支持监控项的刷新间隔
pub const UNSUPPORTED_REFRESH_SECONDS: i64 = 600;

/// 灵活间隔：在指定星期和时间段内替换默认间隔
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlexInterval {
    pub delay: i64,
    /// 星期范围，1 = 周一
    pub days: (u32, u32),
    /// 一天中的分钟范围，左闭右开
    pub minutes: (u32, u32),
}

impl FlexInterval {
    fn contains(&self, t: DateTime<Utc>) -> bool {
        let day = t.weekday().number_from_monday();
        let minute = t.hour() * 60 + t.minute();
        (self.days.0..=self.days.1).contains(&day)
            && (self.minutes.0..self.minutes.1).contains(&minute)
    }
}

/// 解析后的检查间隔
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateInterval {
    pub delay: i64,
    pub flexible: Vec<FlexInterval>,
}

impl UpdateInterval {
    /// 指定时刻生效的间隔，多个灵活间隔同时生效时取最小值
    pub fn effective_delay(&self, t: DateTime<Utc>) -> i64 {
        self.flexible
            .iter()
            .filter(|flex| flex.contains(t))
            .map(|flex| flex.delay)
            .min()
            .unwrap_or(self.delay)
    }
}

fn simple_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+)([smhdw]?)$").expect("static pattern"))
}

fn flexible_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d+[smhdw]?)/([1-7])(?:-([1-7]))?,(\d{1,2}):(\d{2})-(\d{1,2}):(\d{2})$")
            .expect("static pattern")
    })
}

/// 解析带后缀的时间值，返回秒数
pub fn parse_seconds(value: &str) -> Option<i64> {
    let caps = simple_pattern().captures(value)?;
    let number: i64 = caps[1].parse().ok()?;
    let multiplier = match &caps[2] {
        "" | "s" => 1,
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        "w" => 604_800,
        _ => return None,
    };
    number.checked_mul(multiplier)
}

fn parse_flexible(delay: &str, flex: &str) -> Result<FlexInterval> {
    let caps = flexible_pattern().captures(flex).ok_or_else(|| {
        if flex.starts_with(|c: char| c.is_ascii_alphabetic()) {
            SchedulerError::invalid_interval(delay, "scheduling intervals are not supported")
        } else {
            SchedulerError::invalid_interval(delay, format!("invalid flexible interval \"{}\"", flex))
        }
    })?;

    let flex_delay = parse_seconds(&caps[1])
        .ok_or_else(|| SchedulerError::invalid_interval(delay, "invalid flexible delay"))?;
    if flex_delay > MAX_DELAY_SECONDS {
        return Err(SchedulerError::invalid_interval(delay, "flexible delay exceeds one day"));
    }

    // 正则已保证数字格式
    let number = |i: usize| caps.get(i).map(|m| m.as_str().parse::<u32>().unwrap_or(0));
    let day_from = number(2).unwrap_or(1);
    let day_to = number(3).unwrap_or(day_from);
    let (start_hour, start_min) = (number(4).unwrap_or(0), number(5).unwrap_or(0));
    let (end_hour, end_min) = (number(6).unwrap_or(0), number(7).unwrap_or(0));

    if day_from > day_to {
        return Err(SchedulerError::invalid_interval(delay, "invalid weekday range"));
    }
    if start_min > 59 || end_min > 59 || start_hour > 23 || end_hour > 24 {
        return Err(SchedulerError::invalid_interval(delay, "invalid time of day"));
    }
    let start = start_hour * 60 + start_min;
    let end = end_hour * 60 + end_min;
    if end > 24 * 60 || start >= end {
        return Err(SchedulerError::invalid_interval(delay, "invalid time period"));
    }

    Ok(FlexInterval { delay: flex_delay, days: (day_from, day_to), minutes: (start, end) })
}

/// 解析检查间隔字符串
pub fn parse_interval(delay: &str) -> Result<UpdateInterval> {
    let mut parts = delay.split(';');
    let primary = parts.next().unwrap_or_default().trim();
    if primary.is_empty() {
        return Err(SchedulerError::invalid_interval(delay, "empty interval"));
    }

    let primary = parse_seconds(primary)
        .ok_or_else(|| SchedulerError::invalid_interval(delay, "invalid delay value"))?;
    if primary > MAX_DELAY_SECONDS {
        return Err(SchedulerError::invalid_interval(delay, "delay exceeds one day"));
    }

    let flexible = parts
        .map(|flex| parse_flexible(delay, flex.trim()))
        .collect::<Result<Vec<_>>>()?;

    if primary == 0 && flexible.iter().all(|flex| flex.delay == 0) {
        return Err(SchedulerError::invalid_interval(delay, "item would never be checked"));
    }

    Ok(UpdateInterval { delay: primary, flexible })
}

pub(crate) fn align(itemid: u64, delay: i64, t: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let ts = t.timestamp();
    let shift = (itemid % delay as u64) as i64;
    let mut next = ts - ts.rem_euclid(delay) + shift;
    while next <= ts {
        next += delay;
    }
    DateTime::from_timestamp(next, 0)
}

/// 计算监控项的下次检查时间
///
/// 同一监控项的检查时间按 `itemid % delay` 错开，保证结果严格晚于 `now`。
pub fn next_check(
    itemid: u64,
    delay: &str,
    unsupported: bool,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    let interval = parse_interval(delay)?;
    let overflow = || SchedulerError::invalid_interval(delay, "next check is out of range");

    if unsupported {
        return align(itemid, UNSUPPORTED_REFRESH_SECONDS, now).ok_or_else(overflow);
    }

    // 当前不生效时按分钟向后查找第一个非零间隔
    let mut t = now;
    for _ in 0..=7 * 24 * 60 {
        let effective = interval.effective_delay(t);
        if effective > 0 {
            return align(itemid, effective, t).ok_or_else(overflow);
        }
        t = t.duration_trunc(Duration::minutes(1)).map_err(|_| overflow())? + Duration::minutes(1);
    }

    Err(SchedulerError::invalid_interval(delay, "item would never be checked"))
}

//! 반복 스케줄 매칭 -- 항상 / 매일 / 매주, 시간대와 자정 넘김 지원
//!
//! YAML 표현:
//! ```yaml
//! schedule:
//!   daily: { from: "22:00", to: "06:00", timezone: "Europe/Paris" }
//! ---
//! schedule:
//!   weekly:
//!     from: { weekday: Friday, time: "18:00" }
//!     to: { weekday: Monday, time: "08:00" }
//!     timezone: Asia/Tokyo
//! ---
//! schedule:
//!   always: true
//! ```
//!
//! 구간은 반닫힌 구간 `from <= t < to`입니다. `from > to`이면 자정(주간은 토요일
//! 자정)을 넘는 구간으로 해석하고, `from == to`이면 전체 기간과 일치합니다.

use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;
use serde::Deserialize;

use crate::error::ProcessorError;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// 요일 이름 (일요일 = 0)
const WEEKDAYS: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScheduleConfig {
    #[serde(default)]
    always: Option<bool>,
    #[serde(default)]
    daily: Option<DailyConfig>,
    #[serde(default)]
    weekly: Option<WeeklyConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct DailyConfig {
    from: String,
    to: String,
    #[serde(default)]
    timezone: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct WeekTimeConfig {
    weekday: String,
    time: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct WeeklyConfig {
    from: WeekTimeConfig,
    to: WeekTimeConfig,
    #[serde(default)]
    timezone: String,
}

/// 해석된 스케줄
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "ScheduleConfig")]
pub enum Schedule {
    /// 항상 일치
    #[default]
    Always,
    /// 매일 반복 (분 단위, 하루 안의 오프셋)
    Daily { from: u32, to: u32, tz: Tz },
    /// 매주 반복 (분 단위, 일요일 00:00부터의 오프셋)
    Weekly { from: u32, to: u32, tz: Tz },
}

impl Schedule {
    /// 매일 스케줄을 만듭니다. 시각은 `HH:MM` 형식입니다.
    pub fn daily(from: &str, to: &str, timezone: &str) -> Result<Self, ProcessorError> {
        Ok(Self::Daily {
            from: parse_time(from)?,
            to: parse_time(to)?,
            tz: parse_timezone(timezone)?,
        })
    }

    /// 매주 스케줄을 만듭니다.
    ///
    /// 같은 요일에서 `to`가 `from`보다 이르거나 같으면 에러입니다.
    pub fn weekly(
        from: (&str, &str),
        to: (&str, &str),
        timezone: &str,
    ) -> Result<Self, ProcessorError> {
        let (from_day, from_time) = (parse_weekday(from.0)?, parse_time(from.1)?);
        let (to_day, to_time) = (parse_weekday(to.0)?, parse_time(to.1)?);
        if from_day == to_day && to_time <= from_time {
            return Err(ProcessorError::Schedule(format!(
                "weekly window on {} must end after it starts ({} -> {})",
                from.0, from.1, to.1
            )));
        }
        Ok(Self::Weekly {
            from: from_day * MINUTES_PER_DAY + from_time,
            to: to_day * MINUTES_PER_DAY + to_time,
            tz: parse_timezone(timezone)?,
        })
    }

    /// 시각이 스케줄 구간 안에 있는지 확인합니다.
    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        match self {
            Self::Always => true,
            Self::Daily { from, to, tz } => {
                let local = at.with_timezone(tz);
                let minute = local.hour() * 60 + local.minute();
                in_window(minute, *from, *to)
            }
            Self::Weekly { from, to, tz } => {
                let local = at.with_timezone(tz);
                let minute = local.weekday().num_days_from_sunday() * MINUTES_PER_DAY
                    + local.hour() * 60
                    + local.minute();
                in_window(minute, *from, *to)
            }
        }
    }
}

impl TryFrom<ScheduleConfig> for Schedule {
    type Error = ProcessorError;

    fn try_from(config: ScheduleConfig) -> Result<Self, Self::Error> {
        match (config.always, config.daily, config.weekly) {
            (Some(true), None, None) => Ok(Self::Always),
            (Some(false), None, None) => Err(ProcessorError::Schedule(
                "'always: false' never matches; remove the schedule or use daily/weekly"
                    .to_owned(),
            )),
            (None, Some(d), None) => Self::daily(&d.from, &d.to, &d.timezone),
            (None, None, Some(w)) => Self::weekly(
                (&w.from.weekday, &w.from.time),
                (&w.to.weekday, &w.to.time),
                &w.timezone,
            ),
            (None, None, None) => Err(ProcessorError::Schedule(
                "empty schedule: expected one of always, daily, weekly".to_owned(),
            )),
            _ => Err(ProcessorError::Schedule(
                "only one of always, daily, weekly may be set".to_owned(),
            )),
        }
    }
}

fn in_window(minute: u32, from: u32, to: u32) -> bool {
    if from == to {
        return true;
    }
    if from < to {
        from <= minute && minute < to
    } else {
        minute >= from || minute < to
    }
}

/// `HH:MM`을 자정부터의 분으로 변환합니다.
fn parse_time(s: &str) -> Result<u32, ProcessorError> {
    let invalid = || ProcessorError::Schedule(format!("invalid time '{s}', expected HH:MM"));
    let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
    if h.len() != 2 || m.len() != 2 {
        return Err(invalid());
    }
    let hour: u32 = h.parse().map_err(|_| invalid())?;
    let minute: u32 = m.parse().map_err(|_| invalid())?;
    if hour > 23 || minute > 59 {
        return Err(invalid());
    }
    Ok(hour * 60 + minute)
}

fn parse_weekday(s: &str) -> Result<u32, ProcessorError> {
    WEEKDAYS
        .iter()
        .position(|w| *w == s)
        .map(|i| i as u32)
        .ok_or_else(|| ProcessorError::Schedule(format!("'{s}' is not a valid weekday")))
}

fn parse_timezone(s: &str) -> Result<Tz, ProcessorError> {
    if s.is_empty() {
        return Ok(Tz::UTC);
    }
    s.parse::<Tz>()
        .map_err(|e| ProcessorError::Schedule(format!("invalid timezone '{s}': {e}")))
}

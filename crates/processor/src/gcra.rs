//! GCRA (Generic Cell Rate Algorithm) 레이트 리미터
//!
//! 셀마다 이론적 도착 시각(TAT) 하나만 공유 캐시에 저장합니다.
//! 모든 시각과 간격은 마이크로초 정수로 계산합니다.
//!
//! ```text
//! T       = period / rate          (방출 간격)
//! tau     = T * burst              (버스트 허용치)
//! tat     = max(stored_tat, now)
//! new_tat = tat + T
//! allow   = new_tat - tau
//! now < allow  → 제한 (retry_after = allow - now)
//! 그 외        → 허용, new_tat 저장 (TTL = new_tat - now)
//! ```
//!
//! 평가는 캐시 쪽에서 원자적으로 이뤄집니다. Redis는 아래 Lua 스크립트를,
//! 인메모리 캐시는 뮤텍스 아래에서 [`evaluate`]를 실행합니다.

use std::time::Duration;

/// 제한 파라미터
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gcra {
    /// 버스트 크기 (연속 허용 요청 수)
    pub burst: u32,
    /// 기간당 허용 요청 수
    pub rate: u32,
    /// 기간
    pub period: Duration,
}

/// 평가 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcraMode {
    /// 요청 1개를 소비
    Perform,
    /// 상태만 확인 (소비 없음)
    Inspect,
}

/// 평가 결과
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GcraStatus {
    /// 제한 여부
    pub limited: bool,
    /// 남은 허용 요청 수
    pub remaining: u32,
    /// 다음 요청이 허용되기까지 대기 시간 (제한되지 않았으면 `None`)
    pub retry_after: Option<Duration>,
    /// 셀이 완전히 초기화되기까지 시간
    pub reset_after: Duration,
}

/// 평가 후 저장할 새 TAT와 TTL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GcraUpdate {
    /// 마이크로초 단위 TAT
    pub tat: u64,
    pub ttl: Duration,
}

impl Gcra {
    /// 방출 간격 (마이크로초, 최소 1)
    pub(crate) fn emission_micros(&self) -> u64 {
        let period = u64::try_from(self.period.as_micros()).unwrap_or(u64::MAX);
        (period / u64::from(self.rate.max(1))).max(1)
    }

    /// 버스트 허용치 (마이크로초)
    pub(crate) fn tolerance_micros(&self) -> u64 {
        self.emission_micros().saturating_mul(u64::from(self.burst))
    }
}

/// GCRA를 평가합니다.
///
/// `stored_tat`과 `now`는 같은 기준의 마이크로초 단위 시각입니다.
/// 정수 연산이라 `burst`번째 요청까지 정확히 허용됩니다.
/// `Perform`에서 허용되면 저장할 값을 함께 돌려줍니다.
pub(crate) fn evaluate(
    gcra: &Gcra,
    stored_tat: Option<u64>,
    now: u64,
    mode: GcraMode,
) -> (GcraStatus, Option<GcraUpdate>) {
    let emission = gcra.emission_micros();
    let tolerance = gcra.tolerance_micros();

    let tat = stored_tat.map_or(now, |t| t.max(now));
    let new_tat = tat.saturating_add(emission);
    let allow_at = new_tat.saturating_sub(tolerance);

    if now < allow_at {
        let status = GcraStatus {
            limited: true,
            remaining: 0,
            retry_after: Some(Duration::from_micros(allow_at - now)),
            reset_after: Duration::from_micros(tat - now),
        };
        return (status, None);
    }

    let diff = now - allow_at;
    let reset_after = Duration::from_micros(new_tat - now);
    let status = GcraStatus {
        limited: false,
        remaining: u32::try_from(diff / emission).unwrap_or(u32::MAX),
        retry_after: None,
        reset_after,
    };
    let update = match mode {
        GcraMode::Perform => Some(GcraUpdate {
            tat: new_tat,
            ttl: reset_after,
        }),
        GcraMode::Inspect => None,
    };
    (status, update)
}

/// 요청을 소비하는 Redis 스크립트
///
/// 시각은 모두 마이크로초 정수입니다 (2^53 미만이라 Lua 숫자로 정확히 표현됨).
/// KEYS[1] = 셀 키, ARGV = emission, tolerance, cost.
/// 반환: `{limited(0/1), remaining, retry_after(-1=없음), reset_after}`
pub(crate) const PERFORM_GCRA_LUA: &str = r#"
redis.replicate_commands()
local emission = tonumber(ARGV[1])
local tolerance = tonumber(ARGV[2])
local cost = tonumber(ARGV[3])

local t = redis.call("TIME")
local now = tonumber(t[1]) * 1000000 + tonumber(t[2])

local tat = tonumber(redis.call("GET", KEYS[1]))
if not tat or tat < now then
  tat = now
end

local new_tat = tat + emission * cost
local allow_at = new_tat - tolerance

if now < allow_at then
  return {1, 0, allow_at - now, tat - now}
end

local reset_after = new_tat - now
if reset_after > 0 then
  redis.call("SET", KEYS[1], string.format("%.0f", new_tat), "PX", math.ceil(reset_after / 1000))
end
return {0, math.floor((now - allow_at) / emission), -1, reset_after}
"#;

/// 상태만 확인하는 Redis 스크립트 (인자와 반환 형식은 [`PERFORM_GCRA_LUA`]와 같음)
pub(crate) const INSPECT_GCRA_LUA: &str = r#"
local emission = tonumber(ARGV[1])
local tolerance = tonumber(ARGV[2])
local cost = tonumber(ARGV[3])

local t = redis.call("TIME")
local now = tonumber(t[1]) * 1000000 + tonumber(t[2])

local tat = tonumber(redis.call("GET", KEYS[1]))
if not tat or tat < now then
  tat = now
end

local new_tat = tat + emission * cost
local allow_at = new_tat - tolerance

if now < allow_at then
  return {1, 0, allow_at - now, tat - now}
end
return {0, math.floor((now - allow_at) / emission), -1, new_tat - now}
"#;

/// Redis 스크립트 응답(마이크로초)을 결과로 변환합니다.
pub(crate) fn status_from_reply(
    limited: i64,
    remaining: i64,
    retry_after: i64,
    reset_after: i64,
) -> GcraStatus {
    let micros = |v: i64| Duration::from_micros(u64::try_from(v).unwrap_or(0));
    GcraStatus {
        limited: limited == 1,
        remaining: u32::try_from(remaining.max(0)).unwrap_or(u32::MAX),
        retry_after: (retry_after >= 0).then(|| micros(retry_after)),
        reset_after: micros(reset_after),
    }
}

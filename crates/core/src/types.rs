//! 도메인 타입 -- 로그, 처리 상태, 그룹, 알림 대상
//!
//! 큐에서 꺼낸 JSON 페이로드는 [`Log`]로 디코딩되어 파이프라인 단계를 거치며,
//! 각 단계는 [`Status`]와 [`Group`] 목록을 갱신합니다.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// 디코딩 실패 시 합성 로그에 붙는 identity 키
pub const INTERNAL_ERROR_KEY: &str = "snooze.internal";

/// 미래 타임스탬프로 간주하기 전 허용 오차 (초)
pub const DEFAULT_FUTURE_TOLERANCE_SECS: i64 = 60;

/// 로그 출처
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// 출처 유형 (예: `syslog`, `otlp`)
    #[serde(default)]
    pub kind: String,
    /// 출처 이름 (예: 호스트명)
    #[serde(default)]
    pub name: String,
}

/// 처리 상태 종류
///
/// 우선순위: Dropped > ActiveCheck > Ratelimited > Silenced > Snoozed > Active.
/// `Acked`는 처리기 밖에서만 설정되며 Active와 같은 순위입니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    #[default]
    Active,
    Snoozed,
    Silenced,
    Ratelimited,
    Dropped,
    #[serde(rename = "activecheck")]
    ActiveCheck,
    Acked,
}

impl StatusKind {
    /// 상태 우선순위 (클수록 우선)
    pub fn rank(self) -> u8 {
        match self {
            Self::Active | Self::Acked => 0,
            Self::Snoozed => 1,
            Self::Silenced => 2,
            Self::Ratelimited => 3,
            Self::ActiveCheck => 4,
            Self::Dropped => 5,
        }
    }

    /// 메트릭 레이블 등에 쓰는 문자열
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Snoozed => "snoozed",
            Self::Silenced => "silenced",
            Self::Ratelimited => "ratelimited",
            Self::Dropped => "dropped",
            Self::ActiveCheck => "activecheck",
            Self::Acked => "acked",
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 로그의 가변 처리 상태
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    /// 현재 상태
    #[serde(default)]
    pub kind: StatusKind,
    /// 알림 발송 생략
    #[serde(default)]
    pub skip_notification: bool,
    /// 저장 생략
    #[serde(default)]
    pub skip_storage: bool,
    /// 상태 변경 사유
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    /// 상태를 유발한 객체 ID (스누즈 ID, 레이트리밋 이력 ID 등)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
}

impl Status {
    /// 새 상태가 현재 상태보다 우선순위가 높을 때만 변경합니다.
    ///
    /// 변경되면 `reason`과 `object_id`를 비우고 `true`를 반환합니다.
    pub fn change(&mut self, kind: StatusKind) -> bool {
        if kind.rank() <= self.kind.rank() {
            return false;
        }
        self.kind = kind;
        self.reason.clear();
        self.object_id = None;
        true
    }
}

/// 그룹 소속 정보
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// 그룹 규칙 이름
    pub name: String,
    /// 레이블 집합의 해시 ([`crate::hash::compute_hash`])
    pub hash: String,
    /// 그룹 키를 이루는 레이블
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Group {
    /// 레이블로부터 해시를 계산해 그룹을 만듭니다.
    pub fn new(name: impl Into<String>, labels: BTreeMap<String, String>) -> Self {
        let hash = crate::hash::compute_hash(&labels);
        Self {
            name: name.into(),
            hash,
            labels,
        }
    }

    /// 저장소 문서 ID (`<name>.<hash>`)
    pub fn document_id(&self) -> String {
        format!("{}.{}", self.name, self.hash)
    }
}

/// 알림 대상
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    /// 알림 큐 이름
    pub queue: String,
    /// 큐 내부 프로필 (채널/템플릿 선택)
    #[serde(default)]
    pub profile: String,
}

/// 타임스탬프 정규화 경고
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampWarning {
    /// 발생 시각 없음
    Missing,
    /// 발생 시각이 허용 오차보다 미래
    Future,
}

/// 파이프라인이 처리하는 로그 항목
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    /// 저장 후 할당된 문서 ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// 이벤트 발생 시각
    #[serde(default)]
    pub actual_time: DateTime<Utc>,
    /// 수집 시각
    #[serde(default)]
    pub observed_time: DateTime<Utc>,
    /// 표시용 시각
    #[serde(default)]
    pub display_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_warning: Option<TimestampWarning>,
    #[serde(default)]
    pub source: Source,
    #[serde(default)]
    pub identity: BTreeMap<String, String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub severity_text: String,
    #[serde(default)]
    pub severity_number: i32,
    /// 매칭된 프로필 이름
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    /// 매칭된 패턴 이름
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, rename = "traceID", skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub groups: Vec<Group>,
    /// 액티브 체크 응답 주소
    #[serde(
        default,
        rename = "activeCheckURL",
        skip_serializing_if = "Option::is_none"
    )]
    pub active_check_url: Option<String>,
    /// 합성 에러 로그의 원인
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub status: Status,
}

impl Log {
    /// 큐 페이로드를 디코딩합니다.
    ///
    /// 디코딩에 실패하면 원본 데이터를 메시지로 담은 에러 로그를 돌려주므로
    /// 잘못된 페이로드도 파이프라인을 통과해 운영자에게 보입니다.
    pub fn decode(data: &[u8], now: DateTime<Utc>) -> Self {
        match serde_json::from_slice::<Self>(data) {
            Ok(log) => log,
            Err(e) => Self::error_log(data, &e.to_string(), now),
        }
    }

    /// 디코딩 실패를 나타내는 합성 로그를 만듭니다.
    pub fn error_log(raw: &[u8], error: &str, now: DateTime<Utc>) -> Self {
        let mut identity = BTreeMap::new();
        identity.insert(INTERNAL_ERROR_KEY.to_owned(), "error".to_owned());
        Self {
            actual_time: now,
            observed_time: now,
            display_time: now,
            identity,
            message: String::from_utf8_lossy(raw).into_owned(),
            error: Some(error.to_owned()),
            ..Self::default()
        }
    }

    /// 타임스탬프를 정규화합니다.
    ///
    /// - 수집 시각이 없으면 `now`
    /// - 발생 시각이 없거나 `tolerance`보다 미래이면 수집 시각으로 대체하고 경고 표시
    /// - 표시 시각이 없으면 발생 시각
    pub fn normalize_timestamps(&mut self, now: DateTime<Utc>, tolerance: Duration) {
        let unset = DateTime::<Utc>::default();
        if self.observed_time == unset {
            self.observed_time = now;
        }
        if self.actual_time == unset {
            self.actual_time = self.observed_time;
            self.timestamp_warning = Some(TimestampWarning::Missing);
        } else if self.actual_time > self.observed_time + tolerance {
            self.actual_time = self.observed_time;
            self.timestamp_warning = Some(TimestampWarning::Future);
        }
        if self.display_time == unset {
            self.display_time = self.actual_time;
        }
    }

    /// 이름으로 그룹을 찾습니다.
    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// 같은 이름의 그룹이 없을 때만 추가합니다.
    pub fn add_group(&mut self, group: Group) -> bool {
        if self.group(&group.name).is_some() {
            return false;
        }
        self.groups.push(group);
        true
    }
}

/// 알림 큐로 발행되는 메시지
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// 알림 대상 항목 유형 (현재 `log`만 사용)
    #[serde(rename = "type")]
    pub kind: String,
    pub destination: Destination,
    pub identity: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub source: Source,
    /// 원본 항목의 문서 ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    pub message: String,
    pub notification_time: DateTime<Utc>,
}

impl Notification {
    /// 로그 하나에 대한 알림을 만듭니다.
    pub fn for_log(log: &Log, destination: Destination, now: DateTime<Utc>) -> Self {
        Self {
            kind: "log".to_owned(),
            destination,
            identity: log.identity.clone(),
            labels: log.labels.clone(),
            source: log.source.clone(),
            item_id: log.id.clone(),
            message: log.message.clone(),
            notification_time: now,
        }
    }
}

//! 필드 경로 컴파일과 값 추출

use std::borrow::Cow;
use std::fmt;

use serde::Deserialize;
use snooze_core::Log;

use super::lexer::read_quoted;
use super::{LangError, Value};

/// 컴파일된 필드 접근자
#[derive(Debug, Clone, PartialEq, Eq)]
enum Accessor {
    SourceKind,
    SourceName,
    Identity(String),
    Label(String),
    IdentityMap,
    LabelsMap,
    Message,
    SeverityText,
    SeverityNumber,
    Profile,
    Pattern,
    Error,
    Status,
    TraceId,
}

/// 로그 속성 하나를 가리키는 필드 경로
///
/// ```
/// use snooze_processor::lang::Field;
///
/// let field = Field::compile(r#"labels["k8s.pod"]"#).unwrap();
/// assert_eq!(field.path(), r#"labels["k8s.pod"]"#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Field {
    path: String,
    accessor: Accessor,
}

impl Field {
    /// 경로 문자열을 접근자로 컴파일합니다.
    pub fn compile(path: &str) -> Result<Self, LangError> {
        let path = path.trim();
        let accessor = match path {
            "source.kind" => Accessor::SourceKind,
            "source.name" => Accessor::SourceName,
            "message" => Accessor::Message,
            "severity" | "severity_text" | "severityText" => Accessor::SeverityText,
            "severity_number" | "severityNumber" => Accessor::SeverityNumber,
            "profile" => Accessor::Profile,
            "pattern" => Accessor::Pattern,
            "error" => Accessor::Error,
            "status" | "status.kind" => Accessor::Status,
            "trace_id" | "traceID" => Accessor::TraceId,
            _ => {
                if let Some(key) = map_selector(path, "identity")? {
                    key.map_or(Accessor::IdentityMap, Accessor::Identity)
                } else if let Some(key) = map_selector(path, "labels")? {
                    key.map_or(Accessor::LabelsMap, Accessor::Label)
                } else {
                    return Err(LangError::UnknownField(path.to_owned()));
                }
            }
        };
        Ok(Self {
            path: path.to_owned(),
            accessor,
        })
    }

    /// 원본 경로 문자열
    pub fn path(&self) -> &str {
        &self.path
    }

    /// 별칭과 표기법에 상관없이 같은 접근자면 같은 이름
    ///
    /// `labels["k8s.pod"]`와 `labels.k8s.pod`는 모두 `labels.k8s.pod`입니다.
    pub fn canonical_name(&self) -> Cow<'static, str> {
        match &self.accessor {
            Accessor::SourceKind => Cow::Borrowed("source.kind"),
            Accessor::SourceName => Cow::Borrowed("source.name"),
            Accessor::Identity(key) => Cow::Owned(format!("identity.{key}")),
            Accessor::Label(key) => Cow::Owned(format!("labels.{key}")),
            Accessor::IdentityMap => Cow::Borrowed("identity"),
            Accessor::LabelsMap => Cow::Borrowed("labels"),
            Accessor::Message => Cow::Borrowed("message"),
            Accessor::SeverityText => Cow::Borrowed("severity_text"),
            Accessor::SeverityNumber => Cow::Borrowed("severity_number"),
            Accessor::Profile => Cow::Borrowed("profile"),
            Accessor::Pattern => Cow::Borrowed("pattern"),
            Accessor::Error => Cow::Borrowed("error"),
            Accessor::Status => Cow::Borrowed("status"),
            Accessor::TraceId => Cow::Borrowed("trace_id"),
        }
    }

    /// 로그에서 값을 꺼냅니다. 없는 키는 null입니다.
    pub(crate) fn resolve<'a>(&self, log: &'a Log) -> Value<'a> {
        fn opt(v: &Option<String>) -> Value<'_> {
            v.as_deref()
                .map_or(Value::Null, |s| Value::Str(Cow::Borrowed(s)))
        }

        match &self.accessor {
            Accessor::SourceKind => Value::Str(Cow::Borrowed(&log.source.kind)),
            Accessor::SourceName => Value::Str(Cow::Borrowed(&log.source.name)),
            Accessor::Identity(key) => log
                .identity
                .get(key)
                .map_or(Value::Null, |v| Value::Str(Cow::Borrowed(v))),
            Accessor::Label(key) => log
                .labels
                .get(key)
                .map_or(Value::Null, |v| Value::Str(Cow::Borrowed(v))),
            Accessor::IdentityMap => Value::Map(log.identity.len()),
            Accessor::LabelsMap => Value::Map(log.labels.len()),
            Accessor::Message => Value::Str(Cow::Borrowed(&log.message)),
            Accessor::SeverityText => Value::Str(Cow::Borrowed(&log.severity_text)),
            Accessor::SeverityNumber => Value::Int(i64::from(log.severity_number)),
            Accessor::Profile => opt(&log.profile),
            Accessor::Pattern => opt(&log.pattern),
            Accessor::Error => opt(&log.error),
            Accessor::Status => Value::Str(Cow::Borrowed(log.status.kind.as_str())),
            Accessor::TraceId => opt(&log.trace_id),
        }
    }

    /// 값을 문자열로 추출합니다.
    ///
    /// 값이 없으면 [`LangError::FieldMissing`], 맵 전체를 가리키면
    /// [`LangError::NotScalar`]를 반환합니다.
    pub fn extract(&self, log: &Log) -> Result<String, LangError> {
        match self.resolve(log) {
            Value::Null => Err(LangError::FieldMissing(self.path.clone())),
            value => value
                .to_scalar_string()
                .ok_or_else(|| LangError::NotScalar(self.path.clone())),
        }
    }
}

impl TryFrom<String> for Field {
    type Error = LangError;

    fn try_from(path: String) -> Result<Self, Self::Error> {
        Self::compile(&path)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// `root`, `root.key`, `root["key"]` 형태를 해석합니다.
///
/// 경로가 `root`로 시작하지 않으면 `Ok(None)`, 맵 전체면 `Ok(Some(None))`.
fn map_selector(path: &str, root: &str) -> Result<Option<Option<String>>, LangError> {
    let Some(rest) = path.strip_prefix(root) else {
        return Ok(None);
    };
    if rest.is_empty() {
        return Ok(Some(None));
    }
    if let Some(key) = rest.strip_prefix('.') {
        if key.is_empty() {
            return Err(LangError::UnknownField(path.to_owned()));
        }
        return Ok(Some(Some(key.to_owned())));
    }
    if rest.starts_with('[') {
        let chars: Vec<char> = rest.chars().collect();
        if !matches!(chars.get(1), Some('"' | '\'' | '`')) {
            return Err(LangError::UnknownField(path.to_owned()));
        }
        let (key, end) =
            read_quoted(&chars, 1).map_err(|_| LangError::UnknownField(path.to_owned()))?;
        if chars.get(end) != Some(&']') || end + 1 != chars.len() {
            return Err(LangError::UnknownField(path.to_owned()));
        }
        return Ok(Some(Some(key)));
    }
    Ok(None)
}

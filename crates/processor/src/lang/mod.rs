//! 규칙 언어 -- 조건식, 필드 경로, 템플릿
//!
//! 운영자가 YAML에 쓰는 세 가지 작은 언어를 컴파일합니다.
//!
//! - [`Condition`]: `identity.host == "web-01" && labels.env in ["prod", "stage"]`
//! - [`Field`]: `source.kind`, `labels["k8s.pod"]`
//! - [`Template`]: `"{{ identity.host }}: {{ capture.code }}"`
//!
//! 필드 경로는 컴파일 시점에 고정된 속성 스키마의 접근자로 해석되므로
//! 평가 중에 이름을 다시 조회하지 않습니다. 없는 키는 null로 평가되고,
//! null과의 비교는 매칭되지 않습니다.

mod condition;
mod field;
mod lexer;
mod template;

use std::borrow::Cow;
use std::collections::BTreeMap;

pub use condition::Condition;
pub use field::Field;
pub use template::Template;

/// 정규식 캡처 그룹 (이름 → 값)
pub type Captures = BTreeMap<String, String>;

/// 규칙 언어 에러
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LangError {
    /// 구문 에러
    #[error("syntax error at position {position} in '{expr}': {reason}")]
    Syntax {
        expr: String,
        position: usize,
        reason: String,
    },

    /// 알 수 없는 필드 경로
    #[error("unknown field '{0}'")]
    UnknownField(String),

    /// 알 수 없는 함수
    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    /// 정규식 컴파일 실패
    #[error("invalid regex '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },

    /// 연산자와 피연산자 타입 불일치
    #[error("type mismatch: cannot apply '{op}' to {lhs} and {rhs}")]
    TypeMismatch {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },

    /// 불리언이 필요한 곳에 다른 타입
    #[error("expected boolean, got {0}")]
    NotBoolean(&'static str),

    /// 필드 값 없음
    #[error("field '{0}' is missing")]
    FieldMissing(String),

    /// 맵 등 스칼라가 아닌 필드
    #[error("field '{0}' is not a scalar")]
    NotScalar(String),

    /// 템플릿 구문 에러
    #[error("template error in '{template}': {reason}")]
    Template { template: String, reason: String },
}

/// 평가 중의 값
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Value<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Cow<'a, str>),
    List(Vec<Value<'a>>),
    /// 맵 전체 (`has(labels)` 용). 항목 수만 보관합니다.
    Map(usize),
}

impl Value<'_> {
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    /// 상수 값을 빌린 형태로 복사합니다.
    pub(crate) fn reborrow(&self) -> Value<'_> {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(n) => Value::Int(*n),
            Self::Float(f) => Value::Float(*f),
            Self::Str(s) => Value::Str(Cow::Borrowed(s.as_ref())),
            Self::List(items) => Value::List(items.iter().map(Value::reborrow).collect()),
            Self::Map(n) => Value::Map(*n),
        }
    }

    /// `has()` 기준의 존재 여부
    pub(crate) fn is_present(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(n) => *n != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) => !items.is_empty(),
            Self::Map(n) => *n > 0,
        }
    }

    /// 스칼라 값을 문자열로 변환합니다.
    pub(crate) fn to_scalar_string(&self) -> Option<String> {
        match self {
            Self::Bool(b) => Some(b.to_string()),
            Self::Int(n) => Some(n.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::Str(s) => Some(s.to_string()),
            Self::Null | Self::List(_) | Self::Map(_) => None,
        }
    }
}

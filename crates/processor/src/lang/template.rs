//! `{{ path }}` 템플릿

use std::fmt;

use serde::Deserialize;
use snooze_core::Log;

use super::field::Field;
use super::{Captures, LangError};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Field(Field),
    Capture(String),
}

/// 로그 필드와 정규식 캡처를 치환하는 문자열 템플릿
///
/// `{{ capture.<name> }}`은 직전 정규식 액션/패턴의 이름 있는 그룹을 가리킵니다.
/// 없는 값은 빈 문자열로 치환됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Template {
    source: String,
    parts: Vec<Part>,
}

impl Template {
    pub fn compile(source: &str) -> Result<Self, LangError> {
        let mut parts = Vec::new();
        let mut rest = source;

        while let Some(open) = rest.find("{{") {
            if open > 0 {
                parts.push(Part::Literal(rest[..open].to_owned()));
            }
            let after = &rest[open + 2..];
            let Some(close) = after.find("}}") else {
                return Err(LangError::Template {
                    template: source.to_owned(),
                    reason: "unclosed '{{'".to_owned(),
                });
            };
            let path = after[..close].trim();
            if path.is_empty() {
                return Err(LangError::Template {
                    template: source.to_owned(),
                    reason: "empty placeholder".to_owned(),
                });
            }
            let part = match path.strip_prefix("capture.") {
                Some(name) if !name.is_empty() => Part::Capture(name.to_owned()),
                _ => Part::Field(Field::compile(path)?),
            };
            parts.push(part);
            rest = &after[close + 2..];
        }
        if !rest.is_empty() {
            parts.push(Part::Literal(rest.to_owned()));
        }

        Ok(Self {
            source: source.to_owned(),
            parts,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// 템플릿을 렌더링합니다.
    pub fn render(&self, log: &Log, captures: &Captures) -> String {
        let mut out = String::with_capacity(self.source.len());
        for part in &self.parts {
            match part {
                Part::Literal(s) => out.push_str(s),
                Part::Field(field) => {
                    if let Some(s) = field.resolve(log).to_scalar_string() {
                        out.push_str(&s);
                    }
                }
                Part::Capture(name) => {
                    if let Some(s) = captures.get(name) {
                        out.push_str(s);
                    }
                }
            }
        }
        out
    }
}

impl TryFrom<String> for Template {
    type Error = LangError;

    fn try_from(source: String) -> Result<Self, Self::Error> {
        Self::compile(&source)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_log() -> Log {
        let mut log = Log {
            message: "user alice failed login".to_owned(),
            ..Log::default()
        };
        log.identity.insert("host".to_owned(), "web-01".to_owned());
        log
    }

    #[test]
    fn renders_literal_only() {
        let t = Template::compile("static text").unwrap();
        assert_eq!(t.render(&sample_log(), &Captures::new()), "static text");
    }

    #[test]
    fn renders_fields_and_captures() {
        let t = Template::compile("{{ identity.host }}: {{capture.user}} ({{ severity_number }})")
            .unwrap();
        let mut captures = Captures::new();
        captures.insert("user".to_owned(), "alice".to_owned());
        assert_eq!(t.render(&sample_log(), &captures), "web-01: alice (0)");
    }

    #[test]
    fn missing_values_render_empty() {
        let t = Template::compile("[{{ identity.pod }}][{{ capture.none }}]").unwrap();
        assert_eq!(t.render(&sample_log(), &Captures::new()), "[][]");
    }

    #[test]
    fn compile_errors() {
        assert!(Template::compile("{{ identity.host ").is_err());
        assert!(Template::compile("{{ }}").is_err());
        assert!(matches!(
            Template::compile("{{ nope }}"),
            Err(LangError::UnknownField(_))
        ));
    }

    #[test]
    fn deserializes_from_string() {
        let t: Template = serde_yaml::from_str("'{{ message }}!'").unwrap();
        assert_eq!(t.render(&sample_log(), &Captures::new()), "user alice failed login!");
    }
}

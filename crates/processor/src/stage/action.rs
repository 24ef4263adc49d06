//! 변환 액션 -- Set / Unset / Regex
//!
//! YAML에서는 키 하나짜리 맵으로 씁니다.
//!
//! ```yaml
//! actions:
//!   - regex: { field: message, match: 'user (?P<user>\w+)' }
//!   - set: { labels: { user: "{{ capture.user }}" } }
//!   - unset: { labels: [pid] }
//! ```

use std::collections::BTreeMap;

use regex::Regex;
use serde::Deserialize;
use snooze_core::Log;

use crate::lang::{Captures, Field, LangError, Template};

/// 값을 템플릿으로 설정
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetAction {
    #[serde(default)]
    pub identity: BTreeMap<String, Template>,
    #[serde(default)]
    pub labels: BTreeMap<String, Template>,
    #[serde(default)]
    pub message: Option<Template>,
}

/// 키 제거
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnsetAction {
    #[serde(default)]
    pub identity: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub all_identity: bool,
    #[serde(default)]
    pub all_labels: bool,
}

/// 이름 있는 캡처 그룹 추출
#[derive(Debug, Clone)]
pub struct RegexAction {
    pub field: Field,
    pub regex: Regex,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RegexActionConfig {
    field: Field,
    #[serde(rename = "match")]
    pattern: String,
}

/// YAML 표현 (정확히 하나의 키)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ActionConfig {
    #[serde(default)]
    set: Option<SetAction>,
    #[serde(default)]
    unset: Option<UnsetAction>,
    #[serde(default)]
    regex: Option<RegexActionConfig>,
}

/// 변환 액션
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "ActionConfig")]
pub enum Action {
    Set(SetAction),
    Unset(UnsetAction),
    Regex(RegexAction),
}

impl TryFrom<ActionConfig> for Action {
    type Error = String;

    fn try_from(config: ActionConfig) -> Result<Self, Self::Error> {
        match (config.set, config.unset, config.regex) {
            (Some(set), None, None) => Ok(Self::Set(set)),
            (None, Some(unset), None) => Ok(Self::Unset(unset)),
            (None, None, Some(re)) => {
                let regex = Regex::new(&re.pattern).map_err(|e| {
                    LangError::InvalidRegex {
                        pattern: re.pattern.clone(),
                        reason: e.to_string(),
                    }
                    .to_string()
                })?;
                Ok(Self::Regex(RegexAction {
                    field: re.field,
                    regex,
                }))
            }
            _ => Err("an action needs exactly one of 'set', 'unset' or 'regex'".to_owned()),
        }
    }
}

impl Action {
    /// 액션을 적용합니다.
    ///
    /// `Regex`가 매칭되면 이름 있는 그룹을 `captures`에 더하고, 이후 `Set`
    /// 템플릿에서 `{{ capture.<name> }}`로 참조할 수 있습니다.
    pub fn apply(&self, log: &mut Log, captures: &mut Captures) {
        match self {
            Self::Set(set) => {
                // 모든 템플릿을 변경 전 로그 기준으로 렌더링
                let identity: Vec<(String, String)> = set
                    .identity
                    .iter()
                    .map(|(k, t)| (k.clone(), t.render(log, captures)))
                    .collect();
                let labels: Vec<(String, String)> = set
                    .labels
                    .iter()
                    .map(|(k, t)| (k.clone(), t.render(log, captures)))
                    .collect();
                let message = set.message.as_ref().map(|t| t.render(log, captures));

                log.identity.extend(identity);
                log.labels.extend(labels);
                if let Some(message) = message {
                    log.message = message;
                }
            }
            Self::Unset(unset) => {
                if unset.all_identity {
                    log.identity.clear();
                } else {
                    for key in &unset.identity {
                        log.identity.remove(key);
                    }
                }
                if unset.all_labels {
                    log.labels.clear();
                } else {
                    for key in &unset.labels {
                        log.labels.remove(key);
                    }
                }
            }
            Self::Regex(re) => {
                if let Ok(value) = re.field.extract(log) {
                    capture_into(&re.regex, &value, captures);
                }
            }
        }
    }
}

/// 정규식이 매칭되면 이름 있는 그룹을 `captures`에 넣고 `true`를 돌려줍니다.
pub(crate) fn capture_into(regex: &Regex, haystack: &str, captures: &mut Captures) -> bool {
    let Some(caps) = regex.captures(haystack) else {
        return false;
    };
    for name in regex.capture_names().flatten() {
        if let Some(m) = caps.name(name) {
            captures.insert(name.to_owned(), m.as_str().to_owned());
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_log() -> Log {
        let mut log = Log {
            message: "Failed password for alice from 10.0.0.7".to_owned(),
            ..Log::default()
        };
        log.identity.insert("host".to_owned(), "bastion".to_owned());
        log.labels.insert("pid".to_owned(), "4242".to_owned());
        log
    }

    fn parse(yaml: &str) -> Vec<Action> {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn regex_then_set_uses_captures() {
        let actions = parse(
            r#"
- regex: { field: message, match: 'for (?P<user>\w+) from (?P<ip>[\d.]+)' }
- set:
    labels: { user: "{{ capture.user }}", src: "{{ capture.ip }}" }
    message: "login failure ({{ identity.host }})"
"#,
        );
        let mut log = sample_log();
        let mut captures = Captures::new();
        for action in &actions {
            action.apply(&mut log, &mut captures);
        }
        assert_eq!(log.labels.get("user").map(String::as_str), Some("alice"));
        assert_eq!(log.labels.get("src").map(String::as_str), Some("10.0.0.7"));
        assert_eq!(log.message, "login failure (bastion)");
    }

    #[test]
    fn unset_removes_keys_or_everything() {
        let mut log = sample_log();
        let mut captures = Captures::new();
        parse("- unset: { labels: [pid] }")[0].apply(&mut log, &mut captures);
        assert!(log.labels.is_empty());
        assert_eq!(log.identity.len(), 1);

        parse("- unset: { all_identity: true }")[0].apply(&mut log, &mut captures);
        assert!(log.identity.is_empty());
    }

    #[test]
    fn regex_without_match_leaves_captures() {
        let mut log = sample_log();
        let mut captures = Captures::new();
        parse("- regex: { field: message, match: '^nothing (?P<x>.*)' }")[0]
            .apply(&mut log, &mut captures);
        assert!(captures.is_empty());
    }

    #[test]
    fn set_renders_against_original_values() {
        let mut log = sample_log();
        let mut captures = Captures::new();
        parse(r#"- set: { message: "[{{ message }}]", labels: { orig: "{{ message }}" } }"#)[0]
            .apply(&mut log, &mut captures);
        assert_eq!(
            log.labels.get("orig").map(String::as_str),
            Some("Failed password for alice from 10.0.0.7")
        );
        assert!(log.message.starts_with("[Failed"));
    }

    #[test]
    fn invalid_action_shapes_are_rejected() {
        assert!(serde_yaml::from_str::<Vec<Action>>("- {}").is_err());
        assert!(
            serde_yaml::from_str::<Vec<Action>>("- { set: {}, unset: {} }").is_err()
        );
        assert!(
            serde_yaml::from_str::<Vec<Action>>("- regex: { field: message, match: '(' }")
                .is_err()
        );
        assert!(serde_yaml::from_str::<Vec<Action>>("- rename: {}").is_err());
    }
}

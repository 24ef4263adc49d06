//! 조건식 파서와 평가기
//!
//! # 문법
//! ```text
//! expr    := and ( "||" and )*
//! and     := unary ( "&&" unary )*
//! unary   := "!" unary | cmp
//! cmp     := primary ( ("==" | "!=" | "<" | "<=" | ">" | ">=" | "=~" | "!~" | "in") primary )?
//! primary := "(" expr ")" | "[" list "]" | literal | "has" "(" args ")" | path
//! ```
//!
//! # 평가 규칙
//! - 없는 키는 null이며, null과의 비교는 거짓입니다 (`x == null`만 참).
//! - 숫자끼리는 수치 비교, 문자열끼리는 사전순 비교입니다.
//! - 문자열과 숫자는 문자열이 숫자로 해석될 때만 수치 비교합니다.
//! - `=~`의 오른쪽이 문자열 상수면 컴파일 시점에 정규식을 만듭니다.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;

use regex::Regex;
use serde::Deserialize;
use snooze_core::Log;

use super::field::Field;
use super::lexer::{Token, syntax_error, tokenize};
use super::{LangError, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    fn accepts(self, ord: Ordering) -> bool {
        match self {
            Self::Eq => ord == Ordering::Equal,
            Self::Ne => ord != Ordering::Equal,
            Self::Lt => ord == Ordering::Less,
            Self::Le => ord != Ordering::Greater,
            Self::Gt => ord == Ordering::Greater,
            Self::Ge => ord != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone)]
enum RegexOperand {
    Static(Regex),
    Dynamic(Box<Expr>),
}

#[derive(Debug, Clone)]
enum Expr {
    Literal(Value<'static>),
    Field(Field),
    List(Vec<Expr>),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    Match {
        lhs: Box<Expr>,
        regex: RegexOperand,
        negate: bool,
    },
    In(Box<Expr>, Box<Expr>),
    Has(Vec<Expr>),
}

/// 컴파일된 조건식
///
/// 빈 문자열은 항상 참인 조건으로 컴파일됩니다.
///
/// ```
/// use snooze_core::Log;
/// use snooze_processor::lang::Condition;
///
/// let cond = Condition::compile(r#"message =~ "timeout" && severity_number >= 17"#).unwrap();
/// let log = Log { message: "read timeout".into(), severity_number: 17, ..Log::default() };
/// assert!(cond.matches(&log).unwrap());
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(try_from = "String")]
pub struct Condition {
    source: String,
    expr: Option<Expr>,
}

impl Condition {
    /// 조건식을 컴파일합니다.
    pub fn compile(source: &str) -> Result<Self, LangError> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }
        let tokens = tokenize(trimmed)?;
        let mut parser = Parser {
            src: trimmed,
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.parse_or()?;
        if let Some((position, token)) = parser.tokens.get(parser.pos) {
            return Err(syntax_error(
                trimmed,
                *position,
                format!("unexpected trailing token {token:?}"),
            ));
        }
        Ok(Self {
            source: trimmed.to_owned(),
            expr: Some(expr),
        })
    }

    /// 원본 조건식
    pub fn source(&self) -> &str {
        &self.source
    }

    /// 항상 참인 조건인지 여부
    pub fn is_always(&self) -> bool {
        self.expr.is_none()
    }

    /// 로그가 조건을 만족하는지 평가합니다.
    ///
    /// 결과가 null이면 거짓, 불리언이 아니면 [`LangError::NotBoolean`]입니다.
    pub fn matches(&self, log: &Log) -> Result<bool, LangError> {
        let Some(expr) = &self.expr else {
            return Ok(true);
        };
        truthy(&expr.eval(log)?)
    }
}

impl TryFrom<String> for Condition {
    type Error = LangError;

    fn try_from(source: String) -> Result<Self, Self::Error> {
        Self::compile(&source)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

// ─── 파서 ────────────────────────────────────────────────────────────

/// `!`, 괄호, 리스트, 함수 호출의 최대 중첩 깊이
const MAX_NESTING: usize = 128;

struct Parser<'s> {
    src: &'s str,
    tokens: Vec<(usize, Token)>,
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map_or(self.src.chars().count(), |(p, _)| *p)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<(), LangError> {
        let position = self.position();
        match self.advance() {
            Some(ref t) if t == expected => Ok(()),
            Some(t) => Err(syntax_error(
                self.src,
                position,
                format!("expected {expected:?}, found {t:?}"),
            )),
            None => Err(syntax_error(
                self.src,
                position,
                format!("expected {expected:?}, found end of input"),
            )),
        }
    }

    /// 한 단계 중첩해서 `f`를 실행합니다.
    fn nested<T>(
        &mut self,
        position: usize,
        f: impl FnOnce(&mut Self) -> Result<T, LangError>,
    ) -> Result<T, LangError> {
        if self.depth >= MAX_NESTING {
            return Err(syntax_error(
                self.src,
                position,
                format!("expression nested deeper than {MAX_NESTING} levels"),
            ));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn parse_or(&mut self) -> Result<Expr, LangError> {
        let first = self.parse_and()?;
        if self.peek() != Some(&Token::Or) {
            return Ok(first);
        }
        let mut terms = vec![first];
        while self.peek() == Some(&Token::Or) {
            self.advance();
            terms.push(self.parse_and()?);
        }
        Ok(Expr::Or(terms))
    }

    fn parse_and(&mut self) -> Result<Expr, LangError> {
        let first = self.parse_unary()?;
        if self.peek() != Some(&Token::And) {
            return Ok(first);
        }
        let mut terms = vec![first];
        while self.peek() == Some(&Token::And) {
            self.advance();
            terms.push(self.parse_unary()?);
        }
        Ok(Expr::And(terms))
    }

    fn parse_unary(&mut self) -> Result<Expr, LangError> {
        if self.peek() == Some(&Token::Not) {
            let position = self.position();
            self.advance();
            let inner = self.nested(position, Self::parse_unary)?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_cmp()
    }

    fn parse_cmp(&mut self) -> Result<Expr, LangError> {
        let lhs = self.parse_primary()?;
        let op = match self.peek() {
            Some(Token::Eq) => CmpOp::Eq,
            Some(Token::Ne) => CmpOp::Ne,
            Some(Token::Lt) => CmpOp::Lt,
            Some(Token::Le) => CmpOp::Le,
            Some(Token::Gt) => CmpOp::Gt,
            Some(Token::Ge) => CmpOp::Ge,
            Some(Token::Match | Token::NotMatch) => {
                let negate = self.peek() == Some(&Token::NotMatch);
                self.advance();
                let rhs = self.parse_primary()?;
                let regex = match rhs {
                    Expr::Literal(Value::Str(pattern)) => {
                        RegexOperand::Static(compile_regex(&pattern)?)
                    }
                    other => RegexOperand::Dynamic(Box::new(other)),
                };
                return Ok(Expr::Match {
                    lhs: Box::new(lhs),
                    regex,
                    negate,
                });
            }
            Some(Token::In) => {
                self.advance();
                let rhs = self.parse_primary()?;
                return Ok(Expr::In(Box::new(lhs), Box::new(rhs)));
            }
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_primary()?;
        Ok(Expr::Compare(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_primary(&mut self) -> Result<Expr, LangError> {
        let position = self.position();
        let Some(token) = self.advance() else {
            return Err(syntax_error(self.src, position, "unexpected end of input"));
        };
        match token {
            Token::LParen => self.nested(position, |p| {
                let inner = p.parse_or()?;
                p.expect(&Token::RParen)?;
                Ok(inner)
            }),
            Token::LBracket => self.nested(position, Self::parse_list),
            Token::Str(s) => Ok(Expr::Literal(Value::Str(Cow::Owned(s)))),
            Token::Int(n) => Ok(Expr::Literal(Value::Int(n))),
            Token::Float(f) => Ok(Expr::Literal(Value::Float(f))),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Null => Ok(Expr::Literal(Value::Null)),
            Token::Path(path) if self.peek() == Some(&Token::LParen) => {
                self.advance();
                let args = self.nested(position, Self::parse_args)?;
                match path.as_str() {
                    "has" => Ok(Expr::Has(args)),
                    _ => Err(LangError::UnknownFunction(path)),
                }
            }
            Token::Path(path) => Ok(Expr::Field(Field::compile(&path)?)),
            other => Err(syntax_error(
                self.src,
                position,
                format!("unexpected token {other:?}"),
            )),
        }
    }

    fn parse_list(&mut self) -> Result<Expr, LangError> {
        let mut items = Vec::new();
        if self.peek() == Some(&Token::RBracket) {
            self.advance();
            return Ok(Expr::List(items));
        }
        loop {
            items.push(self.parse_primary()?);
            match self.peek() {
                Some(Token::Comma) => {
                    self.advance();
                }
                _ => break,
            }
        }
        self.expect(&Token::RBracket)?;
        Ok(Expr::List(items))
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, LangError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.parse_or()?);
            match self.peek() {
                Some(Token::Comma) => {
                    self.advance();
                }
                _ => break,
            }
        }
        self.expect(&Token::RParen)?;
        Ok(args)
    }
}

fn compile_regex(pattern: &str) -> Result<Regex, LangError> {
    Regex::new(pattern).map_err(|e| LangError::InvalidRegex {
        pattern: pattern.to_owned(),
        reason: e.to_string(),
    })
}

// ─── 평가 ────────────────────────────────────────────────────────────

impl Expr {
    fn eval<'a>(&'a self, log: &'a Log) -> Result<Value<'a>, LangError> {
        match self {
            Self::Literal(v) => Ok(v.reborrow()),
            Self::Field(field) => Ok(field.resolve(log)),
            Self::List(items) => items
                .iter()
                .map(|item| item.eval(log))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Self::Not(inner) => Ok(Value::Bool(!truthy(&inner.eval(log)?)?)),
            Self::And(terms) => {
                for term in terms {
                    if !truthy(&term.eval(log)?)? {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Self::Or(terms) => {
                for term in terms {
                    if truthy(&term.eval(log)?)? {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Self::Compare(op, lhs, rhs) => {
                Ok(Value::Bool(compare(*op, &lhs.eval(log)?, &rhs.eval(log)?)?))
            }
            Self::Match { lhs, regex, negate } => {
                let subject = lhs.eval(log)?;
                let text = match &subject {
                    Value::Null => return Ok(Value::Bool(false)),
                    Value::List(_) | Value::Map(_) => {
                        return Err(LangError::TypeMismatch {
                            op: if *negate { "!~" } else { "=~" },
                            lhs: subject.type_name(),
                            rhs: "string",
                        });
                    }
                    other => other.to_scalar_string().unwrap_or_default(),
                };
                let matched = match regex {
                    RegexOperand::Static(re) => re.is_match(&text),
                    RegexOperand::Dynamic(expr) => match expr.eval(log)? {
                        Value::Null => return Ok(Value::Bool(false)),
                        Value::Str(pattern) => compile_regex(&pattern)?.is_match(&text),
                        other => {
                            return Err(LangError::TypeMismatch {
                                op: "=~",
                                lhs: "string",
                                rhs: other.type_name(),
                            });
                        }
                    },
                };
                Ok(Value::Bool(matched != *negate))
            }
            Self::In(lhs, rhs) => {
                let needle = lhs.eval(log)?;
                match rhs.eval(log)? {
                    Value::Null => Ok(Value::Bool(false)),
                    Value::List(items) => {
                        if matches!(needle, Value::Null) {
                            return Ok(Value::Bool(false));
                        }
                        for item in &items {
                            if compare(CmpOp::Eq, &needle, item)? {
                                return Ok(Value::Bool(true));
                            }
                        }
                        Ok(Value::Bool(false))
                    }
                    other => Err(LangError::TypeMismatch {
                        op: "in",
                        lhs: needle.type_name(),
                        rhs: other.type_name(),
                    }),
                }
            }
            Self::Has(args) => {
                if args.is_empty() {
                    return Ok(Value::Bool(false));
                }
                for arg in args {
                    if !arg.eval(log)?.is_present() {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
        }
    }
}

fn truthy(value: &Value<'_>) -> Result<bool, LangError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        other => Err(LangError::NotBoolean(other.type_name())),
    }
}

fn as_number(value: &Value<'_>) -> Option<f64> {
    match value {
        Value::Int(n) => Some(*n as f64),
        Value::Float(f) => Some(*f),
        Value::Str(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn compare(op: CmpOp, lhs: &Value<'_>, rhs: &Value<'_>) -> Result<bool, LangError> {
    let mismatch = || LangError::TypeMismatch {
        op: op.symbol(),
        lhs: lhs.type_name(),
        rhs: rhs.type_name(),
    };

    let ordering = match (lhs, rhs) {
        (Value::Null, Value::Null) => return Ok(op == CmpOp::Eq),
        (Value::Null, _) | (_, Value::Null) => return Ok(false),
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let (a, b) = (as_number(lhs), as_number(rhs));
            match (a, b) {
                (Some(a), Some(b)) => a.partial_cmp(&b).ok_or_else(mismatch)?,
                _ => return Err(mismatch()),
            }
        }
        (Value::Str(a), Value::Str(b)) => a.as_ref().cmp(b.as_ref()),
        (Value::Str(_), Value::Int(_) | Value::Float(_))
        | (Value::Int(_) | Value::Float(_), Value::Str(_)) => {
            match (as_number(lhs), as_number(rhs)) {
                (Some(a), Some(b)) => a.partial_cmp(&b).ok_or_else(mismatch)?,
                _ => {
                    return match op {
                        CmpOp::Eq => Ok(false),
                        CmpOp::Ne => Ok(true),
                        _ => Err(mismatch()),
                    };
                }
            }
        }
        (Value::Bool(a), Value::Bool(b)) => match op {
            CmpOp::Eq | CmpOp::Ne => a.cmp(b),
            _ => return Err(mismatch()),
        },
        (Value::List(_) | Value::Map(_), _) | (_, Value::List(_) | Value::Map(_)) => {
            return Err(mismatch());
        }
        _ => {
            return match op {
                CmpOp::Eq => Ok(false),
                CmpOp::Ne => Ok(true),
                _ => Err(mismatch()),
            };
        }
    };
    Ok(op.accepts(ordering))
}

#[cfg(test)]
mod tests {
    use super::*;
    use snooze_core::Source;

    fn sample_log() -> Log {
        let mut log = Log {
            message: "upstream timed out (110: Connection timed out)".to_owned(),
            severity_text: "error".to_owned(),
            severity_number: 17,
            source: Source {
                kind: "syslog".to_owned(),
                name: "web-01".to_owned(),
            },
            ..Log::default()
        };
        log.identity.insert("host".to_owned(), "web-01".to_owned());
        log.identity.insert("process".to_owned(), "nginx".to_owned());
        log.labels.insert("env".to_owned(), "prod".to_owned());
        log.labels.insert("code".to_owned(), "504".to_owned());
        log
    }

    fn eval(src: &str) -> Result<bool, LangError> {
        Condition::compile(src)?.matches(&sample_log())
    }

    #[test]
    fn empty_condition_always_matches() {
        let cond = Condition::compile("   ").unwrap();
        assert!(cond.is_always());
        assert!(cond.matches(&sample_log()).unwrap());
    }

    #[test]
    fn equality_on_strings() {
        assert!(eval(r#"identity.host == "web-01""#).unwrap());
        assert!(!eval(r#"identity.host == "web-02""#).unwrap());
        assert!(eval(r#"source.kind != "otlp""#).unwrap());
    }

    #[test]
    fn numeric_comparisons() {
        assert!(eval("severity_number >= 17").unwrap());
        assert!(!eval("severity_number > 17").unwrap());
        assert!(eval("severity_number < 20.5").unwrap());
        // 숫자로 해석되는 문자열 레이블
        assert!(eval("labels.code >= 500").unwrap());
        assert!(eval("labels.code == 504").unwrap());
    }

    #[test]
    fn string_vs_number_equality_without_numeric_string() {
        assert!(!eval("identity.host == 1").unwrap());
        assert!(eval("identity.host != 1").unwrap());
        assert!(eval("identity.host < 1").is_err());
    }

    #[test]
    fn missing_key_never_matches_comparison() {
        assert!(!eval(r#"identity.pod == "x""#).unwrap());
        assert!(!eval(r#"identity.pod != "x""#).unwrap());
        assert!(!eval("identity.pod > 3").unwrap());
        assert!(eval("identity.pod == null").unwrap());
        assert!(!eval("identity.host == null").unwrap());
    }

    #[test]
    fn regex_match_and_negation() {
        assert!(eval(r#"message =~ "timed out""#).unwrap());
        assert!(eval(r#"message =~ "^upstream \(?""#).is_ok());
        assert!(!eval(r#"message !~ "timed out""#).unwrap());
        assert!(eval(r#"identity.process =~ `^ngin.$`"#).unwrap());
        assert!(!eval(r#"identity.pod =~ ".*""#).unwrap());
    }

    #[test]
    fn invalid_static_regex_is_compile_error() {
        assert!(matches!(
            Condition::compile(r#"message =~ "(unclosed""#),
            Err(LangError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn dynamic_regex_from_field() {
        let mut log = sample_log();
        log.labels.insert("pattern".to_owned(), "^web-".to_owned());
        let cond = Condition::compile("identity.host =~ labels.pattern").unwrap();
        assert!(cond.matches(&log).unwrap());
    }

    #[test]
    fn in_list() {
        assert!(eval(r#"labels.env in ["prod", "stage"]"#).unwrap());
        assert!(!eval(r#"labels.env in ["dev"]"#).unwrap());
        assert!(!eval(r#"identity.pod in ["x"]"#).unwrap());
        assert!(eval("severity_number in [1, 17]").unwrap());
        assert!(!eval("labels.env in []").unwrap());
    }

    #[test]
    fn in_requires_list() {
        assert!(matches!(
            eval(r#"labels.env in "prod""#),
            Err(LangError::TypeMismatch { op: "in", .. })
        ));
    }

    #[test]
    fn logical_operators_and_precedence() {
        assert!(eval(r#"labels.env == "dev" || labels.env == "prod" && severity_number == 17"#).unwrap());
        assert!(!eval(r#"(labels.env == "dev" || labels.env == "prod") && severity_number == 3"#).unwrap());
        assert!(eval(r#"!(labels.env == "dev")"#).unwrap());
        assert!(eval(r#"!identity.pod"#).unwrap());
    }

    #[test]
    fn has_function() {
        assert!(eval("has(identity.host)").unwrap());
        assert!(eval("has(identity.host, labels.env)").unwrap());
        assert!(!eval("has(identity.host, identity.pod)").unwrap());
        assert!(eval("has(labels)").unwrap());
        assert!(!eval("has(profile)").unwrap());
        assert!(!eval("has()").unwrap());
        assert!(!eval("has(0)").unwrap());
    }

    #[test]
    fn unknown_function_is_compile_error() {
        assert!(matches!(
            Condition::compile("len(message) > 3"),
            Err(LangError::UnknownFunction(name)) if name == "len"
        ));
    }

    #[test]
    fn unknown_field_is_compile_error() {
        assert!(matches!(
            Condition::compile(r#"hostname == "a""#),
            Err(LangError::UnknownField(_))
        ));
    }

    #[test]
    fn syntax_errors() {
        for src in [
            "identity.host ==",
            "(labels.env == \"a\"",
            "labels.env == \"a\" labels.env",
            "&& a",
            "[1, 2",
        ] {
            assert!(Condition::compile(src).is_err(), "{src} should fail");
        }
    }

    #[test]
    fn deep_nesting_is_syntax_error() {
        let depth = 10_000;
        for src in [
            format!("{}true", "!".repeat(depth)),
            format!("{}true{}", "(".repeat(depth), ")".repeat(depth)),
            format!("message in {}1{}", "[".repeat(depth), "]".repeat(depth)),
            format!("{}true{}", "has(".repeat(depth), ")".repeat(depth)),
        ] {
            assert!(
                matches!(Condition::compile(&src), Err(LangError::Syntax { .. })),
                "{}... should be rejected",
                &src[..8]
            );
        }
    }

    #[test]
    fn nesting_within_limit_compiles() {
        assert!(eval(&format!("{}true", "!".repeat(100))).unwrap());
        assert!(eval(&format!("{}true{}", "(".repeat(100), ")".repeat(100))).unwrap());
    }

    #[test]
    fn long_boolean_chains_stay_flat() {
        let chain = vec!["true"; 50_000].join(" && ");
        assert!(eval(&chain).unwrap());
        let chain = vec!["false"; 50_000].join(" || ");
        assert!(!eval(&chain).unwrap());
    }

    #[test]
    fn non_boolean_result_is_error() {
        assert!(matches!(
            eval("identity.host"),
            Err(LangError::NotBoolean("string"))
        ));
        assert!(matches!(
            eval(r#"message && true"#),
            Err(LangError::NotBoolean(_))
        ));
    }

    #[test]
    fn ordering_between_bools_is_type_mismatch() {
        assert!(matches!(
            eval("true < false"),
            Err(LangError::TypeMismatch { op: "<", .. })
        ));
        assert!(eval("true == true").unwrap());
    }

    #[test]
    fn bracket_selector_in_condition() {
        let mut log = sample_log();
        log.labels.insert("k8s.pod".to_owned(), "api-1".to_owned());
        let cond = Condition::compile(r#"labels["k8s.pod"] == "api-1""#).unwrap();
        assert!(cond.matches(&log).unwrap());
    }

    #[test]
    fn deserialize_compiles() {
        let cond: Condition = serde_yaml::from_str(r#"'identity.host == "web-01"'"#).unwrap();
        assert_eq!(cond.source(), r#"identity.host == "web-01""#);
        assert!(serde_yaml::from_str::<Condition>("'a =='").is_err());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn compile_never_panics(src in ".{0,64}") {
                let _ = Condition::compile(&src);
            }

            #[test]
            fn compiled_conditions_evaluate_without_panic(
                key in "[a-z]{1,8}",
                value in "[a-zA-Z0-9 ]{0,16}",
                op in prop_oneof!["==", "!=", "<", ">=", "=~"],
            ) {
                let src = format!("identity.{key} {op} \"{value}\"");
                let cond = Condition::compile(&src).unwrap();
                let _ = cond.matches(&sample_log());
            }

            #[test]
            fn equality_matches_inserted_value(value in "[a-zA-Z0-9_-]{1,16}") {
                let mut log = sample_log();
                log.identity.insert("x".to_owned(), value.clone());
                let cond = Condition::compile(&format!("identity.x == \"{value}\"")).unwrap();
                prop_assert!(cond.matches(&log).unwrap());
            }
        }
    }
}

#![no_main]

use std::collections::BTreeMap;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use snooze_core::Log;
use snooze_processor::lang::Condition;

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    /// 비교식 목록 (최대 8개로 제한)
    clauses: Vec<FuzzClause>,
    /// `&&`로 묶을지 `||`로 묶을지
    all: bool,
    message: String,
    host: String,
    severity_number: i32,
}

#[derive(Arbitrary, Debug)]
struct FuzzClause {
    field: FuzzField,
    op: FuzzOp,
    value: String,
    negate: bool,
}

#[derive(Arbitrary, Debug)]
enum FuzzField {
    Message,
    Host,
    SeverityNumber,
    Label,
}

#[derive(Arbitrary, Debug)]
enum FuzzOp {
    Eq,
    Ne,
    Lt,
    Ge,
    Match,
    NotMatch,
    In,
    Has,
}

impl FuzzField {
    fn as_str(&self) -> &str {
        match self {
            FuzzField::Message => "message",
            FuzzField::Host => "identity.host",
            FuzzField::SeverityNumber => "severity_number",
            FuzzField::Label => "labels.env",
        }
    }
}

impl FuzzClause {
    fn render(&self) -> String {
        let field = self.field.as_str();
        // 문자열 리터럴이 깨지지 않도록 따옴표와 역슬래시 제거
        let value = self.value.replace(['"', '\\'], "");
        let clause = match self.op {
            FuzzOp::Eq => format!("{field} == \"{value}\""),
            FuzzOp::Ne => format!("{field} != \"{value}\""),
            FuzzOp::Lt => format!("{field} < {}", value.len()),
            FuzzOp::Ge => format!("{field} >= {}", value.len()),
            FuzzOp::Match => format!("{field} =~ \"{value}\""),
            FuzzOp::NotMatch => format!("{field} !~ \"{value}\""),
            FuzzOp::In => format!("{field} in [\"{value}\", \"prod\"]"),
            FuzzOp::Has => format!("has({field})"),
        };
        if self.negate {
            format!("!({clause})")
        } else {
            clause
        }
    }
}

fuzz_target!(|input: FuzzInput| {
    let clauses: Vec<String> = input.clauses.iter().take(8).map(FuzzClause::render).collect();
    if clauses.is_empty() {
        return;
    }
    let source = clauses.join(if input.all { " && " } else { " || " });

    let log = Log {
        message: input.message,
        identity: BTreeMap::from([("host".to_owned(), input.host)]),
        severity_number: input.severity_number,
        ..Log::default()
    };

    // 잘못된 정규식만 컴파일 실패 가능
    if let Ok(condition) = Condition::compile(&source) {
        let _ = condition.matches(&log);
    }
});

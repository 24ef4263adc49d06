//! 조건식 벤치마크
//!
//! 컴파일 비용과 평가 비용을 분리해 측정합니다.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use snooze_core::Log;
use snooze_processor::lang::Condition;

fn create_log() -> Log {
    let mut log = Log {
        message: "Failed password for root from 192.168.1.100 port 22 ssh2".to_owned(),
        severity_text: "error".to_owned(),
        severity_number: 17,
        ..Log::default()
    };
    log.source.kind = "syslog".to_owned();
    log.identity.insert("host".to_owned(), "web-server-01".to_owned());
    log.identity.insert("process".to_owned(), "sshd".to_owned());
    log.labels.insert("env".to_owned(), "prod".to_owned());
    log
}

const CONDITIONS: [(&str, &str); 4] = [
    ("equality", r#"identity.process == "sshd""#),
    ("compound", r#"severity_number >= 17 && identity.host == "web-server-01" && labels.env != "dev""#),
    ("regex", r#"message =~ "Failed password for \\S+ from""#),
    ("membership", r#"source.kind in ["syslog", "otlp", "journald"] || has(labels.trace)"#),
];

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("condition_compile");
    for (name, source) in CONDITIONS {
        group.bench_with_input(BenchmarkId::from_parameter(name), source, |b, source| {
            b.iter(|| Condition::compile(black_box(source)));
        });
    }
    group.finish();
}

fn bench_evaluate(c: &mut Criterion) {
    let log = create_log();
    let mut group = c.benchmark_group("condition_evaluate");
    for (name, source) in CONDITIONS {
        let condition = Condition::compile(source).expect("valid condition");
        group.bench_with_input(BenchmarkId::from_parameter(name), &condition, |b, condition| {
            b.iter(|| condition.matches(black_box(&log)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compile, bench_evaluate);
criterion_main!(benches);

//! Health aggregation tests.

use snooze_core::HealthStatus;
use snooze_daemon::health::{ServiceHealth, aggregate_status};

fn sample_service(name: &str, status: HealthStatus) -> ServiceHealth {
    ServiceHealth {
        name: name.to_owned(),
        status,
    }
}

#[test]
fn test_aggregate_status_all_healthy() {
    let services = vec![
        sample_service("consumer", HealthStatus::Healthy),
        sample_service("sweeper", HealthStatus::Healthy),
    ];

    assert!(aggregate_status(&services).is_healthy());
}

#[test]
fn test_aggregate_status_empty_is_healthy() {
    assert!(aggregate_status(&[]).is_healthy());
}

#[test]
fn test_aggregate_status_one_degraded() {
    let services = vec![
        sample_service(
            "consumer",
            HealthStatus::Degraded("3 consecutive fetch failures".to_owned()),
        ),
        sample_service("sweeper", HealthStatus::Healthy),
    ];

    let status = aggregate_status(&services);
    let HealthStatus::Degraded(reason) = &status else {
        panic!("expected Degraded status, got: {:?}", status);
    };
    assert!(reason.contains("consumer"), "reason should name the service");
    assert!(reason.contains("3 consecutive fetch failures"));
}

#[test]
fn test_unhealthy_wins_over_degraded() {
    let services = vec![
        sample_service("consumer", HealthStatus::Degraded("slow".to_owned())),
        sample_service("sweeper", HealthStatus::Unhealthy("not running".to_owned())),
    ];

    let status = aggregate_status(&services);
    let HealthStatus::Unhealthy(reason) = &status else {
        panic!("expected Unhealthy status, got: {:?}", status);
    };
    assert_eq!(reason, "consumer: slow; sweeper: not running");
}

#[test]
fn test_degraded_after_unhealthy_stays_unhealthy() {
    let services = vec![
        sample_service("sweeper", HealthStatus::Unhealthy("not running".to_owned())),
        sample_service("consumer", HealthStatus::Degraded("slow".to_owned())),
    ];

    assert!(aggregate_status(&services).is_unhealthy());
}

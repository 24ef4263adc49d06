//! Service registry.
//!
//! Long-running components (queue consumer, sweeper) are registered as
//! `Box<dyn DynService>` and started/stopped in a fixed order.

use snooze_core::{DynService, HealthStatus};

use crate::health::ServiceHealth;

/// Registry of the daemon's services.
///
/// Services start in registration order and stop in reverse order.
#[derive(Default)]
pub struct ServiceRegistry {
    services: Vec<Box<dyn DynService>>,
    started: usize,
}

impl ServiceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service.
    pub fn register(&mut self, service: Box<dyn DynService>) {
        self.services.push(service);
    }

    /// Start all services in registration order.
    ///
    /// On failure, services that were already started are stopped again
    /// before the error is returned.
    pub async fn start_all(&mut self) -> anyhow::Result<()> {
        for index in self.started..self.services.len() {
            let service = &mut self.services[index];
            tracing::info!(service = %service.name(), "starting service");
            if let Err(e) = service.start().await {
                let name = service.name().to_owned();
                tracing::warn!(service = %name, error = %e, "startup failed, rolling back");
                if let Err(stop_err) = self.stop_all().await {
                    tracing::error!(
                        startup_error = %e,
                        rollback_error = %stop_err,
                        "rollback also failed during startup failure cleanup"
                    );
                }
                return Err(anyhow::anyhow!("failed to start service '{}': {}", name, e));
            }
            self.started = index + 1;
        }
        Ok(())
    }

    /// Stop all started services in reverse registration order.
    ///
    /// Logs errors but continues stopping remaining services.
    pub async fn stop_all(&mut self) -> anyhow::Result<()> {
        let mut errors = Vec::new();

        for service in self.services[..self.started].iter_mut().rev() {
            tracing::info!(service = %service.name(), "stopping service");
            if let Err(e) = service.stop().await {
                tracing::error!(service = %service.name(), error = %e, "failed to stop service");
                errors.push(format!("{}: {}", service.name(), e));
            }
        }
        self.started = 0;

        if !errors.is_empty() {
            return Err(anyhow::anyhow!(
                "errors stopping services: {}",
                errors.join("; ")
            ));
        }
        Ok(())
    }

    /// Health status of every registered service.
    pub async fn health_statuses(&self) -> Vec<ServiceHealth> {
        let mut statuses = Vec::with_capacity(self.services.len());
        for service in &self.services {
            statuses.push(ServiceHealth {
                name: service.name().to_owned(),
                status: service.health_check().await,
            });
        }
        statuses
    }

    /// Number of registered services.
    pub fn count(&self) -> usize {
        self.services.len()
    }

    /// Whether every registered service is running.
    pub fn all_started(&self) -> bool {
        self.started == self.services.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snooze_core::error::{PipelineError, SnoozeError};
    use snooze_core::Service;
    use std::sync::{Arc, Mutex};

    struct Recorder {
        name: &'static str,
        fail_start: bool,
        running: bool,
        journal: Arc<Mutex<Vec<String>>>,
    }

    impl Service for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        async fn start(&mut self) -> Result<(), SnoozeError> {
            if self.fail_start {
                return Err(PipelineError::InitFailed("boom".to_owned()).into());
            }
            self.running = true;
            self.journal.lock().unwrap().push(format!("start {}", self.name));
            Ok(())
        }

        async fn stop(&mut self) -> Result<(), SnoozeError> {
            self.running = false;
            self.journal.lock().unwrap().push(format!("stop {}", self.name));
            Ok(())
        }

        async fn health_check(&self) -> HealthStatus {
            if self.running {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy("stopped".to_owned())
            }
        }
    }

    fn sample_service(
        name: &'static str,
        fail_start: bool,
        journal: &Arc<Mutex<Vec<String>>>,
    ) -> Box<dyn DynService> {
        Box::new(Recorder {
            name,
            fail_start,
            running: false,
            journal: Arc::clone(journal),
        })
    }

    #[tokio::test]
    async fn stops_in_reverse_order() {
        let journal = Arc::default();
        let mut registry = ServiceRegistry::new();
        registry.register(sample_service("consumer", false, &journal));
        registry.register(sample_service("sweeper", false, &journal));

        registry.start_all().await.unwrap();
        assert!(registry.all_started());
        registry.stop_all().await.unwrap();

        assert_eq!(
            *journal.lock().unwrap(),
            ["start consumer", "start sweeper", "stop sweeper", "stop consumer"]
        );
    }

    #[tokio::test]
    async fn failed_start_rolls_back() {
        let journal = Arc::default();
        let mut registry = ServiceRegistry::new();
        registry.register(sample_service("consumer", false, &journal));
        registry.register(sample_service("sweeper", true, &journal));

        let err = registry.start_all().await.unwrap_err();
        assert!(err.to_string().contains("sweeper"));
        assert_eq!(*journal.lock().unwrap(), ["start consumer", "stop consumer"]);
        assert!(!registry.all_started());
    }

    #[tokio::test]
    async fn health_reports_every_service() {
        let journal = Arc::default();
        let mut registry = ServiceRegistry::new();
        registry.register(sample_service("consumer", false, &journal));
        assert_eq!(registry.count(), 1);

        let before = registry.health_statuses().await;
        assert!(before[0].status.is_unhealthy());

        registry.start_all().await.unwrap();
        let after = registry.health_statuses().await;
        assert_eq!(after[0].name, "consumer");
        assert!(after[0].status.is_healthy());
    }
}

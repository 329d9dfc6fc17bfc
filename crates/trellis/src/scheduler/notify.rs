//! Alert delivery for severe dependency violations.

use super::violations::Violation;
use async_trait::async_trait;
use thiserror::Error;

/// Alert could not be delivered
#[derive(Debug, Error)]
#[error("Alert delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Receives HIGH and CRITICAL violation alerts.
///
/// Delivery is best effort: the scheduler logs a failed delivery and keeps
/// the violation recorded on the edge.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one alert
    async fn notify(&self, violation: &Violation) -> Result<(), NotifyError>;
}

/// Notifier that only writes a `warn!` event
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, violation: &Violation) -> Result<(), NotifyError> {
        tracing::warn!(
            edge = %violation.edge_id,
            predecessor = %violation.predecessor,
            successor = %violation.successor,
            severity = %violation.severity,
            days = violation.violation_days,
            "Dependency violation"
        );
        Ok(())
    }
}

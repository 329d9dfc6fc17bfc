//! Per-tenant serialization of structural writes.

use crate::domain::TenantId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Serializes the read-validate-write sequence of structural mutations
/// within one tenant.
///
/// Two concurrent `create_dependency` calls in the same tenant run their
/// cycle checks one after the other, so interleaved writes cannot jointly
/// close a loop. Tenants never block each other. Readers are not gated.
#[derive(Debug, Default)]
pub struct MutationGate {
    locks: Mutex<HashMap<TenantId, Arc<Mutex<()>>>>,
}

impl MutationGate {
    /// Create an empty gate
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive structural access to `tenant`.
    ///
    /// The returned guard releases the tenant when dropped.
    pub async fn lock(&self, tenant: &TenantId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(tenant.clone()).or_default())
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_tenant_is_exclusive() {
        let gate = Arc::new(MutationGate::new());
        let tenant = TenantId::from("acme");

        let guard = gate.lock(&tenant).await;
        let contender = {
            let gate = Arc::clone(&gate);
            let tenant = tenant.clone();
            tokio::spawn(async move {
                let _guard = gate.lock(&tenant).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_tenants_do_not_block_each_other() {
        let gate = MutationGate::new();
        let _a = gate.lock(&TenantId::from("a")).await;
        let _b = tokio::time::timeout(Duration::from_millis(100), gate.lock(&TenantId::from("b")))
            .await
            .expect("other tenant should not wait");
    }
}

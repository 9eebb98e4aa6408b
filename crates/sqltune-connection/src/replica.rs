//! Benchmark-target routing between a read replica and a sandbox

use async_trait::async_trait;
use sqltune_core::{ConnectionSource, ReplicaCheck, Result, TargetKind};
use std::sync::Arc;

/// Routes benchmark work to a read replica when one is healthy, otherwise
/// to a disposable sandbox target
///
/// The health probe is a minimal `SELECT 1` round trip on a briefly
/// borrowed connection; the probe connection is released on every path.
pub struct ReplicaRouter {
    replica: Option<Arc<dyn ConnectionSource>>,
    sandbox: Arc<dyn ConnectionSource>,
}

impl ReplicaRouter {
    /// Create a router with an optional replica source and a sandbox source
    pub fn new(
        replica: Option<Arc<dyn ConnectionSource>>,
        sandbox: Arc<dyn ConnectionSource>,
    ) -> Self {
        Self { replica, sandbox }
    }

    /// Probe a source with a minimal query
    async fn probe(source: &Arc<dyn ConnectionSource>) -> bool {
        let conn = match source.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::debug!(error = %e, "replica probe could not acquire connection");
                return false;
            }
        };
        let healthy = conn.query("SELECT 1", &[]).await.is_ok();
        source.release(conn).await;
        if !healthy {
            tracing::debug!("replica probe query failed");
        }
        healthy
    }
}

#[async_trait]
impl ReplicaCheck for ReplicaRouter {
    async fn is_available(&self) -> bool {
        match &self.replica {
            Some(replica) => Self::probe(replica).await,
            None => false,
        }
    }

    async fn benchmark_target(
        &self,
        prefer_replica: bool,
    ) -> Result<(TargetKind, Arc<dyn ConnectionSource>)> {
        if prefer_replica {
            if let Some(replica) = &self.replica {
                if Self::probe(replica).await {
                    return Ok((TargetKind::Replica, Arc::clone(replica)));
                }
                tracing::info!("replica unavailable, falling back to sandbox target");
            }
        }
        Ok((TargetKind::Sandbox, Arc::clone(&self.sandbox)))
    }
}

use crate::imports::*;
use std::sync::{Mutex, PoisonError};

/*
    Persistence of macro and event definitions:
    * RegistryWriter - the host's storage hook, handed a JSON snapshot after every mutation
    * MemoryWriter - keeps the snapshots in memory
    * Persistence - a registry's writer plus the services to notify once written
*/
#[async_trait]
pub trait RegistryWriter: Send + Sync {
    async fn write(&self, registry: &str, snapshot: &serde_json::Value) -> Result<()>;
}

type Writes = Vec<(String, serde_json::Value)>;

#[derive(Clone, Default)]
pub struct MemoryWriter {
    writes: Arc<Mutex<Writes>>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> Writes {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The latest snapshot written for `registry`.
    pub fn last(&self, registry: &str) -> Option<serde_json::Value> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|(name, _)| name == registry)
            .map(|(_, snapshot)| snapshot.clone())
    }
}

#[async_trait]
impl RegistryWriter for MemoryWriter {
    async fn write(&self, registry: &str, snapshot: &serde_json::Value) -> Result<()> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((registry.to_string(), snapshot.clone()));
        Ok(())
    }
}

#[derive(Clone, Default)]
pub(crate) struct Persistence {
    writer: Option<Arc<dyn RegistryWriter>>,
    services: PipelineServices,
}

impl Persistence {
    pub(crate) fn new(writer: Option<Arc<dyn RegistryWriter>>, services: PipelineServices) -> Self {
        Persistence { writer, services }
    }

    /// Writes through to the host. Failures are logged, never propagated.
    pub(crate) async fn write(&self, registry: &str, snapshot: serde_json::Value) {
        let entries = snapshot.as_array().map(Vec::len).unwrap_or_default();
        if let Some(writer) = &self.writer
            && let Err(e) = writer.write(registry, &snapshot).await
        {
            tracing::warn!(registry, error = %format!("{e:#}"), "Failed to persist registry");
            return;
        }
        tracing::debug!(registry, entries, "Persisted registry");

        let event = hook_events::RegistryWritten {
            registry: registry.to_string(),
            entries,
            written_at: Instant::now(),
        };
        if let Err(e) = self.services.after_registry_write(event).await {
            tracing::warn!(registry, error = %format!("{e:#}"), "Registry write hook failed");
        }
    }
}

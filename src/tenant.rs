use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use crate::compactor;
use crate::engine::Engine;
use crate::limits::*;

/// One weekly schedule per database name. Each gets its own Engine, WAL file
/// and compactor task, created on first use.
pub struct TenantManager {
    engines: DashMap<String, Arc<Engine>>,
    data_dir: PathBuf,
    compact_threshold: u64,
}

impl TenantManager {
    pub fn new(data_dir: PathBuf, compact_threshold: u64) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            compact_threshold,
        }
    }

    pub fn tenant_count(&self) -> usize {
        self.engines.len()
    }

    /// Get or lazily create the engine for the given tenant.
    pub fn get_or_create(&self, tenant: &str) -> std::io::Result<Arc<Engine>> {
        if let Some(engine) = self.engines.get(tenant) {
            return Ok(engine.value().clone());
        }
        if tenant.len() > MAX_TENANT_NAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "tenant name too long",
            ));
        }

        // Strip everything but [A-Za-z0-9_-] so the name is safe as a file name.
        let safe_name: String = tenant
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if safe_name.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty tenant name",
            ));
        }

        if !self.engines.contains_key(&safe_name) && self.engines.len() >= MAX_TENANTS {
            return Err(std::io::Error::other("too many tenants"));
        }

        // Names that sanitize identically share one engine, never two writers
        // on the same WAL file.
        let engine = match self.engines.entry(safe_name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(e) => e.get().clone(),
            dashmap::mapref::entry::Entry::Vacant(e) => {
                let wal_path = self.data_dir.join(format!("{safe_name}.wal"));
                let engine = Arc::new(Engine::new(wal_path)?);

                let compactor_engine = engine.clone();
                let threshold = self.compact_threshold;
                tokio::spawn(async move {
                    compactor::run_compactor(compactor_engine, threshold).await;
                });

                info!("loaded schedule '{safe_name}' ({} records)", engine.record_count());
                e.insert(engine.clone());
                engine
            }
        };

        metrics::gauge!(crate::observability::TENANTS_ACTIVE).set(self.tenant_count() as f64);
        Ok(engine)
    }
}

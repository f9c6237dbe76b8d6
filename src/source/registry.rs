//! Registry of pluggable data sources keyed by type.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::source::DataSource;

/// Errors from registry mutation.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The type key is already taken; registering a duplicate is a
    /// configuration error, never silently ignored.
    #[error("source type '{0}' is already registered")]
    DuplicateType(String),
}

/// One registered source with its bookkeeping.
pub struct RegistryEntry {
    /// The source implementation.
    pub source: Arc<dyn DataSource>,
    /// When the entry was inserted.
    pub registered_at: DateTime<Utc>,
    /// Inactive entries keep their history but are invisible to `resolve`.
    pub active: bool,
    /// Opaque key/value annotations supplied at registration.
    pub metadata: BTreeMap<String, String>,
}

impl std::fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("source_type", &self.source.source_type())
            .field("registered_at", &self.registered_at)
            .field("active", &self.active)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Derived registry counters; computed on demand, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistryStatistics {
    /// Total registered types, active or not.
    pub total: usize,
    /// Types currently visible to `resolve`.
    pub active: usize,
    /// Types retained but deactivated.
    pub inactive: usize,
    /// Activity flag per type key.
    pub types: BTreeMap<String, bool>,
    /// Earliest registration timestamp, if any.
    pub oldest_registration: Option<DateTime<Utc>>,
    /// Latest registration timestamp, if any.
    pub newest_registration: Option<DateTime<Utc>>,
}

/// Registry holding the active and inactive sources.
///
/// Mutation is expected outside the hot collection path; a single `RwLock`
/// around the map gives single-writer-at-a-time semantics.
#[derive(Default)]
pub struct SourceRegistry {
    entries: RwLock<HashMap<String, RegistryEntry>>,
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field(
                "entry_count",
                &self.entries.try_read().map(|e| e.len()).unwrap_or(0),
            )
            .finish_non_exhaustive()
    }
}

impl SourceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source under its type key.
    ///
    /// # Errors
    /// Returns [`RegistryError::DuplicateType`] if the key exists; the
    /// registry is left unchanged in that case.
    pub async fn register(&self, source: Arc<dyn DataSource>) -> Result<(), RegistryError> {
        self.register_with_metadata(source, BTreeMap::new()).await
    }

    /// Register a source with metadata annotations.
    pub async fn register_with_metadata(
        &self,
        source: Arc<dyn DataSource>,
        metadata: BTreeMap<String, String>,
    ) -> Result<(), RegistryError> {
        let source_type = source.source_type().to_string();
        let mut entries = self.entries.write().await;

        if entries.contains_key(&source_type) {
            return Err(RegistryError::DuplicateType(source_type));
        }

        entries.insert(
            source_type.clone(),
            RegistryEntry {
                source,
                registered_at: Utc::now(),
                active: true,
                metadata,
            },
        );

        tracing::info!(source_type = %source_type, "Source registered");
        Ok(())
    }

    /// Remove an entry entirely; returns whether one existed.
    pub async fn unregister(&self, source_type: &str) -> bool {
        let removed = self.entries.write().await.remove(source_type).is_some();
        if removed {
            tracing::info!(source_type = %source_type, "Source unregistered");
        }
        removed
    }

    /// Resolve a source for collection.
    ///
    /// Yields the source only if an entry exists **and** is active. Absence
    /// is not an error here; callers turn it into an
    /// [`CollectError::UnregisteredType`](crate::source::CollectError) at the
    /// point of use.
    pub async fn resolve(&self, source_type: &str) -> Option<Arc<dyn DataSource>> {
        self.entries
            .read()
            .await
            .get(source_type)
            .filter(|entry| entry.active)
            .map(|entry| Arc::clone(&entry.source))
    }

    /// Toggle visibility without removing history; returns whether the entry
    /// existed.
    pub async fn set_active(&self, source_type: &str, active: bool) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get_mut(source_type) {
            Some(entry) => {
                entry.active = active;
                tracing::debug!(source_type = %source_type, active, "Source activity changed");
                true
            }
            None => false,
        }
    }

    /// Compute derived counters over the current entries.
    pub async fn statistics(&self) -> RegistryStatistics {
        let entries = self.entries.read().await;

        let active = entries.values().filter(|e| e.active).count();
        let types = entries
            .iter()
            .map(|(ty, entry)| (ty.clone(), entry.active))
            .collect();
        let oldest_registration = entries.values().map(|e| e.registered_at).min();
        let newest_registration = entries.values().map(|e| e.registered_at).max();

        RegistryStatistics {
            total: entries.len(),
            active,
            inactive: entries.len() - active,
            types,
            oldest_registration,
            newest_registration,
        }
    }
}

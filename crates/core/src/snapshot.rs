use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::CoreError;
use crate::graph::{FandomContent, RuleGraph};
use crate::types::{DbId, Timestamp};
use crate::validation::evaluator::{compile_rules, CompiledRule};
use crate::validation::rules::ValidationRule;

/// Everything one validation pass reads for a fandom.
///
/// Immutable once built. Reloading content produces a new snapshot.
#[derive(Debug)]
pub struct FandomSnapshot {
    pub graph: RuleGraph,
    /// Active rules, in execution order.
    pub rules: Vec<CompiledRule>,
    pub loaded_at: Timestamp,
}

impl FandomSnapshot {
    pub fn build(content: FandomContent, rules: &[ValidationRule]) -> Result<Self, CoreError> {
        let graph = RuleGraph::build(content)?;
        let rules = compile_rules(rules);
        Ok(Self {
            graph,
            rules,
            loaded_at: chrono::Utc::now(),
        })
    }

    pub fn fandom_id(&self) -> DbId {
        self.graph.fandom_id()
    }
}

/// Registry of the current snapshot per fandom.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared across request handlers. Callers clone the `Arc<FandomSnapshot>`
/// out and validate without holding the lock.
#[derive(Default)]
pub struct SnapshotStore {
    snapshots: RwLock<HashMap<DbId, Arc<FandomSnapshot>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, fandom_id: DbId) -> Result<Arc<FandomSnapshot>, CoreError> {
        self.snapshots
            .read()
            .await
            .get(&fandom_id)
            .cloned()
            .ok_or(CoreError::NotFound {
                entity: "FandomSnapshot",
                id: fandom_id,
            })
    }

    /// Install a snapshot, returning the one it replaced.
    pub async fn replace(&self, snapshot: FandomSnapshot) -> Option<Arc<FandomSnapshot>> {
        let fandom_id = snapshot.fandom_id();
        let previous = self
            .snapshots
            .write()
            .await
            .insert(fandom_id, Arc::new(snapshot));
        tracing::info!(
            fandom_id,
            replaced = previous.is_some(),
            "Fandom snapshot installed"
        );
        previous
    }

    /// Build a snapshot from fresh content and install it.
    ///
    /// On error the current snapshot stays in place.
    pub async fn reload(
        &self,
        content: FandomContent,
        rules: &[ValidationRule],
    ) -> Result<Arc<FandomSnapshot>, CoreError> {
        let fandom_id = content.fandom_id;
        let snapshot = match FandomSnapshot::build(content, rules) {
            Ok(snapshot) => Arc::new(snapshot),
            Err(err) => {
                tracing::warn!(fandom_id, error = %err, "Fandom snapshot reload rejected");
                return Err(err);
            }
        };
        self.snapshots
            .write()
            .await
            .insert(fandom_id, Arc::clone(&snapshot));
        tracing::info!(
            fandom_id,
            tags = snapshot.graph.tags().count(),
            plot_blocks = snapshot.graph.plot_blocks().count(),
            rules = snapshot.rules.len(),
            "Fandom snapshot reloaded"
        );
        Ok(snapshot)
    }

    pub async fn remove(&self, fandom_id: DbId) -> Option<Arc<FandomSnapshot>> {
        self.snapshots.write().await.remove(&fandom_id)
    }

    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.snapshots.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::graph::fixtures::*;

    fn snapshot_with_tags(names: &[&str]) -> FandomContent {
        let mut c = content();
        c.tags = names
            .iter()
            .enumerate()
            .map(|(i, name)| tag(i as DbId + 1, name, "mood", None))
            .collect();
        c
    }

    #[tokio::test]
    async fn missing_fandom_is_not_found() {
        let store = SnapshotStore::new();
        assert_matches!(
            store.get(FANDOM).await,
            Err(CoreError::NotFound {
                entity: "FandomSnapshot",
                id: FANDOM,
            })
        );
    }

    #[tokio::test]
    async fn reload_swaps_without_touching_held_snapshots() {
        let store = SnapshotStore::new();
        store
            .reload(snapshot_with_tags(&["angst"]), &[])
            .await
            .unwrap();
        let held = store.get(FANDOM).await.unwrap();

        store
            .reload(snapshot_with_tags(&["angst", "fluff"]), &[])
            .await
            .unwrap();

        assert_eq!(held.graph.tags().count(), 1);
        assert_eq!(store.get(FANDOM).await.unwrap().graph.tags().count(), 2);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn failed_reload_keeps_current_snapshot() {
        let store = SnapshotStore::new();
        store
            .reload(snapshot_with_tags(&["angst"]), &[])
            .await
            .unwrap();

        let mut broken = snapshot_with_tags(&["angst"]);
        broken.tags.push(tag(1, "duplicate", "mood", None));
        assert_matches!(
            store.reload(broken, &[]).await,
            Err(CoreError::Conflict { id: 1, .. })
        );
        assert_eq!(store.get(FANDOM).await.unwrap().graph.tags().count(), 1);
    }

    #[tokio::test]
    async fn replace_and_remove() {
        let store = SnapshotStore::new();
        let snapshot = FandomSnapshot::build(content(), &[]).unwrap();
        assert!(store.replace(snapshot).await.is_none());

        let again = FandomSnapshot::build(content(), &[]).unwrap();
        assert!(store.replace(again).await.is_some());

        assert!(store.remove(FANDOM).await.is_some());
        assert!(store.is_empty().await);
    }
}

//! The input to a validation pass.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{DbId, EntityKind};

/// Metadata key listing extra plot-block ids attached to a selection.
pub const METADATA_PLOT_BLOCKS: &str = "plot_blocks";

/// What the user has selected. Never mutated by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionContext {
    pub fandom_id: DbId,
    #[serde(default)]
    pub applied_tags: Vec<DbId>,
    #[serde(default)]
    pub selected_plot_blocks: Vec<DbId>,
    #[serde(default)]
    pub selected_conditions: Vec<DbId>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
}

impl SelectionContext {
    pub fn new(fandom_id: DbId) -> Self {
        Self {
            fandom_id,
            ..Self::default()
        }
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = DbId>) -> Self {
        self.applied_tags.extend(tags);
        self
    }

    pub fn with_plot_blocks(mut self, blocks: impl IntoIterator<Item = DbId>) -> Self {
        self.selected_plot_blocks.extend(blocks);
        self
    }

    pub fn with_conditions(mut self, conditions: impl IntoIterator<Item = DbId>) -> Self {
        self.selected_conditions.extend(conditions);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Selected ids of one kind, in selection order.
    pub fn ids(&self, kind: EntityKind) -> &[DbId] {
        match kind {
            EntityKind::Tag => &self.applied_tags,
            EntityKind::PlotBlock => &self.selected_plot_blocks,
            EntityKind::Condition => &self.selected_conditions,
        }
    }
}

/// One selected entity, as used by pathways and conflict checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectionItem {
    pub kind: EntityKind,
    pub id: DbId,
}

impl SelectionItem {
    pub fn tag(id: DbId) -> Self {
        Self {
            kind: EntityKind::Tag,
            id,
        }
    }

    pub fn plot_block(id: DbId) -> Self {
        Self {
            kind: EntityKind::PlotBlock,
            id,
        }
    }
}

/// Set view over a [`SelectionContext`] for constant-time membership checks.
#[derive(Debug, Clone)]
pub struct SelectionIndex {
    tags: HashSet<DbId>,
    plot_blocks: HashSet<DbId>,
    conditions: HashSet<DbId>,
    metadata_plot_blocks: HashSet<DbId>,
}

impl SelectionIndex {
    pub fn new(context: &SelectionContext) -> Self {
        let metadata_plot_blocks = context
            .metadata
            .get(METADATA_PLOT_BLOCKS)
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(Value::as_i64).collect())
            .unwrap_or_default();

        Self {
            tags: context.applied_tags.iter().copied().collect(),
            plot_blocks: context.selected_plot_blocks.iter().copied().collect(),
            conditions: context.selected_conditions.iter().copied().collect(),
            metadata_plot_blocks,
        }
    }

    pub fn contains(&self, kind: EntityKind, id: DbId) -> bool {
        self.set(kind).contains(&id)
    }

    pub fn has_tag(&self, id: DbId) -> bool {
        self.tags.contains(&id)
    }

    pub fn has_plot_block(&self, id: DbId) -> bool {
        self.plot_blocks.contains(&id)
    }

    /// Plot block present either as a selection or in the metadata list.
    pub fn mentions_plot_block(&self, id: DbId) -> bool {
        self.plot_blocks.contains(&id) || self.metadata_plot_blocks.contains(&id)
    }

    pub fn set(&self, kind: EntityKind) -> &HashSet<DbId> {
        match kind {
            EntityKind::Tag => &self.tags,
            EntityKind::PlotBlock => &self.plot_blocks,
            EntityKind::Condition => &self.conditions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn index_reads_metadata_plot_blocks() {
        let context = SelectionContext::new(1)
            .with_plot_blocks([5])
            .with_metadata(METADATA_PLOT_BLOCKS, json!([7, "junk", 9]));
        let index = SelectionIndex::new(&context);

        assert!(index.mentions_plot_block(5));
        assert!(index.mentions_plot_block(7));
        assert!(index.mentions_plot_block(9));
        assert!(!index.has_plot_block(7));
    }

    #[test]
    fn deserializes_with_missing_fields() {
        let context: SelectionContext =
            serde_json::from_value(json!({ "fandom_id": 3, "applied_tags": [1, 2] })).unwrap();
        assert_eq!(context.fandom_id, 3);
        assert_eq!(context.ids(EntityKind::Tag), &[1, 2]);
        assert!(context.selected_plot_blocks.is_empty());
        assert!(context.metadata.is_empty());
    }
}

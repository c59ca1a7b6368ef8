//! Fandom-scoped rule graph.
//!
//! A [`RuleGraph`] is the immutable set of tags, tag classes, plot blocks,
//! plot-block conditions and warning templates that one validation pass runs
//! against. Entities are stored in id-ordered arenas so every traversal over
//! the graph is deterministic. The graph is built once from the content
//! repository's [`FandomContent`] and never mutated afterwards.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, EntityKind};
use crate::validation::templates::WarningTemplate;

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// A leaf descriptor applied to a selection (e.g. "angst").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: DbId,
    pub name: String,
    pub category: String,
    pub fandom_id: DbId,
    #[serde(default)]
    pub tag_class_id: Option<DbId>,
    #[serde(default)]
    pub requires: Vec<DbId>,
    /// Tags suggested alongside this one.
    #[serde(default)]
    pub enhances: Vec<DbId>,
}

/// A named group of tags sharing admin-configured constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagClass {
    pub id: DbId,
    pub name: String,
    #[serde(default)]
    pub validation_rules: TagClassRules,
}

/// Constraints applied collectively to the applied members of one tag class.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagClassRules {
    #[serde(default)]
    pub mutual_exclusion: Option<MutualExclusion>,
    #[serde(default)]
    pub instance_limits: Option<InstanceLimits>,
    #[serde(default)]
    pub required_context: Option<RequiredContext>,
    #[serde(default)]
    pub category_restrictions: Option<CategoryRestrictions>,
    #[serde(default)]
    pub dependencies: Option<ClassDependencies>,
}

impl TagClassRules {
    /// True when no sub-rule is configured.
    pub fn is_empty(&self) -> bool {
        self.mutual_exclusion.is_none()
            && self.instance_limits.is_none()
            && self.required_context.is_none()
            && self.category_restrictions.is_none()
            && self.dependencies.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutualExclusion {
    /// At most one tag of the class may be applied.
    #[serde(default)]
    pub within_class: bool,
    #[serde(default)]
    pub conflicting_tags: Vec<DbId>,
    #[serde(default)]
    pub conflicting_classes: Vec<DbId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceLimits {
    #[serde(default)]
    pub min_instances: Option<usize>,
    #[serde(default)]
    pub max_instances: Option<usize>,
    #[serde(default)]
    pub exact_instances: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequiredContext {
    #[serde(default)]
    pub required_tags: Vec<DbId>,
    /// Keys that must be present in the selection metadata.
    #[serde(default)]
    pub required_metadata: Vec<String>,
    #[serde(default)]
    pub required_classes: Vec<DbId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryRestrictions {
    /// When non-empty, every applied tag of the class must use one of these.
    #[serde(default)]
    pub applicable_categories: Vec<String>,
    #[serde(default)]
    pub excluded_categories: Vec<String>,
    /// At least one of these plot blocks must be part of the selection.
    #[serde(default)]
    pub required_plot_blocks: Vec<DbId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassDependencies {
    #[serde(default)]
    pub requires: Vec<DbId>,
    #[serde(default)]
    pub enhances: Vec<DbId>,
    #[serde(default)]
    pub enables: Vec<DbId>,
}

/// A reusable narrative building block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotBlock {
    pub id: DbId,
    pub name: String,
    pub category: String,
    pub fandom_id: DbId,
    /// Parent in the plot-block hierarchy.
    #[serde(default)]
    pub parent_id: Option<DbId>,
    /// Hard requirements.
    #[serde(default)]
    pub requires: Vec<DbId>,
    /// Soft requirements; missing ones only warn.
    #[serde(default)]
    pub soft_requires: Vec<DbId>,
    #[serde(default)]
    pub enhances: Vec<DbId>,
    #[serde(default)]
    pub enabled_by: Vec<DbId>,
    #[serde(default)]
    pub conflicts_with: Vec<DbId>,
}

/// An ordered, optionally nested sub-node of a plot block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotBlockCondition {
    pub id: DbId,
    pub plot_block_id: DbId,
    pub name: String,
    #[serde(default)]
    pub order: i32,
    /// Display nesting for the editor. Carried through unchanged; no check
    /// reads it.
    #[serde(default)]
    pub parent_id: Option<DbId>,
    /// Condition ids, possibly owned by other plot blocks.
    #[serde(default)]
    pub requires: Vec<DbId>,
    /// Conditions suggested once this one is selected.
    #[serde(default)]
    pub enables: Vec<DbId>,
}

/// Everything the content repository supplies for one fandom.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FandomContent {
    pub fandom_id: DbId,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub tag_classes: Vec<TagClass>,
    #[serde(default)]
    pub plot_blocks: Vec<PlotBlock>,
    #[serde(default)]
    pub conditions: Vec<PlotBlockCondition>,
    #[serde(default)]
    pub warning_templates: Vec<WarningTemplate>,
}

// ---------------------------------------------------------------------------
// RuleGraph
// ---------------------------------------------------------------------------

/// Immutable, queryable snapshot of one fandom's validation content.
#[derive(Debug, Clone, Default)]
pub struct RuleGraph {
    fandom_id: DbId,
    tags: BTreeMap<DbId, Tag>,
    tag_classes: BTreeMap<DbId, TagClass>,
    plot_blocks: BTreeMap<DbId, PlotBlock>,
    conditions: BTreeMap<DbId, PlotBlockCondition>,
    warning_templates: Vec<WarningTemplate>,
}

impl RuleGraph {
    /// An empty graph for a fandom with no content loaded.
    pub fn empty(fandom_id: DbId) -> Self {
        Self {
            fandom_id,
            ..Self::default()
        }
    }

    /// Build a graph from repository content.
    ///
    /// Rejects duplicate ids within one id space, entities owned by another
    /// fandom, and conditions whose plot block is not part of the content.
    /// Dangling `requires`/`enhances` references are kept; evaluation treats
    /// them as unsatisfied.
    pub fn build(content: FandomContent) -> Result<Self, CoreError> {
        let fandom_id = content.fandom_id;
        let mut graph = Self::empty(fandom_id);

        for tag in content.tags {
            check_fandom(EntityKind::Tag, tag.id, tag.fandom_id, fandom_id)?;
            insert_unique(&mut graph.tags, EntityKind::Tag, tag.id, tag)?;
        }

        for class in content.tag_classes {
            if graph.tag_classes.contains_key(&class.id) {
                return Err(CoreError::Validation(format!("duplicate tag class id {}", class.id)));
            }
            graph.tag_classes.insert(class.id, class);
        }

        for block in content.plot_blocks {
            check_fandom(EntityKind::PlotBlock, block.id, block.fandom_id, fandom_id)?;
            insert_unique(
                &mut graph.plot_blocks,
                EntityKind::PlotBlock,
                block.id,
                block,
            )?;
        }

        for condition in content.conditions {
            if !graph.plot_blocks.contains_key(&condition.plot_block_id) {
                return Err(CoreError::NotFound {
                    entity: "PlotBlock",
                    id: condition.plot_block_id,
                });
            }
            insert_unique(
                &mut graph.conditions,
                EntityKind::Condition,
                condition.id,
                condition,
            )?;
        }

        graph.warning_templates = content.warning_templates;
        Ok(graph)
    }

    pub fn fandom_id(&self) -> DbId {
        self.fandom_id
    }

    pub fn tag(&self, id: DbId) -> Option<&Tag> {
        self.tags.get(&id)
    }

    pub fn tag_class(&self, id: DbId) -> Option<&TagClass> {
        self.tag_classes.get(&id)
    }

    pub fn plot_block(&self, id: DbId) -> Option<&PlotBlock> {
        self.plot_blocks.get(&id)
    }

    pub fn condition(&self, id: DbId) -> Option<&PlotBlockCondition> {
        self.conditions.get(&id)
    }

    pub fn tags(&self) -> impl Iterator<Item = &Tag> {
        self.tags.values()
    }

    pub fn tag_classes(&self) -> impl Iterator<Item = &TagClass> {
        self.tag_classes.values()
    }

    pub fn plot_blocks(&self) -> impl Iterator<Item = &PlotBlock> {
        self.plot_blocks.values()
    }

    pub fn conditions(&self) -> impl Iterator<Item = &PlotBlockCondition> {
        self.conditions.values()
    }

    pub fn warning_templates(&self) -> &[WarningTemplate] {
        &self.warning_templates
    }

    /// Conditions belonging to a plot block, in their display order.
    pub fn conditions_of(&self, plot_block_id: DbId) -> Vec<&PlotBlockCondition> {
        let mut conditions: Vec<&PlotBlockCondition> = self
            .conditions
            .values()
            .filter(|c| c.plot_block_id == plot_block_id)
            .collect();
        conditions.sort_by_key(|c| (c.order, c.id));
        conditions
    }

    /// Whether an entity of the given kind exists in the graph.
    pub fn contains(&self, kind: EntityKind, id: DbId) -> bool {
        match kind {
            EntityKind::Tag => self.tags.contains_key(&id),
            EntityKind::PlotBlock => self.plot_blocks.contains_key(&id),
            EntityKind::Condition => self.conditions.contains_key(&id),
        }
    }

    /// Display name of an entity, falling back to its id for unknown entities.
    pub fn display_name(&self, kind: EntityKind, id: DbId) -> String {
        let name = match kind {
            EntityKind::Tag => self.tags.get(&id).map(|t| t.name.as_str()),
            EntityKind::PlotBlock => self.plot_blocks.get(&id).map(|p| p.name.as_str()),
            EntityKind::Condition => self.conditions.get(&id).map(|c| c.name.as_str()),
        };
        name.map(str::to_string)
            .unwrap_or_else(|| format!("{} {id}", kind.as_str()))
    }

    /// Hard requirement edges of an entity. Unknown entities have none.
    pub fn hard_requirements(&self, kind: EntityKind, id: DbId) -> &[DbId] {
        match kind {
            EntityKind::Tag => self.tags.get(&id).map(|t| t.requires.as_slice()),
            EntityKind::PlotBlock => self.plot_blocks.get(&id).map(|p| p.requires.as_slice()),
            EntityKind::Condition => self.conditions.get(&id).map(|c| c.requires.as_slice()),
        }
        .unwrap_or(&[])
    }

    /// All ids of one kind in ascending order.
    pub fn ids(&self, kind: EntityKind) -> Vec<DbId> {
        match kind {
            EntityKind::Tag => self.tags.keys().copied().collect(),
            EntityKind::PlotBlock => self.plot_blocks.keys().copied().collect(),
            EntityKind::Condition => self.conditions.keys().copied().collect(),
        }
    }

    /// Depth of a plot block in the parent hierarchy (roots are 0).
    ///
    /// Unknown blocks have depth 0 and a parent pointing at an unknown block
    /// ends the chain. Returns `None` when the parent chain loops.
    pub fn plot_block_depth(&self, id: DbId) -> Option<usize> {
        let mut seen = HashSet::new();
        let mut depth = 0;
        let Some(mut current) = self.plot_blocks.get(&id) else {
            return Some(0);
        };
        seen.insert(current.id);

        while let Some(parent_id) = current.parent_id {
            let Some(parent) = self.plot_blocks.get(&parent_id) else {
                break;
            };
            if !seen.insert(parent.id) {
                return None;
            }
            depth += 1;
            current = parent;
        }

        Some(depth)
    }
}

fn check_fandom(kind: EntityKind, id: DbId, owner: DbId, fandom_id: DbId) -> Result<(), CoreError> {
    if owner == fandom_id {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "{} {id} belongs to fandom {owner}, not {fandom_id}",
            kind.as_str()
        )))
    }
}

fn insert_unique<T>(
    arena: &mut BTreeMap<DbId, T>,
    kind: EntityKind,
    id: DbId,
    value: T,
) -> Result<(), CoreError> {
    if arena.contains_key(&id) {
        return Err(CoreError::Conflict { kind, id });
    }
    arena.insert(id, value);
    Ok(())
}

// ---------------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------------

/// Small builders shared by the unit tests of every validation module.
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub const FANDOM: DbId = 1;

    pub fn tag(id: DbId, name: &str, category: &str, class: Option<DbId>) -> Tag {
        Tag {
            id,
            name: name.to_string(),
            category: category.to_string(),
            fandom_id: FANDOM,
            tag_class_id: class,
            requires: Vec::new(),
            enhances: Vec::new(),
        }
    }

    pub fn class(id: DbId, name: &str, rules: TagClassRules) -> TagClass {
        TagClass {
            id,
            name: name.to_string(),
            validation_rules: rules,
        }
    }

    pub fn block(id: DbId, name: &str) -> PlotBlock {
        PlotBlock {
            id,
            name: name.to_string(),
            category: "plot".to_string(),
            fandom_id: FANDOM,
            parent_id: None,
            requires: Vec::new(),
            soft_requires: Vec::new(),
            enhances: Vec::new(),
            enabled_by: Vec::new(),
            conflicts_with: Vec::new(),
        }
    }

    pub fn condition(id: DbId, plot_block_id: DbId, name: &str) -> PlotBlockCondition {
        PlotBlockCondition {
            id,
            plot_block_id,
            name: name.to_string(),
            order: 0,
            parent_id: None,
            requires: Vec::new(),
            enables: Vec::new(),
        }
    }

    pub fn content() -> FandomContent {
        FandomContent {
            fandom_id: FANDOM,
            ..FandomContent::default()
        }
    }

    pub fn graph(content: FandomContent) -> RuleGraph {
        RuleGraph::build(content).expect("fixture content should build")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn build_indexes_entities() {
        let mut c = content();
        c.tags = vec![tag(10, "angst", "mood", None)];
        c.plot_blocks = vec![block(20, "Enemies to lovers")];
        c.conditions = vec![condition(30, 20, "First meeting")];
        let g = graph(c);

        assert_eq!(g.fandom_id(), FANDOM);
        assert_eq!(g.tag(10).map(|t| t.name.as_str()), Some("angst"));
        assert!(g.contains(EntityKind::PlotBlock, 20));
        assert!(g.contains(EntityKind::Condition, 30));
        assert!(!g.contains(EntityKind::Tag, 20));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut c = content();
        c.tags = vec![tag(10, "a", "mood", None), tag(10, "b", "mood", None)];
        assert_matches!(
            RuleGraph::build(c),
            Err(CoreError::Conflict {
                kind: EntityKind::Tag,
                id: 10
            })
        );
    }

    #[test]
    fn foreign_fandom_is_rejected() {
        let mut c = content();
        let mut foreign = block(20, "Elsewhere");
        foreign.fandom_id = 99;
        c.plot_blocks = vec![foreign];
        assert_matches!(RuleGraph::build(c), Err(CoreError::Validation(_)));
    }

    #[test]
    fn orphan_condition_is_rejected() {
        let mut c = content();
        c.conditions = vec![condition(30, 404, "Orphan")];
        assert_matches!(
            RuleGraph::build(c),
            Err(CoreError::NotFound {
                entity: "PlotBlock",
                id: 404
            })
        );
    }

    #[test]
    fn conditions_of_sorts_by_order() {
        let mut c = content();
        c.plot_blocks = vec![block(20, "Heist")];
        let mut late = condition(31, 20, "Escape");
        late.order = 2;
        let mut early = condition(32, 20, "Plan");
        early.order = 1;
        c.conditions = vec![late, early];
        let g = graph(c);

        let names: Vec<&str> = g
            .conditions_of(20)
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["Plan", "Escape"]);
    }

    #[test]
    fn plot_block_depth_follows_parents() {
        let mut c = content();
        let root = block(1, "Root");
        let mut mid = block(2, "Mid");
        mid.parent_id = Some(1);
        let mut leaf = block(3, "Leaf");
        leaf.parent_id = Some(2);
        c.plot_blocks = vec![root, mid, leaf];
        let g = graph(c);

        assert_eq!(g.plot_block_depth(1), Some(0));
        assert_eq!(g.plot_block_depth(3), Some(2));
        assert_eq!(g.plot_block_depth(99), Some(0));
    }

    #[test]
    fn plot_block_depth_detects_parent_loop() {
        let mut c = content();
        let mut a = block(1, "A");
        a.parent_id = Some(2);
        let mut b = block(2, "B");
        b.parent_id = Some(1);
        c.plot_blocks = vec![a, b];
        let g = graph(c);

        assert_eq!(g.plot_block_depth(1), None);
    }

    #[test]
    fn display_name_falls_back_to_id() {
        let g = RuleGraph::empty(FANDOM);
        assert_eq!(g.display_name(EntityKind::Tag, 7), "tag 7");
    }
}

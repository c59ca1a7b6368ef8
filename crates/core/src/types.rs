use serde::{Deserialize, Serialize};

/// All entity ids are PostgreSQL BIGSERIAL keys owned by the content service.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// The kind of graph entity an id belongs to.
///
/// Tags, plot blocks and plot-block conditions live in separate id spaces, so
/// an id is only meaningful together with its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Tag,
    PlotBlock,
    Condition,
}

impl EntityKind {
    /// Stable string representation matching serde's `rename_all = "snake_case"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tag => "tag",
            Self::PlotBlock => "plot_block",
            Self::Condition => "condition",
        }
    }

    /// Selection field name the kind is reported under.
    pub fn field(&self) -> &'static str {
        match self {
            Self::Tag => "tags",
            Self::PlotBlock => "plot_blocks",
            Self::Condition => "conditions",
        }
    }
}

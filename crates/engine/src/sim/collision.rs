use serde::{Deserialize, Serialize};

/// Collision category carried by every coordinate holder.
///
/// Pairwise rules:
/// - `Block` vs `Block` blocks.
/// - Any pair without `Ignore` and with at least one `Overlap` overlaps.
/// - Anything paired with `Ignore` neither blocks nor overlaps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionCategory {
    #[default]
    Block,
    Overlap,
    Ignore,
}

impl CollisionCategory {
    pub fn blocks(self, other: Self) -> bool {
        matches!((self, other), (Self::Block, Self::Block))
    }

    pub fn overlaps(self, other: Self) -> bool {
        if self == Self::Ignore || other == Self::Ignore {
            return false;
        }
        self == Self::Overlap || other == Self::Overlap
    }

    pub fn as_token(self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Overlap => "overlap",
            Self::Ignore => "ignore",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Body {
    pub category: CollisionCategory,
}

impl Body {
    pub const fn new(category: CollisionCategory) -> Self {
        Self { category }
    }

    pub fn blocks(&self, other: &Body) -> bool {
        self.category.blocks(other.category)
    }

    pub fn overlaps(&self, other: &Body) -> bool {
        self.category.overlaps(other.category)
    }
}

use serde::{Deserialize, Serialize};

/// A catalog entry for a capability tenants can use, gated by tier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    /// Lowest tier allowed to use the tool. Zero means unrestricted.
    pub min_tier: i64,
}

impl Tool {
    pub fn accessible_by(&self, tier: i64) -> bool {
        tier >= self.min_tier
    }
}

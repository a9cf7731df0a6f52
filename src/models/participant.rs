use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A confirmed entrant of a category: a single player or a doubles pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Participant {
    pub id: Uuid,
    #[validate(length(min = 1, max = 255))]
    pub display_name: String,
    /// 1-based rank used for bracket placement.
    #[validate(range(min = 1))]
    pub seed: u32,
}

impl Participant {
    pub fn new(id: Uuid, display_name: impl Into<String>, seed: u32) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            seed,
        }
    }

    /// Same identity placed at a different seed, used when qualifiers are
    /// re-seeded for the knockout stage.
    pub fn reseeded(&self, seed: u32) -> Self {
        Self {
            seed,
            ..self.clone()
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chatroom {
    pub id: String,
    pub name: String,
    pub description: String,
    pub creator_id: String,
    pub is_private: bool,
    /// Insertion-ordered, no duplicates; the creator is always present.
    pub member_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chatroom {
    pub fn new(creator_id: &str, name: &str, description: &str, is_private: bool) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.to_string(),
            creator_id: creator_id.to_string(),
            is_private,
            member_ids: vec![creator_id.to_string()],
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_member(&self, user_id: &str) -> bool {
        self.member_ids.iter().any(|m| m == user_id)
    }
}

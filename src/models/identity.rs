// src/models/identity.rs

use serde::Serialize;
use uuid::Uuid;

/// Prefix of server-issued guest subject ids.
pub const GUEST_PREFIX: &str = "guest:";

/// Who is taking the exam, as established by the identity middleware.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identity {
    Authenticated {
        subject_id: String,
        display_name: Option<String>,
    },
    /// A candidate without an account. `guest_id` is issued once per client
    /// and carried back in a guest token.
    Anonymous { guest_id: String },
}

impl Identity {
    /// A new anonymous candidate with a fresh `guest:<uuid>` id.
    pub fn guest() -> Self {
        Identity::Anonymous {
            guest_id: format!("{}{}", GUEST_PREFIX, Uuid::new_v4()),
        }
    }

    /// Subject component of the session key.
    pub fn subject_id(&self) -> &str {
        match self {
            Identity::Authenticated { subject_id, .. } => subject_id,
            Identity::Anonymous { guest_id } => guest_id,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous { .. })
    }
}

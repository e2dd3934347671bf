// 🧪 Project Entity - Target-system projects and their billing identifiers
//
// Each project may carry one PTA in `application_identifier`. Older exports
// used `pta` or `PTA` for the same field.

use crate::entities::canonical::EntityId;
use crate::normalize::normalize_text;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: EntityId,

    #[serde(default, alias = "project_name")]
    pub name: String,

    #[serde(default, alias = "pta", alias = "PTA")]
    pub application_identifier: Option<String>,

    #[serde(default)]
    pub active: Option<bool>,

    #[serde(default)]
    pub account: Option<EntityId>,
}

impl ProjectRecord {
    pub fn new(id: EntityId, name: impl Into<String>) -> Self {
        ProjectRecord {
            id,
            name: name.into(),
            application_identifier: None,
            active: None,
            account: None,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.application_identifier = Some(identifier.into());
        self
    }

    /// Canonical (trimmed, upper-case) PTA, or None when absent.
    pub fn identifier(&self) -> Option<String> {
        normalize_text(self.application_identifier.as_deref())?;
        self.application_identifier
            .as_deref()
            .map(|pta| pta.trim().to_uppercase())
    }
}

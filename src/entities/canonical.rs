// 👤 Canonical Entity - A record the target system already knows
//
// Snapshots come straight from the system's list endpoints (users carry a
// `projects` list). The reconciliation core only reads these; the desired
// new state is expressed as a MergeOutcome, never by editing the snapshot.

use crate::normalize::{normalize_email, normalize_name_pair, normalize_username, NameKey};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

pub type EntityId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalEntity {
    /// Stable numeric ID assigned by the target system
    pub id: EntityId,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub first_name: Option<String>,

    #[serde(default)]
    pub last_name: Option<String>,

    /// Currently-held associations (project IDs for users)
    #[serde(
        rename = "projects",
        alias = "associations",
        default,
        deserialize_with = "null_as_empty"
    )]
    pub associations: BTreeSet<EntityId>,
}

// Snapshots sometimes carry `"projects": null`
fn null_as_empty<'de, D>(deserializer: D) -> Result<BTreeSet<EntityId>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<BTreeSet<EntityId>>::deserialize(deserializer)?.unwrap_or_default())
}

impl CanonicalEntity {
    pub fn new(id: EntityId) -> Self {
        CanonicalEntity {
            id,
            email: None,
            username: None,
            first_name: None,
            last_name: None,
            associations: BTreeSet::new(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = Some(first.into());
        self.last_name = Some(last.into());
        self
    }

    pub fn with_associations(mut self, associations: impl IntoIterator<Item = EntityId>) -> Self {
        self.associations = associations.into_iter().collect();
        self
    }

    pub fn email_key(&self) -> Option<String> {
        normalize_email(self.email.as_deref())
    }

    pub fn username_key(&self) -> Option<String> {
        normalize_username(self.username.as_deref())
    }

    pub fn name_key(&self) -> Option<NameKey> {
        normalize_name_pair(self.first_name.as_deref(), self.last_name.as_deref())
    }

    /// Short human label for logs: email, then username, then name, then ID.
    pub fn label(&self) -> String {
        if let Some(email) = self.email_key() {
            return email;
        }
        if let Some(username) = self.username_key() {
            return username;
        }
        if let Some(name) = self.name_key() {
            return name.to_string();
        }
        format!("entity #{}", self.id)
    }
}

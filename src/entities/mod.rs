// Entity Models
//
// Snapshots of what the target system already holds:
// - CanonicalEntity: users (or anything keyed by email/username/name) with their associations
// - ProjectRecord: projects and the PTA each one bills against

pub mod canonical;
pub mod project;

pub use canonical::{CanonicalEntity, EntityId};
pub use project::ProjectRecord;

pub mod encoded_key;
pub mod index;
pub mod table;

use serde::{Deserialize, Serialize};

/// Stable per-table handle of a stored entity. Assigned at insert time,
/// never reused, and unchanged by primary-key updates, so index entries and
/// referrer sets captured before a mutation stay valid across it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct EntityId(pub u64);

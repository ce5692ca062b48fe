use serde::{Deserialize, Serialize};

use warehousex_core::UserId;

use crate::Role;

/// The acting user for a review call, as supplied by the authentication layer.
///
/// Treated as trusted once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reviewer {
    pub user_id: UserId,
    pub role: Role,
}

impl Reviewer {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }
}

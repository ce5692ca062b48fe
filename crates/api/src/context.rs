use warehousex_auth::{Reviewer, Role};
use warehousex_core::UserId;

/// Caller identity for a request, as asserted by the upstream gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    user_id: UserId,
    role: Role,
}

impl PrincipalContext {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn reviewer(&self) -> Reviewer {
        Reviewer::new(self.user_id, self.role.clone())
    }
}

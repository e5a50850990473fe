use serde::{Deserialize, Serialize};

use crate::domain::ids::UserId;

/// Role-gated identity consumed by the core — owned by an external
/// registration/profile system, out of scope for this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Guest,
    Member,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: UserId,
    pub role: Role,
    pub is_active: bool,
}

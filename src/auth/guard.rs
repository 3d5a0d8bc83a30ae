//! Ownership checks
//!
//! A caller may touch a record only if they own it. For users the owner is the
//! user themselves; for books it is `owner_id`.

use crate::database::models::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny,
}

impl Access {
    pub fn is_allowed(self) -> bool {
        self == Access::Allow
    }
}

pub fn authorize(caller: UserId, owner: UserId) -> Access {
    if caller == owner {
        Access::Allow
    } else {
        Access::Deny
    }
}

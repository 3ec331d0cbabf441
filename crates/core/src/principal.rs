//! Authenticated identity passed explicitly into mutating operations.

use serde::{Deserialize, Serialize};

use crate::id::UserId;

/// Store roles as issued by the authentication layer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Cashier,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Cashier => "cashier",
        }
    }
}

/// The authenticated caller of an engine operation.
///
/// Built by the (external) authentication layer and threaded through each
/// command, so recorded sales and supplies carry a typed actor reference.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    user_id: UserId,
    role: Role,
}

impl Principal {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn role(&self) -> Role {
        self.role
    }
}

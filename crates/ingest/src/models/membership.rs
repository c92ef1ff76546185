//! Staff membership model

use serde::{Deserialize, Serialize};

/// Role a user holds within a tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Admin,
    Agent,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Admin => "admin",
            MemberRole::Agent => "agent",
        }
    }

    /// Parse a stored role string, falling back to `Agent`
    pub fn parse(value: &str) -> Self {
        match value {
            "admin" => MemberRole::Admin,
            _ => MemberRole::Agent,
        }
    }
}

/// A user's membership in a tenant. Auto-created tickets are assigned to
/// the tenant's first active admin, when one exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    /// Unique integer identifier (database primary key)
    pub id: i64,
    pub company_id: i64,
    pub user_id: i64,
    pub role: MemberRole,
    pub is_active: bool,
}

impl Membership {
    /// Create a new membership (id will be assigned by database)
    pub fn new(company_id: i64, user_id: i64, role: MemberRole) -> Self {
        Self {
            id: 0, // Will be set by database
            company_id,
            user_id,
            role,
            is_active: true,
        }
    }

    /// Deactivate or reactivate the membership
    pub fn with_active(mut self, active: bool) -> Self {
        self.is_active = active;
        self
    }
}

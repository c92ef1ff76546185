//! Client organization model

use serde::{Deserialize, Serialize};

/// A customer organization registered by a tenant.
///
/// The `domains` list drives sender resolution: inbound mail from an address
/// under one of these domains is attributed to this client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    /// Unique integer identifier (database primary key)
    pub id: i64,
    /// Owning tenant
    pub company_id: i64,
    pub name: String,
    /// Email domains owned by this client (lowercase)
    pub domains: Vec<String>,
    pub is_active: bool,
}

impl Client {
    /// Create a new client (id will be assigned by database)
    pub fn new(company_id: i64, name: impl Into<String>) -> Self {
        Self {
            id: 0, // Will be set by database
            company_id,
            name: name.into(),
            domains: Vec::new(),
            is_active: true,
        }
    }

    /// Set the email domains attributed to this client
    pub fn with_domains(mut self, domains: Vec<String>) -> Self {
        self.domains = domains;
        self
    }

    /// Deactivate or reactivate the client
    pub fn with_active(mut self, active: bool) -> Self {
        self.is_active = active;
        self
    }
}

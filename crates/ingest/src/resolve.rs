//! Sender resolution
//!
//! Maps the From header of an inbound message to a client organization by
//! exact domain match against the tenant's client registry.

use std::collections::HashMap;

use crate::models::Client;

/// Identity parsed from a From header
#[derive(Debug, Clone, PartialEq)]
pub struct Sender {
    pub email: String,
    pub name: Option<String>,
}

/// Parse a From header into a sender identity.
///
/// Handles the `Display Name <addr@domain>` form and falls back to picking
/// the first bare token that looks like an address. Returns `None` when no
/// parsable address is present.
pub fn parse_sender(value: &str) -> Option<Sender> {
    let value = value.trim();

    if let Some(start) = value.rfind('<')
        && let Some(end) = value.rfind('>')
        && start < end
    {
        let email = value[start + 1..end].trim();
        if plausible_address(email) {
            let name = value[..start].trim().trim_matches('"').trim();
            return Some(Sender {
                email: email.to_string(),
                name: (!name.is_empty()).then(|| name.to_string()),
            });
        }
    }

    // Bare address: first delimited token with a local part and a domain
    value
        .split([' ', ',', ';'])
        .map(|token| token.trim_matches(|c: char| "<>\"'()".contains(c)))
        .find(|token| plausible_address(token))
        .map(|token| Sender {
            email: token.to_string(),
            name: None,
        })
}

fn plausible_address(value: &str) -> bool {
    match value.rsplit_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty(),
        None => false,
    }
}

/// Domain of an address, lowercased. `None` when the address has no usable
/// `local@domain` shape.
pub fn sender_domain(address: &str) -> Option<String> {
    let (local, domain) = address.rsplit_once('@')?;
    if local.is_empty() || domain.is_empty() {
        return None;
    }
    Some(domain.to_ascii_lowercase())
}

/// Lookup table from email domain to client organization.
///
/// Built once per tenant pass from the tenant's active clients. When two
/// clients claim the same domain the one seen last wins; the collision is
/// logged so the registry can be fixed.
#[derive(Debug, Default)]
pub struct DomainIndex {
    by_domain: HashMap<String, Client>,
}

impl DomainIndex {
    /// Build the index from a tenant's clients. Inactive clients and empty
    /// domain strings are ignored.
    pub fn build(clients: &[Client]) -> Self {
        let mut by_domain: HashMap<String, Client> = HashMap::new();

        for client in clients.iter().filter(|c| c.is_active) {
            for domain in &client.domains {
                let domain = domain.trim().to_ascii_lowercase();
                if domain.is_empty() {
                    continue;
                }
                if let Some(previous) = by_domain.get(&domain)
                    && previous.id != client.id
                {
                    log::warn!(
                        "Domain {} claimed by both client {} and client {}; keeping the latter",
                        domain,
                        previous.id,
                        client.id
                    );
                }
                by_domain.insert(domain, client.clone());
            }
        }

        Self { by_domain }
    }

    /// Exact-match lookup of a lowercased domain
    pub fn lookup(&self, domain: &str) -> Option<&Client> {
        self.by_domain.get(domain)
    }

    /// Resolve a From header to a client in one step
    pub fn resolve(&self, from_header: &str) -> Option<&Client> {
        let sender = parse_sender(from_header)?;
        let domain = sender_domain(&sender.email)?;
        self.lookup(&domain)
    }

    pub fn len(&self) -> usize {
        self.by_domain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_domain.is_empty()
    }
}

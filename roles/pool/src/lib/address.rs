use crate::config::NetworkConfig;

/// Decides whether a payout address is acceptable on the network the pool mines on.
pub trait AddressValidator: Send + Sync {
    fn validate_address(&self, address: &str) -> bool;
}

/// Checks the shape of an address against the configured network rules: one of the accepted
/// prefixes, the exact length when configured, and ASCII alphanumerics only.
///
/// Checksum verification of the encoded address is not performed here.
#[derive(Debug, Clone)]
pub struct NetworkAddressValidator {
    prefixes: Vec<String>,
    length: Option<usize>,
}

impl NetworkAddressValidator {
    pub fn new(config: &NetworkConfig) -> Self {
        Self {
            prefixes: config.address_prefixes.clone(),
            length: config.address_length,
        }
    }
}

impl AddressValidator for NetworkAddressValidator {
    fn validate_address(&self, address: &str) -> bool {
        if address.is_empty() || !address.chars().all(|c| c.is_ascii_alphanumeric()) {
            return false;
        }
        if let Some(length) = self.length {
            if address.len() != length {
                return false;
            }
        }
        self.prefixes.is_empty() || self.prefixes.iter().any(|p| address.starts_with(p.as_str()))
    }
}

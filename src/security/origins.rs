//! Origin allow-lists (addresses and CIDR blocks).

use std::net::IpAddr;

use ipnet::IpNet;

use crate::security::AuthorizationError;

/// Set of networks a request origin must fall into.
#[derive(Debug, Clone)]
pub struct OriginAllowList {
    networks: Vec<IpNet>,
}

impl OriginAllowList {
    /// Parse entries like `127.0.0.1`, `192.168.6.0/24` or `::1`.
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Result<Self, AuthorizationError> {
        let networks = entries
            .iter()
            .map(|entry| parse_entry(entry.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { networks })
    }

    pub fn contains(&self, addr: IpAddr) -> bool {
        let addr = addr.to_canonical();
        self.networks.iter().any(|net| net.contains(&addr))
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}

fn parse_entry(entry: &str) -> Result<IpNet, AuthorizationError> {
    let entry = entry.trim();
    if let Ok(net) = entry.parse::<IpNet>() {
        return Ok(net.trunc());
    }
    entry
        .parse::<IpAddr>()
        .map(IpNet::from)
        .map_err(|_| AuthorizationError::InvalidOrigin(entry.to_string()))
}

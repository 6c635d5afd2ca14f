use crate::{labels::Labels, service::Port};
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, fmt, str::FromStr};

/// A single endpoint of a service, bound to one of the service's ports.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInstance {
    /// The hostname of the service this instance belongs to.
    pub hostname: String,
    pub service_port: Port,
    pub endpoint: Endpoint,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// An IP address or, for DNS-resolved services, a hostname.
    pub address: String,

    /// The port the workload listens on.
    pub port: u16,

    #[serde(default)]
    pub labels: Labels,

    #[serde(default)]
    pub locality: Locality,

    /// The network the endpoint is reachable on. The unnamed network is `""`.
    #[serde(default)]
    pub network: String,

    #[serde(default)]
    pub tls_mode: TlsMode,

    /// Load balancing weight. Zero is treated as the default weight of 1.
    #[serde(default)]
    pub weight: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub struct Locality {
    pub region: String,
    pub zone: String,
    pub subzone: String,
}

/// Indicates whether an endpoint's sidecar accepts mesh mTLS.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    #[default]
    Disabled,
    Istio,
}

// === impl Endpoint ===

impl Endpoint {
    pub fn effective_weight(&self) -> u32 {
        if self.weight == 0 {
            1
        } else {
            self.weight
        }
    }
}

// === impl Locality ===

impl FromStr for Locality {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '/').map(str::to_string);
        Ok(Self {
            region: parts.next().unwrap_or_default(),
            zone: parts.next().unwrap_or_default(),
            subzone: parts.next().unwrap_or_default(),
        })
    }
}

impl From<String> for Locality {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(l) => l,
            Err(never) => match never {},
        }
    }
}

impl From<Locality> for String {
    fn from(l: Locality) -> Self {
        l.to_string()
    }
}

impl fmt::Display for Locality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.subzone.is_empty() {
            if self.zone.is_empty() {
                return f.write_str(&self.region);
            }
            return write!(f, "{}/{}", self.region, self.zone);
        }
        write!(f, "{}/{}/{}", self.region, self.zone, self.subzone)
    }
}

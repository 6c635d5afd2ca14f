use crate::labels::Labels;
use serde::{Deserialize, Serialize};
use std::{fmt, num::NonZeroU16, str::FromStr};

/// A service as reported by service discovery for one push cycle.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    /// Fully-qualified hostname, e.g. `reviews.default.svc.cluster.local`.
    pub hostname: String,

    /// Virtual addresses assigned to the service, if any.
    #[serde(default)]
    pub addresses: Vec<String>,

    /// Ports in the order they were declared.
    pub ports: Vec<Port>,

    #[serde(default)]
    pub resolution: Resolution,

    /// Set for services that live outside of the mesh.
    #[serde(default)]
    pub mesh_external: bool,

    #[serde(default)]
    pub attributes: ServiceAttributes,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAttributes {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub labels: Labels,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Port {
    pub name: String,
    pub port: NonZeroU16,
    #[serde(default)]
    pub protocol: Protocol,
}

/// Describes how clients locate the endpoints of a service.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Resolution {
    /// Endpoints are known to the control plane and load balanced by the proxy.
    #[default]
    ClientSideLb,

    /// Endpoints are hostnames resolved by the proxy through DNS.
    Dns,

    /// Connections are forwarded to their original destination.
    Passthrough,

    /// No resolution; behaves like passthrough.
    None,
}

/// The application protocol of a service port.
///
/// Parsing is case-insensitive and never fails: unknown protocol names are
/// treated as [`Protocol::Unsupported`] so that they are subject to protocol
/// sniffing.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum Protocol {
    Http,
    Http2,
    Grpc,
    GrpcWeb,
    Tcp,
    Tls,
    Udp,
    Mongo,
    Redis,
    Mysql,
    Thrift,
    #[default]
    Unsupported,
}

// === impl Service ===

impl Service {
    pub fn namespace(&self) -> &str {
        &self.attributes.namespace
    }

    pub fn port(&self, number: u16) -> Option<&Port> {
        self.ports.iter().find(|p| p.port.get() == number)
    }
}

// === impl Port ===

impl Port {
    pub fn new(name: impl ToString, port: NonZeroU16, protocol: Protocol) -> Self {
        Self {
            name: name.to_string(),
            port,
            protocol,
        }
    }
}

// === impl Protocol ===

impl Protocol {
    pub fn is_http2(self) -> bool {
        matches!(self, Self::Http2 | Self::Grpc | Self::GrpcWeb)
    }

    pub fn is_unsupported(self) -> bool {
        self == Self::Unsupported
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Http => "HTTP",
            Self::Http2 => "HTTP2",
            Self::Grpc => "GRPC",
            Self::GrpcWeb => "GRPC-Web",
            Self::Tcp => "TCP",
            Self::Tls => "TLS",
            Self::Udp => "UDP",
            Self::Mongo => "Mongo",
            Self::Redis => "Redis",
            Self::Mysql => "MySQL",
            Self::Thrift => "Thrift",
            Self::Unsupported => "UnsupportedProtocol",
        }
    }
}

impl FromStr for Protocol {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let protocol = match s.to_ascii_lowercase().as_str() {
            "http" => Self::Http,
            "http2" => Self::Http2,
            "grpc" => Self::Grpc,
            "grpc-web" => Self::GrpcWeb,
            "tcp" => Self::Tcp,
            "tls" | "https" => Self::Tls,
            "udp" => Self::Udp,
            "mongo" => Self::Mongo,
            "redis" => Self::Redis,
            "mysql" => Self::Mysql,
            "thrift" => Self::Thrift,
            _ => Self::Unsupported,
        };
        Ok(protocol)
    }
}

impl From<String> for Protocol {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(p) => p,
            Err(never) => match never {},
        }
    }
}

impl From<Protocol> for String {
    fn from(p: Protocol) -> Self {
        p.as_str().to_string()
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_protocols_case_insensitively() {
        for (input, expected) in [
            ("HTTP", Protocol::Http),
            ("http2", Protocol::Http2),
            ("gRPC", Protocol::Grpc),
            ("grpc-web", Protocol::GrpcWeb),
            ("TCP", Protocol::Tcp),
            ("HTTPS", Protocol::Tls),
            ("udp", Protocol::Udp),
            ("bogus", Protocol::Unsupported),
            ("", Protocol::Unsupported),
        ] {
            assert_eq!(input.parse::<Protocol>().unwrap(), expected, "{input}");
        }
    }

    #[test]
    fn test_parse_displayed() {
        for protocol in [
            Protocol::Http,
            Protocol::Http2,
            Protocol::Grpc,
            Protocol::GrpcWeb,
            Protocol::Tcp,
            Protocol::Tls,
            Protocol::Udp,
            Protocol::Mongo,
            Protocol::Redis,
            Protocol::Mysql,
            Protocol::Thrift,
            Protocol::Unsupported,
        ] {
            assert_eq!(
                protocol.to_string().parse::<Protocol>().unwrap(),
                protocol,
                "failed to parse displayed {:?}",
                protocol
            );
        }
    }

    #[test]
    fn deserializes_service() {
        let svc: Service = serde_json::from_str(
            r#"{
                "hostname": "foo.default.svc.cluster.local",
                "addresses": ["10.0.0.1"],
                "ports": [
                    {"name": "http", "port": 8080, "protocol": "HTTP"},
                    {"name": "auto", "port": 9090}
                ],
                "resolution": "dns",
                "attributes": {"namespace": "default", "labels": {"app": "foo"}}
            }"#,
        )
        .unwrap();
        assert_eq!(svc.namespace(), "default");
        assert_eq!(svc.resolution, Resolution::Dns);
        assert!(!svc.mesh_external);
        assert_eq!(svc.port(8080).unwrap().protocol, Protocol::Http);
        assert_eq!(svc.port(9090).unwrap().protocol, Protocol::Unsupported);
        assert!(svc.port(1).is_none());
    }
}

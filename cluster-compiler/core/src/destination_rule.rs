//! Destination rules and their traffic policies.
//!
//! Every setting is optional. Policies are resolved in layers, from lowest to
//! highest precedence:
//!
//! 1. the rule's default policy,
//! 2. the rule's port-level settings for the target port,
//! 3. the subset's policy,
//! 4. the subset's port-level settings for the target port.
//!
//! Layers merge field by field, so a subset that sets a single HTTP limit
//! keeps every other limit the rule configured. Load balancer settings are a
//! tagged choice and replace each other as a unit.

use crate::{duration::GoDuration, labels::Labels};
use serde::{Deserialize, Serialize};

/// A destination rule as stored in the config store.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationRuleConfig {
    pub name: String,
    pub namespace: String,
    pub spec: DestinationRule,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationRule {
    /// The hostname this rule applies to. May be a `*.`-prefixed wildcard.
    pub host: String,

    #[serde(default)]
    pub traffic_policy: Option<TrafficPolicy>,

    /// Named subsets, in declaration order.
    #[serde(default)]
    pub subsets: Vec<Subset>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subset {
    pub name: String,

    #[serde(default)]
    pub labels: Labels,

    #[serde(default)]
    pub traffic_policy: Option<TrafficPolicy>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficPolicy {
    #[serde(default)]
    pub connection_pool: Option<ConnectionPoolSettings>,

    #[serde(default)]
    pub outlier_detection: Option<OutlierDetection>,

    #[serde(default)]
    pub load_balancer: Option<LoadBalancerSettings>,

    #[serde(default)]
    pub port_level_settings: Vec<PortTrafficPolicy>,
}

/// Settings that override the enclosing policy for a single port.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortTrafficPolicy {
    pub port: PortSelector,

    #[serde(default)]
    pub connection_pool: Option<ConnectionPoolSettings>,

    #[serde(default)]
    pub outlier_detection: Option<OutlierDetection>,

    #[serde(default)]
    pub load_balancer: Option<LoadBalancerSettings>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortSelector {
    pub number: u16,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionPoolSettings {
    #[serde(default)]
    pub tcp: Option<TcpSettings>,

    #[serde(default)]
    pub http: Option<HttpSettings>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TcpSettings {
    pub max_connections: Option<u32>,
    pub connect_timeout: Option<GoDuration>,
    pub tcp_keepalive: Option<TcpKeepalive>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TcpKeepalive {
    pub probes: Option<u32>,
    pub time: Option<GoDuration>,
    pub interval: Option<GoDuration>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpSettings {
    pub http1_max_pending_requests: Option<u32>,
    pub http2_max_requests: Option<u32>,
    pub max_requests_per_connection: Option<u32>,
    pub max_retries: Option<u32>,
    pub idle_timeout: Option<GoDuration>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlierDetection {
    #[serde(rename = "consecutive5xxErrors")]
    pub consecutive_5xx_errors: Option<u32>,
    pub consecutive_gateway_errors: Option<u32>,
    pub interval: Option<GoDuration>,
    pub base_ejection_time: Option<GoDuration>,
    pub max_ejection_percent: Option<u32>,
    pub min_health_percent: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadBalancerSettings {
    Simple(SimpleLb),
    ConsistentHash(ConsistentHashLb),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SimpleLb {
    RoundRobin,
    LeastConn,
    Random,
    Passthrough,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistentHashLb {
    pub minimum_ring_size: Option<u64>,
}

/// A field-wise overlay of optional settings.
pub trait Merge {
    /// Overwrites every field of `self` that `overlay` sets.
    fn merge(&mut self, overlay: &Self);
}

fn overlay<T: Clone>(base: &mut Option<T>, overlay: &Option<T>) {
    if overlay.is_some() {
        base.clone_from(overlay);
    }
}

fn merge_nested<T: Merge + Clone>(base: &mut Option<T>, overlay: &Option<T>) {
    if let Some(o) = overlay {
        match base {
            Some(b) => b.merge(o),
            None => *base = Some(o.clone()),
        }
    }
}

// === impl TrafficPolicy ===

impl TrafficPolicy {
    /// Resolves the settings that apply to `port`, folding the matching
    /// port-level settings over the policy defaults.
    ///
    /// The returned policy never carries port-level settings.
    pub fn for_port(&self, port: u16) -> TrafficPolicy {
        let mut resolved = TrafficPolicy {
            connection_pool: self.connection_pool.clone(),
            outlier_detection: self.outlier_detection.clone(),
            load_balancer: self.load_balancer.clone(),
            port_level_settings: Vec::new(),
        };
        if let Some(p) = self
            .port_level_settings
            .iter()
            .find(|p| p.port.number == port)
        {
            merge_nested(&mut resolved.connection_pool, &p.connection_pool);
            merge_nested(&mut resolved.outlier_detection, &p.outlier_detection);
            overlay(&mut resolved.load_balancer, &p.load_balancer);
        }
        resolved
    }

    /// Resolves a subset's effective policy for `port` on top of the rule's
    /// policy. Either layer may be absent.
    pub fn layered(
        rule: Option<&TrafficPolicy>,
        subset: Option<&TrafficPolicy>,
        port: u16,
    ) -> TrafficPolicy {
        let mut resolved = rule.map(|p| p.for_port(port)).unwrap_or_default();
        if let Some(subset) = subset {
            resolved.merge(&subset.for_port(port));
        }
        resolved
    }
}

impl Merge for TrafficPolicy {
    fn merge(&mut self, o: &Self) {
        merge_nested(&mut self.connection_pool, &o.connection_pool);
        merge_nested(&mut self.outlier_detection, &o.outlier_detection);
        overlay(&mut self.load_balancer, &o.load_balancer);
        for p in &o.port_level_settings {
            match self.port_level_settings.iter_mut().find(|s| s.port == p.port) {
                Some(s) => {
                    merge_nested(&mut s.connection_pool, &p.connection_pool);
                    merge_nested(&mut s.outlier_detection, &p.outlier_detection);
                    overlay(&mut s.load_balancer, &p.load_balancer);
                }
                None => self.port_level_settings.push(p.clone()),
            }
        }
    }
}

impl Merge for ConnectionPoolSettings {
    fn merge(&mut self, o: &Self) {
        merge_nested(&mut self.tcp, &o.tcp);
        merge_nested(&mut self.http, &o.http);
    }
}

impl Merge for TcpSettings {
    fn merge(&mut self, o: &Self) {
        overlay(&mut self.max_connections, &o.max_connections);
        overlay(&mut self.connect_timeout, &o.connect_timeout);
        merge_nested(&mut self.tcp_keepalive, &o.tcp_keepalive);
    }
}

impl Merge for TcpKeepalive {
    fn merge(&mut self, o: &Self) {
        overlay(&mut self.probes, &o.probes);
        overlay(&mut self.time, &o.time);
        overlay(&mut self.interval, &o.interval);
    }
}

impl Merge for HttpSettings {
    fn merge(&mut self, o: &Self) {
        overlay(
            &mut self.http1_max_pending_requests,
            &o.http1_max_pending_requests,
        );
        overlay(&mut self.http2_max_requests, &o.http2_max_requests);
        overlay(
            &mut self.max_requests_per_connection,
            &o.max_requests_per_connection,
        );
        overlay(&mut self.max_retries, &o.max_retries);
        overlay(&mut self.idle_timeout, &o.idle_timeout);
    }
}

impl Merge for OutlierDetection {
    fn merge(&mut self, o: &Self) {
        overlay(&mut self.consecutive_5xx_errors, &o.consecutive_5xx_errors);
        overlay(
            &mut self.consecutive_gateway_errors,
            &o.consecutive_gateway_errors,
        );
        overlay(&mut self.interval, &o.interval);
        overlay(&mut self.base_ejection_time, &o.base_ejection_time);
        overlay(&mut self.max_ejection_percent, &o.max_ejection_percent);
        overlay(&mut self.min_health_percent, &o.min_health_percent);
    }
}

// === impl DestinationRule ===

impl DestinationRule {
    pub fn subset(&self, name: &str) -> Option<&Subset> {
        self.subsets.iter().find(|s| s.name == name)
    }
}

// === impl DestinationRuleConfig ===

impl DestinationRuleConfig {
    /// A stable reference to the rule's source config, recorded in the
    /// metadata of clusters it shapes.
    pub fn config_path(&self) -> String {
        format!(
            "/apis/networking.istio.io/v1alpha3/namespaces/{}/destination-rule/{}",
            self.namespace, self.name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(f: impl FnOnce(&mut HttpSettings)) -> TrafficPolicy {
        let mut http = HttpSettings::default();
        f(&mut http);
        TrafficPolicy {
            connection_pool: Some(ConnectionPoolSettings {
                http: Some(http),
                tcp: None,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn subset_fields_overlay_rule_fields() {
        let rule = TrafficPolicy {
            connection_pool: Some(ConnectionPoolSettings {
                tcp: Some(TcpSettings {
                    max_connections: Some(100),
                    ..Default::default()
                }),
                http: Some(HttpSettings {
                    http2_max_requests: Some(1000),
                    max_retries: Some(3),
                    ..Default::default()
                }),
            }),
            load_balancer: Some(LoadBalancerSettings::Simple(SimpleLb::Random)),
            ..Default::default()
        };
        let subset = http(|h| h.max_retries = Some(10));

        let merged = TrafficPolicy::layered(Some(&rule), Some(&subset), 8080);
        let pool = merged.connection_pool.unwrap();
        let http = pool.http.unwrap();
        assert_eq!(http.max_retries, Some(10));
        assert_eq!(http.http2_max_requests, Some(1000));
        assert_eq!(pool.tcp.unwrap().max_connections, Some(100));
        assert_eq!(
            merged.load_balancer,
            Some(LoadBalancerSettings::Simple(SimpleLb::Random))
        );
    }

    #[test]
    fn absent_layers_fall_through() {
        assert_eq!(TrafficPolicy::layered(None, None, 80), TrafficPolicy::default());

        let subset = http(|h| h.max_retries = Some(10));
        let merged = TrafficPolicy::layered(None, Some(&subset), 80);
        assert_eq!(merged, subset);

        let merged = TrafficPolicy::layered(Some(&subset), None, 80);
        assert_eq!(merged, subset);
    }

    #[test]
    fn port_level_settings_apply_to_their_port_only() {
        let rule = TrafficPolicy {
            port_level_settings: vec![PortTrafficPolicy {
                port: PortSelector { number: 9090 },
                connection_pool: Some(ConnectionPoolSettings {
                    http: Some(HttpSettings {
                        max_retries: Some(7),
                        ..Default::default()
                    }),
                    tcp: None,
                }),
                outlier_detection: None,
                load_balancer: Some(LoadBalancerSettings::Simple(SimpleLb::LeastConn)),
            }],
            ..http(|h| {
                h.max_retries = Some(2);
                h.idle_timeout = Some(GoDuration::from_secs(30));
            })
        };

        let on_8080 = rule.for_port(8080);
        let h = on_8080.connection_pool.unwrap().http.unwrap();
        assert_eq!(h.max_retries, Some(2));
        assert_eq!(on_8080.load_balancer, None);
        assert!(on_8080.port_level_settings.is_empty());

        let on_9090 = rule.for_port(9090);
        let h = on_9090.connection_pool.unwrap().http.unwrap();
        assert_eq!(h.max_retries, Some(7));
        assert_eq!(h.idle_timeout, Some(GoDuration::from_secs(30)));
        assert_eq!(
            on_9090.load_balancer,
            Some(LoadBalancerSettings::Simple(SimpleLb::LeastConn))
        );
    }

    #[test]
    fn subset_port_settings_take_precedence() {
        let rule = TrafficPolicy {
            port_level_settings: vec![PortTrafficPolicy {
                port: PortSelector { number: 80 },
                connection_pool: None,
                outlier_detection: Some(OutlierDetection {
                    consecutive_5xx_errors: Some(5),
                    interval: Some(GoDuration::from_secs(10)),
                    ..Default::default()
                }),
                load_balancer: None,
            }],
            ..Default::default()
        };
        let subset = TrafficPolicy {
            outlier_detection: Some(OutlierDetection {
                consecutive_5xx_errors: Some(1),
                ..Default::default()
            }),
            port_level_settings: vec![PortTrafficPolicy {
                port: PortSelector { number: 80 },
                connection_pool: None,
                outlier_detection: Some(OutlierDetection {
                    max_ejection_percent: Some(50),
                    ..Default::default()
                }),
                load_balancer: None,
            }],
            ..Default::default()
        };

        let od = TrafficPolicy::layered(Some(&rule), Some(&subset), 80)
            .outlier_detection
            .unwrap();
        assert_eq!(od.consecutive_5xx_errors, Some(1));
        assert_eq!(od.interval, Some(GoDuration::from_secs(10)));
        assert_eq!(od.max_ejection_percent, Some(50));
    }

    #[test]
    fn deserializes_istio_shaped_rule() {
        let rule: DestinationRule = serde_json::from_str(
            r#"{
                "host": "reviews",
                "trafficPolicy": {
                    "connectionPool": {"tcp": {"connectTimeout": "3s"}},
                    "loadBalancer": {"simple": "LEAST_CONN"},
                    "portLevelSettings": [
                        {
                            "port": {"number": 9080},
                            "loadBalancer": {"simple": "RANDOM"}
                        }
                    ]
                },
                "subsets": [
                    {"name": "v1", "labels": {"version": "v1"}},
                    {
                        "name": "v2",
                        "labels": {"version": "v2"},
                        "trafficPolicy": {
                            "connectionPool": {"http": {"maxRetries": 10}},
                            "outlierDetection": {"consecutive5xxErrors": 2}
                        }
                    }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(rule.subsets.len(), 2);
        assert_eq!(rule.subsets[0].name, "v1");
        let v2 = rule.subset("v2").unwrap();
        let policy = v2.traffic_policy.as_ref().unwrap();
        assert_eq!(
            policy.outlier_detection.as_ref().unwrap().consecutive_5xx_errors,
            Some(2)
        );
        let policy = rule.traffic_policy.unwrap();
        assert_eq!(
            policy.load_balancer,
            Some(LoadBalancerSettings::Simple(SimpleLb::LeastConn))
        );
        assert_eq!(policy.port_level_settings[0].port.number, 9080);
        assert_eq!(
            policy.for_port(9080).load_balancer,
            Some(LoadBalancerSettings::Simple(SimpleLb::Random))
        );
    }
}

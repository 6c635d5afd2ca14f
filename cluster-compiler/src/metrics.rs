use crate::xds::{Cluster, Error};
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{
        counter::Counter,
        family::Family,
        histogram::{exponential_buckets, Histogram},
    },
    registry::{Registry, Unit},
};
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct CompilerMetrics {
    clusters: Family<DiscoveryLabels, Counter>,
    failures: Family<FailureLabels, Counter>,
    build_duration: Histogram,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct DiscoveryLabels {
    discovery_type: &'static str,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct FailureLabels {
    reason: &'static str,
}

// === impl CompilerMetrics ===

impl CompilerMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let clusters = Family::<DiscoveryLabels, Counter>::default();
        reg.register(
            "clusters",
            "Total number of clusters built, by discovery type",
            clusters.clone(),
        );

        let failures = Family::<FailureLabels, Counter>::default();
        reg.register(
            "build_failures",
            "Total number of proxies whose clusters could not be built",
            failures.clone(),
        );

        // From 100us to ~1.6s.
        let build_duration = Histogram::new(exponential_buckets(0.0001, 4.0, 8));
        reg.register_with_unit(
            "build_duration",
            "Histogram of the time taken to build the clusters of one proxy",
            Unit::Seconds,
            build_duration.clone(),
        );

        Self {
            clusters,
            failures,
            build_duration,
        }
    }

    pub(crate) fn observe(&self, result: &Result<Vec<Cluster>, Error>, elapsed: Duration) {
        self.build_duration.observe(elapsed.as_secs_f64());
        match result {
            Ok(clusters) => {
                for c in clusters {
                    self.clusters
                        .get_or_create(&DiscoveryLabels {
                            discovery_type: c.discovery_type.as_str(),
                        })
                        .inc();
                }
            }
            Err(error) => {
                let reason = match error {
                    Error::IpFamiliesNotDiscovered(_) => "ip_families_not_discovered",
                    Error::SidecarScopeNotSet(_) => "sidecar_scope_not_set",
                    Error::StaleSidecarScope { .. } => "stale_sidecar_scope",
                };
                self.failures.get_or_create(&FailureLabels { reason }).inc();
            }
        }
    }
}

impl Default for CompilerMetrics {
    /// Metrics that aren't exported.
    fn default() -> Self {
        Self::register(&mut Registry::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xds::DiscoveryType;
    use prometheus_client::encoding::text::encode;

    #[test]
    fn records_clusters_and_failures() {
        let mut registry = Registry::with_prefix("cluster_compiler");
        let metrics = CompilerMetrics::register(&mut registry);

        metrics.observe(
            &Ok(vec![
                Cluster::new("a", DiscoveryType::Eds),
                Cluster::new("b", DiscoveryType::Eds),
                Cluster::new("c", DiscoveryType::OriginalDst),
            ]),
            Duration::from_millis(3),
        );
        metrics.observe(
            &Err(Error::SidecarScopeNotSet("p".to_string())),
            Duration::from_millis(1),
        );

        let mut text = String::new();
        encode(&mut text, &registry).unwrap();
        assert!(
            text.contains(r#"cluster_compiler_clusters_total{discovery_type="EDS"} 2"#),
            "{text}"
        );
        assert!(
            text.contains(r#"cluster_compiler_clusters_total{discovery_type="ORIGINAL_DST"} 1"#),
            "{text}"
        );
        assert!(
            text.contains(
                r#"cluster_compiler_build_failures_total{reason="sidecar_scope_not_set"} 1"#
            ),
            "{text}"
        );
        assert!(
            text.contains("cluster_compiler_build_duration_seconds_count 2"),
            "{text}"
        );
    }
}

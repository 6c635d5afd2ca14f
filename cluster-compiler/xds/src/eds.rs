use crate::cluster::{Cluster, ConfigSource, DiscoveryType, EdsClusterConfig};
use std::time::Duration;

/// Points an EDS cluster at the aggregated discovery stream, using the
/// cluster's own name as the service name. Other clusters are left as-is.
///
/// Any previous EDS config is replaced, so applying this repeatedly has the
/// same effect as applying it once.
pub fn maybe_apply_eds_config(cluster: &mut Cluster, initial_fetch_timeout: Duration) {
    if cluster.discovery_type != DiscoveryType::Eds {
        return;
    }
    cluster.eds_cluster_config = Some(EdsClusterConfig {
        service_name: cluster.name.clone(),
        eds_config: ConfigSource::Ads {
            initial_fetch_timeout,
        },
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_to_eds_clusters_only() {
        let timeout = Duration::from_secs(1);
        for ty in [
            DiscoveryType::Static,
            DiscoveryType::StrictDns,
            DiscoveryType::OriginalDst,
        ] {
            let mut cluster = Cluster::new("foo", ty);
            maybe_apply_eds_config(&mut cluster, timeout);
            assert_eq!(cluster.eds_cluster_config, None, "{ty:?}");
        }

        let mut cluster = Cluster::new("outbound|8080||foo", DiscoveryType::Eds);
        maybe_apply_eds_config(&mut cluster, timeout);
        assert_eq!(cluster.eds_service_name(), Some("outbound|8080||foo"));
        assert_eq!(
            cluster.eds_cluster_config.unwrap().eds_config,
            ConfigSource::Ads {
                initial_fetch_timeout: timeout
            }
        );
    }

    #[test]
    fn is_idempotent() {
        let mut once = Cluster::new("outbound|8080||foo", DiscoveryType::Eds);
        maybe_apply_eds_config(&mut once, Duration::ZERO);

        let mut twice = once.clone();
        maybe_apply_eds_config(&mut twice, Duration::ZERO);
        assert_eq!(once, twice);
    }

    #[test]
    fn follows_renamed_clusters() {
        let mut cluster = Cluster::new("outbound|8080||foo", DiscoveryType::Eds);
        maybe_apply_eds_config(&mut cluster, Duration::ZERO);

        cluster.name = "outbound|8080|v1|foo".to_string();
        maybe_apply_eds_config(&mut cluster, Duration::ZERO);
        assert_eq!(cluster.eds_service_name(), Some("outbound|8080|v1|foo"));
    }
}

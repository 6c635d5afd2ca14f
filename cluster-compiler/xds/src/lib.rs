//! Compiles a proxy's view of the service model into cluster descriptors.
//!
//! A [`ClusterBuilder`] borrows an initialized [`Proxy`] and a [`PushContext`]
//! and produces the ordered list of clusters the proxy needs. Builds are
//! synchronous and never mutate their inputs, so any number of them may run
//! concurrently against the same push context.
//!
//! [`Proxy`]: mesh_cluster_compiler_core::Proxy
//! [`PushContext`]: mesh_cluster_compiler_core::PushContext

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod builder;
pub mod cluster;
mod eds;
mod endpoints;
mod error;
pub mod naming;
pub mod passthrough;
mod policy;

pub use self::{
    builder::{discovery_type, ClusterBuilder},
    cluster::{Cluster, DiscoveryType, LbPolicy},
    eds::maybe_apply_eds_config,
    endpoints::build_locality_lb_endpoints,
    error::Error,
    naming::{cluster_name, parse_subset_key, sni_dnat_cluster_name, ClusterMode, TrafficDirection},
    policy::{apply_traffic_policy, default_thresholds},
};

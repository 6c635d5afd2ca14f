//! Drives cluster builds for the proxies of a mesh.
//!
//! A [`Compiler`] is created once per push cycle around the cycle's shared
//! [`PushContext`](core::PushContext). Builds for different proxies run
//! concurrently on the blocking pool; each reads the same snapshot.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use mesh_cluster_compiler_core as core;
pub use mesh_cluster_compiler_xds as xds;

mod args;
mod metrics;

pub use self::{args::MeshArgs, metrics::CompilerMetrics};

use self::{
    core::{Proxy, PushContext},
    xds::{Cluster, ClusterBuilder, Error},
};
use anyhow::Result;
use std::{sync::Arc, time::Instant};
use tokio::task::JoinSet;

pub type BuildResult = std::result::Result<Vec<Cluster>, Error>;

#[derive(Clone, Debug)]
pub struct Compiler {
    push: Arc<PushContext>,
    metrics: CompilerMetrics,
}

// === impl Compiler ===

impl Compiler {
    pub fn new(push: Arc<PushContext>, metrics: CompilerMetrics) -> Self {
        Self { push, metrics }
    }

    /// Derives the proxy's IP families and sidecar scope from the push
    /// context. Must be called before the proxy's clusters are built.
    pub fn init_proxy(&self, proxy: &mut Proxy) {
        proxy.discover_ip_families();
        proxy.set_sidecar_scope(&self.push);
    }

    /// Builds the clusters of an initialized proxy.
    pub fn build(&self, proxy: &Proxy) -> BuildResult {
        let _span = tracing::info_span!(
            "build",
            proxy = %proxy.id,
            version = %self.push.version()
        )
        .entered();

        let start = Instant::now();
        let result = ClusterBuilder::new(proxy, &self.push).build_clusters();
        self.metrics.observe(&result, start.elapsed());
        if let Err(error) = &result {
            tracing::warn!(%error, "Failed to build clusters");
        }
        result
    }

    /// Initializes and builds each proxy on the blocking pool.
    ///
    /// Results are returned in the order of `proxies`. An error is returned
    /// only if a build task panics.
    pub async fn build_all(&self, proxies: Vec<Proxy>) -> Result<Vec<BuildResult>> {
        let mut tasks = JoinSet::new();
        for (i, mut proxy) in proxies.into_iter().enumerate() {
            let compiler = self.clone();
            tasks.spawn_blocking(move || {
                compiler.init_proxy(&mut proxy);
                (i, compiler.build(&proxy))
            });
        }

        let mut results = Vec::with_capacity(tasks.len());
        results.resize_with(tasks.len(), || None);
        while let Some(res) = tasks.join_next().await {
            let (i, result) = res?;
            results[i] = Some(result);
        }
        tracing::debug!(proxies = results.len(), "Built clusters for all proxies");
        Ok(results.into_iter().flatten().collect())
    }
}

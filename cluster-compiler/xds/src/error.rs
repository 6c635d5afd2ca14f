/// Violations of the proxy initialization contract.
///
/// A proxy must be fully initialized before any cluster is built for it.
/// Clusters are never emitted for a proxy that isn't.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("IP families of proxy {0} have not been discovered")]
    IpFamiliesNotDiscovered(String),

    #[error("sidecar scope of proxy {0} has not been set")]
    SidecarScopeNotSet(String),

    #[error("sidecar scope of proxy {proxy} was computed for push {scope}, not {push}")]
    StaleSidecarScope {
        proxy: String,
        scope: String,
        push: String,
    },
}

/// Deployment profile. Affects only the `hello`/`isMaster` response
/// shape and read-preference validation. Neither profile changes the core
/// command-execution semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeploymentProfile {
    #[default]
    Standalone,
    SingleNodeReplicaSet,
}

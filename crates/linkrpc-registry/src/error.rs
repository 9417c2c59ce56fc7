use thiserror::Error;

/// Errors raised by the registry itself (as opposed to handler bodies, which
/// report failure through [`crate::RouteOutcome`]).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("duplicate registration key: {0}")]
    DuplicateName(String),

    /// An [`crate::RpcContext`] was used to respond more than once.
    #[error("rpc context for {0} already has a response")]
    HasResponse(String),
}

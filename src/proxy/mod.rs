// Prefix-based reverse proxy: target registry, path rewrites and forwarding

pub mod forward;
pub mod middleware;
pub mod registry;
pub mod rewrite;
pub mod target;

pub use forward::{ForwardError, Forwarder};
pub use middleware::proxy_middleware;
pub use registry::{RegistryError, TargetRegistry};
pub use rewrite::{RewriteError, RewriteRules};
pub use target::{ProxyTarget, SELF_TARGET_NAME};

// Integration with the SQL workbench: admin client, delegated login,
// session cache and connection reconciliation

pub mod adapter;
pub mod client;
pub mod document;
pub mod error;
pub mod fingerprint;
pub mod graphql;
pub mod login;
pub mod queries;
pub mod reconciler;
pub mod session;

#[cfg(test)]
pub(crate) mod fake;

pub use adapter::{translate, ConnectionConfig};
pub use client::{RemoteAdminClient, WorkbenchAdmin};
pub use document::{DocumentError, RootField};
pub use error::{TranslationError, WorkbenchError};
pub use fingerprint::fingerprint;
pub use graphql::{GqlError, GqlRequest, GqlResponse};
pub use login::{LoginOutcome, WorkbenchService};
pub use reconciler::{ConnectionReconciler, ReconcileReport};
pub use session::{SessionCache, SessionHandle};

// Inline handling of the workbench query endpoint: per-operation policy,
// variable coercion, audit/masking hooks and response rewriting

pub mod engine;
pub mod hooks;
pub mod intercept;
pub mod policy;
pub mod tasks;
pub mod variables;

pub use engine::{dispatcher_middleware, Dispatcher};
pub use hooks::{AuditDecision, AuditRequest, DataMasker, HookError, MaskRequest, SqlAuditor};
pub use intercept::Interception;
pub use policy::{policy_for, OperationPolicy};
pub use variables::{coerce, VariablesError};

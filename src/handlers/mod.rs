// handlers/mod.rs - Local gateway endpoints by security tier
//
// Public (no auth) → Protected (JWT auth) → Elevated (admin JWT auth)
// Everything else is routed by the proxy middleware.
pub mod public;
pub mod protected;
pub mod elevated;

pub use public::*;
pub use protected::*;
pub use elevated::*;

// handlers/elevated/mod.rs - Elevated handlers (admin JWT required)
//
// Security Level: JWT with role "admin"
// Routes: /api/gateway/*

pub mod targets;

pub use targets::{list_targets, register_target};

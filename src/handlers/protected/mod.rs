// handlers/protected/mod.rs - Protected handlers (JWT authentication required)
//
// Security Level: valid JWT
// Routes: /api/workbench/*

pub mod workbench;

pub use workbench::{workbench_login, workbench_logout};

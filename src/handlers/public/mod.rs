// handlers/public/mod.rs - Public handlers (no authentication required)
//
// Security Level: None
// Routes: /health

pub mod health;

pub use health::health;

pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod database;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod platform;
pub mod proxy;
pub mod workbench;

pub use app::{router, AppState};

pub mod health;
pub mod target;

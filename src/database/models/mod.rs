pub mod proxy_target;
pub mod remote_connection;

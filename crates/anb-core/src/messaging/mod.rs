pub mod port;
pub mod types;

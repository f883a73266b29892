pub mod agent;
pub mod config;
pub mod credentials;
pub mod db;
pub mod pdf;
pub mod pipeline;
pub mod prompt;
pub mod report;
pub mod store;
pub mod stream;
pub mod types;

pub use types::*;

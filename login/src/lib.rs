pub mod client;
pub mod config;
pub mod error;
pub mod retry;
pub mod submission;
pub mod validation;

pub mod aggregate;
pub mod cli;
pub mod error;
pub mod filter;
pub mod fmt;
pub mod loader;
pub mod models;
pub mod settings;

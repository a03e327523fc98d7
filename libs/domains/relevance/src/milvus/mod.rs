mod client;
mod config;
pub mod expr;

pub use client::MilvusRepository;
pub use config::MilvusConfig;

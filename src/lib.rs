//! cx-service: App Store / Play Store ratings and BVC market data as JSON

pub mod cli;
pub mod clients;
pub mod config;
pub mod server;
pub mod services;
pub mod types;

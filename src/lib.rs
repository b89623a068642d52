pub mod capture;
pub mod chat;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod privacy;
pub mod provider;
pub mod registry;
pub mod response;
pub mod server;
pub mod service;
pub mod store;
pub mod tools;
pub mod types;

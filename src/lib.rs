pub mod cli;
pub mod config;
pub mod error;
pub mod telemetry;
pub mod model;
pub mod session;
pub mod streaming;
pub mod runner;
pub mod tools;
pub mod agents;
pub mod chat;
pub mod doctor;
pub mod server;
pub mod eval;
pub mod deploy;
pub mod schema;

// Public API - per-operation entry points plus the domain types they expose
pub mod compare;
pub mod dispatch;
pub mod error;
pub mod layout;
pub mod merge;
pub mod runner;
pub mod settings;
pub mod tables;
pub mod telemetry;

// Internal modules - organized by subsystem
mod config;

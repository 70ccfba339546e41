pub mod config;
pub mod logging;

// Pipeline components, leaf-first.
pub mod cache;
pub mod client;
pub mod error;
pub mod feedback;
pub mod monitor;
pub mod offline;
pub mod queue;
pub mod retry;
pub mod transport;

//! The Gateway Interface (AGI/FastAGI/Async AGI) engine (spec.md §4.4).

mod config;

pub mod async_agi;
pub mod command;
pub mod engine;
pub mod message;

pub use async_agi::AsyncAgiAdapter;
pub use config::AgiConfig;
pub use engine::{AgiEngine, AgiState};
pub use message::{agi_request_type, AgiReply, AgiRequestType, Environment};

//! The Manager Interface (AMI) engine (spec.md §4.3).

mod config;
mod registry;

pub mod call_tracker;
pub mod engine;
pub mod message;

pub use call_tracker::{CallStatus, CallTracker, OriginateParams};
pub use config::AmiConfig;
pub use engine::{ActionOutcome, AmiEngine, AmiState};
pub use message::{Action, Event, ListResult, Response};
pub use registry::HandlerToken;

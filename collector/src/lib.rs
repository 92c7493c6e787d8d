pub mod collector;
pub mod config;
pub mod error;
pub mod event;
pub mod identity;
pub mod sink;
pub mod time;

pub use collector::{Collector, FlushOutcome};
pub use config::Config;
pub use event::{Event, PageContext, Properties};

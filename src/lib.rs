pub mod api;
pub mod client;
pub mod extract;
pub mod monitoring;
pub mod pipeline;
pub mod snapshot;
pub mod storage;
pub mod types;
pub mod utils;

pub use crate::types::*;

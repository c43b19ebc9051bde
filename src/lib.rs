pub mod algorithms;
pub mod cache;
pub mod config;
pub mod data;
pub mod error;
pub mod logging;
pub mod pipeline;

pub use algorithms::*;
pub use cache::{AlignmentCache, AlignmentRecord};
pub use data::*;
pub use error::{AlignError, Result};
pub use pipeline::*;

// Frequency-domain registration primitives
pub mod fft;
pub mod filters;
pub mod log_polar;
pub mod optical_flow;
pub mod phase_correlation;
pub mod rotation_scale;
pub mod spectrum;
pub mod translation;

pub use log_polar::{log_scale, warp_log_polar};
pub use optical_flow::*;
pub use phase_correlation::*;
pub use rotation_scale::*;
pub use spectrum::*;
pub use translation::*;

pub mod loader;
pub mod normalizer;
pub mod raster;
pub mod transformer;

pub use loader::*;
pub use normalizer::*;
pub use raster::{from_dynamic, from_gray, luminance, to_dynamic, RasterImage};
pub use transformer::*;

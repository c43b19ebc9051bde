pub mod batch;
pub mod registration;
pub mod traits;
pub mod types;

pub use batch::*;
pub use registration::*;
pub use traits::*;
pub use types::*;

pub mod inference;
pub mod system;

pub use inference::*;
pub use system::*;

pub mod actor;
pub mod catchers;

pub use actor::*;
pub use catchers::*;

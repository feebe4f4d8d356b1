pub mod attendance;
pub mod booking;
pub mod conflict;
pub mod form;

pub use attendance::*;
pub use booking::*;
pub use conflict::*;
pub use form::*;

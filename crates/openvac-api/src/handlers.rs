//! Request handlers.

pub mod convert;
pub mod frames;
pub mod health;
pub mod jobs;
pub mod preview;

pub use convert::*;
pub use frames::*;
pub use health::*;
pub use jobs::*;
pub use preview::*;

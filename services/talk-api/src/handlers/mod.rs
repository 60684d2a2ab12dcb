//! REST API handlers

pub mod health;
pub mod payment;
pub mod plans;
pub mod question;
pub mod shared;
pub mod subscription;
pub mod users;

pub use health::*;
pub use payment::*;
pub use plans::*;
pub use question::*;
pub use subscription::*;
pub use users::*;

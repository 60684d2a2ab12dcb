//! Anshim Types - Shared domain types
//!
//! This crate contains domain types used across the Anshim Talk services:
//! - User identity and membership tier
//! - Subscription plans, subscriptions and payments
//! - Question usage windows and quota decisions

pub mod error;
pub mod payment;
pub mod plan;
pub mod quota;
pub mod subscription;
pub mod tier;
pub mod usage;
pub mod user;

pub use error::*;
pub use payment::*;
pub use plan::*;
pub use quota::*;
pub use subscription::*;
pub use tier::*;
pub use usage::*;
pub use user::*;

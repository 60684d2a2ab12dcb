//! Anshim Quota Core - question entitlement
//!
//! Decides whether a caller may ask another question and counts answered
//! questions against the daily, weekly and monthly windows (members) or the
//! per-session guest limit.
//!
//! # Example
//!
//! ```rust,ignore
//! use anshim_quota_core::{Admission, QuotaConfig, QuotaService};
//!
//! let quota = QuotaService::new(&repos, QuotaConfig::new(secret))?;
//!
//! match quota.acquire(&identity).await {
//!     Admission::Granted(ticket) => {
//!         let answer = answer_question().await?;
//!         quota.record(ticket).await?;
//!     }
//!     Admission::Denied(decision) => { /* limit reached */ }
//! }
//! ```

pub mod config;
pub mod crypto;
pub mod error;
pub mod guest;
pub mod resolver;
pub mod service;

pub use config::{QuotaConfig, QuotaLimits};
pub use error::QuotaError;
pub use guest::{GuestPass, GuestPassSigner};
pub use resolver::{resolve, EntitlementSnapshot};
pub use service::{Admission, QuestionTicket, QuotaService, QuotaStatus, Recorded};

//! Anshim DB - Database abstractions
//!
//! SQLx-based database layer for the Anshim Talk services.
//!
//! # Example
//!
//! ```rust,ignore
//! use anshim_db::{create_pool, Repositories};
//!
//! let pool = create_pool("postgres://localhost/anshim").await?;
//! let repos = Repositories::new(pool).shared();
//!
//! let user = repos.users.find_by_id(user_id).await?;
//! let mut tx = repos.store.begin().await?;
//! ```

pub mod error;
#[cfg(feature = "memory")]
pub mod memory;
pub mod models;
pub mod pg;
pub mod pool;
pub mod repo;

pub use error::{DbError, DbResult};
pub use models::*;
pub use pg::Repositories;
pub use pool::{create_pool, DbPool};
pub use repo::*;

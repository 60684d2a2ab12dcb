//! Question quota service
//!
//! Asking a question is a two-step protocol: [`QuotaService::acquire`] checks
//! entitlement and hands out a [`QuestionTicket`], and
//! [`QuotaService::record`] consumes that ticket once the answer has been
//! produced. For members the ticket also holds a per-user lock, so two
//! concurrent questions from one account are checked and counted one after
//! the other. Dropping a ticket (failed answer, client gone) counts nothing.

use std::sync::Arc;

use anshim_db::{DbError, SharedRepositories, SubscriptionRepository, UserRepository};
use anshim_types::{Identity, QuestionDecision, UsageCounters, UserId, WindowStarts};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::instrument;
use uuid::Uuid;

use crate::config::QuotaConfig;
use crate::guest::{GuestPass, GuestPassSigner};
use crate::resolver::{resolve, EntitlementSnapshot};
use crate::QuotaError;

type LockMap = DashMap<Uuid, Arc<Mutex<()>>>;

/// Current decision for a caller
#[derive(Debug, Clone)]
pub struct QuotaStatus {
    pub decision: QuestionDecision,
    /// Newly issued pass for a guest that did not present one
    pub guest_pass: Option<String>,
}

/// Result of asking to start a question
#[derive(Debug)]
pub enum Admission {
    /// The question may be answered; record it with the ticket afterwards
    Granted(QuestionTicket),
    /// A limit binds or the caller's state is unknown
    Denied(QuestionDecision),
}

/// Permission to count exactly one answered question.
///
/// `record` takes the ticket by value, so it cannot be counted twice.
#[derive(Debug)]
pub struct QuestionTicket {
    decision: QuestionDecision,
    subject: Subject,
    _lock: Option<UserLock>,
}

impl QuestionTicket {
    /// Decision the ticket was granted under
    pub fn decision(&self) -> &QuestionDecision {
        &self.decision
    }
}

#[derive(Debug)]
enum Subject {
    Guest(GuestPass),
    Member(UserId),
}

/// Counters after a recorded question
#[derive(Debug, Clone)]
pub enum Recorded {
    /// Updated pass the client must store in place of the old one
    Guest { pass: String, used: u32 },
    /// Stored member counters
    Member { counters: UsageCounters },
}

/// Held for the lifetime of a member's ticket. The map entry is removed once
/// no other request is holding or waiting for it.
struct UserLock {
    locks: Arc<LockMap>,
    user_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for UserLock {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.user_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl std::fmt::Debug for UserLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserLock")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

/// Entitlement checks and question counting
#[derive(Clone)]
pub struct QuotaService {
    users: Arc<dyn UserRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    guest_passes: GuestPassSigner,
    config: QuotaConfig,
    locks: Arc<LockMap>,
}

impl QuotaService {
    /// Create a quota service.
    ///
    /// # Errors
    /// Returns `Configuration` if the guest pass secret is too short.
    pub fn new(repos: &SharedRepositories, config: QuotaConfig) -> Result<Self, QuotaError> {
        let guest_passes = GuestPassSigner::new(&config.guest_pass_secret)?;
        Ok(Self {
            users: Arc::clone(&repos.users),
            subscriptions: Arc::clone(&repos.subscriptions),
            guest_passes,
            config,
            locks: Arc::new(DashMap::new()),
        })
    }

    /// Service configuration
    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }

    /// Current decision without reserving anything
    pub async fn status(&self, identity: &Identity) -> QuotaStatus {
        self.status_at(identity, Utc::now()).await
    }

    /// [`QuotaService::status`] at a fixed instant
    #[instrument(skip_all, fields(identity = identity.kind()))]
    pub async fn status_at(&self, identity: &Identity, now: DateTime<Utc>) -> QuotaStatus {
        let mut guest_pass = None;
        let snapshot = match identity {
            Identity::Guest { pass: None } => {
                let fresh = GuestPass::fresh(now);
                match self.guest_passes.sign(&fresh) {
                    Ok(signed) => {
                        guest_pass = Some(signed);
                        EntitlementSnapshot::Guest { used: fresh.used }
                    }
                    Err(_) => EntitlementSnapshot::Indeterminate,
                }
            }
            Identity::Guest { pass: Some(token) } => self.guest_snapshot(token).0,
            Identity::Member(user_id) => self.member_snapshot(*user_id, now).await,
        };

        QuotaStatus {
            decision: resolve(&snapshot, &self.config.limits, now, self.config.utc_offset),
            guest_pass,
        }
    }

    /// Check entitlement before answering a question
    pub async fn acquire(&self, identity: &Identity) -> Admission {
        self.acquire_at(identity, Utc::now()).await
    }

    /// [`QuotaService::acquire`] at a fixed instant
    #[instrument(skip_all, fields(identity = identity.kind()))]
    pub async fn acquire_at(&self, identity: &Identity, now: DateTime<Utc>) -> Admission {
        let (snapshot, subject, lock) = match identity {
            Identity::Guest { pass } => {
                let (snapshot, pass) = match pass {
                    Some(token) => self.guest_snapshot(token),
                    None => {
                        let fresh = GuestPass::fresh(now);
                        (EntitlementSnapshot::Guest { used: 0 }, Some(fresh))
                    }
                };
                (snapshot, pass.map(Subject::Guest), None)
            }
            Identity::Member(user_id) => {
                let lock = self.lock_user(user_id.0).await;
                let snapshot = self.member_snapshot(*user_id, now).await;
                (snapshot, Some(Subject::Member(*user_id)), Some(lock))
            }
        };

        let decision = resolve(&snapshot, &self.config.limits, now, self.config.utc_offset);
        match subject {
            Some(subject) if decision.allowed => Admission::Granted(QuestionTicket {
                decision,
                subject,
                _lock: lock,
            }),
            _ => {
                let limit = decision.limit_kind.map_or("indeterminate", |k| k.as_str());
                tracing::debug!(limit, "Question blocked");
                metrics::counter!("questions_blocked_total", "limit" => limit).increment(1);
                Admission::Denied(decision)
            }
        }
    }

    /// Count an answered question
    pub async fn record(&self, ticket: QuestionTicket) -> Result<Recorded, QuotaError> {
        self.record_at(ticket, Utc::now()).await
    }

    /// [`QuotaService::record`] at a fixed instant
    #[instrument(skip_all)]
    pub async fn record_at(
        &self,
        ticket: QuestionTicket,
        now: DateTime<Utc>,
    ) -> Result<Recorded, QuotaError> {
        let recorded = match &ticket.subject {
            Subject::Guest(pass) => {
                let next = pass.incremented(now);
                let signed = self.guest_passes.sign(&next)?;
                Recorded::Guest {
                    pass: signed,
                    used: next.used,
                }
            }
            Subject::Member(user_id) => {
                let windows = WindowStarts::at(now, self.config.utc_offset);
                let row = self
                    .users
                    .record_question(user_id.0, windows, now)
                    .await
                    .map_err(|e| match e {
                        DbError::NotFound => QuotaError::UserNotFound,
                        other => QuotaError::Database(other),
                    })?;
                Recorded::Member {
                    counters: row.counters(),
                }
            }
        };

        let identity = match ticket.subject {
            Subject::Guest(_) => "guest",
            Subject::Member(_) => "member",
        };
        metrics::counter!("questions_answered_total", "identity" => identity).increment(1);
        Ok(recorded)
    }

    fn guest_snapshot(&self, token: &str) -> (EntitlementSnapshot, Option<GuestPass>) {
        match self.guest_passes.verify(token) {
            Ok(pass) => (EntitlementSnapshot::Guest { used: pass.used }, Some(pass)),
            Err(_) => (EntitlementSnapshot::Indeterminate, None),
        }
    }

    async fn member_snapshot(&self, user_id: UserId, now: DateTime<Utc>) -> EntitlementSnapshot {
        let user = match self.users.find_by_id(user_id.0).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::debug!(%user_id, "No profile for user");
                return EntitlementSnapshot::Indeterminate;
            }
            Err(e) => {
                tracing::warn!(%user_id, error = %e, "Failed to load profile");
                return EntitlementSnapshot::Indeterminate;
            }
        };

        let subscribed = match self.subscriptions.find_active_by_user_id(user_id.0).await {
            Ok(subs) => subs.iter().any(|s| s.end_date > now),
            Err(e) => {
                tracing::warn!(%user_id, error = %e, "Failed to load subscriptions");
                return EntitlementSnapshot::Indeterminate;
            }
        };

        EntitlementSnapshot::Member {
            counters: user.counters(),
            subscribed,
        }
    }

    async fn lock_user(&self, user_id: Uuid) -> UserLock {
        let lock = Arc::clone(self.locks.entry(user_id).or_default().value());
        let guard = lock.lock_owned().await;
        UserLock {
            locks: Arc::clone(&self.locks),
            user_id,
            guard: Some(guard),
        }
    }
}

impl std::fmt::Debug for QuotaService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaService")
            .field("config", &self.config.limits)
            .finish_non_exhaustive()
    }
}

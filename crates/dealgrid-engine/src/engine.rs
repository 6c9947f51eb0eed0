//! Claim coordinator — fast-path reservation, durable commit, compensation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, warn};

use dealgrid_cache::{ReservationCache, ReserveOutcome};
use dealgrid_ledger::{
    Claim, CommitOutcome, Ledger, LedgerError, RedeemOutcome, RedeemRejection, RejectReason,
};

use crate::voucher::generate_voucher_code;

/// Pluggable voucher-code generator (deal id → code).
pub type CodeGenerator = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// How a claim attempt failed.
#[derive(Debug, Error)]
pub enum ClaimError {
    /// Business-rule rejection with its specific reason. Never retried
    /// automatically.
    #[error("claim rejected: {0}")]
    Rejected(RejectReason),

    /// Infrastructure or invariant failure. The fast-path reservation,
    /// if one was made, has been compensated.
    #[error("claim failed: {0}")]
    System(String),
}

/// How a redemption attempt failed.
#[derive(Debug, Error)]
pub enum RedeemError {
    #[error("redemption rejected: {0}")]
    Rejected(RedeemRejection),

    #[error("redemption failed: {0}")]
    System(String),
}

/// Why a single durable-commit run did not produce an outcome.
enum CommitFailure {
    DuplicateCode,
    Timeout,
    Other(String),
}

/// The claim engine.
///
/// Owns no connections itself: the ledger and reservation cache handles
/// are injected at construction (lifecycle belongs to the composition
/// root).
#[derive(Clone)]
pub struct ClaimEngine {
    ledger: Ledger,
    reservations: Arc<ReservationCache>,
    generate_code: CodeGenerator,
    commit_timeout: Duration,
}

impl ClaimEngine {
    /// Create an engine with the default code generator and a 5 s
    /// durable-commit timeout.
    pub fn new(ledger: Ledger, reservations: Arc<ReservationCache>) -> Self {
        Self {
            ledger,
            reservations,
            generate_code: Arc::new(|deal_id: &str| generate_voucher_code(deal_id)),
            commit_timeout: Duration::from_secs(5),
        }
    }

    /// Override the durable-commit timeout.
    pub fn with_commit_timeout(mut self, timeout: Duration) -> Self {
        self.commit_timeout = timeout;
        self
    }

    /// Override the voucher-code generator.
    pub fn with_code_generator(mut self, generator: CodeGenerator) -> Self {
        self.generate_code = generator;
        self
    }

    /// Attempt to claim one voucher of `deal_id` for `user_id`.
    ///
    /// Drives the attempt to a terminal state: either the claim is
    /// durably committed, or the fast-path reservation (if one was made)
    /// is released. Rejections carry their reason and are final for this
    /// attempt.
    pub async fn claim(&self, deal_id: &str, user_id: &str) -> Result<Claim, ClaimError> {
        let now = Utc::now();
        match self
            .reservations
            .try_reserve(deal_id, user_id, now)
            .await
            .map_err(|e| ClaimError::System(e.to_string()))?
        {
            ReserveOutcome::Reserved => {}
            // No reservation was made; nothing to compensate.
            ReserveOutcome::AlreadyReserved => {
                return Err(ClaimError::Rejected(RejectReason::AlreadyClaimed));
            }
            ReserveOutcome::SoldOut => {
                return Err(ClaimError::Rejected(RejectReason::SoldOut));
            }
            ReserveOutcome::Expired => {
                return Err(ClaimError::Rejected(RejectReason::Expired));
            }
            ReserveOutcome::NotFound => {
                return Err(ClaimError::Rejected(RejectReason::NotFound));
            }
        }

        // FAST_RESERVED. From here every error path must release the
        // reservation; success "releases" it by converting it into a
        // durable claim. The sequence runs on its own task so it reaches
        // a terminal state even when the caller abandons the request.
        let engine = self.clone();
        let deal = deal_id.to_string();
        let user = user_id.to_string();
        let attempt = tokio::spawn(async move {
            let result = engine.commit_reserved(&deal, &user).await;
            if result.is_err() {
                engine.reservations.release(&deal, &user).await;
                debug!(deal_id = %deal, user_id = %user, "reservation compensated");
            }
            result
        });
        match attempt.await {
            Ok(result) => result,
            Err(join) => Err(ClaimError::System(join.to_string())),
        }
    }

    /// Run the durable commit for an already-reserved attempt, retrying
    /// exactly once on a voucher-code collision.
    async fn commit_reserved(&self, deal_id: &str, user_id: &str) -> Result<Claim, ClaimError> {
        let mut attempt = self.run_commit(deal_id, user_id).await;
        if matches!(attempt, Err(CommitFailure::DuplicateCode)) {
            warn!(deal_id, user_id, "voucher code collision, retrying with a fresh code");
            attempt = self.run_commit(deal_id, user_id).await;
        }
        match attempt {
            Ok(CommitOutcome::Committed(claim)) => Ok(claim),
            Ok(CommitOutcome::Rejected(reason)) => Err(ClaimError::Rejected(reason)),
            Err(CommitFailure::DuplicateCode) => Err(ClaimError::System(
                "voucher code collision persisted across retry".to_string(),
            )),
            Err(CommitFailure::Timeout) => Err(ClaimError::System(format!(
                "durable commit timed out after {:?}",
                self.commit_timeout
            ))),
            Err(CommitFailure::Other(msg)) => Err(ClaimError::System(msg)),
        }
    }

    /// One durable-commit run with a freshly generated code, on a
    /// blocking task under the configured timeout.
    async fn run_commit(
        &self,
        deal_id: &str,
        user_id: &str,
    ) -> Result<CommitOutcome, CommitFailure> {
        let code = (self.generate_code)(deal_id);
        let ledger = self.ledger.clone();
        let deal = deal_id.to_string();
        let user = user_id.to_string();
        let now = Utc::now();

        let task =
            tokio::task::spawn_blocking(move || ledger.commit_claim(&deal, &user, &code, now));
        match tokio::time::timeout(self.commit_timeout, task).await {
            Err(_) => Err(CommitFailure::Timeout),
            Ok(Err(join)) => Err(CommitFailure::Other(join.to_string())),
            Ok(Ok(Ok(outcome))) => Ok(outcome),
            Ok(Ok(Err(LedgerError::DuplicateVoucherCode(_)))) => Err(CommitFailure::DuplicateCode),
            Ok(Ok(Err(e))) => Err(CommitFailure::Other(e.to_string())),
        }
    }

    /// Redeem a claim by voucher code (active → redeemed, with lazy
    /// expiry applied).
    pub async fn redeem(&self, voucher_code: &str) -> Result<Claim, RedeemError> {
        let now = Utc::now();
        match self
            .ledger
            .redeem_claim(voucher_code, now)
            .map_err(|e| RedeemError::System(e.to_string()))?
        {
            RedeemOutcome::Redeemed(claim) => Ok(claim),
            RedeemOutcome::Rejected(rejection) => Err(RedeemError::Rejected(rejection)),
        }
    }
}

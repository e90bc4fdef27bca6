use crate::{
    Error,
    Result,
    codec::{
        CallSet,
        EventCodec,
        PurchaseEvent,
    },
    ledger::{
        ChestLedger,
        PrizeRecord,
    },
};
use ethers::types::{
    TransactionReceipt,
    TxHash,
    U64,
};
use std::time::Duration;
use tokio::time::Instant;

/// Wait after a purchase confirms before a claim is accepted.
pub const CLAIM_GRACE: Duration = Duration::from_secs(15);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Purchase { quantity: u32 },
    // chests targeted by the claim, in ledger order
    Claim { chests: Vec<u64> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settlement {
    pub tx_hash: TxHash,
    pub action: Action,
    pub purchased: Vec<u64>,
    pub duplicates: Vec<u64>,
    pub prizes: Vec<PrizeRecord>,
    pub decode_failures: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Submitting { action: Action },
    Confirming { action: Action, tx_hash: TxHash },
    Settled { settlement: Settlement },
    Failed { action: Action, cause: String },
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Submitting { .. } => "submitting",
            Phase::Confirming { .. } => "confirming",
            Phase::Settled { .. } => "settled",
            Phase::Failed { .. } => "failed",
        }
    }

    pub fn in_flight(&self) -> bool {
        matches!(self, Phase::Submitting { .. } | Phase::Confirming { .. })
    }

    fn in_flight_action(&self) -> Option<&Action> {
        match self {
            Phase::Submitting { action } | Phase::Confirming { action, .. } => {
                Some(action)
            }
            _ => None,
        }
    }
}

/// Notifications reported by the transaction layer for the in-flight action.
#[derive(Clone, Debug)]
pub enum LifecycleNotification {
    Pending,
    Accepted { tx_hash: TxHash },
    Success(TransactionReceipt),
    Error(String),
}

impl LifecycleNotification {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleNotification::Pending => "pending",
            LifecycleNotification::Accepted { .. } => "accepted",
            LifecycleNotification::Success(_) => "success",
            LifecycleNotification::Error(_) => "error",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClaimGate {
    Closed,
    Pending { opens_at: Instant },
    Open,
}

impl ClaimGate {
    pub fn is_open_at(&self, now: Instant) -> bool {
        match self {
            ClaimGate::Closed => false,
            ClaimGate::Pending { opens_at } => now >= *opens_at,
            ClaimGate::Open => true,
        }
    }
}

/// Purchase/claim state machine for one player session.
///
/// At most one transaction is in flight: new actions are accepted from `Idle`,
/// `Settled` or `Failed` only. Notifications are applied to the in-flight action;
/// anything else is rejected without touching the ledger.
#[derive(Clone, Debug)]
pub struct Session {
    codec: EventCodec,
    ledger: ChestLedger,
    phase: Phase,
    claim_gate: ClaimGate,
    grace: Duration,
    epoch: u64,
}

impl Session {
    pub fn new(codec: EventCodec, grace: Duration) -> Self {
        Self {
            codec,
            ledger: ChestLedger::new(),
            phase: Phase::Idle,
            claim_gate: ClaimGate::Closed,
            grace,
            epoch: 0,
        }
    }

    pub fn codec(&self) -> &EventCodec {
        &self.codec
    }

    pub fn ledger(&self) -> &ChestLedger {
        &self.ledger
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn claim_gate(&self) -> ClaimGate {
        self.claim_gate
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Incremented on every reset so callbacks scheduled for an earlier session can be
    /// told apart.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn in_flight(&self) -> bool {
        self.phase.in_flight()
    }

    pub fn can_claim_at(&self, now: Instant) -> bool {
        !self.in_flight()
            && self.ledger.unclaimed().next().is_some()
            && self.claim_gate.is_open_at(now)
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.phase.in_flight() {
            return Err(Error::ActionInProgress {
                phase: self.phase.name(),
            });
        }
        Ok(())
    }

    pub fn submit_purchase(&mut self, quantity: u32) -> Result<CallSet> {
        self.ensure_ready()?;
        let call = self.codec.encode_purchase(quantity)?;
        tracing::info!(quantity, "submitting chest purchase");
        self.phase = Phase::Submitting {
            action: Action::Purchase { quantity },
        };
        Ok(vec![call])
    }

    /// Returns an empty call set, and stays put, when nothing is left to claim.
    pub fn submit_claim(&mut self, now: Instant) -> Result<CallSet> {
        self.ensure_ready()?;
        let calls = self.codec.encode_claim(self.ledger.chests());
        if calls.is_empty() {
            tracing::debug!("no unclaimed chests; nothing to submit");
            return Ok(calls);
        }
        if !self.claim_gate.is_open_at(now) {
            return Err(Error::NotYetClaimable);
        }
        let chests: Vec<u64> = self.ledger.unclaimed().map(|chest| chest.index).collect();
        tracing::info!(?chests, "submitting claim");
        self.phase = Phase::Submitting {
            action: Action::Claim { chests },
        };
        Ok(calls)
    }

    pub fn on_notification(
        &mut self,
        notification: LifecycleNotification,
        now: Instant,
    ) -> Result<Option<Settlement>> {
        let Some(action) = self.phase.in_flight_action().cloned() else {
            return Err(Error::UnexpectedNotification {
                notification: notification.name(),
                phase: self.phase.name(),
            });
        };
        match notification {
            LifecycleNotification::Pending => Ok(None),
            LifecycleNotification::Accepted { tx_hash } => {
                tracing::info!(?tx_hash, "transaction accepted; awaiting confirmation");
                self.phase = Phase::Confirming { action, tx_hash };
                Ok(None)
            }
            LifecycleNotification::Success(receipt) => {
                if receipt.status == Some(U64::zero()) {
                    let cause = format!("transaction {:?} reverted", receipt.transaction_hash);
                    return self.fail(action, cause);
                }
                let settlement = self.settle(action, &receipt, now);
                self.phase = Phase::Settled {
                    settlement: settlement.clone(),
                };
                Ok(Some(settlement))
            }
            LifecycleNotification::Error(cause) => self.fail(action, cause),
        }
    }

    fn fail(&mut self, action: Action, cause: String) -> Result<Option<Settlement>> {
        tracing::warn!(%cause, ?action, "transaction failed");
        self.phase = Phase::Failed {
            action,
            cause: cause.clone(),
        };
        Err(Error::TransactionFailed(cause))
    }

    fn settle(
        &mut self,
        action: Action,
        receipt: &TransactionReceipt,
        now: Instant,
    ) -> Settlement {
        let decoded = self.codec.decode_logs(&receipt.logs);

        // purchases first: prize resolution needs the whole batch
        let purchases: Vec<&PurchaseEvent> = decoded.purchases().collect();
        let recorded = self.ledger.record_purchases(purchases.iter().copied());
        let batch: Vec<u64> = match (&action, purchases.is_empty()) {
            (Action::Claim { chests }, true) => chests.clone(),
            _ => purchases.iter().map(|event| event.chest_index).collect(),
        };

        let mut prizes = Vec::new();
        for (position, (log_position, prize)) in decoded.prizes().enumerate() {
            let source_tx = receipt
                .logs
                .get(log_position)
                .and_then(|log| log.transaction_hash)
                .unwrap_or(receipt.transaction_hash);
            let record = self.ledger.record_prize(prize, source_tx, &batch, position);
            prizes.push(record.clone());
        }

        if !purchases.is_empty() {
            let opens_at = now.checked_add(self.grace).unwrap_or_else(|| {
                tracing::warn!(grace = ?self.grace, "claim grace out of range, using default");
                now + CLAIM_GRACE
            });
            self.claim_gate = ClaimGate::Pending { opens_at };
        }
        if !prizes.is_empty() && self.ledger.all_claimed() {
            self.claim_gate = ClaimGate::Closed;
        }

        tracing::info!(
            tx_hash = ?receipt.transaction_hash,
            purchased = recorded.recorded.len(),
            prizes = prizes.len(),
            decode_failures = decoded.failures.len(),
            total_claimed = %self.ledger.total_claimed(),
            "transaction settled"
        );
        Settlement {
            tx_hash: receipt.transaction_hash,
            action,
            purchased: recorded.recorded,
            duplicates: recorded.duplicates,
            prizes,
            decode_failures: decoded.failures.len(),
        }
    }

    /// Grace timer callback. Ignored when it belongs to an earlier session.
    pub fn open_claim_gate(&mut self, epoch: u64, now: Instant) -> bool {
        if epoch != self.epoch {
            tracing::debug!(epoch, current = self.epoch, "ignoring stale grace timer");
            return false;
        }
        match self.claim_gate {
            ClaimGate::Pending { opens_at } if now >= opens_at => {
                tracing::info!("claim window open");
                self.claim_gate = ClaimGate::Open;
                true
            }
            _ => false,
        }
    }

    pub fn reset_session(&mut self) -> Result<()> {
        if !matches!(self.phase, Phase::Settled { .. }) {
            return Err(Error::InvalidTransition {
                action: "reset session",
                phase: self.phase.name(),
            });
        }
        self.ledger.reset();
        self.claim_gate = ClaimGate::Closed;
        self.epoch += 1;
        self.phase = Phase::Idle;
        tracing::info!(epoch = self.epoch, "session reset");
        Ok(())
    }
}

use crate::{
    Error,
    Result,
    codec::{
        PrizeEvent,
        PurchaseEvent,
    },
};
use ethers::types::{
    TxHash,
    U256,
};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Chest {
    pub index: u64,
    pub purchase_block: u64,
    pub special: bool,
    claimed: bool,
}

impl Chest {
    pub fn new(index: u64, purchase_block: u64, special: bool) -> Self {
        Self {
            index,
            purchase_block,
            special,
            claimed: false,
        }
    }

    pub fn claimed(&self) -> bool {
        self.claimed
    }

    // one-way; nothing ever clears it
    pub(crate) fn mark_claimed(&mut self) {
        self.claimed = true;
    }
}

impl From<&PurchaseEvent> for Chest {
    fn from(event: &PurchaseEvent) -> Self {
        Chest::new(event.chest_index, event.block_number, event.special)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PrizeRecord {
    pub amount: U256,
    pub is_special: bool,
    pub source_tx: TxHash,
    pub chest_index: Option<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordedPurchases {
    pub recorded: Vec<u64>,
    pub duplicates: Vec<u64>,
}

/// Chests and prizes of the current session.
#[derive(Clone, Debug, Default)]
pub struct ChestLedger {
    chests: Vec<Chest>,
    prizes: Vec<PrizeRecord>,
    total_claimed: U256,
}

impl ChestLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chests(&self) -> &[Chest] {
        &self.chests
    }

    pub fn prizes(&self) -> &[PrizeRecord] {
        &self.prizes
    }

    pub fn chest(&self, index: u64) -> Option<&Chest> {
        self.chests.iter().find(|chest| chest.index == index)
    }

    pub fn unclaimed(&self) -> impl Iterator<Item = &Chest> {
        self.chests.iter().filter(|chest| !chest.claimed)
    }

    pub fn prize_for(&self, index: u64) -> Option<&PrizeRecord> {
        self.prizes
            .iter()
            .find(|prize| prize.chest_index == Some(index))
    }

    pub fn total_claimed(&self) -> U256 {
        self.total_claimed
    }

    pub fn is_empty(&self) -> bool {
        self.chests.is_empty()
    }

    pub fn all_claimed(&self) -> bool {
        !self.chests.is_empty() && self.chests.iter().all(|chest| chest.claimed)
    }

    pub fn record_purchase(&mut self, event: &PurchaseEvent) -> Result<()> {
        if self.chest(event.chest_index).is_some() {
            return Err(Error::DuplicateIndex(event.chest_index));
        }
        self.chests.push(Chest::from(event));
        Ok(())
    }

    /// Appends chests in event order. Duplicates are logged and skipped.
    pub fn record_purchases<'a>(
        &mut self,
        events: impl IntoIterator<Item = &'a PurchaseEvent>,
    ) -> RecordedPurchases {
        let mut outcome = RecordedPurchases::default();
        for event in events {
            match self.record_purchase(event) {
                Ok(()) => outcome.recorded.push(event.chest_index),
                Err(err) => {
                    tracing::warn!(%err, "skipping purchase event");
                    outcome.duplicates.push(event.chest_index);
                }
            }
        }
        outcome
    }

    /// Records a prize against `batch[position]`, the chest whose purchase came at the
    /// same position in the batch. The record stays unresolved when that slot is out of
    /// bounds, unknown, or already claimed.
    pub fn record_prize(
        &mut self,
        event: &PrizeEvent,
        source_tx: TxHash,
        batch: &[u64],
        position: usize,
    ) -> &PrizeRecord {
        let target = batch.get(position).copied();
        let chest_index = target.and_then(|index| {
            let chest = self.chests.iter_mut().find(|chest| chest.index == index)?;
            if chest.claimed {
                tracing::warn!(index, "prize matched an already claimed chest");
                return None;
            }
            chest.mark_claimed();
            Some(index)
        });
        if chest_index.is_none() {
            tracing::warn!(
                position,
                batch_len = batch.len(),
                "prize could not be matched to a chest"
            );
        }
        self.total_claimed = self.total_claimed.saturating_add(event.amount);
        let slot = self.prizes.len();
        self.prizes.push(PrizeRecord {
            amount: event.amount,
            is_special: event.special,
            source_tx,
            chest_index,
        });
        &self.prizes[slot]
    }

    pub fn reset(&mut self) {
        self.chests.clear();
        self.prizes.clear();
        self.total_claimed = U256::zero();
    }
}

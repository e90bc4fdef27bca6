use crate::{
    Error,
    Result,
    chest_types::{
        BuyChestCall,
        BuyMultipleChestsCall,
        ChestPurchasedFilter,
        ClaimAllPrizesCall,
        ClaimPrizeCall,
        PrizeAwardedFilter,
    },
    ledger::Chest,
};
use ethers::{
    abi::{
        AbiEncode,
        RawLog,
    },
    contract::EthEvent,
    types::{
        Address,
        Bytes,
        H256,
        Log,
        U256,
    },
};
use itertools::{
    Either,
    Itertools,
};
use serde::{
    Deserialize,
    Serialize,
};

/// Upper bound the contract accepts for a single purchase.
pub const MAX_QUANTITY: u32 = 10;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallPayload {
    pub to: Address,
    pub data: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
}

pub type CallSet = Vec<CallPayload>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PurchaseEvent {
    pub player: Address,
    pub block_number: u64,
    pub special: bool,
    pub chest_index: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PrizeEvent {
    pub player: Address,
    pub amount: U256,
    pub special: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum DomainEvent {
    Purchase(PurchaseEvent),
    Prize(PrizeEvent),
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeFailure {
    #[error("log carries no topics")]
    MissingTopic,
    #[error("unknown event signature 0x{}", hex::encode(.0))]
    UnknownSignature(H256),
    #[error("log emitted by {found:?}, expected {expected:?}")]
    ForeignSource { expected: Address, found: Address },
    #[error("malformed {event} payload: {reason}")]
    Malformed { event: &'static str, reason: String },
    #[error("{field} does not fit in 64 bits: {value}")]
    OutOfRange { field: &'static str, value: U256 },
}

/// Logs of one receipt split into what decoded and what did not, each tagged with
/// its position in the receipt.
#[derive(Clone, Debug, Default)]
pub struct DecodedLogs {
    pub events: Vec<(usize, DomainEvent)>,
    pub failures: Vec<(usize, DecodeFailure)>,
}

impl DecodedLogs {
    pub fn purchases(&self) -> impl Iterator<Item = &PurchaseEvent> {
        self.events.iter().filter_map(|(_, event)| match event {
            DomainEvent::Purchase(purchase) => Some(purchase),
            DomainEvent::Prize(_) => None,
        })
    }

    pub fn prizes(&self) -> impl Iterator<Item = (usize, &PrizeEvent)> {
        self.events.iter().filter_map(|(position, event)| match event {
            DomainEvent::Prize(prize) => Some((*position, prize)),
            DomainEvent::Purchase(_) => None,
        })
    }
}

#[derive(Clone, Debug)]
pub struct EventCodec {
    contract: Address,
    unit_price: U256,
}

impl EventCodec {
    pub fn new(contract: Address, unit_price: U256) -> Self {
        Self {
            contract,
            unit_price,
        }
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    pub fn unit_price(&self) -> U256 {
        self.unit_price
    }

    pub fn encode_purchase(&self, quantity: u32) -> Result<CallPayload> {
        if !(1..=MAX_QUANTITY).contains(&quantity) {
            return Err(Error::InvalidQuantity(quantity));
        }
        let data = if quantity == 1 {
            BuyChestCall::default().encode()
        } else {
            BuyMultipleChestsCall {
                quantity: U256::from(quantity),
            }
            .encode()
        };
        Ok(CallPayload {
            to: self.contract,
            data: data.into(),
            value: Some(self.unit_price.saturating_mul(U256::from(quantity))),
        })
    }

    /// Claims every unclaimed chest in one call: `claimPrize` when a single chest is
    /// left, `claimAllPrizes` otherwise.
    pub fn encode_claim<'a>(&self, chests: impl IntoIterator<Item = &'a Chest>) -> CallSet {
        let unclaimed: Vec<u64> = chests
            .into_iter()
            .filter(|c| !c.claimed())
            .map(|c| c.index)
            .collect();
        self.encode_claim_indices(&unclaimed)
    }

    /// Claim call for chests known only by index; they are assumed unclaimed.
    pub fn encode_claim_indices(&self, indices: &[u64]) -> CallSet {
        let data = match indices {
            [] => return Vec::new(),
            [index] => ClaimPrizeCall {
                chest_index: U256::from(*index),
            }
            .encode(),
            _ => ClaimAllPrizesCall::default().encode(),
        };
        vec![self.call(data)]
    }

    pub(crate) fn call(&self, data: Vec<u8>) -> CallPayload {
        CallPayload {
            to: self.contract,
            data: data.into(),
            value: None,
        }
    }

    pub fn decode_log(&self, log: &Log) -> Result<DomainEvent, DecodeFailure> {
        if log.address != self.contract {
            return Err(DecodeFailure::ForeignSource {
                expected: self.contract,
                found: log.address,
            });
        }
        let signature = *log.topics.first().ok_or(DecodeFailure::MissingTopic)?;
        let raw = RawLog {
            topics: log.topics.clone(),
            data: log.data.to_vec(),
        };
        if signature == ChestPurchasedFilter::signature() {
            let event = ChestPurchasedFilter::decode_log(&raw).map_err(|e| {
                DecodeFailure::Malformed {
                    event: "ChestPurchased",
                    reason: e.to_string(),
                }
            })?;
            Ok(DomainEvent::Purchase(PurchaseEvent {
                player: event.player,
                block_number: narrow("blockNumber", event.block_number)?,
                special: event.special,
                chest_index: narrow("chestIndex", event.chest_index)?,
            }))
        } else if signature == PrizeAwardedFilter::signature() {
            let event = PrizeAwardedFilter::decode_log(&raw).map_err(|e| {
                DecodeFailure::Malformed {
                    event: "PrizeAwarded",
                    reason: e.to_string(),
                }
            })?;
            Ok(DomainEvent::Prize(PrizeEvent {
                player: event.player,
                amount: event.prize,
                special: event.special,
            }))
        } else {
            Err(DecodeFailure::UnknownSignature(signature))
        }
    }

    /// Decodes every log independently; a failure never stops the remaining logs.
    pub fn decode_logs(&self, logs: &[Log]) -> DecodedLogs {
        let (events, failures) =
            logs.iter()
                .enumerate()
                .partition_map(|(position, log)| match self.decode_log(log) {
                    Ok(event) => Either::Left((position, event)),
                    Err(failure) => {
                        tracing::warn!(position, %failure, "skipping undecodable log");
                        Either::Right((position, failure))
                    }
                });
        DecodedLogs { events, failures }
    }
}

fn narrow(field: &'static str, value: U256) -> Result<u64, DecodeFailure> {
    if value > U256::from(u64::MAX) {
        return Err(DecodeFailure::OutOfRange { field, value });
    }
    Ok(value.as_u64())
}

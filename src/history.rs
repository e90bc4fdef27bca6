use crate::{
    codec::{
        DomainEvent,
        EventCodec,
    },
    format_prize,
    projection::{
        PrizeTier,
        prize_tier,
    },
};
use chrono::{
    DateTime,
    Utc,
};
use ethers::types::{
    Address,
    Log,
    TxHash,
    U256,
};
use serde::{
    Deserialize,
    Serialize,
};

/// A log as returned by an explorer query, with the timestamp of its block.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoricalLog {
    pub log: Log,
    /// Unix seconds.
    pub timestamp: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WinningRecord {
    pub tx_hash: Option<TxHash>,
    pub player: Address,
    pub prize: U256,
    pub display: String,
    pub tier: PrizeTier,
    pub is_special: bool,
    pub timestamp: DateTime<Utc>,
}

/// Every prize paid out by the contract, newest first. Purchases are ignored and
/// anything that does not decode is logged and dropped.
pub fn winning_history(codec: &EventCodec, logs: &[HistoricalLog]) -> Vec<WinningRecord> {
    let mut records: Vec<WinningRecord> = logs
        .iter()
        .filter_map(|historical| {
            let prize = match codec.decode_log(&historical.log) {
                Ok(DomainEvent::Prize(prize)) => prize,
                Ok(DomainEvent::Purchase(_)) => return None,
                Err(failure) => {
                    tracing::warn!(
                        tx_hash = ?historical.log.transaction_hash,
                        %failure,
                        "skipping historical log"
                    );
                    return None;
                }
            };
            let Some(timestamp) = DateTime::from_timestamp(historical.timestamp, 0) else {
                tracing::warn!(timestamp = historical.timestamp, "skipping log with invalid timestamp");
                return None;
            };
            Some(WinningRecord {
                tx_hash: historical.log.transaction_hash,
                player: prize.player,
                prize: prize.amount,
                display: format_prize(prize.amount),
                tier: prize_tier(prize.amount),
                is_special: prize.special,
                timestamp,
            })
        })
        .collect();
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    records
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::test_helpers::*;
    use ethers::utils::parse_ether;

    fn at(log: Log, timestamp: i64) -> HistoricalLog {
        HistoricalLog { log, timestamp }
    }

    #[test]
    fn winning_history__sorts_newest_first_and_skips_purchases() {
        // given
        let codec = test_codec();
        let logs = vec![
            at(prize_log(player_address(), parse_ether("0.008").unwrap(), false), 1_700_000_000),
            at(purchase_log(player_address(), 10, false, 1), 1_700_000_100),
            at(prize_log(player_address(), parse_ether("0.1").unwrap(), true), 1_700_000_200),
        ];

        // when
        let records = winning_history(&codec, &logs);

        // then
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].prize, parse_ether("0.1").unwrap());
        assert!(records[0].is_special);
        assert_eq!(records[0].tier, PrizeTier::Jackpot);
        assert_eq!(records[1].display, "0.0080");
        assert_eq!(records[1].timestamp.timestamp(), 1_700_000_000);
    }

    #[test]
    fn winning_history__undecodable_logs__are_dropped() {
        // given
        let codec = test_codec();
        let logs = vec![
            at(unknown_log(), 1),
            at(prize_log(player_address(), U256::from(1), false), 2),
        ];

        // when
        let records = winning_history(&codec, &logs);

        // then
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].prize, U256::from(1));
    }
}

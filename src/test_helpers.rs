//! Log and receipt fixtures shared by unit and integration tests.

use crate::{
    chest_types::{
        ChestPurchasedFilter,
        PrizeAwardedFilter,
    },
    codec::{
        EventCodec,
        PrizeEvent,
        PurchaseEvent,
    },
    ledger::Chest,
    lifecycle::Session,
};
use ethers::{
    abi::{
        Token,
        encode,
    },
    contract::EthEvent,
    types::{
        Address,
        H256,
        Log,
        TransactionReceipt,
        TxHash,
        U64,
        U256,
    },
    utils::parse_ether,
};
use std::time::Duration;

pub const TEST_CHEST_PRICE: &str = "0.001";
pub const TEST_GRACE: Duration = Duration::from_secs(15);

pub fn contract_address() -> Address {
    Address::repeat_byte(0xc0)
}

pub fn player_address() -> Address {
    Address::repeat_byte(0x0a)
}

pub fn tx_hash(seed: u8) -> TxHash {
    H256::repeat_byte(seed)
}

pub fn test_codec() -> EventCodec {
    let price = parse_ether(TEST_CHEST_PRICE).unwrap_or_default();
    EventCodec::new(contract_address(), price)
}

pub fn test_session() -> Session {
    Session::new(test_codec(), TEST_GRACE)
}

pub fn chest(index: u64, purchase_block: u64) -> Chest {
    Chest::new(index, purchase_block, false)
}

pub fn purchase_event(chest_index: u64, block_number: u64) -> PurchaseEvent {
    PurchaseEvent {
        player: player_address(),
        block_number,
        special: false,
        chest_index,
    }
}

pub fn prize_event(amount: U256, special: bool) -> PrizeEvent {
    PrizeEvent {
        player: player_address(),
        amount,
        special,
    }
}

pub fn purchase_log(player: Address, block_number: u64, special: bool, index: u64) -> Log {
    purchase_log_raw(player, U256::from(block_number), special, U256::from(index))
}

pub fn purchase_log_raw(
    player: Address,
    block_number: U256,
    special: bool,
    index: U256,
) -> Log {
    let data = encode(&[
        Token::Uint(block_number),
        Token::Bool(special),
        Token::Uint(index),
    ]);
    contract_log(
        vec![ChestPurchasedFilter::signature(), H256::from(player)],
        data,
    )
}

pub fn prize_log(player: Address, amount: U256, special: bool) -> Log {
    let data = encode(&[Token::Uint(amount), Token::Bool(special)]);
    contract_log(
        vec![PrizeAwardedFilter::signature(), H256::from(player)],
        data,
    )
}

/// A log from the game contract whose first topic matches no known event.
pub fn unknown_log() -> Log {
    contract_log(vec![H256::repeat_byte(0xee)], vec![0u8; 32])
}

pub fn contract_log(topics: Vec<H256>, data: Vec<u8>) -> Log {
    Log {
        address: contract_address(),
        topics,
        data: data.into(),
        ..Default::default()
    }
}

pub fn receipt(hash: TxHash, logs: Vec<Log>) -> TransactionReceipt {
    let logs = logs
        .into_iter()
        .enumerate()
        .map(|(position, log)| Log {
            transaction_hash: Some(hash),
            log_index: Some(U256::from(position)),
            ..log
        })
        .collect();
    TransactionReceipt {
        transaction_hash: hash,
        status: Some(U64::from(1)),
        logs,
        ..Default::default()
    }
}

pub fn reverted_receipt(hash: TxHash) -> TransactionReceipt {
    TransactionReceipt {
        status: Some(U64::zero()),
        ..receipt(hash, Vec::new())
    }
}

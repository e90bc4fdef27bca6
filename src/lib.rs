use ethers::types::U256;

pub mod admin;
pub mod app;
pub mod chain;
pub mod codec;
pub mod config;
pub mod deadline;
pub mod history;
pub mod ledger;
pub mod lifecycle;
pub mod projection;

pub mod test_helpers;

pub mod chest_types {
    use ethers::contract::abigen;

    abigen!(
        ChestGame,
        r#"[
            function buyChest() external payable
            function buyMultipleChests(uint256 quantity) external payable
            function claimPrize(uint256 chestIndex) external
            function claimAllPrizes() external
            function withdraw(uint256 amount) external
            function withdrawAll() external
            event ChestPurchased(address indexed player, uint256 blockNumber, bool special, uint256 chestIndex)
            event PrizeAwarded(address indexed player, uint256 prize, bool special)
        ]"#
    );
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("failed to decode log: {0}")]
    Decode(#[from] codec::DecodeFailure),
    #[error("chest #{0} is already recorded in this session")]
    DuplicateIndex(u64),
    #[error("invalid chest quantity {0}; expected 1..={max}", max = codec::MAX_QUANTITY)]
    InvalidQuantity(u32),
    #[error("another transaction is in flight ({phase})")]
    ActionInProgress { phase: &'static str },
    #[error("chests are not claimable yet")]
    NotYetClaimable,
    #[error("transaction failed: {0}")]
    TransactionFailed(String),
    #[error("chain height unavailable: {0}")]
    HeightUnavailable(String),
    #[error("unexpected {notification} notification while {phase}")]
    UnexpectedNotification {
        notification: &'static str,
        phase: &'static str,
    },
    #[error("cannot {action} while {phase}")]
    InvalidTransition {
        action: &'static str,
        phase: &'static str,
    },
    #[error("caller {0:?} is not authorized for this action")]
    Unauthorized(ethers::types::Address),
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Formats a wei amount as ether with four decimals, the way prizes are shown.
pub fn format_prize(amount: U256) -> String {
    let ether = ethers::utils::format_ether(amount);
    match ether.split_once('.') {
        Some((whole, fraction)) => {
            let digits: String = fraction.chars().chain("0000".chars()).take(4).collect();
            format!("{whole}.{digits}")
        }
        None => format!("{ether}.0000"),
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use ethers::utils::parse_ether;

    #[test]
    fn format_prize__truncates_to_four_decimals() {
        // given
        let amount = parse_ether("0.104").unwrap();

        // when
        let actual = format_prize(amount);

        // then
        assert_eq!(actual, "0.1040");
    }

    #[test]
    fn format_prize__whole_ether_keeps_padding() {
        let actual = format_prize(parse_ether("2").unwrap());
        assert_eq!(actual, "2.0000");
    }
}

use crate::{
    Error,
    Result,
    admin::Owner,
    codec::EventCodec,
    deadline::{
        CLAIM_WINDOW_BLOCKS,
        ClaimWindow,
        DEFAULT_SECONDS_PER_BLOCK,
    },
    lifecycle::CLAIM_GRACE,
};
use ethers::{
    types::{
        Address,
        U256,
    },
    utils::parse_ether,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fs,
    path::PathBuf,
    time::Duration,
};

pub const DEFAULT_CHEST_PRICE: &str = "0.001";
pub const DEFAULT_HEIGHT_POLL: Duration = Duration::from_secs(2);
pub const DEFAULT_PRICE_POLL: Duration = Duration::from_secs(60);
/// Longest accepted wait between a purchase and its claim.
pub const MAX_CLAIM_GRACE: Duration = Duration::from_secs(60 * 60);

/// On-disk configuration. Every field is optional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub contract: Option<Address>,
    pub chest_price_eth: Option<String>,
    pub max_claim_blocks: Option<u64>,
    pub seconds_per_block: Option<u64>,
    pub claim_grace_secs: Option<u64>,
    pub height_poll_secs: Option<u64>,
    pub price_poll_secs: Option<u64>,
    pub owner: Option<Address>,
}

impl ConfigFile {
    pub fn read(path: &str) -> Result<Self> {
        let path = PathBuf::from(shellexpand::tilde(path).into_owned());
        let raw = fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("parsing {}: {e}", path.display())))
    }

    /// Claim window settings on their own; no contract address is needed.
    pub fn claim_window(&self) -> Result<ClaimWindow> {
        let window = ClaimWindow {
            max_blocks: self.max_claim_blocks.unwrap_or(CLAIM_WINDOW_BLOCKS),
            seconds_per_block: self.seconds_per_block.unwrap_or(DEFAULT_SECONDS_PER_BLOCK),
        };
        if window.max_blocks == 0 {
            return Err(Error::Config("max_claim_blocks must be positive".to_string()));
        }
        if window.seconds_per_block == 0 {
            return Err(Error::Config("seconds_per_block must be positive".to_string()));
        }
        Ok(window)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameConfig {
    pub contract: Address,
    pub chest_price: U256,
    pub max_claim_blocks: u64,
    pub seconds_per_block: u64,
    pub claim_grace: Duration,
    pub height_poll: Duration,
    pub price_poll: Duration,
    pub owner: Option<Address>,
}

impl GameConfig {
    /// Reads `path` when given, then applies `contract` over whatever the file says.
    pub fn load(path: Option<&str>, contract: Option<Address>) -> Result<Self> {
        let mut file = match path {
            Some(path) => ConfigFile::read(path)?,
            None => ConfigFile::default(),
        };
        if contract.is_some() {
            file.contract = contract;
        }
        Self::try_from(file)
    }

    pub fn codec(&self) -> EventCodec {
        EventCodec::new(self.contract, self.chest_price)
    }

    pub fn owner(&self) -> Option<Owner> {
        self.owner.map(Owner)
    }

    pub fn claim_window(&self) -> ClaimWindow {
        ClaimWindow {
            max_blocks: self.max_claim_blocks,
            seconds_per_block: self.seconds_per_block,
        }
    }
}

impl TryFrom<ConfigFile> for GameConfig {
    type Error = Error;

    fn try_from(file: ConfigFile) -> Result<Self> {
        let contract = file
            .contract
            .ok_or_else(|| Error::Config("no contract address configured".to_string()))?;
        let price = file
            .chest_price_eth
            .as_deref()
            .unwrap_or(DEFAULT_CHEST_PRICE);
        let chest_price = parse_ether(price)
            .map_err(|e| Error::Config(format!("chest price {price:?}: {e}")))?;
        let window = file.claim_window()?;
        let config = Self {
            contract,
            chest_price,
            max_claim_blocks: window.max_blocks,
            seconds_per_block: window.seconds_per_block,
            claim_grace: file
                .claim_grace_secs
                .map(Duration::from_secs)
                .unwrap_or(CLAIM_GRACE),
            height_poll: file
                .height_poll_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_HEIGHT_POLL),
            price_poll: file
                .price_poll_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_PRICE_POLL),
            owner: file.owner,
        };
        config.validate()?;
        Ok(config)
    }
}

impl GameConfig {
    fn validate(&self) -> Result<()> {
        if self.claim_grace > MAX_CLAIM_GRACE {
            return Err(Error::Config(format!(
                "claim_grace_secs must be at most {}",
                MAX_CLAIM_GRACE.as_secs()
            )));
        }
        // tokio intervals panic on a zero period
        if self.height_poll.is_zero() || self.price_poll.is_zero() {
            return Err(Error::Config("poll intervals must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::test_helpers::contract_address;

    #[test]
    fn try_from__minimal_file__applies_defaults() {
        // given
        let file = ConfigFile {
            contract: Some(contract_address()),
            ..Default::default()
        };

        // when
        let config = GameConfig::try_from(file).unwrap();

        // then
        assert_eq!(config.chest_price, parse_ether("0.001").unwrap());
        assert_eq!(config.max_claim_blocks, 256);
        assert_eq!(config.seconds_per_block, 2);
        assert_eq!(config.claim_grace, Duration::from_secs(15));
        assert_eq!(config.height_poll, Duration::from_secs(2));
        assert_eq!(config.price_poll, Duration::from_secs(60));
        assert_eq!(config.owner, None);
        assert_eq!(config.claim_window(), ClaimWindow::default());
    }

    #[test]
    fn try_from__missing_contract__is_rejected() {
        let result = GameConfig::try_from(ConfigFile::default());

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn try_from__zero_poll_interval__is_rejected() {
        let file = ConfigFile {
            contract: Some(contract_address()),
            height_poll_secs: Some(0),
            ..Default::default()
        };

        assert!(matches!(GameConfig::try_from(file), Err(Error::Config(_))));
    }

    #[test]
    fn try_from__oversized_claim_grace__is_rejected() {
        // given
        let file = ConfigFile {
            contract: Some(contract_address()),
            claim_grace_secs: Some(u64::MAX),
            ..Default::default()
        };

        // when
        let result = GameConfig::try_from(file);

        // then
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn try_from__longest_claim_grace__is_accepted() {
        let file = ConfigFile {
            contract: Some(contract_address()),
            claim_grace_secs: Some(MAX_CLAIM_GRACE.as_secs()),
            ..Default::default()
        };

        let config = GameConfig::try_from(file).unwrap();

        assert_eq!(config.claim_grace, MAX_CLAIM_GRACE);
    }

    #[test]
    fn claim_window__without_contract__uses_file_values() {
        // given
        let file = ConfigFile {
            max_claim_blocks: Some(128),
            seconds_per_block: Some(12),
            ..Default::default()
        };

        // when
        let window = file.claim_window().unwrap();

        // then
        assert_eq!(
            window,
            ClaimWindow {
                max_blocks: 128,
                seconds_per_block: 12,
            }
        );
        assert_eq!(ConfigFile::default().claim_window().unwrap(), ClaimWindow::default());
    }

    #[test]
    fn config_file__parses_json() {
        // given
        let raw = r#"{
            "contract": "0xc0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0",
            "chest_price_eth": "0.002",
            "claim_grace_secs": 30
        }"#;

        // when
        let file: ConfigFile = serde_json::from_str(raw).unwrap();
        let config = GameConfig::try_from(file).unwrap();

        // then
        assert_eq!(config.contract, contract_address());
        assert_eq!(config.chest_price, parse_ether("0.002").unwrap());
        assert_eq!(config.claim_grace, Duration::from_secs(30));
    }

    #[test]
    fn load__override_replaces_file_contract() {
        let other = Address::repeat_byte(0x42);

        let config = GameConfig::load(None, Some(other)).unwrap();

        assert_eq!(config.contract, other);
    }
}

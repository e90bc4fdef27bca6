//! Read-only view of a session, recomputed on demand.

use crate::{
    codec::MAX_QUANTITY,
    deadline::{
        self,
        ClaimWindow,
        Deadline,
        Urgency,
    },
    format_prize,
    ledger::{
        Chest,
        PrizeRecord,
    },
    lifecycle::{
        Phase,
        Session,
    },
};
use ethers::{
    types::{
        TxHash,
        U256,
    },
    utils::WEI_IN_ETHER,
};
use serde::Serialize;
use tokio::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum PrizeTier {
    Consolation,
    Small,
    Medium,
    Large,
    Jackpot,
}

// lower bounds in thousandths of an ether, highest tier first
const TIER_FLOORS: [(u64, PrizeTier); 4] = [
    (100, PrizeTier::Jackpot),
    (40, PrizeTier::Large),
    (15, PrizeTier::Medium),
    (8, PrizeTier::Small),
];

pub fn prize_tier(amount: U256) -> PrizeTier {
    let milli_ether = WEI_IN_ETHER / U256::from(1_000);
    TIER_FLOORS
        .iter()
        .find(|(floor, _)| amount >= milli_ether * U256::from(*floor))
        .map(|(_, tier)| *tier)
        .unwrap_or(PrizeTier::Consolation)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ChestStatus {
    /// The countdown is unknown until the first height sample arrives.
    UnclaimedActive {
        blocks_left: Option<u64>,
        estimated_secs: Option<u64>,
        urgency: Option<Urgency>,
    },
    UnclaimedExpired,
    Claimed,
}

pub fn chest_status(
    chest: &Chest,
    current_height: Option<u64>,
    window: ClaimWindow,
) -> ChestStatus {
    if chest.claimed() {
        return ChestStatus::Claimed;
    }
    let Some(height) = current_height else {
        return ChestStatus::UnclaimedActive {
            blocks_left: None,
            estimated_secs: None,
            urgency: None,
        };
    };
    match deadline::remaining(chest, height, window.max_blocks) {
        Deadline::Active { blocks_left } => ChestStatus::UnclaimedActive {
            blocks_left: Some(blocks_left),
            estimated_secs: Some(
                deadline::estimated_seconds(blocks_left, window.seconds_per_block).as_secs(),
            ),
            urgency: Some(deadline::urgency(blocks_left)),
        },
        Deadline::Expired => ChestStatus::UnclaimedExpired,
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PrizeView {
    pub amount: U256,
    pub display: String,
    pub tier: PrizeTier,
    pub is_special: bool,
    pub source_tx: TxHash,
    /// `None` when the prize could not be tied to a chest.
    pub chest_index: Option<u64>,
}

impl From<&PrizeRecord> for PrizeView {
    fn from(record: &PrizeRecord) -> Self {
        Self {
            amount: record.amount,
            display: format_prize(record.amount),
            tier: prize_tier(record.amount),
            is_special: record.is_special,
            source_tx: record.source_tx,
            chest_index: record.chest_index,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChestView {
    pub index: u64,
    pub purchase_block: u64,
    pub special: bool,
    pub status: ChestStatus,
    pub prize: Option<PrizeView>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionView {
    pub phase: &'static str,
    pub in_flight: bool,
    pub chests: Vec<ChestView>,
    /// Every prize in award order, including those tied to no chest.
    pub prizes: Vec<PrizeView>,
    pub total_claimed: U256,
    pub total_display: String,
    pub all_claimed: bool,
    pub can_claim: bool,
    pub can_purchase: bool,
    pub can_reset: bool,
    pub current_height: Option<u64>,
    pub usd_price: Option<f64>,
}

pub fn project(
    session: &Session,
    current_height: Option<u64>,
    now: Instant,
    window: ClaimWindow,
) -> SessionView {
    let ledger = session.ledger();
    let chests: Vec<ChestView> = ledger
        .chests()
        .iter()
        .map(|chest| ChestView {
            index: chest.index,
            purchase_block: chest.purchase_block,
            special: chest.special,
            status: chest_status(chest, current_height, window),
            prize: ledger.prize_for(chest.index).map(PrizeView::from),
        })
        .collect();
    let prizes = ledger.prizes().iter().map(PrizeView::from).collect();
    let in_flight = session.in_flight();
    let all_claimed = ledger.all_claimed();
    // expired chests can no longer be claimed on chain
    let any_claimable = chests
        .iter()
        .any(|chest| matches!(chest.status, ChestStatus::UnclaimedActive { .. }));
    SessionView {
        phase: session.phase().name(),
        in_flight,
        chests,
        prizes,
        total_claimed: ledger.total_claimed(),
        total_display: format_prize(ledger.total_claimed()),
        all_claimed,
        can_claim: any_claimable && session.can_claim_at(now),
        can_purchase: !in_flight,
        can_reset: all_claimed && matches!(session.phase(), Phase::Settled { .. }),
        current_height,
        usd_price: None,
    }
}

pub fn clamp_quantity(requested: i64) -> u32 {
    requested.clamp(1, i64::from(MAX_QUANTITY)) as u32
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        lifecycle::LifecycleNotification,
        test_helpers::*,
    };
    use ethers::utils::parse_ether;

    fn ether(value: &str) -> U256 {
        parse_ether(value).unwrap()
    }

    #[test]
    fn prize_tier__classifies_by_floor() {
        assert_eq!(prize_tier(ether("0.1")), PrizeTier::Jackpot);
        assert_eq!(prize_tier(ether("0.05")), PrizeTier::Large);
        assert_eq!(prize_tier(ether("0.02")), PrizeTier::Medium);
        assert_eq!(prize_tier(ether("0.009")), PrizeTier::Small);
        assert_eq!(prize_tier(ether("0.003")), PrizeTier::Consolation);
    }

    #[test]
    fn prize_tier__exact_floor_belongs_to_the_higher_tier() {
        assert_eq!(prize_tier(ether("0.04")), PrizeTier::Large);
        assert_eq!(prize_tier(ether("0.015")), PrizeTier::Medium);
        assert_eq!(prize_tier(ether("0.008")), PrizeTier::Small);
        assert_eq!(prize_tier(ether("0.04") - U256::one()), PrizeTier::Medium);
    }

    #[test]
    fn chest_status__claimed_wins_over_expiry() {
        // given
        let mut chest = chest(1, 10);
        chest.mark_claimed();

        // when
        let status = chest_status(&chest, Some(10_000), ClaimWindow::default());

        // then
        assert_eq!(status, ChestStatus::Claimed);
    }

    #[test]
    fn chest_status__unknown_height__is_active_without_countdown() {
        let status = chest_status(&chest(1, 10), None, ClaimWindow::default());

        assert_eq!(
            status,
            ChestStatus::UnclaimedActive {
                blocks_left: None,
                estimated_secs: None,
                urgency: None,
            }
        );
    }

    #[test]
    fn chest_status__past_window__is_expired() {
        assert_eq!(
            chest_status(&chest(1, 10), Some(266), ClaimWindow::default()),
            ChestStatus::UnclaimedExpired
        );
        assert_eq!(
            chest_status(&chest(1, 10), Some(226), ClaimWindow::default()),
            ChestStatus::UnclaimedActive {
                blocks_left: Some(40),
                estimated_secs: Some(80),
                urgency: Some(Urgency::Critical),
            }
        );
    }

    #[test]
    fn chest_status__estimate_follows_configured_block_time() {
        // given
        let window = ClaimWindow {
            max_blocks: 256,
            seconds_per_block: 12,
        };

        // when
        let status = chest_status(&chest(1, 1_000), Some(1_100), window);

        // then
        assert_eq!(
            status,
            ChestStatus::UnclaimedActive {
                blocks_left: Some(156),
                estimated_secs: Some(1_872),
                urgency: Some(Urgency::Relaxed),
            }
        );
    }

    #[test]
    fn project__fresh_session__allows_purchase_only() {
        // given
        let session = test_session();

        // when
        let view = project(&session, None, Instant::now(), ClaimWindow::default());

        // then
        assert_eq!(view.phase, "idle");
        assert!(view.can_purchase);
        assert!(!view.can_claim);
        assert!(!view.can_reset);
        assert!(view.chests.is_empty());
        assert_eq!(view.total_display, "0.0000");
    }

    #[test]
    fn project__in_flight__blocks_every_action() {
        // given
        let mut session = test_session();
        session.submit_purchase(1).unwrap();

        // when
        let view = project(&session, Some(100), Instant::now(), ClaimWindow::default());

        // then
        assert!(view.in_flight);
        assert!(!view.can_purchase);
        assert!(!view.can_claim);
    }

    #[test]
    fn project__fully_claimed_session__offers_reset_and_totals() {
        // given
        let now = Instant::now();
        let mut session = test_session();
        session.submit_purchase(2).unwrap();
        let purchases = vec![
            purchase_log(player_address(), 100, false, 10),
            purchase_log(player_address(), 100, false, 11),
        ];
        session
            .on_notification(
                LifecycleNotification::Success(receipt(tx_hash(1), purchases)),
                now,
            )
            .unwrap();
        let later = now + TEST_GRACE;
        session.submit_claim(later).unwrap();
        let prizes = vec![
            prize_log(player_address(), ether("0.004"), false),
            prize_log(player_address(), ether("0.1"), true),
        ];
        session
            .on_notification(
                LifecycleNotification::Success(receipt(tx_hash(2), prizes)),
                later,
            )
            .unwrap();

        // when
        let view = project(&session, Some(150), later, ClaimWindow::default());

        // then
        assert!(view.all_claimed);
        assert!(view.can_reset);
        assert!(!view.can_claim);
        assert_eq!(view.total_display, "0.1040");
        let tiers: Vec<_> = view
            .chests
            .iter()
            .map(|chest| chest.prize.as_ref().map(|prize| prize.tier))
            .collect();
        assert_eq!(
            tiers,
            vec![Some(PrizeTier::Consolation), Some(PrizeTier::Jackpot)]
        );
    }

    #[test]
    fn project__only_expired_chests_left__cannot_claim() {
        // given
        let now = Instant::now();
        let mut session = test_session();
        session.submit_purchase(1).unwrap();
        session
            .on_notification(
                LifecycleNotification::Success(receipt(
                    tx_hash(1),
                    vec![purchase_log(player_address(), 100, false, 3)],
                )),
                now,
            )
            .unwrap();
        let later = now + TEST_GRACE;

        // when
        let expired = project(&session, Some(1_000), later, ClaimWindow::default());
        let active = project(&session, Some(300), later, ClaimWindow::default());

        // then
        assert_eq!(expired.chests[0].status, ChestStatus::UnclaimedExpired);
        assert!(!expired.can_claim);
        assert!(active.can_claim);
    }

    #[test]
    fn project__prize_without_chest__is_listed_and_counted() {
        // given
        let now = Instant::now();
        let mut session = test_session();
        session.submit_purchase(1).unwrap();
        session
            .on_notification(
                LifecycleNotification::Success(receipt(
                    tx_hash(1),
                    vec![purchase_log(player_address(), 100, false, 3)],
                )),
                now,
            )
            .unwrap();
        let later = now + TEST_GRACE;
        session.submit_claim(later).unwrap();
        let prizes = vec![
            prize_log(player_address(), ether("0.01"), false),
            prize_log(player_address(), ether("0.02"), false),
        ];
        session
            .on_notification(
                LifecycleNotification::Success(receipt(tx_hash(2), prizes)),
                later,
            )
            .unwrap();

        // when
        let view = project(&session, Some(150), later, ClaimWindow::default());

        // then
        let listed: Vec<_> = view
            .prizes
            .iter()
            .map(|prize| (prize.display.as_str(), prize.chest_index))
            .collect();
        assert_eq!(listed, vec![("0.0100", Some(3)), ("0.0200", None)]);
        let sum = view
            .prizes
            .iter()
            .fold(U256::zero(), |sum, prize| sum + prize.amount);
        assert_eq!(sum, view.total_claimed);
        assert_eq!(view.total_display, "0.0300");
        assert!(view.prizes.iter().all(|prize| prize.source_tx == tx_hash(2)));
    }

    #[test]
    fn clamp_quantity__keeps_requests_in_range() {
        assert_eq!(clamp_quantity(-3), 1);
        assert_eq!(clamp_quantity(0), 1);
        assert_eq!(clamp_quantity(7), 7);
        assert_eq!(clamp_quantity(42), 10);
    }
}

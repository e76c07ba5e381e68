mod common;

use ethers::types::{Address, U256};

use common::Harness;
use vault_rebalancer::chain::{ManualClock, PremiumSupplyController, SimulatedPool, VaultHost};
use vault_rebalancer::engine::model::vault_info;
use vault_rebalancer::engine::{update_protocol_parameters, AccessPolicy, GuardConfig, Rebalancer};
use vault_rebalancer::math::tick_math::sqrt_ratio_at_tick;
use vault_rebalancer::models::{PositionKind, ProtocolParameters, VaultEvent};
use vault_rebalancer::EngineError;

#[test]
fn outsiders_get_no_capability() {
    let policy = common::policy();
    let stranger = Address::from([0x99; 20]);
    assert_eq!(policy.authorize_rebalance(stranger), Err(EngineError::Unauthorized(stranger)));
    assert!(policy.authorize_manager(common::addresses().deployer).is_err());
}

#[test]
fn capability_for_another_vault_is_refused() {
    let mut h = Harness::new();
    h.move_price_to(240);
    let other = AccessPolicy {
        vault: Address::from([0xaa; 20]),
        deployer: common::addresses().deployer,
        manager: Address::from([0x88; 20]),
    };
    let foreign = other.authorize_rebalance(common::addresses().deployer).expect("cap");

    let err = h
        .rebalancer
        .shift(&foreign, &h.addresses, &mut h.pool, &mut h.host, &PremiumSupplyController::default(), &h.clock)
        .unwrap_err();
    assert_eq!(err, EngineError::Unauthorized(common::addresses().deployer));
}

#[test]
fn mismatched_pool_is_refused() {
    let mut h = Harness::new();
    let mut stray = SimulatedPool::new(
        Address::from([0xbb; 20]),
        3_000,
        60,
        sqrt_ratio_at_tick(0).expect("tick 0"),
        common::T0,
    )
    .expect("pool");

    let err = h
        .rebalancer
        .slide(&h.cap, &h.addresses, &mut stray, &mut h.host, &h.clock)
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::AddressMismatch {
            expected: h.addresses.pool,
            actual: Address::from([0xbb; 20]),
        }
    );
}

#[test]
fn undeployed_vault_cannot_rebalance() {
    let a = common::addresses();
    let cap = common::policy().authorize_rebalance(a.vault).expect("vault may rebalance");
    let mut pool = SimulatedPool::new(a.pool, 3_000, 60, sqrt_ratio_at_tick(0).expect("tick 0"), common::T0)
        .expect("pool");
    let mut host = vault_rebalancer::chain::InMemoryVault::new(a.vault, common::team(), 60, common::T0);
    let clock = ManualClock::at(common::T0);
    let mut rebalancer = Rebalancer::new(GuardConfig::default());

    let err = rebalancer
        .shift(&cap, &a, &mut pool, &mut host, &PremiumSupplyController::default(), &clock)
        .unwrap_err();
    assert_eq!(err, EngineError::OnlyNotEmptyPositions);
}

#[test]
fn manager_retunes_thresholds() {
    let mut h = Harness::new();
    let manager = common::policy().authorize_manager(Address::from([0x88; 20])).expect("manager");
    let loose = ProtocolParameters {
        shift_ratio: common::wad_fraction(95, 100),
        ..ProtocolParameters::default()
    };
    update_protocol_parameters(&manager, &mut h.host, loose.clone()).expect("update");
    assert_eq!(h.host.protocol_parameters(), loose);
    assert_eq!(h.host.events().last(), Some(&VaultEvent::ParametersUpdated));

    // a ratio of ~0.903 now triggers a shift without any price move
    h.advance(600);
    h.rebalancer
        .shift(&h.cap, &h.addresses, &mut h.pool, &mut h.host, &PremiumSupplyController::default(), &h.clock)
        .expect("shift under looser threshold");

    let broken = ProtocolParameters {
        slide_ratio: U256::exp10(17),
        ..ProtocolParameters::default()
    };
    assert!(matches!(
        update_protocol_parameters(&manager, &mut h.host, broken),
        Err(EngineError::InvalidParameters(_))
    ));
}

#[test]
fn vault_info_snapshot_after_deployment() {
    let h = Harness::new();
    let info = vault_info(&h.pool, &h.host, h.host.address()).expect("info");
    let kinds: Vec<PositionKind> = info.ranges.iter().map(|r| r.kind).collect();
    assert_eq!(kinds, PositionKind::ALL.to_vec());
    assert_eq!(info.total_supply, common::tokens(1_000_000));
    assert!(info.imv_display.is_some());
    println!("spot {:?} imv {:?} ratio {}", info.spot_price_display, info.imv_display, info.liquidity_ratio);
}

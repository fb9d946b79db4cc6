#![cfg(test)]
//! End-to-end pending-transaction lifecycle: threshold enforcement, the
//! delay boundary, execute-once, cancellation finality, and threshold
//! snapshotting across group re-registration.

use super::*;
use crate::test::{queue, register_group, setup, MockGroupClient};
use soroban_sdk::testutils::{Address as _, Ledger};
use soroban_sdk::{Bytes, Env};

fn advance_time(e: &Env, secs: u64) {
    e.ledger().set(soroban_sdk::testutils::LedgerInfo {
        timestamp: e.ledger().timestamp() + secs,
        protocol_version: 22,
        sequence_number: e.ledger().sequence() + 1,
        network_id: [0; 32],
        base_reserve: 10,
        min_temp_entry_ttl: 16,
        min_persistent_entry_ttl: 16,
        max_entry_ttl: 1_000_000,
    });
}

#[test]
fn test_two_of_three_with_one_hour_delay() {
    let e = Env::default();
    e.mock_all_auths();
    let f = setup(&e);
    register_group(&e, &f, 2, 3600);
    let tx_hash = queue(&e, &f);

    f.client.confirm_transaction(&f.members[0], &tx_hash);
    f.client.confirm_transaction(&f.members[1], &tx_hash);

    // Threshold met, delay not yet passed.
    assert!(!f.client.can_execute(&tx_hash));
    let res = f.client.try_execute_transaction(&tx_hash);
    assert_eq!(res, Err(Ok(Error::DelayNotPassed)));

    // One second before the boundary still fails; exactly at it succeeds.
    advance_time(&e, 3599);
    let res = f.client.try_execute_transaction(&tx_hash);
    assert_eq!(res, Err(Ok(Error::DelayNotPassed)));

    advance_time(&e, 1);
    assert!(f.client.can_execute(&tx_hash));
    assert!(f.client.execute_transaction(&tx_hash));
    assert_eq!(f.group.call_count(), 1);
    assert!(f.client.get_transaction(&tx_hash).executed);

    // Execute-once: the second attempt fails and the wallet is not
    // called again.
    let res = f.client.try_execute_transaction(&tx_hash);
    assert_eq!(res, Err(Ok(Error::AlreadyExecuted)));
    assert_eq!(f.group.call_count(), 1);
}

#[test]
fn test_threshold_enforced_exactly() {
    let e = Env::default();
    e.mock_all_auths();
    let f = setup(&e);
    register_group(&e, &f, 3, 0);
    let tx_hash = queue(&e, &f);

    for (confirmed, member) in f.members.iter().enumerate() {
        let res = f.client.try_execute_transaction(&tx_hash);
        assert_eq!(res, Err(Ok(Error::NotEnoughConfirmations)));
        assert_eq!(
            f.client.confirm_transaction(member, &tx_hash),
            confirmed as u32 + 1
        );
    }
    // Eligible the instant the Nth confirmation lands.
    assert!(f.client.execute_transaction(&tx_hash));
}

#[test]
fn test_execution_open_to_anyone() {
    let e = Env::default();
    e.mock_all_auths();
    let f = setup(&e);
    register_group(&e, &f, 1, 0);
    let tx_hash = queue(&e, &f);
    f.client.confirm_transaction(&f.members[0], &tx_hash);

    // No auth is consumed by execute_transaction; the call is gated only
    // by the transaction's own state machine.
    e.set_auths(&[]);
    assert!(f.client.execute_transaction(&tx_hash));
}

#[test]
fn test_cancellation_is_final() {
    let e = Env::default();
    e.mock_all_auths();
    let f = setup(&e);
    register_group(&e, &f, 2, 3600);
    let tx_hash = queue(&e, &f);

    f.client.confirm_transaction(&f.members[0], &tx_hash);
    f.client.confirm_transaction(&f.members[1], &tx_hash);
    // Cancel after confirmations, before execution.
    f.client.cancel_transaction(&f.members[2], &tx_hash);

    advance_time(&e, 3600);
    // Cancelled takes precedence over every other gate from here on.
    let res = f.client.try_execute_transaction(&tx_hash);
    assert_eq!(res, Err(Ok(Error::TransactionCancelled)));
    let res = f.client.try_confirm_transaction(&f.members[2], &tx_hash);
    assert_eq!(res, Err(Ok(Error::TransactionCancelled)));
    let res = f.client.try_cancel_transaction(&f.members[0], &tx_hash);
    assert_eq!(res, Err(Ok(Error::TransactionCancelled)));
    assert!(!f.client.can_execute(&tx_hash));
    assert_eq!(f.group.call_count(), 0);
}

#[test]
fn test_cannot_cancel_after_execution() {
    let e = Env::default();
    e.mock_all_auths();
    let f = setup(&e);
    register_group(&e, &f, 1, 0);
    let tx_hash = queue(&e, &f);
    f.client.confirm_transaction(&f.members[0], &tx_hash);
    f.client.execute_transaction(&tx_hash);

    let res = f.client.try_cancel_transaction(&f.members[0], &tx_hash);
    assert_eq!(res, Err(Ok(Error::AlreadyExecuted)));
}

#[test]
fn test_threshold_snapshot_survives_reregistration() {
    let e = Env::default();
    e.mock_all_auths();
    let f = setup(&e);
    register_group(&e, &f, 2, 0);
    let tx_hash = queue(&e, &f);

    // Tighten the group to 3-of-3 while the transaction is in flight.
    register_group(&e, &f, 3, 0);
    assert_eq!(f.client.get_group(&f.group_id).threshold, 3);

    // The in-flight transaction keeps its queue-time requirement of 2.
    f.client.confirm_transaction(&f.members[0], &tx_hash);
    f.client.confirm_transaction(&f.members[1], &tx_hash);
    assert_eq!(f.client.get_transaction(&tx_hash).confirmations_required, 2);
    assert!(f.client.execute_transaction(&tx_hash));
}

#[test]
fn test_failed_inner_call_still_closes_transaction() {
    let e = Env::default();
    e.mock_all_auths();
    let f = setup(&e);
    register_group(&e, &f, 1, 0);
    let tx_hash = queue(&e, &f);
    f.client.confirm_transaction(&f.members[0], &tx_hash);

    // The wallet traps; execution reports failure but the transaction is
    // marked executed and can never be re-triggered.
    f.group.set_panic_on_call(&true);
    assert!(!f.client.execute_transaction(&tx_hash));
    assert!(f.client.get_transaction(&tx_hash).executed);

    f.group.set_panic_on_call(&false);
    let res = f.client.try_execute_transaction(&tx_hash);
    assert_eq!(res, Err(Ok(Error::AlreadyExecuted)));
    assert_eq!(f.group.call_count(), 0);
}

#[test]
fn test_unsuccessful_wallet_result_is_reported() {
    let e = Env::default();
    e.mock_all_auths();
    let f = setup(&e);
    register_group(&e, &f, 1, 0);
    let tx_hash = queue(&e, &f);
    f.client.confirm_transaction(&f.members[0], &tx_hash);

    f.group.set_call_result(&false);
    assert!(!f.client.execute_transaction(&tx_hash));
    assert!(f.client.get_transaction(&tx_hash).executed);
}

// ---------------------------------------------------------------------------
// Reentrancy: a wallet whose execute_arbitrary_call re-enters the engine.
// ---------------------------------------------------------------------------
mod reentrant_group {
    use super::*;
    use soroban_sdk::{contract, contractimpl, contracttype};

    #[contracttype]
    #[derive(Clone)]
    pub enum Key {
        Engine,
        TxHash,
    }

    #[contract]
    pub struct ReentrantGroup;

    #[contractimpl]
    impl ReentrantGroup {
        pub fn arm(e: Env, engine: Address, tx_hash: BytesN<32>) {
            e.storage().instance().set(&Key::Engine, &engine);
            e.storage().instance().set(&Key::TxHash, &tx_hash);
        }

        pub fn is_member(_e: Env, _account: Address) -> bool {
            true
        }

        pub fn execute_arbitrary_call(e: Env, _to: Address, _value: i128, _data: Bytes) -> bool {
            let engine: Address = e.storage().instance().get(&Key::Engine).unwrap();
            let tx_hash: BytesN<32> = e.storage().instance().get(&Key::TxHash).unwrap();
            // Re-entering must fail: the transaction is already marked
            // executed and the lock is held.
            let client = AuthorizationEngineClient::new(&e, &engine);
            client.execute_transaction(&tx_hash);
            true
        }
    }
}

#[test]
fn test_reentrant_execution_cannot_double_fire() {
    let e = Env::default();
    e.mock_all_auths();

    let admin = Address::generate(&e);
    let router = Address::generate(&e);
    let engine_id = e.register(AuthorizationEngine, ());
    let client = AuthorizationEngineClient::new(&e, &engine_id);
    client.initialize(&admin, &router);

    let group_id = e.register(reentrant_group::ReentrantGroup, ());
    let member = Address::generate(&e);
    let members = soroban_sdk::vec![&e, member.clone()];
    client.register_authorization_group(&member, &group_id, &1, &members, &0);

    let tx_hash = client.queue_transaction(
        &router,
        &group_id,
        &Address::generate(&e),
        &50,
        &Bytes::new(&e),
    );
    client.confirm_transaction(&member, &tx_hash);
    reentrant_group::ReentrantGroupClient::new(&e, &group_id).arm(&engine_id, &tx_hash);

    // The inner re-entry traps (the lock is held and the transaction is
    // already marked executed), so the engine reports a failed inner call
    // and closes the transaction exactly once.
    assert!(!client.execute_transaction(&tx_hash));
    assert!(client.get_transaction(&tx_hash).executed);
    let res = client.try_execute_transaction(&tx_hash);
    assert_eq!(res, Err(Ok(Error::AlreadyExecuted)));
}

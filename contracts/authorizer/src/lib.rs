#![no_std]

//! # Strata Authorization Engine
//!
//! Queue-confirm-delay-execute state machine over external multi-party
//! wallets. Per pending transaction:
//!
//! `(none) -> QUEUED -> [CONFIRMING]* -> READY -> EXECUTED`, with
//! `CANCELLED` absorbing from any state before `EXECUTED`.
//!
//! The required confirmation count is snapshotted at queue time; a later
//! re-registration of the group never changes it for transactions already
//! in flight. Execution marks the transaction executed *before* the
//! external call, so a reentrant or failing inner call can never make it
//! re-triggerable.

use soroban_sdk::{
    contract, contracterror, contractimpl, contracttype, xdr::ToXdr, Address, Bytes, BytesN, Env,
    Symbol, Vec,
};
use strata_capabilities::AuthorizationGroupClient;

pub const MIN_DELAY: u64 = 3_600;
pub const MAX_DELAY: u64 = 604_800;

#[contracterror]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    AlreadyInitialized = 1,
    NotInitialized = 2,
    NotGroupMember = 3,
    NoMembers = 4,
    InvalidThreshold = 5,
    InvalidDelay = 6,
    GroupNotRegistered = 7,
    NotRouter = 8,
    TxNotFound = 9,
    NotSigner = 10,
    AlreadyConfirmed = 11,
    AlreadyExecuted = 12,
    TransactionCancelled = 13,
    NotEnoughConfirmations = 14,
    DelayNotPassed = 15,
    ReentrancyLocked = 16,
    Overflow = 17,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GroupConfig {
    pub threshold: u32,
    pub members: Vec<Address>,
    pub delay: u64,
    pub require_delay: bool,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PendingTransaction {
    pub group: Address,
    pub to: Address,
    pub value: i128,
    pub data: Bytes,
    /// Snapshotted group threshold at queue time.
    pub confirmations_required: u32,
    pub confirmations_received: u32,
    pub execute_after: u64,
    pub executed: bool,
    pub cancelled: bool,
}

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Admin,
    Router,
    Group(Address),
    Tx(BytesN<32>),
    /// (tx_hash, member) -> confirmed flag; confirmation count is exact
    /// membership count, not call count.
    Confirmation(BytesN<32>, Address),
    ReentryLock,
}

#[contract]
pub struct AuthorizationEngine;

#[contractimpl]
impl AuthorizationEngine {
    /// Wire the admin and the orchestrator allowed to queue transactions.
    pub fn initialize(e: Env, admin: Address, router: Address) -> Result<(), Error> {
        if e.storage().instance().has(&DataKey::Admin) {
            return Err(Error::AlreadyInitialized);
        }
        admin.require_auth();
        e.storage().instance().set(&DataKey::Admin, &admin);
        e.storage().instance().set(&DataKey::Router, &router);
        e.events()
            .publish((Symbol::new(&e, "authorizer_initialized"), admin), router);
        Ok(())
    }

    /// Bind a group record to an external multi-party wallet. The caller
    /// must prove membership via the wallet itself, so an unrelated party
    /// cannot claim a group. Re-registration overwrites the config;
    /// transactions already queued keep their snapshotted threshold.
    pub fn register_authorization_group(
        e: Env,
        caller: Address,
        group: Address,
        threshold: u32,
        members: Vec<Address>,
        delay: u64,
    ) -> Result<(), Error> {
        caller.require_auth();
        if !AuthorizationGroupClient::new(&e, &group).is_member(&caller) {
            return Err(Error::NotGroupMember);
        }
        if members.is_empty() {
            return Err(Error::NoMembers);
        }
        if threshold == 0 || threshold > members.len() {
            return Err(Error::InvalidThreshold);
        }
        if delay != 0 && !(MIN_DELAY..=MAX_DELAY).contains(&delay) {
            return Err(Error::InvalidDelay);
        }

        let config = GroupConfig {
            threshold,
            members,
            delay,
            require_delay: delay != 0,
        };
        e.storage()
            .instance()
            .set(&DataKey::Group(group.clone()), &config);
        e.events().publish(
            (Symbol::new(&e, "group_registered"), group),
            (threshold, delay),
        );
        Ok(())
    }

    /// Queue a transaction for a registered group. Only the designated
    /// orchestrator may queue. Queueing the same call twice in the same
    /// instant yields the same hash and is idempotent: the existing entry
    /// (and its confirmations) is kept.
    pub fn queue_transaction(
        e: Env,
        caller: Address,
        group: Address,
        to: Address,
        value: i128,
        data: Bytes,
    ) -> Result<BytesN<32>, Error> {
        caller.require_auth();
        let router: Address = e
            .storage()
            .instance()
            .get(&DataKey::Router)
            .ok_or(Error::NotInitialized)?;
        if caller != router {
            return Err(Error::NotRouter);
        }
        let config: GroupConfig = e
            .storage()
            .instance()
            .get(&DataKey::Group(group.clone()))
            .ok_or(Error::GroupNotRegistered)?;

        let now = e.ledger().timestamp();
        let tx_hash = derive_tx_hash(&e, &group, &to, value, &data, now);
        if e.storage().instance().has(&DataKey::Tx(tx_hash.clone())) {
            return Ok(tx_hash);
        }

        let execute_after = if config.require_delay {
            now.checked_add(config.delay).ok_or(Error::Overflow)?
        } else {
            now
        };
        let tx = PendingTransaction {
            group: group.clone(),
            to,
            value,
            data,
            confirmations_required: config.threshold,
            confirmations_received: 0,
            execute_after,
            executed: false,
            cancelled: false,
        };
        e.storage()
            .instance()
            .set(&DataKey::Tx(tx_hash.clone()), &tx);
        e.events().publish(
            (Symbol::new(&e, "tx_queued"), tx_hash.clone(), group),
            (value, execute_after, config.threshold),
        );
        Ok(tx_hash)
    }

    /// Record one member's confirmation. Idempotency is per (tx, member):
    /// a member cannot be counted twice.
    pub fn confirm_transaction(e: Env, member: Address, tx_hash: BytesN<32>) -> Result<u32, Error> {
        member.require_auth();
        let mut tx = read_tx(&e, &tx_hash)?;
        if tx.cancelled {
            return Err(Error::TransactionCancelled);
        }
        if tx.executed {
            return Err(Error::AlreadyExecuted);
        }
        require_member(&e, &tx.group, &member)?;

        let conf_key = DataKey::Confirmation(tx_hash.clone(), member.clone());
        if e.storage().instance().get(&conf_key).unwrap_or(false) {
            return Err(Error::AlreadyConfirmed);
        }
        e.storage().instance().set(&conf_key, &true);

        tx.confirmations_received = tx
            .confirmations_received
            .checked_add(1)
            .ok_or(Error::Overflow)?;
        e.storage()
            .instance()
            .set(&DataKey::Tx(tx_hash.clone()), &tx);
        e.events().publish(
            (Symbol::new(&e, "tx_confirmed"), tx_hash, member),
            tx.confirmations_received,
        );
        Ok(tx.confirmations_received)
    }

    /// Execute a ready transaction. Callable by anyone — the gate is the
    /// data-level state machine (confirmations, delay, not yet executed),
    /// not caller identity, which enables relay/keeper patterns.
    ///
    /// The executed flag is persisted before the external call; the inner
    /// call's own success is reported in the event and deliberately does
    /// not unwind the marking, so a failing wallet call cannot leave the
    /// transaction perpetually re-triggerable.
    pub fn execute_transaction(e: Env, tx_hash: BytesN<32>) -> Result<bool, Error> {
        let mut tx = read_tx(&e, &tx_hash)?;
        if tx.cancelled {
            return Err(Error::TransactionCancelled);
        }
        if tx.executed {
            return Err(Error::AlreadyExecuted);
        }
        if tx.confirmations_received < tx.confirmations_required {
            return Err(Error::NotEnoughConfirmations);
        }
        // Inclusive boundary: eligible exactly at execute_after.
        if e.ledger().timestamp() < tx.execute_after {
            return Err(Error::DelayNotPassed);
        }
        acquire_lock(&e)?;

        tx.executed = true;
        e.storage()
            .instance()
            .set(&DataKey::Tx(tx_hash.clone()), &tx);

        let group = AuthorizationGroupClient::new(&e, &tx.group);
        let success = match group.try_execute_arbitrary_call(&tx.to, &tx.value, &tx.data) {
            Ok(Ok(s)) => s,
            _ => false,
        };
        e.events().publish(
            (Symbol::new(&e, "tx_executed"), tx_hash, tx.group),
            success,
        );
        release_lock(&e);
        Ok(success)
    }

    /// Cancel a pending transaction. Valid any time before execution,
    /// including after confirmations; final once set.
    pub fn cancel_transaction(e: Env, member: Address, tx_hash: BytesN<32>) -> Result<(), Error> {
        member.require_auth();
        let mut tx = read_tx(&e, &tx_hash)?;
        if tx.cancelled {
            return Err(Error::TransactionCancelled);
        }
        if tx.executed {
            return Err(Error::AlreadyExecuted);
        }
        require_member(&e, &tx.group, &member)?;

        tx.cancelled = true;
        e.storage()
            .instance()
            .set(&DataKey::Tx(tx_hash.clone()), &tx);
        e.events()
            .publish((Symbol::new(&e, "tx_cancelled"), tx_hash), member);
        Ok(())
    }

    pub fn set_router(e: Env, router: Address) -> Result<(), Error> {
        require_admin(&e)?;
        e.storage().instance().set(&DataKey::Router, &router);
        e.events()
            .publish((Symbol::new(&e, "router_updated"), router), ());
        Ok(())
    }

    pub fn transfer_ownership(e: Env, new_admin: Address) -> Result<(), Error> {
        require_admin(&e)?;
        e.storage().instance().set(&DataKey::Admin, &new_admin);
        e.events()
            .publish((Symbol::new(&e, "ownership_transferred"), new_admin), ());
        Ok(())
    }

    // ── Views ────────────────────────────────────────────────────────────

    /// Pure replication of the execution gates.
    pub fn can_execute(e: Env, tx_hash: BytesN<32>) -> bool {
        match read_tx(&e, &tx_hash) {
            Ok(tx) => {
                !tx.executed
                    && !tx.cancelled
                    && tx.confirmations_received >= tx.confirmations_required
                    && e.ledger().timestamp() >= tx.execute_after
            }
            Err(_) => false,
        }
    }

    pub fn get_transaction(e: Env, tx_hash: BytesN<32>) -> Result<PendingTransaction, Error> {
        read_tx(&e, &tx_hash)
    }

    pub fn get_group(e: Env, group: Address) -> Result<GroupConfig, Error> {
        e.storage()
            .instance()
            .get(&DataKey::Group(group))
            .ok_or(Error::GroupNotRegistered)
    }

    pub fn has_confirmed(e: Env, tx_hash: BytesN<32>, member: Address) -> bool {
        e.storage()
            .instance()
            .get(&DataKey::Confirmation(tx_hash, member))
            .unwrap_or(false)
    }

    pub fn get_confirmation_count(e: Env, tx_hash: BytesN<32>) -> u32 {
        read_tx(&e, &tx_hash).map_or(0, |tx| tx.confirmations_received)
    }

    pub fn get_router(e: Env) -> Result<Address, Error> {
        e.storage()
            .instance()
            .get(&DataKey::Router)
            .ok_or(Error::NotInitialized)
    }

    pub fn get_admin(e: Env) -> Result<Address, Error> {
        e.storage()
            .instance()
            .get(&DataKey::Admin)
            .ok_or(Error::NotInitialized)
    }
}

fn derive_tx_hash(
    e: &Env,
    group: &Address,
    to: &Address,
    value: i128,
    data: &Bytes,
    now: u64,
) -> BytesN<32> {
    let preimage = (group.clone(), to.clone(), value, data.clone(), now).to_xdr(e);
    e.crypto().sha256(&preimage).to_bytes()
}

fn read_tx(e: &Env, tx_hash: &BytesN<32>) -> Result<PendingTransaction, Error> {
    e.storage()
        .instance()
        .get(&DataKey::Tx(tx_hash.clone()))
        .ok_or(Error::TxNotFound)
}

fn require_member(e: &Env, group: &Address, member: &Address) -> Result<(), Error> {
    let config: GroupConfig = e
        .storage()
        .instance()
        .get(&DataKey::Group(group.clone()))
        .ok_or(Error::GroupNotRegistered)?;
    if !config.members.contains(member) {
        return Err(Error::NotSigner);
    }
    Ok(())
}

fn require_admin(e: &Env) -> Result<(), Error> {
    let admin: Address = e
        .storage()
        .instance()
        .get(&DataKey::Admin)
        .ok_or(Error::NotInitialized)?;
    admin.require_auth();
    Ok(())
}

fn acquire_lock(e: &Env) -> Result<(), Error> {
    let locked: bool = e
        .storage()
        .instance()
        .get(&DataKey::ReentryLock)
        .unwrap_or(false);
    if locked {
        return Err(Error::ReentrancyLocked);
    }
    e.storage().instance().set(&DataKey::ReentryLock, &true);
    Ok(())
}

fn release_lock(e: &Env) {
    e.storage().instance().set(&DataKey::ReentryLock, &false);
}


#[cfg(test)]
mod test_lifecycle;

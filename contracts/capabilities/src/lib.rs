#![no_std]

//! Capability interfaces shared by the Strata engines.
//!
//! Each trait describes the cross-contract surface of an external
//! collaborator (or of another engine). The `#[contractclient]` attribute
//! generates the typed client the engines use to invoke it; the engines
//! never reach into another contract's storage directly.

use soroban_sdk::{contractclient, Address, Bytes, Env, Symbol};

/// A yield-bearing destination integrated behind an adapter contract.
///
/// Amounts are in the venue's underlying asset unit; yield and risk are
/// self-reported by the venue (`current_yield` in basis points,
/// `risk_rating` on the 1..=10 scale).
#[contractclient(name = "VenueClient")]
pub trait VenueCapability {
    /// Deposit `amount` on behalf of `account`. Returns shares credited.
    fn deposit(env: Env, account: Address, amount: i128, data: Bytes) -> i128;

    /// Withdraw `amount` on behalf of `account`. Returns the amount actually
    /// received, which may be less than requested after venue fees.
    fn withdraw(env: Env, account: Address, amount: i128, data: Bytes) -> i128;

    /// Collect accrued yield for `account`. Returns the yield amount.
    fn harvest(env: Env, account: Address, min_yield: i128) -> i128;

    /// Current advertised yield in basis points.
    fn current_yield(env: Env) -> u32;

    /// Venue risk rating, 1 (safest) to 10.
    fn risk_rating(env: Env) -> u32;

    /// Total value the venue holds across all accounts.
    fn total_locked(env: Env) -> i128;

    /// Value the venue holds for one account.
    fn balance_of(env: Env, account: Address) -> i128;
}

/// An external multi-party wallet whose members jointly approve
/// privileged transactions.
#[contractclient(name = "AuthorizationGroupClient")]
pub trait AuthorizationGroupCapability {
    /// Whether `account` is a member of the group.
    fn is_member(env: Env, account: Address) -> bool;

    /// Execute an arbitrary call from the group wallet. Returns success.
    fn execute_arbitrary_call(env: Env, to: Address, value: i128, data: Bytes) -> bool;
}

/// The policy-engine surface consumed by the routing engine.
///
/// `validate_transfer` both checks and consumes allowance: a `true` return
/// means the daily spend and exposure have already been accounted. The
/// three policy checks signal softly (`false` plus a reason event) so a
/// route orchestrator can decide how to abort; structural problems (no
/// policy, blacklist, bad amount) trap the whole invocation.
#[contractclient(name = "PolicyClient")]
pub trait PolicyCapability {
    fn validate_transfer(
        env: Env,
        caller: Address,
        account: Address,
        venue: Address,
        amount: i128,
    ) -> bool;

    /// Read-only mirror of `validate_transfer`'s policy checks. Returns
    /// `(allowed, reason)` without consuming any allowance.
    fn preview_transfer(env: Env, account: Address, venue: Address, amount: i128)
        -> (bool, Symbol);

    /// Reduce recorded exposure after funds leave a venue. Clamps at zero.
    fn decrease_exposure(env: Env, caller: Address, account: Address, venue: Address, amount: i128);

    fn is_blacklisted(env: Env, account: Address) -> bool;
}

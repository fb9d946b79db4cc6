#![no_std]

//! # Strata Routing Engine
//!
//! User-declared investment intents, optimal-venue selection, and atomic
//! multi-leg fund routing. The router is the orchestrator: it consults the
//! policy engine before any value moves toward a venue, and every venue
//! interaction goes through the `VenueCapability` client.
//!
//! A route executes as one invocation; any fatal condition in any leg
//! discards the effects of every leg. The only soft limit is the
//! execution-cost ceiling, which is reported by event after the fact —
//! by the time cost is known, the work is done.

use soroban_sdk::{
    contract, contracterror, contractimpl, contracttype, xdr::ToXdr, Address, Bytes, BytesN, Env,
    String, Symbol, Vec,
};
use strata_capabilities::{PolicyClient, VenueClient};

pub const MAX_TARGET_YIELD_BPS: u32 = 5_000;
pub const MIN_RISK_SCORE: u32 = 1;
pub const MAX_RISK_SCORE: u32 = 10;
/// Flat per-leg execution-cost estimate. The host exposes no
/// mid-invocation cost meter, so the soft ceiling is checked against
/// `legs * COST_PER_LEG`.
pub const COST_PER_LEG: i128 = 150_000;

#[contracterror]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    AlreadyInitialized = 1,
    NotInitialized = 2,
    ContractPaused = 3,
    Blacklisted = 4,
    InvalidRiskScore = 5,
    UnrealisticYield = 6,
    IntentNotFound = 7,
    NotIntentOwner = 8,
    IntentNotActive = 9,
    AlreadyRegistered = 10,
    VenueNotRegistered = 11,
    VenueHasFunds = 12,
    EmptyRoute = 13,
    InsufficientBalance = 14,
    PolicyViolation = 15,
    WithdrawFailed = 16,
    DepositFailed = 17,
    SlippageExceeded = 18,
    ReentrancyLocked = 19,
    Overflow = 20,
}

/// A declared investment objective. Never transferable; updated and
/// deactivated only by its owner.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Intent {
    pub owner: Address,
    pub target_yield_bps: u32,
    pub max_risk_score: u32,
    pub liquidity_reserve: i128,
    pub max_gas_cost: i128,
    pub created_at: u64,
    pub active: bool,
}

/// One fund movement inside a route.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RouteLeg {
    pub from_venue: Address,
    pub to_venue: Address,
    pub amount: i128,
    pub min_received: i128,
    pub data: Bytes,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VenueInfo {
    pub name: String,
    pub registered: bool,
}

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Admin,
    PolicyEngine,
    Paused,
    ReentryLock,
    Intent(BytesN<32>),
    Venue(Address),
    /// Append-only; membership is governed by `VenueInfo.registered`.
    VenueList,
}

#[contract]
pub struct RoutingEngine;

#[contractimpl]
impl RoutingEngine {
    /// Wire the admin and the policy engine address at construction.
    pub fn initialize(e: Env, admin: Address, policy_engine: Address) -> Result<(), Error> {
        if e.storage().instance().has(&DataKey::Admin) {
            return Err(Error::AlreadyInitialized);
        }
        admin.require_auth();
        e.storage().instance().set(&DataKey::Admin, &admin);
        e.storage()
            .instance()
            .set(&DataKey::PolicyEngine, &policy_engine);
        e.events().publish(
            (Symbol::new(&e, "router_initialized"), admin),
            policy_engine,
        );
        Ok(())
    }

    /// Declare an intent. The identifier commits to the owner, so two
    /// accounts creating numerically identical intents in the same instant
    /// still get distinct ids.
    pub fn create_intent(
        e: Env,
        owner: Address,
        target_yield_bps: u32,
        max_risk_score: u32,
        liquidity_reserve: i128,
        max_gas_cost: i128,
    ) -> Result<BytesN<32>, Error> {
        owner.require_auth();
        require_not_paused(&e)?;
        require_not_blacklisted(&e, &owner)?;
        validate_intent_params(target_yield_bps, max_risk_score)?;

        let created_at = e.ledger().timestamp();
        let intent_id = derive_intent_id(&e, &owner, created_at, target_yield_bps, max_risk_score);
        let intent = Intent {
            owner: owner.clone(),
            target_yield_bps,
            max_risk_score,
            liquidity_reserve,
            max_gas_cost,
            created_at,
            active: true,
        };
        e.storage()
            .instance()
            .set(&DataKey::Intent(intent_id.clone()), &intent);
        e.events().publish(
            (Symbol::new(&e, "intent_created"), intent_id.clone(), owner),
            (target_yield_bps, max_risk_score, liquidity_reserve),
        );
        Ok(intent_id)
    }

    pub fn update_intent(
        e: Env,
        owner: Address,
        intent_id: BytesN<32>,
        target_yield_bps: u32,
        max_risk_score: u32,
        liquidity_reserve: i128,
        max_gas_cost: i128,
    ) -> Result<(), Error> {
        owner.require_auth();
        require_not_blacklisted(&e, &owner)?;
        let mut intent = read_owned_active_intent(&e, &owner, &intent_id)?;
        validate_intent_params(target_yield_bps, max_risk_score)?;

        intent.target_yield_bps = target_yield_bps;
        intent.max_risk_score = max_risk_score;
        intent.liquidity_reserve = liquidity_reserve;
        intent.max_gas_cost = max_gas_cost;
        e.storage()
            .instance()
            .set(&DataKey::Intent(intent_id.clone()), &intent);
        e.events().publish(
            (Symbol::new(&e, "intent_updated"), intent_id, owner),
            (target_yield_bps, max_risk_score),
        );
        Ok(())
    }

    pub fn deactivate_intent(e: Env, owner: Address, intent_id: BytesN<32>) -> Result<(), Error> {
        owner.require_auth();
        require_not_blacklisted(&e, &owner)?;
        let mut intent = read_owned_active_intent(&e, &owner, &intent_id)?;
        intent.active = false;
        e.storage()
            .instance()
            .set(&DataKey::Intent(intent_id.clone()), &intent);
        e.events()
            .publish((Symbol::new(&e, "intent_deactivated"), intent_id), owner);
        Ok(())
    }

    /// Register a venue adapter. Admin only.
    pub fn register_venue(e: Env, venue: Address, name: String) -> Result<(), Error> {
        require_admin(&e)?;
        let key = DataKey::Venue(venue.clone());
        let existing: Option<VenueInfo> = e.storage().instance().get(&key);
        match existing {
            Some(info) if info.registered => return Err(Error::AlreadyRegistered),
            Some(_) => {}
            None => {
                let mut list = read_venue_list(&e);
                list.push_back(venue.clone());
                e.storage().instance().set(&DataKey::VenueList, &list);
            }
        }
        e.storage().instance().set(
            &key,
            &VenueInfo {
                name: name.clone(),
                registered: true,
            },
        );
        e.events()
            .publish((Symbol::new(&e, "venue_registered"), venue), name);
        Ok(())
    }

    /// Deregister a venue. Refused while the venue still holds funds, so
    /// deregistration can never strand user balances. Admin only.
    pub fn remove_venue(e: Env, venue: Address) -> Result<(), Error> {
        require_admin(&e)?;
        let key = DataKey::Venue(venue.clone());
        let mut info: VenueInfo = e
            .storage()
            .instance()
            .get(&key)
            .filter(|i: &VenueInfo| i.registered)
            .ok_or(Error::VenueNotRegistered)?;
        if VenueClient::new(&e, &venue).total_locked() != 0 {
            return Err(Error::VenueHasFunds);
        }
        info.registered = false;
        e.storage().instance().set(&key, &info);
        e.events()
            .publish((Symbol::new(&e, "venue_removed"), venue), ());
        Ok(())
    }

    /// Scan registered venues for the best risk-weighted yield. Pure view:
    /// deterministic for a fixed venue set and fixed venue readings, with
    /// ties keeping the first venue found.
    ///
    /// Score = `yield * (11 - risk) / 10`, so lower risk wins at equal
    /// yield. Returns `(None, 0)` when nothing qualifies.
    pub fn get_optimal_route(
        e: Env,
        target_yield_bps: u32,
        max_risk_score: u32,
    ) -> Result<(Option<Address>, u32), Error> {
        validate_intent_params(target_yield_bps, max_risk_score)?;

        let mut best: Option<Address> = None;
        let mut best_yield: u32 = 0;
        let mut best_score: u64 = 0;
        for venue in read_venue_list(&e).iter() {
            if !is_registered(&e, &venue) {
                continue;
            }
            let client = VenueClient::new(&e, &venue);
            let venue_yield = client.current_yield();
            // Venue-reported rating, clamped to the 1..=10 scale.
            let risk = client.risk_rating().clamp(MIN_RISK_SCORE, MAX_RISK_SCORE);
            if risk > max_risk_score || venue_yield < target_yield_bps {
                continue;
            }
            let score = (venue_yield as u64) * ((11 - risk) as u64) / 10;
            // A qualifying venue always beats no venue, even when integer
            // division floors its score to zero.
            if best.is_none() || score > best_score {
                best_score = score;
                best_yield = venue_yield;
                best = Some(venue);
            }
        }
        Ok((best, best_yield))
    }

    /// Execute a multi-leg route for an intent. All-or-nothing: a fatal
    /// condition in any leg unwinds every leg. Each leg re-validates
    /// against the policy engine, moves the *actually withdrawn* amount
    /// (venues may apply fees), and enforces per-leg slippage.
    pub fn execute_route(
        e: Env,
        owner: Address,
        intent_id: BytesN<32>,
        legs: Vec<RouteLeg>,
    ) -> Result<(), Error> {
        owner.require_auth();
        require_not_paused(&e)?;
        require_not_blacklisted(&e, &owner)?;
        let intent = read_owned_active_intent(&e, &owner, &intent_id)?;
        if legs.is_empty() {
            return Err(Error::EmptyRoute);
        }
        acquire_lock(&e)?;

        let self_addr = e.current_contract_address();
        let policy = PolicyClient::new(&e, &read_policy_engine(&e)?);
        for leg in legs.iter() {
            if !is_registered(&e, &leg.from_venue) || !is_registered(&e, &leg.to_venue) {
                return Err(Error::VenueNotRegistered);
            }
            let from = VenueClient::new(&e, &leg.from_venue);
            if from.balance_of(&owner) < leg.amount {
                return Err(Error::InsufficientBalance);
            }
            // Soft policy signal, mapped to a hard abort one level up:
            // a blocked leg voids the entire route.
            if !policy.validate_transfer(&self_addr, &owner, &leg.to_venue, &leg.amount) {
                return Err(Error::PolicyViolation);
            }

            let withdrawn = from.withdraw(&owner, &leg.amount, &leg.data);
            if withdrawn <= 0 {
                return Err(Error::WithdrawFailed);
            }
            policy.decrease_exposure(&self_addr, &owner, &leg.from_venue, &leg.amount);

            let deposited = VenueClient::new(&e, &leg.to_venue).deposit(&owner, &withdrawn, &leg.data);
            if deposited <= 0 {
                return Err(Error::DepositFailed);
            }
            if deposited < leg.min_received {
                return Err(Error::SlippageExceeded);
            }
            e.events().publish(
                (
                    Symbol::new(&e, "funds_routed"),
                    leg.from_venue.clone(),
                    leg.to_venue.clone(),
                ),
                (leg.amount, withdrawn, deposited),
            );
        }

        // Cost ceiling is soft: the route has already executed, so an
        // overrun is reported, not reverted.
        let cost = COST_PER_LEG
            .checked_mul(legs.len() as i128)
            .ok_or(Error::Overflow)?;
        if cost > intent.max_gas_cost {
            e.events().publish(
                (Symbol::new(&e, "gas_limit_exceeded"), intent_id.clone()),
                (cost, intent.max_gas_cost),
            );
        }
        e.events().publish(
            (Symbol::new(&e, "route_executed"), intent_id, owner),
            (legs.len(), cost),
        );
        release_lock(&e);
        Ok(())
    }

    /// Pre-flight simulation of `execute_route`. Mirrors its validation
    /// steps without mutating anything; the policy checks go through the
    /// policy engine's read-only preview.
    pub fn can_execute_route(
        e: Env,
        owner: Address,
        intent_id: BytesN<32>,
        legs: Vec<RouteLeg>,
    ) -> (bool, Symbol) {
        if read_paused(&e) {
            return (false, Symbol::new(&e, "PAUSED"));
        }
        let intent: Intent = match e.storage().instance().get(&DataKey::Intent(intent_id)) {
            Some(i) => i,
            None => return (false, Symbol::new(&e, "NO_INTENT")),
        };
        if intent.owner != owner {
            return (false, Symbol::new(&e, "NOT_OWNER"));
        }
        if !intent.active {
            return (false, Symbol::new(&e, "INTENT_INACTIVE"));
        }
        if legs.is_empty() {
            return (false, Symbol::new(&e, "EMPTY_ROUTE"));
        }
        let policy_engine: Address = match e.storage().instance().get(&DataKey::PolicyEngine) {
            Some(a) => a,
            None => return (false, Symbol::new(&e, "NOT_INITIALIZED")),
        };
        let policy = PolicyClient::new(&e, &policy_engine);
        for leg in legs.iter() {
            if !is_registered(&e, &leg.from_venue) || !is_registered(&e, &leg.to_venue) {
                return (false, Symbol::new(&e, "BAD_VENUE"));
            }
            if VenueClient::new(&e, &leg.from_venue).balance_of(&owner) < leg.amount {
                return (false, Symbol::new(&e, "NO_BALANCE"));
            }
            let (ok, reason) = policy.preview_transfer(&owner, &leg.to_venue, &leg.amount);
            if !ok {
                return (false, reason);
            }
        }
        (true, Symbol::new(&e, "OK"))
    }

    /// Collect accrued yield from a registered venue for the caller.
    pub fn harvest_venue(
        e: Env,
        owner: Address,
        venue: Address,
        min_yield: i128,
    ) -> Result<i128, Error> {
        owner.require_auth();
        require_not_paused(&e)?;
        require_not_blacklisted(&e, &owner)?;
        if !is_registered(&e, &venue) {
            return Err(Error::VenueNotRegistered);
        }
        let harvested = VenueClient::new(&e, &venue).harvest(&owner, &min_yield);
        e.events().publish(
            (Symbol::new(&e, "yield_harvested"), venue, owner),
            harvested,
        );
        Ok(harvested)
    }

    /// System-wide pause; blocks intent creation and route execution but
    /// not read-only views. Admin only.
    pub fn set_paused(e: Env, paused: bool) -> Result<(), Error> {
        require_admin(&e)?;
        e.storage().instance().set(&DataKey::Paused, &paused);
        e.events()
            .publish((Symbol::new(&e, "pause_updated"),), paused);
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

    pub fn get_intent(e: Env, intent_id: BytesN<32>) -> Result<Intent, Error> {
        e.storage()
            .instance()
            .get(&DataKey::Intent(intent_id))
            .ok_or(Error::IntentNotFound)
    }

    pub fn is_venue_registered(e: Env, venue: Address) -> bool {
        is_registered(&e, &venue)
    }

    pub fn get_venue_name(e: Env, venue: Address) -> Result<String, Error> {
        e.storage()
            .instance()
            .get(&DataKey::Venue(venue))
            .filter(|i: &VenueInfo| i.registered)
            .map(|i| i.name)
            .ok_or(Error::VenueNotRegistered)
    }

    pub fn get_registered_venues(e: Env) -> Vec<Address> {
        let mut out = Vec::new(&e);
        for venue in read_venue_list(&e).iter() {
            if is_registered(&e, &venue) {
                out.push_back(venue);
            }
        }
        out
    }

    pub fn get_venue_count(e: Env) -> u32 {
        Self::get_registered_venues(e).len()
    }

    pub fn is_paused(e: Env) -> bool {
        read_paused(&e)
    }

    pub fn get_admin(e: Env) -> Result<Address, Error> {
        e.storage()
            .instance()
            .get(&DataKey::Admin)
            .ok_or(Error::NotInitialized)
    }

    pub fn get_policy_engine(e: Env) -> Result<Address, Error> {
        read_policy_engine(&e)
    }
}

fn derive_intent_id(
    e: &Env,
    owner: &Address,
    created_at: u64,
    target_yield_bps: u32,
    max_risk_score: u32,
) -> BytesN<32> {
    let preimage = (owner.clone(), created_at, target_yield_bps, max_risk_score).to_xdr(e);
    e.crypto().sha256(&preimage).to_bytes()
}

fn validate_intent_params(target_yield_bps: u32, max_risk_score: u32) -> Result<(), Error> {
    if !(MIN_RISK_SCORE..=MAX_RISK_SCORE).contains(&max_risk_score) {
        return Err(Error::InvalidRiskScore);
    }
    if target_yield_bps > MAX_TARGET_YIELD_BPS {
        return Err(Error::UnrealisticYield);
    }
    Ok(())
}

fn read_owned_active_intent(
    e: &Env,
    owner: &Address,
    intent_id: &BytesN<32>,
) -> Result<Intent, Error> {
    let intent: Intent = e
        .storage()
        .instance()
        .get(&DataKey::Intent(intent_id.clone()))
        .ok_or(Error::IntentNotFound)?;
    if intent.owner != *owner {
        return Err(Error::NotIntentOwner);
    }
    if !intent.active {
        return Err(Error::IntentNotActive);
    }
    Ok(intent)
}

fn read_venue_list(e: &Env) -> Vec<Address> {
    e.storage()
        .instance()
        .get(&DataKey::VenueList)
        .unwrap_or(Vec::new(e))
}

fn is_registered(e: &Env, venue: &Address) -> bool {
    e.storage()
        .instance()
        .get(&DataKey::Venue(venue.clone()))
        .map_or(false, |i: VenueInfo| i.registered)
}

fn read_paused(e: &Env) -> bool {
    e.storage()
        .instance()
        .get(&DataKey::Paused)
        .unwrap_or(false)
}

fn read_policy_engine(e: &Env) -> Result<Address, Error> {
    e.storage()
        .instance()
        .get(&DataKey::PolicyEngine)
        .ok_or(Error::NotInitialized)
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

fn require_not_paused(e: &Env) -> Result<(), Error> {
    if read_paused(e) {
        return Err(Error::ContractPaused);
    }
    Ok(())
}

fn require_not_blacklisted(e: &Env, account: &Address) -> Result<(), Error> {
    let policy = PolicyClient::new(e, &read_policy_engine(e)?);
    if policy.is_blacklisted(account) {
        return Err(Error::Blacklisted);
    }
    Ok(())
}

/// The host rejects contract re-entry before this lock is ever consulted;
/// the lock keeps the invariant stated in the contract itself rather than
/// in host policy.
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

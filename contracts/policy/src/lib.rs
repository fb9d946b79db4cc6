#![no_std]

//! # Strata Policy Engine
//!
//! Per-account transfer policy: rolling daily spending caps, per-venue
//! exposure accounting, a protocol whitelist/risk registry, and a two-tier
//! deactivation model (soft pause vs. hard blacklist).
//!
//! `validate_transfer` is the sole gate for moving value toward a venue.
//! It both checks and mutates: a `true` return means the daily allowance
//! and exposure have already been consumed. The three policy checks signal
//! softly (`Ok(false)` plus a reason event) so a multi-leg route caller can
//! abort on its own terms; everything structural is a hard error.

use soroban_sdk::{
    contract, contracterror, contractimpl, contracttype, Address, Env, String, Symbol,
};

pub const SECONDS_PER_DAY: u64 = 86_400;
pub const MAX_BPS: u32 = 10_000;
pub const MIN_RISK_SCORE: u32 = 1;
pub const MAX_RISK_SCORE: u32 = 10;

#[contracterror]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    AlreadyInitialized = 1,
    NotInitialized = 2,
    Blacklisted = 3,
    PolicyAlreadyExists = 4,
    NoActivePolicy = 5,
    InvalidDailyLimit = 6,
    InvalidExposureLimit = 7,
    InvalidRiskScore = 8,
    InvalidAmount = 9,
    NotRouter = 10,
    ProtocolNotFound = 11,
    Overflow = 12,
}

/// One policy per account. Created by the account itself, never deleted,
/// only deactivated. `daily_spent`/`window_start` form the lazy rolling
/// 24h window; they survive `update_policy` so a parameter change cannot
/// reset spend history.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Policy {
    pub daily_limit: i128,
    pub daily_spent: i128,
    pub window_start: u64,
    pub max_exposure_bps: u32,
    pub max_risk_score: u32,
    pub require_whitelist: bool,
    pub active: bool,
}

/// Protocol registry entry, set only by the admin.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProtocolInfo {
    pub whitelisted: bool,
    pub risk_score: u32,
}

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Admin,
    Policy(Address),
    Blacklist(Address),
    /// (account, venue) -> cumulative amount currently allocated.
    Exposure(Address, Address),
    Protocol(Address),
    /// Callers allowed to consume allowances and adjust exposure
    /// (the router and venue adapters).
    AuthorizedCaller(Address),
}

#[contract]
pub struct PolicyEngine;

#[contractimpl]
impl PolicyEngine {
    /// Initialize with the policy administrator.
    pub fn initialize(e: Env, admin: Address) -> Result<(), Error> {
        if e.storage().instance().has(&DataKey::Admin) {
            return Err(Error::AlreadyInitialized);
        }
        admin.require_auth();
        e.storage().instance().set(&DataKey::Admin, &admin);
        e.events()
            .publish((Symbol::new(&e, "policy_engine_initialized"),), admin);
        Ok(())
    }

    /// Create a policy for `account`. Only the account itself may do this;
    /// there is no delegation. Fails if the account is blacklisted or an
    /// active policy already exists (recreating an active policy would
    /// zero the spend counter, so mutation goes through `update_policy`).
    pub fn create_policy(
        e: Env,
        account: Address,
        daily_limit: i128,
        max_exposure_bps: u32,
        max_risk_score: u32,
        require_whitelist: bool,
    ) -> Result<(), Error> {
        account.require_auth();
        if read_blacklist(&e, &account) {
            return Err(Error::Blacklisted);
        }
        if let Some(existing) = read_policy(&e, &account) {
            if existing.active {
                return Err(Error::PolicyAlreadyExists);
            }
        }
        validate_policy_params(daily_limit, max_exposure_bps, max_risk_score)?;

        let policy = Policy {
            daily_limit,
            daily_spent: 0,
            window_start: e.ledger().timestamp(),
            max_exposure_bps,
            max_risk_score,
            require_whitelist,
            active: true,
        };
        e.storage()
            .instance()
            .set(&DataKey::Policy(account.clone()), &policy);
        e.events().publish(
            (Symbol::new(&e, "policy_created"), account),
            (daily_limit, max_exposure_bps, max_risk_score),
        );
        Ok(())
    }

    /// Update policy parameters. Spend history (`daily_spent`,
    /// `window_start`) is deliberately left untouched.
    pub fn update_policy(
        e: Env,
        account: Address,
        daily_limit: i128,
        max_exposure_bps: u32,
        max_risk_score: u32,
        require_whitelist: bool,
    ) -> Result<(), Error> {
        account.require_auth();
        if read_blacklist(&e, &account) {
            return Err(Error::Blacklisted);
        }
        let mut policy = read_active_policy(&e, &account)?;
        validate_policy_params(daily_limit, max_exposure_bps, max_risk_score)?;

        policy.daily_limit = daily_limit;
        policy.max_exposure_bps = max_exposure_bps;
        policy.max_risk_score = max_risk_score;
        policy.require_whitelist = require_whitelist;
        e.storage()
            .instance()
            .set(&DataKey::Policy(account.clone()), &policy);
        e.events().publish(
            (Symbol::new(&e, "policy_updated"), account),
            (daily_limit, max_exposure_bps, max_risk_score),
        );
        Ok(())
    }

    /// The transfer gate. Callable only by authorized callers (the router).
    ///
    /// Hard-fails on structural problems; the three policy checks return
    /// `Ok(false)` with a `transfer_blocked` event carrying the reason so
    /// the caller can abort a multi-leg route on its own terms. On
    /// `Ok(true)` the daily spend and exposure have already been consumed;
    /// there is no separate commit step.
    pub fn validate_transfer(
        e: Env,
        caller: Address,
        account: Address,
        venue: Address,
        amount: i128,
    ) -> Result<bool, Error> {
        caller.require_auth();
        require_authorized_caller(&e, &caller)?;
        if read_blacklist(&e, &account) {
            return Err(Error::Blacklisted);
        }
        let mut policy = read_active_policy(&e, &account)?;
        if amount <= 0 {
            return Err(Error::InvalidAmount);
        }

        // Lazy rolling window: reset is inclusive at exactly +24h.
        let now = e.ledger().timestamp();
        let window_end = policy
            .window_start
            .checked_add(SECONDS_PER_DAY)
            .ok_or(Error::Overflow)?;
        if now >= window_end {
            policy.daily_spent = 0;
            policy.window_start = now;
        }

        let policy_key = DataKey::Policy(account.clone());
        let spent_after = policy
            .daily_spent
            .checked_add(amount)
            .ok_or(Error::Overflow)?;
        if spent_after > policy.daily_limit {
            e.storage().instance().set(&policy_key, &policy);
            emit_blocked(&e, &account, &venue, amount, "DAILY_LIMIT");
            return Ok(false);
        }

        let protocol = read_protocol(&e, &venue);
        if policy.require_whitelist && !protocol.as_ref().map_or(false, |p| p.whitelisted) {
            e.storage().instance().set(&policy_key, &policy);
            emit_blocked(&e, &account, &venue, amount, "NOT_WHITELISTED");
            return Ok(false);
        }

        let venue_risk = protocol.map_or(0, |p| p.risk_score);
        if venue_risk > policy.max_risk_score {
            e.storage().instance().set(&policy_key, &policy);
            emit_blocked(&e, &account, &venue, amount, "RISK_TOO_HIGH");
            return Ok(false);
        }

        policy.daily_spent = spent_after;
        e.storage().instance().set(&policy_key, &policy);

        let exposure_key = DataKey::Exposure(account.clone(), venue.clone());
        let exposure: i128 = e.storage().instance().get(&exposure_key).unwrap_or(0);
        let new_exposure = exposure.checked_add(amount).ok_or(Error::Overflow)?;
        e.storage().instance().set(&exposure_key, &new_exposure);

        e.events().publish(
            (Symbol::new(&e, "transfer_validated"), account, venue),
            amount,
        );
        Ok(true)
    }

    /// Read-only mirror of `validate_transfer`'s checks. Never mutates and
    /// never traps: structural problems come back as `(false, reason)` so
    /// off-chain pre-flight and the router's route simulation can branch.
    pub fn preview_transfer(
        e: Env,
        account: Address,
        venue: Address,
        amount: i128,
    ) -> (bool, Symbol) {
        if read_blacklist(&e, &account) {
            return (false, Symbol::new(&e, "BLACKLISTED"));
        }
        let policy = match read_policy(&e, &account) {
            Some(p) if p.active => p,
            _ => return (false, Symbol::new(&e, "NO_POLICY")),
        };
        if amount <= 0 {
            return (false, Symbol::new(&e, "INVALID_AMOUNT"));
        }

        let now = e.ledger().timestamp();
        let effective_spent = match policy.window_start.checked_add(SECONDS_PER_DAY) {
            Some(window_end) if now < window_end => policy.daily_spent,
            _ => 0,
        };
        let spent_after = match effective_spent.checked_add(amount) {
            Some(v) => v,
            None => return (false, Symbol::new(&e, "DAILY_LIMIT")),
        };
        if spent_after > policy.daily_limit {
            return (false, Symbol::new(&e, "DAILY_LIMIT"));
        }

        let protocol = read_protocol(&e, &venue);
        if policy.require_whitelist && !protocol.as_ref().map_or(false, |p| p.whitelisted) {
            return (false, Symbol::new(&e, "NOT_WHITELISTED"));
        }
        if protocol.map_or(0, |p| p.risk_score) > policy.max_risk_score {
            return (false, Symbol::new(&e, "RISK_TOO_HIGH"));
        }
        (true, Symbol::new(&e, "OK"))
    }

    /// Reduce recorded exposure after funds actually leave a venue.
    /// Restricted to authorized callers — exposure must track real
    /// balances, not self-reported claims. Clamps at zero rather than
    /// underflowing.
    pub fn decrease_exposure(
        e: Env,
        caller: Address,
        account: Address,
        venue: Address,
        amount: i128,
    ) -> Result<(), Error> {
        caller.require_auth();
        require_authorized_caller(&e, &caller)?;
        if amount <= 0 {
            return Err(Error::InvalidAmount);
        }
        let key = DataKey::Exposure(account.clone(), venue.clone());
        let exposure: i128 = e.storage().instance().get(&key).unwrap_or(0);
        let new_exposure = if amount >= exposure {
            0
        } else {
            exposure - amount
        };
        e.storage().instance().set(&key, &new_exposure);
        e.events().publish(
            (Symbol::new(&e, "exposure_decreased"), account, venue),
            (amount, new_exposure),
        );
        Ok(())
    }

    /// Exposure-ceiling check against a reference portfolio value.
    /// Returns `(allowed, exposure_bps)`; `(false, 0)` when the portfolio
    /// value is zero or no active policy exists. Inclusive comparison.
    pub fn check_exposure_limit(
        e: Env,
        account: Address,
        venue: Address,
        amount: i128,
        portfolio_value: i128,
    ) -> (bool, u32) {
        if portfolio_value <= 0 {
            return (false, 0);
        }
        let policy = match read_policy(&e, &account) {
            Some(p) if p.active => p,
            _ => return (false, 0),
        };
        let exposure: i128 = e
            .storage()
            .instance()
            .get(&DataKey::Exposure(account, venue))
            .unwrap_or(0);
        let total = match exposure.checked_add(amount) {
            Some(v) => v,
            None => return (false, 0),
        };
        let scaled = match total.checked_mul(MAX_BPS as i128) {
            Some(v) => v,
            None => return (false, 0),
        };
        let bps_wide = scaled / portfolio_value;
        let exposure_bps = if bps_wide > u32::MAX as i128 {
            u32::MAX
        } else if bps_wide < 0 {
            0
        } else {
            bps_wide as u32
        };
        (exposure_bps <= policy.max_exposure_bps, exposure_bps)
    }

    /// Whitelist a protocol (or refresh its entry). Admin only.
    pub fn whitelist_protocol(e: Env, venue: Address, risk_score: u32) -> Result<(), Error> {
        require_admin(&e)?;
        if !(MIN_RISK_SCORE..=MAX_RISK_SCORE).contains(&risk_score) {
            return Err(Error::InvalidRiskScore);
        }
        let info = ProtocolInfo {
            whitelisted: true,
            risk_score,
        };
        e.storage()
            .instance()
            .set(&DataKey::Protocol(venue.clone()), &info);
        e.events().publish(
            (Symbol::new(&e, "protocol_whitelisted"), venue),
            risk_score,
        );
        Ok(())
    }

    /// Drop a protocol from the registry. Admin only.
    pub fn remove_protocol(e: Env, venue: Address) -> Result<(), Error> {
        require_admin(&e)?;
        if read_protocol(&e, &venue).is_none() {
            return Err(Error::ProtocolNotFound);
        }
        e.storage()
            .instance()
            .remove(&DataKey::Protocol(venue.clone()));
        e.events()
            .publish((Symbol::new(&e, "protocol_removed"), venue), ());
        Ok(())
    }

    /// Update the risk score of a registered protocol. Admin only.
    pub fn update_risk_score(e: Env, venue: Address, risk_score: u32) -> Result<(), Error> {
        require_admin(&e)?;
        if !(MIN_RISK_SCORE..=MAX_RISK_SCORE).contains(&risk_score) {
            return Err(Error::InvalidRiskScore);
        }
        let mut info = read_protocol(&e, &venue).ok_or(Error::ProtocolNotFound)?;
        info.risk_score = risk_score;
        e.storage()
            .instance()
            .set(&DataKey::Protocol(venue.clone()), &info);
        e.events()
            .publish((Symbol::new(&e, "risk_score_updated"), venue), risk_score);
        Ok(())
    }

    /// Soft pause: deactivates the account's policy but leaves it free to
    /// call `create_policy` again (self-recovering). Admin only.
    pub fn emergency_pause(e: Env, account: Address, reason: String) -> Result<(), Error> {
        require_admin(&e)?;
        let mut policy = read_policy(&e, &account).ok_or(Error::NoActivePolicy)?;
        policy.active = false;
        e.storage()
            .instance()
            .set(&DataKey::Policy(account.clone()), &policy);
        e.events()
            .publish((Symbol::new(&e, "account_paused"), account), reason);
        Ok(())
    }

    /// Hard block: deactivates the policy (if any) and sets the blacklist
    /// flag, which independently blocks `create_policy` until an admin
    /// calls `unblacklist_user`. Admin only.
    pub fn blacklist_user(e: Env, account: Address, reason: String) -> Result<(), Error> {
        require_admin(&e)?;
        e.storage()
            .instance()
            .set(&DataKey::Blacklist(account.clone()), &true);
        if let Some(mut policy) = read_policy(&e, &account) {
            policy.active = false;
            e.storage()
                .instance()
                .set(&DataKey::Policy(account.clone()), &policy);
        }
        e.events()
            .publish((Symbol::new(&e, "account_blacklisted"), account), reason);
        Ok(())
    }

    /// Clear the blacklist flag. The account must still recreate its
    /// policy afterwards. Admin only.
    pub fn unblacklist_user(e: Env, account: Address) -> Result<(), Error> {
        require_admin(&e)?;
        e.storage()
            .instance()
            .remove(&DataKey::Blacklist(account.clone()));
        e.events()
            .publish((Symbol::new(&e, "account_unblacklisted"), account), ());
        Ok(())
    }

    /// Grant allowance-consuming rights (the router, venue adapters).
    pub fn authorize_caller(e: Env, caller: Address) -> Result<(), Error> {
        require_admin(&e)?;
        e.storage()
            .instance()
            .set(&DataKey::AuthorizedCaller(caller.clone()), &true);
        e.events()
            .publish((Symbol::new(&e, "caller_authorized"), caller), ());
        Ok(())
    }

    pub fn revoke_caller(e: Env, caller: Address) -> Result<(), Error> {
        require_admin(&e)?;
        e.storage()
            .instance()
            .remove(&DataKey::AuthorizedCaller(caller.clone()));
        e.events()
            .publish((Symbol::new(&e, "caller_revoked"), caller), ());
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

    pub fn get_policy(e: Env, account: Address) -> Result<Policy, Error> {
        read_policy(&e, &account).ok_or(Error::NoActivePolicy)
    }

    /// Allowance left in the current window. Reports the full limit once
    /// the window has rolled over, even before the lazy reset is persisted.
    pub fn get_remaining_daily_limit(e: Env, account: Address) -> i128 {
        let policy = match read_policy(&e, &account) {
            Some(p) if p.active => p,
            _ => return 0,
        };
        let now = e.ledger().timestamp();
        let rolled = match policy.window_start.checked_add(SECONDS_PER_DAY) {
            Some(window_end) => now >= window_end,
            None => true,
        };
        if rolled {
            policy.daily_limit
        } else {
            // A lowered limit may sit below spend already accrued this
            // window; report zero headroom, not a negative number.
            (policy.daily_limit - policy.daily_spent).max(0)
        }
    }

    pub fn get_exposure(e: Env, account: Address, venue: Address) -> i128 {
        e.storage()
            .instance()
            .get(&DataKey::Exposure(account, venue))
            .unwrap_or(0)
    }

    pub fn is_blacklisted(e: Env, account: Address) -> bool {
        read_blacklist(&e, &account)
    }

    pub fn is_whitelisted(e: Env, venue: Address) -> bool {
        read_protocol(&e, &venue).map_or(false, |p| p.whitelisted)
    }

    pub fn get_risk_score(e: Env, venue: Address) -> u32 {
        read_protocol(&e, &venue).map_or(0, |p| p.risk_score)
    }

    pub fn is_authorized_caller(e: Env, caller: Address) -> bool {
        e.storage()
            .instance()
            .get(&DataKey::AuthorizedCaller(caller))
            .unwrap_or(false)
    }

    pub fn get_admin(e: Env) -> Result<Address, Error> {
        e.storage()
            .instance()
            .get(&DataKey::Admin)
            .ok_or(Error::NotInitialized)
    }
}

fn validate_policy_params(
    daily_limit: i128,
    max_exposure_bps: u32,
    max_risk_score: u32,
) -> Result<(), Error> {
    if daily_limit <= 0 {
        return Err(Error::InvalidDailyLimit);
    }
    if max_exposure_bps > MAX_BPS {
        return Err(Error::InvalidExposureLimit);
    }
    if !(MIN_RISK_SCORE..=MAX_RISK_SCORE).contains(&max_risk_score) {
        return Err(Error::InvalidRiskScore);
    }
    Ok(())
}

fn read_policy(e: &Env, account: &Address) -> Option<Policy> {
    e.storage().instance().get(&DataKey::Policy(account.clone()))
}

fn read_active_policy(e: &Env, account: &Address) -> Result<Policy, Error> {
    match read_policy(e, account) {
        Some(p) if p.active => Ok(p),
        _ => Err(Error::NoActivePolicy),
    }
}

fn read_blacklist(e: &Env, account: &Address) -> bool {
    e.storage()
        .instance()
        .get(&DataKey::Blacklist(account.clone()))
        .unwrap_or(false)
}

fn read_protocol(e: &Env, venue: &Address) -> Option<ProtocolInfo> {
    e.storage().instance().get(&DataKey::Protocol(venue.clone()))
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

fn require_authorized_caller(e: &Env, caller: &Address) -> Result<(), Error> {
    let authorized: bool = e
        .storage()
        .instance()
        .get(&DataKey::AuthorizedCaller(caller.clone()))
        .unwrap_or(false);
    if !authorized {
        return Err(Error::NotRouter);
    }
    Ok(())
}

fn emit_blocked(e: &Env, account: &Address, venue: &Address, amount: i128, reason: &str) {
    e.events().publish(
        (
            Symbol::new(e, "transfer_blocked"),
            account.clone(),
            venue.clone(),
        ),
        (amount, Symbol::new(e, reason)),
    );
}


#[cfg(test)]
mod test_daily_limit;

#[cfg(test)]
mod test_blacklist;

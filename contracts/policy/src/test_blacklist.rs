#![cfg(test)]
//! Two-tier deactivation: soft pause is self-healing, blacklist is an
//! admin-only-reversible hard block that dominates policy creation.

use super::*;
use soroban_sdk::testutils::Address as _;
use soroban_sdk::{Env, String};

fn setup(e: &Env) -> (PolicyEngineClient<'_>, Address) {
    let admin = Address::generate(e);
    let contract_id = e.register(PolicyEngine, ());
    let client = PolicyEngineClient::new(e, &contract_id);
    client.initialize(&admin);
    let account = Address::generate(e);
    client.create_policy(&account, &1000, &5000, &5, &false);
    (client, account)
}

#[test]
fn test_pause_is_self_healing() {
    let e = Env::default();
    e.mock_all_auths();
    let (client, account) = setup(&e);

    client.emergency_pause(&account, &String::from_str(&e, "ops hold"));
    assert!(!client.get_policy(&account).active);

    // The account recovers on its own by recreating the policy.
    client.create_policy(&account, &500, &3000, &3, &true);
    let policy = client.get_policy(&account);
    assert!(policy.active);
    assert_eq!(policy.daily_limit, 500);
}

#[test]
fn test_blacklist_deactivates_and_blocks_recreation() {
    let e = Env::default();
    e.mock_all_auths();
    let (client, account) = setup(&e);

    client.blacklist_user(&account, &String::from_str(&e, "confirmed abuse"));
    assert!(client.is_blacklisted(&account));
    assert!(!client.get_policy(&account).active);

    let res = client.try_create_policy(&account, &1000, &5000, &5, &false);
    assert_eq!(res, Err(Ok(Error::Blacklisted)));
}

#[test]
fn test_blacklist_dominates_intervening_attempts() {
    let e = Env::default();
    e.mock_all_auths();
    let (client, account) = setup(&e);

    client.blacklist_user(&account, &String::from_str(&e, "confirmed abuse"));

    // A pause in between changes nothing about the hard block.
    let _ = client.try_emergency_pause(&account, &String::from_str(&e, "again"));
    for _ in 0..3 {
        let res = client.try_create_policy(&account, &1000, &5000, &5, &false);
        assert_eq!(res, Err(Ok(Error::Blacklisted)));
    }

    client.unblacklist_user(&account);
    client.create_policy(&account, &1000, &5000, &5, &false);
    assert!(client.get_policy(&account).active);
}

#[test]
fn test_blacklisted_account_cannot_update() {
    let e = Env::default();
    e.mock_all_auths();
    let (client, account) = setup(&e);

    client.blacklist_user(&account, &String::from_str(&e, "confirmed abuse"));
    let res = client.try_update_policy(&account, &2000, &5000, &5, &false);
    assert_eq!(res, Err(Ok(Error::Blacklisted)));
}

#[test]
fn test_blacklisted_account_fails_validate_transfer() {
    let e = Env::default();
    e.mock_all_auths();
    let (client, account) = setup(&e);

    let router = Address::generate(&e);
    client.authorize_caller(&router);
    client.blacklist_user(&account, &String::from_str(&e, "confirmed abuse"));

    let res = client.try_validate_transfer(&router, &account, &Address::generate(&e), &100);
    assert_eq!(res, Err(Ok(Error::Blacklisted)));
}

#[test]
fn test_paused_account_fails_validate_with_no_active_policy() {
    let e = Env::default();
    e.mock_all_auths();
    let (client, account) = setup(&e);

    let router = Address::generate(&e);
    client.authorize_caller(&router);
    client.emergency_pause(&account, &String::from_str(&e, "ops hold"));

    let res = client.try_validate_transfer(&router, &account, &Address::generate(&e), &100);
    assert_eq!(res, Err(Ok(Error::NoActivePolicy)));
}

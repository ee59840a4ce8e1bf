// src/accounts.rs
use crate::models::User;

/// The fixed demo accounts. Plaintext passwords on purpose: these are
/// throwaway logins with no real users behind them.
pub fn demo_accounts() -> Vec<User> {
    vec![
        User {
            id: "user1".to_string(),
            email: "demo@robinhood.com".to_string(),
            password: "demo123".to_string(),
            first_name: "John".to_string(),
            last_name: "Doe".to_string(),
            balance: 12500.75,
        },
        User {
            id: "user2".to_string(),
            email: "test@example.com".to_string(),
            password: "test123".to_string(),
            first_name: "Jane".to_string(),
            last_name: "Smith".to_string(),
            balance: 8743.20,
        },
        User {
            id: "user3".to_string(),
            email: "trader@demo.com".to_string(),
            password: "trader123".to_string(),
            first_name: "Alex".to_string(),
            last_name: "Johnson".to_string(),
            balance: 45678.90,
        },
    ]
}

/// Login lookup; email matching is case-insensitive.
pub fn find_by_email<'a>(accounts: &'a [User], email: &str) -> Option<&'a User> {
    accounts
        .iter()
        .find(|account| account.email.eq_ignore_ascii_case(email))
}

pub fn find_by_id<'a>(accounts: &'a [User], id: &str) -> Option<&'a User> {
    accounts.iter().find(|account| account.id == id)
}

pub fn find_by_id_mut<'a>(accounts: &'a mut [User], id: &str) -> Option<&'a mut User> {
    accounts.iter_mut().find(|account| account.id == id)
}

// src/auth.rs
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

const SECRET_KEY: &str = "paper_trader_demo_secret";

#[derive(Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: usize,
}

/// Session cookie lifetime in seconds: 30 days with "keep me logged in",
/// one day otherwise.
pub fn session_max_age(keep_logged_in: bool) -> i64 {
    if keep_logged_in {
        30 * 24 * 60 * 60
    } else {
        24 * 60 * 60
    }
}

// Function to create a JWT session token
pub fn create_token(user_id: &str, max_age_secs: i64) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (Utc::now() + Duration::seconds(max_age_secs)).timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET_KEY.as_ref()),
    )
    .unwrap()
}

/// Verify a session token, returning the user id it was issued for.
pub fn verify_token(token: &str) -> Option<String> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(SECRET_KEY.as_ref()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims.sub)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trips_user_id() {
        let token = create_token("user1", session_max_age(false));
        assert_eq!(verify_token(&token), Some("user1".to_string()));
    }

    #[test]
    fn tampered_token_is_rejected() {
        let mut token = create_token("user1", 3600);
        token.push('x');
        assert_eq!(verify_token(&token), None);
        assert_eq!(verify_token("not-a-token"), None);
    }

    #[test]
    fn expired_token_is_rejected() {
        // Expiry far enough in the past to clear the default leeway.
        let token = create_token("user1", -3600);
        assert_eq!(verify_token(&token), None);
    }
}

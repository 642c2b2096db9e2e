use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey,
                   Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{unauthorized, AppErr, AppResult};

pub const TOKEN_TTL_SECS: i64 = 3_600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub:      i64,
    pub username: String,
    pub iat:      i64,
    pub exp:      i64,
}

pub fn sign(uid: i64, username: &str, secret: &str) -> AppResult<String> {
    let now = Utc::now().timestamp();
    let c = Claims { sub: uid, username: username.into(), iat: now, exp: now + TOKEN_TTL_SECS };
    encode(&Header::default(), &c, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| AppErr::Internal(format!("sign token: {e}")))
}

/// The auth verifier: token → identity, or Unauthorized.
pub fn verify(token: &str, secret: &str) -> AppResult<Claims> {
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()),
                     &Validation::new(Algorithm::HS256))
        .map(|d| d.claims)
        .map_err(unauthorized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify() {
        let t = sign(42, "alice", "s3cret").unwrap();
        let c = verify(&t, "s3cret").unwrap();
        assert_eq!((c.sub, c.username.as_str()), (42, "alice"));
    }

    #[test]
    fn wrong_secret_is_unauthorized() {
        let t = sign(1, "bob", "one").unwrap();
        assert!(matches!(verify(&t, "two"), Err(AppErr::Unauthorized(_))));
        assert!(matches!(verify("not.a.jwt", "one"), Err(AppErr::Unauthorized(_))));
    }
}

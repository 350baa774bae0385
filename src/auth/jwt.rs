use crate::models::{Claims, TokenType};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::Error};
use uuid::Uuid;

/// Identity baked into both tokens of a pair.
#[derive(Debug, Clone)]
pub struct TokenSubject {
    pub user_id: u64,
    pub email: String,
    pub roles: Vec<String>,
    pub business_id: Option<u64>,
}

fn now() -> usize {
    Utc::now().timestamp().max(0) as usize
}

fn build_claims(subject: &TokenSubject, token_type: TokenType, ttl: usize) -> Claims {
    Claims {
        user_id: subject.user_id,
        sub: subject.email.clone(),
        roles: subject.roles.clone(),
        exp: now() + ttl,
        jti: Uuid::new_v4().to_string(),
        token_type,
        business_id: subject.business_id,
    }
}

pub fn generate_access_token(
    subject: &TokenSubject,
    secret: &str,
    ttl: usize,
) -> Result<String, Error> {
    let claims = build_claims(subject, TokenType::Access, ttl);

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

pub fn generate_refresh_token(
    subject: &TokenSubject,
    secret: &str,
    ttl: usize,
) -> Result<(String, Claims), Error> {
    let claims = build_claims(subject, TokenType::Refresh, ttl);

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok((token, claims))
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, String> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> TokenSubject {
        TokenSubject {
            user_id: 42,
            email: "manager@acme.test".into(),
            roles: vec!["manager".into()],
            business_id: Some(7),
        }
    }

    #[test]
    fn access_token_verifies_with_same_secret() {
        let token = generate_access_token(&subject(), "s3cret", 60).unwrap();
        let claims = verify_token(&token, "s3cret").unwrap();

        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.sub, "manager@acme.test");
        assert_eq!(claims.roles, vec!["manager".to_string()]);
        assert_eq!(claims.business_id, Some(7));
        assert_eq!(claims.token_type, TokenType::Access);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = generate_access_token(&subject(), "s3cret", 60).unwrap();
        assert!(verify_token(&token, "other").is_err());
    }

    #[test]
    fn refresh_token_returns_matching_claims() {
        let (token, claims) = generate_refresh_token(&subject(), "s3cret", 60).unwrap();
        let decoded = verify_token(&token, "s3cret").unwrap();

        assert_eq!(decoded.jti, claims.jti);
        assert_eq!(decoded.token_type, TokenType::Refresh);
    }

    #[test]
    fn every_token_gets_a_fresh_jti() {
        let (_, a) = generate_refresh_token(&subject(), "s3cret", 60).unwrap();
        let (_, b) = generate_refresh_token(&subject(), "s3cret", 60).unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn expired_token_is_rejected() {
        let mut claims = build_claims(&subject(), TokenType::Access, 0);
        // past the default 60s leeway
        claims.exp = now() - 3600;
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"s3cret"),
        )
        .unwrap();

        assert!(verify_token(&token, "s3cret").is_err());
    }
}

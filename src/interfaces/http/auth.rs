//! Authentication extractor for the HTTP surface (spec §6.2). A bearer token
//! is distinguished by shape: a 64-character token with no `.` is treated as
//! a static API key; anything else is parsed as a JWT.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::RequestPartsExt;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const JWT_ISSUER: &str = "aifx-v2";
const JWT_AUDIENCE: &str = "aifx-v2-users";
const API_KEY_LEN: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    fn new(subscriber_id: Uuid, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub: subscriber_id,
            iss: JWT_ISSUER.to_string(),
            aud: JWT_AUDIENCE.to_string(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        }
    }
}

pub fn issue_access_token(subscriber_id: Uuid, secret: &str) -> anyhow::Result<String> {
    issue_token(subscriber_id, secret, Duration::hours(1))
}

pub fn issue_refresh_token(subscriber_id: Uuid, secret: &str) -> anyhow::Result<String> {
    issue_token(subscriber_id, secret, Duration::days(30))
}

fn issue_token(subscriber_id: Uuid, secret: &str, ttl: Duration) -> anyhow::Result<String> {
    let claims = Claims::new(subscriber_id, ttl);
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

/// Identity established for a request, either from a static API key or a verified JWT.
#[derive(Debug, Clone, Copy)]
pub enum Identity {
    ApiKey,
    Subscriber(Uuid),
}

pub struct AuthState {
    pub jwt_secret: String,
    pub api_key: Option<String>,
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
    AuthState: axum::extract::FromRef<S>,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_state = AuthState::from_ref(state);
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| (StatusCode::UNAUTHORIZED, "missing bearer token"))?;

        authenticate(bearer.token(), &auth_state).map_err(|_| (StatusCode::UNAUTHORIZED, "invalid credentials"))
    }
}

fn authenticate(token: &str, state: &AuthState) -> anyhow::Result<Identity> {
    if is_api_key_shaped(token) {
        match &state.api_key {
            Some(expected) if constant_time_eq(expected, token) => return Ok(Identity::ApiKey),
            Some(_) => anyhow::bail!("api key mismatch"),
            None => anyhow::bail!("api key auth not configured"),
        }
    }

    let mut validation = Validation::default();
    validation.set_issuer(&[JWT_ISSUER]);
    validation.set_audience(&[JWT_AUDIENCE]);

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &validation,
    )?;
    Ok(Identity::Subscriber(data.claims.sub))
}

fn is_api_key_shaped(token: &str) -> bool {
    token.len() == API_KEY_LEN && !token.contains('.')
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_shape_requires_exact_length_and_no_dot() {
        assert!(is_api_key_shaped(&"a".repeat(64)));
        assert!(!is_api_key_shaped(&"a".repeat(63)));
        assert!(!is_api_key_shaped("header.payload.signature"));
    }

    #[test]
    fn issued_access_token_round_trips() {
        let subscriber_id = Uuid::new_v4();
        let secret = "test-secret";
        let token = issue_access_token(subscriber_id, secret).unwrap();
        let state = AuthState {
            jwt_secret: secret.to_string(),
            api_key: None,
        };
        match authenticate(&token, &state).unwrap() {
            Identity::Subscriber(id) => assert_eq!(id, subscriber_id),
            Identity::ApiKey => panic!("expected subscriber identity"),
        }
    }

    #[test]
    fn matching_api_key_authenticates() {
        let key = "b".repeat(64);
        let state = AuthState {
            jwt_secret: "secret".into(),
            api_key: Some(key.clone()),
        };
        assert!(matches!(authenticate(&key, &state).unwrap(), Identity::ApiKey));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let subscriber_id = Uuid::new_v4();
        let token = issue_access_token(subscriber_id, "right-secret").unwrap();
        let state = AuthState {
            jwt_secret: "wrong-secret".into(),
            api_key: None,
        };
        assert!(authenticate(&token, &state).is_err());
    }
}

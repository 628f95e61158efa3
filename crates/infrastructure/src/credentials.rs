//! JWT credentials for evaluation workers and API callers

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use judge_core::{JudgeError, JudgeResult};
use judge_domain::ports::{Identity, TokenIssuer};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub username: String,
    pub exp: i64,
    pub iat: i64,
    pub nbf: i64,
}

/// HS256 token issuer sharing one secret for issuing and verifying
pub struct JwtTokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration_hours: i64,
}

impl JwtTokenIssuer {
    pub fn new(secret: &str, expiration_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_ref()),
            decoding_key: DecodingKey::from_secret(secret.as_ref()),
            expiration_hours,
        }
    }

    pub fn decode_claims(&self, token: &str) -> JudgeResult<Claims> {
        let validation = Validation::new(Algorithm::HS256);
        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| JudgeError::Credential(e.to_string()))?;
        Ok(token_data.claims)
    }
}

impl TokenIssuer for JwtTokenIssuer {
    fn issue(&self, user_id: i64, username: &str) -> JudgeResult<String> {
        let now = Utc::now();
        let exp = now + Duration::hours(self.expiration_hours);

        let claims = Claims {
            user_id,
            username: username.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| JudgeError::Credential(format!("failed to generate auth token: {e}")))
    }

    fn verify(&self, token: &str) -> JudgeResult<Identity> {
        let claims = self.decode_claims(token)?;
        Ok(Identity {
            user_id: claims.user_id,
            username: claims.username,
        })
    }
}

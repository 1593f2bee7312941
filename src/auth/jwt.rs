use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chat::chat_models::ChatUser;
use crate::error::{AppError, Result};

/// Token claims issued by the identity provider. Besides the user id they
/// carry the display snapshot (nickname, avatar) that gets denormalized
/// onto participant and message rows.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub nickname: String,
    pub avatar_url: Option<String>,
    pub exp: i64,
}

impl Claims {
    pub fn chat_user(&self) -> Result<ChatUser> {
        let id = Uuid::parse_str(&self.sub)
            .map_err(|_| AppError::Unauthorized("Invalid token".to_string()))?;
        Ok(ChatUser {
            id,
            nickname: self.nickname.clone(),
            avatar_url: self.avatar_url.clone(),
        })
    }
}

pub fn create_jwt(user: &ChatUser, secret: &str, expiration_hours: i64) -> Result<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(expiration_hours))
        .ok_or_else(|| AppError::Internal("Token expiry out of range".to_string()))?
        .timestamp();

    let claims = Claims {
        sub: user.id.to_string(),
        nickname: user.nickname.clone(),
        avatar_url: user.avatar_url.clone(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| AppError::Internal("Failed to create token".to_string()))
}

pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized("Invalid credentials".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> ChatUser {
        ChatUser {
            id: Uuid::new_v4(),
            nickname: "ada".to_string(),
            avatar_url: Some("https://example.com/a.png".to_string()),
        }
    }

    #[test]
    fn round_trips_claims() {
        let user = user();
        let token = create_jwt(&user, "secret", 1).unwrap();
        let claims = verify_jwt(&token, "secret").unwrap();
        let decoded = claims.chat_user().unwrap();
        assert_eq!(decoded.id, user.id);
        assert_eq!(decoded.nickname, "ada");
    }

    #[test]
    fn rejects_wrong_secret() {
        let token = create_jwt(&user(), "secret", 1).unwrap();
        assert!(verify_jwt(&token, "other").is_err());
    }
}

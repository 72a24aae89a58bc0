//! Actor identity and JWT claims
//!
//! Users are owned by the identity provider. The circulation core only needs
//! who is calling and with which role.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::enums::Role;
use crate::error::AppError;

/// Caller of a circulation operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Actor {
    pub id: i32,
    pub role: Role,
}

impl Actor {
    pub fn member(id: i32) -> Self {
        Self { id, role: Role::Member }
    }

    pub fn librarian(id: i32) -> Self {
        Self { id, role: Role::Librarian }
    }

    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }

    pub fn require_staff(&self) -> Result<(), AppError> {
        if self.is_staff() {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "Actor {} ({}) lacks staff privileges",
                self.id, self.role
            )))
        }
    }
}

/// JWT Claims issued by the identity provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    pub sub: String,
    pub user_id: i32,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

impl UserClaims {
    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    pub fn actor(&self) -> Actor {
        Actor {
            id: self.user_id,
            role: self.role,
        }
    }
}

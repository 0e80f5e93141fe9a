use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use models::{User, UserRole};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::{config::AppState, error::Error};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: UserRole,
    #[serde(rename = "centreId")]
    pub centre_id: Option<String>,
    pub exp: u64,
}

/// Verified caller identity, injected as a request extension.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: ObjectId,
    pub role: UserRole,
    pub centre_id: Option<ObjectId>,
}

impl TryFrom<Claims> for AuthUser {
    type Error = Error;

    fn try_from(claims: Claims) -> Result<Self, Error> {
        let user_id = ObjectId::parse_str(&claims.sub)
            .map_err(|_| Error::Unauthorized("token subject is not a valid id".to_string()))?;
        let centre_id = match claims.centre_id {
            Some(hex) => Some(ObjectId::parse_str(&hex).map_err(|_| {
                Error::Unauthorized("token centre is not a valid id".to_string())
            })?),
            None => None,
        };

        Ok(AuthUser {
            user_id,
            role: claims.role,
            centre_id,
        })
    }
}

impl AuthUser {
    pub fn require_admin(&self) -> Result<(), Error> {
        if self.role == UserRole::Admin {
            Ok(())
        } else {
            Err(Error::Forbidden("requires the Admin role".to_string()))
        }
    }

    /// Admin may touch any centre; scoped callers only their own.
    pub fn check_centre(&self, centre_id: &ObjectId) -> Result<(), Error> {
        match (&self.role, &self.centre_id) {
            (UserRole::Admin, _) => Ok(()),
            (_, Some(own)) if own == centre_id => Ok(()),
            _ => Err(Error::Forbidden(
                "not permitted for this study centre".to_string(),
            )),
        }
    }

    /// Resolves the centre filter of a list request: Admin passes the
    /// requested filter through, scoped callers are pinned to their own
    /// centre.
    pub fn centre_filter(&self, requested: Option<ObjectId>) -> Result<Option<ObjectId>, Error> {
        match (&self.role, self.centre_id) {
            (UserRole::Admin, _) => Ok(requested),
            (_, Some(own)) => match requested {
                Some(r) if r != own => Err(Error::Forbidden(
                    "not permitted for this study centre".to_string(),
                )),
                _ => Ok(Some(own)),
            },
            (_, None) => Err(Error::Forbidden(
                "centre-scoped user has no centre assigned".to_string(),
            )),
        }
    }
}

pub fn issue_token(user: &User, secret: &str, expiry_in_s: u64) -> Result<String, Error> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| Error::Server(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:?}")))?
        .as_secs();

    let claims = Claims {
        sub: user.id.to_hex(),
        role: user.role.clone(),
        centre_id: user.centre_id.map(|id| id.to_hex()),
        exp: now + expiry_in_s,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, Error> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| Error::Unauthorized("missing bearer token".to_string()))?;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.env_vars.jwt_secret.as_bytes()),
        &Validation::default(),
    )?;

    let auth_user = AuthUser::try_from(data.claims)?;
    req.extensions_mut().insert(auth_user);

    Ok(next.run(req).await)
}

use axum::{Json, extract::State};
use models::{User, UserRole, db};
use mongodb::bson::doc;
use serde::{Deserialize, Serialize};

use crate::{auth, config::AppState, error::Error};

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
    pub role: UserRole,
    pub centre_id: Option<String>,
}

pub async fn post_login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, Error> {
    let users = db::get_collection::<User>(&state.mongo, "User");

    // Unknown user and wrong password are indistinguishable to the caller.
    let user = users
        .find_one(doc! {"username": &body.username})
        .await?
        .ok_or_else(|| Error::Unauthorized("invalid username or password".to_string()))?;

    if !bcrypt::verify(&body.password, &user.password_hash)? {
        return Err(Error::Unauthorized(
            "invalid username or password".to_string(),
        ));
    }

    let token = auth::issue_token(
        &user,
        &state.env_vars.jwt_secret,
        state.env_vars.token_expiry_in_s,
    )?;

    tracing::info!(user = %user.id, "user logged in");

    Ok(Json(LoginResponse {
        token,
        username: user.username,
        role: user.role,
        centre_id: user.centre_id.map(|id| id.to_hex()),
    }))
}

use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
};
use futures_util::TryStreamExt;
use models::{StudyCentre, User, UserRole, db};
use mongodb::bson::{DateTime, doc, oid::ObjectId};
use serde::{Deserialize, Serialize};

use super::parse_object_id;
use crate::{auth::AuthUser, config::AppState, error::Error};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRequest {
    pub username: String,
    pub password: String,
    pub role: UserRole,
    pub centre_id: Option<String>,
}

/// The password hash never leaves the database.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub role: UserRole,
    pub centre_id: Option<String>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: user.id.to_hex(),
            username: user.username,
            role: user.role,
            centre_id: user.centre_id.map(|id| id.to_hex()),
        }
    }
}

pub async fn post_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<UserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), Error> {
    auth.require_admin()?;

    let username = body.username.trim().to_string();
    if username.is_empty() {
        return Err(Error::Unprocessable("username must not be empty".to_string()));
    }
    if body.password.len() < 8 {
        return Err(Error::Unprocessable(
            "password must be at least 8 characters".to_string(),
        ));
    }

    let centre_id = match (&body.role, &body.centre_id) {
        (UserRole::Admin, _) => None,
        (_, Some(raw)) => {
            let centre_id = parse_object_id(raw)?;
            let centres = db::get_collection::<StudyCentre>(&state.mongo, "StudyCentre");
            if centres.find_one(doc! {"_id": centre_id}).await?.is_none() {
                return Err(Error::Unprocessable(format!(
                    "no centre with id {centre_id}"
                )));
            }
            Some(centre_id)
        }
        (_, None) => {
            return Err(Error::Unprocessable(
                "centre-scoped roles require a centreId".to_string(),
            ));
        }
    };

    let users = db::get_collection::<User>(&state.mongo, "User");
    if users
        .find_one(doc! {"username": &username})
        .await?
        .is_some()
    {
        return Err(Error::Conflict(format!(
            "username {username} already exists"
        )));
    }

    let user = User {
        id: ObjectId::new(),
        username,
        password_hash: bcrypt::hash(&body.password, bcrypt::DEFAULT_COST)?,
        role: body.role,
        centre_id,
        created_at: DateTime::now(),
    };
    users.insert_one(&user).await?;

    Ok((StatusCode::CREATED, Json(user.into())))
}

pub async fn get_users(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<UserResponse>>, Error> {
    auth.require_admin()?;

    let users = db::get_collection::<User>(&state.mongo, "User");
    let all: Vec<User> = users
        .find(doc! {})
        .sort(doc! {"username": 1})
        .await?
        .try_collect()
        .await?;

    Ok(Json(all.into_iter().map(UserResponse::from).collect()))
}

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use futures_util::TryStreamExt;
use models::{Message, StudyCentre, UserRole, db};
use mongodb::bson::{DateTime, doc, oid::ObjectId};
use serde::Deserialize;

use super::parse_object_id;
use crate::{auth::AuthUser, config::AppState, error::Error};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRequest {
    pub title: String,
    pub body: String,
    /// Absent broadcasts to all centres.
    pub centre_id: Option<String>,
}

pub async fn post_message(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<MessageRequest>,
) -> Result<(StatusCode, Json<Message>), Error> {
    auth.require_admin()?;

    if body.title.trim().is_empty() {
        return Err(Error::Unprocessable(
            "message title must not be empty".to_string(),
        ));
    }

    let centre_id = match &body.centre_id {
        Some(raw) => {
            let centre_id = parse_object_id(raw)?;
            let centres = db::get_collection::<StudyCentre>(&state.mongo, "StudyCentre");
            if centres.find_one(doc! {"_id": centre_id}).await?.is_none() {
                return Err(Error::Unprocessable(format!(
                    "no centre with id {centre_id}"
                )));
            }
            Some(centre_id)
        }
        None => None,
    };

    let message = Message {
        id: ObjectId::new(),
        title: body.title,
        body: body.body,
        centre_id,
        sender_id: auth.user_id,
        sent_at: DateTime::now(),
    };
    let messages = db::get_collection::<Message>(&state.mongo, "Message");
    messages.insert_one(&message).await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// Admin sees everything; centre-scoped callers see broadcasts plus their
/// own centre's messages, newest first.
pub async fn get_messages(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<Message>>, Error> {
    let filter = match (&auth.role, auth.centre_id) {
        (UserRole::Admin, _) => doc! {},
        (_, Some(centre_id)) => doc! {
            "$or": [
                {"centreId": null},
                {"centreId": centre_id},
            ]
        },
        (_, None) => doc! {"centreId": null},
    };

    let messages = db::get_collection::<Message>(&state.mongo, "Message");
    let found: Vec<Message> = messages
        .find(filter)
        .sort(doc! {"sentAt": -1})
        .await?
        .try_collect()
        .await?;
    Ok(Json(found))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<StatusCode, Error> {
    auth.require_admin()?;
    let id = parse_object_id(&id)?;

    let messages = db::get_collection::<Message>(&state.mongo, "Message");
    let result = messages.delete_one(doc! {"_id": id}).await?;
    if result.deleted_count == 0 {
        return Err(Error::NotFound(format!("no message with id {id}")));
    }

    Ok(StatusCode::NO_CONTENT)
}

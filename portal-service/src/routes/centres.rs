use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use futures_util::TryStreamExt;
use models::{Student, StudyCentre, db};
use mongodb::bson::{doc, oid::ObjectId};
use serde::Deserialize;

use super::parse_object_id;
use crate::{auth::AuthUser, config::AppState, error::Error};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CentreRequest {
    pub code: String,
    pub name: String,
    pub address: String,
    pub district: String,
    pub phone: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

pub async fn post_centre(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<CentreRequest>,
) -> Result<(StatusCode, Json<StudyCentre>), Error> {
    auth.require_admin()?;

    let code = body.code.trim().to_uppercase();
    if code.is_empty() {
        return Err(Error::Unprocessable(
            "centre code must not be empty".to_string(),
        ));
    }

    let centres = db::get_collection::<StudyCentre>(&state.mongo, "StudyCentre");
    if centres.find_one(doc! {"code": &code}).await?.is_some() {
        return Err(Error::Conflict(format!("centre code {code} already exists")));
    }

    let centre = StudyCentre {
        id: ObjectId::new(),
        code,
        name: body.name,
        address: body.address,
        district: body.district,
        phone: body.phone,
        active: body.active,
    };
    centres.insert_one(&centre).await?;

    Ok((StatusCode::CREATED, Json(centre)))
}

pub async fn get_centres(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthUser>,
) -> Result<Json<Vec<StudyCentre>>, Error> {
    let centres = db::get_collection::<StudyCentre>(&state.mongo, "StudyCentre");
    let all: Vec<StudyCentre> = centres
        .find(doc! {})
        .sort(doc! {"code": 1})
        .await?
        .try_collect()
        .await?;
    Ok(Json(all))
}

pub async fn get_centre(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<StudyCentre>, Error> {
    let id = parse_object_id(&id)?;
    let centres = db::get_collection::<StudyCentre>(&state.mongo, "StudyCentre");
    let centre = centres
        .find_one(doc! {"_id": id})
        .await?
        .ok_or_else(|| Error::NotFound(format!("no centre with id {id}")))?;
    Ok(Json(centre))
}

pub async fn put_centre(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<CentreRequest>,
) -> Result<Json<StudyCentre>, Error> {
    auth.require_admin()?;
    let id = parse_object_id(&id)?;

    let code = body.code.trim().to_uppercase();
    if code.is_empty() {
        return Err(Error::Unprocessable(
            "centre code must not be empty".to_string(),
        ));
    }

    let centres = db::get_collection::<StudyCentre>(&state.mongo, "StudyCentre");
    if centres
        .find_one(doc! {"code": &code, "_id": {"$ne": id}})
        .await?
        .is_some()
    {
        return Err(Error::Conflict(format!("centre code {code} already exists")));
    }

    let updated = centres
        .find_one_and_update(
            doc! {"_id": id},
            doc! {"$set": {
                "code": &code,
                "name": &body.name,
                "address": &body.address,
                "district": &body.district,
                "phone": &body.phone,
                "active": body.active,
            }},
        )
        .return_document(mongodb::options::ReturnDocument::After)
        .await?
        .ok_or_else(|| Error::NotFound(format!("no centre with id {id}")))?;

    Ok(Json(updated))
}

pub async fn delete_centre(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<StatusCode, Error> {
    auth.require_admin()?;
    let id = parse_object_id(&id)?;

    let students = db::get_collection::<Student>(&state.mongo, "Student");
    let enrolled = students.count_documents(doc! {"centreId": id}).await?;
    if enrolled > 0 {
        return Err(Error::Conflict(format!(
            "centre has {enrolled} enrolled students; deactivate it instead"
        )));
    }

    let centres = db::get_collection::<StudyCentre>(&state.mongo, "StudyCentre");
    let result = centres.delete_one(doc! {"_id": id}).await?;
    if result.deleted_count == 0 {
        return Err(Error::NotFound(format!("no centre with id {id}")));
    }

    Ok(StatusCode::NO_CONTENT)
}

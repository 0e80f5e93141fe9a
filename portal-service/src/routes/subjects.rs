use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use futures_util::TryStreamExt;
use models::{CceMark, SaMark, Subject, db};
use mongodb::bson::{doc, oid::ObjectId};
use serde::Deserialize;

use super::parse_object_id;
use crate::{auth::AuthUser, config::AppState, error::Error};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRequest {
    pub code: String,
    pub name: String,
    pub max_cce_marks: f64,
    pub max_sa_marks: f64,
    pub pass_percent: f64,
}

fn validate(body: &SubjectRequest) -> Result<(), Error> {
    if body.code.trim().is_empty() {
        return Err(Error::Unprocessable(
            "subject code must not be empty".to_string(),
        ));
    }
    if body.max_cce_marks < 0.0 || body.max_sa_marks < 0.0 {
        return Err(Error::Unprocessable(
            "maximum marks must not be negative".to_string(),
        ));
    }
    if body.max_cce_marks + body.max_sa_marks <= 0.0 {
        return Err(Error::Unprocessable(
            "subject must carry marks".to_string(),
        ));
    }
    if body.pass_percent < 0.0 || body.pass_percent > 100.0 {
        return Err(Error::Unprocessable(
            "pass percent must be between 0.0 and 100.0".to_string(),
        ));
    }
    Ok(())
}

pub async fn post_subject(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<SubjectRequest>,
) -> Result<(StatusCode, Json<Subject>), Error> {
    auth.require_admin()?;
    validate(&body)?;

    let code = body.code.trim().to_string();
    let subjects = db::get_collection::<Subject>(&state.mongo, "Subject");
    if subjects.find_one(doc! {"code": &code}).await?.is_some() {
        return Err(Error::Conflict(format!(
            "subject code {code} already exists"
        )));
    }

    let subject = Subject {
        id: ObjectId::new(),
        code,
        name: body.name,
        max_cce_marks: body.max_cce_marks,
        max_sa_marks: body.max_sa_marks,
        pass_percent: body.pass_percent,
    };
    subjects.insert_one(&subject).await?;

    Ok((StatusCode::CREATED, Json(subject)))
}

pub async fn get_subjects(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthUser>,
) -> Result<Json<Vec<Subject>>, Error> {
    let subjects = db::get_collection::<Subject>(&state.mongo, "Subject");
    let all: Vec<Subject> = subjects
        .find(doc! {})
        .sort(doc! {"code": 1})
        .await?
        .try_collect()
        .await?;
    Ok(Json(all))
}

pub async fn get_subject(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Subject>, Error> {
    let id = parse_object_id(&id)?;
    let subjects = db::get_collection::<Subject>(&state.mongo, "Subject");
    let subject = subjects
        .find_one(doc! {"_id": id})
        .await?
        .ok_or_else(|| Error::NotFound(format!("no subject with id {id}")))?;
    Ok(Json(subject))
}

pub async fn put_subject(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<SubjectRequest>,
) -> Result<Json<Subject>, Error> {
    auth.require_admin()?;
    let id = parse_object_id(&id)?;
    validate(&body)?;

    let code = body.code.trim().to_string();
    let subjects = db::get_collection::<Subject>(&state.mongo, "Subject");
    if subjects
        .find_one(doc! {"code": &code, "_id": {"$ne": id}})
        .await?
        .is_some()
    {
        return Err(Error::Conflict(format!(
            "subject code {code} already exists"
        )));
    }

    let updated = subjects
        .find_one_and_update(
            doc! {"_id": id},
            doc! {"$set": {
                "code": &code,
                "name": &body.name,
                "maxCceMarks": body.max_cce_marks,
                "maxSaMarks": body.max_sa_marks,
                "passPercent": body.pass_percent,
            }},
        )
        .return_document(mongodb::options::ReturnDocument::After)
        .await?
        .ok_or_else(|| Error::NotFound(format!("no subject with id {id}")))?;

    Ok(Json(updated))
}

pub async fn delete_subject(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<StatusCode, Error> {
    auth.require_admin()?;
    let id = parse_object_id(&id)?;

    let cce = db::get_collection::<CceMark>(&state.mongo, "CceMark");
    let sa = db::get_collection::<SaMark>(&state.mongo, "SaMark");
    let recorded = cce.count_documents(doc! {"subjectId": id}).await?
        + sa.count_documents(doc! {"subjectId": id}).await?;
    if recorded > 0 {
        return Err(Error::Conflict(format!(
            "subject has {recorded} recorded marks"
        )));
    }

    let subjects = db::get_collection::<Subject>(&state.mongo, "Subject");
    let result = subjects.delete_one(doc! {"_id": id}).await?;
    if result.deleted_count == 0 {
        return Err(Error::NotFound(format!("no subject with id {id}")));
    }

    Ok(StatusCode::NO_CONTENT)
}

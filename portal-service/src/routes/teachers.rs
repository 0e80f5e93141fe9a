use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use futures_util::TryStreamExt;
use models::{StudyCentre, Subject, Teacher, db};
use mongodb::bson::{Document, doc, oid::ObjectId};
use serde::Deserialize;

use super::parse_object_id;
use crate::{auth::AuthUser, config::AppState, error::Error};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherRequest {
    pub name: String,
    pub qualification: String,
    pub phone: String,
    pub email: String,
    pub centre_id: String,
    pub subject_ids: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherListQuery {
    pub centre_id: Option<String>,
    pub active: Option<bool>,
}

async fn resolve_references(
    state: &AppState,
    body: &TeacherRequest,
) -> Result<(ObjectId, Vec<ObjectId>), Error> {
    let centre_id = parse_object_id(&body.centre_id)?;
    let centres = db::get_collection::<StudyCentre>(&state.mongo, "StudyCentre");
    if centres.find_one(doc! {"_id": centre_id}).await?.is_none() {
        return Err(Error::Unprocessable(format!(
            "no centre with id {centre_id}"
        )));
    }

    let mut subject_ids = Vec::with_capacity(body.subject_ids.len());
    for raw in &body.subject_ids {
        subject_ids.push(parse_object_id(raw)?);
    }
    let subjects = db::get_collection::<Subject>(&state.mongo, "Subject");
    let known = subjects
        .count_documents(doc! {"_id": {"$in": &subject_ids}})
        .await?;
    if known != subject_ids.len() as u64 {
        return Err(Error::Unprocessable(
            "one or more subject ids do not exist".to_string(),
        ));
    }

    Ok((centre_id, subject_ids))
}

pub async fn post_teacher(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<TeacherRequest>,
) -> Result<(StatusCode, Json<Teacher>), Error> {
    auth.require_admin()?;

    let (centre_id, subject_ids) = resolve_references(&state, &body).await?;

    let teachers = db::get_collection::<Teacher>(&state.mongo, "Teacher");
    if teachers
        .find_one(doc! {"email": &body.email})
        .await?
        .is_some()
    {
        return Err(Error::Conflict(format!(
            "a teacher with email {} already exists",
            body.email
        )));
    }

    let teacher = Teacher {
        id: ObjectId::new(),
        name: body.name,
        qualification: body.qualification,
        phone: body.phone,
        email: body.email,
        centre_id,
        subject_ids,
        active: true,
    };
    teachers.insert_one(&teacher).await?;

    Ok((StatusCode::CREATED, Json(teacher)))
}

pub async fn get_teachers(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<TeacherListQuery>,
) -> Result<Json<Vec<Teacher>>, Error> {
    let requested = match &query.centre_id {
        Some(raw) => Some(parse_object_id(raw)?),
        None => None,
    };
    let centre_id = auth.centre_filter(requested)?;

    let mut filter = Document::new();
    if let Some(centre_id) = centre_id {
        filter.insert("centreId", centre_id);
    }
    if let Some(active) = query.active {
        filter.insert("active", active);
    }

    let teachers = db::get_collection::<Teacher>(&state.mongo, "Teacher");
    let all: Vec<Teacher> = teachers
        .find(filter)
        .sort(doc! {"name": 1})
        .await?
        .try_collect()
        .await?;
    Ok(Json(all))
}

pub async fn get_teacher(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Teacher>, Error> {
    let id = parse_object_id(&id)?;
    let teachers = db::get_collection::<Teacher>(&state.mongo, "Teacher");
    let teacher = teachers
        .find_one(doc! {"_id": id})
        .await?
        .ok_or_else(|| Error::NotFound(format!("no teacher with id {id}")))?;
    auth.check_centre(&teacher.centre_id)?;
    Ok(Json(teacher))
}

pub async fn put_teacher(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<TeacherRequest>,
) -> Result<Json<Teacher>, Error> {
    auth.require_admin()?;
    let id = parse_object_id(&id)?;

    let (centre_id, subject_ids) = resolve_references(&state, &body).await?;

    let teachers = db::get_collection::<Teacher>(&state.mongo, "Teacher");
    if teachers
        .find_one(doc! {"email": &body.email, "_id": {"$ne": id}})
        .await?
        .is_some()
    {
        return Err(Error::Conflict(format!(
            "a teacher with email {} already exists",
            body.email
        )));
    }

    let updated = teachers
        .find_one_and_update(
            doc! {"_id": id},
            doc! {"$set": {
                "name": &body.name,
                "qualification": &body.qualification,
                "phone": &body.phone,
                "email": &body.email,
                "centreId": centre_id,
                "subjectIds": &subject_ids,
            }},
        )
        .return_document(mongodb::options::ReturnDocument::After)
        .await?
        .ok_or_else(|| Error::NotFound(format!("no teacher with id {id}")))?;

    Ok(Json(updated))
}

/// Teachers are deactivated, never deleted. Their id stays referenced by
/// entered marks.
pub async fn delete_teacher(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<StatusCode, Error> {
    auth.require_admin()?;
    let id = parse_object_id(&id)?;

    let teachers = db::get_collection::<Teacher>(&state.mongo, "Teacher");
    let result = teachers
        .update_one(doc! {"_id": id}, doc! {"$set": {"active": false}})
        .await?;
    if result.matched_count == 0 {
        return Err(Error::NotFound(format!("no teacher with id {id}")));
    }

    Ok(StatusCode::NO_CONTENT)
}

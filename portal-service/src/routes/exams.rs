use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{NaiveDate, NaiveTime};
use futures_util::TryStreamExt;
use models::{CceMark, Exam, ExamResult, ExamSlot, ExamTerm, SaMark, Subject, db};
use mongodb::bson::{Document, doc, oid::ObjectId};
use serde::Deserialize;

use super::parse_object_id;
use crate::{auth::AuthUser, config::AppState, error::Error};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotRequest {
    pub subject_id: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamRequest {
    pub name: String,
    pub academic_year: String,
    pub term: ExamTerm,
    pub schedule: Vec<SlotRequest>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamListQuery {
    pub academic_year: Option<String>,
    pub term: Option<ExamTerm>,
}

async fn resolve_schedule(
    state: &AppState,
    slots: &[SlotRequest],
) -> Result<Vec<ExamSlot>, Error> {
    let mut schedule = Vec::with_capacity(slots.len());
    let mut seen_subjects: Vec<ObjectId> = Vec::new();

    for slot in slots {
        let subject_id = parse_object_id(&slot.subject_id)?;
        if seen_subjects.contains(&subject_id) {
            return Err(Error::Unprocessable(format!(
                "subject {subject_id} appears more than once in the schedule"
            )));
        }
        if slot.start_time >= slot.end_time {
            return Err(Error::Unprocessable(format!(
                "slot for subject {subject_id} ends before it starts"
            )));
        }
        seen_subjects.push(subject_id);
        schedule.push(ExamSlot {
            subject_id,
            date: slot.date,
            start_time: slot.start_time,
            end_time: slot.end_time,
        });
    }

    if !seen_subjects.is_empty() {
        let subjects = db::get_collection::<Subject>(&state.mongo, "Subject");
        let known = subjects
            .count_documents(doc! {"_id": {"$in": &seen_subjects}})
            .await?;
        if known != seen_subjects.len() as u64 {
            return Err(Error::Unprocessable(
                "one or more scheduled subjects do not exist".to_string(),
            ));
        }
    }

    Ok(schedule)
}

pub async fn post_exam(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<ExamRequest>,
) -> Result<(StatusCode, Json<Exam>), Error> {
    auth.require_admin()?;

    let schedule = resolve_schedule(&state, &body.schedule).await?;

    let exam = Exam {
        id: ObjectId::new(),
        name: body.name,
        academic_year: body.academic_year,
        term: body.term,
        schedule,
        results_published: false,
    };
    let exams = db::get_collection::<Exam>(&state.mongo, "Exam");
    exams.insert_one(&exam).await?;

    Ok((StatusCode::CREATED, Json(exam)))
}

pub async fn get_exams(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthUser>,
    Query(query): Query<ExamListQuery>,
) -> Result<Json<Vec<Exam>>, Error> {
    let mut filter = Document::new();
    if let Some(year) = &query.academic_year {
        filter.insert("academicYear", year);
    }
    if let Some(term) = query.term {
        filter.insert("term", term);
    }

    let exams = db::get_collection::<Exam>(&state.mongo, "Exam");
    let all: Vec<Exam> = exams
        .find(filter)
        .sort(doc! {"academicYear": -1, "name": 1})
        .await?
        .try_collect()
        .await?;
    Ok(Json(all))
}

pub async fn get_exam(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Exam>, Error> {
    let id = parse_object_id(&id)?;
    let exams = db::get_collection::<Exam>(&state.mongo, "Exam");
    let exam = exams
        .find_one(doc! {"_id": id})
        .await?
        .ok_or_else(|| Error::NotFound(format!("no exam with id {id}")))?;
    Ok(Json(exam))
}

pub async fn put_exam(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<ExamRequest>,
) -> Result<Json<Exam>, Error> {
    auth.require_admin()?;
    let id = parse_object_id(&id)?;

    let exams = db::get_collection::<Exam>(&state.mongo, "Exam");
    let existing = exams
        .find_one(doc! {"_id": id})
        .await?
        .ok_or_else(|| Error::NotFound(format!("no exam with id {id}")))?;
    if existing.results_published {
        return Err(Error::Conflict(
            "results are published; the exam can no longer be edited".to_string(),
        ));
    }

    let schedule = resolve_schedule(&state, &body.schedule).await?;
    let schedule_bson = mongodb::bson::to_bson(&schedule)?;

    let updated = exams
        .find_one_and_update(
            doc! {"_id": id},
            doc! {"$set": {
                "name": &body.name,
                "academicYear": &body.academic_year,
                "term": body.term,
                "schedule": schedule_bson,
            }},
        )
        .return_document(mongodb::options::ReturnDocument::After)
        .await?
        .ok_or_else(|| Error::NotFound(format!("no exam with id {id}")))?;

    Ok(Json(updated))
}

pub async fn delete_exam(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<StatusCode, Error> {
    auth.require_admin()?;
    let id = parse_object_id(&id)?;

    let cce = db::get_collection::<CceMark>(&state.mongo, "CceMark");
    let sa = db::get_collection::<SaMark>(&state.mongo, "SaMark");
    let results = db::get_collection::<ExamResult>(&state.mongo, "Result");
    let referenced = cce.count_documents(doc! {"examId": id}).await?
        + sa.count_documents(doc! {"examId": id}).await?
        + results.count_documents(doc! {"examId": id}).await?;
    if referenced > 0 {
        return Err(Error::Conflict(format!(
            "exam has {referenced} marks or results recorded against it"
        )));
    }

    let exams = db::get_collection::<Exam>(&state.mongo, "Exam");
    let result = exams.delete_one(doc! {"_id": id}).await?;
    if result.deleted_count == 0 {
        return Err(Error::NotFound(format!("no exam with id {id}")));
    }

    Ok(StatusCode::NO_CONTENT)
}

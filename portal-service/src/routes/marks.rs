use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::TryStreamExt;
use models::{CceMark, Exam, SaMark, Student, StudentStatus, Subject, UserRole, db};
use mongodb::{
    bson::{DateTime, doc, oid::ObjectId},
    options::UpdateOneModel,
};
use serde::{Deserialize, Serialize};

use super::parse_object_id;
use crate::{auth::AuthUser, config::AppState, error::Error};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CceEntry {
    pub student_id: String,
    pub marks: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CceEntryRequest {
    pub exam_id: String,
    pub subject_id: String,
    pub entries: Vec<CceEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaEntry {
    pub student_id: String,
    pub marks: f64,
    #[serde(default)]
    pub absent: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaEntryRequest {
    pub exam_id: String,
    pub subject_id: String,
    pub entries: Vec<SaEntry>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryError {
    pub student_id: String,
    pub message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryErrorResponse {
    pub errors: Vec<EntryError>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryReport {
    pub written: usize,
}

struct EntryContext {
    exam: Exam,
    subject: Subject,
    students: HashMap<ObjectId, Student>,
}

/// Loads and checks the exam/subject pair of a mark-entry request, plus
/// the students named by the entries.
async fn load_entry_context(
    state: &AppState,
    raw_exam_id: &str,
    raw_subject_id: &str,
    raw_student_ids: &[&String],
) -> Result<EntryContext, Error> {
    let exam_id = parse_object_id(raw_exam_id)?;
    let subject_id = parse_object_id(raw_subject_id)?;

    let exams = db::get_collection::<Exam>(&state.mongo, "Exam");
    let exam = exams
        .find_one(doc! {"_id": exam_id})
        .await?
        .ok_or_else(|| Error::NotFound(format!("no exam with id {exam_id}")))?;
    if exam.results_published {
        return Err(Error::Conflict(
            "results are published; marks can no longer be entered".to_string(),
        ));
    }
    if !exam.schedule.iter().any(|s| s.subject_id == subject_id) {
        return Err(Error::Unprocessable(format!(
            "subject {subject_id} is not on the exam schedule"
        )));
    }

    let subjects = db::get_collection::<Subject>(&state.mongo, "Subject");
    let subject = subjects
        .find_one(doc! {"_id": subject_id})
        .await?
        .ok_or_else(|| Error::Unprocessable(format!("no subject with id {subject_id}")))?;

    let mut student_ids = Vec::with_capacity(raw_student_ids.len());
    for raw in raw_student_ids {
        student_ids.push(parse_object_id(raw)?);
    }
    let student_collection = db::get_collection::<Student>(&state.mongo, "Student");
    let students: HashMap<ObjectId, Student> = student_collection
        .find(doc! {"_id": {"$in": &student_ids}})
        .await?
        .try_collect::<Vec<Student>>()
        .await?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();

    Ok(EntryContext {
        exam,
        subject,
        students,
    })
}

/// Checks one entry against the loaded context. Returns the student on
/// success.
fn check_entry<'c>(
    ctx: &'c EntryContext,
    auth: &AuthUser,
    raw_student_id: &str,
    marks: f64,
    max_marks: f64,
) -> Result<&'c Student, String> {
    let Ok(student_id) = ObjectId::parse_str(raw_student_id) else {
        return Err("not a valid object id".to_string());
    };
    let Some(student) = ctx.students.get(&student_id) else {
        return Err("student does not exist".to_string());
    };
    if student.status != StudentStatus::Active {
        return Err("student is not active".to_string());
    }
    if !student.subject_ids.contains(&ctx.subject.id) {
        return Err(format!(
            "student is not enrolled in subject {}",
            ctx.subject.code
        ));
    }
    if auth.role != UserRole::Admin && auth.centre_id != Some(student.centre_id) {
        return Err("student belongs to another study centre".to_string());
    }
    if marks < 0.0 || marks > max_marks {
        return Err(format!("marks must be between 0 and {max_marks}"));
    }
    Ok(student)
}

/// Bulk CCE entry. Entries are validated as a batch: any invalid entry
/// rejects the whole request and nothing is written.
#[tracing::instrument(skip_all)]
pub async fn put_cce_marks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<CceEntryRequest>,
) -> Result<Response, Error> {
    let student_ids: Vec<&String> = body.entries.iter().map(|e| &e.student_id).collect();
    let ctx = load_entry_context(&state, &body.exam_id, &body.subject_id, &student_ids).await?;
    let max_marks = ctx.subject.max_cce_marks;

    let mut errors = Vec::new();
    let mut updates = Vec::new();
    let now = DateTime::now();
    let namespace = super::namespace(&state, "CceMark");

    for entry in &body.entries {
        match check_entry(&ctx, &auth, &entry.student_id, entry.marks, max_marks) {
            Ok(student) => {
                updates.push(
                    UpdateOneModel::builder()
                        .namespace(namespace.clone())
                        .filter(doc! {
                            "studentId": student.id,
                            "subjectId": ctx.subject.id,
                            "examId": ctx.exam.id,
                        })
                        .update(doc! {"$set": {
                            "marks": entry.marks,
                            "maxMarks": max_marks,
                            "enteredBy": auth.user_id,
                            "enteredAt": now,
                        }})
                        .upsert(true)
                        .build(),
                );
            }
            Err(message) => errors.push(EntryError {
                student_id: entry.student_id.clone(),
                message,
            }),
        }
    }

    if !errors.is_empty() {
        return Ok((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(EntryErrorResponse { errors }),
        )
            .into_response());
    }

    let written = updates.len();
    if !updates.is_empty() {
        state.mongo.bulk_write(updates).await?;
    }
    tracing::info!(num = written, exam = %ctx.exam.id, subject = %ctx.subject.id, "CCE marks entered");

    Ok(Json(EntryReport { written }).into_response())
}

/// Bulk SA entry, same batch semantics as CCE entry. Absent entries must
/// carry zero marks.
#[tracing::instrument(skip_all)]
pub async fn put_sa_marks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<SaEntryRequest>,
) -> Result<Response, Error> {
    let student_ids: Vec<&String> = body.entries.iter().map(|e| &e.student_id).collect();
    let ctx = load_entry_context(&state, &body.exam_id, &body.subject_id, &student_ids).await?;
    let max_marks = ctx.subject.max_sa_marks;

    let mut errors = Vec::new();
    let mut updates = Vec::new();
    let now = DateTime::now();
    let namespace = super::namespace(&state, "SaMark");

    for entry in &body.entries {
        if entry.absent && entry.marks != 0.0 {
            errors.push(EntryError {
                student_id: entry.student_id.clone(),
                message: "absent entries cannot carry marks".to_string(),
            });
            continue;
        }
        match check_entry(&ctx, &auth, &entry.student_id, entry.marks, max_marks) {
            Ok(student) => {
                updates.push(
                    UpdateOneModel::builder()
                        .namespace(namespace.clone())
                        .filter(doc! {
                            "studentId": student.id,
                            "subjectId": ctx.subject.id,
                            "examId": ctx.exam.id,
                        })
                        .update(doc! {"$set": {
                            "marks": entry.marks,
                            "maxMarks": max_marks,
                            "absent": entry.absent,
                            "enteredBy": auth.user_id,
                            "enteredAt": now,
                        }})
                        .upsert(true)
                        .build(),
                );
            }
            Err(message) => errors.push(EntryError {
                student_id: entry.student_id.clone(),
                message,
            }),
        }
    }

    if !errors.is_empty() {
        return Ok((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(EntryErrorResponse { errors }),
        )
            .into_response());
    }

    let written = updates.len();
    if !updates.is_empty() {
        state.mongo.bulk_write(updates).await?;
    }
    tracing::info!(num = written, exam = %ctx.exam.id, subject = %ctx.subject.id, "SA marks entered");

    Ok(Json(EntryReport { written }).into_response())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkGridQuery {
    pub exam_id: String,
    pub subject_id: String,
    pub centre_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkGridRow {
    pub student_id: String,
    pub admission_no: String,
    pub name: String,
    pub marks: f64,
    pub max_marks: f64,
    pub absent: Option<bool>,
}

async fn grid_students(
    state: &AppState,
    auth: &AuthUser,
    raw_centre_id: &Option<String>,
    student_ids: Vec<ObjectId>,
) -> Result<HashMap<ObjectId, Student>, Error> {
    let requested = match raw_centre_id {
        Some(raw) => Some(parse_object_id(raw)?),
        None => None,
    };
    let centre_id = auth.centre_filter(requested)?;

    let mut filter = doc! {"_id": {"$in": student_ids}};
    if let Some(centre_id) = centre_id {
        filter.insert("centreId", centre_id);
    }

    let students = db::get_collection::<Student>(&state.mongo, "Student");
    Ok(students
        .find(filter)
        .await?
        .try_collect::<Vec<Student>>()
        .await?
        .into_iter()
        .map(|s| (s.id, s))
        .collect())
}

pub async fn get_cce_marks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<MarkGridQuery>,
) -> Result<Json<Vec<MarkGridRow>>, Error> {
    let exam_id = parse_object_id(&query.exam_id)?;
    let subject_id = parse_object_id(&query.subject_id)?;

    let cce = db::get_collection::<CceMark>(&state.mongo, "CceMark");
    let marks: Vec<CceMark> = cce
        .find(doc! {"examId": exam_id, "subjectId": subject_id})
        .await?
        .try_collect()
        .await?;

    let students = grid_students(
        &state,
        &auth,
        &query.centre_id,
        marks.iter().map(|m| m.student_id).collect(),
    )
    .await?;

    let mut rows: Vec<MarkGridRow> = marks
        .into_iter()
        .filter_map(|m| {
            students.get(&m.student_id).map(|s| MarkGridRow {
                student_id: s.id.to_hex(),
                admission_no: s.admission_no.clone(),
                name: s.name.clone(),
                marks: m.marks,
                max_marks: m.max_marks,
                absent: None,
            })
        })
        .collect();
    rows.sort_by(|a, b| a.admission_no.cmp(&b.admission_no));

    Ok(Json(rows))
}

pub async fn get_sa_marks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<MarkGridQuery>,
) -> Result<Json<Vec<MarkGridRow>>, Error> {
    let exam_id = parse_object_id(&query.exam_id)?;
    let subject_id = parse_object_id(&query.subject_id)?;

    let sa = db::get_collection::<SaMark>(&state.mongo, "SaMark");
    let marks: Vec<SaMark> = sa
        .find(doc! {"examId": exam_id, "subjectId": subject_id})
        .await?
        .try_collect()
        .await?;

    let students = grid_students(
        &state,
        &auth,
        &query.centre_id,
        marks.iter().map(|m| m.student_id).collect(),
    )
    .await?;

    let mut rows: Vec<MarkGridRow> = marks
        .into_iter()
        .filter_map(|m| {
            students.get(&m.student_id).map(|s| MarkGridRow {
                student_id: s.id.to_hex(),
                admission_no: s.admission_no.clone(),
                name: s.name.clone(),
                marks: m.marks,
                max_marks: m.max_marks,
                absent: Some(m.absent),
            })
        })
        .collect();
    rows.sort_by(|a, b| a.admission_no.cmp(&b.admission_no));

    Ok(Json(rows))
}

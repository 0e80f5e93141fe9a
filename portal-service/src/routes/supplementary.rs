use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};
use futures_util::TryStreamExt;
use models::{
    Exam, ExamResult, ExamTerm, Student, StudyCentre, Subject, SupplementaryRegistration, db,
};
use mongodb::bson::{DateTime, doc, oid::ObjectId};
use serde::{Deserialize, Serialize};

use super::{parse_object_id, xlsx_attachment};
use crate::{auth::AuthUser, config::AppState, error::Error};

/// Loads an exam whose results must already be published. Eligibility and
/// registration depend on the published failure record, so an unpublished
/// exam is a conflict rather than a missing resource.
async fn source_exam(state: &AppState, raw_exam_id: &str) -> Result<Exam, Error> {
    let exam_id = parse_object_id(raw_exam_id)?;
    let exams = db::get_collection::<Exam>(&state.mongo, "Exam");
    let exam = exams
        .find_one(doc! {"_id": exam_id})
        .await?
        .ok_or_else(|| Error::NotFound(format!("no exam with id {exam_id}")))?;
    if !exam.results_published {
        return Err(Error::Conflict(format!(
            "results for exam {} are not published",
            exam.id
        )));
    }
    Ok(exam)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibleStudent {
    pub student_id: String,
    pub admission_no: String,
    pub name: String,
    pub centre_id: String,
    pub failed_subject_ids: Vec<String>,
}

/// Students who failed the exam, with the subjects they failed.
pub async fn get_eligible(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(exam_id): Path<String>,
) -> Result<Json<Vec<EligibleStudent>>, Error> {
    let exam = source_exam(&state, &exam_id).await?;

    let mut filter = doc! {"examId": exam.id, "passed": false};
    if let Some(centre_id) = auth.centre_filter(None)? {
        filter.insert("centreId", centre_id);
    }

    let results = db::get_collection::<ExamResult>(&state.mongo, "Result");
    let failed: Vec<ExamResult> = results.find(filter).await?.try_collect().await?;

    let students = db::get_collection::<Student>(&state.mongo, "Student");
    let student_map: HashMap<ObjectId, Student> = students
        .find(doc! {"_id": {"$in": failed.iter().map(|r| r.student_id).collect::<Vec<_>>()}})
        .await?
        .try_collect::<Vec<Student>>()
        .await?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();

    let mut eligible: Vec<EligibleStudent> = failed
        .into_iter()
        .filter_map(|r| {
            student_map.get(&r.student_id).map(|s| EligibleStudent {
                student_id: s.id.to_hex(),
                admission_no: s.admission_no.clone(),
                name: s.name.clone(),
                centre_id: r.centre_id.to_hex(),
                failed_subject_ids: r
                    .failed_subject_ids
                    .iter()
                    .map(|id| id.to_hex())
                    .collect(),
            })
        })
        .collect();
    eligible.sort_by(|a, b| a.admission_no.cmp(&b.admission_no));

    Ok(Json(eligible))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    /// The supplementary exam being registered for.
    pub exam_id: String,
    /// The failed exam that made the student eligible.
    pub source_exam_id: String,
    pub student_id: String,
    pub subject_ids: Vec<String>,
}

pub async fn post_registration(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<RegistrationRequest>,
) -> Result<(StatusCode, Json<SupplementaryRegistration>), Error> {
    let exam_id = parse_object_id(&body.exam_id)?;
    let student_id = parse_object_id(&body.student_id)?;
    if body.subject_ids.is_empty() {
        return Err(Error::Unprocessable(
            "a registration must name at least one subject".to_string(),
        ));
    }
    let mut subject_ids = Vec::with_capacity(body.subject_ids.len());
    for raw in &body.subject_ids {
        subject_ids.push(parse_object_id(raw)?);
    }

    let exams = db::get_collection::<Exam>(&state.mongo, "Exam");
    let exam = exams
        .find_one(doc! {"_id": exam_id})
        .await?
        .ok_or_else(|| Error::NotFound(format!("no exam with id {exam_id}")))?;
    if exam.term != ExamTerm::Supplementary {
        return Err(Error::Unprocessable(format!(
            "exam {} is not a supplementary exam",
            exam.id
        )));
    }

    let source = source_exam(&state, &body.source_exam_id).await?;

    let results = db::get_collection::<ExamResult>(&state.mongo, "Result");
    let result = results
        .find_one(doc! {"examId": source.id, "studentId": student_id})
        .await?
        .ok_or_else(|| {
            Error::NotFound(format!(
                "no result for student {student_id} in exam {}",
                source.id
            ))
        })?;
    auth.check_centre(&result.centre_id)?;
    if result.passed {
        return Err(Error::Unprocessable(
            "student passed the exam and is not eligible".to_string(),
        ));
    }
    for subject_id in &subject_ids {
        if !result.failed_subject_ids.contains(subject_id) {
            return Err(Error::Unprocessable(format!(
                "subject {subject_id} is not among the student's failed subjects"
            )));
        }
    }

    let registrations =
        db::get_collection::<SupplementaryRegistration>(&state.mongo, "SupplementaryRegistration");
    if registrations
        .find_one(doc! {"examId": exam_id, "studentId": student_id})
        .await?
        .is_some()
    {
        return Err(Error::Conflict(format!(
            "student {student_id} is already registered for exam {exam_id}"
        )));
    }

    let registration = SupplementaryRegistration {
        id: ObjectId::new(),
        exam_id,
        source_exam_id: source.id,
        student_id,
        subject_ids,
        registered_at: DateTime::now(),
    };
    registrations.insert_one(&registration).await?;

    tracing::info!(student = %student_id, exam = %exam_id, "supplementary registration created");

    Ok((StatusCode::CREATED, Json(registration)))
}

/// XLSX export of all registrations for a supplementary exam.
pub async fn get_registrations_export(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(exam_id): Path<String>,
) -> Result<Response, Error> {
    auth.require_admin()?;
    let exam_id = parse_object_id(&exam_id)?;

    let registrations =
        db::get_collection::<SupplementaryRegistration>(&state.mongo, "SupplementaryRegistration");
    let found: Vec<SupplementaryRegistration> = registrations
        .find(doc! {"examId": exam_id})
        .await?
        .try_collect()
        .await?;

    let students = db::get_collection::<Student>(&state.mongo, "Student");
    let student_map: HashMap<ObjectId, Student> = students
        .find(doc! {"_id": {"$in": found.iter().map(|r| r.student_id).collect::<Vec<_>>()}})
        .await?
        .try_collect::<Vec<Student>>()
        .await?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();
    let centres = db::get_collection::<StudyCentre>(&state.mongo, "StudyCentre");
    let centre_map: HashMap<ObjectId, StudyCentre> = centres
        .find(doc! {})
        .await?
        .try_collect::<Vec<StudyCentre>>()
        .await?
        .into_iter()
        .map(|c| (c.id, c))
        .collect();
    let subjects = db::get_collection::<Subject>(&state.mongo, "Subject");
    let subject_map: HashMap<ObjectId, Subject> = subjects
        .find(doc! {})
        .await?
        .try_collect::<Vec<Subject>>()
        .await?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();

    let mut rows = Vec::with_capacity(found.len());
    for reg in &found {
        let student = student_map.get(&reg.student_id).ok_or_else(|| {
            Error::NotFound(format!("no student with id {}", reg.student_id))
        })?;
        let centre = centre_map.get(&student.centre_id).ok_or_else(|| {
            Error::NotFound(format!("no centre with id {}", student.centre_id))
        })?;
        let subject_codes = reg
            .subject_ids
            .iter()
            .map(|id| {
                subject_map
                    .get(id)
                    .map(|s| s.code.clone())
                    .ok_or_else(|| Error::NotFound(format!("no subject with id {id}")))
            })
            .collect::<Result<Vec<String>, Error>>()?;

        rows.push(portal_utils::sheet::SupplementaryRow {
            admission_no: student.admission_no.clone(),
            name: student.name.clone(),
            centre_code: centre.code.clone(),
            subject_codes,
        });
    }
    rows.sort_by(|a, b| a.admission_no.cmp(&b.admission_no));

    let bytes = portal_utils::sheet::write_supplementary_sheet(&rows)?;

    Ok(xlsx_attachment("supplementary-registrations.xlsx", bytes))
}

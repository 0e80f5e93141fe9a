use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use futures_util::TryStreamExt;
use models::{Exam, ExamResult, ExamTerm, Student, StudyCentre, Subject, SubjectResult, db};
use mongodb::bson::{doc, oid::ObjectId};
use serde::Serialize;

use super::parse_object_id;
use crate::{auth::AuthUser, config::AppState, error::Error};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamSummary {
    pub id: String,
    pub name: String,
    pub academic_year: String,
    pub term: ExamTerm,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    pub id: String,
    pub admission_no: String,
    pub name: String,
    pub father_name: String,
    pub centre_code: String,
    pub centre_name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRow {
    pub subject_code: String,
    pub subject_name: String,
    pub cce_marks: f64,
    pub sa_marks: f64,
    pub absent: bool,
    pub total: f64,
    pub max_total: f64,
    pub grade: String,
    pub passed: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarksheetResponse {
    pub exam: ExamSummary,
    pub student: StudentSummary,
    pub subjects: Vec<SubjectRow>,
    pub grand_total: f64,
    pub grand_max: f64,
    pub percent: f64,
    pub grade: String,
    pub passed: bool,
    pub rank: u32,
}

async fn published_exam(state: &AppState, raw_exam_id: &str) -> Result<Exam, Error> {
    let exam_id = parse_object_id(raw_exam_id)?;
    let exams = db::get_collection::<Exam>(&state.mongo, "Exam");
    let exam = exams
        .find_one(doc! {"_id": exam_id})
        .await?
        .ok_or_else(|| Error::NotFound(format!("no exam with id {exam_id}")))?;
    if !exam.results_published {
        return Err(Error::NotFound(format!(
            "results for exam {} are not published",
            exam.id
        )));
    }
    Ok(exam)
}

fn subject_rows(
    subjects: &[SubjectResult],
    subject_map: &HashMap<ObjectId, Subject>,
) -> Result<Vec<SubjectRow>, Error> {
    subjects
        .iter()
        .map(|r| {
            let subject = subject_map.get(&r.subject_id).ok_or_else(|| {
                Error::NotFound(format!("no subject with id {}", r.subject_id))
            })?;
            Ok(SubjectRow {
                subject_code: subject.code.clone(),
                subject_name: subject.name.clone(),
                cce_marks: r.cce_marks,
                sa_marks: r.sa_marks,
                absent: r.absent,
                total: r.total,
                max_total: r.max_total,
                grade: r.grade.clone(),
                passed: r.passed,
            })
        })
        .collect()
}

async fn subject_map(state: &AppState) -> Result<HashMap<ObjectId, Subject>, Error> {
    let subjects = db::get_collection::<Subject>(&state.mongo, "Subject");
    Ok(subjects
        .find(doc! {})
        .await?
        .try_collect::<Vec<Subject>>()
        .await?
        .into_iter()
        .map(|s| (s.id, s))
        .collect())
}

/// A single student's published marksheet.
pub async fn get_marksheet(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path((exam_id, student_id)): Path<(String, String)>,
) -> Result<Json<MarksheetResponse>, Error> {
    let exam = published_exam(&state, &exam_id).await?;
    let student_id = parse_object_id(&student_id)?;

    let results = db::get_collection::<ExamResult>(&state.mongo, "Result");
    let result = results
        .find_one(doc! {"examId": exam.id, "studentId": student_id})
        .await?
        .ok_or_else(|| {
            Error::NotFound(format!(
                "no result for student {student_id} in exam {}",
                exam.id
            ))
        })?;
    auth.check_centre(&result.centre_id)?;

    let students = db::get_collection::<Student>(&state.mongo, "Student");
    let student = students
        .find_one(doc! {"_id": student_id})
        .await?
        .ok_or_else(|| Error::NotFound(format!("no student with id {student_id}")))?;

    let centres = db::get_collection::<StudyCentre>(&state.mongo, "StudyCentre");
    let centre = centres
        .find_one(doc! {"_id": result.centre_id})
        .await?
        .ok_or_else(|| Error::NotFound(format!("no centre with id {}", result.centre_id)))?;

    let subject_map = subject_map(&state).await?;

    Ok(Json(MarksheetResponse {
        exam: ExamSummary {
            id: exam.id.to_hex(),
            name: exam.name,
            academic_year: exam.academic_year,
            term: exam.term,
        },
        student: StudentSummary {
            id: student.id.to_hex(),
            admission_no: student.admission_no,
            name: student.name,
            father_name: student.father_name,
            centre_code: centre.code,
            centre_name: centre.name,
        },
        subjects: subject_rows(&result.subjects, &subject_map)?,
        grand_total: result.grand_total,
        grand_max: result.grand_max,
        percent: result.percent,
        grade: result.grade,
        passed: result.passed,
        rank: result.rank,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabulationRow {
    pub rank: u32,
    pub student_id: String,
    pub admission_no: String,
    pub name: String,
    pub grand_total: f64,
    pub grand_max: f64,
    pub percent: f64,
    pub grade: String,
    pub passed: bool,
}

/// Rank-ordered tabulation of one centre for one exam.
pub async fn get_centre_tabulation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path((exam_id, centre_id)): Path<(String, String)>,
) -> Result<Json<Vec<TabulationRow>>, Error> {
    let exam = published_exam(&state, &exam_id).await?;
    let centre_id = parse_object_id(&centre_id)?;
    auth.check_centre(&centre_id)?;

    let results = db::get_collection::<ExamResult>(&state.mongo, "Result");
    let centre_results: Vec<ExamResult> = results
        .find(doc! {"examId": exam.id, "centreId": centre_id})
        .sort(doc! {"rank": 1, "grandTotal": -1})
        .await?
        .try_collect()
        .await?;

    let students = db::get_collection::<Student>(&state.mongo, "Student");
    let student_map: HashMap<ObjectId, Student> = students
        .find(doc! {"_id": {"$in": centre_results.iter().map(|r| r.student_id).collect::<Vec<_>>()}})
        .await?
        .try_collect::<Vec<Student>>()
        .await?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();

    let rows: Vec<TabulationRow> = centre_results
        .into_iter()
        .filter_map(|r| {
            student_map.get(&r.student_id).map(|s| TabulationRow {
                rank: r.rank,
                student_id: s.id.to_hex(),
                admission_no: s.admission_no.clone(),
                name: s.name.clone(),
                grand_total: r.grand_total,
                grand_max: r.grand_max,
                percent: r.percent,
                grade: r.grade.clone(),
                passed: r.passed,
            })
        })
        .collect();

    Ok(Json(rows))
}

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use chrono::{NaiveDate, NaiveTime};
use futures_util::TryStreamExt;
use models::{Exam, Student, StudentStatus, StudyCentre, Subject, db};
use mongodb::bson::doc;
use serde::Serialize;

use super::parse_object_id;
use crate::{auth::AuthUser, config::AppState, error::Error};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HallTicketSlot {
    pub subject_code: String,
    pub subject_name: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HallTicket {
    pub exam_name: String,
    pub academic_year: String,
    pub student_id: String,
    pub admission_no: String,
    pub student_name: String,
    pub father_name: String,
    pub photo_key: Option<String>,
    pub centre_code: String,
    pub centre_name: String,
    pub centre_address: String,
    pub schedule: Vec<HallTicketSlot>,
}

/// The exam schedule filtered to the student's enrolled subjects, ordered
/// by date then start time.
fn assemble(
    exam: &Exam,
    student: &Student,
    centre: &StudyCentre,
    subjects: &[Subject],
) -> Result<HallTicket, Error> {
    let mut schedule = Vec::new();
    for slot in &exam.schedule {
        if !student.subject_ids.contains(&slot.subject_id) {
            continue;
        }
        let subject = subjects
            .iter()
            .find(|s| s.id == slot.subject_id)
            .ok_or_else(|| {
                Error::NotFound(format!("no subject with id {}", slot.subject_id))
            })?;
        schedule.push(HallTicketSlot {
            subject_code: subject.code.clone(),
            subject_name: subject.name.clone(),
            date: slot.date,
            start_time: slot.start_time,
            end_time: slot.end_time,
        });
    }
    schedule.sort_by(|a, b| (a.date, a.start_time).cmp(&(b.date, b.start_time)));

    Ok(HallTicket {
        exam_name: exam.name.clone(),
        academic_year: exam.academic_year.clone(),
        student_id: student.id.to_hex(),
        admission_no: student.admission_no.clone(),
        student_name: student.name.clone(),
        father_name: student.father_name.clone(),
        photo_key: student.photo_key.clone(),
        centre_code: centre.code.clone(),
        centre_name: centre.name.clone(),
        centre_address: centre.address.clone(),
        schedule,
    })
}

pub async fn get_hall_ticket(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path((exam_id, student_id)): Path<(String, String)>,
) -> Result<Json<HallTicket>, Error> {
    let exam_id = parse_object_id(&exam_id)?;
    let student_id = parse_object_id(&student_id)?;

    let exams = db::get_collection::<Exam>(&state.mongo, "Exam");
    let exam = exams
        .find_one(doc! {"_id": exam_id})
        .await?
        .ok_or_else(|| Error::NotFound(format!("no exam with id {exam_id}")))?;

    let students = db::get_collection::<Student>(&state.mongo, "Student");
    let student = students
        .find_one(doc! {"_id": student_id})
        .await?
        .ok_or_else(|| Error::NotFound(format!("no student with id {student_id}")))?;
    auth.check_centre(&student.centre_id)?;
    if student.status != StudentStatus::Active {
        return Err(Error::Conflict(
            "hall tickets are only issued to active students".to_string(),
        ));
    }

    let centres = db::get_collection::<StudyCentre>(&state.mongo, "StudyCentre");
    let centre = centres
        .find_one(doc! {"_id": student.centre_id})
        .await?
        .ok_or_else(|| Error::NotFound(format!("no centre with id {}", student.centre_id)))?;

    let subjects = db::get_collection::<Subject>(&state.mongo, "Subject");
    let all_subjects: Vec<Subject> = subjects.find(doc! {}).await?.try_collect().await?;

    Ok(Json(assemble(&exam, &student, &centre, &all_subjects)?))
}

/// One hall ticket per active student of the centre.
pub async fn get_centre_hall_tickets(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path((exam_id, centre_id)): Path<(String, String)>,
) -> Result<Json<Vec<HallTicket>>, Error> {
    let exam_id = parse_object_id(&exam_id)?;
    let centre_id = parse_object_id(&centre_id)?;
    auth.check_centre(&centre_id)?;

    let exams = db::get_collection::<Exam>(&state.mongo, "Exam");
    let exam = exams
        .find_one(doc! {"_id": exam_id})
        .await?
        .ok_or_else(|| Error::NotFound(format!("no exam with id {exam_id}")))?;

    let centres = db::get_collection::<StudyCentre>(&state.mongo, "StudyCentre");
    let centre = centres
        .find_one(doc! {"_id": centre_id})
        .await?
        .ok_or_else(|| Error::NotFound(format!("no centre with id {centre_id}")))?;

    let students = db::get_collection::<Student>(&state.mongo, "Student");
    let centre_students: Vec<Student> = students
        .find(doc! {"centreId": centre_id, "status": StudentStatus::Active})
        .sort(doc! {"admissionNo": 1})
        .await?
        .try_collect()
        .await?;

    let subjects = db::get_collection::<Subject>(&state.mongo, "Subject");
    let all_subjects: Vec<Subject> = subjects.find(doc! {}).await?.try_collect().await?;

    let tickets = centre_students
        .iter()
        .map(|student| assemble(&exam, student, &centre, &all_subjects))
        .collect::<Result<Vec<HallTicket>, Error>>()?;

    Ok(Json(tickets))
}

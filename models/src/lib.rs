//! Document models for the examination portal.
//!
//! One struct per MongoDB collection, camelCase field names on the wire.
//! Collection names match the struct names.

use chrono::{NaiveDate, NaiveTime};
use mongodb::bson::{Bson, DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};

pub mod db;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum UserRole {
    Admin,
    CentreAdmin,
    Teacher,
}

impl From<UserRole> for Bson {
    fn from(role: UserRole) -> Self {
        let s = match role {
            UserRole::Admin => "Admin",
            UserRole::CentreAdmin => "CentreAdmin",
            UserRole::Teacher => "Teacher",
        };
        Bson::String(s.to_string())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub username: String,
    pub password_hash: String,
    pub role: UserRole,
    /// Set for CentreAdmin and Teacher users, absent for Admin.
    pub centre_id: Option<ObjectId>,
    pub created_at: DateTime,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyCentre {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub code: String,
    pub name: String,
    pub address: String,
    pub district: String,
    pub phone: String,
    pub active: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StudentStatus {
    Active,
    Withdrawn,
    Completed,
}

impl From<StudentStatus> for Bson {
    fn from(status: StudentStatus) -> Self {
        let s = match status {
            StudentStatus::Active => "Active",
            StudentStatus::Withdrawn => "Withdrawn",
            StudentStatus::Completed => "Completed",
        };
        Bson::String(s.to_string())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub admission_no: String,
    pub name: String,
    pub father_name: String,
    pub mother_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: String,
    pub phone: String,
    pub address: String,
    pub centre_id: ObjectId,
    pub academic_year: String,
    pub subject_ids: Vec<ObjectId>,
    pub status: StudentStatus,
    /// S3 object key of the student photo, once uploaded.
    pub photo_key: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    pub qualification: String,
    pub phone: String,
    pub email: String,
    pub centre_id: ObjectId,
    pub subject_ids: Vec<ObjectId>,
    pub active: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub code: String,
    pub name: String,
    pub max_cce_marks: f64,
    pub max_sa_marks: f64,
    pub pass_percent: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ExamTerm {
    #[serde(rename = "SA1")]
    Sa1,
    #[serde(rename = "SA2")]
    Sa2,
    #[serde(rename = "ANNUAL")]
    Annual,
    #[serde(rename = "SUPPLEMENTARY")]
    Supplementary,
}

impl From<ExamTerm> for Bson {
    fn from(term: ExamTerm) -> Self {
        let s = match term {
            ExamTerm::Sa1 => "SA1",
            ExamTerm::Sa2 => "SA2",
            ExamTerm::Annual => "ANNUAL",
            ExamTerm::Supplementary => "SUPPLEMENTARY",
        };
        Bson::String(s.to_string())
    }
}

/// One sitting on the exam timetable.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamSlot {
    pub subject_id: ObjectId,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    pub academic_year: String,
    pub term: ExamTerm,
    pub schedule: Vec<ExamSlot>,
    pub results_published: bool,
}

/// Formative (continuous/comprehensive evaluation) mark.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CceMark {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub student_id: ObjectId,
    pub subject_id: ObjectId,
    pub exam_id: ObjectId,
    pub marks: f64,
    pub max_marks: f64,
    pub entered_by: ObjectId,
    pub entered_at: DateTime,
}

/// Summative (term-end) mark.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaMark {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub student_id: ObjectId,
    pub subject_id: ObjectId,
    pub exam_id: ObjectId,
    pub marks: f64,
    pub max_marks: f64,
    pub absent: bool,
    pub entered_by: ObjectId,
    pub entered_at: DateTime,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectResult {
    pub subject_id: ObjectId,
    pub cce_marks: f64,
    pub sa_marks: f64,
    pub absent: bool,
    pub total: f64,
    pub max_total: f64,
    pub percent: f64,
    pub grade: String,
    pub passed: bool,
}

/// Published tabulation for one student in one exam.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamResult {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub exam_id: ObjectId,
    pub student_id: ObjectId,
    pub centre_id: ObjectId,
    pub subjects: Vec<SubjectResult>,
    pub grand_total: f64,
    pub grand_max: f64,
    pub percent: f64,
    pub grade: String,
    pub passed: bool,
    pub failed_subject_ids: Vec<ObjectId>,
    /// Dense rank within the student's centre, 1-based.
    pub rank: u32,
    pub published_at: DateTime,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub title: String,
    pub body: String,
    /// Absent for broadcasts to all centres.
    pub centre_id: Option<ObjectId>,
    pub sender_id: ObjectId,
    pub sent_at: DateTime,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplementaryRegistration {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    /// The supplementary exam being registered for.
    pub exam_id: ObjectId,
    /// The exam whose failure made the student eligible.
    pub source_exam_id: ObjectId,
    pub student_id: ObjectId,
    pub subject_ids: Vec<ObjectId>,
    pub registered_at: DateTime,
}

use std::collections::HashMap;

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
};
use base64::Engine;
use chrono::NaiveDate;
use futures_util::TryStreamExt;
use models::{
    CceMark, SaMark, Student, StudentStatus, StudyCentre, Subject, UserRole, db,
};
use mongodb::{
    Collection,
    bson::{DateTime, Document, doc, oid::ObjectId},
    options::UpdateOneModel,
};
use portal_utils::sheet::{self, RowError, StudentRow};
use serde::{Deserialize, Serialize};

use super::{parse_object_id, xlsx_attachment};
use crate::{auth::AuthUser, config::AppState, error::Error};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRequest {
    /// Assigned by the server when absent.
    pub admission_no: Option<String>,
    pub name: String,
    pub father_name: String,
    pub mother_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: String,
    pub phone: String,
    pub address: String,
    pub centre_id: String,
    pub academic_year: String,
    pub subject_ids: Vec<String>,
    pub status: Option<StudentStatus>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentListQuery {
    pub centre_id: Option<String>,
    pub academic_year: Option<String>,
    pub status: Option<StudentStatus>,
    pub limit: Option<i64>,
    pub skip: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub inserted: usize,
    pub updated: usize,
    pub errors: Vec<RowError>,
}

fn require_admissions_role(auth: &AuthUser) -> Result<(), Error> {
    if auth.role == UserRole::Teacher {
        return Err(Error::Forbidden(
            "admissions require the Admin or CentreAdmin role".to_string(),
        ));
    }
    Ok(())
}

async fn resolve_centre(state: &AppState, centre_id: ObjectId) -> Result<StudyCentre, Error> {
    let centres = db::get_collection::<StudyCentre>(&state.mongo, "StudyCentre");
    let centre = centres
        .find_one(doc! {"_id": centre_id})
        .await?
        .ok_or_else(|| Error::Unprocessable(format!("no centre with id {centre_id}")))?;
    if !centre.active {
        return Err(Error::Unprocessable(format!(
            "centre {} is not active",
            centre.code
        )));
    }
    Ok(centre)
}

async fn resolve_subjects(
    state: &AppState,
    raw_ids: &[String],
) -> Result<Vec<ObjectId>, Error> {
    if raw_ids.is_empty() {
        return Err(Error::Unprocessable(
            "a student must be enrolled in at least one subject".to_string(),
        ));
    }
    let mut subject_ids = Vec::with_capacity(raw_ids.len());
    for raw in raw_ids {
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
    Ok(subject_ids)
}

/// Next admission number of the shape `<year>-NNNNN`, year taken from the
/// academic year label.
async fn next_admission_no(
    students: &Collection<Student>,
    academic_year: &str,
) -> Result<String, Error> {
    let year: String = academic_year.chars().take(4).collect();

    #[derive(Deserialize)]
    struct AdmissionNoOnly {
        #[serde(rename = "admissionNo")]
        admission_no: String,
    }
    let last = students
        .clone_with_type::<AdmissionNoOnly>()
        .find_one(doc! {"admissionNo": {"$regex": format!("^{year}-")}})
        .projection(doc! {"admissionNo": true})
        .sort(doc! {"admissionNo": -1})
        .await?;

    let next = match last {
        Some(doc) => {
            doc.admission_no
                .rsplit('-')
                .next()
                .and_then(|s| s.parse::<u32>().ok())
                .unwrap_or(0)
                + 1
        }
        None => 1,
    };

    Ok(format!("{year}-{next:05}"))
}

pub async fn post_student(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<StudentRequest>,
) -> Result<(StatusCode, Json<Student>), Error> {
    require_admissions_role(&auth)?;
    let centre_id = parse_object_id(&body.centre_id)?;
    auth.check_centre(&centre_id)?;

    resolve_centre(&state, centre_id).await?;
    let subject_ids = resolve_subjects(&state, &body.subject_ids).await?;

    let students = db::get_collection::<Student>(&state.mongo, "Student");
    let admission_no = match &body.admission_no {
        Some(no) => {
            let no = no.trim().to_string();
            if students
                .find_one(doc! {"admissionNo": &no})
                .await?
                .is_some()
            {
                return Err(Error::Conflict(format!(
                    "admission number {no} already exists"
                )));
            }
            no
        }
        None => next_admission_no(&students, &body.academic_year).await?,
    };

    let now = DateTime::now();
    let student = Student {
        id: ObjectId::new(),
        admission_no,
        name: body.name,
        father_name: body.father_name,
        mother_name: body.mother_name,
        date_of_birth: body.date_of_birth,
        gender: body.gender,
        phone: body.phone,
        address: body.address,
        centre_id,
        academic_year: body.academic_year,
        subject_ids,
        status: body.status.unwrap_or(StudentStatus::Active),
        photo_key: None,
        created_at: now,
        updated_at: now,
    };
    students.insert_one(&student).await?;

    tracing::info!(student = %student.id, admission_no = %student.admission_no, "student admitted");

    Ok((StatusCode::CREATED, Json(student)))
}

pub async fn get_students(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<StudentListQuery>,
) -> Result<Json<Vec<Student>>, Error> {
    let requested = match &query.centre_id {
        Some(raw) => Some(parse_object_id(raw)?),
        None => None,
    };
    let centre_id = auth.centre_filter(requested)?;

    let mut filter = Document::new();
    if let Some(centre_id) = centre_id {
        filter.insert("centreId", centre_id);
    }
    if let Some(year) = &query.academic_year {
        filter.insert("academicYear", year);
    }
    if let Some(status) = query.status {
        filter.insert("status", status);
    }

    let students = db::get_collection::<Student>(&state.mongo, "Student");
    let found: Vec<Student> = students
        .find(filter)
        .sort(doc! {"admissionNo": 1})
        .skip(query.skip.unwrap_or(0))
        .limit(query.limit.unwrap_or(200))
        .await?
        .try_collect()
        .await?;
    Ok(Json(found))
}

pub async fn get_student(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Student>, Error> {
    let id = parse_object_id(&id)?;
    let students = db::get_collection::<Student>(&state.mongo, "Student");
    let student = students
        .find_one(doc! {"_id": id})
        .await?
        .ok_or_else(|| Error::NotFound(format!("no student with id {id}")))?;
    auth.check_centre(&student.centre_id)?;
    Ok(Json(student))
}

pub async fn put_student(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<StudentRequest>,
) -> Result<Json<Student>, Error> {
    require_admissions_role(&auth)?;
    let id = parse_object_id(&id)?;
    let centre_id = parse_object_id(&body.centre_id)?;
    auth.check_centre(&centre_id)?;

    resolve_centre(&state, centre_id).await?;
    let subject_ids = resolve_subjects(&state, &body.subject_ids).await?;

    let students = db::get_collection::<Student>(&state.mongo, "Student");
    let existing = students
        .find_one(doc! {"_id": id})
        .await?
        .ok_or_else(|| Error::NotFound(format!("no student with id {id}")))?;
    auth.check_centre(&existing.centre_id)?;

    // The admission number is immutable once assigned.
    let mut update = doc! {
        "name": &body.name,
        "fatherName": &body.father_name,
        "motherName": &body.mother_name,
        "dateOfBirth": body.date_of_birth.to_string(),
        "gender": &body.gender,
        "phone": &body.phone,
        "address": &body.address,
        "centreId": centre_id,
        "academicYear": &body.academic_year,
        "subjectIds": &subject_ids,
        "updatedAt": DateTime::now(),
    };
    if let Some(status) = body.status {
        update.insert("status", status);
    }

    let updated = students
        .find_one_and_update(doc! {"_id": id}, doc! {"$set": update})
        .return_document(mongodb::options::ReturnDocument::After)
        .await?
        .ok_or_else(|| Error::NotFound(format!("no student with id {id}")))?;

    Ok(Json(updated))
}

pub async fn delete_student(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<StatusCode, Error> {
    auth.require_admin()?;
    let id = parse_object_id(&id)?;

    let cce = db::get_collection::<CceMark>(&state.mongo, "CceMark");
    let sa = db::get_collection::<SaMark>(&state.mongo, "SaMark");
    let recorded = cce.count_documents(doc! {"studentId": id}).await?
        + sa.count_documents(doc! {"studentId": id}).await?;
    if recorded > 0 {
        return Err(Error::Conflict(format!(
            "student has {recorded} recorded marks; withdraw the student instead"
        )));
    }

    let students = db::get_collection::<Student>(&state.mongo, "Student");
    let result = students.delete_one(doc! {"_id": id}).await?;
    if result.deleted_count == 0 {
        return Err(Error::NotFound(format!("no student with id {id}")));
    }

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct PhotoUploadRequest {
    /// Base64-encoded JPEG.
    pub image: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoUploadResponse {
    pub photo_key: String,
}

pub async fn post_student_photo(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<PhotoUploadRequest>,
) -> Result<Json<PhotoUploadResponse>, Error> {
    require_admissions_role(&auth)?;
    let id = parse_object_id(&id)?;

    let students = db::get_collection::<Student>(&state.mongo, "Student");
    let student = students
        .find_one(doc! {"_id": id})
        .await?
        .ok_or_else(|| Error::NotFound(format!("no student with id {id}")))?;
    auth.check_centre(&student.centre_id)?;

    let image = base64::engine::general_purpose::STANDARD
        .decode(&body.image)
        .map_err(|_| Error::Unprocessable("image is not valid base64".to_string()))?;

    let photo_key = crate::s3::upload_student_photo(
        &state.s3,
        &state.env_vars.photo_bucket_name,
        image,
        &student.admission_no,
    )
    .await?;

    students
        .update_one(
            doc! {"_id": id},
            doc! {"$set": {"photoKey": &photo_key, "updatedAt": DateTime::now()}},
        )
        .await?;

    Ok(Json(PhotoUploadResponse { photo_key }))
}

/// Bulk admission import from an XLSX workbook.
///
/// Rows are resolved independently: a bad row lands in the error report
/// while the rest are written. Rows upsert by admission number; rows
/// without one are admitted with a generated number.
#[tracing::instrument(skip_all)]
pub async fn post_students_import(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    body: Bytes,
) -> Result<Json<ImportReport>, Error> {
    auth.require_admin()?;

    let parsed = sheet::parse_student_sheet(&body)?;
    let mut errors = parsed.errors;

    let centres = db::get_collection::<StudyCentre>(&state.mongo, "StudyCentre");
    let subjects = db::get_collection::<Subject>(&state.mongo, "Subject");
    let students = db::get_collection::<Student>(&state.mongo, "Student");

    let centre_by_code: HashMap<String, StudyCentre> = centres
        .find(doc! {})
        .await?
        .try_collect::<Vec<StudyCentre>>()
        .await?
        .into_iter()
        .map(|c| (c.code.clone(), c))
        .collect();
    let subject_by_code: HashMap<String, Subject> = subjects
        .find(doc! {})
        .await?
        .try_collect::<Vec<Subject>>()
        .await?
        .into_iter()
        .map(|s| (s.code.clone(), s))
        .collect();

    // Resolve centre and subject codes; drop bad rows into the report.
    let mut resolved: Vec<(StudentRow, ObjectId, Vec<ObjectId>)> = Vec::new();
    let mut seen_admission_nos: Vec<String> = Vec::new();
    for row in parsed.rows {
        let Some(centre) = centre_by_code.get(&row.centre_code) else {
            errors.push(RowError {
                row: row.row,
                message: format!("unknown centre code \"{}\"", row.centre_code),
            });
            continue;
        };
        if !centre.active {
            errors.push(RowError {
                row: row.row,
                message: format!("centre \"{}\" is not active", row.centre_code),
            });
            continue;
        }

        let mut subject_ids = Vec::with_capacity(row.subject_codes.len());
        let mut bad_subject = None;
        for code in &row.subject_codes {
            match subject_by_code.get(code) {
                Some(subject) => subject_ids.push(subject.id),
                None => {
                    bad_subject = Some(code.clone());
                    break;
                }
            }
        }
        if let Some(code) = bad_subject {
            errors.push(RowError {
                row: row.row,
                message: format!("unknown subject code \"{code}\""),
            });
            continue;
        }

        if let Some(no) = &row.admission_no {
            if seen_admission_nos.contains(no) {
                errors.push(RowError {
                    row: row.row,
                    message: format!("duplicate admission number {no} in sheet"),
                });
                continue;
            }
            seen_admission_nos.push(no.clone());
        }

        resolved.push((row, centre.id, subject_ids));
    }

    let existing: Vec<Student> = if seen_admission_nos.is_empty() {
        Vec::new()
    } else {
        students
            .find(doc! {"admissionNo": {"$in": &seen_admission_nos}})
            .await?
            .try_collect()
            .await?
    };
    let existing_by_no: HashMap<String, ObjectId> = existing
        .into_iter()
        .map(|s| (s.admission_no, s.id))
        .collect();

    let now = DateTime::now();
    let namespace = super::namespace(&state, "Student");
    let mut updates = Vec::new();
    let mut inserts: Vec<Student> = Vec::new();
    // Sequence numbers handed out per year prefix for rows without an
    // admission number.
    let mut next_by_year: HashMap<String, String> = HashMap::new();

    for (row, centre_id, subject_ids) in resolved {
        match row.admission_no.as_ref().and_then(|no| existing_by_no.get(no)) {
            Some(existing_id) => {
                updates.push(
                    UpdateOneModel::builder()
                        .namespace(namespace.clone())
                        .filter(doc! {"_id": existing_id})
                        .update(doc! {"$set": {
                            "name": &row.name,
                            "fatherName": &row.father_name,
                            "motherName": &row.mother_name,
                            "dateOfBirth": row.date_of_birth.to_string(),
                            "gender": &row.gender,
                            "phone": &row.phone,
                            "address": &row.address,
                            "centreId": centre_id,
                            "academicYear": &row.academic_year,
                            "subjectIds": &subject_ids,
                            "updatedAt": now,
                        }})
                        .build(),
                );
            }
            None => {
                let admission_no = match row.admission_no {
                    Some(no) => no,
                    None => {
                        let year: String = row.academic_year.chars().take(4).collect();
                        let no = match next_by_year.get(&year) {
                            Some(last) => bump_admission_no(last),
                            None => next_admission_no(&students, &row.academic_year).await?,
                        };
                        next_by_year.insert(year, no.clone());
                        no
                    }
                };
                inserts.push(Student {
                    id: ObjectId::new(),
                    admission_no,
                    name: row.name,
                    father_name: row.father_name,
                    mother_name: row.mother_name,
                    date_of_birth: row.date_of_birth,
                    gender: row.gender,
                    phone: row.phone,
                    address: row.address,
                    centre_id,
                    academic_year: row.academic_year,
                    subject_ids,
                    status: StudentStatus::Active,
                    photo_key: None,
                    created_at: now,
                    updated_at: now,
                });
            }
        }
    }

    let updated = updates.len();
    let inserted = inserts.len();

    if !updates.is_empty() {
        let res = state.mongo.bulk_write(updates).await?;
        tracing::info!(num = res.modified_count, "updated students from import");
    }
    if !inserts.is_empty() {
        students.insert_many(&inserts).await?;
        tracing::info!(num = inserted, "admitted students from import");
    }

    Ok(Json(ImportReport {
        inserted,
        updated,
        errors,
    }))
}

/// Increments the `NNNNN` suffix of an admission number.
fn bump_admission_no(no: &str) -> String {
    let (prefix, suffix) = no.rsplit_once('-').unwrap_or(("", no));
    let next = suffix.parse::<u32>().unwrap_or(0) + 1;
    format!("{prefix}-{next:05}")
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentExportQuery {
    pub centre_id: Option<String>,
    pub academic_year: Option<String>,
}

pub async fn get_students_export(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<StudentExportQuery>,
) -> Result<Response, Error> {
    let requested = match &query.centre_id {
        Some(raw) => Some(parse_object_id(raw)?),
        None => None,
    };
    let centre_id = auth.centre_filter(requested)?;

    let mut filter = Document::new();
    if let Some(centre_id) = centre_id {
        filter.insert("centreId", centre_id);
    }
    if let Some(year) = &query.academic_year {
        filter.insert("academicYear", year);
    }

    let students = db::get_collection::<Student>(&state.mongo, "Student");
    let found: Vec<Student> = students
        .find(filter)
        .sort(doc! {"admissionNo": 1})
        .await?
        .try_collect()
        .await?;

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

    let bytes = sheet::write_student_sheet(&found, &centre_map, &subject_map)?;

    Ok(xlsx_attachment("students.xlsx", bytes))
}

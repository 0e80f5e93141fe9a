use axum::{Extension, Json, extract::State};
use chrono::{NaiveDate, NaiveTime};
use futures_util::TryStreamExt;
use models::{
    CceMark, Exam, ExamSlot, ExamTerm, SaMark, Student, StudentStatus, Subject, UserRole, db,
};
use mongo_drop::MongoDrop;
use mongodb::bson::{DateTime, doc, oid::ObjectId};
use portal_service::{
    auth::AuthUser,
    config::{AppState, EnvVars},
    error::Error,
    routes,
};

async fn test_state(mongo_uri: &str) -> AppState {
    let mongo = db::client(mongo_uri).await.unwrap();
    let aws = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    AppState {
        mongo,
        s3: aws_sdk_s3::Client::new(&aws),
        env_vars: EnvVars {
            mongodb_uri: mongo_uri.to_string(),
            jwt_secret: "0123456789abcdef0123456789abcdef".to_string(),
            token_expiry_in_s: 3600,
            photo_bucket_name: "test-bucket".to_string(),
            port: 0,
            request_body_size_limit: 10 * 1024 * 1024,
            request_timeout_in_ms: 30_000,
        },
    }
}

fn admin() -> AuthUser {
    AuthUser {
        user_id: ObjectId::new(),
        role: UserRole::Admin,
        centre_id: None,
    }
}

fn student(centre_id: ObjectId, admission_no: &str, subject_ids: Vec<ObjectId>) -> Student {
    Student {
        id: ObjectId::new(),
        admission_no: admission_no.to_string(),
        name: format!("Student {admission_no}"),
        father_name: "Father".to_string(),
        mother_name: "Mother".to_string(),
        date_of_birth: NaiveDate::from_ymd_opt(2008, 1, 1).unwrap(),
        gender: "M".to_string(),
        phone: String::new(),
        address: String::new(),
        centre_id,
        academic_year: "2025-26".to_string(),
        subject_ids,
        status: StudentStatus::Active,
        photo_key: None,
        created_at: DateTime::now(),
        updated_at: DateTime::now(),
    }
}

/// Enter a batch with one invalid entry (nothing written), then a valid
/// batch, then re-enter to overwrite, then lock the exam by publishing.
#[tokio::test]
#[ignore = "requires a running MongoDB (set MONGODB_URI)"]
async fn mark_entry_is_atomic_and_upserts() {
    dotenvy::dotenv().ok();
    let mongo_uri = std::env::var("MONGODB_URI").unwrap();
    let state = test_state(&mongo_uri).await;

    let _guard = MongoDrop::new(&state.mongo.default_database().unwrap())
        .await
        .unwrap();

    let maths = Subject {
        id: ObjectId::new(),
        code: "302".to_string(),
        name: "Mathematics".to_string(),
        max_cce_marks: 20.0,
        max_sa_marks: 80.0,
        pass_percent: 33.0,
    };
    db::get_collection::<Subject>(&state.mongo, "Subject")
        .insert_one(&maths)
        .await
        .unwrap();

    let centre_id = ObjectId::new();
    let enrolled = student(centre_id, "2025-00001", vec![maths.id]);
    let unenrolled = student(centre_id, "2025-00002", vec![]);
    db::get_collection::<Student>(&state.mongo, "Student")
        .insert_many([&enrolled, &unenrolled])
        .await
        .unwrap();

    let exam = Exam {
        id: ObjectId::new(),
        name: "SA1 Examination".to_string(),
        academic_year: "2025-26".to_string(),
        term: ExamTerm::Sa1,
        schedule: vec![ExamSlot {
            subject_id: maths.id,
            date: NaiveDate::from_ymd_opt(2025, 9, 20).unwrap(),
            start_time: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(12, 30, 0).unwrap(),
        }],
        results_published: false,
    };
    let exam_collection = db::get_collection::<Exam>(&state.mongo, "Exam");
    exam_collection.insert_one(&exam).await.unwrap();

    let cce_collection = db::get_collection::<CceMark>(&state.mongo, "CceMark");

    // One entry names a student who is not enrolled in the subject. The
    // whole batch is refused and nothing lands in the collection.
    let response = routes::marks::put_cce_marks(
        State(state.clone()),
        Extension(admin()),
        Json(routes::marks::CceEntryRequest {
            exam_id: exam.id.to_hex(),
            subject_id: maths.id.to_hex(),
            entries: vec![
                routes::marks::CceEntry {
                    student_id: enrolled.id.to_hex(),
                    marks: 17.0,
                },
                routes::marks::CceEntry {
                    student_id: unenrolled.id.to_hex(),
                    marks: 12.0,
                },
            ],
        }),
    )
    .await
    .unwrap();
    assert_eq!(
        response.status(),
        axum::http::StatusCode::UNPROCESSABLE_ENTITY
    );
    assert_eq!(
        cce_collection
            .count_documents(doc! {"examId": exam.id})
            .await
            .unwrap(),
        0
    );

    // A clean batch writes, and re-entering overwrites the same record.
    for marks in [17.0, 19.0] {
        let response = routes::marks::put_cce_marks(
            State(state.clone()),
            Extension(admin()),
            Json(routes::marks::CceEntryRequest {
                exam_id: exam.id.to_hex(),
                subject_id: maths.id.to_hex(),
                entries: vec![routes::marks::CceEntry {
                    student_id: enrolled.id.to_hex(),
                    marks,
                }],
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
    let recorded: Vec<CceMark> = cce_collection
        .find(doc! {"examId": exam.id})
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].marks, 19.0);

    // An absent SA entry cannot carry marks.
    let response = routes::marks::put_sa_marks(
        State(state.clone()),
        Extension(admin()),
        Json(routes::marks::SaEntryRequest {
            exam_id: exam.id.to_hex(),
            subject_id: maths.id.to_hex(),
            entries: vec![routes::marks::SaEntry {
                student_id: enrolled.id.to_hex(),
                marks: 40.0,
                absent: true,
            }],
        }),
    )
    .await
    .unwrap();
    assert_eq!(
        response.status(),
        axum::http::StatusCode::UNPROCESSABLE_ENTITY
    );

    // Once results are published the exam no longer accepts marks.
    exam_collection
        .update_one(
            doc! {"_id": exam.id},
            doc! {"$set": {"resultsPublished": true}},
        )
        .await
        .unwrap();
    let err = routes::marks::put_cce_marks(
        State(state.clone()),
        Extension(admin()),
        Json(routes::marks::CceEntryRequest {
            exam_id: exam.id.to_hex(),
            subject_id: maths.id.to_hex(),
            entries: vec![routes::marks::CceEntry {
                student_id: enrolled.id.to_hex(),
                marks: 10.0,
            }],
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
}

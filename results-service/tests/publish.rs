use chrono::{NaiveDate, NaiveTime};
use futures_util::TryStreamExt;
use models::{
    CceMark, Exam, ExamResult, ExamSlot, ExamTerm, SaMark, Student, StudentStatus, Subject, db,
};
use mongo_drop::MongoDrop;
use mongodb::bson::{DateTime, doc, oid::ObjectId};
use results_service::{config::EnvVars, db::publish_exam_results};

fn subject(code: &str) -> Subject {
    Subject {
        id: ObjectId::new(),
        code: code.to_string(),
        name: format!("Subject {code}"),
        max_cce_marks: 20.0,
        max_sa_marks: 80.0,
        pass_percent: 33.0,
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
        gender: "F".to_string(),
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

fn cce(student: &Student, subject: &Subject, exam: &Exam, marks: f64) -> CceMark {
    CceMark {
        id: ObjectId::new(),
        student_id: student.id,
        subject_id: subject.id,
        exam_id: exam.id,
        marks,
        max_marks: subject.max_cce_marks,
        entered_by: ObjectId::new(),
        entered_at: DateTime::now(),
    }
}

fn sa(student: &Student, subject: &Subject, exam: &Exam, marks: f64, absent: bool) -> SaMark {
    SaMark {
        id: ObjectId::new(),
        student_id: student.id,
        subject_id: subject.id,
        exam_id: exam.id,
        marks,
        max_marks: subject.max_sa_marks,
        absent,
        entered_by: ObjectId::new(),
        entered_at: DateTime::now(),
    }
}

/// Seed an exam with marks for three students of one centre, publish,
/// and check ranks, pass flags and republish idempotency.
#[tokio::test]
#[ignore = "requires a running MongoDB (set MONGODB_URI)"]
async fn publication_assigns_dense_ranks_and_is_idempotent() {
    dotenvy::dotenv().ok();
    let mongo_uri = std::env::var("MONGODB_URI").unwrap();
    let client = db::client(&mongo_uri).await.unwrap();

    let _guard = MongoDrop::new(&client.default_database().unwrap())
        .await
        .unwrap();

    let subject_collection = db::get_collection::<Subject>(&client, "Subject");
    let student_collection = db::get_collection::<Student>(&client, "Student");
    let exam_collection = db::get_collection::<Exam>(&client, "Exam");
    let cce_collection = db::get_collection::<CceMark>(&client, "CceMark");
    let sa_collection = db::get_collection::<SaMark>(&client, "SaMark");
    let result_collection = db::get_collection::<ExamResult>(&client, "Result");

    let maths = subject("302");
    let science = subject("303");
    subject_collection
        .insert_many([&maths, &science])
        .await
        .unwrap();

    let centre_id = ObjectId::new();
    let student_1 = student(centre_id, "2025-00001", vec![maths.id, science.id]);
    let student_2 = student(centre_id, "2025-00002", vec![maths.id, science.id]);
    let student_3 = student(centre_id, "2025-00003", vec![maths.id, science.id]);
    student_collection
        .insert_many([&student_1, &student_2, &student_3])
        .await
        .unwrap();

    let exam = Exam {
        id: ObjectId::new(),
        name: "Annual Examination".to_string(),
        academic_year: "2025-26".to_string(),
        term: ExamTerm::Annual,
        schedule: vec![
            ExamSlot {
                subject_id: maths.id,
                date: NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
                start_time: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(12, 30, 0).unwrap(),
            },
            ExamSlot {
                subject_id: science.id,
                date: NaiveDate::from_ymd_opt(2026, 3, 12).unwrap(),
                start_time: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(12, 30, 0).unwrap(),
            },
        ],
        results_published: false,
    };
    exam_collection.insert_one(&exam).await.unwrap();

    // Students 1 and 2 tie on grand total; student 3 fails both papers.
    cce_collection
        .insert_many([
            &cce(&student_1, &maths, &exam, 18.0),
            &cce(&student_1, &science, &exam, 15.0),
            &cce(&student_2, &maths, &exam, 13.0),
            &cce(&student_2, &science, &exam, 20.0),
            &cce(&student_3, &maths, &exam, 5.0),
        ])
        .await
        .unwrap();
    sa_collection
        .insert_many([
            &sa(&student_1, &maths, &exam, 70.0, false),
            &sa(&student_1, &science, &exam, 60.0, false),
            &sa(&student_2, &maths, &exam, 75.0, false),
            &sa(&student_2, &science, &exam, 55.0, false),
            &sa(&student_3, &maths, &exam, 10.0, false),
            // Science paper not sat.
        ])
        .await
        .unwrap();

    let env_vars = EnvVars {
        mongodb_uri: mongo_uri.clone(),
        exam_id: exam.id,
        centre_id: None,
    };
    publish_exam_results(&env_vars).await.unwrap();

    let results: Vec<ExamResult> = result_collection
        .find(doc! {"examId": exam.id})
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(results.len(), 3);

    let result_1 = results.iter().find(|r| r.student_id == student_1.id).unwrap();
    let result_2 = results.iter().find(|r| r.student_id == student_2.id).unwrap();
    let result_3 = results.iter().find(|r| r.student_id == student_3.id).unwrap();

    assert_eq!(result_1.grand_total, 163.0);
    assert_eq!(result_2.grand_total, 163.0);
    assert_eq!(result_1.rank, 1);
    assert_eq!(result_2.rank, 1);
    assert_eq!(result_3.rank, 2);

    assert!(result_1.passed);
    assert!(result_2.passed);
    assert!(!result_3.passed);
    // Maths failed on percent, science failed absent.
    assert_eq!(result_3.failed_subject_ids.len(), 2);
    let science_row = result_3
        .subjects
        .iter()
        .find(|s| s.subject_id == science.id)
        .unwrap();
    assert!(science_row.absent);
    assert_eq!(science_row.grade, "AB");

    let published_exam = exam_collection
        .find_one(doc! {"_id": exam.id})
        .await
        .unwrap()
        .unwrap();
    assert!(published_exam.results_published);

    // Republication replaces rather than duplicates.
    publish_exam_results(&env_vars).await.unwrap();
    let republished: Vec<ExamResult> = result_collection
        .find(doc! {"examId": exam.id})
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(republished.len(), 3);
}

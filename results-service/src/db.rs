use std::collections::HashMap;

use anyhow::Context;
use futures_util::TryStreamExt;
use mongodb::bson::{DateTime, doc, oid::ObjectId};

use models::{
    CceMark, Exam, ExamResult, SaMark, Student, StudentStatus, Subject,
    db::{client, get_collection},
};
use portal_utils::marksheet::{Tabulation, dense_ranks, tabulate_student};

use crate::config::EnvVars;

/// Tabulates and publishes results for one exam:
/// 1. Loads the exam, subject catalogue, active students and all marks
///    recorded for the exam
/// 2. Computes per-student subject rows, grand totals and grades
/// 3. Assigns dense ranks per study centre on grand total
/// 4. Replaces any previously published `Result` documents for the exam
/// 5. Flags the exam as published
///
/// Re-running replaces the prior tabulation.
#[tracing::instrument(skip_all, err(Debug))]
pub async fn publish_exam_results(env_vars: &EnvVars) -> anyhow::Result<()> {
    let client = client(&env_vars.mongodb_uri).await?;

    let exam_collection = get_collection::<Exam>(&client, "Exam");
    let student_collection = get_collection::<Student>(&client, "Student");
    let subject_collection = get_collection::<Subject>(&client, "Subject");
    let cce_collection = get_collection::<CceMark>(&client, "CceMark");
    let sa_collection = get_collection::<SaMark>(&client, "SaMark");
    let result_collection = get_collection::<ExamResult>(&client, "Result");

    let exam = exam_collection
        .find_one(doc! {"_id": env_vars.exam_id})
        .await?
        .context("exam to publish must exist")?;

    let subjects: Vec<Subject> = subject_collection
        .find(doc! {})
        .await?
        .try_collect()
        .await
        .context("unable to load subject catalogue")?;

    let mut student_filter = doc! {"status": StudentStatus::Active};
    if let Some(centre_id) = env_vars.centre_id {
        student_filter.insert("centreId", centre_id);
    }
    let students: Vec<Student> = student_collection
        .find(student_filter)
        .await?
        .try_collect()
        .await
        .context("unable to load students")?;

    let cce_marks: Vec<CceMark> = cce_collection
        .find(doc! {"examId": exam.id})
        .await?
        .try_collect()
        .await
        .context("unable to load CCE marks")?;
    let sa_marks: Vec<SaMark> = sa_collection
        .find(doc! {"examId": exam.id})
        .await?
        .try_collect()
        .await
        .context("unable to load SA marks")?;

    tracing::info!(
        exam = %exam.id,
        students = students.len(),
        cce = cce_marks.len(),
        sa = sa_marks.len(),
        "tabulating"
    );

    let mut tabulated: Vec<(Student, Tabulation)> = Vec::with_capacity(students.len());
    for student in students {
        let tabulation = tabulate_student(&student, &subjects, &cce_marks, &sa_marks)
            .with_context(|| format!("unable to tabulate student {}", student.id))?;
        tabulated.push((student, tabulation));
    }

    // Rank within each centre on grand total.
    let mut centre_groups: HashMap<ObjectId, Vec<usize>> = HashMap::new();
    for (idx, (student, _)) in tabulated.iter().enumerate() {
        centre_groups
            .entry(student.centre_id)
            .or_default()
            .push(idx);
    }

    let mut ranks: Vec<u32> = vec![0; tabulated.len()];
    for indices in centre_groups.values() {
        let totals: Vec<f64> = indices
            .iter()
            .map(|&idx| tabulated[idx].1.grand_total)
            .collect();
        for (&idx, rank) in indices.iter().zip(dense_ranks(&totals)) {
            ranks[idx] = rank;
        }
    }

    let published_at = DateTime::now();
    let results: Vec<ExamResult> = tabulated
        .into_iter()
        .zip(ranks)
        .map(|((student, tabulation), rank)| ExamResult {
            id: ObjectId::new(),
            exam_id: exam.id,
            student_id: student.id,
            centre_id: student.centre_id,
            subjects: tabulation.subjects,
            grand_total: tabulation.grand_total,
            grand_max: tabulation.grand_max,
            percent: tabulation.percent,
            grade: tabulation.grade,
            passed: tabulation.passed,
            failed_subject_ids: tabulation.failed_subject_ids,
            rank,
            published_at,
        })
        .collect();

    let mut delete_filter = doc! {"examId": exam.id};
    if let Some(centre_id) = env_vars.centre_id {
        delete_filter.insert("centreId", centre_id);
    }
    let delete_result = result_collection
        .delete_many(delete_filter)
        .await
        .context("unable to delete prior results")?;
    if delete_result.deleted_count > 0 {
        tracing::info!(num = delete_result.deleted_count, "replaced prior results");
    }

    if !results.is_empty() {
        result_collection
            .insert_many(&results)
            .await
            .context("unable to insert results")?;
    }

    exam_collection
        .update_one(
            doc! {"_id": exam.id},
            doc! {"$set": {"resultsPublished": true}},
        )
        .await
        .context("unable to flag exam as published")?;

    tracing::info!(num = results.len(), exam = %exam.id, "results published");

    Ok(())
}

use models::{CceMark, SaMark, Student, Subject, SubjectResult};
use mongodb::bson::oid::ObjectId;

use crate::error::Error;

/// Grade band for a 0..=100 percent, lowest passing band at 33.
pub fn grade_for_percent(percent: f64) -> &'static str {
    if percent >= 91.0 {
        "A1"
    } else if percent >= 81.0 {
        "A2"
    } else if percent >= 71.0 {
        "B1"
    } else if percent >= 61.0 {
        "B2"
    } else if percent >= 51.0 {
        "C1"
    } else if percent >= 41.0 {
        "C2"
    } else if percent >= 33.0 {
        "D"
    } else {
        "E"
    }
}

/// Combines the formative and summative marks of one subject.
///
/// A missing CCE record counts as zero; a missing SA record counts as
/// absent. Absent students cannot pass and are graded "AB".
pub fn subject_result(
    subject: &Subject,
    cce: Option<&CceMark>,
    sa: Option<&SaMark>,
) -> SubjectResult {
    let cce_marks = cce.map(|m| m.marks).unwrap_or(0.0);
    let (sa_marks, absent) = match sa {
        Some(m) if m.absent => (0.0, true),
        Some(m) => (m.marks, false),
        None => (0.0, true),
    };

    let max_total = subject.max_cce_marks + subject.max_sa_marks;
    let total = cce_marks + sa_marks;
    let percent = if max_total > 0.0 {
        (total / max_total) * 100.0
    } else {
        0.0
    };
    let passed = !absent && percent >= subject.pass_percent;
    let grade = if absent {
        "AB".to_string()
    } else {
        grade_for_percent(percent).to_string()
    };

    SubjectResult {
        subject_id: subject.id,
        cce_marks,
        sa_marks,
        absent,
        total,
        max_total,
        percent,
        grade,
        passed,
    }
}

#[derive(Clone, Debug)]
pub struct Tabulation {
    pub subjects: Vec<SubjectResult>,
    pub grand_total: f64,
    pub grand_max: f64,
    pub percent: f64,
    pub grade: String,
    pub passed: bool,
    pub failed_subject_ids: Vec<ObjectId>,
}

/// Tabulates one student for one exam.
///
/// `subjects` is the subject catalogue; `cce` and `sa` are the mark
/// records of the whole exam, filtered to the student here. The student
/// must be enrolled in every subject tabulated; marks for subjects the
/// student is not enrolled in are ignored.
pub fn tabulate_student(
    student: &Student,
    subjects: &[Subject],
    cce: &[CceMark],
    sa: &[SaMark],
) -> Result<Tabulation, Error> {
    let mut subject_results = Vec::with_capacity(student.subject_ids.len());

    for subject_id in &student.subject_ids {
        let subject = subjects
            .iter()
            .find(|s| &s.id == subject_id)
            .ok_or_else(|| {
                Error::Tabulation(format!(
                    "Enrolled subject {} of student {} must exist in the subject catalogue",
                    subject_id, student.id
                ))
            })?;

        let cce_mark = cce
            .iter()
            .find(|m| m.student_id == student.id && &m.subject_id == subject_id);
        let sa_mark = sa
            .iter()
            .find(|m| m.student_id == student.id && &m.subject_id == subject_id);

        subject_results.push(subject_result(subject, cce_mark, sa_mark));
    }

    let grand_total: f64 = subject_results.iter().map(|r| r.total).sum();
    let grand_max: f64 = subject_results.iter().map(|r| r.max_total).sum();
    let percent = if grand_max > 0.0 {
        (grand_total / grand_max) * 100.0
    } else {
        0.0
    };
    let failed_subject_ids: Vec<ObjectId> = subject_results
        .iter()
        .filter(|r| !r.passed)
        .map(|r| r.subject_id)
        .collect();
    let passed = failed_subject_ids.is_empty() && !subject_results.is_empty();

    Ok(Tabulation {
        subjects: subject_results,
        grand_total,
        grand_max,
        percent,
        grade: grade_for_percent(percent).to_string(),
        passed,
        failed_subject_ids,
    })
}

/// Dense rank per input index, 1-based, over grand totals.
///
/// Equal totals share a rank and the next distinct total takes the next
/// consecutive rank.
pub fn dense_ranks(grand_totals: &[f64]) -> Vec<u32> {
    let mut order: Vec<usize> = (0..grand_totals.len()).collect();
    order.sort_by(|&a, &b| {
        grand_totals[b]
            .partial_cmp(&grand_totals[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut ranks = vec![0u32; grand_totals.len()];
    let mut rank = 0u32;
    let mut previous: Option<f64> = None;
    for idx in order {
        let total = grand_totals[idx];
        if previous != Some(total) {
            rank += 1;
            previous = Some(total);
        }
        ranks[idx] = rank;
    }
    ranks
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use models::StudentStatus;
    use mongodb::bson::DateTime;

    fn subject(max_cce: f64, max_sa: f64, pass_percent: f64) -> Subject {
        Subject {
            id: ObjectId::new(),
            code: "302".to_string(),
            name: "Mathematics".to_string(),
            max_cce_marks: max_cce,
            max_sa_marks: max_sa,
            pass_percent,
        }
    }

    fn student(subject_ids: Vec<ObjectId>) -> Student {
        Student {
            id: ObjectId::new(),
            admission_no: "2025-00001".to_string(),
            name: "A Student".to_string(),
            father_name: "A Father".to_string(),
            mother_name: "A Mother".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(2008, 4, 1).unwrap(),
            gender: "F".to_string(),
            phone: "9000000000".to_string(),
            address: "Somewhere".to_string(),
            centre_id: ObjectId::new(),
            academic_year: "2025-26".to_string(),
            subject_ids,
            status: StudentStatus::Active,
            photo_key: None,
            created_at: DateTime::now(),
            updated_at: DateTime::now(),
        }
    }

    fn cce_mark(student_id: ObjectId, subject_id: ObjectId, exam_id: ObjectId, marks: f64) -> CceMark {
        CceMark {
            id: ObjectId::new(),
            student_id,
            subject_id,
            exam_id,
            marks,
            max_marks: 20.0,
            entered_by: ObjectId::new(),
            entered_at: DateTime::now(),
        }
    }

    fn sa_mark(
        student_id: ObjectId,
        subject_id: ObjectId,
        exam_id: ObjectId,
        marks: f64,
        absent: bool,
    ) -> SaMark {
        SaMark {
            id: ObjectId::new(),
            student_id,
            subject_id,
            exam_id,
            marks,
            max_marks: 80.0,
            absent,
            entered_by: ObjectId::new(),
            entered_at: DateTime::now(),
        }
    }

    #[test]
    fn grade_bands_have_inclusive_lower_edges() {
        assert_eq!(grade_for_percent(91.0), "A1");
        assert_eq!(grade_for_percent(90.9), "A2");
        assert_eq!(grade_for_percent(33.0), "D");
        assert_eq!(grade_for_percent(32.9), "E");
        assert_eq!(grade_for_percent(0.0), "E");
        assert_eq!(grade_for_percent(100.0), "A1");
    }

    #[test]
    fn missing_sa_mark_counts_as_absent() {
        let subject = subject(20.0, 80.0, 33.0);
        let result = subject_result(&subject, None, None);

        assert!(result.absent);
        assert!(!result.passed);
        assert_eq!(result.grade, "AB");
        assert_eq!(result.total, 0.0);
    }

    #[test]
    fn missing_cce_mark_counts_as_zero() {
        let subject = subject(20.0, 80.0, 33.0);
        let student_id = ObjectId::new();
        let exam_id = ObjectId::new();
        let sa = sa_mark(student_id, subject.id, exam_id, 60.0, false);
        let result = subject_result(&subject, None, Some(&sa));

        assert!(!result.absent);
        assert_eq!(result.cce_marks, 0.0);
        assert_eq!(result.total, 60.0);
        assert_eq!(result.percent, 60.0);
        assert!(result.passed);
    }

    #[test]
    fn absent_sa_zeroes_the_paper_even_with_recorded_marks() {
        let subject = subject(20.0, 80.0, 33.0);
        let student_id = ObjectId::new();
        let exam_id = ObjectId::new();
        let cce = cce_mark(student_id, subject.id, exam_id, 18.0);
        let sa = sa_mark(student_id, subject.id, exam_id, 55.0, true);
        let result = subject_result(&subject, Some(&cce), Some(&sa));

        assert!(result.absent);
        assert_eq!(result.total, 18.0);
        assert_eq!(result.grade, "AB");
        assert!(!result.passed);
    }

    #[test]
    fn tabulation_fails_overall_on_one_failed_subject() {
        let maths = subject(20.0, 80.0, 33.0);
        let mut science = subject(20.0, 80.0, 33.0);
        science.code = "303".to_string();
        let student = student(vec![maths.id, science.id]);
        let exam_id = ObjectId::new();

        let cce = vec![
            cce_mark(student.id, maths.id, exam_id, 15.0),
            cce_mark(student.id, science.id, exam_id, 10.0),
        ];
        let sa = vec![
            sa_mark(student.id, maths.id, exam_id, 70.0, false),
            sa_mark(student.id, science.id, exam_id, 12.0, false),
        ];

        let tab = tabulate_student(&student, &[maths.clone(), science.clone()], &cce, &sa).unwrap();

        assert_eq!(tab.subjects.len(), 2);
        assert_eq!(tab.grand_total, 107.0);
        assert_eq!(tab.grand_max, 200.0);
        assert!(!tab.passed);
        assert_eq!(tab.failed_subject_ids, vec![science.id]);
        // 53.5% overall
        assert_eq!(tab.grade, "C1");
    }

    #[test]
    fn tabulation_requires_catalogued_subjects() {
        let maths = subject(20.0, 80.0, 33.0);
        let student = student(vec![ObjectId::new()]);

        let err = tabulate_student(&student, &[maths], &[], &[]).unwrap_err();
        assert!(err.to_string().contains("must exist in the subject catalogue"));
    }

    #[test]
    fn dense_ranks_share_on_ties_and_stay_consecutive() {
        let ranks = dense_ranks(&[90.0, 80.0, 90.0, 70.0]);
        assert_eq!(ranks, vec![1, 2, 1, 3]);
    }

    #[test]
    fn dense_ranks_of_empty_input_is_empty() {
        assert!(dense_ranks(&[]).is_empty());
    }
}

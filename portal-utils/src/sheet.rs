use std::collections::HashMap;
use std::io::Cursor;

use calamine::{Data, Reader, Xlsx};
use chrono::NaiveDate;
use models::{Student, StudyCentre, Subject};
use mongodb::bson::oid::ObjectId;
use serde::Serialize;

use crate::error::Error;

/// Column layout shared by the admission import and the student export.
pub const STUDENT_COLUMNS: [&str; 11] = [
    "Admission No",
    "Name",
    "Father Name",
    "Mother Name",
    "Date of Birth",
    "Gender",
    "Phone",
    "Address",
    "Centre Code",
    "Academic Year",
    "Subject Codes",
];

pub const SUPPLEMENTARY_COLUMNS: [&str; 4] =
    ["Admission No", "Name", "Centre Code", "Subject Codes"];

/// One parsed admission row. Row numbers are 1-based sheet rows.
#[derive(Clone, Debug, PartialEq)]
pub struct StudentRow {
    pub row: usize,
    pub admission_no: Option<String>,
    pub name: String,
    pub father_name: String,
    pub mother_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: String,
    pub phone: String,
    pub address: String,
    pub centre_code: String,
    pub academic_year: String,
    pub subject_codes: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowError {
    pub row: usize,
    pub message: String,
}

#[derive(Clone, Debug, Default)]
pub struct StudentSheet {
    pub rows: Vec<StudentRow>,
    pub errors: Vec<RowError>,
}

fn cell_string(cell: Option<&Data>) -> String {
    match cell {
        Some(Data::String(s)) => s.trim().to_string(),
        Some(Data::Float(f)) => {
            if f.fract() == 0.0 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Some(Data::Int(i)) => i.to_string(),
        Some(Data::Bool(b)) => b.to_string(),
        Some(Data::DateTimeIso(s)) => s.trim().to_string(),
        Some(Data::DateTime(dt)) => dt
            .as_datetime()
            .map(|d| d.date().to_string())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

/// Parses the first worksheet of an admission workbook.
///
/// The header row must carry every column of [`STUDENT_COLUMNS`] (any
/// order, case-insensitive). Malformed data rows are collected as
/// [`RowError`]s rather than failing the parse; a missing column or an
/// empty sheet fails the whole parse.
pub fn parse_student_sheet(bytes: &[u8]) -> Result<StudentSheet, Error> {
    let mut workbook = Xlsx::new(Cursor::new(bytes))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| Error::Sheet("workbook has no worksheets".to_string()))??;

    let mut rows = range.rows();
    let header = rows
        .next()
        .ok_or_else(|| Error::Sheet("worksheet is empty".to_string()))?;

    let mut header_index: HashMap<String, usize> = HashMap::new();
    for (idx, cell) in header.iter().enumerate() {
        let name = cell_string(Some(cell)).to_lowercase();
        if !name.is_empty() {
            header_index.entry(name).or_insert(idx);
        }
    }

    let mut columns = [0usize; STUDENT_COLUMNS.len()];
    for (i, column) in STUDENT_COLUMNS.iter().enumerate() {
        columns[i] = *header_index.get(&column.to_lowercase()).ok_or_else(|| {
            Error::Sheet(format!("missing required column \"{column}\""))
        })?;
    }
    let [
        admission_col,
        name_col,
        father_col,
        mother_col,
        dob_col,
        gender_col,
        phone_col,
        address_col,
        centre_col,
        year_col,
        subjects_col,
    ] = columns;

    let mut sheet = StudentSheet::default();

    for (idx, row) in rows.enumerate() {
        // Header is sheet row 1.
        let sheet_row = idx + 2;
        if row.iter().all(|c| cell_string(Some(c)).is_empty()) {
            continue;
        }

        let cell = |col: usize| cell_string(row.get(col));

        let name = cell(name_col);
        if name.is_empty() {
            sheet.errors.push(RowError {
                row: sheet_row,
                message: "Name is required".to_string(),
            });
            continue;
        }

        let dob_text = cell(dob_col);
        let date_of_birth = match NaiveDate::parse_from_str(&dob_text, "%Y-%m-%d") {
            Ok(d) => d,
            Err(_) => {
                sheet.errors.push(RowError {
                    row: sheet_row,
                    message: format!(
                        "Date of Birth \"{dob_text}\" is not a valid YYYY-MM-DD date"
                    ),
                });
                continue;
            }
        };

        let gender = cell(gender_col);
        if gender.is_empty() {
            sheet.errors.push(RowError {
                row: sheet_row,
                message: "Gender is required".to_string(),
            });
            continue;
        }

        let centre_code = cell(centre_col).to_uppercase();
        if centre_code.is_empty() {
            sheet.errors.push(RowError {
                row: sheet_row,
                message: "Centre Code is required".to_string(),
            });
            continue;
        }

        let academic_year = cell(year_col);
        if academic_year.is_empty() {
            sheet.errors.push(RowError {
                row: sheet_row,
                message: "Academic Year is required".to_string(),
            });
            continue;
        }

        let subject_codes: Vec<String> = cell(subjects_col)
            .split(';')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if subject_codes.is_empty() {
            sheet.errors.push(RowError {
                row: sheet_row,
                message: "Subject Codes must list at least one subject".to_string(),
            });
            continue;
        }

        let admission_no = cell(admission_col);
        let admission_no = if admission_no.is_empty() {
            None
        } else {
            Some(admission_no)
        };

        sheet.rows.push(StudentRow {
            row: sheet_row,
            admission_no,
            name,
            father_name: cell(father_col),
            mother_name: cell(mother_col),
            date_of_birth,
            gender,
            phone: cell(phone_col),
            address: cell(address_col),
            centre_code,
            academic_year,
            subject_codes,
        });
    }

    if sheet.rows.is_empty() && sheet.errors.is_empty() {
        return Err(Error::Sheet("worksheet has no data rows".to_string()));
    }

    Ok(sheet)
}

/// Writes students in the [`STUDENT_COLUMNS`] layout, one row per student.
pub fn write_student_sheet(
    students: &[Student],
    centres: &HashMap<ObjectId, StudyCentre>,
    subjects: &HashMap<ObjectId, Subject>,
) -> Result<Vec<u8>, Error> {
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let worksheet = workbook.add_worksheet();

    for (col, name) in STUDENT_COLUMNS.iter().enumerate() {
        worksheet.write_string(0, col as u16, *name)?;
    }

    for (idx, student) in students.iter().enumerate() {
        let row = (idx + 1) as u32;
        let centre = centres.get(&student.centre_id).ok_or_else(|| {
            Error::Sheet(format!(
                "student {} references unknown centre {}",
                student.admission_no, student.centre_id
            ))
        })?;
        let subject_codes = student
            .subject_ids
            .iter()
            .map(|id| {
                subjects.get(id).map(|s| s.code.clone()).ok_or_else(|| {
                    Error::Sheet(format!(
                        "student {} references unknown subject {}",
                        student.admission_no, id
                    ))
                })
            })
            .collect::<Result<Vec<String>, Error>>()?;

        worksheet.write_string(row, 0, &student.admission_no)?;
        worksheet.write_string(row, 1, &student.name)?;
        worksheet.write_string(row, 2, &student.father_name)?;
        worksheet.write_string(row, 3, &student.mother_name)?;
        worksheet.write_string(row, 4, student.date_of_birth.to_string())?;
        worksheet.write_string(row, 5, &student.gender)?;
        worksheet.write_string(row, 6, &student.phone)?;
        worksheet.write_string(row, 7, &student.address)?;
        worksheet.write_string(row, 8, &centre.code)?;
        worksheet.write_string(row, 9, &student.academic_year)?;
        worksheet.write_string(row, 10, subject_codes.join(";"))?;
    }

    Ok(workbook.save_to_buffer()?)
}

#[derive(Clone, Debug)]
pub struct SupplementaryRow {
    pub admission_no: String,
    pub name: String,
    pub centre_code: String,
    pub subject_codes: Vec<String>,
}

/// Writes supplementary registrations, one row per registration.
pub fn write_supplementary_sheet(rows: &[SupplementaryRow]) -> Result<Vec<u8>, Error> {
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let worksheet = workbook.add_worksheet();

    for (col, name) in SUPPLEMENTARY_COLUMNS.iter().enumerate() {
        worksheet.write_string(0, col as u16, *name)?;
    }

    for (idx, reg) in rows.iter().enumerate() {
        let row = (idx + 1) as u32;
        worksheet.write_string(row, 0, &reg.admission_no)?;
        worksheet.write_string(row, 1, &reg.name)?;
        worksheet.write_string(row, 2, &reg.centre_code)?;
        worksheet.write_string(row, 3, reg.subject_codes.join(";"))?;
    }

    Ok(workbook.save_to_buffer()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use models::StudentStatus;
    use mongodb::bson::DateTime;

    fn sheet_bytes(rows: &[Vec<&str>]) -> Vec<u8> {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let worksheet = workbook.add_worksheet();
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                worksheet.write_string(r as u32, c as u16, *value).unwrap();
            }
        }
        workbook.save_to_buffer().unwrap()
    }

    fn header() -> Vec<&'static str> {
        STUDENT_COLUMNS.to_vec()
    }

    #[test]
    fn parses_rows_and_collects_row_errors() {
        let bytes = sheet_bytes(&[
            header(),
            vec![
                "2025-00007",
                "Asha Kumari",
                "R Kumar",
                "S Devi",
                "2008-06-12",
                "F",
                "9000000001",
                "Ward 4",
                "bc01",
                "2025-26",
                "301; 302 ;303",
            ],
            // Bad date
            vec![
                "",
                "Ravi Singh",
                "M Singh",
                "G Devi",
                "12/06/2008",
                "M",
                "",
                "",
                "BC02",
                "2025-26",
                "301",
            ],
            // Missing name
            vec![
                "",
                "",
                "",
                "",
                "2008-01-01",
                "M",
                "",
                "",
                "BC02",
                "2025-26",
                "301",
            ],
        ]);

        let sheet = parse_student_sheet(&bytes).unwrap();

        assert_eq!(sheet.rows.len(), 1);
        assert_eq!(sheet.errors.len(), 2);

        let row = &sheet.rows[0];
        assert_eq!(row.row, 2);
        assert_eq!(row.admission_no.as_deref(), Some("2025-00007"));
        assert_eq!(row.centre_code, "BC01");
        assert_eq!(
            row.date_of_birth,
            NaiveDate::from_ymd_opt(2008, 6, 12).unwrap()
        );
        assert_eq!(row.subject_codes, vec!["301", "302", "303"]);

        assert_eq!(sheet.errors[0].row, 3);
        assert!(sheet.errors[0].message.contains("12/06/2008"));
        assert_eq!(sheet.errors[1].row, 4);
        assert!(sheet.errors[1].message.contains("Name"));
    }

    #[test]
    fn missing_required_column_fails_the_parse() {
        let mut columns = header();
        columns.retain(|c| *c != "Centre Code");
        let bytes = sheet_bytes(&[columns]);

        let err = parse_student_sheet(&bytes).unwrap_err();
        assert!(err.to_string().contains("Centre Code"));
    }

    #[test]
    fn sheet_without_data_rows_fails_the_parse() {
        let bytes = sheet_bytes(&[header()]);

        let err = parse_student_sheet(&bytes).unwrap_err();
        assert!(err.to_string().contains("no data rows"));
    }

    #[test]
    fn export_refuses_students_with_unknown_centres() {
        let student = Student {
            id: ObjectId::new(),
            admission_no: "2025-00001".to_string(),
            name: "A Student".to_string(),
            father_name: String::new(),
            mother_name: String::new(),
            date_of_birth: NaiveDate::from_ymd_opt(2008, 4, 1).unwrap(),
            gender: "F".to_string(),
            phone: String::new(),
            address: String::new(),
            centre_id: ObjectId::new(),
            academic_year: "2025-26".to_string(),
            subject_ids: vec![],
            status: StudentStatus::Active,
            photo_key: None,
            created_at: DateTime::now(),
            updated_at: DateTime::now(),
        };

        let err =
            write_student_sheet(&[student], &HashMap::new(), &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("unknown centre"));
    }
}

use crate::ipc::helpers::{
    check_len, now_rfc3339, optional_str, parse_date, required_str, with_conn, HandlerErr, Page,
};
use crate::ipc::types::{AppState, Request};
use crate::school::{self, ClassLevel, Sex};
use crate::setup;
use rusqlite::{params_from_iter, types::Value as SqlValue, Connection, OptionalExtension, Row};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRow {
    pub id: String,
    pub matricule: String,
    pub last_name: String,
    pub first_names: String,
    pub birth_date: String,
    pub sex: String,
    pub class_level: String,
    pub parent_phone: Option<String>,
    pub address: Option<String>,
    pub school_year: String,
    pub active: bool,
}

const STUDENT_COLUMNS: &str = "id, matricule, last_name, first_names, birth_date, sex,
    class_level, parent_phone, address, school_year, active";

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<StudentRow> {
    Ok(StudentRow {
        id: r.get(0)?,
        matricule: r.get(1)?,
        last_name: r.get(2)?,
        first_names: r.get(3)?,
        birth_date: r.get(4)?,
        sex: r.get(5)?,
        class_level: r.get(6)?,
        parent_phone: r.get(7)?,
        address: r.get(8)?,
        school_year: r.get(9)?,
        active: r.get::<_, i64>(10)? != 0,
    })
}

pub fn find_student(conn: &Connection, student_id: &str) -> Result<Option<StudentRow>, HandlerErr> {
    let sql = format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS);
    Ok(conn
        .query_row(&sql, [student_id], student_from_row)
        .optional()?)
}

pub fn require_student(conn: &Connection, student_id: &str) -> Result<StudentRow, HandlerErr> {
    find_student(conn, student_id)?.ok_or_else(|| {
        HandlerErr::new("not_found", "student not found")
            .with_details(json!({ "studentId": student_id }))
    })
}

fn students_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let last_name = required_str(params, "lastName")?;
    check_len(&last_name, "lastName", 2, 100)?;
    let first_names = required_str(params, "firstNames")?;
    check_len(&first_names, "firstNames", 2, 200)?;

    let birth_date = required_str(params, "birthDate")?;
    parse_date(&birth_date, "birthDate")?;

    let sex_raw = required_str(params, "sex")?;
    let sex = Sex::parse(&sex_raw)
        .ok_or_else(|| HandlerErr::bad_params("sex must be masculin or feminin"))?;

    let level_raw = required_str(params, "classLevel")?;
    let level = ClassLevel::parse(&level_raw).ok_or_else(|| {
        HandlerErr::bad_params("unknown classLevel")
            .with_details(json!({ "classLevel": level_raw }))
    })?;

    let parent_phone = optional_str(params, "parentPhone")?;
    if let Some(phone) = parent_phone.as_deref() {
        if !school::is_valid_phone(phone) {
            return Err(HandlerErr::bad_params("parentPhone is not a valid Guinean number")
                .with_details(json!({ "parentPhone": phone })));
        }
    }
    let address = optional_str(params, "address")?;

    let school_year = match optional_str(params, "schoolYear")? {
        Some(y) => y,
        None => setup::current_school_year(conn)?,
    };
    if !school::is_valid_school_year(&school_year) {
        return Err(HandlerErr::bad_params("schoolYear must look like 2024-2025"));
    }

    let existing: i64 = conn.query_row(
        "SELECT COUNT(*) FROM students WHERE class_level = ? AND school_year = ?",
        (level.label(), &school_year),
        |r| r.get(0),
    )?;
    let matricule = school::matricule(&school_year, level, (existing + 1) as u32);

    let student = StudentRow {
        id: Uuid::new_v4().to_string(),
        matricule,
        last_name,
        first_names,
        birth_date,
        sex: sex.as_str().to_string(),
        class_level: level.label().to_string(),
        parent_phone,
        address,
        school_year,
        active: true,
    };
    conn.execute(
        "INSERT INTO students(id, matricule, last_name, first_names, birth_date, sex,
            class_level, parent_phone, address, school_year, active, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?)",
        (
            &student.id,
            &student.matricule,
            &student.last_name,
            &student.first_names,
            &student.birth_date,
            &student.sex,
            &student.class_level,
            &student.parent_phone,
            &student.address,
            &student.school_year,
            now_rfc3339(),
        ),
    )
    .map_err(|e| HandlerErr::new("db_insert_failed", e.to_string()))?;

    info!(student_id = %student.id, matricule = %student.matricule, "student registered");
    Ok(json!({ "student": student }))
}

fn matches_search(student: &StudentRow, needle: &str) -> bool {
    [&student.last_name, &student.first_names, &student.matricule]
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
}

fn students_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let page = Page::from_params(params)?;
    let mut clauses: Vec<&str> = Vec::new();
    let mut binds: Vec<SqlValue> = Vec::new();
    if let Some(level) = optional_str(params, "classLevel")? {
        clauses.push("class_level = ?");
        binds.push(SqlValue::Text(level));
    }
    if let Some(year) = optional_str(params, "schoolYear")? {
        clauses.push("school_year = ?");
        binds.push(SqlValue::Text(year));
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT {} FROM students {} ORDER BY last_name, first_names, matricule",
        STUDENT_COLUMNS, where_sql
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut students = stmt
        .query_map(params_from_iter(binds), student_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    // SQLite LIKE only folds ASCII case, and names carry accents.
    if let Some(search) = optional_str(params, "search")? {
        let needle = search.to_lowercase();
        students.retain(|s| matches_search(s, &needle));
    }

    let total = students.len();
    let rows: Vec<StudentRow> = students
        .into_iter()
        .skip(page.offset())
        .take(page.limit as usize)
        .collect();
    Ok(page.wrap(json!({ "students": rows }), total))
}

fn students_get(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let student = require_student(conn, &student_id)?;
    Ok(json!({ "student": student }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "students.create" => Some(with_conn(state, req, students_create)),
        "students.list" => Some(with_conn(state, req, students_list)),
        "students.get" => Some(with_conn(state, req, students_get)),
        _ => None,
    }
}

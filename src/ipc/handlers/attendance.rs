use crate::calc::{self, AttendanceRecord};
use crate::ipc::handlers::students::require_student;
use crate::ipc::helpers::{
    check_len, now_rfc3339, optional_bool, optional_str, optional_term, parse_date, parse_term,
    required_str, with_conn, HandlerErr, Page,
};
use crate::ipc::types::{AppState, Request};
use crate::school;
use crate::setup;
use rusqlite::{params_from_iter, types::Value as SqlValue, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionRow {
    id: String,
    student_id: String,
    date: String,
    subject: String,
    present: bool,
    absence_reason: Option<String>,
    term: String,
    school_year: String,
}

fn school_year_param(conn: &Connection, params: &Value) -> Result<String, HandlerErr> {
    match optional_str(params, "schoolYear")? {
        Some(y) => Ok(y),
        None => Ok(setup::current_school_year(conn)?),
    }
}

fn attendance_record(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    require_student(conn, &student_id)?;
    let subject = required_str(params, "subject")?;
    check_len(&subject, "subject", 1, 100)?;

    let date = match optional_str(params, "date")? {
        Some(raw) => parse_date(&raw, "date")?,
        None => chrono::Local::now().date_naive(),
    };
    let present = optional_bool(params, "present")?.unwrap_or(true);
    let absence_reason = if present {
        None
    } else {
        optional_str(params, "absenceReason")?
    };

    let term = match optional_term(params, "term")? {
        Some(t) => t,
        None => setup::load_calendar(conn)?.term_for(date),
    };
    // Same default as evaluations and report cards, so they line up.
    let school_year = school_year_param(conn, params)?;
    if !school::is_valid_school_year(&school_year) {
        return Err(HandlerErr::bad_params("schoolYear must look like 2024-2025"));
    }

    let date_key = date.format("%Y-%m-%d").to_string();
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM attendance WHERE student_id = ? AND session_date = ? AND subject = ?",
            (&student_id, &date_key, &subject),
            |r| r.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Err(HandlerErr::new(
            "duplicate",
            "attendance already recorded for this date and subject",
        )
        .with_details(json!({ "attendanceId": id })));
    }

    let session = SessionRow {
        id: Uuid::new_v4().to_string(),
        student_id,
        date: date_key,
        subject,
        present,
        absence_reason,
        term: term.as_str().to_string(),
        school_year,
    };
    conn.execute(
        "INSERT INTO attendance(id, student_id, session_date, subject, present,
            absence_reason, term, school_year, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &session.id,
            &session.student_id,
            &session.date,
            &session.subject,
            session.present as i64,
            &session.absence_reason,
            &session.term,
            &session.school_year,
            now_rfc3339(),
        ),
    )
    .map_err(|e| HandlerErr::new("db_insert_failed", e.to_string()))?;

    Ok(json!({ "attendance": session }))
}

fn attendance_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let page = Page::from_params(params)?;
    let mut clauses: Vec<&str> = Vec::new();
    let mut binds: Vec<SqlValue> = Vec::new();
    if let Some(student_id) = optional_str(params, "studentId")? {
        clauses.push("student_id = ?");
        binds.push(SqlValue::Text(student_id));
    }
    if let Some(term) = optional_term(params, "term")? {
        clauses.push("term = ?");
        binds.push(SqlValue::Text(term.as_str().to_string()));
    }
    if let Some(year) = optional_str(params, "schoolYear")? {
        clauses.push("school_year = ?");
        binds.push(SqlValue::Text(year));
    }
    if let Some(subject) = optional_str(params, "subject")? {
        clauses.push("subject = ?");
        binds.push(SqlValue::Text(subject));
    }
    let date_from = optional_str(params, "dateFrom")?
        .map(|raw| parse_date(&raw, "dateFrom"))
        .transpose()?;
    let date_to = optional_str(params, "dateTo")?
        .map(|raw| parse_date(&raw, "dateTo"))
        .transpose()?;
    if let (Some(from), Some(to)) = (date_from, date_to) {
        if from > to {
            return Err(HandlerErr::bad_params("dateFrom must not be after dateTo"));
        }
    }
    if let Some(from) = date_from {
        clauses.push("session_date >= ?");
        binds.push(SqlValue::Text(from.format("%Y-%m-%d").to_string()));
    }
    if let Some(to) = date_to {
        clauses.push("session_date <= ?");
        binds.push(SqlValue::Text(to.format("%Y-%m-%d").to_string()));
    }
    if optional_bool(params, "absencesOnly")?.unwrap_or(false) {
        clauses.push("present = 0");
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM attendance {}", where_sql),
        params_from_iter(binds.iter()),
        |r| r.get(0),
    )?;

    let sql = format!(
        "SELECT id, student_id, session_date, subject, present, absence_reason, term, school_year
         FROM attendance
         {}
         ORDER BY session_date DESC, subject, rowid
         LIMIT ? OFFSET ?",
        where_sql
    );
    binds.push(SqlValue::Integer(page.limit as i64));
    binds.push(SqlValue::Integer(page.offset() as i64));
    let mut stmt = conn.prepare(&sql)?;
    let sessions = stmt
        .query_map(params_from_iter(binds), |r| {
            Ok(SessionRow {
                id: r.get(0)?,
                student_id: r.get(1)?,
                date: r.get(2)?,
                subject: r.get(3)?,
                present: r.get::<_, i64>(4)? != 0,
                absence_reason: r.get(5)?,
                term: r.get(6)?,
                school_year: r.get(7)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(page.wrap(json!({ "attendance": sessions }), total.max(0) as usize))
}

fn attendance_summary(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    require_student(conn, &student_id)?;
    let term = parse_term(&required_str(params, "term")?)?;
    let school_year = school_year_param(conn, params)?;

    let mut stmt = conn.prepare(
        "SELECT present FROM attendance
         WHERE student_id = ? AND term = ? AND school_year = ?",
    )?;
    let records = stmt
        .query_map((&student_id, term.as_str(), &school_year), |r| {
            Ok(AttendanceRecord {
                present: r.get::<_, i64>(0)? != 0,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    Ok(json!({
        "studentId": student_id,
        "term": term,
        "schoolYear": school_year,
        "summary": calc::compute_attendance_summary(&records),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "attendance.record" => Some(with_conn(state, req, attendance_record)),
        "attendance.list" => Some(with_conn(state, req, attendance_list)),
        "attendance.summary" => Some(with_conn(state, req, attendance_summary)),
        _ => None,
    }
}

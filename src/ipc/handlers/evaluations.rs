use crate::calc::SCORE_SCALE;
use crate::ipc::handlers::students::require_student;
use crate::ipc::helpers::{
    check_len, now_rfc3339, optional_f64, optional_str, optional_term, parse_date, parse_term,
    required_f64, required_str, with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::school::{self, EvaluationKind};
use crate::setup;
use rusqlite::{params_from_iter, types::Value as SqlValue, Connection};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct EvaluationRow {
    id: String,
    student_id: String,
    subject: String,
    kind: String,
    score: f64,
    out_of: f64,
    coefficient: f64,
    term: String,
    school_year: String,
    date: String,
    comment: Option<String>,
}

fn evaluations_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    require_student(conn, &student_id)?;

    let subject = required_str(params, "subject")?;
    check_len(&subject, "subject", 1, 100)?;

    let kind = match optional_str(params, "kind")? {
        None => EvaluationKind::Devoir,
        Some(raw) => EvaluationKind::parse(&raw).ok_or_else(|| {
            HandlerErr::bad_params("kind must be one of: devoir, composition, controle, examen, oral")
        })?,
    };

    let out_of = optional_f64(params, "outOf")?.unwrap_or(SCORE_SCALE);
    if out_of <= 0.0 {
        return Err(HandlerErr::bad_params("outOf must be greater than 0"));
    }
    let score = required_f64(params, "score")?;
    if !(0.0..=out_of).contains(&score) {
        return Err(HandlerErr::bad_params(format!("score must be between 0 and {}", out_of))
            .with_details(json!({ "score": score, "outOf": out_of })));
    }
    let coefficient = optional_f64(params, "coefficient")?.unwrap_or(1.0);
    if coefficient < 0.0 {
        return Err(HandlerErr::bad_params("coefficient must not be negative"));
    }

    let term = parse_term(&required_str(params, "term")?)?;
    let date = match optional_str(params, "date")? {
        Some(raw) => {
            parse_date(&raw, "date")?;
            raw
        }
        None => chrono::Local::now().date_naive().format("%Y-%m-%d").to_string(),
    };
    let school_year = match optional_str(params, "schoolYear")? {
        Some(y) => y,
        None => setup::current_school_year(conn)?,
    };
    if !school::is_valid_school_year(&school_year) {
        return Err(HandlerErr::bad_params("schoolYear must look like 2024-2025"));
    }
    let comment = optional_str(params, "comment")?;
    if let Some(c) = comment.as_deref() {
        check_len(c, "comment", 0, 500)?;
    }

    let evaluation = EvaluationRow {
        id: Uuid::new_v4().to_string(),
        student_id,
        subject,
        kind: kind.as_str().to_string(),
        score,
        out_of,
        coefficient,
        term: term.as_str().to_string(),
        school_year,
        date,
        comment,
    };
    conn.execute(
        "INSERT INTO evaluations(id, student_id, subject, kind, score, out_of, coefficient,
            term, school_year, eval_date, comment, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &evaluation.id,
            &evaluation.student_id,
            &evaluation.subject,
            &evaluation.kind,
            evaluation.score,
            evaluation.out_of,
            evaluation.coefficient,
            &evaluation.term,
            &evaluation.school_year,
            &evaluation.date,
            &evaluation.comment,
            now_rfc3339(),
        ),
    )
    .map_err(|e| HandlerErr::new("db_insert_failed", e.to_string()))?;

    Ok(json!({ "evaluation": evaluation }))
}

fn evaluations_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let mut sql = String::from(
        "SELECT id, student_id, subject, kind, score, out_of, coefficient, term,
                school_year, eval_date, comment
         FROM evaluations
         WHERE student_id = ?",
    );
    let mut binds: Vec<SqlValue> = vec![SqlValue::Text(student_id)];
    if let Some(term) = optional_term(params, "term")? {
        sql.push_str(" AND term = ?");
        binds.push(SqlValue::Text(term.as_str().to_string()));
    }
    if let Some(year) = optional_str(params, "schoolYear")? {
        sql.push_str(" AND school_year = ?");
        binds.push(SqlValue::Text(year));
    }
    sql.push_str(" ORDER BY eval_date, rowid");

    let mut stmt = conn.prepare(&sql)?;
    let evaluations = stmt
        .query_map(params_from_iter(binds), |r| {
            Ok(EvaluationRow {
                id: r.get(0)?,
                student_id: r.get(1)?,
                subject: r.get(2)?,
                kind: r.get(3)?,
                score: r.get(4)?,
                out_of: r.get(5)?,
                coefficient: r.get(6)?,
                term: r.get(7)?,
                school_year: r.get(8)?,
                date: r.get(9)?,
                comment: r.get(10)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "evaluations": evaluations }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "evaluations.create" => Some(with_conn(state, req, evaluations_create)),
        "evaluations.list" => Some(with_conn(state, req, evaluations_list)),
        _ => None,
    }
}

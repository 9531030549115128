use crate::ipc::helpers::{
    check_len, now_rfc3339, optional_f64, optional_str, required_str, with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::school::{self, ClassLevel};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

const DEFAULT_COLOR: &str = "#3B82F6";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubjectRow {
    id: String,
    name: String,
    code: String,
    coefficient: f64,
    color: String,
    class_levels: Vec<String>,
}

fn parse_class_levels(params: &Value) -> Result<Vec<String>, HandlerErr> {
    let Some(raw) = params.get("classLevels") else {
        return Ok(Vec::new());
    };
    if raw.is_null() {
        return Ok(Vec::new());
    }
    let Some(items) = raw.as_array() else {
        return Err(HandlerErr::bad_params("classLevels must be an array"));
    };
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let label = item.as_str().unwrap_or("");
        let Some(level) = ClassLevel::parse(label) else {
            return Err(HandlerErr::bad_params("unknown class level in classLevels")
                .with_details(json!({ "classLevel": item })));
        };
        let label = level.label().to_string();
        if !out.contains(&label) {
            out.push(label);
        }
    }
    Ok(out)
}

fn subjects_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let name = required_str(params, "name")?;
    check_len(&name, "name", 2, 100)?;
    let code = required_str(params, "code")?.to_ascii_uppercase();
    check_len(&code, "code", 2, 10)?;

    let coefficient = optional_f64(params, "coefficient")?.unwrap_or(1.0);
    if coefficient <= 0.0 {
        return Err(HandlerErr::bad_params("coefficient must be greater than 0"));
    }
    let color = optional_str(params, "color")?.unwrap_or_else(|| DEFAULT_COLOR.to_string());
    if !school::is_valid_color(&color) {
        return Err(HandlerErr::bad_params("color must be #RRGGBB"));
    }
    let class_levels = parse_class_levels(params)?;

    let taken: Option<String> = conn
        .query_row("SELECT id FROM subjects WHERE code = ?", [&code], |r| {
            r.get(0)
        })
        .optional()?;
    if taken.is_some() {
        return Err(HandlerErr::new("duplicate", "subject code already exists")
            .with_details(json!({ "code": code })));
    }

    let subject = SubjectRow {
        id: Uuid::new_v4().to_string(),
        name,
        code,
        coefficient,
        color,
        class_levels,
    };
    let levels_json = serde_json::to_string(&subject.class_levels)
        .map_err(|e| HandlerErr::new("internal", e.to_string()))?;
    conn.execute(
        "INSERT INTO subjects(id, name, code, coefficient, color, class_levels, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &subject.id,
            &subject.name,
            &subject.code,
            subject.coefficient,
            &subject.color,
            levels_json,
            now_rfc3339(),
        ),
    )
    .map_err(|e| HandlerErr::new("db_insert_failed", e.to_string()))?;

    Ok(json!({ "subject": subject }))
}

fn subjects_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let level_filter = optional_str(params, "classLevel")?;
    let mut stmt = conn.prepare(
        "SELECT id, name, code, coefficient, color, class_levels
         FROM subjects
         ORDER BY name, code",
    )?;
    let rows = stmt
        .query_map([], |r| {
            let levels_raw: String = r.get(5)?;
            Ok(SubjectRow {
                id: r.get(0)?,
                name: r.get(1)?,
                code: r.get(2)?,
                coefficient: r.get(3)?,
                color: r.get(4)?,
                class_levels: serde_json::from_str(&levels_raw).unwrap_or_default(),
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    // A subject with no levels applies to every level.
    let subjects: Vec<SubjectRow> = match level_filter {
        None => rows,
        Some(level) => rows
            .into_iter()
            .filter(|s| s.class_levels.is_empty() || s.class_levels.contains(&level))
            .collect(),
    };
    Ok(json!({ "subjects": subjects }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "subjects.create" => Some(with_conn(state, req, subjects_create)),
        "subjects.list" => Some(with_conn(state, req, subjects_list)),
        _ => None,
    }
}

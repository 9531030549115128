use crate::ipc::helpers::{optional_str, parse_date, with_conn, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::school::ClassLevel;
use chrono::{Datelike, Duration, NaiveDate};
use rusqlite::{params_from_iter, types::Value as SqlValue, Connection};
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClassCount {
    class_level: String,
    count: i64,
}

/// Monday..Sunday around `day`.
fn week_bounds(day: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = day - Duration::days(day.weekday().num_days_from_monday() as i64);
    (start, start + Duration::days(6))
}

fn level_rank(label: &str) -> usize {
    ClassLevel::parse(label)
        .and_then(|l| ClassLevel::ALL.iter().position(|x| *x == l))
        .unwrap_or(ClassLevel::ALL.len())
}

fn dashboard_stats(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let today = match optional_str(params, "today")? {
        Some(raw) => parse_date(&raw, "today")?,
        None => chrono::Local::now().date_naive(),
    };
    let school_year = optional_str(params, "schoolYear")?;

    let mut sql = String::from("SELECT class_level, COUNT(*) FROM students WHERE active = 1");
    let mut binds: Vec<SqlValue> = Vec::new();
    if let Some(year) = school_year.as_ref() {
        sql.push_str(" AND school_year = ?");
        binds.push(SqlValue::Text(year.clone()));
    }
    sql.push_str(" GROUP BY class_level");
    let mut stmt = conn.prepare(&sql)?;
    let mut by_class = stmt
        .query_map(params_from_iter(binds), |r| {
            Ok(ClassCount {
                class_level: r.get(0)?,
                count: r.get(1)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    by_class.sort_by(|a, b| {
        level_rank(&a.class_level)
            .cmp(&level_rank(&b.class_level))
            .then_with(|| a.class_level.cmp(&b.class_level))
    });
    let total: i64 = by_class.iter().map(|c| c.count).sum();

    let (week_start, week_end) = week_bounds(today);
    let week_start = week_start.format("%Y-%m-%d").to_string();
    let week_end = week_end.format("%Y-%m-%d").to_string();
    let absences: i64 = conn.query_row(
        "SELECT COUNT(*) FROM attendance
         WHERE present = 0 AND session_date >= ? AND session_date <= ?",
        (&week_start, &week_end),
        |r| r.get(0),
    )?;

    Ok(json!({
        "students": {
            "total": total,
            "byClass": by_class,
        },
        "attendance": {
            "weekStart": week_start,
            "weekEnd": week_end,
            "absencesThisWeek": absences,
        },
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "dashboard.stats" => Some(with_conn(state, req, dashboard_stats)),
        _ => None,
    }
}

use crate::calc::{self, CalcContext, APPRECIATION_BANDS};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{calc_err, optional_str, parse_term, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::school::{ClassLevel, Term};
use crate::setup;
use serde_json::{json, Value};

struct ReportParams {
    term: Term,
    opts: calc::ReportOptions,
}

fn report_params(conn: &rusqlite::Connection, params: &Value) -> Result<ReportParams, HandlerErr> {
    let term = parse_term(&required_str(params, "term")?)?;
    let school_year = optional_str(params, "schoolYear")?;
    let opts = setup::report_options(conn, school_year.as_deref())?;
    Ok(ReportParams { term, opts })
}

fn handle_report_card(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let p = match report_params(conn, &req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let ctx = CalcContext { conn };
    match calc::generate_report_card(&ctx, &student_id, p.term, &p.opts) {
        Ok(card) => ok(&req.id, json!({ "reportCard": card })),
        Err(e) => calc_err(req, e),
    }
}

fn handle_class_summary(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let level = match required_str(&req.params, "classLevel") {
        Ok(raw) => match ClassLevel::parse(&raw) {
            Some(l) => l,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "unknown classLevel",
                    Some(json!({ "classLevel": raw })),
                )
            }
        },
        Err(e) => return e.response(&req.id),
    };
    let p = match report_params(conn, &req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let ctx = CalcContext { conn };
    match calc::compute_class_summary(&ctx, level.label(), p.term, &p.opts) {
        Ok(rows) => ok(
            &req.id,
            json!({
                "classLevel": level.label(),
                "term": p.term,
                "schoolYear": p.opts.school_year,
                "rows": rows,
            }),
        ),
        Err(e) => calc_err(req, e),
    }
}

fn handle_appreciation_bands(req: &Request) -> Value {
    ok(&req.id, json!({ "bands": &APPRECIATION_BANDS[..] }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "reports.reportCard" => Some(handle_report_card(state, req)),
        "reports.classSummary" => Some(handle_class_summary(state, req)),
        "reports.appreciationBands" => Some(handle_appreciation_bands(req)),
        _ => None,
    }
}

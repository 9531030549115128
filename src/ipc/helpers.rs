use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::Value;

use crate::calc::CalcError;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::school::Term;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<rusqlite::Error> for HandlerErr {
    fn from(e: rusqlite::Error) -> Self {
        Self::new("db_query_failed", e.to_string())
    }
}

impl From<anyhow::Error> for HandlerErr {
    fn from(e: anyhow::Error) -> Self {
        Self::new("db_query_failed", format!("{e:#}"))
    }
}

pub fn calc_err(req: &Request, e: CalcError) -> Value {
    err(&req.id, &e.code, e.message, e.details)
}

/// Runs `f` against the open workspace, or replies `no_workspace`.
pub fn with_conn<F>(state: &AppState, req: &Request, f: F) -> Value
where
    F: FnOnce(&Connection, &Value) -> Result<Value, HandlerErr>,
{
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    match optional_str(params, key)? {
        Some(v) => Ok(v),
        None => Err(HandlerErr::bad_params(format!("missing {}", key))),
    }
}

/// Trimmed string; absent, null and blank all read as `None`.
pub fn optional_str(params: &Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let t = s.trim();
            if t.is_empty() {
                Ok(None)
            } else {
                Ok(Some(t.to_string()))
            }
        }
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be a string", key))),
    }
}

pub fn optional_f64(params: &Value, key: &str) -> Result<Option<f64>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => match v.as_f64() {
            Some(n) if n.is_finite() => Ok(Some(n)),
            _ => Err(HandlerErr::bad_params(format!("{} must be a number", key))),
        },
    }
}

pub fn required_f64(params: &Value, key: &str) -> Result<f64, HandlerErr> {
    optional_f64(params, key)?.ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn optional_bool(params: &Value, key: &str) -> Result<Option<bool>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be a boolean", key))),
    }
}

pub fn optional_u32(params: &Value, key: &str) -> Result<Option<u32>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => match v.as_u64() {
            Some(n) if n <= u32::MAX as u64 => Ok(Some(n as u32)),
            _ => Err(HandlerErr::bad_params(format!(
                "{} must be a non-negative integer",
                key
            ))),
        },
    }
}

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// 1-based page window for list methods.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    pub fn from_params(params: &Value) -> Result<Self, HandlerErr> {
        let page = optional_u32(params, "page")?.unwrap_or(1);
        if page == 0 {
            return Err(HandlerErr::bad_params("page must be at least 1"));
        }
        let limit = optional_u32(params, "limit")?.unwrap_or(DEFAULT_PAGE_LIMIT);
        if limit == 0 || limit > MAX_PAGE_LIMIT {
            return Err(HandlerErr::bad_params(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_LIMIT
            )));
        }
        Ok(Self { page, limit })
    }

    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.limit as usize
    }

    /// Adds `total`, `page`, `limit` and `totalPages` to a list result.
    pub fn wrap(&self, mut result: Value, total: usize) -> Value {
        let limit = self.limit as usize;
        if let Some(obj) = result.as_object_mut() {
            obj.insert("total".into(), total.into());
            obj.insert("page".into(), self.page.into());
            obj.insert("limit".into(), self.limit.into());
            obj.insert("totalPages".into(), ((total + limit - 1) / limit).into());
        }
        result
    }
}

pub fn parse_term(raw: &str) -> Result<Term, HandlerErr> {
    Term::parse(raw).ok_or_else(|| {
        HandlerErr::bad_params("term must be one of: T1, T2, T3")
            .with_details(serde_json::json!({ "term": raw }))
    })
}

pub fn optional_term(params: &Value, key: &str) -> Result<Option<Term>, HandlerErr> {
    optional_str(params, key)?.map(|s| parse_term(&s)).transpose()
}

pub fn parse_date(raw: &str, key: &str) -> Result<NaiveDate, HandlerErr> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| HandlerErr::bad_params(format!("{} must be a YYYY-MM-DD date", key)))
}

pub fn check_len(value: &str, key: &str, min: usize, max: usize) -> Result<(), HandlerErr> {
    let n = value.chars().count();
    if n < min || n > max {
        return Err(HandlerErr::bad_params(format!(
            "{} must be between {} and {} characters",
            key, min, max
        )));
    }
    Ok(())
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

use crate::calc::{ReportOptions, SubjectOrder};
use crate::db;
use crate::school::{self, SchoolCalendar};
use serde_json::{json, Map, Value};
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetupSection {
    School,
    Reports,
    Calendar,
}

impl SetupSection {
    pub const ALL: [SetupSection; 3] = [Self::School, Self::Reports, Self::Calendar];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "school" => Some(Self::School),
            "reports" => Some(Self::Reports),
            "calendar" => Some(Self::Calendar),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::School => "school",
            Self::Reports => "reports",
            Self::Calendar => "calendar",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::School => "setup.school",
            Self::Reports => "setup.reports",
            Self::Calendar => "setup.calendar",
        }
    }
}

pub fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::School => json!({
            "name": "",
            "schoolYear": "2024-2025"
        }),
        SetupSection::Reports => json!({
            "subjectOrder": "firstSeen",
            "showGeneratedAt": true
        }),
        SetupSection::Calendar => json!({
            "schoolYearStartMonth": 9,
            "term2StartMonth": 1,
            "term3StartMonth": 4
        }),
    }
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be a boolean", key))
}

fn parse_string_max(v: &Value, key: &str, max: usize) -> Result<String, String> {
    let Some(s) = v.as_str() else {
        return Err(format!("{} must be a string", key));
    };
    let t = s.trim();
    if t.chars().count() > max {
        return Err(format!("{} must be at most {} characters", key, max));
    }
    Ok(t.to_string())
}

fn parse_month(v: &Value, key: &str) -> Result<u32, String> {
    match v.as_u64() {
        Some(m) if (1..=12).contains(&m) => Ok(m as u32),
        _ => Err(format!("{} must be an integer between 1 and 12", key)),
    }
}

/// Applies a patch onto `current`; unknown or malformed fields are rejected
/// and leave `current` untouched.
pub fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let mut next = current.clone();
    let obj = next
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            SetupSection::School => match k.as_str() {
                "name" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 200)?));
                }
                "schoolYear" => {
                    let year = parse_string_max(v, k, 9)?;
                    if !school::is_valid_school_year(&year) {
                        return Err("schoolYear must look like 2024-2025".to_string());
                    }
                    obj.insert(k.clone(), Value::String(year));
                }
                _ => return Err(format!("unknown school field: {}", k)),
            },
            SetupSection::Reports => match k.as_str() {
                "subjectOrder" => {
                    let raw = v.as_str().unwrap_or("");
                    if SubjectOrder::parse(raw).is_none() {
                        return Err("subjectOrder must be firstSeen or alphabetical".to_string());
                    }
                    obj.insert(k.clone(), Value::String(raw.to_string()));
                }
                "showGeneratedAt" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown reports field: {}", k)),
            },
            SetupSection::Calendar => match k.as_str() {
                "schoolYearStartMonth" | "term2StartMonth" | "term3StartMonth" => {
                    obj.insert(k.clone(), json!(parse_month(v, k)?));
                }
                _ => return Err(format!("unknown calendar field: {}", k)),
            },
        }
    }
    if section == SetupSection::Calendar {
        calendar_from_value(&next).validate()?;
    }
    *current = next;
    Ok(())
}

pub fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            if let Err(e) = merge_section_patch(section, &mut current, saved_obj) {
                warn!(section = section.name(), error = %e, "saved setup ignored, using defaults");
            }
        }
    }
    Ok(current)
}

pub fn save_section(
    conn: &rusqlite::Connection,
    section: SetupSection,
    value: &Value,
) -> anyhow::Result<()> {
    db::settings_set_json(conn, section.key(), value)
}

fn calendar_from_value(v: &Value) -> SchoolCalendar {
    let d = SchoolCalendar::default();
    let month = |key: &str, fallback: u32| {
        v.get(key)
            .and_then(|m| m.as_u64())
            .map(|m| m as u32)
            .unwrap_or(fallback)
    };
    SchoolCalendar {
        school_year_start_month: month("schoolYearStartMonth", d.school_year_start_month),
        term2_start_month: month("term2StartMonth", d.term2_start_month),
        term3_start_month: month("term3StartMonth", d.term3_start_month),
    }
}

pub fn load_calendar(conn: &rusqlite::Connection) -> anyhow::Result<SchoolCalendar> {
    Ok(calendar_from_value(&load_section(conn, SetupSection::Calendar)?))
}

pub fn current_school_year(conn: &rusqlite::Connection) -> anyhow::Result<String> {
    let school = load_section(conn, SetupSection::School)?;
    Ok(school
        .get("schoolYear")
        .and_then(|v| v.as_str())
        .unwrap_or("2024-2025")
        .to_string())
}

/// Report options from the workspace settings, with an optional school-year override.
pub fn report_options(
    conn: &rusqlite::Connection,
    school_year: Option<&str>,
) -> anyhow::Result<ReportOptions> {
    let reports = load_section(conn, SetupSection::Reports)?;
    let school_year = match school_year {
        Some(y) => y.to_string(),
        None => current_school_year(conn)?,
    };
    Ok(ReportOptions {
        school_year,
        subject_order: reports
            .get("subjectOrder")
            .and_then(|v| v.as_str())
            .and_then(SubjectOrder::parse)
            .unwrap_or_default(),
        show_generated_at: reports
            .get("showGeneratedAt")
            .and_then(|v| v.as_bool())
            .unwrap_or(true),
    })
}

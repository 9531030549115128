use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::school::Term;

/// Scores are reported on this scale ("x.xx/20").
pub const SCORE_SCALE: f64 = 20.0;

/// Absorbs binary representation error so decimal midpoints round up.
const ROUNDING_EPSILON: f64 = 1e-9;

/// Half-up rounding to two decimals.
pub fn round_off_2_decimals(x: f64) -> f64 {
    ((100.0 * x) + 0.5 + ROUNDING_EPSILON).floor() / 100.0
}

fn round_off_whole(x: f64) -> u32 {
    (x + 0.5 + ROUNDING_EPSILON).floor().max(0.0) as u32
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub subject: String,
    pub score: f64,
    pub out_of: f64,
    pub coefficient: f64,
}

impl Evaluation {
    pub fn new(subject: &str, score: f64, coefficient: f64) -> Self {
        Self {
            subject: subject.to_string(),
            score,
            out_of: SCORE_SCALE,
            coefficient,
        }
    }

    fn score_on_scale(&self) -> f64 {
        if self.out_of > 0.0 && self.out_of != SCORE_SCALE {
            self.score * SCORE_SCALE / self.out_of
        } else {
            self.score
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubjectOrder {
    #[default]
    FirstSeen,
    Alphabetical,
}

impl SubjectOrder {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "firstSeen" => Some(Self::FirstSeen),
            "alphabetical" => Some(Self::Alphabetical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAverage {
    pub subject: String,
    pub code: Option<String>,
    pub color: Option<String>,
    pub evaluation_count: usize,
    pub average: f64,
    pub total_weight: f64,
    pub points: f64,
    #[serde(skip)]
    weighted_sum: f64,
}

#[derive(Debug, Clone, Default)]
pub struct SubjectAverages {
    pub rows: Vec<SubjectAverage>,
    /// Subjects whose coefficients sum to zero; they have no average.
    pub zero_weight_subjects: Vec<String>,
}

pub fn compute_subject_averages(evaluations: &[Evaluation], order: SubjectOrder) -> SubjectAverages {
    // (subject, weighted sum, weight, count) in first-seen order
    let mut groups: Vec<(String, f64, f64, usize)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for e in evaluations {
        let i = match index.get(e.subject.as_str()) {
            Some(i) => *i,
            None => {
                groups.push((e.subject.clone(), 0.0, 0.0, 0));
                index.insert(e.subject.as_str(), groups.len() - 1);
                groups.len() - 1
            }
        };
        let g = &mut groups[i];
        g.1 += e.score_on_scale() * e.coefficient;
        g.2 += e.coefficient;
        g.3 += 1;
    }

    if order == SubjectOrder::Alphabetical {
        groups.sort_by(|a, b| a.0.cmp(&b.0));
    }

    let mut out = SubjectAverages::default();
    for (subject, sum, weight, count) in groups {
        if weight <= 0.0 || !weight.is_finite() || !sum.is_finite() {
            out.zero_weight_subjects.push(subject);
            continue;
        }
        out.rows.push(SubjectAverage {
            subject,
            code: None,
            color: None,
            evaluation_count: count,
            average: round_off_2_decimals(sum / weight),
            total_weight: weight,
            points: round_off_2_decimals(sum),
            weighted_sum: sum,
        });
    }
    out
}

/// Weighted mean of subject averages by their total weight. `None` means no grade yet.
pub fn compute_overall_average(subject_averages: &[SubjectAverage]) -> Option<f64> {
    let mut sum = 0.0_f64;
    let mut weight = 0.0_f64;
    for s in subject_averages {
        if s.total_weight <= 0.0 {
            continue;
        }
        sum += s.weighted_sum;
        weight += s.total_weight;
    }
    if weight > 0.0 {
        Some(round_off_2_decimals(sum / weight))
    } else {
        None
    }
}

/// Ordered lowest to highest so `Ord` ranks bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Appreciation {
    AAmeliorer,
    Satisfaisant,
    Bien,
    TresBien,
    Excellent,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppreciationBand {
    #[serde(skip)]
    pub appreciation: Appreciation,
    pub lower_bound: f64,
    pub label: &'static str,
    pub color: &'static str,
}

/// Highest band first; lower bounds are inclusive.
pub static APPRECIATION_BANDS: [AppreciationBand; 5] = [
    AppreciationBand {
        appreciation: Appreciation::Excellent,
        lower_bound: 16.0,
        label: "Excellent",
        color: "green",
    },
    AppreciationBand {
        appreciation: Appreciation::TresBien,
        lower_bound: 14.0,
        label: "Très bien",
        color: "blue",
    },
    AppreciationBand {
        appreciation: Appreciation::Bien,
        lower_bound: 12.0,
        label: "Bien",
        color: "orange",
    },
    AppreciationBand {
        appreciation: Appreciation::Satisfaisant,
        lower_bound: 10.0,
        label: "Satisfaisant",
        color: "yellow",
    },
    AppreciationBand {
        appreciation: Appreciation::AAmeliorer,
        lower_bound: 0.0,
        label: "À améliorer",
        color: "red",
    },
];

impl Appreciation {
    pub fn band(self) -> &'static AppreciationBand {
        APPRECIATION_BANDS
            .iter()
            .find(|b| b.appreciation == self)
            .unwrap_or(&APPRECIATION_BANDS[APPRECIATION_BANDS.len() - 1])
    }

    pub fn label(self) -> &'static str {
        self.band().label
    }

    pub fn color(self) -> &'static str {
        self.band().color
    }
}

pub fn classify_appreciation(average: f64) -> Appreciation {
    APPRECIATION_BANDS
        .iter()
        .find(|b| average >= b.lower_bound)
        .map(|b| b.appreciation)
        .unwrap_or(Appreciation::AAmeliorer)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttendanceRecord {
    pub present: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub total_sessions: usize,
    pub absences: usize,
    /// Whole percent; `None` when there are no sessions.
    pub attendance_rate: Option<u32>,
}

pub fn compute_attendance_summary(records: &[AttendanceRecord]) -> AttendanceSummary {
    let total = records.len();
    let absences = records.iter().filter(|r| !r.present).count();
    let attendance_rate = if total > 0 {
        let present = (total - absences) as f64;
        Some(round_off_whole(100.0 * present / total as f64))
    } else {
        None
    };
    AttendanceSummary {
        total_sessions: total,
        absences,
        attendance_rate,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn db(e: rusqlite::Error) -> Self {
        Self::new("db_query_failed", e.to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportStudent {
    pub id: String,
    pub matricule: String,
    pub last_name: String,
    pub first_names: String,
    pub class_level: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCard {
    pub student: ReportStudent,
    pub term: Term,
    pub school_year: String,
    pub subject_averages: Vec<SubjectAverage>,
    pub excluded_subjects: Vec<String>,
    pub overall_average: Option<f64>,
    pub attendance: AttendanceSummary,
    pub appreciation: Option<String>,
    pub appreciation_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
}

/// Display metadata from the subject registry.
#[derive(Debug, Clone)]
pub struct SubjectMeta {
    pub code: String,
    pub color: String,
}

#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub school_year: String,
    pub subject_order: SubjectOrder,
    pub show_generated_at: bool,
}

pub fn build_report_card(
    student: ReportStudent,
    term: Term,
    school_year: &str,
    evaluations: &[Evaluation],
    attendance: &[AttendanceRecord],
    registry: &HashMap<String, SubjectMeta>,
    order: SubjectOrder,
) -> ReportCard {
    let SubjectAverages {
        mut rows,
        zero_weight_subjects,
    } = compute_subject_averages(evaluations, order);
    for row in rows.iter_mut() {
        if let Some(meta) = registry.get(&row.subject) {
            row.code = Some(meta.code.clone());
            row.color = Some(meta.color.clone());
        }
    }
    let overall_average = compute_overall_average(&rows);
    let appreciation = overall_average.map(classify_appreciation);

    ReportCard {
        student,
        term,
        school_year: school_year.to_string(),
        subject_averages: rows,
        excluded_subjects: zero_weight_subjects,
        overall_average,
        attendance: compute_attendance_summary(attendance),
        appreciation: appreciation.map(|a| a.label().to_string()),
        appreciation_color: appreciation.map(|a| a.color().to_string()),
        generated_at: None,
    }
}

#[derive(Debug, Clone)]
pub struct CalcContext<'a> {
    pub conn: &'a Connection,
}

fn load_student(conn: &Connection, student_id: &str) -> Result<ReportStudent, CalcError> {
    conn.query_row(
        "SELECT id, matricule, last_name, first_names, class_level
         FROM students WHERE id = ?",
        [student_id],
        |r| {
            Ok(ReportStudent {
                id: r.get(0)?,
                matricule: r.get(1)?,
                last_name: r.get(2)?,
                first_names: r.get(3)?,
                class_level: r.get(4)?,
            })
        },
    )
    .optional()
    .map_err(CalcError::db)?
    .ok_or_else(|| CalcError::new("not_found", "student not found"))
}

fn load_evaluations(
    conn: &Connection,
    student_id: &str,
    term: Term,
    school_year: &str,
) -> Result<Vec<Evaluation>, CalcError> {
    let mut stmt = conn
        .prepare(
            "SELECT subject, score, out_of, coefficient
             FROM evaluations
             WHERE student_id = ? AND term = ? AND school_year = ?
             ORDER BY eval_date, rowid",
        )
        .map_err(CalcError::db)?;
    stmt.query_map((student_id, term.as_str(), school_year), |r| {
        Ok(Evaluation {
            subject: r.get(0)?,
            score: r.get(1)?,
            out_of: r.get(2)?,
            coefficient: r.get(3)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(CalcError::db)
}

fn load_attendance(
    conn: &Connection,
    student_id: &str,
    term: Term,
    school_year: &str,
) -> Result<Vec<AttendanceRecord>, CalcError> {
    let mut stmt = conn
        .prepare(
            "SELECT present FROM attendance
             WHERE student_id = ? AND term = ? AND school_year = ?",
        )
        .map_err(CalcError::db)?;
    stmt.query_map((student_id, term.as_str(), school_year), |r| {
        Ok(AttendanceRecord {
            present: r.get::<_, i64>(0)? != 0,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(CalcError::db)
}

fn load_subject_registry(conn: &Connection) -> Result<HashMap<String, SubjectMeta>, CalcError> {
    let mut stmt = conn
        .prepare("SELECT name, code, color FROM subjects ORDER BY created_at, rowid")
        .map_err(CalcError::db)?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                SubjectMeta {
                    code: r.get(1)?,
                    color: r.get(2)?,
                },
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(CalcError::db)?;
    let mut out = HashMap::new();
    for (name, meta) in rows {
        out.entry(name).or_insert(meta);
    }
    Ok(out)
}

pub fn generate_report_card(
    ctx: &CalcContext<'_>,
    student_id: &str,
    term: Term,
    opts: &ReportOptions,
) -> Result<ReportCard, CalcError> {
    let registry = load_subject_registry(ctx.conn)?;
    generate_with_registry(ctx, student_id, term, opts, &registry)
}

fn generate_with_registry(
    ctx: &CalcContext<'_>,
    student_id: &str,
    term: Term,
    opts: &ReportOptions,
    registry: &HashMap<String, SubjectMeta>,
) -> Result<ReportCard, CalcError> {
    let student = load_student(ctx.conn, student_id)?;
    let evaluations = load_evaluations(ctx.conn, student_id, term, &opts.school_year)?;
    let attendance = load_attendance(ctx.conn, student_id, term, &opts.school_year)?;

    let mut card = build_report_card(
        student,
        term,
        &opts.school_year,
        &evaluations,
        &attendance,
        registry,
        opts.subject_order,
    );
    if !card.excluded_subjects.is_empty() {
        warn!(
            student_id,
            term = %term,
            subjects = ?card.excluded_subjects,
            "subjects with zero total coefficient left out of report card"
        );
    }
    if opts.show_generated_at {
        card.generated_at = Some(chrono::Utc::now().to_rfc3339());
    }
    debug!(
        student_id,
        term = %term,
        evaluations = evaluations.len(),
        sessions = attendance.len(),
        "report card generated"
    );
    Ok(card)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSummaryRow {
    pub student_id: String,
    pub matricule: String,
    pub display_name: String,
    pub subject_count: usize,
    pub overall_average: Option<f64>,
    pub appreciation: Option<String>,
    pub attendance_rate: Option<u32>,
}

/// One row per active student of a class level, ordered by name.
pub fn compute_class_summary(
    ctx: &CalcContext<'_>,
    class_level: &str,
    term: Term,
    opts: &ReportOptions,
) -> Result<Vec<ClassSummaryRow>, CalcError> {
    let mut stmt = ctx
        .conn
        .prepare(
            "SELECT id FROM students
             WHERE class_level = ? AND school_year = ? AND active = 1
             ORDER BY last_name, first_names, matricule",
        )
        .map_err(CalcError::db)?;
    let ids = stmt
        .query_map((class_level, opts.school_year.as_str()), |r| {
            r.get::<_, String>(0)
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(CalcError::db)?;

    let registry = load_subject_registry(ctx.conn)?;
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        let card = generate_with_registry(ctx, &id, term, opts, &registry)?;
        out.push(ClassSummaryRow {
            student_id: card.student.id.clone(),
            matricule: card.student.matricule.clone(),
            display_name: format!("{} {}", card.student.last_name, card.student.first_names),
            subject_count: card.subject_averages.len(),
            overall_average: card.overall_average,
            appreciation: card.appreciation,
            attendance_rate: card.attendance.attendance_rate,
        });
    }
    Ok(out)
}

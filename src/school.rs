use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\+224|224)?[67][0-9]{8}$").expect("invalid phone regex"));

static SCHOOL_YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{4})$").expect("invalid school year regex"));

static COLOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("invalid color regex"));

/// Grading period within a school year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Term {
    T1,
    T2,
    T3,
}

impl Term {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "T1" => Some(Self::T1),
            "T2" => Some(Self::T2),
            "T3" => Some(Self::T3),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::T1 => "T1",
            Self::T2 => "T2",
            Self::T3 => "T3",
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassLevel {
    Cp1,
    Cp2,
    Ce1,
    Ce2,
    Cm1,
    Cm2,
    Sixieme,
    Cinquieme,
    Quatrieme,
    Troisieme,
    Seconde,
    Premiere,
    Terminale,
}

impl ClassLevel {
    pub const ALL: [ClassLevel; 13] = [
        ClassLevel::Cp1,
        ClassLevel::Cp2,
        ClassLevel::Ce1,
        ClassLevel::Ce2,
        ClassLevel::Cm1,
        ClassLevel::Cm2,
        ClassLevel::Sixieme,
        ClassLevel::Cinquieme,
        ClassLevel::Quatrieme,
        ClassLevel::Troisieme,
        ClassLevel::Seconde,
        ClassLevel::Premiere,
        ClassLevel::Terminale,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        let t = s.trim();
        Self::ALL.into_iter().find(|l| l.label() == t)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Cp1 => "CP1",
            Self::Cp2 => "CP2",
            Self::Ce1 => "CE1",
            Self::Ce2 => "CE2",
            Self::Cm1 => "CM1",
            Self::Cm2 => "CM2",
            Self::Sixieme => "6ème",
            Self::Cinquieme => "5ème",
            Self::Quatrieme => "4ème",
            Self::Troisieme => "3ème",
            Self::Seconde => "2nde",
            Self::Premiere => "1ère",
            Self::Terminale => "Tle",
        }
    }

    /// Two-digit code embedded in registration numbers.
    pub fn registry_code(self) -> &'static str {
        match self {
            Self::Cp1 => "01",
            Self::Cp2 => "02",
            Self::Ce1 => "03",
            Self::Ce2 => "04",
            Self::Cm1 => "05",
            Self::Cm2 => "06",
            Self::Sixieme => "07",
            Self::Cinquieme => "08",
            Self::Quatrieme => "09",
            Self::Troisieme => "10",
            Self::Seconde => "11",
            Self::Premiere => "12",
            Self::Terminale => "13",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationKind {
    Devoir,
    Composition,
    Controle,
    Examen,
    Oral,
}

impl EvaluationKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "devoir" => Some(Self::Devoir),
            "composition" => Some(Self::Composition),
            "controle" => Some(Self::Controle),
            "examen" => Some(Self::Examen),
            "oral" => Some(Self::Oral),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Devoir => "devoir",
            Self::Composition => "composition",
            Self::Controle => "controle",
            Self::Examen => "examen",
            Self::Oral => "oral",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sex {
    Masculin,
    Feminin,
}

impl Sex {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "masculin" => Some(Self::Masculin),
            "feminin" => Some(Self::Feminin),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Masculin => "masculin",
            Self::Feminin => "feminin",
        }
    }
}

/// Registration number: first year of the label, level code, 3-digit sequence.
pub fn matricule(school_year: &str, level: ClassLevel, sequence: u32) -> String {
    let year = school_year.split('-').next().unwrap_or(school_year);
    format!("{}{}{:03}", year, level.registry_code(), sequence)
}

/// Accepts Guinean mobile numbers, with or without the 224 country prefix.
pub fn is_valid_phone(raw: &str) -> bool {
    let clean: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.'))
        .collect();
    PHONE_RE.is_match(&clean)
}

pub fn is_valid_school_year(label: &str) -> bool {
    let Some(caps) = SCHOOL_YEAR_RE.captures(label.trim()) else {
        return false;
    };
    let start: i32 = caps[1].parse().unwrap_or(0);
    let end: i32 = caps[2].parse().unwrap_or(0);
    end == start + 1
}

pub fn is_valid_color(raw: &str) -> bool {
    COLOR_RE.is_match(raw.trim())
}

/// Month boundaries of the school year, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchoolCalendar {
    pub school_year_start_month: u32,
    pub term2_start_month: u32,
    pub term3_start_month: u32,
}

impl Default for SchoolCalendar {
    fn default() -> Self {
        Self {
            school_year_start_month: 9,
            term2_start_month: 1,
            term3_start_month: 4,
        }
    }
}

impl SchoolCalendar {
    fn offset(&self, month: u32) -> u32 {
        (month + 12 - self.school_year_start_month) % 12
    }

    /// Terms must start in order after the school year opens.
    pub fn validate(&self) -> Result<(), String> {
        for (name, m) in [
            ("schoolYearStartMonth", self.school_year_start_month),
            ("term2StartMonth", self.term2_start_month),
            ("term3StartMonth", self.term3_start_month),
        ] {
            if !(1..=12).contains(&m) {
                return Err(format!("{} must be between 1 and 12", name));
            }
        }
        let t2 = self.offset(self.term2_start_month);
        let t3 = self.offset(self.term3_start_month);
        if t2 == 0 || t3 <= t2 {
            return Err("terms must start in order after the school year start".to_string());
        }
        Ok(())
    }

    pub fn term_for(&self, date: NaiveDate) -> Term {
        let off = self.offset(date.month());
        if off >= self.offset(self.term3_start_month) {
            Term::T3
        } else if off >= self.offset(self.term2_start_month) {
            Term::T2
        } else {
            Term::T1
        }
    }
}

// src/normalize.rs

use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

/// One spreadsheet cell, already lifted out of the decoder's own value
/// type so the rest of the pipeline never touches calamine/csv directly.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
    /// Excel duration cells arrive as elapsed seconds.
    DurationSecs(f64),
}

static NUMERIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+[.,]?\d*").unwrap());

// ─────────────────────────────────────────────────────────────────────────────
// Duration → hours
// ─────────────────────────────────────────────────────────────────────────────

/// Converts a service-time cell to hours. Accepts plain numbers (already
/// hours), duration cells, "H:M:S" / "H:M" strings, bare numeric strings,
/// and as a last resort the first numeric substring of free text.
/// Unparsable input yields 0.0 — a bad duration never drops the row.
pub fn duration_hours(cell: &Cell) -> f64 {
    let hours = match cell {
        Cell::Number(n) => *n,
        Cell::DurationSecs(s) => s / 3600.0,
        Cell::Text(t) => duration_from_str(t),
        _ => 0.0,
    };
    if hours.is_finite() && hours > 0.0 {
        hours
    } else {
        0.0
    }
}

fn duration_from_str(raw: &str) -> f64 {
    let s = raw.trim();
    if s.is_empty() {
        return 0.0;
    }
    if s.contains(':') {
        let mut parts = s.split(':');
        let h = parts.next().and_then(|p| p.trim().parse::<f64>().ok());
        let m = parts.next().and_then(|p| p.trim().parse::<f64>().ok());
        let sec = parts.next().and_then(|p| p.trim().parse::<f64>().ok());
        if let Some(h) = h {
            return h + m.unwrap_or(0.0) / 60.0 + sec.unwrap_or(0.0) / 3600.0;
        }
        return 0.0;
    }
    if let Ok(n) = s.parse::<f64>() {
        return n;
    }
    // "2.5h", "aprox. 3 horas" — take the first number in the text
    NUMERIC_RE
        .find(s)
        .and_then(|m| m.as_str().replace(',', ".").parse::<f64>().ok())
        .unwrap_or(0.0)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tri-state booleans
// ─────────────────────────────────────────────────────────────────────────────

const AFFIRMATIVE: [&str; 7] = ["sim", "yes", "true", "1", "verdadeiro", "s", "y"];
const NEGATIVE: [&str; 7] = ["não", "nao", "no", "false", "0", "falso", "n"];

/// Flag cells come localized ("Sim"/"Não"), as bare numbers, or empty.
/// None means the spreadsheet did not say either way.
pub fn tri_state(cell: &Cell) -> Option<bool> {
    match cell {
        Cell::Empty => None,
        Cell::Bool(b) => Some(*b),
        Cell::Number(n) => Some(*n != 0.0),
        Cell::Text(t) => {
            let v = t.trim().to_lowercase();
            if AFFIRMATIVE.contains(&v.as_str()) {
                Some(true)
            } else if NEGATIVE.contains(&v.as_str()) {
                Some(false)
            } else {
                None
            }
        }
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Timestamps
// ─────────────────────────────────────────────────────────────────────────────

const DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"];

/// Best-effort timestamp parse; unparsable input is absent, not an error.
pub fn timestamp(cell: &Cell) -> Option<NaiveDateTime> {
    match cell {
        Cell::DateTime(dt) => Some(*dt),
        Cell::Text(t) => {
            let s = t.trim();
            if s.is_empty() {
                return None;
            }
            for fmt in DATETIME_FORMATS {
                if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                    return Some(dt);
                }
            }
            for fmt in DATE_FORMATS {
                if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
                    return d.and_hms_opt(0, 0, 0);
                }
            }
            None
        }
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Text
// ─────────────────────────────────────────────────────────────────────────────

/// Trimmed text; empty cells collapse to None. Numeric cells are rendered
/// (ticket ids often come through as numbers).
pub fn text(cell: &Cell) -> Option<String> {
    match cell {
        Cell::Text(t) => {
            let s = t.trim();
            if s.is_empty() {
                None
            } else {
                Some(s.to_string())
            }
        }
        Cell::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                Some(format!("{}", *n as i64))
            } else {
                Some(format!("{n}"))
            }
        }
        Cell::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// The identity used everywhere two names are compared: clients and
/// technicians are the same entity iff their normalized names match.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

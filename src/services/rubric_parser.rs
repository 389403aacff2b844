//! Turns a loosely structured rubric sheet into a [`ParsedRubric`].
//!
//! Layout convention: the first cell of the first row is the title, one row
//! is the header row (its first cell mentions "criteria" or "student name"),
//! and every following row is a criterion until a terminator row. Header cells
//! name the levels; the score for a column is read from its header text.
//!
//! Parsing never fails. Input without a recognizable header row yields a
//! rubric with a title and no criteria.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::models::rubric::{Criterion, Level, ParsedRubric, Sheet};

const HEADER_MARKERS: [&str; 2] = ["criteria", "student name"];
const TERMINATOR_MARKERS: [&str; 2] = ["TOTAL SCORE", "NOTES FOR INSTRUCTION"];

static PARENTHESIZED_SCORE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([0-9]+)\)").expect("parenthesized score pattern is valid"));

pub fn parse_rubric_sheet(sheet: &Sheet) -> ParsedRubric {
    let title = sheet.cell(0, 0).to_string();

    let Some(header_index) = find_header_row(sheet) else {
        debug!(target: "app::rubric", sheet = %sheet.name, "no header row found");
        return ParsedRubric {
            title,
            criteria: Vec::new(),
        };
    };

    let header = &sheet.rows[header_index];
    let mut criteria = Vec::new();

    for (row_index, row) in sheet.rows.iter().enumerate().skip(header_index + 1) {
        let label = row.first().map(String::as_str).unwrap_or("");

        if label.is_empty() {
            continue;
        }
        if is_terminator(label) {
            break;
        }

        let levels = build_levels(header, row);
        if levels.is_empty() {
            continue;
        }

        criteria.push(Criterion {
            id: format!("crit_{row_index}"),
            label: label.to_string(),
            levels,
        });
    }

    debug!(
        target: "app::rubric",
        sheet = %sheet.name,
        header_row = header_index,
        criteria = criteria.len(),
        "parsed rubric sheet"
    );

    ParsedRubric { title, criteria }
}

/// Index of the first row whose first cell marks it as the header row.
pub fn find_header_row(sheet: &Sheet) -> Option<usize> {
    sheet.rows.iter().position(|row| {
        let first = row.first().map(|cell| cell.to_lowercase()).unwrap_or_default();
        HEADER_MARKERS.iter().any(|marker| first.contains(marker))
    })
}

fn is_terminator(label: &str) -> bool {
    let upper = label.to_uppercase();
    TERMINATOR_MARKERS
        .iter()
        .any(|marker| upper.contains(marker))
}

fn build_levels(header: &[String], row: &[String]) -> Vec<Level> {
    row.iter()
        .enumerate()
        .skip(1)
        .filter_map(|(col, description)| {
            let header_text = header.get(col).map(String::as_str).unwrap_or("");
            if description.is_empty() || header_text.is_empty() {
                return None;
            }
            Some(Level {
                score: score_for_column(header_text, col),
                label: header_text.to_string(),
                description: description.clone(),
            })
        })
        .collect()
}

/// Score for a level column, read from its header text.
///
/// A parenthesized number wins ("Needs Work (1)"). Otherwise the first of
/// the digits "1", "2", "3" found anywhere in the text is used, checked in
/// that order, so "Level 32" scores 2. Without either, the 1-based column
/// index is the score.
pub fn score_for_column(header_text: &str, col: usize) -> i64 {
    let column_score = i64::try_from(col).unwrap_or(i64::MAX);

    if let Some(captures) = PARENTHESIZED_SCORE.captures(header_text) {
        return captures[1].parse::<i64>().unwrap_or(column_score);
    }

    let lower = header_text.to_lowercase();
    if lower.contains('1') {
        1
    } else if lower.contains('2') {
        2
    } else if lower.contains('3') {
        3
    } else {
        column_score
    }
}

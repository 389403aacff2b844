use serde::{Deserialize, Serialize};

/// A workbook of rubric templates as shipped or imported.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawRubricData {
    pub file_name: String,
    pub sheets: Vec<Sheet>,
}

/// A named grid of text cells. Blank cells are empty strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    /// Builds a sheet from string literals, mostly for templates and tests.
    pub fn from_rows<R, C>(name: impl Into<String>, rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(Into::into).collect())
            .collect();
        Self::new(name, rows)
    }

    /// Returns the cell text, or an empty string when the row or column is missing.
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Level {
    pub score: i64,
    pub label: String,
    pub description: String,
}

impl Level {
    pub fn new(score: i64, label: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            score,
            label: label.into(),
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Criterion {
    pub id: String,
    pub label: String,
    pub levels: Vec<Level>,
}

impl Criterion {
    pub fn level_for_score(&self, score: i64) -> Option<&Level> {
        self.levels.iter().find(|level| level.score == score)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ParsedRubric {
    pub title: String,
    pub criteria: Vec<Criterion>,
}

impl ParsedRubric {
    pub fn criterion(&self, id: &str) -> Option<&Criterion> {
        self.criteria.iter().find(|criterion| criterion.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.criterion(id).is_some()
    }
}

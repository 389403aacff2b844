use serde::Serialize;

use crate::models::rubric::ParsedRubric;
use crate::services::rubric_parser::parse_rubric_sheet;
use crate::services::template_library::{sheet_by_index, sheet_names};

use super::{run_blocking, AppState, CommandResult};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateCatalog {
    pub file_name: String,
    pub sheet_names: Vec<String>,
}

pub async fn templates_list(state: &AppState) -> CommandResult<TemplateCatalog> {
    let workbook = state.workbook();
    Ok(TemplateCatalog {
        file_name: workbook.file_name.clone(),
        sheet_names: sheet_names(&workbook),
    })
}

/// Parses the template at `index` into a fresh rubric.
pub async fn templates_parse(state: &AppState, index: usize) -> CommandResult<ParsedRubric> {
    let workbook = state.workbook();
    run_blocking(move || {
        let sheet = sheet_by_index(&workbook, index)?;
        Ok(parse_rubric_sheet(sheet))
    })
    .await
}

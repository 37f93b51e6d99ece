use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use calamine::{open_workbook_auto, Reader};
use log::info;

use crate::error::AutomationError;
use crate::suffixes::SuffixList;

/// Column holding the grouping key. `Class` takes precedence over
/// `rule_name` when both are present.
const CLASS_COLUMN: &str = "Class";
const RULE_COLUMN: &str = "rule_name";
const ASIN_COLUMN: &str = "asin_id";
const MARKETPLACE_COLUMN: &str = "marketplace_id";

/// One row of the input file after header resolution.
#[derive(Debug, Clone)]
pub struct InputRow {
    pub group_key: String,
    pub asin_id: String,
    pub marketplace_id: Option<String>,
}

/// All rows sharing one grouping key, processed as one automation unit.
#[derive(Debug, Clone)]
pub struct ClassGroup {
    pub raw_name: String,
    pub cleaned_name: String,
    pub asins: Vec<String>,
    /// First non-empty marketplace id seen in the group, if any.
    pub marketplace_id: Option<String>,
}

/// Loads the input file and groups its rows by the grouping column,
/// preserving first-appearance order.
///
/// `.xlsx`/`.xls` files are read with calamine, anything else as CSV.
/// Fails with `Validation` if no grouping column or no `asin_id` column
/// exists.
pub fn load_class_groups<P: AsRef<Path>>(
    path: P,
    suffixes: &SuffixList,
) -> Result<Vec<ClassGroup>, AutomationError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(AutomationError::Validation(format!(
            "input file {:?} does not exist",
            path
        )));
    }

    let is_excel = path
        .extension()
        .map_or(false, |ext| ext == "xlsx" || ext == "xls");

    let rows = if is_excel {
        load_excel_rows(path)?
    } else {
        load_csv_rows(path)?
    };

    info!("Loaded {} rows from {:?}", rows.len(), path);
    Ok(group_rows(rows, suffixes))
}

fn group_rows(rows: Vec<InputRow>, suffixes: &SuffixList) -> Vec<ClassGroup> {
    let mut groups: Vec<ClassGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for row in rows {
        if row.asin_id.trim().is_empty() {
            continue;
        }
        let idx = match index.get(&row.group_key) {
            Some(&i) => i,
            None => {
                index.insert(row.group_key.clone(), groups.len());
                groups.push(ClassGroup {
                    cleaned_name: suffixes.clean_class_name(&row.group_key),
                    raw_name: row.group_key.clone(),
                    asins: Vec::new(),
                    marketplace_id: None,
                });
                groups.len() - 1
            }
        };
        let group = &mut groups[idx];
        group.asins.push(row.asin_id.trim().to_string());
        if group.marketplace_id.is_none() {
            group.marketplace_id = row
                .marketplace_id
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string);
        }
    }
    groups
}

/// Resolved header indices for the columns the loader cares about.
struct Columns {
    group: usize,
    asin: usize,
    marketplace: Option<usize>,
}

fn resolve_columns(headers: &[String]) -> Result<Columns, AutomationError> {
    let find = |name: &str| headers.iter().position(|h| h.trim() == name);

    let group = find(CLASS_COLUMN)
        .or_else(|| find(RULE_COLUMN))
        .ok_or_else(|| {
            AutomationError::Validation(format!(
                "input file must contain a '{}' or '{}' column",
                CLASS_COLUMN, RULE_COLUMN
            ))
        })?;
    let asin = find(ASIN_COLUMN).ok_or_else(|| {
        AutomationError::Validation(format!(
            "input file must contain an '{}' column",
            ASIN_COLUMN
        ))
    })?;

    Ok(Columns {
        group,
        asin,
        marketplace: find(MARKETPLACE_COLUMN),
    })
}

fn load_csv_rows(path: &Path) -> Result<Vec<InputRow>, AutomationError> {
    let file = File::open(path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();
    let columns = resolve_columns(&headers)?;

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let cell = |i: usize| record.get(i).unwrap_or("").to_string();
        rows.push(InputRow {
            group_key: cell(columns.group),
            asin_id: cell(columns.asin),
            marketplace_id: columns.marketplace.map(cell).filter(|m| !m.is_empty()),
        });
    }
    Ok(rows)
}

fn load_excel_rows(path: &Path) -> Result<Vec<InputRow>, AutomationError> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| AutomationError::Spreadsheet(format!("could not open {:?}: {}", path, e)))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AutomationError::Spreadsheet(format!("{:?} has no worksheets", path)))?
        .map_err(|e| AutomationError::Spreadsheet(e.to_string()))?;

    let mut rows_iter = range.rows();
    let headers: Vec<String> = rows_iter
        .next()
        .ok_or_else(|| AutomationError::Validation("input file is empty".to_string()))?
        .iter()
        .map(|c| c.to_string())
        .collect();
    let columns = resolve_columns(&headers)?;

    let mut rows = Vec::new();
    for row in rows_iter {
        let cell = |i: usize| row.get(i).map(|c| c.to_string()).unwrap_or_default();
        rows.push(InputRow {
            group_key: cell(columns.group),
            asin_id: cell(columns.asin),
            marketplace_id: columns.marketplace.map(cell).filter(|m| !m.is_empty()),
        });
    }
    Ok(rows)
}

//! Column discovery for delimited files.
//!
//! Types are inferred the way a dataframe reader infers column dtypes, then
//! mapped onto catalog type names: int64 → `bigint`, float64 → `double`,
//! bool → `boolean`, object → `string`.

use crate::errors::Result;
use crate::models::ColumnSpec;
use csv::ReaderBuilder;
use std::collections::{HashMap, HashSet};

/// Cells read as missing values.
const MISSING_MARKERS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Header prefix given to columns that had no name.
const UNNAMED_PREFIX: &str = "Unnamed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferredType {
    BigInt,
    Double,
    Boolean,
    String,
}

impl InferredType {
    pub fn catalog_type(&self) -> &'static str {
        match self {
            InferredType::BigInt => "bigint",
            InferredType::Double => "double",
            InferredType::Boolean => "boolean",
            InferredType::String => "string",
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    missing: bool,
    ints: bool,
    floats: bool,
    bools: bool,
    text: bool,
}

impl Tally {
    fn observe(&mut self, cell: &str) {
        let cell = cell.trim();
        if MISSING_MARKERS.contains(&cell) {
            self.missing = true;
        } else if cell.parse::<i64>().is_ok() {
            self.ints = true;
        } else if cell.bytes().any(|b| b.is_ascii_digit()) && cell.parse::<f64>().is_ok() {
            self.floats = true;
        } else if matches!(cell, "True" | "TRUE" | "true" | "False" | "FALSE" | "false") {
            self.bools = true;
        } else {
            self.text = true;
        }
    }

    fn resolve(&self) -> InferredType {
        let numeric = self.ints || self.floats;
        if self.text || (self.bools && (numeric || self.missing)) {
            InferredType::String
        } else if self.bools {
            InferredType::Boolean
        } else if self.ints && !self.floats && !self.missing {
            InferredType::BigInt
        } else {
            // Floats, integers with gaps, and columns with no values at all.
            InferredType::Double
        }
    }
}

/// Reads the header and rows of a CSV document and returns its usable columns
/// in left-to-right order, numbered from 1.
///
/// Empty headers and headers starting with `Unnamed` are dropped. Repeated
/// header names are disambiguated as `name.1`, `name.2`, …
pub fn infer_columns(content: &[u8]) -> Result<Vec<ColumnSpec>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content);

    let headers: Vec<String> = dedupe_headers(reader.headers()?.iter());
    let mut tallies = vec![Tally::default(); headers.len()];

    for record in reader.records() {
        let record = record?;
        for (index, tally) in tallies.iter_mut().enumerate() {
            tally.observe(record.get(index).unwrap_or(""));
        }
    }

    let columns = headers
        .into_iter()
        .zip(tallies)
        .filter(|(name, _)| !name.trim().is_empty() && !name.starts_with(UNNAMED_PREFIX))
        .enumerate()
        .map(|(index, (name, tally))| ColumnSpec {
            name,
            order: index as u32 + 1,
            data_type: tally.resolve().catalog_type().to_string(),
        })
        .collect();
    Ok(columns)
}

fn dedupe_headers<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::new();
    let mut suffixes: HashMap<String, usize> = HashMap::new();
    raw.map(|name| {
        let name = name.trim().to_string();
        if name.is_empty() {
            return name;
        }
        let mut unique = name.clone();
        if used.contains(&unique) {
            let suffix = suffixes.entry(name.clone()).or_insert(0);
            // Skip suffixed names that already appear as real headers.
            loop {
                *suffix += 1;
                unique = format!("{name}.{suffix}");
                if !used.contains(&unique) {
                    break;
                }
            }
        }
        used.insert(unique.clone());
        unique
    })
    .collect()
}

/// Table name for an object key: path separators become underscores and the
/// `.csv` extension is dropped.
pub fn table_name_for_key(key: &str) -> String {
    key.replace('/', "_").replace(".csv", "")
}

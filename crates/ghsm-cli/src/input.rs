use std::{fs::File, io::Read, path::Path};

use color_eyre::{
    eyre::{bail, WrapErr},
    Result,
};
use ghsm_core::{
    error::InputError,
    model::{MalformedRecord, SecretRecord},
};

pub const NAME_COLUMN: &str = "secret_name";
pub const VALUE_COLUMN: &str = "secret_value";

pub type InputRecord = Result<SecretRecord, MalformedRecord>;

/// Read secrets from a CSV file with a header row.
pub fn load_records(path: &Path) -> Result<Vec<InputRecord>> {
    let file =
        File::open(path).wrap_err_with(|| format!("failed to open {}", path.display()))?;
    read_records(file).wrap_err_with(|| format!("failed to read {}", path.display()))
}

/// Parse CSV rows into records. A missing header column fails the whole read;
/// problems with a single row are returned in that row's position.
pub fn read_records<R: Read>(reader: R) -> Result<Vec<InputRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let name_idx = column(&headers, NAME_COLUMN)?;
    let value_idx = column(&headers, VALUE_COLUMN)?;

    let mut records = Vec::new();
    for (idx, row) in rdr.records().enumerate() {
        // Header is line 1.
        let fallback_line = idx as u64 + 2;
        let row = match row {
            Ok(row) => row,
            Err(err) => {
                let line = err.position().map_or(fallback_line, |p| p.line());
                records.push(Err(MalformedRecord {
                    label: format!("line {line}"),
                    error: InputError::Unreadable {
                        reason: err.to_string(),
                    },
                }));
                continue;
            }
        };
        let line = row.position().map_or(fallback_line, |p| p.line());
        records.push(parse_row(&row, name_idx, value_idx, line));
    }
    Ok(records)
}

fn parse_row(row: &csv::StringRecord, name_idx: usize, value_idx: usize, line: u64) -> InputRecord {
    let malformed = |label: String, error: InputError| MalformedRecord { label, error };

    let Some(name) = row.get(name_idx) else {
        return Err(malformed(
            format!("line {line}"),
            InputError::MissingField { field: NAME_COLUMN },
        ));
    };
    let label = if name.is_empty() {
        format!("line {line}")
    } else {
        name.to_string()
    };
    let Some(value) = row.get(value_idx) else {
        return Err(malformed(
            label,
            InputError::MissingField {
                field: VALUE_COLUMN,
            },
        ));
    };

    SecretRecord::new(name, value).map_err(|error| malformed(label, error))
}

fn column(headers: &csv::StringRecord, name: &str) -> Result<usize> {
    match headers.iter().position(|h| h == name) {
        Some(idx) => Ok(idx),
        None => bail!("missing required column `{name}`"),
    }
}

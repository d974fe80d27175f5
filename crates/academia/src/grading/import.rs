use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Deserializer};

use super::domain::{GradeEntry, StudentId};

#[derive(Debug, thiserror::Error)]
pub enum GradeSheetError {
    #[error("failed to read grade sheet: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid grade sheet CSV data: {0}")]
    Csv(#[from] csv::Error),
    #[error("line {line}: {detail}")]
    InvalidRow { line: u64, detail: String },
}

#[derive(Debug, Deserialize)]
struct GradeSheetRow {
    student_id: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    score: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    absent: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    coefficient: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    comment: Option<String>,
}

impl GradeSheetRow {
    fn into_entry(self, line: u64) -> Result<GradeEntry, GradeSheetError> {
        let invalid = |detail: String| GradeSheetError::InvalidRow { line, detail };

        if self.student_id.trim().is_empty() {
            return Err(invalid("missing student_id".to_string()));
        }

        let score = self
            .score
            .as_deref()
            .map(|raw| {
                raw.replace(',', ".")
                    .parse::<f64>()
                    .map_err(|_| invalid(format!("score '{raw}' is not a number")))
            })
            .transpose()?;

        let is_absent = match self.absent.as_deref() {
            None => false,
            Some(raw) => parse_flag(raw)
                .ok_or_else(|| invalid(format!("absent flag '{raw}' is not recognised")))?,
        };

        let coefficient = self
            .coefficient
            .as_deref()
            .map(|raw| {
                raw.parse::<u32>()
                    .map_err(|_| invalid(format!("coefficient '{raw}' is not a whole number")))
            })
            .transpose()?;

        Ok(GradeEntry {
            student_id: StudentId::new(self.student_id.trim()),
            score,
            is_absent,
            coefficient,
            comment: self.comment,
        })
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "x" | "abs" | "absent" => Some(true),
        "0" | "false" | "no" | "n" | "present" => Some(false),
        _ => None,
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

/// Reads `student_id,score,absent,coefficient,comment` sheets into bulk grade entries.
pub struct GradeSheetImporter;

impl GradeSheetImporter {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Vec<GradeEntry>, GradeSheetError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Vec<GradeEntry>, GradeSheetError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);
        let mut entries = Vec::new();

        for record in csv_reader.deserialize::<GradeSheetRow>() {
            let row = record?;
            // header is line 1
            let line = entries.len() as u64 + 2;
            entries.push(row.into_entry(line)?);
        }

        Ok(entries)
    }
}

use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;

use super::criteria::Criterion;
use super::domain::{Applicant, ApplicantId, CriterionId, Jurisdiction, JurisdictionCode, JurisdictionKind};
use super::store::{ReferenceDataSink, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("failed to read reference data: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid reference CSV data: {0}")]
    Csv(#[from] csv::Error),
    #[error("could not store reference data: {0}")]
    Store(#[from] StoreError),
}

/// Row counts written by one import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub jurisdictions: usize,
    pub criteria: usize,
    pub applicants: usize,
}

/// Loads the reference tables (`jurisdiction`, `shortlisting_criteria`,
/// `applicant_primary_info`) from CSV exports. Each file is written in one transaction.
pub struct ReferenceDataImporter;

impl ReferenceDataImporter {
    pub fn jurisdictions_from_path<P, S>(path: P, sink: &S) -> Result<usize, ImportError>
    where
        P: AsRef<Path>,
        S: ReferenceDataSink + ?Sized,
    {
        let file = std::fs::File::open(path)?;
        Self::jurisdictions_from_reader(file, sink)
    }

    pub fn jurisdictions_from_reader<R, S>(reader: R, sink: &S) -> Result<usize, ImportError>
    where
        R: Read,
        S: ReferenceDataSink + ?Sized,
    {
        let rows = parse_jurisdictions(reader)?;
        let written = sink.load_jurisdictions(&rows)?;
        info!(rows = written, "imported jurisdictions");
        Ok(written)
    }

    pub fn criteria_from_path<P, S>(path: P, sink: &S) -> Result<usize, ImportError>
    where
        P: AsRef<Path>,
        S: ReferenceDataSink + ?Sized,
    {
        let file = std::fs::File::open(path)?;
        Self::criteria_from_reader(file, sink)
    }

    pub fn criteria_from_reader<R, S>(reader: R, sink: &S) -> Result<usize, ImportError>
    where
        R: Read,
        S: ReferenceDataSink + ?Sized,
    {
        let rows = parse_criteria(reader)?;
        let written = sink.load_criteria(&rows)?;
        info!(rows = written, "imported shortlisting criteria");
        Ok(written)
    }

    pub fn applicants_from_path<P, S>(path: P, sink: &S) -> Result<usize, ImportError>
    where
        P: AsRef<Path>,
        S: ReferenceDataSink + ?Sized,
    {
        let file = std::fs::File::open(path)?;
        Self::applicants_from_reader(file, sink)
    }

    pub fn applicants_from_reader<R, S>(reader: R, sink: &S) -> Result<usize, ImportError>
    where
        R: Read,
        S: ReferenceDataSink + ?Sized,
    {
        let rows = parse_applicants(reader)?;
        let written = sink.load_applicants(&rows)?;
        info!(rows = written, "imported applicants");
        Ok(written)
    }
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader)
}

#[derive(Debug, Deserialize)]
struct JurisdictionRow {
    code: String,
    name: String,
    kind: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    parent_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CriterionRow {
    id: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApplicantRow {
    applicant_id: String,
    year: i32,
    state_code: String,
    district_code: String,
    block_code: String,
    score_a: f64,
    score_b: f64,
}

pub(crate) fn parse_jurisdictions<R: Read>(reader: R) -> Result<Vec<Jurisdiction>, csv::Error> {
    let mut rows = Vec::new();
    for record in csv_reader(reader).deserialize::<JurisdictionRow>() {
        let row = record?;
        rows.push(Jurisdiction {
            code: JurisdictionCode(row.code),
            name: row.name,
            kind: JurisdictionKind::parse(&row.kind),
            parent_code: row.parent_code.map(JurisdictionCode),
        });
    }
    Ok(rows)
}

pub(crate) fn parse_criteria<R: Read>(reader: R) -> Result<Vec<Criterion>, csv::Error> {
    let mut rows = Vec::new();
    for record in csv_reader(reader).deserialize::<CriterionRow>() {
        let row = record?;
        rows.push(Criterion::new(CriterionId(row.id), row.name));
    }
    Ok(rows)
}

pub(crate) fn parse_applicants<R: Read>(reader: R) -> Result<Vec<Applicant>, csv::Error> {
    let mut rows = Vec::new();
    for record in csv_reader(reader).deserialize::<ApplicantRow>() {
        let row = record?;
        rows.push(Applicant {
            applicant_id: ApplicantId(row.applicant_id),
            year: row.year,
            state_code: JurisdictionCode(row.state_code),
            district_code: JurisdictionCode(row.district_code),
            block_code: JurisdictionCode(row.block_code),
            score_a: row.score_a,
            score_b: row.score_b,
        });
    }
    Ok(rows)
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.and_then(|raw| {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn jurisdiction_rows_parse_kinds_and_blank_parents() {
        let csv = "code,name,kind,parent_code\nS1,StateX,State,\nD1, DistX ,EDUCATION DISTRICT,S1\nB1,Alpha Block,block,D1\n";
        let rows = parse_jurisdictions(Cursor::new(csv)).expect("parse");

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].kind, JurisdictionKind::State);
        assert!(rows[0].parent_code.is_none());
        assert_eq!(rows[1].name, "DistX");
        assert_eq!(rows[1].kind, JurisdictionKind::EducationDistrict);
        assert_eq!(rows[2].parent_code, Some(JurisdictionCode("D1".to_string())));
    }

    #[test]
    fn criteria_rows_resolve_rules() {
        let csv = "id,name\n1,Top 4% (Weighted)\n2,Top 8% (Weighted)\n3,Lottery\n";
        let rows = parse_criteria(Cursor::new(csv)).expect("parse");
        let thresholds: Vec<Option<f64>> = rows.iter().map(|row| row.rule.threshold()).collect();
        assert_eq!(thresholds, vec![Some(0.04), Some(0.08), None]);
    }

    #[test]
    fn applicant_rows_reject_non_numeric_scores() {
        let csv = "applicant_id,year,state_code,district_code,block_code,score_a,score_b\nA1,2024,S1,D1,B1,high,40\n";
        assert!(parse_applicants(Cursor::new(csv)).is_err());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        struct NullSink;
        impl ReferenceDataSink for NullSink {
            fn load_jurisdictions(&self, rows: &[Jurisdiction]) -> Result<usize, StoreError> {
                Ok(rows.len())
            }
            fn load_criteria(&self, rows: &[Criterion]) -> Result<usize, StoreError> {
                Ok(rows.len())
            }
            fn load_applicants(&self, rows: &[Applicant]) -> Result<usize, StoreError> {
                Ok(rows.len())
            }
        }

        let error = ReferenceDataImporter::applicants_from_path("./does-not-exist.csv", &NullSink)
            .expect_err("expected io error");
        match error {
            ImportError::Io(_) => {}
            other => panic!("expected io error, got {other:?}"),
        }
    }
}

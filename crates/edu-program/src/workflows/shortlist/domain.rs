use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::criteria::CriterionRule;

/// Weight applied to the primary applicant score when ranking.
pub const PRIMARY_SCORE_WEIGHT: f64 = 0.7;
/// Weight applied to the secondary applicant score when ranking.
pub const SECONDARY_SCORE_WEIGHT: f64 = 0.3;

/// Case-insensitive, whitespace-trimmed key used for every name comparison.
pub fn normalize_name(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Unique jurisdiction code as stored in the reference data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JurisdictionCode(pub String);

impl fmt::Display for JurisdictionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Level of a node in the geographic hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JurisdictionKind {
    State,
    EducationDistrict,
    Block,
    Other(String),
}

impl JurisdictionKind {
    pub fn parse(raw: &str) -> Self {
        match normalize_name(raw).replace('_', " ").as_str() {
            "state" => Self::State,
            "education district" => Self::EducationDistrict,
            "block" => Self::Block,
            other => Self::Other(other.to_uppercase()),
        }
    }

    /// Label persisted in the `kind` column.
    pub fn label(&self) -> &str {
        match self {
            Self::State => "STATE",
            Self::EducationDistrict => "EDUCATION DISTRICT",
            Self::Block => "BLOCK",
            Self::Other(label) => label,
        }
    }
}

/// Geographic unit; reference data forming a tree through `parent_code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jurisdiction {
    pub code: JurisdictionCode,
    pub name: String,
    pub kind: JurisdictionKind,
    pub parent_code: Option<JurisdictionCode>,
}

impl Jurisdiction {
    pub fn name_matches(&self, normalized: &str) -> bool {
        normalize_name(&self.name) == normalized
    }
}

/// Code/name pair returned for states and districts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JurisdictionSummary {
    pub code: JurisdictionCode,
    pub name: String,
}

impl From<&Jurisdiction> for JurisdictionSummary {
    fn from(value: &Jurisdiction) -> Self {
        Self {
            code: value.code.clone(),
            name: value.name.clone(),
        }
    }
}

/// Block listing entry with a hint for blocks already held by a frozen batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSummary {
    pub code: JurisdictionCode,
    pub name: String,
    pub is_frozen_block: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CriterionId(pub i64);

impl fmt::Display for CriterionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShortlistBatchId(pub i64);

impl fmt::Display for ShortlistBatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicantId(pub String);

/// Stored shortlist batch together with the block codes it claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortlistBatch {
    pub id: ShortlistBatchId,
    pub name: String,
    pub description: String,
    pub criterion_id: CriterionId,
    pub frozen: bool,
    pub created_at: DateTime<Utc>,
    pub blocks: Vec<JurisdictionCode>,
}

/// Row inserted when a batch is created.
#[derive(Debug, Clone, PartialEq)]
pub struct NewShortlistBatch {
    pub name: String,
    pub description: String,
    pub criterion_id: CriterionId,
    pub created_at: DateTime<Utc>,
}

/// Whether a claim belongs to a batch that can still block new claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimStatus {
    Active,
    Frozen,
}

impl ClaimStatus {
    pub(crate) fn frozen_flag(self) -> &'static str {
        match self {
            Self::Active => "N",
            Self::Frozen => "Y",
        }
    }
}

/// One `(batch, block)` scope row joined with the names involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockClaim {
    pub block_code: JurisdictionCode,
    pub block_name: String,
    pub batch_id: ShortlistBatchId,
    pub batch_name: String,
}

/// Candidate block that an active batch already claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockConflict {
    pub block_name: String,
    pub batch_name: String,
}

/// Applicant row as imported into `applicant_primary_info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Applicant {
    pub applicant_id: ApplicantId,
    pub year: i32,
    pub state_code: JurisdictionCode,
    pub district_code: JurisdictionCode,
    pub block_code: JurisdictionCode,
    pub score_a: f64,
    pub score_b: f64,
}

/// Applicant joined with the names of its state, district and block.
///
/// Names are `None` when the applicant references a code missing from the directory;
/// such applicants still take part in the year-wide ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicantRecord {
    pub applicant_id: ApplicantId,
    pub year: i32,
    pub state_name: Option<String>,
    pub district_name: Option<String>,
    pub block_name: Option<String>,
    pub score_a: f64,
    pub score_b: f64,
}

impl ApplicantRecord {
    pub fn weighted_score(&self) -> f64 {
        self.score_a * PRIMARY_SCORE_WEIGHT + self.score_b * SECONDARY_SCORE_WEIGHT
    }
}

/// Inbound request for a new shortlist batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortlistRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub criterion_id: CriterionId,
    pub block_names: Vec<String>,
    pub state_name: String,
    pub district_name: String,
    pub year: i32,
}

/// Per-block result of the ranking step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSelection {
    pub block_name: String,
    pub claimed_codes: Vec<JurisdictionCode>,
    pub selected: Vec<ApplicantId>,
}

/// Summary returned once a batch has been committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortlistOutcome {
    pub batch_id: ShortlistBatchId,
    pub shortlisted_count: usize,
    pub criterion_rule: CriterionRule,
    /// Candidate names that matched no block in the directory; still ranked by name.
    pub skipped_blocks: Vec<String>,
    /// Repeated candidate names dropped before ranking, as submitted.
    #[serde(default)]
    pub duplicate_blocks: Vec<String>,
    pub blocks: Vec<BlockSelection>,
}

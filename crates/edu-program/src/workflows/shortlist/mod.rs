//! Jurisdiction-scoped applicant shortlisting.
//!
//! A shortlist batch claims a set of blocks and selects the applicants of those blocks whose
//! year-wide percentile rank satisfies the batch criterion. At most one active (non-frozen)
//! batch may claim a block; frozen batches are historical and release their blocks.

mod conflicts;
pub mod criteria;
pub mod directory;
pub mod domain;
pub mod import;
pub mod query;
mod ranking;
pub mod router;
pub mod service;
pub mod store;

#[cfg(test)]
mod tests;

pub use criteria::{CriteriaCatalog, Criterion, CriterionRule, CriterionSummary};
pub use directory::JurisdictionDirectory;
pub use domain::{
    normalize_name, Applicant, ApplicantId, ApplicantRecord, BlockConflict, BlockSelection,
    BlockSummary, CriterionId, Jurisdiction, JurisdictionCode, JurisdictionKind,
    JurisdictionSummary, ShortlistBatch, ShortlistBatchId, ShortlistOutcome, ShortlistRequest,
};
pub use import::{ImportError, ImportSummary, ReferenceDataImporter};
pub use query::ShortlistQueryService;
pub use router::{shortlist_router, ShortlistedCountRequest};
pub use service::{ShortlistError, ShortlistService};
pub use store::{
    ReferenceDataSink, ShortlistReader, ShortlistStore, ShortlistUnitOfWork,
    SqliteShortlistStore, StoreError,
};

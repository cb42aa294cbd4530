//! Persistence seam for the shortlisting workflow.
//!
//! Components never hold a connection themselves; they receive a [`ShortlistStore`] and run
//! their statements through a reader or a unit of work scoped to one transaction.

mod schema;
mod sqlite;

use std::time::{Duration, Instant};

use super::criteria::Criterion;
use super::domain::{
    Applicant, ApplicantId, ApplicantRecord, BlockClaim, ClaimStatus, CriterionId, Jurisdiction,
    JurisdictionCode, NewShortlistBatch, ShortlistBatch, ShortlistBatchId,
};

pub use sqlite::SqliteShortlistStore;

/// Storage abstraction so the shortlisting components can be exercised in isolation.
pub trait ShortlistStore: Send + Sync {
    /// Run read-only work against a consistent snapshot.
    fn read<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn ShortlistReader) -> Result<T, E>,
        E: From<StoreError>;

    /// Run work inside one write transaction. `Ok` commits, `Err` rolls back and is
    /// returned unchanged.
    fn transact<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn ShortlistUnitOfWork) -> Result<T, E>,
        E: From<StoreError>;
}

pub trait ShortlistReader {
    fn jurisdictions(&mut self) -> Result<Vec<Jurisdiction>, StoreError>;
    fn criteria(&mut self) -> Result<Vec<Criterion>, StoreError>;
    fn criterion(&mut self, id: CriterionId) -> Result<Option<Criterion>, StoreError>;
    fn claims(&mut self, status: ClaimStatus) -> Result<Vec<BlockClaim>, StoreError>;
    fn applicants_for_year(&mut self, year: i32) -> Result<Vec<ApplicantRecord>, StoreError>;
    /// Block name of every `shortlist_info` row whose applicant belongs to `year`.
    fn shortlisted_block_names(&mut self, year: i32) -> Result<Vec<Option<String>>, StoreError>;
    fn batches(&mut self) -> Result<Vec<ShortlistBatch>, StoreError>;
    fn batch(&mut self, id: ShortlistBatchId) -> Result<Option<ShortlistBatch>, StoreError>;
}

pub trait ShortlistUnitOfWork: ShortlistReader {
    fn insert_batch(&mut self, batch: &NewShortlistBatch) -> Result<ShortlistBatchId, StoreError>;
    fn insert_batch_jurisdiction(
        &mut self,
        batch_id: ShortlistBatchId,
        code: &JurisdictionCode,
    ) -> Result<(), StoreError>;
    fn insert_shortlist_info(
        &mut self,
        batch_id: ShortlistBatchId,
        applicant_id: &ApplicantId,
    ) -> Result<(), StoreError>;
    fn set_frozen(&mut self, batch_id: ShortlistBatchId, frozen: bool) -> Result<(), StoreError>;
    fn delete_batch(&mut self, batch_id: ShortlistBatchId) -> Result<(), StoreError>;
}

/// Loader for the externally owned reference tables.
pub trait ReferenceDataSink {
    fn load_jurisdictions(&self, rows: &[Jurisdiction]) -> Result<usize, StoreError>;
    fn load_criteria(&self, rows: &[Criterion]) -> Result<usize, StoreError>;
    fn load_applicants(&self, rows: &[Applicant]) -> Result<usize, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("transaction exceeded its {0:?} deadline")]
    TimedOut(Duration),
    #[error("corrupt row in {table}: {detail}")]
    CorruptRow { table: &'static str, detail: String },
}

/// Upper bound on how long one transaction may run before it is rolled back.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    pub(crate) fn start(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    pub(crate) fn check(&self) -> Result<(), StoreError> {
        if self.started.elapsed() > self.budget {
            return Err(StoreError::TimedOut(self.budget));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_expires_after_budget() {
        let deadline = Deadline::start(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(2));
        assert!(matches!(deadline.check(), Err(StoreError::TimedOut(_))));

        let generous = Deadline::start(Duration::from_secs(60));
        assert!(generous.check().is_ok());
    }
}

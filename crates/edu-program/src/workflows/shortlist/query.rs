use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use super::domain::normalize_name;
use super::store::{ShortlistStore, StoreError};

/// Read path reporting how many applicants are already shortlisted.
pub struct ShortlistQueryService<S> {
    store: Arc<S>,
}

impl<S> ShortlistQueryService<S>
where
    S: ShortlistStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Counts `shortlist_info` rows whose applicant is from `year` and sits in one of
    /// `block_names`.
    pub fn count_shortlisted(&self, block_names: &[String], year: i32) -> Result<u64, StoreError> {
        let wanted: BTreeSet<String> = block_names.iter().map(|name| normalize_name(name)).collect();
        if wanted.is_empty() {
            return Ok(0);
        }

        let names = self
            .store
            .read(|reader| reader.shortlisted_block_names(year))?;
        let count = names
            .iter()
            .flatten()
            .filter(|name| wanted.contains(&normalize_name(name)))
            .count() as u64;
        debug!(year, blocks = wanted.len(), count, "counted shortlisted applicants");
        Ok(count)
    }
}

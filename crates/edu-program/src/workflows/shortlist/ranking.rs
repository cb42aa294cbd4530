use tracing::debug;

use super::criteria::CriterionRule;
use super::domain::{normalize_name, ApplicantId, ApplicantRecord};
use super::store::{ShortlistReader, StoreError};

/// Applicant paired with its weighted score and percentile rank within the year cohort.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RankedApplicant<'a> {
    pub(crate) applicant: &'a ApplicantRecord,
    pub(crate) weighted_score: f64,
    pub(crate) percentile_rank: f64,
}

/// Geographic filter applied after ranking, compared by normalized name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BlockScope {
    state: String,
    district: String,
    block: String,
}

impl BlockScope {
    pub(crate) fn new(state_name: &str, district_name: &str, block_name: &str) -> Self {
        Self {
            state: normalize_name(state_name),
            district: normalize_name(district_name),
            block: normalize_name(block_name),
        }
    }

    fn contains(&self, applicant: &ApplicantRecord) -> bool {
        matches_name(applicant.state_name.as_deref(), &self.state)
            && matches_name(applicant.district_name.as_deref(), &self.district)
            && matches_name(applicant.block_name.as_deref(), &self.block)
    }
}

fn matches_name(candidate: Option<&str>, normalized: &str) -> bool {
    candidate.is_some_and(|name| normalize_name(name) == normalized)
}

/// Weighted scores are compared at this many steps per point, so sums that are equal in
/// decimal but differ in their last binary digit still tie.
const SCORE_STEPS_PER_POINT: f64 = 1_000_000.0;

fn peer_key(weighted_score: f64) -> i64 {
    (weighted_score * SCORE_STEPS_PER_POINT).round() as i64
}

/// Ranks the cohort by descending weighted score.
///
/// Percentile rank is `(rank - 1) / (count - 1)` where applicants with equal scores share
/// the rank of the first of them; a cohort of one ranks at zero. Scores are equal when
/// they agree to six decimal places. Equal scores keep their input order.
pub(crate) fn percentile_ranks(cohort: &[ApplicantRecord]) -> Vec<RankedApplicant<'_>> {
    let mut scored: Vec<(&ApplicantRecord, f64, i64)> = cohort
        .iter()
        .map(|applicant| {
            let weighted_score = applicant.weighted_score();
            (applicant, weighted_score, peer_key(weighted_score))
        })
        .collect();
    scored.sort_by(|left, right| right.2.cmp(&left.2));

    let denominator = scored.len().saturating_sub(1) as f64;
    let mut ranked = Vec::with_capacity(scored.len());
    let mut peer_rank = 0usize;
    let mut previous: Option<i64> = None;

    for (position, (applicant, weighted_score, key)) in scored.into_iter().enumerate() {
        if previous != Some(key) {
            peer_rank = position;
            previous = Some(key);
        }
        let percentile_rank = if denominator > 0.0 {
            peer_rank as f64 / denominator
        } else {
            0.0
        };
        ranked.push(RankedApplicant {
            applicant,
            weighted_score,
            percentile_rank,
        });
    }

    ranked
}

/// Applicants of `scope` whose year-wide percentile rank falls within the rule's threshold.
pub(crate) fn qualifying_in_scope(
    cohort: &[ApplicantRecord],
    scope: &BlockScope,
    rule: CriterionRule,
) -> Vec<ApplicantId> {
    let Some(threshold) = rule.threshold() else {
        return Vec::new();
    };

    percentile_ranks(cohort)
        .into_iter()
        .filter(|ranked| ranked.percentile_rank <= threshold)
        .filter(|ranked| scope.contains(ranked.applicant))
        .map(|ranked| ranked.applicant.applicant_id.clone())
        .collect()
}

/// Loads the full year cohort and selects the qualifying applicants of one block.
///
/// The cohort is reloaded and re-ranked on every call.
pub(crate) fn select_applicants<R>(
    reader: &mut R,
    scope: &BlockScope,
    year: i32,
    rule: CriterionRule,
) -> Result<Vec<ApplicantId>, StoreError>
where
    R: ShortlistReader + ?Sized,
{
    if rule.threshold().is_none() {
        return Ok(Vec::new());
    }

    let cohort = reader.applicants_for_year(year)?;
    let selected = qualifying_in_scope(&cohort, scope, rule);
    debug!(
        year,
        cohort = cohort.len(),
        selected = selected.len(),
        block = %scope.block,
        "ranked applicant cohort"
    );
    Ok(selected)
}

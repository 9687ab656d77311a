//! Participation thresholds applied before fitting.
//!
//! Notes and raters with too little history would only add noise to the
//! factorization, so a rating is kept only when both its note and its rater
//! clear their own minimum-volume threshold. Both counts are taken over the
//! unfiltered rating set; the filter is a single pass, not a fixed point.

use crate::types::Rating;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};

/// Minimum raw ratings a note needs before it takes part in fitting.
pub const MIN_NOTE_RATINGS: usize = 5;
/// Minimum raw ratings a rater needs before their ratings take part in fitting.
pub const MIN_RATER_RATINGS: usize = 10;

/// Raw per-note and per-rater rating counts.
#[derive(Debug, Default, Clone)]
pub struct RatingCounts<'a> {
    notes: AHashMap<&'a str, usize>,
    raters: AHashMap<&'a str, usize>,
    /// Distinct note ids in first-seen order.
    note_order: Vec<&'a str>,
}

impl<'a> RatingCounts<'a> {
    pub fn tally(ratings: &'a [Rating]) -> Self {
        let mut counts = Self::default();
        for rating in ratings {
            let note = rating.note_id.as_str();
            let entry = counts.notes.entry(note).or_insert(0);
            if *entry == 0 {
                counts.note_order.push(note);
            }
            *entry += 1;
            *counts.raters.entry(rating.rater_did.as_str()).or_insert(0) += 1;
        }
        counts
    }

    pub fn note_count(&self, note_id: &str) -> usize {
        self.notes.get(note_id).copied().unwrap_or(0)
    }

    pub fn rater_count(&self, rater_did: &str) -> usize {
        self.raters.get(rater_did).copied().unwrap_or(0)
    }

    pub fn distinct_notes(&self) -> usize {
        self.note_order.len()
    }

    pub fn distinct_raters(&self) -> usize {
        self.raters.len()
    }

    /// Every distinct note id, in the order it first appeared in the input.
    pub fn notes_in_order(&self) -> impl Iterator<Item = (&'a str, usize)> + '_ {
        self.note_order
            .iter()
            .map(move |&note| (note, self.note_count(note)))
    }
}

/// The pair of participation thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EligibilityPolicy {
    pub min_note_ratings: usize,
    pub min_rater_ratings: usize,
}

impl Default for EligibilityPolicy {
    fn default() -> Self {
        Self {
            min_note_ratings: MIN_NOTE_RATINGS,
            min_rater_ratings: MIN_RATER_RATINGS,
        }
    }
}

impl EligibilityPolicy {
    pub fn note_is_eligible(&self, counts: &RatingCounts<'_>, note_id: &str) -> bool {
        counts.note_count(note_id) >= self.min_note_ratings
    }

    pub fn rater_is_eligible(&self, counts: &RatingCounts<'_>, rater_did: &str) -> bool {
        counts.rater_count(rater_did) >= self.min_rater_ratings
    }

    /// Keeps the ratings whose note and rater both clear their thresholds.
    pub fn filter<'r>(&self, ratings: &'r [Rating], counts: &RatingCounts<'_>) -> Vec<&'r Rating> {
        ratings
            .iter()
            .filter(|rating| {
                self.note_is_eligible(counts, &rating.note_id)
                    && self.rater_is_eligible(counts, &rating.rater_did)
            })
            .collect()
    }
}

/// Serialized form of the thresholds, as it appears in the TOML configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EligibilityConfig {
    pub min_note_ratings: usize,
    pub min_rater_ratings: usize,
}

impl Default for EligibilityConfig {
    fn default() -> Self {
        let policy = EligibilityPolicy::default();
        Self {
            min_note_ratings: policy.min_note_ratings,
            min_rater_ratings: policy.min_rater_ratings,
        }
    }
}

impl From<EligibilityConfig> for EligibilityPolicy {
    fn from(config: EligibilityConfig) -> Self {
        Self {
            min_note_ratings: config.min_note_ratings,
            min_rater_ratings: config.min_rater_ratings,
        }
    }
}

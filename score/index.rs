//! Dense integer positions for the notes and raters that survive filtering.
//!
//! The fitter works on flat parameter arrays; this module maps string ids to
//! array positions once so that the gradient loop only touches `usize`s.

use crate::types::Rating;
use ahash::AHashMap;

/// Assigns each distinct key a zero-based position in first-seen order.
#[derive(Debug, Default, Clone)]
pub struct DenseIndex<'a> {
    positions: AHashMap<&'a str, usize>,
    keys: Vec<&'a str>,
}

impl<'a> DenseIndex<'a> {
    /// Returns the position of `key`, assigning the next free one if it is new.
    pub fn insert(&mut self, key: &'a str) -> usize {
        if let Some(&position) = self.positions.get(key) {
            return position;
        }
        let position = self.keys.len();
        self.positions.insert(key, position);
        self.keys.push(key);
        position
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.positions.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// One rating expressed in dense coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub note: usize,
    pub rater: usize,
    pub value: f64,
}

/// Everything the fitter needs to know about the filtered rating set.
#[derive(Debug, Clone)]
pub struct FitIndex<'a> {
    pub notes: DenseIndex<'a>,
    pub raters: DenseIndex<'a>,
    pub observations: Vec<Observation>,
}

impl<'a> FitIndex<'a> {
    pub fn build(ratings: &[&'a Rating]) -> Self {
        let mut notes = DenseIndex::default();
        let mut raters = DenseIndex::default();
        let mut observations = Vec::with_capacity(ratings.len());

        for rating in ratings {
            let note = notes.insert(rating.note_id.as_str());
            let rater = raters.insert(rating.rater_did.as_str());
            observations.push(Observation {
                note,
                rater,
                value: rating.helpfulness.value(),
            });
        }

        Self {
            notes,
            raters,
            observations,
        }
    }

    pub fn n_notes(&self) -> usize {
        self.notes.len()
    }

    pub fn n_raters(&self) -> usize {
        self.raters.len()
    }

    /// Number of `(note, rater)` pairs that appear more than once.
    pub fn duplicate_pairs(&self) -> usize {
        let mut seen: AHashMap<(usize, usize), usize> = AHashMap::with_capacity(self.observations.len());
        for obs in &self.observations {
            *seen.entry((obs.note, obs.rater)).or_insert(0) += 1;
        }
        seen.values().filter(|&&count| count > 1).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Helpfulness;

    #[test]
    fn dense_index_assigns_positions_in_first_seen_order() {
        let mut index = DenseIndex::default();
        assert!(index.is_empty());
        assert_eq!(index.insert("b"), 0);
        assert_eq!(index.insert("a"), 1);
        assert_eq!(index.insert("b"), 0);
        assert_eq!(index.len(), 2);
        assert_eq!(index.position("a"), Some(1));
        assert_eq!(index.position("c"), None);
    }

    #[test]
    fn fit_index_maps_every_rating_to_an_observation() {
        let ratings = vec![
            Rating::new("n1", "r1", Helpfulness::Helpful),
            Rating::new("n2", "r1", Helpfulness::NotHelpful),
            Rating::new("n1", "r2", Helpfulness::SomewhatHelpful),
            Rating::new("n1", "r2", Helpfulness::Helpful),
        ];
        let refs: Vec<&Rating> = ratings.iter().collect();
        let index = FitIndex::build(&refs);

        assert_eq!(index.n_notes(), 2);
        assert_eq!(index.n_raters(), 2);
        assert_eq!(index.observations.len(), 4);
        assert_eq!(
            index.observations[2],
            Observation {
                note: 0,
                rater: 1,
                value: 0.5
            }
        );
        // Duplicates are kept as separate observations.
        assert_eq!(index.duplicate_pairs(), 1);
    }
}

// ========================================================================================
//                          Public API: one full scoring run
// ========================================================================================

//! Orchestrates a scoring run: eligibility filter, index builder, factorization
//! fit and status classification, then assembles one [`NoteScore`] per distinct
//! note in the input.
//!
//! The run is a pure function of the ratings, the configuration and the random
//! source. Nothing is carried over between runs, so a single [`BridgingScorer`]
//! can be shared across threads scoring disjoint inputs.

use crate::config::{ConfigError, ScorerConfig};
use crate::eligibility::{EligibilityPolicy, RatingCounts};
use crate::factorization::{self, FactorModel, FitOptions, FitReport};
use crate::index::FitIndex;
use crate::progress::{NoopScoringProgress, ScoringProgressObserver, ScoringStage};
use crate::status::classify;
use crate::types::{NoteScore, NoteStatus, Rating};
use itertools::Itertools;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, Default)]
pub struct BridgingScorer {
    policy: EligibilityPolicy,
    fit_options: FitOptions,
}

impl BridgingScorer {
    /// Builds a scorer from a validated configuration. `Default` gives the
    /// calibrated policy without going through validation.
    pub fn new(config: ScorerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            policy: config.eligibility.into(),
            fit_options: config.fit.into(),
        })
    }

    /// Scores `ratings`, drawing the initial factors from `rng`.
    pub fn score<R: Rng + ?Sized>(&self, ratings: &[Rating], rng: &mut R) -> Vec<NoteScore> {
        self.score_with_progress(ratings, rng, &mut NoopScoringProgress)
    }

    /// Scores `ratings` with a `StdRng` seeded from `seed`. Identical input and
    /// seed always give bit-identical output.
    pub fn score_seeded(&self, ratings: &[Rating], seed: u64) -> Vec<NoteScore> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.score(ratings, &mut rng)
    }

    pub fn score_with_progress<R: Rng + ?Sized>(
        &self,
        ratings: &[Rating],
        rng: &mut R,
        progress: &mut dyn ScoringProgressObserver,
    ) -> Vec<NoteScore> {
        if ratings.is_empty() {
            log::info!("No ratings supplied; nothing to score.");
            return Vec::new();
        }

        // --- 1. Eligibility ---
        progress.on_stage_start(ScoringStage::Eligibility, ratings.len());
        let counts = RatingCounts::tally(ratings);
        let eligible = self.policy.filter(ratings, &counts);
        progress.on_stage_advance(ScoringStage::Eligibility, ratings.len());
        progress.on_stage_finish(ScoringStage::Eligibility);

        log::info!(
            "Loaded {} ratings on {} notes from {} raters; {} ratings pass the eligibility filter (notes >= {}, raters >= {})",
            ratings.len(),
            counts.distinct_notes(),
            counts.distinct_raters(),
            eligible.len(),
            self.policy.min_note_ratings,
            self.policy.min_rater_ratings
        );

        if eligible.is_empty() {
            log::info!("No ratings survived filtering; every note is marked NMR without fitting.");
            return counts
                .notes_in_order()
                .map(|(note_id, count)| NoteScore::unscored(note_id, count))
                .collect();
        }

        // --- 2. Dense indices ---
        let index = FitIndex::build(&eligible);
        let duplicates = index.duplicate_pairs();
        if duplicates > 0 {
            log::debug!(
                "{} (note, rater) pairs are rated more than once; each rating is kept as its own observation",
                duplicates
            );
        }

        // --- 3. Fit ---
        let (model, report) = factorization::fit(&index, &self.fit_options, rng, progress);

        // --- 4. Classify and assemble ---
        let scores = assemble_scores(&counts, &index, &model, progress);
        log_summary(&scores, &report);
        scores
    }
}

/// Builds the output in note first-seen order. Notes outside the fitting set,
/// and notes whose fitted values are not finite, get the zero-valued `NMR` record.
fn assemble_scores(
    counts: &RatingCounts<'_>,
    index: &FitIndex<'_>,
    model: &FactorModel,
    progress: &mut dyn ScoringProgressObserver,
) -> Vec<NoteScore> {
    progress.on_stage_start(ScoringStage::Classification, counts.distinct_notes());

    let mut scores = Vec::with_capacity(counts.distinct_notes());
    let mut non_finite = 0usize;
    for (note_id, rating_count) in counts.notes_in_order() {
        let fitted = index.notes.position(note_id).map(|position| {
            (
                model.note_intercepts[position],
                model.note_factors[position],
            )
        });

        let score = match fitted {
            Some((intercept, factor)) if intercept.is_finite() && factor.is_finite() => NoteScore {
                note_id: note_id.to_string(),
                intercept,
                factor,
                rating_count,
                status: classify(intercept, factor),
            },
            Some(_) => {
                non_finite += 1;
                NoteScore::unscored(note_id, rating_count)
            }
            None => NoteScore::unscored(note_id, rating_count),
        };
        scores.push(score);
    }

    if non_finite > 0 {
        log::warn!(
            "{} notes had non-finite fitted parameters and were reset to NMR; check the learning rate and regularization settings",
            non_finite
        );
    }

    progress.on_stage_advance(ScoringStage::Classification, scores.len());
    progress.on_stage_finish(ScoringStage::Classification);
    scores
}

fn log_summary(scores: &[NoteScore], report: &FitReport) {
    let tally = scores.iter().map(|score| score.status).counts();
    let count = |status: NoteStatus| tally.get(&status).copied().unwrap_or(0);
    log::info!(
        "Scored {} notes after {} epochs: {} CRH, {} CRNH, {} NMR",
        scores.len(),
        report.epochs_run,
        count(NoteStatus::CurrentlyRatedHelpful),
        count(NoteStatus::CurrentlyRatedNotHelpful),
        count(NoteStatus::NeedsMoreRatings)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::tests::RecordingProgress;
    use crate::types::Helpfulness;

    fn helpful(note: &str, rater: &str) -> Rating {
        Rating::new(note, rater, Helpfulness::Helpful)
    }

    /// Twelve raters who each rate the same twelve notes, alternating levels.
    fn dense_grid() -> Vec<Rating> {
        let mut ratings = Vec::new();
        for r in 0..12 {
            for n in 0..12 {
                let level = if (r + n) % 3 == 0 {
                    Helpfulness::NotHelpful
                } else {
                    Helpfulness::Helpful
                };
                ratings.push(Rating::new(format!("n{n}"), format!("r{r}"), level));
            }
        }
        ratings
    }

    #[test]
    fn empty_input_gives_empty_output() {
        let scorer = BridgingScorer::default();
        assert!(scorer.score_seeded(&[], 1).is_empty());
    }

    #[test]
    fn sparse_input_skips_fitting_and_reports_every_note() {
        let ratings = vec![
            helpful("a", "r1"),
            helpful("a", "r2"),
            helpful("b", "r1"),
            helpful("a", "r3"),
        ];
        let scorer = BridgingScorer::default();
        let mut progress = RecordingProgress::default();
        let mut rng = StdRng::seed_from_u64(5);
        let scores = scorer.score_with_progress(&ratings, &mut rng, &mut progress);

        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0], NoteScore::unscored("a", 3));
        assert_eq!(scores[1], NoteScore::unscored("b", 1));
        assert!(
            progress
                .events
                .iter()
                .all(|(stage, _, _)| *stage == ScoringStage::Eligibility),
            "fitting must not start when nothing is eligible"
        );
    }

    #[test]
    fn progress_reports_every_epoch() {
        let ratings = dense_grid();
        let scorer = BridgingScorer::default();
        let mut progress = RecordingProgress::default();
        let mut rng = StdRng::seed_from_u64(9);
        scorer.score_with_progress(&ratings, &mut rng, &mut progress);

        let fitting: Vec<_> = progress
            .events
            .iter()
            .filter(|(stage, kind, _)| *stage == ScoringStage::Fitting && *kind == "advance")
            .collect();
        assert_eq!(fitting.len(), 300);
        assert_eq!(fitting.last().map(|(_, _, n)| *n), Some(300));
        assert_eq!(
            progress.events.last(),
            Some(&(ScoringStage::Classification, "finish", 0))
        );
    }

    #[test]
    fn same_seed_is_bit_identical() {
        let ratings = dense_grid();
        let scorer = BridgingScorer::default();
        let first = scorer.score_seeded(&ratings, 42);
        let second = scorer.score_seeded(&ratings, 42);
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.note_id, b.note_id);
            assert_eq!(a.intercept.to_bits(), b.intercept.to_bits());
            assert_eq!(a.factor.to_bits(), b.factor.to_bits());
            assert_eq!(a.status, b.status);
        }
    }

    #[test]
    fn fitted_notes_carry_raw_rating_counts() {
        let mut ratings = dense_grid();
        // A one-off rater adds a rating that is filtered out but still counted.
        ratings.push(helpful("n0", "drive-by"));
        let scores = BridgingScorer::default().score_seeded(&ratings, 3);
        let n0 = scores.iter().find(|s| s.note_id == "n0").unwrap();
        assert_eq!(n0.rating_count, 13);
        assert_ne!(n0.intercept, 0.0);
    }

    #[test]
    fn rejects_configurations_that_fail_validation() {
        for range in [f64::INFINITY, f64::NAN, -0.05] {
            let mut config = ScorerConfig::default();
            config.fit.factor_init_range = range;
            match BridgingScorer::new(config) {
                Err(ConfigError::InvalidValue { field, .. }) => {
                    assert_eq!(field, "fit.factor_init_range")
                }
                other => panic!("range {range} should be rejected, got {other:?}"),
            }
        }

        let mut config = ScorerConfig::default();
        config.fit.learning_rate = f64::INFINITY;
        assert!(BridgingScorer::new(config).is_err());
    }

    #[test]
    fn validated_configuration_matches_default_scorer() {
        let ratings = dense_grid();
        let configured = BridgingScorer::new(ScorerConfig::default()).unwrap();
        assert_eq!(
            configured.score_seeded(&ratings, 8),
            BridgingScorer::default().score_seeded(&ratings, 8)
        );
    }

    #[test]
    fn diverging_configuration_is_reset_to_unscored() {
        let ratings = dense_grid();
        let mut config = ScorerConfig::default();
        // Valid but absurd: the first step throws every parameter to about 1e300,
        // and the factor products overflow on the next epoch.
        config.fit.learning_rate = 1e300;
        let scores = BridgingScorer::new(config).unwrap().score_seeded(&ratings, 1);
        assert_eq!(scores.len(), 12);
        for score in &scores {
            assert_eq!(score.status, NoteStatus::NeedsMoreRatings);
            assert_eq!(score.intercept, 0.0);
            assert_eq!(score.factor, 0.0);
        }
    }
}

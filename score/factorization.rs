//! # One-dimensional matrix factorization of rating behaviour
//!
//! Every observed rating `y` of note `n` by rater `r` is modelled as
//!
//! ```text
//! y ≈ μ + i_r + i_n + f_r · f_n
//! ```
//!
//! where `μ` is a global intercept, `i_r`/`i_n` are rater and note intercepts and
//! `f_r`/`f_n` are positions on a single latent viewpoint axis. The loss is the
//! squared residual plus L2 penalties; intercepts are penalised five times more
//! strongly than factors, so rating variance is pushed into the viewpoint term
//! first. A note can only earn a large intercept when raters on both sides of the
//! axis agree with it.
//!
//! Fitting is full-batch: one epoch accumulates the gradient of every parameter
//! over all observations and then applies one Adam step to each parameter.
//! Factors start from small uniform noise drawn from the caller's random source;
//! with an all-zero start the factor gradients would vanish identically and the
//! viewpoint axis could never form.

use crate::index::{FitIndex, Observation};
use crate::optimizer::{AdamConfig, AdamMoments, ScalarMoments};
use crate::progress::{ScoringProgressObserver, ScoringStage};
use ndarray::Array1;
use rand::Rng;
use rand::distributions::{Distribution, Uniform};

pub const DEFAULT_EPOCHS: usize = 300;
pub const INTERCEPT_REGULARIZATION: f64 = 0.15;
pub const FACTOR_REGULARIZATION: f64 = 0.03;
/// Midpoint of the rating scale.
pub const GLOBAL_INTERCEPT_INIT: f64 = 0.5;
/// Factors are drawn from `U[-FACTOR_INIT_RANGE, FACTOR_INIT_RANGE]`.
pub const FACTOR_INIT_RANGE: f64 = 0.05;

/// How often (in epochs) the training loss is written to the debug log.
const LOSS_LOG_INTERVAL: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    pub epochs: usize,
    pub adam: AdamConfig,
    pub intercept_regularization: f64,
    pub factor_regularization: f64,
    pub global_intercept_init: f64,
    pub factor_init_range: f64,
    /// Stop as soon as the full gradient norm drops below this value.
    /// `None` runs every epoch.
    pub early_stop_tolerance: Option<f64>,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            epochs: DEFAULT_EPOCHS,
            adam: AdamConfig::default(),
            intercept_regularization: INTERCEPT_REGULARIZATION,
            factor_regularization: FACTOR_REGULARIZATION,
            global_intercept_init: GLOBAL_INTERCEPT_INIT,
            factor_init_range: FACTOR_INIT_RANGE,
            early_stop_tolerance: None,
        }
    }
}

/// Fitted (or in-progress) parameters, laid out by dense note/rater position.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorModel {
    pub global_intercept: f64,
    pub note_intercepts: Array1<f64>,
    pub note_factors: Array1<f64>,
    pub rater_intercepts: Array1<f64>,
    pub rater_factors: Array1<f64>,
}

impl FactorModel {
    /// Starting point of a fit. Note factors are drawn before rater factors,
    /// each in index order, so a seeded source gives a reproducible start.
    ///
    /// Panics if `factor_init_range` is not finite; `ScorerConfig::validate`
    /// rules that out for configured scorers.
    pub fn initialize<R: Rng + ?Sized>(
        n_notes: usize,
        n_raters: usize,
        options: &FitOptions,
        rng: &mut R,
    ) -> Self {
        let range = options.factor_init_range.abs();
        let noise = Uniform::new_inclusive(-range, range);
        let note_factors = Array1::from_shape_fn(n_notes, |_| noise.sample(&mut *rng));
        let rater_factors = Array1::from_shape_fn(n_raters, |_| noise.sample(&mut *rng));

        Self {
            global_intercept: options.global_intercept_init,
            note_intercepts: Array1::zeros(n_notes),
            note_factors,
            rater_intercepts: Array1::zeros(n_raters),
            rater_factors,
        }
    }

    #[inline]
    pub fn predict(&self, obs: &Observation) -> f64 {
        self.global_intercept
            + self.rater_intercepts[obs.rater]
            + self.note_intercepts[obs.note]
            + self.rater_factors[obs.rater] * self.note_factors[obs.note]
    }

    pub fn mean_squared_error(&self, observations: &[Observation]) -> f64 {
        if observations.is_empty() {
            return 0.0;
        }
        let total: f64 = observations
            .iter()
            .map(|obs| {
                let residual = self.predict(obs) - obs.value;
                residual * residual
            })
            .sum();
        total / observations.len() as f64
    }
}

/// Full-batch gradient of the regularised loss.
#[derive(Debug, Clone)]
struct Gradients {
    global: f64,
    note_intercepts: Array1<f64>,
    note_factors: Array1<f64>,
    rater_intercepts: Array1<f64>,
    rater_factors: Array1<f64>,
}

impl Gradients {
    /// Seeds each gradient with its penalty term, then adds the residual
    /// contribution of every observation touching the parameter.
    fn accumulate(model: &FactorModel, observations: &[Observation], options: &FitOptions) -> Self {
        let lambda_i = options.intercept_regularization;
        let lambda_f = options.factor_regularization;

        let mut grads = Self {
            global: lambda_i * model.global_intercept,
            note_intercepts: model.note_intercepts.mapv(|v| lambda_i * v),
            note_factors: model.note_factors.mapv(|v| lambda_f * v),
            rater_intercepts: model.rater_intercepts.mapv(|v| lambda_i * v),
            rater_factors: model.rater_factors.mapv(|v| lambda_f * v),
        };

        for obs in observations {
            let residual = model.predict(obs) - obs.value;
            grads.global += residual;
            grads.note_intercepts[obs.note] += residual;
            grads.rater_intercepts[obs.rater] += residual;
            grads.note_factors[obs.note] += residual * model.rater_factors[obs.rater];
            grads.rater_factors[obs.rater] += residual * model.note_factors[obs.note];
        }

        grads
    }

    fn norm(&self) -> f64 {
        let squares = self.global * self.global
            + self.note_intercepts.dot(&self.note_intercepts)
            + self.note_factors.dot(&self.note_factors)
            + self.rater_intercepts.dot(&self.rater_intercepts)
            + self.rater_factors.dot(&self.rater_factors);
        squares.sqrt()
    }
}

/// Adam moment estimates for every parameter block of a [`FactorModel`].
#[derive(Debug, Clone)]
struct ModelMoments {
    global: ScalarMoments,
    note_intercepts: AdamMoments,
    note_factors: AdamMoments,
    rater_intercepts: AdamMoments,
    rater_factors: AdamMoments,
}

impl ModelMoments {
    fn zeros(n_notes: usize, n_raters: usize) -> Self {
        Self {
            global: ScalarMoments::default(),
            note_intercepts: AdamMoments::zeros(n_notes),
            note_factors: AdamMoments::zeros(n_notes),
            rater_intercepts: AdamMoments::zeros(n_raters),
            rater_factors: AdamMoments::zeros(n_raters),
        }
    }

    fn apply(&mut self, config: &AdamConfig, time_step: usize, model: &mut FactorModel, grads: &Gradients) {
        let bias = config.bias_correction(time_step);
        self.global
            .step(config, bias, &mut model.global_intercept, grads.global);
        self.note_intercepts
            .step(config, bias, &mut model.note_intercepts, &grads.note_intercepts);
        self.note_factors
            .step(config, bias, &mut model.note_factors, &grads.note_factors);
        self.rater_intercepts
            .step(config, bias, &mut model.rater_intercepts, &grads.rater_intercepts);
        self.rater_factors
            .step(config, bias, &mut model.rater_factors, &grads.rater_factors);
    }
}

/// Summary of a finished fit, for logging and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitReport {
    /// Number of Adam steps actually applied.
    pub epochs_run: usize,
    pub stopped_early: bool,
    /// Norm of the last gradient that was computed.
    pub final_gradient_norm: f64,
    pub final_mean_squared_error: f64,
}

/// Fits the factor model to the indexed observations.
pub fn fit<R: Rng + ?Sized>(
    index: &FitIndex<'_>,
    options: &FitOptions,
    rng: &mut R,
    progress: &mut dyn ScoringProgressObserver,
) -> (FactorModel, FitReport) {
    let n_notes = index.n_notes();
    let n_raters = index.n_raters();
    let observations = index.observations.as_slice();

    log::info!(
        "Fitting factor model on {} observations ({} notes, {} raters) for up to {} epochs",
        observations.len(),
        n_notes,
        n_raters,
        options.epochs
    );

    let mut model = FactorModel::initialize(n_notes, n_raters, options, rng);
    let mut moments = ModelMoments::zeros(n_notes, n_raters);
    let mut epochs_run = 0;
    let mut stopped_early = false;
    let mut final_gradient_norm = f64::NAN;

    progress.on_stage_start(ScoringStage::Fitting, options.epochs);

    for epoch in 0..options.epochs {
        let grads = Gradients::accumulate(&model, observations, options);

        if let Some(tolerance) = options.early_stop_tolerance {
            final_gradient_norm = grads.norm();
            if final_gradient_norm < tolerance {
                log::info!(
                    "Gradient norm {:.3e} fell below {:.3e} after {} epochs; stopping early",
                    final_gradient_norm,
                    tolerance,
                    epochs_run
                );
                stopped_early = true;
                break;
            }
        } else if epoch + 1 == options.epochs {
            final_gradient_norm = grads.norm();
        }

        moments.apply(&options.adam, epoch + 1, &mut model, &grads);
        epochs_run = epoch + 1;

        if epochs_run % LOSS_LOG_INTERVAL == 0 {
            log::debug!(
                "[Epoch {}] mean squared error {:.6e}, global intercept {:.4}",
                epochs_run,
                model.mean_squared_error(observations),
                model.global_intercept
            );
        }
        progress.on_stage_advance(ScoringStage::Fitting, epochs_run);
    }

    progress.on_stage_finish(ScoringStage::Fitting);

    let report = FitReport {
        epochs_run,
        stopped_early,
        final_gradient_norm,
        final_mean_squared_error: model.mean_squared_error(observations),
    };
    log::info!(
        "Factor model fitted: {} epochs, mean squared error {:.6e}, gradient norm {:.3e}",
        report.epochs_run,
        report.final_mean_squared_error,
        report.final_gradient_norm
    );

    (model, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoopScoringProgress;
    use crate::types::{Helpfulness, Rating};
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn ratings_from(rows: &[(&str, &str, Helpfulness)]) -> Vec<Rating> {
        rows.iter()
            .map(|&(note, rater, level)| Rating::new(note, rater, level))
            .collect()
    }

    #[test]
    fn initialization_matches_documented_starting_point() {
        let options = FitOptions::default();
        let mut rng = StdRng::seed_from_u64(7);
        let model = FactorModel::initialize(40, 60, &options, &mut rng);

        assert_eq!(model.global_intercept, 0.5);
        assert!(model.note_intercepts.iter().all(|&v| v == 0.0));
        assert!(model.rater_intercepts.iter().all(|&v| v == 0.0));
        for &f in model.note_factors.iter().chain(model.rater_factors.iter()) {
            assert!((-0.05..=0.05).contains(&f), "factor {f} out of range");
        }
        // Symmetry must actually be broken.
        assert!(model.note_factors.iter().any(|&f| f != 0.0));
        assert!(model.rater_factors.iter().any(|&f| f != 0.0));
    }

    #[test]
    fn gradients_are_seeded_with_penalty_terms() {
        let options = FitOptions::default();
        let model = FactorModel {
            global_intercept: 0.5,
            note_intercepts: Array1::from(vec![0.2]),
            note_factors: Array1::from(vec![0.4]),
            rater_intercepts: Array1::from(vec![-0.1]),
            rater_factors: Array1::from(vec![0.5]),
        };

        let empty = Gradients::accumulate(&model, &[], &options);
        assert_abs_diff_eq!(empty.global, 0.15 * 0.5, epsilon = 1e-15);
        assert_abs_diff_eq!(empty.note_intercepts[0], 0.15 * 0.2, epsilon = 1e-15);
        assert_abs_diff_eq!(empty.note_factors[0], 0.03 * 0.4, epsilon = 1e-15);
        assert_abs_diff_eq!(empty.rater_intercepts[0], 0.15 * -0.1, epsilon = 1e-15);
        assert_abs_diff_eq!(empty.rater_factors[0], 0.03 * 0.5, epsilon = 1e-15);

        // prediction = 0.5 - 0.1 + 0.2 + 0.5 * 0.4 = 0.8, residual against 1.0 is -0.2
        let obs = [Observation {
            note: 0,
            rater: 0,
            value: 1.0,
        }];
        assert_abs_diff_eq!(model.predict(&obs[0]), 0.8, epsilon = 1e-12);
        let grads = Gradients::accumulate(&model, &obs, &options);
        assert_abs_diff_eq!(grads.global, 0.075 - 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(grads.note_intercepts[0], 0.03 - 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(grads.rater_intercepts[0], -0.015 - 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(grads.note_factors[0], 0.012 - 0.2 * 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(grads.rater_factors[0], 0.015 - 0.2 * 0.4, epsilon = 1e-12);
    }

    #[test]
    fn fit_runs_every_epoch_by_default_and_reduces_error() {
        let mut rows = Vec::new();
        let notes = ["a", "b", "c", "d"];
        let raters = ["r1", "r2", "r3", "r4", "r5", "r6"];
        for (n, note) in notes.iter().enumerate() {
            for rater in &raters {
                let level = if n % 2 == 0 {
                    Helpfulness::Helpful
                } else {
                    Helpfulness::NotHelpful
                };
                rows.push((*note, *rater, level));
            }
        }
        let ratings = ratings_from(&rows);
        let refs: Vec<&Rating> = ratings.iter().collect();
        let index = FitIndex::build(&refs);
        let options = FitOptions::default();

        let mut rng = StdRng::seed_from_u64(11);
        let start = FactorModel::initialize(index.n_notes(), index.n_raters(), &options, &mut rng);
        let start_error = start.mean_squared_error(&index.observations);

        let mut rng = StdRng::seed_from_u64(11);
        let (model, report) = fit(&index, &options, &mut rng, &mut NoopScoringProgress);

        assert_eq!(report.epochs_run, DEFAULT_EPOCHS);
        assert!(!report.stopped_early);
        assert!(report.final_gradient_norm.is_finite());
        assert!(report.final_mean_squared_error < start_error);
        // Helpful notes end above unhelpful ones.
        assert!(model.note_intercepts[0] > model.note_intercepts[1]);
        assert!(model.note_intercepts[2] > model.note_intercepts[3]);
    }

    #[test]
    fn early_stopping_halts_once_gradient_is_small() {
        let ratings = ratings_from(&[
            ("a", "r1", Helpfulness::SomewhatHelpful),
            ("a", "r2", Helpfulness::SomewhatHelpful),
        ]);
        let refs: Vec<&Rating> = ratings.iter().collect();
        let index = FitIndex::build(&refs);
        let options = FitOptions {
            early_stop_tolerance: Some(1e9),
            ..FitOptions::default()
        };
        let mut rng = StdRng::seed_from_u64(3);
        let (model, report) = fit(&index, &options, &mut rng, &mut NoopScoringProgress);

        assert!(report.stopped_early);
        assert_eq!(report.epochs_run, 0);
        assert_eq!(model.global_intercept, 0.5);
    }

    #[test]
    fn zero_epochs_leaves_initial_model() {
        let ratings = ratings_from(&[("a", "r1", Helpfulness::Helpful)]);
        let refs: Vec<&Rating> = ratings.iter().collect();
        let index = FitIndex::build(&refs);
        let options = FitOptions {
            epochs: 0,
            ..FitOptions::default()
        };
        let (model, report) = fit(
            &index,
            &options,
            &mut StdRng::seed_from_u64(1),
            &mut NoopScoringProgress,
        );
        assert_eq!(report.epochs_run, 0);
        assert!(report.final_gradient_norm.is_nan());
        assert_eq!(model.note_intercepts[0], 0.0);
    }
}

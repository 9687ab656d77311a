use std::fmt;

/// Stages reported while a scoring run is in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScoringStage {
    Eligibility,
    Fitting,
    Classification,
}

impl ScoringStage {
    pub fn describe(self) -> &'static str {
        match self {
            Self::Eligibility => "eligibility filtering",
            Self::Fitting => "matrix factorization",
            Self::Classification => "status classification",
        }
    }
}

impl fmt::Display for ScoringStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Observer for reporting incremental progress during a scoring run.
///
/// `total` and `processed` are epochs for [`ScoringStage::Fitting`] and
/// ratings or notes for the other stages.
pub trait ScoringProgressObserver {
    fn on_stage_start(&mut self, stage: ScoringStage, total: usize) {
        let _ = (stage, total);
    }
    fn on_stage_advance(&mut self, stage: ScoringStage, processed: usize) {
        let _ = (stage, processed);
    }
    fn on_stage_finish(&mut self, stage: ScoringStage) {
        let _ = stage;
    }
}

#[derive(Default)]
pub struct NoopScoringProgress;

impl ScoringProgressObserver for NoopScoringProgress {}

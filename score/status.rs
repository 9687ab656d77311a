//! Converts a note's fitted `(intercept, factor)` pair into a status label.
//!
//! The thresholds are calibrated policy constants and must not be re-derived.
//! `CRH` needs a high intercept *and* a factor that is not tied to one pole of
//! the viewpoint axis. The `CRNH` bar slides with the factor: the more
//! polarised a note is, the more negative its intercept must be before it is
//! called unhelpful.

use crate::types::NoteStatus;

/// Minimum intercept for `CRH`.
pub const CRH_INTERCEPT_MIN: f64 = 0.40;
/// `CRH` requires `|factor|` strictly below this.
pub const CRH_FACTOR_MAX: f64 = 0.50;
/// `CRNH` intercept ceiling at factor zero.
pub const CRNH_INTERCEPT_MAX: f64 = -0.05;
/// How fast the `CRNH` ceiling drops as `|factor|` grows.
pub const CRNH_FACTOR_SLOPE: f64 = 0.8;

/// Total over every `(intercept, factor)` pair; NaN inputs land in `NMR`.
pub fn classify(intercept: f64, factor: f64) -> NoteStatus {
    let magnitude = factor.abs();
    if intercept >= CRH_INTERCEPT_MIN && magnitude < CRH_FACTOR_MAX {
        NoteStatus::CurrentlyRatedHelpful
    } else if intercept <= CRNH_INTERCEPT_MAX - CRNH_FACTOR_SLOPE * magnitude {
        NoteStatus::CurrentlyRatedNotHelpful
    } else {
        NoteStatus::NeedsMoreRatings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_crh(intercept: f64, factor: f64) -> bool {
        intercept >= 0.40 && factor.abs() < 0.50
    }

    fn is_crnh(intercept: f64, factor: f64) -> bool {
        intercept <= -0.05 - 0.8 * factor.abs()
    }

    #[test]
    fn zero_parameters_need_more_ratings() {
        assert_eq!(classify(0.0, 0.0), NoteStatus::NeedsMoreRatings);
    }

    #[test]
    fn boundaries_are_inclusive_where_documented() {
        assert_eq!(classify(0.40, 0.0), NoteStatus::CurrentlyRatedHelpful);
        assert_eq!(classify(0.3999, 0.0), NoteStatus::NeedsMoreRatings);
        assert_eq!(classify(0.9, 0.4999), NoteStatus::CurrentlyRatedHelpful);
        assert_eq!(classify(0.9, 0.50), NoteStatus::NeedsMoreRatings);
        assert_eq!(classify(0.9, -0.50), NoteStatus::NeedsMoreRatings);
        assert_eq!(classify(-0.05, 0.0), NoteStatus::CurrentlyRatedNotHelpful);
        assert_eq!(classify(-0.0499, 0.0), NoteStatus::NeedsMoreRatings);
    }

    #[test]
    fn crnh_threshold_slides_with_factor_magnitude() {
        // At |factor| = 0.5 the ceiling is -0.05 - 0.4 = -0.45.
        assert_eq!(classify(-0.44, 0.5), NoteStatus::NeedsMoreRatings);
        assert_eq!(classify(-0.46, 0.5), NoteStatus::CurrentlyRatedNotHelpful);
        assert_eq!(classify(-0.46, -0.5), NoteStatus::CurrentlyRatedNotHelpful);
    }

    #[test]
    fn monotone_in_intercept_at_zero_factor() {
        fn rank(status: NoteStatus) -> u8 {
            match status {
                NoteStatus::CurrentlyRatedNotHelpful => 0,
                NoteStatus::NeedsMoreRatings => 1,
                NoteStatus::CurrentlyRatedHelpful => 2,
            }
        }

        let mut previous = 0;
        for step in -100..=100 {
            let current = rank(classify(step as f64 / 100.0, 0.0));
            assert!(current >= previous, "status regressed at intercept {step}/100");
            previous = current;
        }
        assert_eq!(classify(1.0, 0.0), NoteStatus::CurrentlyRatedHelpful);
        assert_eq!(classify(-1.0, 0.0), NoteStatus::CurrentlyRatedNotHelpful);
    }

    #[test]
    fn labels_partition_the_plane() {
        for i in -300..=300 {
            for f in -300..=300 {
                let intercept = i as f64 / 100.0;
                let factor = f as f64 / 100.0;
                let crh = is_crh(intercept, factor);
                let crnh = is_crnh(intercept, factor);
                assert!(!(crh && crnh), "({intercept}, {factor}) matched two labels");

                let expected = if crh {
                    NoteStatus::CurrentlyRatedHelpful
                } else if crnh {
                    NoteStatus::CurrentlyRatedNotHelpful
                } else {
                    NoteStatus::NeedsMoreRatings
                };
                assert_eq!(classify(intercept, factor), expected);
            }
        }
    }

    #[test]
    fn non_finite_inputs_are_not_labelled() {
        assert_eq!(classify(f64::NAN, 0.0), NoteStatus::NeedsMoreRatings);
        assert_eq!(classify(0.5, f64::NAN), NoteStatus::NeedsMoreRatings);
    }
}

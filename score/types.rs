// ========================================================================================
//                             High-Level Data Contracts
// ========================================================================================

// This file is ONLY for types that are SHARED BETWEEN FILES, not types that only are used in one file.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// One of the three discrete helpfulness levels a rater can submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub enum Helpfulness {
    NotHelpful,
    SomewhatHelpful,
    Helpful,
}

impl Helpfulness {
    #[inline]
    pub fn value(self) -> f64 {
        match self {
            Self::NotHelpful => 0.0,
            Self::SomewhatHelpful => 0.5,
            Self::Helpful => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("Helpfulness value {0} is not one of 0.0, 0.5 or 1.0")]
pub struct InvalidHelpfulness(pub f64);

impl TryFrom<f64> for Helpfulness {
    type Error = InvalidHelpfulness;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if value == 0.0 {
            Ok(Self::NotHelpful)
        } else if value == 0.5 {
            Ok(Self::SomewhatHelpful)
        } else if value == 1.0 {
            Ok(Self::Helpful)
        } else {
            Err(InvalidHelpfulness(value))
        }
    }
}

impl From<Helpfulness> for f64 {
    fn from(level: Helpfulness) -> Self {
        level.value()
    }
}

/// A single helpfulness rating, as supplied by the upstream store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub note_id: String,
    pub rater_did: String,
    pub helpfulness: Helpfulness,
}

impl Rating {
    pub fn new(
        note_id: impl Into<String>,
        rater_did: impl Into<String>,
        helpfulness: Helpfulness,
    ) -> Self {
        Self {
            note_id: note_id.into(),
            rater_did: rater_did.into(),
            helpfulness,
        }
    }
}

/// Terminal classification of a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NoteStatus {
    /// Currently rated helpful.
    #[serde(rename = "CRH")]
    CurrentlyRatedHelpful,
    /// Currently rated not helpful.
    #[serde(rename = "CRNH")]
    CurrentlyRatedNotHelpful,
    /// Needs more ratings, or raters have not reached agreement.
    #[serde(rename = "NMR")]
    NeedsMoreRatings,
}

impl NoteStatus {
    pub fn code(self) -> &'static str {
        match self {
            Self::CurrentlyRatedHelpful => "CRH",
            Self::CurrentlyRatedNotHelpful => "CRNH",
            Self::NeedsMoreRatings => "NMR",
        }
    }
}

impl fmt::Display for NoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Scoring outcome for one note. Every note present in the input gets exactly one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteScore {
    pub note_id: String,
    pub intercept: f64,
    pub factor: f64,
    /// Raw number of ratings the note received, before any filtering.
    pub rating_count: usize,
    pub status: NoteStatus,
}

impl NoteScore {
    /// The record handed back for notes that never reached the fitting stage.
    pub fn unscored(note_id: impl Into<String>, rating_count: usize) -> Self {
        Self {
            note_id: note_id.into(),
            intercept: 0.0,
            factor: 0.0,
            rating_count,
            status: NoteStatus::NeedsMoreRatings,
        }
    }
}

//! # Rating and score tables
//!
//! The engine itself never touches the filesystem; this module is the boundary
//! used by the command-line batch job. Ratings arrive as a delimited table
//! (`note_id`, `rater_did`, `helpfulness`) or a JSON array, and scores leave
//! the same way.
//!
//! - Strict values: a helpfulness outside {0, 0.5, 1} is rejected with the row
//!   it came from instead of being passed on to the fitter.
//! - Column names follow the snake_case schema; the camelCase names used by
//!   the upstream store (`noteId`, `raterDid`) are accepted as aliases.
//! - Score files are written to a temporary sibling and renamed into place, so
//!   a reader never observes a half-written table.

use crate::types::{Helpfulness, InvalidHelpfulness, NoteScore, Rating};
use serde::Deserialize;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// On-disk layout of a rating or score table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Tsv,
    Csv,
    Json,
}

impl TableFormat {
    /// `.csv` and `.json` are recognised by extension; anything else is read as TSV.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("csv") => Self::Csv,
            Some("json") => Self::Json,
            _ => Self::Tsv,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Tsv => "tsv",
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }

    fn delimiter(self) -> u8 {
        match self {
            Self::Csv => b',',
            Self::Tsv | Self::Json => b'\t',
        }
    }
}

#[derive(Error, Debug)]
pub enum RatingIoError {
    #[error("Failed to read ratings: {0}")]
    Io(#[from] io::Error),
    #[error("Malformed ratings table: {0}")]
    Csv(#[from] csv::Error),
    #[error("Malformed JSON ratings: {0}")]
    Json(#[from] serde_json::Error),
    #[error(
        "The required column '{0}' was not found in the ratings header. Please check spelling and case."
    )]
    ColumnNotFound(&'static str),
    #[error("Invalid rating on row {row}: {source}")]
    InvalidHelpfulness {
        row: usize,
        #[source]
        source: InvalidHelpfulness,
    },
}

#[derive(Error, Debug)]
pub enum ScoreWriteError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to write score table: {0}")]
    Csv(#[from] csv::Error),
    #[error("Failed to serialize scores: {0}")]
    Json(#[from] serde_json::Error),
}

/// Row shape of a rating table before the helpfulness level is validated.
#[derive(Debug, Deserialize)]
struct RawRating {
    #[serde(alias = "noteId")]
    note_id: String,
    #[serde(alias = "raterDid")]
    rater_did: String,
    helpfulness: f64,
}

impl RawRating {
    fn into_rating(self, row: usize) -> Result<Rating, RatingIoError> {
        let helpfulness = Helpfulness::try_from(self.helpfulness)
            .map_err(|source| RatingIoError::InvalidHelpfulness { row, source })?;
        Ok(Rating {
            note_id: self.note_id,
            rater_did: self.rater_did,
            helpfulness,
        })
    }
}

const REQUIRED_COLUMNS: [(&str, &str); 3] = [
    ("note_id", "noteId"),
    ("rater_did", "raterDid"),
    ("helpfulness", "helpfulness"),
];

/// Loads every rating from `path`, choosing the format from its extension.
pub fn load_ratings(path: &Path) -> Result<Vec<Rating>, RatingIoError> {
    let reader = BufReader::new(File::open(path)?);
    read_ratings(reader, TableFormat::from_path(path))
}

pub fn read_ratings<R: Read>(reader: R, format: TableFormat) -> Result<Vec<Rating>, RatingIoError> {
    if format == TableFormat::Json {
        let raw: Vec<RawRating> = serde_json::from_reader(reader)?;
        return raw
            .into_iter()
            .enumerate()
            .map(|(i, row)| row.into_rating(i + 1))
            .collect();
    }

    let mut table = csv::ReaderBuilder::new()
        .delimiter(format.delimiter())
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(reader);

    let headers = table.headers()?.clone();
    for (name, alias) in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == name || h == alias) {
            return Err(RatingIoError::ColumnNotFound(name));
        }
    }

    let mut ratings = Vec::new();
    for (i, record) in table.deserialize::<RawRating>().enumerate() {
        // Row numbers are 1-based and count the header line.
        ratings.push(record?.into_rating(i + 2)?);
    }
    Ok(ratings)
}

pub fn write_scores<W: Write>(
    writer: W,
    scores: &[NoteScore],
    format: TableFormat,
) -> Result<(), ScoreWriteError> {
    if format == TableFormat::Json {
        let mut writer = writer;
        serde_json::to_writer_pretty(&mut writer, scores)?;
        writeln!(writer)?;
        writer.flush()?;
        return Ok(());
    }

    let mut table = csv::WriterBuilder::new()
        .delimiter(format.delimiter())
        .from_writer(writer);
    table.write_record(["note_id", "intercept", "factor", "rating_count", "status"])?;

    let mut intercept_buffer = ryu::Buffer::new();
    let mut factor_buffer = ryu::Buffer::new();
    for score in scores {
        let rating_count = score.rating_count.to_string();
        table.write_record([
            score.note_id.as_str(),
            intercept_buffer.format(score.intercept),
            factor_buffer.format(score.factor),
            rating_count.as_str(),
            score.status.code(),
        ])?;
    }
    table.flush()?;
    Ok(())
}

/// Writes `scores` to `path` through a temporary sibling file that is renamed
/// into place once fully flushed.
pub fn save_scores(path: &Path, scores: &[NoteScore], format: TableFormat) -> Result<(), ScoreWriteError> {
    let temp_path = temporary_sibling(path);
    let write_result = (|| -> Result<(), ScoreWriteError> {
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        write_scores(&mut writer, scores, format)?;
        let file = writer.into_inner().map_err(io::Error::other)?;
        file.sync_all()?;
        Ok(())
    })();

    if let Err(err) = write_result {
        let _ = fs::remove_file(&temp_path);
        return Err(err);
    }

    fs::rename(&temp_path, path).inspect_err(|_| {
        let _ = fs::remove_file(&temp_path);
    })?;
    Ok(())
}

fn temporary_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "scores".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Default output location: `<input stem>.scores.<ext>` next to the input.
pub fn default_output_path(ratings_path: &Path, format: TableFormat) -> PathBuf {
    let stem = ratings_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("ratings");
    ratings_path.with_file_name(format!("{stem}.scores.{}", format.extension()))
}

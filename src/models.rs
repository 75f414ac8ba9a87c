//! # Ingestion Data Model
//!
//! This module defines the data structures that flow through the recipe
//! ingestion pipeline, from a submitted source through extraction and
//! normalization to canonical recipe records.
//!
//! ## Core Concepts
//!
//! - **Source**: A user-submitted artifact (image, URL, text, email) to ingest
//! - **Job**: One processing attempt against a source
//! - **Extracted recipe**: The parser's raw, unvalidated view of one recipe
//! - **Canonical recipe**: The deduplicated, normalized record in storage
//!
//! ## Usage
//!
//! ```rust
//! use recipe_ingestion::models::{JobStatus, SourceKind};
//!
//! let kind: SourceKind = "multi_image".parse().unwrap();
//! assert_eq!(kind, SourceKind::MultiImage);
//! assert!(!JobStatus::Processing.is_terminal());
//! assert!(JobStatus::Partial.is_terminal());
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of artifact a recipe source was submitted as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// Single photographed or scanned page
    Image,
    /// Multiple pages belonging to one recipe source
    MultiImage,
    /// Web page URL
    Url,
    /// Manual text input
    Text,
    /// Email attachment or body
    Email,
    /// Programmatic import
    Api,
}

impl SourceKind {
    /// Stable string form used in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Image => "image",
            SourceKind::MultiImage => "multi_image",
            SourceKind::Url => "url",
            SourceKind::Text => "text",
            SourceKind::Email => "email",
            SourceKind::Api => "api",
        }
    }
}

impl FromStr for SourceKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(SourceKind::Image),
            "multi_image" => Ok(SourceKind::MultiImage),
            "url" => Ok(SourceKind::Url),
            "text" => Ok(SourceKind::Text),
            "email" => Ok(SourceKind::Email),
            "api" => Ok(SourceKind::Api),
            other => Err(UnknownVariant {
                field: "source kind",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of an ingestion job
///
/// Jobs move `Pending -> Processing -> {Completed, Failed, Partial}`.
/// The three final states are terminal; a failed job is never resumed,
/// reprocessing means creating a new job against the same source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Partial,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Partial => "partial",
        }
    }

    /// Whether the job has reached a final state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Partial
        )
    }
}

impl FromStr for JobStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "partial" => Ok(JobStatus::Partial),
            other => Err(UnknownVariant {
                field: "job status",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a processing log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored enum string is not recognized
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownVariant {
    pub field: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: '{}'", self.field, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

/// A user-submitted recipe source awaiting or past extraction
///
/// `raw_text` is empty until the extraction collaborator fills it; the
/// record is read-only afterward.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestionSource {
    pub id: i64,
    pub user_id: i64,
    pub kind: SourceKind,
    /// Name or title of the source (e.g. a cookbook title)
    pub name: String,
    pub url: Option<String>,
    pub raw_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// One processing attempt against a source
#[derive(Debug, Clone, PartialEq)]
pub struct IngestionJob {
    pub id: i64,
    pub source_id: i64,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub recipes_found: u32,
    pub recipes_processed: u32,
}

/// Scalar metadata pulled out of a recipe section
///
/// All fields are optional; the parser fills whichever it can find.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipeMetadata {
    /// Preparation time in minutes
    pub prep_time: Option<u32>,
    /// Cooking time in minutes
    pub cook_time: Option<u32>,
    /// Total time in minutes
    pub total_time: Option<u32>,
    pub servings: Option<u32>,
    pub difficulty: Option<String>,
    pub cuisine: Option<String>,
    pub course: Option<String>,
    pub diet: Option<String>,
    pub description: Option<String>,
}

/// Raw recipe data extracted from a source before normalization
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRecipe {
    pub id: i64,
    pub job_id: i64,
    pub raw_name: String,
    pub raw_instructions: String,
    /// Ordered raw ingredient-line strings, preserved verbatim
    pub raw_ingredients: Vec<String>,
    pub raw_metadata: RecipeMetadata,
    /// Confidence in extraction quality, within [0, 1]
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

/// Canonical recipe record produced by normalization
#[derive(Debug, Clone, PartialEq)]
pub struct Recipe {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub instructions: String,
    /// Preparation time in minutes, 0 when unknown
    pub prep_time: u32,
    /// Cooking time in minutes, 0 when unknown
    pub cook_time: u32,
    pub servings: u32,
    pub difficulty_id: Option<i64>,
    pub cuisine_id: Option<i64>,
    pub course_id: Option<i64>,
    pub diet_id: Option<i64>,
    pub source_name: String,
    pub source_url: Option<String>,
    pub user_id: i64,
}

/// Join row between a recipe and one of its ingredients
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeIngredient {
    pub recipe_id: i64,
    pub ingredient_id: i64,
    pub quantity: Decimal,
    pub unit_id: Option<i64>,
    pub preparation_method: String,
    pub optional: bool,
}

/// Cache entry mapping raw ingredient text to its normalized form
///
/// Written once per distinct raw text the first time it is parsed; read
/// thereafter to shortcut repeated parsing of identical strings.
#[derive(Debug, Clone, PartialEq)]
pub struct IngredientMapping {
    pub id: i64,
    pub raw_text: String,
    pub ingredient_id: i64,
    pub quantity: Option<Decimal>,
    pub unit_id: Option<i64>,
    pub preparation_method: String,
    pub confidence: f64,
}

/// Append-only audit trail entry for one pipeline step
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingLog {
    pub id: i64,
    pub job_id: i64,
    pub step: String,
    pub level: LogLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

//! # Ingestion Job Orchestrator
//!
//! Drives one source through extraction and parsing: a job is created
//! `pending`, moves to `processing` while the source-kind-specific
//! extractor and the segmentation parser run, and ends `completed` with
//! recipe counts or `failed` with the error message recorded. Every step
//! is mirrored into the job's processing log.
//!
//! Extraction itself (OCR, page fetching, email decoding) lives behind the
//! [`TextExtractor`] trait; this module only orchestrates. Normalization
//! is not run here, it is a separate explicit step over a completed job
//! (see [`crate::recipe_normalizer`]).

use crate::db;
use crate::models::{IngestionJob, IngestionSource, JobStatus, LogLevel, SourceKind};
use crate::recipe_parser::RecipeParser;
use anyhow::{anyhow, Context, Result};
use lazy_static::lazy_static;
use log::{error, info, warn};
use regex::Regex;
use rusqlite::Connection;
use std::collections::HashMap;

lazy_static! {
    static ref PAGE_MARKER: Regex =
        Regex::new(r"---\s*Page\s+\d+\s*---").expect("page marker pattern should be valid");
}

/// Text produced by an extraction collaborator
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedText {
    /// One text blob for the whole source
    Single(String),
    /// One blob per page, ordered by page number
    Pages(Vec<String>),
}

/// Extraction collaborator contract
///
/// Implementations wrap OCR engines, page fetchers or mail readers; from
/// the pipeline's perspective they either return plain text or fail the
/// whole job.
pub trait TextExtractor {
    fn extract(&self, source: &IngestionSource) -> Result<ExtractedText>;
}

/// Synchronous pipeline running one source through a job
pub struct IngestionPipeline {
    parser: RecipeParser,
    extractors: HashMap<SourceKind, Box<dyn TextExtractor>>,
}

impl IngestionPipeline {
    pub fn new() -> Self {
        Self {
            parser: RecipeParser::new(),
            extractors: HashMap::new(),
        }
    }

    /// Register the extraction collaborator for a source kind
    pub fn register_extractor(&mut self, kind: SourceKind, extractor: Box<dyn TextExtractor>) {
        self.extractors.insert(kind, extractor);
    }

    /// Process a source and return its terminal job
    ///
    /// Any failure along the way marks the job `failed` with the error
    /// message recorded verbatim; it never propagates to the caller.
    pub fn process_source(&self, conn: &Connection, source_id: i64) -> Result<IngestionJob> {
        let source = db::get_source(conn, source_id)?
            .ok_or_else(|| anyhow!("source {} not found", source_id))?;

        let job_id = db::create_job(conn, source_id)?;
        db::add_processing_log(conn, job_id, "processing", LogLevel::Info, "Starting processing")?;
        db::set_job_status(conn, job_id, JobStatus::Processing)?;

        match self.run(conn, job_id, &source) {
            Ok(recipes_found) => {
                db::complete_job(conn, job_id, recipes_found, recipes_found)?;
                db::add_processing_log(
                    conn,
                    job_id,
                    "processing",
                    LogLevel::Info,
                    "Processing completed successfully",
                )?;
            }
            Err(err) => {
                let message = format!("{:#}", err);
                error!("Ingestion job {} failed: {}", job_id, message);
                db::fail_job(conn, job_id, &message)?;
                db::add_processing_log(
                    conn,
                    job_id,
                    "processing",
                    LogLevel::Error,
                    &format!("Processing failed: {}", message),
                )?;
            }
        }

        db::get_job(conn, job_id)?
            .ok_or_else(|| anyhow!("job {} not found after processing", job_id))
    }

    /// Extract, parse and persist; returns the number of recipes found
    fn run(&self, conn: &Connection, job_id: i64, source: &IngestionSource) -> Result<u32> {
        let text = match source.kind {
            SourceKind::Text => source
                .raw_text
                .clone()
                .filter(|text| !text.trim().is_empty())
                .ok_or_else(|| anyhow!("No text provided for text source"))?,
            SourceKind::Email => match source.raw_text.clone().filter(|t| !t.trim().is_empty()) {
                Some(text) => text,
                None => {
                    warn!("No text content found in email source {}", source.id);
                    db::add_processing_log(
                        conn,
                        job_id,
                        "processing",
                        LogLevel::Warning,
                        "No text content found in email source",
                    )?;
                    return Ok(0);
                }
            },
            SourceKind::Image | SourceKind::MultiImage | SourceKind::Url => {
                if source.kind == SourceKind::Url && source.url.is_none() {
                    return Err(anyhow!("No URL provided for URL source"));
                }
                self.extract_text(conn, job_id, source)?
            }
            SourceKind::Api => {
                return Err(anyhow!("Unsupported source type: {}", source.kind));
            }
        };

        let recipes = self.parser.parse_recipes(&text);
        for draft in &recipes {
            db::insert_extracted_recipe(
                conn,
                job_id,
                &draft.name,
                &draft.instructions,
                &draft.ingredient_lines,
                &draft.metadata,
                draft.confidence,
            )?;
        }

        info!(
            "Extracted {} recipes from {} source {}",
            recipes.len(),
            source.kind,
            source.id
        );
        db::add_processing_log(
            conn,
            job_id,
            "processing",
            LogLevel::Info,
            &format!("Extracted {} recipes from {} source", recipes.len(), source.kind),
        )?;

        Ok(recipes.len() as u32)
    }

    /// Run the registered extractor and store its text on the source
    fn extract_text(
        &self,
        conn: &Connection,
        job_id: i64,
        source: &IngestionSource,
    ) -> Result<String> {
        let extractor = self
            .extractors
            .get(&source.kind)
            .ok_or_else(|| anyhow!("no extractor registered for {} sources", source.kind))?;

        db::add_processing_log(
            conn,
            job_id,
            "processing",
            LogLevel::Info,
            &format!("Extracting text from {} source", source.kind),
        )?;

        let text = match extractor
            .extract(source)
            .with_context(|| format!("text extraction failed for source {}", source.id))?
        {
            ExtractedText::Single(text) => text,
            ExtractedText::Pages(pages) => {
                let combined = combine_page_texts(&pages);
                strip_page_markers(&combined)
            }
        };

        db::set_source_text(conn, source.id, &text)?;
        Ok(text)
    }
}

impl Default for IngestionPipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Join per-page texts with page-boundary markers
pub fn combine_page_texts(pages: &[String]) -> String {
    pages
        .iter()
        .enumerate()
        .map(|(index, text)| format!("--- Page {} ---\n{}", index + 1, text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Strip page-boundary markers, rejoining the page contents
pub fn strip_page_markers(text: &str) -> String {
    PAGE_MARKER
        .split(text)
        .map(str::trim)
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Combine separately captured ingredients and directions text into one
/// parseable blob
pub fn combine_paired_text(ingredients_text: &str, directions_text: &str) -> String {
    let mut lines = Vec::new();

    if !ingredients_text.trim().is_empty() {
        lines.push("INGREDIENTS:".to_string());
        lines.push(ingredients_text.trim().to_string());
        lines.push(String::new());
    }

    if !directions_text.trim().is_empty() {
        lines.push("INSTRUCTIONS:".to_string());
        lines.push(directions_text.trim().to_string());
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    const RECIPE_TEXT: &str = "Fluffy Pancakes\n\nIngredients:\n2 cups flour\n1 cup milk\n2 large eggs\n\nInstructions:\n1. Mix the dry ingredients together.\n2. Whisk in milk and eggs until smooth.";

    struct StaticExtractor {
        text: String,
    }

    impl TextExtractor for StaticExtractor {
        fn extract(&self, _source: &IngestionSource) -> Result<ExtractedText> {
            Ok(ExtractedText::Single(self.text.clone()))
        }
    }

    struct PagedExtractor {
        pages: Vec<String>,
    }

    impl TextExtractor for PagedExtractor {
        fn extract(&self, _source: &IngestionSource) -> Result<ExtractedText> {
            Ok(ExtractedText::Pages(self.pages.clone()))
        }
    }

    struct FailingExtractor;

    impl TextExtractor for FailingExtractor {
        fn extract(&self, _source: &IngestionSource) -> Result<ExtractedText> {
            Err(anyhow!("OCR engine crashed"))
        }
    }

    fn setup_test_db() -> Result<(Connection, NamedTempFile)> {
        let temp_file = NamedTempFile::new()?;
        let conn = Connection::open(temp_file.path())?;
        db::init_database_schema(&conn)?;
        Ok((conn, temp_file))
    }

    #[test]
    fn test_text_source_completes() -> Result<()> {
        let (conn, _temp_file) = setup_test_db()?;
        let source_id =
            db::create_source(&conn, 1, SourceKind::Text, "Notes", None, Some(RECIPE_TEXT))?;

        let job = IngestionPipeline::new().process_source(&conn, source_id)?;

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.recipes_found, 1);
        assert!(job.completed_at.is_some());

        let extracted = db::extracted_recipes_for_job(&conn, job.id)?;
        assert_eq!(extracted.len(), 1);
        assert_eq!(extracted[0].raw_name, "Fluffy Pancakes");
        assert_eq!(extracted[0].raw_ingredients.len(), 3);

        let logs = db::logs_for_job(&conn, job.id)?;
        assert!(logs.iter().any(|log| log.message == "Starting processing"));
        assert!(logs
            .iter()
            .any(|log| log.message == "Processing completed successfully"));

        Ok(())
    }

    #[test]
    fn test_text_source_without_text_fails() -> Result<()> {
        let (conn, _temp_file) = setup_test_db()?;
        let source_id = db::create_source(&conn, 1, SourceKind::Text, "Notes", None, None)?;

        let job = IngestionPipeline::new().process_source(&conn, source_id)?;

        assert_eq!(job.status, JobStatus::Failed);
        assert!(job
            .error_message
            .unwrap()
            .contains("No text provided for text source"));

        Ok(())
    }

    #[test]
    fn test_image_source_uses_extractor() -> Result<()> {
        let (conn, _temp_file) = setup_test_db()?;
        let source_id = db::create_source(&conn, 1, SourceKind::Image, "Recipe card", None, None)?;

        let mut pipeline = IngestionPipeline::new();
        pipeline.register_extractor(
            SourceKind::Image,
            Box::new(StaticExtractor {
                text: RECIPE_TEXT.to_string(),
            }),
        );

        let job = pipeline.process_source(&conn, source_id)?;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.recipes_found, 1);

        // The extracted text is written back onto the source
        let source = db::get_source(&conn, source_id)?.unwrap();
        assert_eq!(source.raw_text.as_deref(), Some(RECIPE_TEXT));
        assert!(source.processed_at.is_some());

        Ok(())
    }

    #[test]
    fn test_missing_extractor_fails_job() -> Result<()> {
        let (conn, _temp_file) = setup_test_db()?;
        let source_id = db::create_source(&conn, 1, SourceKind::Image, "Recipe card", None, None)?;

        let job = IngestionPipeline::new().process_source(&conn, source_id)?;

        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.unwrap().contains("no extractor registered"));

        Ok(())
    }

    #[test]
    fn test_failed_extraction_marks_job_failed() -> Result<()> {
        let (conn, _temp_file) = setup_test_db()?;
        let source_id = db::create_source(&conn, 1, SourceKind::Image, "Recipe card", None, None)?;

        let mut pipeline = IngestionPipeline::new();
        pipeline.register_extractor(SourceKind::Image, Box::new(FailingExtractor));

        let job = pipeline.process_source(&conn, source_id)?;

        assert_eq!(job.status, JobStatus::Failed);
        // The collaborator's message is preserved
        assert!(job.error_message.unwrap().contains("OCR engine crashed"));

        let logs = db::logs_for_job(&conn, job.id)?;
        assert!(logs.iter().any(|log| log.level == LogLevel::Error));

        Ok(())
    }

    #[test]
    fn test_multi_image_pages_are_combined() -> Result<()> {
        let (conn, _temp_file) = setup_test_db()?;
        let source_id =
            db::create_source(&conn, 1, SourceKind::MultiImage, "Recipe card", None, None)?;

        let mut pipeline = IngestionPipeline::new();
        pipeline.register_extractor(
            SourceKind::MultiImage,
            Box::new(PagedExtractor {
                pages: vec![
                    "Fluffy Pancakes\n\nIngredients:\n2 cups flour\n1 cup milk".to_string(),
                    "Instructions:\n1. Mix everything until smooth and fry.".to_string(),
                ],
            }),
        );

        let job = pipeline.process_source(&conn, source_id)?;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.recipes_found, 1);

        let extracted = db::extracted_recipes_for_job(&conn, job.id)?;
        assert_eq!(extracted[0].raw_ingredients.len(), 2);
        assert!(extracted[0].raw_instructions.contains("Mix everything"));

        // The stored text carries no page markers
        let source = db::get_source(&conn, source_id)?.unwrap();
        assert!(!source.raw_text.unwrap().contains("--- Page"));

        Ok(())
    }

    #[test]
    fn test_url_source_without_url_fails() -> Result<()> {
        let (conn, _temp_file) = setup_test_db()?;
        let source_id = db::create_source(&conn, 1, SourceKind::Url, "Blog", None, None)?;

        let mut pipeline = IngestionPipeline::new();
        pipeline.register_extractor(
            SourceKind::Url,
            Box::new(StaticExtractor {
                text: RECIPE_TEXT.to_string(),
            }),
        );

        let job = pipeline.process_source(&conn, source_id)?;
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job
            .error_message
            .unwrap()
            .contains("No URL provided for URL source"));

        Ok(())
    }

    #[test]
    fn test_no_recipes_still_completes() -> Result<()> {
        let (conn, _temp_file) = setup_test_db()?;
        let note = "Just a meandering note about dinner plans that never quite becomes a recipe of any kind.";
        let source_id = db::create_source(&conn, 1, SourceKind::Text, "Notes", None, Some(note))?;

        let job = IngestionPipeline::new().process_source(&conn, source_id)?;

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.recipes_found, 0);

        Ok(())
    }

    #[test]
    fn test_email_without_text_completes_with_warning() -> Result<()> {
        let (conn, _temp_file) = setup_test_db()?;
        let source_id = db::create_source(&conn, 1, SourceKind::Email, "Forwarded", None, None)?;

        let job = IngestionPipeline::new().process_source(&conn, source_id)?;

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.recipes_found, 0);

        let logs = db::logs_for_job(&conn, job.id)?;
        assert!(logs.iter().any(|log| log.level == LogLevel::Warning));

        Ok(())
    }

    #[test]
    fn test_api_source_is_unsupported() -> Result<()> {
        let (conn, _temp_file) = setup_test_db()?;
        let source_id = db::create_source(&conn, 1, SourceKind::Api, "Importer", None, None)?;

        let job = IngestionPipeline::new().process_source(&conn, source_id)?;

        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.unwrap().contains("Unsupported source type"));

        Ok(())
    }

    #[test]
    fn test_page_marker_round_trip() {
        let pages = vec!["first page".to_string(), "second page".to_string()];
        let combined = combine_page_texts(&pages);
        assert!(combined.contains("--- Page 1 ---"));
        assert!(combined.contains("--- Page 2 ---"));

        let cleaned = strip_page_markers(&combined);
        assert_eq!(cleaned, "first page\n\nsecond page");
    }

    #[test]
    fn test_strip_page_markers_drops_empty_pages() {
        let pages = vec!["only page".to_string(), "".to_string()];
        let cleaned = strip_page_markers(&combine_page_texts(&pages));
        assert_eq!(cleaned, "only page");
    }

    #[test]
    fn test_combine_paired_text() {
        let combined = combine_paired_text("2 cups flour\n1 cup milk", "Mix well and fry.");
        assert!(combined.starts_with("INGREDIENTS:\n"));
        assert!(combined.contains("INSTRUCTIONS:\nMix well and fry."));

        let ingredients_only = combine_paired_text("2 cups flour", " ");
        assert!(!ingredients_only.contains("INSTRUCTIONS"));
    }
}

//! # Recipe Ingestion Pipeline
//!
//! Ingests recipes from heterogeneous, unstructured sources (scanned
//! images, web pages, plain text, email attachments) and converts them
//! into normalized, deduplicated recipe records with structured
//! ingredients.
//!
//! The pipeline runs in two explicit steps:
//!
//! 1. [`ingestion::IngestionPipeline`] drives a source through extraction
//!    and segmentation parsing, persisting raw extracted recipes under a
//!    job.
//! 2. [`recipe_normalizer::RecipeNormalizer`] turns a completed job's
//!    extracted recipes into canonical recipe rows, normalizing each
//!    ingredient line and merging duplicates.

pub mod db;
pub mod ingestion;
pub mod ingredient_normalizer;
pub mod models;
pub mod quantity_rules;
pub mod recipe_normalizer;
pub mod recipe_parser;

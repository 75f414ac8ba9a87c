use anyhow::{Context, Result};
use log::info;
use recipe_ingestion::db;
use recipe_ingestion::ingestion::IngestionPipeline;
use recipe_ingestion::models::{JobStatus, SourceKind};
use recipe_ingestion::recipe_normalizer::RecipeNormalizer;
use rusqlite::Connection;
use std::env;
use std::fs;

/// Ingest a recipe text file end to end: create a source, run the
/// extraction/parsing job, then normalize the results into canonical
/// recipes.
fn main() -> Result<()> {
    env_logger::init();
    dotenv::dotenv().ok();

    let mut args = env::args().skip(1);
    let (source_name, path) = match (args.next(), args.next()) {
        (Some(name), Some(path)) => (name, path),
        _ => {
            eprintln!("usage: recipe_ingestion <source-name> <text-file>");
            std::process::exit(2);
        }
    };

    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let user_id: i64 = env::var("USER_ID")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(1);

    let text =
        fs::read_to_string(&path).with_context(|| format!("failed to read {}", path))?;

    info!("Initializing database at: {}", database_url);
    let conn = Connection::open(&database_url)?;
    db::init_database_schema(&conn)?;

    let source_id =
        db::create_source(&conn, user_id, SourceKind::Text, &source_name, None, Some(&text))?;

    let pipeline = IngestionPipeline::new();
    let job = pipeline.process_source(&conn, source_id)?;
    info!(
        "Job {} finished with status {} ({} recipes found)",
        job.id, job.status, job.recipes_found
    );

    if job.status == JobStatus::Completed {
        let saved = RecipeNormalizer::new(user_id).normalize_and_save(&conn, &job)?;
        for recipe in &saved {
            println!("Saved recipe: {} (id {})", recipe.name, recipe.id);
        }
        if saved.is_empty() {
            println!("No recipes found in {}", path);
        }
    } else if let Some(message) = &job.error_message {
        eprintln!("Ingestion failed: {}", message);
        std::process::exit(1);
    }

    Ok(())
}

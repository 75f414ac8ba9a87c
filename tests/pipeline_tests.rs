//! # Pipeline Integration Tests
//!
//! End-to-end coverage of the ingestion pipeline: raw text goes in, a
//! completed job with extracted recipes comes out, and normalization
//! turns those into canonical deduplicated recipe rows.

use anyhow::Result;
use recipe_ingestion::db;
use recipe_ingestion::ingestion::IngestionPipeline;
use recipe_ingestion::ingredient_normalizer::IngredientNormalizer;
use recipe_ingestion::models::{JobStatus, SourceKind};
use recipe_ingestion::recipe_normalizer::RecipeNormalizer;
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::str::FromStr;
use tempfile::NamedTempFile;

const TWO_RECIPES: &str = "Fluffy Pancakes\n\nIngredients:\n2 cups flour\n1-2 cups milk\n2 large eggs\n\nInstructions:\n1. Mix the dry ingredients together.\n2. Whisk in milk and eggs until smooth.\n\n\nCarrot Soup\n\nPrep time: 10 minutes\nServes: 4\n\nIngredients:\n3 cups broth\n1 cup chopped carrots\n\nInstructions:\nSimmer the carrots in broth until soft, then blend.";

fn setup_test_db() -> Result<(Connection, NamedTempFile)> {
    let temp_file = NamedTempFile::new()?;
    let conn = Connection::open(temp_file.path())?;
    db::init_database_schema(&conn)?;
    Ok((conn, temp_file))
}

fn ingest_text(conn: &Connection, user_id: i64, source_name: &str, text: &str) -> Result<i64> {
    let source_id =
        db::create_source(conn, user_id, SourceKind::Text, source_name, None, Some(text))?;
    let job = IngestionPipeline::new().process_source(conn, source_id)?;
    assert_eq!(job.status, JobStatus::Completed);
    Ok(job.id)
}

#[test]
fn test_full_pipeline_extracts_and_normalizes() -> Result<()> {
    let (conn, _temp_file) = setup_test_db()?;

    let job_id = ingest_text(&conn, 1, "Test Box", TWO_RECIPES)?;
    let job = db::get_job(&conn, job_id)?.unwrap();
    assert_eq!(job.recipes_found, 2);

    let extracted = db::extracted_recipes_for_job(&conn, job_id)?;
    assert_eq!(extracted.len(), 2);
    assert_eq!(extracted[0].raw_name, "Fluffy Pancakes");
    assert_eq!(extracted[1].raw_name, "Carrot Soup");
    assert_eq!(extracted[1].raw_metadata.prep_time, Some(10));
    assert_eq!(extracted[1].raw_metadata.servings, Some(4));

    let saved = RecipeNormalizer::new(1).normalize_and_save(&conn, &job)?;
    assert_eq!(saved.len(), 2);

    let pancakes = &saved[0];
    assert_eq!(pancakes.name, "Fluffy Pancakes");
    let rows = db::recipe_ingredients(&conn, pancakes.id)?;
    assert_eq!(rows.len(), 3);

    let soup = &saved[1];
    assert_eq!(soup.prep_time, 10);
    assert_eq!(soup.servings, 4);
    let names = db::recipe_ingredient_names(&conn, soup.id)?;
    assert!(names.contains("broth"));
    assert!(names.contains("carrots"));

    Ok(())
}

#[test]
fn test_range_and_sized_egg_quantities_survive_pipeline() -> Result<()> {
    let (conn, _temp_file) = setup_test_db()?;

    let job_id = ingest_text(&conn, 1, "Test Box", TWO_RECIPES)?;
    let job = db::get_job(&conn, job_id)?.unwrap();
    RecipeNormalizer::new(1).normalize_and_save(&conn, &job)?;

    // "1-2 cups milk" averages to 1.5 cup
    let milk = db::find_ingredient_mapping(&conn, "1-2 cups milk")?.unwrap();
    assert_eq!(milk.quantity, Some(Decimal::from_str("1.5")?));
    assert_eq!(db::unit_name(&conn, milk.unit_id.unwrap())?, "cup");

    // "2 large eggs" keeps the size word as its unit
    let eggs = db::find_ingredient_mapping(&conn, "2 large eggs")?.unwrap();
    assert_eq!(eggs.quantity, Some(Decimal::from(2)));
    assert_eq!(db::unit_name(&conn, eggs.unit_id.unwrap())?, "large");
    assert_eq!(db::ingredient_name(&conn, eggs.ingredient_id)?, "eggs");

    // "1 cup chopped carrots" records its preparation method
    let carrots = db::find_ingredient_mapping(&conn, "1 cup chopped carrots")?.unwrap();
    assert_eq!(carrots.preparation_method, "chopped");

    Ok(())
}

#[test]
fn test_reingesting_identical_text_is_idempotent() -> Result<()> {
    let (conn, _temp_file) = setup_test_db()?;
    let normalizer = RecipeNormalizer::new(1);

    let job_id = ingest_text(&conn, 1, "Test Box", TWO_RECIPES)?;
    let job = db::get_job(&conn, job_id)?.unwrap();
    let first = normalizer.normalize_and_save(&conn, &job)?;

    // Same text, same source name, same user: a fresh source and job
    let job_id2 = ingest_text(&conn, 1, "Test Box", TWO_RECIPES)?;
    let job2 = db::get_job(&conn, job_id2)?.unwrap();
    let second = normalizer.normalize_and_save(&conn, &job2)?;

    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 2);

    let recipe_count: i64 = conn.query_row("SELECT COUNT(*) FROM recipes", [], |row| row.get(0))?;
    assert_eq!(recipe_count, 2);

    for recipe in &first {
        let before = db::recipe_ingredients(&conn, recipe.id)?.len();
        assert!(before > 0);
    }
    let join_count: i64 =
        conn.query_row("SELECT COUNT(*) FROM recipe_ingredients", [], |row| row.get(0))?;
    assert_eq!(join_count, 5);

    Ok(())
}

#[test]
fn test_cache_hit_returns_identical_normalization() -> Result<()> {
    let (conn, _temp_file) = setup_test_db()?;
    let normalizer = IngredientNormalizer::new();

    let first = normalizer
        .normalize(&conn, "2 cups all-purpose flour")?
        .unwrap();
    let second = normalizer
        .normalize(&conn, "2 cups all-purpose flour")?
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(first.quantity, Some(Decimal::from(2)));
    assert_eq!(first.unit_name.as_deref(), Some("cup"));
    assert_eq!(first.ingredient_name, "all-purpose flour");

    // Only one mapping row exists for the text
    let mapping_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM ingredient_mappings WHERE raw_text = ?1",
        ["2 cups all-purpose flour"],
        |row| row.get(0),
    )?;
    assert_eq!(mapping_count, 1);

    Ok(())
}

#[test]
fn test_plural_units_normalize_to_singular() -> Result<()> {
    let (conn, _temp_file) = setup_test_db()?;
    let normalizer = IngredientNormalizer::new();

    for (line, expected_unit) in [
        ("3 tablespoons butter", "tablespoon"),
        ("2 teaspoons vanilla", "teaspoon"),
        ("4 ounces cheese", "ounce"),
        ("2 slices bread", "slice"),
        ("3 cloves garlic", "clove"),
    ] {
        let normalized = normalizer.normalize(&conn, line)?.unwrap();
        assert_eq!(
            normalized.unit_name.as_deref(),
            Some(expected_unit),
            "failed for: {}",
            line
        );
    }

    Ok(())
}

#[test]
fn test_fraction_quantities_are_exact() -> Result<()> {
    let (conn, _temp_file) = setup_test_db()?;
    let normalizer = IngredientNormalizer::new();

    let half = normalizer.normalize(&conn, "1/2 cup sugar")?.unwrap();
    assert_eq!(half.quantity, Some(Decimal::from_str("0.5")?));

    let quarter = normalizer.normalize(&conn, "3/4 cup cream")?.unwrap();
    assert_eq!(quarter.quantity, Some(Decimal::from_str("0.75")?));

    Ok(())
}

#[test]
fn test_extraction_confidence_within_bounds() -> Result<()> {
    let (conn, _temp_file) = setup_test_db()?;

    let job_id = ingest_text(&conn, 1, "Test Box", TWO_RECIPES)?;
    for extracted in db::extracted_recipes_for_job(&conn, job_id)? {
        assert!(extracted.confidence >= 0.0 && extracted.confidence <= 1.0);
        assert!(extracted.confidence > 0.0);
    }

    Ok(())
}

#[test]
fn test_unparseable_lines_skipped_without_aborting() -> Result<()> {
    let (conn, _temp_file) = setup_test_db()?;

    // "cup" is a bare unit word and "2 cups" has no residual name; both
    // reach the normalizer and are silently dropped there
    let text = "Mystery Bake\n\nIngredients:\n2 cups flour\ncup\n2 cups\n1 cup sugar\n\nInstructions:\nCombine and bake until set in the middle.";
    let job_id = ingest_text(&conn, 1, "Test Box", text)?;
    let job = db::get_job(&conn, job_id)?.unwrap();

    let extracted = db::extracted_recipes_for_job(&conn, job_id)?;
    assert_eq!(extracted[0].raw_ingredients.len(), 4);

    let saved = RecipeNormalizer::new(1).normalize_and_save(&conn, &job)?;
    assert_eq!(saved.len(), 1);

    // Only the two real ingredients survive normalization
    let names = db::recipe_ingredient_names(&conn, saved[0].id)?;
    assert!(names.contains("flour"));
    assert!(names.contains("sugar"));
    assert_eq!(db::recipe_ingredients(&conn, saved[0].id)?.len(), 2);

    Ok(())
}

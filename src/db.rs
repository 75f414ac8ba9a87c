use crate::models::{
    ExtractedRecipe, IngestionJob, IngestionSource, IngredientMapping, JobStatus, LogLevel,
    ProcessingLog, Recipe, RecipeIngredient, RecipeMetadata, SourceKind,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::str::FromStr;

/// Initialize the database schema
///
/// All uniqueness invariants of the pipeline live here as UNIQUE
/// constraints: one mapping per (raw text, ingredient), one recipe per
/// (name, source name, user), one join row per (recipe, ingredient), and
/// one row per name in every reference table.
pub fn init_database_schema(conn: &Connection) -> Result<()> {
    info!("Initializing database schema...");

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS ingestion_sources (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            kind TEXT NOT NULL,
            name TEXT NOT NULL,
            url TEXT,
            raw_text TEXT,
            created_at TEXT NOT NULL,
            processed_at TEXT
        );

        CREATE TABLE IF NOT EXISTS ingestion_jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_id INTEGER NOT NULL REFERENCES ingestion_sources(id),
            status TEXT NOT NULL DEFAULT 'pending',
            started_at TEXT NOT NULL,
            completed_at TEXT,
            error_message TEXT,
            recipes_found INTEGER NOT NULL DEFAULT 0,
            recipes_processed INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS extracted_recipes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id INTEGER NOT NULL REFERENCES ingestion_jobs(id),
            raw_name TEXT NOT NULL,
            raw_instructions TEXT NOT NULL,
            raw_ingredients TEXT NOT NULL,
            raw_metadata TEXT NOT NULL,
            confidence REAL NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS ingredients (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS units (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS difficulties (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS cuisines (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS courses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS diets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS ingredient_mappings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            raw_text TEXT NOT NULL,
            ingredient_id INTEGER NOT NULL REFERENCES ingredients(id),
            quantity TEXT,
            unit_id INTEGER REFERENCES units(id),
            preparation_method TEXT NOT NULL DEFAULT '',
            confidence REAL NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            UNIQUE(raw_text, ingredient_id)
        );

        CREATE TABLE IF NOT EXISTS recipes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            instructions TEXT NOT NULL,
            prep_time INTEGER NOT NULL DEFAULT 0,
            cook_time INTEGER NOT NULL DEFAULT 0,
            servings INTEGER NOT NULL DEFAULT 1,
            difficulty_id INTEGER REFERENCES difficulties(id),
            cuisine_id INTEGER REFERENCES cuisines(id),
            course_id INTEGER REFERENCES courses(id),
            diet_id INTEGER REFERENCES diets(id),
            source_name TEXT NOT NULL DEFAULT '',
            source_url TEXT,
            user_id INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(name, source_name, user_id)
        );

        CREATE TABLE IF NOT EXISTS recipe_ingredients (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            recipe_id INTEGER NOT NULL REFERENCES recipes(id),
            ingredient_id INTEGER NOT NULL REFERENCES ingredients(id),
            quantity TEXT NOT NULL,
            unit_id INTEGER REFERENCES units(id),
            preparation_method TEXT NOT NULL DEFAULT '',
            optional INTEGER NOT NULL DEFAULT 0,
            UNIQUE(recipe_id, ingredient_id)
        );

        CREATE TABLE IF NOT EXISTS processing_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id INTEGER NOT NULL REFERENCES ingestion_jobs(id),
            step TEXT NOT NULL,
            level TEXT NOT NULL DEFAULT 'info',
            message TEXT NOT NULL,
            created_at TEXT NOT NULL
        );",
    )
    .context("Failed to create database schema")?;

    info!("Database schema initialized successfully");
    Ok(())
}

// ---------------------------------------------------------------------------
// Sources

/// Create a new ingestion source for a user
pub fn create_source(
    conn: &Connection,
    user_id: i64,
    kind: SourceKind,
    name: &str,
    url: Option<&str>,
    raw_text: Option<&str>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO ingestion_sources (user_id, kind, name, url, raw_text, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![user_id, kind.as_str(), name, url, raw_text, Utc::now()],
    )
    .context("Failed to insert ingestion source")?;

    let source_id = conn.last_insert_rowid();
    info!("Source created with ID: {}", source_id);
    Ok(source_id)
}

/// Read an ingestion source by ID
pub fn get_source(conn: &Connection, source_id: i64) -> Result<Option<IngestionSource>> {
    let row = conn
        .query_row(
            "SELECT id, user_id, kind, name, url, raw_text, created_at, processed_at
             FROM ingestion_sources WHERE id = ?1",
            params![source_id],
            |row| {
                Ok((
                    row.get::<_, i64>("id")?,
                    row.get::<_, i64>("user_id")?,
                    row.get::<_, String>("kind")?,
                    row.get::<_, String>("name")?,
                    row.get::<_, Option<String>>("url")?,
                    row.get::<_, Option<String>>("raw_text")?,
                    row.get::<_, DateTime<Utc>>("created_at")?,
                    row.get::<_, Option<DateTime<Utc>>>("processed_at")?,
                ))
            },
        )
        .optional()
        .context("Failed to read ingestion source")?;

    let Some((id, user_id, kind, name, url, raw_text, created_at, processed_at)) = row else {
        return Ok(None);
    };

    Ok(Some(IngestionSource {
        id,
        user_id,
        kind: kind.parse::<SourceKind>()?,
        name,
        url,
        raw_text,
        created_at,
        processed_at,
    }))
}

/// Record the text extracted from a source and stamp it processed
pub fn set_source_text(conn: &Connection, source_id: i64, raw_text: &str) -> Result<()> {
    conn.execute(
        "UPDATE ingestion_sources SET raw_text = ?1, processed_at = ?2 WHERE id = ?3",
        params![raw_text, Utc::now(), source_id],
    )
    .context("Failed to update source text")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Jobs

/// Create a pending job for one processing attempt of a source
pub fn create_job(conn: &Connection, source_id: i64) -> Result<i64> {
    conn.execute(
        "INSERT INTO ingestion_jobs (source_id, status, started_at) VALUES (?1, ?2, ?3)",
        params![source_id, JobStatus::Pending.as_str(), Utc::now()],
    )
    .context("Failed to insert ingestion job")?;

    let job_id = conn.last_insert_rowid();
    info!("Job created with ID: {}", job_id);
    Ok(job_id)
}

/// Read a job by ID
pub fn get_job(conn: &Connection, job_id: i64) -> Result<Option<IngestionJob>> {
    let row = conn
        .query_row(
            "SELECT id, source_id, status, started_at, completed_at, error_message,
                    recipes_found, recipes_processed
             FROM ingestion_jobs WHERE id = ?1",
            params![job_id],
            |row| {
                Ok((
                    row.get::<_, i64>("id")?,
                    row.get::<_, i64>("source_id")?,
                    row.get::<_, String>("status")?,
                    row.get::<_, DateTime<Utc>>("started_at")?,
                    row.get::<_, Option<DateTime<Utc>>>("completed_at")?,
                    row.get::<_, Option<String>>("error_message")?,
                    row.get::<_, u32>("recipes_found")?,
                    row.get::<_, u32>("recipes_processed")?,
                ))
            },
        )
        .optional()
        .context("Failed to read ingestion job")?;

    let Some((
        id,
        source_id,
        status,
        started_at,
        completed_at,
        error_message,
        recipes_found,
        recipes_processed,
    )) = row
    else {
        return Ok(None);
    };

    Ok(Some(IngestionJob {
        id,
        source_id,
        status: status.parse::<JobStatus>()?,
        started_at,
        completed_at,
        error_message,
        recipes_found,
        recipes_processed,
    }))
}

/// Move a job to a new status without touching counters or timestamps
pub fn set_job_status(conn: &Connection, job_id: i64, status: JobStatus) -> Result<()> {
    conn.execute(
        "UPDATE ingestion_jobs SET status = ?1 WHERE id = ?2",
        params![status.as_str(), job_id],
    )
    .context("Failed to update job status")?;
    Ok(())
}

/// Mark a job completed with its final recipe counters
pub fn complete_job(
    conn: &Connection,
    job_id: i64,
    recipes_found: u32,
    recipes_processed: u32,
) -> Result<()> {
    conn.execute(
        "UPDATE ingestion_jobs
         SET status = ?1, completed_at = ?2, recipes_found = ?3, recipes_processed = ?4
         WHERE id = ?5",
        params![
            JobStatus::Completed.as_str(),
            Utc::now(),
            recipes_found,
            recipes_processed,
            job_id
        ],
    )
    .context("Failed to complete job")?;
    Ok(())
}

/// Mark a job failed, recording the error message verbatim
pub fn fail_job(conn: &Connection, job_id: i64, error_message: &str) -> Result<()> {
    conn.execute(
        "UPDATE ingestion_jobs SET status = ?1, error_message = ?2 WHERE id = ?3",
        params![JobStatus::Failed.as_str(), error_message, job_id],
    )
    .context("Failed to mark job failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Extracted recipes

/// Persist one extracted recipe under a job
pub fn insert_extracted_recipe(
    conn: &Connection,
    job_id: i64,
    raw_name: &str,
    raw_instructions: &str,
    raw_ingredients: &[String],
    raw_metadata: &RecipeMetadata,
    confidence: f64,
) -> Result<i64> {
    let ingredients_json =
        serde_json::to_string(raw_ingredients).context("Failed to encode ingredient lines")?;
    let metadata_json =
        serde_json::to_string(raw_metadata).context("Failed to encode recipe metadata")?;

    conn.execute(
        "INSERT INTO extracted_recipes
         (job_id, raw_name, raw_instructions, raw_ingredients, raw_metadata, confidence, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            job_id,
            raw_name,
            raw_instructions,
            ingredients_json,
            metadata_json,
            confidence,
            Utc::now()
        ],
    )
    .context("Failed to insert extracted recipe")?;

    Ok(conn.last_insert_rowid())
}

/// All extracted recipes of a job, in extraction order
pub fn extracted_recipes_for_job(conn: &Connection, job_id: i64) -> Result<Vec<ExtractedRecipe>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, job_id, raw_name, raw_instructions, raw_ingredients, raw_metadata,
                    confidence, created_at
             FROM extracted_recipes WHERE job_id = ?1 ORDER BY id",
        )
        .context("Failed to prepare extracted recipe query")?;

    let rows = stmt
        .query_map(params![job_id], |row| {
            Ok((
                row.get::<_, i64>("id")?,
                row.get::<_, i64>("job_id")?,
                row.get::<_, String>("raw_name")?,
                row.get::<_, String>("raw_instructions")?,
                row.get::<_, String>("raw_ingredients")?,
                row.get::<_, String>("raw_metadata")?,
                row.get::<_, f64>("confidence")?,
                row.get::<_, DateTime<Utc>>("created_at")?,
            ))
        })
        .context("Failed to query extracted recipes")?;

    let mut recipes = Vec::new();
    for row in rows {
        let (
            id,
            job_id,
            raw_name,
            raw_instructions,
            ingredients_json,
            metadata_json,
            confidence,
            created_at,
        ) = row.context("Failed to read extracted recipe row")?;
        recipes.push(ExtractedRecipe {
            id,
            job_id,
            raw_name,
            raw_instructions,
            raw_ingredients: serde_json::from_str(&ingredients_json)
                .context("Failed to decode ingredient lines")?,
            raw_metadata: serde_json::from_str(&metadata_json)
                .context("Failed to decode recipe metadata")?,
            confidence,
            created_at,
        });
    }
    Ok(recipes)
}

// ---------------------------------------------------------------------------
// Reference entities

/// Resolve-or-create a row in a reference table keyed by unique name
///
/// INSERT OR IGNORE followed by a SELECT under the UNIQUE index, so two
/// writers racing on the same name converge on a single row.
fn get_or_create_named(conn: &Connection, table: &str, name: &str) -> Result<i64> {
    conn.execute(
        &format!("INSERT OR IGNORE INTO {table} (name) VALUES (?1)"),
        params![name],
    )
    .with_context(|| format!("Failed to insert into {table}"))?;

    let id = conn
        .query_row(
            &format!("SELECT id FROM {table} WHERE name = ?1"),
            params![name],
            |row| row.get(0),
        )
        .with_context(|| format!("Failed to resolve name in {table}"))?;
    debug!("Resolved {} '{}' to ID {}", table, name, id);
    Ok(id)
}

pub fn get_or_create_ingredient(conn: &Connection, name: &str) -> Result<i64> {
    get_or_create_named(conn, "ingredients", name)
}

pub fn get_or_create_unit(conn: &Connection, name: &str) -> Result<i64> {
    get_or_create_named(conn, "units", name)
}

pub fn get_or_create_difficulty(conn: &Connection, name: &str) -> Result<i64> {
    get_or_create_named(conn, "difficulties", name)
}

pub fn get_or_create_cuisine(conn: &Connection, name: &str) -> Result<i64> {
    get_or_create_named(conn, "cuisines", name)
}

pub fn get_or_create_course(conn: &Connection, name: &str) -> Result<i64> {
    get_or_create_named(conn, "courses", name)
}

pub fn get_or_create_diet(conn: &Connection, name: &str) -> Result<i64> {
    get_or_create_named(conn, "diets", name)
}

pub fn ingredient_name(conn: &Connection, ingredient_id: i64) -> Result<String> {
    conn.query_row(
        "SELECT name FROM ingredients WHERE id = ?1",
        params![ingredient_id],
        |row| row.get(0),
    )
    .context("Failed to read ingredient name")
}

pub fn unit_name(conn: &Connection, unit_id: i64) -> Result<String> {
    conn.query_row(
        "SELECT name FROM units WHERE id = ?1",
        params![unit_id],
        |row| row.get(0),
    )
    .context("Failed to read unit name")
}

// ---------------------------------------------------------------------------
// Ingredient mappings

/// Look up the cached normalization of a raw ingredient text
pub fn find_ingredient_mapping(
    conn: &Connection,
    raw_text: &str,
) -> Result<Option<IngredientMapping>> {
    let row = conn
        .query_row(
            "SELECT id, raw_text, ingredient_id, quantity, unit_id, preparation_method, confidence
             FROM ingredient_mappings WHERE raw_text = ?1",
            params![raw_text],
            |row| {
                Ok((
                    row.get::<_, i64>("id")?,
                    row.get::<_, String>("raw_text")?,
                    row.get::<_, i64>("ingredient_id")?,
                    row.get::<_, Option<String>>("quantity")?,
                    row.get::<_, Option<i64>>("unit_id")?,
                    row.get::<_, String>("preparation_method")?,
                    row.get::<_, f64>("confidence")?,
                ))
            },
        )
        .optional()
        .context("Failed to read ingredient mapping")?;

    let Some((id, raw_text, ingredient_id, quantity, unit_id, preparation_method, confidence)) =
        row
    else {
        return Ok(None);
    };

    Ok(Some(IngredientMapping {
        id,
        raw_text,
        ingredient_id,
        quantity: decimal_from_sql(quantity)?,
        unit_id,
        preparation_method,
        confidence,
    }))
}

/// Record a freshly parsed normalization for future cache hits
///
/// INSERT OR IGNORE keeps the unique (raw_text, ingredient) pair stable
/// when two jobs normalize the same line concurrently.
pub fn create_ingredient_mapping(
    conn: &Connection,
    raw_text: &str,
    ingredient_id: i64,
    quantity: Option<Decimal>,
    unit_id: Option<i64>,
    preparation_method: &str,
    confidence: f64,
) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO ingredient_mappings
         (raw_text, ingredient_id, quantity, unit_id, preparation_method, confidence, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            raw_text,
            ingredient_id,
            quantity.map(|q| q.to_string()),
            unit_id,
            preparation_method,
            confidence,
            Utc::now()
        ],
    )
    .context("Failed to insert ingredient mapping")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Recipes

/// Field values for a canonical recipe insert
#[derive(Clone, Copy)]
pub struct NewRecipe<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub instructions: &'a str,
    pub prep_time: u32,
    pub cook_time: u32,
    pub servings: u32,
    pub difficulty_id: Option<i64>,
    pub cuisine_id: Option<i64>,
    pub course_id: Option<i64>,
    pub diet_id: Option<i64>,
    pub source_name: &'a str,
    pub source_url: Option<&'a str>,
    pub user_id: i64,
}

/// Outcome of attempting a canonical recipe insert
#[derive(Debug, PartialEq, Eq)]
pub enum RecipeInsert {
    Created(i64),
    /// The (name, source name, user) key already exists; proceed via merge
    Duplicate,
}

/// Find a canonical recipe by its deduplication key
pub fn find_recipe(
    conn: &Connection,
    name: &str,
    source_name: &str,
    user_id: i64,
) -> Result<Option<Recipe>> {
    conn.query_row(
        "SELECT id, name, description, instructions, prep_time, cook_time, servings,
                difficulty_id, cuisine_id, course_id, diet_id, source_name, source_url, user_id
         FROM recipes WHERE name = ?1 AND source_name = ?2 AND user_id = ?3",
        params![name, source_name, user_id],
        row_to_recipe,
    )
    .optional()
    .context("Failed to look up recipe by deduplication key")
}

pub fn get_recipe(conn: &Connection, recipe_id: i64) -> Result<Option<Recipe>> {
    conn.query_row(
        "SELECT id, name, description, instructions, prep_time, cook_time, servings,
                difficulty_id, cuisine_id, course_id, diet_id, source_name, source_url, user_id
         FROM recipes WHERE id = ?1",
        params![recipe_id],
        row_to_recipe,
    )
    .optional()
    .context("Failed to read recipe")
}

/// Insert a canonical recipe, reporting a duplicate key as a merge signal
///
/// A racing insert can violate the (name, source_name, user_id) constraint
/// even after an advisory duplicate check; that violation is surfaced as
/// [`RecipeInsert::Duplicate`] instead of an error.
pub fn create_recipe(conn: &Connection, recipe: &NewRecipe<'_>) -> Result<RecipeInsert> {
    let inserted = conn.execute(
        "INSERT INTO recipes
         (name, description, instructions, prep_time, cook_time, servings,
          difficulty_id, cuisine_id, course_id, diet_id, source_name, source_url, user_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            recipe.name,
            recipe.description,
            recipe.instructions,
            recipe.prep_time,
            recipe.cook_time,
            recipe.servings,
            recipe.difficulty_id,
            recipe.cuisine_id,
            recipe.course_id,
            recipe.diet_id,
            recipe.source_name,
            recipe.source_url,
            recipe.user_id,
            Utc::now()
        ],
    );

    match inserted {
        Ok(_) => {
            let recipe_id = conn.last_insert_rowid();
            info!("Recipe created with ID: {}", recipe_id);
            Ok(RecipeInsert::Created(recipe_id))
        }
        Err(err) if is_unique_violation(&err) => {
            debug!(
                "Recipe '{}' already exists, falling back to merge",
                recipe.name
            );
            Ok(RecipeInsert::Duplicate)
        }
        Err(err) => Err(err).context("Failed to insert recipe"),
    }
}

/// Write back the merged scalar fields of an existing recipe
pub fn update_recipe(conn: &Connection, recipe: &Recipe) -> Result<()> {
    conn.execute(
        "UPDATE recipes
         SET description = ?1, instructions = ?2, prep_time = ?3, cook_time = ?4, servings = ?5,
             difficulty_id = ?6, cuisine_id = ?7, course_id = ?8, diet_id = ?9
         WHERE id = ?10",
        params![
            recipe.description,
            recipe.instructions,
            recipe.prep_time,
            recipe.cook_time,
            recipe.servings,
            recipe.difficulty_id,
            recipe.cuisine_id,
            recipe.course_id,
            recipe.diet_id,
            recipe.id
        ],
    )
    .context("Failed to update recipe")?;
    Ok(())
}

fn row_to_recipe(row: &Row<'_>) -> rusqlite::Result<Recipe> {
    Ok(Recipe {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        instructions: row.get("instructions")?,
        prep_time: row.get("prep_time")?,
        cook_time: row.get("cook_time")?,
        servings: row.get("servings")?,
        difficulty_id: row.get("difficulty_id")?,
        cuisine_id: row.get("cuisine_id")?,
        course_id: row.get("course_id")?,
        diet_id: row.get("diet_id")?,
        source_name: row.get("source_name")?,
        source_url: row.get("source_url")?,
        user_id: row.get("user_id")?,
    })
}

// ---------------------------------------------------------------------------
// Recipe ingredients

/// Attach an ingredient to a recipe, ignoring an existing (recipe,
/// ingredient) pair. Returns whether a new row was written.
pub fn add_recipe_ingredient(
    conn: &Connection,
    recipe_id: i64,
    ingredient_id: i64,
    quantity: Decimal,
    unit_id: Option<i64>,
    preparation_method: &str,
    optional: bool,
) -> Result<bool> {
    let changed = conn
        .execute(
            "INSERT OR IGNORE INTO recipe_ingredients
             (recipe_id, ingredient_id, quantity, unit_id, preparation_method, optional)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                recipe_id,
                ingredient_id,
                quantity.to_string(),
                unit_id,
                preparation_method,
                optional
            ],
        )
        .context("Failed to insert recipe ingredient")?;
    Ok(changed > 0)
}

/// All ingredient rows of a recipe
pub fn recipe_ingredients(conn: &Connection, recipe_id: i64) -> Result<Vec<RecipeIngredient>> {
    let mut stmt = conn
        .prepare(
            "SELECT recipe_id, ingredient_id, quantity, unit_id, preparation_method, optional
             FROM recipe_ingredients WHERE recipe_id = ?1 ORDER BY id",
        )
        .context("Failed to prepare recipe ingredient query")?;

    let rows = stmt
        .query_map(params![recipe_id], |row| {
            Ok((
                row.get::<_, i64>("recipe_id")?,
                row.get::<_, i64>("ingredient_id")?,
                row.get::<_, String>("quantity")?,
                row.get::<_, Option<i64>>("unit_id")?,
                row.get::<_, String>("preparation_method")?,
                row.get::<_, bool>("optional")?,
            ))
        })
        .context("Failed to query recipe ingredients")?;

    let mut ingredients = Vec::new();
    for row in rows {
        let (recipe_id, ingredient_id, quantity, unit_id, preparation_method, optional) =
            row.context("Failed to read recipe ingredient row")?;
        ingredients.push(RecipeIngredient {
            recipe_id,
            ingredient_id,
            quantity: Decimal::from_str(&quantity)
                .context("Failed to decode recipe ingredient quantity")?,
            unit_id,
            preparation_method,
            optional,
        });
    }
    Ok(ingredients)
}

/// Names of the ingredients already attached to a recipe
pub fn recipe_ingredient_names(conn: &Connection, recipe_id: i64) -> Result<HashSet<String>> {
    let mut stmt = conn
        .prepare(
            "SELECT i.name FROM recipe_ingredients ri
             JOIN ingredients i ON i.id = ri.ingredient_id
             WHERE ri.recipe_id = ?1",
        )
        .context("Failed to prepare ingredient name query")?;

    let rows = stmt
        .query_map(params![recipe_id], |row| row.get::<_, String>(0))
        .context("Failed to query ingredient names")?;

    let mut names = HashSet::new();
    for name in rows {
        names.insert(name.context("Failed to read ingredient name row")?);
    }
    Ok(names)
}

// ---------------------------------------------------------------------------
// Processing logs

/// Append one audit trail entry for a job step
pub fn add_processing_log(
    conn: &Connection,
    job_id: i64,
    step: &str,
    level: LogLevel,
    message: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO processing_logs (job_id, step, level, message, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![job_id, step, level.as_str(), message, Utc::now()],
    )
    .context("Failed to insert processing log")?;
    Ok(())
}

/// The audit trail of a job, oldest first
pub fn logs_for_job(conn: &Connection, job_id: i64) -> Result<Vec<ProcessingLog>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, job_id, step, level, message, created_at
             FROM processing_logs WHERE job_id = ?1 ORDER BY id",
        )
        .context("Failed to prepare processing log query")?;

    let rows = stmt
        .query_map(params![job_id], |row| {
            Ok((
                row.get::<_, i64>("id")?,
                row.get::<_, i64>("job_id")?,
                row.get::<_, String>("step")?,
                row.get::<_, String>("level")?,
                row.get::<_, String>("message")?,
                row.get::<_, DateTime<Utc>>("created_at")?,
            ))
        })
        .context("Failed to query processing logs")?;

    let mut logs = Vec::new();
    for row in rows {
        let (id, job_id, step, level, message, created_at) =
            row.context("Failed to read processing log row")?;
        let level = match level.as_str() {
            "debug" => LogLevel::Debug,
            "warning" => LogLevel::Warning,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        };
        logs.push(ProcessingLog {
            id,
            job_id,
            step,
            level,
            message,
            created_at,
        });
    }
    Ok(logs)
}

// ---------------------------------------------------------------------------
// Helpers

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(info, _)
            if info.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn decimal_from_sql(value: Option<String>) -> Result<Option<Decimal>> {
    value
        .map(|text| Decimal::from_str(&text).context("Failed to decode stored quantity"))
        .transpose()
}

//! # Recipe Normalizer and Deduplicator
//!
//! Consumes the extracted recipes of a completed ingestion job, normalizes
//! every raw ingredient line, resolves classification references
//! (difficulty, cuisine, course, diet) and writes canonical recipe rows.
//!
//! Deduplication is keyed on (recipe name, derived source name, owning
//! user). A hit merges instead of creating: empty scalar fields are filled
//! from the new data, instructions are replaced only when longer, and only
//! ingredients whose resolved name is not already attached are appended.
//! Re-ingesting the same source is therefore idempotent.

use crate::db::{self, NewRecipe, RecipeInsert};
use crate::ingredient_normalizer::{IngredientNormalizer, NormalizedIngredient};
use crate::models::{ExtractedRecipe, IngestionJob, IngestionSource, LogLevel, Recipe, SourceKind};
use anyhow::{anyhow, Result};
use log::{error, info};
use rusqlite::Connection;
use url::Url;

/// Display-oriented source description derived from an ingestion source
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub name: String,
    pub url: Option<String>,
}

/// Fully normalized recipe data, ready to create or merge
struct NormalizedRecipe {
    name: String,
    description: String,
    instructions: String,
    prep_time: u32,
    cook_time: u32,
    servings: u32,
    difficulty_id: Option<i64>,
    cuisine_id: Option<i64>,
    course_id: Option<i64>,
    diet_id: Option<i64>,
    ingredients: Vec<NormalizedIngredient>,
}

/// Normalizes and saves the recipes of one user's ingestion jobs
pub struct RecipeNormalizer {
    user_id: i64,
    ingredient_normalizer: IngredientNormalizer,
}

impl RecipeNormalizer {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            ingredient_normalizer: IngredientNormalizer::new(),
        }
    }

    /// Normalize and save all extracted recipes of a job
    ///
    /// A failure while saving one recipe is logged against the job and
    /// does not prevent the remaining recipes from being processed; the
    /// returned list holds the recipes that succeeded.
    pub fn normalize_and_save(&self, conn: &Connection, job: &IngestionJob) -> Result<Vec<Recipe>> {
        let source = db::get_source(conn, job.source_id)?
            .ok_or_else(|| anyhow!("source {} not found for job {}", job.source_id, job.id))?;
        let source_info = source_display(&source);

        let mut saved = Vec::new();
        for extracted in db::extracted_recipes_for_job(conn, job.id)? {
            match self.save_extracted(conn, &extracted, &source_info) {
                Ok((recipe, merged)) => {
                    let action = if merged { "Updated existing" } else { "Created new" };
                    db::add_processing_log(
                        conn,
                        job.id,
                        "normalization",
                        LogLevel::Info,
                        &format!("{} recipe: {}", action, recipe.name),
                    )?;
                    saved.push(recipe);
                }
                Err(err) => {
                    error!("Failed to normalize recipe '{}': {:#}", extracted.raw_name, err);
                    db::add_processing_log(
                        conn,
                        job.id,
                        "normalization",
                        LogLevel::Error,
                        &format!("Failed to normalize recipe: {:#}", err),
                    )?;
                }
            }
        }

        info!("Saved {} recipes for job {}", saved.len(), job.id);
        Ok(saved)
    }

    /// Save one extracted recipe, creating or merging as needed.
    /// Returns the canonical recipe and whether it was a merge.
    fn save_extracted(
        &self,
        conn: &Connection,
        extracted: &ExtractedRecipe,
        source_info: &SourceInfo,
    ) -> Result<(Recipe, bool)> {
        let normalized = self.normalize_recipe(conn, extracted)?;

        // The duplicate check is advisory; a racing insert still lands on
        // the merge path via the unique-constraint signal below.
        if let Some(existing) =
            db::find_recipe(conn, &normalized.name, &source_info.name, self.user_id)?
        {
            let merged = self.merge_recipe(conn, existing, &normalized)?;
            return Ok((merged, true));
        }

        let insert = db::create_recipe(
            conn,
            &NewRecipe {
                name: &normalized.name,
                description: &normalized.description,
                instructions: &normalized.instructions,
                prep_time: normalized.prep_time,
                cook_time: normalized.cook_time,
                servings: normalized.servings,
                difficulty_id: normalized.difficulty_id,
                cuisine_id: normalized.cuisine_id,
                course_id: normalized.course_id,
                diet_id: normalized.diet_id,
                source_name: &source_info.name,
                source_url: source_info.url.as_deref(),
                user_id: self.user_id,
            },
        )?;

        match insert {
            RecipeInsert::Created(recipe_id) => {
                for ingredient in &normalized.ingredients {
                    // A join row needs both a resolved ingredient and a
                    // quantity; lines lacking either are skipped
                    let Some(quantity) = ingredient.quantity else {
                        continue;
                    };
                    db::add_recipe_ingredient(
                        conn,
                        recipe_id,
                        ingredient.ingredient_id,
                        quantity,
                        ingredient.unit_id,
                        &ingredient.preparation,
                        false,
                    )?;
                }
                let recipe = db::get_recipe(conn, recipe_id)?
                    .ok_or_else(|| anyhow!("recipe {} vanished after insert", recipe_id))?;
                Ok((recipe, false))
            }
            RecipeInsert::Duplicate => {
                let existing =
                    db::find_recipe(conn, &normalized.name, &source_info.name, self.user_id)?
                        .ok_or_else(|| {
                            anyhow!("duplicate recipe '{}' not found for merge", normalized.name)
                        })?;
                let merged = self.merge_recipe(conn, existing, &normalized)?;
                Ok((merged, true))
            }
        }
    }

    /// Normalize an extracted recipe's ingredients and metadata
    fn normalize_recipe(
        &self,
        conn: &Connection,
        extracted: &ExtractedRecipe,
    ) -> Result<NormalizedRecipe> {
        let mut ingredients = Vec::new();
        for raw_line in &extracted.raw_ingredients {
            // Unparseable lines are dropped without aborting the recipe
            if let Some(normalized) = self.ingredient_normalizer.normalize(conn, raw_line)? {
                ingredients.push(normalized);
            }
        }

        let metadata = &extracted.raw_metadata;
        Ok(NormalizedRecipe {
            name: extracted.raw_name.clone(),
            description: metadata.description.clone().unwrap_or_default(),
            instructions: extracted.raw_instructions.clone(),
            prep_time: metadata.prep_time.unwrap_or(0),
            cook_time: metadata.cook_time.unwrap_or(0),
            servings: metadata.servings.unwrap_or(1),
            difficulty_id: resolve_classification(conn, metadata.difficulty.as_deref(), db::get_or_create_difficulty)?,
            cuisine_id: resolve_classification(conn, metadata.cuisine.as_deref(), db::get_or_create_cuisine)?,
            course_id: resolve_classification(conn, metadata.course.as_deref(), db::get_or_create_course)?,
            diet_id: resolve_classification(conn, metadata.diet.as_deref(), db::get_or_create_diet)?,
            ingredients,
        })
    }

    /// Merge new data into an existing recipe
    ///
    /// Empty or zero fields are filled from the new data; non-empty
    /// existing values are never overwritten. Instructions are the one
    /// exception, replaced when the incoming text is longer.
    fn merge_recipe(
        &self,
        conn: &Connection,
        mut existing: Recipe,
        incoming: &NormalizedRecipe,
    ) -> Result<Recipe> {
        if existing.description.is_empty() && !incoming.description.is_empty() {
            existing.description = incoming.description.clone();
        }

        if existing.instructions.is_empty()
            || incoming.instructions.chars().count() > existing.instructions.chars().count()
        {
            existing.instructions = incoming.instructions.clone();
        }

        if existing.prep_time == 0 && incoming.prep_time > 0 {
            existing.prep_time = incoming.prep_time;
        }
        if existing.cook_time == 0 && incoming.cook_time > 0 {
            existing.cook_time = incoming.cook_time;
        }
        if existing.servings == 0 && incoming.servings > 0 {
            existing.servings = incoming.servings;
        }

        if existing.difficulty_id.is_none() {
            existing.difficulty_id = incoming.difficulty_id;
        }
        if existing.cuisine_id.is_none() {
            existing.cuisine_id = incoming.cuisine_id;
        }
        if existing.course_id.is_none() {
            existing.course_id = incoming.course_id;
        }
        if existing.diet_id.is_none() {
            existing.diet_id = incoming.diet_id;
        }

        db::update_recipe(conn, &existing)?;

        // Append only ingredients whose resolved name is not attached yet
        let attached = db::recipe_ingredient_names(conn, existing.id)?;
        for ingredient in &incoming.ingredients {
            if attached.contains(&ingredient.ingredient_name) {
                continue;
            }
            let Some(quantity) = ingredient.quantity else {
                continue;
            };
            db::add_recipe_ingredient(
                conn,
                existing.id,
                ingredient.ingredient_id,
                quantity,
                ingredient.unit_id,
                &ingredient.preparation,
                false,
            )?;
        }

        Ok(existing)
    }
}

fn resolve_classification(
    conn: &Connection,
    name: Option<&str>,
    get_or_create: fn(&Connection, &str) -> Result<i64>,
) -> Result<Option<i64>> {
    match name.map(str::trim) {
        Some(name) if !name.is_empty() => Ok(Some(get_or_create(conn, &name.to_lowercase())?)),
        _ => Ok(None),
    }
}

/// Derive the display source name and URL for deduplication
///
/// URL sources get the page host appended when it is not already part of
/// the name; image uploads are tagged with their upload kind.
pub fn source_display(source: &IngestionSource) -> SourceInfo {
    let mut name = source.name.clone();

    match source.kind {
        SourceKind::Url => {
            if let Some(url) = source.url.as_deref() {
                if let Some(host) = url_host(url) {
                    if !source.name.to_lowercase().contains(&host) {
                        name = format!("{} ({})", source.name, host);
                    }
                }
            }
        }
        SourceKind::Image => name = format!("{} (Image Upload)", source.name),
        SourceKind::MultiImage => name = format!("{} (Multi-Image Upload)", source.name),
        _ => {}
    }

    SourceInfo {
        name,
        url: source.url.clone(),
    }
}

fn url_host(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    if host.is_empty() {
        None
    } else {
        Some(host.to_lowercase())
    }
}

//! # Recipe Segmentation Parser
//!
//! This module splits a raw text blob (already extracted from an image,
//! web page or email by a collaborator) into candidate recipe sections and
//! pulls a name, ingredient lines, instructions and scalar metadata out of
//! each section.
//!
//! ## Features
//!
//! - Section splitting on the first applicable separator of an ordered list
//! - Header-delimited ingredient and instruction blocks with layered
//!   fallbacks (numbered steps, cooking-verb lines, measurement-word scan)
//! - Priority-ordered metadata patterns for prep/cook/total time, servings
//!   and difficulty
//! - Additive confidence scoring clamped to [0, 1]
//!
//! ## Usage
//!
//! ```rust
//! use recipe_ingestion::recipe_parser::RecipeParser;
//!
//! let parser = RecipeParser::new();
//! let text = "Pancakes\n\nIngredients:\n2 cups flour\n1 cup milk\n\nInstructions:\n1. Mix everything.\n2. Fry until golden.";
//! let recipes = parser.parse_recipes(text);
//!
//! assert_eq!(recipes.len(), 1);
//! assert_eq!(recipes[0].name, "Pancakes");
//! ```

use crate::models::RecipeMetadata;
use lazy_static::lazy_static;
use log::{debug, info};
use regex::Regex;

/// Sentinel name for a section with no recognizable title line
pub const UNTITLED_RECIPE: &str = "Untitled Recipe";

/// Sentinel text for a section with no recognizable instructions
pub const INSTRUCTIONS_NOT_FOUND: &str = "Instructions not found";

lazy_static! {
    /// Candidate section separators, most common first. Only the first
    /// pattern that appears anywhere in the text is applied.
    static ref SECTION_SEPARATORS: Vec<Regex> = vec![
        Regex::new(r"\n\s*\n\s*\n").expect("blank line separator should be valid"),
        Regex::new(r"\n\s*[-=*]+\s*\n").expect("rule line separator should be valid"),
        Regex::new(r"\n\s*Recipe\s+\d+").expect("numbered recipe separator should be valid"),
        Regex::new(r"\n\s*INGREDIENTS\s*\n").expect("ingredients header separator should be valid"),
    ];

    static ref INGREDIENTS_BLOCK: Regex = Regex::new(
        r"(?si)ingredients?[:\s]*\n(.*?)(?:\n\s*(?:instructions?|directions?|method|preparation|serves|yield|nutrition|additional)|\z)"
    )
    .expect("ingredients block pattern should be valid");

    static ref INGREDIENTS_BLOCK_NUMBERED: Regex = Regex::new(
        r"(?si)ingredients?[:\s]*\n(.*?)\n\s*\d+\."
    )
    .expect("numbered ingredients block pattern should be valid");

    static ref INSTRUCTION_BLOCKS: Vec<Regex> = vec![
        Regex::new(r"(?si)instructions?[:\s]*\n(.*?)(?:\n\s*(?:serves|yield|nutrition|additional)|\z)")
            .expect("instructions block pattern should be valid"),
        Regex::new(r"(?si)directions?[:\s]*\n(.*?)(?:\n\s*(?:serves|yield|nutrition|additional)|\z)")
            .expect("directions block pattern should be valid"),
        Regex::new(r"(?si)method[:\s]*\n(.*?)(?:\n\s*(?:serves|yield|nutrition|additional)|\z)")
            .expect("method block pattern should be valid"),
    ];

    static ref NUMBERED_STEP: Regex =
        Regex::new(r"^\s*\d+\.\s*(.*)").expect("numbered step pattern should be valid");

    /// Bullet markers and "N. " enumeration at the start of a line
    static ref LINE_PREFIX: Regex =
        Regex::new(r"^(?:[•▢*\-]\s*|\d+\.\s+)+").expect("line prefix pattern should be valid");

    static ref CONTAINS_DIGIT: Regex = Regex::new(r"\d").expect("digit pattern should be valid");

    static ref PREP_TIME_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)prep(?:aration)?\s*time[:\s]*(\d+)\s*(?:min|minutes?)")
            .expect("prep time pattern should be valid"),
        Regex::new(r"(?i)prep[:\s]*(\d+)\s*(?:min|minutes?)")
            .expect("prep pattern should be valid"),
        Regex::new(r"(?i)preparation[:\s]*(\d+)\s*(?:min|minutes?)")
            .expect("preparation pattern should be valid"),
    ];

    static ref COOK_TIME_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)cook(?:ing)?\s*time[:\s]*(\d+)\s*(?:min|minutes?)")
            .expect("cook time pattern should be valid"),
        Regex::new(r"(?i)cook[:\s]*(\d+)\s*(?:min|minutes?)")
            .expect("cook pattern should be valid"),
        Regex::new(r"(?i)bake[:\s]*(\d+)\s*(?:min|minutes?)")
            .expect("bake pattern should be valid"),
    ];

    static ref TOTAL_TIME_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)total\s*time[:\s]*(\d+)\s*(?:min|minutes?)")
            .expect("total time pattern should be valid"),
        Regex::new(r"(?i)total[:\s]*(\d+)\s*(?:min|minutes?)")
            .expect("total pattern should be valid"),
    ];

    static ref SERVINGS_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)serves[:\s]*(\d+)").expect("serves pattern should be valid"),
        Regex::new(r"(?i)servings[:\s]*(\d+)").expect("servings pattern should be valid"),
        Regex::new(r"(?i)yield[:\s]*(\d+)").expect("yield pattern should be valid"),
        Regex::new(r"(?i)makes[:\s]*(\d+)").expect("makes pattern should be valid"),
    ];

    static ref DIFFICULTY_PATTERN: Regex =
        Regex::new(r"(?i)difficulty[:\s]*(easy|medium|hard|difficult)")
            .expect("difficulty pattern should be valid");
}

/// Words that mark a line as a measurement-bearing ingredient candidate
const MEASUREMENT_WORDS: &[&str] = &[
    "cup", "tbsp", "tsp", "oz", "lb", "gram", "pound", "ounce", "teaspoon", "tablespoon",
];

const COOKING_VERBS: &[&str] = &[
    "preheat", "bake", "cook", "mix", "stir", "add", "combine", "heat", "pour", "place", "cover",
    "simmer", "boil", "fry", "grill",
];

/// Section headers a title line must not start with
const SECTION_KEYWORDS: &[&str] = &["ingredients", "instructions", "directions", "prep", "cook"];

const PLACEHOLDER_NAMES: &[&str] = &["no name", "untitled"];

/// Headers the whole-text ingredient fallback skips over
const FALLBACK_SKIP_PREFIXES: &[&str] = &[
    "instructions",
    "directions",
    "method",
    "prep",
    "cook",
    "serves",
    "additional",
];

/// Headers the cooking-verb instruction fallback skips over
const VERB_LINE_SKIP_PREFIXES: &[&str] = &["ingredients", "serves", "prep", "cook", "total"];

/// Thresholds for section and field acceptance
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Sections shorter than this are discarded as noise
    pub min_section_length: usize,
    /// Captured instruction spans must exceed this length
    pub min_instruction_length: usize,
    /// Title candidates must stay under this length
    pub max_name_length: usize,
    /// How many leading non-empty lines are scanned for a title
    pub name_scan_lines: usize,
    /// Fallback ingredient candidates must stay under this length
    pub max_ingredient_line_length: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            min_section_length: 50,
            min_instruction_length: 10,
            max_name_length: 100,
            name_scan_lines: 5,
            max_ingredient_line_length: 200,
        }
    }
}

/// A parsed recipe section before persistence
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRecipeDraft {
    pub name: String,
    /// Raw ingredient lines, bullet/number prefixes stripped
    pub ingredient_lines: Vec<String>,
    pub instructions: String,
    pub metadata: RecipeMetadata,
    /// Extraction quality, within [0, 1]
    pub confidence: f64,
}

/// Parser that segments raw text into extracted recipe drafts
pub struct RecipeParser {
    config: ParserConfig,
}

impl RecipeParser {
    pub fn new() -> Self {
        Self {
            config: ParserConfig::default(),
        }
    }

    pub fn with_config(config: ParserConfig) -> Self {
        Self { config }
    }

    /// Parse all recipes out of a raw text blob
    pub fn parse_recipes(&self, text: &str) -> Vec<ExtractedRecipeDraft> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let sections = self.split_into_sections(text);
        debug!("Split text into {} candidate sections", sections.len());

        let recipes: Vec<ExtractedRecipeDraft> = sections
            .iter()
            .filter_map(|section| self.parse_section(section))
            .collect();

        info!("Parsed {} recipes from text", recipes.len());
        recipes
    }

    /// Split text into candidate recipe sections
    ///
    /// The separator list is ordered; the first pattern that appears
    /// anywhere in the text is the one applied, the rest are ignored.
    fn split_into_sections(&self, text: &str) -> Vec<String> {
        let sections: Vec<&str> = match SECTION_SEPARATORS
            .iter()
            .find(|separator| separator.is_match(text))
        {
            Some(separator) => separator.split(text).collect(),
            None => vec![text],
        };

        sections
            .into_iter()
            .map(str::trim)
            .filter(|section| section.chars().count() > self.config.min_section_length)
            .map(str::to_string)
            .collect()
    }

    /// Parse a single section, discarding it when no ingredients or
    /// instructions can be found
    fn parse_section(&self, section: &str) -> Option<ExtractedRecipeDraft> {
        let name = self.extract_name(section);
        let ingredient_lines = self.extract_ingredient_lines(section);
        let instructions = self.extract_instructions(section);
        let metadata = self.extract_metadata(section);

        if ingredient_lines.is_empty() || instructions.is_empty() {
            debug!("Discarding section with no usable ingredients or instructions");
            return None;
        }

        let confidence = self.calculate_confidence(&name, &ingredient_lines, &instructions);

        Some(ExtractedRecipeDraft {
            name,
            ingredient_lines,
            instructions,
            metadata,
            confidence,
        })
    }

    /// Scan the first few non-empty lines for something title-shaped
    fn extract_name(&self, section: &str) -> String {
        for line in section
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .take(self.config.name_scan_lines)
        {
            if line.chars().count() >= self.config.max_name_length {
                continue;
            }
            let lowered = line.to_lowercase();
            let is_header = SECTION_KEYWORDS
                .iter()
                .any(|keyword| lowered.starts_with(keyword));
            let is_placeholder = PLACEHOLDER_NAMES
                .iter()
                .any(|placeholder| lowered.starts_with(placeholder));
            if !is_header && !is_placeholder {
                return line.to_string();
            }
        }
        UNTITLED_RECIPE.to_string()
    }

    /// Extract the ingredient-line list of a section
    ///
    /// Prefers a header-delimited ingredients block; when no header is
    /// present, falls back to scanning every line for measurement words or
    /// digits.
    fn extract_ingredient_lines(&self, section: &str) -> Vec<String> {
        let mut lines = Vec::new();

        let block = INGREDIENTS_BLOCK
            .captures(section)
            .or_else(|| INGREDIENTS_BLOCK_NUMBERED.captures(section));
        if let Some(caps) = block {
            for line in caps[1].lines() {
                if let Some(cleaned) = clean_ingredient_line(line) {
                    lines.push(cleaned);
                }
            }
        }

        if !lines.is_empty() {
            return lines;
        }

        // No header found: keep lines that look like ingredients
        for line in section.lines() {
            let line = line.trim();
            if line.is_empty() || line.chars().count() >= self.config.max_ingredient_line_length {
                continue;
            }
            let lowered = line.to_lowercase();
            if FALLBACK_SKIP_PREFIXES
                .iter()
                .any(|prefix| lowered.starts_with(prefix))
            {
                continue;
            }
            let has_measurement = MEASUREMENT_WORDS
                .iter()
                .any(|word| lowered.contains(word));
            if !has_measurement && !CONTAINS_DIGIT.is_match(line) {
                continue;
            }
            if let Some(cleaned) = clean_ingredient_line(line) {
                lines.push(cleaned);
            }
        }

        lines
    }

    /// Extract cooking instructions from a section
    fn extract_instructions(&self, section: &str) -> String {
        for pattern in INSTRUCTION_BLOCKS.iter() {
            if let Some(caps) = pattern.captures(section) {
                let instructions = caps[1].trim();
                if instructions.chars().count() > self.config.min_instruction_length {
                    return instructions.to_string();
                }
            }
        }

        // No header matched: concatenate numbered steps
        let steps: Vec<&str> = section
            .lines()
            .filter_map(|line| NUMBERED_STEP.captures(line))
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().trim())
            .filter(|step| !step.is_empty())
            .collect();
        if !steps.is_empty() {
            let instructions = steps.join("\n");
            if instructions.chars().count() > self.config.min_instruction_length {
                return instructions;
            }
        }

        // Last resort: lines that contain recognized cooking verbs
        let verb_lines: Vec<&str> = section
            .lines()
            .map(str::trim)
            .filter(|line| line.chars().count() > self.config.min_instruction_length)
            .filter(|line| {
                let lowered = line.to_lowercase();
                COOKING_VERBS.iter().any(|verb| lowered.contains(verb))
                    && !VERB_LINE_SKIP_PREFIXES
                        .iter()
                        .any(|prefix| lowered.starts_with(prefix))
            })
            .collect();
        if !verb_lines.is_empty() {
            return verb_lines.join("\n");
        }

        INSTRUCTIONS_NOT_FOUND.to_string()
    }

    /// Scan a section for prep/cook/total time, servings and difficulty
    fn extract_metadata(&self, section: &str) -> RecipeMetadata {
        RecipeMetadata {
            prep_time: first_number(&PREP_TIME_PATTERNS, section),
            cook_time: first_number(&COOK_TIME_PATTERNS, section),
            total_time: first_number(&TOTAL_TIME_PATTERNS, section),
            servings: first_number(&SERVINGS_PATTERNS, section),
            difficulty: DIFFICULTY_PATTERN
                .captures(section)
                .map(|caps| caps[1].to_lowercase()),
            ..Default::default()
        }
    }

    /// Confidence is additive over the three extracted parts, clamped to
    /// [0, 1]: a real name is worth 0.2, each ingredient line 0.1 up to
    /// 0.4, each instruction word 0.02 up to 0.4.
    fn calculate_confidence(
        &self,
        name: &str,
        ingredient_lines: &[String],
        instructions: &str,
    ) -> f64 {
        let mut confidence = 0.0;

        if name != UNTITLED_RECIPE {
            confidence += 0.2;
        }

        if !ingredient_lines.is_empty() {
            confidence += (ingredient_lines.len() as f64 * 0.1).min(0.4);
        }

        if instructions != INSTRUCTIONS_NOT_FOUND {
            let word_count = instructions.split_whitespace().count();
            confidence += (word_count as f64 * 0.02).min(0.4);
        }

        confidence.clamp(0.0, 1.0)
    }
}

impl Default for RecipeParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip bullet markers and "N." enumeration, keeping the rest verbatim
fn clean_ingredient_line(line: &str) -> Option<String> {
    let trimmed = line.trim();
    let cleaned = LINE_PREFIX.replace(trimmed, "");
    let cleaned = cleaned.trim();
    if cleaned.chars().count() > 2 {
        Some(cleaned.to_string())
    } else {
        None
    }
}

fn first_number(patterns: &[Regex], text: &str) -> Option<u32> {
    patterns
        .iter()
        .find_map(|pattern| pattern.captures(text))
        .and_then(|caps| caps[1].parse().ok())
}

//! # Ingredient Normalizer
//!
//! This module turns one free-text ingredient line into structured data:
//! ingredient name, quantity, unit, preparation method and a confidence
//! score. Parsing runs a fixed-precedence rule cascade (fractions, ranges,
//! sized eggs, plain units, count units) defined in
//! [`crate::quantity_rules`].
//!
//! Normalization is backed by a persistent raw-text mapping cache: a line
//! that was normalized once is answered from the cache without re-parsing,
//! so repeated ingestion of identical text is stable and cheap.
//!
//! ## Usage
//!
//! ```rust
//! use recipe_ingestion::ingredient_normalizer::parse_ingredient_line;
//!
//! let parsed = parse_ingredient_line("2 cups all-purpose flour").unwrap();
//! assert_eq!(parsed.name, "all-purpose flour");
//! assert_eq!(parsed.unit.as_deref(), Some("cups"));
//! ```

use crate::db;
use crate::quantity_rules::{
    singular_unit_name, FRACTION_PATTERN, NOISE_TOKENS, PREPARATION_PATTERN, QUANTITY_RULES,
    RuleKind,
};
use anyhow::Result;
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

/// Lines shorter than this are rejected as noise
pub const MIN_INGREDIENT_LENGTH: usize = 3;

/// Residual ingredient names shorter than this invalidate the parse
pub const MIN_NAME_LENGTH: usize = 2;

/// Base confidence for any successful parse
const BASE_CONFIDENCE: f64 = 0.5;

lazy_static! {
    static ref WHITESPACE_RUN: Regex =
        Regex::new(r"\s+").expect("whitespace pattern should be valid");
    static ref EDGE_NOISE: Regex =
        Regex::new(r"^[,\s•▢]+|[,\s•▢]+$").expect("edge noise pattern should be valid");
}

/// Structured view of one parsed ingredient line
///
/// The unit is the word as matched in the text ("cups", "large"); it is
/// normalized to its canonical singular form when resolved against the
/// unit table.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedIngredient {
    pub name: String,
    pub quantity: Option<Decimal>,
    pub unit: Option<String>,
    pub preparation: String,
    pub confidence: f64,
}

/// An ingredient line resolved against the reference tables
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedIngredient {
    pub ingredient_id: i64,
    pub ingredient_name: String,
    pub quantity: Option<Decimal>,
    pub unit_id: Option<i64>,
    pub unit_name: Option<String>,
    pub preparation: String,
    pub confidence: f64,
}

/// Reasons an ingredient line fails to parse
#[derive(Debug, Clone, PartialEq)]
pub enum ParseRejection {
    /// Below the minimum length or a known noise token
    Noise,
    /// Quantity fraction with a zero denominator
    DivisionByZero,
    /// Nothing left over for the ingredient name
    EmptyName,
    /// A captured number failed to convert
    InvalidNumber,
}

impl fmt::Display for ParseRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseRejection::Noise => write!(f, "line is noise or too short"),
            ParseRejection::DivisionByZero => write!(f, "division by zero in fraction"),
            ParseRejection::EmptyName => write!(f, "no ingredient name left after parsing"),
            ParseRejection::InvalidNumber => write!(f, "invalid number format"),
        }
    }
}

impl std::error::Error for ParseRejection {}

/// Parse a single raw ingredient line into its components
///
/// The text is trimmed and lower-cased, quantity/unit are extracted by the
/// first matching rule of the cascade, the preparation method is the first
/// vocabulary hit, and the ingredient name is what remains once the
/// matched spans are removed.
pub fn parse_ingredient_line(raw_text: &str) -> Result<ParsedIngredient, ParseRejection> {
    let text = raw_text.trim().to_lowercase();

    if text.chars().count() < MIN_INGREDIENT_LENGTH || NOISE_TOKENS.contains(&text.as_str()) {
        return Err(ParseRejection::Noise);
    }

    let mut quantity: Option<Decimal> = None;
    let mut unit: Option<String> = None;
    let mut quantity_span: Option<(usize, usize)> = None;
    let mut egg_name: Option<String> = None;

    if let Some(caps) = FRACTION_PATTERN.captures(&text) {
        let numerator = decimal_group(&caps, 1)?;
        let denominator = decimal_group(&caps, 2)?;
        quantity = Some(
            numerator
                .checked_div(denominator)
                .ok_or(ParseRejection::DivisionByZero)?,
        );
        unit = Some(caps[3].to_string());
        quantity_span = caps.get(0).map(|m| (m.start(), m.end()));
    } else {
        for rule in QUANTITY_RULES.iter() {
            let Some(caps) = rule.pattern.captures(&text) else {
                continue;
            };
            match rule.kind {
                RuleKind::Range => {
                    let low = decimal_group(&caps, 1)?;
                    let high = decimal_group(&caps, 2)?;
                    quantity = Some((low + high) / Decimal::TWO);
                    unit = Some(caps[3].to_string());
                }
                RuleKind::SizedEgg => {
                    quantity = Some(decimal_group(&caps, 1)?);
                    unit = Some(caps[2].to_string());
                    egg_name = Some(caps[3].to_string());
                }
                RuleKind::Unit => {
                    quantity = Some(decimal_group(&caps, 1)?);
                    unit = Some(caps[2].to_string());
                }
            }
            quantity_span = caps.get(0).map(|m| (m.start(), m.end()));
            break;
        }
    }

    let preparation_match = PREPARATION_PATTERN.find(&text);
    let preparation = preparation_match
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    // The size rules capture the ingredient word directly; everything else
    // keeps the residual text once matched spans are cut out.
    let name = match egg_name {
        Some(name) => name,
        None => {
            let mut spans = Vec::new();
            if quantity.is_some() {
                if let Some(span) = quantity_span {
                    spans.push(span);
                }
            }
            if let Some(m) = preparation_match {
                spans.push((m.start(), m.end()));
            }
            cleanup_name(remove_spans(&text, spans))
        }
    };

    if name.is_empty() || name.chars().count() < MIN_NAME_LENGTH {
        return Err(ParseRejection::EmptyName);
    }

    let mut confidence = BASE_CONFIDENCE;
    if quantity.is_some() {
        confidence += 0.2;
    }
    if unit.is_some() {
        confidence += 0.2;
    }
    if !preparation.is_empty() {
        confidence += 0.1;
    }

    Ok(ParsedIngredient {
        name,
        quantity,
        unit,
        preparation,
        confidence,
    })
}

/// Normalizer with a persistent raw-text mapping cache
///
/// `normalize` checks the cache before parsing; on a successful first
/// parse it resolves the ingredient and unit reference rows and records a
/// new mapping so future identical text is answered without parsing.
pub struct IngredientNormalizer;

impl IngredientNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize raw ingredient text, returning `None` when unparseable
    pub fn normalize(
        &self,
        conn: &Connection,
        raw_text: &str,
    ) -> Result<Option<NormalizedIngredient>> {
        let key = raw_text.trim().to_lowercase();

        // The cache shortcut comes before any parsing
        if let Some(mapping) = db::find_ingredient_mapping(conn, &key)? {
            let ingredient_name = db::ingredient_name(conn, mapping.ingredient_id)?;
            let unit_name = match mapping.unit_id {
                Some(unit_id) => Some(db::unit_name(conn, unit_id)?),
                None => None,
            };
            return Ok(Some(NormalizedIngredient {
                ingredient_id: mapping.ingredient_id,
                ingredient_name,
                quantity: mapping.quantity,
                unit_id: mapping.unit_id,
                unit_name,
                preparation: mapping.preparation_method,
                confidence: mapping.confidence,
            }));
        }

        let parsed = match parse_ingredient_line(&key) {
            Ok(parsed) => parsed,
            Err(reason) => {
                debug!("Skipping ingredient line '{}': {}", raw_text, reason);
                return Ok(None);
            }
        };

        let ingredient_id = db::get_or_create_ingredient(conn, &parsed.name)?;

        let unit_name = parsed
            .unit
            .as_deref()
            .map(|unit| singular_unit_name(unit).to_string());
        let unit_id = match unit_name.as_deref() {
            Some(name) => Some(db::get_or_create_unit(conn, name)?),
            None => None,
        };

        db::create_ingredient_mapping(
            conn,
            &key,
            ingredient_id,
            parsed.quantity,
            unit_id,
            &parsed.preparation,
            parsed.confidence,
        )?;

        Ok(Some(NormalizedIngredient {
            ingredient_id,
            ingredient_name: parsed.name,
            quantity: parsed.quantity,
            unit_id,
            unit_name,
            preparation: parsed.preparation,
            confidence: parsed.confidence,
        }))
    }
}

impl Default for IngredientNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

fn decimal_group(caps: &regex::Captures<'_>, index: usize) -> Result<Decimal, ParseRejection> {
    Decimal::from_str(&caps[index]).map_err(|_| ParseRejection::InvalidNumber)
}

/// Cut the given byte spans out of `text`, merging overlaps first
fn remove_spans(text: &str, mut spans: Vec<(usize, usize)>) -> String {
    spans.sort_by_key(|span| span.0);
    let mut merged: Vec<(usize, usize)> = Vec::new();
    for span in spans {
        match merged.last_mut() {
            Some(last) if span.0 <= last.1 => last.1 = last.1.max(span.1),
            _ => merged.push(span),
        }
    }

    let mut result = String::with_capacity(text.len());
    let mut cursor = 0;
    for (start, end) in merged {
        result.push_str(&text[cursor..start]);
        cursor = end;
    }
    result.push_str(&text[cursor..]);
    result
}

fn cleanup_name(name: String) -> String {
    let collapsed = WHITESPACE_RUN.replace_all(name.trim(), " ");
    EDGE_NOISE.replace_all(&collapsed, "").to_string()
}

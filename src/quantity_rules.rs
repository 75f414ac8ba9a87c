//! # Quantity Rule Table
//!
//! Ordered, static recognition rules for ingredient quantities, units and
//! preparation methods. The cascade in [`QUANTITY_RULES`] is evaluated in
//! fixed sequence with first-match-wins semantics, so rule order carries
//! the precedence contract: ranges before sized eggs, sized eggs before
//! bare egg counts, plural units before singular units, and count-style
//! units last.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

/// How a matched rule's capture groups map onto quantity and unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// `N - M <unit>`: quantity is the arithmetic mean of N and M
    Range,
    /// `N large|medium|small egg(s)`: the size word becomes the unit and
    /// the captured egg word becomes the ingredient name
    SizedEgg,
    /// `N <unit>`: plain quantity + unit pair
    Unit,
}

/// One (matcher, extractor) entry of the quantity cascade
pub struct QuantityRule {
    pub kind: RuleKind,
    pub pattern: Regex,
}

// Plural and longer alternatives come first so a match always covers the
// whole unit word; a singular alternative matching inside its own plural
// would leave a stray "s" in the residual ingredient name.
const MEASURE_PLURALS: &str =
    "cups|tablespoons|teaspoons|ounces|pounds|grams|kilograms|milliliters|liters|tbsp|tsp|oz|lb|g|kg|ml|l";
const MEASURE_SINGULARS: &str =
    "cup|tablespoon|teaspoon|ounce|pound|gram|kilogram|milliliter|liter";
const COUNT_UNITS: &str =
    "slices|slice|cloves|clove|bunches|bunch|cans|can|jars|jar|packages|package";

lazy_static! {
    /// The ordered quantity cascade. Evaluated after [`FRACTION_PATTERN`],
    /// which always takes precedence.
    pub static ref QUANTITY_RULES: Vec<QuantityRule> = vec![
        QuantityRule {
            kind: RuleKind::Range,
            pattern: Regex::new(&format!(
                r"(\d+(?:\.\d+)?)\s*-\s*(\d+(?:\.\d+)?)\s*({MEASURE_PLURALS})"
            ))
            .expect("range (plural) pattern should be valid"),
        },
        QuantityRule {
            kind: RuleKind::Range,
            pattern: Regex::new(&format!(
                r"(\d+(?:\.\d+)?)\s*-\s*(\d+(?:\.\d+)?)\s*({MEASURE_SINGULARS})"
            ))
            .expect("range (singular) pattern should be valid"),
        },
        QuantityRule {
            kind: RuleKind::SizedEgg,
            pattern: Regex::new(r"(\d+(?:\.\d+)?)\s*(large|medium|small)\s+(eggs|egg)")
                .expect("sized egg pattern should be valid"),
        },
        QuantityRule {
            kind: RuleKind::Unit,
            pattern: Regex::new(r"(\d+)\s*(eggs|egg)").expect("egg count pattern should be valid"),
        },
        QuantityRule {
            kind: RuleKind::Unit,
            pattern: Regex::new(&format!(r"(\d+(?:\.\d+)?)\s*({MEASURE_PLURALS})"))
                .expect("plural unit pattern should be valid"),
        },
        QuantityRule {
            kind: RuleKind::Unit,
            pattern: Regex::new(&format!(r"(\d+(?:\.\d+)?)\s*({MEASURE_SINGULARS})"))
                .expect("singular unit pattern should be valid"),
        },
        QuantityRule {
            kind: RuleKind::Unit,
            pattern: Regex::new(&format!(r"(\d+(?:\.\d+)?)\s*({COUNT_UNITS})"))
                .expect("count unit pattern should be valid"),
        },
    ];

    /// Fraction form `N/M <unit>`, checked before the cascade
    pub static ref FRACTION_PATTERN: Regex = Regex::new(
        r"(\d+)/(\d+)\s*(cups|cup|tablespoons|tablespoon|tbsp|tbs|teaspoons|teaspoon|tsp|ounces|ounce|oz|pounds|pound|lb|grams|gram|kilograms|kilogram|kg|milliliters|milliliter|ml|liters|liter|l|g)"
    )
    .expect("fraction pattern should be valid");

    /// Fixed preparation-method vocabulary, first match wins
    pub static ref PREPARATION_PATTERN: Regex = Regex::new(
        r"(chopped|diced|minced|sliced|grated|crushed|drained|rinsed|peeled|seeded|stemmed|trimmed|melted)"
    )
    .expect("preparation pattern should be valid");

    /// Plural unit word -> canonical singular form
    static ref UNIT_SINGULARS: HashMap<&'static str, &'static str> = {
        let mut map = HashMap::new();
        map.insert("cups", "cup");
        map.insert("tablespoons", "tablespoon");
        map.insert("teaspoons", "teaspoon");
        map.insert("ounces", "ounce");
        map.insert("pounds", "pound");
        map.insert("grams", "gram");
        map.insert("kilograms", "kilogram");
        map.insert("milliliters", "milliliter");
        map.insert("liters", "liter");
        map.insert("slices", "slice");
        map.insert("cloves", "clove");
        map.insert("bunches", "bunch");
        map.insert("cans", "can");
        map.insert("jars", "jar");
        map.insert("packages", "package");
        map.insert("eggs", "egg");
        map
    };
}

/// Lines that are pure noise rather than malformed ingredients
pub const NOISE_TOKENS: &[&str] = &["•", "▢", "cup", "cups", "tbsp", "tsp"];

/// Normalize a unit word to its canonical singular form
///
/// Unrecognized unit text passes through unchanged, so abbreviations like
/// "tbsp" keep their written form.
pub fn singular_unit_name(unit: &str) -> &str {
    UNIT_SINGULARS.get(unit).copied().unwrap_or(unit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_order_puts_ranges_first() {
        // "1-2 cups" must hit the range rule, not the plural unit rule
        let text = "1-2 cups milk";
        let first_match = QUANTITY_RULES
            .iter()
            .find(|rule| rule.pattern.is_match(text))
            .unwrap();
        assert_eq!(first_match.kind, RuleKind::Range);
    }

    #[test]
    fn test_sized_egg_beats_bare_egg_count() {
        let text = "2 large eggs";
        let first_match = QUANTITY_RULES
            .iter()
            .find(|rule| rule.pattern.is_match(text))
            .unwrap();
        assert_eq!(first_match.kind, RuleKind::SizedEgg);
    }

    #[test]
    fn test_fraction_pattern_captures_unit() {
        let caps = FRACTION_PATTERN.captures("1/2 cup sugar").unwrap();
        assert_eq!(&caps[1], "1");
        assert_eq!(&caps[2], "2");
        assert_eq!(&caps[3], "cup");
    }

    #[test]
    fn test_singular_unit_table() {
        assert_eq!(singular_unit_name("cups"), "cup");
        assert_eq!(singular_unit_name("tablespoons"), "tablespoon");
        assert_eq!(singular_unit_name("eggs"), "egg");
        // Unmatched text passes through
        assert_eq!(singular_unit_name("tbsp"), "tbsp");
        assert_eq!(singular_unit_name("large"), "large");
    }

    #[test]
    fn test_preparation_vocabulary() {
        for word in [
            "chopped", "diced", "minced", "sliced", "grated", "crushed", "drained", "rinsed",
            "peeled", "seeded", "stemmed", "trimmed", "melted",
        ] {
            assert!(PREPARATION_PATTERN.is_match(word), "missing: {}", word);
        }
        assert!(!PREPARATION_PATTERN.is_match("fresh"));
    }
}

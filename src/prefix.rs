// ✂️ Prefix Canonicalizer - Strip statement boilerplate from concepts
//
// Itaú writes a purchase as "COMPRA <merchant>" and its VAT refund as
// "REDIVA 19210 <merchant>" (or the older 17934 code). Removing those
// prefixes gives the canonical concept used to join both halves.

use regex::Regex;
use std::sync::LazyLock;

/// Marker that identifies a tax-adjustment (REDIVA) prefix
pub const TAX_ADJUSTMENT_MARKER: &str = "REDIVA";

const PREFIX_SOURCES: [&str; 3] = [r"(?i)^compra +", r"(?i)^rediva 19210 *", r"(?i)^rediva 17934 *"];

/// Ordered patterns, first match wins. Case-insensitive, anchored at start.
/// The sources are literals; a test asserts every one of them compiles.
static PREFIX_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    PREFIX_SOURCES
        .into_iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
});

/// Result of canonicalizing one concept
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalConcept {
    /// Concept without prefix, trimmed. Equals the input when no prefix matched.
    pub concept_canonical: String,

    /// Matched prefix text exactly as it appears in the concept, or ""
    pub prefix: String,
}

/// Split a raw concept into (prefix, canonical concept). Never fails.
pub fn remove_prefix(concept: &str) -> CanonicalConcept {
    for pattern in PREFIX_PATTERNS.iter() {
        if let Some(m) = pattern.find(concept) {
            return CanonicalConcept {
                concept_canonical: concept[m.end()..].trim().to_string(),
                prefix: m.as_str().to_string(),
            };
        }
    }

    CanonicalConcept {
        concept_canonical: concept.to_string(),
        prefix: String::new(),
    }
}

/// True when a record's prefix marks it as a REDIVA tax adjustment
pub fn is_tax_adjustment(prefix: &str) -> bool {
    prefix
        .get(..TAX_ADJUSTMENT_MARKER.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(TAX_ADJUSTMENT_MARKER))
}

// ============================================================================
// TESTS
// ============================================================================

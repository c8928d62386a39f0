// 🏷️ Classification Rules - Rules as Data
// Bank-specific ordered rule tables: first match wins, default is COMPRA.
//
// Adding a bank or a rule means adding rows to the table (or to a rules JSON
// file), never touching classify().

use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::model::{Bank, TransactionType};

// ============================================================================
// RULE DEFINITION
// ============================================================================

/// How a rule looks at the (lowercased) concept
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Matcher {
    Prefix(String),
    Contains(String),
}

impl Matcher {
    fn lowercased(self) -> Self {
        match self {
            Matcher::Prefix(p) => Matcher::Prefix(p.to_lowercase()),
            Matcher::Contains(p) => Matcher::Contains(p.to_lowercase()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRule {
    /// Bank whose concepts this rule applies to
    pub bank: Bank,

    pub matcher: Matcher,

    /// Type assigned on match
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
}

impl ClassificationRule {
    pub fn prefix(bank: Bank, pattern: &str, transaction_type: TransactionType) -> Self {
        ClassificationRule {
            bank,
            matcher: Matcher::Prefix(pattern.to_lowercase()),
            transaction_type,
        }
    }

    pub fn contains(bank: Bank, pattern: &str, transaction_type: TransactionType) -> Self {
        ClassificationRule {
            bank,
            matcher: Matcher::Contains(pattern.to_lowercase()),
            transaction_type,
        }
    }

    /// `concept_lower` must already be lowercased
    pub fn matches(&self, concept_lower: &str) -> bool {
        match &self.matcher {
            Matcher::Prefix(p) => concept_lower.starts_with(p.as_str()),
            Matcher::Contains(p) => concept_lower.contains(p.as_str()),
        }
    }
}

/// Built-in tables, in evaluation order per bank
fn builtin_rules() -> Vec<ClassificationRule> {
    use Bank::*;
    use TransactionType::*;

    vec![
        // Itaú
        ClassificationRule::prefix(Itau, "compra", Compra),
        ClassificationRule::prefix(Itau, "rediva", Compra),
        ClassificationRule::prefix(Itau, "traspaso", Transferencia),
        ClassificationRule::prefix(Itau, "cre. cambio", Transferencia),
        ClassificationRule::prefix(Itau, "deb. cambio", Transferencia),
        ClassificationRule::prefix(Itau, "deb. varios", Inversion),
        ClassificationRule::prefix(Itau, "cre. varios", Inversion),
        ClassificationRule::prefix(Itau, "cre.varios", Inversion),
        // Scotiabank
        ClassificationRule::prefix(Scotiabank, "com giro", Transferencia),
        ClassificationRule::prefix(Scotiabank, "giro rec", Transferencia),
        ClassificationRule::contains(Scotiabank, "/trn/", Transferencia),
        ClassificationRule::prefix(Scotiabank, "cambio moneda", CambioMoneda),
        // Santander ("cjppu" = pago caja profesionales)
        ClassificationRule::contains(Santander, "cjppu", Compra),
        ClassificationRule::prefix(Santander, "debito operacion en supernet o sms", Transferencia),
        ClassificationRule::prefix(Santander, "credito por operacion", Transferencia),
    ]
}

// ============================================================================
// RULE ENGINE
// ============================================================================

pub struct RuleEngine {
    rules: Vec<ClassificationRule>,
}

impl RuleEngine {
    /// Engine with the built-in tables only
    pub fn new() -> Self {
        RuleEngine {
            rules: builtin_rules(),
        }
    }

    /// Built-in tables followed by extra rules (evaluated after the built-ins)
    pub fn with_extra_rules(extra: Vec<ClassificationRule>) -> Self {
        let mut engine = RuleEngine::new();
        for rule in extra {
            engine.add_rule(rule);
        }
        engine
    }

    /// Load extra rules from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read rules file: {:?}", path.as_ref()))?;

        let extra: Vec<ClassificationRule> =
            serde_json::from_str(&content).context("Failed to parse rules JSON")?;

        tracing::info!("Loaded {} extra classification rules", extra.len());
        Ok(RuleEngine::with_extra_rules(extra))
    }

    /// Append a rule at the end of its bank's table
    pub fn add_rule(&mut self, rule: ClassificationRule) {
        self.rules.push(ClassificationRule {
            matcher: rule.matcher.lowercased(),
            ..rule
        });
    }

    /// Classify a raw concept for a bank. No match → COMPRA.
    pub fn classify(&self, concept: &str, bank: Bank) -> TransactionType {
        let concept_lower = concept.to_lowercase();

        self.rules
            .iter()
            .filter(|rule| rule.bank == bank)
            .find(|rule| rule.matches(&concept_lower))
            .map(|rule| rule.transaction_type)
            .unwrap_or_default()
    }

    /// Get number of rules loaded
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

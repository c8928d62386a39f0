// ⚖️ Reconciliation Engine - Join REDIVA adjustments into their COMPRA
//
// Itaú reports a purchase and its VAT refund (REDIVA) as two lines on the
// same day with the same canonical concept:
//
//   05/03  COMPRA SUPERMERCADO          -1000
//   05/03  REDIVA 19210 SUPERMERCADO     -220
//
// becomes a single record: COMPRA SUPERMERCADO -1220.
//
// Each adjustment is consumed at most once. Unmatched adjustments are dropped
// (assumed to belong to a purchase outside the current batch).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::{info, warn};

use crate::model::ExpenseRecord;
use crate::prefix::is_tax_adjustment;

// ============================================================================
// ADJUSTMENT POOL
// ============================================================================

/// Multiset of adjustment records keyed by (canonical concept, date).
///
/// Each key holds a queue of indexes into the adjustment list, in list
/// order, so equal keys are consumed first-in first-out.
struct AdjustmentPool<'a> {
    adjustments: &'a [ExpenseRecord],
    available: HashMap<(String, NaiveDate), VecDeque<usize>>,
    consumed: Vec<bool>,
}

impl<'a> AdjustmentPool<'a> {
    fn new(adjustments: &'a [ExpenseRecord]) -> Self {
        let mut available: HashMap<(String, NaiveDate), VecDeque<usize>> = HashMap::new();
        for (idx, adjustment) in adjustments.iter().enumerate() {
            available
                .entry((adjustment.concept_canonical.clone(), adjustment.date))
                .or_default()
                .push_back(idx);
        }

        AdjustmentPool {
            adjustments,
            available,
            consumed: vec![false; adjustments.len()],
        }
    }

    /// Take the first unconsumed adjustment matching this candidate
    fn take_for(&mut self, candidate: &ExpenseRecord) -> Option<&'a ExpenseRecord> {
        let key = (candidate.concept_canonical.clone(), candidate.date);
        let idx = self.available.get_mut(&key)?.pop_front()?;
        self.consumed[idx] = true;
        Some(&self.adjustments[idx])
    }

    fn unconsumed(&self) -> Vec<ExpenseRecord> {
        self.adjustments
            .iter()
            .zip(&self.consumed)
            .filter(|(_, consumed)| !**consumed)
            .map(|(adjustment, _)| adjustment.clone())
            .collect()
    }
}

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Output records, in candidate order
    pub records: Vec<ExpenseRecord>,

    /// How many candidates absorbed an adjustment
    pub merged: usize,

    /// Candidates removed for being record-equal to an adjustment
    pub duplicates_removed: usize,

    /// Adjustments that found no candidate (not part of `records`)
    pub unmatched_adjustments: Vec<ExpenseRecord>,
}

impl ReconciliationReport {
    pub fn summary(&self) -> String {
        format!(
            "Reconciliation: {} records out, {} merged with REDIVA, {} unmatched REDIVA dropped, {} duplicates removed",
            self.records.len(),
            self.merged,
            self.unmatched_adjustments.len(),
            self.duplicates_removed
        )
    }
}

// ============================================================================
// RECONCILER
// ============================================================================

/// Merge REDIVA adjustment records into their matching purchase.
///
/// Input records are never modified; merged records are new values.
pub fn join_tax_adjustments(records: &[ExpenseRecord]) -> ReconciliationReport {
    let (adjustments, others): (Vec<&ExpenseRecord>, Vec<&ExpenseRecord>) =
        records.iter().partition(|r| is_tax_adjustment(&r.prefix));
    let adjustments: Vec<ExpenseRecord> = adjustments.into_iter().cloned().collect();

    let candidates: Vec<&ExpenseRecord> = others
        .iter()
        .copied()
        .filter(|candidate| !adjustments.iter().any(|a| a.record_eq(candidate)))
        .collect();
    let duplicates_removed = others.len() - candidates.len();

    let mut pool = AdjustmentPool::new(&adjustments);
    let mut merged = 0;

    let output: Vec<ExpenseRecord> = candidates
        .into_iter()
        .map(|candidate| match pool.take_for(candidate) {
            Some(adjustment) => {
                merged += 1;
                candidate.with_amount(candidate.amount + adjustment.amount)
            }
            None => candidate.clone(),
        })
        .collect();

    let unmatched_adjustments = pool.unconsumed();
    for adjustment in &unmatched_adjustments {
        warn!(
            concept = adjustment.concept.as_str(),
            date = %adjustment.date,
            amount = adjustment.amount,
            "dropping REDIVA without matching purchase in this batch"
        );
    }

    let report = ReconciliationReport {
        records: output,
        merged,
        duplicates_removed,
        unmatched_adjustments,
    };

    info!("{}", report.summary());
    report
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Bank, Currency, TransactionType};
    use crate::prefix::remove_prefix;

    fn record(day: u32, concept: &str, amount: f64) -> ExpenseRecord {
        let canonical = remove_prefix(concept);
        ExpenseRecord {
            date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            amount,
            concept: concept.to_string(),
            concept_canonical: canonical.concept_canonical,
            prefix: canonical.prefix,
            bank: Bank::Itau,
            currency: Currency::Uyu,
            transaction_type: TransactionType::Compra,
            id: None,
        }
    }

    #[test]
    fn test_compra_and_rediva_merge() {
        let input = vec![
            record(5, "COMPRA SUPERMERCADO", -1000.0),
            record(5, "REDIVA 19210 SUPERMERCADO", -220.0),
        ];

        let report = join_tax_adjustments(&input);

        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].concept, "COMPRA SUPERMERCADO");
        assert_eq!(report.records[0].amount, -1220.0);
        assert_eq!(report.merged, 1);
        assert!(report.unmatched_adjustments.is_empty());

        // Inputs untouched
        assert_eq!(input[0].amount, -1000.0);

        println!("✅ COMPRA + REDIVA merge test PASSED");
    }

    #[test]
    fn test_unmatched_rediva_is_dropped() {
        let input = vec![
            record(5, "COMPRA FARMACIA", -500.0),
            record(6, "REDIVA 19210 SUPERMERCADO", -220.0),
        ];

        let report = join_tax_adjustments(&input);

        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].amount, -500.0);
        assert!(report.records.iter().all(|r| !r.concept.starts_with("REDIVA")));
        assert_eq!(report.unmatched_adjustments.len(), 1);
    }

    #[test]
    fn test_rediva_on_other_day_does_not_match() {
        let input = vec![
            record(5, "COMPRA SUPERMERCADO", -1000.0),
            record(6, "REDIVA 19210 SUPERMERCADO", -220.0),
        ];

        let report = join_tax_adjustments(&input);
        assert_eq!(report.records[0].amount, -1000.0);
        assert_eq!(report.merged, 0);
    }

    #[test]
    fn test_each_rediva_consumed_once_in_list_order() {
        let input = vec![
            record(5, "COMPRA SUPERMERCADO", -1000.0),
            record(5, "REDIVA 19210 SUPERMERCADO", -220.0),
            record(5, "COMPRA SUPERMERCADO", -500.0),
            record(5, "REDIVA 19210 SUPERMERCADO", -110.0),
            record(5, "COMPRA SUPERMERCADO", -50.0),
        ];

        let report = join_tax_adjustments(&input);

        let amounts: Vec<f64> = report.records.iter().map(|r| r.amount).collect();
        assert_eq!(amounts, vec![-1220.0, -610.0, -50.0]);
        assert_eq!(report.merged, 2);
    }

    #[test]
    fn test_both_rediva_codes_are_adjustments() {
        let input = vec![
            record(5, "COMPRA KIOSCO", -100.0),
            record(5, "REDIVA 17934 KIOSCO", -22.0),
        ];

        let report = join_tax_adjustments(&input);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].amount, -122.0);
    }

    #[test]
    fn test_non_purchase_records_pass_through_in_order() {
        let input = vec![
            record(1, "TRASPASO A 123", -3000.0),
            record(2, "COMPRA PANADERIA", -80.0),
            record(3, "CRE. VARIOS FONDO", 150.0),
        ];

        let report = join_tax_adjustments(&input);
        let concepts: Vec<&str> = report.records.iter().map(|r| r.concept.as_str()).collect();
        assert_eq!(concepts, vec!["TRASPASO A 123", "COMPRA PANADERIA", "CRE. VARIOS FONDO"]);
        assert_eq!(report.duplicates_removed, 0);
    }

    #[test]
    fn test_candidate_equal_to_adjustment_is_removed() {
        let adjustment = record(5, "REDIVA 19210 SUPERMERCADO", -220.0);
        // Same amount/bank/concept/date but without a detected prefix
        let mut shadow = adjustment.clone();
        shadow.prefix = String::new();

        let report = join_tax_adjustments(&[shadow, adjustment]);
        assert_eq!(report.duplicates_removed, 1);
        assert!(report.records.is_empty());
    }

    #[test]
    fn test_output_never_exceeds_candidates() {
        let input = vec![
            record(5, "REDIVA 19210 A", -1.0),
            record(5, "REDIVA 19210 B", -1.0),
            record(5, "COMPRA A", -10.0),
        ];

        let report = join_tax_adjustments(&input);
        assert!(report.records.len() <= 1);
    }

    #[test]
    fn test_empty_input() {
        let report = join_tax_adjustments(&[]);
        assert!(report.records.is_empty());
        assert_eq!(report.merged, 0);
    }
}

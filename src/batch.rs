// ⚙️ Batch Classification Runner
// Applies a classifier across a collection; per-record failures never abort the batch

use crate::classifier::Classifier;
use crate::transaction::{LabeledTransaction, RiskLabel, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

// ============================================================================
// RESULTS
// ============================================================================

/// A record the runner could not label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFailure {
    pub transaction_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Successfully labeled records, in input order
    pub labeled: Vec<LabeledTransaction>,
    /// Rejected records, reported separately from successes
    pub failures: Vec<RecordFailure>,
}

impl BatchOutcome {
    pub fn processed(&self) -> usize {
        self.labeled.len() + self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Count of labeled records per label, in Low/Medium/High order
    pub fn label_counts(&self) -> [(RiskLabel, usize); 3] {
        let mut counts = [0usize; 3];
        for tx in &self.labeled {
            counts[tx.risk_label.index()] += 1;
        }
        [
            (RiskLabel::Low, counts[0]),
            (RiskLabel::Medium, counts[1]),
            (RiskLabel::High, counts[2]),
        ]
    }

    pub fn summary(&self) -> String {
        let counts = self.label_counts();
        format!(
            "Processed: {}, Labeled: {} (Low {}, Medium {}, High {}), Failed: {}",
            self.processed(),
            self.labeled.len(),
            counts[0].1,
            counts[1].1,
            counts[2].1,
            self.failures.len()
        )
    }
}

// ============================================================================
// RUNNER
// ============================================================================

pub struct BatchRunner<C: Classifier> {
    classifier: C,
}

impl<C: Classifier> BatchRunner<C> {
    pub fn new(classifier: C) -> Self {
        BatchRunner { classifier }
    }

    /// Classify every transaction of a slice
    pub fn run(&self, transactions: &[Transaction]) -> BatchOutcome {
        self.run_iter(transactions.iter().cloned())
    }

    /// Classify any sequence of transactions, consuming it
    pub fn run_iter<I>(&self, transactions: I) -> BatchOutcome
    where
        I: IntoIterator<Item = Transaction>,
    {
        let mut outcome = BatchOutcome::default();
        let mut seen_ids: HashSet<String> = HashSet::new();

        for tx in transactions {
            if !seen_ids.insert(tx.id.clone()) {
                debug!(transaction_id = %tx.id, "duplicate transaction id in batch");
                outcome.failures.push(RecordFailure {
                    transaction_id: tx.id,
                    reason: "duplicate transaction id".to_string(),
                });
                continue;
            }

            match self.classifier.assess(&tx) {
                Ok(assessment) => outcome.labeled.push(LabeledTransaction::new(tx, assessment)),
                Err(err) => {
                    debug!(transaction_id = %tx.id, error = %err, "record skipped");
                    outcome.failures.push(RecordFailure {
                        transaction_id: tx.id,
                        reason: err.reason(),
                    });
                }
            }
        }

        if outcome.failures.is_empty() {
            info!("{}", outcome.summary());
        } else {
            warn!("{}", outcome.summary());
        }

        outcome
    }
}

// ============================================================================
// TESTS
// ============================================================================

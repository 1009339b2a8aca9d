// 🎲 Synthetic Dataset Generator
// Seeded customers / transactions / payments CSVs with a sprinkle of duplicate rows

use crate::config::GeneratorConfig;
use crate::ingest::{RawCustomer, RawDataset, RawPayment, RawTransaction, CUSTOMERS_FILE, PAYMENTS_FILE, TRANSACTIONS_FILE};
use anyhow::{bail, Context, Result};
use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::path::Path;
use tracing::info;

pub const SECTORS: [&str; 5] = ["Manufacturing", "Retail", "Services", "Technology", "Logistics"];
pub const COUNTRIES: [&str; 5] = ["PL", "TR", "DE", "FR", "NL"];

const TXN_TYPES: [(&str, f64); 2] = [("SALE", 0.6), ("PURCHASE", 0.4)];
const CURRENCIES: [(&str, f64); 3] = [("PLN", 0.75), ("EUR", 0.15), ("USD", 0.10)];

// Log-normal amount parameters (of the underlying normal)
const AMOUNT_MU: f64 = 10.3;
const AMOUNT_SIGMA: f64 = 0.7;

const DUE_DAYS: std::ops::Range<i64> = 7..61;
const PAYMENT_DELAY: std::ops::Range<i64> = -5..61;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct DataGenerator {
    config: GeneratorConfig,
    rng: StdRng,
}

impl DataGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        DataGenerator { config, rng }
    }

    /// Build the full raw dataset in memory
    pub fn generate(&mut self) -> Result<RawDataset> {
        let start = NaiveDate::parse_from_str(&self.config.start_date, DATE_FORMAT)
            .with_context(|| format!("Invalid start_date: {}", self.config.start_date))?;
        let end = NaiveDate::parse_from_str(&self.config.end_date, DATE_FORMAT)
            .with_context(|| format!("Invalid end_date: {}", self.config.end_date))?;
        if end <= start {
            bail!("end_date {} must be after start_date {}", end, start);
        }
        if self.config.customers == 0 {
            bail!("generator needs at least one customer");
        }

        let customers = self.customers();
        let mut transactions = self.transactions(start, (end - start).num_days());

        // Duplicate a sample of existing rows verbatim
        let dup_n = (self.config.duplicate_rate * transactions.len() as f64) as usize;
        let dups: Vec<RawTransaction> = transactions
            .choose_multiple(&mut self.rng, dup_n)
            .cloned()
            .collect();
        transactions.extend(dups);

        let payments = self.payments(&transactions)?;

        Ok(RawDataset {
            customers,
            transactions,
            payments,
        })
    }

    fn customers(&mut self) -> Vec<RawCustomer> {
        let width = id_width(self.config.customers);
        (1..=self.config.customers)
            .map(|i| RawCustomer {
                customer_id: customer_id(i, width),
                customer_name: format!("Customer_{:03}", i),
                sector: Some(pick(&mut self.rng, &SECTORS).to_string()),
                country: Some(pick(&mut self.rng, &COUNTRIES).to_string()),
            })
            .collect()
    }

    fn transactions(&mut self, start: NaiveDate, days_range: i64) -> Vec<RawTransaction> {
        let width = id_width(self.config.customers);
        (1..=self.config.transactions)
            .map(|i| {
                let txn_date = start + Duration::days(self.rng.gen_range(0..days_range));
                let due_date = txn_date + Duration::days(self.rng.gen_range(DUE_DAYS));
                let amount = lognormal(&mut self.rng, AMOUNT_MU, AMOUNT_SIGMA);

                RawTransaction {
                    txn_id: i.to_string(),
                    customer_id: customer_id(self.rng.gen_range(1..=self.config.customers), width),
                    txn_date: txn_date.format(DATE_FORMAT).to_string(),
                    txn_type: weighted(&mut self.rng, &TXN_TYPES).to_string(),
                    amount: format!("{:.2}", amount),
                    currency: weighted(&mut self.rng, &CURRENCIES).to_string(),
                    due_date: due_date.format(DATE_FORMAT).to_string(),
                }
            })
            .collect()
    }

    /// One payment row per transaction row; unpaid rows leave date and amount empty
    fn payments(&mut self, transactions: &[RawTransaction]) -> Result<Vec<RawPayment>> {
        let mut payments = Vec::with_capacity(transactions.len());

        for (i, txn) in transactions.iter().enumerate() {
            let paid = self.rng.gen::<f64>() < self.config.paid_probability;
            let delay = self.rng.gen_range(PAYMENT_DELAY);

            let (payment_date, paid_amount) = if paid {
                let due = NaiveDate::parse_from_str(&txn.due_date, DATE_FORMAT)
                    .with_context(|| format!("Invalid due_date for txn {}", txn.txn_id))?;
                let amount: f64 = txn
                    .amount
                    .parse()
                    .with_context(|| format!("Invalid amount for txn {}", txn.txn_id))?;
                let ratio = self.rng.gen_range(0.85..1.0);
                (
                    Some((due + Duration::days(delay)).format(DATE_FORMAT).to_string()),
                    Some(format!("{:.2}", amount * ratio)),
                )
            } else {
                (None, None)
            };

            payments.push(RawPayment {
                payment_id: (i + 1).to_string(),
                txn_id: txn.txn_id.clone(),
                payment_date,
                paid_amount,
            });
        }

        Ok(payments)
    }
}

/// Zero-padded so customer ids sort numerically as strings
fn customer_id(n: usize, width: usize) -> String {
    format!("{:0width$}", n, width = width)
}

fn id_width(customers: usize) -> usize {
    customers.to_string().len().max(3)
}

fn pick<'a>(rng: &mut StdRng, options: &[&'a str]) -> &'a str {
    options[rng.gen_range(0..options.len())]
}

fn weighted<'a>(rng: &mut StdRng, options: &[(&'a str, f64)]) -> &'a str {
    let mut roll = rng.gen::<f64>();
    for (value, weight) in options {
        if roll < *weight {
            return *value;
        }
        roll -= weight;
    }
    options[options.len() - 1].0
}

/// Box-Muller standard normal, exponentiated
fn lognormal(rng: &mut StdRng, mu: f64, sigma: f64) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>(); // (0, 1]
    let u2: f64 = rng.gen::<f64>();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    (mu + sigma * z).exp()
}

fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create CSV file: {:?}", path))?;
    for row in rows {
        wtr.serialize(row)
            .with_context(|| format!("Failed to write row to {:?}", path))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write the three raw CSVs into `dir`, creating it if needed
pub fn write_dataset(dir: &Path, dataset: &RawDataset) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;

    write_rows(&dir.join(CUSTOMERS_FILE), &dataset.customers)?;
    write_rows(&dir.join(TRANSACTIONS_FILE), &dataset.transactions)?;
    write_rows(&dir.join(PAYMENTS_FILE), &dataset.payments)?;

    info!(
        customers = dataset.customers.len(),
        transactions = dataset.transactions.len(),
        payments = dataset.payments.len(),
        "wrote raw dataset to {:?}",
        dir
    );
    Ok(())
}

pub fn generate_to_dir(config: &GeneratorConfig, dir: &Path) -> Result<RawDataset> {
    let dataset = DataGenerator::new(config.clone()).generate()?;
    write_dataset(dir, &dataset)?;
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{load_raw_dataset, prepare_transactions};
    use std::collections::HashSet;

    fn small_config(seed: u64) -> GeneratorConfig {
        GeneratorConfig {
            seed,
            customers: 10,
            transactions: 400,
            duplicate_rate: 0.05,
            ..GeneratorConfig::default()
        }
    }

    #[test]
    fn test_same_seed_same_dataset() {
        let a = DataGenerator::new(small_config(7)).generate().unwrap();
        let b = DataGenerator::new(small_config(7)).generate().unwrap();
        assert_eq!(a.transactions, b.transactions);
        assert_eq!(a.payments, b.payments);

        let c = DataGenerator::new(small_config(8)).generate().unwrap();
        assert_ne!(a.transactions, c.transactions);
    }

    #[test]
    fn test_shape_and_ranges() {
        let data = DataGenerator::new(small_config(42)).generate().unwrap();

        assert_eq!(data.customers.len(), 10);
        assert_eq!(data.transactions.len(), 420);
        assert_eq!(data.payments.len(), data.transactions.len());

        let ids: HashSet<&str> = data.transactions.iter().map(|t| t.txn_id.as_str()).collect();
        assert_eq!(ids.len(), 400);

        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
        for txn in &data.transactions {
            let date = NaiveDate::parse_from_str(&txn.txn_date, DATE_FORMAT).unwrap();
            let due = NaiveDate::parse_from_str(&txn.due_date, DATE_FORMAT).unwrap();
            assert!(date >= start && date < end);
            assert!((7..61).contains(&(due - date).num_days()));
            assert!(txn.amount.parse::<f64>().unwrap() > 0.0);
            let customer: usize = txn.customer_id.parse().unwrap();
            assert!((1..=10).contains(&customer));
        }
        assert!(data.customers.iter().all(|c| SECTORS.contains(&c.sector.as_deref().unwrap())));
    }

    #[test]
    fn test_generated_files_prepare_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        generate_to_dir(&small_config(3), dir.path()).unwrap();

        let raw = load_raw_dataset(dir.path()).unwrap();
        let prepared = prepare_transactions(&raw).unwrap();

        assert_eq!(prepared.duplicates_removed, 20);
        assert_eq!(prepared.transactions.len(), 400);
        assert_eq!(prepared.unknown_customers, 0);
        assert!(prepared
            .transactions
            .iter()
            .filter(|t| !t.is_paid)
            .all(|t| t.delay_days == 0));
    }

    #[test]
    fn test_customer_ids_sort_numerically() {
        let data = DataGenerator::new(small_config(5)).generate().unwrap();
        let ids: Vec<&str> = data.customers.iter().map(|c| c.customer_id.as_str()).collect();
        assert_eq!(ids[0], "001");
        assert_eq!(ids[9], "010");

        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(sorted, ids);

        assert_eq!(customer_id(42, id_width(12_000)), "00042");
        assert!(data.transactions.iter().all(|t| t.customer_id.len() == 3));
    }

    #[test]
    fn test_invalid_window_rejected() {
        let config = GeneratorConfig {
            start_date: "2025-01-01".to_string(),
            end_date: "2024-01-01".to_string(),
            ..small_config(1)
        };
        assert!(DataGenerator::new(config).generate().is_err());
    }
}

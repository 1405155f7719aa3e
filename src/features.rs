//! Feature extraction: per-customer transactions into a fixed-width monthly summary

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::PipelineConfig;
use crate::error::SegmentationError;
use crate::transaction::{Category, RawTransaction, Transaction, TransactionType, UnknownCategoryPolicy};

/// Columns of the clustering matrix, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    AvgMonthlyIncome,
    AvgMonthlySpend,
    AvgMonthlyEssential,
    AvgMonthlyDiscretionary,
    AvgMonthlyFixed,
    AvgMonthlyInvestment,
    AvgMonthlyOther,
    SavingsRate,
    SpendVolatility,
    DiscretionaryRatio,
    AvgMonthlyTransactions,
    AvgTransactionSize,
    IncomeTrend,
    SpendingTrend,
}

impl Feature {
    pub const ALL: [Feature; 14] = [
        Feature::AvgMonthlyIncome,
        Feature::AvgMonthlySpend,
        Feature::AvgMonthlyEssential,
        Feature::AvgMonthlyDiscretionary,
        Feature::AvgMonthlyFixed,
        Feature::AvgMonthlyInvestment,
        Feature::AvgMonthlyOther,
        Feature::SavingsRate,
        Feature::SpendVolatility,
        Feature::DiscretionaryRatio,
        Feature::AvgMonthlyTransactions,
        Feature::AvgTransactionSize,
        Feature::IncomeTrend,
        Feature::SpendingTrend,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::AvgMonthlyIncome => "avg_monthly_income",
            Self::AvgMonthlySpend => "avg_monthly_spend",
            Self::AvgMonthlyEssential => "avg_monthly_essential",
            Self::AvgMonthlyDiscretionary => "avg_monthly_discretionary",
            Self::AvgMonthlyFixed => "avg_monthly_fixed",
            Self::AvgMonthlyInvestment => "avg_monthly_investment",
            Self::AvgMonthlyOther => "avg_monthly_other",
            Self::SavingsRate => "savings_rate",
            Self::SpendVolatility => "spend_volatility",
            Self::DiscretionaryRatio => "discretionary_ratio",
            Self::AvgMonthlyTransactions => "avg_monthly_transactions",
            Self::AvgTransactionSize => "avg_transaction_size",
            Self::IncomeTrend => "income_trend",
            Self::SpendingTrend => "spending_trend",
        }
    }

    /// Column index in [`Feature::ALL`]
    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// Derived numeric summary of one customer over one analysis window.
///
/// Monetary fields are monthly averages over the months that have at least
/// one transaction, in the currency of the source amounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerFeatureVector {
    pub customer_id: String,
    pub months_observed: usize,
    pub avg_monthly_income: f64,
    pub avg_monthly_spend: f64,
    pub avg_monthly_essential: f64,
    pub avg_monthly_discretionary: f64,
    pub avg_monthly_fixed: f64,
    pub avg_monthly_investment: f64,
    pub avg_monthly_other: f64,
    /// `None` when average income is zero or negative
    pub savings_rate: Option<f64>,
    /// `None` with fewer than two months of history
    pub spend_volatility: Option<f64>,
    pub discretionary_ratio: f64,
    pub transaction_count: usize,
    pub avg_monthly_transactions: f64,
    pub avg_transaction_size: f64,
    pub income_trend: f64,
    pub spending_trend: f64,
}

impl CustomerFeatureVector {
    /// Value of one clustering column; `None` for an unset sentinel.
    pub fn get(&self, feature: Feature) -> Option<f64> {
        match feature {
            Feature::AvgMonthlyIncome => Some(self.avg_monthly_income),
            Feature::AvgMonthlySpend => Some(self.avg_monthly_spend),
            Feature::AvgMonthlyEssential => Some(self.avg_monthly_essential),
            Feature::AvgMonthlyDiscretionary => Some(self.avg_monthly_discretionary),
            Feature::AvgMonthlyFixed => Some(self.avg_monthly_fixed),
            Feature::AvgMonthlyInvestment => Some(self.avg_monthly_investment),
            Feature::AvgMonthlyOther => Some(self.avg_monthly_other),
            Feature::SavingsRate => self.savings_rate,
            Feature::SpendVolatility => self.spend_volatility,
            Feature::DiscretionaryRatio => Some(self.discretionary_ratio),
            Feature::AvgMonthlyTransactions => Some(self.avg_monthly_transactions),
            Feature::AvgTransactionSize => Some(self.avg_transaction_size),
            Feature::IncomeTrend => Some(self.income_trend),
            Feature::SpendingTrend => Some(self.spending_trend),
        }
    }

    /// All clustering columns in [`Feature::ALL`] order
    pub fn values(&self) -> Vec<Option<f64>> {
        Feature::ALL.iter().map(|&f| self.get(f)).collect()
    }
}

/// Inclusive date range; open ends are unbounded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisWindow {
    #[serde(default)]
    pub start: Option<NaiveDate>,
    #[serde(default)]
    pub end: Option<NaiveDate>,
}

impl AnalysisWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |start| date >= start) && self.end.map_or(true, |end| date <= end)
    }
}

#[derive(Debug, Default)]
struct MonthTotals {
    income: f64,
    spend: [f64; 5],
    count: usize,
}

impl MonthTotals {
    fn total_spend(&self) -> f64 {
        self.spend.iter().sum()
    }
}

fn spending_slot(category: Category) -> Option<usize> {
    Category::SPENDING.iter().position(|&c| c == category)
}

/// Turns transactions into [`CustomerFeatureVector`]s
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    policy: UnknownCategoryPolicy,
    window: AnalysisWindow,
}

impl FeatureExtractor {
    pub fn new(policy: UnknownCategoryPolicy, window: AnalysisWindow) -> Self {
        Self { policy, window }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.unknown_category, config.window)
    }

    /// Validate raw rows in order. The first malformed row aborts.
    pub fn validate(&self, rows: &[RawTransaction]) -> crate::Result<Vec<Transaction>> {
        rows.iter()
            .enumerate()
            .map(|(i, raw)| Transaction::parse(raw, i, self.policy))
            .collect()
    }

    /// Validate raw rows and extract one vector per customer.
    pub fn extract_raw(&self, rows: &[RawTransaction]) -> crate::Result<Vec<CustomerFeatureVector>> {
        let transactions = self.validate(rows)?;
        self.extract_population(&transactions)
    }

    /// Extract one vector per customer, ordered by customer id.
    ///
    /// Customers with no transactions inside the window are left out.
    pub fn extract_population(
        &self,
        transactions: &[Transaction],
    ) -> crate::Result<Vec<CustomerFeatureVector>> {
        let mut by_customer: BTreeMap<&str, Vec<&Transaction>> = BTreeMap::new();
        for tx in transactions {
            by_customer.entry(tx.customer_id.as_str()).or_default().push(tx);
        }

        let mut vectors = Vec::with_capacity(by_customer.len());
        for (customer_id, rows) in by_customer {
            if !rows.iter().any(|tx| self.window.contains(tx.date)) {
                log::warn!("customer '{customer_id}': no transactions inside the analysis window, skipped");
                continue;
            }
            vectors.push(self.extract_from(customer_id, rows)?);
        }

        log::info!("Extracted feature vectors for {} customers", vectors.len());
        Ok(vectors)
    }

    /// Produce the feature vector of a single customer.
    pub fn extract(
        &self,
        customer_id: &str,
        transactions: &[Transaction],
    ) -> crate::Result<CustomerFeatureVector> {
        self.extract_from(customer_id, transactions.iter())
    }

    fn extract_from<'a>(
        &self,
        customer_id: &str,
        transactions: impl IntoIterator<Item = &'a Transaction>,
    ) -> crate::Result<CustomerFeatureVector> {
        let record = format!("customer '{}'", customer_id);
        let mut months: BTreeMap<(i32, u32), MonthTotals> = BTreeMap::new();
        let mut spend_magnitude = 0.0;
        let mut spend_count = 0usize;

        for tx in transactions {
            if tx.customer_id != customer_id {
                return Err(SegmentationError::invalid(
                    &record,
                    "customer_id",
                    format!("transaction belongs to '{}'", tx.customer_id),
                ));
            }
            if !self.window.contains(tx.date) {
                continue;
            }

            let month = months.entry(tx.month()).or_default();
            month.count += 1;

            match spending_slot(tx.category) {
                Some(slot) => {
                    month.spend[slot] -= tx.signed_flow();
                    // Refunds lower spend but are not purchases
                    if tx.transaction_type == TransactionType::Debit {
                        spend_magnitude += tx.amount.abs();
                        spend_count += 1;
                    }
                }
                None => month.income += tx.signed_flow(),
            }
        }

        if months.is_empty() {
            log::warn!("{record}: no transactions inside the analysis window");
            return Err(SegmentationError::InsufficientData {
                customers: 0,
                required: 1,
            });
        }

        let n_months = months.len() as f64;
        let monthly_income: Vec<f64> = months.values().map(|m| m.income).collect();
        let monthly_spend: Vec<f64> = months.values().map(MonthTotals::total_spend).collect();

        let mut group_avg = [0.0; 5];
        for (slot, avg) in group_avg.iter_mut().enumerate() {
            *avg = months.values().map(|m| m.spend[slot]).sum::<f64>() / n_months;
        }

        let avg_monthly_income = mean(&monthly_income);
        let avg_monthly_spend: f64 = group_avg.iter().sum();
        let transaction_count: usize = months.values().map(|m| m.count).sum();

        let savings_rate = if avg_monthly_income > 0.0 {
            Some(((avg_monthly_income - avg_monthly_spend) / avg_monthly_income).min(1.0))
        } else {
            None
        };

        let discretionary = group_avg[1];
        let discretionary_ratio = if avg_monthly_spend > 0.0 {
            discretionary / avg_monthly_spend
        } else {
            0.0
        };

        let avg_transaction_size = if spend_count > 0 {
            spend_magnitude / spend_count as f64
        } else {
            0.0
        };

        let vector = CustomerFeatureVector {
            customer_id: customer_id.to_string(),
            months_observed: months.len(),
            avg_monthly_income,
            avg_monthly_spend,
            avg_monthly_essential: group_avg[0],
            avg_monthly_discretionary: group_avg[1],
            avg_monthly_fixed: group_avg[2],
            avg_monthly_investment: group_avg[3],
            avg_monthly_other: group_avg[4],
            savings_rate,
            spend_volatility: coefficient_of_variation(&monthly_spend),
            discretionary_ratio,
            transaction_count,
            avg_monthly_transactions: transaction_count as f64 / n_months,
            avg_transaction_size,
            income_trend: trend(&monthly_income),
            spending_trend: trend(&monthly_spend),
        };

        log::debug!(
            "{record}: {} months, income {:.2}, spend {:.2}, savings rate {:?}",
            vector.months_observed,
            vector.avg_monthly_income,
            vector.avg_monthly_spend,
            vector.savings_rate
        );

        Ok(vector)
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_std(values: &[f64], mean: f64) -> f64 {
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Population standard deviation over mean; undefined below two samples or
/// for a non-positive mean.
fn coefficient_of_variation(monthly_spend: &[f64]) -> Option<f64> {
    if monthly_spend.len() < 2 {
        return None;
    }
    let mean = mean(monthly_spend);
    if mean <= 0.0 {
        return None;
    }
    Some(population_std(monthly_spend, mean) / mean)
}

/// Pearson correlation of the series against its month index.
fn trend(series: &[f64]) -> f64 {
    if series.len() < 2 {
        return 0.0;
    }
    let index: Vec<f64> = (0..series.len()).map(|i| i as f64).collect();
    let mean_x = mean(&index);
    let mean_y = mean(series);
    let std_x = population_std(&index, mean_x);
    let std_y = population_std(series, mean_y);
    if std_y == 0.0 || std_x == 0.0 {
        return 0.0;
    }

    let covariance = index
        .iter()
        .zip(series)
        .map(|(x, y)| (x - mean_x) * (y - mean_y))
        .sum::<f64>()
        / series.len() as f64;

    covariance / (std_x * std_y)
}

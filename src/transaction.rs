//! Transaction data contract and validation of raw rows

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SegmentationError;

/// Category groups of the fixed taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Essential,
    Discretionary,
    Fixed,
    Investment,
    Income,
    Other,
}

/// Merchant-level labels seen in bank exports, folded into the taxonomy
const MERCHANT_CATEGORIES: &[(&str, Category)] = &[
    ("groceries", Category::Essential),
    ("utilities", Category::Essential),
    ("gas & fuel", Category::Essential),
    ("restaurants", Category::Discretionary),
    ("shopping", Category::Discretionary),
    ("entertainment", Category::Discretionary),
    ("movies & dvds", Category::Discretionary),
    ("coffee shops", Category::Discretionary),
    ("fast food", Category::Discretionary),
    ("alcohol & bars", Category::Discretionary),
    ("haircut", Category::Discretionary),
    ("mortgage & rent", Category::Fixed),
    ("mobile phone", Category::Fixed),
    ("internet", Category::Fixed),
    ("auto insurance", Category::Fixed),
    ("home improvement", Category::Investment),
    ("paycheck", Category::Income),
    ("salary", Category::Income),
];

impl Category {
    /// Spending groups, in feature-column order
    pub const SPENDING: [Category; 5] = [
        Category::Essential,
        Category::Discretionary,
        Category::Fixed,
        Category::Investment,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Essential => "essential",
            Self::Discretionary => "discretionary",
            Self::Fixed => "fixed",
            Self::Investment => "investment",
            Self::Income => "income",
            Self::Other => "other",
        }
    }

    /// Resolve a taxonomy name or a known merchant label, case-insensitively.
    pub fn lookup(label: &str) -> Option<Category> {
        let normalized = label.trim().to_lowercase();
        let taxonomy = [
            Self::Essential,
            Self::Discretionary,
            Self::Fixed,
            Self::Investment,
            Self::Income,
            Self::Other,
        ];
        taxonomy
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .or_else(|| {
                MERCHANT_CATEGORIES
                    .iter()
                    .find(|(name, _)| *name == normalized)
                    .map(|(_, category)| *category)
            })
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do with a category label outside the taxonomy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownCategoryPolicy {
    #[default]
    MapToOther,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Debit,
    Credit,
}

/// A transaction row as supplied by a reader, before validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub customer_id: String,
    pub date: String,
    pub description: String,
    pub amount: String,
    pub transaction_type: String,
    pub category: String,
    pub account_name: String,
}

/// One posted financial event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub customer_id: String,
    pub date: NaiveDate,
    pub description: String,
    pub amount: f64,
    pub transaction_type: TransactionType,
    pub category: Category,
    pub account_name: String,
}

impl Transaction {
    /// Validate a raw row. `row` is the row's position in its source and is
    /// only used to identify the record in errors.
    pub fn parse(
        raw: &RawTransaction,
        row: usize,
        policy: UnknownCategoryPolicy,
    ) -> crate::Result<Self> {
        let customer_id = raw.customer_id.trim();
        let record = format!("row {} (customer '{}')", row, customer_id);

        if customer_id.is_empty() {
            return Err(SegmentationError::invalid(record, "customer_id", "is empty"));
        }

        let amount = parse_amount(&raw.amount).ok_or_else(|| {
            SegmentationError::invalid(&record, "amount", format!("is not numeric: '{}'", raw.amount))
        })?;

        let date = parse_date(&raw.date).ok_or_else(|| {
            SegmentationError::invalid(&record, "date", format!("is not a recognised date: '{}'", raw.date))
        })?;

        let category = match Category::lookup(&raw.category) {
            Some(category) => category,
            None => match policy {
                UnknownCategoryPolicy::MapToOther => {
                    log::debug!("{record}: unknown category '{}' mapped to other", raw.category);
                    Category::Other
                }
                UnknownCategoryPolicy::Reject => {
                    return Err(SegmentationError::invalid(
                        record,
                        "category",
                        format!("is outside the taxonomy: '{}'", raw.category),
                    ));
                }
            },
        };

        let transaction_type = match raw.transaction_type.trim().to_lowercase().as_str() {
            "debit" => TransactionType::Debit,
            "credit" => TransactionType::Credit,
            // Expense sheets often omit the type column
            "" if amount < 0.0 => TransactionType::Debit,
            "" if category == Category::Income => TransactionType::Credit,
            "" => TransactionType::Debit,
            other => {
                return Err(SegmentationError::invalid(
                    record,
                    "transaction_type",
                    format!("must be 'debit' or 'credit', got '{}'", other),
                ));
            }
        };

        Ok(Self {
            customer_id: customer_id.to_string(),
            date,
            description: raw.description.trim().to_string(),
            amount,
            transaction_type,
            category,
            account_name: raw.account_name.trim().to_string(),
        })
    }

    /// Money flow of this transaction: credits positive, debits negative,
    /// regardless of the sign convention of the source amount.
    pub fn signed_flow(&self) -> f64 {
        match self.transaction_type {
            TransactionType::Credit => self.amount.abs(),
            TransactionType::Debit => -self.amount.abs(),
        }
    }

    /// Calendar month key `(year, month)`
    pub fn month(&self) -> (i32, u32) {
        (self.date.year(), self.date.month())
    }
}

/// Parse a monetary amount, tolerating currency symbols and comma decimals.
pub fn parse_amount(input: &str) -> Option<f64> {
    let cleaned: String = input
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | ' '))
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let normalized = if cleaned.contains(',') && cleaned.contains('.') {
        cleaned.replace(',', "")
    } else {
        cleaned.replace(',', ".")
    };

    normalized.parse::<f64>().ok().filter(|value| value.is_finite())
}

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y", "%m/%d/%Y"];
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parse a calendar date. Ambiguous day/month orders resolve day-first.
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    let input = input.trim();

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(input, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(input).ok().map(|dt| dt.date_naive()))
}

//! Domain models for the conversion pipeline.
//!
//! - [`Row`] - one raw CSV record, column name to text
//! - [`Group`] - rows forming one logical transaction
//! - [`Transaction`] - normalized record with its splits
//! - [`Entry`] - a transaction plus its running balance
//! - [`Summary`] / [`AggregatedData`] - derived statement scalars

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{TransformError, TransformResult};

// =============================================================================
// Raw Rows
// =============================================================================

/// One record from the source file.
///
/// `ordinal` is the zero-based position among emitted data rows and is kept
/// for stable grouping order and error messages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    ordinal: usize,
    values: HashMap<String, String>,
}

impl Row {
    pub fn new(ordinal: usize, values: HashMap<String, String>) -> Self {
        Self { ordinal, values }
    }

    /// Build a row from `(column, value)` pairs.
    pub fn from_pairs<K, V>(ordinal: usize, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let values = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self { ordinal, values }
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(column).map(String::as_str)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

// =============================================================================
// Groups
// =============================================================================

/// Rows sharing a collapse key, in source order.
///
/// Without a collapse key every group holds exactly one row.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub key: Option<String>,
    pub rows: Vec<Row>,
}

impl Group {
    pub fn single(row: Row) -> Self {
        Self { key: None, rows: vec![row] }
    }

    pub fn keyed(key: impl Into<String>, row: Row) -> Self {
        Self { key: Some(key.into()), rows: vec![row] }
    }

    /// First row; transaction-level attributes come from it.
    pub fn primary(&self) -> Option<&Row> {
        self.rows.first()
    }

    /// Key used in messages: the collapse key or the primary row's ordinal.
    pub fn label(&self) -> String {
        match (&self.key, self.primary()) {
            (Some(key), _) => key.clone(),
            (None, Some(row)) => format!("row {}", row.ordinal()),
            (None, None) => "<empty>".to_string(),
        }
    }
}

// =============================================================================
// Transactions
// =============================================================================

/// Debit or credit, as printed in OFX `TRNTYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionKind {
    Debit,
    Credit,
}

impl TransactionKind {
    /// Parse a mapped `type` value; anything but DEBIT/CREDIT yields `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "DEBIT" => Some(Self::Debit),
            "CREDIT" => Some(Self::Credit),
            _ => None,
        }
    }

    pub fn from_amount(amount: Decimal) -> Self {
        if amount > Decimal::ZERO {
            Self::Credit
        } else {
            Self::Debit
        }
    }

    /// Force the sign of `amount` to match this kind.
    pub fn apply(self, amount: Decimal) -> Decimal {
        match self {
            Self::Debit => -amount.abs(),
            Self::Credit => amount.abs(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debit => "DEBIT",
            Self::Credit => "CREDIT",
        }
    }
}

/// One leg of a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub account: String,
    pub amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

/// A normalized transaction.
///
/// `amount` always equals the sum of `splits` amounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub date: NaiveDate,
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub payee: Option<String>,
    pub memo: Option<String>,
    pub category: Option<String>,
    pub class: Option<String>,
    pub check_id: Option<String>,
    /// Statement-unique identifier (OFX `FITID`)
    pub id: String,
    pub account: String,
    pub account_id: String,
    pub bank_id: String,
    pub account_type: Option<String>,
    pub currency: String,
    pub splits: Vec<Split>,
    /// Balance reported by the source file, when the mapping has one
    pub statement_balance: Option<Decimal>,
    /// Ordinal of the primary row
    pub row: usize,
}

impl Transaction {
    pub fn split_total(&self) -> Decimal {
        self.splits.iter().map(|s| s.amount).sum()
    }

    pub fn is_split(&self) -> bool {
        self.splits.len() > 1
    }
}

// =============================================================================
// Aggregation
// =============================================================================

/// A transaction with the cumulative balance after it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    pub transaction: Transaction,
    pub running_balance: Decimal,
}

/// Scalars derived while aggregating a transaction sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub opening_balance: Decimal,
    pub final_balance: Decimal,
    /// Earliest transaction date actually included
    pub start_date: Option<NaiveDate>,
    /// Latest transaction date actually included
    pub end_date: Option<NaiveDate>,
    pub count: usize,
    /// Last balance reported by the source, if mapped
    pub statement_balance: Option<Decimal>,
    pub last_account: Option<String>,
}

impl Summary {
    pub fn new(opening_balance: Decimal) -> Self {
        Self {
            opening_balance,
            final_balance: opening_balance,
            start_date: None,
            end_date: None,
            count: 0,
            statement_balance: None,
            last_account: None,
        }
    }

    /// Fold one transaction in; returns the new running balance.
    ///
    /// On overflow the summary is left as it was.
    pub fn record(&mut self, transaction: &Transaction) -> TransformResult<Decimal> {
        self.final_balance = self
            .final_balance
            .checked_add(transaction.amount)
            .ok_or(TransformError::BalanceOverflow { row: transaction.row })?;
        self.count += 1;
        self.start_date = Some(match self.start_date {
            Some(d) => d.min(transaction.date),
            None => transaction.date,
        });
        self.end_date = Some(match self.end_date {
            Some(d) => d.max(transaction.date),
            None => transaction.date,
        });
        if transaction.statement_balance.is_some() {
            self.statement_balance = transaction.statement_balance;
        }
        self.last_account = Some(transaction.account.clone());
        Ok(self.final_balance)
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// A fully materialized aggregated sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedData {
    pub entries: Vec<Entry>,
    pub summary: Summary,
}

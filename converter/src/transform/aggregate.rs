//! Running balances and statement summary.

use rust_decimal::Decimal;

use crate::error::{BalanceMismatch, TransformError, TransformResult};
use crate::models::{AggregatedData, Entry, Summary, Transaction};

/// Default tolerance for ending-balance reconciliation (half a cent)
pub fn default_tolerance() -> Decimal {
    Decimal::new(5, 3)
}

/// Lazy aggregation: pairs each transaction with its running balance and
/// folds it into a [`Summary`] as it goes.
pub struct Aggregator<I> {
    inner: I,
    summary: Summary,
}

impl<I> Aggregator<I> {
    pub fn new(inner: I, opening_balance: Decimal) -> Self {
        Self { inner, summary: Summary::new(opening_balance) }
    }

    /// Summary of everything yielded so far
    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    pub fn into_summary(self) -> Summary {
        self.summary
    }
}

impl<I, E> Iterator for Aggregator<I>
where
    I: Iterator<Item = Result<Transaction, E>>,
    E: From<TransformError>,
{
    type Item = Result<Entry, E>;

    fn next(&mut self) -> Option<Self::Item> {
        let transaction = match self.inner.next()? {
            Ok(transaction) => transaction,
            Err(e) => return Some(Err(e)),
        };
        Some(
            self.summary
                .record(&transaction)
                .map(|running_balance| Entry { transaction, running_balance })
                .map_err(E::from),
        )
    }
}

/// Aggregate a whole sequence eagerly.
pub fn aggregate<I>(transactions: I, opening_balance: Decimal) -> TransformResult<AggregatedData>
where
    I: IntoIterator<Item = Transaction>,
{
    let mut aggregator = Aggregator::new(
        transactions.into_iter().map(Ok::<_, TransformError>),
        opening_balance,
    );
    let entries = aggregator.by_ref().collect::<TransformResult<Vec<_>>>()?;
    Ok(AggregatedData { entries, summary: aggregator.into_summary() })
}

/// Compare the computed final balance with an expected one.
pub fn reconcile(summary: &Summary, expected: Decimal, tolerance: Decimal) -> Result<(), BalanceMismatch> {
    let within = summary
        .final_balance
        .checked_sub(expected)
        .is_some_and(|difference| difference.abs() <= tolerance);
    if within {
        Ok(())
    } else {
        Err(BalanceMismatch { expected, actual: summary.final_balance })
    }
}

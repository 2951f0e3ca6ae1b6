//! Inclusive date range filtering.

use chrono::NaiveDate;

use crate::models::Transaction;

/// Inclusive `[start, end]` date bounds; `None` leaves a side open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |start| date >= start) && self.end.map_or(true, |end| date <= end)
    }

    /// Drop out-of-range transactions from a fallible stream; errors pass through.
    pub fn retain<I, E>(self, transactions: I) -> impl Iterator<Item = Result<Transaction, E>>
    where
        I: Iterator<Item = Result<Transaction, E>>,
    {
        transactions.filter(move |item| match item {
            Ok(txn) => self.contains(txn.date),
            Err(_) => true,
        })
    }
}

/// Keep transactions dated within `[start, end]`, preserving order.
pub fn filter<I>(
    transactions: I,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> impl Iterator<Item = Transaction>
where
    I: IntoIterator<Item = Transaction>,
{
    let range = DateRange::new(start, end);
    transactions.into_iter().filter(move |txn| range.contains(txn.date))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransactionKind;
    use rust_decimal::Decimal;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn txn(date: NaiveDate, id: &str) -> Transaction {
        Transaction {
            date,
            amount: Decimal::ONE,
            kind: TransactionKind::Credit,
            payee: None,
            memo: None,
            category: None,
            class: None,
            check_id: None,
            id: id.to_string(),
            account: "A".to_string(),
            account_id: "a".to_string(),
            bank_id: "a".to_string(),
            account_type: None,
            currency: "USD".to_string(),
            splits: Vec::new(),
            statement_balance: None,
            row: 0,
        }
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let range = DateRange::new(Some(ymd(2021, 1, 1)), Some(ymd(2021, 1, 31)));
        assert!(range.contains(ymd(2021, 1, 1)));
        assert!(range.contains(ymd(2021, 1, 31)));
        assert!(!range.contains(ymd(2020, 12, 31)));
        assert!(!range.contains(ymd(2021, 2, 1)));
        assert!(DateRange::default().contains(ymd(1999, 1, 1)));
    }

    #[test]
    fn test_filter_preserves_order() {
        let input = vec![
            txn(ymd(2021, 3, 1), "c"),
            txn(ymd(2020, 1, 1), "old"),
            txn(ymd(2021, 1, 1), "a"),
            txn(ymd(2021, 2, 1), "b"),
        ];
        let ids: Vec<String> = filter(input, Some(ymd(2021, 1, 1)), None).map(|t| t.id).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_everything_excluded() {
        let input = vec![txn(ymd(2021, 1, 1), "a")];
        assert_eq!(filter(input, None, Some(ymd(2020, 12, 31))).count(), 0);
    }

    #[test]
    fn test_retain_passes_errors() {
        let items: Vec<Result<Transaction, String>> =
            vec![Ok(txn(ymd(2019, 1, 1), "x")), Err("boom".to_string())];
        let kept: Vec<_> = DateRange::new(Some(ymd(2020, 1, 1)), None).retain(items.into_iter()).collect();
        assert_eq!(kept.len(), 1);
        assert!(kept[0].is_err());
    }
}

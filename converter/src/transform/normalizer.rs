//! Turn a row group into a normalized [`Transaction`].
//!
//! Transaction-level attributes (date, payee, memo, ids, account, ...) come
//! from the group's first row. Each row contributes one split; the transaction
//! amount is the sum of the split amounts.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::dates::{parse_date, parse_date_with_format};
use crate::error::{TransformError, TransformResult};
use crate::mapping::{FieldMapper, MappingSpec};
use crate::models::{Group, Row, Split, Transaction, TransactionKind};

use super::amount::parse_amount;

/// Account used when the mapping names none
pub const DEFAULT_ACCOUNT: &str = "N/A";

/// Currency used when the mapping names none
pub const DEFAULT_CURRENCY: &str = "USD";

/// Stable identifier derived from arbitrary text.
///
/// Same input, same id, across runs and machines.
pub fn stable_id(text: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, text.as_bytes())
        .simple()
        .to_string()
}

/// Converts groups into transactions using a mapping.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer<'a> {
    mapper: FieldMapper<'a>,
    day_first: bool,
}

impl<'a> Normalizer<'a> {
    pub fn new(spec: &'a MappingSpec, day_first: bool) -> Self {
        Self { mapper: FieldMapper::new(spec), day_first }
    }

    /// Normalize one group.
    pub fn normalize(&self, group: &Group) -> TransformResult<Transaction> {
        let primary = group.primary().ok_or(TransformError::EmptyGroup)?;
        let m = &self.mapper;
        let spec = m.spec();

        let raw_date = m.resolve("date", primary)?;
        let date = self.parse_date(&raw_date, primary.ordinal())?;
        let payee = m.resolve_optional("payee", primary)?;

        if group.rows.len() > 1 {
            self.check_consistent(group, date, payee.as_deref())?;
        }

        let multi = group.rows.len() > 1;
        let mut splits = Vec::with_capacity(group.rows.len());
        let mut raw_amount = String::new();
        for (i, row) in group.rows.iter().enumerate() {
            let (raw, amount) = self.row_amount(row)?;
            if i == 0 {
                raw_amount = raw;
            }
            let account = match m.resolve_optional("split_account", row)? {
                Some(account) => account,
                None => m
                    .resolve_optional("account", row)?
                    .unwrap_or_else(|| DEFAULT_ACCOUNT.to_string()),
            };
            let memo = if multi { m.resolve_optional("desc", row)? } else { None };
            splits.push(Split { account, amount, memo });
        }

        let amount = splits
            .iter()
            .try_fold(Decimal::ZERO, |total, s| total.checked_add(s.amount))
            .ok_or_else(|| TransformError::AmountOverflow { key: group.label() })?;
        if spec.is_split && multi && !amount.is_zero() {
            return Err(TransformError::UnbalancedSplits { key: group.label(), total: amount });
        }

        let desc = m.resolve_optional("desc", primary)?;
        let notes = m.resolve_optional("notes", primary)?;
        let memo = match (desc, notes) {
            (Some(desc), Some(notes)) => Some(format!("{} {}", desc, notes)),
            (desc, notes) => desc.or(notes),
        };

        let account = m
            .resolve_optional("account", primary)?
            .unwrap_or_else(|| DEFAULT_ACCOUNT.to_string());
        let bank = m.resolve_optional("bank", primary)?.unwrap_or_else(|| account.clone());
        let account_id = m
            .resolve_optional("account_id", primary)?
            .unwrap_or_else(|| stable_id(&account));
        let bank_id = m.resolve_optional("bank_id", primary)?.unwrap_or_else(|| stable_id(&bank));

        let check_id = m.resolve_optional("check_num", primary)?;
        let id = match (m.resolve_optional("id", primary)?, &check_id) {
            (Some(id), _) => id,
            (None, Some(check)) => check.clone(),
            (None, None) => {
                let details: String = [Some(raw_date.as_str()), Some(raw_amount.as_str()), payee.as_deref(), memo.as_deref()]
                    .into_iter()
                    .flatten()
                    .collect();
                stable_id(&details)
            }
        };

        let statement_balance = match m.resolve_optional("balance", primary)? {
            Some(raw) => Some(self.amount(&raw, primary.ordinal())?),
            None => None,
        };

        Ok(Transaction {
            date,
            amount,
            kind: TransactionKind::from_amount(amount),
            payee,
            memo,
            category: m.resolve_optional("category", primary)?,
            class: m.resolve_optional("class", primary)?,
            check_id,
            id,
            account,
            account_id,
            bank_id,
            account_type: m.resolve_optional("account_type", primary)?,
            currency: m
                .resolve_optional("currency", primary)?
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            splits,
            statement_balance,
            row: primary.ordinal(),
        })
    }

    /// Amount of one row, with the sign forced by a mapped DEBIT/CREDIT type.
    fn row_amount(&self, row: &Row) -> TransformResult<(String, Decimal)> {
        let raw = self.mapper.resolve("amount", row)?;
        let amount = self.amount(&raw, row.ordinal())?;
        let amount = match self.mapper.resolve_optional("type", row)? {
            Some(kind) => TransactionKind::parse(&kind).map_or(amount, |k| k.apply(amount)),
            None => amount,
        };
        Ok((raw, amount))
    }

    fn amount(&self, raw: &str, row: usize) -> TransformResult<Decimal> {
        parse_amount(raw, self.mapper.spec().amount_format).ok_or_else(|| {
            TransformError::AmountParse { raw: raw.to_string(), row }
        })
    }

    fn parse_date(&self, raw: &str, row: usize) -> TransformResult<NaiveDate> {
        let parsed = match &self.mapper.spec().date_format {
            Some(format) => parse_date_with_format(raw, format),
            None => parse_date(raw, self.day_first),
        };
        parsed.map_err(|e| TransformError::DateParse {
            raw: raw.to_string(),
            row,
            message: e.to_string(),
        })
    }

    fn check_consistent(&self, group: &Group, date: NaiveDate, payee: Option<&str>) -> TransformResult<()> {
        for row in group.rows.iter().skip(1) {
            let raw = self.mapper.resolve("date", row)?;
            if self.parse_date(&raw, row.ordinal())? != date {
                return Err(TransformError::InconsistentGroup {
                    key: group.label(),
                    attribute: "date",
                    row: row.ordinal(),
                });
            }
            if self.mapper.resolve_optional("payee", row)?.as_deref() != payee {
                return Err(TransformError::InconsistentGroup {
                    key: group.label(),
                    attribute: "payee",
                    row: row.ordinal(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MappingError;
    use crate::mapping::{builtin, FieldSpec};
    use rust_decimal_macros::dec;

    fn simple_spec() -> MappingSpec {
        MappingSpec::new()
            .with_field("date", FieldSpec::column("date"))
            .with_field("amount", FieldSpec::column("amount"))
            .with_field("payee", FieldSpec::column("payee"))
            .with_field("account", FieldSpec::column("account"))
    }

    fn row(ordinal: usize, pairs: &[(&str, &str)]) -> Row {
        Row::from_pairs(ordinal, pairs.iter().copied())
    }

    #[test]
    fn test_single_row() {
        let spec = simple_spec();
        let normalizer = Normalizer::new(&spec, false);
        let group = Group::single(row(
            0,
            &[("date", "2021-01-01"), ("amount", "-50.00"), ("payee", "Grocer"), ("account", "Checking")],
        ));

        let txn = normalizer.normalize(&group).unwrap();
        assert_eq!(txn.date, NaiveDate::from_ymd_opt(2021, 1, 1).unwrap());
        assert_eq!(txn.amount, dec!(-50.00));
        assert_eq!(txn.kind, TransactionKind::Debit);
        assert_eq!(txn.payee.as_deref(), Some("Grocer"));
        assert_eq!(txn.account, "Checking");
        assert_eq!(txn.account_id, stable_id("Checking"));
        assert_eq!(txn.bank_id, txn.account_id);
        assert_eq!(txn.currency, DEFAULT_CURRENCY);
        assert_eq!(txn.splits.len(), 1);
        assert_eq!(txn.split_total(), txn.amount);
    }

    #[test]
    fn test_stable_fallback_id() {
        let spec = simple_spec();
        let normalizer = Normalizer::new(&spec, false);
        let make = || {
            Group::single(row(
                0,
                &[("date", "2021-01-01"), ("amount", "-50.00"), ("payee", "Grocer"), ("account", "A")],
            ))
        };
        let a = normalizer.normalize(&make()).unwrap();
        let b = normalizer.normalize(&make()).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.id.len(), 32);
    }

    #[test]
    fn test_mint_type_memo_and_check() {
        let spec = builtin("mint").unwrap().with_field("check_num", FieldSpec::column("Check"));
        let normalizer = Normalizer::new(&spec, false);
        let group = Group::single(row(
            0,
            &[
                ("Date", "06/12/10"),
                ("Amount", "1000.00"),
                ("Transaction Type", "debit"),
                ("Description", "payee"),
                ("Original Description", "description"),
                ("Notes", "notes"),
                ("Category", "Checking"),
                ("Account Name", "account"),
                ("Check", "1042"),
            ],
        ));

        let txn = normalizer.normalize(&group).unwrap();
        assert_eq!(txn.amount, dec!(-1000.00));
        assert_eq!(txn.kind, TransactionKind::Debit);
        assert_eq!(txn.memo.as_deref(), Some("description notes"));
        assert_eq!(txn.date, NaiveDate::from_ymd_opt(2010, 6, 12).unwrap());
        assert_eq!(txn.id, "1042");
        assert_eq!(txn.check_id.as_deref(), Some("1042"));
    }

    #[test]
    fn test_collapsed_splits_sum_to_zero() {
        let spec = builtin("split").unwrap();
        let normalizer = Normalizer::new(&spec, false);
        let base = [("Transaction ID", "T1"), ("Date", "2021-03-01"), ("Number", ""), ("Description", "Rent")];
        let mut first: Vec<(&str, &str)> = base.to_vec();
        first.extend([("Account", "Expenses:Rent"), ("Amount", "1200"), ("Memo", "March")]);
        let mut second: Vec<(&str, &str)> = base.to_vec();
        second.extend([("Account", "Assets:Checking"), ("Amount", "-1200"), ("Memo", "")]);

        let mut group = Group::keyed("T1", row(0, &first));
        group.rows.push(row(1, &second));

        let txn = normalizer.normalize(&group).unwrap();
        assert_eq!(txn.amount, Decimal::ZERO);
        assert_eq!(txn.splits.len(), 2);
        assert_eq!(txn.splits[0].account, "Expenses:Rent");
        assert_eq!(txn.splits[0].memo.as_deref(), Some("March"));
        assert_eq!(txn.splits[1].memo, None);
        assert_eq!(txn.split_total(), txn.amount);
        assert_eq!(txn.id, "T1");
    }

    #[test]
    fn test_unbalanced_splits() {
        let spec = builtin("split").unwrap();
        let normalizer = Normalizer::new(&spec, false);
        let cols = |account, amount| {
            vec![
                ("Transaction ID", "T2"),
                ("Date", "2021-03-01"),
                ("Number", ""),
                ("Description", "Lunch"),
                ("Memo", ""),
                ("Account", account),
                ("Amount", amount),
            ]
        };
        let mut group = Group::keyed("T2", row(0, &cols("Expenses:Food", "12")));
        group.rows.push(row(1, &cols("Assets:Cash", "-10")));

        assert!(matches!(
            normalizer.normalize(&group),
            Err(TransformError::UnbalancedSplits { total, .. }) if total == dec!(2)
        ));
    }

    #[test]
    fn test_split_amount_overflow() {
        let spec = builtin("split").unwrap();
        let normalizer = Normalizer::new(&spec, false);
        let max = Decimal::MAX.to_string();
        let cols = |account| {
            vec![
                ("Transaction ID", "T3"),
                ("Date", "2021-03-01"),
                ("Number", ""),
                ("Description", "Huge"),
                ("Memo", ""),
                ("Account", account),
                ("Amount", max.as_str()),
            ]
        };
        let mut group = Group::keyed("T3", row(0, &cols("Expenses:Big")));
        group.rows.push(row(1, &cols("Assets:Cash")));

        assert!(matches!(
            normalizer.normalize(&group),
            Err(TransformError::AmountOverflow { key }) if key == "T3"
        ));
    }

    #[test]
    fn test_inconsistent_group() {
        let spec = simple_spec();
        let normalizer = Normalizer::new(&spec, false);
        let mut group = Group::keyed(
            "k",
            row(0, &[("date", "2021-01-01"), ("amount", "1"), ("payee", "A"), ("account", "X")]),
        );
        group
            .rows
            .push(row(1, &[("date", "2021-01-02"), ("amount", "1"), ("payee", "A"), ("account", "X")]));

        assert!(matches!(
            normalizer.normalize(&group),
            Err(TransformError::InconsistentGroup { attribute: "date", row: 1, .. })
        ));
    }

    #[test]
    fn test_parse_errors_name_the_row() {
        let spec = simple_spec();
        let normalizer = Normalizer::new(&spec, false);

        let bad_amount = Group::single(row(4, &[("date", "2021-01-01"), ("amount", "abc"), ("payee", "A"), ("account", "X")]));
        assert!(matches!(
            normalizer.normalize(&bad_amount),
            Err(TransformError::AmountParse { row: 4, .. })
        ));

        let bad_date = Group::single(row(5, &[("date", "someday"), ("amount", "1"), ("payee", "A"), ("account", "X")]));
        assert!(matches!(
            normalizer.normalize(&bad_date),
            Err(TransformError::DateParse { row: 5, .. })
        ));

        let missing = Group::single(row(6, &[("date", "2021-01-01"), ("payee", "A"), ("account", "X")]));
        assert!(matches!(
            normalizer.normalize(&missing),
            Err(TransformError::Mapping(MappingError::MissingColumn { .. }))
        ));
    }

    #[test]
    fn test_explicit_date_format_and_balance() {
        let mut spec = simple_spec()
            .with_field("balance", FieldSpec::column("balance"))
            .with_field("currency", FieldSpec::literal("EUR"));
        spec.date_format = Some("%d.%m.%Y".to_string());
        spec.amount_format = crate::mapping::AmountFormat::Comma;
        let normalizer = Normalizer::new(&spec, false);

        let group = Group::single(row(
            0,
            &[("date", "03.02.2021"), ("amount", "-1.234,50"), ("payee", "A"), ("account", "X"), ("balance", "100,00")],
        ));
        let txn = normalizer.normalize(&group).unwrap();
        assert_eq!(txn.date, NaiveDate::from_ymd_opt(2021, 2, 3).unwrap());
        assert_eq!(txn.amount, dec!(-1234.50));
        assert_eq!(txn.statement_balance, Some(dec!(100.00)));
        assert_eq!(txn.currency, "EUR");
    }
}

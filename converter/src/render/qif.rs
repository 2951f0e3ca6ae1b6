//! QIF (Quicken Interchange Format) statement grammar.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

use super::{entry_account_type, money, one_line, resolve_account_type, Format, RenderOptions, StatementRenderer};
use crate::error::{RenderError, RenderResult};
use crate::models::Entry;

/// Account types accepted in `!Type:` and `T` lines
pub const ACCOUNT_TYPES: &[&str] = &["Bank", "Cash"];

/// Default layout of `D` lines
pub const DEFAULT_DATE_FORMAT: &str = "%m/%d/%y";

/// Renders bank statements as QIF records.
#[derive(Debug, Clone)]
pub struct QifRenderer {
    options: RenderOptions,
}

impl QifRenderer {
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    fn date(&self, date: NaiveDate) -> String {
        let format = self.options.date_format.as_deref().unwrap_or(DEFAULT_DATE_FORMAT);
        date.format(format).to_string()
    }

    fn account_type(&self, own: Option<&str>) -> &'static str {
        entry_account_type(Format::Qif, own, self.options.account_type.as_deref())
    }
}

impl StatementRenderer for QifRenderer {
    fn format(&self) -> Format {
        Format::Qif
    }

    fn header(&self, date: NaiveDateTime, language: &str) -> RenderResult<Option<String>> {
        let account_type = resolve_account_type(Format::Qif, self.options.account_type.as_deref())?;
        if !self.options.strict {
            return Ok(None);
        }
        let institution = self
            .options
            .institution
            .as_deref()
            .ok_or(RenderError::MissingRequiredField("institution"))?;

        Ok(Some(format!(
            "!Option:AutoSwitch\n!Account\nN{}\nT{}\nD{} {}\n^\n!Clear:AutoSwitch\n",
            one_line(institution),
            account_type,
            one_line(language),
            date.format("%Y-%m-%d %H:%M:%S"),
        )))
    }

    fn transaction(&self, entry: &Entry, previous_account: Option<&str>) -> String {
        let txn = &entry.transaction;
        let account_type = self.account_type(txn.account_type.as_deref());
        let mut out = String::new();

        if previous_account != Some(txn.account.as_str()) {
            out.push_str(&format!("!Account\nN{}\nT{}\n^\n", one_line(&txn.account), account_type));
        }

        out.push_str(&format!("!Type:{}\n", account_type));
        out.push_str(&format!("D{}\n", self.date(txn.date)));
        if let Some(check) = &txn.check_id {
            out.push_str(&format!("N{}\n", one_line(check)));
        }
        if let Some(payee) = &txn.payee {
            out.push_str(&format!("P{}\n", one_line(payee)));
        }
        if let Some(memo) = &txn.memo {
            out.push_str(&format!("M{}\n", one_line(memo)));
        }
        out.push_str(&format!("T{}\n", money(txn.amount)));
        match (&txn.category, &txn.class) {
            (Some(category), Some(class)) => out.push_str(&format!("L{}/{}\n", one_line(category), one_line(class))),
            (Some(category), None) => out.push_str(&format!("L{}\n", one_line(category))),
            (None, Some(class)) => out.push_str(&format!("L/{}\n", one_line(class))),
            (None, None) => {}
        }
        if txn.is_split() {
            for split in &txn.splits {
                out.push_str(&format!("S{}\n", one_line(&split.account)));
                if let Some(memo) = &split.memo {
                    out.push_str(&format!("E{}\n", one_line(memo)));
                }
                out.push_str(&format!("${}\n", money(split.amount)));
            }
        }
        out.push_str("^\n");
        out
    }

    fn footer(
        &self,
        date: NaiveDateTime,
        balance: Option<Decimal>,
        account: Option<&str>,
    ) -> RenderResult<Option<String>> {
        let Some(balance) = balance else {
            if self.options.strict {
                return Err(RenderError::MissingRequiredField("ending balance"));
            }
            return Ok(None);
        };

        let name = account
            .or(self.options.institution.as_deref())
            .unwrap_or("Statement");
        Ok(Some(format!(
            "!Account\nN{}\nT{}\n/{}\n${}\n^\n",
            one_line(name),
            self.account_type(None),
            self.date(date.date()),
            money(balance),
        )))
    }
}

//! Statement renderers
//!
//! A renderer projects aggregated entries onto one output grammar as three
//! fragments: an optional header, one body fragment per entry and an
//! optional footer. Rendering is pure; the same input always produces the
//! same text.
//!
//! ```text
//! header(date, language)  →  "DATA:OFXSGML ..."   (or nothing)
//! body(entries)           →  "<STMTTRN>...", ...  (lazy, one per entry)
//! footer(date, balance)   →  "</BANKTRANLIST>..." (or nothing)
//! ```

pub mod ofx;
pub mod qif;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use crate::error::{RenderError, RenderResult};
use crate::models::{AggregatedData, Entry};

pub use ofx::OfxRenderer;
pub use qif::QifRenderer;

// =============================================================================
// Formats & Options
// =============================================================================

/// Output grammar
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Ofx,
    Qif,
}

impl Format {
    /// Build the renderer for this format.
    pub fn renderer(self, options: RenderOptions) -> Box<dyn StatementRenderer> {
        match self {
            Format::Ofx => Box::new(OfxRenderer::new(options)),
            Format::Qif => Box::new(QifRenderer::new(options)),
        }
    }

    /// Closed set of account types accepted by this grammar
    pub fn account_types(self) -> &'static [&'static str] {
        match self {
            Format::Ofx => ofx::ACCOUNT_TYPES,
            Format::Qif => qif::ACCOUNT_TYPES,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Format::Ofx => "ofx",
            Format::Qif => "qif",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Format::Ofx => "OFX",
            Format::Qif => "QIF",
        })
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ofx" => Ok(Format::Ofx),
            "qif" => Ok(Format::Qif),
            other => Err(format!("unknown format '{}' (expected ofx or qif)", other)),
        }
    }
}

/// Format-specific rendering options
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Account type; validated against the format's closed set
    pub account_type: Option<String>,
    /// Institution identifier, required in strict mode
    pub institution: Option<String>,
    /// Emit extended identification and require an ending balance
    pub strict: bool,
    /// Statement period start (OFX `DTSTART`)
    pub start: Option<NaiveDate>,
    /// Statement period end (OFX `DTEND`)
    pub end: Option<NaiveDate>,
    /// `strftime` layout for QIF dates
    pub date_format: Option<String>,
}

// =============================================================================
// Renderer Contract
// =============================================================================

/// Shared contract of the output grammars.
pub trait StatementRenderer {
    fn format(&self) -> Format;

    /// Document preamble. Fails on an unsupported account type or, in strict
    /// mode, a missing institution.
    fn header(&self, date: NaiveDateTime, language: &str) -> RenderResult<Option<String>>;

    /// One body fragment. `previous_account` is the account of the entry
    /// rendered just before, `None` for the first one.
    fn transaction(&self, entry: &Entry, previous_account: Option<&str>) -> String;

    /// Document closing. `account` is the account of the last entry.
    fn footer(
        &self,
        date: NaiveDateTime,
        balance: Option<Decimal>,
        account: Option<&str>,
    ) -> RenderResult<Option<String>>;
}

/// Tracks the account of the previously rendered entry.
#[derive(Debug, Default)]
pub struct BodyState {
    previous_account: Option<String>,
}

impl BodyState {
    pub fn is_first(&self) -> bool {
        self.previous_account.is_none()
    }

    pub fn render(&mut self, renderer: &dyn StatementRenderer, entry: &Entry) -> String {
        let text = renderer.transaction(entry, self.previous_account.as_deref());
        self.previous_account = Some(entry.transaction.account.clone());
        text
    }
}

/// Lazy body: one fragment per entry.
pub struct Body<'r, I> {
    renderer: &'r dyn StatementRenderer,
    entries: I,
    state: BodyState,
}

impl<'r, I> Iterator for Body<'r, I>
where
    I: Iterator,
    I::Item: Borrow<Entry>,
{
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let entry = self.entries.next()?;
        Some(self.state.render(self.renderer, entry.borrow()))
    }
}

/// Render entries lazily, one fragment at a time.
pub fn body<'r, I>(renderer: &'r dyn StatementRenderer, entries: I) -> Body<'r, I::IntoIter>
where
    I: IntoIterator,
    I::Item: Borrow<Entry>,
{
    Body { renderer, entries: entries.into_iter(), state: BodyState::default() }
}

/// Render a whole document from materialized data.
///
/// Empty data renders as an empty string.
pub fn render_document(
    renderer: &dyn StatementRenderer,
    data: &AggregatedData,
    date: NaiveDateTime,
    language: &str,
    balance: Option<Decimal>,
) -> RenderResult<String> {
    let header = renderer.header(date, language)?;
    if data.entries.is_empty() {
        return Ok(String::new());
    }

    let mut out = header.unwrap_or_default();
    out.extend(body(renderer, &data.entries));
    let last_account = data.summary.last_account.as_deref();
    if let Some(footer) = renderer.footer(date, balance, last_account)? {
        out.push_str(&footer);
    }
    Ok(out)
}

// =============================================================================
// Shared Helpers
// =============================================================================

/// Amount with exactly two decimals
pub(crate) fn money(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}

/// Field value on a single line: each run of CR/LF becomes one space.
///
/// Both grammars are line oriented, so a raw break inside a value would
/// start a new record line.
pub(crate) fn one_line(text: &str) -> String {
    text.split(['\r', '\n'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Canonical account type from the closed set, compared case-insensitively.
pub(crate) fn canonical_account_type(
    format: Format,
    value: &str,
) -> RenderResult<&'static str> {
    let allowed = format.account_types();
    allowed
        .iter()
        .copied()
        .find(|candidate| candidate.eq_ignore_ascii_case(value.trim()))
        .ok_or_else(|| RenderError::UnsupportedAccountType {
            format: match format {
                Format::Ofx => "OFX",
                Format::Qif => "QIF",
            },
            value: value.to_string(),
            expected: allowed.join(", "),
        })
}

/// Configured account type, or the format default when none is set.
pub(crate) fn resolve_account_type(
    format: Format,
    configured: Option<&str>,
) -> RenderResult<&'static str> {
    match configured {
        Some(value) => canonical_account_type(format, value),
        None => Ok(format.account_types()[0]),
    }
}

/// Account type for one transaction: its own when valid, else the configured one.
pub(crate) fn entry_account_type(
    format: Format,
    own: Option<&str>,
    configured: Option<&str>,
) -> &'static str {
    own.and_then(|value| canonical_account_type(format, value).ok())
        .or_else(|| resolve_account_type(format, configured).ok())
        .unwrap_or(format.account_types()[0])
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::models::{Entry, Split, Transaction, TransactionKind};
    use chrono::{NaiveDate, NaiveDateTime};
    use rust_decimal::Decimal;

    pub fn server_date() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 2, 3)
            .unwrap()
            .and_hms_opt(4, 5, 6)
            .unwrap()
    }

    pub fn entry(date: (i32, u32, u32), amount: Decimal, account: &str, balance: Decimal) -> Entry {
        Entry {
            transaction: Transaction {
                date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
                amount,
                kind: TransactionKind::from_amount(amount),
                payee: Some("Grocer & Co".to_string()),
                memo: None,
                category: None,
                class: None,
                check_id: None,
                id: "fit-1".to_string(),
                account: account.to_string(),
                account_id: format!("{}-id", account.to_lowercase()),
                bank_id: "bank-id".to_string(),
                account_type: None,
                currency: "USD".to_string(),
                splits: vec![Split { account: account.to_string(), amount, memo: None }],
                statement_balance: None,
                row: 0,
            },
            running_balance: balance,
        }
    }
}

//! High-level conversion API: CSV rows in, statement text out.
//!
//! Stages are chained as lazy iterators and driven by the writer:
//!
//! ```text
//! rows → group → normalize → filter → aggregate → render → writer
//! ```
//!
//! Only the grouper buffers (one chunk of rows). The footer is written after
//! the body has been drained, once the final balance is known.
//!
//! # Example
//!
//! ```
//! use csv2stmt::mapping::{FieldSpec, MappingSpec};
//! use csv2stmt::models::Row;
//! use csv2stmt::transform::pipeline::{convert, ConvertOptions, Outcome};
//!
//! let mapping = MappingSpec::new()
//!     .with_field("date", FieldSpec::column("date"))
//!     .with_field("amount", FieldSpec::column("amount"));
//! let rows = vec![Ok::<_, csv2stmt::error::PipelineError>(Row::from_pairs(
//!     0,
//!     [("date", "2021-01-01"), ("amount", "-50.00")],
//! ))];
//!
//! let mut out = Vec::new();
//! let outcome = convert(rows, &mapping, &ConvertOptions::default(), &mut out).unwrap();
//! assert!(matches!(outcome, Outcome::Converted(ref s) if s.count == 1));
//! assert!(String::from_utf8(out).unwrap().contains("<TRNAMT>-50.00</TRNAMT>"));
//! ```

use chrono::{Local, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

use super::aggregate::{default_tolerance, reconcile, Aggregator};
use super::filter::DateRange;
use super::grouper::{group_rows, DEFAULT_CHUNK_SIZE};
use super::normalizer::Normalizer;
use crate::error::{PipelineError, PipelineResult};
use crate::logs::{log_info, log_success, log_warning};
use crate::mapping::{FieldMapper, MappingSpec, SourceFormat};
use crate::models::{Row, Summary, Transaction};
use crate::parser::{read_source, RowReader};
use crate::render::qif::DEFAULT_DATE_FORMAT;
use crate::render::{BodyState, Format, RenderOptions};

/// Options for one conversion run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    /// Output grammar
    pub format: Format,

    /// Account type (CHECKING/SAVINGS/MONEYMRKT/CREDITLINE or Bank/Cash)
    pub account_type: Option<String>,

    /// Institution identifier, required in strict mode
    pub institution: Option<String>,

    /// Statement language code
    pub language: String,

    /// Extended headers and a mandatory, reconciled ending balance
    pub strict: bool,

    /// Inclusive lower date bound
    pub start: Option<NaiveDate>,

    /// Inclusive upper date bound
    pub end: Option<NaiveDate>,

    /// Attribute or column used to collapse split rows
    pub collapse: Option<String>,

    /// Rows grouped together at most
    pub chunk_size: usize,

    /// Balance before the first transaction
    pub opening_balance: Decimal,

    /// Expected ending balance
    pub ending_balance: Option<Decimal>,

    /// Statement generation time (default: now)
    pub server_date: Option<NaiveDateTime>,

    /// Read ambiguous dates day-first
    pub day_first: bool,

    /// Accepted difference when reconciling the ending balance
    pub balance_tolerance: Decimal,

    /// `strftime` layout of QIF dates
    pub qif_date_format: String,

    /// Source shape hints; the mapping's own hints take precedence
    pub source: SourceFormat,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            format: Format::Ofx,
            account_type: None,
            institution: None,
            language: "ENG".to_string(),
            strict: false,
            start: None,
            end: None,
            collapse: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            opening_balance: Decimal::ZERO,
            ending_balance: None,
            server_date: None,
            day_first: false,
            balance_tolerance: default_tolerance(),
            qif_date_format: DEFAULT_DATE_FORMAT.to_string(),
            source: SourceFormat::default(),
        }
    }
}

impl ConvertOptions {
    /// Renderer options for a run dated `server_date`
    pub fn render_options(&self, server_date: NaiveDateTime) -> RenderOptions {
        RenderOptions {
            account_type: self.account_type.clone(),
            institution: self.institution.clone(),
            strict: self.strict,
            start: self.start,
            end: self.end.or(Some(server_date.date())),
            date_format: Some(self.qif_date_format.clone()),
        }
    }
}

/// How a conversion ended
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// At least one transaction was written
    Converted(Summary),
    /// Nothing survived grouping and filtering; nothing was written
    Empty,
}

/// Lazy transaction stream: group, normalize and filter `rows`.
pub fn transactions<'a, I, E>(
    rows: I,
    mapping: &'a MappingSpec,
    options: &'a ConvertOptions,
) -> impl Iterator<Item = PipelineResult<Transaction>> + 'a
where
    I: IntoIterator<Item = Result<Row, E>> + 'a,
    I::IntoIter: 'a,
    E: Into<PipelineError> + 'a,
{
    let rows = rows.into_iter().map(|row| row.map_err(Into::into));
    let groups = group_rows(
        rows,
        FieldMapper::new(mapping),
        options.collapse.as_deref(),
        options.chunk_size,
    );
    let normalizer = Normalizer::new(mapping, options.day_first);
    let normalized = groups.map(move |group| -> PipelineResult<Transaction> {
        Ok(normalizer.normalize(&group?)?)
    });
    DateRange::new(options.start, options.end).retain(normalized)
}

/// Convert rows into a statement written to `out`.
///
/// The header is validated before any row is read but only written with the
/// first entry, so an empty result leaves `out` untouched.
pub fn convert<I, E, W>(
    rows: I,
    mapping: &MappingSpec,
    options: &ConvertOptions,
    out: &mut W,
) -> PipelineResult<Outcome>
where
    I: IntoIterator<Item = Result<Row, E>>,
    E: Into<PipelineError>,
    W: Write + ?Sized,
{
    let server_date = options
        .server_date
        .unwrap_or_else(|| Local::now().naive_local());
    let renderer = options.format.renderer(options.render_options(server_date));
    let header = renderer.header(server_date, &options.language)?;

    log_info(format!(
        "Converting to {} ({} rows per chunk{})",
        options.format,
        options.chunk_size,
        options
            .collapse
            .as_deref()
            .map(|key| format!(", collapsing on '{}'", key))
            .unwrap_or_default()
    ));

    let mut aggregator = Aggregator::new(
        transactions(rows, mapping, options),
        options.opening_balance,
    );
    let mut body = BodyState::default();
    for entry in aggregator.by_ref() {
        let entry = entry?;
        if body.is_first() {
            if let Some(header) = &header {
                out.write_all(header.as_bytes())?;
            }
        }
        out.write_all(body.render(renderer.as_ref(), &entry).as_bytes())?;
    }
    let summary = aggregator.into_summary();

    if summary.is_empty() {
        log_warning("No transactions to write");
        return Ok(Outcome::Empty);
    }
    log_success(format!(
        "{} transactions, final balance {}",
        summary.count, summary.final_balance
    ));

    if let Some(expected) = options.ending_balance {
        match reconcile(&summary, expected, options.balance_tolerance) {
            Ok(()) => log_success(format!("Ending balance {} reconciles", expected)),
            Err(mismatch) if options.strict => return Err(mismatch.into()),
            Err(mismatch) => log_warning(mismatch.to_string()),
        }
    }

    let balance = options.ending_balance.or(summary.statement_balance);
    if let Some(footer) = renderer.footer(server_date, balance, summary.last_account.as_deref())? {
        out.write_all(footer.as_bytes())?;
    }
    out.flush()?;

    Ok(Outcome::Converted(summary))
}

/// Read, decode and convert a CSV source.
///
/// The source is read to its end and decoded before conversion starts, so
/// memory grows with the input size. The O(chunk) bound of the later stages
/// applies on top of the decoded text.
pub fn convert_source<R, W>(
    source: R,
    mapping: &MappingSpec,
    options: &ConvertOptions,
    out: &mut W,
) -> PipelineResult<Outcome>
where
    R: Read,
    W: Write + ?Sized,
{
    let shape = mapping.source_format.or(&options.source);

    log_info("Reading CSV source...");
    let decoded = read_source(source, &shape)?;
    log_success(format!(
        "Encoding {}, separator '{}'",
        decoded.encoding,
        format_delimiter(decoded.delimiter)
    ));

    let rows = RowReader::from_decoded(decoded, &shape)?;
    if !rows.headers().is_empty() {
        log_info(format!("Columns: {}", rows.headers().join(", ")));
        if let Err(missing) = mapping.validate_headers(rows.headers()) {
            log_warning(format!("Mapping references absent columns: {}", missing.join(", ")));
        }
    }

    convert(rows, mapping, options, out)
}

/// Format delimiter for display
fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "TAB".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BalanceMismatch, RenderError, TransformError};
    use crate::mapping::{builtin, FieldSpec};
    use rust_decimal_macros::dec;

    fn mapping() -> MappingSpec {
        MappingSpec::new()
            .with_field("date", FieldSpec::column("date"))
            .with_field("amount", FieldSpec::column("amount"))
            .with_field("payee", FieldSpec::column("payee"))
            .with_field("account", FieldSpec::column("account"))
    }

    fn scenario_rows() -> Vec<PipelineResult<Row>> {
        vec![Ok(Row::from_pairs(
            0,
            [("date", "2021-01-01"), ("amount", "-50.00"), ("payee", "Grocer"), ("account", "Checking")],
        ))]
    }

    fn options() -> ConvertOptions {
        ConvertOptions {
            server_date: NaiveDate::from_ymd_opt(2021, 2, 1).and_then(|d| d.and_hms_opt(0, 0, 0)),
            ..Default::default()
        }
    }

    fn run(rows: Vec<PipelineResult<Row>>, mapping: &MappingSpec, options: &ConvertOptions) -> (PipelineResult<Outcome>, String) {
        let mut out = Vec::new();
        let outcome = convert(rows, mapping, options, &mut out);
        (outcome, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_default_options() {
        let opts = ConvertOptions::default();
        assert_eq!(opts.language, "ENG");
        assert_eq!(opts.chunk_size, 16384);
        assert_eq!(opts.qif_date_format, "%m/%d/%y");
        assert_eq!(opts.balance_tolerance, dec!(0.005));
        assert!(!opts.strict);
    }

    #[test]
    fn test_options_from_json() {
        let opts: ConvertOptions =
            serde_json::from_str(r#"{"format": "qif", "start": "2021-01-01", "opening_balance": "10.5"}"#).unwrap();
        assert_eq!(opts.format, Format::Qif);
        assert_eq!(opts.start, NaiveDate::from_ymd_opt(2021, 1, 1));
        assert_eq!(opts.opening_balance, dec!(10.5));
        assert_eq!(opts.language, "ENG");
    }

    #[test]
    fn test_single_debit_with_ending_balance() {
        let mapping = mapping();
        let opts = ConvertOptions { ending_balance: Some(dec!(-50.00)), ..options() };
        let (outcome, text) = run(scenario_rows(), &mapping, &opts);

        let summary = match outcome.unwrap() {
            Outcome::Converted(summary) => summary,
            Outcome::Empty => panic!("expected a statement"),
        };
        assert_eq!(summary.count, 1);
        assert_eq!(summary.final_balance, dec!(-50.00));
        assert!(text.starts_with("DATA:OFXSGML"));
        assert!(text.contains("<TRNAMT>-50.00</TRNAMT>"));
        assert!(text.contains("<BALAMT>-50.00</BALAMT>"));
        assert!(text.ends_with("</OFX>\n"));
    }

    #[test]
    fn test_everything_filtered_is_empty() {
        let mapping = mapping();
        let opts = ConvertOptions { end: NaiveDate::from_ymd_opt(2020, 12, 31), ..options() };
        let (outcome, text) = run(scenario_rows(), &mapping, &opts);
        assert_eq!(outcome.unwrap(), Outcome::Empty);
        assert!(text.is_empty());
    }

    #[test]
    fn test_strict_mismatch_fails() {
        let mapping = mapping();
        let opts = ConvertOptions {
            strict: true,
            institution: Some("BANK1".into()),
            ending_balance: Some(dec!(100.00)),
            ..options()
        };
        let (outcome, _) = run(scenario_rows(), &mapping, &opts);
        assert!(matches!(
            outcome,
            Err(PipelineError::Balance(BalanceMismatch { expected, actual }))
                if expected == dec!(100.00) && actual == dec!(-50.00)
        ));
    }

    #[test]
    fn test_strict_balance_within_tolerance() {
        let mapping = mapping();
        let opts = ConvertOptions {
            strict: true,
            institution: Some("BANK1".into()),
            ending_balance: Some(dec!(-50.004)),
            ..options()
        };
        let (outcome, text) = run(scenario_rows(), &mapping, &opts);
        assert!(matches!(outcome, Ok(Outcome::Converted(_))));
        assert!(text.contains("<INTU.BID>BANK1</INTU.BID>"));
        assert!(text.contains("<BALAMT>-50.00</BALAMT>"));
    }

    #[test]
    fn test_non_strict_mismatch_only_warns() {
        let mapping = mapping();
        let opts = ConvertOptions { ending_balance: Some(dec!(100.00)), ..options() };
        let (outcome, text) = run(scenario_rows(), &mapping, &opts);
        assert!(matches!(outcome, Ok(Outcome::Converted(_))));
        assert!(text.contains("<BALAMT>100.00</BALAMT>"));
    }

    #[test]
    fn test_strict_gate_requires_institution_before_reading() {
        let mapping = mapping();
        let opts = ConvertOptions { strict: true, ending_balance: Some(dec!(-50)), ..options() };
        let (outcome, text) = run(scenario_rows(), &mapping, &opts);
        assert!(matches!(
            outcome,
            Err(PipelineError::Render(RenderError::MissingRequiredField("institution")))
        ));
        assert!(text.is_empty());
    }

    #[test]
    fn test_strict_requires_ending_balance() {
        let mapping = mapping();
        let opts = ConvertOptions { strict: true, institution: Some("B".into()), ..options() };
        let (outcome, _) = run(scenario_rows(), &mapping, &opts);
        assert!(matches!(
            outcome,
            Err(PipelineError::Render(RenderError::MissingRequiredField("ending balance")))
        ));
    }

    #[test]
    fn test_collapse_double_entry() {
        let mapping = builtin("split").unwrap();
        let row = |ordinal, account: &str, amount: &str| -> PipelineResult<Row> {
            Ok(Row::from_pairs(
                ordinal,
                [
                    ("Transaction ID", "T1"),
                    ("Date", "2021-03-01"),
                    ("Number", ""),
                    ("Description", "Rent"),
                    ("Memo", ""),
                    ("Account", account),
                    ("Amount", amount),
                ],
            ))
        };
        let rows = vec![row(0, "Expenses:Rent", "1200"), row(1, "Assets:Checking", "-1200")];
        let opts = ConvertOptions { format: Format::Qif, collapse: Some("id".into()), ..options() };

        let (outcome, text) = run(rows, &mapping, &opts);
        match outcome.unwrap() {
            Outcome::Converted(summary) => {
                assert_eq!(summary.count, 1);
                assert_eq!(summary.final_balance, Decimal::ZERO);
            }
            Outcome::Empty => panic!("expected a statement"),
        }
        assert!(text.contains("T0.00\n"));
        assert_eq!(text.matches("\nS").count(), 2);
    }

    #[test]
    fn test_order_and_running_balance() {
        let mapping = mapping();
        let rows: Vec<PipelineResult<Row>> = [("2021-01-03", "5"), ("2021-01-01", "-2"), ("2021-01-02", "1")]
            .iter()
            .enumerate()
            .map(|(i, (date, amount))| {
                Ok(Row::from_pairs(i, [("date", *date), ("amount", *amount), ("payee", "P"), ("account", "A")]))
            })
            .collect();
        let opts = ConvertOptions { opening_balance: dec!(10), ..options() };

        let entries: Vec<Transaction> = transactions(rows.iter().map(|r| Ok(r.as_ref().unwrap().clone())).collect::<Vec<PipelineResult<Row>>>(), &mapping, &opts)
            .collect::<PipelineResult<_>>()
            .unwrap();
        let rows_out: Vec<usize> = entries.iter().map(|t| t.row).collect();
        assert_eq!(rows_out, vec![0, 1, 2]);

        let (outcome, _) = run(rows, &mapping, &opts);
        match outcome.unwrap() {
            Outcome::Converted(summary) => assert_eq!(summary.final_balance, dec!(14)),
            Outcome::Empty => panic!("expected a statement"),
        }
    }

    #[test]
    fn test_rerun_is_byte_identical() {
        let mapping = mapping();
        for format in [Format::Ofx, Format::Qif] {
            let opts = ConvertOptions { format, ending_balance: Some(dec!(-50)), ..options() };
            let (_, first) = run(scenario_rows(), &mapping, &opts);
            let (_, second) = run(scenario_rows(), &mapping, &opts);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_transform_error_aborts() {
        let mapping = mapping();
        let rows = vec![Ok(Row::from_pairs(0, [("date", "2021-01-01"), ("amount", "x"), ("payee", "P"), ("account", "A")]))];
        let (outcome, _) = run(rows, &mapping, &options());
        assert!(matches!(
            outcome,
            Err(PipelineError::Transform(TransformError::AmountParse { .. }))
        ));
    }

    #[test]
    fn test_convert_source_reads_csv() {
        let csv = "date;amount;payee;account\n2021-01-01;-50,00;Grocer;Checking\n";
        let mut mapping = mapping();
        mapping.amount_format = crate::mapping::AmountFormat::Comma;
        let opts = ConvertOptions { format: Format::Qif, ..options() };

        let mut out = Vec::new();
        let outcome = convert_source(csv.as_bytes(), &mapping, &opts, &mut out).unwrap();
        assert!(matches!(outcome, Outcome::Converted(_)));
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("D01/01/21\n"));
        assert!(text.contains("T-50.00\n"));
    }

    #[test]
    fn test_statement_balance_column_used_for_footer() {
        let mapping = mapping().with_field("balance", FieldSpec::column("balance"));
        let rows = vec![Ok(Row::from_pairs(
            0,
            [("date", "2021-01-01"), ("amount", "-5"), ("payee", "P"), ("account", "A"), ("balance", "95.00")],
        ))];
        let (outcome, text) = run(rows, &mapping, &options());
        assert!(outcome.is_ok());
        assert!(text.contains("<BALAMT>95.00</BALAMT>"));
    }
}

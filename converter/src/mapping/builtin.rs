//! Built-in mappings for common export layouts.

use rust_decimal::Decimal;

use std::collections::BTreeMap;

use super::operations::Operation;
use super::spec::{AmountFormat, FieldSpec, FieldTransform, MappingSpec, SourceFormat};
use crate::error::DeriveError;
use crate::models::Row;
use crate::transform::amount::parse_amount;

/// Names of the built-in mappings, in display order
pub const BUILTIN_NAMES: &[&str] = &["default", "mint", "split", "debit-credit"];

/// Look up a built-in mapping by name
pub fn builtin(name: &str) -> Option<MappingSpec> {
    match name {
        "default" => Some(default_mapping()),
        "mint" => Some(mint_mapping()),
        "split" => Some(split_mapping()),
        "debit-credit" => Some(debit_credit_mapping()),
        _ => None,
    }
}

/// All built-in mappings with their names
pub fn builtin_mappings() -> Vec<(&'static str, MappingSpec)> {
    BUILTIN_NAMES
        .iter()
        .filter_map(|name| builtin(name).map(|spec| (*name, spec)))
        .collect()
}

/// Generic single-entry export: one row per transaction
pub fn default_mapping() -> MappingSpec {
    let mut spec = MappingSpec::new()
        .with_field("date", FieldSpec::column("Date"))
        .with_field("amount", FieldSpec::column("Amount"))
        .with_field("payee", FieldSpec::column("Payee"))
        .with_field("desc", FieldSpec::column("Description"))
        .with_field("account", FieldSpec::column("Account"));
    spec.description = "Date, Amount, Payee, Description and Account columns".to_string();
    spec
}

/// Mint.com transaction export
pub fn mint_mapping() -> MappingSpec {
    let mut spec = MappingSpec::new()
        .with_field("date", FieldSpec::column("Date"))
        .with_field("amount", FieldSpec::column("Amount"))
        .with_field("type", FieldSpec::column("Transaction Type"))
        .with_field("payee", FieldSpec::column("Description"))
        .with_field("desc", FieldSpec::column("Original Description"))
        .with_field("notes", FieldSpec::column("Notes"))
        .with_field("category", FieldSpec::column("Category"))
        .with_field("account", FieldSpec::column("Account Name"));
    spec.description = "Mint.com export (debit/credit in Transaction Type)".to_string();
    spec
}

/// Double-entry export: one row per split, grouped by transaction id
pub fn split_mapping() -> MappingSpec {
    let mut spec = MappingSpec::new()
        .with_field("id", FieldSpec::column("Transaction ID"))
        .with_field("date", FieldSpec::column("Date"))
        .with_field("check_num", FieldSpec::column("Number"))
        .with_field("payee", FieldSpec::column("Description"))
        .with_field("desc", FieldSpec::column("Memo"))
        .with_field("account", FieldSpec::column("Account"))
        .with_field("amount", FieldSpec::column("Amount"));
    spec.description = "Double-entry splits; convert with --collapse id".to_string();
    spec.is_split = true;
    spec
}

/// Separate Debit and Credit columns plus a running Balance column
pub fn debit_credit_mapping() -> MappingSpec {
    let mut spec = MappingSpec::new()
        .with_field("date", FieldSpec::column("Date"))
        .with_field("payee", FieldSpec::column("Description"))
        .with_field("amount", FieldSpec::native(&["Debit", "Credit"], net_amount))
        .with_field("balance", FieldSpec::column("Balance"));
    spec.description = "Debit and Credit columns with a running Balance".to_string();
    spec
}

/// Annotated mapping for a semicolon-separated European export, printed by
/// `csv2stmt example-mapping` as a starting point for custom mappings.
pub fn example_mapping() -> MappingSpec {
    let kinds: BTreeMap<String, String> = [("S", "DEBIT"), ("H", "CREDIT")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let mut spec = MappingSpec::new()
        .with_field("date", FieldSpec::column("Buchungstag"))
        .with_field("amount", FieldSpec::column("Betrag"))
        .with_field(
            "type",
            FieldSpec::transform(FieldTransform::from_source("Soll/Haben").with_operation(Operation::Map {
                mapping: kinds,
                case_insensitive: true,
                default_unmapped: None,
            })),
        )
        .with_field(
            "payee",
            FieldSpec::transform(
                FieldTransform::from_source("Empfaenger")
                    .with_operation(Operation::Trim)
                    .with_operation(Operation::Replace { pattern: r"\s{2,}".to_string(), value: " ".to_string() })
                    .with_default("Unknown"),
            ),
        )
        .with_field(
            "desc",
            FieldSpec::transform(FieldTransform::from_sources(&["Verwendungszweck", "Kundenreferenz"], " / ")),
        )
        .with_field(
            "check_num",
            FieldSpec::transform(FieldTransform::from_source("Referenz").with_operation(Operation::DigitsOnly)),
        )
        .with_field("account", FieldSpec::literal("Girokonto"))
        .with_field("currency", FieldSpec::literal("EUR"));
    spec.description = "Example: German bank export with S/H debit-credit marker".to_string();
    spec.amount_format = AmountFormat::Comma;
    spec.date_format = Some("%d.%m.%Y".to_string());
    spec.source_format = SourceFormat {
        delimiter: Some(';'),
        encoding: Some("windows-1252".to_string()),
        ..Default::default()
    };
    spec
}

fn net_amount(row: &Row) -> Result<String, DeriveError> {
    let debit = column_amount(row, "Debit")?;
    let credit = column_amount(row, "Credit")?;
    Ok((credit - debit.abs()).to_string())
}

fn column_amount(row: &Row, column: &str) -> Result<Decimal, DeriveError> {
    let raw = row
        .get(column)
        .ok_or_else(|| format!("missing column '{}'", column))?;
    if raw.trim().is_empty() {
        return Ok(Decimal::ZERO);
    }
    parse_amount(raw, AmountFormat::Auto)
        .ok_or_else(|| format!("invalid {} amount '{}'", column.to_lowercase(), raw).into())
}

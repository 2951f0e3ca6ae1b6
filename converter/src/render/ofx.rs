//! OFX 1.x (SGML) statement grammar.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

use super::{entry_account_type, money, one_line, resolve_account_type, Format, RenderOptions, StatementRenderer};
use crate::error::{RenderError, RenderResult};
use crate::models::{Entry, Transaction};
use crate::transform::normalizer::stable_id;

/// Account types accepted in `ACCTTYPE`
pub const ACCOUNT_TYPES: &[&str] = &["CHECKING", "SAVINGS", "MONEYMRKT", "CREDITLINE"];

const STATUS_OK: &str = "<STATUS>\n<CODE>0</CODE>\n<SEVERITY>INFO</SEVERITY>\n</STATUS>";

/// Renders bank statements as OFX SGML.
#[derive(Debug, Clone)]
pub struct OfxRenderer {
    options: RenderOptions,
}

impl OfxRenderer {
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    fn open_account(&self, txn: &Transaction) -> String {
        let start = self.options.start.unwrap_or(txn.date);
        let end = self.options.end.unwrap_or(txn.date);
        let trnuid = match (&self.options.institution, self.options.strict) {
            (Some(institution), true) => {
                stable_id(&format!("{}:{}:{}", institution, txn.account_id, start))
            }
            _ => String::new(),
        };
        let account_type = entry_account_type(
            Format::Ofx,
            txn.account_type.as_deref(),
            self.options.account_type.as_deref(),
        );

        let mut out = String::new();
        push(&mut out, 2, "<STMTTRNRS>");
        push(&mut out, 3, &tag("TRNUID", &trnuid));
        push_block(&mut out, 3, STATUS_OK);
        push(&mut out, 3, "<STMTRS>");
        push(&mut out, 4, &tag("CURDEF", &txn.currency));
        push(&mut out, 4, "<BANKACCTFROM>");
        push(&mut out, 5, &tag("BANKID", &txn.bank_id));
        push(&mut out, 5, &tag("ACCTID", &txn.account_id));
        push(&mut out, 5, &tag("ACCTTYPE", account_type));
        push(&mut out, 4, "</BANKACCTFROM>");
        push(&mut out, 4, "<BANKTRANLIST>");
        push(&mut out, 5, &tag("DTSTART", &date_stamp(start)));
        push(&mut out, 5, &tag("DTEND", &date_stamp(end)));
        out
    }

    fn close_account(&self, ledger: Option<(Decimal, NaiveDateTime)>) -> String {
        let mut out = String::new();
        push(&mut out, 4, "</BANKTRANLIST>");
        if let Some((balance, date)) = ledger {
            push(&mut out, 4, "<LEDGERBAL>");
            push(&mut out, 5, &tag("BALAMT", &money(balance)));
            push(&mut out, 5, &tag("DTASOF", &timestamp(date)));
            push(&mut out, 4, "</LEDGERBAL>");
        }
        push(&mut out, 3, "</STMTRS>");
        push(&mut out, 2, "</STMTTRNRS>");
        out
    }
}

impl StatementRenderer for OfxRenderer {
    fn format(&self) -> Format {
        Format::Ofx
    }

    fn header(&self, date: NaiveDateTime, language: &str) -> RenderResult<Option<String>> {
        resolve_account_type(Format::Ofx, self.options.account_type.as_deref())?;
        let institution = match (&self.options.institution, self.options.strict) {
            (None, true) => return Err(RenderError::MissingRequiredField("institution")),
            (institution, _) => institution.as_deref(),
        };

        let mut out = String::from("DATA:OFXSGML\nENCODING:UTF-8\n");
        push(&mut out, 0, "<OFX>");
        push(&mut out, 1, "<SIGNONMSGSRSV1>");
        push(&mut out, 2, "<SONRS>");
        push_block(&mut out, 3, STATUS_OK);
        push(&mut out, 3, &tag("DTSERVER", &timestamp(date)));
        push(&mut out, 3, &tag("LANGUAGE", language));
        if let (true, Some(institution)) = (self.options.strict, institution) {
            push(&mut out, 3, "<FI>");
            push(&mut out, 4, &tag("ORG", institution));
            push(&mut out, 4, &tag("FID", institution));
            push(&mut out, 3, "</FI>");
            push(&mut out, 3, &tag("INTU.BID", institution));
        }
        push(&mut out, 2, "</SONRS>");
        push(&mut out, 1, "</SIGNONMSGSRSV1>");
        push(&mut out, 1, "<BANKMSGSRSV1>");
        Ok(Some(out))
    }

    fn transaction(&self, entry: &Entry, previous_account: Option<&str>) -> String {
        let txn = &entry.transaction;
        let mut out = String::new();

        match previous_account {
            None => out.push_str(&self.open_account(txn)),
            Some(previous) if previous != txn.account => {
                out.push_str(&self.close_account(None));
                out.push_str(&self.open_account(txn));
            }
            Some(_) => {}
        }

        push(&mut out, 5, "<STMTTRN>");
        push(&mut out, 6, &tag("TRNTYPE", txn.kind.as_str()));
        push(&mut out, 6, &tag("DTPOSTED", &date_stamp(txn.date)));
        push(&mut out, 6, &tag("TRNAMT", &money(txn.amount)));
        push(&mut out, 6, &tag("FITID", &txn.id));
        if let Some(check) = &txn.check_id {
            push(&mut out, 6, &tag("CHECKNUM", check));
        }
        if let Some(payee) = &txn.payee {
            push(&mut out, 6, &tag("NAME", payee));
        }
        if let Some(memo) = &txn.memo {
            push(&mut out, 6, &tag("MEMO", memo));
        }
        push(&mut out, 5, "</STMTTRN>");
        out
    }

    fn footer(
        &self,
        date: NaiveDateTime,
        balance: Option<Decimal>,
        _account: Option<&str>,
    ) -> RenderResult<Option<String>> {
        if self.options.strict && balance.is_none() {
            return Err(RenderError::MissingRequiredField("ending balance"));
        }
        let mut out = self.close_account(balance.map(|b| (b, date)));
        push(&mut out, 1, "</BANKMSGSRSV1>");
        push(&mut out, 0, "</OFX>");
        Ok(Some(out))
    }
}

fn push(out: &mut String, depth: usize, line: &str) {
    for _ in 0..depth {
        out.push('\t');
    }
    out.push_str(line);
    out.push('\n');
}

fn push_block(out: &mut String, depth: usize, block: &str) {
    let last = block.lines().count().saturating_sub(1);
    for (i, line) in block.lines().enumerate() {
        let inner = if i == 0 || i == last { 0 } else { 1 };
        push(out, depth + inner, line);
    }
}

fn tag(name: &str, value: &str) -> String {
    format!("<{0}>{1}</{0}>", name, escape(value))
}

fn escape(text: &str) -> String {
    one_line(text)
        .replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn date_stamp(date: NaiveDate) -> String {
    date.format("%Y%m%d000000").to_string()
}

fn timestamp(date: NaiveDateTime) -> String {
    date.format("%Y%m%d%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::test_support::{entry, server_date};
    use rust_decimal_macros::dec;

    fn renderer(strict: bool, institution: Option<&str>) -> OfxRenderer {
        OfxRenderer::new(RenderOptions {
            strict,
            institution: institution.map(str::to_string),
            ..Default::default()
        })
    }

    #[test]
    fn test_header() {
        let header = renderer(false, None).header(server_date(), "ENG").unwrap().unwrap();
        assert!(header.starts_with("DATA:OFXSGML\nENCODING:UTF-8\n<OFX>\n"));
        assert!(header.contains("\t\t\t<DTSERVER>20210203040506</DTSERVER>\n"));
        assert!(header.contains("<LANGUAGE>ENG</LANGUAGE>"));
        assert!(!header.contains("<FI>"));
        assert!(header.ends_with("\t<BANKMSGSRSV1>\n"));
    }

    #[test]
    fn test_strict_header_requires_institution() {
        assert_eq!(
            renderer(true, None).header(server_date(), "ENG"),
            Err(RenderError::MissingRequiredField("institution"))
        );
        let header = renderer(true, Some("BANK1")).header(server_date(), "ENG").unwrap().unwrap();
        assert!(header.contains("<ORG>BANK1</ORG>"));
        assert!(header.contains("<INTU.BID>BANK1</INTU.BID>"));
    }

    #[test]
    fn test_header_rejects_unknown_account_type() {
        let r = OfxRenderer::new(RenderOptions { account_type: Some("Cash".into()), ..Default::default() });
        assert!(matches!(
            r.header(server_date(), "ENG"),
            Err(RenderError::UnsupportedAccountType { .. })
        ));
    }

    #[test]
    fn test_first_transaction_opens_account() {
        let e = entry((2021, 1, 1), dec!(-50), "Checking", dec!(-50));
        let text = renderer(false, None).transaction(&e, None);
        assert!(text.contains("<STMTTRNRS>"));
        assert!(text.contains("<TRNUID></TRNUID>"));
        assert!(text.contains("<ACCTID>checking-id</ACCTID>"));
        assert!(text.contains("<ACCTTYPE>CHECKING</ACCTTYPE>"));
        assert!(text.contains("<DTSTART>20210101000000</DTSTART>"));
        assert!(text.contains("<TRNTYPE>DEBIT</TRNTYPE>"));
        assert!(text.contains("<TRNAMT>-50.00</TRNAMT>"));
        assert!(text.contains("<NAME>Grocer &amp; Co</NAME>"));
        assert!(!text.contains("<MEMO>"));
    }

    #[test]
    fn test_line_breaks_stay_inside_tags() {
        let mut e = entry((2021, 1, 1), dec!(-5), "Checking", dec!(-5));
        e.transaction.payee = Some("Store\n<TRNAMT>999.00".into());
        e.transaction.memo = Some("line1\r\nline2".into());

        let text = renderer(false, None).transaction(&e, None);
        assert!(text.contains("<NAME>Store &lt;TRNAMT&gt;999.00</NAME>\n"));
        assert!(text.contains("<MEMO>line1 line2</MEMO>\n"));
        assert_eq!(text.matches("<TRNAMT>").count(), 1);
        assert!(text.lines().all(|line| line.trim().starts_with('<')));
    }

    #[test]
    fn test_same_account_no_block() {
        let e = entry((2021, 1, 2), dec!(10), "Checking", dec!(10));
        let text = renderer(false, None).transaction(&e, Some("Checking"));
        assert!(text.trim_start().starts_with("<STMTTRN>"));
        assert!(text.contains("<TRNTYPE>CREDIT</TRNTYPE>"));
    }

    #[test]
    fn test_account_change_closes_block() {
        let e = entry((2021, 1, 2), dec!(10), "Savings", dec!(10));
        let text = renderer(false, None).transaction(&e, Some("Checking"));
        let close = text.find("</STMTTRNRS>").unwrap();
        let open = text.find("<STMTTRNRS>").unwrap();
        assert!(close < open);
        assert!(text.contains("<ACCTID>savings-id</ACCTID>"));
    }

    #[test]
    fn test_strict_trnuid_is_deterministic() {
        let e = entry((2021, 1, 1), dec!(1), "Checking", dec!(1));
        let r = renderer(true, Some("BANK1"));
        let a = r.transaction(&e, None);
        assert!(!a.contains("<TRNUID></TRNUID>"));
        assert_eq!(a, r.transaction(&e, None));
    }

    #[test]
    fn test_footer() {
        let footer = renderer(false, None).footer(server_date(), Some(dec!(-50)), None).unwrap().unwrap();
        assert!(footer.contains("<BALAMT>-50.00</BALAMT>"));
        assert!(footer.contains("<DTASOF>20210203040506</DTASOF>"));
        assert!(footer.ends_with("\t</BANKMSGSRSV1>\n</OFX>\n"));

        let bare = renderer(false, None).footer(server_date(), None, None).unwrap().unwrap();
        assert!(!bare.contains("LEDGERBAL"));

        assert_eq!(
            renderer(true, Some("B")).footer(server_date(), None, None),
            Err(RenderError::MissingRequiredField("ending balance"))
        );
    }
}

//! Tally response parsing.
//!
//! Import responses carry either a `LINEERROR` element or a `CREATED` count;
//! collection exports carry lists of named objects. Tally is also known to
//! emit raw control characters and numeric references to them, which no XML
//! parser accepts, so every body is sanitized before parsing.

use crate::error::{Error, Result};
use crate::types::{Company, Ledger, LedgerGroup};
use quick_xml::events::Event;
use quick_xml::Reader;

/// Outcome of an import request, as reported by Tally.
///
/// This is a classification, never an error: any response body, including one
/// that is not XML at all, maps onto one of these variants.
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    /// A positive created count was reported.
    Success { created: u32 },
    /// Tally rejected the content, or reported nothing created.
    Failure { reason: String },
}

impl PushOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PushOutcome::Success { .. })
    }
}

/// Classify an import response body.
///
/// A `LINEERROR` element wins over everything else and its text is preserved
/// verbatim. Otherwise a positive `CREATED` count is success and anything
/// else, including an unparseable body, is failure.
pub fn classify(body: &str) -> PushOutcome {
    let body = sanitize(body);
    let mut reader = Reader::from_str(&body);

    let mut current: Vec<u8> = Vec::new();
    let mut line_error: Option<String> = None;
    let mut created: Option<u32> = None;
    let mut saw_any_element = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                saw_any_element = true;
                current = e.name().as_ref().to_vec();
            }
            Ok(Event::Text(t)) => {
                let text = match t.unescape() {
                    Ok(text) => text.trim().to_string(),
                    Err(_) => continue,
                };
                match current.as_slice() {
                    b"LINEERROR" if line_error.is_none() => line_error = Some(text),
                    b"CREATED" if created.is_none() => created = text.parse().ok(),
                    _ => {}
                }
            }
            Ok(Event::End(_)) => current.clear(),
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return PushOutcome::Failure {
                    reason: format!("invalid response XML: {}", e),
                }
            }
        }
    }

    if let Some(reason) = line_error {
        let reason = if reason.is_empty() {
            "Unknown error".to_string()
        } else {
            reason
        };
        return PushOutcome::Failure { reason };
    }
    if !saw_any_element {
        return PushOutcome::Failure {
            reason: "invalid response XML: no elements in body".into(),
        };
    }
    match created {
        Some(n) if n > 0 => PushOutcome::Success { created: n },
        _ => PushOutcome::Failure {
            reason: "Voucher not created".into(),
        },
    }
}

/// Company names from a `List of Companies` export.
pub fn parse_companies(body: &str) -> Result<Vec<Company>> {
    let objects = collect_objects(body, b"COMPANY", &[b"NAME"])?;
    Ok(objects
        .into_iter()
        .filter_map(|mut fields| fields.remove(0))
        .map(|name| Company { name })
        .collect())
}

/// Ledger names and parent groups from an `All Ledgers` export.
///
/// Depending on the Tally version the name arrives either as a direct `NAME`
/// child or nested under `LANGUAGENAME.LIST/NAME.LIST/NAME`; capturing the
/// first `NAME` text inside the `LEDGER` element handles both shapes.
pub fn parse_ledgers(body: &str) -> Result<Vec<Ledger>> {
    let objects = collect_objects(body, b"LEDGER", &[b"NAME", b"PARENT"])?;
    Ok(objects
        .into_iter()
        .filter_map(|mut fields| {
            let parent = fields.remove(1).filter(|p| !p.is_empty());
            fields.remove(0).map(|name| Ledger { name, parent })
        })
        .collect())
}

/// Group names and parents from a `List of Groups` export.
pub fn parse_groups(body: &str) -> Result<Vec<LedgerGroup>> {
    let objects = collect_objects(body, b"GROUP", &[b"NAME", b"PARENT"])?;
    Ok(objects
        .into_iter()
        .filter_map(|mut fields| {
            let parent = fields.remove(1).filter(|p| !p.is_empty());
            fields.remove(0).map(|name| LedgerGroup { name, parent })
        })
        .collect())
}

/// Voucher type names from a `Voucher Types` export.
pub fn parse_voucher_types(body: &str) -> Result<Vec<String>> {
    let objects = collect_objects(body, b"VOUCHERTYPE", &[b"NAME"])?;
    Ok(objects
        .into_iter()
        .filter_map(|mut fields| fields.remove(0))
        .collect())
}

/// Scan for `object_tag` elements, capturing the first text of each listed
/// child field. One `Vec<Option<String>>` per object, in field order.
fn collect_objects(
    body: &str,
    object_tag: &[u8],
    fields: &[&[u8]],
) -> Result<Vec<Vec<Option<String>>>> {
    let body = sanitize(body);
    let mut reader = Reader::from_str(&body);

    let mut objects = Vec::new();
    let mut record: Option<Vec<Option<String>>> = None;
    let mut pending: Option<usize> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name();
                let name = name.as_ref();
                if name == object_tag {
                    record = Some(vec![None; fields.len()]);
                    pending = None;
                } else if record.is_some() {
                    pending = fields.iter().position(|f| *f == name);
                }
            }
            Ok(Event::Text(t)) => {
                if let (Some(ref mut rec), Some(idx)) = (record.as_mut(), pending) {
                    if rec[idx].is_none() {
                        let text = t
                            .unescape()
                            .map_err(|e| Error::Xml(e.to_string()))?
                            .trim()
                            .to_string();
                        rec[idx] = Some(text);
                    }
                }
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == object_tag {
                    if let Some(rec) = record.take() {
                        objects.push(rec);
                    }
                }
                pending = None;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(Error::Xml(e.to_string())),
        }
    }

    Ok(objects)
}

/// Strip characters Tally emits that are not legal in XML 1.0: raw control
/// characters and decimal character references below 0x20 (TAB/CR/LF stay).
pub fn sanitize(xml: &str) -> String {
    let mut out = String::with_capacity(xml.len());
    let mut rest = xml;
    while let Some(pos) = rest.find("&#") {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 2..];
        let mut consumed = false;
        if let Some(end) = after.find(';') {
            if let Ok(code) = after[..end].parse::<u32>() {
                if code < 0x20 && !matches!(code, 9 | 10 | 13) {
                    rest = &after[end + 1..];
                    consumed = true;
                }
            }
        }
        if !consumed {
            out.push_str("&#");
            rest = after;
        }
    }
    out.push_str(rest);
    out.retain(|c| !is_invalid_xml_char(c));
    out
}

fn is_invalid_xml_char(c: char) -> bool {
    matches!(c,
        '\u{00}'..='\u{08}'
        | '\u{0B}'
        | '\u{0C}'
        | '\u{0E}'..='\u{1F}'
        | '\u{7F}'..='\u{9F}'
        | '\u{FFFE}'
        | '\u{FFFF}')
}

//! Tally wire protocol request model.
//!
//! The ERP speaks one envelope shape with two request variants: a collection
//! export (`TALLYREQUEST=Export`, `TYPE=Collection`) and a data import
//! (`TALLYREQUEST=Import Data`) carrying ledger masters or vouchers. Both are
//! modeled as one tagged union rendered through `quick-xml`, which also takes
//! care of entity-escaping the uncontrolled narration text.

use crate::error::{Error, Result};
use chrono::NaiveDate;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use rust_decimal::Decimal;

/// A request to the Tally server.
#[derive(Debug, Clone, PartialEq)]
pub enum TallyRequest {
    /// Export a named collection of objects.
    Collection(CollectionQuery),
    /// Import masters or vouchers.
    Import(ImportRequest),
}

/// An export request fetching a named collection with a list of native
/// field names.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionQuery {
    /// Collection id, e.g. `All Ledgers`.
    pub id: String,
    /// Tally object type, e.g. `Ledger`.
    pub object_type: String,
    /// Native methods (fields) to fetch.
    pub native_methods: Vec<String>,
    /// Company context, when scoped.
    pub company: Option<String>,
}

impl CollectionQuery {
    /// The company list query. Not company-scoped.
    pub fn companies() -> Self {
        Self {
            id: "List of Companies".into(),
            object_type: "Company".into(),
            native_methods: vec!["NAME".into()],
            company: None,
        }
    }

    /// All ledger names and parent groups of a company.
    pub fn ledgers(company: &str) -> Self {
        Self {
            id: "All Ledgers".into(),
            object_type: "Ledger".into(),
            native_methods: vec!["NAME".into(), "PARENT".into()],
            company: Some(company.to_string()),
        }
    }

    /// All ledger group names and parent groups of a company.
    pub fn groups(company: &str) -> Self {
        Self {
            id: "List of Groups".into(),
            object_type: "Group".into(),
            native_methods: vec!["NAME".into(), "PARENT".into()],
            company: Some(company.to_string()),
        }
    }

    /// Voucher type names of a company.
    pub fn voucher_types(company: &str) -> Self {
        Self {
            id: "Voucher Types".into(),
            object_type: "Voucher Type".into(),
            native_methods: vec!["NAME".into()],
            company: Some(company.to_string()),
        }
    }
}

/// Target report of an import request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportName {
    /// Transactional voucher import.
    Vouchers,
    /// Master data (ledger) import.
    AllMasters,
}

impl ReportName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportName::Vouchers => "Vouchers",
            ReportName::AllMasters => "All Masters",
        }
    }
}

/// An import request holding one or more messages.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRequest {
    pub report: ReportName,
    /// Company context, when scoped.
    pub company: Option<String>,
    pub messages: Vec<TallyMessage>,
}

/// A single `TALLYMESSAGE`: either a ledger master or a voucher.
#[derive(Debug, Clone, PartialEq)]
pub enum TallyMessage {
    Ledger(LedgerMaster),
    Voucher(Voucher),
}

/// A `LEDGER` master element.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerMaster {
    pub name: String,
    pub parent: String,
    pub deemed_positive: bool,
    pub opening_balance: Decimal,
}

/// A double-entry `VOUCHER` element with exactly two ledger legs.
#[derive(Debug, Clone, PartialEq)]
pub struct Voucher {
    pub guid: String,
    pub number: String,
    pub date: NaiveDate,
    pub narration: String,
    /// Voucher type name, duplicated as the `VCHTYPE` attribute and the
    /// `VOUCHERTYPENAME` element per the schema's redundant convention.
    pub voucher_type: String,
    pub entries: Vec<LedgerEntry>,
}

/// One ledger leg of a voucher.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub ledger: String,
    pub deemed_positive: bool,
    pub amount: Decimal,
}

impl TallyRequest {
    /// Render the request as a UTF-8 XML document.
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(|e| Error::Xml(e.to_string()))?;

        match self {
            TallyRequest::Collection(query) => write_collection(&mut writer, query)?,
            TallyRequest::Import(import) => write_import(&mut writer, import)?,
        }

        String::from_utf8(writer.into_inner()).map_err(|e| Error::Xml(e.to_string()))
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

/// Tally's compact numeric date form.
pub fn tally_date(date: &NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

type XmlWriter = Writer<Vec<u8>>;

fn start(writer: &mut XmlWriter, name: &str) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(|e| Error::Xml(e.to_string()))
}

fn end(writer: &mut XmlWriter, name: &str) -> Result<()> {
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(|e| Error::Xml(e.to_string()))
}

fn text_element(writer: &mut XmlWriter, name: &str, text: &str) -> Result<()> {
    start(writer, name)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(|e| Error::Xml(e.to_string()))?;
    end(writer, name)
}

fn write_collection(writer: &mut XmlWriter, query: &CollectionQuery) -> Result<()> {
    start(writer, "ENVELOPE")?;

    start(writer, "HEADER")?;
    text_element(writer, "VERSION", "1")?;
    text_element(writer, "TALLYREQUEST", "Export")?;
    text_element(writer, "TYPE", "Collection")?;
    text_element(writer, "ID", &query.id)?;
    end(writer, "HEADER")?;

    start(writer, "BODY")?;
    start(writer, "DESC")?;
    start(writer, "STATICVARIABLES")?;
    text_element(writer, "SVEXPORTFORMAT", "$$SysName:XML")?;
    if let Some(ref company) = query.company {
        text_element(writer, "SVCURRENTCOMPANY", company)?;
    }
    end(writer, "STATICVARIABLES")?;
    start(writer, "TDL")?;
    start(writer, "TDLMESSAGE")?;

    let mut collection = BytesStart::new("COLLECTION");
    collection.push_attribute(("NAME", query.id.as_str()));
    collection.push_attribute(("ISINITIALIZE", "Yes"));
    writer
        .write_event(Event::Start(collection))
        .map_err(|e| Error::Xml(e.to_string()))?;
    text_element(writer, "TYPE", &query.object_type)?;
    for method in &query.native_methods {
        text_element(writer, "NATIVEMETHOD", method)?;
    }
    end(writer, "COLLECTION")?;

    end(writer, "TDLMESSAGE")?;
    end(writer, "TDL")?;
    end(writer, "DESC")?;
    end(writer, "BODY")?;
    end(writer, "ENVELOPE")
}

fn write_import(writer: &mut XmlWriter, import: &ImportRequest) -> Result<()> {
    start(writer, "ENVELOPE")?;

    start(writer, "HEADER")?;
    text_element(writer, "TALLYREQUEST", "Import Data")?;
    end(writer, "HEADER")?;

    start(writer, "BODY")?;
    start(writer, "IMPORTDATA")?;

    start(writer, "REQUESTDESC")?;
    text_element(writer, "REPORTNAME", import.report.as_str())?;
    if let Some(ref company) = import.company {
        start(writer, "STATICVARIABLES")?;
        text_element(writer, "SVCURRENTCOMPANY", company)?;
        end(writer, "STATICVARIABLES")?;
    }
    end(writer, "REQUESTDESC")?;

    start(writer, "REQUESTDATA")?;
    for message in &import.messages {
        start(writer, "TALLYMESSAGE")?;
        match message {
            TallyMessage::Ledger(ledger) => write_ledger(writer, ledger)?,
            TallyMessage::Voucher(voucher) => write_voucher(writer, voucher)?,
        }
        end(writer, "TALLYMESSAGE")?;
    }
    end(writer, "REQUESTDATA")?;

    end(writer, "IMPORTDATA")?;
    end(writer, "BODY")?;
    end(writer, "ENVELOPE")
}

fn write_ledger(writer: &mut XmlWriter, ledger: &LedgerMaster) -> Result<()> {
    let mut element = BytesStart::new("LEDGER");
    element.push_attribute(("NAME", ledger.name.as_str()));
    element.push_attribute(("RESERVEDNAME", ""));
    writer
        .write_event(Event::Start(element))
        .map_err(|e| Error::Xml(e.to_string()))?;

    text_element(writer, "NAME", &ledger.name)?;
    text_element(writer, "PARENT", &ledger.parent)?;
    text_element(writer, "ISDEEMEDPOSITIVE", yes_no(ledger.deemed_positive))?;
    text_element(writer, "OPENINGBALANCE", &ledger.opening_balance.to_string())?;

    end(writer, "LEDGER")
}

fn write_voucher(writer: &mut XmlWriter, voucher: &Voucher) -> Result<()> {
    let mut element = BytesStart::new("VOUCHER");
    element.push_attribute(("VCHTYPE", voucher.voucher_type.as_str()));
    element.push_attribute(("ACTION", "Create"));
    element.push_attribute(("OBJVIEW", "Accounting Voucher View"));
    writer
        .write_event(Event::Start(element))
        .map_err(|e| Error::Xml(e.to_string()))?;

    text_element(writer, "GUID", &voucher.guid)?;
    text_element(writer, "VOUCHERNUMBER", &voucher.number)?;
    text_element(writer, "DATE", &tally_date(&voucher.date))?;
    text_element(writer, "NARRATION", &voucher.narration)?;
    text_element(writer, "VOUCHERTYPENAME", &voucher.voucher_type)?;

    for entry in &voucher.entries {
        start(writer, "ALLLEDGERENTRIES.LIST")?;
        text_element(writer, "LEDGERNAME", &entry.ledger)?;
        text_element(writer, "ISDEEMEDPOSITIVE", yes_no(entry.deemed_positive))?;
        text_element(writer, "AMOUNT", &entry.amount.to_string())?;
        end(writer, "ALLLEDGERENTRIES.LIST")?;
    }

    end(writer, "VOUCHER")
}

#[cfg(test)]
mod tests {
    use super::*;
    use quick_xml::Reader;
    use std::str::FromStr;

    fn sample_voucher(narration: &str) -> Voucher {
        Voucher {
            guid: "VCH-REF1-20250401120000".into(),
            number: "REF1".into(),
            date: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            narration: narration.into(),
            voucher_type: "Payment".into(),
            entries: vec![
                LedgerEntry {
                    ledger: "HDFC Bank".into(),
                    deemed_positive: true,
                    amount: Decimal::from_str("-100.00").unwrap(),
                },
                LedgerEntry {
                    ledger: "Vendor".into(),
                    deemed_positive: false,
                    amount: Decimal::from_str("100.00").unwrap(),
                },
            ],
        }
    }

    #[test]
    fn test_collection_query_shape() {
        let xml = TallyRequest::Collection(CollectionQuery::ledgers("Acme"))
            .to_xml()
            .unwrap();
        assert!(xml.contains("<TALLYREQUEST>Export</TALLYREQUEST>"));
        assert!(xml.contains("<TYPE>Collection</TYPE>"));
        assert!(xml.contains("<ID>All Ledgers</ID>"));
        assert!(xml.contains("<COLLECTION NAME=\"All Ledgers\" ISINITIALIZE=\"Yes\">"));
        assert!(xml.contains("<NATIVEMETHOD>NAME</NATIVEMETHOD>"));
        assert!(xml.contains("<NATIVEMETHOD>PARENT</NATIVEMETHOD>"));
        assert!(xml.contains("<SVCURRENTCOMPANY>Acme</SVCURRENTCOMPANY>"));
        assert!(xml.contains("<SVEXPORTFORMAT>$$SysName:XML</SVEXPORTFORMAT>"));
    }

    #[test]
    fn test_group_query_shape() {
        let xml = TallyRequest::Collection(CollectionQuery::groups("Acme"))
            .to_xml()
            .unwrap();
        assert!(xml.contains("<ID>List of Groups</ID>"));
        assert!(xml.contains("<COLLECTION NAME=\"List of Groups\" ISINITIALIZE=\"Yes\">"));
        assert!(xml.contains("<TYPE>Group</TYPE>"));
        assert!(xml.contains("<NATIVEMETHOD>PARENT</NATIVEMETHOD>"));
    }

    #[test]
    fn test_import_voucher_shape() {
        let request = TallyRequest::Import(ImportRequest {
            report: ReportName::Vouchers,
            company: Some("Acme".into()),
            messages: vec![TallyMessage::Voucher(sample_voucher("April rent"))],
        });
        let xml = request.to_xml().unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<TALLYREQUEST>Import Data</TALLYREQUEST>"));
        assert!(xml.contains("<REPORTNAME>Vouchers</REPORTNAME>"));
        assert!(xml.contains(
            "<VOUCHER VCHTYPE=\"Payment\" ACTION=\"Create\" OBJVIEW=\"Accounting Voucher View\">"
        ));
        assert!(xml.contains("<DATE>20250401</DATE>"));
        assert!(xml.contains("<VOUCHERTYPENAME>Payment</VOUCHERTYPENAME>"));
        assert_eq!(xml.matches("<ALLLEDGERENTRIES.LIST>").count(), 2);
        assert!(xml.contains("<AMOUNT>-100.00</AMOUNT>"));
        assert!(xml.contains("<AMOUNT>100.00</AMOUNT>"));
    }

    #[test]
    fn test_ledger_master_shape() {
        let request = TallyRequest::Import(ImportRequest {
            report: ReportName::AllMasters,
            company: None,
            messages: vec![TallyMessage::Ledger(LedgerMaster {
                name: "Johndoe".into(),
                parent: "Sundry Creditors".into(),
                deemed_positive: false,
                opening_balance: Decimal::ZERO,
            })],
        });
        let xml = request.to_xml().unwrap();
        assert!(xml.contains("<REPORTNAME>All Masters</REPORTNAME>"));
        assert!(xml.contains("<LEDGER NAME=\"Johndoe\" RESERVEDNAME=\"\">"));
        assert!(xml.contains("<PARENT>Sundry Creditors</PARENT>"));
        assert!(xml.contains("<OPENINGBALANCE>0</OPENINGBALANCE>"));
    }

    #[test]
    fn test_narration_escaping_round_trips() {
        let narration = "Paid <vendor> for rope & tar \"qty>5\"";
        let request = TallyRequest::Import(ImportRequest {
            report: ReportName::Vouchers,
            company: None,
            messages: vec![TallyMessage::Voucher(sample_voucher(narration))],
        });
        let xml = request.to_xml().unwrap();
        // Raw specials must not survive unescaped inside the element.
        assert!(xml.contains("&lt;vendor&gt;"));
        assert!(xml.contains("&amp;"));

        // Parsing the document back must yield the original text losslessly.
        let mut reader = Reader::from_str(&xml);
        let mut in_narration = false;
        let mut recovered = String::new();
        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) if e.name().as_ref() == b"NARRATION" => in_narration = true,
                Ok(Event::Text(t)) if in_narration => {
                    recovered = t.unescape().unwrap().into_owned();
                    in_narration = false;
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => panic!("generated XML failed to parse: {}", e),
            }
        }
        assert_eq!(recovered, narration);
    }
}

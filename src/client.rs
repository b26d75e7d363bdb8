//! Synchronous transport to the Tally server.
//!
//! One blocking POST per document, a single configurable timeout, no retry.
//! Callers needing per-transaction granularity send one document per
//! transaction; bulk documents get one classification for the whole batch.

use crate::envelope::{CollectionQuery, TallyRequest};
use crate::error::Result;
use crate::response::{self, PushOutcome};
use crate::types::{Company, Ledger, LedgerGroup};
use std::time::Duration;
use tracing::debug;

/// Seam between the typed client and the wire. Lets tests drive the
/// orchestration against canned responses.
pub trait Transport {
    /// POST one XML document and return the raw response body.
    fn post_xml(&self, body: &str) -> Result<String>;
}

/// HTTP transport speaking `Content-Type: application/xml` in UTF-8.
pub struct HttpTransport {
    url: String,
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            url: url.to_string(),
            client,
        })
    }
}

impl Transport for HttpTransport {
    fn post_xml(&self, body: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/xml")
            .body(body.to_owned())
            .send()?
            .error_for_status()?;
        Ok(response.text()?)
    }
}

/// Typed client over a [`Transport`].
pub struct TallyClient<T> {
    transport: T,
}

impl TallyClient<HttpTransport> {
    /// Connect to a Tally endpoint over HTTP.
    pub fn connect(url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            transport: HttpTransport::new(url, timeout)?,
        })
    }
}

impl<T: Transport> TallyClient<T> {
    pub fn with_transport(transport: T) -> Self {
        Self { transport }
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send a request and return the raw response body.
    pub fn send(&self, request: &TallyRequest) -> Result<String> {
        let xml = request.to_xml()?;
        debug!(bytes = xml.len(), "sending request to Tally");
        self.transport.post_xml(&xml)
    }

    /// Send an import request and classify the response. Network failures
    /// surface as errors; everything the server answered becomes a
    /// [`PushOutcome`].
    pub fn import(&self, request: &TallyRequest) -> Result<PushOutcome> {
        let body = self.send(request)?;
        Ok(response::classify(&body))
    }

    /// Companies known to the Tally instance.
    pub fn companies(&self) -> Result<Vec<Company>> {
        let body = self.send(&TallyRequest::Collection(CollectionQuery::companies()))?;
        response::parse_companies(&body)
    }

    /// All ledgers of a company.
    pub fn ledgers(&self, company: &str) -> Result<Vec<Ledger>> {
        let body = self.send(&TallyRequest::Collection(CollectionQuery::ledgers(company)))?;
        response::parse_ledgers(&body)
    }

    /// All ledger groups of a company.
    pub fn groups(&self, company: &str) -> Result<Vec<LedgerGroup>> {
        let body = self.send(&TallyRequest::Collection(CollectionQuery::groups(company)))?;
        response::parse_groups(&body)
    }

    /// Voucher type names of a company.
    pub fn voucher_types(&self, company: &str) -> Result<Vec<String>> {
        let body = self.send(&TallyRequest::Collection(CollectionQuery::voucher_types(
            company,
        )))?;
        response::parse_voucher_types(&body)
    }

    /// Whether a ledger with this exact name exists in the company.
    pub fn ledger_exists(&self, name: &str, company: &str) -> Result<bool> {
        Ok(self.ledgers(company)?.iter().any(|l| l.name == name))
    }
}

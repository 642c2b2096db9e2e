use std::fmt;
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use crate::error::FetchError;

pub const DEFAULT_QUOTE_URL: &str = "https://stooq.com/q/l/?s={code}&f=sd2t2ohlcv&h&e=csv";

/// Index of the Open column in `Symbol,Date,Time,Open,High,Low,Close,Volume`.
const PRICE_FIELD: usize = 3;
const MIN_FIELDS: usize = 6;
const NO_DATA: &str = "N/D";

/// Raw market-data lookup. Returns the response body as text.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn fetch_raw(&self, code: &str) -> Result<String, FetchError>;
}

/* ---------------- HTTP ---------------- */
pub struct HttpQuoteSource {
    client:   Client,
    template: String,
}

impl HttpQuoteSource {
    /// `template` must contain `{code}`, e.g. [`DEFAULT_QUOTE_URL`].
    pub fn new(template: impl Into<String>) -> Self {
        Self { client: Client::new(), template: template.into() }
    }

    fn url_for(&self, code: &str) -> String {
        self.template.replace("{code}", code)
    }
}

#[async_trait]
impl QuoteSource for HttpQuoteSource {
    async fn fetch_raw(&self, code: &str) -> Result<String, FetchError> {
        let url = self.url_for(code);
        debug!(%url, "fetching quote");

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Fetch(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(FetchError::Fetch(format!("status {}", resp.status())));
        }

        resp.text().await.map_err(|e| FetchError::Read(e.to_string()))
    }
}

/* ---------------- 結果 ---------------- */
/// Every lookup lands in exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuoteOutcome {
    Invalid(String),
    FetchFailed(String),
    ReadFailed(String),
    NoData(String),
    Price { code: String, price: String },
}

impl fmt::Display for QuoteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuoteOutcome::Invalid(code)     => write!(f, "Invalid stock code: {code}"),
            QuoteOutcome::FetchFailed(code) => write!(f, "Error fetching stock data for {code}"),
            QuoteOutcome::ReadFailed(code)  => write!(f, "Error reading stock data for {code}"),
            QuoteOutcome::NoData(code)      => write!(f, "No data available for stock code {code}"),
            QuoteOutcome::Price { code, price } => write!(f, "{code} quote is ${price} per share"),
        }
    }
}

/// Trim + uppercase.
pub fn normalize(code: &str) -> String {
    code.trim().to_uppercase()
}

/// 2..=12 chars of `A-Z`, `0-9`, `.`, `-`. Expects normalized input.
pub fn is_valid_code(code: &str) -> bool {
    (2..=12).contains(&code.len())
        && code
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'.' || b == b'-')
}

/// Pulls the Open price out of a two-line CSV body.
fn parse_body(code: &str, body: &str) -> QuoteOutcome {
    let Some(line) = body.split('\n').nth(1) else {
        warn!(code, "unexpected data format from quote endpoint");
        return QuoteOutcome::NoData(code.to_string());
    };

    let fields: Vec<&str> = line.trim_end_matches('\r').split(',').collect();
    if fields.len() < MIN_FIELDS {
        warn!(code, "unexpected data format from quote endpoint");
        return QuoteOutcome::NoData(code.to_string());
    }

    match fields[PRICE_FIELD] {
        NO_DATA => QuoteOutcome::NoData(code.to_string()),
        price   => QuoteOutcome::Price { code: code.to_string(), price: price.to_string() },
    }
}

pub struct QuoteResolver<S> {
    source: S,
}

impl<S: QuoteSource> QuoteResolver<S> {
    pub fn new(source: S) -> Self { Self { source } }

    pub fn source(&self) -> &S { &self.source }

    pub async fn resolve(&self, raw_code: &str) -> QuoteOutcome {
        let code = normalize(raw_code);
        if !is_valid_code(&code) {
            return QuoteOutcome::Invalid(code);
        }

        match self.source.fetch_raw(&code).await {
            Ok(body) => parse_body(&code, &body),
            Err(FetchError::Fetch(e)) => {
                warn!(%code, "quote fetch failed: {e}");
                QuoteOutcome::FetchFailed(code)
            }
            Err(FetchError::Read(e)) => {
                warn!(%code, "quote body read failed: {e}");
                QuoteOutcome::ReadFailed(code)
            }
        }
    }

    /// Display form of [`resolve`](Self::resolve).
    pub async fn resolve_text(&self, raw_code: &str) -> String {
        self.resolve(raw_code).await.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const AAPL_BODY: &str = "Symbol,Date,Time,Open,High,Low,Close,Volume\nAAPL.US,2025-01-22,16:15:22,219.79,223.3528,219.79,222.4683,8385754";

    /// Canned endpoint that counts how often it was hit.
    pub struct FixedSource {
        pub reply: Result<String, FetchError>,
        pub calls: AtomicUsize,
    }

    impl FixedSource {
        pub fn body(body: &str) -> Self {
            Self { reply: Ok(body.to_string()), calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl QuoteSource for FixedSource {
        async fn fetch_raw(&self, _code: &str) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(b)                     => Ok(b.clone()),
                Err(FetchError::Fetch(e)) => Err(FetchError::Fetch(e.clone())),
                Err(FetchError::Read(e))  => Err(FetchError::Read(e.clone())),
            }
        }
    }

    #[tokio::test]
    async fn price_quote() {
        let r = QuoteResolver::new(FixedSource::body(AAPL_BODY));
        assert_eq!(r.resolve_text("aapl.us").await, "AAPL.US quote is $219.79 per share");
    }

    #[tokio::test]
    async fn invalid_code_never_hits_the_network() {
        let r = QuoteResolver::new(FixedSource::body(AAPL_BODY));
        assert_eq!(r.resolve_text("INVALID CODE").await, "Invalid stock code: INVALID CODE");
        assert_eq!(r.resolve_text("a").await, "Invalid stock code: A");
        assert_eq!(r.resolve_text("ABCDEFGHIJKLM").await, "Invalid stock code: ABCDEFGHIJKLM");
        assert_eq!(r.source().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn not_available_sentinel() {
        let r = QuoteResolver::new(FixedSource::body(
            "Symbol,Date,Time,Open,High,Low,Close,Volume\nBAD.US,N/D,N/D,N/D,N/D,N/D,N/D,N/D",
        ));
        assert_eq!(r.resolve_text("BAD").await, "No data available for stock code BAD");
    }

    #[tokio::test]
    async fn single_line_body() {
        let r = QuoteResolver::new(FixedSource::body("Unexpected,Data,Format"));
        assert_eq!(r.resolve_text("AAPL").await, "No data available for stock code AAPL");
    }

    #[tokio::test]
    async fn short_data_line() {
        let r = QuoteResolver::new(FixedSource::body("h\nA,B,C"));
        assert_eq!(r.resolve("msft").await, QuoteOutcome::NoData("MSFT".into()));
    }

    #[tokio::test]
    async fn crlf_body_still_parses() {
        let r = QuoteResolver::new(FixedSource::body(
            "Symbol,Date,Time,Open,High,Low,Close,Volume\r\nMSFT.US,2025-01-22,16:15:22,400.1,1,1,1,1\r\n",
        ));
        assert_eq!(r.resolve_text(" msft.us ").await, "MSFT.US quote is $400.1 per share");
    }

    #[tokio::test]
    async fn transport_failures_degrade_to_text() {
        let fetch = QuoteResolver::new(FixedSource {
            reply: Err(FetchError::Fetch("refused".into())),
            calls: AtomicUsize::new(0),
        });
        assert_eq!(fetch.resolve_text("aapl").await, "Error fetching stock data for AAPL");

        let read = QuoteResolver::new(FixedSource {
            reply: Err(FetchError::Read("eof".into())),
            calls: AtomicUsize::new(0),
        });
        assert_eq!(read.resolve_text("aapl").await, "Error reading stock data for AAPL");
    }

    #[test]
    fn validation_rules() {
        assert!(is_valid_code("BRK-B"));
        assert!(is_valid_code("AAPL.US"));
        assert!(!is_valid_code("aapl"));
        assert!(!is_valid_code("A_B"));
        assert!(!is_valid_code(""));
    }

    #[test]
    fn url_template_substitutes_code() {
        let src = HttpQuoteSource::new(DEFAULT_QUOTE_URL);
        assert_eq!(src.url_for("AAPL.US"), "https://stooq.com/q/l/?s=AAPL.US&f=sd2t2ohlcv&h&e=csv");
    }

    /// Local quote endpoint: 500 for `FAIL.US`, the AAPL row for anything else.
    async fn quote_server() -> String {
        use axum::{extract::Query, http::StatusCode, routing::get, Router};
        use std::collections::HashMap;

        let app = Router::new().route(
            "/q",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                match q.get("s").map(String::as_str) {
                    Some("FAIL.US") => (StatusCode::INTERNAL_SERVER_ERROR, String::from("boom")),
                    _               => (StatusCode::OK, AAPL_BODY.to_string()),
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service()).await.unwrap();
        });
        format!("http://{addr}/q?s={{code}}")
    }

    #[tokio::test]
    async fn http_source_error_status_is_fetch_failure() {
        let r = QuoteResolver::new(HttpQuoteSource::new(quote_server().await));
        assert_eq!(r.resolve("fail.us").await, QuoteOutcome::FetchFailed("FAIL.US".into()));
        assert_eq!(
            r.resolve("aapl.us").await,
            QuoteOutcome::Price { code: "AAPL.US".into(), price: "219.79".into() },
        );
    }

    #[tokio::test]
    async fn http_source_unreachable_is_fetch_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let r = QuoteResolver::new(HttpQuoteSource::new(format!("http://{addr}/q?s={{code}}")));
        assert_eq!(r.resolve_text("msft").await, "Error fetching stock data for MSFT");
    }
}

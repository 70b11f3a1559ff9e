//! Cursor-paged reads against the PatentsView search API.
//!
//! Pages are requested strictly in order: the `after` cursor of each request
//! is the sort key of the last record of the previous page. A 429 is waited
//! out on the calling thread and the same page is asked for again.

use crate::error::{ExtractError, Result};
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use serde_json::{json, Value};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://search.patentsview.org/api/v1";
pub const DEFAULT_PAGE_SIZE: usize = 1000;
/// Wait used when a 429 carries no usable `Retry-After`.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpReply {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn retry_after(&self) -> Duration {
        self.retry_after_at(Utc::now())
    }

    /// `Retry-After` is either delta-seconds or an HTTP-date. A date in the
    /// past means no wait.
    fn retry_after_at(&self, now: DateTime<Utc>) -> Duration {
        let Some(value) = self.header("retry-after").map(str::trim) else {
            return Duration::from_secs(DEFAULT_RETRY_AFTER_SECS);
        };
        if let Ok(secs) = value.parse::<u64>() {
            return Duration::from_secs(secs);
        }
        match DateTime::parse_from_rfc2822(value) {
            Ok(at) => (at.with_timezone(&Utc) - now).to_std().unwrap_or(Duration::ZERO),
            Err(_) => Duration::from_secs(DEFAULT_RETRY_AFTER_SECS),
        }
    }
}

pub trait Transport {
    fn get(&self, url: &str, params: &[(&str, String)]) -> Result<HttpReply>;
}

pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
    api_key: String,
}

impl ReqwestTransport {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, api_key: api_key.into() })
    }
}

impl Transport for ReqwestTransport {
    fn get(&self, url: &str, params: &[(&str, String)]) -> Result<HttpReply> {
        let response = self
            .client
            .get(url)
            .header("X-Api-Key", &self.api_key)
            .query(params)
            .send()?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect();
        let body = response.text()?;
        Ok(HttpReply { status, headers, body })
    }
}

/// One query against one collection. `sort_key` doubles as the cursor field.
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub endpoint: String,
    pub collection: String,
    pub query: Value,
    pub fields: Vec<String>,
    pub sort_key: String,
}

#[derive(Debug)]
struct Page {
    records: Vec<Value>,
    total_hits: u64,
}

pub struct PagedFetcher<T, S = ThreadSleeper> {
    transport: T,
    sleeper: S,
    base_url: String,
    page_size: usize,
    max_retries: Option<u32>,
}

impl<T: Transport, S: Sleeper> PagedFetcher<T, S> {
    pub fn new(transport: T, sleeper: S, base_url: impl Into<String>, page_size: usize) -> Self {
        Self {
            transport,
            sleeper,
            base_url: base_url.into(),
            page_size: page_size.max(1),
            max_retries: None,
        }
    }

    /// Caps how many times one page may be retried after a 429. `None` retries forever.
    pub fn with_max_retries(mut self, max_retries: Option<u32>) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn fetch_all(&self, request: &PageRequest) -> Result<Vec<Value>> {
        let url = format!("{}/{}/", self.base_url.trim_end_matches('/'), request.endpoint);
        info!("Fetching {} from {} (page size {})", request.collection, url, self.page_size);

        let mut records: Vec<Value> = Vec::new();
        let mut cursor: Option<Value> = None;
        let mut progress: Option<ProgressBar> = None;
        let mut pages = 0usize;

        loop {
            let page = self.fetch_page(&url, request, cursor.as_ref())?;
            pages += 1;
            let total = page.total_hits;
            let bar = progress.get_or_insert_with(|| new_progress_bar(total));
            bar.set_length(total);

            if page.records.is_empty() {
                debug!("Page {} of {} came back empty", pages, request.collection);
                break;
            }

            let next = page
                .records
                .last()
                .and_then(|r| r.get(&request.sort_key))
                .cloned()
                .ok_or_else(|| ExtractError::MissingField(request.sort_key.clone()))?;
            if cursor.as_ref() == Some(&next) {
                warn!(
                    "Page {} of {} did not advance past cursor {}; stopping",
                    pages, request.collection, next
                );
                break;
            }
            cursor = Some(next);
            records.extend(page.records);
            bar.set_position(records.len() as u64);

            if records.len() as u64 >= total {
                break;
            }
        }

        if let Some(bar) = progress {
            bar.finish_and_clear();
        }
        info!("Fetched {} {} in {} pages", records.len(), request.collection, pages);
        Ok(records)
    }

    fn fetch_page(&self, url: &str, request: &PageRequest, cursor: Option<&Value>) -> Result<Page> {
        let params = self.params(request, cursor);
        let mut rate_limited = 0u32;

        loop {
            let reply = self.transport.get(url, &params)?;
            match reply.status {
                200 => return parse_page(&reply.body, &request.collection),
                429 => {
                    rate_limited += 1;
                    if let Some(max) = self.max_retries {
                        if rate_limited > max {
                            return Err(ExtractError::RateLimitExhausted { attempts: rate_limited });
                        }
                    }
                    let wait = reply.retry_after();
                    warn!("Rate limited by {}; waiting {}s before retrying", url, wait.as_secs());
                    self.sleeper.sleep(wait);
                }
                status => {
                    return Err(ExtractError::Http { status, headers: reply.headers });
                }
            }
        }
    }

    fn params(&self, request: &PageRequest, cursor: Option<&Value>) -> Vec<(&'static str, String)> {
        let mut options = json!({ "size": self.page_size });
        if let Some(after) = cursor {
            options["after"] = after.clone();
        }
        let sort = json!([{ request.sort_key.as_str(): "asc" }]);

        vec![
            ("q", request.query.to_string()),
            ("f", json!(request.fields).to_string()),
            ("o", options.to_string()),
            ("s", sort.to_string()),
        ]
    }
}

fn parse_page(body: &str, collection: &str) -> Result<Page> {
    let mut value: Value = serde_json::from_str(body)?;
    let total_hits = value
        .get("total_hits")
        .and_then(Value::as_u64)
        .ok_or_else(|| ExtractError::MissingField("total_hits".to_string()))?;
    let records = match value.get_mut(collection).map(Value::take) {
        Some(Value::Array(items)) => items,
        // the API sends null for a collection with no matches
        Some(Value::Null) => Vec::new(),
        _ => return Err(ExtractError::MissingField(collection.to_string())),
    };
    Ok(Page { records, total_hits })
}

fn new_progress_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} records ({eta})")
    {
        bar.set_style(style.progress_chars("=> "));
    }
    bar
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Replays canned replies in order and records every request.
    #[derive(Default)]
    pub struct ScriptedTransport {
        pub replies: RefCell<VecDeque<HttpReply>>,
        pub requests: RefCell<Vec<Vec<(String, String)>>>,
    }

    impl ScriptedTransport {
        pub fn new(replies: Vec<HttpReply>) -> Self {
            Self { replies: RefCell::new(replies.into()), requests: RefCell::default() }
        }

        pub fn param(&self, request: usize, name: &str) -> Option<Value> {
            self.requests.borrow()[request]
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| serde_json::from_str(v).unwrap())
        }
    }

    impl Transport for ScriptedTransport {
        fn get(&self, _url: &str, params: &[(&str, String)]) -> Result<HttpReply> {
            self.requests
                .borrow_mut()
                .push(params.iter().map(|(k, v)| (k.to_string(), v.clone())).collect());
            Ok(self.replies.borrow_mut().pop_front().expect("no scripted reply left"))
        }
    }

    #[derive(Default)]
    pub struct RecordingSleeper {
        pub slept: RefCell<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.slept.borrow_mut().push(duration);
        }
    }

    pub fn ok(collection: &str, records: Value, total_hits: u64) -> HttpReply {
        let count = records.as_array().map_or(0, Vec::len);
        HttpReply {
            status: 200,
            headers: vec![],
            body: json!({ collection: records, "count": count, "total_hits": total_hits }).to_string(),
        }
    }

    pub fn status(code: u16, headers: &[(&str, &str)]) -> HttpReply {
        HttpReply {
            status: code,
            headers: headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            body: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn request() -> PageRequest {
        PageRequest {
            endpoint: "patent".to_string(),
            collection: "patents".to_string(),
            query: json!({ "assignees.assignee_id": ["a1"] }),
            fields: vec!["patent_id".to_string()],
            sort_key: "patent_id".to_string(),
        }
    }

    fn fetcher(replies: Vec<HttpReply>) -> PagedFetcher<ScriptedTransport, RecordingSleeper> {
        PagedFetcher::new(ScriptedTransport::new(replies), RecordingSleeper::default(), DEFAULT_BASE_URL, 2)
    }

    #[test]
    fn advances_cursor_until_total_reached() {
        let f = fetcher(vec![
            ok("patents", json!([{ "patent_id": "1" }, { "patent_id": "2" }]), 3),
            ok("patents", json!([{ "patent_id": "3" }]), 3),
        ]);
        let records = f.fetch_all(&request()).unwrap();
        let ids: Vec<_> = records.iter().map(|r| r["patent_id"].as_str().unwrap()).collect();
        assert_eq!(ids, ["1", "2", "3"]);

        assert_eq!(f.transport.param(0, "o").unwrap(), json!({ "size": 2 }));
        assert_eq!(f.transport.param(1, "o").unwrap(), json!({ "size": 2, "after": "2" }));
        assert_eq!(f.transport.param(1, "s").unwrap(), json!([{ "patent_id": "asc" }]));
        assert_eq!(
            f.transport.param(0, "q").unwrap(),
            json!({ "assignees.assignee_id": ["a1"] })
        );
    }

    #[test]
    fn stops_on_empty_page_before_total() {
        let f = fetcher(vec![
            ok("patents", json!([{ "patent_id": "1" }, { "patent_id": "2" }]), 10),
            ok("patents", json!([]), 10),
        ]);
        assert_eq!(f.fetch_all(&request()).unwrap().len(), 2);
        assert_eq!(f.transport.requests.borrow().len(), 2);
    }

    #[test]
    fn null_collection_is_an_empty_page() {
        let f = fetcher(vec![HttpReply {
            status: 200,
            headers: vec![],
            body: r#"{"patents": null, "count": 0, "total_hits": 0}"#.to_string(),
        }]);
        assert!(f.fetch_all(&request()).unwrap().is_empty());
    }

    #[test]
    fn rate_limit_sleeps_then_keeps_page_once() {
        let f = fetcher(vec![
            status(429, &[("Retry-After", "2")]),
            ok("patents", json!([{ "patent_id": "1" }, { "patent_id": "2" }]), 2),
        ]);
        let records = f.fetch_all(&request()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(*f.sleeper.slept.borrow(), vec![Duration::from_secs(2)]);
        // the retry repeats the exact same page request
        let requests = f.transport.requests.borrow();
        assert_eq!(requests[0], requests[1]);
    }

    #[test]
    fn missing_retry_after_uses_default_wait() {
        let f = fetcher(vec![status(429, &[]), ok("patents", json!([]), 0)]);
        f.fetch_all(&request()).unwrap();
        assert_eq!(
            *f.sleeper.slept.borrow(),
            vec![Duration::from_secs(DEFAULT_RETRY_AFTER_SECS)]
        );
    }

    #[test]
    fn retry_cap_gives_up() {
        let f = fetcher(vec![status(429, &[("retry-after", "1")]), status(429, &[("retry-after", "1")])])
            .with_max_retries(Some(1));
        let err = f.fetch_all(&request()).unwrap_err();
        assert!(matches!(err, ExtractError::RateLimitExhausted { attempts: 2 }));
        assert_eq!(f.sleeper.slept.borrow().len(), 1);
    }

    #[test]
    fn other_statuses_are_fatal_with_headers() {
        let f = fetcher(vec![status(500, &[("X-Request-Id", "abc")])]);
        match f.fetch_all(&request()).unwrap_err() {
            ExtractError::Http { status, headers } => {
                assert_eq!(status, 500);
                assert_eq!(headers, vec![("X-Request-Id".to_string(), "abc".to_string())]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_total_hits_is_an_error() {
        let f = fetcher(vec![HttpReply {
            status: 200,
            headers: vec![],
            body: r#"{"patents": []}"#.to_string(),
        }]);
        assert!(matches!(
            f.fetch_all(&request()),
            Err(ExtractError::MissingField(field)) if field == "total_hits"
        ));
    }

    #[test]
    fn repeated_cursor_stops_without_duplicates() {
        let page = || ok("patents", json!([{ "patent_id": "1" }, { "patent_id": "2" }]), 10);
        let f = fetcher(vec![page(), page()]);
        let records = f.fetch_all(&request()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(f.transport.requests.borrow().len(), 2);
    }

    #[test]
    fn retry_after_accepts_http_dates() {
        let now = DateTime::parse_from_rfc3339("2015-10-21T07:27:30Z")
            .unwrap()
            .with_timezone(&Utc);
        let dated = status(429, &[("Retry-After", "Wed, 21 Oct 2015 07:28:00 GMT")]);
        assert_eq!(dated.retry_after_at(now), Duration::from_secs(30));

        let past = status(429, &[("Retry-After", "Wed, 21 Oct 2015 07:00:00 GMT")]);
        assert_eq!(past.retry_after_at(now), Duration::ZERO);

        let garbage = status(429, &[("Retry-After", "soon")]);
        assert_eq!(garbage.retry_after_at(now), Duration::from_secs(DEFAULT_RETRY_AFTER_SECS));
    }
}

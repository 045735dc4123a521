//! Configuration-driven adapter for static HTML listings.
//!
//! Uses reqwest for HTTP and the scraper crate for CSS selection. No
//! JavaScript rendering, so it only suits sources whose listing and detail
//! pages are served as plain HTML.
//!
//! Field selectors select element text by default. A trailing `@attr`
//! selects an attribute instead, e.g. `img.photo@src`.

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::error::{AdapterError, AdapterResult};
use crate::registry::SourceRegistry;
use crate::traits::adapter::SourceAdapter;
use crate::types::config::duration_ms;
use crate::types::record::Record;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Describes one selector-based source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorSourceConfig {
    /// Source id used in scrape requests
    pub id: String,

    /// Matches one listing entry
    pub item_selector: String,

    /// Link inside a listing entry; its `href` becomes the record URL
    #[serde(default = "default_link_selector")]
    pub link_selector: String,

    /// Field name to selector, evaluated inside each listing entry
    #[serde(default)]
    pub fields: BTreeMap<String, String>,

    /// Elements whose text holds page numbers; the largest wins
    #[serde(default)]
    pub total_pages_selector: Option<String>,

    /// Query parameter carrying the page number
    #[serde(default = "default_page_param")]
    pub page_param: String,

    /// Field name to selector, evaluated on each detail page.
    /// Detail pages are only fetched when this is non-empty.
    #[serde(default)]
    pub detail_fields: BTreeMap<String, String>,

    #[serde(default)]
    pub user_agent: Option<String>,

    #[serde(default = "default_request_timeout", with = "duration_ms")]
    pub request_timeout: Duration,
}

fn default_link_selector() -> String {
    "a[href]".to_string()
}

fn default_page_param() -> String {
    "page".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

impl SelectorSourceConfig {
    pub fn new(id: impl Into<String>, item_selector: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            item_selector: item_selector.into(),
            link_selector: default_link_selector(),
            fields: BTreeMap::new(),
            total_pages_selector: None,
            page_param: default_page_param(),
            detail_fields: BTreeMap::new(),
            user_agent: None,
            request_timeout: default_request_timeout(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, selector: impl Into<String>) -> Self {
        self.fields.insert(name.into(), selector.into());
        self
    }

    pub fn with_detail_field(mut self, name: impl Into<String>, selector: impl Into<String>) -> Self {
        self.detail_fields.insert(name.into(), selector.into());
        self
    }

    pub fn with_total_pages_selector(mut self, selector: impl Into<String>) -> Self {
        self.total_pages_selector = Some(selector.into());
        self
    }
}

/// Register one factory per source definition.
pub fn register_selector_sources(
    registry: &mut SourceRegistry,
    sources: impl IntoIterator<Item = SelectorSourceConfig>,
) {
    for source in sources {
        let id = source.id.clone();
        registry.register(id, move || Box::new(SelectorAdapter::new(source.clone())));
    }
}

/// Adapter driven by a [`SelectorSourceConfig`].
pub struct SelectorAdapter {
    config: SelectorSourceConfig,
    client: Option<reqwest::Client>,
}

impl SelectorAdapter {
    pub fn new(config: SelectorSourceConfig) -> Self {
        Self {
            config,
            client: None,
        }
    }

    pub fn config(&self) -> &SelectorSourceConfig {
        &self.config
    }

    async fn fetch_html(&self, url: &str) -> AdapterResult<String> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| AdapterError::Initialize("adapter used before initialize".into()))?;

        let response = client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.text().await?)
    }

    /// Largest page number found, or `None` if nothing parses.
    fn parse_total_pages(&self, html: &str, url: &str) -> AdapterResult<Option<u32>> {
        let Some(css) = &self.config.total_pages_selector else {
            return Ok(Some(1));
        };
        let selector = parse_selector(css, url)?;
        let document = Html::parse_document(html);

        Ok(document
            .select(&selector)
            .filter_map(|el| {
                let text: String = el.text().collect();
                let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
                digits.parse::<u32>().ok()
            })
            .max())
    }

    fn parse_listing(&self, html: &str, page_url: &str) -> AdapterResult<Vec<Record>> {
        let base = Url::parse(page_url).map_err(|_| AdapterError::InvalidUrl {
            url: page_url.to_string(),
        })?;
        let item_selector = parse_selector(&self.config.item_selector, page_url)?;
        let link_selector = parse_selector(&self.config.link_selector, page_url)?;
        let fields = compile_fields(&self.config.fields, page_url)?;

        let document = Html::parse_document(html);
        let mut records = Vec::new();

        for item in document.select(&item_selector) {
            let href = item
                .value()
                .attr("href")
                .or_else(|| item.select(&link_selector).next().and_then(|a| a.value().attr("href")));

            let Some(url) = href.and_then(|href| base.join(href).ok()) else {
                debug!(page_url, "listing entry without a usable link, skipping");
                continue;
            };

            let mut record = Record::new(url.as_str(), &self.config.id);
            for (name, field) in &fields {
                if let Some(value) = field.extract(item) {
                    record = record.with_field(name.as_str(), value);
                }
            }
            records.push(record);
        }

        Ok(records)
    }

    fn parse_detail(&self, html: &str, detail_url: &str) -> AdapterResult<Option<Record>> {
        let fields = compile_fields(&self.config.detail_fields, detail_url)?;
        let document = Html::parse_document(html);
        let root = document.root_element();

        let mut record = Record::new(detail_url, &self.config.id);
        let mut found = false;
        for (name, field) in &fields {
            if let Some(value) = field.extract(root) {
                record = record.with_field(name.as_str(), value);
                found = true;
            }
        }

        Ok(found.then_some(record))
    }
}

#[async_trait]
impl SourceAdapter for SelectorAdapter {
    fn source_id(&self) -> &str {
        &self.config.id
    }

    async fn initialize(&mut self) -> AdapterResult<()> {
        if self.client.is_some() {
            return Ok(());
        }

        let user_agent = self
            .config
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

        let client = reqwest::Client::builder()
            .timeout(self.config.request_timeout)
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| AdapterError::Initialize(e.to_string()))?;

        self.client = Some(client);
        Ok(())
    }

    async fn cleanup(&mut self) -> AdapterResult<()> {
        self.client = None;
        Ok(())
    }

    async fn total_pages(&self, listing_url: &str) -> AdapterResult<u32> {
        let html = self.fetch_html(listing_url).await?;

        match self.parse_total_pages(&html, listing_url) {
            Ok(Some(pages)) if pages > 0 => Ok(pages),
            Ok(_) => {
                warn!(url = listing_url, "no page count found, assuming 1");
                Ok(1)
            }
            Err(e) => {
                warn!(url = listing_url, error = %e, "page count extraction failed, assuming 1");
                Ok(1)
            }
        }
    }

    fn page_url(&self, listing_url: &str, page: u32) -> String {
        let param = self.config.page_param.as_str();

        match Url::parse(listing_url) {
            Ok(mut url) => {
                let kept: Vec<(String, String)> = url
                    .query_pairs()
                    .filter(|(key, _)| key != param)
                    .map(|(key, value)| (key.into_owned(), value.into_owned()))
                    .collect();
                url.query_pairs_mut()
                    .clear()
                    .extend_pairs(kept)
                    .append_pair(param, &page.to_string());
                url.to_string()
            }
            Err(_) => {
                let separator = if listing_url.contains('?') { '&' } else { '?' };
                format!("{}{}{}={}", listing_url, separator, param, page)
            }
        }
    }

    async fn scrape_list(&self, page_url: &str) -> AdapterResult<Vec<Record>> {
        let html = self.fetch_html(page_url).await?;
        let records = self.parse_listing(&html, page_url)?;
        debug!(page_url, count = records.len(), "parsed listing page");
        Ok(records)
    }

    async fn scrape_item(&self, detail_url: &str) -> AdapterResult<Option<Record>> {
        let html = self.fetch_html(detail_url).await?;
        self.parse_detail(&html, detail_url)
    }

    fn fetches_details(&self) -> bool {
        !self.config.detail_fields.is_empty()
    }
}

/// One compiled field selector.
struct FieldSelector {
    selector: Selector,
    attr: Option<String>,
}

impl FieldSelector {
    fn extract(&self, scope: ElementRef<'_>) -> Option<String> {
        let el = scope.select(&self.selector).next()?;
        let value = match &self.attr {
            Some(attr) => el.value().attr(attr)?.trim().to_string(),
            None => el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" "),
        };
        (!value.is_empty()).then_some(value)
    }
}

fn parse_selector(css: &str, url: &str) -> AdapterResult<Selector> {
    Selector::parse(css).map_err(|e| AdapterError::Extraction {
        url: url.to_string(),
        reason: format!("invalid selector {:?}: {}", css, e),
    })
}

fn compile_fields(
    fields: &BTreeMap<String, String>,
    url: &str,
) -> AdapterResult<Vec<(String, FieldSelector)>> {
    fields
        .iter()
        .map(|(name, raw)| {
            let (css, attr) = match raw.rsplit_once('@') {
                Some((css, attr)) if !attr.is_empty() && !attr.contains(' ') => {
                    (css, Some(attr.to_string()))
                }
                _ => (raw.as_str(), None),
            };
            let selector = parse_selector(css, url)?;
            Ok((name.clone(), FieldSelector { selector, attr }))
        })
        .collect()
}

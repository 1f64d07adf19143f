//! HTTP client for the polovniautomobili.com classifieds search.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::NaiveDateTime;
use chrono::Utc;
use governor::Jitter;
use governor::Quota;
use governor::RateLimiter;
use governor::clock::QuantaClock;
use governor::state::InMemoryState;
use governor::state::direct::NotKeyed;
use log::debug;
use log::info;
use scraper::ElementRef;
use scraper::Html;
use scraper::Selector;
use url::Url;

use crate::entity::RawListing;
use crate::marketplace::CrawlParams;
use crate::marketplace::MarketplaceClient;
use crate::marketplace::PARAM_CHASSIS;
use crate::marketplace::PARAM_MODEL;
use crate::marketplace::PARAM_REGION;
use crate::marketplace::error::MarketplaceError;

const SEARCH_PATH: &str = "/auto-oglasi/pretraga";
const RENEW_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const MULTI_VALUE_PARAMS: [&str; 3] = [PARAM_MODEL, PARAM_REGION, PARAM_CHASSIS];

/// Marketplace client that paces page requests to avoid being blocked.
pub struct PolovniAutoClient {
    base_url: Url,
    page_limit: u32,
    jitter: Duration,
    client: wreq::Client,
    limiter: RateLimiter<NotKeyed, InMemoryState, QuantaClock>,
}

impl PolovniAutoClient {
    /// Creates a client fetching at most `page_limit` pages per crawl, spacing requests by
    /// `page_delay` plus up to `jitter` of random delay.
    pub fn new(
        base_url: &str,
        page_limit: u32,
        page_delay: Duration,
        jitter: Duration,
    ) -> Result<Self, MarketplaceError> {
        let base_url = Url::parse(base_url)?;
        let client = wreq::Client::builder()
            .emulation(wreq_util::Emulation::Chrome137)
            .build()
            .map_err(|e| MarketplaceError::ClientInit {
                message: e.to_string(),
            })?;
        let quota = Quota::with_period(page_delay)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MAX));

        info!(
            "Initializing marketplace client for {} (page limit {}, delay {:?})",
            base_url, page_limit, page_delay
        );

        Ok(Self {
            base_url,
            page_limit: page_limit.max(1),
            jitter,
            client,
            limiter: RateLimiter::direct(quota),
        })
    }

    /// Builds the search URL for one result page.
    pub fn build_url(&self, params: &CrawlParams, page: u32) -> Result<Url, MarketplaceError> {
        let mut url = self.base_url.join(SEARCH_PATH)?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                if key == "page" {
                    continue;
                }
                if MULTI_VALUE_PARAMS.contains(&key.as_str()) {
                    for item in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                        query.append_pair(key, item);
                    }
                } else {
                    query.append_pair(key, value);
                }
            }
            query.append_pair("page", &page.to_string());
        }
        Ok(url)
    }

    /// Parses the classified cards of one result page.
    pub fn parse_listings(&self, body: &str) -> Result<Vec<RawListing>, MarketplaceError> {
        let document = Html::parse_document(body);
        let article = selector("article.classified")?;
        let title_link = selector("a.ga-title")?;
        let info_top = selector("div.setInfo div.top")?;
        let info_bottom = selector("div.setInfo div.bottom")?;
        let city = selector("div.city")?;

        let mut listings = Vec::new();
        for card in document.select(&article) {
            let id = attr(&card, "data-classifiedid");
            if id.is_empty() {
                return Err(MarketplaceError::ParseFailure {
                    message: "classified card without `data-classifiedid`".to_string(),
                });
            }

            let link_el = card.select(&title_link).next();
            let title = link_el.map(|el| attr(&el, "title")).unwrap_or_default();
            let href = link_el.map(|el| attr(&el, "href")).unwrap_or_default();

            let tops: Vec<String> = card.select(&info_top).map(|el| text(&el)).collect();
            let (year, body_type) = split_year_and_body(tops.first().map_or("", String::as_str));

            listings.push(RawListing {
                id,
                title,
                price: attr(&card, "data-price"),
                year,
                engine_volume: card
                    .select(&info_bottom)
                    .next()
                    .map(|el| text(&el))
                    .unwrap_or_default(),
                transmission: tops.get(2).cloned().unwrap_or_default(),
                body_type,
                mileage: tops.get(1).cloned().unwrap_or_default(),
                location: card.select(&city).next().map(|el| text(&el)).unwrap_or_default(),
                link: self.absolute_link(&href),
                date: parse_renew_date(&attr(&card, "data-renewdate")),
            });
        }

        Ok(listings)
    }

    /// Parses the chassis `<select>` of the landing page.
    pub fn parse_chassis(&self, body: &str) -> Result<HashMap<String, String>, MarketplaceError> {
        let document = Html::parse_document(body);
        let option = selector("#chassis option")?;

        Ok(document
            .select(&option)
            .filter_map(|el| {
                let value = attr(&el, "value");
                (!value.is_empty()).then(|| (text(&el), value))
            })
            .collect())
    }

    fn absolute_link(&self, href: &str) -> String {
        if href.is_empty() || href.starts_with("http") {
            return href.to_string();
        }
        self.base_url
            .join(href)
            .map_or_else(|_| href.to_string(), |u| u.to_string())
    }

    async fn fetch_page(&self, url: &Url) -> Result<String, MarketplaceError> {
        self.limiter
            .until_ready_with_jitter(Jitter::up_to(self.jitter))
            .await;

        let request = self.client.get(url.as_str()).build()?;
        debug!("Visiting {}", request.url());

        let response = tokio::time::timeout(REQUEST_TIMEOUT, self.client.execute(request))
            .await
            .map_err(|_| MarketplaceError::Timeout {
                url: url.to_string(),
            })??;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(MarketplaceError::UnexpectedStatus {
                status,
                url: url.to_string(),
            });
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl MarketplaceClient for PolovniAutoClient {
    async fn fetch_listings(
        &self,
        params: &CrawlParams,
    ) -> Result<Vec<RawListing>, MarketplaceError> {
        let mut all = Vec::new();

        for page in 1..=self.page_limit {
            let url = self.build_url(params, page)?;
            let body = self.fetch_page(&url).await?;
            let listings = self.parse_listings(&body)?;
            if listings.is_empty() {
                break;
            }
            debug!("Parsed {} listings from page {}", listings.len(), page);
            all.extend(listings);
        }

        Ok(all)
    }

    async fn fetch_chassis(&self) -> Result<HashMap<String, String>, MarketplaceError> {
        let body = self.fetch_page(&self.base_url).await?;
        let chassis = self.parse_chassis(&body)?;
        info!("Found {} chassis types", chassis.len());
        Ok(chassis)
    }
}

fn selector(css: &str) -> Result<Selector, MarketplaceError> {
    Selector::parse(css).map_err(|e| MarketplaceError::ParseFailure {
        message: format!("invalid selector `{css}`: {e:?}"),
    })
}

fn attr(el: &ElementRef, name: &str) -> String {
    el.value().attr(name).unwrap_or_default().trim().to_string()
}

fn text(el: &ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Splits the "2001. Limuzina" info line into year and body type.
fn split_year_and_body(line: &str) -> (String, String) {
    match line.split_once('.') {
        Some((year, body)) => (year.trim().to_string(), body.trim().to_string()),
        None => (String::new(), String::new()),
    }
}

fn parse_renew_date(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, RENEW_DATE_FORMAT)
        .ok()
        .map(|dt| dt.and_utc())
}

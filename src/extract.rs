//! Listing-card extraction from rendered search pages.
//!
//! Extraction runs in two passes: a textual pre-filter drops the image
//! carousels (the bulk of each card's markup), then the remaining document is
//! parsed and every listing card is read in document order.
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::{NormalizedItem, RawItem};
use crate::normalize::normalize;

pub const CARD_SELECTOR: &str = "a.ItemCardList__item";
pub const PRICE_SELECTOR: &str = ".ItemCard__price";

static CAROUSEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<tsl-item-card-images-carousel[^>]*>[\s\S]*?</tsl-item-card-images-carousel>")
        .expect("valid carousel pattern")
});
static CARD: Lazy<Selector> = Lazy::new(|| Selector::parse(CARD_SELECTOR).expect("valid card selector"));
static PRICE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(PRICE_SELECTOR).expect("valid price selector"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("rendered document is empty")]
    EmptyDocument,
}

/// Remove every image carousel block. Non-greedy, so adjacent carousels are
/// removed one by one and the cards between them survive.
pub fn sanitize(markup: &str) -> String {
    CAROUSEL.replace_all(markup, "").into_owned()
}

pub fn extract(markup: &str) -> Result<Vec<RawItem>, ExtractError> {
    if markup.trim().is_empty() {
        return Err(ExtractError::EmptyDocument);
    }
    let sanitized = sanitize(markup);
    debug!(
        before = markup.len(),
        after = sanitized.len(),
        "sanitized rendered markup"
    );

    let document = Html::parse_document(&sanitized);
    let items = document
        .select(&CARD)
        .map(|card| {
            let attr = |name: &str| card.value().attr(name).unwrap_or_default().to_string();
            let raw_price = card
                .select(&PRICE)
                .next()
                .map(|el| el.text().collect::<String>())
                .unwrap_or_default();
            RawItem {
                link: attr("href"),
                title: attr("title"),
                raw_price: raw_price.trim().to_string(),
            }
        })
        .collect();
    Ok(items)
}

/// Extract and normalize in one pass. Items whose price cannot be normalized
/// are logged and skipped; the rest of the page is still returned.
pub fn extract_items(markup: &str) -> Result<Vec<NormalizedItem>, ExtractError> {
    let raw = extract(markup)?;
    let items = raw
        .into_iter()
        .filter_map(|item| match normalize(&item.raw_price) {
            Ok(price) => Some(NormalizedItem {
                link: item.link,
                title: item.title,
                price,
            }),
            Err(err) => {
                warn!(link = %item.link, raw_price = %item.raw_price, %err, "skipping item with unreadable price");
                None
            }
        })
        .collect();
    Ok(items)
}

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::types::{Source, SourceRecord};

/// Product links taken from one search results page.
pub const MAX_RESULTS_PER_SEARCH: usize = 5;

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid selector {css:?}: {e}"))
}

static SEL_ANCHOR: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));

static SEL_PE_NAME: LazyLock<Selector> =
    LazyLock::new(|| selector(".MedicineOverviewSection_medicineName__9K61u"));
static SEL_PE_BRAND: LazyLock<Selector> =
    LazyLock::new(|| selector(".MedicineOverviewSection_brandName__tyUH_"));
static SEL_PE_PACKAGING: LazyLock<Selector> =
    LazyLock::new(|| selector(".MedicineOverviewSection_measurementUnit__rPGh_"));
static SEL_PE_PRICE: LazyLock<Selector> = LazyLock::new(|| selector(".PriceInfo_ourPrice__A549p"));
static SEL_PE_PRICE_DECIMAL: LazyLock<Selector> =
    LazyLock::new(|| selector(".PriceInfo_unitPriceDecimal__i3Shz"));
static SEL_PE_MRP: LazyLock<Selector> =
    LazyLock::new(|| selector(".PriceInfo_striked__fmcJv.PriceInfo_costPrice__jhiax"));
static SEL_PE_DISCOUNT: LazyLock<Selector> =
    LazyLock::new(|| selector(".PriceInfo_discountContainer__wTilO"));
static SEL_PE_DISCOUNT_GCD: LazyLock<Selector> =
    LazyLock::new(|| selector(".PriceInfo_gcdDiscountPercent__FvJsG"));
static SEL_PE_UNIT_PRICE: LazyLock<Selector> =
    LazyLock::new(|| selector(".PriceInfo_originalMrp__TQJRs span"));
static SEL_PE_STRIKED: LazyLock<Selector> = LazyLock::new(|| selector(".PriceInfo_striked__fmcJv"));

static SEL_AP_NAME: LazyLock<Selector> = LazyLock::new(|| selector("h1.Jf"));
static SEL_AP_BRAND: LazyLock<Selector> = LazyLock::new(|| selector("div.Xl.Yl"));
static SEL_AP_PRICE: LazyLock<Selector> = LazyLock::new(|| selector(r#"p[class*="rF_"]"#));
static SEL_AP_DISCOUNT: LazyLock<Selector> = LazyLock::new(|| selector(r#"p[class*="tF_"]"#));
static SEL_AP_UNIT_PRICE: LazyLock<Selector> = LazyLock::new(|| selector("span.m.n"));

static RE_BRAND_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*By\s+").expect("invalid regex: brand prefix"));

fn elem_text(element: ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Trimmed text of the first match of the first selector that matches.
fn first_text(document: &Html, selectors: &[&Selector]) -> Option<String> {
    selectors
        .iter()
        .find_map(|sel| document.select(sel).next())
        .map(elem_text)
}

fn rupees(amount: &str) -> Option<String> {
    let amount = amount.replace('₹', "");
    let amount = amount.trim();
    (!amount.is_empty()).then(|| format!("₹{amount}"))
}

fn absolute_url(base: &str, href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), href.trim_start_matches('/'))
    }
}

/// Collects distinct product links from a search results page.
pub fn parse_search_results(html: &str, source: Source, base_url: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(&SEL_ANCHOR) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };

        let link = match source {
            Source::Pharmeasy => {
                if !href.contains("/online-medicine-order/") || href.contains("/browse") {
                    continue;
                }
                absolute_url(base_url, href)
            }
            Source::Apollo => {
                if !href.contains("/otc/") {
                    continue;
                }
                let path = href.split('?').next().unwrap_or(href);
                absolute_url(base_url, path)
            }
        };

        if seen.insert(link.clone()) {
            links.push(link);
        }
        if links.len() >= MAX_RESULTS_PER_SEARCH {
            break;
        }
    }

    links
}

/// Extracts a product observation from a pharmeasy product page.
///
/// Fields whose element is missing are left unset.
pub fn parse_pharmeasy_product(html: &str) -> SourceRecord {
    let document = Html::parse_document(html);

    let brand = first_text(&document, &[&*SEL_PE_BRAND])
        .map(|b| RE_BRAND_PREFIX.replace(&b, "").trim().to_string());

    let price = first_text(&document, &[&*SEL_PE_PRICE, &*SEL_PE_PRICE_DECIMAL])
        .and_then(|p| rupees(&p));

    let unit_price = first_text(&document, &[&*SEL_PE_UNIT_PRICE, &*SEL_PE_STRIKED])
        .filter(|u| u.contains('/'))
        .and_then(|u| rupees(&u));

    SourceRecord {
        name: first_text(&document, &[&*SEL_PE_NAME]),
        brand,
        packaging: first_text(&document, &[&*SEL_PE_PACKAGING]),
        price,
        mrp: first_text(&document, &[&*SEL_PE_MRP]),
        discount: first_text(&document, &[&*SEL_PE_DISCOUNT, &*SEL_PE_DISCOUNT_GCD]),
        unit_price,
        source: Some(Source::Pharmeasy.slug().to_string()),
    }
}

/// Extracts a product observation from an apollo product page.
pub fn parse_apollo_product(html: &str) -> SourceRecord {
    let document = Html::parse_document(html);

    SourceRecord {
        name: first_text(&document, &[&*SEL_AP_NAME]),
        brand: first_text(&document, &[&*SEL_AP_BRAND]),
        packaging: None,
        price: first_text(&document, &[&*SEL_AP_PRICE]),
        mrp: None,
        discount: first_text(&document, &[&*SEL_AP_DISCOUNT]),
        unit_price: first_text(&document, &[&*SEL_AP_UNIT_PRICE]),
        source: Some(Source::Apollo.slug().to_string()),
    }
}

pub fn parse_product(html: &str, source: Source) -> SourceRecord {
    match source {
        Source::Pharmeasy => parse_pharmeasy_product(html),
        Source::Apollo => parse_apollo_product(html),
    }
}

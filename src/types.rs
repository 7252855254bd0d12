use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt::Display;

use crate::pricing::{lenient_flag, lenient_number};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Pharmeasy,
    Apollo,
}

impl Source {
    pub const ALL: [Source; 2] = [Source::Pharmeasy, Source::Apollo];

    /// Table name and the value written to the `source` column of raw rows.
    pub fn slug(&self) -> &'static str {
        match self {
            Source::Pharmeasy => "pharmeasy",
            Source::Apollo => "apollo",
        }
    }

    /// Tag written to `combined_data.source`.
    pub fn label(&self) -> &'static str {
        match self {
            Source::Pharmeasy => "Pharmeasy",
            Source::Apollo => "Apollo",
        }
    }
}

impl Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One product observation at one pharmacy, exactly as scraped.
///
/// `packaging` and `mrp` are only populated by pharmeasy; the apollo table
/// has no such columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub name: Option<String>,
    pub brand: Option<String>,
    pub packaging: Option<String>,
    pub price: Option<String>,
    pub mrp: Option<String>,
    pub discount: Option<String>,
    pub unit_price: Option<String>,
    pub source: Option<String>,
}

impl SourceRecord {
    /// The row as a JSON object holding exactly the columns of `source`'s table.
    pub fn to_row_json(&self, source: Source) -> Value {
        match source {
            Source::Pharmeasy => json!({
                "name": self.name,
                "brand": self.brand,
                "packaging": self.packaging,
                "price": self.price,
                "mrp": self.mrp,
                "discount": self.discount,
                "unit_price": self.unit_price,
                "source": self.source,
            }),
            Source::Apollo => json!({
                "name": self.name,
                "brand": self.brand,
                "price": self.price,
                "discount": self.discount,
                "unit_price": self.unit_price,
                "source": self.source,
            }),
        }
    }
}

/// A row of the merged view.
///
/// `price` and `discount` carry the stored text; their numeric forms come from
/// [`crate::pricing::parse_price`] and [`crate::pricing::parse_discount`].
/// The JSON form keeps that text as scraped (`"₹50"`, `"10% off"`), while
/// `best_price` and `best_offer` are plain numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedRecord {
    pub name: Option<String>,
    pub brand: Option<String>,
    pub source: Option<String>,
    pub price: Option<String>,
    pub discount: Option<String>,
    pub best_price: Option<f64>,
    pub best_offer: Option<f64>,
}

impl CombinedRecord {
    pub fn price_value(&self) -> Option<f64> {
        crate::pricing::parse_price(self.price.as_deref())
    }

    pub fn discount_value(&self) -> Option<f64> {
        crate::pricing::parse_discount(self.discount.as_deref())
    }
}

impl Display for CombinedRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let opt = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
        let num = |v: Option<f64>| v.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "{} | {} | {} | price {} | discount {} | best price {} | best offer {}",
            opt(&self.name),
            opt(&self.brand),
            opt(&self.source),
            opt(&self.price),
            opt(&self.discount),
            num(self.best_price),
            num(self.best_offer),
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Price,
    Discount,
}

/// A caller's override for one `(name, brand)` pair.
///
/// Numeric fields accept numbers or numeric strings; anything else is unset.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UpdateRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub best_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub best_offer: Option<f64>,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub force_clear: bool,
}

impl UpdateRequest {
    pub fn new(name: impl Into<String>, brand: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            brand: Some(brand.into()),
            ..Default::default()
        }
    }

    pub fn with_best_price(mut self, value: f64) -> Self {
        self.best_price = Some(value);
        self
    }

    pub fn with_best_offer(mut self, value: f64) -> Self {
        self.best_offer = Some(value);
        self
    }

    pub fn cleared(mut self) -> Self {
        self.force_clear = true;
        self
    }

    /// The `(name, brand)` key, if both parts are present and non-empty.
    pub fn key(&self) -> Option<(&str, &str)> {
        let name = self.name.as_deref().filter(|s| !s.is_empty())?;
        let brand = self.brand.as_deref().filter(|s| !s.is_empty())?;
        Some((name, brand))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum UpdateBody {
    Single(UpdateRequest),
    Batch(Vec<UpdateRequest>),
}

impl UpdateBody {
    pub fn into_requests(self) -> Vec<UpdateRequest> {
        match self {
            UpdateBody::Single(request) => vec![request],
            UpdateBody::Batch(requests) => requests,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResetRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
}

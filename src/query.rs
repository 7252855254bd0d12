use std::cmp::Ordering;

use crate::types::{CombinedRecord, SortKey};

/// Orders the combined view.
///
/// By price: ascending, rows whose price does not parse go last.
/// By discount: descending, rows whose discount does not parse count as `0.0`.
/// The sort is stable, so ties keep storage order.
pub fn list_sorted(mut records: Vec<CombinedRecord>, sort_by: SortKey) -> Vec<CombinedRecord> {
    match sort_by {
        SortKey::Price => records.sort_by(|a, b| {
            let a = a.price_value().unwrap_or(f64::INFINITY);
            let b = b.price_value().unwrap_or(f64::INFINITY);
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }),
        SortKey::Discount => records.sort_by(|a, b| {
            let a = a.discount_value().unwrap_or(0.0);
            let b = b.discount_value().unwrap_or(0.0);
            b.partial_cmp(&a).unwrap_or(Ordering::Equal)
        }),
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, price: Option<&str>, discount: Option<&str>) -> CombinedRecord {
        CombinedRecord {
            name: Some(name.to_string()),
            brand: Some("Cipla".to_string()),
            source: Some("Apollo".to_string()),
            price: price.map(str::to_string),
            discount: discount.map(str::to_string),
            best_price: None,
            best_offer: None,
        }
    }

    fn names(records: &[CombinedRecord]) -> Vec<&str> {
        records.iter().filter_map(|r| r.name.as_deref()).collect()
    }

    #[test]
    fn test_sort_by_price_puts_unparsable_last() {
        let records = vec![
            record("missing", None, None),
            record("pricey", Some("₹1,200"), None),
            record("bad", Some("N/A"), None),
            record("cheap", Some("₹45.50"), None),
        ];

        let sorted = list_sorted(records, SortKey::Price);
        assert_eq!(names(&sorted), vec!["cheap", "pricey", "missing", "bad"]);
    }

    #[test]
    fn test_sort_by_discount_descending() {
        let records = vec![
            record("cashback", Some("₹10"), Some("5% cb")),
            record("small", Some("₹10"), Some("5% off")),
            record("big", Some("₹10"), Some("25% off")),
            record("none", Some("₹10"), None),
            record("medium", Some("₹10"), Some("12%")),
        ];

        let sorted = list_sorted(records, SortKey::Discount);
        assert_eq!(
            names(&sorted),
            vec!["big", "medium", "small", "cashback", "none"]
        );
    }
}

use crate::pricing::{compute_mrp, derive_override, has_cashback_marker};
use crate::store::{Store, StoreError};
use crate::types::UpdateRequest;

/// What happened to a single override request.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Updated {
        best_price: Option<f64>,
        best_offer: Option<f64>,
    },
    /// No `name` or no `brand` in the request.
    MissingKey,
    NotFound,
    /// Neither value was supplied and no clear was requested.
    Unchanged,
    /// The stored price could not be parsed; the row was left as is.
    InvalidPrice,
}

/// Decides the override pair to persist for a request.
///
/// `force_clear` wins over everything. Otherwise the missing half is derived
/// from the MRP, unless there is no MRP or the discount is a cashback offer.
pub fn resolve_override(
    mrp: Option<f64>,
    cashback: bool,
    request: &UpdateRequest,
) -> (Option<f64>, Option<f64>) {
    if request.force_clear {
        return (None, None);
    }
    match mrp {
        Some(mrp) if !cashback => derive_override(mrp, request.best_price, request.best_offer),
        _ => (request.best_price, request.best_offer),
    }
}

pub struct Reconciler<'a> {
    store: &'a Store,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Applies one override request to the matching combined row(s).
    pub fn apply(&self, request: &UpdateRequest) -> Result<Outcome, StoreError> {
        let Some((name, brand)) = request.key() else {
            log::warn!("Skipping update without name or brand: {:?}", request);
            return Ok(Outcome::MissingKey);
        };

        let Some(record) = self.store.find_combined(name, brand)? else {
            log::warn!("No entry found for {} ({})", name, brand);
            return Ok(Outcome::NotFound);
        };

        let Some(price) = record.price_value() else {
            log::error!(
                "Skipping {} ({}) due to bad price: {:?}",
                name,
                brand,
                record.price
            );
            return Ok(Outcome::InvalidPrice);
        };

        if !request.force_clear && request.best_price.is_none() && request.best_offer.is_none() {
            log::debug!("Nothing to apply for {} ({}), leaving it untouched", name, brand);
            return Ok(Outcome::Unchanged);
        }

        let discount = record.discount_value();
        if discount.is_none() {
            log::warn!(
                "Discount unparsable for {} ({}): {:?}, proceeding without derivation",
                name,
                brand,
                record.discount
            );
        }
        let mrp = compute_mrp(price, discount);

        let cashback = has_cashback_marker(record.discount.as_deref());
        let (best_price, best_offer) = resolve_override(mrp, cashback, request);

        log::debug!(
            "{} ({}): price {}, discount {:?}, mrp {:?} -> best_price {:?}, best_offer {:?}",
            name,
            brand,
            price,
            discount,
            mrp,
            best_price,
            best_offer
        );

        self.store.set_override(name, brand, best_price, best_offer)?;
        Ok(Outcome::Updated {
            best_price,
            best_offer,
        })
    }

    /// Applies requests in order inside one transaction.
    ///
    /// Skipped entries do not stop the batch; a storage error does, and
    /// nothing from the batch is kept in that case.
    pub fn apply_all(&self, requests: &[UpdateRequest]) -> Result<Vec<Outcome>, StoreError> {
        self.store.in_transaction(|_| {
            requests
                .iter()
                .map(|request| self.apply(request))
                .collect::<Result<Vec<_>, _>>()
        })
    }

    /// Unconditionally clears the override pair for `(name, brand)`.
    pub fn reset(&self, name: &str, brand: &str) -> Result<Outcome, StoreError> {
        let rows = self.store.set_override(name, brand, None, None)?;
        if rows == 0 {
            log::warn!("No entry found to reset for {} ({})", name, brand);
            return Ok(Outcome::NotFound);
        }
        log::info!("Reset override for {} ({})", name, brand);
        Ok(Outcome::Updated {
            best_price: None,
            best_offer: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combiner::combine;
    use crate::types::{Source, SourceRecord};

    fn seeded(rows: &[(&str, &str, Option<&str>, Option<&str>)]) -> Store {
        let store = Store::open_in_memory().expect("Failed to open store");
        for (name, brand, price, discount) in rows {
            let record = SourceRecord {
                name: Some(name.to_string()),
                brand: Some(brand.to_string()),
                price: price.map(str::to_string),
                discount: discount.map(str::to_string),
                ..Default::default()
            };
            store.insert_source_record(Source::Apollo, &record).unwrap();
        }
        combine(&store).unwrap();
        store
    }

    fn stored(store: &Store, name: &str, brand: &str) -> (Option<f64>, Option<f64>) {
        let record = store.find_combined(name, brand).unwrap().expect("Row should exist");
        (record.best_price, record.best_offer)
    }

    #[test]
    fn test_best_price_derives_best_offer() {
        let store = seeded(&[("paracetamol", "Cipla", Some("₹50"), Some("10% off"))]);
        let reconciler = Reconciler::new(&store);

        let outcome = reconciler
            .apply(&UpdateRequest::new("paracetamol", "Cipla").with_best_price(45.0))
            .unwrap();

        assert_eq!(
            outcome,
            Outcome::Updated {
                best_price: Some(45.0),
                best_offer: Some(19.0)
            }
        );
        assert_eq!(stored(&store, "paracetamol", "Cipla"), (Some(45.0), Some(19.0)));
    }

    #[test]
    fn test_round_trip_through_mrp() {
        let store = seeded(&[("crocin", "GSK", Some("₹100"), Some("20% off"))]);
        let reconciler = Reconciler::new(&store);

        reconciler
            .apply(&UpdateRequest::new("crocin", "GSK").with_best_price(100.0))
            .unwrap();
        assert_eq!(stored(&store, "crocin", "GSK"), (Some(100.0), Some(20.0)));

        reconciler
            .apply(&UpdateRequest::new("crocin", "GSK").with_best_offer(20.0))
            .unwrap();
        assert_eq!(stored(&store, "crocin", "GSK"), (Some(100.0), Some(20.0)));
    }

    #[test]
    fn test_both_values_pass_through() {
        let store = seeded(&[("crocin", "GSK", Some("₹100"), Some("20% off"))]);
        let reconciler = Reconciler::new(&store);

        reconciler
            .apply(
                &UpdateRequest::new("crocin", "GSK")
                    .with_best_price(90.0)
                    .with_best_offer(3.0),
            )
            .unwrap();
        assert_eq!(stored(&store, "crocin", "GSK"), (Some(90.0), Some(3.0)));
    }

    #[test]
    fn test_force_clear_ignores_supplied_values() {
        let store = seeded(&[("crocin", "GSK", Some("₹100"), Some("20% off"))]);
        let reconciler = Reconciler::new(&store);
        store.set_override("crocin", "GSK", Some(80.0), Some(36.0)).unwrap();

        reconciler
            .apply(
                &UpdateRequest::new("crocin", "GSK")
                    .with_best_price(90.0)
                    .cleared(),
            )
            .unwrap();
        assert_eq!(stored(&store, "crocin", "GSK"), (None, None));
    }

    #[test]
    fn test_resolve_override_cashback_blocks_derivation() {
        let request = UpdateRequest::new("zincovit", "Apex").with_best_price(100.0);

        assert_eq!(
            resolve_override(Some(125.0), false, &request),
            (Some(100.0), Some(20.0))
        );
        assert_eq!(resolve_override(Some(125.0), true, &request), (Some(100.0), None));
        assert_eq!(resolve_override(None, false, &request), (Some(100.0), None));
    }

    #[test]
    fn test_resolve_override_force_clear_wins() {
        let request = UpdateRequest::new("zincovit", "Apex")
            .with_best_price(100.0)
            .with_best_offer(20.0)
            .cleared();

        assert_eq!(resolve_override(Some(125.0), false, &request), (None, None));
        assert_eq!(resolve_override(None, true, &request), (None, None));
    }

    #[test]
    fn test_cashback_discount_stores_supplied_value_only() {
        let store = seeded(&[("zincovit", "Apex", Some("₹100"), Some("5% CB"))]);
        let reconciler = Reconciler::new(&store);

        reconciler
            .apply(&UpdateRequest::new("zincovit", "Apex").with_best_price(95.0))
            .unwrap();
        assert_eq!(stored(&store, "zincovit", "Apex"), (Some(95.0), None));
    }

    #[test]
    fn test_unparsable_discount_keeps_supplied_value_only() {
        let store = seeded(&[("benadryl", "J&J", Some("₹120"), Some("special deal"))]);
        let reconciler = Reconciler::new(&store);

        reconciler
            .apply(&UpdateRequest::new("benadryl", "J&J").with_best_offer(15.0))
            .unwrap();
        assert_eq!(stored(&store, "benadryl", "J&J"), (None, Some(15.0)));
    }

    #[test]
    fn test_missing_discount_means_price_is_mrp() {
        let store = seeded(&[("aspirin", "Bayer", Some("₹200"), None)]);
        let reconciler = Reconciler::new(&store);

        reconciler
            .apply(&UpdateRequest::new("aspirin", "Bayer").with_best_offer(10.0))
            .unwrap();
        assert_eq!(stored(&store, "aspirin", "Bayer"), (Some(180.0), Some(10.0)));
    }

    #[test]
    fn test_full_discount_disables_derivation() {
        let store = seeded(&[("sample", "Free", Some("₹0"), Some("100% off"))]);
        let reconciler = Reconciler::new(&store);

        reconciler
            .apply(&UpdateRequest::new("sample", "Free").with_best_price(1.0))
            .unwrap();
        assert_eq!(stored(&store, "sample", "Free"), (Some(1.0), None));
    }

    #[test]
    fn test_unparsable_price_leaves_row_unchanged() {
        let store = seeded(&[("insulin", "Novo", Some("N/A"), Some("10% off"))]);
        let reconciler = Reconciler::new(&store);
        store.set_override("insulin", "Novo", Some(1.0), Some(2.0)).unwrap();

        let outcome = reconciler
            .apply(&UpdateRequest::new("insulin", "Novo").with_best_price(45.0))
            .unwrap();
        assert_eq!(outcome, Outcome::InvalidPrice);
        assert_eq!(stored(&store, "insulin", "Novo"), (Some(1.0), Some(2.0)));
    }

    #[test]
    fn test_neither_value_leaves_row_untouched() {
        let store = seeded(&[("crocin", "GSK", Some("₹100"), Some("20% off"))]);
        let reconciler = Reconciler::new(&store);
        store.set_override("crocin", "GSK", Some(80.0), Some(36.0)).unwrap();

        let outcome = reconciler.apply(&UpdateRequest::new("crocin", "GSK")).unwrap();
        assert_eq!(outcome, Outcome::Unchanged);
        assert_eq!(stored(&store, "crocin", "GSK"), (Some(80.0), Some(36.0)));
    }

    #[test]
    fn test_missing_record_and_key_are_noops() {
        let store = seeded(&[("crocin", "GSK", Some("₹100"), Some("20% off"))]);
        let reconciler = Reconciler::new(&store);

        assert_eq!(
            reconciler
                .apply(&UpdateRequest::new("crocin", "Cipla").with_best_price(1.0))
                .unwrap(),
            Outcome::NotFound
        );
        assert_eq!(
            reconciler.apply(&UpdateRequest::default()).unwrap(),
            Outcome::MissingKey
        );
    }

    #[test]
    fn test_batch_continues_past_skipped_entries() {
        let store = seeded(&[
            ("insulin", "Novo", Some("N/A"), Some("10% off")),
            ("crocin", "GSK", Some("₹100"), Some("20% off")),
        ]);
        let reconciler = Reconciler::new(&store);

        let outcomes = reconciler
            .apply_all(&[
                UpdateRequest::new("insulin", "Novo").with_best_price(5.0),
                UpdateRequest::new("unknown", "Nobody").with_best_price(5.0),
                UpdateRequest::new("crocin", "GSK").with_best_offer(20.0),
            ])
            .unwrap();

        assert_eq!(outcomes[0], Outcome::InvalidPrice);
        assert_eq!(outcomes[1], Outcome::NotFound);
        assert_eq!(stored(&store, "crocin", "GSK"), (Some(100.0), Some(20.0)));
    }

    #[test]
    fn test_reset_clears_pair() {
        let store = seeded(&[("crocin", "GSK", Some("₹100"), Some("20% off"))]);
        let reconciler = Reconciler::new(&store);
        store.set_override("crocin", "GSK", Some(80.0), Some(36.0)).unwrap();

        assert!(matches!(
            reconciler.reset("crocin", "GSK").unwrap(),
            Outcome::Updated { .. }
        ));
        assert_eq!(stored(&store, "crocin", "GSK"), (None, None));
        assert_eq!(reconciler.reset("crocin", "Cipla").unwrap(), Outcome::NotFound);
    }
}

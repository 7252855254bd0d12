use crate::store::{Store, StoreError};

/// Seeds `combined_data` from both source tables.
///
/// The combined table is created when absent and filled only while it is
/// empty, so overrides written later are never overwritten by a re-seed.
/// Returns the number of rows inserted (zero when the table was already seeded).
///
/// The emptiness check and the seed run under one write lock, so concurrent
/// callers on separate connections seed the table at most once.
pub fn combine(store: &Store) -> Result<usize, StoreError> {
    store.in_transaction(|store| {
        store.ensure_combined_table()?;

        let existing = store.combined_count()?;
        if existing > 0 {
            log::debug!("combined_data already holds {} row(s), skipping seed", existing);
            return Ok(0);
        }

        let inserted = store.seed_combined()?;
        log::info!("Seeded combined_data with {} row(s)", inserted);
        Ok(inserted)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Source, SourceRecord};

    fn insert(store: &Store, source: Source, name: &str, price: &str) {
        let record = SourceRecord {
            name: Some(name.to_string()),
            brand: Some("Cipla".to_string()),
            price: Some(price.to_string()),
            discount: Some("10% off".to_string()),
            ..Default::default()
        };
        store.insert_source_record(source, &record).unwrap();
    }

    #[test]
    fn test_combine_tags_sources() {
        let store = Store::open_in_memory().unwrap();
        insert(&store, Source::Pharmeasy, "paracetamol", "₹50");
        insert(&store, Source::Apollo, "paracetamol", "₹52");

        assert_eq!(combine(&store).unwrap(), 2);

        let mut sources: Vec<_> = store
            .combined_records()
            .unwrap()
            .into_iter()
            .filter_map(|r| r.source)
            .collect();
        sources.sort();
        assert_eq!(sources, vec!["Apollo".to_string(), "Pharmeasy".to_string()]);
    }

    #[test]
    fn test_combine_is_a_one_time_seed() {
        let store = Store::open_in_memory().unwrap();
        insert(&store, Source::Pharmeasy, "paracetamol", "₹50");
        assert_eq!(combine(&store).unwrap(), 1);

        store
            .set_override("paracetamol", "Cipla", Some(45.0), Some(19.0))
            .unwrap();
        insert(&store, Source::Apollo, "crocin", "₹30");

        assert_eq!(combine(&store).unwrap(), 0);
        let records = store.combined_records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].best_price, Some(45.0));
    }

    #[test]
    fn test_combine_with_empty_sources() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(combine(&store).unwrap(), 0);
        assert!(store.combined_records().unwrap().is_empty());
    }
}

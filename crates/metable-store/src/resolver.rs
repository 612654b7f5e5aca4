//! As-of resolution over an owner's record history.

use std::collections::{BTreeMap, HashMap, HashSet};

use metable_types::{EntityId, Timestamp};

use crate::record::MetaRecord;

/// Resolves the current record per key as of one instant.
///
/// Only persisted records (with an id and a publish time) take part;
/// pending records are the owner layer's business.
///
/// The winner for a key is chosen in two stages. First the latest publish
/// time at or before `at`; then, among all records for that key sharing
/// that publish time, the highest id. The second stage is not filtered by
/// `at`, so it only ever breaks ties on the instant selected by the first.
#[derive(Clone, Debug)]
pub struct TemporalResolver<'a> {
    records: &'a [MetaRecord],
    at: Timestamp,
    winners: HashSet<&'a EntityId>,
}

fn persisted(record: &MetaRecord) -> Option<(&EntityId, Timestamp)> {
    Some((record.id()?, record.published_at()?))
}

impl<'a> TemporalResolver<'a> {
    pub fn at(records: &'a [MetaRecord], at: Timestamp) -> Self {
        // Stage A: latest eligible publish time per key.
        let mut latest: HashMap<&str, Timestamp> = HashMap::new();
        for record in records {
            let Some((_, published)) = persisted(record) else {
                continue;
            };
            if published > at {
                continue;
            }
            latest
                .entry(record.key())
                .and_modify(|best| *best = (*best).max(published))
                .or_insert(published);
        }

        // Stage B: highest id per (key, publish time), unfiltered.
        let mut max_ids: HashMap<(&str, Timestamp), &EntityId> = HashMap::new();
        for record in records {
            let Some((id, published)) = persisted(record) else {
                continue;
            };
            max_ids
                .entry((record.key(), published))
                .and_modify(|best| {
                    if id > *best {
                        *best = id;
                    }
                })
                .or_insert(id);
        }

        // Join.
        let winners = latest
            .into_iter()
            .filter_map(|(key, published)| max_ids.get(&(key, published)).copied())
            .collect();

        Self {
            records,
            at,
            winners,
        }
    }

    /// The resolution instant.
    pub fn instant(&self) -> Timestamp {
        self.at
    }

    /// Whether `record` is the winner for its key.
    pub fn is_current(&self, record: &MetaRecord) -> bool {
        record.id().is_some_and(|id| self.winners.contains(id))
    }

    /// The current snapshot: one record per key, ordered by key.
    pub fn current(&self) -> Vec<&'a MetaRecord> {
        let mut current: Vec<_> = self.records.iter().filter(|r| self.is_current(r)).collect();
        current.sort_by(|a, b| a.key().cmp(b.key()));
        current
    }

    /// Current snapshot keyed by key.
    pub fn current_map(&self) -> BTreeMap<&'a str, &'a MetaRecord> {
        self.records
            .iter()
            .filter(|r| self.is_current(r))
            .map(|r| (r.key(), r))
            .collect()
    }

    pub fn current_for(&self, key: &str) -> Option<&'a MetaRecord> {
        self.records
            .iter()
            .find(|r| r.key() == key && self.is_current(r))
    }

    /// Whether `key` has a current value. History and planned rows do not count.
    pub fn exists_for_key(&self, key: &str) -> bool {
        self.current_for(key).is_some()
    }

    /// Every record published at or before the instant, history included.
    pub fn published(&self) -> Vec<&'a MetaRecord> {
        self.filtered(|r, at| r.published_at().is_some_and(|p| p <= at))
    }

    /// Every record scheduled after the instant.
    pub fn not_published(&self) -> Vec<&'a MetaRecord> {
        self.filtered(|r, at| r.published_at().is_some_and(|p| p > at))
    }

    /// Everything except the current snapshot.
    pub fn without_current(&self) -> Vec<&'a MetaRecord> {
        let winners = &self.winners;
        self.filtered(|r, _| r.id().is_some_and(|id| !winners.contains(id)))
    }

    /// The current snapshot plus planned rows; only superseded past rows
    /// are left out.
    pub fn without_history(&self) -> Vec<&'a MetaRecord> {
        let winners = &self.winners;
        self.filtered(|r, at| {
            r.published_at().is_some_and(|p| p > at) || r.id().is_some_and(|id| winners.contains(id))
        })
    }

    /// The full chain for `key`, oldest first by `(published_at, id)`.
    pub fn history(&self, key: &str) -> Vec<&'a MetaRecord> {
        self.filtered(|r, _| r.key() == key)
    }

    fn filtered(&self, keep: impl Fn(&MetaRecord, Timestamp) -> bool) -> Vec<&'a MetaRecord> {
        let mut out: Vec<_> = self
            .records
            .iter()
            .filter(|r| persisted(r).is_some() && keep(r, self.at))
            .collect();
        out.sort_by(|a, b| {
            (a.published_at(), a.id())
                .cmp(&(b.published_at(), b.id()))
                .then_with(|| a.key().cmp(b.key()))
        });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn record(id: i64, key: &str, raw: &str, published: Timestamp) -> MetaRecord {
        let mut r = MetaRecord::new("post", key);
        r.attach_owner(EntityId::Int(1));
        r.set_raw(Some(raw.into()), Some("string".into()));
        r.set_published_at(Some(published));
        r.mark_inserted(EntityId::Int(id), published);
        r
    }

    fn raws(records: &[&MetaRecord]) -> Vec<String> {
        records
            .iter()
            .map(|r| r.raw_value().unwrap_or_default().to_string())
            .collect()
    }

    // -----------------------------------------------------------------------
    // current()
    // -----------------------------------------------------------------------

    #[test]
    fn resolves_latest_published_per_key() {
        let t = t0();
        let records = vec![
            record(1, "k", "t-2", t - Duration::hours(2)),
            record(2, "k", "t-1", t - Duration::hours(1)),
            record(3, "k", "t+1", t + Duration::hours(1)),
        ];
        let now = TemporalResolver::at(&records, t);
        assert_eq!(raws(&now.current()), vec!["t-1"]);

        let later = TemporalResolver::at(&records, t + Duration::hours(1));
        assert_eq!(raws(&later.current()), vec!["t+1"]);

        let before = TemporalResolver::at(&records, t - Duration::hours(3));
        assert!(before.current().is_empty());
        assert!(!before.exists_for_key("k"));
    }

    #[test]
    fn equal_publish_time_breaks_tie_by_id() {
        let t = t0();
        let records = vec![record(7, "k", "second", t), record(4, "k", "first", t)];
        let resolver = TemporalResolver::at(&records, t + Duration::minutes(5));
        assert_eq!(raws(&resolver.current()), vec!["second"]);
    }

    #[test]
    fn publish_instant_is_inclusive() {
        let t = t0();
        let records = vec![record(1, "k", "v", t)];
        assert!(TemporalResolver::at(&records, t).exists_for_key("k"));
        assert!(!TemporalResolver::at(&records, t - Duration::microseconds(1)).exists_for_key("k"));
    }

    #[test]
    fn backdated_write_does_not_win_over_later_publish() {
        let t = t0();
        let records = vec![
            record(1, "k", "recent", t - Duration::minutes(1)),
            record(2, "k", "backdated", t - Duration::days(10)),
        ];
        let resolver = TemporalResolver::at(&records, t);
        assert_eq!(raws(&resolver.current()), vec!["recent"]);
    }

    #[test]
    fn unpersisted_records_are_ignored() {
        let t = t0();
        let mut pending = MetaRecord::new("post", "k");
        pending.set_raw(Some("pending".into()), Some("string".into()));
        pending.set_published_at(Some(t - Duration::hours(1)));
        let records = vec![record(1, "k", "stored", t - Duration::hours(2)), pending];
        let resolver = TemporalResolver::at(&records, t);
        assert_eq!(raws(&resolver.current()), vec!["stored"]);
        assert_eq!(resolver.history("k").len(), 1);
    }

    // -----------------------------------------------------------------------
    // Derived shapes
    // -----------------------------------------------------------------------

    #[test]
    fn derived_shapes_partition_history() {
        let t = t0();
        let records = vec![
            record(1, "a", "a-old", t - Duration::hours(2)),
            record(2, "a", "a-cur", t - Duration::hours(1)),
            record(3, "a", "a-next", t + Duration::hours(1)),
            record(4, "b", "b-cur", t - Duration::hours(5)),
        ];
        let resolver = TemporalResolver::at(&records, t);

        assert_eq!(raws(&resolver.current()), vec!["a-cur", "b-cur"]);
        assert_eq!(raws(&resolver.published()), vec!["b-cur", "a-old", "a-cur"]);
        assert_eq!(raws(&resolver.not_published()), vec!["a-next"]);
        assert_eq!(raws(&resolver.without_current()), vec!["a-old", "a-next"]);
        assert_eq!(
            raws(&resolver.without_history()),
            vec!["b-cur", "a-cur", "a-next"]
        );
        assert_eq!(raws(&resolver.history("a")), vec!["a-old", "a-cur", "a-next"]);
        assert!(resolver.is_current(&records[1]));
        assert!(!resolver.is_current(&records[2]));
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    proptest! {
        #[test]
        fn current_matches_brute_force(
            rows in prop::collection::vec((0usize..3, -5i64..5), 1..30),
            probe in -6i64..6,
        ) {
            let t = t0();
            let keys = ["a", "b", "c"];
            let records: Vec<MetaRecord> = rows
                .iter()
                .enumerate()
                .map(|(i, (k, offset))| {
                    record(i as i64 + 1, keys[*k], &i.to_string(), t + Duration::minutes(*offset))
                })
                .collect();
            let at = t + Duration::minutes(probe);
            let resolver = TemporalResolver::at(&records, at);

            for key in keys {
                let expected = records
                    .iter()
                    .filter(|r| r.key() == key && r.published_at().unwrap() <= at)
                    .max_by_key(|r| (r.published_at(), r.id().cloned()));
                let actual = resolver.current_for(key);
                prop_assert_eq!(actual.and_then(|r| r.id()), expected.and_then(|r| r.id()));
            }
            prop_assert_eq!(
                resolver.current().len() + resolver.without_current().len(),
                records.len()
            );
        }
    }
}

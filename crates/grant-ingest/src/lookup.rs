//! Lookup dictionaries built from the store at the start of a run.

use std::collections::{BTreeMap, HashMap};

use anyhow::Context;
use chrono::NaiveDate;
use grant_core::{triple, vocab, EntityRef, Triple, UriMinter};
use grant_store::{GraphStore, KeyedEntry, LookupKind};
use tracing::warn;

use crate::delta::DeltaCollector;
use crate::report::RunLog;

/// Natural key → entity maps that stay fixed for the whole run.
#[derive(Debug, Clone, Default)]
pub struct ReferenceDictionaries {
    pub departments: HashMap<String, EntityRef>,
    pub people: HashMap<String, EntityRef>,
    pub sponsors: HashMap<String, EntityRef>,
}

impl ReferenceDictionaries {
    pub fn department(&self, dept_id: &str) -> Option<&EntityRef> {
        self.departments.get(dept_id.trim())
    }

    pub fn person(&self, ufid: &str) -> Option<&EntityRef> {
        self.people.get(ufid.trim())
    }

    pub fn sponsor(&self, sponsor_id: &str) -> Option<&EntityRef> {
        self.sponsors.get(sponsor_id.trim())
    }
}

pub type IntervalKey = (Option<EntityRef>, Option<EntityRef>);

/// Date and datetime-interval dictionaries. These grow while normalizing:
/// the first time a date value or (start, end) pair is needed, the entity is
/// minted, its RDF is appended to the additions, and it is memoized.
#[derive(Debug, Clone, Default)]
pub struct SupportingEntityCache {
    dates: HashMap<NaiveDate, EntityRef>,
    intervals: HashMap<IntervalKey, EntityRef>,
}

impl SupportingEntityCache {
    pub fn insert_date(&mut self, date: NaiveDate, uri: EntityRef) {
        self.dates.entry(date).or_insert(uri);
    }

    pub fn insert_interval(&mut self, start: Option<EntityRef>, end: Option<EntityRef>, uri: EntityRef) {
        self.intervals.entry((start, end)).or_insert(uri);
    }

    pub fn date_count(&self) -> usize {
        self.dates.len()
    }

    pub fn interval_count(&self) -> usize {
        self.intervals.len()
    }

    pub fn resolve_date(
        &mut self,
        date: NaiveDate,
        minter: &UriMinter,
        delta: &mut DeltaCollector,
    ) -> EntityRef {
        if let Some(uri) = self.dates.get(&date) {
            return uri.clone();
        }
        let uri = minter.date(date);
        delta.add(date_triples(&uri, date));
        self.dates.insert(date, uri.clone());
        uri
    }

    /// `None` only when both sides are absent.
    pub fn resolve_interval(
        &mut self,
        start: Option<&EntityRef>,
        end: Option<&EntityRef>,
        minter: &UriMinter,
        delta: &mut DeltaCollector,
    ) -> Option<EntityRef> {
        let key = (start.cloned(), end.cloned());
        if let Some(uri) = self.intervals.get(&key) {
            return Some(uri.clone());
        }
        if start.is_none() && end.is_none() {
            return None;
        }
        let uri = minter.interval(start, end);
        delta.add(interval_triples(&uri, start, end));
        self.intervals.insert(key, uri.clone());
        Some(uri)
    }
}

pub fn date_triples(uri: &EntityRef, date: NaiveDate) -> Vec<Triple> {
    vec![
        triple::class(uri, vocab::DATE_TIME_VALUE),
        triple::link(
            uri,
            vocab::DATE_TIME_PRECISION,
            &vocab::YEAR_MONTH_DAY_PRECISION.into(),
        ),
        triple::typed(
            uri,
            vocab::DATE_TIME,
            format!("{}T00:00:00", date.format("%Y-%m-%d")),
            vocab::XSD_DATE_TIME,
        ),
    ]
}

pub fn interval_triples(
    uri: &EntityRef,
    start: Option<&EntityRef>,
    end: Option<&EntityRef>,
) -> Vec<Triple> {
    let mut triples = vec![triple::class(uri, vocab::DATE_TIME_INTERVAL)];
    if let Some(start) = start {
        triples.push(triple::link(uri, vocab::INTERVAL_START, start));
    }
    if let Some(end) = end {
        triples.push(triple::link(uri, vocab::INTERVAL_END, end));
    }
    triples
}

/// Everything the normalizer and reconciler need from the store.
#[derive(Debug, Clone, Default)]
pub struct Lookups {
    pub references: ReferenceDictionaries,
    pub supporting: SupportingEntityCache,
    /// pcn → existing grant, sorted so reconciliation order is stable.
    pub grants: BTreeMap<String, EntityRef>,
}

/// Accepts `YYYY-MM-DD` optionally followed by a time part.
pub fn parse_store_date(key: &str) -> Option<NaiveDate> {
    let day = key.trim().get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn into_map<M: FromIterator<(String, EntityRef)>>(entries: Vec<KeyedEntry>) -> M {
    entries.into_iter().map(|e| (e.key, e.uri)).collect()
}

/// Builds every dictionary from the store. Any store failure aborts the run.
pub async fn build_lookups(store: &dyn GraphStore, log: &mut RunLog) -> anyhow::Result<Lookups> {
    let mut lookups = Lookups::default();

    log.line("Make VIVO DeptID Dictionary").await?;
    lookups.references.departments = into_map(
        store
            .find_keyed(LookupKind::Department)
            .await
            .context("building department dictionary")?,
    );
    log.line(format!(
        "VIVO deptid dictionary has {} entries",
        lookups.references.departments.len()
    ))
    .await?;

    log.line("Make VIVO UFID Dictionary").await?;
    lookups.references.people = into_map(
        store
            .find_keyed(LookupKind::Person)
            .await
            .context("building person dictionary")?,
    );
    log.line(format!(
        "VIVO ufid dictionary has {} entries",
        lookups.references.people.len()
    ))
    .await?;

    log.line("Make VIVO Sponsor Dictionary").await?;
    lookups.references.sponsors = into_map(
        store
            .find_keyed(LookupKind::Sponsor)
            .await
            .context("building sponsor dictionary")?,
    );
    log.line(format!(
        "VIVO sponsor dictionary has {} entries",
        lookups.references.sponsors.len()
    ))
    .await?;

    log.line("Make VIVO Date Dictionary").await?;
    for entry in store
        .find_keyed(LookupKind::Date)
        .await
        .context("building date dictionary")?
    {
        match parse_store_date(&entry.key) {
            Some(date) => lookups.supporting.insert_date(date, entry.uri),
            None => warn!(key = %entry.key, uri = %entry.uri, "skipping date with unparsable value"),
        }
    }
    log.line(format!(
        "VIVO date dictionary has {} entries",
        lookups.supporting.date_count()
    ))
    .await?;

    log.line("Make VIVO Datetime Interval Dictionary").await?;
    for interval in store
        .find_intervals()
        .await
        .context("building datetime interval dictionary")?
    {
        lookups
            .supporting
            .insert_interval(interval.start, interval.end, interval.uri);
    }
    log.line(format!(
        "VIVO datetime interval dictionary has {} entries",
        lookups.supporting.interval_count()
    ))
    .await?;

    log.line("Make VIVO Grant Dictionary").await?;
    lookups.grants = into_map(
        store
            .find_keyed(LookupKind::Grant)
            .await
            .context("building grant dictionary")?,
    );
    log.line(format!(
        "VIVO grant dictionary has {} entries",
        lookups.grants.len()
    ))
    .await?;

    Ok(lookups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use grant_store::{IntervalEntry, MemoryStore, StoreSnapshot};

    fn uri(local: &str) -> EntityRef {
        EntityRef::new(format!("http://vivo.example.edu/individual/{local}"))
    }

    fn minter() -> UriMinter {
        UriMinter::new("http://vivo.example.edu/individual/")
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn store_dates_parse_with_or_without_time() {
        assert_eq!(parse_store_date("2014-07-01T00:00:00"), Some(day(2014, 7, 1)));
        assert_eq!(parse_store_date("2014-07-01"), Some(day(2014, 7, 1)));
        assert_eq!(parse_store_date("07/01/2014"), None);
        assert_eq!(parse_store_date("2014"), None);
    }

    #[test]
    fn dates_are_created_once_per_value() {
        let mut cache = SupportingEntityCache::default();
        let mut delta = DeltaCollector::new();
        let a = cache.resolve_date(day(2014, 7, 1), &minter(), &mut delta);
        let b = cache.resolve_date(day(2014, 7, 1), &minter(), &mut delta);
        assert_eq!(a, b);
        assert_eq!(delta.additions().len(), 3);
    }

    #[test]
    fn known_dates_emit_nothing() {
        let mut cache = SupportingEntityCache::default();
        cache.insert_date(day(2014, 7, 1), uri("date1"));
        let mut delta = DeltaCollector::new();
        assert_eq!(cache.resolve_date(day(2014, 7, 1), &minter(), &mut delta), uri("date1"));
        assert!(delta.additions().is_empty());
    }

    #[test]
    fn intervals_memoize_on_the_composite_key() {
        let mut cache = SupportingEntityCache::default();
        let mut delta = DeltaCollector::new();
        let s = uri("s");
        let e = uri("e");
        let first = cache.resolve_interval(Some(&s), Some(&e), &minter(), &mut delta);
        let again = cache.resolve_interval(Some(&s), Some(&e), &minter(), &mut delta);
        assert_eq!(first, again);
        assert_eq!(delta.additions().len(), 3);

        let open_ended = cache.resolve_interval(Some(&s), None, &minter(), &mut delta);
        assert!(open_ended.is_some());
        assert_ne!(open_ended, first);
        assert_eq!(delta.additions().len(), 5);

        assert_eq!(cache.resolve_interval(None, None, &minter(), &mut delta), None);
        assert_eq!(cache.interval_count(), 2);
    }

    #[tokio::test]
    async fn lookups_cover_every_entity_class() {
        let snapshot = StoreSnapshot {
            departments: BTreeMap::from([("27010000".to_string(), uri("dept1"))]),
            people: BTreeMap::from([
                ("11111111".to_string(), uri("person1")),
                ("22222222".to_string(), uri("person2")),
            ]),
            sponsors: BTreeMap::from([("S100".to_string(), uri("sponsor1"))]),
            dates: BTreeMap::from([("2014-07-01".to_string(), uri("date1"))]),
            intervals: vec![IntervalEntry {
                uri: uri("dti1"),
                start: Some(uri("date1")),
                end: None,
            }],
            grants: vec![grant_core::StoredGrant {
                uri: Some(uri("grant1")),
                pcn: Some("P002".into()),
                ..Default::default()
            }],
        };
        let store = MemoryStore::from_snapshot(&snapshot).unwrap();
        let lookups = build_lookups(&store, &mut RunLog::discard()).await.unwrap();

        assert_eq!(lookups.references.department("27010000"), Some(&uri("dept1")));
        assert_eq!(lookups.references.people.len(), 2);
        assert_eq!(lookups.references.sponsor(" S100 "), Some(&uri("sponsor1")));
        assert_eq!(lookups.supporting.date_count(), 1);
        assert_eq!(lookups.supporting.interval_count(), 1);
        assert_eq!(lookups.grants.get("P002"), Some(&uri("grant1")));
    }
}

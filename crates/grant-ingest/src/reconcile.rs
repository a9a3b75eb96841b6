//! Three-way classification of grant keys and the RDF each case produces.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use grant_core::{
    triple, vocab, EntityRef, Investigator, NormalizedGrant, Qname, StoredGrant, Triple,
    UriMinter, INGEST_VERSION,
};
use grant_store::{role_triples, StoreError};
use serde::Serialize;
use thiserror::Error;

/// Classification of one pcn: source bit + 2 × store bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Add = 1,
    NoAction = 2,
    Update = 3,
}

impl Action {
    pub fn from_presence(in_source: bool, in_store: bool) -> Option<Self> {
        Self::from_code(u8::from(in_source) + 2 * u8::from(in_store))
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Action::Add),
            2 => Some(Action::NoAction),
            3 => Some(Action::Update),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Classifies the union of source and store keys, in sorted key order.
pub fn classify<'a>(
    source_keys: impl IntoIterator<Item = &'a String>,
    store_keys: impl IntoIterator<Item = &'a String>,
) -> BTreeMap<String, Action> {
    let source: BTreeSet<&String> = source_keys.into_iter().collect();
    let store: BTreeSet<&String> = store_keys.into_iter().collect();
    source
        .union(&store)
        .filter_map(|key| {
            Action::from_presence(source.contains(key), store.contains(key))
                .map(|action| ((*key).clone(), action))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActionCounts {
    pub add: usize,
    pub no_action: usize,
    pub update: usize,
    pub sampled_out: usize,
}

impl ActionCounts {
    pub fn record(&mut self, action: Action) {
        match action {
            Action::Add => self.add += 1,
            Action::NoAction => self.no_action += 1,
            Action::Update => self.update += 1,
        }
    }
}

impl FromIterator<Action> for ActionCounts {
    fn from_iter<I: IntoIterator<Item = Action>>(actions: I) -> Self {
        let mut counts = Self::default();
        for action in actions {
            counts.record(action);
        }
        counts
    }
}

/// Provenance written on grants the ingest creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestStamp {
    pub harvested_by: String,
    pub date_harvested: NaiveDate,
}

impl HarvestStamp {
    pub fn new(date_harvested: NaiveDate) -> Self {
        Self {
            harvested_by: format!("grant-ingest-{INGEST_VERSION}"),
            date_harvested,
        }
    }

    fn triples(&self, grant: &EntityRef) -> [Triple; 2] {
        [
            triple::literal(grant, vocab::HARVESTED_BY, self.harvested_by.clone()),
            triple::literal(
                grant,
                vocab::DATE_HARVESTED,
                self.date_harvested.format("%Y-%m-%d").to_string(),
            ),
        ]
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("pcn {0} classified for ADD or UPDATE has no normalized source record")]
    MissingSourceRecord(String),
    #[error("pcn {0} classified for UPDATE has no grant in the store dictionary")]
    MissingGrantRef(String),
    #[error("reading stored grant: {0}")]
    Store(#[from] StoreError),
}

/// Full creation RDF for a new grant.
pub fn grant_creation_triples(
    grant: &EntityRef,
    record: &NormalizedGrant,
    minter: &UriMinter,
    harvest: &HarvestStamp,
) -> Vec<Triple> {
    let mut triples = vec![triple::class(grant, vocab::GRANT)];
    if let Some(title) = &record.title {
        triples.push(triple::literal(grant, vocab::RDFS_LABEL, title.clone()));
    }
    triples.push(triple::literal(grant, vocab::PS_CONTRACT_NUMBER, record.pcn.clone()));
    if let Some(id) = &record.sponsor_award_id {
        triples.push(triple::literal(grant, vocab::SPONSOR_AWARD_ID, id.clone()));
    }
    triples.push(triple::literal(
        grant,
        vocab::LOCAL_AWARD_ID,
        record.local_award_id.clone(),
    ));
    triples.push(triple::literal(
        grant,
        vocab::TOTAL_AWARD_AMOUNT,
        record.total_award_amount.lexical(),
    ));
    triples.push(triple::literal(
        grant,
        vocab::GRANT_DIRECT_COSTS,
        record.grant_direct_costs.lexical(),
    ));
    triples.extend(linked(grant, ADMINISTRATION, &record.administered_by));
    triples.extend(linked(grant, SPONSORSHIP, &record.sponsor));
    if let Some(interval) = &record.interval {
        triples.push(triple::link(grant, vocab::HAS_DATE_TIME_INTERVAL, interval));
    }
    triples.extend(harvest.triples(grant));
    for investigator in &record.investigators {
        let role = minter.role(&record.pcn, investigator);
        triples.extend(role_triples(grant, &role, investigator));
    }
    triples
}

/// A grant link and the inverse written on the target.
#[derive(Debug, Clone, Copy)]
struct LinkPair {
    forward: Qname,
    inverse: Qname,
}

const ADMINISTRATION: LinkPair = LinkPair {
    forward: vocab::ADMINISTERED_BY,
    inverse: vocab::ADMINISTERS,
};

const SPONSORSHIP: LinkPair = LinkPair {
    forward: vocab::GRANT_AWARDED_BY,
    inverse: vocab::AWARDS_GRANT,
};

fn linked(grant: &EntityRef, pair: LinkPair, target: &EntityRef) -> [Triple; 2] {
    [
        triple::link(grant, pair.forward, target),
        triple::link(target, pair.inverse, grant),
    ]
}

/// What an UPDATE changes on one grant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantChanges {
    pub additions: Vec<Triple>,
    pub retractions: Vec<Triple>,
    pub changed_fields: Vec<&'static str>,
}

impl GrantChanges {
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.retractions.is_empty()
    }

    fn literal(
        &mut self,
        grant: &EntityRef,
        field: &'static str,
        predicate: Qname,
        new: Option<&str>,
        old: Option<&str>,
        same: impl Fn(&str, &str) -> bool,
    ) {
        let unchanged = match (new, old) {
            (Some(new), Some(old)) => same(new, old),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }
        if let Some(old) = old {
            self.retractions.push(triple::literal(grant, predicate, old));
        }
        if let Some(new) = new {
            self.additions.push(triple::literal(grant, predicate, new));
        }
        self.changed_fields.push(field);
    }

    fn link(
        &mut self,
        grant: &EntityRef,
        field: &'static str,
        pair: LinkPair,
        new: &EntityRef,
        old: Option<&EntityRef>,
    ) {
        if old == Some(new) {
            return;
        }
        if let Some(old) = old {
            self.retractions.extend(linked(grant, pair, old));
        }
        self.additions.extend(linked(grant, pair, new));
        self.changed_fields.push(field);
    }
}

fn same_text(new: &str, old: &str) -> bool {
    new == old.trim()
}

/// Field-by-field diff of a normalized record against the stored grant.
pub fn grant_update(
    grant: &EntityRef,
    record: &NormalizedGrant,
    stored: &StoredGrant,
    minter: &UriMinter,
) -> GrantChanges {
    let mut changes = GrantChanges::default();

    changes.literal(
        grant,
        "title",
        vocab::RDFS_LABEL,
        record.title.as_deref(),
        stored.title.as_deref(),
        same_text,
    );
    changes.literal(
        grant,
        "sponsor_award_id",
        vocab::SPONSOR_AWARD_ID,
        record.sponsor_award_id.as_deref(),
        stored.sponsor_award_id.as_deref(),
        same_text,
    );
    changes.literal(
        grant,
        "local_award_id",
        vocab::LOCAL_AWARD_ID,
        Some(record.local_award_id.as_str()),
        stored.local_award_id.as_deref(),
        same_text,
    );
    changes.literal(
        grant,
        "total_award_amount",
        vocab::TOTAL_AWARD_AMOUNT,
        Some(record.total_award_amount.lexical()),
        stored.total_award_amount.as_deref(),
        |_, old| record.total_award_amount.matches_literal(old),
    );
    changes.literal(
        grant,
        "grant_direct_costs",
        vocab::GRANT_DIRECT_COSTS,
        Some(record.grant_direct_costs.lexical()),
        stored.grant_direct_costs.as_deref(),
        |_, old| record.grant_direct_costs.matches_literal(old),
    );

    changes.link(
        grant,
        "administered_by",
        ADMINISTRATION,
        &record.administered_by,
        stored.administered_by.as_ref(),
    );
    changes.link(
        grant,
        "sponsor",
        SPONSORSHIP,
        &record.sponsor,
        stored.sponsor.as_ref(),
    );

    if record.interval != stored.interval {
        if let Some(old) = &stored.interval {
            changes
                .retractions
                .push(triple::link(grant, vocab::HAS_DATE_TIME_INTERVAL, old));
        }
        if let Some(new) = &record.interval {
            changes
                .additions
                .push(triple::link(grant, vocab::HAS_DATE_TIME_INTERVAL, new));
        }
        changes.changed_fields.push("interval");
    }

    // Roles diff as sets of (kind, person); the role entity URI is irrelevant.
    let mut existing: BTreeMap<Investigator, &EntityRef> = BTreeMap::new();
    for role in &stored.roles {
        existing
            .entry(Investigator {
                role: role.role,
                person: role.person.clone(),
            })
            .or_insert(&role.uri);
    }
    // A role entity that still backs a kept investigator is never retracted.
    let kept: BTreeSet<&EntityRef> = existing
        .iter()
        .filter(|(investigator, _)| record.investigators.contains(*investigator))
        .map(|(_, role_uri)| *role_uri)
        .collect();
    let mut roles_changed = false;
    for (investigator, role_uri) in &existing {
        if record.investigators.contains(investigator) || kept.contains(role_uri) {
            continue;
        }
        changes
            .retractions
            .extend(role_triples(grant, role_uri, investigator));
        roles_changed = true;
    }
    for investigator in &record.investigators {
        if !existing.contains_key(investigator) {
            let role_uri = minter.role(&record.pcn, investigator);
            changes
                .additions
                .extend(role_triples(grant, &role_uri, investigator));
            roles_changed = true;
        }
    }
    if roles_changed {
        changes.changed_fields.push("roles");
    }

    changes
}

//! Read access to the VIVO graph store. The same SPARQL text is sent to the
//! VIVO query API over HTTP (with retry/backoff) or evaluated by an embedded
//! oxigraph store loaded from JSON snapshots.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use grant_core::{
    triple, vocab, EntityRef, Investigator, Qname, RoleKind, StoredGrant, StoredRole, Term,
    Triple, NAMESPACES,
};
use oxigraph::model::{GraphName, Quad};
use oxigraph::sparql::{QueryResults, SparqlEvaluator};
use oxigraph::store::Store;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

pub const CRATE_NAME: &str = "grant-store";

/// Entity classes that are looked up by a single natural-key property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupKind {
    Department,
    Person,
    Sponsor,
    Date,
    Grant,
}

impl LookupKind {
    pub fn label(self) -> &'static str {
        match self {
            LookupKind::Department => "deptid",
            LookupKind::Person => "ufid",
            LookupKind::Sponsor => "sponsor",
            LookupKind::Date => "date",
            LookupKind::Grant => "grant",
        }
    }

    pub fn key_property(self) -> Qname {
        match self {
            LookupKind::Department => vocab::DEPT_ID,
            LookupKind::Person => vocab::UFID,
            LookupKind::Sponsor => vocab::SPONSOR_ID,
            LookupKind::Date => vocab::DATE_TIME,
            LookupKind::Grant => vocab::PS_CONTRACT_NUMBER,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedEntry {
    pub key: String,
    pub uri: EntityRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalEntry {
    pub uri: EntityRef,
    #[serde(default)]
    pub start: Option<EntityRef>,
    #[serde(default)]
    pub end: Option<EntityRef>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("malformed store response: {0}")]
    Malformed(String),
    #[error("no such entity in store: {0}")]
    UnknownEntity(EntityRef),
    #[error("embedded store: {0}")]
    Embedded(String),
}

/// Read interface the ingest needs from the graph store.
#[async_trait]
pub trait GraphStore: Send + Sync {
    fn describe(&self) -> String;

    /// Every entity of `kind` with its natural key.
    async fn find_keyed(&self, kind: LookupKind) -> Result<Vec<KeyedEntry>, StoreError>;

    /// Every datetime interval with its start/end date references.
    async fn find_intervals(&self) -> Result<Vec<IntervalEntry>, StoreError>;

    /// Current mapped values and connecting roles of one grant.
    async fn fetch_grant(&self, grant: &EntityRef) -> Result<StoredGrant, StoreError>;
}

#[async_trait]
impl<T: GraphStore + ?Sized> GraphStore for Box<T> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    async fn find_keyed(&self, kind: LookupKind) -> Result<Vec<KeyedEntry>, StoreError> {
        (**self).find_keyed(kind).await
    }

    async fn find_intervals(&self) -> Result<Vec<IntervalEntry>, StoreError> {
        (**self).find_intervals().await
    }

    async fn fetch_grant(&self, grant: &EntityRef) -> Result<StoredGrant, StoreError> {
        (**self).fetch_grant(grant).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct SparqlClientConfig {
    pub endpoint: String,
    pub email: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub backoff: BackoffPolicy,
}

impl SparqlClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            email: None,
            password: None,
            timeout: Duration::from_secs(30),
            user_agent: None,
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SparqlResults {
    results: SparqlBindings,
}

#[derive(Debug, Deserialize)]
struct SparqlBindings {
    bindings: Vec<HashMap<String, SparqlTerm>>,
}

#[derive(Debug, Deserialize)]
struct SparqlTerm {
    value: String,
}

/// One solution of a SELECT: variable name → bound IRI or literal lexical form.
pub type Row = HashMap<String, String>;

fn bound<'a>(row: &'a Row, var: &str) -> Option<&'a str> {
    row.get(var).map(|value| value.trim())
}

/// Decodes an `application/sparql-results+json` body.
pub fn parse_select_results(body: &[u8]) -> Result<Vec<Row>, StoreError> {
    let parsed: SparqlResults =
        serde_json::from_slice(body).map_err(|e| StoreError::Malformed(e.to_string()))?;
    Ok(parsed
        .results
        .bindings
        .into_iter()
        .map(|binding| {
            binding
                .into_iter()
                .map(|(var, term)| (var, term.value))
                .collect()
        })
        .collect())
}

fn prefixes() -> String {
    NAMESPACES
        .iter()
        .map(|(prefix, ns)| format!("PREFIX {prefix}: <{ns}>\n"))
        .collect()
}

/// SPARQL query client for the VIVO query API.
#[derive(Debug)]
pub struct SparqlStore {
    client: reqwest::Client,
    config: SparqlClientConfig,
}

impl SparqlStore {
    pub fn new(config: SparqlClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self { client, config })
    }

    #[instrument(level = "debug", skip_all, fields(endpoint = %self.config.endpoint))]
    async fn select(&self, query: &str) -> Result<Vec<Row>, StoreError> {
        debug!(query, "sparql select");

        let mut form: Vec<(&str, &str)> = vec![("query", query)];
        if let Some(email) = &self.config.email {
            form.push(("email", email.as_str()));
        }
        if let Some(password) = &self.config.password {
            form.push(("password", password.as_str()));
        }

        let backoff = self.config.backoff;
        let mut last_request_error: Option<reqwest::Error> = None;

        for attempt in 0..=backoff.max_retries {
            let resp_result = self
                .client
                .post(&self.config.endpoint)
                .header("Accept", "application/sparql-results+json")
                .form(&form)
                .send()
                .await;

            match resp_result {
                Ok(resp) => {
                    let status = resp.status();
                    let final_url = resp.url().to_string();

                    if status.is_success() {
                        let body = resp.bytes().await?;
                        return parse_select_results(&body);
                    }

                    if classify_status(status) == RetryDisposition::Retryable
                        && attempt < backoff.max_retries
                    {
                        warn!(%status, attempt, "sparql endpoint busy; retrying");
                        tokio::time::sleep(backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }

                    return Err(StoreError::HttpStatus {
                        status: status.as_u16(),
                        url: final_url,
                    });
                }
                Err(err) => {
                    if classify_reqwest_error(&err) == RetryDisposition::Retryable
                        && attempt < backoff.max_retries
                    {
                        warn!(error = %err, attempt, "sparql request failed; retrying");
                        last_request_error = Some(err);
                        tokio::time::sleep(backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }
                    return Err(StoreError::Request(err));
                }
            }
        }

        match last_request_error {
            Some(err) => Err(StoreError::Request(err)),
            None => Err(StoreError::Malformed("retry loop exited without a response".into())),
        }
    }
}

pub fn keyed_query(kind: LookupKind) -> String {
    let pattern = match kind {
        LookupKind::Date => format!(
            "?uri {} {} .\n  ?uri {} ?key .",
            vocab::DATE_TIME_PRECISION,
            vocab::YEAR_MONTH_DAY_PRECISION,
            vocab::DATE_TIME
        ),
        other => format!("?uri {} ?key .", other.key_property()),
    };
    format!("{}SELECT ?uri ?key WHERE {{\n  {pattern}\n}}", prefixes())
}

pub fn interval_query() -> String {
    format!(
        "{}SELECT ?uri ?start ?end WHERE {{\n  ?uri {} {} .\n  OPTIONAL {{ ?uri {} ?start }}\n  OPTIONAL {{ ?uri {} ?end }}\n}}",
        prefixes(),
        vocab::RDF_TYPE,
        vocab::DATE_TIME_INTERVAL,
        vocab::INTERVAL_START,
        vocab::INTERVAL_END
    )
}

pub fn grant_values_query(grant: &EntityRef) -> String {
    format!(
        "{}SELECT ?p ?o WHERE {{\n  <{grant}> ?p ?o .\n}} ORDER BY ?p ?o",
        prefixes()
    )
}

pub fn grant_roles_query(grant: &EntityRef) -> String {
    let role_of = RoleKind::ALL
        .iter()
        .map(|kind| kind.role_of().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "{}SELECT ?role ?type ?of ?person WHERE {{\n  <{grant}> {} ?role .\n  ?role {} ?type .\n  ?role ?of ?person .\n  FILTER(?of IN ({role_of}))\n}} ORDER BY ?role",
        prefixes(),
        vocab::CONTRIBUTING_ROLE,
        vocab::RDF_TYPE
    )
}

/// Rows of [`keyed_query`] as dictionary entries.
pub fn keyed_entries(kind: LookupKind, rows: &[Row]) -> Result<Vec<KeyedEntry>, StoreError> {
    rows.iter()
        .map(|row| match (bound(row, "uri"), bound(row, "key")) {
            (Some(uri), Some(key)) => Ok(KeyedEntry {
                key: key.to_string(),
                uri: EntityRef::new(uri),
            }),
            _ => Err(StoreError::Malformed(format!(
                "{} binding without ?uri/?key",
                kind.label()
            ))),
        })
        .collect()
}

/// Rows of [`interval_query`] as interval entries.
pub fn interval_entries(rows: &[Row]) -> Result<Vec<IntervalEntry>, StoreError> {
    rows.iter()
        .map(|row| {
            let uri = bound(row, "uri").ok_or_else(|| {
                StoreError::Malformed("interval binding without ?uri".to_string())
            })?;
            Ok(IntervalEntry {
                uri: EntityRef::new(uri),
                start: bound(row, "start").map(EntityRef::new),
                end: bound(row, "end").map(EntityRef::new),
            })
        })
        .collect()
}

/// Rebuilds a stored grant from the rows of [`grant_values_query`] and
/// [`grant_roles_query`]. No value rows means the grant does not exist.
pub fn stored_grant(
    grant: &EntityRef,
    values: &[Row],
    roles: &[Row],
) -> Result<StoredGrant, StoreError> {
    if values.is_empty() {
        return Err(StoreError::UnknownEntity(grant.clone()));
    }
    let mut stored = fold_grant_values(
        grant,
        values
            .iter()
            .filter_map(|row| Some((bound(row, "p")?, bound(row, "o")?))),
    );
    stored.roles = resolve_roles(roles);
    Ok(stored)
}

/// One role per role entity.
///
/// A reasoning store types a PI or Co-PI role as `InvestigatorRole` too and
/// infers `investigatorRoleOf`, so a role URI can match several kinds. The
/// most specific kind wins: PI, then Co-PI, then plain investigator.
fn resolve_roles(rows: &[Row]) -> Vec<StoredRole> {
    let mut by_role: BTreeMap<&str, Vec<(RoleKind, &str)>> = BTreeMap::new();
    for row in rows {
        let (Some(role), Some(class), Some(of), Some(person)) = (
            bound(row, "role"),
            bound(row, "type"),
            bound(row, "of"),
            bound(row, "person"),
        ) else {
            continue;
        };
        let candidates = by_role.entry(role).or_default();
        if let Some(kind) = RoleKind::from_role_class_iri(class) {
            if kind.role_of().iri() == of {
                candidates.push((kind, person));
            }
        }
    }

    by_role
        .into_iter()
        .filter_map(|(role, candidates)| {
            let (kind, person) = candidates.into_iter().min()?;
            Some(StoredRole {
                uri: EntityRef::new(role),
                role: kind,
                person: EntityRef::new(person),
            })
        })
        .collect()
}

/// Sets the first value seen for a property; later values are ignored.
fn set_once<T>(slot: &mut Option<T>, value: T) {
    if slot.is_none() {
        *slot = Some(value);
    }
}

/// Folds (predicate IRI, object value) pairs into the mapped grant fields.
fn fold_grant_values<'a>(
    grant: &EntityRef,
    values: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> StoredGrant {
    let mut stored = StoredGrant {
        uri: Some(grant.clone()),
        ..StoredGrant::default()
    };
    for (predicate, object) in values {
        match predicate {
            p if p == vocab::PS_CONTRACT_NUMBER.iri() => set_once(&mut stored.pcn, object.to_string()),
            p if p == vocab::RDFS_LABEL.iri() => set_once(&mut stored.title, object.to_string()),
            p if p == vocab::SPONSOR_AWARD_ID.iri() => {
                set_once(&mut stored.sponsor_award_id, object.to_string())
            }
            p if p == vocab::LOCAL_AWARD_ID.iri() => {
                set_once(&mut stored.local_award_id, object.to_string())
            }
            p if p == vocab::TOTAL_AWARD_AMOUNT.iri() => {
                set_once(&mut stored.total_award_amount, object.to_string())
            }
            p if p == vocab::GRANT_DIRECT_COSTS.iri() => {
                set_once(&mut stored.grant_direct_costs, object.to_string())
            }
            p if p == vocab::ADMINISTERED_BY.iri() => {
                set_once(&mut stored.administered_by, EntityRef::new(object))
            }
            p if p == vocab::GRANT_AWARDED_BY.iri() => {
                set_once(&mut stored.sponsor, EntityRef::new(object))
            }
            p if p == vocab::HAS_DATE_TIME_INTERVAL.iri() => {
                set_once(&mut stored.interval, EntityRef::new(object))
            }
            _ => {}
        }
    }
    stored
}

#[async_trait]
impl GraphStore for SparqlStore {
    fn describe(&self) -> String {
        format!("sparql endpoint {}", self.config.endpoint)
    }

    async fn find_keyed(&self, kind: LookupKind) -> Result<Vec<KeyedEntry>, StoreError> {
        let rows = self.select(&keyed_query(kind)).await?;
        keyed_entries(kind, &rows)
    }

    async fn find_intervals(&self) -> Result<Vec<IntervalEntry>, StoreError> {
        let rows = self.select(&interval_query()).await?;
        interval_entries(&rows)
    }

    async fn fetch_grant(&self, grant: &EntityRef) -> Result<StoredGrant, StoreError> {
        let values = self.select(&grant_values_query(grant)).await?;
        if values.is_empty() {
            return Err(StoreError::UnknownEntity(grant.clone()));
        }
        let roles = self.select(&grant_roles_query(grant)).await?;
        stored_grant(grant, &values, &roles)
    }
}

/// Entity-level description of a store, used for fixtures.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub departments: BTreeMap<String, EntityRef>,
    #[serde(default)]
    pub people: BTreeMap<String, EntityRef>,
    #[serde(default)]
    pub sponsors: BTreeMap<String, EntityRef>,
    /// `YYYY-MM-DD` → date entity.
    #[serde(default)]
    pub dates: BTreeMap<String, EntityRef>,
    #[serde(default)]
    pub intervals: Vec<IntervalEntry>,
    #[serde(default)]
    pub grants: Vec<StoredGrant>,
}

pub fn load_snapshot(path: impl AsRef<Path>) -> anyhow::Result<StoreSnapshot> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

impl StoreSnapshot {
    pub fn to_triples(&self) -> Vec<Triple> {
        let mut out = Vec::new();
        for (key, uri) in &self.departments {
            out.push(triple::literal(uri, vocab::DEPT_ID, key.clone()));
        }
        for (key, uri) in &self.people {
            out.push(triple::literal(uri, vocab::UFID, key.clone()));
        }
        for (key, uri) in &self.sponsors {
            out.push(triple::literal(uri, vocab::SPONSOR_ID, key.clone()));
        }
        for (day, uri) in &self.dates {
            out.push(triple::class(uri, vocab::DATE_TIME_VALUE));
            out.push(triple::link(
                uri,
                vocab::DATE_TIME_PRECISION,
                &vocab::YEAR_MONTH_DAY_PRECISION.into(),
            ));
            out.push(triple::typed(
                uri,
                vocab::DATE_TIME,
                format!("{day}T00:00:00"),
                vocab::XSD_DATE_TIME,
            ));
        }
        for interval in &self.intervals {
            out.push(triple::class(&interval.uri, vocab::DATE_TIME_INTERVAL));
            if let Some(start) = &interval.start {
                out.push(triple::link(&interval.uri, vocab::INTERVAL_START, start));
            }
            if let Some(end) = &interval.end {
                out.push(triple::link(&interval.uri, vocab::INTERVAL_END, end));
            }
        }
        for grant in &self.grants {
            let Some(uri) = &grant.uri else {
                continue;
            };
            out.push(triple::class(uri, vocab::GRANT));
            let literals = [
                (vocab::PS_CONTRACT_NUMBER, &grant.pcn),
                (vocab::RDFS_LABEL, &grant.title),
                (vocab::SPONSOR_AWARD_ID, &grant.sponsor_award_id),
                (vocab::LOCAL_AWARD_ID, &grant.local_award_id),
                (vocab::TOTAL_AWARD_AMOUNT, &grant.total_award_amount),
                (vocab::GRANT_DIRECT_COSTS, &grant.grant_direct_costs),
            ];
            for (predicate, value) in literals {
                if let Some(value) = value {
                    out.push(triple::literal(uri, predicate, value.clone()));
                }
            }
            if let Some(dept) = &grant.administered_by {
                out.push(triple::link(uri, vocab::ADMINISTERED_BY, dept));
                out.push(triple::link(dept, vocab::ADMINISTERS, uri));
            }
            if let Some(sponsor) = &grant.sponsor {
                out.push(triple::link(uri, vocab::GRANT_AWARDED_BY, sponsor));
                out.push(triple::link(sponsor, vocab::AWARDS_GRANT, uri));
            }
            if let Some(interval) = &grant.interval {
                out.push(triple::link(uri, vocab::HAS_DATE_TIME_INTERVAL, interval));
            }
            for role in &grant.roles {
                out.extend(role_triples(uri, &role.uri, &Investigator {
                    role: role.role,
                    person: role.person.clone(),
                }));
            }
        }
        out
    }
}

/// Every triple that makes up one connecting role between a grant and a person.
pub fn role_triples(grant: &EntityRef, role: &EntityRef, investigator: &Investigator) -> Vec<Triple> {
    vec![
        triple::class(role, investigator.role.role_class()),
        triple::link(role, vocab::ROLE_CONTRIBUTES_TO, grant),
        triple::link(grant, vocab::CONTRIBUTING_ROLE, role),
        triple::link(role, investigator.role.role_of(), &investigator.person),
        triple::link(&investigator.person, investigator.role.has_role(), role),
    ]
}

fn embedded(err: impl std::fmt::Display) -> StoreError {
    StoreError::Embedded(err.to_string())
}

fn default_graph(triple: &Triple) -> Quad {
    Quad::new(
        triple.subject.clone(),
        triple.predicate.clone(),
        triple.object.clone(),
        GraphName::DefaultGraph,
    )
}

fn term_value(term: &Term) -> String {
    match term {
        Term::NamedNode(node) => node.as_str().to_string(),
        Term::BlankNode(node) => node.as_str().to_string(),
        Term::Literal(literal) => literal.value().to_string(),
        #[allow(unreachable_patterns)]
        other => other.to_string(),
    }
}

/// Embedded oxigraph store. It evaluates the same SPARQL text the HTTP client
/// sends and accepts ingest deltas, so a run can be replayed against its own
/// output.
#[derive(Clone)]
pub struct MemoryStore {
    store: Store,
}

impl MemoryStore {
    pub fn new() -> Result<Self, StoreError> {
        Ok(Self {
            store: Store::new().map_err(embedded)?,
        })
    }

    pub fn from_snapshot(snapshot: &StoreSnapshot) -> Result<Self, StoreError> {
        let store = Self::new()?;
        store.insert(&snapshot.to_triples())?;
        Ok(store)
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        self.store.len().map_err(embedded)
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        self.store.is_empty().map_err(embedded)
    }

    pub fn contains(&self, triple: &Triple) -> Result<bool, StoreError> {
        self.store.contains(&default_graph(triple)).map_err(embedded)
    }

    pub fn insert(&self, triples: &[Triple]) -> Result<(), StoreError> {
        for triple in triples {
            self.store.insert(&default_graph(triple)).map_err(embedded)?;
        }
        Ok(())
    }

    /// Retractions first, then additions.
    pub fn apply(&self, additions: &[Triple], retractions: &[Triple]) -> Result<(), StoreError> {
        for triple in retractions {
            self.store.remove(&default_graph(triple)).map_err(embedded)?;
        }
        self.insert(additions)
    }

    pub fn select(&self, query: &str) -> Result<Vec<Row>, StoreError> {
        let parsed = SparqlEvaluator::new()
            .parse_query(query)
            .map_err(|e| StoreError::Malformed(format!("query does not parse: {e}")))?;
        let QueryResults::Solutions(solutions) =
            parsed.on_store(&self.store).execute().map_err(embedded)?
        else {
            return Err(StoreError::Malformed("expected SELECT solutions".into()));
        };

        let mut rows = Vec::new();
        for solution in solutions {
            let solution = solution.map_err(embedded)?;
            rows.push(
                solution
                    .iter()
                    .map(|(var, term)| (var.as_str().to_string(), term_value(term)))
                    .collect(),
            );
        }
        Ok(rows)
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    fn describe(&self) -> String {
        format!("in-memory store ({} triples)", self.len().unwrap_or_default())
    }

    async fn find_keyed(&self, kind: LookupKind) -> Result<Vec<KeyedEntry>, StoreError> {
        keyed_entries(kind, &self.select(&keyed_query(kind))?)
    }

    async fn find_intervals(&self) -> Result<Vec<IntervalEntry>, StoreError> {
        interval_entries(&self.select(&interval_query())?)
    }

    async fn fetch_grant(&self, grant: &EntityRef) -> Result<StoredGrant, StoreError> {
        let values = self.select(&grant_values_query(grant))?;
        let roles = self.select(&grant_roles_query(grant))?;
        stored_grant(grant, &values, &roles)
    }
}

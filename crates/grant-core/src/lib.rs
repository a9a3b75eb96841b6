//! Core domain model for grant ingest: source rows, normalized grants, stored
//! grant state, and the small RDF vocabulary the ingest speaks.

use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use oxigraph::model::NamedNode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use oxigraph::model::{Literal, Term, Triple};

pub const CRATE_NAME: &str = "grant-core";

/// Version string written into harvest provenance on created grants.
pub const INGEST_VERSION: &str = env!("CARGO_PKG_VERSION");

/// IRI of an entity in the graph store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityRef(String);

impl EntityRef {
    pub fn new(iri: impl Into<String>) -> Self {
        Self(iri.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn node(&self) -> NamedNode {
        NamedNode::new_unchecked(self.0.as_str())
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Qname> for EntityRef {
    fn from(q: Qname) -> Self {
        Self(q.iri())
    }
}

/// Prefix → namespace table. The RDF/XML header declares exactly these.
pub const NAMESPACES: &[(&str, &str)] = &[
    ("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#"),
    ("rdfs", "http://www.w3.org/2000/01/rdf-schema#"),
    ("xsd", "http://www.w3.org/2001/XMLSchema#"),
    ("owl", "http://www.w3.org/2002/07/owl#"),
    ("vitro", "http://vitro.mannlib.cornell.edu/ns/vitro/0.7#"),
    ("foaf", "http://xmlns.com/foaf/0.1/"),
    ("vivo", "http://vivoweb.org/ontology/core#"),
    ("ufVivo", "http://vivo.ufl.edu/ontology/vivo-ufl/"),
];

/// Prefixed name from [`NAMESPACES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Qname {
    pub prefix: &'static str,
    pub local: &'static str,
}

impl Qname {
    pub const fn new(prefix: &'static str, local: &'static str) -> Self {
        Self { prefix, local }
    }

    pub fn namespace(&self) -> &'static str {
        NAMESPACES
            .iter()
            .find(|(p, _)| *p == self.prefix)
            .map(|(_, ns)| *ns)
            .unwrap_or_default()
    }

    pub fn iri(&self) -> String {
        format!("{}{}", self.namespace(), self.local)
    }

    pub fn node(&self) -> NamedNode {
        NamedNode::new_unchecked(self.iri())
    }
}

impl fmt::Display for Qname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.prefix, self.local)
    }
}

pub mod vocab {
    use super::Qname;

    pub const RDF_TYPE: Qname = Qname::new("rdf", "type");
    pub const RDFS_LABEL: Qname = Qname::new("rdfs", "label");
    pub const XSD_DATE_TIME: Qname = Qname::new("xsd", "dateTime");

    pub const GRANT: Qname = Qname::new("vivo", "Grant");
    pub const DATE_TIME_VALUE: Qname = Qname::new("vivo", "DateTimeValue");
    pub const DATE_TIME_INTERVAL: Qname = Qname::new("vivo", "DateTimeInterval");
    pub const YEAR_MONTH_DAY_PRECISION: Qname = Qname::new("vivo", "yearMonthDayPrecision");

    pub const DATE_TIME: Qname = Qname::new("vivo", "dateTime");
    pub const DATE_TIME_PRECISION: Qname = Qname::new("vivo", "dateTimePrecision");
    pub const INTERVAL_START: Qname = Qname::new("vivo", "start");
    pub const INTERVAL_END: Qname = Qname::new("vivo", "end");

    pub const SPONSOR_AWARD_ID: Qname = Qname::new("vivo", "sponsorAwardId");
    pub const LOCAL_AWARD_ID: Qname = Qname::new("vivo", "localAwardId");
    pub const TOTAL_AWARD_AMOUNT: Qname = Qname::new("vivo", "totalAwardAmount");
    pub const GRANT_DIRECT_COSTS: Qname = Qname::new("vivo", "grantDirectCosts");
    pub const ADMINISTERED_BY: Qname = Qname::new("vivo", "administeredBy");
    pub const ADMINISTERS: Qname = Qname::new("vivo", "administers");
    pub const GRANT_AWARDED_BY: Qname = Qname::new("vivo", "grantAwardedBy");
    pub const AWARDS_GRANT: Qname = Qname::new("vivo", "awardsGrant");
    pub const HAS_DATE_TIME_INTERVAL: Qname = Qname::new("vivo", "dateTimeInterval");
    pub const CONTRIBUTING_ROLE: Qname = Qname::new("vivo", "contributingRole");
    pub const ROLE_CONTRIBUTES_TO: Qname = Qname::new("vivo", "roleContributesTo");

    pub const PS_CONTRACT_NUMBER: Qname = Qname::new("ufVivo", "psContractNumber");
    pub const DEPT_ID: Qname = Qname::new("ufVivo", "deptID");
    pub const UFID: Qname = Qname::new("ufVivo", "ufid");
    pub const SPONSOR_ID: Qname = Qname::new("ufVivo", "sponsorID");
    pub const HARVESTED_BY: Qname = Qname::new("ufVivo", "harvestedBy");
    pub const DATE_HARVESTED: Qname = Qname::new("ufVivo", "dateHarvested");
}

/// Constructors for the triple shapes the ingest reads and writes.
pub mod triple {
    use oxigraph::model::{Literal, Term, Triple};

    use super::{vocab, EntityRef, Qname};

    pub fn link(subject: &EntityRef, predicate: Qname, object: &EntityRef) -> Triple {
        Triple::new(subject.node(), predicate.node(), object.node())
    }

    pub fn class(subject: &EntityRef, class: Qname) -> Triple {
        Triple::new(subject.node(), vocab::RDF_TYPE.node(), class.node())
    }

    pub fn literal(subject: &EntityRef, predicate: Qname, lexical: impl Into<String>) -> Triple {
        Triple::new(
            subject.node(),
            predicate.node(),
            Literal::new_simple_literal(lexical),
        )
    }

    pub fn typed(
        subject: &EntityRef,
        predicate: Qname,
        lexical: impl Into<String>,
        datatype: Qname,
    ) -> Triple {
        Triple::new(
            subject.node(),
            predicate.node(),
            Literal::new_typed_literal(lexical, datatype.node()),
        )
    }

    /// True when `entity` is the subject or the object of `triple`.
    pub fn mentions(triple: &Triple, entity: &EntityRef) -> bool {
        let node = entity.node();
        triple.subject.to_string() == node.to_string() || triple.object == Term::NamedNode(node)
    }
}

/// Connecting role kinds, one per investigator column of the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    PrincipalInvestigator,
    CoPrincipalInvestigator,
    KeyPersonnel,
}

impl RoleKind {
    pub const ALL: [RoleKind; 3] = [
        RoleKind::PrincipalInvestigator,
        RoleKind::CoPrincipalInvestigator,
        RoleKind::KeyPersonnel,
    ];

    pub fn source_column(self) -> &'static str {
        match self {
            RoleKind::PrincipalInvestigator => "PI",
            RoleKind::CoPrincipalInvestigator => "CoPI",
            RoleKind::KeyPersonnel => "Inv",
        }
    }

    pub fn role_class(self) -> Qname {
        match self {
            RoleKind::PrincipalInvestigator => Qname::new("vivo", "PrincipalInvestigatorRole"),
            RoleKind::CoPrincipalInvestigator => Qname::new("vivo", "CoPrincipalInvestigatorRole"),
            RoleKind::KeyPersonnel => Qname::new("vivo", "InvestigatorRole"),
        }
    }

    /// role → person
    pub fn role_of(self) -> Qname {
        match self {
            RoleKind::PrincipalInvestigator => Qname::new("vivo", "principalInvestigatorRoleOf"),
            RoleKind::CoPrincipalInvestigator => {
                Qname::new("vivo", "co-PrincipalInvestigatorRoleOf")
            }
            RoleKind::KeyPersonnel => Qname::new("vivo", "investigatorRoleOf"),
        }
    }

    /// person → role
    pub fn has_role(self) -> Qname {
        match self {
            RoleKind::PrincipalInvestigator => Qname::new("vivo", "hasPrincipalInvestigatorRole"),
            RoleKind::CoPrincipalInvestigator => {
                Qname::new("vivo", "hasCo-PrincipalInvestigatorRole")
            }
            RoleKind::KeyPersonnel => Qname::new("vivo", "hasInvestigatorRole"),
        }
    }

    pub fn from_role_class_iri(iri: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.role_class().iri() == iri)
    }
}

/// Monetary amount that keeps the lexical form read from the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Amount {
    lexical: String,
    value: f64,
}

impl Amount {
    /// `None` for anything that is not a finite number.
    pub fn parse(raw: &str) -> Option<Self> {
        let lexical = raw.trim();
        let value = lexical.parse::<f64>().ok().filter(|v| v.is_finite())?;
        Some(Self {
            lexical: lexical.to_string(),
            value,
        })
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn lexical(&self) -> &str {
        &self.lexical
    }

    /// Numeric comparison against a stored literal, falling back to text equality.
    pub fn matches_literal(&self, stored: &str) -> bool {
        match stored.trim().parse::<f64>() {
            Ok(v) => v == self.value,
            Err(_) => stored.trim() == self.lexical,
        }
    }
}

/// One row of the sponsored-programs source file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRow {
    #[serde(rename = "AwardID", default)]
    pub award_id: String,
    #[serde(rename = "Title", default)]
    pub title: String,
    #[serde(rename = "SponsorAwardID", default)]
    pub sponsor_award_id: String,
    #[serde(rename = "TotalAwarded", default)]
    pub total_awarded: String,
    #[serde(rename = "DirectCosts", default)]
    pub direct_costs: String,
    #[serde(rename = "DeptID", default)]
    pub dept_id: String,
    #[serde(rename = "SponsorID", default)]
    pub sponsor_id: String,
    #[serde(rename = "StartDate", default)]
    pub start_date: String,
    #[serde(rename = "EndDate", default)]
    pub end_date: String,
    #[serde(rename = "PI", default)]
    pub pi: String,
    #[serde(rename = "CoPI", default)]
    pub co_pi: String,
    #[serde(rename = "Inv", default)]
    pub inv: String,
}

impl SourceRow {
    /// The pcn; the award id doubles as the natural key.
    pub fn pcn(&self) -> &str {
        self.award_id.trim()
    }

    pub fn investigator_ids(&self, role: RoleKind) -> Vec<&str> {
        let raw = match role {
            RoleKind::PrincipalInvestigator => &self.pi,
            RoleKind::CoPrincipalInvestigator => &self.co_pi,
            RoleKind::KeyPersonnel => &self.inv,
        };
        raw.split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Investigator {
    pub role: RoleKind,
    pub person: EntityRef,
}

/// A validated source record with every foreign key resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedGrant {
    pub pcn: String,
    pub title: Option<String>,
    pub sponsor_award_id: Option<String>,
    pub local_award_id: String,
    pub total_award_amount: Amount,
    pub grant_direct_costs: Amount,
    pub administered_by: EntityRef,
    pub sponsor: EntityRef,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub interval: Option<EntityRef>,
    pub investigators: BTreeSet<Investigator>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRole {
    pub uri: EntityRef,
    pub role: RoleKind,
    pub person: EntityRef,
}

/// Current values of an existing grant entity, as read from the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredGrant {
    pub uri: Option<EntityRef>,
    #[serde(default)]
    pub pcn: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub sponsor_award_id: Option<String>,
    #[serde(default)]
    pub local_award_id: Option<String>,
    #[serde(default)]
    pub total_award_amount: Option<String>,
    #[serde(default)]
    pub grant_direct_costs: Option<String>,
    #[serde(default)]
    pub administered_by: Option<EntityRef>,
    #[serde(default)]
    pub sponsor: Option<EntityRef>,
    #[serde(default)]
    pub interval: Option<EntityRef>,
    #[serde(default)]
    pub roles: Vec<StoredRole>,
}

/// Mints IRIs for entities the ingest creates.
///
/// IRIs are name-based (UUID v5) on a per-kind seed, so a grant, date, interval
/// or role minted for the same natural key always gets the same IRI.
#[derive(Debug, Clone)]
pub struct UriMinter {
    namespace: String,
}

impl UriMinter {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn mint(&self, kind: &str, seed: &str) -> EntityRef {
        let name = format!("{}{kind}/{seed}", self.namespace);
        let id = Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes());
        EntityRef(format!("{}n{}", self.namespace, id.simple()))
    }

    pub fn grant(&self, pcn: &str) -> EntityRef {
        self.mint("grant", pcn)
    }

    pub fn date(&self, date: NaiveDate) -> EntityRef {
        self.mint("date", &date.format("%Y-%m-%d").to_string())
    }

    pub fn interval(&self, start: Option<&EntityRef>, end: Option<&EntityRef>) -> EntityRef {
        let seed = format!(
            "{}|{}",
            start.map(EntityRef::as_str).unwrap_or_default(),
            end.map(EntityRef::as_str).unwrap_or_default()
        );
        self.mint("interval", &seed)
    }

    pub fn role(&self, pcn: &str, investigator: &Investigator) -> EntityRef {
        let seed = format!("{pcn}|{:?}|{}", investigator.role, investigator.person);
        self.mint("role", &seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qname_expands_against_namespace_table() {
        assert_eq!(
            vocab::PS_CONTRACT_NUMBER.iri(),
            "http://vivo.ufl.edu/ontology/vivo-ufl/psContractNumber"
        );
        assert_eq!(vocab::RDFS_LABEL.to_string(), "rdfs:label");
    }

    #[test]
    fn triples_use_full_iris_and_keep_literal_datatypes() {
        let grant = EntityRef::new("http://vivo.example.edu/individual/g1");
        let link = triple::class(&grant, vocab::GRANT);
        assert_eq!(
            link.to_string(),
            "<http://vivo.example.edu/individual/g1> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://vivoweb.org/ontology/core#Grant>"
        );

        let typed = triple::typed(
            &grant,
            vocab::DATE_TIME,
            "2014-07-01T00:00:00",
            vocab::XSD_DATE_TIME,
        );
        let Term::Literal(literal) = &typed.object else {
            panic!("expected a literal object");
        };
        assert_eq!(literal.value(), "2014-07-01T00:00:00");
        assert_eq!(literal.datatype().as_str(), vocab::XSD_DATE_TIME.iri());

        let role = EntityRef::new("http://vivo.example.edu/individual/r1");
        let contributes = triple::link(&role, vocab::ROLE_CONTRIBUTES_TO, &grant);
        assert!(triple::mentions(&contributes, &role));
        assert!(triple::mentions(&contributes, &grant));
        assert!(!triple::mentions(&link, &role));
    }

    #[test]
    fn role_kind_round_trips_through_class_iri() {
        for kind in RoleKind::ALL {
            assert_eq!(RoleKind::from_role_class_iri(&kind.role_class().iri()), Some(kind));
        }
        assert_eq!(RoleKind::from_role_class_iri("http://example.org/Other"), None);
    }

    #[test]
    fn amount_rejects_non_numbers_and_non_finite_values() {
        assert!(Amount::parse("abc").is_none());
        assert!(Amount::parse("").is_none());
        assert!(Amount::parse("NaN").is_none());
        assert!(Amount::parse("inf").is_none());
        let amount = Amount::parse(" 1500.50 ").unwrap();
        assert_eq!(amount.lexical(), "1500.50");
        assert_eq!(amount.value(), 1500.5);
    }

    #[test]
    fn amount_compares_numerically_with_stored_literals() {
        let amount = Amount::parse("150000").unwrap();
        assert!(amount.matches_literal("150000.00"));
        assert!(!amount.matches_literal("149999.99"));
        assert!(!amount.matches_literal("n/a"));
    }

    #[test]
    fn investigator_lists_split_on_commas_and_skip_blanks() {
        let row = SourceRow {
            pi: "12345678".into(),
            co_pi: " 111, ,222 ".into(),
            inv: String::new(),
            ..SourceRow::default()
        };
        assert_eq!(row.investigator_ids(RoleKind::PrincipalInvestigator), vec!["12345678"]);
        assert_eq!(row.investigator_ids(RoleKind::CoPrincipalInvestigator), vec!["111", "222"]);
        assert!(row.investigator_ids(RoleKind::KeyPersonnel).is_empty());
    }

    #[test]
    fn minted_uris_are_stable_per_seed_and_distinct_per_kind() {
        let minter = UriMinter::new("http://vivo.example.edu/individual/");
        let a = minter.grant("P001");
        assert_eq!(a, minter.grant("P001"));
        assert_ne!(a, minter.grant("P002"));
        assert_ne!(a, minter.mint("role", "P001"));
        assert!(a.as_str().starts_with("http://vivo.example.edu/individual/n"));
    }

    #[test]
    fn stored_grant_deserializes_with_missing_fields() {
        let grant: StoredGrant = serde_json::from_str(
            r#"{"uri":"http://vivo.example.edu/individual/g1","pcn":"P002","roles":[
                {"uri":"http://vivo.example.edu/individual/r1","role":"principal_investigator","person":"http://vivo.example.edu/individual/p1"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(grant.pcn.as_deref(), Some("P002"));
        assert!(grant.title.is_none());
        assert_eq!(grant.roles[0].role, RoleKind::PrincipalInvestigator);
    }
}

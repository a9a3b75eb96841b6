//! Per-row validation and reference resolution.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDate;
use grant_core::{Amount, Investigator, NormalizedGrant, RoleKind, SourceRow, UriMinter};
use thiserror::Error;

use crate::delta::DeltaCollector;
use crate::lookup::{ReferenceDictionaries, SupportingEntityCache};

/// Fixed date format of the source export.
pub const SOURCE_DATE_FORMAT: &str = "%m/%d/%Y";

pub const FIELD_AWARD_ID: &str = "AwardID";
pub const FIELD_TOTAL: &str = "Total Award Amount";
pub const FIELD_DIRECT: &str = "Grant Direct Costs";
pub const FIELD_DEPT: &str = "DeptID";
pub const FIELD_SPONSOR: &str = "Sponsor";
pub const FIELD_START: &str = "Start date";
pub const FIELD_END: &str = "End date";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Problem {
    #[error("missing")]
    Missing,
    #[error("invalid number")]
    InvalidNumber,
    #[error("must not be negative")]
    Negative,
    #[error("must not be less than Grant Direct Costs {direct}")]
    LessThanDirectCosts { direct: String },
    #[error("not found in VIVO")]
    NotFound,
    #[error("invalid")]
    InvalidDate,
    #[error("before start date {start}")]
    EndBeforeStart { start: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub pcn: String,
    pub field: &'static str,
    pub value: String,
    pub problem: Problem,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", self.pcn, self.field, self.value, self.problem)
    }
}

#[derive(Debug, Default)]
pub struct NormalizationOutcome {
    /// pcn → record; the last valid row for a pcn wins.
    pub grants: BTreeMap<String, NormalizedGrant>,
    pub issues: Vec<ValidationIssue>,
    /// Rows rejected, one per row regardless of how many issues it had.
    pub error_count: usize,
}

pub fn parse_source_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), SOURCE_DATE_FORMAT).ok()
}

/// Turns source rows into normalized grants.
///
/// Supporting dates and intervals are created as soon as a row needs them,
/// before the row is known to be valid, and are kept even if the row is later
/// rejected so that other rows can reuse them.
pub struct Normalizer<'a> {
    references: &'a ReferenceDictionaries,
    supporting: &'a mut SupportingEntityCache,
    minter: &'a UriMinter,
    delta: &'a mut DeltaCollector,
}

impl<'a> Normalizer<'a> {
    pub fn new(
        references: &'a ReferenceDictionaries,
        supporting: &'a mut SupportingEntityCache,
        minter: &'a UriMinter,
        delta: &'a mut DeltaCollector,
    ) -> Self {
        Self {
            references,
            supporting,
            minter,
            delta,
        }
    }

    pub fn normalize_all(&mut self, rows: &[SourceRow]) -> NormalizationOutcome {
        let mut outcome = NormalizationOutcome::default();
        for row in rows {
            match self.normalize(row) {
                Ok(grant) => {
                    outcome.grants.insert(grant.pcn.clone(), grant);
                }
                Err(issues) => {
                    outcome.error_count += 1;
                    outcome.issues.extend(issues);
                }
            }
        }
        outcome
    }

    pub fn normalize(&mut self, row: &SourceRow) -> Result<NormalizedGrant, Vec<ValidationIssue>> {
        let pcn = row.pcn().to_string();
        let mut issues = Vec::new();
        let mut issue = |field: &'static str, value: &str, problem: Problem| {
            issues.push(ValidationIssue {
                pcn: pcn.clone(),
                field,
                value: value.trim().to_string(),
                problem,
            });
        };

        if pcn.is_empty() {
            issue(FIELD_AWARD_ID, &row.award_id, Problem::Missing);
        }

        // Award amounts

        let total = Amount::parse(&row.total_awarded);
        if total.is_none() {
            issue(FIELD_TOTAL, &row.total_awarded, Problem::InvalidNumber);
        }
        let direct = Amount::parse(&row.direct_costs);
        if direct.is_none() {
            issue(FIELD_DIRECT, &row.direct_costs, Problem::InvalidNumber);
        }
        if let Some(total) = total.as_ref().filter(|a| a.value() < 0.0) {
            issue(FIELD_TOTAL, total.lexical(), Problem::Negative);
        }
        if let Some(direct) = direct.as_ref().filter(|a| a.value() < 0.0) {
            issue(FIELD_DIRECT, direct.lexical(), Problem::Negative);
        }
        if let (Some(total), Some(direct)) = (&total, &direct) {
            if total.value() < direct.value() {
                issue(
                    FIELD_TOTAL,
                    total.lexical(),
                    Problem::LessThanDirectCosts {
                        direct: direct.lexical().to_string(),
                    },
                );
            }
        }

        // Administering department and sponsor

        let administered_by = self.references.department(&row.dept_id).cloned();
        if administered_by.is_none() {
            issue(FIELD_DEPT, &row.dept_id, Problem::NotFound);
        }
        let sponsor = self.references.sponsor(&row.sponsor_id).cloned();
        if sponsor.is_none() {
            issue(FIELD_SPONSOR, &row.sponsor_id, Problem::NotFound);
        }

        // Dates and interval

        let start_date = parse_source_date(&row.start_date);
        let start_ref = match start_date {
            Some(date) => Some(self.supporting.resolve_date(date, self.minter, self.delta)),
            None => {
                issue(FIELD_START, &row.start_date, Problem::InvalidDate);
                None
            }
        };
        let end_date = parse_source_date(&row.end_date);
        let end_ref = match end_date {
            Some(date) => Some(self.supporting.resolve_date(date, self.minter, self.delta)),
            None => {
                issue(FIELD_END, &row.end_date, Problem::InvalidDate);
                None
            }
        };
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if end < start {
                issue(
                    FIELD_END,
                    &row.end_date,
                    Problem::EndBeforeStart {
                        start: row.start_date.trim().to_string(),
                    },
                );
            }
        }
        let interval = self.supporting.resolve_interval(
            start_ref.as_ref(),
            end_ref.as_ref(),
            self.minter,
            self.delta,
        );

        // Investigators

        let mut investigators = BTreeSet::new();
        for role in RoleKind::ALL {
            for ufid in row.investigator_ids(role) {
                match self.references.person(ufid) {
                    Some(person) => {
                        investigators.insert(Investigator {
                            role,
                            person: person.clone(),
                        });
                    }
                    None => issue(role.source_column(), ufid, Problem::NotFound),
                }
            }
        }

        match (total, direct, administered_by, sponsor, start_date, end_date) {
            (
                Some(total_award_amount),
                Some(grant_direct_costs),
                Some(administered_by),
                Some(sponsor),
                Some(start_date),
                Some(end_date),
            ) if issues.is_empty() => Ok(NormalizedGrant {
                local_award_id: pcn.clone(),
                pcn,
                title: non_empty(&row.title),
                sponsor_award_id: non_empty(&row.sponsor_award_id),
                total_award_amount,
                grant_direct_costs,
                administered_by,
                sponsor,
                start_date,
                end_date,
                interval,
                investigators,
            }),
            _ => Err(issues),
        }
    }
}

fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grant_core::EntityRef;

    fn uri(local: &str) -> EntityRef {
        EntityRef::new(format!("http://vivo.example.edu/individual/{local}"))
    }

    fn references() -> ReferenceDictionaries {
        ReferenceDictionaries {
            departments: [("27010000".to_string(), uri("dept1"))].into(),
            people: [
                ("11111111".to_string(), uri("person1")),
                ("22222222".to_string(), uri("person2")),
            ]
            .into(),
            sponsors: [("S100".to_string(), uri("sponsor1"))].into(),
        }
    }

    fn row(pcn: &str) -> SourceRow {
        SourceRow {
            award_id: pcn.into(),
            title: "Soil Carbon Study".into(),
            sponsor_award_id: "NSF-1".into(),
            total_awarded: "1000".into(),
            direct_costs: "800".into(),
            dept_id: "27010000".into(),
            sponsor_id: "S100".into(),
            start_date: "07/01/2014".into(),
            end_date: "06/30/2016".into(),
            pi: "11111111".into(),
            co_pi: "22222222".into(),
            inv: String::new(),
        }
    }

    struct Harness {
        references: ReferenceDictionaries,
        cache: SupportingEntityCache,
        minter: UriMinter,
        delta: DeltaCollector,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                references: references(),
                cache: SupportingEntityCache::default(),
                minter: UriMinter::new("http://vivo.example.edu/individual/"),
                delta: DeltaCollector::new(),
            }
        }

        fn normalize(&mut self, row: &SourceRow) -> Result<NormalizedGrant, Vec<ValidationIssue>> {
            Normalizer::new(&self.references, &mut self.cache, &self.minter, &mut self.delta)
                .normalize(row)
        }

        fn normalize_all(&mut self, rows: &[SourceRow]) -> NormalizationOutcome {
            Normalizer::new(&self.references, &mut self.cache, &self.minter, &mut self.delta)
                .normalize_all(rows)
        }
    }

    #[test]
    fn valid_row_resolves_every_reference() {
        let mut h = Harness::new();
        let grant = h.normalize(&row("P001")).unwrap();
        assert_eq!(grant.pcn, "P001");
        assert_eq!(grant.local_award_id, "P001");
        assert_eq!(grant.administered_by, uri("dept1"));
        assert_eq!(grant.sponsor, uri("sponsor1"));
        assert!(grant.interval.is_some());
        assert_eq!(grant.investigators.len(), 2);
        assert!(grant.investigators.contains(&Investigator {
            role: RoleKind::CoPrincipalInvestigator,
            person: uri("person2"),
        }));
        // two dates and one interval
        assert_eq!(h.delta.additions().len(), 3 + 3 + 3);
    }

    #[test]
    fn non_numeric_total_is_exactly_one_issue() {
        let mut h = Harness::new();
        let mut r = row("P001");
        r.total_awarded = "abc".into();
        let issues = h.normalize(&r).unwrap_err();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, FIELD_TOTAL);
        assert_eq!(issues[0].value, "abc");
        assert_eq!(issues[0].problem, Problem::InvalidNumber);
        assert_eq!(issues[0].to_string(), "P001 Total Award Amount abc invalid number");
    }

    #[test]
    fn other_field_errors_are_not_suppressed() {
        let mut h = Harness::new();
        let mut r = row("P001");
        r.total_awarded = "abc".into();
        r.dept_id = "99999999".into();
        r.pi = "11111111,33333333".into();
        let issues = h.normalize(&r).unwrap_err();
        let fields: Vec<&str> = issues.iter().map(|i| i.field).collect();
        assert_eq!(fields, vec![FIELD_TOTAL, FIELD_DEPT, "PI"]);
        assert_eq!(issues[2].value, "33333333");
    }

    #[test]
    fn total_below_direct_costs_is_rejected() {
        let mut h = Harness::new();
        let mut r = row("P001");
        r.total_awarded = "100".into();
        r.direct_costs = "150".into();
        let issues = h.normalize(&r).unwrap_err();
        assert_eq!(
            issues,
            vec![ValidationIssue {
                pcn: "P001".into(),
                field: FIELD_TOTAL,
                value: "100".into(),
                problem: Problem::LessThanDirectCosts {
                    direct: "150".into()
                },
            }]
        );
    }

    #[test]
    fn negative_amounts_are_rejected_independently() {
        let mut h = Harness::new();
        let mut r = row("P001");
        r.total_awarded = "-5".into();
        r.direct_costs = "-10".into();
        let problems: Vec<Problem> = h
            .normalize(&r)
            .unwrap_err()
            .into_iter()
            .map(|i| i.problem)
            .collect();
        assert_eq!(problems, vec![Problem::Negative, Problem::Negative]);
    }

    #[test]
    fn end_before_start_is_an_ordering_error() {
        let mut h = Harness::new();
        let mut r = row("P001");
        r.start_date = "07/01/2016".into();
        r.end_date = "06/30/2014".into();
        let issues = h.normalize(&r).unwrap_err();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, FIELD_END);
        assert_eq!(
            issues[0].problem,
            Problem::EndBeforeStart {
                start: "07/01/2016".into()
            }
        );
    }

    #[test]
    fn unparsable_date_keeps_checking_and_still_builds_an_interval() {
        let mut h = Harness::new();
        let mut r = row("P001");
        r.start_date = "2014-07-01".into();
        r.sponsor_id = "S999".into();
        let issues = h.normalize(&r).unwrap_err();
        let fields: Vec<&str> = issues.iter().map(|i| i.field).collect();
        assert_eq!(fields, vec![FIELD_SPONSOR, FIELD_START]);
        // the end date and a one-sided interval were created anyway
        assert_eq!(h.delta.additions().len(), 3 + 2);
        assert_eq!(h.cache.interval_count(), 1);
    }

    #[test]
    fn rejected_rows_keep_their_supporting_entities() {
        let mut h = Harness::new();
        let mut bad = row("P001");
        bad.dept_id = "nope".into();
        let outcome = h.normalize_all(&[bad, row("P002")]);
        assert_eq!(outcome.error_count, 1);
        assert_eq!(outcome.grants.len(), 1);
        // dates and interval from the rejected row are reused by P002, not recreated
        assert_eq!(h.delta.additions().len(), 9);
        assert_eq!(outcome.grants["P002"].interval, Some(h.minter.interval(
            Some(&h.minter.date(NaiveDate::from_ymd_opt(2014, 7, 1).unwrap())),
            Some(&h.minter.date(NaiveDate::from_ymd_opt(2016, 6, 30).unwrap())),
        )));
    }

    #[test]
    fn shared_date_pairs_share_one_interval() {
        let mut h = Harness::new();
        let outcome = h.normalize_all(&[row("P001"), row("P002")]);
        assert_eq!(outcome.grants.len(), 2);
        assert_eq!(outcome.grants["P001"].interval, outcome.grants["P002"].interval);
        let interval_creations = h
            .delta
            .additions()
            .iter()
            .filter(|t| t.object == grant_core::Term::from(grant_core::vocab::DATE_TIME_INTERVAL.node()))
            .count();
        assert_eq!(interval_creations, 1);
    }

    #[test]
    fn last_valid_row_for_a_pcn_wins() {
        let mut h = Harness::new();
        let mut first = row("P001");
        first.title = "First".into();
        let mut second = row("P001");
        second.title = "Second".into();
        let mut broken = row("P001");
        broken.total_awarded = "x".into();
        let outcome = h.normalize_all(&[first, second, broken]);
        assert_eq!(outcome.grants["P001"].title.as_deref(), Some("Second"));
        assert_eq!(outcome.error_count, 1);
    }

    #[test]
    fn blank_award_id_is_reported() {
        let mut h = Harness::new();
        let issues = h.normalize(&row("  ")).unwrap_err();
        assert_eq!(issues[0].field, FIELD_AWARD_ID);
        assert_eq!(issues[0].problem, Problem::Missing);
    }
}

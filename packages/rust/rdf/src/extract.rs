//! Property lookups over a parsed asset graph.
//!
//! A [`Resource`] is a node plus the graph it lives in. Optional lookups
//! return `None` or an empty list; `required_*` lookups fail with an
//! [`HarvesterError::InvalidModel`] naming the predicate, the resource and
//! the source file.

use std::path::Path;

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use harvester_shared::{HarvesterError, NodeSummary, Result};
use oxigraph::model::{Graph, NamedNodeRef, NamedOrBlankNodeRef, TermRef};

use crate::vocab::foaf;

/// A node of an asset graph.
#[derive(Debug, Clone, Copy)]
pub struct Resource<'a> {
    graph: &'a Graph,
    node: NamedOrBlankNodeRef<'a>,
    source: &'a Path,
}

impl<'a> Resource<'a> {
    pub fn new(graph: &'a Graph, node: NamedOrBlankNodeRef<'a>, source: &'a Path) -> Self {
        Self {
            graph,
            node,
            source,
        }
    }

    pub fn node(&self) -> NamedOrBlankNodeRef<'a> {
        self.node
    }

    /// IRI of the node, `None` for blank nodes.
    pub fn iri(&self) -> Option<&'a str> {
        match self.node {
            NamedOrBlankNodeRef::NamedNode(node) => Some(node.as_str()),
            NamedOrBlankNodeRef::BlankNode(_) => None,
        }
    }

    fn objects(&self, predicate: NamedNodeRef<'_>) -> Vec<TermRef<'a>> {
        self.graph
            .objects_for_subject_predicate(self.node, predicate)
            .collect()
    }

    fn hop(&self, node: NamedOrBlankNodeRef<'a>) -> Resource<'a> {
        Resource::new(self.graph, node, self.source)
    }

    // -----------------------------------------------------------------------
    // Literals
    // -----------------------------------------------------------------------

    /// First literal value of `predicate`.
    ///
    /// When several values exist one of them is returned; which one follows
    /// graph iteration order.
    pub fn literal(&self, predicate: NamedNodeRef<'_>) -> Option<&'a str> {
        self.objects(predicate).into_iter().find_map(|term| match term {
            TermRef::Literal(literal) => Some(literal.value()),
            _ => None,
        })
    }

    pub fn required_literal(&self, predicate: NamedNodeRef<'_>) -> Result<&'a str> {
        self.literal(predicate)
            .ok_or_else(|| self.missing(predicate))
    }

    /// Every literal value of `predicate`, duplicates included.
    pub fn literals(&self, predicate: NamedNodeRef<'_>) -> Vec<String> {
        self.objects(predicate)
            .into_iter()
            .filter_map(|term| match term {
                TermRef::Literal(literal) => Some(literal.value().to_owned()),
                _ => None,
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------------

    /// First non-literal object of `predicate`.
    pub fn object(&self, predicate: NamedNodeRef<'_>) -> Option<Resource<'a>> {
        self.objects(predicate)
            .into_iter()
            .find_map(as_node)
            .map(|node| self.hop(node))
    }

    pub fn required_object(&self, predicate: NamedNodeRef<'_>) -> Result<Resource<'a>> {
        self.object(predicate).ok_or_else(|| self.missing(predicate))
    }

    /// IRI of the first named-node object of `predicate`.
    pub fn iri_value(&self, predicate: NamedNodeRef<'_>) -> Option<&'a str> {
        self.objects(predicate).into_iter().find_map(|term| match term {
            TermRef::NamedNode(node) => Some(node.as_str()),
            _ => None,
        })
    }

    pub fn required_iri(&self, predicate: NamedNodeRef<'_>) -> Result<&'a str> {
        self.iri_value(predicate)
            .ok_or_else(|| self.missing(predicate))
    }

    /// IRIs of every named-node object of `predicate`, in graph order.
    /// Literal and blank objects are skipped.
    pub fn iris(&self, predicate: NamedNodeRef<'_>) -> Vec<String> {
        self.objects(predicate)
            .into_iter()
            .filter_map(|term| match term {
                TermRef::NamedNode(node) => Some(node.as_str().to_owned()),
                _ => None,
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Node summaries
    // -----------------------------------------------------------------------

    /// Summaries of every named object of `predicate`, labelled with their
    /// `foaf:name`.
    pub fn summaries(&self, predicate: NamedNodeRef<'_>) -> Vec<NodeSummary> {
        self.objects(predicate)
            .into_iter()
            .filter_map(|term| match term {
                TermRef::NamedNode(node) => Some(node),
                _ => None,
            })
            .map(|node| {
                let label = self.hop(node.into()).literal(foaf::NAME);
                NodeSummary::new(node.as_str(), label.map(str::to_owned))
            })
            .collect()
    }

    /// Summary of a mandatory named object whose label must also resolve.
    pub fn required_summary(&self, predicate: NamedNodeRef<'_>) -> Result<NodeSummary> {
        let target = self.required_object(predicate)?;
        let iri = target.iri().ok_or_else(|| self.missing(predicate))?;
        let label = target.required_literal(foaf::NAME)?;
        Ok(NodeSummary::new(iri, Some(label.to_owned())))
    }

    // -----------------------------------------------------------------------
    // Dates
    // -----------------------------------------------------------------------

    pub fn date(&self, predicate: NamedNodeRef<'_>) -> Result<Option<NaiveDate>> {
        self.literal(predicate)
            .map(|value| {
                parse_date(value).ok_or_else(|| {
                    HarvesterError::invalid_model(format!(
                        "Cannot parse date '{value}' of property '{}' on '{}' in '{}'",
                        predicate.as_str(),
                        describe(self.node),
                        self.source.display()
                    ))
                })
            })
            .transpose()
    }

    pub fn required_date(&self, predicate: NamedNodeRef<'_>) -> Result<NaiveDate> {
        self.date(predicate)?.ok_or_else(|| self.missing(predicate))
    }

    fn missing(&self, predicate: NamedNodeRef<'_>) -> HarvesterError {
        HarvesterError::invalid_model(format!(
            "Cannot find required property '{}' on '{}' in '{}'",
            predicate.as_str(),
            describe(self.node),
            self.source.display()
        ))
    }
}

fn as_node(term: TermRef<'_>) -> Option<NamedOrBlankNodeRef<'_>> {
    match term {
        TermRef::NamedNode(node) => Some(node.into()),
        TermRef::BlankNode(node) => Some(node.into()),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

/// Human-readable name of a node for error messages.
pub fn describe(node: NamedOrBlankNodeRef<'_>) -> String {
    match node {
        NamedOrBlankNodeRef::NamedNode(node) => node.as_str().to_owned(),
        NamedOrBlankNodeRef::BlankNode(node) => node.to_string(),
    }
}

/// Parses an `xsd:date` or `xsd:dateTime` lexical form into a local
/// calendar date.
///
/// Values carrying a timezone are converted to the local timezone before
/// truncation; values without one are taken as local already.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.contains('T') {
        if let Ok(datetime) = DateTime::parse_from_rfc3339(value) {
            return Some(datetime.with_timezone(&Local).date_naive());
        }
        return NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|datetime| datetime.date());
    }

    let (date, zone) = value.split_at_checked(10)?;
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    if zone.is_empty() {
        return Some(date);
    }
    let offset = parse_offset(zone)?;
    let midnight = offset
        .from_local_datetime(&date.and_time(NaiveTime::MIN))
        .single()?;
    Some(midnight.with_timezone(&Local).date_naive())
}

fn parse_offset(zone: &str) -> Option<FixedOffset> {
    if zone == "Z" {
        return FixedOffset::east_opt(0);
    }
    let sign = match zone.as_bytes().first()? {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let (hours, minutes) = zone.get(1..)?.split_once(':')?;
    if hours.len() != 2 || minutes.len() != 2 {
        return None;
    }
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::{dcat, dcterms};
    use oxigraph::model::{BlankNode, Literal, NamedNode, Triple};

    fn node(iri: &str) -> NamedNode {
        NamedNode::new(iri).unwrap()
    }

    fn sample_graph() -> Graph {
        let subject = node("https://example.org/asset");
        let holder = node("https://example.org/holder");
        let contact = BlankNode::default();
        let mut graph = Graph::new();
        for triple in [
            Triple::new(subject.clone(), dcterms::TITLE, Literal::new_simple_literal("Title")),
            Triple::new(subject.clone(), dcat::KEYWORD, Literal::new_simple_literal("a")),
            Triple::new(subject.clone(), dcat::KEYWORD, Literal::new_simple_literal("b")),
            Triple::new(subject.clone(), dcat::THEME, node("https://example.org/theme/1")),
            Triple::new(subject.clone(), dcat::THEME, Literal::new_simple_literal("not an iri")),
            Triple::new(subject.clone(), dcterms::RIGHTS_HOLDER, holder.clone()),
            Triple::new(holder.clone(), foaf::NAME, Literal::new_simple_literal("Holder")),
            Triple::new(subject.clone(), dcterms::PUBLISHER, holder.clone()),
            Triple::new(subject.clone(), dcterms::CREATOR, node("https://example.org/anon")),
            Triple::new(subject.clone(), dcat::CONTACT_POINT, contact.clone()),
            Triple::new(subject.clone(), dcterms::MODIFIED, Literal::new_simple_literal("2020-01-31")),
            Triple::new(subject, dcterms::ISSUED, Literal::new_simple_literal("31/01/2020")),
        ] {
            graph.insert(&triple);
        }
        graph
    }

    fn with_resource<T>(f: impl FnOnce(Resource<'_>) -> T) -> T {
        let graph = sample_graph();
        let subject = node("https://example.org/asset");
        f(Resource::new(&graph, subject.as_ref().into(), Path::new("sample.ttl")))
    }

    #[test]
    fn literal_lookups() {
        with_resource(|resource| {
            assert_eq!(resource.literal(dcterms::TITLE), Some("Title"));
            assert_eq!(resource.literal(dcterms::DESCRIPTION), None);

            let mut keywords = resource.literals(dcat::KEYWORD);
            keywords.sort();
            assert_eq!(keywords, vec!["a", "b"]);
        });
    }

    #[test]
    fn missing_required_property_message() {
        with_resource(|resource| {
            let err = resource.required_literal(dcterms::DESCRIPTION).unwrap_err();
            assert_eq!(
                err.to_string(),
                "Cannot find required property 'http://purl.org/dc/terms/description' \
                 on 'https://example.org/asset' in 'sample.ttl'"
            );
        });
    }

    #[test]
    fn iri_lists_skip_literals() {
        with_resource(|resource| {
            assert_eq!(
                resource.iris(dcat::THEME),
                vec!["https://example.org/theme/1".to_string()]
            );
            assert!(resource.iris(dcterms::LANGUAGE).is_empty());
        });
    }

    #[test]
    fn summaries_carry_optional_labels() {
        with_resource(|resource| {
            let publishers = resource.summaries(dcterms::PUBLISHER);
            assert_eq!(
                publishers,
                vec![NodeSummary::new("https://example.org/holder", Some("Holder".into()))]
            );

            let creators = resource.summaries(dcterms::CREATOR);
            assert_eq!(creators, vec![NodeSummary::new("https://example.org/anon", None)]);

            let holder = resource.required_summary(dcterms::RIGHTS_HOLDER).unwrap();
            assert_eq!(holder.summary.as_deref(), Some("Holder"));
        });
    }

    #[test]
    fn required_summary_needs_a_label() {
        with_resource(|resource| {
            let err = resource.required_summary(dcterms::CREATOR).unwrap_err();
            assert!(err.to_string().contains("http://xmlns.com/foaf/0.1/name"));
            assert!(err.to_string().contains("https://example.org/anon"));
        });
    }

    #[test]
    fn blank_objects_are_reachable_but_have_no_iri() {
        with_resource(|resource| {
            let contact = resource.object(dcat::CONTACT_POINT).unwrap();
            assert!(contact.iri().is_none());
        });
    }

    #[test]
    fn dates() {
        with_resource(|resource| {
            assert_eq!(
                resource.required_date(dcterms::MODIFIED).unwrap(),
                NaiveDate::from_ymd_opt(2020, 1, 31).unwrap()
            );
            let err = resource.date(dcterms::ISSUED).unwrap_err();
            assert!(err.to_string().contains("31/01/2020"));
            assert!(resource.date(dcterms::TEMPORAL).unwrap().is_none());
        });
    }

    #[test]
    fn parse_date_lexical_forms() {
        let day = NaiveDate::from_ymd_opt(2021, 3, 2).unwrap();
        assert_eq!(parse_date("2021-03-02"), Some(day));
        assert_eq!(parse_date(" 2021-03-02 "), Some(day));
        assert_eq!(parse_date("2021-03-02T10:30:00"), Some(day));
        assert!(parse_date("2021-03-02+01:00").is_some());
        assert!(parse_date("2021-03-02Z").is_some());
        assert_eq!(parse_date("2021-03-02+1"), None);
        assert_eq!(parse_date("2021-13-02"), None);
        assert_eq!(parse_date("March 2nd"), None);
        assert_eq!(parse_date(""), None);
    }
}

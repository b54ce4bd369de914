use std::collections::BTreeSet;

use chrono::NaiveDate;
use litharvest_core::{CanonicalRecord, RawRecord};

use crate::config::MergeConfig;
use crate::resolve::{Cluster, doi_key, title_key};

/// Reduces each cluster to exactly one [`CanonicalRecord`].
///
/// Primary selection is a strict priority order: configured priority
/// sources, then the more recent fully-specified publication date, then
/// bare date presence, then encounter order. Remaining fields fill in
/// first-wins from encounter order, except the documented union/max/longest
/// overrides.
#[derive(Debug, Clone)]
pub struct MergePolicy {
    priority_sources: Vec<String>,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self::new(&MergeConfig::default())
    }
}

impl MergePolicy {
    pub fn new(config: &MergeConfig) -> Self {
        Self {
            priority_sources: config.priority_sources.clone(),
        }
    }

    /// `None` only for an empty cluster, which the resolver never emits.
    pub fn merge_cluster(&self, cluster: Cluster) -> Option<CanonicalRecord> {
        let members = cluster.members;
        if members.is_empty() {
            return None;
        }

        let primary = self.primary_index(&members);
        let chosen = &members[primary];

        let title = if chosen.title.trim().is_empty() {
            members
                .iter()
                .map(|m| m.title.trim())
                .find(|t| !t.is_empty())
                .unwrap_or_default()
                .to_string()
        } else {
            chosen.title.clone()
        };

        let mut authors: &[String] = &[];
        for member in &members {
            if member.authors.len() > authors.len() {
                authors = &member.authors;
            }
        }

        let keywords: BTreeSet<String> = members
            .iter()
            .flat_map(|m| m.keywords.iter())
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        let sources: BTreeSet<String> = members
            .iter()
            .map(|m| m.source.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let doi = first_filled(&members, primary, |m| trimmed(&m.doi));
        let needs_review =
            doi.as_deref().and_then(doi_key).is_none() && title_key(&title).is_none();

        Some(CanonicalRecord {
            source: chosen.source.clone(),
            authors: authors.to_vec(),
            abstract_text: first_filled(&members, primary, |m| trimmed(&m.abstract_text)),
            doi,
            pmid: first_filled(&members, primary, |m| trimmed(&m.pmid)),
            arxiv_id: first_filled(&members, primary, |m| trimmed(&m.arxiv_id)),
            published: chosen
                .published
                .or_else(|| members.iter().find_map(|m| m.published)),
            journal: first_filled(&members, primary, |m| trimmed(&m.journal)),
            url: first_filled(&members, primary, |m| trimmed(&m.url)),
            pdf_url: first_filled(&members, primary, |m| trimmed(&m.pdf_url)),
            keywords,
            citation_count: members.iter().filter_map(|m| m.citation_count).max(),
            sources,
            merged_from_count: members.len() as u32,
            needs_review,
            title,
        })
    }

    fn primary_index(&self, members: &[RawRecord]) -> usize {
        let mut best = 0;
        for idx in 1..members.len() {
            if self.beats(&members[idx], &members[best]) {
                best = idx;
            }
        }
        best
    }

    fn is_priority(&self, record: &RawRecord) -> bool {
        self.priority_sources
            .iter()
            .any(|source| source.eq_ignore_ascii_case(record.source.trim()))
    }

    /// True when the challenger displaces the incumbent. The incumbent was
    /// encountered earlier, so every tie keeps it.
    fn beats(&self, challenger: &RawRecord, incumbent: &RawRecord) -> bool {
        match (self.is_priority(challenger), self.is_priority(incumbent)) {
            (true, false) => return true,
            (false, true) => return false,
            _ => {}
        }

        // Only fully-specified dates can discriminate on recency; a full
        // date also outranks a partial one.
        match (full_date(challenger), full_date(incumbent)) {
            (Some(left), Some(right)) if left != right => return left > right,
            (Some(_), Some(_)) => {}
            (Some(_), None) => return true,
            (None, Some(_)) => return false,
            (None, None) => {}
        }

        challenger.published.is_some() && incumbent.published.is_none()
    }
}

fn full_date(record: &RawRecord) -> Option<NaiveDate> {
    record.published.and_then(|date| date.as_day())
}

fn trimmed(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn first_filled(
    members: &[RawRecord],
    primary: usize,
    get: fn(&RawRecord) -> Option<&str>,
) -> Option<String> {
    get(&members[primary])
        .or_else(|| members.iter().find_map(|m| get(m)))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use litharvest_core::PublicationDate;

    use super::*;
    use crate::resolve::IdentityResolver;

    fn cluster(members: Vec<RawRecord>) -> Cluster {
        Cluster { members }
    }

    fn day(year: i32, month: u32, day: u32) -> PublicationDate {
        PublicationDate::Day(NaiveDate::from_ymd_opt(year, month, day).unwrap())
    }

    #[test]
    fn empty_cluster_merges_to_none() {
        assert!(MergePolicy::default().merge_cluster(cluster(vec![])).is_none());
    }

    #[test]
    fn pubmed_priority_beats_newer_date() {
        let mut pubmed = RawRecord::new("PubMed", "AI in Medicine");
        pubmed.published = Some(day(2019, 4, 2));
        let mut scopus = RawRecord::new("Scopus", "AI in Medicine");
        scopus.published = Some(day(2024, 4, 2));

        let merged = MergePolicy::default()
            .merge_cluster(cluster(vec![scopus, pubmed]))
            .unwrap();
        assert_eq!(merged.source, "PubMed");
    }

    #[test]
    fn newer_full_date_wins_among_equals() {
        let mut older = RawRecord::new("scopus", "Paper");
        older.published = Some(day(2021, 1, 1));
        let mut newer = RawRecord::new("crossref", "Paper");
        newer.published = Some(day(2023, 6, 15));

        let merged = MergePolicy::default()
            .merge_cluster(cluster(vec![older, newer]))
            .unwrap();
        assert_eq!(merged.source, "crossref");
    }

    #[test]
    fn full_date_outranks_partial_date() {
        let mut partial = RawRecord::new("scopus", "Paper");
        partial.published = Some(PublicationDate::Year(2025));
        let mut full = RawRecord::new("crossref", "Paper");
        full.published = Some(day(2020, 2, 2));

        let merged = MergePolicy::default()
            .merge_cluster(cluster(vec![partial, full]))
            .unwrap();
        assert_eq!(merged.source, "crossref");
    }

    #[test]
    fn any_date_outranks_no_date() {
        let undated = RawRecord::new("scopus", "Paper");
        let mut dated = RawRecord::new("crossref", "Paper");
        dated.published = Some(PublicationDate::Year(2022));

        let merged = MergePolicy::default()
            .merge_cluster(cluster(vec![undated, dated]))
            .unwrap();
        assert_eq!(merged.source, "crossref");
    }

    #[test]
    fn encounter_order_breaks_full_ties() {
        let first = RawRecord::new("scopus", "Paper");
        let second = RawRecord::new("crossref", "Paper");

        let merged = MergePolicy::default()
            .merge_cluster(cluster(vec![first, second]))
            .unwrap();
        assert_eq!(merged.source, "scopus");

        // Two partial dates do not discriminate either.
        let mut first = RawRecord::new("scopus", "Paper");
        first.published = Some(PublicationDate::Year(2020));
        let mut second = RawRecord::new("crossref", "Paper");
        second.published = Some(PublicationDate::Year(2024));
        let merged = MergePolicy::default()
            .merge_cluster(cluster(vec![first, second]))
            .unwrap();
        assert_eq!(merged.source, "scopus");
    }

    #[test]
    fn missing_fields_fill_from_encounter_order() {
        let mut primary = RawRecord::new("pubmed", "Paper");
        primary.doi = Some("10.1/a".to_string());
        let mut first = RawRecord::new("scopus", "Paper");
        first.journal = Some("Nature".to_string());
        first.url = Some("https://example.org/one".to_string());
        let mut second = RawRecord::new("core", "Paper");
        second.journal = Some("Science".to_string());

        let merged = MergePolicy::default()
            .merge_cluster(cluster(vec![first, second, primary]))
            .unwrap();
        // Primary's own values stay; gaps take the first non-empty member.
        assert_eq!(merged.doi.as_deref(), Some("10.1/a"));
        assert_eq!(merged.journal.as_deref(), Some("Nature"));
        assert_eq!(merged.url.as_deref(), Some("https://example.org/one"));
    }

    #[test]
    fn longest_author_list_wins() {
        let mut primary = RawRecord::new("pubmed", "Paper");
        primary.authors = vec!["Ada L.".to_string()];
        let mut other = RawRecord::new("scopus", "Paper");
        other.authors = vec!["Ada Lovelace".to_string(), "Charles Babbage".to_string()];

        let merged = MergePolicy::default()
            .merge_cluster(cluster(vec![primary, other]))
            .unwrap();
        assert_eq!(merged.authors.len(), 2);
    }

    #[test]
    fn union_fields_cover_every_member() {
        let mut a = RawRecord::new("scopus", "Paper");
        a.keywords = vec!["ml".to_string(), "health".to_string()];
        let mut b = RawRecord::new("pubmed", "Paper");
        b.keywords = vec!["health".to_string(), "nlp".to_string()];
        let c = RawRecord::new("arxiv", "Paper");

        let inputs = [a.clone(), b.clone(), c.clone()];
        let merged = MergePolicy::default()
            .merge_cluster(cluster(vec![a, b, c]))
            .unwrap();

        for member in &inputs {
            assert!(member.keywords.iter().all(|k| merged.keywords.contains(k)));
            assert!(merged.sources.contains(&member.source));
        }
    }

    #[test]
    fn citation_count_takes_maximum() {
        let mut a = RawRecord::new("scopus", "Paper");
        a.citation_count = Some(41);
        let mut b = RawRecord::new("pubmed", "Paper");
        b.citation_count = Some(7);
        let c = RawRecord::new("arxiv", "Paper");

        let merged = MergePolicy::default()
            .merge_cluster(cluster(vec![b, c, a]))
            .unwrap();
        assert_eq!(merged.citation_count, Some(41));
    }

    #[test]
    fn keyless_singleton_is_flagged_for_review() {
        let merged = MergePolicy::default()
            .merge_cluster(cluster(vec![RawRecord::new("ris-import", "???")]))
            .unwrap();
        assert!(merged.needs_review);
        assert_eq!(merged.merged_from_count, 1);

        let keyed = MergePolicy::default()
            .merge_cluster(cluster(vec![RawRecord::new("ris-import", "A real title")]))
            .unwrap();
        assert!(!keyed.needs_review);
    }

    #[test]
    fn merge_output_is_byte_identical_across_runs() {
        let mut a = RawRecord::new("scopus", "Determinism");
        a.keywords = vec!["z".to_string(), "a".to_string()];
        a.doi = Some("10.2/det".to_string());
        let mut b = RawRecord::new("pubmed", "Determinism");
        b.authors = vec!["One".to_string(), "Two".to_string()];

        let input = cluster(vec![a, b]);
        let policy = MergePolicy::default();
        let first = serde_json::to_string(&policy.merge_cluster(input.clone()).unwrap()).unwrap();
        let second = serde_json::to_string(&policy.merge_cluster(input).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn three_source_scenario_keeps_pubmed_primary() {
        let mut scopus = RawRecord::new("Scopus", "AI in Medicine");
        scopus.doi = Some("10.1/X".to_string());
        scopus.published = Some(PublicationDate::Year(2024));
        scopus.citation_count = Some(10);

        let mut pubmed = RawRecord::new("PubMed", "AI in Medicine");
        pubmed.pmid = Some("123".to_string());
        pubmed.doi = Some("10.1/x".to_string());
        pubmed.abstract_text = Some("Background: ...".to_string());

        let mut arxiv = RawRecord::new("arXiv", "ai in medicine");
        arxiv.published = Some(PublicationDate::Year(2023));

        let mut clusters = IdentityResolver::new().resolve(vec![scopus, pubmed, arxiv]);
        assert_eq!(clusters.len(), 1);

        let merged = MergePolicy::default()
            .merge_cluster(clusters.remove(0))
            .unwrap();
        assert_eq!(merged.source, "PubMed");
        assert!(merged.doi.as_deref().unwrap().eq_ignore_ascii_case("10.1/X"));
        assert_eq!(merged.pmid.as_deref(), Some("123"));
        assert_eq!(merged.citation_count, Some(10));
        assert_eq!(merged.merged_from_count, 3);
        assert!(merged.abstract_text.is_some());
        // Primary has no date; the first dated member supplies it.
        assert_eq!(merged.published, Some(PublicationDate::Year(2024)));
        let expected: Vec<&str> = vec!["PubMed", "Scopus", "arXiv"];
        let got: Vec<&str> = merged.sources.iter().map(String::as_str).collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn no_duplicate_survivors_after_full_dedupe() {
        let mut a = RawRecord::new("scopus", "Paper one");
        a.doi = Some("10.3/one".to_string());
        let mut b = RawRecord::new("pubmed", "Paper One!");
        b.doi = Some("10.3/ONE".to_string());
        let mut c = RawRecord::new("arxiv", "Paper two");
        c.doi = Some("10.3/two".to_string());
        let d = RawRecord::new("core", "Paper three");

        let policy = MergePolicy::default();
        let survivors: Vec<CanonicalRecord> = IdentityResolver::new()
            .resolve(vec![a, b, c, d])
            .into_iter()
            .filter_map(|cluster| policy.merge_cluster(cluster))
            .collect();

        for (i, left) in survivors.iter().enumerate() {
            for right in survivors.iter().skip(i + 1) {
                let doi_dup = match (
                    left.doi.as_deref().and_then(doi_key),
                    right.doi.as_deref().and_then(doi_key),
                ) {
                    (Some(l), Some(r)) => l == r,
                    _ => false,
                };
                let title_dup = match (title_key(&left.title), title_key(&right.title)) {
                    (Some(l), Some(r)) => l == r,
                    _ => false,
                };
                assert!(!doi_dup && !title_dup);
            }
        }
    }
}

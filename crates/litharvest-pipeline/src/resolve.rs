use std::collections::HashMap;

use litharvest_core::RawRecord;
use tracing::debug;

use crate::identifiers::Doi;

/// Grouping key from a record's DOI: lowercased, scheme prefix stripped.
pub fn doi_key(raw: &str) -> Option<String> {
    Doi::parse(raw).ok().map(|doi| doi.normalized)
}

/// Grouping key from a record's title: lowercased, punctuation squashed to
/// spaces, whitespace collapsed. `None` when nothing usable is left.
pub fn title_key(title: &str) -> Option<String> {
    let lowercase = title.to_lowercase();
    let cleaned: String = lowercase
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    let key = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if key.is_empty() { None } else { Some(key) }
}

/// Records believed to describe the same publication, in encounter order.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub members: Vec<RawRecord>,
}

/// Groups raw records into duplicate clusters on exact identity keys.
///
/// DOI keys are authoritative and looked up first; title keys catch records
/// without a DOI. A record joining a cluster registers its other key as
/// well, and a record whose two keys land in different clusters unifies
/// them, so matches stay transitive across key kinds.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver;

impl IdentityResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(&self, records: Vec<RawRecord>) -> Vec<Cluster> {
        let mut doi_slots: HashMap<String, usize> = HashMap::new();
        let mut title_slots: HashMap<String, usize> = HashMap::new();
        let mut slots = DisjointSet::default();
        let mut assigned = Vec::with_capacity(records.len());

        for record in &records {
            let doi = record.doi.as_deref().and_then(doi_key);
            let title = title_key(&record.title);

            let doi_hit = doi.as_deref().and_then(|key| doi_slots.get(key)).copied();
            let title_hit = title
                .as_deref()
                .and_then(|key| title_slots.get(key))
                .copied();

            let slot = match (doi_hit, title_hit) {
                (Some(by_doi), Some(by_title)) => {
                    slots.union(by_doi, by_title);
                    by_doi
                }
                (Some(by_doi), None) => by_doi,
                (None, Some(by_title)) => by_title,
                (None, None) => slots.push(),
            };

            // First registration of a key wins; later holders only join.
            if let Some(key) = doi {
                doi_slots.entry(key).or_insert(slot);
            }
            if let Some(key) = title {
                title_slots.entry(key).or_insert(slot);
            }
            assigned.push(slot);
        }

        let mut cluster_of_root: HashMap<usize, usize> = HashMap::new();
        let mut clusters: Vec<Cluster> = Vec::new();
        for (record, slot) in records.into_iter().zip(assigned) {
            let root = slots.find(slot);
            let idx = *cluster_of_root.entry(root).or_insert_with(|| {
                clusters.push(Cluster { members: Vec::new() });
                clusters.len() - 1
            });
            clusters[idx].members.push(record);
        }

        debug!(clusters = clusters.len(), "resolved identity clusters");
        clusters
    }
}

#[derive(Debug, Clone, Default)]
struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn push(&mut self) -> usize {
        let id = self.parent.len();
        self.parent.push(id);
        self.rank.push(0);
        id
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, left: usize, right: usize) {
        let left_root = self.find(left);
        let right_root = self.find(right);
        if left_root == right_root {
            return;
        }

        if self.rank[left_root] < self.rank[right_root] {
            self.parent[left_root] = right_root;
        } else if self.rank[left_root] > self.rank[right_root] {
            self.parent[right_root] = left_root;
        } else {
            self.parent[right_root] = left_root;
            self.rank[left_root] += 1;
        }
    }
}

//! Duplicate classifier: exact signatures, near-duplicate pairs and optional
//! thematic caps, in that order, over one record sequence.

use std::collections::{BTreeMap, HashMap, HashSet};

use curator_core::{CuratorError, ParsedCatalog, PolicyConfig, Record, RecordRef, Result};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::audit::{AuditEntry, MatchRule, Tier};
use crate::normalize::Normalizer;
use crate::similarity::{NearRule, PairMatch, Signature, ratio};
use crate::themes::ThemeVocabulary;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub tier: Tier,
    /// Position of the retained record.
    pub survivor: usize,
    /// Positions of every member, survivor included, ascending.
    pub members: Vec<usize>,
}

/// Outcome of one classification pass.
#[derive(Debug, Clone)]
pub struct Classification {
    pub run_id: Uuid,
    /// Retain flag per input position.
    pub keep: Vec<bool>,
    pub groups: Vec<DuplicateGroup>,
    /// One entry per dropped record, ordered by position.
    pub entries: Vec<AuditEntry>,
}

impl Classification {
    pub fn retained_count(&self) -> usize {
        self.keep.iter().filter(|keep| **keep).count()
    }

    pub fn removed_count(&self) -> usize {
        self.keep.len() - self.retained_count()
    }

    pub fn is_clean(&self) -> bool {
        self.entries.is_empty()
    }

    /// Retained records in their original order.
    pub fn retained<'a>(&self, records: &'a [Record]) -> Vec<&'a Record> {
        records
            .iter()
            .zip(&self.keep)
            .filter(|(_, keep)| **keep)
            .map(|(record, _)| record)
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct Classifier {
    normalizer: Normalizer,
    near: NearRule,
    exact_only: bool,
    vocabulary: ThemeVocabulary,
    caps: BTreeMap<String, usize>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            normalizer: Normalizer::default(),
            near: NearRule::default(),
            exact_only: false,
            vocabulary: ThemeVocabulary::default(),
            caps: BTreeMap::new(),
        }
    }
}

struct Item<'a> {
    record: &'a Record,
    reference: RecordRef,
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_policy(policy: &PolicyConfig) -> Result<Self> {
        policy.validate()?;

        let mut classifier = Self {
            normalizer: Normalizer::new(&policy.normalization),
            near: NearRule::new(&policy.near_duplicate),
            exact_only: policy.exact_only,
            vocabulary: ThemeVocabulary::with_custom(&policy.themes),
            caps: BTreeMap::new(),
        };
        for (theme, cap) in &policy.thematic_caps {
            classifier = classifier.with_cap(theme, *cap)?;
        }
        Ok(classifier)
    }

    pub fn with_exact_only(mut self, exact_only: bool) -> Self {
        self.exact_only = exact_only;
        self
    }

    pub fn with_title_threshold(mut self, threshold: f64) -> Self {
        self.near = self.near.with_title_threshold(threshold);
        self
    }

    pub fn with_cap(mut self, theme: &str, cap: usize) -> Result<Self> {
        if !self.vocabulary.contains(theme) {
            return Err(CuratorError::Config(format!(
                "thematic cap names unknown theme `{theme}`"
            )));
        }
        if cap == 0 {
            return Err(CuratorError::Config(format!(
                "thematic cap for `{theme}` must be at least 1"
            )));
        }
        self.caps.insert(theme.to_string(), cap);
        Ok(self)
    }

    pub fn vocabulary(&self) -> &ThemeVocabulary {
        &self.vocabulary
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Classify a bare record sequence. Lines in the resulting references
    /// are 0 because there is no source text.
    pub fn classify(&self, records: &[Record]) -> Result<Classification> {
        let items = records
            .iter()
            .enumerate()
            .map(|(position, record)| Item {
                record,
                reference: RecordRef {
                    position,
                    line: 0,
                    title: record.title.clone(),
                },
            })
            .collect();
        self.classify_items(items)
    }

    pub fn classify_catalog(&self, catalog: &ParsedCatalog) -> Result<Classification> {
        let items = catalog
            .entries
            .iter()
            .map(|entry| Item {
                record: &entry.record,
                reference: entry.reference(),
            })
            .collect();
        self.classify_items(items)
    }

    fn classify_items(&self, items: Vec<Item<'_>>) -> Result<Classification> {
        for item in &items {
            item.record
                .validate(item.reference.position, item.reference.line)?;
        }

        let run_id = Uuid::now_v7();
        let signatures: Vec<Signature> = items
            .iter()
            .map(|item| Signature {
                title: self.normalizer.normalize(&item.record.title),
                description: self.normalizer.normalize(&item.record.description),
            })
            .collect();

        let mut pass = Pass {
            run_id,
            items: &items,
            keep: vec![true; items.len()],
            survivor_of: (0..items.len()).collect(),
            groups: Vec::new(),
            entries: Vec::new(),
        };

        let exact_rep = pass.exact_tier(&signatures);
        if !self.exact_only {
            pass.near_tier(&signatures, &exact_rep, &self.near);
        }
        pass.finish_exact_tier(&exact_rep);
        for (theme, cap) in &self.caps {
            pass.thematic_cap(&self.vocabulary, theme, *cap);
        }

        let Pass {
            keep,
            mut groups,
            mut entries,
            ..
        } = pass;
        groups.sort_by_key(|group| group.members.first().copied());
        entries.sort_by_key(|entry| entry.dropped.position);

        debug!(
            records = keep.len(),
            dropped = entries.len(),
            groups = groups.len(),
            "classification finished"
        );

        Ok(Classification {
            run_id,
            keep,
            groups,
            entries,
        })
    }
}

// ─── Pass state ────────────────────────────────────────────

struct Pass<'p, 'a> {
    run_id: Uuid,
    items: &'p [Item<'a>],
    keep: Vec<bool>,
    /// Final survivor for every dropped position.
    survivor_of: Vec<usize>,
    groups: Vec<DuplicateGroup>,
    entries: Vec<AuditEntry>,
}

impl Pass<'_, '_> {
    /// Drop later records whose signature was already seen. Returns each
    /// position's representative, the first occurrence of its signature.
    fn exact_tier(&mut self, signatures: &[Signature]) -> Vec<usize> {
        let mut first_seen: HashMap<&Signature, usize> = HashMap::new();
        let mut exact_rep: Vec<usize> = (0..signatures.len()).collect();

        for (idx, signature) in signatures.iter().enumerate() {
            match first_seen.get(signature) {
                Some(&rep) => {
                    exact_rep[idx] = rep;
                    self.keep[idx] = false;
                }
                None => {
                    first_seen.insert(signature, idx);
                }
            }
        }
        exact_rep
    }

    fn near_tier(&mut self, signatures: &[Signature], exact_rep: &[usize], rule: &NearRule) {
        let reps: Vec<usize> = (0..signatures.len()).filter(|idx| self.keep[*idx]).collect();

        let mut dsu = DisjointSet::new(reps.len());
        for i in 0..reps.len() {
            for j in (i + 1)..reps.len() {
                if rule.evaluate(&signatures[reps[i]], &signatures[reps[j]]).is_some() {
                    dsu.union(i, j);
                }
            }
        }

        let mut components: HashMap<usize, Vec<usize>> = HashMap::new();
        for (slot, idx) in reps.iter().copied().enumerate() {
            let root = dsu.find(slot);
            components.entry(root).or_default().push(idx);
        }

        let mut near_groups: Vec<Vec<usize>> = components
            .into_values()
            .filter(|members| members.len() > 1)
            .collect();
        near_groups.sort_by_key(|members| members[0]);

        for members in near_groups {
            let survivor = self.choose_survivor(&members);

            for &idx in members.iter().filter(|idx| **idx != survivor) {
                let (partner, pair) =
                    self.closest_partner(idx, survivor, &members, signatures, rule);
                self.keep[idx] = false;
                self.survivor_of[idx] = survivor;
                let entry = self
                    .entry(pair.rule, idx, partner, survivor)
                    .with_scores(pair.title, pair.description);
                self.push(entry);
            }

            let in_group: HashSet<usize> = members.iter().copied().collect();
            let mut all_members: Vec<usize> = (0..exact_rep.len())
                .filter(|idx| in_group.contains(&exact_rep[*idx]))
                .collect();
            all_members.sort_unstable();
            self.groups.push(DuplicateGroup {
                tier: Tier::Near,
                survivor,
                members: all_members,
            });
        }
    }

    /// Log the exact-tier drops once near survivors are known, and record
    /// exact groups that were not absorbed into a near group.
    fn finish_exact_tier(&mut self, exact_rep: &[usize]) {
        let mut exact_groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (idx, rep) in exact_rep.iter().copied().enumerate() {
            if rep != idx {
                exact_groups.entry(rep).or_default().push(idx);
            }
        }

        let grouped: HashSet<usize> = self
            .groups
            .iter()
            .flat_map(|group| group.members.iter().copied())
            .collect();

        for (rep, dupes) in exact_groups {
            let survivor = self.survivor_of[rep];
            for &idx in &dupes {
                self.survivor_of[idx] = survivor;
                let entry = self.entry(MatchRule::ExactSignature, idx, rep, survivor);
                self.push(entry);
            }

            if !grouped.contains(&rep) {
                let mut members = dupes;
                members.push(rep);
                members.sort_unstable();
                self.groups.push(DuplicateGroup {
                    tier: Tier::Exact,
                    survivor: rep,
                    members,
                });
            }
        }
    }

    /// Keep the first `cap` surviving records of `theme`, drop the rest.
    /// Earlier entries whose survivor gets dropped here are flagged.
    fn thematic_cap(&mut self, vocabulary: &ThemeVocabulary, theme: &str, cap: usize) {
        let members: Vec<usize> = (0..self.items.len())
            .filter(|idx| self.keep[*idx] && vocabulary.matches(theme, &self.items[*idx].record.title))
            .collect();
        if members.len() <= cap {
            return;
        }

        let anchor = members[0];
        for &idx in &members[cap..] {
            self.keep[idx] = false;
            let capped = self.items[idx].reference.position;
            for earlier in self.entries.iter_mut().filter(|e| e.survivor.position == capped) {
                earlier.survivor_capped = true;
            }
            let entry = self
                .entry(MatchRule::ThematicCap, idx, anchor, anchor)
                .with_theme(theme, cap);
            self.push(entry);
        }
    }

    /// Longest description in chars; earliest position on ties.
    fn choose_survivor(&self, members: &[usize]) -> usize {
        let mut best = members[0];
        let mut best_len = self.items[best].record.description.chars().count();
        for &idx in &members[1..] {
            let len = self.items[idx].record.description.chars().count();
            if len > best_len {
                best = idx;
                best_len = len;
            }
        }
        best
    }

    /// The group member `idx` matched, preferring the survivor.
    fn closest_partner(
        &self,
        idx: usize,
        survivor: usize,
        members: &[usize],
        signatures: &[Signature],
        rule: &NearRule,
    ) -> (usize, PairMatch) {
        std::iter::once(survivor)
            .chain(members.iter().copied().filter(|m| *m != idx && *m != survivor))
            .find_map(|other| {
                rule.evaluate(&signatures[idx], &signatures[other])
                    .map(|pair| (other, pair))
            })
            .unwrap_or_else(|| {
                let (a, b) = (&signatures[idx], &signatures[survivor]);
                let pair = PairMatch {
                    rule: MatchRule::NearTitle,
                    title: ratio(&a.title, &b.title),
                    description: ratio(&a.description, &b.description),
                };
                (survivor, pair)
            })
    }

    fn entry(&self, rule: MatchRule, dropped: usize, matched: usize, survivor: usize) -> AuditEntry {
        AuditEntry::new(
            self.run_id,
            rule,
            self.items[dropped].reference.clone(),
            self.items[matched].reference.clone(),
            self.items[survivor].reference.clone(),
            self.items[dropped].record.clone(),
        )
    }

    fn push(&mut self, entry: AuditEntry) {
        info!(
            rule = %entry.rule,
            position = entry.dropped.position,
            line = entry.dropped.line,
            survivor = entry.survivor.position,
            "dropping {:?}",
            entry.dropped.title
        );
        self.entries.push(entry);
    }
}

// ─── Union-find ────────────────────────────────────────────

struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            let root = self.find(self.parent[x]);
            self.parent[x] = root;
        }
        self.parent[x]
    }

    fn union(&mut self, left: usize, right: usize) {
        let left_root = self.find(left);
        let right_root = self.find(right);
        if left_root == right_root {
            return;
        }

        match self.rank[left_root].cmp(&self.rank[right_root]) {
            std::cmp::Ordering::Less => self.parent[left_root] = right_root,
            std::cmp::Ordering::Greater => self.parent[right_root] = left_root,
            std::cmp::Ordering::Equal => {
                self.parent[right_root] = left_root;
                self.rank[left_root] += 1;
            }
        }
    }
}

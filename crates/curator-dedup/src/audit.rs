//! Audit entries for dropped records and the JSON Lines log they are kept in.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use curator_core::{CuratorError, Record, RecordRef, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tier {
    Exact,
    Near,
    Thematic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchRule {
    ExactSignature,
    NearTitle,
    NearTitleAndDescription,
    ThematicCap,
}

impl MatchRule {
    pub fn tier(self) -> Tier {
        match self {
            MatchRule::ExactSignature => Tier::Exact,
            MatchRule::NearTitle | MatchRule::NearTitleAndDescription => Tier::Near,
            MatchRule::ThematicCap => Tier::Thematic,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MatchRule::ExactSignature => "exact-signature",
            MatchRule::NearTitle => "near-title",
            MatchRule::NearTitleAndDescription => "near-title-and-description",
            MatchRule::ThematicCap => "thematic-cap",
        }
    }
}

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why one record was dropped. Carries the full record so the drop can be
/// reverted with `curator restore`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub tier: Tier,
    pub rule: MatchRule,
    pub dropped: RecordRef,
    /// The record this one was compared against.
    pub matched: RecordRef,
    pub survivor: RecordRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_similarity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_similarity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cap: Option<usize>,
    /// A thematic cap later dropped `survivor` too, so it is no longer in
    /// the catalog.
    #[serde(default, skip_serializing_if = "is_false")]
    pub survivor_capped: bool,
    pub record: Record,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl AuditEntry {
    pub fn new(
        run_id: Uuid,
        rule: MatchRule,
        dropped: RecordRef,
        matched: RecordRef,
        survivor: RecordRef,
        record: Record,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            run_id,
            timestamp: Utc::now(),
            tier: rule.tier(),
            rule,
            dropped,
            matched,
            survivor,
            title_similarity: None,
            description_similarity: None,
            theme: None,
            cap: None,
            survivor_capped: false,
            record,
        }
    }

    pub fn with_scores(mut self, title: f64, description: f64) -> Self {
        self.title_similarity = Some(title);
        self.description_similarity = Some(description);
        self
    }

    pub fn with_theme(mut self, theme: impl Into<String>, cap: usize) -> Self {
        self.theme = Some(theme.into());
        self.cap = Some(cap);
        self
    }

    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..12].to_string()
    }
}

// ─── Log file ──────────────────────────────────────────────

/// Append-only JSON Lines file of [`AuditEntry`] values.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entries: &[AuditEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut buf = String::new();
        for entry in entries {
            buf.push_str(&serde_json::to_string(entry)?);
            buf.push('\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(buf.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    /// All entries in file order. A missing file is an empty log.
    pub fn load(&self) -> Result<Vec<AuditEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&self.path)?;
        let mut entries = Vec::new();
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(line)?);
        }
        Ok(entries)
    }

    /// Look up an entry by full id or by a unique prefix of its hex form.
    pub fn find(&self, key: &str) -> Result<AuditEntry> {
        let needle = key.trim().to_ascii_lowercase().replace('-', "");
        if needle.is_empty() {
            return Err(CuratorError::AuditEntryNotFound(key.to_string()));
        }

        let mut matches: Vec<AuditEntry> = self
            .load()?
            .into_iter()
            .filter(|entry| entry.id.simple().to_string().starts_with(&needle))
            .collect();

        match matches.len() {
            0 => Err(CuratorError::AuditEntryNotFound(format!(
                "{key} (in {})",
                self.path.display()
            ))),
            1 => Ok(matches.remove(0)),
            n => Err(CuratorError::AuditEntryNotFound(format!(
                "{key} is ambiguous, it matches {n} entries"
            ))),
        }
    }
}

//! Run pipeline: parse, classify, write and audit one catalog file.
//!
//! Every entry point loads the catalog fresh from disk. Nothing is written
//! until classification and rendering have both succeeded, and the audit
//! log is appended only once the new catalog is staged on disk.

use std::path::{Path, PathBuf};

use curator_core::{
    CatalogDraft, CatalogWriter, CuratorConfig, CuratorError, ParsedCatalog, RecordRef, Result,
    load_catalog,
};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditEntry, AuditLog};
use crate::dedup::{Classification, Classifier, DuplicateGroup};

/// Per-invocation switches that are not part of the persisted config.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Classify and report only.
    pub dry_run: bool,
    /// Audit log location. Defaults to `<file>.<audit.extension>`.
    pub audit_log: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub source: PathBuf,
    pub run_id: Uuid,
    pub dry_run: bool,
    pub before_count: usize,
    pub after_count: usize,
    /// Count shown in the container before the run, if it has one.
    pub display_count_before: Option<usize>,
    pub groups: Vec<DuplicateGroup>,
    pub entries: Vec<AuditEntry>,
    pub written: bool,
    pub backup_path: Option<PathBuf>,
    pub audit_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub census: Vec<ThemeCount>,
}

impl RunReport {
    fn new(source: &Path, catalog: &ParsedCatalog, classification: Classification, dry_run: bool) -> Self {
        Self {
            source: source.to_path_buf(),
            run_id: classification.run_id,
            dry_run,
            before_count: catalog.len(),
            after_count: classification.retained_count(),
            display_count_before: catalog.display_count(),
            groups: classification.groups,
            entries: classification.entries,
            written: false,
            backup_path: None,
            audit_path: None,
            census: Vec::new(),
        }
    }

    pub fn removed(&self) -> usize {
        self.before_count - self.after_count
    }
}

/// How many records of a theme exist before and after classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThemeCount {
    pub theme: String,
    pub before: usize,
    pub after: usize,
    pub cap: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub source: PathBuf,
    pub records: usize,
    pub display_count: Option<usize>,
    pub count_sites: usize,
    pub count_in_sync: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    pub source: PathBuf,
    pub entry_id: Uuid,
    /// Where the record now sits in the catalog.
    pub restored: RecordRef,
    pub before_count: usize,
    pub after_count: usize,
    pub backup_path: Option<PathBuf>,
}

/// Full pass over `path`: classify, then write the retained records and
/// append the audit log unless `options.dry_run` is set.
pub fn run(path: &Path, config: &CuratorConfig, options: &RunOptions) -> Result<RunReport> {
    let catalog = load_catalog(path, &config.container)?;
    let classifier = Classifier::from_policy(&config.policy)?;
    let classification = classifier.classify_catalog(&catalog)?;

    let keep = classification.keep.clone();
    let mut report = RunReport::new(path, &catalog, classification, options.dry_run);

    if options.dry_run {
        report.census = theme_census(&catalog, &keep, &classifier, config);
        return Ok(report);
    }

    if report.entries.is_empty() && catalog.count_in_sync() {
        info!(path = %path.display(), records = report.before_count, "catalog is clean, nothing to write");
        return Ok(report);
    }

    let draft = CatalogDraft::retain(&catalog, &keep);
    let expected = report.before_count - report.entries.len();
    let writer = CatalogWriter::new(&config.container, &config.backup);
    let prepared = writer.prepare(path, &catalog, &draft, expected)?;

    if config.audit.enabled && !report.entries.is_empty() {
        let log = AuditLog::new(audit_path(path, config, options));
        log.append(&report.entries)?;
        report.audit_path = Some(log.path().to_path_buf());
    }

    let outcome = prepared.commit()?;
    report.written = true;
    report.backup_path = outcome.backup_path;

    info!(
        path = %path.display(),
        before = report.before_count,
        after = report.after_count,
        removed = report.removed(),
        "curation run finished"
    );
    Ok(report)
}

/// Dry run plus a per-theme census.
pub fn scan(path: &Path, config: &CuratorConfig) -> Result<RunReport> {
    let options = RunOptions {
        dry_run: true,
        audit_log: None,
    };
    run(path, config, &options)
}

pub fn validate(path: &Path, config: &CuratorConfig) -> Result<ValidationReport> {
    let catalog = load_catalog(path, &config.container)?;
    if !catalog.count_in_sync() {
        warn!(
            records = catalog.len(),
            display = ?catalog.display_count(),
            "display count does not match records"
        );
    }

    Ok(ValidationReport {
        source: path.to_path_buf(),
        records: catalog.len(),
        display_count: catalog.display_count(),
        count_sites: catalog.count_sites.len(),
        count_in_sync: catalog.count_in_sync(),
    })
}

/// Put a dropped record back, right after the record carrying its
/// survivor's title, or at the end when that record is gone.
pub fn restore(
    path: &Path,
    config: &CuratorConfig,
    entry_key: &str,
    audit_log: Option<&Path>,
) -> Result<RestoreReport> {
    let log_path = audit_log
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.audit.log_path(path));
    let entry = AuditLog::new(log_path).find(entry_key)?;

    let catalog = load_catalog(path, &config.container)?;
    if let Some(existing) = catalog.entries.iter().find(|e| e.record == entry.record) {
        return Err(CuratorError::RecordAlreadyPresent(format!(
            "{:?} is already at line {}",
            existing.record.title, existing.line
        )));
    }

    let index = catalog
        .entries
        .iter()
        .find(|e| e.record.title == entry.survivor.title)
        .map_or(catalog.len(), |e| e.position + 1);
    entry.record.validate(index, 0)?;

    let mut draft = CatalogDraft::retain(&catalog, &vec![true; catalog.len()]);
    draft.insert(index, entry.record.clone());

    let writer = CatalogWriter::new(&config.container, &config.backup);
    let outcome = writer.write(path, &catalog, &draft, catalog.len() + 1)?;

    let restored = RecordRef {
        position: index,
        line: outcome.record_lines.get(index).copied().unwrap_or_default(),
        title: entry.record.title.clone(),
    };
    info!(entry = %entry.id, title = %restored.title, position = index, "restored record");

    Ok(RestoreReport {
        source: path.to_path_buf(),
        entry_id: entry.id,
        restored,
        before_count: catalog.len(),
        after_count: outcome.records_written,
        backup_path: outcome.backup_path,
    })
}

/// Theme membership before and after classification, in theme name order.
/// Themes with no members on either side are left out.
pub fn theme_census(
    catalog: &ParsedCatalog,
    keep: &[bool],
    classifier: &Classifier,
    config: &CuratorConfig,
) -> Vec<ThemeCount> {
    classifier
        .vocabulary()
        .iter()
        .filter_map(|theme| {
            let mut before = 0;
            let mut after = 0;
            for (entry, kept) in catalog.entries.iter().zip(keep) {
                if theme.matches(&entry.record.title) {
                    before += 1;
                    if *kept {
                        after += 1;
                    }
                }
            }
            (before > 0).then(|| ThemeCount {
                theme: theme.name.clone(),
                before,
                after,
                cap: config.policy.thematic_caps.get(&theme.name).copied(),
            })
        })
        .collect()
}

fn audit_path(path: &Path, config: &CuratorConfig, options: &RunOptions) -> PathBuf {
    options
        .audit_log
        .clone()
        .unwrap_or_else(|| config.audit.log_path(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    use curator_core::parse_catalog;

    const PAGE: &str = r#"<b id="totalCount">4</b>
<script>
const initiatives = [
  { title: "Bicycle Bank", description: "Lend bikes.", category: "mobility", impact: "i", beneficiaries: "b", icon: "bicycle" },
  { title: "Bike Repair Workshops", description: "Fix bikes.", category: "mobility", impact: "i", beneficiaries: "b", icon: "wrench" },
  { title: "Cycle to School Scheme", description: "Cycles for girls.", category: "mobility", impact: "i", beneficiaries: "b", icon: "school" },
  { title: "Mobile Clinic", description: "Doctors on wheels.", category: "health", impact: "i", beneficiaries: "b", icon: "ambulance" }
];
</script>
"#;

    #[test]
    fn census_counts_theme_members_before_and_after() {
        let catalog = parse_catalog(PAGE, &Default::default()).unwrap();
        let mut config = CuratorConfig::default();
        config.policy.thematic_caps.insert("bicycle".into(), 2);
        let classifier = Classifier::from_policy(&config.policy).unwrap();
        let classification = classifier.classify_catalog(&catalog).unwrap();

        let census = theme_census(&catalog, &classification.keep, &classifier, &config);
        assert_eq!(
            census,
            vec![ThemeCount {
                theme: "bicycle".into(),
                before: 3,
                after: 2,
                cap: Some(2),
            }]
        );
    }

    #[test]
    fn audit_path_prefers_explicit_option() {
        let config = CuratorConfig::default();
        let target = Path::new("/srv/site/index.html");

        let default = audit_path(target, &config, &RunOptions::default());
        assert_eq!(default, PathBuf::from("/srv/site/index.html.audit.jsonl"));

        let explicit = RunOptions {
            audit_log: Some(PathBuf::from("/var/log/curator.jsonl")),
            ..Default::default()
        };
        assert_eq!(
            audit_path(target, &config, &explicit),
            PathBuf::from("/var/log/curator.jsonl")
        );
    }
}

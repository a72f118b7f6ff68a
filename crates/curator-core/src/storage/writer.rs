//! Catalog writer: render retained records back into the container and
//! replace the file atomically.
//!
//! Writing happens in two steps. [`CatalogWriter::prepare`] renders,
//! verifies, writes a synced temp file next to the target and takes the
//! backup. [`PreparedWrite::commit`] renames the temp file over the target.
//! Dropping a `PreparedWrite` without committing leaves the target untouched.

use std::fmt::Write as _;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::config::{BackupConfig, ContainerConfig};
use crate::error::{Result, WriteError};
use crate::models::{BlockLayout, ParsedCatalog, Record, RecordField};
use crate::storage::container::parse_catalog;

// ─── Draft ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftItem {
    pub record: Record,
    pub leading_comments: Vec<String>,
}

/// The record sequence that will be written, with comments attached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogDraft {
    pub items: Vec<DraftItem>,
    pub trailing_comments: Vec<String>,
}

impl CatalogDraft {
    /// Keep the entries whose flag is set. Comments in front of a dropped
    /// entry move to the next kept entry, or to the end of the array.
    pub fn retain(parsed: &ParsedCatalog, keep: &[bool]) -> Self {
        let mut items = Vec::with_capacity(parsed.len());
        let mut carried: Vec<String> = Vec::new();

        for (idx, entry) in parsed.entries.iter().enumerate() {
            carried.extend(entry.leading_comments.iter().cloned());
            if keep.get(idx).copied().unwrap_or(true) {
                items.push(DraftItem {
                    record: entry.record.clone(),
                    leading_comments: std::mem::take(&mut carried),
                });
            }
        }

        carried.extend(parsed.trailing_comments.iter().cloned());
        Self {
            items,
            trailing_comments: carried,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.items.iter().map(|item| &item.record)
    }

    pub fn insert(&mut self, index: usize, record: Record) {
        let index = index.min(self.items.len());
        self.items.insert(
            index,
            DraftItem {
                record,
                leading_comments: Vec::new(),
            },
        );
    }
}

// ─── Rendering ─────────────────────────────────────────────

/// Double-quoted literal with JS escaping. `</` is written as `<\/` so a
/// value can never close the surrounding `<script>` element.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    let mut prev = None;
    for c in value.chars() {
        match c {
            '/' if prev == Some('<') => out.push_str("\\/"),
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{2028}' | '\u{2029}' => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
        prev = Some(c);
    }
    out.push('"');
    out
}

pub fn render_record(record: &Record, layout: &BlockLayout) -> String {
    let mut out = format!("{}{{\n", layout.record_indent);
    for (idx, field) in RecordField::ALL.into_iter().enumerate() {
        let separator = if idx + 1 < RecordField::ALL.len() { "," } else { "" };
        let _ = writeln!(
            out,
            "{}{}: {}{separator}",
            layout.field_indent,
            field.key(),
            quote(record.get(field))
        );
    }
    out.push_str(&layout.record_indent);
    out.push('}');
    out
}

/// Render the array literal, `[` through `]`.
pub fn render_block(draft: &CatalogDraft, layout: &BlockLayout) -> String {
    if draft.is_empty() && draft.trailing_comments.is_empty() {
        return "[]".to_string();
    }

    let mut out = String::from("[\n");
    for (idx, item) in draft.items.iter().enumerate() {
        if idx > 0 {
            out.push_str(",\n");
        }
        for comment in &item.leading_comments {
            let _ = writeln!(out, "{}{comment}", layout.record_indent);
        }
        out.push_str(&render_record(&item.record, layout));
    }
    if !draft.is_empty() {
        out.push('\n');
    }
    for comment in &draft.trailing_comments {
        let _ = writeln!(out, "{}{comment}", layout.record_indent);
    }
    out.push_str(&layout.closing_indent);
    out.push(']');
    out
}

/// Full container text: the array and every count site replaced, all other
/// bytes copied through unchanged.
pub fn render_catalog(parsed: &ParsedCatalog, draft: &CatalogDraft) -> String {
    let count = draft.len().to_string();
    let mut edits = vec![(parsed.block.clone(), render_block(draft, &parsed.layout))];
    for site in &parsed.count_sites {
        edits.push((site.span.clone(), count.clone()));
    }
    edits.sort_by_key(|(range, _)| range.start);

    let mut out = String::with_capacity(parsed.text.len());
    let mut cursor = 0;
    for (range, replacement) in edits {
        out.push_str(&parsed.text[cursor..range.start]);
        out.push_str(&replacement);
        cursor = range.end;
    }
    out.push_str(&parsed.text[cursor..]);
    out
}

// ─── Writer ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct WriteOutcome {
    pub path: PathBuf,
    pub backup_path: Option<PathBuf>,
    pub records_written: usize,
    /// Line of every written record, in catalog order.
    #[serde(skip)]
    pub record_lines: Vec<usize>,
}

pub struct CatalogWriter<'a> {
    container: &'a ContainerConfig,
    backup: &'a BackupConfig,
}

impl<'a> CatalogWriter<'a> {
    pub fn new(container: &'a ContainerConfig, backup: &'a BackupConfig) -> Self {
        Self { container, backup }
    }

    /// Render and stage the new catalog. Fails with a `WriteError` when the
    /// draft does not hold `expected_count` records or the rendered text does
    /// not parse back to exactly the draft.
    pub fn prepare(
        &self,
        path: &Path,
        parsed: &ParsedCatalog,
        draft: &CatalogDraft,
        expected_count: usize,
    ) -> Result<PreparedWrite> {
        if draft.len() != expected_count {
            return Err(WriteError::CountMismatch {
                expected: expected_count,
                actual: draft.len(),
            }
            .into());
        }

        let rendered = render_catalog(parsed, draft);
        let record_lines = self.verify(&rendered, parsed, draft)?;

        let io_err = |source: std::io::Error| WriteError::Io {
            path: path.to_path_buf(),
            source,
        };
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir).map_err(io_err)?;
        temp.write_all(rendered.as_bytes()).map_err(io_err)?;
        temp.as_file().sync_all().map_err(io_err)?;
        if let Ok(meta) = fs::metadata(path) {
            fs::set_permissions(temp.path(), meta.permissions()).map_err(io_err)?;
        }
        debug!(temp = %temp.path().display(), "staged rendered catalog");

        let backup_path = if self.backup.enabled {
            Some(self.backup_original(path)?)
        } else {
            None
        };

        Ok(PreparedWrite {
            path: path.to_path_buf(),
            temp,
            backup_path,
            record_lines,
        })
    }

    pub fn write(
        &self,
        path: &Path,
        parsed: &ParsedCatalog,
        draft: &CatalogDraft,
        expected_count: usize,
    ) -> Result<WriteOutcome> {
        self.prepare(path, parsed, draft, expected_count)?.commit()
    }

    /// Parse `rendered` back and compare it with the draft. Returns the line
    /// of each record in the rendered text.
    fn verify(
        &self,
        rendered: &str,
        parsed: &ParsedCatalog,
        draft: &CatalogDraft,
    ) -> Result<Vec<usize>> {
        let reparsed = parse_catalog(rendered, self.container).map_err(|e| {
            WriteError::Verification(format!("rendered catalog does not parse: {e}"))
        })?;

        if reparsed.len() != draft.len() {
            return Err(WriteError::CountMismatch {
                expected: draft.len(),
                actual: reparsed.len(),
            }
            .into());
        }
        for (idx, (entry, expected)) in reparsed.entries.iter().zip(draft.records()).enumerate() {
            if entry.record != *expected {
                return Err(WriteError::Verification(format!(
                    "record #{idx} ({:?}) changed during rendering",
                    expected.title
                ))
                .into());
            }
        }
        if reparsed.count_sites.len() != parsed.count_sites.len() || !reparsed.count_in_sync() {
            return Err(WriteError::Verification(
                "display count does not match the rendered records".into(),
            )
            .into());
        }
        Ok(reparsed.entries.iter().map(|entry| entry.line).collect())
    }

    fn backup_original(&self, path: &Path) -> Result<PathBuf> {
        let base = self
            .backup
            .backup_path(path, chrono::Local::now().naive_local());
        let mut backup = base.clone();
        let mut n = 1;
        while backup.exists() {
            backup = PathBuf::from(format!("{}.{n}", base.display()));
            n += 1;
        }

        fs::copy(path, &backup).map_err(|source| WriteError::Io {
            path: backup.clone(),
            source,
        })?;
        info!(backup = %backup.display(), "backed up catalog");
        Ok(backup)
    }
}

/// A rendered, verified catalog waiting to replace the original.
#[derive(Debug)]
pub struct PreparedWrite {
    path: PathBuf,
    temp: NamedTempFile,
    backup_path: Option<PathBuf>,
    record_lines: Vec<usize>,
}

impl PreparedWrite {
    pub fn backup_path(&self) -> Option<&Path> {
        self.backup_path.as_deref()
    }

    pub fn records(&self) -> usize {
        self.record_lines.len()
    }

    pub fn commit(self) -> Result<WriteOutcome> {
        let PreparedWrite {
            path,
            temp,
            backup_path,
            record_lines,
        } = self;

        temp.persist(&path).map_err(|e| WriteError::Io {
            path: path.clone(),
            source: e.error,
        })?;
        info!(path = %path.display(), records = record_lines.len(), "catalog written");

        Ok(WriteOutcome {
            path,
            backup_path,
            records_written: record_lines.len(),
            record_lines,
        })
    }
}

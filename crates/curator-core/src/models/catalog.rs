use std::ops::Range;

use crate::models::record::{Record, RecordRef};

/// A parsed record together with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub record: Record,
    /// 0-based index in the array.
    pub position: usize,
    /// 1-based line of the opening brace.
    pub line: usize,
    /// Byte span of the object literal in the container text.
    pub span: Range<usize>,
    /// Comments that sat between the previous element and this one.
    pub leading_comments: Vec<String>,
}

impl CatalogEntry {
    pub fn reference(&self) -> RecordRef {
        RecordRef {
            position: self.position,
            line: self.line,
            title: self.record.title.clone(),
        }
    }
}

/// Indentation detected in the source array, reused when re-rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLayout {
    pub record_indent: String,
    pub field_indent: String,
    pub closing_indent: String,
}

impl Default for BlockLayout {
    fn default() -> Self {
        Self {
            record_indent: "    ".to_string(),
            field_indent: "        ".to_string(),
            closing_indent: String::new(),
        }
    }
}

/// A place in the container that displays the record count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountSite {
    pub span: Range<usize>,
    pub line: usize,
    pub value: usize,
}

/// The container text plus everything the writer needs to splice it.
#[derive(Debug, Clone)]
pub struct ParsedCatalog {
    pub text: String,
    /// Byte range of the array literal, `[` through `]` inclusive.
    pub block: Range<usize>,
    pub layout: BlockLayout,
    pub entries: Vec<CatalogEntry>,
    /// Comments after the last record, before `]`.
    pub trailing_comments: Vec<String>,
    pub count_sites: Vec<CountSite>,
}

impl ParsedCatalog {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn records(&self) -> Vec<Record> {
        self.entries.iter().map(|entry| entry.record.clone()).collect()
    }

    /// The count shown to users, taken from the first count site.
    pub fn display_count(&self) -> Option<usize> {
        self.count_sites.first().map(|site| site.value)
    }

    /// True when every count site already shows the real record count.
    pub fn count_in_sync(&self) -> bool {
        self.count_sites.iter().all(|site| site.value == self.len())
    }
}

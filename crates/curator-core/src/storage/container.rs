//! Record store parser: find the record array inside a container file and
//! turn it into typed records with byte-level provenance.
//!
//! The array is a JS-style literal (`const initiatives = [ {...}, ... ];`)
//! embedded in arbitrary surrounding markup. Only the array itself and the
//! display-count sites are interpreted; everything else is opaque text.

use std::ops::Range;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::config::{ContainerConfig, DEFAULT_COUNT_PATTERN};
use crate::error::{CuratorError, ParseError, Result};
use crate::models::{BlockLayout, CatalogEntry, CountSite, ParsedCatalog, RecordField, RecordFields};

static DEFAULT_COUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(DEFAULT_COUNT_PATTERN).expect("default count pattern is valid"));

/// Read and parse a container file.
pub fn load_catalog(path: &Path, config: &ContainerConfig) -> Result<ParsedCatalog> {
    let text = std::fs::read_to_string(path)?;
    parse_catalog(text, config)
}

/// Parse container text. Pure: no I/O, no partial results.
pub fn parse_catalog(text: impl Into<String>, config: &ContainerConfig) -> Result<ParsedCatalog> {
    let text = text.into();
    let open = locate_array(&text, &config.array_name)?;

    let (body, close) = {
        let mut scanner = Scanner::new(&text, open);
        let body = scanner.parse_array()?;
        (body, scanner.pos)
    };
    let block = open..close;
    let count_sites = find_count_sites(&text, &block, &config.count_pattern)?;

    debug!(
        records = body.entries.len(),
        count_sites = count_sites.len(),
        "parsed record array `{}`",
        config.array_name
    );

    Ok(ParsedCatalog {
        text,
        block,
        layout: body.layout,
        entries: body.entries,
        trailing_comments: body.trailing_comments,
        count_sites,
    })
}

/// 1-based line number of a byte offset.
pub fn line_of(text: &str, offset: usize) -> usize {
    text[..offset].matches('\n').count() + 1
}

// ─── Array location ────────────────────────────────────────

fn locate_array(text: &str, array_name: &str) -> Result<usize> {
    if array_name.trim().is_empty() {
        return Err(CuratorError::Config("array name must not be empty".into()));
    }

    let pattern = format!(
        r"\b(?:const|let|var)\s+{}\s*=\s*\[",
        regex::escape(array_name.trim())
    );
    let re = Regex::new(&pattern)
        .map_err(|e| CuratorError::Config(format!("invalid array name `{array_name}`: {e}")))?;

    let mut matches = re.find_iter(text);
    let Some(first) = matches.next() else {
        return Err(ParseError::new(1, format!("no `{array_name} = [` declaration found")).into());
    };
    if let Some(second) = matches.next() {
        return Err(ParseError::new(
            line_of(text, second.start()),
            format!(
                "`{array_name}` is declared more than once (first declaration at line {})",
                line_of(text, first.start())
            ),
        )
        .into());
    }

    // The match ends just past `[`.
    Ok(first.end() - 1)
}

// ─── Count sites ───────────────────────────────────────────

fn find_count_sites(text: &str, block: &Range<usize>, pattern: &str) -> Result<Vec<CountSite>> {
    if pattern.trim().is_empty() {
        return Ok(Vec::new());
    }

    let compiled;
    let re: &Regex = if pattern == DEFAULT_COUNT_PATTERN {
        &*DEFAULT_COUNT_RE
    } else {
        compiled = Regex::new(pattern)
            .map_err(|e| CuratorError::Config(format!("invalid count pattern: {e}")))?;
        &compiled
    };
    if !re.capture_names().any(|name| name == Some("count")) {
        return Err(CuratorError::Config(
            "count pattern needs a named `count` group".into(),
        ));
    }

    let mut sites = Vec::new();
    for caps in re.captures_iter(text) {
        let Some(m) = caps.name("count") else {
            continue;
        };
        if m.start() < block.end && m.end() > block.start {
            continue;
        }
        let line = line_of(text, m.start());
        let value = m.as_str().parse::<usize>().map_err(|_| {
            ParseError::new(line, format!("display count `{}` is not a number", m.as_str()))
        })?;
        sites.push(CountSite {
            span: m.range(),
            line,
            value,
        });
    }

    if sites.is_empty() {
        warn!("no display count found; the count will not be tracked for this file");
    }
    Ok(sites)
}

// ─── Scanner ───────────────────────────────────────────────

struct ArrayBody {
    entries: Vec<CatalogEntry>,
    trailing_comments: Vec<String>,
    layout: BlockLayout,
}

struct Scanner<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
    field_indent: Option<String>,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str, pos: usize) -> Self {
        Self {
            src,
            pos,
            line: line_of(src, pos),
            field_indent: None,
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.src[self.pos..].chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> CuratorError {
        ParseError::new(self.line, message).into()
    }

    fn error_at(line: usize, message: impl Into<String>) -> CuratorError {
        ParseError::new(line, message).into()
    }

    /// Skip whitespace and comments, collecting comment text.
    fn skip_trivia(&mut self, comments: &mut Vec<String>) -> Result<()> {
        loop {
            match (self.peek(), self.peek_second()) {
                (Some(c), _) if c.is_whitespace() => {
                    self.bump();
                }
                (Some('/'), Some('/')) => {
                    let start = self.pos;
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                    comments.push(self.src[start..self.pos].trim_end().to_string());
                }
                (Some('/'), Some('*')) => {
                    let start = self.pos;
                    let line = self.line;
                    self.bump();
                    self.bump();
                    loop {
                        match self.bump() {
                            None => return Err(Self::error_at(line, "unterminated block comment")),
                            Some('*') if self.peek() == Some('/') => {
                                self.bump();
                                break;
                            }
                            Some(_) => {}
                        }
                    }
                    comments.push(self.src[start..self.pos].to_string());
                }
                _ => return Ok(()),
            }
        }
    }

    fn parse_array(&mut self) -> Result<ArrayBody> {
        let open_line = self.line;
        self.bump();

        let mut layout = BlockLayout::default();
        let mut entries: Vec<CatalogEntry> = Vec::new();
        let mut pending = Vec::new();

        loop {
            self.skip_trivia(&mut pending)?;
            match self.peek() {
                None => {
                    return Err(Self::error_at(
                        open_line,
                        "unterminated record array (no matching `]`)",
                    ));
                }
                Some(']') => {
                    if let Some(indent) = line_indent(self.src, self.pos) {
                        layout.closing_indent = indent;
                    }
                    self.bump();
                    break;
                }
                Some('{') => {
                    let position = entries.len();
                    if position == 0
                        && let Some(indent) = line_indent(self.src, self.pos)
                    {
                        layout.record_indent = indent;
                    }

                    let leading = std::mem::take(&mut pending);
                    entries.push(self.parse_record(position, leading)?);

                    self.skip_trivia(&mut pending)?;
                    match self.peek() {
                        Some(',') => {
                            self.bump();
                        }
                        Some(']') => {}
                        None => {
                            return Err(Self::error_at(
                                open_line,
                                "unterminated record array (no matching `]`)",
                            ));
                        }
                        Some(other) => {
                            return Err(self.error(format!(
                                "expected `,` or `]` after record #{position}, found `{other}`"
                            )));
                        }
                    }
                }
                Some(',') => return Err(self.error("unexpected `,` in record array")),
                Some(other) => {
                    return Err(self.error(format!("expected a record object, found `{other}`")));
                }
            }
        }

        layout.field_indent = self
            .field_indent
            .take()
            .unwrap_or_else(|| format!("{}    ", layout.record_indent));

        Ok(ArrayBody {
            entries,
            trailing_comments: pending,
            layout,
        })
    }

    fn parse_record(&mut self, position: usize, leading_comments: Vec<String>) -> Result<CatalogEntry> {
        let start = self.pos;
        let line = self.line;
        self.bump();

        let mut fields = RecordFields::new();
        // Comments inside a record are not carried into the output.
        let mut inner_comments = Vec::new();

        loop {
            self.skip_trivia(&mut inner_comments)?;
            let key_offset = self.pos;
            let key = match self.peek() {
                None => {
                    return Err(Self::error_at(
                        line,
                        format!("unterminated record #{position} (no matching `}}`)"),
                    ));
                }
                Some('}') => {
                    self.bump();
                    break;
                }
                Some('"' | '\'') => self.read_string()?,
                Some(c) if is_ident_start(c) => self.read_identifier(),
                Some(',') => return Err(self.error(format!("unexpected `,` in record #{position}"))),
                Some(other) => {
                    return Err(self.error(format!(
                        "expected a field name in record #{position}, found `{other}`"
                    )));
                }
            };
            if self.field_indent.is_none() {
                self.field_indent = line_indent(self.src, key_offset);
            }

            self.skip_trivia(&mut inner_comments)?;
            if self.peek() != Some(':') {
                return Err(self.error(format!("expected `:` after `{key}` in record #{position}")));
            }
            self.bump();
            self.skip_trivia(&mut inner_comments)?;

            let value = match self.peek() {
                Some('"' | '\'' | '`') => self.read_string()?,
                None => {
                    return Err(Self::error_at(
                        line,
                        format!("unterminated record #{position} (no matching `}}`)"),
                    ));
                }
                Some(_) => {
                    return Err(self.error(format!(
                        "field `{key}` of record #{position} must be a string literal"
                    )));
                }
            };

            let Some(field) = RecordField::from_key(&key) else {
                return Err(self.error(format!("unknown field `{key}` in record #{position}")));
            };
            fields.set(field, value);

            self.skip_trivia(&mut inner_comments)?;
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some('}') => {}
                None => {
                    return Err(Self::error_at(
                        line,
                        format!("unterminated record #{position} (no matching `}}`)"),
                    ));
                }
                Some(other) => {
                    return Err(self.error(format!(
                        "expected `,` or `}}` after `{key}` in record #{position}, found `{other}`"
                    )));
                }
            }
        }

        let record = fields.into_record(position, line)?;
        Ok(CatalogEntry {
            record,
            position,
            line,
            span: start..self.pos,
            leading_comments,
        })
    }

    fn read_identifier(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !is_ident_continue(c) {
                break;
            }
            self.bump();
        }
        self.src[start..self.pos].to_string()
    }

    /// Read a quoted literal and decode its escapes. Raw newlines inside the
    /// quotes are kept as part of the value.
    fn read_string(&mut self) -> Result<String> {
        let line = self.line;
        let Some(quote) = self.bump() else {
            return Err(Self::error_at(line, "expected a string literal"));
        };

        let mut out = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(Self::error_at(line, "unterminated string literal"));
            };
            match c {
                c if c == quote => return Ok(out),
                '\\' => self.read_escape(&mut out, line)?,
                '$' if quote == '`' && self.peek() == Some('{') => {
                    return Err(self.error("template interpolation is not supported in record fields"));
                }
                c => out.push(c),
            }
        }
    }

    fn read_escape(&mut self, out: &mut String, line: usize) -> Result<()> {
        let Some(c) = self.bump() else {
            return Err(Self::error_at(line, "unterminated string literal"));
        };
        match c {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' if !self.peek().is_some_and(|d| d.is_ascii_digit()) => out.push('\0'),
            'x' => {
                let code = self.read_hex(2)?;
                out.push(self.char_from(code)?);
            }
            'u' => {
                let ch = self.read_unicode_escape()?;
                out.push(ch);
            }
            // Line continuation.
            '\r' => {
                if self.peek() == Some('\n') {
                    self.bump();
                }
            }
            '\n' | '\u{2028}' | '\u{2029}' => {}
            other => out.push(other),
        }
        Ok(())
    }

    fn read_hex(&mut self, digits: usize) -> Result<u32> {
        let mut value = 0u32;
        for _ in 0..digits {
            let Some(digit) = self.bump().and_then(|c| c.to_digit(16)) else {
                return Err(self.error("invalid hex escape"));
            };
            value = value * 16 + digit;
        }
        Ok(value)
    }

    fn read_unicode_escape(&mut self) -> Result<char> {
        let code = if self.peek() == Some('{') {
            self.bump();
            let mut value = 0u32;
            let mut digits = 0;
            loop {
                match self.bump() {
                    Some('}') if digits > 0 => break,
                    Some(c) => match c.to_digit(16) {
                        Some(d) if digits < 6 => {
                            value = value * 16 + d;
                            digits += 1;
                        }
                        _ => return Err(self.error("invalid unicode escape")),
                    },
                    None => return Err(self.error("invalid unicode escape")),
                }
            }
            value
        } else {
            self.read_hex(4)?
        };

        if (0xD800..0xDC00).contains(&code) && self.src[self.pos..].starts_with("\\u") {
            self.bump();
            self.bump();
            let low = self.read_hex(4)?;
            if !(0xDC00..0xE000).contains(&low) {
                return Err(self.error("unpaired surrogate in unicode escape"));
            }
            return self.char_from(0x10000 + ((code - 0xD800) << 10) + (low - 0xDC00));
        }
        self.char_from(code)
    }

    fn char_from(&self, code: u32) -> Result<char> {
        char::from_u32(code).ok_or_else(|| self.error(format!("escape U+{code:04X} is not a valid character")))
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Whitespace before `offset` on its line, if nothing else precedes it.
fn line_indent(src: &str, offset: usize) -> Option<String> {
    let line_start = src[..offset].rfind('\n').map_or(0, |i| i + 1);
    let prefix = &src[line_start..offset];
    prefix
        .chars()
        .all(|c| c == ' ' || c == '\t')
        .then(|| prefix.to_string())
}

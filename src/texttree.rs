/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The line-based structured text format used for configuration.
//!
//! Each non-blank line is some spaces of indentation, a label token, a
//! single space, and the rest of the line as data. Children are indented
//! strictly deeper than their parent. A parent whose data is empty may be
//! continued by `\`-labeled lines at a deeper indent, one per text line.
//! `\rem` marks a comment subtree. Blank lines and lines starting with `#`
//! are ignored.

use anyhow::{bail, Result};

/// One parsed entry: a label, its inline or multi-line data, and its
/// children.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Entry {
    pub label: String,
    pub data: String,
    pub children: Vec<Entry>,
}

struct Line<'a> {
    number: usize,
    indent: usize,
    label: &'a str,
    data: &'a str,
}

fn lex(text: &str) -> Result<Vec<Line<'_>>> {
    let mut lines = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let number = i + 1;
        if raw.trim().is_empty() || raw.starts_with('#') {
            continue;
        }
        let indent = raw.len() - raw.trim_start_matches(' ').len();
        let body = &raw[indent..];
        if body.starts_with('\t') {
            bail!("line {}: tab in indentation", number);
        }
        let (label, data) = match body.split_once(' ') {
            Some((label, data)) => (label, data.trim()),
            None => (body, ""),
        };
        lines.push(Line {
            number,
            indent,
            label,
            data,
        });
    }
    Ok(lines)
}

/// Parses a whole document into its top-level entries.
pub fn parse(text: &str) -> Result<Vec<Entry>> {
    let lines = lex(text)?;
    let mut pos = 0;
    let entries = parse_siblings(&lines, &mut pos, None)?;
    if let Some(line) = lines.get(pos) {
        bail!(
            "line {}: indentation shallower than the document root",
            line.number
        );
    }
    Ok(entries)
}

/// Parses consecutive entries strictly deeper than `parent_indent`; the
/// first such line fixes the sibling level.
fn parse_siblings(
    lines: &[Line<'_>],
    pos: &mut usize,
    parent_indent: Option<usize>,
) -> Result<Vec<Entry>> {
    let mut entries = Vec::new();
    let level = match lines.get(*pos) {
        Some(line) => line.indent,
        None => return Ok(entries),
    };
    if let Some(parent) = parent_indent {
        debug_assert!(level > parent);
    }
    while let Some(line) = lines.get(*pos) {
        if line.indent < level {
            break;
        }
        if line.indent > level {
            bail!(
                "line {}: indentation deeper than its siblings",
                line.number
            );
        }
        *pos += 1;
        if line.label == "\\" {
            bail!("line {}: continuation line without a parent", line.number);
        }
        let mut entry = Entry {
            label: line.label.to_string(),
            data: line.data.to_string(),
            children: Vec::new(),
        };
        // Deeper lines belong to this entry: leading `\` lines continue an
        // empty data field, the rest are children.
        if let Some(next) = lines.get(*pos) {
            if next.indent > level {
                if entry.data.is_empty() && next.label == "\\" {
                    let cont_indent = next.indent;
                    let mut text_lines = Vec::new();
                    while let Some(cont) = lines.get(*pos) {
                        if cont.indent != cont_indent || cont.label != "\\" {
                            break;
                        }
                        text_lines.push(cont.data);
                        *pos += 1;
                    }
                    entry.data = text_lines.join("\n");
                }
                if lines.get(*pos).is_some_and(|l| l.indent > level) {
                    entry.children = parse_siblings(lines, pos, Some(level))?;
                }
            }
        }
        if entry.label != "\\rem" {
            entries.push(entry);
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_flat_entries() {
        let doc = "dir modules\ndir more-modules\n";
        let entries = parse(doc).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].label, "dir");
        assert_eq!(entries[0].data, "modules");
        assert!(entries[0].children.is_empty());
        assert_eq!(entries[1].data, "more-modules");
    }

    #[test]
    fn test_blank_lines_and_comments_skipped() {
        let doc = "# a comment\n\ndir modules\n# another\n   \ndir other\n";
        let entries = parse(doc).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_children_nest_by_indent() {
        let doc = "server main\n  host example.org\n  port 8080\ndir modules\n";
        let entries = parse(doc).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].children.len(), 2);
        assert_eq!(entries[0].children[0].label, "host");
        assert_eq!(entries[0].children[1].data, "8080");
        assert!(entries[1].children.is_empty());
    }

    #[test]
    fn test_multiline_strings() {
        let doc = "motd\n  \\ first line\n  \\ second line\ndir modules\n";
        let entries = parse(doc).unwrap();
        assert_eq!(entries[0].label, "motd");
        assert_eq!(entries[0].data, "first line\nsecond line");
        assert_eq!(entries[1].label, "dir");
    }

    #[test]
    fn test_rem_subtrees_dropped() {
        let doc = "\\rem scratch\n  dir ignored\ndir modules\n";
        let entries = parse(doc).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].data, "modules");
    }

    #[test]
    fn test_label_only_lines() {
        let entries = parse("flag\n").unwrap();
        assert_eq!(entries[0].label, "flag");
        assert_eq!(entries[0].data, "");
    }

    #[test]
    fn test_bad_indentation_rejected() {
        assert!(parse("a 1\n b 2\n  c 3\n   d deeper-than-sibling?\n").is_ok());
        // A sibling deeper than the level opened by the first line.
        assert!(parse("a 1\nb 2\n  c 3\n please 4\n").is_err());
        assert!(parse("a\n\tb tabbed\n").is_err());
    }
}

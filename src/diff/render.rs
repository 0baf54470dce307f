//! Line diffs and their HTML rendering.

use std::fmt::Write as _;

use super::myers::{Edit, edit_script};

/// A grouped run of edits between two line sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOp {
    /// Lines present on both sides.
    Equal {
        /// First old line index.
        old_index: usize,
        /// First new line index.
        new_index: usize,
        /// Number of lines.
        len: usize,
    },
    /// Lines only in the old text.
    Delete {
        /// First old line index.
        old_index: usize,
        /// Number of lines.
        len: usize,
    },
    /// Lines only in the new text.
    Insert {
        /// First new line index.
        new_index: usize,
        /// Number of lines.
        len: usize,
    },
    /// A block of old lines replaced by a block of new lines.
    Replace {
        /// First old line index.
        old_index: usize,
        /// Number of old lines.
        old_len: usize,
        /// First new line index.
        new_index: usize,
        /// Number of new lines.
        new_len: usize,
    },
}

/// Rendering options for [`TextDiff::to_html`].
#[derive(Debug, Clone, Default)]
pub struct HtmlOptions {
    /// Unchanged lines kept around each change. `None` renders every line.
    pub context: Option<usize>,
    /// Header for the old column.
    pub from_label: Option<String>,
    /// Header for the new column.
    pub to_label: Option<String>,
}

/// Line-level diff between two texts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDiff {
    old_lines: Vec<String>,
    new_lines: Vec<String>,
    ops: Vec<DiffOp>,
}

impl TextDiff {
    /// Diffs two texts line by line.
    #[must_use]
    pub fn lines(old: &str, new: &str) -> Self {
        let old_lines: Vec<String> = old.lines().map(str::to_string).collect();
        let new_lines: Vec<String> = new.lines().map(str::to_string).collect();
        let ops = group(&edit_script(&old_lines, &new_lines));
        Self {
            old_lines,
            new_lines,
            ops,
        }
    }

    /// Grouped operations in document order.
    #[must_use]
    pub fn ops(&self) -> &[DiffOp] {
        &self.ops
    }

    /// Returns `true` if any line was added, removed or replaced.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.ops.iter().any(|op| !matches!(op, DiffOp::Equal { .. }))
    }

    /// Number of lines present only in the new text.
    #[must_use]
    pub fn added_lines(&self) -> usize {
        self.ops
            .iter()
            .map(|op| match *op {
                DiffOp::Insert { len, .. } => len,
                DiffOp::Replace { new_len, .. } => new_len,
                _ => 0,
            })
            .sum()
    }

    /// Number of lines present only in the old text.
    #[must_use]
    pub fn removed_lines(&self) -> usize {
        self.ops
            .iter()
            .map(|op| match *op {
                DiffOp::Delete { len, .. } => len,
                DiffOp::Replace { old_len, .. } => old_len,
                _ => 0,
            })
            .sum()
    }

    /// Renders a side-by-side HTML table.
    ///
    /// Removed text is marked with `diff_sub`, added text with `diff_add`,
    /// and replaced lines with `diff_chg` plus word-level highlights.
    #[must_use]
    pub fn to_html(&self, options: &HtmlOptions) -> String {
        let mut html = String::from("<table class=\"diff\">\n");
        if options.from_label.is_some() || options.to_label.is_some() {
            let _ = writeln!(
                html,
                "<thead><tr><th colspan=\"2\" class=\"diff_header\">{}</th>\
                 <th colspan=\"2\" class=\"diff_header\">{}</th></tr></thead>",
                escape_html(options.from_label.as_deref().unwrap_or_default()),
                escape_html(options.to_label.as_deref().unwrap_or_default()),
            );
        }
        html.push_str("<tbody>\n");

        if options.context.is_some() && !self.has_changes() {
            html.push_str(
                "<tr class=\"diff_skip\"><td colspan=\"4\">No differences found</td></tr>\n",
            );
        } else {
            let last = self.ops.len().saturating_sub(1);
            for (position, op) in self.ops.iter().enumerate() {
                self.render_op(&mut html, *op, options.context, position == 0, position == last);
            }
        }

        html.push_str("</tbody>\n</table>");
        html
    }

    fn render_op(
        &self,
        html: &mut String,
        op: DiffOp,
        context: Option<usize>,
        first: bool,
        last: bool,
    ) {
        match op {
            DiffOp::Equal {
                old_index,
                new_index,
                len,
            } => {
                let shown = |range: std::ops::Range<usize>, html: &mut String| {
                    for i in range {
                        self.equal_row(html, old_index + i, new_index + i);
                    }
                };
                match context {
                    None => shown(0..len, html),
                    Some(ctx) => {
                        let head = if first { 0 } else { ctx.min(len) };
                        let tail = if last { 0 } else { ctx.min(len - head) };
                        shown(0..head, html);
                        let skipped = len - head - tail;
                        if skipped > 0 {
                            let _ = writeln!(
                                html,
                                "<tr class=\"diff_skip\"><td colspan=\"4\">{skipped} unchanged line{}</td></tr>",
                                if skipped == 1 { "" } else { "s" }
                            );
                        }
                        shown(len - tail..len, html);
                    }
                }
            }
            DiffOp::Delete { old_index, len } => {
                for i in old_index..old_index + len {
                    self.removed_row(html, i);
                }
            }
            DiffOp::Insert { new_index, len } => {
                for j in new_index..new_index + len {
                    self.added_row(html, j);
                }
            }
            DiffOp::Replace {
                old_index,
                old_len,
                new_index,
                new_len,
            } => {
                for offset in 0..old_len.max(new_len) {
                    match (offset < old_len, offset < new_len) {
                        (true, true) => self.changed_row(html, old_index + offset, new_index + offset),
                        (true, false) => self.removed_row(html, old_index + offset),
                        (false, _) => self.added_row(html, new_index + offset),
                    }
                }
            }
        }
    }

    fn old_line(&self, i: usize) -> &str {
        self.old_lines.get(i).map_or("", String::as_str)
    }

    fn new_line(&self, j: usize) -> &str {
        self.new_lines.get(j).map_or("", String::as_str)
    }

    fn equal_row(&self, html: &mut String, i: usize, j: usize) {
        let _ = writeln!(
            html,
            "<tr><td class=\"diff_line\">{}</td><td>{}</td><td class=\"diff_line\">{}</td><td>{}</td></tr>",
            i + 1,
            escape_html(self.old_line(i)),
            j + 1,
            escape_html(self.new_line(j)),
        );
    }

    fn removed_row(&self, html: &mut String, i: usize) {
        let _ = writeln!(
            html,
            "<tr><td class=\"diff_line\">{}</td><td class=\"diff_sub\">{}</td><td class=\"diff_line\"></td><td></td></tr>",
            i + 1,
            escape_html(self.old_line(i)),
        );
    }

    fn added_row(&self, html: &mut String, j: usize) {
        let _ = writeln!(
            html,
            "<tr><td class=\"diff_line\"></td><td></td><td class=\"diff_line\">{}</td><td class=\"diff_add\">{}</td></tr>",
            j + 1,
            escape_html(self.new_line(j)),
        );
    }

    fn changed_row(&self, html: &mut String, i: usize, j: usize) {
        let (old_html, new_html) = word_diff(self.old_line(i), self.new_line(j));
        let _ = writeln!(
            html,
            "<tr><td class=\"diff_line\">{}</td><td class=\"diff_chg\">{old_html}</td><td class=\"diff_line\">{}</td><td class=\"diff_chg\">{new_html}</td></tr>",
            i + 1,
            j + 1,
        );
    }
}

/// Groups a raw edit script into runs.
fn group(edits: &[Edit]) -> Vec<DiffOp> {
    let mut ops = Vec::new();
    let mut iter = edits.iter().peekable();
    while let Some(edit) = iter.next() {
        match *edit {
            Edit::Equal { old, new } => {
                let mut len = 1;
                while matches!(iter.peek(), Some(Edit::Equal { .. })) {
                    iter.next();
                    len += 1;
                }
                ops.push(DiffOp::Equal {
                    old_index: old,
                    new_index: new,
                    len,
                });
            }
            Edit::Delete { .. } | Edit::Insert { .. } => {
                let mut deleted: Option<(usize, usize)> = None;
                let mut inserted: Option<(usize, usize)> = None;
                let mut current = Some(edit);
                while let Some(change) = current {
                    match *change {
                        Edit::Delete { old } => {
                            deleted = Some(deleted.map_or((old, 1), |(start, n)| (start, n + 1)));
                        }
                        Edit::Insert { new } => {
                            inserted = Some(inserted.map_or((new, 1), |(start, n)| (start, n + 1)));
                        }
                        Edit::Equal { .. } => {}
                    }
                    current = iter.next_if(|e| !matches!(e, Edit::Equal { .. }));
                }
                ops.push(match (deleted, inserted) {
                    (Some((old_index, old_len)), Some((new_index, new_len))) => DiffOp::Replace {
                        old_index,
                        old_len,
                        new_index,
                        new_len,
                    },
                    (Some((old_index, len)), None) => DiffOp::Delete { old_index, len },
                    (None, Some((new_index, len))) => DiffOp::Insert { new_index, len },
                    (None, None) => continue,
                });
            }
        }
    }
    ops
}

/// Word-level highlight of one replaced line pair.
fn word_diff(old: &str, new: &str) -> (String, String) {
    let old_words = tokenize(old);
    let new_words = tokenize(new);
    let mut old_html = String::new();
    let mut new_html = String::new();
    let mut old_run = String::new();
    let mut new_run = String::new();

    for edit in edit_script(&old_words, &new_words) {
        match edit {
            Edit::Equal { old, .. } => {
                flush(&mut old_html, &mut old_run, "diff_sub");
                flush(&mut new_html, &mut new_run, "diff_add");
                let word = old_words.get(old).copied().unwrap_or_default();
                old_html.push_str(&escape_html(word));
                new_html.push_str(&escape_html(word));
            }
            Edit::Delete { old } => old_run.push_str(old_words.get(old).copied().unwrap_or_default()),
            Edit::Insert { new } => new_run.push_str(new_words.get(new).copied().unwrap_or_default()),
        }
    }
    flush(&mut old_html, &mut old_run, "diff_sub");
    flush(&mut new_html, &mut new_run, "diff_add");
    (old_html, new_html)
}

fn flush(html: &mut String, run: &mut String, class: &str) {
    if !run.is_empty() {
        let _ = write!(html, "<span class=\"{class}\">{}</span>", escape_html(run));
        run.clear();
    }
}

/// Splits a line into alternating word and whitespace tokens.
fn tokenize(line: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut in_space: Option<bool> = None;
    for (i, ch) in line.char_indices() {
        let space = ch.is_whitespace();
        if in_space.is_some_and(|prev| prev != space) {
            tokens.extend(line.get(start..i));
            start = i;
        }
        in_space = Some(space);
    }
    if start < line.len() {
        tokens.extend(line.get(start..));
    }
    tokens
}

/// Escapes text for inclusion in HTML element content or attributes.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}

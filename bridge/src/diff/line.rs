use serde::{Deserialize, Serialize};
use similar::{Algorithm, ChangeTag, TextDiff};

use super::position::row_and_column_to_cursor;
use super::{DIFF_DEADLINE, DiffPoint};

/// One step of a line-level patch.
///
/// Every coordinate addresses the original document, so a batch produced by
/// [`code_diff`] is applied as a whole rather than edit by edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Edit {
    Insert { at: DiffPoint, text: String },
    Delete { start: DiffPoint, stop: DiffPoint },
}

/// Line-granular diff from `before` to `after`.
///
/// Changed hunks are emitted as one deletion followed by one insertion
/// anchored where the deletion starts.
pub fn code_diff(before: &str, after: &str) -> Vec<Edit> {
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .timeout(DIFF_DEADLINE)
        .diff_lines(before, after);

    let mut edits = Vec::new();
    let mut hunk = Hunk::default();
    // cursor walks the original text; it skips removed lines and never
    // counts inserted ones
    let mut cursor = DiffPoint::default();
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Equal => {
                cursor = hunk.flush(cursor, &mut edits);
                cursor = advance(cursor, change.value());
            }
            ChangeTag::Delete => hunk.removed.push_str(change.value()),
            ChangeTag::Insert => hunk.added.push_str(change.value()),
        }
    }
    hunk.flush(cursor, &mut edits);

    edits
}

#[derive(Default)]
struct Hunk {
    removed: String,
    added: String,
}

impl Hunk {
    /// Emits the pending hunk at `cursor` and returns the cursor moved past
    /// the removed lines.
    fn flush(&mut self, cursor: DiffPoint, edits: &mut Vec<Edit>) -> DiffPoint {
        let mut next = cursor;
        if !self.removed.is_empty() {
            next = advance(cursor, &self.removed);
            edits.push(Edit::Delete {
                start: cursor,
                stop: next,
            });
        }
        if !self.added.is_empty() {
            edits.push(Edit::Insert {
                at: cursor,
                text: std::mem::take(&mut self.added),
            });
        }
        self.removed.clear();
        next
    }
}

fn advance(mut point: DiffPoint, text: &str) -> DiffPoint {
    for ch in text.chars() {
        if ch == '\n' {
            point = point.next_row();
        } else {
            point.column += 1;
        }
    }
    point
}

pub fn apply_edits(before: &str, edits: &[Edit]) -> String {
    let source: Vec<char> = before.chars().collect();
    let mut output = String::with_capacity(before.len());
    let mut position = 0;

    for edit in edits {
        match edit {
            Edit::Insert { at, text } => {
                let offset = row_and_column_to_cursor(before, *at);
                if offset > position {
                    output.extend(&source[position..offset]);
                    position = offset;
                }
                output.push_str(text);
            }
            Edit::Delete { start, stop } => {
                let start = row_and_column_to_cursor(before, *start);
                let stop = row_and_column_to_cursor(before, *stop);
                if start > position {
                    output.extend(&source[position..start]);
                }
                position = position.max(stop);
            }
        }
    }

    if position < source.len() {
        output.extend(&source[position..]);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaced_last_line_is_one_delete_and_one_insert() {
        let edits = code_diff("foo\nbar\n", "foo\nbaz\n");
        assert_eq!(
            edits,
            vec![
                Edit::Delete {
                    start: DiffPoint::new(1, 0),
                    stop: DiffPoint::new(2, 0),
                },
                Edit::Insert {
                    at: DiffPoint::new(1, 0),
                    text: "baz\n".to_string(),
                },
            ]
        );
    }

    #[test]
    fn identical_text_has_no_edits() {
        assert!(code_diff("a\nb\n", "a\nb\n").is_empty());
        assert!(code_diff("", "").is_empty());
    }

    #[test]
    fn pure_insertion_does_not_move_later_lines() {
        let edits = code_diff("one\nthree\n", "one\ntwo\nthree\n");
        assert_eq!(
            edits,
            vec![Edit::Insert {
                at: DiffPoint::new(1, 0),
                text: "two\n".to_string(),
            }]
        );
    }

    #[test]
    fn edits_rebuild_the_new_text() {
        let pairs = [
            ("foo\nbar\n", "foo\nbaz\n"),
            ("", "fn main() {}\n"),
            ("fn main() {}\n", ""),
            ("a\nb\nc\nd\n", "a\nc\nd\ne\n"),
            ("a\nb", "a\nc"),
            ("x\ny\nz", "y\nx\nz\nw"),
            ("héllo\nwörld\n", "hello\nwörld\nagain\n"),
            ("keep\n\n\nkeep\n", "keep\nkeep\n"),
        ];
        for (before, after) in pairs {
            let edits = code_diff(before, after);
            assert_eq!(apply_edits(before, &edits), after, "{before:?} -> {after:?}");
        }
    }

    #[test]
    fn later_hunks_address_the_original_rows() {
        let edits = code_diff("a\nb\nc\nd\n", "a\nB\nB2\nc\nD\n");
        assert_eq!(
            edits,
            vec![
                Edit::Delete {
                    start: DiffPoint::new(1, 0),
                    stop: DiffPoint::new(2, 0),
                },
                Edit::Insert {
                    at: DiffPoint::new(1, 0),
                    text: "B\nB2\n".to_string(),
                },
                Edit::Delete {
                    start: DiffPoint::new(3, 0),
                    stop: DiffPoint::new(4, 0),
                },
                Edit::Insert {
                    at: DiffPoint::new(3, 0),
                    text: "D\n".to_string(),
                },
            ]
        );
    }

    #[test]
    fn apply_keeps_text_outside_edits() {
        let edits = vec![Edit::Delete {
            start: DiffPoint::new(0, 1),
            stop: DiffPoint::new(0, 3),
        }];
        assert_eq!(apply_edits("abcd", &edits), "ad");
    }
}

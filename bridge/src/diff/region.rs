use super::cleanup::{ChunkTag, char_chunks, cleanup_semantic};
use super::position::point_at;
use super::{DiffHighlightType, DiffPoint, DiffRange, DiffRangeType};

/// Computes the regions that changed between `before` and `after`.
///
/// Deletions are reported in `before` coordinates and insertions in `after`
/// coordinates, in document order. Identical inputs produce no ranges.
pub fn diff(before: &str, after: &str) -> Vec<DiffRange> {
    if before == after {
        return Vec::new();
    }

    let before_chars: Vec<char> = before.chars().collect();
    let after_chars: Vec<char> = after.chars().collect();
    let chunks = cleanup_semantic(char_chunks(before, after));

    let mut result = Vec::new();
    let mut before_index = 0;
    let mut after_index = 0;
    for chunk in chunks {
        let length = chunk.len();
        match chunk.tag {
            ChunkTag::Equal => {
                before_index += length;
                after_index += length;
            }
            ChunkTag::Insert => {
                result.push(classify(
                    DiffRangeType::Add,
                    &after_chars,
                    after_index,
                    length,
                ));
                after_index += length;
            }
            ChunkTag::Delete => {
                result.push(classify(
                    DiffRangeType::Delete,
                    &before_chars,
                    before_index,
                    length,
                ));
                before_index += length;
            }
        }
    }

    result
}

/// Builds the range for `source[index..index + length]`.
///
/// Same-row changes are inline (`Word`) spans. Anything crossing a row, a
/// change that begins on a newline, and a change ending on the last line of
/// the document is widened to whole rows so that the host never receives a
/// line decoration covering half a row.
///
/// Rows and columns are 0-based char offsets and `stop` is exclusive, so a
/// `Word` range over `bar` at the start of row 1 is `(1, 0)..(1, 3)`.
fn classify(range_type: DiffRangeType, source: &[char], index: usize, length: usize) -> DiffRange {
    let mut start = point_at(source, index);
    let mut stop = point_at(source, index + length);
    let mut highlight_type = if start.row == stop.row {
        DiffHighlightType::Word
    } else {
        DiffHighlightType::Line
    };

    let starts_on_newline = source.get(index) == Some(&'\n');
    let touches_end = !source.is_empty() && index + length == source.len() - 1;
    let mut stop_extended = false;

    if starts_on_newline {
        start = start.next_row();
        highlight_type = DiffHighlightType::Line;
        if start.row == stop.row {
            stop = stop.next_row();
            stop_extended = true;
        }
    }

    if touches_end {
        highlight_type = DiffHighlightType::Line;
        if !stop_extended {
            stop = stop.next_row();
        }
    }

    if highlight_type == DiffHighlightType::Line {
        start = DiffPoint::new(start.row, 0);
    }

    DiffRange {
        range_type,
        highlight_type,
        start,
        stop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(
        range_type: DiffRangeType,
        highlight_type: DiffHighlightType,
        start: (usize, usize),
        stop: (usize, usize),
    ) -> DiffRange {
        DiffRange {
            range_type,
            highlight_type,
            start: DiffPoint::new(start.0, start.1),
            stop: DiffPoint::new(stop.0, stop.1),
        }
    }

    #[test]
    fn identical_text_has_no_ranges() {
        for text in ["", "a", "foo\nbar\n", "  indented\n\tcode"] {
            assert!(diff(text, text).is_empty());
        }
    }

    #[test]
    fn change_on_last_line_covers_whole_line() {
        let ranges = diff("foo\nbar\n", "foo\nbaz\n");
        assert_eq!(
            ranges,
            vec![
                range(DiffRangeType::Delete, DiffHighlightType::Line, (1, 0), (2, 0)),
                range(DiffRangeType::Add, DiffHighlightType::Line, (1, 0), (2, 0)),
            ]
        );
    }

    #[test]
    fn final_character_replacement_is_inline() {
        let ranges = diff("abc", "abX");
        assert_eq!(
            ranges,
            vec![
                range(DiffRangeType::Delete, DiffHighlightType::Word, (0, 2), (0, 3)),
                range(DiffRangeType::Add, DiffHighlightType::Word, (0, 2), (0, 3)),
            ]
        );
    }

    #[test]
    fn inline_columns_are_zero_based_and_stop_exclusive() {
        let ranges = diff("foo bar\nnext\n", "foo baz\nnext\n");
        assert_eq!(
            ranges,
            vec![
                range(DiffRangeType::Delete, DiffHighlightType::Word, (0, 6), (0, 7)),
                range(DiffRangeType::Add, DiffHighlightType::Word, (0, 6), (0, 7)),
            ]
        );
    }

    #[test]
    fn inserted_line_after_newline_is_a_line_range() {
        let ranges = diff("foo\n", "foo\nbar\n");
        assert_eq!(
            ranges,
            vec![range(DiffRangeType::Add, DiffHighlightType::Line, (1, 0), (2, 0))]
        );
    }

    #[test]
    fn insertion_starting_with_newline_snaps_to_next_row() {
        let ranges = diff("foo", "foo\nbar");
        assert_eq!(
            ranges,
            vec![range(DiffRangeType::Add, DiffHighlightType::Line, (1, 0), (2, 0))]
        );
    }

    #[test]
    fn word_ranges_stay_on_one_row() {
        let pairs = [
            ("let value = 1;\nreturn value;\n", "let total = 1;\nreturn total;\n"),
            ("alpha beta gamma", "alpha delta gamma"),
            ("one\ntwo\nthree\nfour", "one\n2\nthree\n4"),
        ];
        for (before, after) in pairs {
            for range in diff(before, after) {
                if range.highlight_type == DiffHighlightType::Word {
                    assert_eq!(range.start.row, range.stop.row, "{range:?}");
                }
            }
        }
    }

    #[test]
    fn line_ranges_start_at_column_zero() {
        let pairs = [
            ("abc\nde\nf", "ab\nf"),
            ("first\nsecond\nthird\n", "first\nthird\n"),
            ("x", "x\ny\nz\n"),
            ("a\nb\nc", "a\nB\nC\nc"),
        ];
        for (before, after) in pairs {
            for range in diff(before, after) {
                assert!(range.start <= range.stop, "{range:?}");
                if range.highlight_type == DiffHighlightType::Line {
                    assert_eq!(range.start.column, 0, "{range:?}");
                }
            }
        }
    }

    #[test]
    fn deletions_use_before_coordinates() {
        let ranges = diff("keep\ndrop me\nkeep\n", "keep\nkeep\n");
        let deletes: Vec<_> = ranges.iter().filter(|range| range.is_delete()).collect();
        assert!(!deletes.is_empty());
        assert!(ranges.iter().all(|range| !range.is_add()));
        assert!(deletes.iter().all(|range| range.start.row >= 1));
    }
}

use super::DiffPoint;

/// Translates a character offset into a row/column pair.
///
/// Offsets past the end of `source` stop at the last position.
pub fn cursor_to_row_and_column(source: &str, cursor: usize) -> DiffPoint {
    let mut row = 0;
    let mut column = 0;
    for ch in source.chars().take(cursor) {
        column += 1;
        if ch == '\n' {
            row += 1;
            column = 0;
        }
    }

    DiffPoint::new(row, column)
}

/// Translates a row/column pair back into a character offset.
///
/// A column past the end of its row clamps to the row's newline, and a row
/// past the end of the document clamps to the document length.
pub fn row_and_column_to_cursor(source: &str, point: DiffPoint) -> usize {
    let mut row = 0;
    let mut column = 0;
    let mut length = 0;
    for (offset, ch) in source.chars().enumerate() {
        if row == point.row && (column == point.column || ch == '\n') {
            return offset;
        }

        if ch == '\n' {
            row += 1;
            column = 0;
        } else {
            column += 1;
        }
        length = offset + 1;
    }

    length
}

/// Same scan as [`cursor_to_row_and_column`] over an already split buffer.
pub(super) fn point_at(source: &[char], cursor: usize) -> DiffPoint {
    let mut point = DiffPoint::default();
    for ch in source.iter().take(cursor) {
        point.column += 1;
        if *ch == '\n' {
            point = point.next_row();
        }
    }

    point
}

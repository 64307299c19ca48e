//! Comma-delimited row format used by the snapshot file.
//!
//! Fields containing the delimiter, a quote or a line break are wrapped in
//! double quotes with inner quotes doubled. Unquoted rows read unchanged.
use std::io::{self, Write};
use std::mem::take;

pub const DELIMITER: char = ',';

fn needs_quotes(field: &str) -> bool {
    field.contains(DELIMITER) || field.contains('"') || field.contains('\n') || field.contains('\r')
}

pub fn write_row<W: Write>(mut w: W, row: &[&str]) -> io::Result<()> {
    for (i, cell) in row.iter().enumerate() {
        if i > 0 {
            write!(w, "{DELIMITER}")?;
        }
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            write!(w, "{cell}")?;
        }
    }
    writeln!(w)
}

/// A decoded row together with the 1-based line it started on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub line: usize,
    pub fields: Vec<String>,
}

/// Split text into rows of `width` fields. Blank lines are dropped and CRLF
/// is accepted.
///
/// A quoted field may span lines. When such a row never closes its quote or
/// comes out with the wrong number of fields, the opening quote was a stray
/// one: that row is re-read as a single line so the rows after it survive.
pub fn parse_rows(text: &str, width: usize) -> Vec<Row> {
    let mut rows = Vec::new();
    let mut rest = text;
    let mut line = 1;

    while !rest.is_empty() {
        let mut record = read_record(rest, true);
        if record.spanned && (!record.closed || record.fields.len() != width) {
            record = read_record(rest, false);
        }
        if !(record.fields.len() == 1 && record.fields[0].is_empty()) {
            rows.push(Row {
                line,
                fields: record.fields,
            });
        }
        line += record.newlines;
        rest = &rest[record.end..];
    }
    rows
}

struct Record {
    fields: Vec<String>,
    /// Byte offset just past the row terminator.
    end: usize,
    /// Line breaks consumed, terminator included.
    newlines: usize,
    /// A quoted field contained a line break.
    spanned: bool,
    /// Every opened quote was closed.
    closed: bool,
}

/// Read one row from the start of `text`. With `multiline` unset a line break
/// always ends the row, closing any open quote.
fn read_record(text: &str, multiline: bool) -> Record {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut spanned = false;
    let mut newlines = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, ch)) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if matches!(chars.peek(), Some((_, '"'))) {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' if field.is_empty() => in_quotes = true,
            c if c == DELIMITER && !in_quotes => fields.push(take(&mut field)),
            '\n' | '\r' if !in_quotes || !multiline => {
                let end = match chars.peek() {
                    Some(&(j, '\n')) if ch == '\r' => j + 1,
                    _ => i + 1,
                };
                fields.push(field);
                return Record {
                    fields,
                    end,
                    newlines: newlines + 1,
                    spanned,
                    closed: true,
                };
            }
            c => {
                let crlf = c == '\r' && matches!(chars.peek(), Some((_, '\n')));
                if (c == '\n' || c == '\r') && !crlf {
                    newlines += 1;
                    spanned = true;
                }
                field.push(c);
            }
        }
    }

    fields.push(field);
    Record {
        fields,
        end: text.len(),
        newlines,
        spanned,
        closed: !in_quotes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn written(row: &[&str]) -> String {
        let mut buf = Vec::new();
        write_row(&mut buf, row).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn plain_fields_are_not_quoted() {
        assert_eq!(
            written(&["a1b2c3", "/item/bici-1", "360", "2024-05-01T10:00:00Z"]),
            "a1b2c3,/item/bici-1,360,2024-05-01T10:00:00Z\n"
        );
    }

    #[test]
    fn delimiter_and_quotes_are_escaped() {
        assert_eq!(
            written(&["h", "/item?a=1,2", "say \"hi\"", "t"]),
            "h,\"/item?a=1,2\",\"say \"\"hi\"\"\",t\n"
        );
    }

    #[test]
    fn parses_quoted_and_plain_rows() {
        let text = "h,\"/item?a=1,2\",5,t\r\n\nh2,\"multi\nline\",6,t2\n";
        let rows = parse_rows(text, 4);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line, 1);
        assert_eq!(rows[0].fields, vec!["h", "/item?a=1,2", "5", "t"]);
        assert_eq!(rows[1].line, 3);
        assert_eq!(rows[1].fields, vec!["h2", "multi\nline", "6", "t2"]);
    }

    #[test]
    fn last_row_without_newline() {
        let rows = parse_rows("a,b,c,d", 4);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fields.len(), 4);
    }

    #[test]
    fn quote_inside_unquoted_field_is_literal() {
        let rows = parse_rows("a,b\"c,1,t\n", 4);
        assert_eq!(rows[0].fields[1], "b\"c");
    }

    #[test]
    fn stray_quote_is_confined_to_its_line() {
        let text = "h,\"a,1,2024-05-01T10:00:00Z\nh,b,2,2024-05-01T10:00:00Z\nh,c,3,2024-05-01T10:00:00Z\n";
        let rows = parse_rows(text, 4);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].fields, vec!["h", "a,1,2024-05-01T10:00:00Z"]);
        assert_eq!(rows[1].line, 2);
        assert_eq!(rows[1].fields, vec!["h", "b", "2", "2024-05-01T10:00:00Z"]);
        assert_eq!(rows[2].fields[1], "c");
    }

    #[test]
    fn stray_quote_does_not_pair_with_later_quoted_field() {
        let text = "h,\"a,1,t\nh,b,2,t\nh,\"c,d\",3,t\n";
        let rows = parse_rows(text, 4);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].fields.len(), 2);
        assert_eq!(rows[1].fields, vec!["h", "b", "2", "t"]);
        assert_eq!(rows[2].line, 3);
        assert_eq!(rows[2].fields, vec!["h", "c,d", "3", "t"]);
    }
}

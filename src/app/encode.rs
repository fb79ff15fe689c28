use crate::common::error::EncodeError;
use crate::types::TableRecord;
use csv::{QuoteStyle, Terminator, Writer, WriterBuilder};
use std::io::Write;

const BOM: char = '\u{feff}';

/// Serializes a record as CSV: header line first, then the rows in order.
/// Fields holding the delimiter, a quote or a line break are quoted, as is a
/// leading header that starts with a byte-order mark.
pub struct Encoder;

impl Encoder {
    pub fn encode(record: &TableRecord) -> Result<Vec<u8>, EncodeError> {
        let width = record.headers.len();
        if let Some((row, found)) = record
            .rows
            .iter()
            .map(Vec::len)
            .enumerate()
            .find(|&(_, len)| len != width)
        {
            return Err(EncodeError::RowWidth {
                row,
                expected: width,
                found,
            });
        }

        let mut out = Vec::with_capacity(estimate_size(record));
        let header_quoting = match record.headers.first() {
            Some(first) if first.starts_with(BOM) => QuoteStyle::Always,
            _ => QuoteStyle::Necessary,
        };
        write_lines(&mut out, header_quoting, std::iter::once(&record.headers))?;
        write_lines(&mut out, QuoteStyle::Necessary, record.rows.iter())?;
        Ok(out)
    }
}

fn write_lines<'a, W: Write>(
    out: W,
    quoting: QuoteStyle,
    lines: impl Iterator<Item = &'a Vec<String>>,
) -> Result<(), EncodeError> {
    let mut writer: Writer<W> = WriterBuilder::new()
        .quote_style(quoting)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(out);
    for line in lines {
        writer.write_record(line)?;
    }
    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

fn estimate_size(record: &TableRecord) -> usize {
    let cells: usize = std::iter::once(&record.headers)
        .chain(record.rows.iter())
        .flat_map(|row| row.iter().map(|c| c.len() + 1))
        .sum();
    cells + 16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> (Vec<String>, Vec<Vec<String>>) {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(bytes);
        let headers = reader.headers().unwrap().iter().map(String::from).collect();
        let rows = reader
            .records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect();
        (headers, rows)
    }

    fn record(headers: &[&str], rows: &[&[&str]]) -> TableRecord {
        TableRecord {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn test_plain_table_layout() {
        let rec = record(&["Team", "W", "L"], &[&["Boston Celtics", "64", "18"], &["Denver Nuggets", "57", "25"]]);
        let out = String::from_utf8(Encoder::encode(&rec).unwrap()).unwrap();
        assert_eq!(out, "Team,W,L\nBoston Celtics,64,18\nDenver Nuggets,57,25\n");
    }

    #[test]
    fn test_special_characters_are_quoted() {
        let rec = record(&["Name", "Note"], &[&["Smith, J.", "said \"hi\""], &["multi\nline", "plain"]]);
        let out = String::from_utf8(Encoder::encode(&rec).unwrap()).unwrap();
        assert_eq!(
            out,
            "Name,Note\n\"Smith, J.\",\"said \"\"hi\"\"\"\n\"multi\nline\",plain\n"
        );
    }

    #[test]
    fn test_round_trip_preserves_headers_and_rows() {
        let rec = record(
            &["Team", "W", "W", "Win %"],
            &[
                &["LA Clippers", "51", "31", ".622"],
                &["A \"quoted\", team", "1", "2", "\r\n"],
                &["", " padded ", "x", "y"],
            ],
        );
        let (headers, rows) = decode(&Encoder::encode(&rec).unwrap());
        assert_eq!(headers, rec.headers);
        assert_eq!(rows, rec.rows);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let rec = record(&["a"], &[&["1"], &["2"]]);
        assert_eq!(Encoder::encode(&rec).unwrap(), Encoder::encode(&rec).unwrap());
    }

    #[test]
    fn test_leading_byte_order_mark_survives_decoding() {
        let rec = record(&["\u{feff}Team", "W"], &[&["Boston Celtics", "64"]]);
        let bytes = Encoder::encode(&rec).unwrap();
        assert!(bytes.starts_with("\"\u{feff}Team\",\"W\"\n".as_bytes()));

        let (headers, rows) = decode(&bytes);
        assert_eq!(headers, rec.headers);
        assert_eq!(rows, rec.rows);
    }

    #[test]
    fn test_ragged_row_is_rejected() {
        let rec = record(&["Team", "W", "L"], &[&["Boston Celtics", "64", "18"], &["Denver Nuggets", "57"]]);
        let err = Encoder::encode(&rec).unwrap_err();
        assert!(matches!(
            err,
            EncodeError::RowWidth { row: 1, expected: 3, found: 2 }
        ));
    }
}

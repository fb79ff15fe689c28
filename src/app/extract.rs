use crate::common::error::ExtractionError;
use crate::metrics::StageMetrics;
use crate::types::{RenderedDocument, TableRecord};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument, warn};

/// Pulls the single target table out of a rendered document.
#[derive(Debug, Clone)]
pub struct Extractor {
    table_css: String,
    table: Selector,
    header_cell: Selector,
    row: Selector,
    data_cell: Selector,
}

impl Extractor {
    /// Targets `<table class="...">` carrying the given class.
    pub fn for_class(class: &str) -> Result<Self, ExtractionError> {
        Self::new(&table_selector_for_class(class))
    }

    pub fn new(table_css: &str) -> Result<Self, ExtractionError> {
        Ok(Self {
            table_css: table_css.to_string(),
            table: parse_selector(table_css)?,
            header_cell: parse_selector("th")?,
            row: parse_selector("tr")?,
            data_cell: parse_selector("td")?,
        })
    }

    /// Headers come from every `th` in the table; rows from every `tr` after
    /// the first, with cells read from `td`. Empty rows are skipped and rows
    /// whose width differs from the header count are dropped.
    #[instrument(skip_all, fields(selector = %self.table_css, doc_bytes = doc.len()))]
    pub fn extract(&self, doc: RenderedDocument) -> Result<TableRecord, ExtractionError> {
        let html = Html::parse_document(doc.as_str());

        let mut matches = html.select(&self.table);
        let table = match (matches.next(), matches.count()) {
            (None, _) => {
                return Err(ExtractionError::TableNotFound {
                    selector: self.table_css.clone(),
                })
            }
            (Some(table), 0) => table,
            (Some(_), others) => {
                return Err(ExtractionError::AmbiguousTable {
                    selector: self.table_css.clone(),
                    count: others + 1,
                })
            }
        };

        let headers: Vec<String> = table.select(&self.header_cell).map(cell_text).collect();
        if headers.is_empty() {
            return Err(ExtractionError::NoHeaders);
        }
        debug!("Found {} header(s): {:?}", headers.len(), headers);

        let mut rows = Vec::new();
        let mut dropped = 0usize;
        for (index, row) in table.select(&self.row).enumerate().skip(1) {
            let cells: Vec<String> = row.select(&self.data_cell).map(cell_text).collect();
            if cells.is_empty() {
                continue;
            }
            if cells.len() != headers.len() {
                warn!(
                    "Dropping row {}: {} cell(s), expected {}",
                    index,
                    cells.len(),
                    headers.len()
                );
                dropped += 1;
                continue;
            }
            rows.push(cells);
        }

        if dropped > 0 {
            StageMetrics::record_rows_dropped(dropped);
        }
        if rows.is_empty() {
            return Err(ExtractionError::NoRows);
        }

        info!(
            "Extracted {} row(s) x {} column(s) ({} dropped)",
            rows.len(),
            headers.len(),
            dropped
        );
        Ok(TableRecord { headers, rows })
    }
}

pub fn table_selector_for_class(class: &str) -> String {
    format!("table.{}", class.trim())
}

fn parse_selector(css: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(css).map_err(|e| ExtractionError::Selector {
        selector: css.to_string(),
        message: e.to_string(),
    })
}

/// Text nodes trimmed individually and joined, so markup like
/// `<td> 12 <span>W</span></td>` reads as `12W`.
fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().map(str::trim).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(body: &str) -> RenderedDocument {
        RenderedDocument::new(format!("<html><body>{body}</body></html>"))
    }

    fn extractor() -> Extractor {
        Extractor::for_class("Crom_table__p1iZz").unwrap()
    }

    #[test]
    fn test_extracts_headers_and_rows_in_order() {
        let markup = doc(r#"
            <table class="Crom_table__p1iZz">
              <thead><tr><th> Team </th><th>W</th><th>L</th></tr></thead>
              <tbody>
                <tr><td>Boston Celtics</td><td>64</td><td>18</td></tr>
                <tr><td>Denver Nuggets</td><td>57</td><td>25</td></tr>
                <tr><td>Atlanta Hawks</td><td>36</td><td>46</td></tr>
              </tbody>
            </table>"#);

        let record = extractor().extract(markup).unwrap();

        assert_eq!(record.headers, vec!["Team", "W", "L"]);
        let teams: Vec<&str> = record.rows.iter().map(|r| r[0].as_str()).collect();
        assert_eq!(teams, vec!["Boston Celtics", "Denver Nuggets", "Atlanta Hawks"]);
    }

    #[test]
    fn test_duplicate_headers_are_kept() {
        let markup = doc(r#"
            <table class="Crom_table__p1iZz">
              <tr><th>GP</th><th>W</th><th>W</th></tr>
              <tr><td>82</td><td>1</td><td>2</td></tr>
            </table>"#);

        let record = extractor().extract(markup).unwrap();
        assert_eq!(record.headers, vec!["GP", "W", "W"]);
    }

    #[test]
    fn test_mismatched_and_empty_rows_are_dropped() {
        let markup = doc(r#"
            <table class="Crom_table__p1iZz">
              <tr><th>Team</th><th>W</th><th>L</th></tr>
              <tr><td>Short</td><td>1</td></tr>
              <tr></tr>
              <tr><td>Kept</td><td>2</td><td>3</td></tr>
              <tr><td>Long</td><td>1</td><td>2</td><td>3</td></tr>
            </table>"#);

        let record = extractor().extract(markup).unwrap();
        assert_eq!(record.rows, vec![vec!["Kept", "2", "3"]]);
    }

    #[test]
    fn test_missing_table_fails() {
        let err = extractor()
            .extract(doc(r#"<table class="other"><tr><th>x</th></tr></table>"#))
            .unwrap_err();
        assert_eq!(
            err,
            ExtractionError::TableNotFound {
                selector: "table.Crom_table__p1iZz".to_string()
            }
        );
    }

    #[test]
    fn test_two_matching_tables_are_ambiguous() {
        let table = r#"<table class="Crom_table__p1iZz"><tr><th>A</th></tr><tr><td>1</td></tr></table>"#;
        let err = extractor()
            .extract(doc(&format!("{table}{table}")))
            .unwrap_err();
        assert!(matches!(err, ExtractionError::AmbiguousTable { count: 2, .. }));
    }

    #[test]
    fn test_table_without_headers_fails() {
        let err = extractor()
            .extract(doc(r#"<table class="Crom_table__p1iZz"><tr><td>1</td></tr><tr><td>2</td></tr></table>"#))
            .unwrap_err();
        assert_eq!(err, ExtractionError::NoHeaders);
    }

    #[test]
    fn test_table_without_data_rows_fails() {
        let err = extractor()
            .extract(doc(r#"<table class="Crom_table__p1iZz"><tr><th>Team</th></tr></table>"#))
            .unwrap_err();
        assert_eq!(err, ExtractionError::NoRows);
    }

    #[test]
    fn test_cell_text_joins_trimmed_nodes() {
        let markup = doc(r#"
            <table class="Crom_table__p1iZz">
              <tr><th>Team</th><th>Streak</th></tr>
              <tr><td><a href="/team/1">  Boston
                 Celtics </a></td><td> 12 <span>W</span></td></tr>
            </table>"#);

        let record = extractor().extract(markup).unwrap();
        assert_eq!(record.rows[0][1], "12W");
        assert!(record.rows[0][0].starts_with("Boston"));
    }

    #[test]
    fn test_invalid_class_is_rejected() {
        assert!(matches!(
            Extractor::for_class("bad["),
            Err(ExtractionError::Selector { .. })
        ));
    }
}

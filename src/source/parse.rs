//! HTML extraction for the finance site's options pages.
//!
//! The listing page carries one `<option>` per expiration in a drop-down;
//! an expiration page carries the calls table first and the puts table second.

use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;

use crate::encoding::{RawChainTables, RawTable};
use crate::error::ScrapeError;

struct Selectors {
    option: Selector,
    table: Selector,
    row: Selector,
    header_cell: Selector,
    data_cell: Selector,
}

#[allow(clippy::expect_used)]
fn selectors() -> &'static Selectors {
    static SELECTORS: OnceLock<Selectors> = OnceLock::new();
    SELECTORS.get_or_init(|| Selectors {
        option: Selector::parse("option").expect("option selector is valid"),
        table: Selector::parse("table").expect("table selector is valid"),
        row: Selector::parse("tr").expect("row selector is valid"),
        header_cell: Selector::parse("th").expect("header selector is valid"),
        data_cell: Selector::parse("td").expect("cell selector is valid"),
    })
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

/// Labels of every expiration `<option>`, in page order
pub fn expiration_labels(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&selectors().option)
        .map(cell_text)
        .filter(|label| !label.is_empty())
        .collect()
}

/// Header labels and data rows of one `<table>`
fn table(element: ElementRef<'_>) -> Result<RawTable, ScrapeError> {
    let s = selectors();
    let mut columns = Vec::new();
    let mut rows = Vec::new();

    for row in element.select(&s.row) {
        let headers: Vec<String> = row.select(&s.header_cell).map(cell_text).collect();
        if columns.is_empty() && !headers.is_empty() {
            columns = headers;
            continue;
        }
        let cells: Vec<String> = row.select(&s.data_cell).map(cell_text).collect();
        if !cells.is_empty() {
            rows.push(cells);
        }
    }

    if columns.is_empty() {
        return Err(ScrapeError::MissingHeader);
    }
    Ok(RawTable { columns, rows })
}

/// Calls and puts tables of an expiration page
pub fn chain_tables(html: &str) -> Result<RawChainTables, ScrapeError> {
    let document = Html::parse_document(html);
    let mut tables = document.select(&selectors().table);

    let calls = tables.next().map(table).transpose()?;
    let puts = tables.next().map(table).transpose()?;
    Ok(RawChainTables { calls, puts })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body>
          <select>
            <option value="1589500800">May 15, 2020</option>
            <option value="1590105600">May 22, 2020</option>
            <option value=""></option>
          </select>
        </body></html>"#;

    fn chain_page(tables: &[&str]) -> String {
        format!("<html><body>{}</body></html>", tables.join("\n"))
    }

    const CALLS: &str = r#"
        <table class="calls">
          <thead><tr><th>Contract Name</th><th>Last Trade Date</th><th>Strike</th></tr></thead>
          <tbody>
            <tr><td>AAPL200515C00250000</td><td>2020-05-01 3:59PM EDT</td><td>250.00</td></tr>
            <tr><td>AAPL200515C00255000</td><td>2020-05-01 3:58PM EDT</td><td>255.00</td></tr>
          </tbody>
        </table>"#;

    const PUTS: &str = r#"
        <table class="puts">
          <tr><th>Contract Name</th><th>Last Trade Date</th><th>Strike</th></tr>
          <tr><td>AAPL200515P00250000</td><td>2020-05-01 3:57PM EDT</td><td>1,250.00</td></tr>
        </table>"#;

    #[test]
    fn test_listing_yields_non_empty_labels_in_order() {
        assert_eq!(
            expiration_labels(LISTING),
            vec!["May 15, 2020".to_string(), "May 22, 2020".to_string()]
        );
        assert!(expiration_labels("<html></html>").is_empty());
    }

    #[test]
    fn test_chain_page_with_both_tables() {
        let tables = chain_tables(&chain_page(&[CALLS, PUTS])).unwrap();

        let calls = tables.calls.unwrap();
        assert_eq!(calls.columns, vec!["Contract Name", "Last Trade Date", "Strike"]);
        assert_eq!(calls.rows.len(), 2);
        assert_eq!(calls.rows[1][2], "255.00");

        let puts = tables.puts.unwrap();
        assert_eq!(puts.rows, vec![vec![
            "AAPL200515P00250000".to_string(),
            "2020-05-01 3:57PM EDT".to_string(),
            "1,250.00".to_string(),
        ]]);
    }

    #[test]
    fn test_chain_page_with_calls_only() {
        let tables = chain_tables(&chain_page(&[CALLS])).unwrap();
        assert!(tables.calls.is_some());
        assert!(tables.puts.is_none());
    }

    #[test]
    fn test_chain_page_without_tables_is_empty() {
        let tables = chain_tables(&chain_page(&[])).unwrap();
        assert!(tables.is_empty());
    }

    #[test]
    fn test_headerless_table_is_an_error() {
        let page = chain_page(&["<table><tr><td>1</td></tr></table>"]);
        assert!(matches!(chain_tables(&page), Err(ScrapeError::MissingHeader)));
    }
}

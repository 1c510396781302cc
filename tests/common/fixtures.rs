//! Page fixtures shaped like the finance site's options pages

/// Listing page with one drop-down option per label
pub fn listing_page(labels: &[&str]) -> String {
    let options: String = labels
        .iter()
        .map(|label| format!("<option value=\"x\">{}</option>", label))
        .collect();
    format!(
        "<html><body><div><select>{}</select></div><p>Options</p></body></html>",
        options
    )
}

const HEADER: &str = "<thead><tr><th>Contract Name</th><th>Last Trade Date</th>\
    <th>Strike</th><th>Last Price</th><th>% Change</th><th>Volume</th></tr></thead>";

/// Table body rows: (contract, last trade, strike, last price, change, volume)
pub type Row<'a> = (&'a str, &'a str, &'a str, &'a str, &'a str, &'a str);

fn table(rows: &[Row<'_>]) -> String {
    let body: String = rows
        .iter()
        .map(|(name, date, strike, price, change, volume)| {
            format!(
                "<tr><td><a href=\"#\">{}</a></td><td>{}</td><td>{}</td>\
                 <td>{}</td><td>{}</td><td>{}</td></tr>",
                name, date, strike, price, change, volume
            )
        })
        .collect();
    format!("<table>{}<tbody>{}</tbody></table>", HEADER, body)
}

/// Expiration page with a calls table and, optionally, a puts table
pub fn chain_page(calls: &[Row<'_>], puts: Option<&[Row<'_>]>) -> String {
    let mut html = String::from("<html><body><section>");
    html.push_str(&table(calls));
    if let Some(puts) = puts {
        html.push_str(&table(puts));
    }
    html.push_str("</section></body></html>");
    html
}

use churn_client::{ApiError, Resource};
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    print!("{}", format_table(headers, &rows));
}

pub fn format_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    // Calculate column widths
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    let mut out = String::new();
    let header_row: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
        .collect();
    out.push_str(header_row.join("  ").trim_end());
    out.push('\n');

    let sep: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    out.push_str(&sep.join("  "));
    out.push('\n');

    for row in rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:width$}", cell, width = w)
            })
            .collect();
        out.push_str(cells.join("  ").trim_end());
        out.push('\n');
    }
    out
}

/// Render one dashboard panel in its loading, error or populated state.
///
/// A value fetched earlier is still shown when the latest refresh failed,
/// followed by the error.
pub fn render_panel<T>(
    title: &str,
    loading: bool,
    resource: &Resource<T>,
    render: impl FnOnce(&T) -> String,
) -> String {
    let mut out = format!("== {title} ==\n");
    match (&resource.value, &resource.error) {
        (None, None) if loading => out.push_str("Loading...\n"),
        (None, None) => out.push_str("No data.\n"),
        (None, Some(e)) => out.push_str(&error_line(e)),
        (Some(v), err) => {
            out.push_str(&render(v));
            if let Some(e) = err {
                out.push_str("(showing cached data) ");
                out.push_str(&error_line(e));
            }
        }
    }
    out
}

fn error_line(e: &ApiError) -> String {
    let hint = match e {
        ApiError::Authentication(_) => " (run: churn login)",
        ApiError::Network(_) => " (is the API reachable?)",
        _ => "",
    };
    format!("error: {e}{hint}\n")
}

pub fn percent(ratio: f64) -> String {
    format!("{:.0}%", ratio * 100.0)
}

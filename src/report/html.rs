//! Static HTML report with a client-side chart
//!
//! The page embeds pre-aggregated series as JSON and renders them with
//! Chart.js loaded from a CDN. No data is fetched at view time.

use crate::error::Result;
use crate::report::Pivot;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs;
use std::path::Path;

const CHART_JS_CDN: &str = "https://cdn.jsdelivr.net/npm/chart.js@4";

const PALETTE: &[&str] = &[
    "#1e40af", "#16a34a", "#dc2626", "#ca8a04", "#7c3aed", "#0284c7", "#ea580c", "#64748b",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChartSeries {
    pub label: String,
    pub color: String,
    pub values: Vec<u64>,
}

#[derive(Debug, Clone)]
pub struct ChartPage {
    pub title: String,
    pub subtitle: String,
    pub tenant_name: String,
    pub generated_at: DateTime<Local>,
    pub kind: ChartKind,
    pub stacked: bool,
    pub labels: Vec<String>,
    pub series: Vec<ChartSeries>,
    /// Headline numbers shown above the chart
    pub summary: Vec<(String, String)>,
    /// Optional count table shown below the chart
    pub table: Option<Pivot>,
}

impl ChartPage {
    /// Stacked bar chart with one bar per pivot row and one series per column
    pub fn from_pivot(title: &str, tenant_name: &str, pivot: &Pivot) -> Self {
        let series = pivot
            .columns
            .iter()
            .enumerate()
            .map(|(i, column)| ChartSeries {
                label: column.clone(),
                color: palette_color(i).to_string(),
                values: pivot.rows.iter().map(|(_, values)| values[i]).collect(),
            })
            .collect();

        Self {
            title: title.to_string(),
            subtitle: format!("By {}", pivot.row_label),
            tenant_name: tenant_name.to_string(),
            generated_at: Local::now(),
            kind: ChartKind::Bar,
            stacked: true,
            labels: pivot.rows.iter().map(|(label, _)| label.clone()).collect(),
            series,
            summary: vec![("Total".to_string(), pivot.grand_total().to_string())],
            table: Some(pivot.clone()),
        }
    }
}

pub fn palette_color(index: usize) -> &'static str {
    PALETTE[index % PALETTE.len()]
}

/// Escape text for HTML element content and attribute values
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// JSON safe to place inside a `<script>` element
fn script_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| "null".to_string())
        .replace("</", "<\\/")
}

/// Generate the complete HTML page
pub fn render_chart_page(page: &ChartPage) -> String {
    let header = generate_header(page);
    let summary = generate_summary_cards(&page.summary);
    let chart = generate_chart_section(page);
    let table = page.table.as_ref().map(generate_pivot_table).unwrap_or_default();
    let footer = generate_footer(page);

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title} - {tenant}</title>
    <script src="{cdn}"></script>
    <style>
{css}
    </style>
</head>
<body>
    <div class="container">
{header}
{summary}
{chart}
{table}
{footer}
    </div>
</body>
</html>"#,
        title = escape_html(&page.title),
        tenant = escape_html(&page.tenant_name),
        cdn = CHART_JS_CDN,
        css = get_css_styles(),
        header = header,
        summary = summary,
        chart = chart,
        table = table,
        footer = footer,
    )
}

/// Render `page` and write it to `path`, creating parent directories
pub fn write_chart_page(path: &Path, page: &ChartPage) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    fs::write(path, render_chart_page(page))?;
    tracing::debug!(path = %path.display(), "Wrote HTML report");
    Ok(())
}

fn get_css_styles() -> &'static str {
    r#"
        :root {
            --primary: #1e40af;
            --secondary: #64748b;
            --light: #f8fafc;
            --dark: #1e293b;
            --border: #e2e8f0;
        }

        * { margin: 0; padding: 0; box-sizing: border-box; }

        body {
            font-family: 'Segoe UI', system-ui, -apple-system, sans-serif;
            line-height: 1.6;
            color: var(--dark);
            background: var(--light);
        }

        .container {
            max-width: 1200px;
            margin: 0 auto;
            padding: 2rem;
            background: white;
            min-height: 100vh;
        }

        .header {
            text-align: center;
            padding: 2rem 0;
            border-bottom: 3px solid var(--primary);
            margin-bottom: 2rem;
        }

        .header h1 { color: var(--primary); font-size: 2rem; font-weight: 600; }
        .header .subtitle { color: var(--secondary); font-size: 1.1rem; }

        .metrics-grid {
            display: grid;
            grid-template-columns: repeat(auto-fit, minmax(180px, 1fr));
            gap: 1rem;
            margin-bottom: 2rem;
        }

        .metric-card {
            background: var(--light);
            border: 1px solid var(--border);
            border-radius: 8px;
            padding: 1.25rem;
            text-align: center;
        }

        .metric-value { font-size: 1.75rem; font-weight: 700; color: var(--primary); }
        .metric-label { font-size: 0.85rem; color: var(--secondary); text-transform: uppercase; }

        .section { margin-bottom: 2rem; }

        .section-title {
            font-size: 1.25rem;
            font-weight: 600;
            color: var(--primary);
            margin-bottom: 1rem;
            padding-bottom: 0.5rem;
            border-bottom: 2px solid var(--border);
        }

        .chart-container { position: relative; height: 420px; }

        .pivot-table { width: 100%; border-collapse: collapse; }
        .pivot-table th, .pivot-table td {
            padding: 0.5rem 0.75rem;
            text-align: right;
            border-bottom: 1px solid var(--border);
        }
        .pivot-table th:first-child, .pivot-table td:first-child { text-align: left; }
        .pivot-table th { background: var(--light); color: var(--secondary); font-size: 0.85rem; }
        .pivot-table tr.total td { font-weight: 700; }

        .footer {
            text-align: center;
            padding: 2rem 0;
            margin-top: 2rem;
            border-top: 1px solid var(--border);
            color: var(--secondary);
            font-size: 0.85rem;
        }

        @media print {
            .container { padding: 0; max-width: none; }
            .metric-card { break-inside: avoid; }
        }
    "#
}

fn generate_header(page: &ChartPage) -> String {
    format!(
        r#"        <header class="header">
            <h1>{title}</h1>
            <p class="subtitle">{subtitle}</p>
        </header>"#,
        title = escape_html(&page.title),
        subtitle = escape_html(&page.subtitle),
    )
}

fn generate_summary_cards(summary: &[(String, String)]) -> String {
    if summary.is_empty() {
        return String::new();
    }

    let cards = summary
        .iter()
        .map(|(label, value)| {
            format!(
                r#"            <div class="metric-card">
                <div class="metric-value">{value}</div>
                <div class="metric-label">{label}</div>
            </div>"#,
                value = escape_html(value),
                label = escape_html(label),
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"        <section class="metrics-grid">
{cards}
        </section>"#
    )
}

fn generate_chart_section(page: &ChartPage) -> String {
    let datasets: Vec<serde_json::Value> = page
        .series
        .iter()
        .map(|s| {
            serde_json::json!({
                "label": s.label,
                "data": s.values,
                "backgroundColor": s.color,
                "borderColor": s.color,
                "fill": false,
                "tension": 0.2,
            })
        })
        .collect();

    let config = serde_json::json!({
        "type": page.kind,
        "data": {
            "labels": page.labels,
            "datasets": datasets,
        },
        "options": {
            "responsive": true,
            "maintainAspectRatio": false,
            "scales": {
                "x": {"stacked": page.stacked},
                "y": {"stacked": page.stacked, "beginAtZero": true, "ticks": {"precision": 0}},
            },
        },
    });

    format!(
        r#"        <section class="section">
            <h2 class="section-title">{subtitle}</h2>
            <div class="chart-container"><canvas id="chart"></canvas></div>
            <script>
                new Chart(document.getElementById('chart'), {config});
            </script>
        </section>"#,
        subtitle = escape_html(&page.subtitle),
        config = script_json(&config),
    )
}

fn generate_pivot_table(pivot: &Pivot) -> String {
    let head = std::iter::once(pivot.row_label.as_str())
        .chain(pivot.columns.iter().map(String::as_str))
        .chain(std::iter::once("Total"))
        .map(|h| format!("<th>{}</th>", escape_html(h)))
        .collect::<String>();

    let mut rows: Vec<String> = pivot
        .rows
        .iter()
        .map(|(label, values)| {
            let cells = values
                .iter()
                .map(|v| format!("<td>{}</td>", v))
                .collect::<String>();
            format!(
                "                    <tr><td>{}</td>{}<td>{}</td></tr>",
                escape_html(label),
                cells,
                values.iter().sum::<u64>()
            )
        })
        .collect();

    let totals = pivot
        .column_totals()
        .iter()
        .map(|v| format!("<td>{}</td>", v))
        .collect::<String>();
    rows.push(format!(
        r#"                    <tr class="total"><td>Total</td>{}<td>{}</td></tr>"#,
        totals,
        pivot.grand_total()
    ));

    format!(
        r#"        <section class="section">
            <h2 class="section-title">Summary Table</h2>
            <table class="pivot-table">
                <thead><tr>{head}</tr></thead>
                <tbody>
{rows}
                </tbody>
            </table>
        </section>"#,
        head = head,
        rows = rows.join("\n"),
    )
}

fn generate_footer(page: &ChartPage) -> String {
    format!(
        r#"        <footer class="footer">
            <p>Generated by exp365 for {tenant}</p>
            <p>{date}</p>
        </footer>"#,
        tenant = escape_html(&page.tenant_name),
        date = page.generated_at.format("%Y-%m-%d %H:%M:%S %Z"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pivot() -> Pivot {
        Pivot::from_pairs(
            "Bucket",
            &["Not started", "Completed"],
            vec![
                ("Backlog".to_string(), "Not started".to_string()),
                ("Backlog".to_string(), "Completed".to_string()),
                ("<Ops>".to_string(), "Completed".to_string()),
            ],
        )
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<b>"Tom" & 'Jerry'</b>"#),
            "&lt;b&gt;&quot;Tom&quot; &amp; &#39;Jerry&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn test_from_pivot_series() {
        let page = ChartPage::from_pivot("Planner Tasks", "Contoso", &pivot());
        assert_eq!(page.labels, vec!["<Ops>", "Backlog"]);
        assert_eq!(page.series.len(), 2);
        assert_eq!(page.series[0].label, "Not started");
        assert_eq!(page.series[0].values, vec![0, 1]);
        assert_eq!(page.series[1].values, vec![1, 1]);
        assert_eq!(page.summary[0].1, "3");
    }

    #[test]
    fn test_render_chart_page() {
        let page = ChartPage::from_pivot("Planner Tasks", "Contoso", &pivot());
        let html = render_chart_page(&page);

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains(CHART_JS_CDN));
        assert!(html.contains("<title>Planner Tasks - Contoso</title>"));
        assert!(html.contains("&lt;Ops&gt;"));
        assert!(html.contains(r#""type":"bar""#));
        assert!(html.contains(r#""data":[0,1]"#));
        assert!(html.contains(r#"<tr class="total"><td>Total</td><td>1</td><td>2</td><td>3</td></tr>"#));
    }

    #[test]
    fn test_script_json_cannot_close_script() {
        let json = script_json(&serde_json::json!({"label": "</script><script>alert(1)"}));
        assert!(!json.contains("</script>"));
    }
}

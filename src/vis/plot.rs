//! SVG rendering for bar charts and time series.

use std::collections::BTreeMap;

use chrono::{Datelike, TimeZone, Utc};

use crate::data::{Cell, Metadata, Table};
use crate::error::DataError;

pub const PERIOD_COLUMN: &str = "Period";
pub const PERIODS_KEY: &str = "periods";

const SHORT_MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

const BAR_WIDTH: f64 = 1200.0;
const BAR_HEIGHT: f64 = 26.0;
const BAR_LABEL_MARGIN: f64 = 260.0;
const BAR_TOP: f64 = 70.0;

const SERIES_WIDTH: f64 = 1500.0;
const SERIES_HEIGHT: f64 = 800.0;
const SERIES_MARGIN: f64 = 80.0;

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Bar value annotation: floats to two decimals, whole numbers as-is.
pub fn format_annotation(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{:.2}", value)
    }
}

fn svg_open(width: f64, height: f64) -> String {
    format!(
        concat!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" ",
            "viewBox=\"0 0 {w} {h}\" font-family=\"sans-serif\">\n",
            "<rect width=\"100%\" height=\"100%\" fill=\"white\"/>\n",
        ),
        w = width,
        h = height
    )
}

/// Horizontal bar chart of a table whose first column holds the bar labels
/// and second column the bar values. Rows are drawn top to bottom.
pub fn bar_chart(
    table: &Table,
    title: &str,
    subtext: &str,
    color: &str,
) -> Result<String, DataError> {
    if table.columns().len() < 2 {
        return Err(DataError::Malformed(format!(
            "cannot plot a bar chart of a table with {} column(s)",
            table.columns().len()
        )));
    }

    let bars: Vec<(String, f64)> = table
        .rows()
        .iter()
        .map(|row| (row[0].to_string(), row[1].as_f64().unwrap_or(0.0)))
        .collect();

    let max_value = bars.iter().map(|(_, v)| *v).fold(0.0_f64, f64::max);
    let plot_width = BAR_WIDTH - BAR_LABEL_MARGIN - 120.0;
    let scale = if max_value > 0.0 { plot_width / max_value } else { 0.0 };
    let height = BAR_TOP + bars.len() as f64 * BAR_HEIGHT + 80.0;

    let mut svg = svg_open(BAR_WIDTH, height);
    svg.push_str(&format!(
        "<text x=\"{}\" y=\"30\" font-size=\"18\" text-anchor=\"middle\">{}</text>\n",
        BAR_WIDTH / 2.0,
        escape(title)
    ));

    // grid
    for step in 0..=4 {
        let x = BAR_LABEL_MARGIN + plot_width * step as f64 / 4.0;
        let value = max_value * step as f64 / 4.0;
        svg.push_str(&format!(
            "<line x1=\"{x:.1}\" y1=\"{top}\" x2=\"{x:.1}\" y2=\"{bottom:.1}\" stroke=\"#dddddd\"/>\n",
            x = x,
            top = BAR_TOP - 10.0,
            bottom = BAR_TOP + bars.len() as f64 * BAR_HEIGHT
        ));
        svg.push_str(&format!(
            "<text x=\"{:.1}\" y=\"{}\" font-size=\"11\" text-anchor=\"middle\">{}</text>\n",
            x,
            BAR_TOP - 14.0,
            format_annotation((value * 100.0).round() / 100.0)
        ));
    }

    for (index, (label, value)) in bars.iter().enumerate() {
        let y = BAR_TOP + index as f64 * BAR_HEIGHT;
        let width = (value.max(0.0) * scale).max(0.0);
        svg.push_str(&format!(
            "<text x=\"{:.1}\" y=\"{:.1}\" font-size=\"12\" text-anchor=\"end\">{}</text>\n",
            BAR_LABEL_MARGIN - 8.0,
            y + BAR_HEIGHT * 0.65,
            escape(label)
        ));
        svg.push_str(&format!(
            "<rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" fill=\"{}\"/>\n",
            BAR_LABEL_MARGIN,
            y + 3.0,
            width,
            BAR_HEIGHT - 6.0,
            escape(color)
        ));
        svg.push_str(&format!(
            "<text x=\"{:.1}\" y=\"{:.1}\" font-size=\"12\">{}</text>\n",
            BAR_LABEL_MARGIN + width + 4.0,
            y + BAR_HEIGHT * 0.65,
            format_annotation(*value)
        ));
    }

    if !subtext.is_empty() {
        svg.push_str(&format!(
            "<text x=\"20\" y=\"{:.1}\" font-size=\"14\">{}</text>\n",
            height - 24.0,
            escape(subtext)
        ));
    }

    svg.push_str("</svg>\n");
    Ok(svg)
}

/// Read the `periods` list written by meta analyses.
pub fn periods_from_metadata(metadata: &Metadata) -> Vec<(i64, i64)> {
    metadata
        .get(PERIODS_KEY)
        .and_then(|value| value.as_array())
        .map(|periods| {
            periods
                .iter()
                .filter_map(|pair| {
                    let pair = pair.as_array()?;
                    Some((pair.first()?.as_i64()?, pair.get(1)?.as_i64()?))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn month_label(ts: i64) -> String {
    match Utc.timestamp_opt(ts, 0).single() {
        Some(dt) => format!("{} {}", SHORT_MONTHS[dt.month0() as usize], dt.year()),
        None => ts.to_string(),
    }
}

/// Line plot with one series per non-`Period` column, placed at the start
/// of each period.
pub fn time_series(
    table: &Table,
    periods: &[(i64, i64)],
    title: &str,
    colors: &BTreeMap<String, String>,
    default_color: &str,
) -> Result<String, DataError> {
    if table.columns().len() < 2 {
        return Err(DataError::Malformed(
            "cannot plot a time series, table has less than 2 columns".to_string(),
        ));
    }
    let period_idx = table
        .column_index(PERIOD_COLUMN)
        .ok_or_else(|| DataError::MissingColumn(PERIOD_COLUMN.to_string()))?;
    if periods.len() != table.row_count() {
        return Err(DataError::Malformed(format!(
            "cannot plot a time series of {} rows over {} periods",
            table.row_count(),
            periods.len()
        )));
    }

    let series: Vec<(usize, &String)> = table
        .columns()
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != period_idx)
        .collect();

    let values: Vec<f64> = table
        .rows()
        .iter()
        .flat_map(|row| series.iter().map(move |(idx, _)| row[*idx].as_f64().unwrap_or(0.0)))
        .collect();
    let min_value = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max_value = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let (min_value, max_value) = if values.is_empty() {
        (0.0, 1.0)
    } else {
        (min_value, max_value)
    };
    let padding = ((max_value - min_value) * 0.1).max(1.0);
    let (y_low, y_high) = (min_value - padding, max_value + padding);

    // three days either side of the first and last period
    let slack = 3 * 86_400;
    let x_low = periods.iter().map(|p| p.0).min().unwrap_or(0) - slack;
    let x_high = periods.iter().map(|p| p.0).max().unwrap_or(0) + slack;

    let plot_w = SERIES_WIDTH - 2.0 * SERIES_MARGIN;
    let plot_h = SERIES_HEIGHT - 2.0 * SERIES_MARGIN;
    let x_span = (x_high - x_low).max(1) as f64;
    let x_of = |ts: i64| SERIES_MARGIN + plot_w * (ts - x_low) as f64 / x_span;
    let y_of = |v: f64| SERIES_MARGIN + plot_h * (1.0 - (v - y_low) / (y_high - y_low));

    let mut svg = svg_open(SERIES_WIDTH, SERIES_HEIGHT);
    svg.push_str(&format!(
        "<text x=\"{}\" y=\"30\" font-size=\"18\" text-anchor=\"middle\">{}</text>\n",
        SERIES_WIDTH / 2.0,
        escape(title)
    ));
    svg.push_str(&format!(
        "<rect x=\"{m}\" y=\"{m}\" width=\"{w}\" height=\"{h}\" fill=\"none\" stroke=\"#999999\"/>\n",
        m = SERIES_MARGIN,
        w = plot_w,
        h = plot_h
    ));

    // month labels along the top axis
    for (start, _) in periods {
        let x = x_of(*start);
        svg.push_str(&format!(
            "<line x1=\"{x:.1}\" y1=\"{top}\" x2=\"{x:.1}\" y2=\"{bottom}\" stroke=\"#dddddd\"/>\n",
            x = x,
            top = SERIES_MARGIN,
            bottom = SERIES_MARGIN + plot_h
        ));
        svg.push_str(&format!(
            "<text x=\"{:.1}\" y=\"{}\" font-size=\"11\" text-anchor=\"middle\">{}</text>\n",
            x,
            SERIES_MARGIN - 8.0,
            month_label(*start)
        ));
    }

    for (legend_idx, (col_idx, name)) in series.iter().enumerate() {
        let color = colors
            .get(name.as_str())
            .map(String::as_str)
            .unwrap_or(default_color);
        let color = escape(color);

        let points: Vec<(f64, f64, f64)> = table
            .rows()
            .iter()
            .zip(periods)
            .map(|(row, (start, _))| {
                let value = match &row[*col_idx] {
                    Cell::Number(n) => *n,
                    _ => 0.0,
                };
                (x_of(*start), y_of(value), value)
            })
            .collect();

        let path: Vec<String> = points
            .iter()
            .map(|(x, y, _)| format!("{:.1},{:.1}", x, y))
            .collect();
        svg.push_str(&format!(
            "<polyline points=\"{}\" fill=\"none\" stroke=\"{}\" stroke-width=\"2\"/>\n",
            path.join(" "),
            color
        ));
        for (x, y, value) in &points {
            svg.push_str(&format!(
                "<circle cx=\"{:.1}\" cy=\"{:.1}\" r=\"3\" fill=\"{}\"/>\n",
                x, y, color
            ));
            svg.push_str(&format!(
                "<text x=\"{:.1}\" y=\"{:.1}\" font-size=\"8\" text-anchor=\"middle\" fill=\"{}\">{:.0}</text>\n",
                x,
                y - 6.0,
                color,
                value
            ));
        }

        let legend_y = SERIES_MARGIN + 16.0 + legend_idx as f64 * 16.0;
        svg.push_str(&format!(
            "<text x=\"{:.1}\" y=\"{:.1}\" font-size=\"12\" fill=\"{}\">{}</text>\n",
            SERIES_MARGIN + 10.0,
            legend_y,
            color,
            escape(name)
        ));
    }

    svg.push_str("</svg>\n");
    Ok(svg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hours_table() -> Table {
        Table::from_rows(
            ["Namespace", "Hours"],
            vec![
                vec!["ns<2>".into(), Cell::Number(6.0)],
                vec!["ns1".into(), Cell::Number(4.25)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_bar_chart_annotations() {
        let svg = bar_chart(&hours_table(), "Hours", "Total: 10.25", "skyblue").unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains(">6<"));
        assert!(svg.contains(">4.25<"));
        assert!(svg.contains("ns&lt;2&gt;"));
        assert!(svg.contains("Total: 10.25"));
        assert_eq!(svg.matches("fill=\"skyblue\"").count(), 2);
    }

    #[test]
    fn test_bar_chart_needs_two_columns() {
        let table = Table::new(["Namespace"]);
        assert!(bar_chart(&table, "t", "", "red").is_err());
    }

    #[test]
    fn test_time_series_lines_and_labels() {
        let table = Table::from_rows(
            ["Period", "cpuhourstotal", "gpuhourstotal"],
            vec![
                vec!["January24".into(), Cell::Number(10.0), Cell::Number(1.0)],
                vec!["February24".into(), Cell::Number(12.0), Cell::Number(2.0)],
            ],
        )
        .unwrap();
        let periods = [(1_704_067_200, 1_706_745_599), (1_706_745_600, 1_709_251_199)];
        let colors = BTreeMap::from([("cpuhourstotal".to_string(), "red".to_string())]);

        let svg = time_series(&table, &periods, "History", &colors, "blue").unwrap();
        assert_eq!(svg.matches("<polyline").count(), 2);
        assert!(svg.contains("stroke=\"red\""));
        assert!(svg.contains("stroke=\"blue\""));
        assert!(svg.contains("Jan 2024"));
        assert!(svg.contains("Feb 2024"));
    }

    #[test]
    fn test_time_series_requires_period_column() {
        let table = Table::from_rows(["a", "b"], vec![vec![1.0.into(), 2.0.into()]]).unwrap();
        let err = time_series(&table, &[(0, 1)], "t", &BTreeMap::new(), "blue").unwrap_err();
        assert_eq!(err, DataError::MissingColumn("Period".to_string()));
    }

    #[test]
    fn test_periods_from_metadata() {
        let mut metadata = Metadata::new();
        metadata.insert(PERIODS_KEY.to_string(), serde_json::json!([[0, 10], [11, 20]]));
        assert_eq!(periods_from_metadata(&metadata), vec![(0, 10), (11, 20)]);
        assert!(periods_from_metadata(&Metadata::new()).is_empty());
    }
}

//! Visualization of analysis results.
//!
//! Visual analyses pick a plotting strategy from [`VisSettings`], resolve
//! `%VAR%` placeholders in their titles and store the rendered SVG as a
//! [`Figure`].

pub mod plot;
pub mod variables;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::data::{DataRepository, Identifier, Table};
use crate::error::Result;
use variables::VisVariables;

/// A rendered plot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Figure {
    pub title: String,
    pub graph_type: String,
    pub svg: String,
}

/// Horizontal bar chart comparing the rows of a two-column table.
#[derive(Debug, Clone, PartialEq)]
pub struct BarSettings {
    pub title: String,
    pub subtext: String,
    pub color: String,
    /// Placeholder name to the analysis whose value replaces it.
    pub variables: BTreeMap<String, String>,
}

/// One line per column over the ordered periods of a meta analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesSettings {
    pub title: String,
    pub colors: BTreeMap<String, String>,
    pub default_color: String,
    pub variables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VisSettings {
    Bar(BarSettings),
    TimeSeries(TimeSeriesSettings),
}

impl VisSettings {
    pub fn graph_type(&self) -> &'static str {
        match self {
            VisSettings::Bar(_) => "bar",
            VisSettings::TimeSeries(_) => "timeseries",
        }
    }

    pub fn variables(&self) -> &BTreeMap<String, String> {
        match self {
            VisSettings::Bar(bar) => &bar.variables,
            VisSettings::TimeSeries(series) => &series.variables,
        }
    }
}

/// Render the table stored under `id` according to `settings`.
pub fn render(
    id: &Identifier,
    table: &Table,
    settings: &VisSettings,
    repo: &DataRepository,
) -> Result<Figure> {
    let variables = VisVariables::resolve(repo, id, settings.variables())?;

    let (title, svg) = match settings {
        VisSettings::Bar(bar) => {
            let title = variables.apply(&bar.title);
            let subtext = variables.apply(&bar.subtext);
            let svg = plot::bar_chart(table, &title, &subtext, &bar.color)?;
            (title, svg)
        }
        VisSettings::TimeSeries(series) => {
            let title = variables.apply(&series.title);
            let periods = plot::periods_from_metadata(repo.get_metadata(id)?);
            let svg = plot::time_series(
                table,
                &periods,
                &title,
                &series.colors,
                &series.default_color,
            )?;
            (title, svg)
        }
    };

    Ok(Figure {
        title,
        graph_type: settings.graph_type().to_string(),
        svg,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Cell, Data};

    #[test]
    fn test_render_bar_resolves_variables() {
        let mut repo = DataRepository::new();
        let src = Identifier::source(1_704_067_200, 1_706_745_599, "cpu").unwrap();
        let hours = Identifier::analysis(Some(src.clone()), "cpuhours");
        let table = Table::from_rows(
            ["Namespace", "Hours"],
            vec![vec!["ns1".into(), Cell::Number(4.0)]],
        )
        .unwrap();
        repo.add(src.clone(), Data::Empty, None).unwrap();
        repo.add(hours.clone(), Data::Table(table.clone()), None).unwrap();
        repo.add(
            Identifier::analysis(Some(hours.clone()), "cpuhourstotal"),
            Data::Float(4.0),
            None,
        )
        .unwrap();

        let settings = VisSettings::Bar(BarSettings {
            title: "CPU Hours from %MONTH% %YEAR%".to_string(),
            subtext: "Total CPU Hours: %TOTCPUHRS%".to_string(),
            color: "skyblue".to_string(),
            variables: BTreeMap::from([("TOTCPUHRS".to_string(), "cpuhourstotal".to_string())]),
        });

        let figure = render(&hours, &table, &settings, &repo).unwrap();
        assert_eq!(figure.title, "CPU Hours from January 2024");
        assert_eq!(figure.graph_type, "bar");
        assert!(figure.svg.contains("Total CPU Hours: 4.00"));
    }
}

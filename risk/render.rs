use crate::survival::{PredictionError, SurvivalFunction};
use plotters::prelude::*;
use plotters_svg::SVGBackend;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to draw survival curve to '{path}': {reason}")]
    Plot { path: PathBuf, reason: String },
    #[error("Failed to write survival table to '{path}': {source}")]
    Table {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Cumulative event probability at the reporting horizon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskEstimate {
    pub horizon_years: f64,
    pub survival: f64,
    pub risk: f64,
}

impl fmt::Display for RiskEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Estimated {}-year cardiovascular event risk: {}",
            self.horizon_years,
            format_percentage(self.risk)
        )
    }
}

/// Everything needed to draw the curve: the raw knots and the horizon marker.
#[derive(Debug, Clone, PartialEq)]
pub struct CurvePlot {
    pub knots: Vec<(f64, f64)>,
    pub horizon_years: f64,
}

/// `risk = 1 - S(horizon)`, plus the plot data drawn from the same function.
pub fn render(
    function: &SurvivalFunction,
    horizon_years: f64,
) -> Result<(RiskEstimate, CurvePlot), PredictionError> {
    let survival = function.evaluate(horizon_years)?;
    let estimate = RiskEstimate {
        horizon_years,
        survival,
        risk: 1.0 - survival,
    };
    let plot = CurvePlot {
        knots: function.knots().collect(),
        horizon_years,
    };
    Ok((estimate, plot))
}

/// Formats a probability as a percentage with two decimals, e.g. `12.34%`.
pub fn format_percentage(probability: f64) -> String {
    format!("{:.2}%", probability * 100.0)
}

impl CurvePlot {
    /// Points of the curve drawn as a step function, starting from S(0) = 1.
    pub fn step_points(&self) -> Vec<(f64, f64)> {
        let mut points = Vec::with_capacity(self.knots.len() * 2 + 1);
        let mut level = 1.0;
        points.push((0.0, level));
        for &(time, probability) in &self.knots {
            points.push((time, level));
            points.push((time, probability));
            level = probability;
        }
        points
    }

    fn x_max(&self) -> f64 {
        let last = self.knots.last().map(|&(t, _)| t).unwrap_or(0.0);
        last.max(self.horizon_years).max(1.0) * 1.05
    }

    /// Draws the curve with a dashed marker at the horizon to an SVG file.
    pub fn write_svg(&self, path: &Path) -> Result<(), RenderError> {
        self.draw_svg(path).map_err(|e| RenderError::Plot {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    fn draw_svg(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let root = SVGBackend::new(path, (900, 540)).into_drawing_area();
        root.fill(&WHITE)?;

        let x_max = self.x_max();
        let mut chart = ChartBuilder::on(&root)
            .caption("Estimated survival curve", ("sans-serif", 20).into_font())
            .margin(10)
            .x_label_area_size(45)
            .y_label_area_size(60)
            .build_cartesian_2d(0f64..x_max, 0f64..1.05f64)?;
        chart
            .configure_mesh()
            .x_desc("Time (years)")
            .y_desc("Probability of no event")
            .draw()?;

        chart
            .draw_series(LineSeries::new(self.step_points(), BLUE.stroke_width(2)))?
            .label("Survival")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE));

        let horizon = self.horizon_years;
        let dashes = (0..21).map(|i| {
            let start = i as f64 * 0.05;
            PathElement::new(
                vec![(horizon, start), (horizon, start + 0.03)],
                RED.stroke_width(2),
            )
        });
        chart
            .draw_series(dashes)?
            .label(format!("{horizon} years"))
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED));

        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
        root.present()?;
        Ok(())
    }

    /// Writes the raw `(time, survival)` knots as a tab-separated table.
    pub fn write_table(&self, path: &Path) -> Result<(), RenderError> {
        let table_error = |source: csv::Error| RenderError::Table {
            path: path.to_path_buf(),
            source,
        };
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(path)
            .map_err(table_error)?;
        writer
            .write_record(["time_years", "survival"])
            .map_err(table_error)?;
        for &(time, probability) in &self.knots {
            writer
                .write_record([time.to_string(), probability.to_string()])
                .map_err(table_error)?;
        }
        writer.flush().map_err(|e| table_error(e.into()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::fs;
    use tempfile::tempdir;

    fn curve() -> SurvivalFunction {
        SurvivalFunction::new(array![0.5, 2.0, 4.5, 6.0], array![0.99, 0.97, 0.93, 0.88]).unwrap()
    }

    #[test]
    fn risk_complements_survival_at_horizon() {
        let (estimate, plot) = render(&curve(), 5.0).unwrap();
        approx::assert_abs_diff_eq!(estimate.survival, 0.93);
        approx::assert_abs_diff_eq!(estimate.risk, 0.07, epsilon = 1e-12);
        assert_eq!(plot.knots.len(), 4);
        assert_eq!(
            estimate.to_string(),
            "Estimated 5-year cardiovascular event risk: 7.00%"
        );
    }

    #[test]
    fn horizon_past_last_knot_is_a_failure() {
        assert!(matches!(
            render(&curve(), 7.0),
            Err(PredictionError::OutsideDomain { .. })
        ));
    }

    #[test]
    fn step_points_start_at_one_and_never_rise() {
        let (_, plot) = render(&curve(), 5.0).unwrap();
        let points = plot.step_points();
        assert_eq!(points[0], (0.0, 1.0));
        assert_eq!(points.last(), Some(&(6.0, 0.88)));
        assert!(points.windows(2).all(|w| w[1].1 <= w[0].1 && w[1].0 >= w[0].0));
    }

    #[test]
    fn percentage_has_two_decimals() {
        assert_eq!(format_percentage(0.123456), "12.35%");
        assert_eq!(format_percentage(0.0), "0.00%");
    }

    #[test]
    fn svg_and_table_are_written() {
        let dir = tempdir().unwrap();
        let (_, plot) = render(&curve(), 5.0).unwrap();

        let svg = dir.path().join("curve.svg");
        plot.write_svg(&svg).unwrap();
        assert!(fs::read_to_string(&svg).unwrap().contains("<svg"));

        let table = dir.path().join("curve.tsv");
        plot.write_table(&table).unwrap();
        let text = fs::read_to_string(&table).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "time_years\tsurvival");
        assert_eq!(lines[1], "0.5\t0.99");
        assert_eq!(lines.len(), 5);
    }
}

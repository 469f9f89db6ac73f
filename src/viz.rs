//! Churn-rate bar charts using Plotters

use crate::analysis::{SegmentDimension, SegmentTable, SegmentedAnalysis};
use crate::error::{PortfolioError, Result};
use crate::store::ensure_parent_dir;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::register_font;
use std::error::Error;
use std::path::Path;

/// Bar color per panel, in `SegmentDimension::ALL` order
const SEGMENT_COLORS: [RGBColor; 3] = [BLUE, RED, GREEN];

/// Composite image size, a 2x2 grid of panels
const IMAGE_SIZE: (u32, u32) = (1500, 1000);

const FONT_FAMILY: &str = "sans-serif";

/// DejaVu Sans, shipped with the crate so text renders without system fonts
static CHART_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// Render one bar chart per segmentation dimension into a single PNG.
///
/// Buckets with an undefined churn rate get no bar. Parent directories
/// are created and an existing file is overwritten.
pub fn render_segment_plots(segments: &SegmentedAnalysis, output_path: &Path) -> Result<()> {
    ensure_parent_dir(output_path)?;

    let root = BitMapBackend::new(output_path, IMAGE_SIZE).into_drawing_area();
    draw_panels(&root, segments).map_err(|e| PortfolioError::persistence(output_path, e))?;

    tracing::info!(path = %output_path.display(), "segment plots saved");
    Ok(())
}

fn register_chart_font() -> std::result::Result<(), Box<dyn Error>> {
    register_font(FONT_FAMILY, FontStyle::Normal, CHART_FONT)
        .map_err(|_| "bundled chart font could not be parsed".into())
}

fn draw_panels<DB>(
    root: &DrawingArea<DB, Shift>,
    segments: &SegmentedAnalysis,
) -> std::result::Result<(), Box<dyn Error>>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    register_chart_font()?;
    root.fill(&WHITE)?;

    // The fourth panel stays blank.
    let panels = root.split_evenly((2, 2));
    for ((panel, dimension), color) in panels
        .iter()
        .zip(SegmentDimension::ALL)
        .zip(SEGMENT_COLORS)
    {
        draw_segment_chart(panel, dimension, segments.table(dimension), color)?;
    }

    root.present()?;
    Ok(())
}

fn axis_label(dimension: SegmentDimension) -> &'static str {
    match dimension {
        SegmentDimension::Age => "Age Group",
        SegmentDimension::Income => "Annual Income",
        SegmentDimension::CreditScore => "Credit Score",
    }
}

fn draw_segment_chart<DB>(
    area: &DrawingArea<DB, Shift>,
    dimension: SegmentDimension,
    table: &SegmentTable,
    color: RGBColor,
) -> std::result::Result<(), Box<dyn Error>>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let labels = table.labels();
    let n_buckets = labels.len().max(1);

    let mut chart = ChartBuilder::on(area)
        .caption(dimension.title(), (FONT_FAMILY, 24))
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d((0..n_buckets).into_segmented(), 0f64..1.05f64)?;

    let x_formatter = |value: &SegmentValue<usize>| match value {
        SegmentValue::CenterOf(idx) => labels.get(*idx).cloned().unwrap_or_default(),
        _ => String::new(),
    };
    let y_formatter = |value: &f64| format!("{value:.2}");

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc(axis_label(dimension))
        .y_desc("Churn Rate")
        .x_label_formatter(&x_formatter)
        .y_label_formatter(&y_formatter)
        .label_style((FONT_FAMILY, 13))
        .axis_desc_style((FONT_FAMILY, 15))
        .draw()?;

    chart.draw_series(table.buckets.iter().enumerate().filter_map(|(idx, rate)| {
        rate.churn_rate.map(|churn_rate| {
            Rectangle::new(
                [
                    (SegmentValue::Exact(idx), 0.0),
                    (SegmentValue::Exact(idx + 1), churn_rate),
                ],
                color.filled(),
            )
        })
    }))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{SegmentBucket, SegmentRate};
    use std::path::Path;
    use tempfile::tempdir;

    fn table(edges: &[f64], rates: &[Option<f64>]) -> SegmentTable {
        SegmentTable {
            buckets: edges
                .windows(2)
                .zip(rates)
                .map(|(pair, rate)| SegmentRate {
                    bucket: SegmentBucket::new(pair[0], pair[1]),
                    members: usize::from(rate.is_some()),
                    churn_rate: *rate,
                })
                .collect(),
        }
    }

    fn create_test_segments() -> SegmentedAnalysis {
        SegmentedAnalysis {
            by_age: table(&[0.0, 30.0, 50.0, 70.0, 100.0], &[Some(0.1), Some(0.2), Some(0.6), None]),
            by_income: SegmentTable::default(),
            by_credit_score: table(&[0.0, 300.0, 600.0, 850.0], &[Some(0.4), Some(0.3), Some(0.2)]),
        }
    }

    #[test]
    fn test_render_segment_plots() {
        let temp_dir = tempdir().unwrap();
        let output_path = temp_dir.path().join("reports/analysis_plots.png");

        let result = render_segment_plots(&create_test_segments(), &output_path);
        assert!(result.is_ok(), "{result:?}");
        assert!(Path::new(&output_path).exists());
    }

    #[test]
    fn test_render_overwrites_existing_file() {
        let temp_dir = tempdir().unwrap();
        let output_path = temp_dir.path().join("plot.png");
        std::fs::write(&output_path, b"stale").unwrap();

        render_segment_plots(&create_test_segments(), &output_path).unwrap();
        let bytes = std::fs::read(&output_path).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
    }

    #[test]
    fn test_panels_carry_titles() {
        let (width, height) = IMAGE_SIZE;
        let mut buffer = vec![0u8; (width * height * 3) as usize];
        {
            let root = BitMapBackend::with_buffer(&mut buffer, IMAGE_SIZE).into_drawing_area();
            draw_panels(&root, &create_test_segments()).unwrap();
        }

        // Caption band above the top-left plot, clear of axes and bars
        let dark_pixels = (0..50u32)
            .flat_map(|y| (150..600u32).map(move |x| (x, y)))
            .filter(|&(x, y)| {
                let offset = ((y * width + x) * 3) as usize;
                buffer[offset..offset + 3].iter().all(|&channel| channel < 100)
            })
            .count();
        assert!(dark_pixels > 0);
    }
}

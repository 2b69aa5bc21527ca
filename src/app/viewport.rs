use crate::domain::{GroupBy, ScrollOffset, ViewportSize};
use ratatui::layout::{Constraint, Direction, Layout, Rect};

pub const LABEL_COLUMN_WIDTH: u16 = 24;
pub const AXIS_STRIP_HEIGHT: u16 = 2;
pub const COLUMN_HEADER_HEIGHT: u16 = 1;
pub const AXIS_COLUMN_WIDTH: u16 = 12;

/// Screen regions of the timeline. The chart rect is the scroll container's client area.
///
/// Project mode: labels float in a fixed left column, the time axis runs along the top.
/// Source mode: column headers run along the top, the time axis runs down the left side.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ScreenLayout {
    pub header: Rect,
    pub footer: Rect,
    /// Top-left cell block where the label column meets the axis strip.
    pub corner: Rect,
    pub axis: Rect,
    pub labels: Rect,
    pub chart: Rect,
}

impl ScreenLayout {
    pub fn compute(area: Rect, group_by: GroupBy) -> Self {
        let [header, body, footer] = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .areas(area);

        match group_by {
            GroupBy::Project => {
                let [left, right] = Layout::default()
                    .direction(Direction::Horizontal)
                    .constraints([Constraint::Length(LABEL_COLUMN_WIDTH), Constraint::Min(0)])
                    .areas(body);
                let [corner, labels] = split_top(left, AXIS_STRIP_HEIGHT);
                let [axis, chart] = split_top(right, AXIS_STRIP_HEIGHT);
                Self {
                    header,
                    footer,
                    corner,
                    axis,
                    labels,
                    chart,
                }
            }
            GroupBy::Source => {
                let [left, right] = Layout::default()
                    .direction(Direction::Horizontal)
                    .constraints([Constraint::Length(AXIS_COLUMN_WIDTH), Constraint::Min(0)])
                    .areas(body);
                let [corner, axis] = split_top(left, COLUMN_HEADER_HEIGHT);
                let [labels, chart] = split_top(right, COLUMN_HEADER_HEIGHT);
                Self {
                    header,
                    footer,
                    corner,
                    axis,
                    labels,
                    chart,
                }
            }
        }
    }

    pub fn viewport_size(&self) -> ViewportSize {
        ViewportSize::new(f64::from(self.chart.width), f64::from(self.chart.height))
    }

    /// Viewport coordinates of a terminal cell inside the chart.
    pub fn chart_point(&self, column: u16, row: u16) -> Option<(f64, f64)> {
        contains(self.chart, column, row).then(|| {
            (
                f64::from(column - self.chart.x),
                f64::from(row - self.chart.y),
            )
        })
    }

    /// Offset of a terminal cell inside the floating label strip.
    pub fn label_point(&self, column: u16, row: u16) -> Option<(u16, u16)> {
        contains(self.labels, column, row).then(|| (column - self.labels.x, row - self.labels.y))
    }
}

fn split_top(area: Rect, height: u16) -> [Rect; 2] {
    Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(height), Constraint::Min(0)])
        .areas(area)
}

fn contains(area: Rect, column: u16, row: u16) -> bool {
    column >= area.x
        && row >= area.y
        && column < area.x.saturating_add(area.width)
        && row < area.y.saturating_add(area.height)
}

/// Whole-cell scroll offset used for painting.
pub fn cell_scroll(scroll: ScrollOffset) -> (i64, i64) {
    (scroll.x.round() as i64, scroll.y.round() as i64)
}

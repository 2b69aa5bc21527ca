use super::{GroupBy, Row, ZoomState};

/// Divisor of the data span added on both ends of the time range (2%).
pub const RANGE_PADDING_DIVISOR: i64 = 50;
pub const MIN_RANGE_PADDING_MS: i64 = 60_000;

pub const LANE_HEIGHT: f64 = 2.0;
pub const COLUMN_WIDTH: f64 = 16.0;
pub const LEADING_PAD: f64 = 2.0;
pub const TRAILING_PAD: f64 = 4.0;
pub const MIN_TIME_EXTENT: f64 = 40.0;
/// Range start in project mode. Snapping to the newest edge scrolls by the trailing pad, so the
/// origin sits past it.
pub const HORIZONTAL_ORIGIN: f64 = LEADING_PAD + TRAILING_PAD;

const MIN_TICKS: usize = 4;
const HORIZONTAL_TICK_SPACING: f64 = 18.0;
const VERTICAL_TICK_SPACING: f64 = 6.0;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

impl TimeRange {
    pub fn span_ms(&self) -> i64 {
        self.end.saturating_sub(self.start).max(1)
    }
}

/// Padded min/max over the visible rows. Project mode never lets the range end before `now_ms`.
pub fn compute_time_range(rows: &[Row], group_by: GroupBy, now_ms: i64) -> Option<TimeRange> {
    let earliest = rows
        .iter()
        .filter_map(|row| row.sessions.first())
        .map(|session| session.timestamp_ms)
        .min()?;
    let latest = rows.iter().filter_map(Row::latest_ms).max()?;

    let span = latest.saturating_sub(earliest);
    let padding = (span.saturating_add(RANGE_PADDING_DIVISOR - 1) / RANGE_PADDING_DIVISOR)
        .max(MIN_RANGE_PADDING_MS);
    let start = earliest.saturating_sub(padding);
    let mut end = latest.saturating_add(padding);
    if group_by == GroupBy::Project {
        end = end.max(now_ms);
    }
    Some(TimeRange { start, end })
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ViewportSize {
    pub width: f64,
    pub height: f64,
}

impl ViewportSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width: width.max(0.0),
            height: height.max(0.0),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScrollOffset {
    pub x: f64,
    pub y: f64,
}

impl ScrollOffset {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Largest per-axis distance.
    pub fn distance(&self, other: &ScrollOffset) -> f64 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AxisDirection {
    /// Older to newer as pixels grow.
    Forward,
    /// Newest first.
    Reverse,
}

/// Affine time-to-pixel mapping along the time axis of a layout.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeAxis {
    pub range: TimeRange,
    pub ms_per_px: f64,
    pub origin_px: f64,
    pub direction: AxisDirection,
}

impl TimeAxis {
    pub fn px_per_ms(&self) -> f64 {
        1.0 / self.ms_per_px
    }

    pub fn time_to_px(&self, timestamp_ms: f64) -> f64 {
        match self.direction {
            AxisDirection::Forward => {
                self.origin_px + (timestamp_ms - self.range.start as f64) * self.px_per_ms()
            }
            AxisDirection::Reverse => {
                self.origin_px + (self.range.end as f64 - timestamp_ms) * self.px_per_ms()
            }
        }
    }

    pub fn px_to_time(&self, px: f64) -> f64 {
        let offset_ms = (px - self.origin_px) * self.ms_per_px;
        match self.direction {
            AxisDirection::Forward => self.range.start as f64 + offset_ms,
            AxisDirection::Reverse => self.range.end as f64 - offset_ms,
        }
    }

    /// Pixels covered by the data range itself.
    pub fn data_extent(&self) -> f64 {
        (self.range.span_ms() as f64 / self.ms_per_px).ceil()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tick {
    pub px: f64,
    pub timestamp_ms: i64,
}

/// Project mode: time runs left to right, one lane per row.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HorizontalLayout {
    pub axis: TimeAxis,
    pub viewport: ViewportSize,
    pub content_width: f64,
    pub content_height: f64,
    pub row_count: usize,
}

/// Source mode: newest at the top, one column per row.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VerticalLayout {
    pub axis: TimeAxis,
    pub viewport: ViewportSize,
    pub content_width: f64,
    pub content_height: f64,
    pub row_count: usize,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TimelineLayout {
    Horizontal(HorizontalLayout),
    Vertical(VerticalLayout),
}

impl TimelineLayout {
    pub fn compute(
        group_by: GroupBy,
        range: TimeRange,
        zoom: &ZoomState,
        viewport: ViewportSize,
        row_count: usize,
    ) -> Self {
        let ms_per_px = zoom.ms_per_pixel();
        match group_by {
            GroupBy::Project => {
                let axis = TimeAxis {
                    range,
                    ms_per_px,
                    origin_px: HORIZONTAL_ORIGIN,
                    direction: AxisDirection::Forward,
                };
                Self::Horizontal(HorizontalLayout {
                    axis,
                    viewport,
                    content_width: time_extent(&axis, viewport.width),
                    content_height: (row_count as f64 * LANE_HEIGHT).max(viewport.height),
                    row_count,
                })
            }
            GroupBy::Source => {
                let axis = TimeAxis {
                    range,
                    ms_per_px,
                    origin_px: LEADING_PAD,
                    direction: AxisDirection::Reverse,
                };
                Self::Vertical(VerticalLayout {
                    axis,
                    viewport,
                    content_width: (row_count as f64 * COLUMN_WIDTH).max(viewport.width),
                    content_height: time_extent(&axis, viewport.height),
                    row_count,
                })
            }
        }
    }

    pub fn axis(&self) -> &TimeAxis {
        match self {
            Self::Horizontal(layout) => &layout.axis,
            Self::Vertical(layout) => &layout.axis,
        }
    }

    pub fn viewport(&self) -> ViewportSize {
        match self {
            Self::Horizontal(layout) => layout.viewport,
            Self::Vertical(layout) => layout.viewport,
        }
    }

    pub fn row_count(&self) -> usize {
        match self {
            Self::Horizontal(layout) => layout.row_count,
            Self::Vertical(layout) => layout.row_count,
        }
    }

    /// `(width, height)` of the scrollable content.
    pub fn content_size(&self) -> (f64, f64) {
        match self {
            Self::Horizontal(layout) => (layout.content_width, layout.content_height),
            Self::Vertical(layout) => (layout.content_width, layout.content_height),
        }
    }

    /// Content extent along the time axis.
    pub fn time_extent(&self) -> f64 {
        match self {
            Self::Horizontal(layout) => layout.content_width,
            Self::Vertical(layout) => layout.content_height,
        }
    }

    /// Viewport extent along the time axis.
    pub fn viewport_time_extent(&self) -> f64 {
        match self {
            Self::Horizontal(layout) => layout.viewport.width,
            Self::Vertical(layout) => layout.viewport.height,
        }
    }

    pub fn max_scroll(&self) -> ScrollOffset {
        let (width, height) = self.content_size();
        let viewport = self.viewport();
        ScrollOffset::new(
            (width - viewport.width).max(0.0),
            (height - viewport.height).max(0.0),
        )
    }

    pub fn clamp_scroll(&self, scroll: ScrollOffset) -> ScrollOffset {
        let max = self.max_scroll();
        ScrollOffset::new(scroll.x.clamp(0.0, max.x), scroll.y.clamp(0.0, max.y))
    }

    pub fn time_scroll(&self, scroll: ScrollOffset) -> f64 {
        match self {
            Self::Horizontal(_) => scroll.x,
            Self::Vertical(_) => scroll.y,
        }
    }

    pub fn with_time_scroll(&self, scroll: ScrollOffset, value: f64) -> ScrollOffset {
        let next = match self {
            Self::Horizontal(_) => ScrollOffset::new(value, scroll.y),
            Self::Vertical(_) => ScrollOffset::new(scroll.x, value),
        };
        self.clamp_scroll(next)
    }

    /// Scroll offset that shows the most recent data.
    pub fn latest_scroll(&self, scroll: ScrollOffset) -> ScrollOffset {
        match self {
            Self::Horizontal(_) => self.with_time_scroll(scroll, self.max_scroll().x),
            Self::Vertical(_) => self.with_time_scroll(scroll, 0.0),
        }
    }

    /// Scroll offset that shows the oldest data.
    pub fn earliest_scroll(&self, scroll: ScrollOffset) -> ScrollOffset {
        match self {
            Self::Horizontal(_) => self.with_time_scroll(scroll, 0.0),
            Self::Vertical(_) => self.with_time_scroll(scroll, self.max_scroll().y),
        }
    }

    /// Content coordinates `(x, y)` of a session marker.
    pub fn marker_position(&self, row_index: usize, timestamp_ms: i64) -> (f64, f64) {
        let time_px = self.axis().time_to_px(timestamp_ms as f64);
        match self {
            Self::Horizontal(_) => (time_px, row_center(row_index, LANE_HEIGHT)),
            Self::Vertical(_) => (row_center(row_index, COLUMN_WIDTH), time_px),
        }
    }

    /// Content start and size of a row band on the cross axis.
    pub fn row_band(&self, row_index: usize) -> (f64, f64) {
        match self {
            Self::Horizontal(_) => (row_index as f64 * LANE_HEIGHT, LANE_HEIGHT),
            Self::Vertical(_) => (row_index as f64 * COLUMN_WIDTH, COLUMN_WIDTH),
        }
    }

    pub fn row_at(&self, cross_px: f64) -> Option<usize> {
        if cross_px < 0.0 {
            return None;
        }
        let band = match self {
            Self::Horizontal(_) => LANE_HEIGHT,
            Self::Vertical(_) => COLUMN_WIDTH,
        };
        let index = (cross_px / band).floor() as usize;
        (index < self.row_count()).then_some(index)
    }

    /// Evenly spaced ticks across the plotted extent, limited to those inside `window`
    /// (content pixels along the time axis). The grid follows the chart size.
    pub fn ticks_in(&self, window: (f64, f64)) -> Vec<Tick> {
        let spacing = match self {
            Self::Horizontal(_) => HORIZONTAL_TICK_SPACING,
            Self::Vertical(_) => VERTICAL_TICK_SPACING,
        };
        let axis = self.axis();
        let first = axis.origin_px;
        let last = (self.time_extent() - TRAILING_PAD).max(first + 1.0);
        let count = ((last - first) / spacing).floor().max(MIN_TICKS as f64);
        let step = (last - first) / (count - 1.0);

        // One index of slack on each side absorbs pixel rounding.
        let low = ((window.0 - first) / step).floor().max(0.0);
        let high = ((window.1 - first) / step).ceil().min(count - 1.0);
        if high < low {
            return Vec::new();
        }

        (low as usize..=high as usize)
            .map(|index| {
                let px = (first + step * index as f64).round();
                Tick {
                    px,
                    timestamp_ms: axis.px_to_time(px).round() as i64,
                }
            })
            .filter(|tick| tick.px >= window.0 && tick.px <= window.1)
            .collect()
    }
}

fn row_center(row_index: usize, band: f64) -> f64 {
    (row_index as f64 * band + band / 2.0).floor()
}

fn time_extent(axis: &TimeAxis, viewport_extent: f64) -> f64 {
    let data = axis.origin_px + axis.data_extent();
    viewport_extent.max(data).max(MIN_TIME_EXTENT).ceil() + TRAILING_PAD
}

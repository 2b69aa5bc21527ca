use super::{LEADING_PAD, ScrollOffset, TRAILING_PAD, TimeRange, TimelineLayout};

pub const MIN_MS_PER_PIXEL: f64 = 30_000.0;
pub const MAX_MS_PER_PIXEL: f64 = 86_400_000.0;
pub const DEFAULT_MS_PER_PIXEL: f64 = 3_600_000.0;
pub const ZOOM_STEP: f64 = 1.5;

const DAY_MS: f64 = 86_400_000.0;

pub fn clamp_ms_per_pixel(value: f64) -> f64 {
    value.clamp(MIN_MS_PER_PIXEL, MAX_MS_PER_PIXEL)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoomState {
    ms_per_pixel: f64,
}

impl Default for ZoomState {
    fn default() -> Self {
        Self {
            ms_per_pixel: DEFAULT_MS_PER_PIXEL,
        }
    }
}

impl ZoomState {
    pub fn new(ms_per_pixel: f64) -> Self {
        let mut state = Self::default();
        state.set(ms_per_pixel);
        state
    }

    pub fn ms_per_pixel(&self) -> f64 {
        self.ms_per_pixel
    }

    /// Out-of-range requests are clipped; NaN is ignored. Returns whether the value changed.
    pub fn set(&mut self, ms_per_pixel: f64) -> bool {
        if ms_per_pixel.is_nan() {
            return false;
        }
        let next = clamp_ms_per_pixel(ms_per_pixel);
        let changed = next != self.ms_per_pixel;
        self.ms_per_pixel = next;
        changed
    }

    pub fn zoomed_in(&self) -> f64 {
        self.ms_per_pixel / ZOOM_STEP
    }

    pub fn zoomed_out(&self) -> f64 {
        self.ms_per_pixel * ZOOM_STEP
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ZoomPreset {
    Day,
    Week,
    All,
}

impl ZoomPreset {
    pub fn label(self) -> &'static str {
        match self {
            Self::Day => "1 day",
            Self::Week => "1 week",
            Self::All => "all",
        }
    }

    /// Scale that fits the preset duration into the viewport's time extent.
    pub fn ms_per_pixel(self, range: TimeRange, viewport_time_extent: f64) -> f64 {
        let usable = (viewport_time_extent - LEADING_PAD - TRAILING_PAD).max(1.0);
        let duration = match self {
            Self::Day => DAY_MS,
            Self::Week => DAY_MS * 7.0,
            Self::All => range.span_ms() as f64,
        };
        clamp_ms_per_pixel(duration / usable)
    }
}

/// A timestamp pinned to a viewport coordinate along the time axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoomAnchor {
    pub timestamp_ms: f64,
    pub viewport_coord: f64,
}

impl ZoomAnchor {
    /// Reads the timestamp under `viewport_coord` from the layout before the zoom.
    pub fn capture(layout: &TimelineLayout, scroll: ScrollOffset, viewport_coord: f64) -> Self {
        let content_px = layout.time_scroll(scroll) + viewport_coord;
        Self {
            timestamp_ms: layout.axis().px_to_time(content_px),
            viewport_coord,
        }
    }

    /// Scroll offset that puts the anchored timestamp back under the same coordinate.
    pub fn resolve(&self, layout: &TimelineLayout, scroll: ScrollOffset) -> ScrollOffset {
        let content_px = layout.axis().time_to_px(self.timestamp_ms);
        layout.with_time_scroll(scroll, content_px - self.viewport_coord)
    }
}

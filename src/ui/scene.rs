use crate::app::MarkerRef;
use crate::domain::{Row, RowColor, ScrollOffset, TimelineLayout};
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

/// Extra cells drawn past each viewport edge so partially visible connectors still show.
const CULL_MARGIN_PX: f64 = 1.0;

#[derive(Clone, Debug, PartialEq)]
pub struct AxisTick {
    /// Content position along the time axis.
    pub px: f64,
    pub date: String,
    pub clock: String,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Baseline {
    pub row: usize,
    /// Content position on the cross axis.
    pub cross_px: f64,
    pub color: RowColor,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Connector {
    pub row: usize,
    pub from: (f64, f64),
    pub to: (f64, f64),
    pub color: RowColor,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Marker {
    pub marker: MarkerRef,
    pub x: f64,
    pub y: f64,
    pub color: RowColor,
    pub hovered: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FloatingLabel {
    pub row: usize,
    pub text: String,
    /// Content position of the row band start on the cross axis.
    pub cross_px: f64,
    pub color: RowColor,
}

/// Everything the painter needs for one frame, in content coordinates, already culled to the
/// visible window.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Scene {
    pub ticks: Vec<AxisTick>,
    pub baselines: Vec<Baseline>,
    pub connectors: Vec<Connector>,
    pub markers: Vec<Marker>,
    pub labels: Vec<FloatingLabel>,
}

impl Scene {
    pub fn build(
        rows: &[Row],
        layout: &TimelineLayout,
        scroll: ScrollOffset,
        hover: Option<MarkerRef>,
        offset: UtcOffset,
    ) -> Self {
        let viewport = layout.viewport();
        let (time_scroll, cross_scroll, time_extent, cross_extent) = match layout {
            TimelineLayout::Horizontal(_) => (scroll.x, scroll.y, viewport.width, viewport.height),
            TimelineLayout::Vertical(_) => (scroll.y, scroll.x, viewport.height, viewport.width),
        };
        let time_window = (
            time_scroll - CULL_MARGIN_PX,
            time_scroll + time_extent + CULL_MARGIN_PX,
        );
        let cross_window = (cross_scroll, cross_scroll + cross_extent);

        let ticks = layout
            .ticks_in(time_window)
            .into_iter()
            .map(|tick| {
                let (date, clock) = format_tick(tick.timestamp_ms, offset);
                AxisTick {
                    px: tick.px,
                    date,
                    clock,
                }
            })
            .collect();

        let mut scene = Self {
            ticks,
            ..Self::default()
        };

        for (row_index, row) in rows.iter().enumerate() {
            let (band_start, band_size) = layout.row_band(row_index);
            if band_start + band_size < cross_window.0 || band_start > cross_window.1 {
                continue;
            }
            let (center_x, center_y) = layout.marker_position(row_index, 0);
            let cross_center = match layout {
                TimelineLayout::Horizontal(_) => center_y,
                TimelineLayout::Vertical(_) => center_x,
            };

            scene.labels.push(FloatingLabel {
                row: row_index,
                text: row.label.clone(),
                cross_px: band_start,
                color: row.color,
            });
            scene.baselines.push(Baseline {
                row: row_index,
                cross_px: cross_center,
                color: row.color,
            });

            let (first, last) = visible_sessions(layout, row, time_window);
            let mut previous: Option<(f64, f64)> = None;
            for session_index in first..last {
                let session = &row.sessions[session_index];
                let (x, y) = layout.marker_position(row_index, session.timestamp_ms);
                if let Some(from) = previous {
                    scene.connectors.push(Connector {
                        row: row_index,
                        from,
                        to: (x, y),
                        color: row.color,
                    });
                }
                previous = Some((x, y));

                let time_px = match layout {
                    TimelineLayout::Horizontal(_) => x,
                    TimelineLayout::Vertical(_) => y,
                };
                if time_px < time_window.0 || time_px > time_window.1 {
                    continue;
                }
                let marker = MarkerRef {
                    row: row_index,
                    session: session_index,
                };
                scene.markers.push(Marker {
                    marker,
                    x,
                    y,
                    color: row.color,
                    hovered: hover == Some(marker),
                });
            }
        }

        // Hovered marker last so it paints on top.
        scene.markers.sort_by_key(|marker| marker.hovered);
        scene
    }
}

/// Index range of the sessions inside the time window plus one neighbour on each side, so
/// connectors that cross the viewport edge are kept.
fn visible_sessions(layout: &TimelineLayout, row: &Row, window: (f64, f64)) -> (usize, usize) {
    let axis = layout.axis();
    let (t0, t1) = (axis.px_to_time(window.0), axis.px_to_time(window.1));
    let (low, high) = if t0 <= t1 { (t0, t1) } else { (t1, t0) };

    let first = row
        .sessions
        .partition_point(|session| (session.timestamp_ms as f64) < low);
    let last = row
        .sessions
        .partition_point(|session| (session.timestamp_ms as f64) <= high);
    (first.saturating_sub(1), (last + 1).min(row.sessions.len()))
}

fn to_local(timestamp_ms: i64, offset: UtcOffset) -> Option<OffsetDateTime> {
    let nanos = i128::from(timestamp_ms) * 1_000_000;
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .ok()
        .map(|time| time.to_offset(offset))
}

/// `(date, clock)` labels for an axis tick.
pub fn format_tick(timestamp_ms: i64, offset: UtcOffset) -> (String, String) {
    let Some(local) = to_local(timestamp_ms, offset) else {
        return (String::new(), String::new());
    };
    (
        local
            .format(format_description!("[month repr:short] [day]"))
            .unwrap_or_default(),
        local
            .format(format_description!("[hour]:[minute]"))
            .unwrap_or_default(),
    )
}

pub fn format_timestamp(timestamp_ms: i64, offset: UtcOffset) -> String {
    to_local(timestamp_ms, offset)
        .and_then(|local| {
            local
                .format(format_description!("[year]-[month]-[day] [hour]:[minute]"))
                .ok()
        })
        .unwrap_or_else(|| timestamp_ms.to_string())
}

/// Human label for a zoom level, e.g. `1h/cell`.
pub fn format_scale(ms_per_pixel: f64) -> String {
    let minutes = ms_per_pixel / 60_000.0;
    if minutes < 60.0 {
        format!("{}m/cell", trim_float(minutes))
    } else if minutes < 24.0 * 60.0 {
        format!("{}h/cell", trim_float(minutes / 60.0))
    } else {
        format!("{}d/cell", trim_float(minutes / (24.0 * 60.0)))
    }
}

fn trim_float(value: f64) -> String {
    if (value - value.round()).abs() < 0.05 {
        format!("{}", value.round())
    } else {
        format!("{value:.1}")
    }
}

use super::{AppCommand, MarkerRef, TimelineModel};
use crate::domain::{GroupBy, Row, TimelineLayout};
use crossterm::event::{KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use std::time::Instant;

const WHEEL_STEP_TIME: f64 = 6.0;
const WHEEL_STEP_CROSS: f64 = 2.0;
/// Markers within this many cells of the pointer along the time axis are hit.
const HIT_SLOP_PX: f64 = 1.0;
/// Cross-axis slop for the narrow marker inside a wide source column.
const COLUMN_HIT_SLOP_PX: f64 = 2.0;

pub(super) fn update_on_mouse(
    model: TimelineModel,
    mouse: MouseEvent,
    now: Instant,
) -> (TimelineModel, AppCommand) {
    let mut model = model;
    if model.terminal_size.0 == 0 || model.terminal_size.1 == 0 {
        return (model, AppCommand::None);
    }
    if model.search.is_some() || model.detail.is_some() {
        if matches!(mouse.kind, MouseEventKind::Down(MouseButton::Left)) {
            model.detail = None;
        }
        return (model, AppCommand::None);
    }

    match mouse.kind {
        MouseEventKind::ScrollUp => apply_wheel(&mut model, &mouse, WheelDirection::Back, now),
        MouseEventKind::ScrollDown => {
            apply_wheel(&mut model, &mouse, WheelDirection::Forward, now)
        }
        MouseEventKind::ScrollLeft => model.scroll_by(-WHEEL_STEP_TIME, 0.0),
        MouseEventKind::ScrollRight => model.scroll_by(WHEEL_STEP_TIME, 0.0),
        MouseEventKind::Moved => {
            model.hover = model
                .screen
                .chart_point(mouse.column, mouse.row)
                .and_then(|(x, y)| marker_at(&model, x, y));
        }
        MouseEventKind::Down(MouseButton::Left) => apply_left_click(&mut model, &mouse),
        _ => {}
    }

    (model, AppCommand::None)
}

#[derive(Clone, Copy, Debug)]
enum WheelDirection {
    Back,
    Forward,
}

impl WheelDirection {
    fn sign(self) -> f64 {
        match self {
            Self::Back => -1.0,
            Self::Forward => 1.0,
        }
    }
}

fn apply_wheel(model: &mut TimelineModel, mouse: &MouseEvent, direction: WheelDirection, now: Instant) {
    if mouse.modifiers.contains(KeyModifiers::CONTROL) {
        let coord = model
            .screen
            .chart_point(mouse.column, mouse.row)
            .map(|(x, y)| match model.group_by {
                GroupBy::Project => x,
                GroupBy::Source => y,
            });
        match direction {
            WheelDirection::Back => model.zoom_in(coord, now),
            WheelDirection::Forward => model.zoom_out(coord, now),
        }
        return;
    }

    let shifted = mouse.modifiers.contains(KeyModifiers::SHIFT);
    let sign = direction.sign();
    match (model.group_by, shifted) {
        (GroupBy::Project, false) => model.scroll_by(0.0, sign * WHEEL_STEP_CROSS),
        (GroupBy::Project, true) => model.scroll_by(sign * WHEEL_STEP_TIME, 0.0),
        (GroupBy::Source, false) => model.scroll_by(0.0, sign * WHEEL_STEP_TIME),
        (GroupBy::Source, true) => model.scroll_by(sign * WHEEL_STEP_TIME, 0.0),
    }
}

fn apply_left_click(model: &mut TimelineModel, mouse: &MouseEvent) {
    if let Some((x, y)) = model.screen.chart_point(mouse.column, mouse.row) {
        if let Some(marker) = marker_at(model, x, y) {
            model.hover = Some(marker);
            model.select_marker(marker);
        }
        return;
    }

    if model.group_by != GroupBy::Project {
        return;
    }
    let Some((_, label_row)) = model.screen.label_point(mouse.column, mouse.row) else {
        return;
    };
    let Some(layout) = model.layout.as_ref() else {
        return;
    };
    let content_y = f64::from(label_row) + model.label_offset.round();
    if let Some(row) = layout.row_at(content_y) {
        model.select_project_row(row);
    }
}

/// Nearest marker under a chart cell, if any.
fn marker_at(model: &TimelineModel, viewport_x: f64, viewport_y: f64) -> Option<MarkerRef> {
    let layout = model.layout.as_ref()?;
    let scroll = super::cell_scroll(model.scroll);
    let content_x = viewport_x + scroll.0 as f64;
    let content_y = viewport_y + scroll.1 as f64;
    let (time_px, cross_px) = match layout {
        TimelineLayout::Horizontal(_) => (content_x, content_y),
        TimelineLayout::Vertical(_) => (content_y, content_x),
    };

    let row_index = layout.row_at(cross_px)?;
    let row = model.rows.get(row_index)?;
    if let TimelineLayout::Vertical(_) = layout {
        let (center, _) = layout.marker_position(row_index, 0);
        if (cross_px - center).abs() > COLUMN_HIT_SLOP_PX {
            return None;
        }
    }

    let session = nearest_session(layout, row, time_px)?;
    Some(MarkerRef {
        row: row_index,
        session,
    })
}

/// Binary search on the row's ascending timestamps, then the closest marker within the slop.
fn nearest_session(layout: &TimelineLayout, row: &Row, time_px: f64) -> Option<usize> {
    let axis = layout.axis();
    let center_ms = axis.px_to_time(time_px);
    let slop_ms = axis.ms_per_px * (HIT_SLOP_PX + 0.5);
    let low = (center_ms - slop_ms).floor() as i64;
    let high = (center_ms + slop_ms).ceil() as i64;

    let start = row
        .sessions
        .partition_point(|session| session.timestamp_ms < low);
    row.sessions[start..]
        .iter()
        .take_while(|session| session.timestamp_ms <= high)
        .enumerate()
        .map(|(offset, session)| {
            let marker_px = axis.time_to_px(session.timestamp_ms as f64).round();
            (start + offset, (marker_px - time_px).abs())
        })
        .filter(|(_, distance)| *distance <= HIT_SLOP_PX)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{FakeApi, LoaderMessage, LoaderSignal, TimelineOptions};
    use crate::domain::{RowFilter, SessionPoint, TimeRange, ViewportSize, ZoomState, build_rows};
    use std::sync::Arc;
    use std::sync::mpsc::channel;

    const JAN_1: i64 = 1_767_225_600_000;
    const HOUR_MS: i64 = 3_600_000;

    fn row_with(timestamps: &[i64]) -> Vec<Row> {
        let points: Vec<SessionPoint> = timestamps
            .iter()
            .enumerate()
            .map(|(index, ts)| SessionPoint {
                session_id: format!("s{index}"),
                project_id: "p".to_string(),
                project_name: "p".to_string(),
                project_path: None,
                source: "claude".to_string(),
                timestamp_ms: *ts,
                title: None,
            })
            .collect();
        build_rows(&points, GroupBy::Project, &RowFilter::default())
    }

    fn layout(group_by: GroupBy) -> TimelineLayout {
        let range = TimeRange {
            start: JAN_1,
            end: JAN_1 + 100 * HOUR_MS,
        };
        TimelineLayout::compute(group_by, range, &ZoomState::default(), ViewportSize::new(60.0, 20.0), 1)
    }

    #[test]
    fn nearest_session_picks_closest_marker() {
        let rows = row_with(&[JAN_1 + 10 * HOUR_MS, JAN_1 + 12 * HOUR_MS, JAN_1 + 40 * HOUR_MS]);
        let layout = layout(GroupBy::Project);
        let px = layout.axis().time_to_px((JAN_1 + 12 * HOUR_MS) as f64);
        assert_eq!(nearest_session(&layout, &rows[0], px), Some(1));
        assert_eq!(nearest_session(&layout, &rows[0], px + 1.0), Some(1));
        assert_eq!(nearest_session(&layout, &rows[0], px + 10.0), None);
    }

    #[test]
    fn reverse_axis_hit_testing_works() {
        let rows = row_with(&[JAN_1 + 10 * HOUR_MS, JAN_1 + 50 * HOUR_MS]);
        let layout = layout(GroupBy::Source);
        let px = layout.axis().time_to_px((JAN_1 + 50 * HOUR_MS) as f64);
        assert_eq!(nearest_session(&layout, &rows[0], px), Some(1));
        let px = layout.axis().time_to_px((JAN_1 + 10 * HOUR_MS) as f64);
        assert_eq!(nearest_session(&layout, &rows[0], px), Some(0));
    }

    #[test]
    fn ctrl_wheel_zooms_around_the_pointer() {
        let now = Instant::now();
        let (tx, _rx) = channel();
        let options = TimelineOptions {
            group_by: GroupBy::Project,
            include_deleted_projects: false,
        };
        let mut model = TimelineModel::new(Arc::new(FakeApi::default()), options, tx)
            .with_wall_clock(|| JAN_1 + 30 * 24 * HOUR_MS);
        model.resize(100, 30, now);
        let points: Vec<SessionPoint> = (0..30)
            .map(|day| SessionPoint {
                session_id: format!("s{day}"),
                project_id: "p".to_string(),
                project_name: "p".to_string(),
                project_path: None,
                source: "claude".to_string(),
                timestamp_ms: JAN_1 + day * 24 * HOUR_MS,
                title: None,
            })
            .collect();
        let generation = model.load.generation();
        for signal in [
            LoaderSignal::ProjectsListed { total: 1, workers: 1 },
            LoaderSignal::ProjectLoaded {
                points,
                sources: ["claude".to_string()].into_iter().collect(),
            },
            LoaderSignal::WorkerFinished,
        ] {
            model.handle_loader_message(LoaderMessage { generation, signal }, now);
        }
        model.on_frame(now);
        model.scroll_by(-200.0, 0.0);

        let column = model.screen.chart.x + 20;
        let row = model.screen.chart.y + 1;
        let (pointer_x, _) = model.screen.chart_point(column, row).expect("inside chart");
        let time_under_pointer = |model: &TimelineModel| {
            let layout = model.layout.expect("layout");
            layout.axis().px_to_time(pointer_x + model.scroll.x)
        };
        let before_time = time_under_pointer(&model);
        let before_zoom = model.zoom.ms_per_pixel();

        let wheel = MouseEvent {
            kind: MouseEventKind::ScrollUp,
            column,
            row,
            modifiers: KeyModifiers::CONTROL,
        };
        let (model, _) = update_on_mouse(model, wheel, now);

        assert!(model.zoom.ms_per_pixel() < before_zoom);
        assert!(model.nav.has_user_navigated());
        let drift = (time_under_pointer(&model) - before_time).abs();
        assert!(drift <= model.zoom.ms_per_pixel(), "drift={drift}ms");
    }
}

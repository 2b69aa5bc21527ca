mod coalesce;
mod loader;
mod mouse;
mod navigation;
mod search;
mod viewport;

use crate::domain::{
    GroupBy, Row, RowFilter, ScrollOffset, SessionPoint, SourceCapability, TimeRange,
    TimelineLayout, ZoomAnchor, ZoomPreset, ZoomState, build_rows, compute_time_range,
};
use crate::infra::{ApiError, SessionApi};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent};
use ratatui::layout::Rect;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::time::Instant;
use thiserror::Error;
use time::{OffsetDateTime, UtcOffset};
use tracing::{debug, info};

pub use coalesce::FrameCoalescer;
pub use loader::{
    Commit, LoadHandle, LoadRequest, LoadState, LoadStep, LoaderMessage, LoaderSignal, spawn_load,
};
pub use navigation::{NavigationPhase, NavigationState};
pub use search::{SearchInput, SearchOutcome};
pub use viewport::{ScreenLayout, cell_scroll};

#[cfg(test)]
pub(crate) use loader::tests::FakeApi;

const PAN_STEP_X: f64 = 8.0;
const PAN_STEP_Y: f64 = 2.0;
const PAGE_FRACTION: f64 = 0.9;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("terminal I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TimelineOptions {
    pub group_by: GroupBy,
    pub include_deleted_projects: bool,
}

impl Default for TimelineOptions {
    fn default() -> Self {
        Self {
            group_by: GroupBy::Project,
            include_deleted_projects: false,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProjectSelection {
    pub project_id: String,
    pub project_name: String,
    pub project_path: Option<String>,
}

/// Notifications for the host; drained with [`TimelineModel::drain_events`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TimelineEvent {
    ProjectSelected(ProjectSelection),
    SessionSelected(SessionPoint),
    SourcesDiscovered(Vec<String>),
    Error(String),
}

#[derive(Clone, Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Paste(String),
    Mouse(MouseEvent),
    Resize(u16, u16),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AppCommand {
    None,
    Quit,
}

/// A session marker addressed by row and position within the row.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MarkerRef {
    pub row: usize,
    pub session: usize,
}

/// All timeline state. Owned by the UI thread; workers reach it only through the loader channel.
pub struct TimelineModel {
    api: Arc<dyn SessionApi>,
    loader_tx: Sender<LoaderMessage>,
    load_handle: Option<LoadHandle>,
    next_generation: u64,
    capabilities: Option<Arc<Vec<SourceCapability>>>,
    points: Vec<SessionPoint>,
    events: Vec<TimelineEvent>,
    label_sync: FrameCoalescer,
    disposed: bool,
    wall_clock: fn() -> i64,

    pub load: LoadState,
    pub group_by: GroupBy,
    pub include_deleted: bool,
    pub filter: RowFilter,
    pub search_text: String,
    pub known_sources: Vec<String>,
    pub rows: Vec<Row>,
    pub range: Option<TimeRange>,
    pub layout: Option<TimelineLayout>,
    pub screen: ScreenLayout,
    pub zoom: ZoomState,
    pub nav: NavigationState,
    pub scroll: ScrollOffset,
    /// Cross-axis offset applied to the floating labels; refreshed at most once per frame.
    pub label_offset: f64,
    pub hover: Option<MarkerRef>,
    pub detail: Option<SessionPoint>,
    pub search: Option<SearchInput>,
    pub error: Option<String>,
    pub notice: Option<String>,
    pub terminal_size: (u16, u16),
    pub display_offset: UtcOffset,
}

impl TimelineModel {
    /// Builds the model and starts the first load.
    pub fn new(
        api: Arc<dyn SessionApi>,
        options: TimelineOptions,
        loader_tx: Sender<LoaderMessage>,
    ) -> Self {
        let mut model = Self {
            api,
            loader_tx,
            load_handle: None,
            next_generation: 0,
            capabilities: None,
            points: Vec::new(),
            events: Vec::new(),
            label_sync: FrameCoalescer::default(),
            disposed: false,
            wall_clock: now_unix_ms,
            load: LoadState::default(),
            group_by: options.group_by,
            include_deleted: options.include_deleted_projects,
            filter: RowFilter::default(),
            search_text: String::new(),
            known_sources: Vec::new(),
            rows: Vec::new(),
            range: None,
            layout: None,
            screen: ScreenLayout::default(),
            zoom: ZoomState::default(),
            nav: NavigationState::default(),
            scroll: ScrollOffset::default(),
            label_offset: 0.0,
            hover: None,
            detail: None,
            search: None,
            error: None,
            notice: None,
            terminal_size: (0, 0),
            display_offset: UtcOffset::UTC,
        };
        model.start_load(Instant::now());
        model
    }

    /// Replaces the clock that closes the project-mode range at "now".
    pub fn with_wall_clock(mut self, wall_clock: fn() -> i64) -> Self {
        self.wall_clock = wall_clock;
        self
    }

    pub fn with_display_offset(mut self, offset: UtcOffset) -> Self {
        self.display_offset = offset;
        self
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn session_count(&self) -> usize {
        self.points.len()
    }

    pub fn drain_events(&mut self) -> Vec<TimelineEvent> {
        std::mem::take(&mut self.events)
    }

    /// Earliest instant at which `on_frame` has scheduled work.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.load.commit_deadline()
    }

    pub fn set_group_by(&mut self, group_by: GroupBy, now: Instant) {
        if self.disposed || self.group_by == group_by {
            return;
        }
        info!(group_by = group_by.label(), "group-by changed");
        self.group_by = group_by;
        self.nav.reset();
        self.nav.arm_auto_follow(now);
        self.scroll = ScrollOffset::default();
        self.hover = None;
        self.screen = ScreenLayout::compute(self.terminal_rect(), group_by);
        self.rebuild(now);
    }

    pub fn set_search(&mut self, text: &str, now: Instant) {
        if self.disposed {
            return;
        }
        self.search_text = text.trim().to_string();
        self.filter = RowFilter::new(text, self.filter.sources().cloned());
        self.rebuild(now);
    }

    /// `None` shows every source.
    pub fn set_source_filter(&mut self, sources: Option<BTreeSet<String>>, now: Instant) {
        if self.disposed {
            return;
        }
        self.filter = RowFilter::new(&self.search_text, sources);
        self.rebuild(now);
    }

    pub fn set_include_deleted(&mut self, include_deleted: bool, now: Instant) {
        if self.disposed || self.include_deleted == include_deleted {
            return;
        }
        self.include_deleted = include_deleted;
        self.start_load(now);
    }

    pub fn refresh(&mut self, now: Instant) {
        if self.disposed {
            return;
        }
        self.start_load(now);
    }

    /// Stops issuing fetches; anything still in flight is discarded on arrival.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        if let Some(handle) = self.load_handle.take() {
            handle.dispose();
        }
        self.load.cancel();
    }

    fn start_load(&mut self, now: Instant) {
        if let Some(handle) = self.load_handle.take() {
            handle.dispose();
        }
        self.next_generation += 1;
        let request = LoadRequest {
            generation: self.next_generation,
            include_deleted: self.include_deleted,
            capabilities: self.capabilities.clone(),
        };
        debug!(generation = request.generation, "starting load");

        self.load = LoadState::begin(self.next_generation);
        self.points.clear();
        self.known_sources.clear();
        self.error = None;
        self.hover = None;
        self.detail = None;
        self.scroll = ScrollOffset::default();
        self.nav.reset();
        self.nav.arm_auto_follow(now);
        self.rebuild(now);

        self.load_handle = Some(spawn_load(
            self.api.clone(),
            request,
            self.loader_tx.clone(),
        ));
    }

    pub fn handle_loader_message(&mut self, message: LoaderMessage, now: Instant) {
        if self.disposed {
            return;
        }
        match self.load.accept(message, now) {
            LoadStep::Ignored | LoadStep::Progress => {}
            LoadStep::Capabilities(capabilities) => self.capabilities = Some(capabilities),
            LoadStep::Commit(commit) | LoadStep::Finished(commit) => self.apply_commit(commit, now),
            LoadStep::Failed(error) => {
                self.load_handle = None;
                self.error = Some(error.clone());
                self.events.push(TimelineEvent::Error(error));
            }
        }
    }

    /// Per-frame work: the trailing commit when due, scroll observation, label sync.
    pub fn on_frame(&mut self, now: Instant) {
        if self.disposed {
            return;
        }
        if let Some(commit) = self.load.poll(now) {
            self.apply_commit(commit, now);
        }
        self.nav.observe_scroll(self.scroll);
        if self.label_sync.take() {
            self.label_offset = match self.group_by {
                GroupBy::Project => self.scroll.y,
                GroupBy::Source => self.scroll.x,
            };
        }
    }

    pub fn resize(&mut self, width: u16, height: u16, now: Instant) {
        self.terminal_size = (width, height);
        self.screen = ScreenLayout::compute(self.terminal_rect(), self.group_by);
        self.relayout(now);
    }

    fn terminal_rect(&self) -> Rect {
        Rect::new(0, 0, self.terminal_size.0, self.terminal_size.1)
    }

    fn apply_commit(&mut self, commit: Commit, now: Instant) {
        self.points = commit.points;
        self.known_sources = commit.sources;
        self.events
            .push(TimelineEvent::SourcesDiscovered(self.known_sources.clone()));
        self.rebuild(now);
    }

    fn rebuild(&mut self, now: Instant) {
        self.rows = build_rows(&self.points, self.group_by, &self.filter);
        self.hover = None;
        self.relayout(now);
    }

    /// Recomputes the layout for the current rows and settles the scroll offset.
    pub fn relayout(&mut self, now: Instant) {
        self.range = compute_time_range(&self.rows, self.group_by, (self.wall_clock)());
        let Some(range) = self.range else {
            self.layout = None;
            self.scroll = ScrollOffset::default();
            self.label_sync.request();
            return;
        };
        let layout = TimelineLayout::compute(
            self.group_by,
            range,
            &self.zoom,
            self.screen.viewport_size(),
            self.rows.len(),
        );
        self.scroll = self.nav.settle(&layout, self.scroll, now, self.load.loading);
        self.layout = Some(layout);
        self.label_sync.request();
    }

    /// Zooms so that the time under `viewport_coord` (time axis; centre when `None`) stays put.
    pub fn zoom_to(&mut self, ms_per_pixel: f64, viewport_coord: Option<f64>, now: Instant) {
        let anchor = self.layout.as_ref().map(|layout| {
            let coord = viewport_coord.unwrap_or(layout.viewport_time_extent() / 2.0);
            ZoomAnchor::capture(layout, self.scroll, coord)
        });
        self.nav.mark_user_navigated();
        if !self.zoom.set(ms_per_pixel) {
            return;
        }
        if let Some(anchor) = anchor {
            self.nav.set_zoom_anchor(anchor);
        }
        self.relayout(now);
    }

    pub fn zoom_in(&mut self, viewport_coord: Option<f64>, now: Instant) {
        self.zoom_to(self.zoom.zoomed_in(), viewport_coord, now);
    }

    pub fn zoom_out(&mut self, viewport_coord: Option<f64>, now: Instant) {
        self.zoom_to(self.zoom.zoomed_out(), viewport_coord, now);
    }

    pub fn apply_preset(&mut self, preset: ZoomPreset, now: Instant) {
        let (Some(range), Some(layout)) = (self.range, self.layout.as_ref()) else {
            return;
        };
        let target = preset.ms_per_pixel(range, layout.viewport_time_extent());
        self.notice = Some(format!("zoom: {}", preset.label()));
        self.zoom_to(target, None, now);
    }

    /// Moves the scroll container the way a native scroll would; the controller only learns
    /// about it by observing the new offset.
    pub fn scroll_by(&mut self, dx: f64, dy: f64) {
        let Some(layout) = self.layout.as_ref() else {
            return;
        };
        let next = layout.clamp_scroll(ScrollOffset::new(self.scroll.x + dx, self.scroll.y + dy));
        if next == self.scroll {
            return;
        }
        self.scroll = next;
        self.hover = None;
        self.label_sync.request();
        self.nav.observe_scroll(self.scroll);
    }

    fn pan(&mut self, dx: f64, dy: f64) {
        self.nav.mark_user_navigated();
        self.scroll_by(dx, dy);
    }

    fn jump_to_edge(&mut self, latest: bool) {
        let Some(layout) = self.layout.as_ref() else {
            return;
        };
        self.nav.mark_user_navigated();
        let target = if latest {
            layout.latest_scroll(self.scroll)
        } else {
            layout.earliest_scroll(self.scroll)
        };
        self.scroll_by(target.x - self.scroll.x, target.y - self.scroll.y);
    }

    fn cycle_source_filter(&mut self, now: Instant) {
        let current = self
            .filter
            .sources()
            .and_then(|sources| sources.iter().next().cloned());
        let next = match current {
            None => self.known_sources.first().cloned(),
            Some(current) => self
                .known_sources
                .iter()
                .skip_while(|source| **source != current)
                .nth(1)
                .cloned(),
        };
        self.notice = Some(match &next {
            Some(source) => format!("source: {source}"),
            None => "source: all".to_string(),
        });
        self.set_source_filter(next.map(|source| BTreeSet::from([source])), now);
    }

    pub fn hovered_point(&self) -> Option<&SessionPoint> {
        let marker = self.hover?;
        self.rows.get(marker.row)?.sessions.get(marker.session)
    }

    pub fn select_marker(&mut self, marker: MarkerRef) {
        let Some(point) = self
            .rows
            .get(marker.row)
            .and_then(|row| row.sessions.get(marker.session))
            .cloned()
        else {
            return;
        };
        self.events.push(TimelineEvent::SessionSelected(point.clone()));
        self.detail = Some(point);
    }

    pub fn select_project_row(&mut self, row_index: usize) {
        if self.group_by != GroupBy::Project {
            return;
        }
        let Some(row) = self.rows.get(row_index) else {
            return;
        };
        let selection = ProjectSelection {
            project_id: row.key.clone(),
            project_name: row.label.clone(),
            project_path: row.project_path().map(str::to_string),
        };
        self.notice = Some(format!("project: {}", selection.project_name));
        self.events.push(TimelineEvent::ProjectSelected(selection));
    }
}

pub fn update(model: TimelineModel, event: AppEvent) -> (TimelineModel, AppCommand) {
    let now = Instant::now();
    match event {
        AppEvent::Key(key) => update_on_key(model, key, now),
        AppEvent::Paste(text) => update_on_paste(model, text),
        AppEvent::Mouse(mouse) => mouse::update_on_mouse(model, mouse, now),
        AppEvent::Resize(width, height) => {
            let mut model = model;
            model.resize(width, height, now);
            (model, AppCommand::None)
        }
    }
}

fn update_on_paste(model: TimelineModel, text: String) -> (TimelineModel, AppCommand) {
    let mut model = model;
    if let Some(search) = model.search.as_mut() {
        search.insert_str(&text);
    }
    (model, AppCommand::None)
}

fn update_on_key(model: TimelineModel, key: KeyEvent, now: Instant) -> (TimelineModel, AppCommand) {
    let mut model = model;
    model.notice = None;

    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return (model, AppCommand::Quit);
    }

    if let Some(mut search) = model.search.take() {
        match search.handle_key(key) {
            SearchOutcome::Editing => model.search = Some(search),
            SearchOutcome::Applied(text) => model.set_search(&text, now),
            SearchOutcome::Cancelled => {}
        }
        return (model, AppCommand::None);
    }

    if model.detail.is_some() {
        if matches!(
            key.code,
            KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q')
        ) {
            model.detail = None;
        }
        return (model, AppCommand::None);
    }

    let viewport = model.screen.viewport_size();
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => return (model, AppCommand::Quit),
        KeyCode::Char('g') => {
            let next = model.group_by.toggle();
            model.set_group_by(next, now);
        }
        KeyCode::Char('/') => model.search = Some(SearchInput::with_text(&model.search_text)),
        KeyCode::Char('s') => model.cycle_source_filter(now),
        KeyCode::Char('d') => {
            let next = !model.include_deleted;
            model.notice = Some(if next {
                "including deleted projects".to_string()
            } else {
                "hiding deleted projects".to_string()
            });
            model.set_include_deleted(next, now);
        }
        KeyCode::Char('r') => model.refresh(now),
        KeyCode::Char('+') | KeyCode::Char('=') => model.zoom_in(None, now),
        KeyCode::Char('-') => model.zoom_out(None, now),
        KeyCode::Char('0') => model.zoom_to(ZoomState::default().ms_per_pixel(), None, now),
        KeyCode::Char('1') => model.apply_preset(ZoomPreset::Day, now),
        KeyCode::Char('7') => model.apply_preset(ZoomPreset::Week, now),
        KeyCode::Char('a') => model.apply_preset(ZoomPreset::All, now),
        KeyCode::Left | KeyCode::Char('h') => model.pan(-PAN_STEP_X, 0.0),
        KeyCode::Right | KeyCode::Char('l') => model.pan(PAN_STEP_X, 0.0),
        KeyCode::Up | KeyCode::Char('k') => model.pan(0.0, -PAN_STEP_Y),
        KeyCode::Down | KeyCode::Char('j') => model.pan(0.0, PAN_STEP_Y),
        KeyCode::PageUp => model.pan(0.0, -(viewport.height * PAGE_FRACTION).max(1.0)),
        KeyCode::PageDown => model.pan(0.0, (viewport.height * PAGE_FRACTION).max(1.0)),
        KeyCode::Home => model.jump_to_edge(false),
        KeyCode::End => model.jump_to_edge(true),
        _ => {}
    }

    (model, AppCommand::None)
}

pub fn now_unix_ms() -> i64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    i64::try_from(nanos).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ZOOM_STEP;
    use crossterm::event::{MouseButton, MouseEventKind};
    use std::sync::mpsc::{Receiver, channel};

    const JAN_1: i64 = 1_767_225_600_000;
    const DAY_MS: i64 = 86_400_000;

    fn fixed_clock() -> i64 {
        JAN_1 + 31 * DAY_MS
    }

    fn model(group_by: GroupBy) -> (TimelineModel, Receiver<LoaderMessage>) {
        let (tx, rx) = channel();
        let options = TimelineOptions {
            group_by,
            include_deleted_projects: false,
        };
        let mut model =
            TimelineModel::new(Arc::new(FakeApi::default()), options, tx).with_wall_clock(fixed_clock);
        model.resize(100, 30, Instant::now());
        (model, rx)
    }

    fn point(session: &str, project: &str, source: &str, ts: i64) -> SessionPoint {
        SessionPoint {
            session_id: session.to_string(),
            project_id: project.to_string(),
            project_name: project.to_string(),
            project_path: Some(format!("/work/{project}")),
            source: source.to_string(),
            timestamp_ms: ts,
            title: Some(format!("about {session}")),
        }
    }

    fn month_of_points() -> Vec<SessionPoint> {
        (0..31)
            .map(|day| {
                let (project, source) = if day % 3 == 0 {
                    ("alpha", "claude")
                } else {
                    ("beta", "codex")
                };
                point(&format!("s{day}"), project, source, JAN_1 + day * DAY_MS)
            })
            .collect()
    }

    fn send(model: &mut TimelineModel, signal: LoaderSignal, now: Instant) {
        let generation = model.load.generation();
        model.handle_loader_message(LoaderMessage { generation, signal }, now);
    }

    fn loaded(points: Vec<SessionPoint>) -> LoaderSignal {
        let sources = points.iter().map(|point| point.source.clone()).collect();
        LoaderSignal::ProjectLoaded { points, sources }
    }

    fn load_all(model: &mut TimelineModel, points: Vec<SessionPoint>, now: Instant) {
        send(model, LoaderSignal::ProjectsListed { total: 1, workers: 1 }, now);
        send(model, loaded(points), now);
        send(model, LoaderSignal::WorkerFinished, now);
        model.on_frame(now);
    }

    fn max_time_scroll(model: &TimelineModel) -> ScrollOffset {
        model.layout.expect("layout").max_scroll()
    }

    #[test]
    fn initial_load_shows_latest_data() {
        let now = Instant::now();
        let (mut model, _rx) = model(GroupBy::Project);
        load_all(&mut model, month_of_points(), now);
        assert!(!model.load.loading);
        let max = max_time_scroll(&model);
        assert!(max.x > 0.0);
        assert_eq!(model.scroll.x, max.x);

        let (mut model, _rx) = self::model(GroupBy::Source);
        load_all(&mut model, month_of_points(), now);
        assert!(max_time_scroll(&model).y > 0.0);
        assert_eq!(model.scroll.y, 0.0);
    }

    #[test]
    fn user_scroll_stops_auto_follow() {
        let now = Instant::now();
        let (mut model, _rx) = model(GroupBy::Project);
        send(&mut model, LoaderSignal::ProjectsListed { total: 2, workers: 2 }, now);
        send(&mut model, loaded(month_of_points()), now);
        model.on_frame(now);
        let pinned = model.scroll;
        assert_eq!(pinned.x, max_time_scroll(&model).x);

        model.scroll_by(-20.0, 0.0);
        assert!(model.nav.has_user_navigated());
        let moved = model.scroll;

        let newer = vec![point("late", "gamma", "gemini", JAN_1 + 31 * DAY_MS)];
        send(&mut model, loaded(newer), now);
        send(&mut model, LoaderSignal::WorkerFinished, now);
        send(&mut model, LoaderSignal::WorkerFinished, now);
        model.on_frame(now);
        assert_eq!(model.session_count(), 32);
        assert_eq!(model.scroll, moved);
    }

    #[test]
    fn group_by_switch_resets_navigation_and_snaps() {
        let now = Instant::now();
        let (mut model, _rx) = model(GroupBy::Project);
        load_all(&mut model, month_of_points(), now);
        model.scroll_by(-30.0, 0.0);
        assert!(model.nav.has_user_navigated());

        model.set_group_by(GroupBy::Source, now);
        assert!(!model.nav.has_user_navigated());
        assert!(model.nav.has_initial_alignment());
        assert_eq!(model.scroll.y, 0.0);
        assert_eq!(model.rows.len(), 2);

        model.set_group_by(GroupBy::Project, now);
        assert_eq!(model.scroll.x, max_time_scroll(&model).x);
    }

    #[test]
    fn zoom_round_trip_restores_scroll() {
        let now = Instant::now();
        let (mut model, _rx) = model(GroupBy::Project);
        load_all(&mut model, month_of_points(), now);
        model.zoom_to(1_800_000.0, Some(10.0), now);
        model.on_frame(now);
        model.scroll_by(-200.0, 0.0);
        let before = model.scroll;
        let original = model.zoom.ms_per_pixel();

        model.zoom_to(original / ZOOM_STEP, Some(30.0), now);
        assert!(model.nav.pending_zoom_anchor().is_none());
        model.zoom_to(original, Some(30.0), now);
        assert!((model.scroll.x - before.x).abs() <= 1.0, "{:?} {:?}", model.scroll, before);
    }

    #[test]
    fn zoom_keys_stay_clamped() {
        let now = Instant::now();
        let (mut model, _rx) = model(GroupBy::Source);
        load_all(&mut model, month_of_points(), now);
        for _ in 0..40 {
            model.zoom_in(None, now);
        }
        assert_eq!(model.zoom.ms_per_pixel(), crate::domain::MIN_MS_PER_PIXEL);
        for _ in 0..40 {
            model.zoom_out(None, now);
        }
        assert_eq!(model.zoom.ms_per_pixel(), crate::domain::MAX_MS_PER_PIXEL);
        let scroll = model.scroll;
        let clamped = model.layout.expect("layout").clamp_scroll(scroll);
        assert_eq!(scroll, clamped);
    }

    #[test]
    fn zoom_keys_take_control_even_when_zoom_is_unchanged() {
        let now = Instant::now();
        let key = |code| AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE));

        let (mut model, _rx) = model(GroupBy::Project);
        load_all(&mut model, month_of_points(), now);
        assert!(!model.nav.has_user_navigated());
        let default_zoom = model.zoom.ms_per_pixel();
        let (model, _) = update(model, key(KeyCode::Char('0')));
        assert_eq!(model.zoom.ms_per_pixel(), default_zoom);
        assert!(model.nav.has_user_navigated());

        let (mut model, _rx) = self::model(GroupBy::Project);
        load_all(&mut model, month_of_points(), now);
        model.zoom_to(crate::domain::MIN_MS_PER_PIXEL, None, now);
        model.set_group_by(GroupBy::Source, now);
        model.set_group_by(GroupBy::Project, now);
        assert!(!model.nav.has_user_navigated());
        let (model, _) = update(model, key(KeyCode::Char('+')));
        assert_eq!(model.zoom.ms_per_pixel(), crate::domain::MIN_MS_PER_PIXEL);
        assert!(model.nav.has_user_navigated());
    }

    #[test]
    fn floating_labels_follow_scroll_once_per_frame() {
        let now = Instant::now();
        let (mut model, _rx) = model(GroupBy::Project);
        let points = (0..40)
            .map(|index| point(&format!("s{index}"), &format!("p{index:02}"), "claude", JAN_1))
            .collect();
        load_all(&mut model, points, now);
        assert!(max_time_scroll(&model).y > 20.0);
        assert_eq!(model.label_offset, model.scroll.y);

        model.scroll_by(0.0, 7.0);
        assert_eq!(model.label_offset, 0.0);
        model.on_frame(now);
        assert_eq!(model.scroll.y, 7.0);
        assert_eq!(model.label_offset, model.scroll.y);

        model.scroll_by(0.0, 3.0);
        model.scroll_by(0.0, 4.0);
        model.on_frame(now);
        assert_eq!(model.label_offset, 14.0);
        assert!(!model.label_sync.take());

        let (mut model, _rx) = self::model(GroupBy::Source);
        let points = (0..10)
            .map(|index| point(&format!("s{index}"), "alpha", &format!("src{index}"), JAN_1))
            .collect();
        load_all(&mut model, points, now);
        assert!(max_time_scroll(&model).x > 0.0);
        model.scroll_by(5.0, 0.0);
        model.on_frame(now);
        assert_eq!(model.label_offset, model.scroll.x);
        assert_eq!(model.label_offset, 5.0);
    }

    #[test]
    fn project_list_failure_surfaces_error_and_retry() {
        let now = Instant::now();
        let (mut model, _rx) = model(GroupBy::Project);
        model.drain_events();
        send(&mut model, LoaderSignal::Failed("HTTP 500".to_string()), now);
        assert_eq!(model.error.as_deref(), Some("HTTP 500"));
        assert_eq!(
            model.drain_events(),
            vec![TimelineEvent::Error("HTTP 500".to_string())]
        );

        let failed_generation = model.load.generation();
        let (model, _) = update(
            model,
            AppEvent::Key(KeyEvent::new(KeyCode::Char('r'), KeyModifiers::NONE)),
        );
        assert!(model.error.is_none());
        assert!(model.load.loading);
        assert!(model.load.generation() > failed_generation);
    }

    #[test]
    fn filters_rebuild_rows_and_sources_are_reported() {
        let now = Instant::now();
        let (mut model, _rx) = model(GroupBy::Project);
        load_all(&mut model, month_of_points(), now);
        assert!(model.drain_events().contains(&TimelineEvent::SourcesDiscovered(vec![
            "claude".to_string(),
            "codex".to_string()
        ])));

        model.set_search("alpha", now);
        assert_eq!(model.rows.len(), 1);
        assert_eq!(model.rows[0].key, "alpha");

        model.set_search("", now);
        model.cycle_source_filter(now);
        assert!(model.rows.iter().all(|row| row.sessions.iter().all(|s| s.source == "claude")));
        model.cycle_source_filter(now);
        assert!(model.rows.iter().all(|row| row.sessions.iter().all(|s| s.source == "codex")));
        model.cycle_source_filter(now);
        assert!(model.filter.sources().is_none());
        assert_eq!(model.rows.len(), 2);
    }

    #[test]
    fn stale_and_disposed_messages_are_ignored() {
        let now = Instant::now();
        let (mut model, _rx) = model(GroupBy::Project);
        let stale = model.load.generation();
        model.refresh(now);
        model.handle_loader_message(
            LoaderMessage {
                generation: stale,
                signal: loaded(month_of_points()),
            },
            now,
        );
        assert_eq!(model.session_count(), 0);

        model.dispose();
        send(&mut model, loaded(month_of_points()), now);
        assert_eq!(model.session_count(), 0);
        assert!(model.is_disposed());
    }

    #[test]
    fn clicking_marker_and_label_emits_selection() {
        let now = Instant::now();
        let (mut model, _rx) = model(GroupBy::Project);
        load_all(&mut model, month_of_points(), now);
        model.drain_events();

        let layout = model.layout.expect("layout");
        let session = model.rows[0].sessions.last().expect("session").clone();
        let (x, y) = layout.marker_position(0, session.timestamp_ms);
        let column = model.screen.chart.x + (x - model.scroll.x).round() as u16;
        let row = model.screen.chart.y + (y - model.scroll.y).round() as u16;
        let click = |column, row| MouseEvent {
            kind: MouseEventKind::Down(MouseButton::Left),
            column,
            row,
            modifiers: KeyModifiers::NONE,
        };

        let (mut model, _) = update(model, AppEvent::Mouse(click(column, row)));
        assert_eq!(model.detail.as_ref(), Some(&session));
        assert_eq!(
            model.drain_events(),
            vec![TimelineEvent::SessionSelected(session)]
        );

        model.detail = None;
        let label_row = model.screen.labels.y + 2;
        let (mut model, _) = update(model, AppEvent::Mouse(click(1, label_row)));
        let events = model.drain_events();
        assert!(matches!(
            events.as_slice(),
            [TimelineEvent::ProjectSelected(selection)] if selection.project_id == model.rows[1].key
        ));
    }
}

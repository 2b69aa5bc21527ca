use super::coalesce::{CommitDebounce, CommitDecision};
use crate::domain::{Project, SessionMeta, SessionPoint, SourceCapability, resolve_source};
use crate::infra::SessionApi;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

pub const MAX_CONCURRENT_FETCHES: usize = 6;

#[derive(Clone, Debug)]
pub struct LoadRequest {
    pub generation: u64,
    pub include_deleted: bool,
    /// Cached from an earlier load; `None` asks the coordinator to list them.
    pub capabilities: Option<Arc<Vec<SourceCapability>>>,
}

#[derive(Debug)]
pub struct LoaderMessage {
    pub generation: u64,
    pub signal: LoaderSignal,
}

#[derive(Debug)]
pub enum LoaderSignal {
    Capabilities(Arc<Vec<SourceCapability>>),
    ProjectsListed {
        total: usize,
        workers: usize,
    },
    ProjectLoaded {
        points: Vec<SessionPoint>,
        sources: BTreeSet<String>,
    },
    ProjectFailed {
        project_id: String,
        error: String,
    },
    WorkerFinished,
    Failed(String),
}

/// Handle to a running load. Disposing stops new fetches; in-flight requests finish and
/// their results are discarded by the receiver.
#[derive(Clone, Debug)]
pub struct LoadHandle {
    disposed: Arc<AtomicBool>,
}

impl LoadHandle {
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

pub fn spawn_load(
    api: Arc<dyn SessionApi>,
    request: LoadRequest,
    tx: Sender<LoaderMessage>,
) -> LoadHandle {
    let handle = LoadHandle {
        disposed: Arc::new(AtomicBool::new(false)),
    };
    let disposed = handle.disposed.clone();
    std::thread::spawn(move || run_coordinator(api, request, disposed, tx));
    handle
}

fn run_coordinator(
    api: Arc<dyn SessionApi>,
    request: LoadRequest,
    disposed: Arc<AtomicBool>,
    tx: Sender<LoaderMessage>,
) {
    let generation = request.generation;
    let send = |signal: LoaderSignal| tx.send(LoaderMessage { generation, signal }).is_ok();

    let capabilities = match request.capabilities {
        Some(capabilities) => capabilities,
        None => {
            let listed = match api.list_source_capabilities() {
                Ok(capabilities) => capabilities,
                Err(error) => {
                    warn!("source capabilities unavailable: {error}");
                    Vec::new()
                }
            };
            let listed = Arc::new(listed);
            if !send(LoaderSignal::Capabilities(listed.clone())) {
                return;
            }
            listed
        }
    };

    if disposed.load(Ordering::Acquire) {
        return;
    }

    let projects = match api.list_projects() {
        Ok(projects) => projects,
        Err(error) => {
            warn!("project listing failed: {error}");
            let _ = send(LoaderSignal::Failed(error.to_string()));
            return;
        }
    };

    let fetchable: Vec<Project> = projects
        .into_iter()
        .filter(|project| project.id.as_deref().is_some_and(|id| !id.is_empty()))
        .filter(|project| request.include_deleted || !project.deleted)
        .collect();
    let workers = fetchable.len().min(MAX_CONCURRENT_FETCHES);
    info!(
        generation,
        projects = fetchable.len(),
        workers,
        "timeline load started"
    );
    if !send(LoaderSignal::ProjectsListed {
        total: fetchable.len(),
        workers,
    }) {
        return;
    }

    let projects = Arc::new(fetchable);
    let cursor = Arc::new(AtomicUsize::new(0));
    for _ in 0..workers {
        let worker = Worker {
            api: api.clone(),
            projects: projects.clone(),
            capabilities: capabilities.clone(),
            cursor: cursor.clone(),
            disposed: disposed.clone(),
            tx: tx.clone(),
            generation,
        };
        std::thread::spawn(move || worker.run());
    }
}

struct Worker {
    api: Arc<dyn SessionApi>,
    projects: Arc<Vec<Project>>,
    capabilities: Arc<Vec<SourceCapability>>,
    cursor: Arc<AtomicUsize>,
    disposed: Arc<AtomicBool>,
    tx: Sender<LoaderMessage>,
    generation: u64,
}

impl Worker {
    fn run(self) {
        let _finished = FinishGuard {
            tx: self.tx.clone(),
            generation: self.generation,
        };
        loop {
            if self.disposed.load(Ordering::Acquire) {
                break;
            }
            let index = self.cursor.fetch_add(1, Ordering::Relaxed);
            let Some(project) = self.projects.get(index) else {
                break;
            };
            let Some(project_id) = project.id.as_deref() else {
                continue;
            };

            let source_hint = project.source.as_deref();
            let signal = match self.api.list_sessions(project_id, source_hint) {
                Ok(sessions) => {
                    let (points, sources) =
                        build_points(project, &sessions, &self.capabilities, source_hint);
                    LoaderSignal::ProjectLoaded { points, sources }
                }
                Err(error) => LoaderSignal::ProjectFailed {
                    project_id: project_id.to_string(),
                    error: error.to_string(),
                },
            };
            if !self.send(signal) {
                return;
            }
        }
    }

    fn send(&self, signal: LoaderSignal) -> bool {
        self.tx
            .send(LoaderMessage {
                generation: self.generation,
                signal,
            })
            .is_ok()
    }
}

/// Reports the worker as finished when it exits, including by panic.
struct FinishGuard {
    tx: Sender<LoaderMessage>,
    generation: u64,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        let _ = self.tx.send(LoaderMessage {
            generation: self.generation,
            signal: LoaderSignal::WorkerFinished,
        });
    }
}

/// Turns one project's listing into plotted points; sessions without a usable timestamp are
/// dropped here.
pub fn build_points(
    project: &Project,
    sessions: &[SessionMeta],
    capabilities: &[SourceCapability],
    source_hint: Option<&str>,
) -> (Vec<SessionPoint>, BTreeSet<String>) {
    let mut sources = BTreeSet::new();
    let points: Vec<SessionPoint> = sessions
        .iter()
        .filter_map(|session| {
            let source = resolve_source(session, project, capabilities, source_hint);
            SessionPoint::from_meta(project, session, source)
        })
        .inspect(|point| {
            sources.insert(point.source.clone());
        })
        .collect();
    (points, sources)
}

/// Data published to the aggregator. Each commit is a superset of the previous one.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Commit {
    pub points: Vec<SessionPoint>,
    pub sources: Vec<String>,
}

#[derive(Debug, Eq, PartialEq)]
pub enum LoadStep {
    Ignored,
    Progress,
    Capabilities(Arc<Vec<SourceCapability>>),
    Commit(Commit),
    Finished(Commit),
    Failed(String),
}

/// UI-thread side of a load: owns the accumulator and the commit schedule.
#[derive(Debug, Default)]
pub struct LoadState {
    generation: u64,
    points: Vec<SessionPoint>,
    sources: BTreeSet<String>,
    debounce: CommitDebounce,
    pub total_projects: Option<usize>,
    pub fetched_projects: usize,
    pub failed_projects: usize,
    workers_running: usize,
    pub loading: bool,
}

impl LoadState {
    pub fn begin(generation: u64) -> Self {
        Self {
            generation,
            loading: true,
            ..Self::default()
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn commit_deadline(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    pub fn accept(&mut self, message: LoaderMessage, now: Instant) -> LoadStep {
        if message.generation != self.generation || !self.loading {
            return LoadStep::Ignored;
        }

        match message.signal {
            LoaderSignal::Capabilities(capabilities) => LoadStep::Capabilities(capabilities),
            LoaderSignal::ProjectsListed { total, workers } => {
                self.total_projects = Some(total);
                self.workers_running = workers;
                if workers == 0 {
                    return self.finish();
                }
                LoadStep::Progress
            }
            LoaderSignal::ProjectLoaded { points, sources } => {
                self.fetched_projects += 1;
                if points.is_empty() {
                    return LoadStep::Progress;
                }
                self.points.extend(points);
                self.sources.extend(sources);
                match self.debounce.request(now) {
                    CommitDecision::Now => LoadStep::Commit(self.snapshot()),
                    CommitDecision::Scheduled | CommitDecision::Coalesced => LoadStep::Progress,
                }
            }
            LoaderSignal::ProjectFailed { project_id, error } => {
                debug!(project_id, "project skipped: {error}");
                self.fetched_projects += 1;
                self.failed_projects += 1;
                LoadStep::Progress
            }
            LoaderSignal::WorkerFinished => {
                self.workers_running = self.workers_running.saturating_sub(1);
                if self.workers_running == 0 {
                    return self.finish();
                }
                LoadStep::Progress
            }
            LoaderSignal::Failed(error) => {
                self.loading = false;
                LoadStep::Failed(error)
            }
        }
    }

    /// Trailing commit when the debounce window has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<Commit> {
        if !self.loading {
            return None;
        }
        self.debounce.poll(now).then(|| self.snapshot())
    }

    pub fn cancel(&mut self) {
        self.loading = false;
        self.debounce.flush();
    }

    fn finish(&mut self) -> LoadStep {
        self.debounce.flush();
        self.loading = false;
        info!(
            generation = self.generation,
            sessions = self.points.len(),
            failed = self.failed_projects,
            "timeline load finished"
        );
        LoadStep::Finished(self.snapshot())
    }

    fn snapshot(&self) -> Commit {
        trace!(sessions = self.points.len(), "commit");
        Commit {
            points: self.points.clone(),
            sources: self.sources.iter().cloned().collect(),
        }
    }
}

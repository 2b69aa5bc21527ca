use crate::app::{LoadRequest, LoadState, LoadStep, spawn_load};
use crate::domain::{GroupBy, Row, RowFilter, SessionPoint, build_rows, normalize_source_name};
use crate::infra::{ApiError, ConfigOverrides, HttpSessionApi, SessionApi, TimelineConfig};
use crate::ui::format_timestamp;
use serde::Serialize;
use std::collections::BTreeSet;
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::mpsc::channel;
use std::time::Instant;
use thiserror::Error;
use time::UtcOffset;
use tracing::debug;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CliInvocation {
    PrintHelp,
    PrintVersion,
    Tui { overrides: ConfigOverrides },
    Command {
        overrides: ConfigOverrides,
        command: CliCommand,
    },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CliCommand {
    Projects,
    Rows {
        search: String,
        sources: Vec<String>,
        json: bool,
    },
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum CliParseError {
    #[error("unknown subcommand: {0}")]
    UnknownSubcommand(String),

    #[error("unknown flag: {0}")]
    UnknownFlag(String),

    #[error("missing value for {0}")]
    MissingFlagValue(String),

    #[error("invalid value for {flag}: {value}")]
    InvalidFlagValue { flag: String, value: String },

    #[error("unexpected argument: {0}")]
    UnexpectedArgument(String),
}

pub fn parse_invocation(args: &[String]) -> Result<CliInvocation, CliParseError> {
    let rest = args.get(1..).unwrap_or_default();
    if rest.iter().any(|arg| arg == "-h" || arg == "--help") {
        return Ok(CliInvocation::PrintHelp);
    }
    if rest.iter().any(|arg| arg == "-V" || arg == "--version") {
        return Ok(CliInvocation::PrintVersion);
    }

    let mut overrides = ConfigOverrides::default();
    let mut iter = rest.iter().peekable();
    while let Some(arg) = iter.peek() {
        if !arg.starts_with('-') {
            break;
        }
        let Some(flag) = iter.next() else {
            break;
        };
        if !parse_global_flag(flag, &mut iter, &mut overrides)? {
            return Err(CliParseError::UnknownFlag(flag.to_string()));
        }
    }

    let Some(subcommand) = iter.next() else {
        return Ok(CliInvocation::Tui { overrides });
    };

    let command = match subcommand.as_str() {
        "projects" => {
            while let Some(arg) = iter.next() {
                if parse_global_flag(arg, &mut iter, &mut overrides)? {
                    continue;
                }
                return Err(unexpected(arg));
            }
            CliCommand::Projects
        }
        "rows" => {
            let mut search = String::new();
            let mut sources = Vec::new();
            let mut json = false;
            while let Some(arg) = iter.next() {
                match arg.as_str() {
                    "--search" => search = take_value(arg, &mut iter)?.to_string(),
                    "--source" => {
                        let value = take_value(arg, &mut iter)?;
                        let Some(source) = normalize_source_name(value) else {
                            return Err(CliParseError::InvalidFlagValue {
                                flag: arg.to_string(),
                                value: value.to_string(),
                            });
                        };
                        sources.push(source);
                    }
                    "--json" => json = true,
                    _ if parse_global_flag(arg, &mut iter, &mut overrides)? => {}
                    _ => return Err(unexpected(arg)),
                }
            }
            CliCommand::Rows {
                search,
                sources,
                json,
            }
        }
        other => return Err(CliParseError::UnknownSubcommand(other.to_string())),
    };

    Ok(CliInvocation::Command { overrides, command })
}

/// Flags accepted before and after the subcommand. Returns `false` for anything else.
fn parse_global_flag<'a>(
    flag: &str,
    iter: &mut impl Iterator<Item = &'a String>,
    overrides: &mut ConfigOverrides,
) -> Result<bool, CliParseError> {
    match flag {
        "--url" => overrides.base_url = Some(take_value(flag, iter)?.to_string()),
        "--group-by" => {
            let value = take_value(flag, iter)?;
            let group_by = GroupBy::parse(value).ok_or_else(|| CliParseError::InvalidFlagValue {
                flag: flag.to_string(),
                value: value.to_string(),
            })?;
            overrides.group_by = Some(group_by);
        }
        "--include-deleted" => overrides.include_deleted = Some(true),
        _ => return Ok(false),
    }
    Ok(true)
}

fn take_value<'a>(
    flag: &str,
    iter: &mut impl Iterator<Item = &'a String>,
) -> Result<&'a str, CliParseError> {
    iter.next()
        .map(String::as_str)
        .ok_or_else(|| CliParseError::MissingFlagValue(flag.to_string()))
}

fn unexpected(arg: &str) -> CliParseError {
    if arg.starts_with('-') {
        CliParseError::UnknownFlag(arg.to_string())
    } else {
        CliParseError::UnexpectedArgument(arg.to_string())
    }
}

#[derive(Debug, Error)]
pub enum CliRunError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("timeline load failed: {0}")]
    Load(String),

    #[error(transparent)]
    WriteOutput(#[from] io::Error),

    #[error("failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),
}

pub fn run(
    command: CliCommand,
    config: &TimelineConfig,
    offset: UtcOffset,
) -> Result<(), CliRunError> {
    let api: Arc<dyn SessionApi> = Arc::new(HttpSessionApi::new(
        &config.base_url,
        config.request_timeout,
    )?);
    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    let result = run_with(command, config, api, offset, &mut out);
    match result {
        Err(CliRunError::WriteOutput(error)) if error.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => {
            other?;
            match out.flush() {
                Err(error) if error.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                flushed => Ok(flushed?),
            }
        }
    }
}

fn run_with(
    command: CliCommand,
    config: &TimelineConfig,
    api: Arc<dyn SessionApi>,
    offset: UtcOffset,
    out: &mut impl Write,
) -> Result<(), CliRunError> {
    match command {
        CliCommand::Projects => {
            for project in api.list_projects()? {
                if project.deleted && !config.include_deleted {
                    continue;
                }
                let Some(id) = project.id.as_deref().filter(|id| !id.is_empty()) else {
                    continue;
                };
                writeln!(
                    out,
                    "{}\t{}\t{}\t{}",
                    id,
                    project.display_name(),
                    project.source.as_deref().unwrap_or("-"),
                    project.path.as_deref().unwrap_or("-"),
                )?;
            }
            Ok(())
        }
        CliCommand::Rows {
            search,
            sources,
            json,
        } => {
            let points = load_points(api, config.include_deleted)?;
            let sources = (!sources.is_empty()).then(|| sources.into_iter().collect::<BTreeSet<_>>());
            let rows = build_rows(&points, config.group_by, &RowFilter::new(&search, sources));
            if json {
                let summaries = rows.iter().map(RowSummary::from).collect::<Vec<_>>();
                serde_json::to_writer_pretty(&mut *out, &summaries)?;
                writeln!(out)?;
                return Ok(());
            }
            for row in &rows {
                let latest = row
                    .latest_ms()
                    .map(|ms| format_timestamp(ms, offset))
                    .unwrap_or_else(|| "-".to_string());
                writeln!(out, "{}\t{}\t{}", row.label, row.sessions.len(), latest)?;
            }
            Ok(())
        }
    }
}

/// Runs one progressive load to completion on the calling thread.
fn load_points(
    api: Arc<dyn SessionApi>,
    include_deleted: bool,
) -> Result<Vec<SessionPoint>, CliRunError> {
    let (tx, rx) = channel();
    let request = LoadRequest {
        generation: 1,
        include_deleted,
        capabilities: None,
    };
    let _handle = spawn_load(api, request, tx);
    let mut state = LoadState::begin(1);

    loop {
        let message = rx
            .recv()
            .map_err(|_| CliRunError::Load("loader stopped before finishing".to_string()))?;
        match state.accept(message, Instant::now()) {
            LoadStep::Finished(commit) => {
                debug!(
                    sessions = commit.points.len(),
                    failed = state.failed_projects,
                    "rows loaded"
                );
                return Ok(commit.points);
            }
            LoadStep::Failed(error) => return Err(CliRunError::Load(error)),
            LoadStep::Ignored
            | LoadStep::Progress
            | LoadStep::Capabilities(_)
            | LoadStep::Commit(_) => {}
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RowSummary<'a> {
    key: &'a str,
    label: &'a str,
    session_count: usize,
    latest_ms: Option<i64>,
    project_path: Option<&'a str>,
    sessions: &'a [SessionPoint],
}

impl<'a> From<&'a Row> for RowSummary<'a> {
    fn from(row: &'a Row) -> Self {
        Self {
            key: &row.key,
            label: &row.label,
            session_count: row.sessions.len(),
            latest_ms: row.latest_ms(),
            project_path: row.project_path(),
            sessions: &row.sessions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::FakeApi;
    use crate::domain::Project;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    #[test]
    fn parse_defaults_to_tui_when_no_args() {
        let parsed = parse_invocation(&args(&["sessionline"])).expect("parse");
        assert_eq!(
            parsed,
            CliInvocation::Tui {
                overrides: ConfigOverrides::default()
            }
        );
    }

    #[test]
    fn parse_help_flag_wins() {
        let parsed = parse_invocation(&args(&["sessionline", "rows", "--help"])).expect("parse");
        assert_eq!(parsed, CliInvocation::PrintHelp);
        let parsed = parse_invocation(&args(&["sessionline", "-V"])).expect("parse");
        assert_eq!(parsed, CliInvocation::PrintVersion);
    }

    #[test]
    fn parse_global_flags_apply_to_tui() {
        let parsed = parse_invocation(&args(&[
            "sessionline",
            "--url",
            "http://localhost:4000",
            "--group-by",
            "source",
            "--include-deleted",
        ]))
        .expect("parse");
        assert_eq!(
            parsed,
            CliInvocation::Tui {
                overrides: ConfigOverrides {
                    base_url: Some("http://localhost:4000".to_string()),
                    group_by: Some(GroupBy::Source),
                    include_deleted: Some(true),
                }
            }
        );
    }

    #[test]
    fn parse_rows_flags() {
        let parsed = parse_invocation(&args(&[
            "sessionline",
            "rows",
            "--group-by",
            "source",
            "--search",
            "api",
            "--source",
            "Claude Code",
            "--source",
            "codex_cli",
            "--json",
        ]))
        .expect("parse");
        assert_eq!(
            parsed,
            CliInvocation::Command {
                overrides: ConfigOverrides {
                    group_by: Some(GroupBy::Source),
                    ..ConfigOverrides::default()
                },
                command: CliCommand::Rows {
                    search: "api".to_string(),
                    sources: vec!["claude".to_string(), "codex".to_string()],
                    json: true,
                },
            }
        );
    }

    #[test]
    fn parse_errors() {
        assert_eq!(
            parse_invocation(&args(&["sessionline", "nope"])),
            Err(CliParseError::UnknownSubcommand("nope".to_string()))
        );
        assert_eq!(
            parse_invocation(&args(&["sessionline", "--bogus"])),
            Err(CliParseError::UnknownFlag("--bogus".to_string()))
        );
        assert_eq!(
            parse_invocation(&args(&["sessionline", "rows", "--search"])),
            Err(CliParseError::MissingFlagValue("--search".to_string()))
        );
        assert_eq!(
            parse_invocation(&args(&["sessionline", "--group-by", "day"])),
            Err(CliParseError::InvalidFlagValue {
                flag: "--group-by".to_string(),
                value: "day".to_string(),
            })
        );
        assert_eq!(
            parse_invocation(&args(&["sessionline", "rows", "--source", "  "])),
            Err(CliParseError::InvalidFlagValue {
                flag: "--source".to_string(),
                value: "  ".to_string(),
            })
        );
        assert_eq!(
            parse_invocation(&args(&["sessionline", "projects", "extra"])),
            Err(CliParseError::UnexpectedArgument("extra".to_string()))
        );
    }

    fn run_to_string(command: CliCommand, config: &TimelineConfig, api: FakeApi) -> String {
        let mut out = Vec::new();
        run_with(command, config, Arc::new(api), UtcOffset::UTC, &mut out).expect("run");
        String::from_utf8(out).expect("utf8")
    }

    #[test]
    fn projects_lists_tab_separated_lines() {
        let mut api = FakeApi::with_projects(2, 1);
        api.projects.push(Project {
            id: Some("gone".to_string()),
            name: "gone".to_string(),
            deleted: true,
            ..Project::default()
        });
        let output = run_to_string(CliCommand::Projects, &TimelineConfig::default(), api);
        let lines = output.lines().collect::<Vec<_>>();
        assert_eq!(
            lines,
            vec![
                "p0\tproject 0\tclaude\t/work/project-0",
                "p1\tproject 1\tcodex\t/work/project-1",
            ]
        );
    }

    #[test]
    fn rows_prints_label_count_and_latest() {
        let api = FakeApi::with_projects(2, 3);
        let command = CliCommand::Rows {
            search: String::new(),
            sources: Vec::new(),
            json: false,
        };
        let output = run_to_string(command, &TimelineConfig::default(), api);
        let lines = output.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        // Newest row first: project 1 holds hours 10..12 after 2026-01-01.
        assert_eq!(lines[0], "project 1\t3\t2026-01-01 12:00");
        assert_eq!(lines[1], "project 0\t3\t2026-01-01 02:00");
    }

    #[test]
    fn rows_json_respects_source_filter() {
        let api = FakeApi::with_projects(4, 2);
        let config = TimelineConfig {
            group_by: GroupBy::Source,
            ..TimelineConfig::default()
        };
        let command = CliCommand::Rows {
            search: String::new(),
            sources: vec!["codex".to_string()],
            json: true,
        };
        let output = run_to_string(command, &config, api);
        let value: serde_json::Value = serde_json::from_str(&output).expect("json");
        let rows = value.as_array().expect("array");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["key"], "codex");
        assert_eq!(rows[0]["sessionCount"], 4);
    }

    #[test]
    fn rows_surfaces_listing_failure() {
        let api = FakeApi {
            fail_listing: true,
            ..FakeApi::default()
        };
        let command = CliCommand::Rows {
            search: String::new(),
            sources: Vec::new(),
            json: false,
        };
        let result = run_with(
            command,
            &TimelineConfig::default(),
            Arc::new(api),
            UtcOffset::UTC,
            &mut Vec::new(),
        );
        assert!(matches!(result, Err(CliRunError::Load(_))));
    }
}

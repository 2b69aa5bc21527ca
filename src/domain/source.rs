use super::{Project, SessionMeta, SourceCapability};

pub const DEFAULT_SOURCE: &str = "claude";

const SOURCE_ALIASES: &[(&str, &str)] = &[
    ("claude-code", "claude"),
    ("claudecode", "claude"),
    ("codex-cli", "codex"),
    ("gemini-cli", "gemini"),
    ("open-code", "opencode"),
];

pub fn normalize_source_name(value: &str) -> Option<String> {
    let normalized: String = value
        .trim()
        .chars()
        .map(|ch| match ch {
            '_' | ' ' => '-',
            other => other.to_ascii_lowercase(),
        })
        .collect();
    if normalized.is_empty() {
        return None;
    }

    let canonical = SOURCE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == normalized)
        .map(|(_, canonical)| (*canonical).to_string());
    Some(canonical.unwrap_or(normalized))
}

pub fn source_display_name(source: &str) -> String {
    match source {
        "claude" => "Claude".to_string(),
        "codex" => "Codex".to_string(),
        "gemini" => "Gemini".to_string(),
        "opencode" => "OpenCode".to_string(),
        "cursor" => "Cursor".to_string(),
        "copilot" => "Copilot".to_string(),
        other => {
            let mut chars = other.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        }
    }
}

/// Picks the normalized source for a fetched session.
///
/// Explicit names win; otherwise the on-disk location is matched against the known
/// capabilities, preferring the longest base path.
pub fn resolve_source(
    session: &SessionMeta,
    project: &Project,
    capabilities: &[SourceCapability],
    source_hint: Option<&str>,
) -> String {
    if let Some(name) = session
        .source
        .as_deref()
        .or(project.source.as_deref())
        .and_then(normalize_source_name)
    {
        return name;
    }

    let locations = [
        session.full_path.as_deref(),
        project.source_base_path.as_deref(),
        project.path.as_deref(),
    ];
    for location in locations.into_iter().flatten() {
        if let Some(name) = match_capability(location, capabilities, source_hint) {
            return name;
        }
    }

    DEFAULT_SOURCE.to_string()
}

fn match_capability(
    location: &str,
    capabilities: &[SourceCapability],
    source_hint: Option<&str>,
) -> Option<String> {
    let location = normalize_path(location);
    let longest = capabilities
        .iter()
        .map(|capability| normalize_path(&capability.base_path))
        .filter(|base| !base.is_empty() && path_has_prefix(&location, base))
        .map(|base| base.len())
        .max()?;

    let mut candidates: Vec<&SourceCapability> = capabilities
        .iter()
        .filter(|capability| normalize_path(&capability.base_path).len() == longest)
        .filter(|capability| path_has_prefix(&location, &normalize_path(&capability.base_path)))
        .collect();
    candidates.sort_by(|a, b| a.name.cmp(&b.name));

    let hint = source_hint.and_then(normalize_source_name);
    let chosen = hint
        .as_deref()
        .and_then(|hint| {
            candidates
                .iter()
                .find(|capability| normalize_source_name(&capability.name).as_deref() == Some(hint))
        })
        .or_else(|| candidates.iter().find(|capability| capability.can_resume))
        .or_else(|| candidates.first())?;

    normalize_source_name(&chosen.name)
}

fn normalize_path(path: &str) -> String {
    path.trim().replace('\\', "/").trim_end_matches('/').to_string()
}

fn path_has_prefix(path: &str, base: &str) -> bool {
    path == base
        || path
            .strip_prefix(base)
            .is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capability(name: &str, base_path: &str, can_resume: bool) -> SourceCapability {
        SourceCapability {
            name: name.to_string(),
            base_path: base_path.to_string(),
            can_resume,
        }
    }

    fn session_at(path: &str) -> SessionMeta {
        SessionMeta {
            id: "s1".to_string(),
            full_path: Some(path.to_string()),
            ..SessionMeta::default()
        }
    }

    #[test]
    fn explicit_source_is_normalized() {
        let session = SessionMeta {
            id: "s1".to_string(),
            source: Some(" Claude_Code ".to_string()),
            ..SessionMeta::default()
        };
        assert_eq!(
            resolve_source(&session, &Project::default(), &[], None),
            "claude"
        );
    }

    #[test]
    fn project_source_used_when_session_has_none() {
        let project = Project {
            source: Some("Codex".to_string()),
            ..Project::default()
        };
        assert_eq!(
            resolve_source(&session_at("/x/y.jsonl"), &project, &[], None),
            "codex"
        );
    }

    #[test]
    fn longest_base_path_wins() {
        let capabilities = [
            capability("generic", "/home/me", false),
            capability("gemini", "/home/me/.gemini/tmp", false),
        ];
        let session = session_at("/home/me/.gemini/tmp/abc/chat.json");
        assert_eq!(
            resolve_source(&session, &Project::default(), &capabilities, None),
            "gemini"
        );
    }

    #[test]
    fn shared_layout_prefers_hint_then_resumable() {
        let capabilities = [
            capability("mirror", "/data/projects", false),
            capability("claude", "/data/projects/", true),
        ];
        let session = session_at("/data/projects/app/s1.jsonl");
        assert_eq!(
            resolve_source(&session, &Project::default(), &capabilities, Some("mirror")),
            "mirror"
        );
        assert_eq!(
            resolve_source(&session, &Project::default(), &capabilities, None),
            "claude"
        );
    }

    #[test]
    fn prefix_match_respects_segment_boundaries() {
        let capabilities = [capability("codex", "/home/me/.codex", false)];
        let session = session_at("/home/me/.codex-backup/s.jsonl");
        assert_eq!(
            resolve_source(&session, &Project::default(), &capabilities, None),
            DEFAULT_SOURCE
        );
    }

    #[test]
    fn display_names_capitalize_unknown_sources() {
        assert_eq!(source_display_name("opencode"), "OpenCode");
        assert_eq!(source_display_name("aider"), "Aider");
    }
}

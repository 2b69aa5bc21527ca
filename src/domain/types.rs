use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    Project,
    Source,
}

impl GroupBy {
    pub fn toggle(self) -> Self {
        match self {
            Self::Project => Self::Source,
            Self::Source => Self::Project,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Project => "Project",
            Self::Source => "Source",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "project" | "projects" => Some(Self::Project),
            "source" | "sources" => Some(Self::Source),
            _ => None,
        }
    }
}

/// A project as returned by the project listing endpoint.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub source_base_path: Option<String>,
    #[serde(default)]
    pub deleted: bool,
}

impl Project {
    /// Display name: the listed name, else the last path segment, else the id.
    pub fn display_name(&self) -> String {
        let name = self.name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
        if let Some(segment) = self
            .path
            .as_deref()
            .and_then(|path| path.trim_end_matches(['/', '\\']).rsplit(['/', '\\']).next())
            .filter(|segment| !segment.is_empty())
        {
            return segment.to_string();
        }
        self.id.clone().unwrap_or_else(|| "(unnamed)".to_string())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMeta {
    pub id: String,
    #[serde(default)]
    pub first_prompt: Option<String>,
    #[serde(default)]
    pub full_path: Option<String>,
    #[serde(default)]
    pub modified_at: Option<Value>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceCapability {
    pub name: String,
    #[serde(default)]
    pub base_path: String,
    #[serde(default)]
    pub can_resume: bool,
}

/// One plotted session. Immutable once built by the loader.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPoint {
    pub session_id: String,
    pub project_id: String,
    pub project_name: String,
    pub project_path: Option<String>,
    pub source: String,
    pub timestamp_ms: i64,
    pub title: Option<String>,
}

impl SessionPoint {
    /// Builds a point from a fetched session; sessions without a usable
    /// modification time yield `None`.
    pub fn from_meta(project: &Project, meta: &SessionMeta, source: String) -> Option<Self> {
        let project_id = project.id.clone()?;
        let timestamp_ms = meta.modified_at.as_ref().and_then(parse_modified_at)?;
        let title = meta
            .first_prompt
            .as_deref()
            .and_then(first_non_empty_line)
            .map(str::to_string);

        Some(Self {
            session_id: meta.id.clone(),
            project_id,
            project_name: project.display_name(),
            project_path: project.path.clone(),
            source,
            timestamp_ms,
            title,
        })
    }

    pub fn matches_query(&self, query: &str) -> bool {
        if query.is_empty() {
            return true;
        }
        let contains = |text: &str| text.to_lowercase().contains(query);
        contains(&self.project_name)
            || contains(&self.source)
            || contains(&self.session_id)
            || self.project_path.as_deref().is_some_and(contains)
            || self.title.as_deref().is_some_and(contains)
    }
}

/// Accepts RFC 3339 text or epoch milliseconds (number or numeric string).
pub fn parse_modified_at(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|v| v.is_finite()).map(|v| v as i64))
            .filter(|ms| is_representable_epoch_ms(*ms)),
        Value::String(text) => {
            let trimmed = text.trim();
            if let Ok(ms) = trimmed.parse::<i64>() {
                return Some(ms).filter(|ms| is_representable_epoch_ms(*ms));
            }
            parse_rfc3339_to_unix_ms(trimmed)
        }
        _ => None,
    }
}

/// Positive and inside the calendar range `OffsetDateTime` can hold.
fn is_representable_epoch_ms(ms: i64) -> bool {
    ms > 0 && OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).is_ok()
}

pub fn parse_rfc3339_to_unix_ms(value: &str) -> Option<i64> {
    let timestamp = OffsetDateTime::parse(value, &Rfc3339).ok()?;
    let ms: i128 = timestamp.unix_timestamp_nanos() / 1_000_000;
    i64::try_from(ms).ok()
}

fn first_non_empty_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|line| !line.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> Project {
        Project {
            id: Some("p1".to_string()),
            name: String::new(),
            path: Some("/home/me/work/alpha/".to_string()),
            ..Project::default()
        }
    }

    #[test]
    fn parses_modified_at_variants() {
        assert_eq!(
            parse_modified_at(&serde_json::json!("2026-02-01T10:00:00Z")),
            Some(1_769_940_000_000)
        );
        assert_eq!(
            parse_modified_at(&serde_json::json!(1_769_940_000_000i64)),
            Some(1_769_940_000_000)
        );
        assert_eq!(
            parse_modified_at(&serde_json::json!("1769940000000")),
            Some(1_769_940_000_000)
        );
        assert_eq!(parse_modified_at(&serde_json::json!("yesterday")), None);
        assert_eq!(parse_modified_at(&serde_json::json!(null)), None);
    }

    #[test]
    fn rejects_epochs_outside_calendar_range() {
        assert_eq!(parse_modified_at(&serde_json::json!(i64::MAX - 10)), None);
        assert_eq!(parse_modified_at(&serde_json::json!("9223372036854775797")), None);
        assert_eq!(parse_modified_at(&serde_json::json!(1e300)), None);
        assert_eq!(parse_modified_at(&serde_json::json!(-5)), None);
        // 9999-12-31T23:59:59Z is still accepted.
        assert_eq!(
            parse_modified_at(&serde_json::json!(253_402_300_799_000i64)),
            Some(253_402_300_799_000)
        );
    }

    #[test]
    fn session_without_timestamp_is_discarded() {
        let meta = SessionMeta {
            id: "s1".to_string(),
            modified_at: None,
            ..SessionMeta::default()
        };
        assert_eq!(
            SessionPoint::from_meta(&project(), &meta, "claude".to_string()),
            None
        );
    }

    #[test]
    fn point_uses_path_segment_when_name_missing() {
        let meta = SessionMeta {
            id: "s1".to_string(),
            first_prompt: Some("\n  fix the build\nplease".to_string()),
            modified_at: Some(serde_json::json!("2026-02-01T10:00:00Z")),
            ..SessionMeta::default()
        };
        let point = SessionPoint::from_meta(&project(), &meta, "claude".to_string())
            .expect("point is built");
        assert_eq!(point.project_name, "alpha");
        assert_eq!(point.title.as_deref(), Some("fix the build"));
        assert!(point.matches_query("build"));
        assert!(point.matches_query("alpha"));
        assert!(!point.matches_query("gamma"));
    }

    #[test]
    fn project_json_uses_camel_case() {
        let project: Project = serde_json::from_value(serde_json::json!({
            "id": "p1",
            "name": "Alpha",
            "sourceBasePath": "/home/me/.claude/projects"
        }))
        .expect("project parses");
        assert_eq!(
            project.source_base_path.as_deref(),
            Some("/home/me/.claude/projects")
        );
        assert!(!project.deleted);
    }
}

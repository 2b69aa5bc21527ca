use super::{GroupBy, RowColor, SessionPoint, hashed_color, source_color, source_display_name};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RowFilter {
    query: String,
    sources: Option<BTreeSet<String>>,
}

impl RowFilter {
    pub fn new(query: &str, sources: Option<BTreeSet<String>>) -> Self {
        Self {
            query: query.trim().to_lowercase(),
            sources,
        }
    }

    pub fn sources(&self) -> Option<&BTreeSet<String>> {
        self.sources.as_ref()
    }

    pub fn is_active(&self) -> bool {
        !self.query.is_empty() || self.sources.is_some()
    }

    pub fn accepts(&self, point: &SessionPoint) -> bool {
        if let Some(sources) = &self.sources {
            if !sources.contains(&point.source) {
                return false;
            }
        }
        point.matches_query(&self.query)
    }
}

/// One lane (project mode) or column (source mode).
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub key: String,
    pub label: String,
    pub color: RowColor,
    /// Ascending by `timestamp_ms`; equal timestamps keep insertion order.
    pub sessions: Vec<SessionPoint>,
}

impl Row {
    pub fn latest_ms(&self) -> Option<i64> {
        self.sessions.last().map(|session| session.timestamp_ms)
    }

    pub fn project_path(&self) -> Option<&str> {
        self.sessions
            .iter()
            .rev()
            .find_map(|session| session.project_path.as_deref())
    }
}

/// Rebuilds every row from scratch: filter, group, sort sessions ascending, sort rows by
/// recency descending with the label as tie-break.
pub fn build_rows(points: &[SessionPoint], group_by: GroupBy, filter: &RowFilter) -> Vec<Row> {
    let mut rows: Vec<Row> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for point in points.iter().filter(|point| filter.accepts(point)) {
        let key = match group_by {
            GroupBy::Project => point.project_id.as_str(),
            GroupBy::Source => point.source.as_str(),
        };
        let index = *positions.entry(key).or_insert_with(|| {
            rows.push(new_row(point, group_by));
            rows.len() - 1
        });
        rows[index].sessions.push(point.clone());
    }

    for row in &mut rows {
        row.sessions.sort_by_key(|session| session.timestamp_ms);
    }
    rows.sort_by(compare_rows);
    rows
}

fn new_row(point: &SessionPoint, group_by: GroupBy) -> Row {
    match group_by {
        GroupBy::Project => Row {
            key: point.project_id.clone(),
            label: point.project_name.clone(),
            color: hashed_color(&point.project_id),
            sessions: Vec::new(),
        },
        GroupBy::Source => Row {
            key: point.source.clone(),
            label: source_display_name(&point.source),
            color: source_color(&point.source),
            sessions: Vec::new(),
        },
    }
}

fn compare_rows(a: &Row, b: &Row) -> Ordering {
    b.latest_ms()
        .cmp(&a.latest_ms())
        .then_with(|| a.label.cmp(&b.label))
}

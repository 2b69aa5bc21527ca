mod scene;
mod theme;

pub use scene::format_timestamp;

use crate::app::{NavigationPhase, ScreenLayout, TimelineModel, cell_scroll};
use crate::domain::{COLUMN_WIDTH, LANE_HEIGHT, SessionPoint, TimelineLayout, source_display_name};
use ratatui::buffer::Buffer;
use ratatui::prelude::*;
use ratatui::widgets::*;
use scene::{Marker, Scene, format_scale};
use std::ops::Range;
use std::time::Instant;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const MARKER: char = '●';
const MARKER_HOVERED: char = '◉';
const TOOLTIP_TITLE_WIDTH: usize = 48;

pub fn render(frame: &mut Frame, model: &TimelineModel) {
    let area = frame.area();
    if area.width == 0 || area.height == 0 {
        return;
    }
    frame.render_widget(
        Block::default().style(Style::default().bg(theme::BG).fg(theme::FG)),
        area,
    );

    let screen = model.screen;
    render_header(frame, screen.header, model);
    render_footer(frame, screen.footer, model);

    let body = Rect::new(
        area.x,
        screen.header.bottom(),
        area.width,
        screen.footer.y.saturating_sub(screen.header.bottom()),
    );

    if let Some(error) = &model.error {
        render_error(frame, body, error);
    } else if let Some(layout) = &model.layout {
        let scene = Scene::build(
            &model.rows,
            layout,
            model.scroll,
            model.hover,
            model.display_offset,
        );
        let scroll = cell_scroll(model.scroll);
        let buf = frame.buffer_mut();
        render_corner(buf, &screen, model);
        render_axis(buf, &screen, layout, &scene, scroll);
        render_labels(buf, &screen, layout, &scene, model.label_offset.round() as i64);
        render_chart(buf, screen.chart, layout, &scene, scroll);

        if let (Some(point), Some(marker)) = (
            model.hovered_point(),
            scene.markers.iter().find(|marker| marker.hovered),
        ) {
            render_tooltip(frame, screen.chart, point, marker, scroll, model);
        }
    } else {
        render_empty(frame, body, model);
    }

    if let Some(point) = &model.detail {
        render_detail_overlay(frame, body, point, model);
    }
}

fn render_header(frame: &mut Frame, area: Rect, model: &TimelineModel) {
    let load = &model.load;
    let progress = match load.total_projects {
        Some(total) => format!("{}/{} projects", load.fetched_projects, total),
        None => "listing projects".to_string(),
    };
    let status = if model.error.is_some() {
        Span::styled(" failed ", Style::default().fg(theme::ERROR))
    } else if load.loading {
        Span::styled(" loading ", Style::default().fg(theme::ACCENT))
    } else {
        Span::styled(" ready ", Style::default().fg(theme::SUCCESS))
    };
    let following = match model.nav.phase(Instant::now(), load.loading) {
        NavigationPhase::NotAligned | NavigationPhase::AutoFollowing => "following latest",
        NavigationPhase::Settled => "latest",
        NavigationPhase::UserControlled => "manual",
    };

    let mut spans = vec![
        Span::styled(
            " sessionline ",
            Style::default()
                .fg(theme::ACCENT)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("│ by {} ", model.group_by.label().to_lowercase()),
            Style::default().fg(theme::FG),
        ),
        Span::styled("│", Style::default().fg(theme::BORDER)),
        status,
        Span::styled(
            format!(
                "│ {progress} │ {} sessions │ {} │ {following} ",
                model.session_count(),
                format_scale(model.zoom.ms_per_pixel())
            ),
            Style::default().fg(theme::MUTED),
        ),
    ];
    if !model.search_text.is_empty() {
        spans.push(Span::styled(
            format!("│ /{} ", model.search_text),
            Style::default().fg(theme::ACCENT),
        ));
    }
    if let Some(sources) = model.filter.sources() {
        let names: Vec<&str> = sources.iter().map(String::as_str).collect();
        spans.push(Span::styled(
            format!("│ source: {} ", names.join(",")),
            Style::default().fg(theme::ACCENT),
        ));
    }
    if model.include_deleted {
        spans.push(Span::styled("│ +deleted ", Style::default().fg(theme::DIM)));
    }

    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(theme::BAR_BG)),
        area,
    );
}

fn render_footer(frame: &mut Frame, area: Rect, model: &TimelineModel) {
    let line = if let Some(search) = &model.search {
        Line::from(vec![
            Span::styled(" / ", Style::default().fg(theme::ACCENT)),
            Span::styled(search.text().to_string(), Style::default().fg(theme::FG)),
            Span::styled(
                "  Enter apply · Esc cancel",
                Style::default().fg(theme::DIM),
            ),
        ])
    } else if let Some(notice) = &model.notice {
        Line::from(Span::styled(
            format!(" {notice}"),
            Style::default().fg(theme::ACCENT),
        ))
    } else {
        Line::from(Span::styled(
            " q quit · g group · / search · s source · d deleted · r refresh · +/-/0 zoom · 1/7/a presets · arrows pan · Home/End",
            Style::default().fg(theme::DIM),
        ))
    };
    frame.render_widget(
        Paragraph::new(line).style(Style::default().bg(theme::BAR_BG)),
        area,
    );

    if let Some(search) = &model.search {
        let prefix = UnicodeWidthStr::width(" / ");
        let typed: String = search.text().chars().take(search.cursor()).collect();
        let column = area.x as usize + prefix + UnicodeWidthStr::width(typed.as_str());
        if column < area.right() as usize {
            frame.set_cursor_position(Position::new(column as u16, area.y));
        }
    }
}

fn render_corner(buf: &mut Buffer, screen: &ScreenLayout, model: &TimelineModel) {
    let corner = screen.corner;
    if corner.width == 0 || corner.height == 0 {
        return;
    }
    let text = format!("{} {}s", model.rows.len(), model.group_by.label().to_lowercase());
    put_clipped(
        buf,
        corner,
        i64::from(corner.x) + 1,
        corner.y,
        &text,
        Style::default().fg(theme::MUTED),
    );
}

fn render_axis(
    buf: &mut Buffer,
    screen: &ScreenLayout,
    layout: &TimelineLayout,
    scene: &Scene,
    scroll: (i64, i64),
) {
    let axis = screen.axis;
    if axis.width == 0 || axis.height == 0 {
        return;
    }
    let label_style = Style::default().fg(theme::MUTED);
    let rule_style = Style::default().fg(theme::BORDER);

    match layout {
        TimelineLayout::Horizontal(_) => {
            let rule_row = axis.bottom() - 1;
            for x in axis.left()..axis.right() {
                buf[(x, rule_row)].set_char('─').set_style(rule_style);
            }
            for tick in &scene.ticks {
                let column = tick.px.round() as i64 - scroll.0;
                if let Some(x) = offset_in(axis.x, axis.width, column) {
                    buf[(x, rule_row)].set_char('┬').set_style(rule_style);
                }
                let text = format!("{} {}", tick.date, tick.clock);
                put_clipped(buf, axis, i64::from(axis.x) + column, axis.y, &text, label_style);
            }
        }
        TimelineLayout::Vertical(_) => {
            let rule_column = axis.right() - 1;
            for y in axis.top()..axis.bottom() {
                buf[(rule_column, y)].set_char('│').set_style(rule_style);
            }
            let text_area = Rect {
                width: axis.width.saturating_sub(1),
                ..axis
            };
            for tick in &scene.ticks {
                let row = tick.px.round() as i64 - scroll.1;
                let Some(y) = offset_in(axis.y, axis.height, row) else {
                    continue;
                };
                buf[(rule_column, y)].set_char('┤').set_style(rule_style);
                put_clipped(buf, text_area, i64::from(axis.x), y, &tick.date, label_style);
                if let Some(next) = offset_in(axis.y, axis.height, row + 1) {
                    put_clipped(buf, text_area, i64::from(axis.x), next, &tick.clock, label_style);
                }
            }
        }
    }
}

/// Floating labels: a fixed column that tracks vertical scroll (project mode) or a header strip
/// that tracks horizontal scroll (source mode).
fn render_labels(
    buf: &mut Buffer,
    screen: &ScreenLayout,
    layout: &TimelineLayout,
    scene: &Scene,
    label_offset: i64,
) {
    let labels = screen.labels;
    if labels.width == 0 || labels.height == 0 {
        return;
    }
    for label in &scene.labels {
        let color = theme::row_color(label.color);
        match layout {
            TimelineLayout::Horizontal(_) => {
                let center = (label.cross_px + LANE_HEIGHT / 2.0).floor() as i64 - label_offset;
                let Some(y) = offset_in(labels.y, labels.height, center) else {
                    continue;
                };
                let text = truncate_end(&label.text, labels.width.saturating_sub(3) as usize);
                buf[(labels.x, y)].set_char(MARKER).set_fg(color);
                put_clipped(
                    buf,
                    labels,
                    i64::from(labels.x) + 2,
                    y,
                    &text,
                    Style::default().fg(theme::FG),
                );
            }
            TimelineLayout::Vertical(_) => {
                let start = label.cross_px.round() as i64 - label_offset;
                let text = truncate_end(&label.text, (COLUMN_WIDTH as usize).saturating_sub(1));
                put_clipped(
                    buf,
                    labels,
                    i64::from(labels.x) + start,
                    labels.y,
                    &text,
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                );
            }
        }
    }
}

fn render_chart(
    buf: &mut Buffer,
    chart: Rect,
    layout: &TimelineLayout,
    scene: &Scene,
    scroll: (i64, i64),
) {
    if chart.width == 0 || chart.height == 0 {
        return;
    }
    let horizontal = matches!(layout, TimelineLayout::Horizontal(_));

    for baseline in &scene.baselines {
        let style = Style::default().fg(theme::faint(baseline.color, 0.2));
        if horizontal {
            let row = baseline.cross_px.round() as i64 - scroll.1;
            if let Some(y) = offset_in(chart.y, chart.height, row) {
                for x in chart.left()..chart.right() {
                    buf[(x, y)].set_char('─').set_style(style);
                }
            }
        } else {
            let column = baseline.cross_px.round() as i64 - scroll.0;
            if let Some(x) = offset_in(chart.x, chart.width, column) {
                for y in chart.top()..chart.bottom() {
                    buf[(x, y)].set_char('│').set_style(style);
                }
            }
        }
    }

    for connector in &scene.connectors {
        let style = Style::default().fg(theme::faint(connector.color, 0.55));
        if horizontal {
            let row = connector.from.1.round() as i64 - scroll.1;
            let Some(y) = offset_in(chart.y, chart.height, row) else {
                continue;
            };
            let (a, b) = ordered(connector.from.0, connector.to.0);
            for column in visible_between(a, b, scroll.0, chart.width) {
                if let Some(x) = offset_in(chart.x, chart.width, column - scroll.0) {
                    buf[(x, y)].set_char('━').set_style(style);
                }
            }
        } else {
            let column = connector.from.0.round() as i64 - scroll.0;
            let Some(x) = offset_in(chart.x, chart.width, column) else {
                continue;
            };
            let (a, b) = ordered(connector.from.1, connector.to.1);
            for row in visible_between(a, b, scroll.1, chart.height) {
                if let Some(y) = offset_in(chart.y, chart.height, row - scroll.1) {
                    buf[(x, y)].set_char('┃').set_style(style);
                }
            }
        }
    }

    for marker in &scene.markers {
        let Some((x, y)) = marker_cell(chart, marker, scroll) else {
            continue;
        };
        let cell = &mut buf[(x, y)];
        if marker.hovered {
            cell.set_char(MARKER_HOVERED)
                .set_fg(theme::row_color(marker.color))
                .set_bg(theme::ACCENT_BG)
                .set_style(Style::default().add_modifier(Modifier::BOLD));
        } else {
            cell.set_char(MARKER).set_fg(theme::row_color(marker.color));
        }
    }
}

fn marker_cell(chart: Rect, marker: &Marker, scroll: (i64, i64)) -> Option<(u16, u16)> {
    let x = offset_in(chart.x, chart.width, marker.x.round() as i64 - scroll.0)?;
    let y = offset_in(chart.y, chart.height, marker.y.round() as i64 - scroll.1)?;
    Some((x, y))
}

fn render_tooltip(
    frame: &mut Frame,
    chart: Rect,
    point: &SessionPoint,
    marker: &Marker,
    scroll: (i64, i64),
    model: &TimelineModel,
) {
    let Some((x, y)) = marker_cell(chart, marker, scroll) else {
        return;
    };
    let mut lines = vec![
        Line::from(Span::styled(
            point.project_name.clone(),
            Style::default().fg(theme::FG).add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            source_display_name(&point.source),
            Style::default().fg(theme::row_color(marker.color)),
        )),
    ];
    if let Some(title) = &point.title {
        lines.push(Line::from(Span::styled(
            truncate_end(title, TOOLTIP_TITLE_WIDTH),
            Style::default().fg(theme::MUTED),
        )));
    }
    lines.push(Line::from(Span::styled(
        format_timestamp(point.timestamp_ms, model.display_offset),
        Style::default().fg(theme::DIM),
    )));

    let content_width = lines.iter().map(Line::width).max().unwrap_or(0) as u16;
    let width = (content_width + 4).min(chart.width);
    let height = (lines.len() as u16 + 2).min(chart.height);
    let left = if x + 2 + width <= chart.right() {
        x + 2
    } else {
        x.saturating_sub(width + 1).max(chart.x)
    };
    let top = if y + 1 + height <= chart.bottom() {
        y + 1
    } else {
        y.saturating_sub(height).max(chart.y)
    };
    let popup = Rect::new(left, top, width, height);

    frame.render_widget(Clear, popup);
    frame.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme::BORDER))
                .style(Style::default().bg(theme::SURFACE))
                .padding(Padding::horizontal(1)),
        ),
        popup,
    );
}

fn render_detail_overlay(frame: &mut Frame, area: Rect, point: &SessionPoint, model: &TimelineModel) {
    let popup = centered_rect(70, 60, area);
    frame.render_widget(Clear, popup);

    let field = |name: &str, value: String| {
        Line::from(vec![
            Span::styled(format!("{name:<9}"), Style::default().fg(theme::DIM)),
            Span::styled(value, Style::default().fg(theme::FG)),
        ])
    };
    let mut lines = vec![
        field("Session", point.session_id.clone()),
        field("Project", point.project_name.clone()),
        field(
            "Path",
            point.project_path.clone().unwrap_or_else(|| "-".to_string()),
        ),
        field("Source", source_display_name(&point.source)),
        field(
            "Modified",
            format_timestamp(point.timestamp_ms, model.display_offset),
        ),
        Line::from(""),
    ];
    if let Some(title) = &point.title {
        lines.push(Line::from(Span::styled(
            title.clone(),
            Style::default().fg(theme::MUTED),
        )));
        lines.push(Line::from(""));
    }
    lines.push(Line::from(Span::styled(
        "Enter/Esc close",
        Style::default().fg(theme::DIM),
    )));

    frame.render_widget(
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(
                Block::default()
                    .title(" session ")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(theme::ACCENT))
                    .style(Style::default().bg(theme::SURFACE))
                    .padding(Padding::horizontal(1)),
            ),
        popup,
    );
}

fn render_error(frame: &mut Frame, area: Rect, error: &str) {
    let area = inner_area(area);
    let paragraph = Paragraph::new(vec![
        Line::from("Failed to load projects."),
        Line::from(""),
        Line::from(Span::styled(
            format!("Error: {error}"),
            Style::default().fg(theme::ERROR),
        )),
        Line::from(""),
        Line::from("Keys: r=retry  q/Esc=quit"),
    ])
    .wrap(Wrap { trim: false })
    .block(
        Block::default()
            .title("sessionline")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme::BORDER))
            .padding(Padding::horizontal(1)),
    );

    frame.render_widget(paragraph, area);
}

fn render_empty(frame: &mut Frame, area: Rect, model: &TimelineModel) {
    let text = if model.load.loading {
        match model.load.total_projects {
            Some(total) => format!(
                "Loading sessions… {}/{} projects",
                model.load.fetched_projects, total
            ),
            None => "Loading projects…".to_string(),
        }
    } else if model.filter.is_active() && model.session_count() > 0 {
        "No sessions match the current filter.".to_string()
    } else {
        "No sessions found.".to_string()
    };
    let top = area.y + area.height / 2;
    let line_area = Rect::new(area.x, top.min(area.bottom().saturating_sub(1)), area.width, 1);
    frame.render_widget(
        Paragraph::new(text)
            .alignment(Alignment::Center)
            .style(Style::default().fg(theme::MUTED)),
        line_area,
    );
}

/// Writes `text` starting at content column `column`, dropping whatever falls outside `area`.
fn put_clipped(buf: &mut Buffer, area: Rect, column: i64, row: u16, text: &str, style: Style) {
    if row < area.top() || row >= area.bottom() {
        return;
    }
    let mut x = column;
    for ch in text.chars() {
        let width = UnicodeWidthChar::width(ch).unwrap_or(0) as i64;
        if width == 0 {
            continue;
        }
        if x >= i64::from(area.right()) {
            break;
        }
        if x >= i64::from(area.left()) && x + width <= i64::from(area.right()) {
            buf[(x as u16, row)].set_char(ch).set_style(style);
        }
        x += width;
    }
}

/// Screen coordinate for an offset inside a span starting at `start`, if visible.
fn offset_in(start: u16, len: u16, offset: i64) -> Option<u16> {
    (offset >= 0 && offset < i64::from(len)).then(|| start + offset as u16)
}

fn ordered(a: f64, b: f64) -> (i64, i64) {
    let (a, b) = (a.round() as i64, b.round() as i64);
    if a <= b { (a, b) } else { (b, a) }
}

/// Content cells strictly between `a` and `b` that fall inside `[scroll, scroll + len)`.
fn visible_between(a: i64, b: i64, scroll: i64, len: u16) -> Range<i64> {
    let start = a.saturating_add(1).max(scroll);
    let end = b.min(scroll.saturating_add(i64::from(len)));
    start..end.max(start)
}

fn truncate_end(text: &str, max_width: usize) -> String {
    if max_width == 0 {
        return String::new();
    }
    if UnicodeWidthStr::width(text) <= max_width {
        return text.to_string();
    }
    let available = max_width.saturating_sub(1);
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let width = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + width > available {
            break;
        }
        used += width;
        out.push(ch);
    }
    out.push('…');
    out
}

fn inner_area(area: Rect) -> Rect {
    if area.width < 40 || area.height < 12 {
        return area;
    }
    area.inner(Margin {
        vertical: 1,
        horizontal: 2,
    })
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

//! Custom TUI widgets

use crate::classifier::ActionKind;
use crate::ui::{Dashboard, ThemeColors};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Modifier, Style},
    symbols::border,
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

fn panel<'a>(title: &'a str, colors: &ThemeColors) -> Block<'a> {
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_set(border::ROUNDED)
        .border_style(Style::default().fg(colors.dim))
}

fn kind_color(kind: ActionKind, colors: &ThemeColors) -> ratatui::style::Color {
    match kind {
        ActionKind::Single => colors.green,
        ActionKind::Double => colors.cyan,
        ActionKind::Long => colors.yellow,
    }
}

/// Keys held down and pulses currently on
pub struct HeldKeysPanel<'a> {
    dashboard: &'a Dashboard,
}

impl<'a> HeldKeysPanel<'a> {
    pub fn new(dashboard: &'a Dashboard) -> Self {
        Self { dashboard }
    }
}

impl<'a> Widget for HeldKeysPanel<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let colors = self.dashboard.colors;
        let block = panel(" Held ", &colors);
        let inner = block.inner(area);
        block.render(area, buf);

        let mut spans = Vec::new();
        for key in self.dashboard.held() {
            spans.push(Span::styled(
                format!(" {} ", key),
                Style::default()
                    .fg(colors.key_text_on)
                    .bg(colors.key_on)
                    .add_modifier(Modifier::BOLD),
            ));
            spans.push(Span::raw(" "));
        }
        if spans.is_empty() {
            spans.push(Span::styled("(none)", Style::default().fg(colors.dim)));
        }
        buf.set_line(inner.x, inner.y, &Line::from(spans), inner.width);

        if inner.height < 2 {
            return;
        }
        let mut lit = vec![Span::styled("ON: ", Style::default().fg(colors.dim))];
        for (key, kind) in self.dashboard.lit() {
            lit.push(Span::styled(
                format!("{}:{} ", key, kind),
                Style::default().fg(kind_color(*kind, &colors)),
            ));
        }
        buf.set_line(inner.x, inner.y + 1, &Line::from(lit), inner.width);
    }
}

/// Per-kind counters and the active thresholds
pub struct SummaryPanel<'a> {
    dashboard: &'a Dashboard,
}

impl<'a> SummaryPanel<'a> {
    pub fn new(dashboard: &'a Dashboard) -> Self {
        Self { dashboard }
    }
}

impl<'a> Widget for SummaryPanel<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let colors = self.dashboard.colors;
        let block = panel(" Summary ", &colors);
        let inner = block.inner(area);
        block.render(area, buf);

        let thresholds = self.dashboard.thresholds();
        let mut lines: Vec<Line> = ActionKind::all()
            .iter()
            .map(|&kind| {
                Line::from(vec![
                    Span::styled(
                        format!("{:<8}", kind.name()),
                        Style::default().fg(colors.fg).add_modifier(Modifier::BOLD),
                    ),
                    Span::styled(
                        self.dashboard.count(kind).to_string(),
                        Style::default().fg(kind_color(kind, &colors)),
                    ),
                ])
            })
            .collect();
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!(
                "double < {} ms, long >= {} ms",
                thresholds.double_window.as_millis(),
                thresholds.long_window.as_millis()
            ),
            Style::default().fg(colors.dim),
        )));

        for (i, line) in lines.iter().enumerate() {
            let y = inner.y + i as u16;
            if y >= inner.y + inner.height {
                break;
            }
            buf.set_line(inner.x, y, line, inner.width);
        }
    }
}

/// Most recent actions, newest first
pub struct ActionLogPanel<'a> {
    dashboard: &'a Dashboard,
}

impl<'a> ActionLogPanel<'a> {
    pub fn new(dashboard: &'a Dashboard) -> Self {
        Self { dashboard }
    }
}

impl<'a> Widget for ActionLogPanel<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let colors = self.dashboard.colors;
        let block = panel(" Actions ", &colors);
        let inner = block.inner(area);
        block.render(area, buf);

        let mut y = inner.y;
        for entry in self.dashboard.recent() {
            if y >= inner.y + inner.height {
                break;
            }

            let line = Line::from(vec![
                Span::styled(format!("{} ", entry.clock()), Style::default().fg(colors.dim)),
                Span::styled(
                    format!("{:<7}", entry.kind.name()),
                    Style::default().fg(kind_color(entry.kind, &colors)),
                ),
                Span::styled(
                    format!("{:<4}", entry.phase.payload()),
                    Style::default().fg(colors.dim),
                ),
                Span::styled(
                    entry.key.to_string(),
                    Style::default().fg(colors.fg).add_modifier(Modifier::BOLD),
                ),
            ]);
            buf.set_line(inner.x, y, &line, inner.width);
            y += 1;
        }
    }
}

/// Status bar widget
pub struct StatusBar<'a> {
    dashboard: &'a Dashboard,
}

impl<'a> StatusBar<'a> {
    pub fn new(dashboard: &'a Dashboard) -> Self {
        Self { dashboard }
    }
}

impl<'a> Widget for StatusBar<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let colors = self.dashboard.colors;
        let bg_style = Style::default().bg(colors.key_off).fg(colors.fg);
        for x in area.x..area.x + area.width {
            buf.set_string(x, area.y, " ", bg_style);
        }

        buf.set_string(
            area.x,
            area.y,
            " keypulse | q quit | r reset ",
            bg_style.add_modifier(Modifier::BOLD),
        );

        if let Some(msg) = self.dashboard.get_status() {
            let msg_style = bg_style.fg(colors.yellow);
            let msg_x = area.x + (area.width / 2).saturating_sub(msg.len() as u16 / 2);
            buf.set_string(msg_x, area.y, msg, msg_style);
        }

        let right = format!(
            " {} | Actions: {} ",
            self.dashboard.elapsed_formatted(),
            self.dashboard.total()
        );
        let right_x = area.x + area.width.saturating_sub(right.len() as u16);
        buf.set_string(right_x, area.y, &right, bg_style);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Action;
    use crate::config::Config;
    use crate::keyboard::KeyId;
    use std::time::Instant;

    fn row(buf: &Buffer, y: u16) -> String {
        (0..buf.area.width)
            .map(|x| buf[(x, y)].symbol().to_string())
            .collect()
    }

    #[test]
    fn action_log_lists_newest_first() {
        let mut dash = Dashboard::new(&Config::default());
        dash.record(&Action::on(KeyId::from("A"), ActionKind::Single, Instant::now()));
        dash.record(&Action::on(KeyId::from("B"), ActionKind::Long, Instant::now()));

        let area = Rect::new(0, 0, 40, 5);
        let mut buf = Buffer::empty(area);
        ActionLogPanel::new(&dash).render(area, &mut buf);

        assert!(row(&buf, 1).contains("long"));
        assert!(row(&buf, 1).contains('B'));
        assert!(row(&buf, 2).contains("single"));
    }

    #[test]
    fn held_panel_shows_placeholder_when_idle() {
        let dash = Dashboard::new(&Config::default());
        let area = Rect::new(0, 0, 30, 4);
        let mut buf = Buffer::empty(area);
        HeldKeysPanel::new(&dash).render(area, &mut buf);

        assert!(row(&buf, 1).contains("(none)"));
    }

    #[test]
    fn summary_shows_thresholds() {
        let dash = Dashboard::new(&Config::default());
        let area = Rect::new(0, 0, 40, 8);
        let mut buf = Buffer::empty(area);
        SummaryPanel::new(&dash).render(area, &mut buf);

        assert!(row(&buf, 5).contains("double < 250 ms, long >= 500 ms"));
    }
}

use std::time::Duration;

use ratatui::{
    Frame,
    layout::{Constraint, Flex, Layout, Rect},
    style::{Color, Style, Stylize},
    symbols::border,
    text::{Line, Span},
    widgets::{
        Bar, BarChart, BarGroup, Block, Clear, Paragraph, Row as UIRow, Table as UITable, Wrap,
    },
};

use crate::domain::{DashConfig, FILTER_COLUMNS, HELP_TEXT};
use crate::model::{Modus, Model};
use crate::view::{Aggregates, LayoutMode, ViewModel};

pub const FILTERBAR_HEIGHT: u16 = 3;
pub const PAGEBAR_HEIGHT: u16 = 1;
pub const STATUSLINE_HEIGHT: u16 = 1;
pub const CHART_HEIGHT: u16 = 14;
pub const COLUMN_WIDTH_MARGIN: usize = 2;
const STATUS_MESSAGE_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Debug)]
pub struct DashUI {
    max_column_width: usize,
}

impl DashUI {
    pub fn new(config: &DashConfig) -> Self {
        Self {
            max_column_width: config.max_column_width,
        }
    }

    pub fn draw(&self, model: &Model, frame: &mut Frame) {
        let table_height = model
            .view()
            .map_or(model.config().header_height, |v| v.height) as u16;
        let chart_height = if model.display().show_charts {
            CHART_HEIGHT
        } else {
            0
        };

        let [filter_area, table_area, page_area, chart_area, _, status_area] = Layout::vertical([
            Constraint::Length(FILTERBAR_HEIGHT),
            Constraint::Length(table_height),
            Constraint::Length(PAGEBAR_HEIGHT),
            Constraint::Length(chart_height),
            Constraint::Min(0),
            Constraint::Length(STATUSLINE_HEIGHT),
        ])
        .areas(frame.area());

        self.draw_filterbar(model, frame, filter_area);
        match (model.view(), model.failure()) {
            (_, Some(failure)) => Self::draw_failure(failure, frame, table_area),
            (Some(view), None) if view.is_empty() => Self::draw_no_records(view, frame, table_area),
            (Some(view), None) => self.draw_table(view, frame, table_area),
            (None, None) => {}
        }
        if let Some(view) = model.view() {
            Self::draw_pagebar(view, frame, page_area);
            if let Some(aggregates) = &view.aggregates {
                Self::draw_charts(aggregates, frame, chart_area);
            } else if model.display().show_charts {
                frame.render_widget(
                    Paragraph::new("No \"price\" column to chart.").dim(),
                    chart_area,
                );
            }
        }
        Self::draw_statusline(model, frame, status_area);

        if model.modus() == Modus::POPUP {
            Self::draw_popup(frame);
        }
    }

    fn draw_filterbar(&self, model: &Model, frame: &mut Frame, area: Rect) {
        let mut spans: Vec<Span> = Vec::new();
        for column in FILTER_COLUMNS {
            let label = model
                .filter()
                .get(column)
                .map_or("all".to_string(), |s| s.label().to_string());
            spans.push(format!(" {column}: ").into());
            spans.push(label.yellow().bold());
            spans.push(format!(" ({} options) ", model.option_count(column)).dim());
        }
        let display = model.display();
        spans.push(format!(" page size: {} ", display.page_size).into());
        if display.layout == LayoutMode::Fixed {
            spans.push(" [fixed]".blue());
        }
        if display.show_charts {
            spans.push(" [charts]".blue());
        }

        let title = match model.data_age() {
            Some(age) => Line::from(vec![
                format!(" {} ", model.source_name()).bold(),
                format!("(fetched {} ago) ", elapsed(age)).dim(),
            ]),
            None => Line::from(format!(" {} ", model.source_name()).bold()),
        };
        let block = Block::bordered()
            .title(title.centered())
            .border_set(border::THICK);
        frame.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
    }

    fn column_widths(&self, view: &ViewModel) -> Vec<Constraint> {
        view.columns
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let widest = view
                    .rows
                    .iter()
                    .map(|r| r.get(idx).to_string().chars().count())
                    .max()
                    .unwrap_or(0);
                let width = std::cmp::max(name.chars().count(), widest) + COLUMN_WIDTH_MARGIN;
                Constraint::Length(std::cmp::min(width, self.max_column_width) as u16)
            })
            .collect()
    }

    fn draw_table(&self, view: &ViewModel, frame: &mut Frame, area: Rect) {
        let header = UIRow::new(view.columns.iter().map(|c| c.clone()))
            .style(Style::new().bold().fg(Color::Yellow));
        let rows = view.rows.iter().map(|row| {
            UIRow::new(
                row.cells()
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<String>>(),
            )
        });
        let table = UITable::new(rows, self.column_widths(view))
            .header(header)
            .block(Block::bordered().title(Line::from(format!(" {} ", view.name))));
        frame.render_widget(table, area);
    }

    fn draw_no_records(view: &ViewModel, frame: &mut Frame, area: Rect) {
        let notice = if view.is_blank() {
            "The worksheet is empty."
        } else {
            "No records match the current filters."
        };
        frame.render_widget(
            Paragraph::new(notice)
                .centered()
                .block(Block::bordered()),
            area,
        );
    }

    fn draw_failure(failure: &str, frame: &mut Frame, area: Rect) {
        frame.render_widget(
            Paragraph::new(failure.to_string())
                .red()
                .wrap(Wrap { trim: true })
                .block(Block::bordered().title(" Error ")),
            area,
        );
    }

    fn draw_pagebar(view: &ViewModel, frame: &mut Frame, area: Rect) {
        let first = (view.current_page - 1) * view.page_size + 1;
        let last = first + view.rows.len().saturating_sub(1);
        let previous = if view.can_previous {
            " ◀ prev ".blue().bold()
        } else {
            " ◀ prev ".dim()
        };
        let next = if view.can_next {
            " next ▶ ".blue().bold()
        } else {
            " next ▶ ".dim()
        };
        let range = if view.is_empty() {
            "no rows".to_string()
        } else {
            format!("rows {first}-{last}")
        };
        let line = Line::from(vec![
            previous,
            format!(" Page {}/{} ", view.current_page, view.total_pages).bold(),
            next,
            format!(
                "  {range} of {} filtered ({} total)",
                view.filtered_rows, view.total_rows
            )
            .into(),
        ]);
        frame.render_widget(Paragraph::new(line), area);
    }

    fn draw_charts(aggregates: &Aggregates, frame: &mut Frame, area: Rect) {
        let [model_area, histogram_area] =
            Layout::horizontal([Constraint::Percentage(50), Constraint::Percentage(50)])
                .areas(area);

        let model_bars: Vec<Bar> = aggregates
            .by_model
            .iter()
            .map(|m| {
                let mean = m.mean_price.unwrap_or(0.0);
                Bar::default()
                    .value(mean.round() as u64)
                    .label(Line::from(m.model.clone()))
                    .text_value(format!("{} ({})", compact(mean), m.count))
            })
            .collect();
        let model_chart = BarChart::default()
            .block(Block::bordered().title(" Mean price (count) by model "))
            .data(BarGroup::default().bars(&model_bars))
            .bar_width(9)
            .bar_gap(1)
            .bar_style(Style::new().fg(Color::Cyan));
        frame.render_widget(model_chart, model_area);

        let histogram_bars: Vec<Bar> = aggregates
            .histogram
            .iter()
            .map(|b| {
                Bar::default()
                    .value(b.count as u64)
                    .label(Line::from(compact(b.lower)))
            })
            .collect();
        let title = if aggregates.dropped > 0 {
            format!(
                " Price distribution (n={}, {} unparsed) ",
                aggregates.sample_size, aggregates.dropped
            )
        } else {
            format!(" Price distribution (n={}) ", aggregates.sample_size)
        };
        let histogram_chart = BarChart::default()
            .block(Block::bordered().title(title))
            .data(BarGroup::default().bars(&histogram_bars))
            .bar_width(5)
            .bar_gap(1)
            .bar_style(Style::new().fg(Color::Green));
        frame.render_widget(histogram_chart, histogram_area);
    }

    fn draw_statusline(model: &Model, frame: &mut Frame, area: Rect) {
        let line = if model.last_status_message_update().elapsed() < STATUS_MESSAGE_TIMEOUT {
            Line::from(model.status_message().to_string())
        } else {
            Line::from(vec![
                " Help ".into(),
                "<?>".blue().bold(),
                " Quit ".into(),
                "<q> ".blue().bold(),
            ])
        };
        frame.render_widget(Paragraph::new(line), area);
    }

    fn draw_popup(frame: &mut Frame) {
        let height = HELP_TEXT.lines().count() as u16 + 2;
        let width = HELP_TEXT.lines().map(|l| l.chars().count()).max().unwrap_or(0) as u16 + 4;
        let area = popup_area(frame.area(), width, height);
        frame.render_widget(Clear, area);
        frame.render_widget(
            Paragraph::new(HELP_TEXT).block(
                Block::bordered()
                    .title(Line::from(" Keys ".bold()).centered())
                    .border_set(border::THICK),
            ),
            area,
        );
    }
}

fn popup_area(area: Rect, width: u16, height: u16) -> Rect {
    let [area] = Layout::vertical([Constraint::Length(height)])
        .flex(Flex::Center)
        .areas(area);
    let [area] = Layout::horizontal([Constraint::Length(width)])
        .flex(Flex::Center)
        .areas(area);
    area
}

/// Coarse age for the title bar: "42s", "3m", "2h".
pub fn elapsed(age: Duration) -> String {
    let secs = age.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{}h", secs / 3600)
    }
}

/// Short label for chart axes: 55000 -> "55k", 1500000 -> "1.5M".
pub fn compact(value: f64) -> String {
    let abs = value.abs();
    if abs >= 1_000_000.0 {
        format!("{:.1}M", value / 1_000_000.0)
    } else if abs >= 1_000.0 {
        format!("{:.0}k", value / 1_000.0)
    } else {
        format!("{value:.0}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_labels() {
        assert_eq!(compact(55000.0), "55k");
        assert_eq!(compact(1_500_000.0), "1.5M");
        assert_eq!(compact(950.4), "950");
        assert_eq!(compact(0.0), "0");
    }

    #[test]
    fn elapsed_labels() {
        assert_eq!(elapsed(Duration::from_secs(42)), "42s");
        assert_eq!(elapsed(Duration::from_secs(190)), "3m");
        assert_eq!(elapsed(Duration::from_secs(7300)), "2h");
    }

    #[test]
    fn popup_is_centered() {
        let area = popup_area(Rect::new(0, 0, 100, 40), 20, 10);
        assert_eq!(area, Rect::new(40, 15, 20, 10));
    }
}

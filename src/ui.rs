use std::error::Error;
use std::io::{self, Write};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use crossterm::{
    cursor::Show,
    event::{self, Event as CEvent, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use tracing::info;
use tui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Span, Spans},
    widgets::{
        Axis, BarChart, Block, Borders, Chart, Dataset, GraphType, List, ListItem, Paragraph, Tabs,
        Wrap,
    },
    Frame, Terminal,
};

use crate::app::{Dashboard, FilterControls, Focus, MenuItem};
use crate::report::{format_rate, ChartKind, ChartSpec};

pub const TICK_RATE: Duration = Duration::from_millis(200);

const MENU_TITLES: [&str; 4] = ["Overview", "Trends", "Jobs", "Quit"];

const INSIGHTS: [&str; 4] = [
    "Older customers (60+) show the highest conversion rates: prioritize this segment.",
    "Cellular contact outperforms telephone: allocate more budget here.",
    "Conversion drops after multiple contacts: avoid campaign fatigue.",
    "Certain job roles consistently convert better: personalize messaging.",
];

enum Event<I> {
    Input(I),
    Tick,
}

/// Puts the terminal back into cooked mode on the main screen when dropped,
/// whichever way `run` returns.
struct TerminalGuard<W: Write> {
    out: W,
    raw_mode: bool,
}

impl TerminalGuard<io::Stdout> {
    fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        let mut guard = TerminalGuard {
            out: io::stdout(),
            raw_mode: true,
        };
        execute!(guard.out, EnterAlternateScreen)?;
        Ok(guard)
    }
}

impl<W: Write> Drop for TerminalGuard<W> {
    fn drop(&mut self) {
        if self.raw_mode {
            let _ = disable_raw_mode();
        }
        let _ = execute!(self.out, LeaveAlternateScreen, Show);
    }
}

pub fn run(mut dashboard: Dashboard, tick_rate: Duration) -> Result<(), Box<dyn Error>> {
    let _guard = TerminalGuard::enter()?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut last_tick = Instant::now();
        loop {
            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_secs(0));

            match event::poll(timeout) {
                Ok(true) => {
                    if let Ok(CEvent::Key(key)) = event::read() {
                        if tx.send(Event::Input(key)).is_err() {
                            break;
                        }
                    }
                }
                Ok(false) => {}
                Err(_) => break,
            }

            if last_tick.elapsed() >= tick_rate {
                if tx.send(Event::Tick).is_err() {
                    break;
                }
                last_tick = Instant::now();
            }
        }
    });

    info!(path = %dashboard.data_path().display(), "dashboard started");
    event_loop(&mut terminal, &mut dashboard, &rx)
}

fn event_loop<B: Backend>(
    terminal: &mut Terminal<B>,
    dashboard: &mut Dashboard,
    rx: &mpsc::Receiver<Event<KeyEvent>>,
) -> Result<(), Box<dyn Error>> {
    loop {
        terminal.draw(|rect| draw(rect, dashboard))?;

        match rx.recv()? {
            Event::Input(key) if key.kind == KeyEventKind::Press => {
                if !handle_key(dashboard, key.code) {
                    return Ok(());
                }
            }
            Event::Input(_) | Event::Tick => {}
        }
    }
}

/// Applies one key press. Returns `false` when the user asked to quit.
pub fn handle_key(dashboard: &mut Dashboard, code: KeyCode) -> bool {
    match code {
        KeyCode::Char('q') | KeyCode::Esc => return false,
        KeyCode::Char('o') => dashboard.active_menu_item = MenuItem::Overview,
        KeyCode::Char('t') => dashboard.active_menu_item = MenuItem::Trends,
        KeyCode::Char('j') => dashboard.active_menu_item = MenuItem::Jobs,
        KeyCode::Right => dashboard.active_menu_item = dashboard.active_menu_item.next(),
        KeyCode::Tab | KeyCode::Left => dashboard.toggle_focus(),
        KeyCode::Down => dashboard.next_item(),
        KeyCode::Up => dashboard.previous_item(),
        KeyCode::Char(' ') | KeyCode::Enter => dashboard.toggle_highlighted(),
        KeyCode::Char('a') => dashboard.select_all(),
        KeyCode::Char('n') => dashboard.clear_all(),
        KeyCode::Char('r') => dashboard.reload(),
        _ => {}
    }
    true
}

pub fn draw<B: Backend>(rect: &mut Frame<B>, dashboard: &mut Dashboard) {
    let size = rect.size();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints(
            [
                Constraint::Length(3),
                Constraint::Min(10),
                Constraint::Length(1),
            ]
            .as_ref(),
        )
        .split(size);

    let header_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)].as_ref())
        .split(chunks[0]);
    draw_header(rect, dashboard, header_chunks[0], header_chunks[1]);

    let body_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(28), Constraint::Min(20)].as_ref())
        .split(chunks[1]);
    draw_filters(rect, dashboard, body_chunks[0]);

    match dashboard.active_menu_item {
        MenuItem::Overview => draw_overview(rect, dashboard, body_chunks[1]),
        MenuItem::Trends => draw_trends(rect, dashboard, body_chunks[1]),
        MenuItem::Jobs => draw_chart(rect, &dashboard.report().jobs, body_chunks[1]),
    }

    draw_status(rect, dashboard, chunks[2]);
}

fn draw_header<B: Backend>(rect: &mut Frame<B>, dashboard: &Dashboard, menu: Rect, info: Rect) {
    let titles = MENU_TITLES
        .iter()
        .map(|&t| {
            let (first, rest) = t.split_at(1);
            Spans::from(vec![
                Span::styled(
                    first,
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::UNDERLINED),
                ),
                Span::styled(rest, Style::default().fg(Color::White)),
            ])
        })
        .collect();

    let tabs = Tabs::new(titles)
        .select(dashboard.active_menu_item.into())
        .block(Block::default().title("Bank Marketing Funnel").borders(Borders::ALL))
        .style(Style::default().fg(Color::Cyan))
        .highlight_style(Style::default().fg(Color::Yellow))
        .divider(Span::raw("|"));
    rect.render_widget(tabs, menu);

    let loaded = dashboard
        .loaded_at()
        .map_or_else(|| "-".to_string(), |t| t.format("%H:%M:%S").to_string());
    let source = Paragraph::new(Spans::from(vec![Span::raw(format!(
        "{} | {} rows | loaded {}",
        dashboard.data_path().display(),
        dashboard.table().len(),
        loaded
    ))]))
    .block(Block::default().title("Data").borders(Borders::ALL))
    .style(Style::default().fg(Color::Green))
    .alignment(Alignment::Center);
    rect.render_widget(source, info);
}

fn draw_filters<B: Backend>(rect: &mut Frame<B>, dashboard: &mut Dashboard, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)].as_ref())
        .split(area);

    let focus = dashboard.focus();
    let selection = dashboard.selection();
    let contacts = filter_list(
        "Contact Channel",
        dashboard.contacts().iter().map(|c| (c.as_str(), selection.has_contact(c))),
        focus == Focus::Channels,
    );
    let jobs = filter_list(
        "Job Type",
        dashboard.jobs().iter().map(|j| (j.as_str(), selection.has_job(j))),
        focus == Focus::Jobs,
    );

    rect.render_stateful_widget(contacts, chunks[0], &mut dashboard.contact_state);
    rect.render_stateful_widget(jobs, chunks[1], &mut dashboard.job_state);
}

fn filter_list<'v>(
    title: &'static str,
    values: impl Iterator<Item = (&'v str, bool)>,
    focused: bool,
) -> List<'static> {
    let items: Vec<ListItem> = values
        .map(|(value, selected)| {
            let mark = if selected { "[x] " } else { "[ ] " };
            ListItem::new(format!("{}{}", mark, value))
        })
        .collect();
    let border = if focused { Color::Yellow } else { Color::DarkGray };
    List::new(items)
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border)),
        )
        .highlight_style(
            Style::default()
                .fg(Color::Black)
                .bg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
}

fn draw_overview<B: Backend>(rect: &mut Frame<B>, dashboard: &Dashboard, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(3),
                Constraint::Min(8),
                Constraint::Length(6),
            ]
            .as_ref(),
        )
        .split(area);

    let kpi = dashboard.report().kpi;
    let metric_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(
            [
                Constraint::Ratio(1, 3),
                Constraint::Ratio(1, 3),
                Constraint::Ratio(1, 3),
            ]
            .as_ref(),
        )
        .split(chunks[0]);
    for (i, (title, value)) in [
        ("Total Customers", kpi.total.to_string()),
        ("Total Conversions", kpi.conversions.to_string()),
        ("Conversion Rate (%)", format_rate(kpi.rate)),
    ]
    .into_iter()
    .enumerate()
    {
        let metric = Paragraph::new(Spans::from(vec![Span::styled(
            value,
            Style::default().add_modifier(Modifier::BOLD),
        )]))
        .block(Block::default().title(title).borders(Borders::ALL))
        .alignment(Alignment::Center);
        rect.render_widget(metric, metric_chunks[i]);
    }

    let chart_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)].as_ref())
        .split(chunks[1]);
    draw_chart(rect, &dashboard.report().funnel, chart_chunks[0]);
    draw_chart(rect, &dashboard.report().channels, chart_chunks[1]);

    let insights: Vec<Spans> = INSIGHTS
        .iter()
        .map(|line| Spans::from(vec![Span::raw("- "), Span::raw(*line)]))
        .collect();
    let notes = Paragraph::new(insights)
        .block(Block::default().title("Business Insights").borders(Borders::ALL))
        .wrap(Wrap { trim: true });
    rect.render_widget(notes, chunks[2]);
}

fn draw_trends<B: Backend>(rect: &mut Frame<B>, dashboard: &Dashboard, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)].as_ref())
        .split(area);
    draw_chart(rect, &dashboard.report().campaigns, chunks[0]);
    draw_chart(rect, &dashboard.report().age_groups, chunks[1]);
}

fn draw_chart<B: Backend>(rect: &mut Frame<B>, chart: &ChartSpec, area: Rect) {
    let block = Block::default().title(chart.title).borders(Borders::ALL);
    if chart.is_empty() {
        let empty = Paragraph::new("No rows match the current filters")
            .block(block)
            .alignment(Alignment::Center);
        rect.render_widget(empty, area);
        return;
    }

    match chart.kind {
        ChartKind::Line => {
            let points = chart.series();
            let (min_x, max_x) = points
                .iter()
                .fold((f64::MAX, f64::MIN), |(lo, hi), (x, _)| (lo.min(*x), hi.max(*x)));
            let max_x = if max_x > min_x { max_x } else { min_x + 1.0 };
            let datasets = vec![Dataset::default()
                .name(chart.y_label)
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(Color::Yellow))
                .data(&points)];
            let line = Chart::new(datasets)
                .block(block)
                .x_axis(
                    Axis::default()
                        .title(chart.x_label)
                        .style(Style::default().fg(Color::Gray))
                        .bounds([min_x, max_x])
                        .labels(vec![
                            Span::raw(format!("{}", min_x)),
                            Span::raw(format!("{}", max_x)),
                        ]),
                )
                .y_axis(
                    Axis::default()
                        .title(chart.y_label)
                        .style(Style::default().fg(Color::Gray))
                        .bounds([0.0, 100.0])
                        .labels(vec![Span::raw("0"), Span::raw("50"), Span::raw("100")]),
                );
            rect.render_widget(line, area);
        }
        ChartKind::Bar | ChartKind::Funnel => {
            let data = bar_data(chart);
            let max = match chart.kind {
                ChartKind::Funnel => data.iter().map(|(_, v)| *v).max().unwrap_or(0).max(1),
                _ => 100,
            };
            let width = data
                .iter()
                .map(|(label, _)| label.len() as u16)
                .max()
                .unwrap_or(0)
                .clamp(5, 12);
            let bars = BarChart::default()
                .block(block)
                .data(&data)
                .max(max)
                .bar_width(width)
                .bar_gap(1)
                .bar_style(Style::default().fg(Color::Yellow))
                .value_style(Style::default().fg(Color::Black).bg(Color::Yellow));
            rect.render_widget(bars, area);
        }
    }
}

/// Bar heights: counts for the funnel, rates rounded to whole percent
/// otherwise. Undefined rates draw as zero.
fn bar_data(chart: &ChartSpec) -> Vec<(&str, u64)> {
    chart
        .points
        .iter()
        .map(|p| (p.label.as_str(), p.value.map_or(0, |v| v.round() as u64)))
        .collect()
}

fn draw_status<B: Backend>(rect: &mut Frame<B>, dashboard: &Dashboard, area: Rect) {
    let line = match dashboard.status() {
        Some(status) => Span::styled(status.to_string(), Style::default().fg(Color::Red)),
        None => Span::styled(
            format!(
                "{} shown | Tab switch list | Up/Down move | Space toggle | a all | n none | r reload | q quit",
                dashboard.report().kpi.total
            ),
            Style::default().fg(Color::DarkGray),
        ),
    };
    rect.render_widget(Paragraph::new(Spans::from(vec![line])), area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::tests::sample_file;
    use crate::csv_reader::TableCache;
    use tui::backend::TestBackend;

    fn screen(dashboard: &mut Dashboard) -> String {
        let mut terminal = Terminal::new(TestBackend::new(140, 45)).unwrap();
        terminal.draw(|rect| draw(rect, dashboard)).unwrap();
        let buffer = terminal.backend().buffer();
        buffer.content.iter().map(|cell| cell.symbol.as_str()).collect()
    }

    #[test]
    fn renders_every_page() {
        let file = sample_file();
        let mut dashboard = Dashboard::new(TableCache::new(file.path())).unwrap();

        let overview = screen(&mut dashboard);
        assert!(overview.contains("Total Customers"));
        assert!(overview.contains("Customer Conversion Funnel"));
        assert!(overview.contains("[x] cellular"));

        assert!(handle_key(&mut dashboard, KeyCode::Char('t')));
        let trends = screen(&mut dashboard);
        assert!(trends.contains("Conversion Rate by Age Group"));

        assert!(handle_key(&mut dashboard, KeyCode::Char('j')));
        let jobs = screen(&mut dashboard);
        assert!(jobs.contains("Top 10 Job Roles by Conversion Rate"));
    }

    #[test]
    fn renders_empty_selection_without_panicking() {
        let file = sample_file();
        let mut dashboard = Dashboard::new(TableCache::new(file.path())).unwrap();
        handle_key(&mut dashboard, KeyCode::Char('n'));
        assert_eq!(dashboard.report().kpi.total, 0);

        for key in ['o', 't', 'j'] {
            handle_key(&mut dashboard, KeyCode::Char(key));
            let text = screen(&mut dashboard);
            assert!(text.contains("[ ] cellular"));
        }
        assert!(screen(&mut dashboard).contains("No rows match"));
    }

    #[test]
    fn guard_leaves_alternate_screen_and_shows_cursor_on_drop() {
        let mut out = Vec::new();
        drop(TerminalGuard {
            out: &mut out,
            raw_mode: false,
        });
        let written = String::from_utf8(out).unwrap();
        assert!(written.contains("\x1b[?1049l"));
        assert!(written.contains("\x1b[?25h"));
    }

    #[test]
    fn keys_drive_the_dashboard() {
        let file = sample_file();
        let mut dashboard = Dashboard::new(TableCache::new(file.path())).unwrap();

        handle_key(&mut dashboard, KeyCode::Tab);
        assert_eq!(dashboard.focus(), Focus::Jobs);
        handle_key(&mut dashboard, KeyCode::Char(' '));
        assert!(!dashboard.selection().has_job("admin."));
        handle_key(&mut dashboard, KeyCode::Char('a'));
        assert!(dashboard.selection().has_job("admin."));

        handle_key(&mut dashboard, KeyCode::Right);
        assert_eq!(dashboard.active_menu_item, MenuItem::Trends);
        assert!(!handle_key(&mut dashboard, KeyCode::Char('q')));
    }
}

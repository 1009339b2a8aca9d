use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Sparkline, Table, TableState},
    Frame, Terminal,
};
use risk_ledger::aggregation::{decimal_to_f64, EntityKind, GroupKey};
use risk_ledger::{Kpis, LabeledTransaction, ReportFilter, ReportingFacade, RiskLabel, SummaryTable};
use std::collections::BTreeMap;
use std::io;

const TOP_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Overview,
    Trend,
    Customers,
    Transactions,
}

impl Page {
    pub const ALL: [Page; 4] = [Page::Overview, Page::Trend, Page::Customers, Page::Transactions];

    pub fn next(&self) -> Self {
        match self {
            Page::Overview => Page::Trend,
            Page::Trend => Page::Customers,
            Page::Customers => Page::Transactions,
            Page::Transactions => Page::Overview,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::Overview => Page::Transactions,
            Page::Trend => Page::Overview,
            Page::Customers => Page::Trend,
            Page::Transactions => Page::Customers,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Overview => "Overview",
            Page::Trend => "Monthly Trend",
            Page::Customers => "High-Risk Customers",
            Page::Transactions => "Transactions",
        }
    }
}

/// One month of the trend view
#[derive(Debug, Clone, PartialEq)]
pub struct TrendPoint {
    pub month: String,
    pub count: usize,
    pub total_amount: f64,
    pub high_count: usize,
}

pub struct App {
    pub transactions: Vec<LabeledTransaction>,
    pub filtered: Vec<LabeledTransaction>,
    pub filter: ReportFilter,
    pub facade: ReportingFacade,
    pub sectors: Vec<String>,
    pub state: TableState,
    pub current_page: Page,
    pub show_detail: bool,
    pub kpis: Kpis,
    pub distribution: SummaryTable,
    pub sector_matrix: SummaryTable,
    pub top_customers: SummaryTable,
    pub trend: Vec<TrendPoint>,
}

impl App {
    pub fn new(transactions: Vec<LabeledTransaction>, facade: ReportingFacade) -> Self {
        let mut sectors: Vec<String> = transactions
            .iter()
            .map(|t| t.transaction.sector_or_unknown().to_string())
            .collect();
        sectors.sort();
        sectors.dedup();

        let mut app = Self {
            filtered: Vec::new(),
            transactions,
            filter: ReportFilter::default(),
            sectors,
            state: TableState::default(),
            current_page: Page::Overview,
            show_detail: false,
            kpis: Kpis::default(),
            distribution: SummaryTable::new("", &[]),
            sector_matrix: SummaryTable::new("", &[]),
            top_customers: SummaryTable::new("", &[]),
            trend: Vec::new(),
            facade,
        };
        app.refresh();
        app
    }

    /// Recompute the filtered set and every derived view
    pub fn refresh(&mut self) {
        // Filters built from key presses never carry a date range
        self.filtered = self
            .transactions
            .iter()
            .filter(|t| self.filter.matches(t))
            .cloned()
            .collect();

        self.kpis = self.facade.kpis(&self.filtered);
        self.distribution = self.facade.summary(&self.filtered, risk_ledger::GroupBy::Label);
        self.sector_matrix = self.facade.matrix(&self.filtered, EntityKind::Sector);
        self.top_customers =
            self.facade
                .top_entities(&self.filtered, RiskLabel::High, EntityKind::Customer, TOP_LIMIT);
        self.trend = self.monthly_trend();

        if self.filtered.is_empty() {
            self.state.select(None);
        } else {
            self.state.select(Some(0));
        }
    }

    fn monthly_trend(&self) -> Vec<TrendPoint> {
        let result = self
            .facade
            .engine()
            .aggregate(&self.filtered, risk_ledger::GroupBy::LabelAndBucket(risk_ledger::TimeBucket::Month));

        let mut months: BTreeMap<chrono::NaiveDate, TrendPoint> = BTreeMap::new();
        for group in &result.groups {
            if let GroupKey::Bucket { label, bucket, start } = &group.key {
                let point = months.entry(*start).or_insert_with(|| TrendPoint {
                    month: bucket.clone(),
                    count: 0,
                    total_amount: 0.0,
                    high_count: 0,
                });
                point.count += group.metrics.count;
                point.total_amount += decimal_to_f64(group.metrics.total_amount);
                if *label == RiskLabel::High {
                    point.high_count += group.metrics.count;
                }
            }
        }
        months.into_values().collect()
    }

    pub fn toggle_label(&mut self, label: RiskLabel) {
        if let Some(pos) = self.filter.labels.iter().position(|l| *l == label) {
            self.filter.labels.remove(pos);
        } else {
            self.filter.labels.push(label);
            self.filter.labels.sort();
        }
        self.refresh();
    }

    /// Step through: all sectors → each sector → all sectors
    pub fn cycle_sector(&mut self) {
        let next = match self.filter.sectors.first() {
            None => self.sectors.first().cloned(),
            Some(current) => self
                .sectors
                .iter()
                .position(|s| s == current)
                .and_then(|i| self.sectors.get(i + 1))
                .cloned(),
        };
        self.filter.sectors = next.into_iter().collect();
        self.refresh();
    }

    pub fn clear_filter(&mut self) {
        self.filter = ReportFilter::default();
        self.refresh();
    }

    pub fn filter_description(&self) -> Option<String> {
        if self.filter.is_unrestricted() {
            return None;
        }
        let mut parts = Vec::new();
        if !self.filter.labels.is_empty() {
            let labels: Vec<&str> = self.filter.labels.iter().map(|l| l.as_str()).collect();
            parts.push(labels.join("+"));
        }
        if !self.filter.sectors.is_empty() {
            parts.push(self.filter.sectors.join("+"));
        }
        Some(parts.join(" / "))
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn selected_transaction(&self) -> Option<&LabeledTransaction> {
        self.state.selected().and_then(|i| self.filtered.get(i))
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
    }

    pub fn next(&mut self) {
        let len = self.filtered.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i >= len - 1 => 0,
            Some(i) => i + 1,
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.filtered.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) => len - 1,
            Some(i) => i - 1,
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn page_down(&mut self) {
        let len = self.filtered.len();
        if len == 0 {
            return;
        }
        let i = self.state.selected().map_or(0, |i| (i + 20).min(len - 1));
        self.state.select(Some(i));
    }

    pub fn page_up(&mut self) {
        let i = self.state.selected().map_or(0, |i| i.saturating_sub(20));
        self.state.select(Some(i));
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Enter if app.current_page == Page::Transactions => app.toggle_detail(),
                KeyCode::Tab => app.next_page(),
                KeyCode::BackTab => app.previous_page(),
                KeyCode::Char('1') => app.toggle_label(RiskLabel::Low),
                KeyCode::Char('2') => app.toggle_label(RiskLabel::Medium),
                KeyCode::Char('3') => app.toggle_label(RiskLabel::High),
                KeyCode::Char('s') => app.cycle_sector(),
                KeyCode::Char('c') => app.clear_filter(),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::PageDown => app.page_down(),
                KeyCode::PageUp => app.page_up(),
                KeyCode::Home if !app.filtered.is_empty() => app.state.select(Some(0)),
                KeyCode::End if !app.filtered.is_empty() => {
                    app.state.select(Some(app.filtered.len() - 1))
                }
                KeyCode::Char('l') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    terminal.clear()?;
                }
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if app.show_detail && app.current_page == Page::Transactions {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);

        render_transactions(f, content_chunks[0], app);
        render_detail_panel(f, content_chunks[1], app);
    } else {
        match app.current_page {
            Page::Overview => render_overview(f, chunks[1], app),
            Page::Trend => render_trend(f, chunks[1], app),
            Page::Customers => render_summary_table(f, chunks[1], &app.top_customers, Color::Red),
            Page::Transactions => render_transactions(f, chunks[1], app),
        }
    }

    render_status_bar(f, chunks[2], app);
}

fn label_color(label: RiskLabel) -> Color {
    match label {
        RiskLabel::Low => Color::Green,
        RiskLabel::Medium => Color::Yellow,
        RiskLabel::High => Color::Red,
    }
}

fn header_style() -> Style {
    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut tab_spans = vec![];
    for (i, page) in Page::ALL.iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title().to_string(), style));
    }

    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Total: {}", app.kpis.total_transactions),
        Style::default().fg(Color::White),
    ));
    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("High: {} ({:.1}%)", app.kpis.high_count, app.kpis.high_ratio_pct),
        Style::default().fg(Color::Red),
    ));

    let header = Paragraph::new(vec![Line::from(tab_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(" Risk Ledger "),
    );

    f.render_widget(header, area);
}

fn render_overview(f: &mut Frame, area: Rect, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(9), Constraint::Min(0)])
        .split(area);
    let top = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(rows[0]);

    render_kpis(f, top[0], &app.kpis);
    render_summary_table(f, top[1], &app.distribution, Color::White);
    render_summary_table(f, rows[1], &app.sector_matrix, Color::White);
}

fn render_kpis(f: &mut Frame, area: Rect, kpis: &Kpis) {
    let metric = |name: &str, value: String, color: Color| {
        Line::from(vec![
            Span::styled(format!("  {:<22}", name), Style::default().fg(Color::Cyan)),
            Span::styled(value, Style::default().fg(color).add_modifier(Modifier::BOLD)),
        ])
    };

    let content = vec![
        metric("Transactions", kpis.total_transactions.to_string(), Color::White),
        metric("Total Amount", format!("{:.2}", kpis.total_amount_f64()), Color::White),
        metric("Average Delay (days)", format!("{:.2}", kpis.avg_delay_days), Color::White),
        metric("High Risk", kpis.high_count.to_string(), Color::Red),
        metric("High Risk Ratio", format!("{:.2}%", kpis.high_ratio_pct), Color::Red),
        metric("Paid Rate", format!("{:.2}%", kpis.paid_rate_pct), Color::Green),
        metric("Late Payment Rate", format!("{:.2}%", kpis.late_rate_pct), Color::Yellow),
    ];

    let paragraph = Paragraph::new(content).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Key Metrics "),
    );
    f.render_widget(paragraph, area);
}

/// Render any report table; cells equal to a label name get that label's color
fn render_summary_table(f: &mut Frame, area: Rect, table: &SummaryTable, border: Color) {
    let header = Row::new(
        table
            .columns
            .iter()
            .map(|c| Cell::from(c.clone()).style(header_style())),
    )
    .style(Style::default().bg(Color::DarkGray))
    .height(1);

    let rows = table.rows.iter().map(|row| {
        Row::new(row.iter().map(|cell| {
            let text = cell.to_string();
            match text.parse::<RiskLabel>() {
                Ok(label) => Cell::from(text).style(Style::default().fg(label_color(label))),
                Err(_) => Cell::from(text),
            }
        }))
        .height(1)
    });

    let widths = vec![Constraint::Min(12); table.columns.len().max(1)];
    let widget = Table::new(rows, widths).header(header).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border))
            .title(format!(" {} ", table.title)),
    );

    f.render_widget(widget, area);
}

fn render_trend(f: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(8), Constraint::Min(0)])
        .split(area);

    let amounts: Vec<u64> = app
        .trend
        .iter()
        .map(|p| p.total_amount.max(0.0).round() as u64)
        .collect();
    let sparkline = Sparkline::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Monthly Transaction Amount "),
        )
        .data(&amounts)
        .style(Style::default().fg(Color::Cyan));
    f.render_widget(sparkline, chunks[0]);

    let header = Row::new(
        ["Month", "Transactions", "Total Amount", "High Risk"]
            .iter()
            .map(|h| Cell::from(*h).style(header_style())),
    )
    .style(Style::default().bg(Color::DarkGray))
    .height(1);

    let rows = app.trend.iter().map(|p| {
        Row::new(vec![
            Cell::from(p.month.clone()),
            Cell::from(p.count.to_string()),
            Cell::from(format!("{:.2}", p.total_amount)),
            Cell::from(p.high_count.to_string()).style(Style::default().fg(Color::Red)),
        ])
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(10),
            Constraint::Length(14),
            Constraint::Length(18),
            Constraint::Length(12),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title(" By Month "));
    f.render_widget(table, chunks[1]);
}

fn render_transactions(f: &mut Frame, area: Rect, app: &mut App) {
    let header_cells = ["Date", "Customer", "Sector", "Amount", "Delay", "Risk"]
        .iter()
        .map(|h| Cell::from(*h).style(header_style()));

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows = app.filtered.iter().map(|lt| {
        let tx = &lt.transaction;
        let color = label_color(lt.risk_label);

        Row::new(vec![
            Cell::from(tx.date().to_string()),
            Cell::from(truncate(tx.customer_display(), 20)),
            Cell::from(truncate(tx.sector_or_unknown(), 15)),
            Cell::from(format!("{:.2}", tx.amount)),
            Cell::from(tx.delay_days.to_string()),
            Cell::from(lt.risk_label.as_str()).style(Style::default().fg(color)),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(12),
            Constraint::Length(22),
            Constraint::Length(16),
            Constraint::Length(14),
            Constraint::Length(7),
            Constraint::Length(8),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Transactions "),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let selected = app.state.selected().map(|i| i + 1).unwrap_or(0);

    let mut status_spans = vec![Span::styled(
        format!(" Row: {}/{} ", selected, app.filtered.len()),
        Style::default().fg(Color::Cyan),
    )];

    if let Some(filter) = app.filter_description() {
        status_spans.push(Span::raw(" | "));
        status_spans.push(Span::styled(
            format!("Filter: {}", filter),
            Style::default().fg(Color::Green),
        ));
        status_spans.push(Span::raw(" ("));
        status_spans.push(Span::styled("c", Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(" clear)"));
    }

    for (key, action) in [
        ("1/2/3", " Risk | "),
        ("s", " Sector | "),
        ("Enter", " Details | "),
        ("Tab", " Page | "),
        ("↑/↓", " Nav | "),
    ] {
        status_spans.push(Span::styled(key, Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(action));
    }
    status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let lt = match app.selected_transaction() {
        Some(t) => t,
        None => {
            let no_selection = Paragraph::new("No transaction selected").block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Yellow))
                    .title(" Transaction Details "),
            );
            f.render_widget(no_selection, area);
            return;
        }
    };
    let tx = &lt.transaction;

    let field = |name: &str, value: String| {
        Line::from(vec![
            Span::styled(
                format!("  {}: ", name),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ),
            Span::raw(value),
        ])
    };
    let dash = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());

    let content = vec![
        Line::from(""),
        field("Transaction", tx.id.clone()),
        field("Date", tx.timestamp.to_string()),
        field("Customer", format!("{} ({})", tx.customer_display(), tx.customer_id)),
        field("Sector", tx.sector_or_unknown().to_string()),
        field("Country", dash(&tx.country)),
        field("Type", dash(&tx.txn_type)),
        field(
            "Amount",
            format!("{:.2} {}", tx.amount, tx.currency.as_deref().unwrap_or("")),
        ),
        field("Paid", if tx.is_paid { "yes".to_string() } else { "no".to_string() }),
        field("Delay (days)", tx.delay_days.to_string()),
        Line::from(""),
        Line::from("  ─────────────────────────────────────"),
        Line::from(""),
        Line::from(vec![Span::styled(
            "  RISK",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
        )]),
        Line::from(""),
        Line::from(vec![
            Span::styled("  Label: ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
            Span::styled(
                lt.risk_label.as_str(),
                Style::default()
                    .fg(label_color(lt.risk_label))
                    .add_modifier(Modifier::BOLD),
            ),
        ]),
        field("Delay tier", lt.delay_tier.index().to_string()),
        field("Amount tier", lt.amount_tier.index().to_string()),
        field("Score", lt.risk_score.to_string()),
        Line::from(""),
        Line::from(vec![Span::styled(
            "  Press Enter to close",
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        )]),
    ];

    let detail_panel = Paragraph::new(content).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(" Transaction Details "),
    );

    f.render_widget(detail_panel, area);
}

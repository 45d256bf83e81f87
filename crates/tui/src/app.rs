use std::{io, sync::Arc, thread, time::Duration};

use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use gamehub_core::{
    models::{filter_genres, heading},
    CatalogResult, Catalog, Game, Genre, Platform, QuerySnapshot, SortOrder,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use tokio::{spawn, sync::mpsc};
use tracing::{error, info};

const TICK_RATE: Duration = Duration::from_millis(250);
/// Rows from the end of the list at which the next page is requested.
const LOAD_MORE_THRESHOLD: usize = 3;

#[derive(Debug, Clone)]
struct Theme {
    primary_fg: Color,
    accent: Color,
    muted: Color,
    selection_bg: Color,
    success: Color,
    warning: Color,
    danger: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            primary_fg: Color::White,
            accent: Color::Magenta,
            muted: Color::DarkGray,
            selection_bg: Color::DarkGray,
            success: Color::Green,
            warning: Color::Yellow,
            danger: Color::Red,
        }
    }
}

enum AppEvent {
    Input(Event),
    Tick,
    GameLoaded(CatalogResult<Game>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Browse,
    Search,
    PlatformPicker,
}

/// Terminal front-end over a [`Catalog`].
pub struct GamehubApp {
    catalog: Arc<Catalog>,
    state: UiState,
    theme: Theme,
    event_tx: Option<mpsc::Sender<AppEvent>>,
    detail: Option<Game>,
}

impl GamehubApp {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
            state: UiState::default(),
            theme: Theme::default(),
            event_tx: None,
            detail: None,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        self.catalog.sync_games();
        self.spawn_ensure_all();

        let mut stdout = io::stdout();
        enable_raw_mode().context("failed to enter raw mode")?;
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("failed to create terminal")?;
        terminal.hide_cursor()?;
        terminal.clear()?;

        let (event_tx, mut event_rx) = mpsc::channel::<AppEvent>(128);
        spawn_input_thread(event_tx.clone());
        self.event_tx = Some(event_tx);

        loop {
            let games = self.catalog.games().read();
            terminal.draw(|frame| self.draw(frame, &games))?;
            if self.state.should_quit {
                break;
            }

            let maybe_event = event_rx.recv().await;
            if !self.process_app_event(maybe_event) {
                break;
            }
            if self.state.should_quit {
                break;
            }
        }

        restore_terminal(&mut terminal)?;
        self.event_tx = None;
        Ok(())
    }

    fn spawn_ensure_all(&self) {
        let games = Arc::clone(self.catalog.games());
        spawn(async move {
            games.ensure().await;
        });
        let genres = Arc::clone(self.catalog.genres());
        spawn(async move {
            genres.ensure().await;
        });
        let platforms = Arc::clone(self.catalog.platforms());
        spawn(async move {
            platforms.ensure().await;
        });
    }

    fn spawn_load_more(&self) {
        let games = Arc::clone(self.catalog.games());
        spawn(async move {
            games.load_more().await;
        });
    }

    fn spawn_refresh(&self) {
        let games = Arc::clone(self.catalog.games());
        spawn(async move {
            games.refresh().await;
        });
    }

    fn spawn_detail(&mut self, game: &Game) {
        let Some(sender) = self.event_tx.clone() else {
            return;
        };
        let catalog = Arc::clone(&self.catalog);
        let id = game.id;
        spawn(async move {
            let result = catalog.game(id).await;
            let _ = sender.send(AppEvent::GameLoaded(result)).await;
        });
        self.state.set_status(format!("Loading details for {}...", game.name));
    }

    fn process_app_event(&mut self, maybe_event: Option<AppEvent>) -> bool {
        match maybe_event {
            Some(AppEvent::Input(event)) => {
                if let Err(err) = self.handle_input(event) {
                    self.state.set_status(format!("Error: {err}"));
                }
                true
            }
            Some(AppEvent::Tick) => true,
            Some(AppEvent::GameLoaded(result)) => {
                match result {
                    Ok(game) => {
                        info!(id = game.id, name = %game.name, "game details loaded");
                        self.state.set_status(format!("Details: {}", game.name));
                        self.detail = Some(game);
                    }
                    Err(err) => {
                        error!(%err, "game details failed");
                        self.state.set_status(format!("Failed to load details: {err}"));
                    }
                }
                true
            }
            None => false,
        }
    }

    fn handle_input(&mut self, event: Event) -> Result<()> {
        if let Event::Key(key) = event {
            if key.kind != KeyEventKind::Press {
                return Ok(());
            }
            if self.catalog.store().is_modal_visible() {
                return self.handle_genre_picker_key(key);
            }
            match self.state.mode {
                Mode::Browse => self.handle_browse_key(key)?,
                Mode::Search => self.handle_search_key(key)?,
                Mode::PlatformPicker => self.handle_platform_picker_key(key)?,
            }
        }
        Ok(())
    }

    fn handle_browse_key(&mut self, key: KeyEvent) -> Result<()> {
        let total = self.catalog.games().snapshot().items.len();
        match key.code {
            KeyCode::Char('q') if key.modifiers.is_empty() => self.state.should_quit = true,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.state.should_quit = true
            }
            KeyCode::Char('j') | KeyCode::Down => self.move_cursor(1, total),
            KeyCode::Char('k') | KeyCode::Up => self.move_cursor(-1, total),
            KeyCode::PageDown => self.move_cursor(self.state.list_height as isize, total),
            KeyCode::PageUp => self.move_cursor(-(self.state.list_height as isize), total),
            KeyCode::Home => self.state.cursor = 0,
            KeyCode::End => self.move_cursor(isize::MAX / 2, total),
            KeyCode::Char('/') => {
                self.state.mode = Mode::Search;
                self.state.search_input = self.catalog.store().search_text().unwrap_or_default();
                self.state.set_status("Search: type and press Enter".to_string());
            }
            KeyCode::Char('g') => {
                self.state.picker_cursor = 0;
                self.state.genre_query.clear();
                self.catalog.store().toggle_modal();
            }
            KeyCode::Char('p') => {
                self.state.picker_cursor = 0;
                self.state.mode = Mode::PlatformPicker;
            }
            KeyCode::Char('s') => {
                let store = self.catalog.store();
                let next = SortOrder::from_ordering(store.sort_order().as_deref()).next();
                store.set_sort_order(next.ordering().map(str::to_string));
                self.state.cursor = 0;
                self.state.set_status(format!("Sorted by {}", next.label()));
            }
            KeyCode::Char('x') => {
                if self.catalog.store().clear_filters() {
                    self.state.cursor = 0;
                    self.state.set_status("Filters cleared".to_string());
                }
            }
            KeyCode::Char('r') => {
                self.state.cursor = 0;
                self.spawn_refresh();
                self.state.set_status("Refreshing...".to_string());
            }
            KeyCode::Char('o') => {
                let connectivity = self.catalog.connectivity();
                let online = !connectivity.is_online();
                connectivity.set_online(online);
                let message = if online { "Back online" } else { "Offline mode" };
                self.state.set_status(message.to_string());
            }
            KeyCode::Enter => {
                let snapshot = self.catalog.games().snapshot();
                if let Some(game) = snapshot.items.get(self.state.cursor).cloned() {
                    self.spawn_detail(&game);
                }
            }
            KeyCode::Esc => self.detail = None,
            _ => {}
        }
        Ok(())
    }

    fn move_cursor(&mut self, delta: isize, total: usize) {
        if total == 0 {
            self.state.cursor = 0;
            return;
        }
        let next = (self.state.cursor as isize + delta).clamp(0, total as isize - 1);
        self.state.cursor = next as usize;
        if self.state.cursor + LOAD_MORE_THRESHOLD >= total {
            self.spawn_load_more();
        }
    }

    fn handle_search_key(&mut self, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Esc => {
                self.state.mode = Mode::Browse;
                self.state.set_status("Search cancelled".to_string());
            }
            KeyCode::Enter => {
                self.state.mode = Mode::Browse;
                let text = self.state.search_input.clone();
                if self.catalog.store().set_search_text(Some(text.clone())) {
                    self.state.cursor = 0;
                }
                self.state.set_status(format!("Search: {text}"));
            }
            KeyCode::Backspace => {
                self.state.search_input.pop();
            }
            KeyCode::Char(c) => {
                if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT {
                    self.state.search_input.push(c);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_genre_picker_key(&mut self, key: KeyEvent) -> Result<()> {
        let genres = self.catalog.genres().snapshot().items;
        let options = filter_genres(&genres, &self.state.genre_query).len() + 1;
        match key.code {
            KeyCode::Esc => {
                self.catalog.store().set_is_modal_visible(false);
            }
            KeyCode::Down => {
                self.state.picker_cursor = (self.state.picker_cursor + 1).min(options - 1)
            }
            KeyCode::Up => self.state.picker_cursor = self.state.picker_cursor.saturating_sub(1),
            KeyCode::Enter => {
                let choice = match self.state.picker_cursor {
                    0 => None,
                    index => filter_genres(&genres, &self.state.genre_query)
                        .get(index - 1)
                        .map(|genre| (*genre).clone()),
                };
                let label = choice
                    .as_ref()
                    .map(|genre| genre.name.clone())
                    .unwrap_or_else(|| "All genres".to_string());
                let store = self.catalog.store();
                if store.set_selected_genre(choice) {
                    self.state.cursor = 0;
                }
                store.set_is_modal_visible(false);
                self.state.set_status(format!("Genre: {label}"));
            }
            KeyCode::Backspace => {
                self.state.genre_query.pop();
                self.state.picker_cursor = 0;
            }
            KeyCode::Char(c) => {
                if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT {
                    self.state.genre_query.push(c);
                    self.state.picker_cursor = 0;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_platform_picker_key(&mut self, key: KeyEvent) -> Result<()> {
        let platforms = self.catalog.platforms().snapshot().items;
        let options = platforms.len() + 1;
        match key.code {
            KeyCode::Esc => self.state.mode = Mode::Browse,
            KeyCode::Char('j') | KeyCode::Down => {
                self.state.picker_cursor = (self.state.picker_cursor + 1).min(options - 1)
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.state.picker_cursor = self.state.picker_cursor.saturating_sub(1)
            }
            KeyCode::Enter => {
                let choice: Option<Platform> = match self.state.picker_cursor {
                    0 => None,
                    index => platforms.get(index - 1).cloned(),
                };
                let label = choice
                    .as_ref()
                    .map(|platform| platform.name.clone())
                    .unwrap_or_else(|| "All platforms".to_string());
                if self.catalog.store().set_selected_platform(choice) {
                    self.state.cursor = 0;
                }
                self.state.mode = Mode::Browse;
                self.state.set_status(format!("Platform: {label}"));
            }
            _ => {}
        }
        Ok(())
    }

    fn draw(&mut self, frame: &mut Frame, games: &QuerySnapshot<Game>) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(4),
                Constraint::Min(5),
                Constraint::Length(4),
            ])
            .split(frame.size());

        self.render_header(frame, chunks[0]);
        let body = if self.detail.is_some() {
            let columns = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
                .split(chunks[1]);
            self.render_game_detail(frame, columns[1]);
            columns[0]
        } else {
            chunks[1]
        };
        self.render_game_list(frame, body, games);
        self.render_status(frame, chunks[2], games);

        if self.catalog.store().is_modal_visible() {
            self.render_genre_picker(frame);
        } else if self.state.mode == Mode::PlatformPicker {
            self.render_platform_picker(frame);
        }
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let selection = self.catalog.store().snapshot();
        let sort = SortOrder::from_ordering(selection.sort_order.as_deref());
        let filters = format!(
            "Sort: {}  ·  Search: {}",
            sort.label(),
            selection.search_text.as_deref().unwrap_or("-"),
        );
        let paragraph = Paragraph::new(vec![
            Line::from(Span::styled(
                heading(&selection),
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(Span::styled(filters, Style::default().fg(self.theme.muted))),
        ])
        .block(Block::default().borders(Borders::ALL).title("gamehub"));
        frame.render_widget(paragraph, area);
    }

    fn render_game_list(&mut self, frame: &mut Frame, area: Rect, games: &QuerySnapshot<Game>) {
        let block = Block::default().borders(Borders::ALL).title(match games.total {
            Some(total) => format!("Games ({}/{})", games.items.len(), total),
            None => "Games".to_string(),
        });

        if games.items.is_empty() {
            let (message, color) = if let Some(err) = &games.error {
                (format!("⚠ {err}\nPress r to retry"), self.theme.danger)
            } else if games.is_deferred {
                ("Offline, waiting for connectivity...".to_string(), self.theme.warning)
            } else if games.is_loading || games.is_stale {
                ("Loading games...".to_string(), self.theme.muted)
            } else {
                ("No games match these filters".to_string(), self.theme.muted)
            };
            let paragraph = Paragraph::new(message)
                .style(Style::default().fg(color))
                .alignment(Alignment::Center)
                .block(block)
                .wrap(Wrap { trim: true });
            frame.render_widget(paragraph, area);
            return;
        }

        self.state.list_height = area.height.saturating_sub(3) as usize;
        self.state.cursor = self.state.cursor.min(games.items.len() - 1);

        let mut items: Vec<ListItem> = games
            .items
            .iter()
            .map(|game| {
                let mut spans = vec![Span::styled(
                    game.name.clone(),
                    Style::default()
                        .fg(self.theme.primary_fg)
                        .add_modifier(Modifier::BOLD),
                )];
                spans.push(Span::styled(
                    format!("  {}", game.release_label()),
                    Style::default().fg(self.theme.muted),
                ));
                if let Some(score) = game.metacritic {
                    spans.push(Span::styled(
                        format!("  [{score}]"),
                        Style::default().fg(metacritic_color(&self.theme, score)),
                    ));
                }
                let platforms = game.platform_names().join(", ");
                if !platforms.is_empty() {
                    spans.push(Span::styled(
                        format!("  {platforms}"),
                        Style::default().fg(self.theme.muted),
                    ));
                }
                ListItem::new(Line::from(spans))
            })
            .collect();

        let footer = if games.is_fetching_next_page {
            Some("Loading more...")
        } else if !games.has_next_page {
            Some("You've seen it all")
        } else {
            None
        };
        if let Some(footer) = footer {
            items.push(ListItem::new(Line::from(Span::styled(
                footer,
                Style::default().fg(self.theme.muted),
            ))));
        }

        let mut list_state = ListState::default();
        list_state.select(Some(self.state.cursor));
        let list = List::new(items)
            .block(block)
            .highlight_symbol("▶ ")
            .highlight_style(Style::default().bg(self.theme.selection_bg));
        frame.render_stateful_widget(list, area, &mut list_state);
    }

    fn render_game_detail(&self, frame: &mut Frame, area: Rect) {
        let Some(game) = &self.detail else {
            return;
        };
        let genres = game
            .genres
            .iter()
            .map(|genre| genre.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let lines = vec![
            Line::from(Span::styled(
                game.name.clone(),
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(format!("Released: {}", game.release_label())),
            Line::from(format!("Platforms: {}", game.platform_names().join(", "))),
            Line::from(format!("Genres: {genres}")),
            Line::from(format!(
                "Metacritic: {}",
                game.metacritic
                    .map(|score| score.to_string())
                    .unwrap_or_else(|| "-".to_string())
            )),
            Line::from(Span::styled(
                game.background_image.clone().unwrap_or_default(),
                Style::default().fg(self.theme.muted),
            )),
        ];
        let paragraph = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("Details (Esc)"))
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }

    fn render_genre_picker(&self, frame: &mut Frame) {
        let snapshot = self.catalog.genres().read();
        let selected = self.catalog.store().selected_genre().map(|genre| genre.id);
        let filtered = filter_genres(&snapshot.items, &self.state.genre_query);
        let mut labels = vec![("All genres".to_string(), selected.is_none())];
        labels.extend(
            filtered
                .iter()
                .map(|genre: &&Genre| (genre.name.clone(), Some(genre.id) == selected)),
        );
        let title = format!("Genres · filter: {}", self.state.genre_query);
        self.render_picker(frame, &title, labels, snapshot.is_loading);
    }

    fn render_platform_picker(&self, frame: &mut Frame) {
        let snapshot = self.catalog.platforms().read();
        let selected = self
            .catalog
            .store()
            .selected_platform()
            .map(|platform| platform.id);
        let mut labels = vec![("All platforms".to_string(), selected.is_none())];
        labels.extend(
            snapshot
                .items
                .iter()
                .map(|platform| (platform.name.clone(), Some(platform.id) == selected)),
        );
        self.render_picker(frame, "Platforms", labels, snapshot.is_loading);
    }

    fn render_picker(&self, frame: &mut Frame, title: &str, labels: Vec<(String, bool)>, loading: bool) {
        let area = centered_rect(50, 60, frame.size());
        frame.render_widget(Clear, area);
        let block = Block::default().borders(Borders::ALL).title(title.to_string());

        if loading {
            frame.render_widget(Paragraph::new("Loading...").block(block), area);
            return;
        }

        let items: Vec<ListItem> = labels
            .into_iter()
            .map(|(label, active)| {
                let marker = if active { "✓ " } else { "  " };
                let style = if active {
                    Style::default().fg(self.theme.success)
                } else {
                    Style::default().fg(self.theme.primary_fg)
                };
                ListItem::new(Line::from(Span::styled(format!("{marker}{label}"), style)))
            })
            .collect();
        let mut list_state = ListState::default();
        list_state.select(Some(self.state.picker_cursor));
        let list = List::new(items)
            .block(block)
            .highlight_style(Style::default().bg(self.theme.selection_bg));
        frame.render_stateful_widget(list, area, &mut list_state);
    }

    fn render_status(&self, frame: &mut Frame, area: Rect, games: &QuerySnapshot<Game>) {
        let block = Block::default().borders(Borders::ALL).title("Status");
        let primary = if self.state.mode == Mode::Search {
            format!("Search: {}_", self.state.search_input)
        } else {
            self.state.status.clone()
        };
        let mut secondary = vec![Span::styled(
            "j/k move · / search · g genre · p platform · s sort · x clear · r refresh · o offline · q quit",
            Style::default().fg(self.theme.muted),
        )];
        if games.is_busy() && !games.items.is_empty() {
            secondary.push(Span::styled(
                "  · updating...",
                Style::default().fg(self.theme.accent),
            ));
        }
        // Stale items stay visible; a failed refetch only gets a note.
        if let (Some(err), false) = (&games.error, games.items.is_empty()) {
            secondary.push(Span::styled(
                format!("  · last fetch failed: {err}"),
                Style::default().fg(self.theme.warning),
            ));
        }
        let paragraph = Paragraph::new(vec![Line::from(primary), Line::from(secondary)])
            .block(block)
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }
}

fn metacritic_color(theme: &Theme, score: u32) -> Color {
    if score >= 75 {
        theme.success
    } else if score >= 60 {
        theme.warning
    } else {
        theme.danger
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor()?;
    Ok(())
}

fn spawn_input_thread(sender: mpsc::Sender<AppEvent>) {
    thread::spawn(move || loop {
        match event::poll(TICK_RATE) {
            Ok(true) => match event::read() {
                Ok(evt) => {
                    if sender.blocking_send(AppEvent::Input(evt)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            Ok(false) => {
                if sender.blocking_send(AppEvent::Tick).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    });
}

struct UiState {
    cursor: usize,
    list_height: usize,
    picker_cursor: usize,
    genre_query: String,
    search_input: String,
    status: String,
    mode: Mode,
    should_quit: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            cursor: 0,
            list_height: 1,
            picker_cursor: 0,
            genre_query: String::new(),
            search_input: String::new(),
            status: "Ready".to_string(),
            mode: Mode::Browse,
            should_quit: false,
        }
    }
}

impl UiState {
    fn set_status(&mut self, message: String) {
        self.status = message;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metacritic_bands() {
        let theme = Theme::default();
        assert_eq!(metacritic_color(&theme, 92), theme.success);
        assert_eq!(metacritic_color(&theme, 74), theme.warning);
        assert_eq!(metacritic_color(&theme, 40), theme.danger);
    }

    #[test]
    fn centered_rect_stays_inside_area() {
        let area = Rect::new(0, 0, 100, 50);
        let inner = centered_rect(50, 60, area);
        assert!(inner.x >= area.x && inner.right() <= area.right());
        assert!(inner.y >= area.y && inner.bottom() <= area.bottom());
        assert_eq!(inner.width, 50);
    }
}

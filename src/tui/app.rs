use anyhow::{Context, Result};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{
    io,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio_util::sync::CancellationToken;

use crate::{
    llm::LlmClient,
    session::{ChatSession, PendingTurn, SubmissionPolicy, SubmitError, TurnOutcome},
    tui::ui::render_ui,
};

/// Input mode for the TUI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// TUI application state
pub struct ChatApp {
    session: ChatSession,
    client: Arc<dyn LlmClient>,
    request_timeout: Option<Duration>,

    // Input state
    input: String,
    input_history: Vec<String>,
    input_history_index: usize,
    input_mode: InputMode,

    // Lines scrolled up from the bottom of the conversation
    scroll_back: u16,

    pending: Option<PendingTurn>,
}

impl ChatApp {
    pub fn new(
        client: Arc<dyn LlmClient>,
        policy: SubmissionPolicy,
        request_timeout: Option<Duration>,
    ) -> Self {
        Self {
            session: ChatSession::new(policy),
            client,
            request_timeout,
            input: String::new(),
            input_history: Vec::new(),
            input_history_index: 0,
            input_mode: InputMode::Editing,
            scroll_back: 0,
            pending: None,
        }
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn input_mode(&self) -> InputMode {
        self.input_mode
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }

    pub fn scroll_back(&self) -> u16 {
        self.scroll_back
    }

    fn handle_input(&mut self, c: char) {
        self.input.push(c);
    }

    fn backspace(&mut self) {
        self.input.pop();
    }

    fn scroll_up(&mut self, lines: u16) {
        self.scroll_back = self.scroll_back.saturating_add(lines);
    }

    fn scroll_down(&mut self, lines: u16) {
        self.scroll_back = self.scroll_back.saturating_sub(lines);
    }

    /// Go to the previous input in history
    fn previous_input(&mut self) {
        if self.input_history.is_empty() {
            return;
        }

        if self.input_history_index > 0 {
            self.input_history_index -= 1;
            self.input = self.input_history[self.input_history_index].clone();
        }
    }

    /// Go to the next input in history
    fn next_input(&mut self) {
        if self.input_history.is_empty() {
            return;
        }

        if self.input_history_index + 1 < self.input_history.len() {
            self.input_history_index += 1;
            self.input = self.input_history[self.input_history_index].clone();
        } else {
            self.input_history_index = self.input_history.len();
            self.input.clear();
        }
    }

    /// Log the current input as a user turn and queue it for the model.
    fn submit_message(&mut self) {
        match self.session.begin_turn(&self.input) {
            Ok(pending) => {
                if !self.input.trim().is_empty() {
                    self.input_history.push(self.input.clone());
                }
                self.input_history_index = self.input_history.len();
                self.input.clear();
                self.scroll_back = 0;
                self.pending = Some(pending);
            }
            Err(SubmitError::Empty) | Err(SubmitError::Busy) => {}
        }
    }

    /// Wait for the reply to the queued turn. Esc cancels the request.
    async fn process_response(&mut self) -> Result<()> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };

        let cancel = CancellationToken::new();
        let done = CancellationToken::new();
        let watcher = spawn_cancel_watcher(cancel.clone(), done.clone());

        let client = Arc::clone(&self.client);
        let outcome = self
            .session
            .complete_turn(pending, client.as_ref(), &cancel, self.request_timeout)
            .await;

        done.cancel();
        watcher
            .await
            .context("Cancel watcher panicked")?
            .context("Failed to read terminal events")?;

        if let TurnOutcome::Failed(err) = &outcome {
            tracing::debug!(kind = err.kind.as_str(), "Reply failed, notice shown");
        }

        Ok(())
    }
}

/// Polls the terminal for Esc while a request is in flight.
fn spawn_cancel_watcher(
    cancel: CancellationToken,
    done: CancellationToken,
) -> tokio::task::JoinHandle<io::Result<()>> {
    tokio::task::spawn_blocking(move || {
        while !done.is_cancelled() {
            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press && key.code == KeyCode::Esc {
                        cancel.cancel();
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    })
}

/// Run the TUI application
pub async fn run(
    client: Arc<dyn LlmClient>,
    policy: SubmissionPolicy,
    request_timeout: Option<Duration>,
) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = ChatApp::new(client, policy, request_timeout);
    tracing::info!(
        session = %app.session().id(),
        model = app.model_name(),
        "TUI started"
    );

    let tick_rate = Duration::from_millis(100);
    let result = run_app(&mut terminal, &mut app, tick_rate).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    tracing::info!(
        session = %app.session().id(),
        turns = app.session().log().len(),
        "TUI closed"
    );

    result
}

/// Main application loop
async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut ChatApp,
    tick_rate: Duration,
) -> Result<()> {
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| render_ui(f, app))?;

        // Handle events with timeout
        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if !app.is_loading() && event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match app.input_mode {
                        InputMode::Normal => match key.code {
                            KeyCode::Char('e') | KeyCode::Char('i') => {
                                app.input_mode = InputMode::Editing;
                            }
                            KeyCode::Char('q') => {
                                return Ok(());
                            }
                            KeyCode::Up | KeyCode::Char('k') => app.scroll_up(1),
                            KeyCode::Down | KeyCode::Char('j') => app.scroll_down(1),
                            _ => {}
                        },
                        InputMode::Editing => match key.code {
                            KeyCode::Enter => app.submit_message(),
                            KeyCode::Esc => {
                                app.input_mode = InputMode::Normal;
                            }
                            KeyCode::Char(c) => app.handle_input(c),
                            KeyCode::Backspace => app.backspace(),
                            KeyCode::Up => app.previous_input(),
                            KeyCode::Down => app.next_input(),
                            KeyCode::PageUp => app.scroll_up(10),
                            KeyCode::PageDown => app.scroll_down(10),
                            _ => {}
                        },
                    }
                }
            }
        }

        // The pending state has been drawn once; now block on the reply
        if app.is_loading() {
            app.process_response().await?;
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }
    }
}

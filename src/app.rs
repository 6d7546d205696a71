//! Terminal application: owns the conversation and drives the event loop.

use crate::assembler::{Assembler, SendOutcome};
use crate::client::ChatClient;
use crate::config::Config;
use crate::conversation::Conversation;
use crate::routing::RouteOverride;
use crate::ui::{get_help_text, Composer, ComposerResult, ParsedCommand, SlashCommand, Transcript};
use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::{Frame, Terminal};
use std::io;
use std::time::Duration;
use tracing::debug;

const INPUT_POLL: Duration = Duration::from_millis(33);

/// Restores the terminal even when the loop unwinds.
struct TerminalGuard;

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

/// Set up the terminal, run the chat session, restore the terminal.
pub async fn run(config: Config, route: RouteOverride) -> Result<()> {
    let client = ChatClient::new(&config).context("could not build the HTTP client")?;
    let mut app = App::new(&config, client, route);

    enable_raw_mode()?;
    let _guard = TerminalGuard;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = app.event_loop(&mut terminal).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result
}

pub struct App {
    conversation: Conversation,
    assembler: Assembler,
    composer: Composer,
    route: RouteOverride,
    notice: Option<String>,
    should_quit: bool,
}

impl App {
    pub fn new(config: &Config, client: ChatClient, route: RouteOverride) -> Self {
        let mut composer = Composer::new("Type a message, / for commands");
        composer.update_route(route);
        Self {
            conversation: Conversation::new(config.system_prompt.clone()),
            assembler: Assembler::new(client),
            composer,
            route,
            notice: None,
            should_quit: false,
        }
    }

    async fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> Result<()> {
        let mut needs_redraw = true;
        while !self.should_quit {
            if self.assembler.pump(&mut self.conversation) {
                needs_redraw = true;
            }

            if needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                needs_redraw = false;
            }

            if !event::poll(INPUT_POLL)? {
                continue;
            }
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    self.handle_key(key);
                    needs_redraw = true;
                }
                Event::Resize(_, _) => needs_redraw = true,
                _ => {}
            }
        }
        Ok(())
    }

    fn draw(&self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(10), Constraint::Length(3)])
            .split(frame.size());

        let transcript = Transcript::new(&self.conversation, self.assembler.phase())
            .with_error(self.assembler.last_error())
            .with_notice(self.notice.as_deref());
        frame.render_widget(transcript, chunks[0]);
        frame.render_widget(self.composer.clone(), chunks[1]);
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return;
        }

        if key.code == KeyCode::Esc && !self.composer.palette_open() {
            if self.assembler.last_error().is_some() {
                self.assembler.clear_error();
            } else {
                self.notice = None;
            }
            return;
        }

        match self.composer.handle_key(key) {
            ComposerResult::Submitted(text) => self.submit(&text),
            ComposerResult::Command(command) => self.run_command(command),
            ComposerResult::None => {}
        }
    }

    fn submit(&mut self, text: &str) {
        self.notice = None;
        match self
            .assembler
            .begin_send(&mut self.conversation, text, self.route.forced())
        {
            SendOutcome::Started(mode) => {
                self.composer.consume();
                debug!(mode = mode.label(), "message sent");
            }
            SendOutcome::Busy => {
                // Draft stays in the composer.
                self.notice = Some("Still replying, hang on.".to_string());
            }
            SendOutcome::IgnoredEmpty => {}
        }
    }

    fn run_command(&mut self, command: ParsedCommand) {
        if self.assembler.is_busy() && !command.command.available_while_busy() {
            self.composer.consume();
            self.notice = Some(format!(
                "/{} is not available while a reply is in flight",
                command.command.command()
            ));
            return;
        }

        match command.command {
            SlashCommand::Clear => {
                self.composer.consume();
                self.conversation.reset();
                self.assembler.clear_error();
                self.notice = None;
            }
            SlashCommand::Mode => {
                self.composer.consume();
                match command.route_target() {
                    Some(route) => {
                        self.route = route;
                        self.composer.update_route(route);
                        self.notice = Some(format!("Send mode: {}", route.label()));
                    }
                    None => {
                        self.notice = Some(format!(
                            "Usage: /mode <auto|whole|stream>  (now: {})",
                            self.route.label()
                        ));
                    }
                }
            }
            SlashCommand::Help => {
                self.composer.consume();
                self.notice = Some(get_help_text());
            }
            SlashCommand::Quit => {
                self.should_quit = true;
            }
        }
    }
}

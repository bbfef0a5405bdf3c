use anyhow::{Context, Result};
use crossterm::cursor::Show;
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use futures::TryStreamExt;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use ratatui::{Frame, Terminal};
use std::future::Future;
use std::io::{self, Stderr};

use crate::error::Error;
use crate::outcome::Outcome;

const ACCENT: Color = Color::Rgb(52, 211, 153);
const MUTED: Color = Color::Rgb(140, 156, 178);
const PANEL: Color = Color::Rgb(16, 27, 44);

type ChooserTerminal = Terminal<CrosstermBackend<Stderr>>;

/// Presents labelled options and reports the operator's choice.
///
/// An empty label list is valid input; how it is presented is up to the
/// implementation.
pub trait Chooser {
    fn choose(
        &mut self,
        title: &str,
        labels: &[String],
    ) -> impl Future<Output = Outcome<String>>;
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum PickerStep {
    Continue,
    Selected(String),
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct PickerState {
    labels: Vec<String>,
    filter: String,
    selected: usize,
}

impl PickerState {
    pub fn new(labels: &[String]) -> Self {
        Self {
            labels: labels.to_vec(),
            filter: String::new(),
            selected: 0,
        }
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn visible(&self) -> Vec<&str> {
        let query = self.filter.to_ascii_lowercase();
        self.labels
            .iter()
            .filter(|label| query.is_empty() || label.to_ascii_lowercase().contains(&query))
            .map(String::as_str)
            .collect()
    }

    pub fn selected_index(&self) -> Option<usize> {
        if self.visible().is_empty() {
            None
        } else {
            Some(self.selected)
        }
    }

    pub fn apply(&mut self, key: KeyEvent) -> PickerStep {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => PickerStep::Cancelled,
            KeyCode::Char('c') if ctrl => PickerStep::Cancelled,
            KeyCode::Up => self.move_by(-1),
            KeyCode::Char('p') if ctrl => self.move_by(-1),
            KeyCode::Down => self.move_by(1),
            KeyCode::Char('n') if ctrl => self.move_by(1),
            KeyCode::Enter => match self.visible().get(self.selected) {
                Some(label) => PickerStep::Selected(label.to_string()),
                None => PickerStep::Continue,
            },
            KeyCode::Backspace => {
                self.filter.pop();
                self.clamp();
                PickerStep::Continue
            }
            KeyCode::Char(c) if !ctrl => {
                self.filter.push(c);
                self.clamp();
                PickerStep::Continue
            }
            _ => PickerStep::Continue,
        }
    }

    fn move_by(&mut self, delta: isize) -> PickerStep {
        let len = self.visible().len();
        if len > 0 {
            self.selected = self.selected.saturating_add_signed(delta).min(len - 1);
        }
        PickerStep::Continue
    }

    fn clamp(&mut self) {
        self.selected = self.selected.min(self.visible().len().saturating_sub(1));
    }
}

/// Full-screen list picker drawn on stderr so stdout stays untouched.
#[derive(Debug, Default)]
pub struct TerminalChooser;

impl Chooser for TerminalChooser {
    async fn choose(&mut self, title: &str, labels: &[String]) -> Outcome<String> {
        match run_picker(title, labels).await {
            Ok(PickerStep::Selected(label)) => Outcome::Ok(label),
            Ok(_) => Outcome::Cancelled,
            Err(error) => Outcome::Failed(Error::Chooser(error)),
        }
    }
}

async fn run_picker(title: &str, labels: &[String]) -> Result<PickerStep> {
    let mut screen = PickerScreen::enter()?;
    let step = picker_loop(&mut screen.terminal, title, labels).await;
    let left = screen.leave();
    match (step, left) {
        (Err(error), Err(leave_error)) => {
            Err(error.context(format!("terminal restore also failed: {leave_error:#}")))
        }
        (step, left) => left.and(step),
    }
}

/// Raw mode plus the alternate screen for the lifetime of one prompt.
struct PickerScreen {
    terminal: ChooserTerminal,
}

impl PickerScreen {
    fn enter() -> Result<Self> {
        enable_raw_mode().context("terminal does not support raw mode")?;
        let opened = Self::open();
        if opened.is_err() {
            let _ = disable_raw_mode();
        }
        opened
    }

    fn open() -> Result<Self> {
        let mut stderr = io::stderr();
        execute!(stderr, EnterAlternateScreen).context("failed to switch to chooser screen")?;
        let mut terminal = Terminal::new(CrosstermBackend::new(stderr))
            .context("failed to attach chooser to stderr")?;
        terminal.clear().context("failed to clear chooser screen")?;
        Ok(Self { terminal })
    }

    /// Undoes both terminal modes even if one of them fails.
    fn leave(mut self) -> Result<()> {
        let raw = disable_raw_mode().context("failed to leave raw mode");
        let screen = execute!(self.terminal.backend_mut(), LeaveAlternateScreen, Show)
            .context("failed to return from chooser screen");
        raw.and(screen)
    }
}

async fn picker_loop(
    terminal: &mut ChooserTerminal,
    title: &str,
    labels: &[String],
) -> Result<PickerStep> {
    let mut state = PickerState::new(labels);
    let mut events = EventStream::new();
    loop {
        terminal
            .draw(|frame| render(frame, title, &state))
            .context("failed to render chooser")?;

        let event = events
            .try_next()
            .await
            .context("failed to read terminal event")?;
        let Some(event) = event else {
            return Ok(PickerStep::Cancelled);
        };
        let Event::Key(key) = event else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match state.apply(key) {
            PickerStep::Continue => {}
            step => return Ok(step),
        }
    }
}

fn render(frame: &mut Frame, title: &str, state: &PickerState) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(frame.area());

    let visible = state.visible();
    let items = if visible.is_empty() {
        vec![ListItem::new(Line::from(Span::styled(
            "(no matches)",
            Style::default().fg(MUTED),
        )))]
    } else {
        visible
            .iter()
            .map(|label| ListItem::new(label.to_string()))
            .collect()
    };

    let block = Block::default()
        .title(format!("{title} ({})", visible.len()))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(ACCENT))
        .style(Style::default().bg(PANEL));
    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Rgb(24, 36, 58))
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let mut list_state = ListState::default();
    list_state.select(state.selected_index());
    frame.render_stateful_widget(list, root[0], &mut list_state);

    let footer = Line::from(vec![
        Span::styled("filter: ", Style::default().fg(MUTED)),
        Span::raw(state.filter().to_string()),
        Span::styled(
            "   ↑/↓ move · enter select · esc cancel",
            Style::default().fg(MUTED),
        ),
    ]);
    frame.render_widget(Paragraph::new(footer), root[1]);
}

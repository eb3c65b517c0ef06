use std::io::{stdout, Stdout};
use std::time::{Duration, Instant};

use crate::gesture_set::Gesture;
use crate::gui::error::GuiError;
use crate::trial_scheduler::{PromptDisplay, TrialPhase};

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use log::warn;
use ratatui::{
    prelude::*,
    widgets::{
        block::{Position, Title},
        *,
    },
    Terminal,
};

/// Redrawing every wait slice would be wasteful; the countdown only needs
/// to move about this often.
const REDRAW_INTERVAL: Duration = Duration::from_millis(100);

enum View {
    Idle,
    Gesture {
        name: String,
        trial: usize,
        total: usize,
    },
    Rest {
        upcoming: Option<String>,
        trial: usize,
        total: usize,
    },
    Done,
}

/// The full-screen prompt the subject watches during a Position. Raw mode
/// and the alternate screen are held for the lifetime of the value and
/// restored on drop, whatever way the session ended.
pub struct TerminalPrompt {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    subject: String,
    position: u32,
    view: View,
    remaining: Duration,
    abort_requested: bool,
    last_draw: Option<Instant>,
}

impl TerminalPrompt {
    /// Take over the terminal and show the idle screen.
    pub fn new(subject: &str, position: u32) -> Result<Self, GuiError> {
        enable_raw_mode()?;
        stdout().execute(EnterAlternateScreen)?;
        let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
        terminal.clear()?;

        let mut prompt = Self {
            terminal,
            subject: subject.to_string(),
            position,
            view: View::Idle,
            remaining: Duration::ZERO,
            abort_requested: false,
            last_draw: None,
        };
        prompt.draw()?;
        Ok(prompt)
    }

    /// Block on the idle screen until the subject is ready. Returns false
    /// if they quit instead.
    pub fn wait_for_ready(&mut self) -> Result<bool, GuiError> {
        loop {
            self.draw()?;
            if event::poll(Duration::from_millis(100))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        match key.code {
                            KeyCode::Char(' ') => return Ok(true),
                            KeyCode::Char('q') => return Ok(false),
                            _ => {}
                        }
                    }
                }
            }
        }
    }

    fn draw(&mut self) -> Result<(), GuiError> {
        let heading = Title::from(
            format!(" MyoGrasp  {}  P{} ", self.subject, self.position)
                .magenta()
                .bold(),
        );
        let instructions = Title::from(Line::from(vec![
            " Abort ".into(),
            "<Q> ".magenta().bold(),
        ]));
        let block = Block::default()
            .title(heading.alignment(Alignment::Center))
            .title(
                instructions
                    .alignment(Alignment::Center)
                    .position(Position::Bottom),
            )
            .borders(Borders::ALL);

        let seconds_left = self.remaining.as_secs_f32().ceil() as u64;
        let lines: Vec<Line> = match &self.view {
            View::Idle => vec![
                Line::from(""),
                Line::from("A series of gesture prompts will appear on this screen."),
                Line::from("Perform the gesture only while PERFORM is shown above it."),
                Line::from("Relax your arm between gestures."),
                Line::from(""),
                Line::from("(Press space when ready.)".bold()),
            ],
            View::Gesture { name, trial, total } => vec![
                Line::from(""),
                Line::from("PERFORM".green().bold()),
                Line::from(""),
                Line::from(name.clone().magenta().bold()),
                Line::from(""),
                Line::from(format!("hold for {}s", seconds_left)),
                Line::from(format!("trial {} of {}", trial + 1, total)),
            ],
            View::Rest { upcoming, trial, total } => {
                let next = match upcoming {
                    Some(name) => format!("next gesture in {}s: {}", seconds_left, name),
                    None => format!("finishing in {}s", seconds_left),
                };
                vec![
                    Line::from(""),
                    Line::from("REST".cyan().bold()),
                    Line::from(""),
                    Line::from(next),
                    Line::from(format!("trial {} of {}", trial + 1, total)),
                ]
            }
            View::Done => vec![
                Line::from(""),
                Line::from("Recording complete!".green().bold()),
                Line::from(""),
                Line::from("You can relax now."),
            ],
        };

        let body = Paragraph::new(lines)
            .alignment(Alignment::Center)
            .block(block);
        self.terminal.draw(|frame| {
            let area = frame.size();
            frame.render_widget(body, area);
        })?;
        self.last_draw = Some(Instant::now());
        Ok(())
    }

    fn draw_or_warn(&mut self) {
        if let Err(e) = self.draw() {
            warn!("prompt redraw failed: {}", e);
        }
    }
}

impl PromptDisplay for TerminalPrompt {
    fn show_gesture(&mut self, gesture: &Gesture, trial: usize, total: usize) {
        self.view = View::Gesture {
            name: gesture.name.clone(),
            trial,
            total,
        };
        self.draw_or_warn();
    }

    fn show_rest(&mut self, upcoming: Option<&str>, trial: usize, total: usize) {
        self.view = View::Rest {
            upcoming: upcoming.map(str::to_string),
            trial,
            total,
        };
        self.draw_or_warn();
    }

    fn show_done(&mut self) {
        self.view = View::Done;
        self.draw_or_warn();
    }

    fn tick(&mut self, _phase: TrialPhase, remaining: Duration) {
        self.remaining = remaining;
        let due = self
            .last_draw
            .map(|at| at.elapsed() >= REDRAW_INTERVAL)
            .unwrap_or(true);
        if due {
            self.draw_or_warn();
        }
    }

    fn poll_abort(&mut self) -> bool {
        if !self.abort_requested {
            // Zero-timeout poll; the scheduler's wait slice is the pacing.
            while event::poll(Duration::ZERO).unwrap_or(false) {
                if let Ok(Event::Key(key)) = event::read() {
                    if key.kind == KeyEventKind::Press && key.code == KeyCode::Char('q') {
                        self.abort_requested = true;
                    }
                }
            }
        }
        self.abort_requested
    }
}

impl Drop for TerminalPrompt {
    fn drop(&mut self) {
        // Best effort; there is no one left to report the error to.
        let _ = disable_raw_mode();
        let _ = stdout().execute(LeaveAlternateScreen);
    }
}

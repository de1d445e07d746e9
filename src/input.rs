use crate::sim::Action;
use crossterm::event::{
    self, Event, KeyCode, KeyEventKind, KeyModifiers, MouseButton, MouseEventKind,
};
use std::time::{Duration, Instant};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum InputEvent {
    Key { key: KeyCode, mods: KeyModifiers },
    Click { col: u16, row: u16 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Command {
    Act(Action),
    /// Tap the character without aiming.
    Tap,
    /// Mouse click in terminal cells; still needs a hit-test.
    ClickAt { col: u16, row: u16 },
    SimulateOffline,
    SimulateNewDay,
    ResetSave,
    Quit,
}

pub(crate) fn collect_input_nonblocking(max_frame_time: Duration) -> anyhow::Result<Vec<InputEvent>> {
    let mut out = Vec::new();

    // poll with a tiny timeout so we stay responsive
    let timeout = std::cmp::min(Duration::from_millis(1), max_frame_time);
    while event::poll(timeout)? {
        match event::read()? {
            Event::Key(k) if k.kind == KeyEventKind::Press => out.push(InputEvent::Key {
                key: k.code,
                mods: k.modifiers,
            }),
            Event::Mouse(m) if m.kind == MouseEventKind::Down(MouseButton::Left) => {
                out.push(InputEvent::Click {
                    col: m.column,
                    row: m.row,
                })
            }
            _ => {}
        }
        if out.len() >= 32 {
            break;
        }
    }
    Ok(out)
}

pub(crate) fn map_event(ev: &InputEvent) -> Option<Command> {
    let (key, mods) = match ev {
        InputEvent::Click { col, row } => {
            return Some(Command::ClickAt {
                col: *col,
                row: *row,
            })
        }
        InputEvent::Key { key, mods } => (*key, *mods),
    };

    if key == KeyCode::Char('c') && mods.contains(KeyModifiers::CONTROL) {
        return Some(Command::Quit);
    }

    match key {
        KeyCode::Char('1') | KeyCode::Char('p') | KeyCode::Char('P') => {
            Some(Command::Act(Action::Pc))
        }
        KeyCode::Char('2') | KeyCode::Char('e') | KeyCode::Char('E') => {
            Some(Command::Act(Action::Eat))
        }
        KeyCode::Char('3') | KeyCode::Char('d') | KeyCode::Char('D') => {
            Some(Command::Act(Action::Drink))
        }
        KeyCode::Char('4') | KeyCode::Char('m') | KeyCode::Char('M') => {
            Some(Command::Act(Action::Music))
        }
        KeyCode::Char('t') | KeyCode::Char('T') | KeyCode::Char(' ') => Some(Command::Tap),
        KeyCode::Char('o') | KeyCode::Char('O') => Some(Command::SimulateOffline),
        KeyCode::Char('n') | KeyCode::Char('N') => Some(Command::SimulateNewDay),
        KeyCode::Char('r') | KeyCode::Char('R') => Some(Command::ResetSave),
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => Some(Command::Quit),
        _ => None,
    }
}

/// Swallows repeated action presses inside a short window. Only the four action
/// commands go through it.
pub(crate) struct ActionCooldown {
    window: Duration,
    busy_until: Option<Instant>,
}

impl ActionCooldown {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            window,
            busy_until: None,
        }
    }

    pub(crate) fn is_active(&self, now: Instant) -> bool {
        self.busy_until.is_some_and(|t| now < t)
    }

    /// Returns false (and changes nothing) while the window is still open.
    pub(crate) fn try_begin(&mut self, now: Instant) -> bool {
        if self.is_active(now) {
            return false;
        }
        self.busy_until = Some(now + self.window);
        true
    }
}

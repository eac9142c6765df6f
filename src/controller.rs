use std::time::Duration;
use tracing::trace;

use crate::domain::{Message, ViewerError};
use ratatui::crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};

pub struct Controller {
    event_poll_time: u64,
}

impl Controller {
    pub fn new(event_poll_time: u64) -> Self {
        Self { event_poll_time }
    }

    /// Waits up to the poll time for a terminal event. While a command line
    /// is active every key is forwarded raw.
    pub fn handle_event(&self, raw_keys: bool) -> Result<Option<Message>, ViewerError> {
        if !event::poll(Duration::from_millis(self.event_poll_time))? {
            return Ok(None);
        }
        let message = match event::read()? {
            Event::Key(key) if key.kind == event::KeyEventKind::Press => {
                if raw_keys {
                    Some(Message::RawKey(key))
                } else {
                    Self::handle_key(key)
                }
            }
            Event::Resize(width, height) => Some(Message::Resize(width, height)),
            _ => None,
        };
        Ok(message)
    }

    pub fn handle_key(key: KeyEvent) -> Option<Message> {
        let message = match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(Message::Quit),
            (KeyCode::Char('q'), _) => Some(Message::Quit),
            (KeyCode::Char('j') | KeyCode::Down, _) => Some(Message::MoveDown),
            (KeyCode::Char('k') | KeyCode::Up, _) => Some(Message::MoveUp),
            (KeyCode::Char('h') | KeyCode::Left, _) => Some(Message::MoveLeft),
            (KeyCode::Char('l') | KeyCode::Right, _) => Some(Message::MoveRight),
            (KeyCode::PageDown, _) => Some(Message::MovePageDown),
            (KeyCode::PageUp, _) => Some(Message::MovePageUp),
            (KeyCode::Char('g') | KeyCode::Home, _) => Some(Message::MoveBeginning),
            (KeyCode::Char('G') | KeyCode::End, _) => Some(Message::MoveEnd),
            (KeyCode::Char('s'), _) => Some(Message::ToggleSort),
            (KeyCode::Char('S'), _) => Some(Message::AddSort),
            (KeyCode::Char('f'), _) => Some(Message::Filter),
            (KeyCode::Char('>'), _) => Some(Message::FilterGreater),
            (KeyCode::Char('<'), _) => Some(Message::FilterLess),
            (KeyCode::Char('c'), _) => Some(Message::ClearFilters),
            (KeyCode::Char('+'), _) => Some(Message::Widen),
            (KeyCode::Char('-'), _) => Some(Message::Narrow),
            (KeyCode::Char('p'), _) => Some(Message::TogglePin),
            (KeyCode::Char('x'), _) => Some(Message::HideColumn),
            (KeyCode::Char('X'), _) => Some(Message::ShowColumns),
            (KeyCode::Char('n'), _) => Some(Message::NextPage),
            (KeyCode::Char('N'), _) => Some(Message::PrevPage),
            (KeyCode::Char(' '), _) => Some(Message::ToggleSelection),
            (KeyCode::Char('o'), _) => Some(Message::GroupByColumn),
            (KeyCode::Enter, _) => Some(Message::Enter),
            (KeyCode::Char('e'), _) => Some(Message::Edit),
            (KeyCode::Char('y'), _) => Some(Message::CopyCell),
            (KeyCode::Char('w'), _) => Some(Message::WriteState),
            (KeyCode::Char('r'), _) => Some(Message::Refresh),
            (KeyCode::Char('?'), _) => Some(Message::Help),
            (KeyCode::Esc, _) => Some(Message::Exit),
            _ => None,
        };
        trace!("Mapped: {key:?} => {message:?}");
        message
    }
}

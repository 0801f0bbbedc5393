use std::time::Duration;
use tracing::trace;

use crate::domain::{DashConfig, DashError, Message};
use ratatui::crossterm::event::{self, Event, KeyCode};

pub struct Controller {
    event_poll_time: u64,
}

impl Controller {
    pub fn new(cfg: &DashConfig) -> Self {
        Self {
            event_poll_time: cfg.event_poll_time,
        }
    }

    pub fn handle_event(&self) -> Result<Option<Message>, DashError> {
        if event::poll(Duration::from_millis(self.event_poll_time))?
            && let Event::Key(key) = event::read()?
            && key.kind == event::KeyEventKind::Press
        {
            return Ok(Self::handle_key(key));
        }
        Ok(None)
    }

    fn handle_key(key: event::KeyEvent) -> Option<Message> {
        let message = match key.code {
            KeyCode::Char('q') => Some(Message::Quit),
            KeyCode::Char('m') => Some(Message::NextModel),
            KeyCode::Char('M') => Some(Message::PreviousModel),
            KeyCode::Char('y') => Some(Message::NextYear),
            KeyCode::Char('Y') => Some(Message::PreviousYear),
            KeyCode::Right | KeyCode::Char('l') | KeyCode::PageDown => Some(Message::NextPage),
            KeyCode::Left | KeyCode::Char('h') | KeyCode::PageUp => Some(Message::PreviousPage),
            KeyCode::Char('+') => Some(Message::GrowPageSize),
            KeyCode::Char('-') => Some(Message::ShrinkPageSize),
            KeyCode::Char('c') => Some(Message::ToggleCharts),
            KeyCode::Char('f') => Some(Message::ToggleFixedLayout),
            KeyCode::Char('x') => Some(Message::CopyPage),
            KeyCode::Char('r') => Some(Message::Reload),
            KeyCode::Char('?') => Some(Message::Help),
            KeyCode::Esc => Some(Message::Exit),
            _ => None,
        };
        trace!("Mapped: {key:?} => {message:?}");
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::{KeyEvent, KeyModifiers};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn navigation_keys() {
        assert_eq!(Controller::handle_key(key(KeyCode::Right)), Some(Message::NextPage));
        assert_eq!(Controller::handle_key(key(KeyCode::Char('h'))), Some(Message::PreviousPage));
        assert_eq!(Controller::handle_key(key(KeyCode::Char('+'))), Some(Message::GrowPageSize));
    }

    #[test]
    fn filter_keys_distinguish_case() {
        assert_eq!(Controller::handle_key(key(KeyCode::Char('m'))), Some(Message::NextModel));
        assert_eq!(Controller::handle_key(key(KeyCode::Char('M'))), Some(Message::PreviousModel));
        assert_eq!(Controller::handle_key(key(KeyCode::Char('Y'))), Some(Message::PreviousYear));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        assert_eq!(Controller::handle_key(key(KeyCode::Char('z'))), None);
        assert_eq!(Controller::handle_key(key(KeyCode::Tab)), None);
    }
}

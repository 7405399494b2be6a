use std::collections::{HashMap, VecDeque};
use std::io;
use std::time::{Duration, Instant};

use crossterm::event::{poll, read, Event, KeyCode, KeyEvent, KeyModifiers};
use log::trace;

use crate::keymap::RESET_SYMBOL;

/// What the host reacts to, independent of where the keys came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// a platform key symbol went down or up
    Key { symbol: String, pressed: bool },
    /// the hard reset symbol
    Reset,
    /// switch to the next catalog entry
    NextRom,
    Quit,
}

impl InputEvent {
    pub fn key(symbol: &str, pressed: bool) -> Self {
        InputEvent::Key {
            symbol: symbol.to_string(),
            pressed,
        }
    }
}

/// reads input events
pub trait Input {
    /// wait up to `timeout` for input, returning whatever arrived (maybe
    /// nothing)
    fn poll_events(&mut self, timeout: Duration) -> Result<Vec<InputEvent>, io::Error>;
}

/// Terminal keyboard via crossterm. Terminals only report presses, so a
/// held symbol is released once `hold` passes without it repeating.
/// Expects the terminal to be in raw mode already.
pub struct TermInput {
    hold: Duration,
    held: HashMap<String, Instant>,
}

impl TermInput {
    pub fn new(hold: Duration) -> Self {
        TermInput {
            hold,
            held: HashMap::new(),
        }
    }

    fn translate(&mut self, key: KeyEvent, now: Instant, out: &mut Vec<InputEvent>) {
        let symbol = match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                out.push(InputEvent::Quit);
                return;
            }
            KeyCode::Esc => {
                out.push(InputEvent::Quit);
                return;
            }
            KeyCode::Tab => {
                out.push(InputEvent::NextRom);
                return;
            }
            KeyCode::Backspace => RESET_SYMBOL.to_string(),
            KeyCode::Char(c) => c.to_string(),
            KeyCode::F(n) => format!("F{n}"),
            other => match named_key(other) {
                Some(name) => name.to_string(),
                None => {
                    trace!("ignoring key {:?}", other);
                    return;
                }
            },
        };
        if symbol == RESET_SYMBOL {
            out.push(InputEvent::Reset);
            return;
        }
        if self.held.insert(symbol.clone(), now + self.hold).is_none() {
            out.push(InputEvent::Key {
                symbol,
                pressed: true,
            });
        }
    }

    fn release_expired(&mut self, now: Instant, out: &mut Vec<InputEvent>) {
        let mut expired: Vec<String> = self
            .held
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(symbol, _)| symbol.clone())
            .collect();
        expired.sort();
        for symbol in expired {
            self.held.remove(&symbol);
            out.push(InputEvent::Key {
                symbol,
                pressed: false,
            });
        }
    }
}

/// browser `KeyboardEvent.key` names, which is what catalog mappings use
fn named_key(code: KeyCode) -> Option<&'static str> {
    Some(match code {
        KeyCode::Left => "ArrowLeft",
        KeyCode::Right => "ArrowRight",
        KeyCode::Up => "ArrowUp",
        KeyCode::Down => "ArrowDown",
        KeyCode::Enter => "Enter",
        KeyCode::Delete => "Delete",
        KeyCode::Insert => "Insert",
        KeyCode::Home => "Home",
        KeyCode::End => "End",
        KeyCode::PageUp => "PageUp",
        KeyCode::PageDown => "PageDown",
        _ => return None,
    })
}

impl Input for TermInput {
    fn poll_events(&mut self, timeout: Duration) -> Result<Vec<InputEvent>, io::Error> {
        let now = Instant::now();
        let wait = self
            .held
            .values()
            .min()
            .map_or(timeout, |first| timeout.min(first.saturating_duration_since(now)));

        let mut events = Vec::new();
        let mut ready = poll(wait)?;
        while ready {
            if let Event::Key(key) = read()? {
                self.translate(key, Instant::now(), &mut events);
            }
            ready = poll(Duration::from_millis(0))?;
        }
        self.release_expired(Instant::now(), &mut events);
        Ok(events)
    }
}

/// canned Input for testing; each poll hands out the next batch
pub struct ScriptedInput {
    batches: VecDeque<Vec<InputEvent>>,
}

impl ScriptedInput {
    pub fn new(batches: Vec<Vec<InputEvent>>) -> Self {
        ScriptedInput {
            batches: batches.into(),
        }
    }
}

impl Input for ScriptedInput {
    fn poll_events(&mut self, _timeout: Duration) -> Result<Vec<InputEvent>, io::Error> {
        Ok(self.batches.pop_front().unwrap_or_default())
    }
}

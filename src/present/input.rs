use crate::error::SinkError;
use crate::lifecycle::StopSignal;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::time::Duration;
use tracing::{debug, error, info};

/// Input observed between presenter iterations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Quit,
    Key(char),
    /// The supervisor asked the presenter to stop
    Stop,
}

/// Polled once per presenter iteration
pub trait InputSource: Send {
    fn poll_event(&mut self) -> Result<Option<InputEvent>, SinkError>;
}

/// Terminal keyboard in raw mode. `q`, Esc and Ctrl-C quit.
pub struct KeyboardInput {
    timeout: Duration,
}

impl KeyboardInput {
    /// Put the terminal in raw mode; it is restored on drop
    pub fn enable(timeout: Duration) -> Result<Self, SinkError> {
        enable_raw_mode().map_err(SinkError::Input)?;
        info!("Keyboard input active - press q or Esc to quit");
        Ok(Self { timeout })
    }
}

impl InputSource for KeyboardInput {
    fn poll_event(&mut self) -> Result<Option<InputEvent>, SinkError> {
        if !event::poll(self.timeout).map_err(SinkError::Input)? {
            return Ok(None);
        }

        let key = match event::read().map_err(SinkError::Input)? {
            Event::Key(key) if key.kind == KeyEventKind::Press => key,
            _ => return Ok(None),
        };

        let input = match key.code {
            KeyCode::Char('q') | KeyCode::Esc => InputEvent::Quit,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                InputEvent::Quit
            }
            KeyCode::Char(c) => InputEvent::Key(c),
            other => {
                debug!("Ignoring key {:?}", other);
                return Ok(None);
            }
        };

        Ok(Some(input))
    }
}

impl Drop for KeyboardInput {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            error!("Failed to disable raw mode: {}", e);
        } else {
            debug!("Raw mode disabled");
        }
    }
}

/// Reports a supervisor stop as [`InputEvent::Stop`]
pub struct StopInput {
    stop: StopSignal,
}

impl StopInput {
    pub fn new(stop: StopSignal) -> Self {
        Self { stop }
    }
}

impl InputSource for StopInput {
    fn poll_event(&mut self) -> Result<Option<InputEvent>, SinkError> {
        Ok(self.stop.is_stopped().then_some(InputEvent::Stop))
    }
}

/// Polls each source in order and returns the first event
#[derive(Default)]
pub struct InputChain {
    sources: Vec<Box<dyn InputSource>>,
}

impl InputChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source: Box<dyn InputSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl InputSource for InputChain {
    fn poll_event(&mut self) -> Result<Option<InputEvent>, SinkError> {
        for source in &mut self.sources {
            if let Some(event) = source.poll_event()? {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }
}

//! Non-blocking keyboard interrupt for the binning loop.
//!
//! Binning a large image can run for minutes; the guard lets the user abort
//! cleanly with Esc between bin-growth steps. When stdin is not a terminal
//! (batch runs, pipelines) the guard never arms and every poll reports no
//! interrupt.

use std::io::IsTerminal;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode};
use crossterm::terminal;

/// Raw-mode guard polling for Esc. Restores the terminal on drop.
pub struct InterruptGuard {
    active: bool,
}

impl InterruptGuard {
    pub fn new() -> Self {
        let active = std::io::stdin().is_terminal() && terminal::enable_raw_mode().is_ok();
        if active {
            log::info!("press Esc to abort binning");
        }
        Self { active }
    }

    /// Has Esc been pressed since the last poll? Never blocks.
    pub fn interrupted(&self) -> bool {
        if !self.active {
            return false;
        }
        while event::poll(Duration::from_millis(0)).unwrap_or(false) {
            if let Ok(Event::Key(key)) = event::read() {
                if key.code == KeyCode::Esc {
                    return true;
                }
            } else {
                break;
            }
        }
        false
    }
}

impl Default for InterruptGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        if self.active {
            let _ = terminal::disable_raw_mode();
        }
    }
}

use super::backend::ShellSignal;
use super::MAX_INPUT_LINE_CHARS;

/// Map a terminal control character to the signal it stands for
pub fn control_signal(c: char) -> Option<ShellSignal> {
    match c {
        '\x03' => Some(ShellSignal::Interrupt),
        '\x1a' => Some(ShellSignal::Stop),
        '\x1c' => Some(ShellSignal::Quit),
        _ => None,
    }
}

/// Signals requested by the control characters in `data`, in order
pub fn control_signals(data: &str) -> Vec<ShellSignal> {
    data.chars().filter_map(control_signal).collect()
}

/// Result of feeding input through an [`InputLine`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LineEvent {
    /// A line reading `exit` or `logout` was just terminated
    pub exit_requested: bool,
}

/// Shadow of the line being typed at the shell prompt.
///
/// Only used to notice `exit`/`logout`; the shell itself still gets every
/// byte. Backspace pops a character, a newline clears the line, other
/// control characters are ignored. The buffer is bounded.
#[derive(Debug, Clone, Default)]
pub struct InputLine {
    buffer: String,
    len: usize,
}

impl InputLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, data: &str) -> LineEvent {
        let mut event = LineEvent::default();

        for c in data.chars() {
            match c {
                '\r' | '\n' => {
                    if self.is_exit_command() {
                        event.exit_requested = true;
                    }
                    self.clear();
                }
                '\x7f' | '\x08' => {
                    if self.buffer.pop().is_some() {
                        self.len -= 1;
                    }
                }
                c if c.is_control() => {}
                c => {
                    if self.len < MAX_INPUT_LINE_CHARS {
                        self.buffer.push(c);
                        self.len += 1;
                    }
                }
            }
        }

        event
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    fn is_exit_command(&self) -> bool {
        let line = self.buffer.trim();
        line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("logout")
    }

    fn clear(&mut self) {
        self.buffer.clear();
        self.len = 0;
    }
}

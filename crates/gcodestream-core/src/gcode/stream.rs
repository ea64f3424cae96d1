//! Command sources for program streaming

use std::collections::VecDeque;

use super::GcodeCommand;

/// A finite, single-pass sequence of commands
///
/// Consumed front to back. Every element is handed out at most once and the
/// source cannot be rewound.
pub trait CommandSource: Send {
    /// Next command, or `None` once the source is exhausted
    fn next_command(&mut self) -> Option<GcodeCommand>;

    /// Commands not yet handed out
    fn remaining(&self) -> usize;

    /// Total number of commands in the source
    fn size(&self) -> usize;

    /// Check if the source is exhausted
    fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }
}

/// Command source backed by program text held in memory
///
/// Lines are trimmed; blank lines are skipped and do not count toward `size`.
#[derive(Debug, Clone)]
pub struct StringStreamReader {
    lines: VecDeque<(u32, String)>,
    size: usize,
}

impl StringStreamReader {
    /// Create a reader over newline separated program text
    pub fn new(program: &str) -> Self {
        Self::from_lines(program.lines())
    }

    /// Create a reader over individual lines
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let lines: VecDeque<(u32, String)> = lines
            .into_iter()
            .enumerate()
            .filter_map(|(idx, line)| {
                let line = line.as_ref().trim();
                (!line.is_empty()).then(|| (idx as u32 + 1, line.to_string()))
            })
            .collect();
        let size = lines.len();
        Self { lines, size }
    }
}

impl CommandSource for StringStreamReader {
    fn next_command(&mut self) -> Option<GcodeCommand> {
        self.lines
            .pop_front()
            .map(|(line_number, text)| GcodeCommand::new(text).with_line_number(line_number))
    }

    fn remaining(&self) -> usize {
        self.lines.len()
    }

    fn size(&self) -> usize {
        self.size
    }
}

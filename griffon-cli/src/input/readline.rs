//! Line editing for the shell prompt using crossterm
//!
//! On a terminal the line is read in raw mode with history (Up/Down), cursor
//! movement (Left/Right/Home/End) and Backspace/Delete. When stdin is not a
//! terminal, lines are read as-is so the shell can be scripted.

use std::io::{self, IsTerminal, Stdout, Write};

use crossterm::{
    ExecutableCommand,
    cursor::MoveToColumn,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{self, ClearType},
};

use super::InputHistory;

pub enum ReadlineResult {
    Line(String),
    /// Ctrl+C; the current line is discarded
    Interrupted,
    /// Ctrl+D on an empty line, or end of piped input
    Eof,
}

pub struct Readline {
    history: InputHistory,
    prompt: String,
}

/// Disables raw mode when dropped, also on early return
struct RawMode;

impl RawMode {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

impl Readline {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            history: InputHistory::new(),
            prompt: prompt.into(),
        }
    }

    /// Print the prompt and read one line
    pub fn readline(&mut self) -> io::Result<ReadlineResult> {
        let mut stdout = io::stdout();
        print!("{}", self.prompt);
        stdout.flush()?;

        if !io::stdin().is_terminal() {
            return self.read_line_plain();
        }

        let result = {
            let _raw = RawMode::enable()?;
            self.read_line_raw(&mut stdout)
        };
        println!();
        result
    }

    fn read_line_plain(&mut self) -> io::Result<ReadlineResult> {
        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            return Ok(ReadlineResult::Eof);
        }
        let line = input.trim_end().to_string();
        self.history.push(&line);
        Ok(ReadlineResult::Line(line))
    }

    fn read_line_raw(&mut self, stdout: &mut Stdout) -> io::Result<ReadlineResult> {
        let mut line = LineBuffer::default();
        let prompt_width = self.prompt.chars().count() as u16;

        loop {
            let Event::Key(key) = event::read()? else {
                continue;
            };
            if key.kind == KeyEventKind::Release {
                continue;
            }

            match key {
                KeyEvent {
                    code: KeyCode::Char('c'),
                    modifiers: KeyModifiers::CONTROL,
                    ..
                } => return Ok(ReadlineResult::Interrupted),
                KeyEvent {
                    code: KeyCode::Char('d'),
                    modifiers: KeyModifiers::CONTROL,
                    ..
                } => {
                    if line.is_empty() {
                        return Ok(ReadlineResult::Eof);
                    }
                }
                KeyEvent {
                    code: KeyCode::Enter,
                    ..
                } => {
                    let text = line.text();
                    self.history.push(&text);
                    return Ok(ReadlineResult::Line(text));
                }
                KeyEvent { code: KeyCode::Up, .. } => {
                    if let Some(entry) = self.history.older(&line.text()).map(str::to_string) {
                        line.replace(&entry);
                    }
                }
                KeyEvent {
                    code: KeyCode::Down,
                    ..
                } => {
                    if let Some(entry) = self.history.newer().map(str::to_string) {
                        line.replace(&entry);
                    }
                }
                KeyEvent {
                    code: KeyCode::Left,
                    ..
                } => line.left(),
                KeyEvent {
                    code: KeyCode::Right,
                    ..
                } => line.right(),
                KeyEvent {
                    code: KeyCode::Home,
                    ..
                } => line.cursor = 0,
                KeyEvent { code: KeyCode::End, .. } => line.cursor = line.chars.len(),
                KeyEvent {
                    code: KeyCode::Backspace,
                    ..
                } => line.backspace(),
                KeyEvent {
                    code: KeyCode::Delete,
                    ..
                } => line.delete(),
                KeyEvent {
                    code: KeyCode::Char(c),
                    modifiers,
                    ..
                } if !modifiers.contains(KeyModifiers::CONTROL) => line.insert(c),
                _ => continue,
            }
            redraw(stdout, prompt_width, &line)?;
        }
    }
}

fn redraw(stdout: &mut Stdout, prompt_width: u16, line: &LineBuffer) -> io::Result<()> {
    stdout.execute(MoveToColumn(prompt_width))?;
    stdout.execute(terminal::Clear(ClearType::UntilNewLine))?;
    print!("{}", line.text());
    stdout.execute(MoveToColumn(prompt_width + line.cursor as u16))?;
    stdout.flush()
}

/// Edited line with a cursor counted in characters
#[derive(Debug, Default)]
struct LineBuffer {
    chars: Vec<char>,
    cursor: usize,
}

impl LineBuffer {
    fn text(&self) -> String {
        self.chars.iter().collect()
    }

    fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    fn replace(&mut self, text: &str) {
        self.chars = text.chars().collect();
        self.cursor = self.chars.len();
    }

    fn insert(&mut self, c: char) {
        self.chars.insert(self.cursor, c);
        self.cursor += 1;
    }

    fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            self.chars.remove(self.cursor);
        }
    }

    fn delete(&mut self) {
        if self.cursor < self.chars.len() {
            self.chars.remove(self.cursor);
        }
    }

    fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.chars.len());
    }
}

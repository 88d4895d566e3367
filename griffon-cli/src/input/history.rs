//! Shell command history for up/down navigation

#[derive(Debug, Default)]
pub struct InputHistory {
    entries: Vec<String>,
    /// Entry shown while navigating; `None` when editing a fresh line
    position: Option<usize>,
    /// Line being edited before navigation started
    draft: String,
}

impl InputHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a submitted line; blank lines and immediate repeats are skipped
    pub fn push(&mut self, line: &str) {
        let line = line.trim();
        if !line.is_empty() && self.entries.last().map(String::as_str) != Some(line) {
            self.entries.push(line.to_string());
        }
        self.position = None;
    }

    /// Step to an older entry, remembering `current` as the draft
    pub fn older(&mut self, current: &str) -> Option<&str> {
        let next = match self.position {
            None if !self.entries.is_empty() => {
                self.draft = current.to_string();
                self.entries.len() - 1
            }
            Some(pos) if pos > 0 => pos - 1,
            _ => return None,
        };
        self.position = Some(next);
        Some(&self.entries[next])
    }

    /// Step to a newer entry, ending at the draft
    pub fn newer(&mut self) -> Option<&str> {
        let pos = self.position?;
        if pos + 1 >= self.entries.len() {
            self.position = None;
            return Some(&self.draft);
        }
        self.position = Some(pos + 1);
        Some(&self.entries[pos + 1])
    }
}

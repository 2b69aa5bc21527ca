use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SearchOutcome {
    Editing,
    Applied(String),
    Cancelled,
}

/// Single-line search prompt. Edits are local until Enter applies them.
#[derive(Clone, Debug, Default)]
pub struct SearchInput {
    text: String,
    cursor: usize,
}

impl SearchInput {
    pub fn with_text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            cursor: text.chars().count(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Cursor position in characters.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> SearchOutcome {
        match key.code {
            KeyCode::Enter => return SearchOutcome::Applied(self.text.trim().to_string()),
            KeyCode::Esc => return SearchOutcome::Cancelled,
            KeyCode::Backspace => self.backspace(),
            KeyCode::Delete => self.delete_forward(),
            KeyCode::Left => self.cursor = self.cursor.saturating_sub(1),
            KeyCode::Right => self.cursor = (self.cursor + 1).min(self.len()),
            KeyCode::Home => self.cursor = 0,
            KeyCode::End => self.cursor = self.len(),
            KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.text.clear();
                self.cursor = 0;
            }
            KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.insert(ch);
            }
            _ => {}
        }
        SearchOutcome::Editing
    }

    pub fn insert_str(&mut self, text: &str) {
        for ch in text.chars() {
            self.insert(ch);
        }
    }

    fn insert(&mut self, ch: char) {
        let ch = if ch.is_control() { ' ' } else { ch };
        let at = byte_index(&self.text, self.cursor);
        self.text.insert(at, ch);
        self.cursor += 1;
    }

    fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.cursor -= 1;
        let at = byte_index(&self.text, self.cursor);
        self.text.remove(at);
    }

    fn delete_forward(&mut self) {
        if self.cursor >= self.len() {
            return;
        }
        let at = byte_index(&self.text, self.cursor);
        self.text.remove(at);
    }

    fn len(&self) -> usize {
        self.text.chars().count()
    }
}

fn byte_index(text: &str, char_index: usize) -> usize {
    text.char_indices()
        .nth(char_index)
        .map_or(text.len(), |(index, _)| index)
}

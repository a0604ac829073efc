use super::{Key, Picker, Row, Step};

/// Pick one entry out of a flat list.
pub struct SingleSelect {
    title: String,
    labels: Vec<String>,
    current: usize,
}

impl SingleSelect {
    pub fn new(title: impl Into<String>, labels: Vec<String>) -> Self {
        Self {
            title: title.into(),
            labels,
            current: 0,
        }
    }
}

impl Picker for SingleSelect {
    /// Index of the chosen label; `None` when the list is empty.
    type Output = Option<usize>;

    fn title(&self) -> &str {
        &self.title
    }

    fn footer(&self) -> &str {
        "Up/Down: move  Enter: select  q/ESC: cancel"
    }

    fn rows(&self) -> Vec<Row> {
        if self.labels.is_empty() {
            return vec![Row::plain("(no items)")];
        }
        self.labels
            .iter()
            .map(|l| Row::plain(format!("  {l}")))
            .collect()
    }

    fn current(&self) -> usize {
        self.current
    }

    fn handle(&mut self, key: Key) -> Step<Self::Output> {
        let len = self.labels.len();
        match key {
            Key::Up if len > 0 => {
                self.current = if self.current == 0 { len - 1 } else { self.current - 1 };
            }
            Key::Down if len > 0 => {
                self.current = (self.current + 1) % len;
            }
            Key::Enter if len == 0 => return Step::Done(None),
            Key::Enter => return Step::Done(Some(self.current)),
            Key::Cancel => return Step::Cancelled,
            _ => {}
        }
        Step::Continue
    }
}

use std::collections::BTreeSet;

use super::{Key, Picker, Row, Step};

pub struct Group {
    pub label: String,
    pub children: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowRef {
    Group(usize),
    Child(usize, usize),
}

/// Selection over groups with expandable children (seasons and their
/// episodes). Childless groups are selectable on their own.
pub struct MultiSelect {
    title: String,
    groups: Vec<Group>,
    expanded: Vec<bool>,
    selected: BTreeSet<(usize, Option<usize>)>,
    current: usize,
}

impl MultiSelect {
    pub fn new(title: impl Into<String>, groups: Vec<Group>) -> Self {
        let expanded = vec![false; groups.len()];
        Self {
            title: title.into(),
            groups,
            expanded,
            selected: BTreeSet::new(),
            current: 0,
        }
    }

    fn row_refs(&self) -> Vec<RowRef> {
        let mut refs = Vec::new();
        for (g, group) in self.groups.iter().enumerate() {
            refs.push(RowRef::Group(g));
            if self.expanded[g] {
                refs.extend((0..group.children.len()).map(|c| RowRef::Child(g, c)));
            }
        }
        refs
    }

    /// Every selectable key of a group.
    fn keys_of(&self, g: usize) -> Vec<(usize, Option<usize>)> {
        match self.groups[g].children.len() {
            0 => vec![(g, None)],
            n => (0..n).map(|c| (g, Some(c))).collect(),
        }
    }

    fn toggle_keys(&mut self, keys: Vec<(usize, Option<usize>)>) {
        if keys.iter().all(|k| self.selected.contains(k)) {
            for k in &keys {
                self.selected.remove(k);
            }
        } else {
            self.selected.extend(keys);
        }
    }

    fn marker(&self, row: RowRef) -> &'static str {
        match row {
            RowRef::Group(g) => {
                let keys = self.keys_of(g);
                let count = keys.iter().filter(|k| self.selected.contains(k)).count();
                if count == 0 {
                    "[ ]"
                } else if count == keys.len() {
                    "[x]"
                } else {
                    "[-]"
                }
            }
            RowRef::Child(g, c) if self.selected.contains(&(g, Some(c))) => "[x]",
            RowRef::Child(..) => "[ ]",
        }
    }

    fn clamp_current(&mut self, len: usize) {
        if self.current >= len {
            self.current = len.saturating_sub(1);
        }
    }
}

impl Picker for MultiSelect {
    /// Selected `(group, child)` pairs in list order; `child` is `None` for a
    /// childless group.
    type Output = Vec<(usize, Option<usize>)>;

    fn title(&self) -> &str {
        &self.title
    }

    fn footer(&self) -> &str {
        "Up/Down: move  Right: expand  Left: collapse  Space: toggle  a: toggle all  Enter: OK  q/ESC: cancel  [-]=partial"
    }

    fn rows(&self) -> Vec<Row> {
        self.row_refs()
            .into_iter()
            .map(|r| {
                let text = match r {
                    RowRef::Group(g) => {
                        let sign = if self.expanded[g] { '-' } else { '+' };
                        format!("{} {} {}", self.marker(r), sign, self.groups[g].label)
                    }
                    RowRef::Child(g, c) => {
                        format!("{}   - {}", self.marker(r), self.groups[g].children[c])
                    }
                };
                Row::plain(text)
            })
            .collect()
    }

    fn current(&self) -> usize {
        self.current
    }

    fn handle(&mut self, key: Key) -> Step<Self::Output> {
        let rows = self.row_refs();
        self.clamp_current(rows.len());
        let focused = rows.get(self.current).copied();
        match key {
            Key::Up if !rows.is_empty() => {
                self.current = if self.current == 0 { rows.len() - 1 } else { self.current - 1 };
            }
            Key::Down if !rows.is_empty() => {
                self.current = (self.current + 1) % rows.len();
            }
            Key::Right => {
                if let Some(RowRef::Group(g)) = focused {
                    self.expanded[g] = true;
                    if !self.groups[g].children.is_empty() {
                        self.current += 1;
                    }
                }
            }
            Key::Left => match focused {
                Some(RowRef::Group(g)) => self.expanded[g] = false,
                Some(RowRef::Child(g, _)) => {
                    if let Some(pos) = rows.iter().position(|r| *r == RowRef::Group(g)) {
                        self.current = pos;
                    }
                }
                None => {}
            },
            Key::Toggle => match focused {
                Some(RowRef::Group(g)) => {
                    let keys = self.keys_of(g);
                    self.toggle_keys(keys);
                }
                Some(RowRef::Child(g, c)) => {
                    if !self.selected.remove(&(g, Some(c))) {
                        self.selected.insert((g, Some(c)));
                    }
                }
                None => {}
            },
            Key::ToggleAll if !self.groups.is_empty() => {
                let keys = (0..self.groups.len()).flat_map(|g| self.keys_of(g)).collect();
                self.toggle_keys(keys);
            }
            Key::Enter => return Step::Done(self.selected.iter().copied().collect()),
            Key::Cancel => return Step::Cancelled,
            _ => {}
        }
        Step::Continue
    }
}

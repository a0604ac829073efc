use std::io::{self, Stderr, Write};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::style::{Attribute, Print, SetAttribute};
use crossterm::terminal::{self, ClearType};
use crossterm::{cursor, execute, queue};

use super::{Key, Picker, Step};

/// Raw mode on an alternate screen, restored on drop.
struct Screen {
    out: Stderr,
}

impl Screen {
    fn enter() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        let mut out = io::stderr();
        if let Err(e) = execute!(out, terminal::EnterAlternateScreen, cursor::Hide) {
            let _ = terminal::disable_raw_mode();
            return Err(e);
        }
        Ok(Self { out })
    }
}

impl Drop for Screen {
    fn drop(&mut self) {
        let _ = execute!(self.out, cursor::Show, terminal::LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

fn key_of(event: KeyEvent) -> Option<Key> {
    if event.kind != KeyEventKind::Press {
        return None;
    }
    let key = match event.code {
        KeyCode::Char('c') if event.modifiers.contains(KeyModifiers::CONTROL) => Key::Cancel,
        KeyCode::Up | KeyCode::Char('k') => Key::Up,
        KeyCode::Down | KeyCode::Char('j') => Key::Down,
        KeyCode::Left => Key::Left,
        KeyCode::Right => Key::Right,
        KeyCode::Char(' ') => Key::Toggle,
        KeyCode::Char('a') | KeyCode::Char('A') => Key::ToggleAll,
        KeyCode::Enter => Key::Enter,
        KeyCode::Esc | KeyCode::Char('q') => Key::Cancel,
        _ => return None,
    };
    Some(key)
}

fn clip(text: &str, width: usize) -> String {
    text.chars().take(width.saturating_sub(1)).collect()
}

fn draw<P: Picker>(out: &mut Stderr, picker: &P, top: &mut usize) -> io::Result<()> {
    let (width, height) = terminal::size()?;
    let (width, height) = (width as usize, height as usize);
    let visible = height.saturating_sub(2).max(1);
    let rows = picker.rows();
    let current = picker.current().min(rows.len().saturating_sub(1));

    if current < *top {
        *top = current;
    } else if current >= *top + visible {
        *top = current + 1 - visible;
    }

    queue!(
        out,
        terminal::Clear(ClearType::All),
        cursor::MoveTo(0, 0),
        SetAttribute(Attribute::Bold),
        Print(clip(picker.title(), width)),
        SetAttribute(Attribute::Reset),
    )?;
    for (i, row) in rows.iter().enumerate().skip(*top).take(visible) {
        queue!(out, cursor::MoveTo(0, (1 + i - *top) as u16))?;
        if i == current {
            queue!(
                out,
                SetAttribute(Attribute::Reverse),
                Print(clip(&row.text, width)),
                SetAttribute(Attribute::Reset),
            )?;
        } else {
            queue!(out, Print(clip(&row.text, width)))?;
        }
    }
    queue!(
        out,
        cursor::MoveTo(0, height.saturating_sub(1) as u16),
        Print(clip(picker.footer(), width)),
    )?;
    out.flush()
}

/// Drives `picker` with keyboard input until it finishes. `Ok(None)` means
/// the user cancelled.
pub fn run<P: Picker>(picker: &mut P) -> io::Result<Option<P::Output>> {
    let mut screen = Screen::enter()?;
    let mut top = 0;
    loop {
        draw(&mut screen.out, picker, &mut top)?;
        let Event::Key(event) = event::read()? else {
            continue;
        };
        let Some(key) = key_of(event) else {
            continue;
        };
        match picker.handle(key) {
            Step::Continue => {}
            Step::Done(output) => return Ok(Some(output)),
            Step::Cancelled => return Ok(None),
        }
    }
}

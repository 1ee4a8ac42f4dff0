//! Full-screen fuzzy picker drawn on stderr so stdout stays free for output.
//!
//! Keys: type to filter, Up/Down (or Ctrl-P/Ctrl-N) to move, Tab to mark
//! several entries, Enter to accept, Esc or Ctrl-C to abort.

use std::io::{self, Write};
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    queue,
    style::Print,
    terminal::{self, ClearType},
};
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;

use crate::db::HistoryEntry;

use super::browse::{Selection, Selector};
use super::loader::{HistoryWindow, MoreSignal};

const FRAME_INTERVAL: Duration = Duration::from_millis(100);
const PROMPT: &str = "> ";

pub trait EventSource {
    fn poll(&mut self, timeout: Duration) -> Result<Option<Event>>;
}

pub struct RealEventSource;

impl EventSource for RealEventSource {
    fn poll(&mut self, timeout: Duration) -> Result<Option<Event>> {
        if event::poll(timeout)? {
            Ok(Some(event::read()?))
        } else {
            Ok(None)
        }
    }
}

/// Single-line display form of an entry.
pub fn project(entry: &HistoryEntry) -> String {
    entry
        .text
        .chars()
        .map(|c| match c {
            '\n' => '⏎',
            '\t' | '\r' => ' ',
            other => other,
        })
        .collect()
}

pub struct TerminalPicker<E: EventSource = RealEventSource> {
    events: E,
    draw: bool,
}

impl TerminalPicker<RealEventSource> {
    pub fn new() -> Self {
        Self {
            events: RealEventSource,
            draw: true,
        }
    }
}

impl Default for TerminalPicker<RealEventSource> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: EventSource> TerminalPicker<E> {
    /// Runs the picker logic against `events` without touching the terminal.
    pub fn headless(events: E) -> Self {
        Self {
            events,
            draw: false,
        }
    }
}

impl<E: EventSource + Send + 'static> Selector for TerminalPicker<E> {
    fn select(&mut self, window: &HistoryWindow, more: &MoreSignal) -> Result<Selection> {
        let _screen = if self.draw {
            Some(ScreenGuard::enter()?)
        } else {
            None
        };
        let matcher = SkimMatcherV2::default();
        let mut state = PickerState::default();

        loop {
            {
                let entries = window.read();
                state.refilter(&entries, &matcher);
                if state.out_of_candidates() {
                    more.request();
                }
                if self.draw {
                    render(&mut io::stderr(), &state, &entries)?;
                }
            }

            let Some(event) = self.events.poll(FRAME_INTERVAL)? else {
                continue;
            };
            if let Event::Key(key) = event {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if let Some(selection) = state.handle_key(key) {
                    return Ok(selection);
                }
            }
        }
    }
}

#[derive(Default)]
struct PickerState {
    query: String,
    /// Window indices matching `query`, best first.
    matches: Vec<usize>,
    cursor: usize,
    /// Marked window indices, in the order they were marked.
    marked: Vec<usize>,
    filtered_len: usize,
    filtered_query: String,
}

impl PickerState {
    fn refilter(&mut self, entries: &[HistoryEntry], matcher: &SkimMatcherV2) {
        if self.filtered_len == entries.len() && self.filtered_query == self.query {
            return;
        }

        if self.query.is_empty() {
            self.matches = (0..entries.len()).collect();
        } else {
            let mut scored: Vec<(i64, usize)> = entries
                .iter()
                .enumerate()
                .filter_map(|(i, entry)| {
                    matcher
                        .fuzzy_match(&project(entry), &self.query)
                        .map(|score| (score, i))
                })
                .collect();
            // Stable sort keeps recency order among equal scores.
            scored.sort_by(|a, b| b.0.cmp(&a.0));
            self.matches = scored.into_iter().map(|(_, i)| i).collect();
        }

        self.filtered_len = entries.len();
        self.filtered_query.clone_from(&self.query);
        self.cursor = self.cursor.min(self.matches.len().saturating_sub(1));
    }

    fn out_of_candidates(&self) -> bool {
        self.matches.is_empty() || self.cursor + 1 >= self.matches.len()
    }

    fn current(&self) -> Option<usize> {
        self.matches.get(self.cursor).copied()
    }

    fn toggle_current(&mut self) {
        let Some(index) = self.current() else {
            return;
        };
        if let Some(pos) = self.marked.iter().position(|&marked| marked == index) {
            self.marked.remove(pos);
        } else {
            self.marked.push(index);
        }
        self.move_down();
    }

    fn move_down(&mut self) {
        if self.cursor + 1 < self.matches.len() {
            self.cursor += 1;
        }
    }

    fn move_up(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    fn handle_key(&mut self, key: KeyEvent) -> Option<Selection> {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => return Some(Selection::Aborted),
            KeyCode::Char('c') if ctrl => return Some(Selection::Aborted),
            KeyCode::Enter => {
                if !self.marked.is_empty() {
                    return Some(Selection::Selected(self.marked.clone()));
                }
                return Some(match self.current() {
                    Some(index) => Selection::Selected(vec![index]),
                    None => Selection::Aborted,
                });
            }
            KeyCode::Tab => self.toggle_current(),
            KeyCode::Down => self.move_down(),
            KeyCode::Up => self.move_up(),
            KeyCode::Char('n') if ctrl => self.move_down(),
            KeyCode::Char('p') if ctrl => self.move_up(),
            KeyCode::Backspace => {
                self.query.pop();
                self.cursor = 0;
            }
            KeyCode::Char(c) if !ctrl => {
                self.query.push(c);
                self.cursor = 0;
            }
            _ => {}
        }
        None
    }
}

struct ScreenGuard;

impl ScreenGuard {
    fn enter() -> Result<Self> {
        terminal::enable_raw_mode()?;
        let mut stderr = io::stderr();
        if let Err(err) = crossterm::execute!(stderr, terminal::EnterAlternateScreen, cursor::Hide) {
            let _ = terminal::disable_raw_mode();
            return Err(err.into());
        }
        Ok(Self)
    }
}

impl Drop for ScreenGuard {
    fn drop(&mut self) {
        let _ = crossterm::execute!(io::stderr(), cursor::Show, terminal::LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

fn render<W: Write>(out: &mut W, state: &PickerState, entries: &[HistoryEntry]) -> Result<()> {
    let (width, height) = terminal::size()?;
    let width = usize::from(width);
    let rows = usize::from(height).saturating_sub(2).max(1);
    let first = state.cursor.saturating_sub(rows - 1);

    queue!(out, terminal::Clear(ClearType::All), cursor::MoveTo(0, 0))?;
    queue!(out, Print(clip(&format!("{PROMPT}{}", state.query), width)))?;
    queue!(
        out,
        cursor::MoveTo(0, 1),
        Print(clip(
            &format!(
                "  {}/{} ({} marked)",
                state.matches.len(),
                entries.len(),
                state.marked.len()
            ),
            width
        ))
    )?;

    for (row, &index) in state.matches.iter().skip(first).take(rows).enumerate() {
        let pointer = if first + row == state.cursor { '>' } else { ' ' };
        let mark = if state.marked.contains(&index) { '*' } else { ' ' };
        let line = format!("{pointer}{mark}{}", project(&entries[index]));
        // Row fits in u16: it is bounded by the terminal height.
        queue!(out, cursor::MoveTo(0, (row + 2) as u16), Print(clip(&line, width)))?;
    }

    out.flush()?;
    Ok(())
}

fn clip(text: &str, width: usize) -> String {
    text.chars().take(width).collect()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use chrono::{TimeZone, Utc};
    use tokio::sync::mpsc;

    use super::*;

    struct Scripted(VecDeque<Option<Event>>);

    impl EventSource for Scripted {
        fn poll(&mut self, _timeout: Duration) -> Result<Option<Event>> {
            Ok(self
                .0
                .pop_front()
                .unwrap_or_else(|| Some(key(KeyCode::Esc))))
        }
    }

    fn key(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn ctrl(c: char) -> Event {
        Event::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL))
    }

    fn typed(text: &str) -> Vec<Option<Event>> {
        text.chars().map(|c| Some(key(KeyCode::Char(c)))).collect()
    }

    fn window(texts: &[&str]) -> HistoryWindow {
        HistoryWindow::new(
            texts
                .iter()
                .enumerate()
                .map(|(i, text)| HistoryEntry {
                    id: i as i64 + 1,
                    text: text.to_string(),
                    content_hash: format!("{i}"),
                    captured_at: Utc.timestamp_opt(1_000 - i as i64, 0).unwrap(),
                })
                .collect(),
        )
    }

    fn signal() -> (MoreSignal, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(1);
        (MoreSignal { tx }, rx)
    }

    fn run(events: Vec<Option<Event>>, window: &HistoryWindow) -> Selection {
        let (more, _rx) = signal();
        TerminalPicker::headless(Scripted(events.into()))
            .select(window, &more)
            .unwrap()
    }

    #[test]
    fn enter_picks_entry_under_cursor() {
        let w = window(&["first", "second", "third"]);
        let events = vec![Some(key(KeyCode::Down)), Some(key(KeyCode::Enter))];
        assert_eq!(run(events, &w), Selection::Selected(vec![1]));
    }

    #[test]
    fn query_filters_by_fuzzy_match() {
        let w = window(&["cargo build", "git status", "cargo test"]);
        let mut events = typed("stat");
        events.push(Some(key(KeyCode::Enter)));
        assert_eq!(run(events, &w), Selection::Selected(vec![1]));
    }

    #[test]
    fn tab_marks_several_entries_in_order() {
        let w = window(&["a", "b", "c"]);
        let events = vec![
            Some(key(KeyCode::Down)),
            Some(key(KeyCode::Tab)),
            Some(key(KeyCode::Up)),
            Some(key(KeyCode::Up)),
            Some(key(KeyCode::Tab)),
            Some(key(KeyCode::Enter)),
        ];
        assert_eq!(run(events, &w), Selection::Selected(vec![1, 0]));
    }

    #[test]
    fn escape_and_ctrl_c_abort() {
        let w = window(&["a"]);
        assert_eq!(run(vec![Some(key(KeyCode::Esc))], &w), Selection::Aborted);
        assert_eq!(run(vec![Some(ctrl('c'))], &w), Selection::Aborted);
    }

    #[test]
    fn enter_without_matches_aborts() {
        let w = window(&["alpha"]);
        let mut events = typed("zzz");
        events.push(Some(key(KeyCode::Enter)));
        assert_eq!(run(events, &w), Selection::Aborted);
    }

    #[test]
    fn asks_for_more_when_no_candidates_match() {
        let w = window(&["alpha", "beta"]);
        let (more, mut rx) = signal();
        let mut events = typed("zzz");
        events.push(Some(key(KeyCode::Esc)));

        let selection = TerminalPicker::headless(Scripted(events.into()))
            .select(&w, &more)
            .unwrap();

        assert_eq!(selection, Selection::Aborted);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn picks_up_entries_appended_while_open() {
        let w = window(&["old"]);
        let appender = w.clone();
        let mut events = vec![None];
        events.extend(typed("new"));
        events.push(Some(key(KeyCode::Enter)));

        // Append between the first and second frame, as the loader would.
        struct AppendOnFirstIdle {
            inner: Scripted,
            window: Option<HistoryWindow>,
        }
        impl EventSource for AppendOnFirstIdle {
            fn poll(&mut self, timeout: Duration) -> Result<Option<Event>> {
                let event = self.inner.poll(timeout)?;
                if event.is_none() {
                    if let Some(window) = self.window.take() {
                        window.append(vec![HistoryEntry {
                            id: 2,
                            text: "brand new".into(),
                            content_hash: "n".into(),
                            captured_at: Utc.timestamp_opt(1, 0).unwrap(),
                        }]);
                    }
                }
                Ok(event)
            }
        }

        let (more, _rx) = signal();
        let selection = TerminalPicker::headless(AppendOnFirstIdle {
            inner: Scripted(events.into()),
            window: Some(appender),
        })
        .select(&w, &more)
        .unwrap();

        assert_eq!(selection, Selection::Selected(vec![1]));
    }

    #[test]
    fn projection_is_single_line() {
        let entry = HistoryEntry {
            id: 1,
            text: "line one\nline\ttwo".into(),
            content_hash: String::new(),
            captured_at: Utc.timestamp_opt(0, 0).unwrap(),
        };
        assert_eq!(project(&entry), "line one⏎line two");
    }

    #[test]
    fn query_matches_the_displayed_line() {
        // The tab is shown as a space, so a typed space must match it.
        let w = window(&["alpha beta", "line\ttwo"]);
        let mut events = typed("e two");
        events.push(Some(key(KeyCode::Enter)));
        assert_eq!(run(events, &w), Selection::Selected(vec![1]));
    }
}

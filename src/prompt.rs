use std::io::{self, IsTerminal};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Frame;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};

use crate::error::{HookError, Result};

/// One row in the permission checklist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub label: String,
    pub permission: String,
}

/// Asks which permissions to remove. Returns indices into `choices`.
pub trait PermissionSelector {
    fn select(&mut self, plugin: &str, choices: &[Choice]) -> Result<Vec<usize>>;
}

pub fn prompt_message(plugin: &str) -> String {
    format!("Select the permissions that you would like to REMOVE from this plugin ({plugin})")
}

/// Interactive when attached to a terminal, config-driven otherwise.
#[derive(Debug)]
pub enum OperatorSelector {
    Terminal(TerminalChecklist),
    Headless(HeadlessSelector),
}

impl OperatorSelector {
    pub fn detect(auto_remove: Vec<String>) -> Self {
        if io::stdin().is_terminal() && io::stdout().is_terminal() {
            Self::Terminal(TerminalChecklist)
        } else {
            tracing::info!("stdin is not a terminal, using review.auto_remove");
            Self::Headless(HeadlessSelector::new(auto_remove))
        }
    }
}

impl PermissionSelector for OperatorSelector {
    fn select(&mut self, plugin: &str, choices: &[Choice]) -> Result<Vec<usize>> {
        match self {
            Self::Terminal(selector) => selector.select(plugin, choices),
            Self::Headless(selector) => selector.select(plugin, choices),
        }
    }
}

/// Picks every choice whose permission is on a fixed list.
#[derive(Debug, Clone, Default)]
pub struct HeadlessSelector {
    auto_remove: Vec<String>,
}

impl HeadlessSelector {
    pub fn new(auto_remove: Vec<String>) -> Self {
        Self { auto_remove }
    }
}

impl PermissionSelector for HeadlessSelector {
    fn select(&mut self, plugin: &str, choices: &[Choice]) -> Result<Vec<usize>> {
        let chosen: Vec<usize> = choices
            .iter()
            .enumerate()
            .filter(|(_, choice)| self.auto_remove.contains(&choice.permission))
            .map(|(idx, _)| idx)
            .collect();

        tracing::info!(
            plugin,
            offered = choices.len(),
            selected = chosen.len(),
            "non-interactive permission selection"
        );
        Ok(chosen)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecklistEvent {
    Continue,
    Confirm,
    Cancel,
}

/// Cursor and check marks of the checklist, independent of the terminal.
#[derive(Debug, Clone)]
pub struct ChecklistState {
    pub cursor: usize,
    checked: Vec<bool>,
}

impl ChecklistState {
    pub fn new(len: usize) -> Self {
        Self {
            cursor: 0,
            checked: vec![false; len],
        }
    }

    pub fn is_checked(&self, idx: usize) -> bool {
        self.checked.get(idx).copied().unwrap_or(false)
    }

    pub fn selected(&self) -> Vec<usize> {
        self.checked
            .iter()
            .enumerate()
            .filter_map(|(idx, checked)| checked.then_some(idx))
            .collect()
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> ChecklistEvent {
        if key.kind != KeyEventKind::Press {
            return ChecklistEvent::Continue;
        }

        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return ChecklistEvent::Cancel;
            }
            KeyCode::Esc | KeyCode::Char('q') => return ChecklistEvent::Cancel,
            KeyCode::Enter => return ChecklistEvent::Confirm,
            KeyCode::Char('j') | KeyCode::Down => {
                if !self.checked.is_empty() {
                    self.cursor = (self.cursor + 1) % self.checked.len();
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                if !self.checked.is_empty() {
                    self.cursor = self
                        .cursor
                        .checked_sub(1)
                        .unwrap_or(self.checked.len() - 1);
                }
            }
            KeyCode::Char(' ') => {
                if let Some(mark) = self.checked.get_mut(self.cursor) {
                    *mark = !*mark;
                }
            }
            KeyCode::Char('a') => {
                let all = self.checked.iter().all(|mark| *mark);
                self.checked.iter_mut().for_each(|mark| *mark = !all);
            }
            KeyCode::Char('i') => {
                self.checked.iter_mut().for_each(|mark| *mark = !*mark);
            }
            _ => {}
        }

        ChecklistEvent::Continue
    }
}

/// Full-screen checklist drawn with ratatui; nothing is pre-selected.
#[derive(Debug, Default)]
pub struct TerminalChecklist;

impl PermissionSelector for TerminalChecklist {
    fn select(&mut self, plugin: &str, choices: &[Choice]) -> Result<Vec<usize>> {
        enable_raw_mode().map_err(HookError::Prompt)?;
        let mut stdout = io::stdout();
        if let Err(err) = execute!(stdout, EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(HookError::Prompt(err));
        }

        let result = Terminal::new(CrosstermBackend::new(stdout))
            .map_err(HookError::Prompt)
            .and_then(|mut terminal| {
                let outcome = run_checklist(&mut terminal, plugin, choices);
                let _ = terminal.show_cursor();
                outcome
            });

        // Restore terminal
        let restored =
            disable_raw_mode().and_then(|()| execute!(io::stdout(), LeaveAlternateScreen));
        let selected = result?;
        restored.map_err(HookError::Prompt)?;

        tracing::info!(plugin, selected = ?selected, "operator selection");
        Ok(selected)
    }
}

fn run_checklist(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    plugin: &str,
    choices: &[Choice],
) -> Result<Vec<usize>> {
    let mut state = ChecklistState::new(choices.len());

    loop {
        terminal
            .draw(|frame| render_checklist(frame, plugin, choices, &state))
            .map_err(HookError::Prompt)?;

        let Event::Key(key) = event::read().map_err(HookError::Prompt)? else {
            continue;
        };

        match state.handle_key(key) {
            ChecklistEvent::Continue => {}
            ChecklistEvent::Confirm => return Ok(state.selected()),
            ChecklistEvent::Cancel => return Err(HookError::PromptCancelled),
        }
    }
}

fn render_checklist(frame: &mut Frame, plugin: &str, choices: &[Choice], state: &ChecklistState) {
    let area = centered_rect(80, 70, frame.area());
    frame.render_widget(Clear, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Min(1),
            Constraint::Length(3),
        ])
        .split(area);

    let header = Paragraph::new(prompt_message(plugin))
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .title(format!(" {plugin} "))
                .borders(Borders::ALL)
                .style(Style::default().bg(Color::Rgb(15, 15, 24))),
        );
    frame.render_widget(header, chunks[0]);

    let visible = chunks[1].height.max(1) as usize;
    let offset = state.cursor.saturating_sub(visible - 1);

    let rows: Vec<Line> = choices
        .iter()
        .enumerate()
        .skip(offset)
        .take(visible)
        .map(|(idx, choice)| {
            let mark = if state.is_checked(idx) { "[x]" } else { "[ ]" };
            let text = format!(" {mark} {}", choice.label);
            if idx == state.cursor {
                Line::from(Span::styled(
                    text,
                    Style::default()
                        .fg(Color::Black)
                        .bg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                ))
            } else if state.is_checked(idx) {
                Line::from(Span::styled(text, Style::default().fg(Color::Red)))
            } else {
                Line::from(Span::styled(text, Style::default().fg(Color::Gray)))
            }
        })
        .collect();

    let list = Paragraph::new(rows).block(
        Block::default()
            .borders(Borders::LEFT | Borders::RIGHT)
            .style(Style::default().bg(Color::Rgb(10, 10, 18))),
    );
    frame.render_widget(list, chunks[1]);

    let footer =
        Paragraph::new(" Space: toggle  a: all  i: invert  Enter: remove checked  Esc: abort ")
            .block(
                Block::default().borders(Borders::ALL).style(
                    Style::default()
                        .bg(Color::Rgb(15, 15, 24))
                        .fg(Color::DarkGray),
                ),
            );
    frame.render_widget(footer, chunks[2]);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn choices() -> Vec<Choice> {
        ["CAMERA", "READ_EXTERNAL_STORAGE", "INTERNET"]
            .iter()
            .map(|name| Choice {
                label: format!("android.permission.{name} (android)"),
                permission: format!("android.permission.{name}"),
            })
            .collect()
    }

    #[test]
    fn nothing_is_preselected() {
        let mut state = ChecklistState::new(3);
        assert_eq!(state.handle_key(key(KeyCode::Enter)), ChecklistEvent::Confirm);
        assert!(state.selected().is_empty());
    }

    #[test]
    fn space_toggles_row_under_cursor() {
        let mut state = ChecklistState::new(3);
        state.handle_key(key(KeyCode::Down));
        state.handle_key(key(KeyCode::Char(' ')));
        state.handle_key(key(KeyCode::Char('j')));
        state.handle_key(key(KeyCode::Char(' ')));
        state.handle_key(key(KeyCode::Char(' ')));

        assert_eq!(state.selected(), vec![1]);
    }

    #[test]
    fn cursor_wraps_around() {
        let mut state = ChecklistState::new(3);
        state.handle_key(key(KeyCode::Up));
        assert_eq!(state.cursor, 2);
        state.handle_key(key(KeyCode::Down));
        assert_eq!(state.cursor, 0);
    }

    #[test]
    fn toggle_all_and_invert() {
        let mut state = ChecklistState::new(3);
        state.handle_key(key(KeyCode::Char('a')));
        assert_eq!(state.selected(), vec![0, 1, 2]);
        state.handle_key(key(KeyCode::Char('a')));
        assert!(state.selected().is_empty());

        state.handle_key(key(KeyCode::Char(' ')));
        state.handle_key(key(KeyCode::Char('i')));
        assert_eq!(state.selected(), vec![1, 2]);
    }

    #[test]
    fn escape_and_ctrl_c_cancel() {
        let mut state = ChecklistState::new(1);
        assert_eq!(state.handle_key(key(KeyCode::Esc)), ChecklistEvent::Cancel);
        assert_eq!(
            state.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            ChecklistEvent::Cancel
        );
        assert_eq!(state.handle_key(key(KeyCode::Char('c'))), ChecklistEvent::Continue);
    }

    #[test]
    fn headless_selects_configured_permissions() {
        let mut selector = HeadlessSelector::new(vec!["android.permission.INTERNET".to_string()]);
        assert_eq!(selector.select("p", &choices()).unwrap(), vec![2]);

        let mut none = HeadlessSelector::default();
        assert!(none.select("p", &choices()).unwrap().is_empty());
    }

    #[test]
    fn renders_labels_and_message() {
        let mut terminal = Terminal::new(TestBackend::new(100, 20)).unwrap();
        let mut state = ChecklistState::new(3);
        state.handle_key(key(KeyCode::Char(' ')));

        terminal
            .draw(|frame| render_checklist(frame, "cordova-plugin-camera", &choices(), &state))
            .unwrap();

        let screen: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect();
        assert!(screen.contains("[x] android.permission.CAMERA (android)"));
        assert!(screen.contains("[ ] android.permission.INTERNET (android)"));
        assert!(screen.contains("cordova-plugin-camera"));
    }
}

use crate::app::types::PromptAnswer;
use crate::app::{App, InputMode};
use crate::transfer::Direction;
use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

const PAGE_SIZE: usize = 10;

impl App {
    pub fn handle_key(&mut self, key: KeyEvent) -> Result<()> {
        if key.kind == KeyEventKind::Release {
            return Ok(());
        }
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.request_quit();
            return Ok(());
        }

        match self.input_mode {
            InputMode::Normal => self.handle_normal_key(key),
            InputMode::PathEntry | InputMode::Rename => self.handle_text_key(key),
            InputMode::Prompt => self.handle_prompt_key(key),
            InputMode::Help => self.handle_help_key(key),
            InputMode::ErrorLog => self.handle_error_log_key(key),
        }
    }

    fn handle_normal_key(&mut self, key: KeyEvent) -> Result<()> {
        // While quitting only the quit key itself does anything.
        if self.quitting {
            if key.code == KeyCode::Char('q') {
                self.handle_key_q()?;
            }
            return Ok(());
        }

        match key.code {
            KeyCode::Char('q') => self.handle_key_q()?,
            KeyCode::Tab | KeyCode::BackTab => self.switch_panel(),
            KeyCode::Up | KeyCode::Char('k') => self.active_pane_mut().select_previous(),
            KeyCode::Down | KeyCode::Char('j') => self.active_pane_mut().select_next(),
            KeyCode::Home => self.active_pane_mut().select_first(),
            KeyCode::End => self.active_pane_mut().select_last(),
            KeyCode::PageUp => self.active_pane_mut().page_up(PAGE_SIZE),
            KeyCode::PageDown => self.active_pane_mut().page_down(PAGE_SIZE),
            KeyCode::Enter | KeyCode::Right | KeyCode::Char('l') => self.open_selected(),
            KeyCode::Backspace | KeyCode::Left | KeyCode::Char('h') => self.go_to_parent(),
            KeyCode::Char(' ') => self.active_pane_mut().toggle_mark(),
            KeyCode::Char('u') => self.request_transfer(Direction::Upload),
            KeyCode::Char('d') => self.request_transfer(Direction::Download),
            KeyCode::Char('x') | KeyCode::Delete => self.request_delete(),
            KeyCode::F(2) | KeyCode::Char('R') => self.start_rename(),
            KeyCode::Char('n') => self.make_dir(),
            KeyCode::Char('g') => self.start_path_entry(),
            KeyCode::Char('s') => self.cycle_sort_column(),
            KeyCode::Char('o') => self.toggle_sort_order(),
            KeyCode::Char('.') => self.toggle_hidden(),
            KeyCode::Char('r') => self.handle_key_r(),
            KeyCode::Char('t') => self.toggle_turbo(),
            KeyCode::Char('Q') => self.toggle_quit_after_transfer(),
            KeyCode::Char('c') => self.cancel_selected_transfer(),
            KeyCode::Char('C') => self.clear_completed(),
            KeyCode::Char('[') => self.select_previous_transfer(),
            KeyCode::Char(']') => self.select_next_transfer(),
            KeyCode::Char('e') => self.show_error_log(),
            KeyCode::Char('?') => self.show_help(),
            _ => {}
        }
        Ok(())
    }

    pub fn handle_key_q(&mut self) -> Result<()> {
        if self.quitting {
            // Second q: stop waiting for the worker.
            self.should_quit = true;
        } else {
            self.request_quit();
        }
        Ok(())
    }

    pub fn handle_key_r(&mut self) {
        self.set_status_message("Refreshing...");
        self.refresh_all();
    }

    fn handle_text_key(&mut self, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Esc => self.cancel_text_input(),
            KeyCode::Enter => match self.input_mode {
                InputMode::PathEntry => self.submit_path_entry(),
                _ => self.submit_rename(),
            },
            KeyCode::Backspace => {
                self.text_input.pop();
            }
            KeyCode::Char(c) => self.text_input.push(c),
            _ => {}
        }
        Ok(())
    }

    fn handle_prompt_key(&mut self, key: KeyEvent) -> Result<()> {
        let answer = match key.code {
            KeyCode::Esc => {
                self.dismiss_prompt();
                return Ok(());
            }
            KeyCode::Char('y') | KeyCode::Enter => PromptAnswer::Yes,
            KeyCode::Char('n') => PromptAnswer::No,
            KeyCode::Char('s') => PromptAnswer::Skip,
            KeyCode::Char('r') => {
                // `r` is Retry where Replace is not offered.
                if self
                    .prompt_choices()
                    .iter()
                    .any(|(_, answer)| *answer == PromptAnswer::Retry)
                {
                    PromptAnswer::Retry
                } else {
                    PromptAnswer::Replace
                }
            }
            KeyCode::Char('a') => PromptAnswer::ReplaceAll,
            _ => return Ok(()),
        };

        let offered = self
            .prompt_choices()
            .iter()
            .any(|(_, choice)| *choice == answer);
        // Enter accepts the first choice of prompts without a Yes.
        let answer = match (offered, key.code) {
            (false, KeyCode::Enter) => match self.prompt_choices().first() {
                Some((_, first)) => *first,
                None => return Ok(()),
            },
            (false, _) => return Ok(()),
            (true, _) => answer,
        };
        self.answer_prompt(answer);
        Ok(())
    }

    fn handle_help_key(&mut self, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('?') => self.close_popup(),
            KeyCode::Up | KeyCode::Char('k') => {
                self.help_scroll_position = self.help_scroll_position.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.help_scroll_position = self.help_scroll_position.saturating_add(1);
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_error_log_key(&mut self, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('e') => self.close_popup(),
            KeyCode::Up | KeyCode::Char('k') => {
                self.error_log_scroll = self.error_log_scroll.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.error_log_scroll = self.error_log_scroll.saturating_add(1);
            }
            KeyCode::Char('C') => {
                self.error_log.clear();
                self.error_log_scroll = 0;
            }
            _ => {}
        }
        Ok(())
    }
}

// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::{AppMode, ScreenKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    pub mode: AppMode,
    pub active_screen: ScreenKind,
    /// Bumped whenever the active screen changes; worker results tagged
    /// with an older generation are dropped.
    pub screen_generation: u64,
    pub status_line: Option<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            mode: AppMode::Nav,
            active_screen: ScreenKind::Locations,
            screen_generation: 0,
            status_line: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppCommand {
    NextScreen,
    PrevScreen,
    OpenScreen(ScreenKind),
    EnterEditMode,
    ExitToNav,
    ClearStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    ModeChanged(AppMode),
    ScreenChanged {
        screen: ScreenKind,
        generation: u64,
    },
    StatusUpdated(String),
    StatusCleared,
}

impl AppState {
    pub fn dispatch(&mut self, command: AppCommand) -> Vec<AppEvent> {
        match command {
            AppCommand::NextScreen => self.rotate_screen(1),
            AppCommand::PrevScreen => self.rotate_screen(-1),
            AppCommand::OpenScreen(screen) => self.switch_to(screen),
            AppCommand::EnterEditMode => {
                self.mode = AppMode::Edit;
                vec![AppEvent::ModeChanged(self.mode)]
            }
            AppCommand::ExitToNav => {
                self.mode = AppMode::Nav;
                vec![AppEvent::ModeChanged(self.mode), self.set_status("nav")]
            }
            AppCommand::ClearStatus => {
                self.status_line = None;
                vec![AppEvent::StatusCleared]
            }
        }
    }

    pub const fn is_current(&self, generation: u64) -> bool {
        self.screen_generation == generation
    }

    pub fn set_status(&mut self, message: &str) -> AppEvent {
        self.status_line = Some(message.to_owned());
        AppEvent::StatusUpdated(message.to_owned())
    }

    fn rotate_screen(&mut self, delta: isize) -> Vec<AppEvent> {
        let screens = ScreenKind::ALL;
        let current = screens
            .iter()
            .position(|screen| *screen == self.active_screen)
            .unwrap_or(0) as isize;
        let len = screens.len() as isize;
        let next = (current + delta).rem_euclid(len) as usize;
        self.switch_to(screens[next])
    }

    fn switch_to(&mut self, screen: ScreenKind) -> Vec<AppEvent> {
        if screen == self.active_screen {
            return Vec::new();
        }
        self.active_screen = screen;
        self.screen_generation += 1;
        self.mode = AppMode::Nav;
        vec![AppEvent::ScreenChanged {
            screen,
            generation: self.screen_generation,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::{AppCommand, AppEvent, AppState};
    use crate::{AppMode, ScreenKind};

    #[test]
    fn screen_rotation_wraps_and_bumps_generation() {
        let mut state = AppState {
            active_screen: ScreenKind::Contact,
            ..AppState::default()
        };

        let events = state.dispatch(AppCommand::NextScreen);
        assert_eq!(state.active_screen, ScreenKind::Locations);
        assert_eq!(
            events,
            vec![AppEvent::ScreenChanged {
                screen: ScreenKind::Locations,
                generation: 1,
            }]
        );
        assert!(!state.is_current(0));

        state.dispatch(AppCommand::PrevScreen);
        assert_eq!(state.active_screen, ScreenKind::Contact);
        assert_eq!(state.screen_generation, 2);
    }

    #[test]
    fn reopening_current_screen_keeps_generation() {
        let mut state = AppState::default();
        let events = state.dispatch(AppCommand::OpenScreen(ScreenKind::Locations));
        assert!(events.is_empty());
        assert!(state.is_current(0));
    }

    #[test]
    fn switching_screens_leaves_edit_mode() {
        let mut state = AppState::default();
        state.dispatch(AppCommand::EnterEditMode);
        assert_eq!(state.mode, AppMode::Edit);

        state.dispatch(AppCommand::OpenScreen(ScreenKind::Roles));
        assert_eq!(state.mode, AppMode::Nav);
    }

    #[test]
    fn exit_to_nav_sets_status() {
        let mut state = AppState::default();
        state.dispatch(AppCommand::EnterEditMode);
        let events = state.dispatch(AppCommand::ExitToNav);
        assert_eq!(
            events,
            vec![
                AppEvent::ModeChanged(AppMode::Nav),
                AppEvent::StatusUpdated("nav".to_owned()),
            ]
        );
        assert_eq!(state.status_line.as_deref(), Some("nav"));
    }
}

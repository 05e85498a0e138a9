//! Reader controls: keyboard shortcuts and typed commands.
//!
//! Shortcuts mirror the reading toolbar: Space toggles play/pause, Down and
//! Up move to the next and previous chunk.

use tracing::warn;

use crate::error::ControlError;
use crate::reader::ReaderHandle;
use crate::settings::SettingChange;

#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    Toggle,
    Play,
    Pause,
    Stop,
    Next,
    Prev,
    Setting(SettingChange),
    Language(String),
    Status,
    Quit,
}

/// Resolve a key name (`Space`, `ArrowDown`, `KEY_UP`) to a control.
pub fn resolve_key(name: &str) -> Option<Control> {
    let control = match name {
        " " | "Space" | "KEY_SPACE" => Control::Toggle,
        "ArrowDown" | "Down" | "KEY_DOWN" => Control::Next,
        "ArrowUp" | "Up" | "KEY_UP" => Control::Prev,
        "Escape" | "KEY_ESC" => Control::Stop,
        _ => return None,
    };
    Some(control)
}

impl Control {
    /// Parse one line of interactive input. Blank lines are ignored; a line
    /// of spaces is the Space shortcut.
    pub fn parse(line: &str) -> Result<Option<Self>, ControlError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Ok((!line.is_empty()).then_some(Control::Toggle));
        }

        let mut words = line.split_whitespace();
        let command = words.next().unwrap_or_default().to_ascii_lowercase();
        let rest: Vec<&str> = words.collect();

        let control = match command.as_str() {
            "toggle" | "t" => Control::Toggle,
            "play" => Control::Play,
            "pause" => Control::Pause,
            "stop" | "s" => Control::Stop,
            "next" | "n" | "down" => Control::Next,
            "prev" | "previous" | "p" | "up" => Control::Prev,
            "status" | "?" => Control::Status,
            "quit" | "q" | "exit" => Control::Quit,
            "rate" | "speed" => {
                let value = rest.first().ok_or(ControlError::MissingArgument("rate"))?;
                Control::Setting(SettingChange::parse("rate", value)?)
            }
            "set" => match rest.as_slice() {
                [setting, value] => Control::Setting(SettingChange::parse(setting, value)?),
                _ => return Err(ControlError::MissingArgument("set")),
            },
            "lang" | "language" => {
                let tag = rest.first().ok_or(ControlError::MissingArgument("lang"))?;
                Control::Language(tag.to_string())
            }
            _ => match resolve_key(line.trim()) {
                Some(control) => control,
                None => return Err(ControlError::UnknownCommand(line.trim().to_string())),
            },
        };
        Ok(Some(control))
    }

    /// Send the control to the reader. `Status` and `Quit` are the caller's.
    pub fn dispatch(&self, reader: &ReaderHandle) {
        match self {
            Control::Toggle => reader.toggle(),
            Control::Play => reader.play(),
            Control::Pause => reader.pause(),
            Control::Stop => reader.stop(),
            Control::Next => reader.next(),
            Control::Prev => reader.prev(),
            Control::Setting(change) => reader.change_setting(*change),
            Control::Language(tag) => reader.set_language(tag),
            Control::Status | Control::Quit => warn!("{self:?} is not a reader command"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::FontSize;

    #[test]
    fn shortcuts_map_to_toolbar_actions() {
        assert_eq!(resolve_key("Space"), Some(Control::Toggle));
        assert_eq!(resolve_key("ArrowDown"), Some(Control::Next));
        assert_eq!(resolve_key("KEY_UP"), Some(Control::Prev));
        assert_eq!(resolve_key("KEY_F1"), None);
    }

    #[test]
    fn parses_typed_commands() {
        assert_eq!(Control::parse(" \n").unwrap(), Some(Control::Toggle));
        assert_eq!(Control::parse("\n").unwrap(), None);
        assert_eq!(Control::parse("n").unwrap(), Some(Control::Next));
        assert_eq!(Control::parse("UP").unwrap(), Some(Control::Prev));
        assert_eq!(Control::parse("ArrowDown").unwrap(), Some(Control::Next));
        assert_eq!(
            Control::parse("rate 1.5x").unwrap(),
            Some(Control::Setting(SettingChange::Rate(1.5)))
        );
        assert_eq!(
            Control::parse("set fontSize lg").unwrap(),
            Some(Control::Setting(SettingChange::FontSize(FontSize::Lg)))
        );
        assert_eq!(
            Control::parse("lang hi").unwrap(),
            Some(Control::Language("hi".into()))
        );
    }

    #[test]
    fn rejects_bad_commands() {
        assert_eq!(
            Control::parse("rewind"),
            Err(ControlError::UnknownCommand("rewind".into()))
        );
        assert_eq!(Control::parse("rate"), Err(ControlError::MissingArgument("rate")));
        assert!(matches!(
            Control::parse("set theme neon"),
            Err(ControlError::Setting(_))
        ));
    }
}

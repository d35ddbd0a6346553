//! Administrative commands and inline-button callback actions.

use crate::relay::types::{InlineButton, InlineKeyboard, MessageHandle, UserId};

/// Owner-only commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Help,
    /// All registered users with their status.
    Users,
    /// Only the blocked ids.
    BlockList,
    Block(Option<String>),
    Unblock(Option<String>),
    Stats,
    SetPassword(Option<String>),
    DisablePassword,
}

impl AdminCommand {
    /// Parse a command name (already lowercased, without `/`) and its args.
    /// Returns `None` for commands that are not administrative.
    pub fn parse(name: &str, args: &[String]) -> Option<Self> {
        let first = args.first().cloned();
        let cmd = match name {
            "help" => Self::Help,
            "users" => Self::Users,
            "blocklist" | "blocked" => Self::BlockList,
            "block" => Self::Block(first),
            "unblock" => Self::Unblock(first),
            "stats" => Self::Stats,
            "setpassword" => Self::SetPassword(first),
            "disablepassword" => Self::DisablePassword,
            _ => return None,
        };
        Some(cmd)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Help => "help",
            Self::Users => "users",
            Self::BlockList => "blocklist",
            Self::Block(_) => "block",
            Self::Unblock(_) => "unblock",
            Self::Stats => "stats",
            Self::SetPassword(_) => "setpassword",
            Self::DisablePassword => "disablepassword",
        }
    }
}

/// An inline-button press, encoded in the button's callback data.
///
/// Wire format: `reply:<sender_id>:<message_id>` and `block:<sender_id>`.
/// Telegram caps callback data at 64 bytes; both forms fit with room to
/// spare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Reply {
        sender: UserId,
        original: MessageHandle,
    },
    Block {
        sender: UserId,
    },
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        let mut parts = data.split(':');
        let action = match parts.next()? {
            "reply" => {
                let sender = parts.next()?.parse().ok()?;
                let original = parts.next()?.parse().ok()?;
                Self::Reply {
                    sender: UserId(sender),
                    original: MessageHandle(original),
                }
            }
            "block" => Self::Block {
                sender: UserId(parts.next()?.parse().ok()?),
            },
            _ => return None,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(action)
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Reply { sender, original } => format!("reply:{sender}:{original}"),
            Self::Block { sender } => format!("block:{sender}"),
        }
    }
}

/// The reply/block keyboard attached to every forward in directed mode.
pub fn forward_keyboard(sender: UserId, original: MessageHandle) -> InlineKeyboard {
    InlineKeyboard::default().row(vec![
        InlineButton::new(
            "↩️ Reply",
            CallbackAction::Reply { sender, original }.encode(),
        ),
        InlineButton::new("🚫 Block", CallbackAction::Block { sender }.encode()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_admin_commands() {
        assert_eq!(AdminCommand::parse("help", &[]), Some(AdminCommand::Help));
        assert_eq!(
            AdminCommand::parse("block", &args(&["USER001234"])),
            Some(AdminCommand::Block(Some("USER001234".into())))
        );
        assert_eq!(
            AdminCommand::parse("unblock", &[]),
            Some(AdminCommand::Unblock(None))
        );
        assert_eq!(
            AdminCommand::parse("setpassword", &args(&["abc123", "extra"])),
            Some(AdminCommand::SetPassword(Some("abc123".into())))
        );
        assert_eq!(
            AdminCommand::parse("blocklist", &[]),
            Some(AdminCommand::BlockList)
        );
        assert_eq!(AdminCommand::parse("start", &[]), None);
        assert_eq!(AdminCommand::parse("frobnicate", &[]), None);
    }

    #[test]
    fn names_round_trip_through_parse() {
        for cmd in [
            AdminCommand::Help,
            AdminCommand::Users,
            AdminCommand::BlockList,
            AdminCommand::Block(None),
            AdminCommand::Unblock(None),
            AdminCommand::Stats,
            AdminCommand::SetPassword(None),
            AdminCommand::DisablePassword,
        ] {
            assert_eq!(AdminCommand::parse(cmd.name(), &[]), Some(cmd));
        }
    }

    #[test]
    fn callback_data_encodes_and_parses() {
        let reply = CallbackAction::Reply {
            sender: UserId(111),
            original: MessageHandle(42),
        };
        assert_eq!(reply.encode(), "reply:111:42");
        assert_eq!(CallbackAction::parse("reply:111:42"), Some(reply));

        let block = CallbackAction::Block { sender: UserId(-5) };
        assert_eq!(CallbackAction::parse(&block.encode()), Some(block));
    }

    #[test]
    fn malformed_callback_data_is_rejected() {
        for data in [
            "",
            "reply",
            "reply:111",
            "reply:abc:1",
            "block:",
            "block:1:2",
            "mute:1",
        ] {
            assert_eq!(CallbackAction::parse(data), None, "{data}");
        }
    }

    #[test]
    fn keyboard_fits_callback_limit() {
        let kb = forward_keyboard(UserId(i64::MAX), MessageHandle(i64::MAX));
        for button in kb.rows.iter().flatten() {
            assert!(button.data.len() <= 64);
        }
    }
}

//! User-visible texts.

use crate::relay::types::{Sender, UserId};

pub const BLOCKED: &str = "You are blocked.";
pub const SLOW_DOWN: &str = "Too many messages. Please slow down.";
pub const PASSWORD_PROMPT: &str = "Please enter the password to join the room.";
pub const WRONG_PASSWORD: &str = "Wrong password.";
pub const START_FIRST: &str = "You must send /start first.";
pub const TEXT_ONLY: &str = "Only text messages are relayed in the room.";
pub const OWNER_ONLY: &str = "Only the owner can do this.";
pub const UNKNOWN_ACTION: &str = "Unknown action.";
pub const SENDER_WELCOME: &str =
    "Hi! Send me a message and it will be forwarded. You will be notified when there is a reply.";
pub const FORWARD_ACK: &str = "✅ Message sent.";
pub const FORWARD_FAILED: &str = "❌ Your message could not be delivered. Please try again later.";
pub const REPLY_SENT: &str = "✅ Reply sent.";
pub const NOT_AWAITING_REPLY: &str =
    "Nothing to reply to. Tap ↩️ Reply on a forwarded message first.";
pub const ALIAS_UNAVAILABLE: &str = "Could not assign an alias right now. Please try again later.";
pub const CANNOT_BLOCK_OWNER: &str = "You cannot block yourself.";
pub const BROADCAST_ONLY: &str = "This command is only available in broadcast mode.";
pub const PASSWORD_ENABLED: &str = "Password enabled.";
pub const PASSWORD_DISABLED: &str = "Password disabled.";
pub const NO_USERS: &str = "No users yet.";
pub const NO_BLOCKED: &str = "No blocked users.";

/// Marker prepended to every owner reply.
pub const OWNER_REPLY_PREFIX: &str = "owner reply: ";

pub fn room_welcome(alias: &str) -> String {
    format!("Welcome {alias}. You are in the anonymous room.")
}

pub fn password_accepted(alias: &str) -> String {
    format!("Password accepted. Welcome {alias}.")
}

pub fn reply_prompt(target: &str) -> String {
    format!("✍️ Type your reply to {target} now.")
}

pub fn reply_target_blocked(target: UserId) -> String {
    format!("User {target} is blocked; the reply was not sent.")
}

pub fn reply_failed(reason: &str) -> String {
    format!("❌ Could not deliver the reply: {reason}")
}

pub fn usage(command: &str, arg: &str) -> String {
    format!("Usage: /{command} {arg}")
}

pub fn target_not_found(arg: &str) -> String {
    format!("Alias not found: {arg}")
}

pub fn blocked(label: &str, newly: bool) -> String {
    if newly {
        format!("{label} blocked.")
    } else {
        format!("{label} was already blocked.")
    }
}

pub fn unblocked(label: &str, was_blocked: bool) -> String {
    if was_blocked {
        format!("{label} unblocked.")
    } else {
        format!("{label} was not blocked.")
    }
}

/// Owner help text. Password commands are listed only for the room.
pub fn help(broadcast: bool) -> String {
    let mut text = String::from(
        "/help - Show this help\n\
         /users - List users\n\
         /blocklist - List blocked users\n\
         /block <alias|id> - Block a user\n\
         /unblock <alias|id> - Unblock a user\n\
         /stats - Statistics",
    );
    if broadcast {
        text.push_str(
            "\n/setpassword <word> - Require a password to join\n\
             /disablepassword - Remove the password",
        );
    }
    text
}

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Length of HTML text as the platform counts it: tags are dropped and an
/// entity counts as one character.
pub fn visible_len(html: &str) -> usize {
    let mut len = 0;
    let mut in_tag = false;
    let mut in_entity = false;
    for c in html.chars() {
        match c {
            '<' if !in_entity => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if in_tag => {}
            ';' if in_entity => in_entity = false,
            _ if in_entity => {}
            '&' => {
                in_entity = true;
                len += 1;
            }
            _ => len += 1,
        }
    }
    len
}

/// The identity line heading a forward: a clickable mention, plus the
/// sender's alias and id so the owner can act on them by command.
pub fn identity_line(sender: &Sender, alias: Option<&str>) -> String {
    let who = match sender.username.as_deref().filter(|u| !u.is_empty()) {
        Some(username) => format!("@{}", escape_html(username)),
        None => format!(
            "<a href=\"tg://user?id={}\">{}</a>",
            sender.id,
            escape_html(&sender.display_name())
        ),
    };
    match alias {
        Some(alias) => format!(
            "📨 From {who} · <code>{}</code> · <code>{}</code>",
            escape_html(alias),
            sender.id
        ),
        None => format!("📨 From {who} · <code>{}</code>", sender.id),
    }
}

use chrono::{DateTime, Utc};

use crate::irc::{self, Badge};

/// The author of a chat message, as described by the message's tags.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct User {
    /// Unique Twitch user id.
    pub id: String,
    /// Login name (lowercase).
    pub login: String,
    /// Display name, which may differ from the login in capitalization
    /// and may contain non-ASCII characters.
    pub name: String,
    pub badges: Vec<Badge>,
    pub badge_info: Vec<Badge>,
    pub color: String,
    pub is_mod: bool,
    pub is_subscriber: bool,
    pub is_turbo: bool,
    pub user_type: String,
}

/// A chat message sent to a channel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Privmsg {
    pub channel: String,
    pub text: String,
    /// `/me`-style message, sent wrapped in `\x01ACTION ...\x01`.
    /// The wrapper is already stripped from `text`.
    pub is_action: bool,
    pub user: User,
    /// Whether the sender is the channel owner.
    pub is_broadcaster: bool,
    /// Set when the sender marked this as their first message in the
    /// channel (`msg-id=user-intro`).
    pub is_user_intro: bool,
    pub is_first_message: bool,
    pub id: String,
    pub room_id: String,
    pub bits: Option<u64>,
    /// Raw `emotes` tag value.
    pub emotes: String,
    pub reply_parent_msg_id: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    /// Tags this projection doesn't model, preserved as-is.
    pub undocumented: Vec<(String, String)>,
}

impl Privmsg {
    pub fn parse(msg: &irc::Message<'_>) -> Privmsg {
        let mut out = Privmsg {
            channel: msg.channel().to_owned(),
            ..Privmsg::default()
        };
        out.user.login = msg.user().to_owned();

        let (text, is_action) = strip_action(msg.text());
        out.text = text.to_owned();
        out.is_action = is_action;

        for (key, value) in msg.tags.iter() {
            match *key {
                "badge-info" => out.user.badge_info = irc::badges(value),
                "badges" => out.user.badges = irc::badges(value),
                "bits" => out.bits = value.parse().ok(),
                "color" => out.user.color = (*value).to_owned(),
                "display-name" => out.user.name = irc::unescape(value),
                "emotes" => out.emotes = (*value).to_owned(),
                "first-msg" => out.is_first_message = *value == "1",
                "id" => out.id = (*value).to_owned(),
                "mod" => out.user.is_mod = *value == "1",
                "msg-id" => out.is_user_intro = *value == "user-intro",
                "reply-parent-msg-id" => out.reply_parent_msg_id = Some((*value).to_owned()),
                "room-id" => out.room_id = (*value).to_owned(),
                "subscriber" => out.user.is_subscriber = *value == "1",
                "tmi-sent-ts" => out.sent_at = msg.tags.get_date(key),
                "turbo" => out.user.is_turbo = *value == "1",
                "user-id" => out.user.id = (*value).to_owned(),
                "user-type" => out.user.user_type = (*value).to_owned(),
                _ => out.undocumented.push(((*key).to_owned(), (*value).to_owned())),
            }
        }

        out.is_broadcaster = !out.channel.is_empty() && out.user.login.eq_ignore_ascii_case(&out.channel);
        if out.user.name.is_empty() {
            out.user.name = out.user.login.clone();
        }

        out
    }
}

/// Strips the CTCP `/me` wrapper: `\x01ACTION waves\x01` -> (`waves`, true).
fn strip_action(text: &str) -> (&str, bool) {
    match text
        .strip_prefix("\u{1}ACTION ")
        .and_then(|t| t.strip_suffix('\u{1}'))
    {
        Some(inner) => (inner, true),
        None => (text, false),
    }
}

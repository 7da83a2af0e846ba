use chrono::{DateTime, Duration, Utc};

use crate::irc::{self, Badge, DurationKind};

/// Per-channel chat settings.
///
/// Twitch sends the full tag set right after a successful join, and
/// afterwards only the tags that changed, so every field is optional:
/// `None` means "not mentioned in this message", not "off".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RoomState {
    pub channel: String,
    pub room_id: String,
    pub emote_only: Option<bool>,
    /// Minimum follow age in minutes; `-1` when followers-only is off.
    pub followers_only: Option<i64>,
    pub r9k: Option<bool>,
    /// Seconds a user has to wait between messages.
    pub slow: Option<i64>,
    pub subs_only: Option<bool>,
    /// How many tags this message carried. More than two means the
    /// initial full set that confirms a join.
    pub tag_count: usize,
    pub undocumented: Vec<(String, String)>,
}

impl RoomState {
    pub fn parse(msg: &irc::Message<'_>) -> RoomState {
        let mut out = RoomState {
            channel: msg.channel().to_owned(),
            tag_count: msg.tags.len(),
            ..RoomState::default()
        };

        for (key, value) in msg.tags.iter() {
            match *key {
                "emote-only" => out.emote_only = Some(*value == "1"),
                "followers-only" => out.followers_only = value.parse().ok(),
                "r9k" => out.r9k = Some(*value == "1"),
                "room-id" => out.room_id = (*value).to_owned(),
                "slow" => out.slow = value.parse().ok(),
                "subs-only" => out.subs_only = Some(*value == "1"),
                _ => out.undocumented.push(((*key).to_owned(), (*value).to_owned())),
            }
        }

        out
    }
}

/// The bot's own chat identity within a channel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UserState {
    pub channel: String,
    pub badges: Vec<Badge>,
    pub badge_info: Vec<Badge>,
    pub color: String,
    pub name: String,
    pub emote_sets: Vec<String>,
    pub is_mod: bool,
    pub is_subscriber: bool,
    pub undocumented: Vec<(String, String)>,
}

impl UserState {
    pub fn parse(msg: &irc::Message<'_>) -> UserState {
        let mut out = UserState {
            channel: msg.channel().to_owned(),
            ..UserState::default()
        };

        for (key, value) in msg.tags.iter() {
            match *key {
                "badge-info" => out.badge_info = irc::badges(value),
                "badges" => out.badges = irc::badges(value),
                "color" => out.color = (*value).to_owned(),
                "display-name" => out.name = irc::unescape(value),
                "emote-sets" => {
                    out.emote_sets = value.split(',').filter(|v| !v.is_empty()).map(str::to_owned).collect()
                }
                "mod" => out.is_mod = *value == "1",
                "subscriber" => out.is_subscriber = *value == "1",
                _ => out.undocumented.push(((*key).to_owned(), (*value).to_owned())),
            }
        }

        out
    }
}

/// A `CLEARCHAT`: either the whole chat was cleared, or a single
/// user's messages were purged by a timeout or ban.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClearChat {
    pub channel: String,
    pub room_id: String,
    /// The purged user; `None` when the whole chat was cleared.
    pub target: Option<String>,
    pub target_user_id: String,
    /// Timeout length; `None` for permanent bans and full clears.
    pub ban_duration: Option<Duration>,
    pub sent_at: Option<DateTime<Utc>>,
    pub undocumented: Vec<(String, String)>,
}

impl ClearChat {
    pub fn parse(msg: &irc::Message<'_>) -> ClearChat {
        let mut out = ClearChat {
            channel: msg.channel().to_owned(),
            target: match msg.text() {
                "" => None,
                target => Some(target.to_owned()),
            },
            ..ClearChat::default()
        };

        for (key, value) in msg.tags.iter() {
            match *key {
                "ban-duration" => out.ban_duration = msg.tags.get_duration(key, DurationKind::Seconds),
                "room-id" => out.room_id = (*value).to_owned(),
                "target-user-id" => out.target_user_id = (*value).to_owned(),
                "tmi-sent-ts" => out.sent_at = msg.tags.get_date(key),
                _ => out.undocumented.push(((*key).to_owned(), (*value).to_owned())),
            }
        }

        out
    }
}

/// A `CLEARMSG`: removal of a single message.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClearMsg {
    pub channel: String,
    /// Login of the user whose message was removed.
    pub login: String,
    pub target_msg_id: String,
    /// The removed message's text.
    pub text: String,
    pub sent_at: Option<DateTime<Utc>>,
    pub undocumented: Vec<(String, String)>,
}

impl ClearMsg {
    pub fn parse(msg: &irc::Message<'_>) -> ClearMsg {
        let mut out = ClearMsg {
            channel: msg.channel().to_owned(),
            text: msg.text().to_owned(),
            ..ClearMsg::default()
        };

        for (key, value) in msg.tags.iter() {
            match *key {
                "login" => out.login = (*value).to_owned(),
                "target-msg-id" => out.target_msg_id = (*value).to_owned(),
                "tmi-sent-ts" => out.sent_at = msg.tags.get_date(key),
                _ => out.undocumented.push(((*key).to_owned(), (*value).to_owned())),
            }
        }

        out
    }
}

/// A private message sent directly to the bot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Whisper {
    /// Login of the sender.
    pub login: String,
    pub name: String,
    pub user_id: String,
    pub badges: Vec<Badge>,
    pub color: String,
    /// Login of the recipient (the bot).
    pub target: String,
    pub text: String,
    pub message_id: String,
    pub thread_id: String,
    pub undocumented: Vec<(String, String)>,
}

impl Whisper {
    pub fn parse(msg: &irc::Message<'_>) -> Whisper {
        let mut out = Whisper {
            login: msg.user().to_owned(),
            target: msg.params.first().unwrap_or("").to_owned(),
            text: msg.text().to_owned(),
            ..Whisper::default()
        };

        for (key, value) in msg.tags.iter() {
            match *key {
                "badges" => out.badges = irc::badges(value),
                "color" => out.color = (*value).to_owned(),
                "display-name" => out.name = irc::unescape(value),
                "message-id" => out.message_id = (*value).to_owned(),
                "thread-id" => out.thread_id = (*value).to_owned(),
                "user-id" => out.user_id = (*value).to_owned(),
                _ => out.undocumented.push(((*key).to_owned(), (*value).to_owned())),
            }
        }

        if out.name.is_empty() {
            out.name = out.login.clone();
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parse_full_roomstate() {
        let src = "@emote-only=0;followers-only=-1;r9k=0;room-id=11148817;slow=0;subs-only=0 \
                   :tmi.twitch.tv ROOMSTATE #pajlada";
        let state = RoomState::parse(&irc::Message::parse(src));

        assert_eq!("pajlada", state.channel);
        assert_eq!("11148817", state.room_id);
        assert_eq!(Some(false), state.emote_only);
        assert_eq!(Some(-1), state.followers_only);
        assert_eq!(Some(0), state.slow);
        assert_eq!(6, state.tag_count);
    }

    #[test]
    fn parse_partial_roomstate() {
        let src = "@room-id=11148817;slow=10 :tmi.twitch.tv ROOMSTATE #pajlada";
        let state = RoomState::parse(&irc::Message::parse(src));

        assert_eq!(Some(10), state.slow);
        assert_eq!(None, state.emote_only);
        assert_eq!(2, state.tag_count);
    }

    #[test]
    fn parse_userstate() {
        let src = "@badge-info=;badges=moderator/1;color=#FF0000;display-name=Bot;\
                   emote-sets=0,33,50;mod=1;subscriber=0;user-type=mod \
                   :tmi.twitch.tv USERSTATE #pajlada";
        let state = UserState::parse(&irc::Message::parse(src));

        assert_eq!("pajlada", state.channel);
        assert!(state.is_mod);
        assert_eq!(vec!["0", "33", "50"], state.emote_sets);
        assert_eq!(
            vec![("user-type".to_owned(), "mod".to_owned())],
            state.undocumented
        );
    }

    #[test]
    fn parse_clearchat_timeout() {
        let src = "@ban-duration=600;room-id=1;target-user-id=2 \
                   :tmi.twitch.tv CLEARCHAT #pajlada :baduser";
        let clear = ClearChat::parse(&irc::Message::parse(src));

        assert_eq!(Some("baduser".to_owned()), clear.target);
        assert_eq!(Some(Duration::seconds(600)), clear.ban_duration);
    }

    #[test]
    fn parse_clearchat_ban() {
        let src = "@room-id=1;target-user-id=2 :tmi.twitch.tv CLEARCHAT #pajlada :baduser";
        let clear = ClearChat::parse(&irc::Message::parse(src));

        assert_eq!(Some("baduser".to_owned()), clear.target);
        assert_eq!(None, clear.ban_duration);
    }

    #[test]
    fn parse_clearchat_full_clear() {
        let src = "@room-id=1 :tmi.twitch.tv CLEARCHAT #pajlada";
        let clear = ClearChat::parse(&irc::Message::parse(src));

        assert_eq!(None, clear.target);
        assert_eq!(None, clear.ban_duration);
    }

    #[test]
    fn parse_clearmsg() {
        let src = "@login=foo;target-msg-id=abc-123 :tmi.twitch.tv CLEARMSG #pajlada :bad message";
        let clear = ClearMsg::parse(&irc::Message::parse(src));

        assert_eq!("foo", clear.login);
        assert_eq!("abc-123", clear.target_msg_id);
        assert_eq!("bad message", clear.text);
    }

    #[test]
    fn parse_whisper() {
        let src = "@badges=;color=#2E8B57;display-name=Pajbot;message-id=2034;\
                   thread-id=40286300_82008718;turbo=0;user-id=82008718;user-type= \
                   :pajbot!pajbot@pajbot.tmi.twitch.tv WHISPER randers :hi there";
        let whisper = Whisper::parse(&irc::Message::parse(src));

        assert_eq!("pajbot", whisper.login);
        assert_eq!("Pajbot", whisper.name);
        assert_eq!("randers", whisper.target);
        assert_eq!("hi there", whisper.text);
        assert_eq!("2034", whisper.message_id);
    }
}

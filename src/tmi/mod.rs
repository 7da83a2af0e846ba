//! Typed layer over the raw IRC parser: one variant per Twitch command,
//! with the command's tags projected into named fields.

pub mod notice;
pub mod privmsg;
pub mod state;
pub mod usernotice;
pub mod write;

pub use notice::{Notice, NoticeKind};
pub use privmsg::{Privmsg, User};
pub use state::{ClearChat, ClearMsg, RoomState, UserState, Whisper};
pub use usernotice::{UserNotice, UserNoticeDetail};

use crate::irc;

/// A server `PING`; the argument must be echoed back in the `PONG`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Ping {
    arg: Option<String>,
}

impl Ping {
    pub fn arg(&self) -> Option<&str> {
        self.arg.as_deref()
    }
}

/// A `CAP` response; `which` lists the acknowledged capabilities.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Capability {
    which: String,
}

impl Capability {
    pub fn which(&self) -> &str {
        &self.which
    }
}

/// A user entering or leaving a channel's chat.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Membership {
    pub channel: String,
    pub user: String,
}

/// A `MODE` line granting or removing moderator status.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModeChange {
    pub channel: String,
    pub user: String,
    pub op_added: bool,
}

/// A structurally valid line the typed layer has no model for.
/// Kept around so nothing the server says disappears silently.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Unknown {
    pub command: String,
    pub raw: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Ping(Ping),
    Pong,
    Join(Membership),
    Part(Membership),
    Privmsg(Privmsg),
    Whisper(Whisper),
    Clearchat(ClearChat),
    Clearmsg(ClearMsg),
    GlobalUserState(UserState),
    Notice(Notice),
    Reconnect,
    RoomState(RoomState),
    UserNotice(UserNotice),
    UserState(UserState),
    Mode(ModeChange),
    Capability(Capability),
    /// Numeric 001, the end of a successful login.
    Welcome,
    Unknown(Unknown),
}

impl Message {
    /// Parse one line into its typed form.
    ///
    /// This never fails: anything unrecognized, including mangled input,
    /// becomes [`Message::Unknown`] with the raw line attached.
    pub fn parse(source: &str) -> Message {
        let msg = irc::Message::parse(source);
        Message::from_irc(&msg)
    }

    pub fn from_irc(msg: &irc::Message<'_>) -> Message {
        use irc::Command;

        match msg.cmd {
            Command::Ping => Message::Ping(Ping {
                arg: match msg.text() {
                    "" => None,
                    arg => Some(arg.to_owned()),
                },
            }),
            Command::Pong => Message::Pong,
            Command::Join => Message::Join(Membership {
                channel: msg.channel().to_owned(),
                user: msg.user().to_owned(),
            }),
            Command::Part => Message::Part(Membership {
                channel: msg.channel().to_owned(),
                user: msg.user().to_owned(),
            }),
            Command::Privmsg => Message::Privmsg(Privmsg::parse(msg)),
            Command::Whisper => Message::Whisper(Whisper::parse(msg)),
            Command::Clearchat => Message::Clearchat(ClearChat::parse(msg)),
            Command::Clearmsg => Message::Clearmsg(ClearMsg::parse(msg)),
            Command::GlobalUserState => Message::GlobalUserState(UserState::parse(msg)),
            Command::Notice => Message::Notice(Notice::parse(msg)),
            Command::Reconnect => Message::Reconnect,
            Command::RoomState => Message::RoomState(RoomState::parse(msg)),
            Command::UserNotice => Message::UserNotice(UserNotice::parse(msg)),
            Command::UserState => Message::UserState(UserState::parse(msg)),
            Command::Mode => match mode_change(msg) {
                Some(change) => Message::Mode(change),
                None => unknown(msg),
            },
            Command::Capability => Message::Capability(Capability {
                which: msg.text().to_owned(),
            }),
            Command::Numeric(1) => Message::Welcome,
            Command::Numeric(_) | Command::Unknown(_) => unknown(msg),
        }
    }
}

fn unknown(msg: &irc::Message<'_>) -> Message {
    Message::Unknown(Unknown {
        command: msg.cmd.to_string(),
        raw: msg.source.trim_end().to_owned(),
    })
}

/// `MODE #channel +o user` / `-o user`. Other mode letters exist in
/// IRC at large but Twitch only sends operator changes.
fn mode_change(msg: &irc::Message<'_>) -> Option<ModeChange> {
    let mode = msg.params.get(1)?;
    let user = msg.params.get(2)?;
    let op_added = match mode {
        "+o" => true,
        "-o" => false,
        _ => return None,
    };

    Some(ModeChange {
        channel: msg.channel().to_owned(),
        user: user.to_owned(),
        op_added,
    })
}

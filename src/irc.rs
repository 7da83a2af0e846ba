use std::fmt;
use std::ops::Deref;

use chrono::{DateTime, Duration, TimeZone, Utc};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("Expected tag '{0}'")]
    MissingTag(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Debug, PartialEq)]
pub struct Message<'a> {
    pub tags: Tags<'a>,
    pub prefix: Option<Prefix<'a>>,
    pub cmd: Command<'a>,
    pub params: Params<'a>,
    pub source: &'a str,
}

impl<'a> Message<'a> {
    /// Parse a raw IRC message
    ///
    /// Parses some Twitch-specific things, such as
    /// nick-only prefixes being host-only, or the
    /// #<channel> always being the first param.
    ///
    /// This never fails: lines that don't match any known
    /// command shape come out as [`Command::Unknown`] with
    /// the source line retained.
    pub fn parse(source: &'a str) -> Message<'a> {
        let line = source.trim_end_matches(|c| c == '\r' || c == '\n');
        let (tags, remainder) = Tags::parse(line);
        let (prefix, remainder) = Prefix::parse(remainder);
        let (cmd, remainder) = Command::parse(remainder);
        let params = Params::parse(remainder);

        Message {
            tags,
            prefix,
            cmd,
            params,
            source,
        }
    }

    /// The `#channel` param with its `#` stripped, or `""` if the message has none.
    pub fn channel(&self) -> &'a str {
        match self.params.first() {
            Some(param) if param.starts_with('#') => &param[1..],
            _ => "",
        }
    }

    /// The trailing param, or `""` if the message has none.
    pub fn text(&self) -> &'a str {
        self.params.trailing.unwrap_or("")
    }

    /// The sending user, derived from the prefix: the part before the first `!`,
    /// or the whole prefix for host-only prefixes. `""` without a prefix.
    pub fn user(&self) -> &'a str {
        match &self.prefix {
            Some(prefix) => prefix.nick.unwrap_or(prefix.host),
            None => "",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Command<'a> {
    Ping,
    Pong,
    /// Join channel
    Join,
    /// Leave channel
    Part,
    /// Twitch Private Message
    Privmsg,
    // Twitch extensions
    /// Send message to a single user
    Whisper,
    /// Purge a user's messages
    Clearchat,
    /// Single message removal
    Clearmsg,
    /// Sent upon successful authentication (PASS/NICK command)
    GlobalUserState,
    /// General notices from the server
    Notice,
    /// Rejoins channels after a restart
    Reconnect,
    /// Identifies the channel's chat settings
    RoomState,
    /// Announces Twitch-specific events to the channel
    UserNotice,
    /// Identifies a user's chat settings or properties
    UserState,
    /// Channel mode change (e.g. gaining/losing moderator)
    Mode,
    /// Requesting an IRC capability
    Capability,
    /// Numeric reply (001-376)
    Numeric(u16),
    /// Unknown command
    Unknown(&'a str),
}

impl<'a> Command<'a> {
    /// Parses a Twitch IRC command
    ///
    /// Returns (command, remainder)
    pub fn parse(data: &'a str) -> (Command<'a>, &'a str) {
        use Command::*;
        let data = data.trim_start();
        let end = match data.find(' ') {
            Some(v) => v,
            None => data.len(),
        };
        let cmd = &data[..end];
        let cmd = match cmd {
            "PING" => Ping,
            "PONG" => Pong,
            "JOIN" => Join,
            "PART" => Part,
            "PRIVMSG" => Privmsg,
            "WHISPER" => Whisper,
            "CLEARCHAT" => Clearchat,
            "CLEARMSG" => Clearmsg,
            "GLOBALUSERSTATE" => GlobalUserState,
            "NOTICE" => Notice,
            "RECONNECT" => Reconnect,
            "ROOMSTATE" => RoomState,
            "USERNOTICE" => UserNotice,
            "USERSTATE" => UserState,
            "MODE" => Mode,
            "CAP" => Capability,
            other => match numeric(other) {
                Some(code) => Numeric(code),
                None => Unknown(other),
            },
        };

        (cmd, &data[end..])
    }
}

/// Three-digit numeric replies, e.g. `001` or `376`.
fn numeric(cmd: &str) -> Option<u16> {
    if cmd.len() == 3 && cmd.bytes().all(|b| b.is_ascii_digit()) {
        cmd.parse().ok()
    } else {
        None
    }
}

impl<'a> fmt::Display for Command<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Command::*;
        match self {
            Ping => write!(f, "PING"),
            Pong => write!(f, "PONG"),
            Join => write!(f, "JOIN"),
            Part => write!(f, "PART"),
            Privmsg => write!(f, "PRIVMSG"),
            Whisper => write!(f, "WHISPER"),
            Clearchat => write!(f, "CLEARCHAT"),
            Clearmsg => write!(f, "CLEARMSG"),
            GlobalUserState => write!(f, "GLOBALUSERSTATE"),
            Notice => write!(f, "NOTICE"),
            Reconnect => write!(f, "RECONNECT"),
            RoomState => write!(f, "ROOMSTATE"),
            UserNotice => write!(f, "USERNOTICE"),
            UserState => write!(f, "USERSTATE"),
            Mode => write!(f, "MODE"),
            Capability => write!(f, "CAP"),
            Numeric(code) => write!(f, "{:03}", code),
            Unknown(other) => write!(f, "{}", other),
        }
    }
}

/// IRC tags, in wire order.
///
/// Values are stored raw (still escaped); use [`Tags::get_unescaped`]
/// for values that may contain escape sequences. Duplicate keys keep
/// their first position but the last value wins. Empty values are
/// kept, so no tag present on the wire is ever lost.
#[derive(Clone, Debug, PartialEq)]
pub struct Tags<'a>(Vec<(&'a str, &'a str)>);

impl<'a> Deref for Tags<'a> {
    type Target = Vec<(&'a str, &'a str)>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DurationKind {
    Milliseconds,
    Seconds,
    Minutes,
}

impl<'a> Tags<'a> {
    pub fn empty() -> Tags<'a> {
        Tags(Vec::new())
    }

    /// Parses IRC tags in the form
    ///
    /// `@key0=[value0];key1=[value1];...;keyN=[valueN] `
    ///
    /// `[value]`s are optional
    ///
    /// Returns (tags, remainder)
    pub fn parse(data: &'a str) -> (Tags<'a>, &'a str) {
        let data = match data.strip_prefix('@') {
            Some(v) => v,
            None => return (Tags::empty(), data),
        };
        // escaped spaces are "\s" on the wire, so the first real
        // space terminates the tag block
        let (block, remainder) = match data.split_once(' ') {
            Some((block, remainder)) => (block, remainder),
            None => (data, ""),
        };

        let mut collection: Vec<(&'a str, &'a str)> = Vec::new();
        for pair in block.split(';').filter(|p| !p.is_empty()) {
            let (key, value) = match pair.split_once('=') {
                Some((key, value)) => (key, value),
                None => (pair, ""),
            };
            match collection.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = value,
                None => collection.push((key, value)),
            }
        }

        (Tags(collection), remainder)
    }

    /// Iterates the tags to find one with key == `key`.
    pub fn get(&self, key: &str) -> Option<&'a str> {
        for (item_key, item_value) in self.0.iter() {
            if key == *item_key {
                return Some(*item_value);
            }
        }

        None
    }

    /// Like `.get()`, but with tag escape sequences decoded.
    pub fn get_unescaped(&self, key: &str) -> Option<String> {
        self.get(key).map(unescape)
    }

    /// Parses a number
    pub fn get_number<N>(&self, key: &str) -> Option<N>
    where
        N: std::str::FromStr,
        <N as std::str::FromStr>::Err: std::fmt::Display,
    {
        self.get(key).and_then(|v| v.parse::<N>().ok())
    }

    /// Parses a numeric bool. Twitch sends `0`/`1`; `1` and `true` are
    /// truthy, any other present value is falsy, an absent key is `None`.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).map(|v| v == "1" || v == "true")
    }

    /// Parses a comma-separated list of values
    pub fn get_csv(&self, key: &str) -> Option<Vec<&'a str>> {
        self.get(key)
            .map(|v| v.split(',').filter(|v| !v.is_empty()).collect())
    }

    /// Parses a millisecond precision UNIX timestamp as a UTC date/time
    pub fn get_date(&self, key: &str) -> Option<DateTime<Utc>> {
        self.get_number::<i64>(key)
            .and_then(|v| Utc.timestamp_millis_opt(v).single())
    }

    pub fn get_duration(&self, key: &str, kind: DurationKind) -> Option<Duration> {
        self.get_number::<i64>(key).map(|v| match kind {
            DurationKind::Milliseconds => Duration::milliseconds(v),
            DurationKind::Seconds => Duration::seconds(v),
            DurationKind::Minutes => Duration::minutes(v),
        })
    }

    /// Parses a badge list of the form `name/version,name/version`.
    /// Elements without a `/` are malformed and skipped.
    pub fn get_badges(&self, key: &str) -> Vec<Badge> {
        self.get(key).map(badges).unwrap_or_default()
    }

    /// Like `.get()`, but returns an `Error` in case the key doesn't exist
    pub fn require(&self, key: &str) -> Result<&'a str> {
        self.get(key).ok_or_else(|| Error::MissingTag(key.into()))
    }

    /// Like `.get_unescaped()`, but returns an `Error` in case the key doesn't exist
    pub fn require_unescaped(&self, key: &str) -> Result<String> {
        self.get_unescaped(key)
            .ok_or_else(|| Error::MissingTag(key.into()))
    }

    /// Like `.get_number()`, but returns an `Error` in case the key doesn't
    /// exist, or is invalid in some way
    pub fn require_number<N>(&self, key: &str) -> Result<N>
    where
        N: std::str::FromStr,
        <N as std::str::FromStr>::Err: std::fmt::Display,
    {
        self.get_number(key)
            .ok_or_else(|| Error::MissingTag(key.into()))
    }
}

impl<'a> fmt::Display for Tags<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@")?;
        let mut iter = self.iter().peekable();
        while let Some((key, value)) = iter.next() {
            write!(
                f,
                "{}={}{}",
                key,
                value,
                if iter.peek().is_some() { ";" } else { "" }
            )?;
        }

        Ok(())
    }
}

/// Decodes the IRCv3 tag value escapes:
/// `\:` -> `;`, `\s` -> ` `, `\\` -> `\`, `\r` -> CR, `\n` -> LF.
/// An unknown escape keeps the escaped character, a trailing lone
/// backslash is dropped.
pub fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut iter = value.chars();
    while let Some(c) = iter.next() {
        let c = if c == '\\' {
            match iter.next() {
                Some(':') => ';',
                Some('s') => ' ',
                Some('\\') => '\\',
                Some('r') => '\r',
                Some('n') => '\n',
                Some(c) => c,
                None => break,
            }
        } else {
            c
        };
        out.push(c);
    }
    out
}

/// One entry of a `badges`/`badge-info` tag.
#[derive(Clone, Debug, PartialEq)]
pub struct Badge {
    pub name: String,
    pub version: String,
}

/// Decodes a badge list value: `subscriber/12,vip/1` -> [(subscriber, 12), (vip, 1)].
pub fn badges(value: &str) -> Vec<Badge> {
    value
        .split(',')
        .filter_map(|entry| entry.split_once('/'))
        .map(|(name, version)| Badge {
            name: name.into(),
            version: version.into(),
        })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Prefix<'a> {
    pub nick: Option<&'a str>,
    pub user: Option<&'a str>,
    pub host: &'a str,
}

impl<'a> Prefix<'a> {
    /// Parses an IRC prefix in one of the following forms:
    ///
    /// * `host`
    /// * `nick@host`
    /// * `nick!user@host`
    ///
    /// Server-originated lines may carry no prefix at all, in which
    /// case `None` is returned and the input is left untouched.
    ///
    /// Returns (prefix, remainder)
    pub fn parse(data: &'a str) -> (Option<Prefix<'a>>, &'a str) {
        let data_trimmed = data.trim_start();
        let rest = match data_trimmed.strip_prefix(':') {
            Some(v) => v,
            None => return (None, data),
        };
        let (prefix, remainder) = match rest.split_once(' ') {
            Some((prefix, remainder)) => (prefix, remainder),
            None => (rest, ""),
        };

        // on twitch, nick-only is actually host-only (because they're not fully
        // compliant with RFC2812) so in case we don't find '@', we treat
        // the prefix as just the 'host' part
        let (nick, user, host) = match prefix.split_once('@') {
            Some((nick_and_user, host)) => match nick_and_user.split_once('!') {
                // case: 'nick!user@host'
                Some((nick, user)) => (Some(nick), Some(user), host),
                // case: 'nick@host'
                None => (Some(nick_and_user), None, host),
            },
            // case: 'host'
            None => (None, None, prefix),
        };

        (Some(Prefix { nick, user, host }), remainder)
    }
}

impl<'a> fmt::Display for Prefix<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            ":{}{}{}{}{}",
            self.nick.unwrap_or(""),
            if self.nick.is_some() && self.user.is_some() {
                "!"
            } else {
                ""
            },
            self.user.unwrap_or(""),
            if self.nick.is_some() { "@" } else { "" },
            self.host
        )
    }
}

/// Message params: the positional list, plus the trailing param
/// (which is the only one that may contain spaces).
#[derive(Clone, Debug, PartialEq)]
pub struct Params<'a> {
    pub list: Vec<&'a str>,
    pub trailing: Option<&'a str>,
}

impl<'a> Params<'a> {
    /// Parse a params list
    ///
    /// Valid form: `param0 param1 [:trailing text]`
    pub fn parse(data: &'a str) -> Params<'a> {
        let data = data.trim_start();
        let (head, trailing) = match data.strip_prefix(':') {
            // the trailing param may also be the only param
            Some(trailing) => ("", Some(trailing)),
            None => match data.split_once(" :") {
                Some((head, trailing)) => (head, Some(trailing)),
                None => (data, None),
            },
        };

        Params {
            list: head.split(' ').filter(|p| !p.is_empty()).collect(),
            trailing,
        }
    }

    pub fn first(&self) -> Option<&'a str> {
        self.get(0)
    }

    /// Positional access; the trailing param is the last one.
    pub fn get(&self, index: usize) -> Option<&'a str> {
        if index < self.list.len() {
            Some(self.list[index])
        } else if index == self.list.len() {
            self.trailing
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.list.len() + if self.trailing.is_some() { 1 } else { 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a> fmt::Display for Params<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut iter = self.list.iter().peekable();
        while let Some(param) = iter.next() {
            write!(
                f,
                "{}{}",
                param,
                if iter.peek().is_some() { " " } else { "" }
            )?;
        }
        if let Some(trailing) = self.trailing {
            if !self.list.is_empty() {
                write!(f, " ")?;
            }
            write!(f, ":{}", trailing)?;
        }

        Ok(())
    }
}

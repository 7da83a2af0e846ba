//! Builders for the raw lines the client writes to Twitch.

pub fn join(channel: &str) -> String {
    format!("JOIN #{}\r\n", channel)
}

pub fn part(channel: &str) -> String {
    format!("PART #{}\r\n", channel)
}

pub fn privmsg(channel: &str, message: &str) -> String {
    format!("PRIVMSG #{} :{}\r\n", channel, message)
}

/// A `PRIVMSG` threaded onto an existing message.
pub fn reply(channel: &str, message: &str, reply_parent_msg_id: &str) -> String {
    format!(
        "@reply-parent-msg-id={} PRIVMSG #{} :{}\r\n",
        reply_parent_msg_id, channel, message
    )
}

pub fn pong(arg: Option<&str>) -> String {
    format!("PONG :{}\r\n", arg.unwrap_or("tmi.twitch.tv"))
}

pub fn cap(with_membership: bool) -> String {
    format!(
        "CAP REQ :twitch.tv/commands twitch.tv/tags{}\r\n",
        if with_membership { " twitch.tv/membership" } else { "" }
    )
}

pub fn pass(token: &str) -> String {
    format!("PASS oauth:{}\r\n", token)
}

pub fn nick(login: &str) -> String {
    format!("NICK {}\r\n", login)
}

pub fn user(login: &str) -> String {
    format!("USER {} 0 * :{}\r\n", login, login)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn write_privmsg() {
        assert_eq!("PRIVMSG #pajlada :dank cam\r\n", privmsg("pajlada", "dank cam"));
    }

    #[test]
    fn write_reply() {
        assert_eq!(
            "@reply-parent-msg-id=abc-123 PRIVMSG #pajlada :dank cam\r\n",
            reply("pajlada", "dank cam", "abc-123")
        );
    }

    #[test]
    fn write_pong() {
        assert_eq!("PONG :tmi.twitch.tv\r\n", pong(None));
        assert_eq!("PONG :other.host\r\n", pong(Some("other.host")));
    }

    #[test]
    fn write_cap() {
        assert_eq!("CAP REQ :twitch.tv/commands twitch.tv/tags\r\n", cap(false));
        assert_eq!(
            "CAP REQ :twitch.tv/commands twitch.tv/tags twitch.tv/membership\r\n",
            cap(true)
        );
    }

    #[test]
    fn privmsg_roundtrips_through_the_parser() {
        let line = privmsg("pajlada", "dank cam");
        let parsed = crate::irc::Message::parse(&line);
        assert_eq!("pajlada", parsed.channel());
        assert_eq!("dank cam", parsed.text());

        let line = reply("pajlada", "dank cam", "abc-123");
        let parsed = crate::irc::Message::parse(&line);
        assert_eq!("pajlada", parsed.channel());
        assert_eq!("dank cam", parsed.text());
        assert_eq!(Some("abc-123"), parsed.tags.get("reply-parent-msg-id"));
    }
}

use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::irc;

/// The kinds of server `NOTICE` the client understands, keyed by the
/// `msg-id` tag. Anything else comes out as [`NoticeKind::Unknown`] so
/// new server notices surface as diagnostics instead of disappearing.
#[derive(Clone, Debug, PartialEq)]
pub enum NoticeKind {
    /// The bot is banned from the channel.
    Banned,
    SlowModeOn,
    SlowModeOff,
    SubsOnlyOn,
    SubsOnlyOff,
    EmoteOnlyOn,
    EmoteOnlyOff,
    R9kOn,
    R9kOff,
    FollowersOnlyOn,
    /// Followers-only with no minimum follow age.
    FollowersOnlyOnZero,
    FollowersOnlyOff,
    /// The message was identical to the previous one.
    DuplicateMessage,
    RateLimited,
    /// The bot's account is suspended.
    Suspended,
    VerifiedEmailRequired,
    VerifiedPhoneRequired,
    /// Tried to raid the channel itself.
    RaidSelf,
    NoPermission,
    /// Response to `/mods`.
    ModeratorList,
    /// Response to `/vips`.
    VipList,
    ChannelSuspended,
    Unknown(String),
}

lazy_static! {
    static ref NOTICE_KINDS: HashMap<&'static str, NoticeKind> = {
        use NoticeKind::*;
        let mut map = HashMap::new();
        map.insert("msg_banned", Banned);
        map.insert("slow_on", SlowModeOn);
        map.insert("slow_off", SlowModeOff);
        map.insert("subs_on", SubsOnlyOn);
        map.insert("subs_off", SubsOnlyOff);
        map.insert("emote_only_on", EmoteOnlyOn);
        map.insert("emote_only_off", EmoteOnlyOff);
        map.insert("r9k_on", R9kOn);
        map.insert("r9k_off", R9kOff);
        map.insert("followers_on", FollowersOnlyOn);
        map.insert("followers_onzero", FollowersOnlyOnZero);
        map.insert("followers_off", FollowersOnlyOff);
        map.insert("msg_duplicate", DuplicateMessage);
        map.insert("msg_ratelimit", RateLimited);
        map.insert("msg_suspended", Suspended);
        map.insert("msg_verified_email", VerifiedEmailRequired);
        map.insert("msg_requires_verified_phone_number", VerifiedPhoneRequired);
        map.insert("raid_error_self", RaidSelf);
        map.insert("no_permission", NoPermission);
        map.insert("room_mods", ModeratorList);
        map.insert("no_mods", ModeratorList);
        map.insert("vips_success", VipList);
        map.insert("no_vips", VipList);
        map.insert("msg_channel_suspended", ChannelSuspended);
        map
    };
}

impl NoticeKind {
    pub fn lookup(msg_id: &str) -> NoticeKind {
        NOTICE_KINDS
            .get(msg_id)
            .cloned()
            .unwrap_or_else(|| NoticeKind::Unknown(msg_id.to_owned()))
    }
}

/// A general notice from the server, e.g. a chat mode change or a
/// rejection of something the client tried to do.
#[derive(Clone, Debug, PartialEq)]
pub struct Notice {
    pub channel: String,
    pub kind: NoticeKind,
    /// The human-readable notice text.
    pub message: String,
    /// Raw `msg-id`, also retained for [`NoticeKind::Unknown`] logging.
    pub msg_id: String,
}

impl Notice {
    pub fn parse(msg: &irc::Message<'_>) -> Notice {
        let msg_id = msg.tags.get("msg-id").unwrap_or("").to_owned();
        Notice {
            channel: msg.channel().to_owned(),
            kind: NoticeKind::lookup(&msg_id),
            message: msg.text().to_owned(),
            msg_id,
        }
    }
}

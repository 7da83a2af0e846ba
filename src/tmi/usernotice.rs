use std::collections::HashMap;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;

use crate::irc::{self, Badge};

/// Fields shared by every `USERNOTICE`, decoded in a single pass.
/// The kind-specific `msg-param-*` tags are left over for the
/// per-kind decoders below.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UserNoticeBase {
    pub id: String,
    /// Login of the user the notice is about.
    pub login: String,
    pub name: String,
    pub room_id: String,
    pub badges: Vec<Badge>,
    pub badge_info: Vec<Badge>,
    pub color: String,
    /// Server-rendered description, e.g. "Foo subscribed at Tier 1.".
    pub system_msg: String,
    pub is_mod: bool,
    pub is_subscriber: bool,
    pub sent_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Announcement {
    /// Highlight color chosen by the announcer.
    pub color: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Raid {
    pub login: String,
    pub name: String,
    pub viewer_count: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Resub {
    pub cumulative_months: u64,
    /// 0 when the user chose not to share their streak.
    pub streak_months: u64,
    pub share_streak: bool,
    pub plan: String,
    pub plan_name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Sub {
    pub plan: String,
    pub plan_name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubGift {
    pub recipient_id: String,
    pub recipient_login: String,
    pub recipient_name: String,
    pub months: u64,
    pub gift_months: u64,
    pub plan: String,
    pub plan_name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CommunitySubGift {
    /// Number of subs gifted in this batch.
    pub count: u64,
    /// The gifter's lifetime gift total in this channel.
    pub sender_total: u64,
    pub plan: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GiftPaidUpgrade {
    pub sender_login: String,
    pub sender_name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PrimePaidUpgrade {
    pub plan: String,
}

/// The kind-specific payload of a `USERNOTICE`, keyed by its `msg-id`.
#[derive(Clone, Debug, PartialEq)]
pub enum UserNoticeDetail {
    Announcement(Announcement),
    Raid(Raid),
    Resub(Resub),
    Sub(Sub),
    SubGift(SubGift),
    CommunitySubGift(CommunitySubGift),
    GiftPaidUpgrade(GiftPaidUpgrade),
    PrimePaidUpgrade(PrimePaidUpgrade),
    Unknown(String),
}

/// A Twitch-specific channel event (sub, raid, announcement, ...).
#[derive(Clone, Debug, PartialEq)]
pub struct UserNotice {
    pub channel: String,
    /// The message the user attached, if any.
    pub text: String,
    pub base: UserNoticeBase,
    pub detail: UserNoticeDetail,
    /// Tags neither the base nor the kind decoder consumed.
    pub undocumented: Vec<(String, String)>,
}

/// The `msg-param-*` tags left after the base decode. Kind decoders
/// `take` what they model; the rest surfaces as undocumented.
struct Leftover(Vec<(String, String)>);

impl Leftover {
    fn take(&mut self, key: &str) -> Option<String> {
        let index = self.0.iter().position(|(k, _)| k == key)?;
        Some(irc::unescape(&self.0.remove(index).1))
    }

    fn take_number<N>(&mut self, key: &str) -> Option<N>
    where
        N: std::str::FromStr,
    {
        self.take(key).and_then(|v| v.parse().ok())
    }

    fn take_bool(&mut self, key: &str) -> bool {
        self.take(key).map(|v| v == "1" || v == "true").unwrap_or(false)
    }
}

type DetailFn = fn(&mut Leftover) -> UserNoticeDetail;

lazy_static! {
    static ref USER_NOTICE_KINDS: HashMap<&'static str, DetailFn> = {
        let mut map: HashMap<&'static str, DetailFn> = HashMap::new();
        map.insert("announcement", announcement);
        map.insert("raid", raid);
        map.insert("resub", resub);
        map.insert("sub", sub);
        map.insert("subgift", sub_gift);
        map.insert("submysterygift", community_sub_gift);
        map.insert("giftpaidupgrade", gift_paid_upgrade);
        map.insert("primepaidupgrade", prime_paid_upgrade);
        map
    };
}

fn announcement(tags: &mut Leftover) -> UserNoticeDetail {
    UserNoticeDetail::Announcement(Announcement {
        color: tags.take("msg-param-color"),
    })
}

fn raid(tags: &mut Leftover) -> UserNoticeDetail {
    UserNoticeDetail::Raid(Raid {
        login: tags.take("msg-param-login").unwrap_or_default(),
        name: tags.take("msg-param-displayName").unwrap_or_default(),
        viewer_count: tags.take_number("msg-param-viewerCount").unwrap_or(0),
    })
}

fn resub(tags: &mut Leftover) -> UserNoticeDetail {
    UserNoticeDetail::Resub(Resub {
        cumulative_months: tags.take_number("msg-param-cumulative-months").unwrap_or(0),
        streak_months: tags.take_number("msg-param-streak-months").unwrap_or(0),
        share_streak: tags.take_bool("msg-param-should-share-streak"),
        plan: tags.take("msg-param-sub-plan").unwrap_or_default(),
        plan_name: tags.take("msg-param-sub-plan-name").unwrap_or_default(),
    })
}

fn sub(tags: &mut Leftover) -> UserNoticeDetail {
    UserNoticeDetail::Sub(Sub {
        plan: tags.take("msg-param-sub-plan").unwrap_or_default(),
        plan_name: tags.take("msg-param-sub-plan-name").unwrap_or_default(),
    })
}

fn sub_gift(tags: &mut Leftover) -> UserNoticeDetail {
    UserNoticeDetail::SubGift(SubGift {
        recipient_id: tags.take("msg-param-recipient-id").unwrap_or_default(),
        recipient_login: tags.take("msg-param-recipient-user-name").unwrap_or_default(),
        recipient_name: tags.take("msg-param-recipient-display-name").unwrap_or_default(),
        months: tags.take_number("msg-param-months").unwrap_or(0),
        gift_months: tags.take_number("msg-param-gift-months").unwrap_or(1),
        plan: tags.take("msg-param-sub-plan").unwrap_or_default(),
        plan_name: tags.take("msg-param-sub-plan-name").unwrap_or_default(),
    })
}

fn community_sub_gift(tags: &mut Leftover) -> UserNoticeDetail {
    UserNoticeDetail::CommunitySubGift(CommunitySubGift {
        count: tags.take_number("msg-param-mass-gift-count").unwrap_or(0),
        sender_total: tags.take_number("msg-param-sender-count").unwrap_or(0),
        plan: tags.take("msg-param-sub-plan").unwrap_or_default(),
    })
}

fn gift_paid_upgrade(tags: &mut Leftover) -> UserNoticeDetail {
    UserNoticeDetail::GiftPaidUpgrade(GiftPaidUpgrade {
        sender_login: tags.take("msg-param-sender-login").unwrap_or_default(),
        sender_name: tags.take("msg-param-sender-name").unwrap_or_default(),
    })
}

fn prime_paid_upgrade(tags: &mut Leftover) -> UserNoticeDetail {
    UserNoticeDetail::PrimePaidUpgrade(PrimePaidUpgrade {
        plan: tags.take("msg-param-sub-plan").unwrap_or_default(),
    })
}

impl UserNotice {
    pub fn parse(msg: &irc::Message<'_>) -> UserNotice {
        let mut base = UserNoticeBase::default();
        let mut msg_id = String::new();
        let mut leftover = Leftover(Vec::new());

        for (key, value) in msg.tags.iter() {
            match *key {
                "badge-info" => base.badge_info = irc::badges(value),
                "badges" => base.badges = irc::badges(value),
                "color" => base.color = (*value).to_owned(),
                "display-name" => base.name = irc::unescape(value),
                "id" => base.id = (*value).to_owned(),
                "login" => base.login = (*value).to_owned(),
                "mod" => base.is_mod = *value == "1",
                "msg-id" => msg_id = (*value).to_owned(),
                "room-id" => base.room_id = (*value).to_owned(),
                "subscriber" => base.is_subscriber = *value == "1",
                "system-msg" => base.system_msg = irc::unescape(value),
                "tmi-sent-ts" => base.sent_at = msg.tags.get_date(key),
                _ => leftover.0.push(((*key).to_owned(), (*value).to_owned())),
            }
        }

        let detail = match USER_NOTICE_KINDS.get(msg_id.as_str()) {
            Some(decode) => decode(&mut leftover),
            None => UserNoticeDetail::Unknown(msg_id),
        };

        UserNotice {
            channel: msg.channel().to_owned(),
            text: msg.text().to_owned(),
            base,
            detail,
            undocumented: leftover.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parse_resub() {
        let src = "@badge-info=subscriber/12;badges=subscriber/12;color=#FF0000;display-name=Foo;\
                   id=abc;login=foo;mod=0;msg-id=resub;msg-param-cumulative-months=12;\
                   msg-param-should-share-streak=1;msg-param-streak-months=12;\
                   msg-param-sub-plan-name=Channel\\sSub;msg-param-sub-plan=1000;room-id=1;\
                   subscriber=1;system-msg=Foo\\ssubscribed\\sfor\\s12\\smonths!;tmi-sent-ts=1594545155039 \
                   :tmi.twitch.tv USERNOTICE #pajlada :still here!";
        let notice = UserNotice::parse(&irc::Message::parse(src));

        assert_eq!("pajlada", notice.channel);
        assert_eq!("still here!", notice.text);
        assert_eq!("foo", notice.base.login);
        assert_eq!("Foo subscribed for 12 months!", notice.base.system_msg);
        assert_eq!(
            UserNoticeDetail::Resub(Resub {
                cumulative_months: 12,
                streak_months: 12,
                share_streak: true,
                plan: "1000".into(),
                plan_name: "Channel Sub".into(),
            }),
            notice.detail
        );
        assert_eq!(Vec::<(String, String)>::new(), notice.undocumented);
    }

    #[test]
    fn parse_raid() {
        let src = "@display-name=Foo;login=foo;msg-id=raid;msg-param-displayName=Foo;\
                   msg-param-login=foo;msg-param-viewerCount=42;room-id=1;system-msg=raiders \
                   :tmi.twitch.tv USERNOTICE #pajlada";
        let notice = UserNotice::parse(&irc::Message::parse(src));

        assert_eq!(
            UserNoticeDetail::Raid(Raid {
                login: "foo".into(),
                name: "Foo".into(),
                viewer_count: 42,
            }),
            notice.detail
        );
        assert_eq!("", notice.text);
    }

    #[test]
    fn parse_announcement() {
        let src = "@login=foo;msg-id=announcement;msg-param-color=PRIMARY \
                   :tmi.twitch.tv USERNOTICE #pajlada :big news";
        let notice = UserNotice::parse(&irc::Message::parse(src));
        assert_eq!(
            UserNoticeDetail::Announcement(Announcement {
                color: Some("PRIMARY".into())
            }),
            notice.detail
        );
    }

    #[test]
    fn unknown_kind_keeps_params() {
        let src = "@login=foo;msg-id=brand_new_thing;msg-param-whatever=1 \
                   :tmi.twitch.tv USERNOTICE #pajlada";
        let notice = UserNotice::parse(&irc::Message::parse(src));
        assert_eq!(UserNoticeDetail::Unknown("brand_new_thing".into()), notice.detail);
        assert_eq!(
            vec![("msg-param-whatever".to_owned(), "1".to_owned())],
            notice.undocumented
        );
    }
}

//! The chat client: owns the connection, dispatches received lines
//! into [`Event`]s, and drains the outbound queue under the rate limit.
//!
//! The design is a single actor task: one `select!` loop that reads
//! lines, ticks the throttle, and services control commands from the
//! cloneable [`Sender`] handles. Received-message bookkeeping and the
//! send queue live on that one task; only the joined-channel set is
//! shared out (behind a mutex) for queries.

use std::collections::{HashMap, HashSet, VecDeque};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use unicode_segmentation::UnicodeSegmentation;

use crate::conn::{self, Login, Transport};
use crate::throttle::{OutboundMessage, SendQueue, Throttle, WindowSnapshot};
use crate::tmi::{self, write, ClearMsg, Notice, NoticeKind, Privmsg, RoomState, UserNotice, UserNoticeDetail, UserState, Whisper};
use crate::{throttle, util};

/// How long a join may wait for its ROOMSTATE confirmation.
const JOIN_CONFIRM_TIMEOUT: Duration = Duration::from_secs(5);
/// Twitch rejects chat messages longer than this many characters.
const MAX_MESSAGE_LEN: usize = 500;
/// JOINs per second; Twitch budgets 20 per 10 seconds.
const JOINS_PER_SECOND: u32 = 2;

type JoinLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Clone, Debug)]
pub struct Config {
    pub credentials: Login,
    /// Channels to join right after connecting.
    pub channels: Vec<String>,
    /// Also request `twitch.tv/membership`, i.e. other users' JOIN/PART.
    pub membership_data: bool,
    /// Answer server PINGs automatically. When off, PINGs surface as
    /// [`Event::Ping`] and the reply is the caller's problem.
    pub auto_pong: bool,
    /// Leading characters that mark a chat message as a command.
    pub command_prefixes: Vec<char>,
    /// Reconnect on connection loss (and on server-requested RECONNECT).
    pub reconnect: bool,
    pub max_reconnect_attempts: u32,
    pub throttle: throttle::Config,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            credentials: Login::Anonymous,
            channels: Vec::new(),
            membership_data: false,
            auto_pong: true,
            command_prefixes: vec!['!'],
            reconnect: true,
            max_reconnect_attempts: 10,
            throttle: throttle::Config::default(),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Not connected to Twitch")]
    NotConnected,
    #[error("Send queue is full")]
    QueueFull,
    #[error("Message is too long: {0}/{max} characters", max = MAX_MESSAGE_LEN)]
    MessageTooLong(usize),
    #[error("Client is shut down")]
    Closed,
    #[error(transparent)]
    Conn(#[from] conn::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Everything the client can tell you about.
///
/// Server anomalies (unknown notices, unparseable lines) come through
/// as [`Event::Unaccounted`] rather than being dropped, so a consumer
/// can log them. Nothing the server sends can crash the client.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Login finished.
    Connected,
    /// The connection was re-established after a drop or a
    /// server-requested reconnect. Channels are re-joined automatically.
    Reconnected,
    /// A join was confirmed by the channel's initial room state.
    Joined { channel: String },
    /// A join was not confirmed in time.
    JoinFailed { channel: String },
    /// The bot left a channel.
    Left { channel: String },
    UserJoined { channel: String, user: String },
    UserLeft { channel: String, user: String },
    ModeratorJoined { channel: String, user: String },
    ModeratorLeft { channel: String, user: String },
    /// A chat message.
    Message(Privmsg),
    /// A user's self-introduction, raised alongside [`Event::Message`].
    UserIntro(Privmsg),
    /// A chat message starting with one of the configured command
    /// prefixes, raised alongside [`Event::Message`].
    ChatCommand { message: Privmsg, name: String, args: String },
    Whisper(Whisper),
    Notice(Notice),
    UserNotice(UserNotice),
    RoomStateChanged(RoomState),
    UserStateChanged(UserState),
    GlobalUserState(UserState),
    /// Delivery confirmation of the bot's own most recent message.
    MessageSent { channel: String, state: UserState },
    ChatCleared { channel: String },
    UserTimedOut { channel: String, user: String, seconds: i64 },
    UserBanned { channel: String, user: String },
    MessageDeleted(ClearMsg),
    /// Server PING while auto-pong is off.
    Ping { arg: Option<String> },
    /// The transport refused an outbound message.
    SendFailed {
        reason: String,
        channel: String,
        text: String,
        window: WindowSnapshot,
    },
    /// A structurally valid line nothing above matched.
    Unaccounted { raw: String },
    /// The connection is gone and reconnecting failed (or is disabled).
    FatalError { reason: String },
}

enum Control {
    Join(String),
    Part(String),
    AddPrefix(char),
    RemovePrefix(char),
    Reconnect,
    Close,
}

/// Cloneable handle for everything that goes out: chat messages,
/// joins/parts, and client control.
#[derive(Clone)]
pub struct Sender {
    queue: Arc<SendQueue>,
    control: mpsc::UnboundedSender<Control>,
    channels: Arc<Mutex<HashSet<String>>>,
}

impl Sender {
    /// Queues a chat message. Returns `false` (without blocking or
    /// failing) when disconnected or when the queue is full.
    pub fn queue_privmsg(&self, channel: &str, text: &str) -> bool {
        self.queue.queue(OutboundMessage {
            channel: util::normalize_channel(channel),
            text: text.to_owned(),
            reply_parent_msg_id: None,
            queued_at: Instant::now(),
        })
    }

    /// Like [`Sender::queue_privmsg`], threaded onto an existing message.
    pub fn queue_reply(&self, channel: &str, text: &str, reply_parent_msg_id: &str) -> bool {
        self.queue.queue(OutboundMessage {
            channel: util::normalize_channel(channel),
            text: text.to_owned(),
            reply_parent_msg_id: Some(reply_parent_msg_id.to_owned()),
            queued_at: Instant::now(),
        })
    }

    /// Queues a chat message, reporting why when it can't be queued.
    pub fn say(&self, channel: &str, text: &str) -> Result<()> {
        self.check_text(text)?;
        if self.queue_privmsg(channel, text) {
            Ok(())
        } else {
            Err(Error::QueueFull)
        }
    }

    /// Queues a reply to the message identified by `reply_parent_msg_id`.
    pub fn reply(&self, channel: &str, text: &str, reply_parent_msg_id: &str) -> Result<()> {
        self.check_text(text)?;
        if self.queue_reply(channel, text, reply_parent_msg_id) {
            Ok(())
        } else {
            Err(Error::QueueFull)
        }
    }

    fn check_text(&self, text: &str) -> Result<()> {
        let len = text.graphemes(true).count();
        if len > MAX_MESSAGE_LEN {
            return Err(Error::MessageTooLong(len));
        }
        if !self.queue.is_connected() {
            return Err(Error::NotConnected);
        }
        Ok(())
    }

    /// Requests a channel join. The join is paced (Twitch rate-limits
    /// them) and confirmed asynchronously via [`Event::Joined`] or
    /// [`Event::JoinFailed`].
    pub fn join(&self, channel: &str) -> Result<()> {
        self.send_control(Control::Join(util::normalize_channel(channel)))
    }

    pub fn part(&self, channel: &str) -> Result<()> {
        self.send_control(Control::Part(util::normalize_channel(channel)))
    }

    pub fn add_command_prefix(&self, prefix: char) -> Result<()> {
        self.send_control(Control::AddPrefix(prefix))
    }

    pub fn remove_command_prefix(&self, prefix: char) -> Result<()> {
        self.send_control(Control::RemovePrefix(prefix))
    }

    /// Tears the connection down and brings it back up, re-joining all
    /// channels. The same procedure runs automatically on connection
    /// loss and on a server-requested RECONNECT.
    pub fn reconnect(&self) -> Result<()> {
        self.send_control(Control::Reconnect)
    }

    /// Stops the client. Anything still queued is abandoned.
    pub fn close(&self) {
        let _ = self.control.send(Control::Close);
    }

    /// The channels the bot is currently in.
    pub fn channels(&self) -> Vec<String> {
        self.channels.lock().iter().cloned().collect()
    }

    pub fn is_connected(&self) -> bool {
        self.queue.is_connected()
    }

    fn send_control(&self, control: Control) -> Result<()> {
        self.control.send(control).map_err(|_| Error::Closed)
    }
}

/// A connected chat client. Consume events with [`Client::recv`]; send
/// through the handle from [`Client::sender`].
pub struct Client {
    events: mpsc::UnboundedReceiver<Event>,
    sender: Sender,
    task: tokio::task::JoinHandle<()>,
}

impl Client {
    /// The next event. `None` once the client has shut down.
    pub async fn recv(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    pub fn sender(&self) -> Sender {
        self.sender.clone()
    }

    pub fn close(&self) {
        self.sender.close();
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Connect to Twitch over the default TLS transport.
pub async fn connect(config: Config) -> Result<Client> {
    connect_with(Box::new(conn::Tls::new()), config).await
}

/// Connect over a caller-supplied transport.
pub async fn connect_with(mut transport: Box<dyn Transport>, config: Config) -> Result<Client> {
    if !transport.open().await {
        return Err(Error::Conn(conn::Error::ConnectionFailed));
    }
    let nick = conn::handshake(transport.as_mut(), &config.credentials, config.membership_data).await?;
    log::info!("Logged in as {}", nick);

    let queue = Arc::new(SendQueue::new(config.throttle.queue_capacity));
    queue.set_connected(true);
    let joined = Arc::new(Mutex::new(HashSet::new()));
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (control_tx, control_rx) = mpsc::unbounded_channel();

    let sender = Sender {
        queue: queue.clone(),
        control: control_tx,
        channels: joined.clone(),
    };
    let _ = events_tx.send(Event::Connected);

    let state = DispatchState {
        login: nick,
        auto_pong: config.auto_pong,
        prefixes: config.command_prefixes.iter().copied().collect(),
        joined,
        pending_joins: HashMap::new(),
        seen_userstate: HashSet::new(),
    };
    let join_backlog: VecDeque<String> = config.channels.iter().map(|c| util::normalize_channel(c)).collect();
    let actor = Actor {
        throttle: Throttle::new(config.throttle.clone(), queue.clone()),
        join_limiter: RateLimiter::direct(Quota::per_second(
            NonZeroU32::new(JOINS_PER_SECOND).expect("join rate is non-zero"),
        )),
        transport,
        config,
        state,
        queue,
        events: events_tx,
        control: control_rx,
        join_backlog,
    };
    let task = tokio::spawn(actor.run());

    Ok(Client {
        events: events_rx,
        sender,
        task,
    })
}

enum Action {
    SendRaw(String),
    Reconnect,
}

struct Dispatch {
    events: Vec<Event>,
    actions: Vec<Action>,
}

/// Received-side bookkeeping. Mutated only by the actor task; the
/// joined set is additionally readable through `Sender::channels`.
struct DispatchState {
    login: String,
    auto_pong: bool,
    prefixes: HashSet<char>,
    joined: Arc<Mutex<HashSet<String>>>,
    /// Channels we've sent a JOIN for, with their confirmation deadline.
    pending_joins: HashMap<String, Instant>,
    /// Channels whose initial USERSTATE we've already seen; any further
    /// USERSTATE there confirms one of our own sends.
    seen_userstate: HashSet<String>,
}

impl DispatchState {
    fn handle(&mut self, raw: &str, msg: tmi::Message) -> Dispatch {
        let mut events = Vec::new();
        let mut actions = Vec::new();

        match msg {
            tmi::Message::Ping(ping) => {
                if self.auto_pong {
                    // keepalive; not subject to message throttling
                    actions.push(Action::SendRaw(write::pong(ping.arg())));
                } else {
                    events.push(Event::Ping {
                        arg: ping.arg().map(str::to_owned),
                    });
                }
            }
            tmi::Message::Pong => {}
            tmi::Message::Privmsg(message) => {
                let intro = message.is_user_intro.then(|| message.clone());
                let command = self.chat_command(&message);
                events.push(Event::Message(message));
                if let Some(message) = intro {
                    events.push(Event::UserIntro(message));
                }
                if let Some(event) = command {
                    events.push(event);
                }
            }
            tmi::Message::Whisper(whisper) => events.push(Event::Whisper(whisper)),
            tmi::Message::Notice(notice) => match notice.kind {
                NoticeKind::Unknown(_) => events.push(Event::Unaccounted { raw: raw.to_owned() }),
                _ => events.push(Event::Notice(notice)),
            },
            tmi::Message::UserNotice(notice) => match notice.detail {
                UserNoticeDetail::Unknown(_) => events.push(Event::Unaccounted { raw: raw.to_owned() }),
                _ => events.push(Event::UserNotice(notice)),
            },
            tmi::Message::RoomState(state) => {
                // the full tag set only comes right after a join; partial
                // sets are incremental changes
                if state.tag_count > 2 && self.pending_joins.remove(&state.channel).is_some() {
                    self.joined.lock().insert(state.channel.clone());
                    events.push(Event::Joined {
                        channel: state.channel.clone(),
                    });
                }
                events.push(Event::RoomStateChanged(state));
            }
            tmi::Message::UserState(state) => {
                if self.seen_userstate.insert(state.channel.to_ascii_lowercase()) {
                    events.push(Event::UserStateChanged(state));
                } else {
                    events.push(Event::MessageSent {
                        channel: state.channel.clone(),
                        state,
                    });
                }
            }
            tmi::Message::GlobalUserState(state) => events.push(Event::GlobalUserState(state)),
            tmi::Message::Clearchat(clear) => match (clear.target, clear.ban_duration) {
                (None, _) => events.push(Event::ChatCleared { channel: clear.channel }),
                (Some(user), Some(duration)) => events.push(Event::UserTimedOut {
                    channel: clear.channel,
                    user,
                    seconds: duration.num_seconds(),
                }),
                (Some(user), None) => events.push(Event::UserBanned {
                    channel: clear.channel,
                    user,
                }),
            },
            tmi::Message::Clearmsg(clear) => events.push(Event::MessageDeleted(clear)),
            tmi::Message::Join(membership) => {
                if membership.user.eq_ignore_ascii_case(&self.login) {
                    // confirmation event waits for the channel's ROOMSTATE
                    self.joined.lock().insert(membership.channel.to_ascii_lowercase());
                    log::debug!("Joined #{}", membership.channel);
                } else {
                    events.push(Event::UserJoined {
                        channel: membership.channel,
                        user: membership.user,
                    });
                }
            }
            tmi::Message::Part(membership) => {
                if membership.user.eq_ignore_ascii_case(&self.login) {
                    let channel = membership.channel.to_ascii_lowercase();
                    self.joined.lock().remove(&channel);
                    self.pending_joins.remove(&channel);
                    self.seen_userstate.remove(&channel);
                    events.push(Event::Left { channel });
                } else {
                    events.push(Event::UserLeft {
                        channel: membership.channel,
                        user: membership.user,
                    });
                }
            }
            tmi::Message::Mode(change) => {
                if change.op_added {
                    events.push(Event::ModeratorJoined {
                        channel: change.channel,
                        user: change.user,
                    });
                } else {
                    events.push(Event::ModeratorLeft {
                        channel: change.channel,
                        user: change.user,
                    });
                }
            }
            tmi::Message::Capability(_) => {}
            tmi::Message::Welcome => events.push(Event::Connected),
            tmi::Message::Reconnect => actions.push(Action::Reconnect),
            tmi::Message::Unknown(unknown) => events.push(Event::Unaccounted { raw: unknown.raw }),
        }

        Dispatch { events, actions }
    }

    fn chat_command(&self, message: &Privmsg) -> Option<Event> {
        let mut chars = message.text.chars();
        if !self.prefixes.contains(&chars.next()?) {
            return None;
        }
        let rest = chars.as_str();
        let (name, args) = match rest.split_once(' ') {
            Some((name, args)) => (name, args.trim()),
            None => (rest, ""),
        };
        if name.is_empty() {
            return None;
        }

        Some(Event::ChatCommand {
            message: message.clone(),
            name: name.to_owned(),
            args: args.to_owned(),
        })
    }

    fn expire_pending_joins(&mut self, now: Instant) -> Vec<Event> {
        let expired: Vec<String> = self
            .pending_joins
            .iter()
            .filter(|(_, deadline)| now >= **deadline)
            .map(|(channel, _)| channel.clone())
            .collect();

        expired
            .into_iter()
            .map(|channel| {
                self.pending_joins.remove(&channel);
                log::warn!("Join of #{} was not confirmed in time", channel);
                Event::JoinFailed { channel }
            })
            .collect()
    }

    /// Clears per-connection state and hands back the channels that
    /// should be re-joined on the fresh connection.
    fn reset_for_reconnect(&mut self) -> Vec<String> {
        let mut rejoin: Vec<String> = self.joined.lock().drain().collect();
        rejoin.extend(self.pending_joins.drain().map(|(channel, _)| channel));
        self.seen_userstate.clear();
        rejoin
    }
}

struct Actor {
    transport: Box<dyn Transport>,
    config: Config,
    state: DispatchState,
    throttle: Throttle,
    queue: Arc<SendQueue>,
    events: mpsc::UnboundedSender<Event>,
    control: mpsc::UnboundedReceiver<Control>,
    join_limiter: JoinLimiter,
    join_backlog: VecDeque<String>,
}

impl Actor {
    async fn run(mut self) {
        let mut poll = tokio::time::interval(self.throttle.send_delay());
        'main: loop {
            tokio::select! {
                received = self.transport.next_line() => match received {
                    Some(received) => {
                        // transports may hand over several lines at once
                        for line in received.split("\r\n").filter(|l| !l.trim().is_empty()) {
                            if !self.handle_line(line).await {
                                break 'main;
                            }
                        }
                    }
                    None => {
                        log::info!("Disconnected from Twitch");
                        if !self.reconnect().await {
                            break 'main;
                        }
                    }
                },
                _ = poll.tick() => self.tick().await,
                control = self.control.recv() => match control {
                    Some(Control::Close) | None => break 'main,
                    Some(control) => {
                        if !self.handle_control(control).await {
                            break 'main;
                        }
                    }
                },
            }
        }

        self.queue.set_connected(false);
        self.transport.close().await;
        log::info!("Client stopped");
    }

    async fn handle_line(&mut self, line: &str) -> bool {
        log::trace!("> {}", line);
        let Dispatch { events, actions } = self.state.handle(line, tmi::Message::parse(line));
        for event in events {
            let _ = self.events.send(event);
        }
        for action in actions {
            match action {
                Action::SendRaw(raw) => {
                    if !self.transport.send(&raw).await {
                        log::warn!("Failed to write '{}'", raw.trim_end());
                    }
                }
                Action::Reconnect => {
                    log::info!("Twitch requested a reconnect");
                    if !self.reconnect().await {
                        return false;
                    }
                }
            }
        }
        true
    }

    async fn tick(&mut self) {
        // outbound chat, at most one message per tick
        if let Some(item) = self.throttle.poll() {
            let line = item.to_line();
            if self.transport.send(&line).await {
                log::trace!("< {}", line.trim_end());
            } else {
                let _ = self.events.send(Event::SendFailed {
                    reason: "Transport refused the write".into(),
                    channel: item.channel,
                    text: item.text,
                    window: self.throttle.snapshot(),
                });
            }
        }

        for event in self.state.expire_pending_joins(Instant::now()) {
            let _ = self.events.send(event);
        }

        // paced JOINs
        while let Some(channel) = self.join_backlog.front() {
            if self.join_limiter.check().is_err() {
                break;
            }
            let channel = channel.clone();
            self.join_backlog.pop_front();
            if self.transport.send(&write::join(&channel)).await {
                self.state
                    .pending_joins
                    .insert(channel, Instant::now() + JOIN_CONFIRM_TIMEOUT);
            } else {
                log::warn!("Failed to write JOIN #{}", channel);
            }
        }
    }

    async fn handle_control(&mut self, control: Control) -> bool {
        match control {
            Control::Join(channel) => {
                let already = self.state.joined.lock().contains(&channel)
                    || self.state.pending_joins.contains_key(&channel)
                    || self.join_backlog.contains(&channel);
                if !already {
                    self.join_backlog.push_back(channel);
                }
            }
            Control::Part(channel) => {
                self.join_backlog.retain(|c| c != &channel);
                self.state.pending_joins.remove(&channel);
                if !self.transport.send(&write::part(&channel)).await {
                    log::warn!("Failed to write PART #{}", channel);
                }
            }
            Control::AddPrefix(prefix) => {
                self.state.prefixes.insert(prefix);
            }
            Control::RemovePrefix(prefix) => {
                self.state.prefixes.remove(&prefix);
            }
            Control::Reconnect => return self.reconnect().await,
            Control::Close => {}
        }
        true
    }

    /// Re-establishes the connection with bounded, linearly backed-off
    /// attempts, then re-joins everything. Returns `false` when the
    /// client should give up.
    async fn reconnect(&mut self) -> bool {
        self.queue.set_connected(false);
        self.transport.close().await;

        if !self.config.reconnect {
            let _ = self.events.send(Event::FatalError {
                reason: "Disconnected (reconnect is disabled)".into(),
            });
            return false;
        }

        let mut rejoin = self.state.reset_for_reconnect();
        let mut attempts = 0;
        while attempts < self.config.max_reconnect_attempts {
            match self.try_connect().await {
                Ok(nick) => {
                    self.state.login = nick;
                    self.queue.set_connected(true);
                    for channel in rejoin.drain(..) {
                        if !self.join_backlog.contains(&channel) {
                            self.join_backlog.push_back(channel);
                        }
                    }
                    let _ = self.events.send(Event::Reconnected);
                    return true;
                }
                Err(err) => {
                    log::error!("Failed to reconnect after attempt #{} ({}), retrying...", attempts, err)
                }
            }
            tokio::time::sleep(Duration::from_secs(attempts as u64 * 3)).await;
            attempts += 1;
        }

        let _ = self.events.send(Event::FatalError {
            reason: format!("Failed to reconnect after {} attempts", attempts),
        });
        false
    }

    async fn try_connect(&mut self) -> conn::Result<String> {
        if !self.transport.open().await {
            return Err(conn::Error::ConnectionFailed);
        }
        conn::handshake(self.transport.as_mut(), &self.config.credentials, self.config.membership_data).await
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn state() -> DispatchState {
        DispatchState {
            login: "botname".into(),
            auto_pong: true,
            prefixes: vec!['!'].into_iter().collect(),
            joined: Arc::new(Mutex::new(HashSet::new())),
            pending_joins: HashMap::new(),
            seen_userstate: HashSet::new(),
        }
    }

    fn feed(state: &mut DispatchState, line: &str) -> Dispatch {
        state.handle(line, tmi::Message::parse(line))
    }

    #[test]
    fn ping_is_answered_directly_when_auto_pong_is_on() {
        let mut state = state();
        let dispatch = feed(&mut state, ":tmi.twitch.tv PING");
        assert!(dispatch.events.is_empty());
        match &dispatch.actions[..] {
            [Action::SendRaw(raw)] => assert_eq!("PONG :tmi.twitch.tv\r\n", raw.as_str()),
            _ => panic!("expected a single PONG"),
        }
    }

    #[test]
    fn ping_becomes_an_event_when_auto_pong_is_off() {
        let mut state = state();
        state.auto_pong = false;
        let dispatch = feed(&mut state, "PING :tmi.twitch.tv");
        assert!(dispatch.actions.is_empty());
        assert_eq!(
            vec![Event::Ping {
                arg: Some("tmi.twitch.tv".into())
            }],
            dispatch.events
        );
    }

    #[test]
    fn privmsg_becomes_a_message_event() {
        let mut state = state();
        let dispatch = feed(
            &mut state,
            "@display-name=Foo;subscriber=1 :foo!foo@foo.tmi.twitch.tv PRIVMSG #bar :Hello",
        );
        match &dispatch.events[..] {
            [Event::Message(msg)] => {
                assert_eq!("bar", msg.channel);
                assert_eq!("Hello", msg.text);
                assert!(msg.user.is_subscriber);
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[test]
    fn user_intro_is_raised_alongside_the_message() {
        let mut state = state();
        let dispatch = feed(
            &mut state,
            "@msg-id=user-intro :foo!foo@foo.tmi.twitch.tv PRIVMSG #bar :hi im new",
        );
        assert!(matches!(dispatch.events[0], Event::Message(_)));
        assert!(matches!(dispatch.events[1], Event::UserIntro(_)));
    }

    #[test]
    fn command_prefix_raises_chat_command() {
        let mut state = state();
        let dispatch = feed(&mut state, ":foo!foo@foo.tmi.twitch.tv PRIVMSG #bar :!songrequest some song");
        match &dispatch.events[..] {
            [Event::Message(_), Event::ChatCommand { name, args, .. }] => {
                assert_eq!("songrequest", name.as_str());
                assert_eq!("some song", args.as_str());
            }
            other => panic!("unexpected events: {:?}", other),
        }

        // a bare prefix is not a command
        let dispatch = feed(&mut state, ":foo!foo@foo.tmi.twitch.tv PRIVMSG #bar :!");
        assert_eq!(1, dispatch.events.len());

        state.prefixes.remove(&'!');
        let dispatch = feed(&mut state, ":foo!foo@foo.tmi.twitch.tv PRIVMSG #bar :!song");
        assert_eq!(1, dispatch.events.len());
    }

    #[test]
    fn full_roomstate_confirms_a_pending_join() {
        let mut state = state();
        state
            .pending_joins
            .insert("pajlada".into(), Instant::now() + JOIN_CONFIRM_TIMEOUT);

        let dispatch = feed(
            &mut state,
            "@emote-only=0;followers-only=-1;r9k=0;room-id=1;slow=0;subs-only=0 :tmi.twitch.tv ROOMSTATE #pajlada",
        );

        assert!(matches!(
            dispatch.events[0],
            Event::Joined { ref channel } if channel == "pajlada"
        ));
        assert!(matches!(dispatch.events[1], Event::RoomStateChanged(_)));
        assert!(state.pending_joins.is_empty());
        assert!(state.joined.lock().contains("pajlada"));
    }

    #[test]
    fn partial_roomstate_does_not_confirm_a_join() {
        let mut state = state();
        state
            .pending_joins
            .insert("pajlada".into(), Instant::now() + JOIN_CONFIRM_TIMEOUT);

        let dispatch = feed(&mut state, "@room-id=1;slow=10 :tmi.twitch.tv ROOMSTATE #pajlada");

        assert!(matches!(dispatch.events[..], [Event::RoomStateChanged(_)]));
        assert!(state.pending_joins.contains_key("pajlada"));
    }

    #[test]
    fn first_userstate_is_state_further_ones_are_send_confirmations() {
        let mut state = state();
        let line = "@badges=;color=;display-name=Botname;mod=0;subscriber=0 :tmi.twitch.tv USERSTATE #pajlada";

        assert!(matches!(feed(&mut state, line).events[..], [Event::UserStateChanged(_)]));
        assert!(matches!(
            feed(&mut state, line).events[..],
            [Event::MessageSent { .. }]
        ));
        assert!(matches!(
            feed(&mut state, line).events[..],
            [Event::MessageSent { .. }]
        ));
    }

    #[test]
    fn clearchat_branches() {
        let mut state = state();

        let cleared = feed(&mut state, "@room-id=1 :tmi.twitch.tv CLEARCHAT #pajlada");
        assert_eq!(
            vec![Event::ChatCleared {
                channel: "pajlada".into()
            }],
            cleared.events
        );

        let timeout = feed(
            &mut state,
            "@ban-duration=600;room-id=1 :tmi.twitch.tv CLEARCHAT #pajlada :baduser",
        );
        assert_eq!(
            vec![Event::UserTimedOut {
                channel: "pajlada".into(),
                user: "baduser".into(),
                seconds: 600
            }],
            timeout.events
        );

        let ban = feed(&mut state, "@room-id=1 :tmi.twitch.tv CLEARCHAT #pajlada :baduser");
        assert_eq!(
            vec![Event::UserBanned {
                channel: "pajlada".into(),
                user: "baduser".into()
            }],
            ban.events
        );
    }

    #[test]
    fn own_join_and_part_update_bookkeeping() {
        let mut state = state();

        let join = feed(&mut state, ":botname!botname@botname.tmi.twitch.tv JOIN #pajlada");
        assert!(join.events.is_empty());
        assert!(state.joined.lock().contains("pajlada"));

        let part = feed(&mut state, ":botname!botname@botname.tmi.twitch.tv PART #pajlada");
        assert_eq!(
            vec![Event::Left {
                channel: "pajlada".into()
            }],
            part.events
        );
        assert!(state.joined.lock().is_empty());
    }

    #[test]
    fn foreign_join_and_part_are_membership_events() {
        let mut state = state();

        let join = feed(&mut state, ":foo!foo@foo.tmi.twitch.tv JOIN #pajlada");
        assert_eq!(
            vec![Event::UserJoined {
                channel: "pajlada".into(),
                user: "foo".into()
            }],
            join.events
        );

        let part = feed(&mut state, ":foo!foo@foo.tmi.twitch.tv PART #pajlada");
        assert_eq!(
            vec![Event::UserLeft {
                channel: "pajlada".into(),
                user: "foo".into()
            }],
            part.events
        );
    }

    #[test]
    fn mode_changes_are_moderator_events() {
        let mut state = state();
        assert_eq!(
            vec![Event::ModeratorJoined {
                channel: "pajlada".into(),
                user: "foo".into()
            }],
            feed(&mut state, ":jtv MODE #pajlada +o foo").events
        );
        assert_eq!(
            vec![Event::ModeratorLeft {
                channel: "pajlada".into(),
                user: "foo".into()
            }],
            feed(&mut state, ":jtv MODE #pajlada -o foo").events
        );
    }

    #[test]
    fn unknown_notices_and_commands_are_unaccounted() {
        let mut state = state();

        let notice = feed(&mut state, "@msg-id=whats_this :tmi.twitch.tv NOTICE #pajlada :New thing");
        assert!(matches!(notice.events[..], [Event::Unaccounted { .. }]));

        let unknown = feed(&mut state, ":tmi.twitch.tv WAT #pajlada");
        assert!(matches!(unknown.events[..], [Event::Unaccounted { .. }]));

        let known = feed(&mut state, "@msg-id=slow_on :tmi.twitch.tv NOTICE #pajlada :Slow mode.");
        assert!(matches!(known.events[..], [Event::Notice(_)]));
    }

    #[test]
    fn reconnect_request_becomes_an_action() {
        let mut state = state();
        let dispatch = feed(&mut state, ":tmi.twitch.tv RECONNECT");
        assert!(matches!(dispatch.actions[..], [Action::Reconnect]));
    }

    #[test]
    fn pending_joins_expire() {
        let mut state = state();
        let now = Instant::now();
        state.pending_joins.insert("slow".into(), now);
        state.pending_joins.insert("fast".into(), now + Duration::from_secs(60));

        let events = state.expire_pending_joins(now + Duration::from_secs(1));

        assert_eq!(vec![Event::JoinFailed { channel: "slow".into() }], events);
        assert!(state.pending_joins.contains_key("fast"));
    }

    #[test]
    fn reset_for_reconnect_returns_channels_to_rejoin() {
        let mut state = state();
        state.joined.lock().insert("a".into());
        state.pending_joins.insert("b".into(), Instant::now());
        state.seen_userstate.insert("a".into());

        let mut rejoin = state.reset_for_reconnect();
        rejoin.sort();

        assert_eq!(vec!["a".to_owned(), "b".to_owned()], rejoin);
        assert!(state.joined.lock().is_empty());
        assert!(state.seen_userstate.is_empty());
    }
}

#[cfg(test)]
mod end_to_end {
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::*;

    struct FakeTransport {
        incoming: mpsc::UnboundedReceiver<String>,
        outgoing: mpsc::UnboundedSender<String>,
        connected: bool,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn open(&mut self) -> bool {
            self.connected = true;
            true
        }

        async fn send(&mut self, line: &str) -> bool {
            self.connected && self.outgoing.send(line.to_owned()).is_ok()
        }

        async fn close(&mut self) {
            self.connected = false;
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        async fn next_line(&mut self) -> Option<String> {
            self.incoming.recv().await
        }
    }

    async fn recv(client: &mut Client) -> Event {
        tokio::time::timeout(Duration::from_secs(5), client.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("client stopped")
    }

    async fn sent(lines: &mut mpsc::UnboundedReceiver<String>) -> String {
        tokio::time::timeout(Duration::from_secs(5), lines.recv())
            .await
            .expect("timed out waiting for a write")
            .expect("transport gone")
    }

    #[tokio::test]
    async fn join_say_and_receive() {
        let (in_tx, incoming) = mpsc::unbounded_channel();
        let (outgoing, mut out_rx) = mpsc::unbounded_channel();
        let send = |line: &str| in_tx.send(line.to_owned()).expect("line");
        send(":tmi.twitch.tv CAP * ACK :twitch.tv/commands twitch.tv/tags");
        send(":tmi.twitch.tv 001 justinfan1 :Welcome, GLHF!");

        let mut client = connect_with(
            Box::new(FakeTransport {
                incoming,
                outgoing,
                connected: false,
            }),
            Config {
                channels: vec!["pajlada".into()],
                ..Config::default()
            },
        )
        .await
        .expect("connect");

        assert_eq!(Event::Connected, recv(&mut client).await);

        // the handshake writes, then the initial join on the first tick
        assert!(sent(&mut out_rx).await.starts_with("CAP REQ"));
        assert!(sent(&mut out_rx).await.starts_with("NICK justinfan"));
        assert!(sent(&mut out_rx).await.starts_with("USER justinfan"));
        assert_eq!("JOIN #pajlada\r\n", sent(&mut out_rx).await);

        // server confirms the join with the full room state
        send("@emote-only=0;followers-only=-1;r9k=0;room-id=1;slow=0;subs-only=0 :tmi.twitch.tv ROOMSTATE #pajlada");
        assert_eq!(
            Event::Joined {
                channel: "pajlada".into()
            },
            recv(&mut client).await
        );
        assert!(matches!(recv(&mut client).await, Event::RoomStateChanged(_)));
        assert_eq!(vec!["pajlada".to_owned()], client.sender().channels());

        // a chat line comes through typed
        send("@display-name=Foo :foo!foo@foo.tmi.twitch.tv PRIVMSG #pajlada :dank cam");
        match recv(&mut client).await {
            Event::Message(msg) => {
                assert_eq!("pajlada", msg.channel);
                assert_eq!("dank cam", msg.text);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        // sends drain through the throttle to the wire
        let sender = client.sender();
        sender.say("pajlada", "hi chat").expect("say");
        assert_eq!("PRIVMSG #pajlada :hi chat\r\n", sent(&mut out_rx).await);

        // PING is answered directly, bypassing the send queue
        send("PING :tmi.twitch.tv");
        assert_eq!("PONG :tmi.twitch.tv\r\n", sent(&mut out_rx).await);

        sender.close();
    }

    #[tokio::test]
    async fn send_rejections_do_not_panic() {
        let queue = Arc::new(SendQueue::new(1));
        let (control, _control_rx) = mpsc::unbounded_channel();
        let sender = Sender {
            queue: queue.clone(),
            control,
            channels: Arc::new(Mutex::new(HashSet::new())),
        };

        // not connected
        assert!(!sender.queue_privmsg("pajlada", "hi"));
        assert!(matches!(sender.say("pajlada", "hi"), Err(Error::NotConnected)));

        // over capacity
        queue.set_connected(true);
        assert!(sender.queue_privmsg("pajlada", "hi"));
        assert!(!sender.queue_privmsg("pajlada", "hi again"));
        assert!(matches!(sender.say("pajlada", "hi again"), Err(Error::QueueFull)));

        // too long
        let long = "x".repeat(501);
        assert!(matches!(sender.say("pajlada", &long), Err(Error::MessageTooLong(501))));
    }
}

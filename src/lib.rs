//! Twitch chat (TMI) client library
//!
//! * [`irc`](./irc) - parsing raw IRC messages, with Twitch-specific extensions
//!   (not RFC2812 compliant)
//! * [`tmi`](./tmi) - typed Twitch commands (PRIVMSG, ROOMSTATE,
//!   USERNOTICE, etc.) and the outbound line builders
//! * [`conn`](./conn) - the TLS line transport and the login handshake
//! * [`throttle`](./throttle) - the rate-limited outbound send queue
//! * [`client`](./client) - the connected client: event dispatch and the
//!   public send/join API

pub mod client;
pub mod conn;
pub mod irc;
pub mod throttle;
pub mod tmi;
pub(crate) mod util;

pub use client::{connect, connect_with, Client, Config, Event, Sender};
pub use conn::{Login, Transport};
pub use tmi::Message;

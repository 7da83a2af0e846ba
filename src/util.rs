/// Channel names are used as keys all over the place; Twitch treats
/// them case-insensitively and without the `#`, so we store them
/// lowercased and bare.
pub(crate) fn normalize_channel(channel: &str) -> String {
    channel.strip_prefix('#').unwrap_or(channel).to_ascii_lowercase()
}

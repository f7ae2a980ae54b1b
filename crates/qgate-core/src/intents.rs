//! Gateway intent flags.
//!
//! Each flag subscribes the connection to one category of dispatch events.

use bitflags::bitflags;

bitflags! {
    /// Event categories a gateway connection subscribes to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Intents: u32 {
        /// Guild and channel lifecycle events.
        const GUILDS                  = 1 << 0;
        /// Guild member add/update/remove.
        const GUILD_MEMBERS           = 1 << 1;
        /// Every message in the guild (private bots only).
        const GUILD_MESSAGES          = 1 << 9;
        /// Reactions on messages.
        const GUILD_MESSAGE_REACTIONS = 1 << 10;
        /// Direct messages.
        const DIRECT_MESSAGE          = 1 << 12;
        /// Button and interaction callbacks.
        const INTERACTION             = 1 << 26;
        /// Message audit results.
        const MESSAGE_AUDIT           = 1 << 27;
        /// Forum threads, posts and replies.
        const FORUMS_EVENT            = 1 << 28;
        /// Audio channel events.
        const AUDIO_ACTION            = 1 << 29;
        /// Messages mentioning the bot.
        const PUBLIC_GUILD_MESSAGES   = 1 << 30;
    }
}

impl Intents {
    /// Parses a list of flag names (case-insensitive) into an intent set.
    ///
    /// Returns the first unknown name as the error.
    pub fn from_names<I, S>(names: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names.into_iter().try_fold(Self::empty(), |acc, name| {
            let name = name.as_ref();
            Self::from_name(&name.to_ascii_uppercase())
                .map(|flag| acc | flag)
                .ok_or_else(|| name.to_string())
        })
    }
}

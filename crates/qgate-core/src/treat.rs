//! Message treatment: turning raw message content into a [`TreatedMessage`].
//!
//! The dispatcher only decides *when* treatment runs; *how* text is
//! tokenized is behind the [`MessageTreater`] trait so bots can plug in
//! their own command syntax.

use crate::event::TreatedMessage;

/// Converts cleaned message text into its structured form.
pub trait MessageTreater: Send + Sync {
    /// Treats already trimmed, mention-stripped text.
    fn treat(&self, text: &str) -> TreatedMessage;
}

impl<T: MessageTreater + ?Sized> MessageTreater for std::sync::Arc<T> {
    fn treat(&self, text: &str) -> TreatedMessage {
        (**self).treat(text)
    }
}

/// Default treater: unescapes the platform's HTML entities and splits on
/// whitespace. The first token becomes the command, the rest are arguments.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTreater;

impl MessageTreater for WhitespaceTreater {
    fn treat(&self, text: &str) -> TreatedMessage {
        let text = unescape(text.trim());
        let mut tokens = text.split_whitespace().map(str::to_string);
        let command = tokens.next();
        let args = tokens.collect();
        TreatedMessage {
            text,
            command,
            args,
        }
    }
}

/// Removes one occurrence of `mention` if `content` starts with it.
///
/// Mentions elsewhere in the text are left alone. The result is trimmed.
pub fn strip_leading_mention<'a>(content: &'a str, mention: &str) -> &'a str {
    let content = content.trim();
    if mention.is_empty() {
        return content;
    }
    content.strip_prefix(mention).unwrap_or(content).trim()
}

fn unescape(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const MENTION: &str = "<@!42>";

    #[test]
    fn strips_leading_mention_only() {
        assert_eq!(strip_leading_mention("  <@!42> /ping now ", MENTION), "/ping now");
        assert_eq!(strip_leading_mention("/ping <@!42>", MENTION), "/ping <@!42>");
        assert_eq!(strip_leading_mention("/ping", MENTION), "/ping");
        assert_eq!(strip_leading_mention("<@!42><@!42> hi", MENTION), "<@!42> hi");
    }

    #[test]
    fn whitespace_tokens() {
        let treated = WhitespaceTreater.treat("  echo hello   world ");
        assert_eq!(treated.text, "echo hello   world");
        assert_eq!(treated.command.as_deref(), Some("echo"));
        assert_eq!(treated.args, vec!["hello", "world"]);
    }

    #[test]
    fn empty_text_has_no_command() {
        let treated = WhitespaceTreater.treat("");
        assert!(treated.command.is_none());
        assert!(treated.args.is_empty());
    }

    #[test]
    fn entities_are_unescaped() {
        let treated = WhitespaceTreater.treat("say &lt;b&gt; &amp;lt;");
        assert_eq!(treated.text, "say <b> &lt;");
    }
}

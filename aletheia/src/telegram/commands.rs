//! Bot commands: `/start`, `/help`, `/check <text>`.

pub const WELCOME: &str = "👋 Welcome to Aletheia - Your Fake News Detection Bot!

I analyze messages to help you identify potential misinformation.

How I work:
1. Send me any message or forward news content
2. I'll first check if it's news-related
3. If it is news, I'll analyze it for potential misinformation

Commands:
/start - Show this welcome message
/help - Get help on using the bot
/check <text> - Manually check specific text

Stay informed, stay vigilant! 🔍";

pub const HELP: &str = "🔍 Aletheia Bot Help

Automatic Detection:
Simply send or forward any message or photo, and I'll automatically:
- Detect if it's news content
- Analyze it for misinformation if it is

Manual Check:
Use /check <your text> to force-check any text

Tips:
- Forward suspicious WhatsApp/social media messages
- Share news article text for verification
- I work best with complete news content

Note: I use AI analysis and may not always be 100% accurate. Always verify important news from multiple credible sources.";

pub const CHECK_USAGE: &str = "Please provide text to check. Usage: /check <text>";

/// Commands registered with Telegram for autocomplete
pub const REGISTERED: [(&str, &str); 3] = [
    ("start", "Show the welcome message"),
    ("help", "Get help on using the bot"),
    ("check", "Check a specific text for misinformation"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    /// `/check` with its (possibly empty) argument text
    Check(Option<String>),
    /// Any other slash command; ignored
    Unknown(String),
}

/// Parse a slash command. Returns `None` for ordinary text.
///
/// `bot_username` strips the `@BotName` suffix Telegram adds in groups; a
/// command addressed to a different bot is reported as unknown.
pub fn parse(text: &str, bot_username: Option<&str>) -> Option<Command> {
    let rest = text.trim_start().strip_prefix('/')?;
    let (head, args) = match rest.find(char::is_whitespace) {
        Some(idx) => (&rest[..idx], rest[idx..].trim()),
        None => (rest, ""),
    };

    let name = match head.split_once('@') {
        Some((name, target)) => {
            let ours = bot_username.is_some_and(|u| u.eq_ignore_ascii_case(target));
            if !ours {
                return Some(Command::Unknown(head.to_string()));
            }
            name
        }
        None => head,
    };

    let command = match name.to_ascii_lowercase().as_str() {
        "start" => Command::Start,
        "help" => Command::Help,
        "check" => Command::Check((!args.is_empty()).then(|| args.to_string())),
        _ => Command::Unknown(name.to_string()),
    };
    Some(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_not_a_command() {
        assert_eq!(parse("hello there, is this true?", None), None);
        assert_eq!(parse("", None), None);
    }

    #[test]
    fn parses_known_commands() {
        assert_eq!(parse("/start", None), Some(Command::Start));
        assert_eq!(parse("/HELP", None), Some(Command::Help));
        assert_eq!(
            parse("/check  The vaccine contains microchips  ", None),
            Some(Command::Check(Some("The vaccine contains microchips".into())))
        );
        assert_eq!(parse("/check", None), Some(Command::Check(None)));
        assert_eq!(parse("/check   ", None), Some(Command::Check(None)));
    }

    #[test]
    fn handles_bot_mentions() {
        assert_eq!(parse("/check@AletheiaBot short", Some("aletheiabot")), Some(Command::Check(Some("short".into()))));
        assert_eq!(
            parse("/check@OtherBot something", Some("AletheiaBot")),
            Some(Command::Unknown("check@OtherBot".into()))
        );
    }

    #[test]
    fn unknown_commands_are_reported() {
        assert_eq!(parse("/settings now", None), Some(Command::Unknown("settings".into())));
    }
}

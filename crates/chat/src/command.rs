/// Parsed slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlashCommand {
    /// Lower-cased command name, without the leading `/`.
    pub name: String,
    /// Remaining text, trimmed; empty when the command had no arguments.
    pub args: String,
}

/// Parse a slash command from message text.
///
/// Returns `None` if the text is not a slash command; a bare `/` is not a
/// command either.
pub fn parse_slash_command(text: &str) -> Option<SlashCommand> {
    let body = text.trim().strip_prefix('/')?.trim_start();
    if body.is_empty() {
        return None;
    }

    let (name, args) = match body.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (body, ""),
    };

    Some(SlashCommand {
        name: name.to_lowercase(),
        args: args.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Clear,
    Unknown(String),
}

pub const HELP_TEXT: &str = "\
**Commands**

- `/clear` starts a new conversation
- `/help` shows this message

Anything else is sent as a prompt.";

pub fn parse_slash_command(input: &str) -> Option<SlashCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let command = trimmed.split_whitespace().next().unwrap_or(trimmed);

    let parsed = match command {
        "/help" => SlashCommand::Help,
        "/clear" => SlashCommand::Clear,
        _ => SlashCommand::Unknown(command.to_string()),
    };

    Some(parsed)
}

pub fn unknown_command_message(command: &str) -> String {
    format!("Unknown command `{command}`. Type `/help` for the list of commands.")
}

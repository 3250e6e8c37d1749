//! Console command grammar.

/// One line typed at the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Block(String),
    Unblock(String),
    ListBlocked,
    ListCache,
    PurgeCache,
    Stats,
    Help,
    /// Known verb with a missing or wrong argument; carries the usage text.
    Usage(&'static str),
    Unknown(String),
}

impl AdminCommand {
    /// Parse a console line. Returns `None` for a blank line.
    ///
    /// The verb is case-insensitive; a host argument is kept as typed.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let (verb, arg) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "block" if arg.is_empty() => AdminCommand::Usage("block <host>"),
            "block" => AdminCommand::Block(arg.to_string()),
            "unblock" if arg.is_empty() => AdminCommand::Usage("unblock <host>"),
            "unblock" => AdminCommand::Unblock(arg.to_string()),
            "list" => match arg.to_ascii_lowercase().as_str() {
                "blocked" => AdminCommand::ListBlocked,
                "cache" => AdminCommand::ListCache,
                _ => AdminCommand::Usage("list blocked | list cache"),
            },
            "purge" => match arg.to_ascii_lowercase().as_str() {
                "cache" => AdminCommand::PurgeCache,
                _ => AdminCommand::Usage("purge cache"),
            },
            "stats" => AdminCommand::Stats,
            "help" => AdminCommand::Help,
            other => AdminCommand::Unknown(other.to_string()),
        };
        Some(command)
    }
}

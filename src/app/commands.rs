//! Slash command parsing for the docchat application.
//!
//! Input starting with `/` controls the application; anything else is a
//! question for the current chat.

use crate::types::{FileId, SessionId};

/// A parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    /// Sign in.
    Login {
        /// Account email.
        email: String,
        /// Password.
        password: String,
    },

    /// Create an account.
    Register {
        /// Account email.
        email: String,
        /// Password.
        password: String,
    },

    /// Confirm an email with its one-time code.
    Verify {
        /// Account email.
        email: String,
        /// Emailed code.
        code: String,
    },

    /// Send another verification code.
    Resend(String),

    /// Request a password-reset code.
    Forgot(String),

    /// Set a new password with a reset code.
    Reset {
        /// Account email.
        email: String,
        /// Emailed code.
        code: String,
        /// Replacement password.
        new_password: String,
    },

    /// Sign out.
    Logout,

    /// Show the signed-in user.
    WhoAmI,

    /// Re-check sign-in state with the backend.
    Revalidate,

    /// Start a new chat.
    New,

    /// List chats.
    Sessions,

    /// Open a chat by id.
    Open(SessionId),

    /// Retitle the current chat.
    Rename(String),

    /// Delete a chat; the current one when no id is given.
    Delete(Option<SessionId>),

    /// Upload documents by path.
    Upload(Vec<String>),

    /// List documents of the current chat.
    Files,

    /// Remove a document from the current chat.
    RemoveFile(FileId),

    /// Write the transcript to a file.
    Export(String),

    /// Print the last answer again.
    Last,

    /// Switch between light and dark.
    Theme,

    /// Print the current chat's messages.
    History,

    /// Display help information.
    Help,

    /// Exit the application.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(AppCommand)` if the input is a command, or `None` if it
/// should be sent as a question.
///
/// # Examples
///
/// ```
/// # use docchat::app::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/open 12").is_some());
/// assert!(parse_command("What is the refund policy?").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<AppCommand> {
    let input = input.trim();

    let rest = input.strip_prefix('/')?;
    let mut parts = rest.splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());
    let words: Vec<&str> = argument
        .map(|arg| arg.split_whitespace().collect())
        .unwrap_or_default();

    let result = match command.as_str() {
        "login" | "signin" => match words.as_slice() {
            [email, password] => AppCommand::Login {
                email: email.to_string(),
                password: password.to_string(),
            },
            _ => AppCommand::Invalid("/login requires <email> <password>".to_string()),
        },
        "register" | "signup" => match words.as_slice() {
            [email, password] => AppCommand::Register {
                email: email.to_string(),
                password: password.to_string(),
            },
            _ => AppCommand::Invalid("/register requires <email> <password>".to_string()),
        },
        "verify" => match words.as_slice() {
            [email, code] => AppCommand::Verify {
                email: email.to_string(),
                code: code.to_string(),
            },
            _ => AppCommand::Invalid("/verify requires <email> <code>".to_string()),
        },
        "resend" => single_word(&words, AppCommand::Resend, "/resend requires <email>"),
        "forgot" => single_word(&words, AppCommand::Forgot, "/forgot requires <email>"),
        "reset" => match words.as_slice() {
            [email, code, new_password] => AppCommand::Reset {
                email: email.to_string(),
                code: code.to_string(),
                new_password: new_password.to_string(),
            },
            _ => AppCommand::Invalid(
                "/reset requires <email> <code> <new-password>".to_string(),
            ),
        },
        "logout" | "signout" => AppCommand::Logout,
        "whoami" => AppCommand::WhoAmI,
        "auth" => AppCommand::Revalidate,
        "new" => AppCommand::New,
        "sessions" | "chats" => AppCommand::Sessions,
        "open" => match argument.map(parse_id) {
            Some(Ok(id)) => AppCommand::Open(id),
            Some(Err(err)) => AppCommand::Invalid(format!("/open {err}")),
            None => AppCommand::Invalid("/open requires a chat id".to_string()),
        },
        "rename" => match argument {
            Some(title) => AppCommand::Rename(title.to_string()),
            None => AppCommand::Invalid("/rename requires a title".to_string()),
        },
        "delete" => match argument.map(parse_id) {
            Some(Ok(id)) => AppCommand::Delete(Some(id)),
            Some(Err(err)) => AppCommand::Invalid(format!("/delete {err}")),
            None => AppCommand::Delete(None),
        },
        "upload" => {
            if words.is_empty() {
                AppCommand::Invalid("/upload requires at least one file path".to_string())
            } else {
                AppCommand::Upload(words.iter().map(|w| w.to_string()).collect())
            }
        }
        "files" => AppCommand::Files,
        "rmfile" => match argument.map(parse_id) {
            Some(Ok(id)) => AppCommand::RemoveFile(id),
            Some(Err(err)) => AppCommand::Invalid(format!("/rmfile {err}")),
            None => AppCommand::Invalid("/rmfile requires a file id".to_string()),
        },
        "export" => match argument {
            Some(path) => AppCommand::Export(path.to_string()),
            None => AppCommand::Invalid("/export requires a file path".to_string()),
        },
        "last" | "copy" => AppCommand::Last,
        "theme" => AppCommand::Theme,
        "history" => AppCommand::History,
        "help" | "?" => AppCommand::Help,
        "quit" | "exit" | "q" => AppCommand::Quit,
        _ => AppCommand::Invalid(format!("Unknown command: /{}", command)),
    };

    Some(result)
}

fn single_word<F>(words: &[&str], constructor: F, usage: &str) -> AppCommand
where
    F: Fn(String) -> AppCommand,
{
    match words {
        [word] => constructor(word.to_string()),
        _ => AppCommand::Invalid(usage.to_string()),
    }
}

fn parse_id(value: &str) -> Result<i64, String> {
    value
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| "expects a positive integer id".to_string())
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /login <email> <password>      Sign in
  /register <email> <password>   Create an account
  /verify <email> <code>         Confirm your email
  /resend <email>                Send another verification code
  /forgot <email>                Email a password-reset code
  /reset <email> <code> <pass>   Set a new password
  /logout                        Sign out
  /whoami                        Show the signed-in user
  /auth                          Re-check sign-in state
  /new                           Start a new chat
  /sessions                      List your chats
  /open <id>                     Open a chat
  /rename <title>                Retitle the current chat
  /delete [id]                   Delete a chat (default: current)
  /upload <path>...              Add documents to the current chat
  /files                         List documents in the current chat
  /rmfile <id>                   Remove a document
  /export <file>                 Save the transcript as JSON
  /last                          Print the last answer again
  /theme                         Toggle light/dark
  /history                       Print this chat's messages
  /help                          Show this help message
  /quit                          Exit"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_quit_commands() {
        assert_eq!(parse_command("/quit"), Some(AppCommand::Quit));
        assert_eq!(parse_command("/exit"), Some(AppCommand::Quit));
        assert_eq!(parse_command("/q"), Some(AppCommand::Quit));
        assert_eq!(parse_command("  /quit  "), Some(AppCommand::Quit));
    }

    #[test]
    fn parse_auth_commands() {
        assert_eq!(
            parse_command("/login ada@example.com hunter22"),
            Some(AppCommand::Login {
                email: "ada@example.com".to_string(),
                password: "hunter22".to_string(),
            })
        );
        assert!(matches!(
            parse_command("/login ada@example.com"),
            Some(AppCommand::Invalid(msg)) if msg.contains("requires")
        ));
        assert_eq!(
            parse_command("/reset ada@example.com 123456 n3w"),
            Some(AppCommand::Reset {
                email: "ada@example.com".to_string(),
                code: "123456".to_string(),
                new_password: "n3w".to_string(),
            })
        );
        assert_eq!(
            parse_command("/resend ada@example.com"),
            Some(AppCommand::Resend("ada@example.com".to_string()))
        );
        assert_eq!(parse_command("/LOGOUT"), Some(AppCommand::Logout));
        assert_eq!(parse_command("/auth"), Some(AppCommand::Revalidate));
    }

    #[test]
    fn parse_session_commands() {
        assert_eq!(parse_command("/open 12"), Some(AppCommand::Open(12)));
        assert!(matches!(
            parse_command("/open twelve"),
            Some(AppCommand::Invalid(msg)) if msg.contains("positive integer")
        ));
        assert_eq!(parse_command("/delete"), Some(AppCommand::Delete(None)));
        assert_eq!(parse_command("/delete 3"), Some(AppCommand::Delete(Some(3))));
        assert_eq!(
            parse_command("/rename  Quarterly   report "),
            Some(AppCommand::Rename("Quarterly   report".to_string()))
        );
        assert!(matches!(parse_command("/rename"), Some(AppCommand::Invalid(_))));
    }

    #[test]
    fn parse_file_commands() {
        assert_eq!(
            parse_command("/upload a.pdf notes/b.md"),
            Some(AppCommand::Upload(vec![
                "a.pdf".to_string(),
                "notes/b.md".to_string()
            ]))
        );
        assert!(matches!(parse_command("/upload"), Some(AppCommand::Invalid(_))));
        assert_eq!(parse_command("/rmfile 7"), Some(AppCommand::RemoveFile(7)));
        assert_eq!(parse_command("/files"), Some(AppCommand::Files));
        assert_eq!(
            parse_command("/export chat.json"),
            Some(AppCommand::Export("chat.json".to_string()))
        );
    }

    #[test]
    fn unknown_command() {
        assert_eq!(
            parse_command("/frobnicate"),
            Some(AppCommand::Invalid("Unknown command: /frobnicate".to_string()))
        );
    }

    #[test]
    fn non_commands() {
        assert_eq!(parse_command("What is the refund policy?"), None);
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("  "), None);
    }

    #[test]
    fn help_text_lists_commands() {
        let help = help_text();
        for command in ["/login", "/upload", "/rename", "/delete", "/theme", "/quit"] {
            assert!(help.contains(command), "{command}");
        }
    }
}

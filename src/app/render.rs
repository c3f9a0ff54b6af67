//! Output rendering for the docchat application.
//!
//! A trait-based rendering abstraction with a line-oriented plain-text
//! implementation.  Colors follow the theme and can be turned off entirely.

use std::io::{self, Stdout, Write};

use crate::local_state::Theme;
use crate::types::{ChatMessage, ChatSessionRecord, FileRecord, Sender, User};
use crate::upload::format_size;

/// ANSI escape code for dim text.
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for bold text.
const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for blue text (bot on light backgrounds).
const ANSI_BLUE: &str = "\x1b[34m";

/// ANSI escape code for cyan text (bot on dark backgrounds).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for green text (user on dark backgrounds).
const ANSI_GREEN: &str = "\x1b[32m";

/// ANSI escape code for magenta text (user on light backgrounds).
const ANSI_MAGENTA: &str = "\x1b[35m";

/// ANSI escape code for red text (errors).
const ANSI_RED: &str = "\x1b[31m";

/// Trait for rendering application output.
pub trait Renderer: Send {
    /// Print one chat message.
    fn print_message(&mut self, message: &ChatMessage);

    /// Print the chat list, marking the current one.
    fn print_sessions(&mut self, sessions: &[ChatSessionRecord], current: Option<i64>);

    /// Print the documents of the current chat.
    fn print_files(&mut self, files: &[FileRecord]);

    /// Print the signed-in user.
    fn print_user(&mut self, user: Option<&User>);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Follow a theme change.
    fn set_theme(&mut self, theme: Theme);
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
    theme: Theme,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
            theme: Theme::default(),
        }
    }

    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }

    fn sender_style(&self, sender: Sender) -> &'static str {
        match (sender, self.theme) {
            (Sender::User, Theme::Light) => ANSI_MAGENTA,
            (Sender::User, Theme::Dark) => ANSI_GREEN,
            (Sender::Bot, Theme::Light) => ANSI_BLUE,
            (Sender::Bot, Theme::Dark) => ANSI_CYAN,
        }
    }

    /// The line printed for `message`.
    pub fn format_message(&self, message: &ChatMessage) -> String {
        let label = match message.sender {
            Sender::User => "You",
            Sender::Bot => "Bot",
        };
        if self.use_color {
            let style = self.sender_style(message.sender);
            format!("{ANSI_BOLD}{style}{label}:{ANSI_RESET} {}", message.text)
        } else {
            format!("{label}: {}", message.text)
        }
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn print_message(&mut self, message: &ChatMessage) {
        println!("{}", self.format_message(message));
        self.flush();
    }

    fn print_sessions(&mut self, sessions: &[ChatSessionRecord], current: Option<i64>) {
        if sessions.is_empty() {
            println!("    (no chats)");
            return;
        }
        for session in sessions {
            let marker = if Some(session.id) == current { "*" } else { " " };
            println!("  {marker} {:>5}  {}", session.id, session.title());
        }
        self.flush();
    }

    fn print_files(&mut self, files: &[FileRecord]) {
        if files.is_empty() {
            println!("    (no documents)");
            return;
        }
        for file in files {
            let size = file.file_size.map(format_size).unwrap_or_default();
            if self.use_color {
                println!("    {:>5}  {}  {ANSI_DIM}{size}{ANSI_RESET}", file.id, file.filename);
            } else {
                println!("    {:>5}  {}  {size}", file.id, file.filename);
            }
        }
        self.flush();
    }

    fn print_user(&mut self, user: Option<&User>) {
        match user {
            Some(user) => {
                println!("    Signed in as {} (id {})", user.email, user.id);
                if let Some(avatar) = user.avatar() {
                    println!("    Avatar: {avatar}");
                }
            }
            None => println!("    Not signed in (guest mode)"),
        }
        self.flush();
    }

    fn print_error(&mut self, error: &str) {
        if self.use_color {
            eprintln!("{ANSI_RED}Error:{ANSI_RESET} {error}");
        } else {
            eprintln!("Error: {error}");
        }
    }

    fn print_info(&mut self, info: &str) {
        if self.use_color {
            println!("{ANSI_DIM}{info}{ANSI_RESET}");
        } else {
            println!("{info}");
        }
        self.flush();
    }

    fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
    }
}

//! Interactive terminal front end for the document-chat backend.
//!
//! # Usage
//!
//! ```bash
//! # Against the default backend
//! docchat
//!
//! # Against a specific backend, signing in at start
//! DOCCHAT_PASSWORD=... docchat --api-url https://docs.example.com --email ada@example.com
//!
//! # Disable colors (useful for piping output)
//! docchat --no-color
//! ```
//!
//! Logging goes to stderr and is controlled by `DOCCHAT_LOG` (default `warn`).
//!
//! # Commands
//!
//! - `/login <email> <password>` - Sign in
//! - `/upload <path>...` - Add documents to the current chat
//! - `/new` - Start a new chat
//! - `/sessions` - List chats
//! - `/help` - Show every command
//! - `/quit` - Exit the application
//!
//! Anything else is asked of the current chat's documents.

use std::sync::Arc;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

use docchat::app::{
    AppArgs, AppCommand, AppConfig, DocChat, PASSWORD_ENV, PlainTextRenderer, Renderer,
    SessionState, help_text, parse_command,
};
use docchat::{ApiClient, FileStore, LocalFile};

const LOG_ENV: &str = "DOCCHAT_LOG";

/// Main entry point for the docchat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let (args, _) = AppArgs::from_command_line_relaxed("docchat [OPTIONS]");
    let config = AppConfig::from(args);

    let client = ApiClient::with_options(config.api_url.clone(), Some(config.timeout))?;
    println!("docchat ({})", client.base_url());
    let store = Arc::new(FileStore::open(&config.state_file));
    let chat = DocChat::new(Arc::new(client), store);
    let mut renderer = PlainTextRenderer::with_color(config.use_color);
    renderer.set_theme(chat.theme());

    match (&config.email, std::env::var(PASSWORD_ENV)) {
        (Some(email), Ok(password)) => match chat.sign_in(email, &password).await {
            Ok(user) => renderer.print_info(&format!("Signed in as {}", user.email)),
            Err(err) => renderer.print_error(&err.to_string()),
        },
        (Some(_), Err(_)) => {
            renderer.print_error(&format!("--email needs the password in ${PASSWORD_ENV}"));
            load(&chat, &mut renderer).await;
        }
        (None, _) => load(&chat, &mut renderer).await,
    }
    print_history(&chat, &mut renderer);
    println!("Type /help for commands, /quit to exit\n");

    let mut rl = DefaultEditor::new()?;
    loop {
        let readline = rl.readline("You: ");

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                if let Some(cmd) = parse_command(line) {
                    // Keep passwords out of the history.
                    if !matches!(
                        cmd,
                        AppCommand::Login { .. }
                            | AppCommand::Register { .. }
                            | AppCommand::Reset { .. }
                    ) {
                        let _ = rl.add_history_entry(line);
                    }
                    if cmd == AppCommand::Quit {
                        println!("Goodbye!");
                        break;
                    }
                    run_command(&chat, &mut renderer, cmd).await;
                    continue;
                }

                let _ = rl.add_history_entry(line);
                match chat.send_message(line).await {
                    Ok(reply) => renderer.print_message(&reply),
                    Err(err) => renderer.print_error(err.message()),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {}", err));
                break;
            }
        }
    }

    chat.flush_background().await;
    Ok(())
}

async fn load(chat: &DocChat<ApiClient>, renderer: &mut dyn Renderer) {
    match chat.load().await {
        Ok(SessionState::NoSession) if !chat.auth().is_logged_in() => {
            renderer.print_info("Guest mode: /login to save chats.");
        }
        Ok(_) => {}
        Err(err) => renderer.print_error(&err.to_string()),
    }
}

async fn run_command(chat: &DocChat<ApiClient>, renderer: &mut dyn Renderer, cmd: AppCommand) {
    let auth = chat.auth();
    let outcome = async {
        match cmd {
            AppCommand::Login { email, password } => {
                let user = chat.sign_in(&email, &password).await?;
                renderer.print_info(&format!("Signed in as {}", user.email));
                print_history(chat, renderer);
            }
            AppCommand::Register { email, password } => {
                let response = auth.sign_up(&email, &password).await?;
                print_auth_response(renderer, &response, "Registered.");
            }
            AppCommand::Verify { email, code } => {
                let response = auth.verify_email(&email, &code).await?;
                print_auth_response(renderer, &response, "Email verified.");
                if auth.is_logged_in() {
                    chat.load().await?;
                }
            }
            AppCommand::Resend(email) => {
                let response = auth.resend_verification(&email).await?;
                print_auth_response(renderer, &response, "Verification code sent.");
            }
            AppCommand::Forgot(email) => {
                let response = auth.request_password_reset(&email).await?;
                print_auth_response(renderer, &response, "Reset code sent.");
            }
            AppCommand::Reset {
                email,
                code,
                new_password,
            } => {
                let response = auth
                    .confirm_password_reset(&email, &code, &new_password)
                    .await?;
                print_auth_response(renderer, &response, "Password changed.");
            }
            AppCommand::Logout => {
                chat.sign_out().await?;
                renderer.print_info("Signed out.");
            }
            AppCommand::WhoAmI => renderer.print_user(auth.current_user().as_ref()),
            AppCommand::Revalidate => {
                let signed_in = auth.revalidate().await;
                renderer.print_user(auth.current_user().as_ref());
                if signed_in && chat.state() == SessionState::NoSession {
                    chat.load().await?;
                }
            }
            AppCommand::New => match chat.new_chat().await? {
                Some(id) => {
                    renderer.print_info(&format!("Started chat {id}."));
                    print_history(chat, renderer);
                }
                None => renderer.print_info("A new chat is already being created."),
            },
            AppCommand::Sessions => {
                let sessions = chat.list_sessions().await?;
                let current = chat.current_session().map(|s| s.id);
                renderer.print_sessions(&sessions, current);
            }
            AppCommand::Open(id) => {
                chat.switch_session(id).await?;
                print_history(chat, renderer);
            }
            AppCommand::Rename(title) => {
                let Some(session) = chat.current_session() else {
                    renderer.print_error("No chat is open.");
                    return Ok(());
                };
                chat.rename_session(session.id, &title).await?;
                renderer.print_info(&format!("Renamed to \"{}\".", title.trim()));
            }
            AppCommand::Delete(id) => {
                let Some(id) = id.or_else(|| chat.current_session().map(|s| s.id)) else {
                    renderer.print_error("No chat is open.");
                    return Ok(());
                };
                chat.delete_session(id).await?;
                renderer.print_info(&format!("Deleted chat {id}."));
                if let Some(session) = chat.current_session() {
                    renderer.print_info(&format!("Now in chat {}.", session.id));
                }
            }
            AppCommand::Upload(paths) => {
                let mut files = Vec::new();
                for path in paths {
                    match LocalFile::from_path(&path).await {
                        Ok(file) => files.push(file),
                        Err(err) => renderer.print_error(err.message()),
                    }
                }
                if files.is_empty() {
                    return Ok(());
                }
                let before = chat.messages().len();
                let report = chat.upload_files(files).await?;
                for err in &report.rejected {
                    renderer.print_error(err.message());
                }
                if let Some(err) = &report.session_error {
                    renderer.print_error(err.message());
                }
                for message in chat.messages().iter().skip(before) {
                    renderer.print_message(message);
                }
            }
            AppCommand::Files => renderer.print_files(&chat.files()),
            AppCommand::RemoveFile(id) => {
                if chat.delete_file(id).await? == SessionState::WithoutFiles {
                    renderer.print_info("No documents left; upload one to keep asking.");
                } else {
                    renderer.print_info(&format!("Removed document {id}."));
                }
            }
            AppCommand::Export(path) => {
                chat.export_transcript(&path).await?;
                renderer.print_info(&format!("Transcript saved to {path}"));
            }
            AppCommand::Last => match chat.last_answer() {
                Some(answer) => println!("{answer}"),
                None => renderer.print_info("No answer yet."),
            },
            AppCommand::Theme => {
                let theme = chat.toggle_theme()?;
                renderer.set_theme(theme);
                renderer.print_info(&format!("Theme: {theme}"));
            }
            AppCommand::History => print_history(chat, renderer),
            AppCommand::Help => {
                for line in help_text().lines() {
                    println!("    {}", line);
                }
            }
            AppCommand::Quit => {}
            AppCommand::Invalid(message) => renderer.print_error(&message),
        }
        Ok::<(), docchat::Error>(())
    }
    .await;

    if let Err(err) = outcome {
        renderer.print_error(&err.to_string());
    }
}

fn print_auth_response(
    renderer: &mut dyn Renderer,
    response: &docchat::AuthResponse,
    fallback: &str,
) {
    renderer.print_info(response.message.as_deref().unwrap_or(fallback));
    if let Some(instructions) = response.instructions.as_deref() {
        renderer.print_info(instructions);
    }
}

fn print_history(chat: &DocChat<ApiClient>, renderer: &mut dyn Renderer) {
    if let Some(session) = chat.current_session() {
        renderer.print_info(&format!("Chat {}: {}", session.id, session.title()));
    }
    for message in chat.messages() {
        renderer.print_message(&message);
    }
    if chat.state() == SessionState::WithoutFiles {
        renderer.print_info("Upload a document first to start chatting (/upload <path>).");
    }
}

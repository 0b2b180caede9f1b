use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};

use crate::app::App;
use crate::models::Session;
use crate::services::admin::DeleteOutcome;
use crate::services::ChatError;

use super::commands::{self, AdminCommand, Command, HistoryNav};
use super::render;

enum Exit {
    Quit,
    SignedOut,
}

struct Terminal<R, W> {
    lines: Lines<R>,
    out: W,
}

impl<R, W> Terminal<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    async fn say(&mut self, text: &str) -> Result<()> {
        self.out.write_all(text.as_bytes()).await?;
        if !text.ends_with('\n') {
            self.out.write_all(b"\n").await?;
        }
        self.out.flush().await?;
        Ok(())
    }

    async fn ask(&mut self, prompt: &str) -> Result<Option<String>> {
        self.out.write_all(prompt.as_bytes()).await?;
        self.out.flush().await?;
        Ok(self.lines.next_line().await?)
    }
}

/// Sign-in then chat until `/quit` or end of input.
pub async fn run<R, W>(app: &App, input: R, out: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut term = Terminal {
        lines: input.lines(),
        out,
    };
    term.say("Essay Writing Assistant. Sign in to continue.").await?;

    loop {
        let Some(mut session) = sign_in(app, &mut term).await? else {
            return Ok(());
        };
        let admin = app.is_admin(&session.user).await;
        term.say(&render::transcript(&app.formatter, &session.messages))
            .await?;

        match chat_loop(app, &mut session, admin, &mut term).await? {
            Exit::Quit => return Ok(()),
            Exit::SignedOut => term.say("Signed out.").await?,
        }
    }
}

async fn sign_in<R, W>(app: &App, term: &mut Terminal<R, W>) -> Result<Option<Session>>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let Some(email) = term.ask("Email: ").await? else {
            return Ok(None);
        };
        let Some(password) = term.ask("Password: ").await? else {
            return Ok(None);
        };
        match app.login(email.trim(), &password).await {
            Ok(session) => return Ok(Some(session)),
            Err(e) => term.say(&e.to_string()).await?,
        }
    }
}

async fn chat_loop<R, W>(
    app: &App,
    session: &mut Session,
    admin: bool,
    term: &mut Terminal<R, W>,
) -> Result<Exit>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let Some(line) = term.ask("> ").await? else {
            return Ok(Exit::Quit);
        };
        if line.trim().is_empty() {
            continue;
        }

        let command = match commands::parse(&line) {
            Ok(c) => c,
            Err(msg) => {
                term.say(&msg).await?;
                continue;
            }
        };

        match handle(app, session, admin, command, term).await {
            Ok(Some(exit)) => return Ok(exit),
            Ok(None) => {}
            Err(e) => {
                tracing::error!("Command failed: {:#}", e);
                term.say(&format!("Error: {:#}", e)).await?;
            }
        }
    }
}

async fn handle<R, W>(
    app: &App,
    session: &mut Session,
    admin: bool,
    command: Command,
    term: &mut Terminal<R, W>,
) -> Result<Option<Exit>>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match command {
        Command::Help => {
            term.say(commands::HELP).await?;
            return Ok(None);
        }
        Command::Quit => return Ok(Some(Exit::Quit)),
        Command::Logout => {
            session.logout();
            return Ok(Some(Exit::SignedOut));
        }
        Command::Chat(text) => return chat(app, session, &text, term).await,
        _ => {}
    }

    if let Err(e) = app.chat.ensure_active(session) {
        term.say(&e.to_string()).await?;
        return Ok(Some(Exit::SignedOut));
    }

    match command {
        Command::New => {
            app.history.new_session(session, app.clock.now());
            term.say(&render::transcript(&app.formatter, &session.messages))
                .await?;
        }
        Command::History(nav) => {
            match nav {
                HistoryNav::Show => {}
                HistoryNav::Next => {
                    if !app.history.next_page(session).await? {
                        term.say("No older sessions.").await?;
                    }
                }
                HistoryNav::Previous => {
                    if !app.history.previous_page(session) {
                        term.say("Already at the newest sessions.").await?;
                    }
                }
                HistoryNav::Latest => app.history.latest(session),
            }
            let page = app.history.current_page(session).await?;
            term.say(&render::history_page(&app.formatter, &page)).await?;
        }
        Command::Open(n) => {
            let page = app.history.current_page(session).await?;
            let Some(conversation) = page.conversations.get(n - 1) else {
                term.say(&format!("No session {} on this page.", n)).await?;
                return Ok(None);
            };
            app.history.open(session, &conversation.id).await?;
            term.say(&format!("Opened \"{}\".", conversation.display_title()))
                .await?;
            term.say(&render::transcript(&app.formatter, &session.messages))
                .await?;
        }
        Command::Stage(stage) => {
            app.chat.override_stage(session, stage);
            term.say(&format!("Stage set to {}.", stage.as_str())).await?;
        }
        Command::Admin(cmd) => {
            if !admin {
                term.say("Admin access required.").await?;
            } else {
                admin_command(app, cmd, term).await?;
            }
        }
        Command::Help | Command::Quit | Command::Logout | Command::Chat(_) => {}
    }
    Ok(None)
}

async fn chat<R, W>(
    app: &App,
    session: &mut Session,
    text: &str,
    term: &mut Terminal<R, W>,
) -> Result<Option<Exit>>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let before = session.stage;
    match app.chat.send(session, text).await {
        Ok(outcome) => {
            term.say(&render::message(&app.formatter, &outcome.reply))
                .await?;
            if outcome.stage != before {
                term.say(&format!(
                    "(stage: {}, essay: {})",
                    outcome.stage.as_str(),
                    outcome.essay_type.as_str()
                ))
                .await?;
            }
        }
        Err(e @ (ChatError::SessionExpired | ChatError::NotAuthenticated)) => {
            term.say(&e.to_string()).await?;
            return Ok(Some(Exit::SignedOut));
        }
        Err(e @ ChatError::Persistence(_)) => {
            if let Some(reply) = session.messages.last() {
                term.say(&render::message(&app.formatter, reply)).await?;
            }
            term.say(&e.to_string()).await?;
        }
        Err(e) => term.say(&e.to_string()).await?,
    }
    Ok(None)
}

async fn admin_command<R, W>(app: &App, cmd: AdminCommand, term: &mut Terminal<R, W>) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if !matches!(cmd, AdminCommand::Delete(_) | AdminCommand::Purge(_)) {
        app.admin.cancel_delete();
    }

    match cmd {
        AdminCommand::Stats => {
            let stats = app.admin.stats().await?;
            term.say(&render::stats(&stats)).await?;
        }
        AdminCommand::Users => {
            let rows = app.admin.users().await?;
            term.say(&render::users(&rows)).await?;
        }
        AdminCommand::Essays(email) => {
            let user_id = user_id_for(app, &email).await?;
            let rows = app.admin.user_conversations(&user_id).await?;
            term.say(&render::conversations(&rows)).await?;
        }
        AdminCommand::View(id) => {
            let transcript = app.admin.conversation_transcript(&id).await?;
            term.say(&transcript).await?;
        }
        AdminCommand::Export { email, path } => {
            let user_id = user_id_for(app, &email).await?;
            let log = app.admin.export_user_log(&user_id).await?;
            tokio::fs::write(&path, log)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            term.say(&format!("Chat log written to {}", path.display()))
                .await?;
        }
        AdminCommand::Markdown {
            conversation_id,
            path,
        } => {
            let markdown = app.admin.export_conversation_markdown(&conversation_id).await?;
            tokio::fs::write(&path, markdown)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            term.say(&format!("Transcript written to {}", path.display()))
                .await?;
        }
        AdminCommand::Delete(id) => {
            let outcome = app.admin.delete_conversation(&id).await?;
            report_delete(term, outcome, &format!("essay session {}", id)).await?;
        }
        AdminCommand::Purge(email) => {
            let user_id = user_id_for(app, &email).await?;
            let outcome = app.admin.delete_user_conversations(&user_id).await?;
            report_delete(term, outcome, &format!("all essay sessions of {}", email)).await?;
        }
    }
    Ok(())
}

async fn report_delete<R, W>(
    term: &mut Terminal<R, W>,
    outcome: DeleteOutcome,
    what: &str,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match outcome {
        DeleteOutcome::AwaitingConfirmation => {
            term.say(&format!("Repeat the command to confirm deleting {}.", what))
                .await
        }
        DeleteOutcome::Deleted(n) => term.say(&format!("Deleted {} session(s).", n)).await,
    }
}

async fn user_id_for(app: &App, email: &str) -> Result<String> {
    app.db
        .get_user_by_email(email)
        .await?
        .map(|u| u.id)
        .with_context(|| format!("No user with email {}", email))
}

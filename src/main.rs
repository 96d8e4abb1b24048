use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use menti::config::AppConfig;
use menti::models::Role;
use menti::providers::{CompanionModel, OpenAiProvider};
use menti::services::diagnostics;
use menti::services::{
    Capabilities, ConversationLifecycleManager, ConversationStore, Database, WorkingHistoryStore,
};

struct Session {
    user_id: String,
    is_guest: bool,
    conversation_id: Option<String>,
}

fn parse_args() -> Result<Session> {
    let mut user_id = None;
    let mut is_guest = false;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--guest" => is_guest = true,
            "--user" => match args.next() {
                Some(id) => user_id = Some(id),
                None => bail!("--user needs a value"),
            },
            other => bail!("Unknown argument: {}", other),
        }
    }
    let user_id = match user_id {
        Some(id) => id,
        None if is_guest => format!("guest-{}", Uuid::new_v4()),
        None => "local".to_string(),
    };
    Ok(Session {
        user_id,
        is_guest,
        conversation_id: None,
    })
}

async fn open_store(config: &AppConfig) -> Option<Database> {
    if !config.store.enabled {
        return None;
    }
    let path = match config.store.resolved_path() {
        Ok(path) => path,
        Err(e) => {
            tracing::error!("No usable store path, running memory-only: {}", e);
            return None;
        }
    };
    match Database::open(&path).await {
        Ok(db) => {
            tracing::info!("Conversation store at {}", path.display());
            Some(db)
        }
        Err(e) => {
            tracing::error!("Failed to open store, running memory-only: {:#}", e);
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut session = parse_args()?;
    let config = AppConfig::load()?;

    let db = open_store(&config).await;
    let provider = Arc::new(OpenAiProvider::new(
        config.llm.base_url.as_deref(),
        config.llm.resolved_api_key(),
    ));
    if config.llm.resolved_api_key().is_none() {
        tracing::warn!("No API key configured; replies will use the fallback text");
    }
    let model = Arc::new(CompanionModel::new(provider, config.llm.model.clone()));

    let store = db
        .clone()
        .map(|db| Arc::new(db) as Arc<dyn ConversationStore>);
    let manager = ConversationLifecycleManager::new(
        Arc::new(WorkingHistoryStore::with_limit(config.history.max_turns)),
        store,
        Capabilities::shared(model),
        config.llm.timeouts(),
    );

    println!(
        "Menti ({} session as {}). Type a message, or /help.",
        if session.is_guest { "guest" } else { "account" },
        session.user_id
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !line.starts_with('/') {
            send(&manager, &session, line).await;
            continue;
        }
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();
        match command {
            "/help" => print_help(),
            "/new" => {
                let title = (!rest.is_empty()).then_some(rest);
                open_new(&manager, &mut session, title, None).await;
            }
            "/smart" => {
                if rest.is_empty() {
                    println!("Usage: /smart <first message>");
                    continue;
                }
                if open_new(&manager, &mut session, None, Some(rest)).await {
                    send(&manager, &session, rest).await;
                }
            }
            "/open" => {
                if rest.is_empty() {
                    println!("Usage: /open <conversation id>");
                    continue;
                }
                session.conversation_id = Some(rest.to_string());
                for message in manager.list_messages(rest).await {
                    println!("[{}] {}", message.sender.as_str(), message.text);
                }
            }
            "/list" => {
                let archived = rest == "archived";
                for conv in manager.list(&session.user_id, session.is_guest, archived).await {
                    println!("{}  {}  ({})", conv.id, conv.title, conv.last_message);
                }
            }
            "/rename" => {
                if let Some(id) = &session.conversation_id {
                    if let Err(e) = manager.rename(id, rest).await {
                        println!("Rename failed: {}", e);
                    }
                }
            }
            "/archive" | "/restore" => {
                if let Some(id) = &session.conversation_id {
                    if let Err(e) = manager.archive(id, command == "/archive").await {
                        println!("Archive failed: {}", e);
                    }
                }
            }
            "/delete" => {
                if let Some(id) = session.conversation_id.take() {
                    match manager.delete(&id).await {
                        Ok(result) => println!("Deleted {} message(s)", result.messages_deleted),
                        Err(e) => println!("Delete failed, run /delete again: {}", e),
                    }
                }
            }
            "/history" => {
                for turn in manager.history().snapshot(&session.user_id) {
                    let who = match turn.role {
                        Role::User => "you",
                        Role::Assistant => "menti",
                    };
                    println!("{}: {}", who, turn.content);
                }
            }
            "/clear" => {
                if session.is_guest {
                    let report = manager.clear_guest_data(&session.user_id).await;
                    println!("Removed {} guest conversation(s)", report.conversations_deleted);
                } else {
                    manager.clear_working_history(&session.user_id);
                }
                session.conversation_id = None;
            }
            "/inspect" => match &db {
                Some(db) => inspect(db, &session.user_id).await,
                None => println!("No store configured"),
            },
            "/logout" | "/quit" => break,
            other => println!("Unknown command {}", other),
        }
    }

    let report = manager.logout(&session.user_id, session.is_guest).await;
    if session.is_guest {
        println!(
            "Guest data removed ({} conversation(s))",
            report.conversations_deleted
        );
    }
    Ok(())
}

async fn send(manager: &ConversationLifecycleManager, session: &Session, text: &str) {
    match manager
        .handle_turn(
            &session.user_id,
            session.conversation_id.as_deref(),
            text,
            session.is_guest,
        )
        .await
    {
        Ok(turn) => println!("({}) {}", turn.emotion, turn.reply),
        Err(e) => println!("{}", e),
    }
}

async fn open_new(
    manager: &ConversationLifecycleManager,
    session: &mut Session,
    title: Option<&str>,
    smart_title_from: Option<&str>,
) -> bool {
    match manager
        .create(&session.user_id, session.is_guest, title, smart_title_from)
        .await
    {
        Ok(Some(conv)) => {
            println!("Started '{}' ({})", conv.title, conv.id);
            session.conversation_id = Some(conv.id);
            true
        }
        Ok(None) => {
            println!("Memory-only mode: conversations are not saved");
            true
        }
        Err(e) => {
            println!("Could not create conversation: {}", e);
            false
        }
    }
}

async fn inspect(db: &Database, owner_id: &str) {
    match diagnostics::inspect_owner(db, owner_id).await {
        Ok(report) => {
            println!(
                "guest: {} active / {} archived, account: {} active / {} archived, {} missing flags, {} messages",
                report.guest_active,
                report.guest_archived,
                report.account_active,
                report.account_archived,
                report.missing_flags,
                report.total_messages
            );
            if report.missing_flags > 0 {
                match diagnostics::repair_missing_flags(db).await {
                    Ok(n) => println!("Repaired {} conversation(s)", n),
                    Err(e) => println!("Repair failed: {}", e),
                }
            }
        }
        Err(e) => println!("Inspection failed: {}", e),
    }
    match diagnostics::purge_orphaned_messages(db).await {
        Ok(n) if n > 0 => println!("Purged {} orphaned message(s)", n),
        Ok(_) => {}
        Err(e) => println!("Orphan sweep failed: {}", e),
    }
}

fn print_help() {
    println!(
        "/new [title]      start a conversation\n\
         /smart <text>     start a conversation titled from <text> and send it\n\
         /open <id>        switch to a conversation and show its messages\n\
         /list [archived]  list conversations\n\
         /rename <title>   rename the current conversation\n\
         /archive /restore archive or restore the current conversation\n\
         /delete           delete the current conversation\n\
         /history          show working history\n\
         /clear            clear history (and guest conversations)\n\
         /inspect          check and repair stored data\n\
         /logout           end the session"
    );
}

mod console;

use std::sync::Arc;

use anyhow::Context;
use chatsync_client::{ClientConfig, RestHistoryApi, run_socket};
use chatsync_core::{ChatSession, Collaborators, EventBus};
use chatsync_types::events::EventKind;
use chatsync_types::models::{MessageId, Selection};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::console::{NoSidebar, StderrNotifier, TerminalBell};

const TAIL: usize = 20;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "chatsync=debug,chatsync_core=debug,chatsync_client=info".into()
            }),
        )
        .init();

    // Config
    let config = ClientConfig::from_env()?;
    let muted = std::env::var("CHATSYNC_MUTED").is_ok_and(|v| v == "1" || v == "true");
    let initial = initial_selection();

    let bell = Arc::new(TerminalBell::new(muted));
    let collaborators = Collaborators {
        notifier: Arc::new(StderrNotifier),
        sound: bell.clone(),
        conversations: Arc::new(NoSidebar),
    };
    let api = Arc::new(RestHistoryApi::new(config.api_url.clone(), config.token.clone()));
    let (session, outbound) =
        ChatSession::new(config.user_id.clone(), config.sync.clone(), api, collaborators);

    // Socket -> bus -> session
    let bus = EventBus::new();
    let subscription = bus.subscribe(EventKind::SYNC).await;
    let dispatch = tokio::spawn({
        let session = session.clone();
        async move { session.run(subscription).await }
    });

    let shutdown = CancellationToken::new();
    let socket = tokio::spawn({
        let url = config.socket_url();
        let heartbeat = config.heartbeat;
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = run_socket(&url, heartbeat, bus, outbound, shutdown).await {
                error!("socket: {:#}", e);
            }
        }
    });

    // Re-render on every timeline change
    let render = tokio::spawn({
        let mut timeline = session.watch_timeline();
        let local_user = config.user_id.clone();
        async move {
            while timeline.changed().await.is_ok() {
                let snapshot = timeline.borrow_and_update().clone();
                console::render(&snapshot, &local_user, TAIL);
            }
        }
    });

    info!("signed in as {}", config.user_id);
    if let Some(selection) = initial {
        let _ = session.select(selection).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line.context("read stdin")? else {
                    break;
                };
                if !handle_line(&session, &bell, line.trim()).await {
                    break;
                }
            }
        }
    }

    shutdown.cancel();
    session.sign_out();
    let _ = socket.await;
    dispatch.abort();
    render.abort();
    info!("bye");
    Ok(())
}

fn initial_selection() -> Option<Selection> {
    let group = std::env::var("CHATSYNC_GROUP_ID").ok().filter(|g| !g.is_empty());
    let peer = std::env::var("CHATSYNC_PEER_ID").ok().filter(|p| !p.is_empty());
    match (group, peer) {
        (Some(group), _) => Some(Selection::group(group)),
        (None, Some(peer)) => Some(Selection::direct(peer)),
        (None, None) => None,
    }
}

/// Run one console command. Returns false to quit. Failures were already
/// surfaced through the notifier.
async fn handle_line(session: &ChatSession, bell: &TerminalBell, line: &str) -> bool {
    let (command, arg) = match line.split_once(' ') {
        Some((command, arg)) => (command, arg.trim()),
        None => (line, ""),
    };
    match command {
        "" => {}
        "/quit" => return false,
        "/open" if !arg.is_empty() => {
            let _ = session.select(Selection::direct(arg)).await;
        }
        "/group" if !arg.is_empty() => {
            let _ = session.select(Selection::group(arg)).await;
        }
        "/older" => {
            let _ = session.load_older().await;
        }
        "/newer" => {
            let _ = session.load_newer().await;
        }
        "/find" if !arg.is_empty() => {
            let _ = session.jump_to(MessageId::new(arg)).await;
        }
        "/clear" => {
            let _ = session.clear_search_context().await;
        }
        "/recall" if !arg.is_empty() => {
            let _ = session.send_recall(MessageId::new(arg));
        }
        "/delete" if !arg.is_empty() => {
            let ids = arg.split_whitespace().map(MessageId::new).collect();
            let _ = session.send_delete_for_me(ids);
        }
        "/pin" if !arg.is_empty() => {
            let target = MessageId::new(arg);
            let timeline = session.timeline();
            match timeline.messages.iter().find(|m| m.id == target) {
                Some(message) => {
                    let _ = session.send_pin(message);
                }
                None => eprintln!("{arg} is not in the open timeline"),
            }
        }
        "/unpin" if !arg.is_empty() => {
            let _ = session.send_unpin(MessageId::new(arg), None);
        }
        "/mute" => {
            let muted = bell.toggle();
            println!("sound {}", if muted { "off" } else { "on" });
        }
        _ if command.starts_with('/') => {
            eprintln!(
                "commands: /open <peer> /group <id> /older /newer /find <id> /clear \
                 /recall <id> /delete <id..> /pin <id> /unpin <id> /mute /quit"
            );
        }
        _ => {
            if session.send_chat(line, Vec::new(), None).is_err() {
                eprintln!("open a conversation first: /open <peer> or /group <id>");
            }
        }
    }
    true
}

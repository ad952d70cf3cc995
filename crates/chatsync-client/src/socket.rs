use std::time::Duration;

use anyhow::Context;
use chatsync_core::EventBus;
use chatsync_types::events::{ClientCommand, ServerEvent};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Connect to the chat socket and pump frames until the server closes, the
/// outbound queue is dropped, or `shutdown` fires.
pub async fn run_socket(
    url: &str,
    heartbeat: Duration,
    bus: EventBus,
    outbound: mpsc::UnboundedReceiver<ClientCommand>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let (stream, _) = tokio_tungstenite::connect_async(url)
        .await
        .with_context(|| format!("connect to {url}"))?;
    info!("connected to {}", url);
    let result = drive(stream, heartbeat, bus, outbound, shutdown).await;
    info!("disconnected from {}", url);
    result
}

/// Connection loop over any websocket-shaped stream.
pub async fn drive<S>(
    stream: S,
    heartbeat: Duration,
    bus: EventBus,
    mut outbound: mpsc::UnboundedReceiver<ClientCommand>,
    shutdown: CancellationToken,
) -> anyhow::Result<()>
where
    S: Stream<Item = Result<Message, tungstenite::Error>>
        + Sink<Message, Error = tungstenite::Error>
        + Unpin,
{
    let (mut sender, mut receiver) = stream.split();
    let mut ticker = tokio::time::interval(heartbeat);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("socket shutdown requested");
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            frame = receiver.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e).context("socket read"),
                };
                match serde_json::from_str::<ServerEvent>(&text) {
                    Ok(ServerEvent::Ping) => {
                        trace!("ping from server");
                        send(&mut sender, &ClientCommand::Pong).await?;
                    }
                    Ok(ServerEvent::Pong) => trace!("pong from server"),
                    Ok(event) => {
                        let delivered = bus.publish(event).await;
                        trace!("event delivered to {} subscribers", delivered);
                    }
                    Err(e) => {
                        let raw: String = text.chars().take(200).collect();
                        warn!("unhandled frame: {} -- raw: {}", e, raw);
                    }
                }
            }
            command = outbound.recv() => {
                let Some(command) = command else {
                    debug!("outbound queue closed");
                    break;
                };
                send(&mut sender, &command).await?;
            }
            _ = ticker.tick() => {
                send(&mut sender, &ClientCommand::Ping).await?;
            }
        }
    }
    Ok(())
}

async fn send<S>(sender: &mut S, command: &ClientCommand) -> anyhow::Result<()>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let text = serde_json::to_string(command)?;
    sender
        .send(Message::Text(text.into()))
        .await
        .context("socket write")
}

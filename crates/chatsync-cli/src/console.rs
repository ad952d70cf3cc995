use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use chatsync_core::collaborators::{ConversationList, SoundCue};
use chatsync_core::{Notice, NoticeLevel, Notifier, Timeline, TimelineSource};
use chatsync_types::models::{ConversationKey, Message, MessageStatus};
use tracing::debug;

/// Notices go to stderr so they do not interleave with the timeline.
pub struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn notify(&self, notice: Notice) {
        let tag = match notice.level {
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        };
        eprintln!("[{tag}] {}", notice.text);
    }
}

/// Rings the terminal bell for incoming messages.
pub struct TerminalBell {
    muted: AtomicBool,
}

impl TerminalBell {
    pub fn new(muted: bool) -> Self {
        Self {
            muted: AtomicBool::new(muted),
        }
    }

    /// Flip the mute flag; returns whether it is now muted.
    pub fn toggle(&self) -> bool {
        !self.muted.fetch_xor(true, Ordering::Relaxed)
    }
}

impl SoundCue for TerminalBell {
    fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    fn play(&self) {
        let mut out = std::io::stdout();
        let _ = out.write_all(b"\x07");
        let _ = out.flush();
    }
}

/// There is no sidebar in the terminal; unread resets are only logged.
pub struct NoSidebar;

impl ConversationList for NoSidebar {
    fn reset_unread(&self, key: &ConversationKey) {
        debug!("unread cleared for {}", key);
    }
}

fn status_mark(status: MessageStatus) -> &'static str {
    match status {
        MessageStatus::Sent => "·",
        MessageStatus::Delivered => "✓",
        MessageStatus::Received => "✓",
        MessageStatus::Seen => "✓✓",
    }
}

fn render_line(message: &Message, local_user: &str, highlighted: bool) -> String {
    let who = if message.sender_id == local_user {
        "you"
    } else {
        message.sender_id.as_str()
    };
    let body = if message.is_recalled() {
        "(message recalled)".to_string()
    } else if !message.media.is_empty() {
        format!("{} [{} attachment(s)]", message.content, message.media.len())
    } else {
        message.content.clone()
    };
    let marker = if highlighted { ">>" } else { "  " };
    let status = if message.sender_id == local_user {
        status_mark(message.status)
    } else {
        ""
    };
    format!(
        "{marker} {} {who}: {body} {status}  ({})",
        message.created_at.format("%H:%M"),
        message.id
    )
}

/// Print the tail of the timeline.
pub fn render(timeline: &Timeline, local_user: &str, tail: usize) {
    let Some(key) = &timeline.key else {
        println!("-- no conversation open --");
        return;
    };
    let source = match timeline.source {
        TimelineSource::History => "history",
        TimelineSource::SearchContext => "search",
        TimelineSource::Empty => "loading",
    };
    println!(
        "-- {} [{}] {} messages{}{} --",
        key,
        source,
        timeline.messages.len(),
        if timeline.has_more { ", /older for more" } else { "" },
        if timeline.has_newer { ", /newer for more" } else { "" },
    );
    if let Some(pin) = timeline.pinned.entries().first() {
        println!("   pinned: {}", pin.content);
    }
    let skip = timeline.messages.len().saturating_sub(tail);
    for message in timeline.messages.iter().skip(skip) {
        let highlighted = timeline.highlight.as_ref() == Some(&message.id);
        println!("{}", render_line(message, local_user, highlighted));
    }
    if timeline.left_group {
        println!("-- you left this group --");
    }
}

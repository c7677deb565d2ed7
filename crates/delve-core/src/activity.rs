//! Activity tracking and the per-session event stream.
//!
//! Every externally visible step of a research session is reported as an
//! [`Activity`] through an [`ActivityTracker`]. The tracker is the sole
//! caller-facing progress channel; `tracing` logs are operator-facing and
//! carry no contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::models::RagDocument;

/// The pipeline stage an activity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityType {
    Planning,
    Search,
    Extract,
    Analyze,
    Generate,
    ImageAnalysis,
    RagRetrieval,
    RagStorage,
}

/// Outcome qualifier on an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Pending,
    Complete,
    Warning,
    Error,
    Info,
}

/// One progress entry in a session's activity feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    pub status: ActivityStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Events streamed to the caller over the session channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ResearchEvent {
    Activity(Activity),
    /// Documents surfaced by a RAG retrieval, forwarded so callers can show
    /// provenance.
    RagDocuments { documents: Vec<RagDocument> },
    /// The final report body, emitted once at the end of a session.
    Report { content: String },
}

/// Receiving half of a session's event stream.
pub type EventSink = mpsc::UnboundedReceiver<ResearchEvent>;

/// Cheap-to-clone handle that feeds a session's event stream.
///
/// Send failures mean the receiver was dropped; the session keeps running
/// and the events are discarded.
#[derive(Debug, Clone)]
pub struct ActivityTracker {
    sender: mpsc::UnboundedSender<ResearchEvent>,
}

impl ActivityTracker {
    /// Creates a tracker and the sink the caller drains.
    pub fn channel() -> (Self, EventSink) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Records one activity with the current timestamp.
    pub fn add(&self, activity_type: ActivityType, status: ActivityStatus, message: impl Into<String>) {
        let activity = Activity {
            activity_type,
            status,
            message: message.into(),
            timestamp: Utc::now(),
        };
        self.emit(ResearchEvent::Activity(activity));
    }

    /// Sends a raw event. A closed channel is not an error.
    pub fn emit(&self, event: ResearchEvent) {
        let _ = self.sender.send(event);
    }
}

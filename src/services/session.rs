//! Browser session registry
//!
//! Each session owns the prompt a visitor is building, the event channel its
//! SSE stream drains, and the cancellation token of the run currently in
//! flight (if any).

use crate::types::{Prompt, StreamEvent};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const EVENT_CHANNEL_CAPACITY: usize = 100;

pub struct SessionManager {
    sessions: HashMap<String, Session>,
}

pub struct Session {
    pub id: String,
    pub prompt: Prompt,
    pub created_at: DateTime<Utc>,
    event_sender: mpsc::Sender<StreamEvent>,
    event_receiver: Option<mpsc::Receiver<StreamEvent>>,
    run_cancel: Option<CancellationToken>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    /// Look up a session, creating it on first sight.
    pub fn get_or_create(&mut self, id: &str) -> &mut Session {
        self.sessions
            .entry(id.to_string())
            .or_insert_with(|| Session::new(id))
    }

    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Session> {
        self.sessions.get_mut(id)
    }

    /// Take the event receiver for SSE streaming.
    ///
    /// A receiver can only be taken once; on reconnect a fresh channel is
    /// wired in so the new stream sees events from the next run onward.
    pub fn take_receiver(&mut self, id: &str) -> mpsc::Receiver<StreamEvent> {
        let session = self.get_or_create(id);
        match session.event_receiver.take() {
            Some(receiver) => receiver,
            None => {
                let (sender, receiver) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
                session.event_sender = sender;
                receiver
            }
        }
    }

    /// Get a sender feeding the session's event stream.
    pub fn sender(&mut self, id: &str) -> mpsc::Sender<StreamEvent> {
        self.get_or_create(id).event_sender.clone()
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Drop the oldest sessions until at most `max` remain.
    pub fn prune_to(&mut self, max: usize) {
        while self.sessions.len() > max {
            let oldest = self
                .sessions
                .values()
                .min_by_key(|s| s.created_at)
                .map(|s| s.id.clone());
            match oldest {
                Some(id) => {
                    tracing::debug!("pruning session {}", id);
                    self.sessions.remove(&id);
                }
                None => break,
            }
        }
    }
}

impl Session {
    fn new(id: &str) -> Self {
        let (event_sender, event_receiver) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            id: id.to_string(),
            prompt: Prompt::new(),
            created_at: Utc::now(),
            event_sender,
            event_receiver: Some(event_receiver),
            run_cancel: None,
        }
    }

    /// Start a new run: cancel whatever was running and mint a fresh token.
    pub fn begin_run(&mut self) -> CancellationToken {
        if let Some(previous) = self.run_cancel.take() {
            previous.cancel();
        }
        let cancel = CancellationToken::new();
        self.run_cancel = Some(cancel.clone());
        cancel
    }

    /// Cancel the run in flight. Returns whether there was one to cancel.
    pub fn stop_run(&mut self) -> bool {
        match self.run_cancel.take() {
            Some(cancel) => {
                cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn reset_prompt(&mut self) {
        self.stop_run();
        self.prompt = Prompt::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_get() {
        let mut manager = SessionManager::new();
        manager.get_or_create("abc");
        assert!(manager.get("abc").is_some());
        assert!(manager.get("missing").is_none());
        assert_eq!(manager.count(), 1);
    }

    #[test]
    fn test_receiver_taken_once_then_rewired() {
        let mut manager = SessionManager::new();
        let _first = manager.take_receiver("abc");

        // The second take gets a fresh channel wired to the current sender.
        let mut second = manager.take_receiver("abc");
        let sender = manager.sender("abc");
        sender
            .try_send(StreamEvent::error("ping".into()))
            .expect("send succeeds");
        assert!(second.try_recv().is_ok());
    }

    #[test]
    fn test_begin_run_cancels_previous_run() {
        let mut manager = SessionManager::new();
        let session = manager.get_or_create("abc");

        let first = session.begin_run();
        assert!(!first.is_cancelled());
        let second = session.begin_run();
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
    }

    #[test]
    fn test_stop_run_reports_whether_a_run_existed() {
        let mut manager = SessionManager::new();
        let session = manager.get_or_create("abc");

        assert!(!session.stop_run());
        let cancel = session.begin_run();
        assert!(session.stop_run());
        assert!(cancel.is_cancelled());
        assert!(!session.stop_run());
    }

    #[test]
    fn test_reset_clears_prompt_and_stops_run() {
        let mut manager = SessionManager::new();
        let session = manager.get_or_create("abc");
        session.prompt = Prompt::from_text("the quick brown");
        let cancel = session.begin_run();

        session.reset_prompt();
        assert!(session.prompt.is_empty());
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn test_prune_removes_oldest_sessions() {
        let mut manager = SessionManager::new();
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            let session = manager.get_or_create(id);
            session.created_at = Utc::now() - chrono::Duration::seconds(100 - i as i64);
        }

        manager.prune_to(2);
        assert_eq!(manager.count(), 2);
        assert!(manager.get("a").is_none());
        assert!(manager.get("b").is_some());
        assert!(manager.get("c").is_some());
    }
}

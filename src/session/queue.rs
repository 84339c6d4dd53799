//! Per-session command queue.
//!
//! Pending commands are kept ordered by priority (higher first), then by
//! arrival. At most one command is processing at a time. Every operation is
//! a single short critical section on a `std::sync::Mutex`, never held across
//! an await.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::QueueError;

/// Lifecycle of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// A message waiting for, or undergoing, execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub id: String,
    pub session_id: String,
    pub text: String,
    pub priority: i32,
    pub enqueued_at: DateTime<Utc>,
    pub status: CommandStatus,
}

/// Point-in-time view of a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub session_id: String,
    /// Command currently executing
    pub processing: Option<Command>,
    /// Pending commands in dequeue order
    pub pending: Vec<Command>,
    pub pending_count: usize,
}

/// What happened to a newly enqueued command.
#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    /// The queue was idle; the command is now processing and the caller must run it.
    Started(Command),
    /// This command waits at 1-based `position`.
    ///
    /// `started` is set when the queue was idle with a backlog: the head of
    /// the backlog was moved to processing and the caller must run it.
    Queued {
        command: Command,
        position: usize,
        started: Option<Command>,
    },
}

#[derive(Debug, Default)]
struct QueueInner {
    pending: Vec<Command>,
    processing: Option<Command>,
}

impl QueueInner {
    /// Insert after every command of equal or higher priority.
    fn insert(&mut self, command: Command) -> usize {
        let idx = self
            .pending
            .iter()
            .position(|c| c.priority < command.priority)
            .unwrap_or(self.pending.len());
        self.pending.insert(idx, command);
        idx
    }

    fn dequeue_next(&mut self) -> Option<Command> {
        if let Some(current) = &self.processing {
            return Some(current.clone());
        }
        if self.pending.is_empty() {
            return None;
        }
        let mut next = self.pending.remove(0);
        next.status = CommandStatus::Processing;
        self.processing = Some(next.clone());
        Some(next)
    }

    fn complete(&mut self, command_id: &str, success: bool) -> Result<Command, QueueError> {
        match &self.processing {
            Some(current) if current.id == command_id => {}
            _ => {
                return Err(QueueError::StaleCompletion {
                    command_id: command_id.to_string(),
                })
            }
        }
        let mut done = self
            .processing
            .take()
            .ok_or_else(|| QueueError::StaleCompletion {
                command_id: command_id.to_string(),
            })?;
        done.status = if success {
            CommandStatus::Completed
        } else {
            CommandStatus::Failed
        };
        Ok(done)
    }
}

/// Serializes the commands of one session.
#[derive(Debug)]
pub struct CommandQueue {
    session_id: String,
    inner: Mutex<QueueInner>,
}

impl CommandQueue {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            inner: Mutex::new(QueueInner::default()),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn new_command(&self, text: &str, priority: i32) -> Command {
        Command {
            id: Uuid::new_v4().to_string(),
            session_id: self.session_id.clone(),
            text: text.to_string(),
            priority,
            enqueued_at: Utc::now(),
            status: CommandStatus::Pending,
        }
    }

    /// Add a pending command in priority order.
    pub fn enqueue(&self, text: &str, priority: i32) -> Command {
        let command = self.new_command(text, priority);
        self.lock().insert(command.clone());
        command
    }

    /// The processing command if there is one, otherwise the head of the
    /// pending list, which becomes processing.
    pub fn dequeue_next(&self) -> Option<Command> {
        self.lock().dequeue_next()
    }

    /// Finish the processing command. Only its id has any effect; stale ids
    /// are ignored and return `false`.
    pub fn complete(&self, command_id: &str, success: bool) -> bool {
        match self.try_complete(command_id, success) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, "{}", e);
                false
            }
        }
    }

    /// Like [`complete`](Self::complete) but reports stale ids as errors and
    /// returns the finished command.
    pub fn try_complete(&self, command_id: &str, success: bool) -> Result<Command, QueueError> {
        self.lock().complete(command_id, success)
    }

    /// Remove a pending command. The processing command cannot be cancelled.
    pub fn cancel(&self, command_id: &str) -> bool {
        let mut inner = self.lock();
        match inner.pending.iter().position(|c| c.id == command_id) {
            Some(idx) => {
                inner.pending.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn status_snapshot(&self) -> QueueStatus {
        let inner = self.lock();
        QueueStatus {
            session_id: self.session_id.clone(),
            processing: inner.processing.clone(),
            pending: inner.pending.clone(),
            pending_count: inner.pending.len(),
        }
    }

    /// Enqueue and, if the queue is idle, start the command, atomically.
    ///
    /// Of two simultaneous calls on an idle queue exactly one gets `Started`.
    pub fn enqueue_or_start(&self, text: &str, priority: i32) -> EnqueueOutcome {
        let command = self.new_command(text, priority);
        let mut inner = self.lock();

        if inner.processing.is_none() && inner.pending.is_empty() {
            let mut started = command;
            started.status = CommandStatus::Processing;
            inner.processing = Some(started.clone());
            return EnqueueOutcome::Started(started);
        }

        let idx = inner.insert(command.clone());
        if inner.processing.is_none() {
            // Idle with a backlog: start the head, which may be this command.
            if let Some(head) = inner.dequeue_next() {
                if head.id == command.id {
                    return EnqueueOutcome::Started(head);
                }
                let position = inner
                    .pending
                    .iter()
                    .position(|c| c.id == command.id)
                    .map_or(idx, |i| i + 1);
                return EnqueueOutcome::Queued {
                    command,
                    position,
                    started: Some(head),
                };
            }
        }

        EnqueueOutcome::Queued {
            command,
            position: idx + 1,
            started: None,
        }
    }

    /// Complete the processing command and start the next one, atomically.
    ///
    /// A stale id completes nothing; the queue still reports what should run
    /// next.
    pub fn complete_and_next(&self, command_id: &str, success: bool) -> Option<Command> {
        let mut inner = self.lock();
        if let Err(e) = inner.complete(command_id, success) {
            tracing::warn!(session_id = %self.session_id, "{}", e);
        }
        inner.dequeue_next()
    }

    pub fn is_processing(&self) -> bool {
        self.lock().processing.is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_priority_then_arrival_order() {
        let queue = CommandQueue::new("s1");
        queue.enqueue("low-1", 0);
        queue.enqueue("high-1", 5);
        queue.enqueue("low-2", 0);
        queue.enqueue("mid", 1);
        queue.enqueue("high-2", 5);

        let mut order = Vec::new();
        while let Some(command) = queue.dequeue_next() {
            order.push(command.text.clone());
            assert!(queue.complete(&command.id, true));
        }
        assert_eq!(order, vec!["high-1", "high-2", "mid", "low-1", "low-2"]);
    }

    #[test]
    fn test_dequeue_is_idempotent_while_processing() {
        let queue = CommandQueue::new("s1");
        queue.enqueue("a", 0);
        queue.enqueue("b", 0);

        let first = queue.dequeue_next().unwrap();
        let again = queue.dequeue_next().unwrap();
        assert_eq!(first, again);
        assert_eq!(first.status, CommandStatus::Processing);
        assert_eq!(queue.pending_count(), 1);
    }

    #[test]
    fn test_stale_completion_is_noop() {
        let queue = CommandQueue::new("s1");
        let a = queue.enqueue("a", 0);
        queue.enqueue("b", 0);
        let running = queue.dequeue_next().unwrap();
        assert_eq!(running.id, a.id);

        assert!(!queue.complete("not-a-real-id", true));
        assert!(matches!(
            queue.try_complete("not-a-real-id", true),
            Err(QueueError::StaleCompletion { .. })
        ));
        let status = queue.status_snapshot();
        assert_eq!(status.processing.unwrap().id, a.id);
        assert_eq!(status.pending_count, 1);

        let done = queue.try_complete(&a.id, false).unwrap();
        assert_eq!(done.status, CommandStatus::Failed);
        // completing twice is stale
        assert!(!queue.complete(&a.id, true));
    }

    #[test]
    fn test_cancel_only_pending() {
        let queue = CommandQueue::new("s1");
        let a = queue.enqueue("a", 0);
        let b = queue.enqueue("b", 0);
        queue.dequeue_next();

        assert!(!queue.cancel(&a.id));
        assert!(queue.cancel(&b.id));
        assert!(!queue.cancel(&b.id));
        assert_eq!(queue.pending_count(), 0);
        assert!(queue.is_processing());
    }

    #[test]
    fn test_enqueue_or_start() {
        let queue = CommandQueue::new("s1");
        let first = match queue.enqueue_or_start("a", 0) {
            EnqueueOutcome::Started(command) => command,
            other => panic!("expected start, got {:?}", other),
        };

        match queue.enqueue_or_start("b", 0) {
            EnqueueOutcome::Queued { position, .. } => assert_eq!(position, 1),
            other => panic!("expected queued, got {:?}", other),
        }
        match queue.enqueue_or_start("c", 3) {
            EnqueueOutcome::Queued { position, .. } => assert_eq!(position, 1),
            other => panic!("expected queued, got {:?}", other),
        }

        let next = queue.complete_and_next(&first.id, true).unwrap();
        assert_eq!(next.text, "c");
        let next = queue.complete_and_next(&next.id, true).unwrap();
        assert_eq!(next.text, "b");
        assert!(queue.complete_and_next(&next.id, true).is_none());
        assert!(!queue.is_processing());
    }

    #[test]
    fn test_enqueue_or_start_hands_over_backlog_head() {
        let queue = CommandQueue::new("s1");
        let backlog = queue.enqueue("hi", 5);

        let (command, position, started) = match queue.enqueue_or_start("lo", 0) {
            EnqueueOutcome::Queued {
                command,
                position,
                started,
            } => (command, position, started),
            other => panic!("expected queued, got {:?}", other),
        };
        assert_eq!(command.text, "lo");
        assert_eq!(position, 1);
        let started = started.expect("backlog head must be handed to the caller");
        assert_eq!(started.id, backlog.id);
        assert_eq!(started.status, CommandStatus::Processing);
        assert_eq!(queue.status_snapshot().processing.unwrap().id, backlog.id);

        // a higher priority arrival on an idle backlog starts itself
        let queue = CommandQueue::new("s2");
        queue.enqueue("low", 0);
        assert!(matches!(
            queue.enqueue_or_start("urgent", 9),
            EnqueueOutcome::Started(c) if c.text == "urgent"
        ));
        assert_eq!(queue.pending_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_single_processing_under_contention() {
        let queue = Arc::new(CommandQueue::new("s1"));
        let mut handles = Vec::new();
        for i in 0..32 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                matches!(
                    queue.enqueue_or_start(&format!("m{}", i), 0),
                    EnqueueOutcome::Started(_)
                )
            }));
        }

        let mut started = 0;
        for handle in handles {
            if handle.await.unwrap() {
                started += 1;
            }
        }
        assert_eq!(started, 1);
        assert_eq!(queue.pending_count(), 31);
    }
}

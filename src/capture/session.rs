//! # Connection Session State Machine
//!
//! One [`CaptureSession`] per connection. Messages arrive already tagged
//! with their kind ([`ClientMessage::Audio`] or [`ClientMessage::Name`]);
//! the machine transitions on that declared kind and refuses messages that
//! do not fit its state instead of reinterpreting them.
//!
//! ## Transitions:
//! - `ExpectingAudio` + Audio → store capture → `ExpectingName`
//!   (also on a bad payload or write failure, so the client's following
//!   name is consumed by the failed session and the protocol stays in step)
//! - `ExpectingAudio` + Name → `CommitFailure`, state unchanged
//! - `ExpectingName` + Audio → `UnexpectedMessage`, pending capture kept
//! - `ExpectingName` + Name → commit (or report the earlier failure) →
//!   `ExpectingAudio`

use crate::audio::container::ContainerEncoder;
use crate::audio::pcm;
use crate::capture::commit;
use crate::capture::scratch::ScratchArtifact;
use crate::capture::store::CaptureStore;
use crate::error::CaptureError;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A data message from the client with its declared kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Little-endian `f32` samples
    Audio(Vec<u8>),
    /// Base name for the pending capture
    Name(String),
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Audio(_) => "audio",
            ClientMessage::Name(_) => "name",
        }
    }
}

/// Successful outcome of one message.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Audio stored in the session's scratch artifact
    Captured {
        sequence: u64,
        samples: usize,
        bytes: u64,
    },
    /// Capture moved to its final name
    Committed {
        sequence: u64,
        name: String,
        file: PathBuf,
        samples: usize,
    },
}

#[derive(Debug)]
enum PendingCapture {
    Ready {
        scratch: ScratchArtifact,
        samples: usize,
    },
    /// The audio half of the session failed; holds the cause.
    Failed(String),
}

#[derive(Debug)]
enum SessionState {
    ExpectingAudio,
    ExpectingName {
        sequence: u64,
        pending: PendingCapture,
    },
}

pub struct CaptureSession {
    connection_id: Uuid,
    store: CaptureStore,
    encoder: ContainerEncoder,
    message_count: u64,
    next_sequence: u64,
    state: SessionState,
}

impl CaptureSession {
    pub fn new(connection_id: Uuid, store: CaptureStore, encoder: ContainerEncoder) -> Self {
        Self {
            connection_id,
            store,
            encoder,
            message_count: 0,
            next_sequence: 0,
            state: SessionState::ExpectingAudio,
        }
    }

    /// Data messages received so far, whatever their outcome.
    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    #[cfg(test)]
    pub fn is_expecting_audio(&self) -> bool {
        matches!(self.state, SessionState::ExpectingAudio)
    }

    /// Process one message to completion.
    pub async fn handle(&mut self, message: ClientMessage) -> Result<SessionEvent, CaptureError> {
        self.message_count += 1;
        debug!(
            connection_id = %self.connection_id,
            message_count = self.message_count,
            kind = message.kind(),
            "Handling client message"
        );

        match message {
            ClientMessage::Audio(data) => self.receive_audio(&data).await,
            ClientMessage::Name(name) => self.receive_name(&name).await,
        }
    }

    async fn receive_audio(&mut self, data: &[u8]) -> Result<SessionEvent, CaptureError> {
        if let SessionState::ExpectingName { sequence, .. } = &self.state {
            return Err(CaptureError::UnexpectedMessage(format!(
                "capture {} is still waiting for its name; audio message dropped",
                sequence
            )));
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;

        match self.store_capture(sequence, data).await {
            Ok((scratch, samples)) => {
                let bytes = scratch.bytes_written();
                self.state = SessionState::ExpectingName {
                    sequence,
                    pending: PendingCapture::Ready { scratch, samples },
                };
                Ok(SessionEvent::Captured {
                    sequence,
                    samples,
                    bytes,
                })
            }
            Err(e) => {
                warn!(
                    connection_id = %self.connection_id,
                    sequence,
                    error = %e,
                    "Capture failed, awaiting name to close the session"
                );
                self.state = SessionState::ExpectingName {
                    sequence,
                    pending: PendingCapture::Failed(e.to_string()),
                };
                Err(e)
            }
        }
    }

    async fn store_capture(
        &self,
        sequence: u64,
        data: &[u8],
    ) -> Result<(ScratchArtifact, usize), CaptureError> {
        let samples = pcm::decode_f32le(data)?;
        let mut scratch =
            ScratchArtifact::new(self.store.scratch_path(self.connection_id, sequence));

        let container = self
            .encoder
            .encode(&samples)
            .map_err(|e| CaptureError::storage(scratch.path(), e))?;

        if let Err(e) = scratch.append(&container).await {
            scratch.discard().await;
            return Err(e);
        }

        debug!(
            connection_id = %self.connection_id,
            sequence,
            samples = samples.len(),
            "Capture stored in scratch"
        );
        Ok((scratch, samples.len()))
    }

    async fn receive_name(&mut self, name: &str) -> Result<SessionEvent, CaptureError> {
        match std::mem::replace(&mut self.state, SessionState::ExpectingAudio) {
            SessionState::ExpectingAudio => Err(CaptureError::CommitFailure(format!(
                "no pending capture to name '{}'",
                name
            ))),
            SessionState::ExpectingName {
                sequence,
                pending: PendingCapture::Failed(cause),
            } => Err(CaptureError::CommitFailure(format!(
                "capture {} was not stored ({}); '{}' not written",
                sequence, cause, name
            ))),
            SessionState::ExpectingName {
                sequence,
                pending: PendingCapture::Ready { scratch, samples },
            } => {
                let file = commit::commit(&self.store, scratch, name).await?;
                Ok(SessionEvent::Committed {
                    sequence,
                    name: name.to_string(),
                    file,
                    samples,
                })
            }
        }
    }

    /// End of connection. A capture that never got its name is deleted.
    ///
    /// Returns the sequence of the discarded capture, if any.
    pub async fn close(self) -> Option<u64> {
        match self.state {
            SessionState::ExpectingName {
                sequence,
                pending: PendingCapture::Ready { scratch, .. },
            } => {
                info!(
                    connection_id = %self.connection_id,
                    sequence,
                    "Discarding uncommitted capture"
                );
                scratch.discard().await;
                Some(sequence)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::container;
    use crate::capture::store::temp_store;
    use crate::config::SampleFormat;

    const TOLERANCE: f32 = 1.0 / 32767.0;

    fn payload(samples: &[f32]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn new_session(store: &CaptureStore) -> CaptureSession {
        CaptureSession::new(
            Uuid::new_v4(),
            store.clone(),
            ContainerEncoder::new(44_100, SampleFormat::Int16),
        )
    }

    async fn read_capture(store: &CaptureStore, name: &str) -> Vec<f32> {
        let bytes = tokio::fs::read(store.final_path(name)).await.unwrap();
        let decoded = container::decode(&bytes).unwrap();
        assert_eq!(decoded.channels, 1);
        decoded.samples
    }

    fn assert_samples(actual: &[f32], expected: &[f32]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() <= TOLERANCE, "{} vs {}", a, e);
        }
    }

    #[tokio::test]
    async fn test_take1_scenario() {
        let store = temp_store().await;
        let mut session = new_session(&store);

        let captured = session
            .handle(ClientMessage::Audio(payload(&[0.5, -0.5])))
            .await
            .unwrap();
        assert!(matches!(
            captured,
            SessionEvent::Captured { sequence: 0, samples: 2, .. }
        ));
        assert!(!session.is_expecting_audio());

        let committed = session
            .handle(ClientMessage::Name("take1".to_string()))
            .await
            .unwrap();
        match committed {
            SessionEvent::Committed { name, file, samples, .. } => {
                assert_eq!(name, "take1");
                assert_eq!(file, store.output_dir().join("take1.wav"));
                assert_eq!(samples, 2);
            }
            other => panic!("expected Committed, got {:?}", other),
        }

        assert_samples(&read_capture(&store, "take1").await, &[0.5, -0.5]);
        assert!(session.is_expecting_audio());
        assert_eq!(session.message_count(), 2);
        assert_eq!(store.pending_scratch_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_n_pairs_commit_n_files() {
        let store = temp_store().await;
        let mut session = new_session(&store);
        let n = 5;

        for i in 0..n {
            let level = (i as f32 + 1.0) / 10.0;
            session
                .handle(ClientMessage::Audio(payload(&[level, -level, level])))
                .await
                .unwrap();
            session
                .handle(ClientMessage::Name(format!("take{}", i)))
                .await
                .unwrap();
        }

        let names = store.committed_captures().await.unwrap();
        assert_eq!(names.len(), n);
        for i in 0..n {
            let level = (i as f32 + 1.0) / 10.0;
            let samples = read_capture(&store, &format!("take{}", i)).await;
            assert_samples(&samples, &[level, -level, level]);
        }
        assert_eq!(session.message_count(), 2 * n as u64);
    }

    #[tokio::test]
    async fn test_name_first_is_commit_failure() {
        let store = temp_store().await;
        let mut session = new_session(&store);

        let result = session.handle(ClientMessage::Name("take1".to_string())).await;
        assert!(matches!(result, Err(CaptureError::CommitFailure(_))));
        assert!(store.committed_captures().await.unwrap().is_empty());
        assert!(session.is_expecting_audio());
        assert_eq!(session.message_count(), 1);

        // The connection keeps working afterwards.
        session.handle(ClientMessage::Audio(payload(&[0.1]))).await.unwrap();
        session.handle(ClientMessage::Name("take1".to_string())).await.unwrap();
        assert_eq!(store.committed_captures().await.unwrap(), vec!["take1"]);
    }

    #[tokio::test]
    async fn test_double_audio_does_not_bleed_into_next_session() {
        let store = temp_store().await;
        let mut session = new_session(&store);

        session.handle(ClientMessage::Audio(payload(&[0.25, 0.25]))).await.unwrap();
        let second = session.handle(ClientMessage::Audio(payload(&[-0.75]))).await;
        assert!(matches!(second, Err(CaptureError::UnexpectedMessage(_))));

        session.handle(ClientMessage::Name("first".to_string())).await.unwrap();
        session.handle(ClientMessage::Audio(payload(&[0.6, -0.6, 0.0]))).await.unwrap();
        session.handle(ClientMessage::Name("second".to_string())).await.unwrap();

        assert_samples(&read_capture(&store, "first").await, &[0.25, 0.25]);
        assert_samples(&read_capture(&store, "second").await, &[0.6, -0.6, 0.0]);
        assert_eq!(session.message_count(), 5);
    }

    #[tokio::test]
    async fn test_same_name_keeps_later_capture() {
        let store = temp_store().await;
        let mut session = new_session(&store);

        session.handle(ClientMessage::Audio(payload(&[0.1, 0.2]))).await.unwrap();
        session.handle(ClientMessage::Name("same".to_string())).await.unwrap();
        session.handle(ClientMessage::Audio(payload(&[-0.9]))).await.unwrap();
        session.handle(ClientMessage::Name("same".to_string())).await.unwrap();

        assert_eq!(store.committed_captures().await.unwrap(), vec!["same"]);
        assert_samples(&read_capture(&store, "same").await, &[-0.9]);
    }

    #[tokio::test]
    async fn test_invalid_payload_fails_its_session_only() {
        let store = temp_store().await;
        let mut session = new_session(&store);

        let bad = session.handle(ClientMessage::Audio(vec![0u8; 7])).await;
        assert!(matches!(bad, Err(CaptureError::InvalidPayload(_))));
        assert!(!session.is_expecting_audio());

        let commit = session.handle(ClientMessage::Name("broken".to_string())).await;
        assert!(matches!(commit, Err(CaptureError::CommitFailure(_))));
        assert!(store.committed_captures().await.unwrap().is_empty());
        assert_eq!(store.pending_scratch_count().await.unwrap(), 0);

        session.handle(ClientMessage::Audio(payload(&[0.3]))).await.unwrap();
        session.handle(ClientMessage::Name("fine".to_string())).await.unwrap();
        assert_eq!(store.committed_captures().await.unwrap(), vec!["fine"]);
    }

    #[tokio::test]
    async fn test_storage_failure_marks_session_failed() {
        let store = temp_store().await;
        tokio::fs::remove_dir_all(store.scratch_dir()).await.unwrap();
        let mut session = new_session(&store);

        let result = session.handle(ClientMessage::Audio(payload(&[0.5]))).await;
        assert!(matches!(result, Err(CaptureError::StorageFailure { .. })));

        let commit = session.handle(ClientMessage::Name("lost".to_string())).await;
        assert!(matches!(commit, Err(CaptureError::CommitFailure(_))));
        assert!(store.committed_captures().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_connections_are_isolated() {
        let store = temp_store().await;
        let mut alice = new_session(&store);
        let mut bob = new_session(&store);

        alice.handle(ClientMessage::Audio(payload(&[0.4, 0.4]))).await.unwrap();
        bob.handle(ClientMessage::Audio(payload(&[-0.2]))).await.unwrap();
        assert_eq!(store.pending_scratch_count().await.unwrap(), 2);

        bob.handle(ClientMessage::Name("bob".to_string())).await.unwrap();
        alice.handle(ClientMessage::Name("alice".to_string())).await.unwrap();

        assert_samples(&read_capture(&store, "alice").await, &[0.4, 0.4]);
        assert_samples(&read_capture(&store, "bob").await, &[-0.2]);
    }

    #[tokio::test]
    async fn test_close_discards_uncommitted_capture() {
        let store = temp_store().await;
        let mut session = new_session(&store);

        session.handle(ClientMessage::Audio(payload(&[0.5]))).await.unwrap();
        assert_eq!(store.pending_scratch_count().await.unwrap(), 1);

        assert_eq!(session.close().await, Some(0));
        assert_eq!(store.pending_scratch_count().await.unwrap(), 0);
        assert!(store.committed_captures().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_close_when_idle_discards_nothing() {
        let store = temp_store().await;
        let session = new_session(&store);
        assert_eq!(session.close().await, None);
    }
}

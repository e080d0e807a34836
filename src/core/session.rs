//! One interactive chat session: conversation state, credential access and
//! the single-flight guard around the transport.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::auth::CredentialStore;
use crate::core::conversation::Conversation;
use crate::core::message::Turn;
use crate::core::request::{build_parts, build_request_payload, ImageError, ImageInput};
use crate::core::transport::{ChatTransport, TransportError};

#[derive(Debug)]
pub enum SessionError {
    /// No credential is stored or exported; nothing was sent.
    MissingCredential,
    /// Another exchange is still in flight; this one was rejected.
    Busy,
    InvalidImage(ImageError),
    Transport(TransportError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::MissingCredential => write!(
                f,
                "API key not configured. Run 'gemchat auth' or set GEMINI_API_KEY."
            ),
            SessionError::Busy => write!(f, "Still waiting for the previous response."),
            SessionError::InvalidImage(err) => write!(f, "{err}"),
            SessionError::Transport(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::InvalidImage(err) => Some(err),
            SessionError::Transport(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        SessionError::Transport(err)
    }
}

/// The two turns appended by one successful send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub user: Turn,
    pub model: Turn,
}

/// Clears the in-flight flag however the exchange ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ChatSession {
    credentials: CredentialStore,
    transport: Arc<dyn ChatTransport>,
    conversation: Mutex<Conversation>,
    in_flight: AtomicBool,
}

impl ChatSession {
    pub fn new(credentials: CredentialStore, transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            credentials,
            transport,
            conversation: Mutex::new(Conversation::new()),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn turns(&self) -> Vec<Turn> {
        self.conversation().snapshot().to_vec()
    }

    pub fn turn_count(&self) -> usize {
        self.conversation().len()
    }

    fn conversation(&self) -> MutexGuard<'_, Conversation> {
        self.conversation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Sends one user message with the full history as context.
    ///
    /// Returns `Ok(None)` without touching the network when there is nothing
    /// to send. On success the user turn and the model turn are appended, in
    /// that order; on any error the conversation is left as it was.
    pub async fn send(
        &self,
        text: Option<&str>,
        image: Option<&ImageInput>,
    ) -> Result<Option<Exchange>, SessionError> {
        let parts = build_parts(text, image);
        if parts.is_empty() {
            return Ok(None);
        }

        if let Some(image) = image {
            image.validate().map_err(SessionError::InvalidImage)?;
        }

        let credential = self
            .credentials
            .resolve()
            .ok_or(SessionError::MissingCredential)?;

        let _in_flight = InFlight::acquire(&self.in_flight).ok_or_else(|| {
            debug!("rejecting send while another exchange is in flight");
            SessionError::Busy
        })?;

        let payload = {
            let conversation = self.conversation();
            build_request_payload(conversation.snapshot(), parts.clone())
        };

        let reply = self.transport.send(&payload, &credential).await?;

        let exchange = Exchange {
            user: Turn::user(parts),
            model: Turn::model_text(reply),
        };
        self.conversation()
            .append_exchange(exchange.user.clone(), exchange.model.clone());
        debug!(turns = self.turn_count(), "exchange completed");

        Ok(Some(exchange))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::GenerateContentRequest;
    use crate::core::message::{Part, Role};
    use crate::core::transport::TransportErrorKind;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct ScriptedTransport {
        calls: AtomicUsize,
        requests: Mutex<Vec<GenerateContentRequest>>,
        failure: Option<TransportError>,
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn send(
            &self,
            payload: &GenerateContentRequest,
            _credential: &str,
        ) -> Result<String, TransportError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.requests.lock().unwrap().push(payload.clone());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            match &self.failure {
                Some(err) => Err(err.clone()),
                None => Ok(format!("reply {call}")),
            }
        }
    }

    fn keyed_store() -> CredentialStore {
        let store = CredentialStore::in_memory();
        store.set("AIzaSyA1234567890abcdefghijklmnop").unwrap();
        store
    }

    #[tokio::test]
    async fn successful_send_appends_user_then_model() {
        let transport = Arc::new(ScriptedTransport::default());
        let session = ChatSession::new(keyed_store(), transport.clone());

        let exchange = session
            .send(Some("  Hello "), None)
            .await
            .expect("send succeeds")
            .expect("exchange produced");

        assert_eq!(exchange.user.parts, vec![Part::text("Hello")]);
        assert_eq!(exchange.model.text(), "reply 1");

        let turns = session.turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].role, Role::Model);

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[0].contents.len(), 1);
        assert_eq!(requests[0].contents[0].role, "user");
    }

    #[tokio::test]
    async fn second_send_carries_full_history() {
        let transport = Arc::new(ScriptedTransport::default());
        let session = ChatSession::new(keyed_store(), transport.clone());

        session.send(Some("first"), None).await.unwrap();
        session.send(Some("second"), None).await.unwrap();

        assert_eq!(session.turn_count(), 4);
        let requests = transport.requests.lock().unwrap();
        let roles: Vec<&str> = requests[1]
            .contents
            .iter()
            .map(|content| content.role.as_str())
            .collect();
        assert_eq!(roles, vec!["user", "model", "user"]);
    }

    #[tokio::test]
    async fn blank_input_is_a_no_op() {
        let transport = Arc::new(ScriptedTransport::default());
        let session = ChatSession::new(CredentialStore::in_memory(), transport.clone());

        let outcome = session.send(Some("   "), None).await.expect("no error");
        assert!(outcome.is_none());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert_eq!(session.turn_count(), 0);
    }

    #[tokio::test]
    async fn missing_credential_fails_before_network() {
        let transport = Arc::new(ScriptedTransport::default());
        let session = ChatSession::new(CredentialStore::in_memory(), transport.clone());

        // Environment fallback would mask the missing key.
        if std::env::var(crate::auth::API_KEY_ENV).is_ok() {
            return;
        }

        let err = session.send(Some("Hello"), None).await.unwrap_err();
        assert!(matches!(err, SessionError::MissingCredential));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn invalid_image_is_rejected_before_network() {
        let transport = Arc::new(ScriptedTransport::default());
        let session = ChatSession::new(keyed_store(), transport.clone());
        let pdf = ImageInput::new(vec![1, 2], Some("application/pdf".to_string()));

        let err = session.send(None, Some(&pdf)).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidImage(_)));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_send_leaves_conversation_unchanged() {
        let transport = Arc::new(ScriptedTransport {
            failure: Some(TransportError::classify(
                "Resource has been exhausted (e.g. check quota).",
            )),
            ..ScriptedTransport::default()
        });
        let session = ChatSession::new(keyed_store(), transport.clone());

        let err = session.send(Some("Hello"), None).await.unwrap_err();
        match err {
            SessionError::Transport(err) => {
                assert_eq!(err.kind, TransportErrorKind::QuotaExceeded)
            }
            other => panic!("expected transport error, got {:?}", other),
        }
        assert_eq!(session.turn_count(), 0);
        assert!(!session.is_busy(), "guard released after failure");

        // The session stays usable; the next attempt reaches the transport.
        let _ = session.send(Some("Hello again"), None).await;
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_send_is_rejected_while_in_flight() {
        let gate = Arc::new(Notify::new());
        let transport = Arc::new(ScriptedTransport {
            gate: Some(gate.clone()),
            ..ScriptedTransport::default()
        });
        let session = Arc::new(ChatSession::new(keyed_store(), transport.clone()));

        let first = {
            let session = session.clone();
            tokio::spawn(async move { session.send(Some("first"), None).await })
        };

        while transport.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        assert!(session.is_busy());

        let second = session.send(Some("second"), None).await;
        assert!(matches!(second, Err(SessionError::Busy)));

        gate.notify_one();
        let first = first.await.expect("task joins").expect("first send succeeds");
        assert!(first.is_some());

        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.turn_count(), 2);
        assert!(!session.is_busy());
    }
}

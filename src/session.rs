use crate::conversation::{ConversationLog, Turn};
use crate::llm::{HistoryEntry, LlmClient, ProviderError};
use chrono::{DateTime, Local};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Why a submission was turned away before reaching the model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("message is empty")]
    Empty,
    #[error("still waiting for the previous reply")]
    Busy,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SubmissionPolicy {
    /// Accept empty or whitespace-only messages.
    pub allow_empty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    AwaitingResponse,
}

/// Transient failure banner. Lives until the next submission starts.
#[derive(Debug, Clone)]
pub struct Notice {
    pub message: String,
    pub at: DateTime<Local>,
}

#[derive(Debug)]
pub enum TurnOutcome {
    Replied(String),
    Failed(ProviderError),
}

/// A user turn that has been logged and still needs its reply.
#[must_use]
#[derive(Debug)]
pub struct PendingTurn {
    message: String,
}

/// State of one interactive session: its log, its cycle state and the
/// current failure notice, if any.
pub struct ChatSession {
    id: Uuid,
    started_at: DateTime<Local>,
    log: ConversationLog,
    notice: Option<Notice>,
    state: CycleState,
    policy: SubmissionPolicy,
}

impl ChatSession {
    pub fn new(policy: SubmissionPolicy) -> Self {
        let session = Self {
            id: Uuid::new_v4(),
            started_at: Local::now(),
            log: ConversationLog::new(),
            notice: None,
            state: CycleState::Idle,
            policy,
        };
        tracing::debug!(session = %session.id, "Session started");
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    #[cfg(test)]
    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn is_awaiting(&self) -> bool {
        self.state == CycleState::AwaitingResponse
    }

    pub fn clear_notice(&mut self) {
        self.notice = None;
    }

    /// Log a user turn, subject to the submission policy.
    pub fn append_user(&mut self, text: &str) -> Result<(), SubmitError> {
        if !self.policy.allow_empty && text.trim().is_empty() {
            return Err(SubmitError::Empty);
        }
        self.log.push(Turn::user(text));
        Ok(())
    }

    pub fn append_assistant(&mut self, text: &str) {
        self.log.push(Turn::assistant(text));
    }

    /// Surface a provider failure without touching the log.
    pub fn record_failure(&mut self, error: &ProviderError) {
        tracing::warn!(
            session = %self.id,
            kind = error.kind.as_str(),
            error = %error.message,
            "Turn failed"
        );
        self.notice = Some(Notice {
            message: error.user_message(),
            at: Local::now(),
        });
    }

    pub fn project_history_excluding_last(&self) -> Vec<HistoryEntry> {
        self.log.project_history_excluding_last()
    }

    /// Idle -> AwaitingResponse. Logs the user turn and clears any notice.
    pub fn begin_turn(&mut self, text: &str) -> Result<PendingTurn, SubmitError> {
        if self.is_awaiting() {
            return Err(SubmitError::Busy);
        }
        self.append_user(text)?;
        self.clear_notice();
        self.state = CycleState::AwaitingResponse;

        Ok(PendingTurn {
            message: text.to_string(),
        })
    }

    /// AwaitingResponse -> Idle. Calls the model and logs its reply, or
    /// records the failure.
    ///
    /// The call ends early with a `ProviderError` when `cancel` fires or
    /// `deadline` elapses.
    pub async fn complete_turn(
        &mut self,
        pending: PendingTurn,
        client: &dyn LlmClient,
        cancel: &CancellationToken,
        deadline: Option<Duration>,
    ) -> TurnOutcome {
        let history = self.project_history_excluding_last();
        tracing::debug!(
            session = %self.id,
            history_len = history.len(),
            model = client.model_name(),
            "Sending turn"
        );

        let result = call_with_limits(
            client.generate(&history, &pending.message),
            cancel,
            deadline,
        )
        .await;
        self.state = CycleState::Idle;

        match result {
            Ok(reply) => {
                self.append_assistant(&reply);
                tracing::info!(session = %self.id, turns = self.log.len(), "Turn completed");
                TurnOutcome::Replied(reply)
            }
            Err(err) => {
                self.record_failure(&err);
                TurnOutcome::Failed(err)
            }
        }
    }

    /// One full request/response cycle.
    pub async fn submit(
        &mut self,
        text: &str,
        client: &dyn LlmClient,
        cancel: &CancellationToken,
        deadline: Option<Duration>,
    ) -> Result<TurnOutcome, SubmitError> {
        let pending = self.begin_turn(text)?;
        Ok(self.complete_turn(pending, client, cancel, deadline).await)
    }
}

async fn call_with_limits<F>(
    call: F,
    cancel: &CancellationToken,
    deadline: Option<Duration>,
) -> Result<String, ProviderError>
where
    F: Future<Output = Result<String, ProviderError>>,
{
    let limited = async {
        match deadline {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or_else(|_| Err(ProviderError::timeout(limit))),
            None => call.await,
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProviderError::cancelled()),
        result = limited => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Role;
    use crate::llm::{ProviderErrorKind, Speaker};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replies from a fixed script and records what it was sent.
    struct ScriptedClient {
        replies: Mutex<VecDeque<Result<String, ProviderError>>>,
        calls: Mutex<Vec<(Vec<HistoryEntry>, String)>>,
    }

    impl ScriptedClient {
        fn new(replies: Vec<Result<String, ProviderError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(Vec<HistoryEntry>, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn generate(
            &self,
            history: &[HistoryEntry],
            new_message: &str,
        ) -> Result<String, ProviderError> {
            self.calls
                .lock()
                .unwrap()
                .push((history.to_vec(), new_message.to_string()));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::unknown("script exhausted")))
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    /// Never answers.
    struct SilentClient;

    #[async_trait]
    impl LlmClient for SilentClient {
        async fn generate(
            &self,
            _history: &[HistoryEntry],
            _new_message: &str,
        ) -> Result<String, ProviderError> {
            std::future::pending().await
        }

        fn model_name(&self) -> &str {
            "silent"
        }
    }

    fn session() -> ChatSession {
        ChatSession::new(SubmissionPolicy::default())
    }

    fn roles_and_content(session: &ChatSession) -> Vec<(Role, &str)> {
        session
            .log()
            .turns()
            .iter()
            .map(|t| (t.role, t.content.as_str()))
            .collect()
    }

    #[tokio::test]
    async fn first_message_is_sent_with_empty_history() {
        let client = ScriptedClient::new(vec![Ok("Hi there".to_string())]);
        let mut session = session();

        let outcome = session
            .submit("Hello", &client, &CancellationToken::new(), None)
            .await
            .unwrap();

        assert!(matches!(outcome, TurnOutcome::Replied(ref r) if r == "Hi there"));
        assert_eq!(client.calls(), vec![(vec![], "Hello".to_string())]);
        assert_eq!(
            roles_and_content(&session),
            vec![(Role::User, "Hello"), (Role::Assistant, "Hi there")]
        );
        assert_eq!(session.state(), CycleState::Idle);
        assert!(session.notice().is_none());
    }

    #[tokio::test]
    async fn failure_keeps_the_unanswered_user_turn() {
        let client = ScriptedClient::new(vec![
            Ok("B".to_string()),
            Err(ProviderError::network("connection reset")),
        ]);
        let mut session = session();
        let cancel = CancellationToken::new();

        session.submit("A", &client, &cancel, None).await.unwrap();
        let outcome = session.submit("C", &client, &cancel, None).await.unwrap();

        match outcome {
            TurnOutcome::Failed(err) => assert_eq!(err.kind, ProviderErrorKind::Network),
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(
            client.calls()[1],
            (
                vec![
                    HistoryEntry::new(Speaker::User, "A"),
                    HistoryEntry::new(Speaker::Model, "B"),
                ],
                "C".to_string()
            )
        );
        assert_eq!(
            roles_and_content(&session),
            vec![(Role::User, "A"), (Role::Assistant, "B"), (Role::User, "C")]
        );

        let notice = session.notice().expect("failure notice");
        assert_eq!(notice.message, "An error occurred: connection reset");
        assert_eq!(session.state(), CycleState::Idle);
    }

    #[tokio::test]
    async fn resubmission_after_failure_sends_the_orphaned_turn_as_history() {
        let client = ScriptedClient::new(vec![
            Err(ProviderError::rate_limit("quota")),
            Ok("answer".to_string()),
        ]);
        let mut session = session();
        let cancel = CancellationToken::new();

        session.submit("question", &client, &cancel, None).await.unwrap();
        session.submit("question", &client, &cancel, None).await.unwrap();

        assert_eq!(
            client.calls()[1],
            (
                vec![HistoryEntry::new(Speaker::User, "question")],
                "question".to_string()
            )
        );
        assert_eq!(
            roles_and_content(&session),
            vec![
                (Role::User, "question"),
                (Role::User, "question"),
                (Role::Assistant, "answer"),
            ]
        );
        assert!(session.notice().is_none());
    }

    #[tokio::test]
    async fn empty_submission_is_rejected_without_a_call() {
        let client = ScriptedClient::new(vec![]);
        let mut session = session();

        let err = session
            .submit("   \n", &client, &CancellationToken::new(), None)
            .await
            .unwrap_err();

        assert_eq!(err, SubmitError::Empty);
        assert!(session.log().is_empty());
        assert!(client.calls().is_empty());
        assert_eq!(session.state(), CycleState::Idle);
    }

    #[tokio::test]
    async fn empty_submission_is_allowed_by_policy() {
        let client = ScriptedClient::new(vec![Ok("?".to_string())]);
        let mut session = ChatSession::new(SubmissionPolicy { allow_empty: true });

        session
            .submit("", &client, &CancellationToken::new(), None)
            .await
            .unwrap();

        assert_eq!(session.log().len(), 2);
    }

    #[test]
    fn second_submission_while_awaiting_is_busy() {
        let mut session = session();
        let _pending = session.begin_turn("one").unwrap();

        assert_eq!(session.begin_turn("two").unwrap_err(), SubmitError::Busy);
        assert_eq!(session.log().len(), 1);
        assert!(session.is_awaiting());
    }

    #[tokio::test]
    async fn next_submission_clears_the_notice() {
        let client = ScriptedClient::new(vec![Err(ProviderError::unknown("boom"))]);
        let mut session = session();

        session
            .submit("x", &client, &CancellationToken::new(), None)
            .await
            .unwrap();
        assert!(session.notice().is_some());

        let _pending = session.begin_turn("y").unwrap();
        assert!(session.notice().is_none());
    }

    #[tokio::test]
    async fn cancellation_surfaces_as_provider_error() {
        let mut session = session();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = session
            .submit("hello", &SilentClient, &cancel, None)
            .await
            .unwrap();

        match outcome {
            TurnOutcome::Failed(err) => assert_eq!(err.kind, ProviderErrorKind::Cancelled),
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(session.log().len(), 1);
        assert_eq!(session.state(), CycleState::Idle);
    }

    #[tokio::test]
    async fn deadline_surfaces_as_timeout() {
        let mut session = session();

        let outcome = session
            .submit(
                "hello",
                &SilentClient,
                &CancellationToken::new(),
                Some(Duration::from_millis(10)),
            )
            .await
            .unwrap();

        match outcome {
            TurnOutcome::Failed(err) => assert_eq!(err.kind, ProviderErrorKind::Timeout),
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(
            session.notice().map(|n| n.message.as_str()),
            Some("An error occurred: Request timed out after 10ms")
        );
    }
}

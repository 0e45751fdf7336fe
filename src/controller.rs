use log::{ debug, error, info, warn };
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ ChatError, CompletionError };
use crate::history::ConversationStore;
use crate::llm::chat::CompletionService;
use crate::models::chat::{ ChatMessage, ChatTurn, Conversation, ConversationList, Role };

/// Shown in place of a reply whenever the completion request fails.
pub const APOLOGY_MESSAGE: &str =
    "Sorry, something went wrong while sending your message. Please check the API settings.";

pub type ReplyFuture = Pin<Box<dyn Future<Output = Result<String, CompletionError>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    NoSelection,
    Idle,
    AwaitingReply,
}

/// A user message that has been recorded and is waiting for its reply.
#[derive(Debug)]
pub struct PendingReply {
    request_id: u64,
    conversation_id: String,
    history: Vec<ChatTurn>,
}

impl PendingReply {
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }
}

#[derive(Debug)]
pub enum ReplyOutcome {
    Replied(ChatMessage),
    /// The apology message was appended in place of a reply.
    Failed {
        message: ChatMessage,
        error: CompletionError,
    },
    /// The conversation was deleted before the reply arrived.
    Dropped,
}

impl ReplyOutcome {
    pub fn message(&self) -> Option<&ChatMessage> {
        match self {
            ReplyOutcome::Replied(message) => Some(message),
            ReplyOutcome::Failed { message, .. } => Some(message),
            ReplyOutcome::Dropped => None,
        }
    }
}

pub struct ConversationController {
    conversations: ConversationList,
    active_id: Option<String>,
    pending: Option<u64>,
    next_request_id: u64,
    store: ConversationStore,
    completion: Arc<dyn CompletionService>,
    request_timeout: Option<Duration>,
}

impl ConversationController {
    pub async fn new(store: ConversationStore, completion: Arc<dyn CompletionService>) -> Self {
        let conversations = store.load().await;
        info!("Loaded {} conversation(s) from '{}'", conversations.len(), store.key());
        Self {
            conversations,
            active_id: None,
            pending: None,
            next_request_id: 0,
            store,
            completion,
            request_timeout: None,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    pub fn active(&self) -> Option<&Conversation> {
        self.active_id.as_deref().and_then(|id| self.get(id))
    }

    pub fn is_awaiting_reply(&self) -> bool {
        self.pending.is_some()
    }

    pub fn state(&self) -> ControllerState {
        if self.pending.is_some() {
            ControllerState::AwaitingReply
        } else if self.active().is_some() {
            ControllerState::Idle
        } else {
            ControllerState::NoSelection
        }
    }

    pub async fn create_conversation(&mut self) -> String {
        let mut conversation = Conversation::new();
        while self.get(&conversation.id).is_some() {
            conversation = Conversation::new();
        }
        let id = conversation.id.clone();
        self.conversations.insert(0, conversation);
        self.persist().await;
        self.active_id = Some(id.clone());
        info!("Created conversation {}", id);
        id
    }

    pub fn select_conversation(&mut self, id: &str) -> Result<&Conversation, ChatError> {
        let index = self.index_of(id).ok_or_else(|| ChatError::NotFound(id.to_string()))?;
        self.active_id = Some(id.to_string());
        debug!("Selected conversation {}", id);
        Ok(&self.conversations[index])
    }

    /// Removes the conversation; returns whether anything was deleted.
    pub async fn delete_conversation(&mut self, id: &str) -> bool {
        let Some(index) = self.index_of(id) else {
            debug!("Delete of unknown conversation {} ignored", id);
            return false;
        };
        self.conversations.remove(index);
        self.persist().await;
        if self.active_id.as_deref() == Some(id) {
            self.active_id = None;
        }
        info!("Deleted conversation {}", id);
        true
    }

    pub async fn rename_conversation(&mut self, id: &str, title: &str) -> Result<(), ChatError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ChatError::EmptyTitle);
        }
        let index = self.index_of(id).ok_or_else(|| ChatError::NotFound(id.to_string()))?;
        self.conversations[index].rename(title);
        self.persist().await;
        Ok(())
    }

    /// Full send cycle: record the user message, wait for the reply, record it.
    pub async fn send_message(&mut self, text: &str) -> Result<ReplyOutcome, ChatError> {
        let pending = self.begin_send(text).await?;
        let result = self.request_reply(&pending).await;
        self.finish_send(pending, result).await
    }

    /// Appends the user message to the active conversation (creating one if none is
    /// selected), persists, and enters the awaiting-reply state.
    pub async fn begin_send(&mut self, text: &str) -> Result<PendingReply, ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if self.pending.is_some() {
            warn!("Send rejected: a reply is still pending");
            return Err(ChatError::ReplyPending);
        }

        let conversation_id = match self.active().map(|c| c.id.clone()) {
            Some(id) => id,
            None => self.create_conversation().await,
        };
        let index = self
            .index_of(&conversation_id)
            .ok_or_else(|| ChatError::NotFound(conversation_id.clone()))?;
        self.conversations[index].push_message(ChatMessage::new(Role::User, text));
        self.move_to_front(index);
        let history = self.conversations[0].history();
        self.persist().await;

        self.next_request_id += 1;
        self.pending = Some(self.next_request_id);
        debug!("Awaiting reply for {} ({} turns)", conversation_id, history.len());
        Ok(PendingReply {
            request_id: self.next_request_id,
            conversation_id,
            history,
        })
    }

    /// The outbound request for a pending send. Owns everything it needs, so the
    /// controller can be used for other operations while it runs.
    pub fn request_reply(&self, pending: &PendingReply) -> ReplyFuture {
        let completion = Arc::clone(&self.completion);
        let history = pending.history.clone();
        let timeout = self.request_timeout;
        Box::pin(async move {
            match timeout {
                Some(limit) =>
                    tokio::time
                        ::timeout(limit, completion.complete(&history)).await
                        .unwrap_or_else(|_| Err(CompletionError::Timeout(limit))),
                None => completion.complete(&history).await,
            }
        })
    }

    /// Records the reply (or the apology on failure) and returns to idle.
    pub async fn finish_send(
        &mut self,
        pending: PendingReply,
        result: Result<String, CompletionError>
    ) -> Result<ReplyOutcome, ChatError> {
        if self.pending != Some(pending.request_id) {
            return Err(ChatError::StaleReply);
        }
        self.pending = None;

        let Some(index) = self.index_of(&pending.conversation_id) else {
            warn!("Conversation {} was deleted before its reply arrived", pending.conversation_id);
            return Ok(ReplyOutcome::Dropped);
        };

        let (message, failure) = match result {
            Ok(text) => {
                info!("Reply received for {} ({} chars)", pending.conversation_id, text.chars().count());
                (ChatMessage::new(Role::Assistant, text), None)
            }
            Err(e) => {
                error!("Completion failed for {}: {}", pending.conversation_id, e);
                (ChatMessage::new(Role::Assistant, APOLOGY_MESSAGE), Some(e))
            }
        };
        self.conversations[index].push_message(message.clone());
        self.move_to_front(index);
        self.persist().await;

        Ok(match failure {
            None => ReplyOutcome::Replied(message),
            Some(error) => ReplyOutcome::Failed { message, error },
        })
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.conversations.iter().position(|c| c.id == id)
    }

    fn move_to_front(&mut self, index: usize) {
        if index > 0 {
            let conversation = self.conversations.remove(index);
            self.conversations.insert(0, conversation);
        }
    }

    async fn persist(&self) {
        if let Err(e) = self.store.save(&self.conversations).await {
            error!("Failed to persist conversations to '{}': {}", self.store.key(), e);
        }
    }
}

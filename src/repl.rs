use log::debug;
use std::io::{ self, Write };
use tokio::io::{ AsyncBufRead, AsyncBufReadExt };
use tokio::sync::mpsc;

use crate::controller::{ ConversationController, PendingReply, ReplyOutcome };
use crate::error::{ ChatError, CompletionError };
use crate::models::chat::{ Conversation, Role };

const PREVIEW_CHARS: usize = 40;

const HELP: &str = "\
Commands:
  /new              start a new conversation
  /list             list conversations, newest first
  /open <n|id>      switch to a conversation
  /delete <n|id>    delete a conversation
  /rename <title>   rename the current conversation
  /show             print the current transcript
  /help             show this help
  /quit             exit
Anything else is sent as a message.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    New,
    List,
    Open(String),
    Delete(String),
    Rename(String),
    Show,
    Help,
    Quit,
    Send(String),
    Unknown(String),
}

impl Command {
    /// `None` for blank input.
    pub fn parse(line: &str) -> Option<Command> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Some(Command::Send(line.to_string()));
        };
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim().to_string()),
            None => (rest, String::new()),
        };
        let command = match (name.to_lowercase().as_str(), arg.is_empty()) {
            ("new", _) => Command::New,
            ("list" | "ls", _) => Command::List,
            ("open", false) => Command::Open(arg),
            ("delete" | "rm", false) => Command::Delete(arg),
            ("rename", false) => Command::Rename(arg),
            ("show", _) => Command::Show,
            ("help" | "?", _) => Command::Help,
            ("quit" | "exit" | "q", _) => Command::Quit,
            _ => Command::Unknown(line.to_string()),
        };
        Some(command)
    }
}

/// Resolves a 1-based list position, a full id, or an unambiguous id prefix.
pub fn resolve_target(conversations: &[Conversation], target: &str) -> Option<String> {
    if let Ok(n) = target.parse::<usize>() {
        if n >= 1 && n <= conversations.len() {
            return Some(conversations[n - 1].id.clone());
        }
    }
    if let Some(c) = conversations.iter().find(|c| c.id == target) {
        return Some(c.id.clone());
    }
    let mut matches = conversations.iter().filter(|c| c.id.starts_with(target));
    match (matches.next(), matches.next()) {
        (Some(c), None) => Some(c.id.clone()),
        _ => None,
    }
}

type ReplyResult = Result<String, CompletionError>;

pub struct Repl<W: Write> {
    controller: ConversationController,
    out: W,
    pending: Option<PendingReply>,
}

impl<W: Write> Repl<W> {
    pub fn new(controller: ConversationController, out: W) -> Self {
        Self { controller, out, pending: None }
    }

    pub fn controller(&self) -> &ConversationController {
        &self.controller
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub async fn run<R: AsyncBufRead + Unpin>(&mut self, input: R) -> io::Result<()> {
        let (replies_tx, mut replies_rx) = mpsc::channel::<ReplyResult>(1);
        let mut lines = input.lines();
        writeln!(self.out, "{}", HELP)?;

        loop {
            tokio::select! {
                biased;
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    match Command::parse(&line) {
                        Some(Command::Quit) => break,
                        Some(command) => self.handle(command, &replies_tx).await?,
                        None => {}
                    }
                }
                Some(result) = replies_rx.recv() => self.deliver(result).await?,
            }
        }

        if self.pending.is_some() {
            writeln!(self.out, "Waiting for the pending reply before exiting...")?;
            if let Some(result) = replies_rx.recv().await {
                self.deliver(result).await?;
            }
        }
        Ok(())
    }

    async fn handle(&mut self, command: Command, replies: &mpsc::Sender<ReplyResult>) -> io::Result<()> {
        match command {
            Command::New => {
                self.controller.create_conversation().await;
                writeln!(self.out, "Started a new conversation.")?;
            }
            Command::List => self.print_list()?,
            Command::Open(target) => {
                let Some(id) = resolve_target(self.controller.conversations(), &target) else {
                    return writeln!(self.out, "No conversation matches '{}'.", target);
                };
                if let Err(e) = self.controller.select_conversation(&id) {
                    return writeln!(self.out, "{}", e);
                }
                self.print_transcript()?;
            }
            Command::Delete(target) => {
                let Some(id) = resolve_target(self.controller.conversations(), &target) else {
                    return writeln!(self.out, "No conversation matches '{}'.", target);
                };
                let title = self.controller.get(&id).map(|c| c.title.clone()).unwrap_or_default();
                if self.controller.delete_conversation(&id).await {
                    writeln!(self.out, "Deleted '{}'.", title)?;
                }
            }
            Command::Rename(title) => {
                let Some(id) = self.controller.active_id().map(str::to_string) else {
                    return writeln!(self.out, "No conversation selected.");
                };
                match self.controller.rename_conversation(&id, &title).await {
                    Ok(()) => writeln!(self.out, "Renamed to '{}'.", title.trim())?,
                    Err(e) => writeln!(self.out, "{}", e)?,
                }
            }
            Command::Show => self.print_transcript()?,
            Command::Help => writeln!(self.out, "{}", HELP)?,
            Command::Quit => {}
            Command::Send(text) => self.send(&text, replies).await?,
            Command::Unknown(raw) => {
                writeln!(self.out, "Unknown command '{}'. Type /help for the list.", raw)?;
            }
        }
        Ok(())
    }

    async fn send(&mut self, text: &str, replies: &mpsc::Sender<ReplyResult>) -> io::Result<()> {
        match self.controller.begin_send(text).await {
            Ok(pending) => {
                let request = self.controller.request_reply(&pending);
                let tx = replies.clone();
                tokio::spawn(async move {
                    let result = request.await;
                    let _ = tx.send(result).await;
                });
                debug!("Request dispatched for {}", pending.conversation_id());
                self.pending = Some(pending);
                writeln!(self.out, "...")
            }
            Err(ChatError::ReplyPending) => {
                writeln!(self.out, "Still waiting for the previous reply; message not sent.")
            }
            Err(ChatError::EmptyMessage) => Ok(()),
            Err(e) => writeln!(self.out, "{}", e),
        }
    }

    async fn deliver(&mut self, result: ReplyResult) -> io::Result<()> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };
        let conversation_id = pending.conversation_id().to_string();
        let outcome = match self.controller.finish_send(pending, result).await {
            Ok(outcome) => outcome,
            Err(e) => {
                return writeln!(self.out, "{}", e);
            }
        };
        let Some(message) = outcome.message() else {
            return Ok(());
        };
        if self.controller.active_id() == Some(conversation_id.as_str()) {
            writeln!(self.out, "assistant> {}", message.content)?;
        } else {
            let title = self.controller
                .get(&conversation_id)
                .map(|c| c.title.clone())
                .unwrap_or_default();
            writeln!(self.out, "(reply saved to '{}')", title)?;
        }
        if let ReplyOutcome::Failed { error, .. } = &outcome {
            debug!("Reply failed: {}", error);
        }
        Ok(())
    }

    fn print_list(&mut self) -> io::Result<()> {
        if self.controller.conversations().is_empty() {
            return writeln!(self.out, "No conversations yet.");
        }
        let active = self.controller.active_id().map(str::to_string);
        for (i, c) in self.controller.conversations().iter().enumerate() {
            let marker = if active.as_deref() == Some(c.id.as_str()) { '*' } else { ' ' };
            write!(self.out, "{}{:>3}. {} ({} messages)", marker, i + 1, c.title, c.messages.len())?;
            match c.preview(PREVIEW_CHARS) {
                Some(preview) => writeln!(self.out, " | {}", preview)?,
                None => writeln!(self.out)?,
            }
        }
        Ok(())
    }

    fn print_transcript(&mut self) -> io::Result<()> {
        let Some(conversation) = self.controller.active() else {
            return writeln!(self.out, "No conversation selected.");
        };
        writeln!(self.out, "== {} ==", conversation.title)?;
        for message in &conversation.messages {
            let who = match message.role {
                Role::User => "you",
                Role::Assistant => "assistant",
            };
            writeln!(self.out, "{}> {}", who, message.content)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use crate::history::{ ConversationStore, MemoryKeyValueStore, DEFAULT_HISTORY_KEY };
    use crate::llm::chat::CompletionService;
    use crate::models::chat::ChatTurn;

    struct Echo;

    #[async_trait]
    impl CompletionService for Echo {
        async fn complete(&self, history: &[ChatTurn]) -> Result<String, CompletionError> {
            let last = history.last().map(|t| t.content.clone()).unwrap_or_default();
            Ok(format!("echo: {}", last))
        }

        fn get_model(&self) -> String {
            "echo".into()
        }

        fn get_base_url(&self) -> Option<String> {
            None
        }
    }

    async fn repl() -> Repl<Vec<u8>> {
        let store = ConversationStore::new(Arc::new(MemoryKeyValueStore::new()), DEFAULT_HISTORY_KEY);
        let controller = ConversationController::new(store, Arc::new(Echo)).await;
        Repl::new(controller, Vec::new())
    }

    fn text(repl: &Repl<Vec<u8>>) -> String {
        String::from_utf8_lossy(repl.output()).into_owned()
    }

    #[test]
    fn parses_commands_and_messages() {
        assert_eq!(Command::parse("   "), None);
        assert_eq!(Command::parse("/new"), Some(Command::New));
        assert_eq!(Command::parse("/OPEN 2"), Some(Command::Open("2".into())));
        assert_eq!(Command::parse("/rename  Trip plans "), Some(Command::Rename("Trip plans".into())));
        assert_eq!(Command::parse("/delete"), Some(Command::Unknown("/delete".into())));
        assert_eq!(Command::parse("/frobnicate"), Some(Command::Unknown("/frobnicate".into())));
        assert_eq!(Command::parse(" hello there "), Some(Command::Send("hello there".into())));
        assert_eq!(Command::parse("/q"), Some(Command::Quit));
    }

    #[test]
    fn targets_resolve_by_position_id_or_prefix() {
        let mut a = Conversation::new();
        a.id = "aaaa-1111".into();
        let mut b = Conversation::new();
        b.id = "aaab-2222".into();
        let list = vec![a, b];
        assert_eq!(resolve_target(&list, "2").as_deref(), Some("aaab-2222"));
        assert_eq!(resolve_target(&list, "aaaa-1111").as_deref(), Some("aaaa-1111"));
        assert_eq!(resolve_target(&list, "aaab").as_deref(), Some("aaab-2222"));
        assert_eq!(resolve_target(&list, "aaa"), None);
        assert_eq!(resolve_target(&list, "3"), None);
    }

    #[tokio::test]
    async fn message_line_round_trips_through_controller() {
        let mut repl = repl().await;
        repl.run(&b"Explain recursion\n/list\n"[..]).await.unwrap();

        let conv = repl.controller().active().unwrap();
        assert_eq!(conv.title, "Explain recursion");
        assert_eq!(conv.messages.len(), 2);
        assert_eq!(conv.messages[1].content, "echo: Explain recursion");
        let out = text(&repl);
        assert!(out.contains("assistant> echo: Explain recursion"));
        assert!(out.contains("Explain recursion (1 messages)"));
    }

    #[tokio::test]
    async fn second_message_while_waiting_is_not_sent() {
        let mut repl = repl().await;
        repl.run(&b"first\nsecond\n"[..]).await.unwrap();

        let conv = repl.controller().active().unwrap();
        let contents: Vec<&str> = conv.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "echo: first"]);
        assert!(text(&repl).contains("Still waiting for the previous reply"));
    }

    #[tokio::test]
    async fn open_delete_and_rename_commands() {
        let mut repl = repl().await;
        repl.run(&b"/new\n/new\n/rename Second\n/open 2\n/delete 2\n/show\n/list\n/bogus\n"[..]).await.unwrap();

        let ctl = repl.controller();
        assert_eq!(ctl.conversations().len(), 1);
        assert_eq!(ctl.active_id(), None);
        assert_eq!(ctl.conversations()[0].title, "Second");
        let out = text(&repl);
        assert!(out.contains("Renamed to 'Second'."));
        assert!(out.contains("No conversation selected."));
        assert!(out.contains("Unknown command '/bogus'"));
    }
}

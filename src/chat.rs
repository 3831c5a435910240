use std::future::Future;
use std::io::Write;

use anyhow::Result;
use rig::message::Message;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// One message of a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl From<&Turn> for Message {
    fn from(turn: &Turn) -> Self {
        match turn.role {
            Role::User => Message::user(turn.content.clone()),
            Role::Assistant => Message::assistant(turn.content.clone()),
        }
    }
}

/// Append-only conversation log for one interactive session.
#[derive(Debug, Clone, Default)]
pub struct History {
    turns: Vec<Turn>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(Turn {
            role: Role::User,
            content: content.into(),
        });
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.turns.push(Turn {
            role: Role::Assistant,
            content: content.into(),
        });
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The history as rig chat messages, oldest first.
    pub fn to_messages(&self) -> Vec<Message> {
        self.turns.iter().map(Message::from).collect()
    }
}

/// What the interactive loop talks to.
pub trait ChatBackend {
    /// Streams an answer to stdout and returns the full text.
    fn respond(&self, prompt: &str, history: &History) -> impl Future<Output = Result<String>>;

    /// Runs after each exchange, e.g. to print the matching sources.
    fn after_turn(&self, prompt: &str) -> impl Future<Output = Result<()>>;
}

/// Reads prompts line by line until EOF, `exit` or `quit`.
///
/// Each answer is recorded in the history passed to the next prompt.
pub async fn interactive_chat<B, R, W>(backend: &B, input: R, out: &mut W) -> Result<History>
where
    B: ChatBackend + ?Sized,
    R: AsyncBufRead + Unpin,
    W: Write + ?Sized,
{
    writeln!(out, "Interactive mode. Type 'exit' or 'quit' to leave.")?;
    let mut history = History::new();
    let mut lines = input.lines();

    loop {
        write!(out, "\nYou: ")?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            writeln!(out)?;
            break;
        };

        let user_input = line.trim();
        if user_input.is_empty() {
            continue;
        }
        if user_input.eq_ignore_ascii_case("exit") || user_input.eq_ignore_ascii_case("quit") {
            break;
        }

        let answer = backend.respond(user_input, &history).await?;
        history.push_user(user_input);
        history.push_assistant(answer);
        debug!(turns = history.len(), "Conversation updated");

        backend.after_turn(user_input).await?;
    }

    Ok(history)
}

//! Chat prompt for natural-language administration of a Linux host
//!
//! The conversation is an ordered pair: a fixed system instruction followed by
//! the caller's query, verbatim.

/// Instruction given to the assistant ahead of every query
pub const SYSTEM_INSTRUCTION: &str = "You are an assistant that administers a specific Linux machine. \
You can run commands, read files and inspect system information through the available tools. \
When asked about the machine, call those tools with the connection details \
(host, username, password or private_key_path) to gather what you need. \
If a command needs elevated privileges, prefix it with 'sudo '. \
Only run commands relevant to the request, and make sure any path you pass exists.";

/// Speaker of a prompt message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
}

/// One message of the chat conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }
}

/// Build the two-message conversation for `query`
pub fn build_conversation(query: &str) -> [ChatMessage; 2] {
    [
        ChatMessage::system(SYSTEM_INSTRUCTION),
        ChatMessage::user(query),
    ]
}

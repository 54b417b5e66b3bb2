//! # Actions
//!
//! The verbs of the protocol. Requests carry an [`Action`]; every request is
//! answered by exactly one [`Reply`], either its paired success action or
//! [`Reply::Error`].

/// A request verb understood by the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    Ping,
    Delete,
    Quit,
    Invoke,
    AddListener,
    RemoveListener,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::Ping,
        Action::Delete,
        Action::Quit,
        Action::Invoke,
        Action::AddListener,
        Action::RemoveListener,
    ];

    /// Parses a wire action name. Unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Delete => "delete",
            Self::Quit => "quit",
            Self::Invoke => "invoke",
            Self::AddListener => "add-listener",
            Self::RemoveListener => "remove-listener",
        }
    }

    /// The success reply paired with this request.
    pub fn reply(&self) -> Reply {
        match self {
            Self::Ping => Reply::Pong,
            Self::Delete => Reply::DeleteResult,
            Self::Quit => Reply::QuitReceived,
            Self::Invoke => Reply::InvokeResult,
            Self::AddListener => Reply::AddListenerResult,
            Self::RemoveListener => Reply::RemoveListenerResult,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A response verb sent back by the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Reply {
    Pong,
    DeleteResult,
    QuitReceived,
    InvokeResult,
    AddListenerResult,
    RemoveListenerResult,
    Error,
}

impl Reply {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pong => "pong",
            Self::DeleteResult => "delete-result",
            Self::QuitReceived => "quit-received",
            Self::InvokeResult => "invoke-result",
            Self::AddListenerResult => "add-listener-result",
            Self::RemoveListenerResult => "remove-listener-result",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

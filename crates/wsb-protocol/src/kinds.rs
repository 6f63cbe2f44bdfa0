//! Kind tags as they appear in the second slot of a wire tuple.

/// Command kinds accepted from the application.
pub struct CommandKinds;

impl CommandKinds {
    pub const OPEN: &str = "open";
    pub const TRANSMIT: &str = "transmit";
    pub const CLOSE: &str = "close";

    pub const ALL: [&str; 3] = [Self::OPEN, Self::TRANSMIT, Self::CLOSE];
}

/// Event kinds sent back to the application.
pub struct EventKinds;

impl EventKinds {
    pub const CONNECTED: &str = "connected";
    pub const DISCONNECTED: &str = "disconnected";
    pub const MESSAGE: &str = "message";
    pub const ERROR: &str = "error";
}

/// Returns true if `kind` names a command this protocol understands.
pub fn is_known_command(kind: &str) -> bool {
    CommandKinds::ALL.contains(&kind)
}

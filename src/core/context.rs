//! Process-wide session state shared by every sync engine.

/// Whether this process hosts the session or joined one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionRole {
    /// Not connected; local values are authoritative.
    #[default]
    Offline,
    /// Hosting: authoritative for every engine.
    Server,
    /// Connected to a server.
    Client,
}

/// Process-wide session state.
///
/// Owned by the host and handed to engines explicitly.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    /// Role of this process.
    pub role: SessionRole,
    /// The server placed this process on its admin allow-list.
    pub lock_exempt: bool,
    /// Set while an inbound update is applied; local change hooks must not
    /// re-broadcast while this is set.
    pub processing_update: bool,
}

impl SessionContext {
    /// Create a context for `role`.
    pub fn new(role: SessionRole) -> Self {
        Self {
            role,
            ..Self::default()
        }
    }

    /// Whether this process is the server.
    pub fn is_server(&self) -> bool {
        self.role == SessionRole::Server
    }
}

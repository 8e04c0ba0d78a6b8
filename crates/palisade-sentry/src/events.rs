//! Transport-facing event and verdict vocabulary.
//!
//! The engine never touches sockets or packet bytes. The hosting server
//! decodes its wire protocol and feeds these events in; verdicts and
//! directives flow back out. Everything here is serde-tagged so hosts can
//! also log or replay event streams.

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::profile::ConnId;

/// A camera orientation sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Look {
    /// Horizontal rotation in degrees.
    pub yaw: f32,
    /// Vertical rotation in degrees.
    pub pitch: f32,
}

/// An observation from a live session, in wire order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Protocol handshake was received.
    Handshake {
        /// Protocol version the client claims.
        protocol_version: i32,
        /// Hostname the client says it connected to.
        hostname: String,
    },
    /// A status (server list) ping was received.
    StatusPing,
    /// The login sequence started.
    LoginStart {
        /// Requested login name.
        name: String,
    },
    /// The server sent its encryption request.
    EncryptionRequest,
    /// The client answered the encryption request.
    EncryptionResponse,
    /// Client settings (locale, view distance, skin parts) arrived.
    ClientSettings,
    /// The client identified its brand.
    Brand {
        /// Brand string, e.g. `vanilla`.
        brand: String,
    },
    /// The player moved.
    Movement {
        /// Absolute X position.
        x: f64,
        /// Absolute Y position.
        y: f64,
        /// Absolute Z position.
        z: f64,
        /// Camera orientation, when the packet carried one.
        look: Option<Look>,
    },
    /// The player rotated without moving.
    Rotation {
        /// New camera orientation.
        look: Look,
    },
    /// The player sent a chat message.
    Chat,
    /// The server sent a keep-alive to this client.
    KeepAliveSent,
    /// The client answered the pending keep-alive.
    KeepAliveAck,
    /// The player clicked in an inventory.
    InventoryClick,
    /// The player interacted with the world (block or entity).
    WorldInteract,
}

impl SessionEvent {
    /// Stable name of this event kind, for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Handshake { .. } => "handshake",
            Self::StatusPing => "status_ping",
            Self::LoginStart { .. } => "login_start",
            Self::EncryptionRequest => "encryption_request",
            Self::EncryptionResponse => "encryption_response",
            Self::ClientSettings => "client_settings",
            Self::Brand { .. } => "brand",
            Self::Movement { .. } => "movement",
            Self::Rotation { .. } => "rotation",
            Self::Chat => "chat",
            Self::KeepAliveSent => "keep_alive_sent",
            Self::KeepAliveAck => "keep_alive_ack",
            Self::InventoryClick => "inventory_click",
            Self::WorldInteract => "world_interact",
        }
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind())
    }
}

/// The action a threat score maps to, in ascending severity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// No intervention.
    Allow,
    /// Hold the connection briefly before letting it proceed.
    Delay,
    /// Disconnect the session.
    Kick,
    /// Disconnect and ban the source address.
    Blacklist,
}

impl Action {
    /// Stable name of this action, for logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Delay => "delay",
            Self::Kick => "kick",
            Self::Blacklist => "blacklist",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the transport layer should do with a connection before login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum PreLoginVerdict {
    /// Let the login proceed.
    Allow,
    /// Hold the login for the given duration, then proceed.
    Delay {
        /// How long to hold.
        duration: Duration,
    },
    /// Refuse the login.
    Reject {
        /// Message to disconnect with.
        reason: String,
    },
}

impl PreLoginVerdict {
    /// Whether this verdict lets the connection continue.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Self::Reject { .. })
    }
}

/// Out-of-band instruction to the session layer from a periodic verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDirective {
    /// Connection the directive targets.
    pub conn: ConnId,
    /// Source address of that connection.
    pub addr: IpAddr,
    /// Message to disconnect with.
    pub reason: String,
    /// Whether the address was also banned.
    pub blacklisted: bool,
}

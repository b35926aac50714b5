//! Destination routing for conversation modes.
//!
//! The router is a pure function from the active [`ConversationMode`] and the
//! local user id to the inbound subscription set and the outbound route. It
//! holds no state and performs no I/O; the session client applies its output.

use crate::error::ChatClientError;
use crate::proto;

/// A chat participant, immutable for the session lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: u64,
    pub display_name: String,
}

impl Identity {
    pub fn new(id: u64, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }
}

/// Conversation context a session is bound to for its whole lifetime.
///
/// A mode change requires constructing a new session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationMode {
    /// Shared public room.
    Public,
    /// 1:1 conversation with a known peer.
    Private { peer: Identity },
    /// Project group room.
    Project { project_id: u64 },
}

impl ConversationMode {
    /// Builds a mode from the loose shape used by host UIs: a kind string
    /// plus optional peer and project id.
    ///
    /// Fails with [`ChatClientError::InvalidConfiguration`] when `private`
    /// lacks a peer or `project` lacks a project id, rather than routing
    /// silently to the public room.
    pub fn from_parts(
        kind: &str,
        peer: Option<Identity>,
        project_id: Option<u64>,
    ) -> Result<Self, ChatClientError> {
        match kind {
            "public" => Ok(Self::Public),
            "private" => peer.map(|peer| Self::Private { peer }).ok_or_else(|| {
                ChatClientError::InvalidConfiguration(
                    "private mode requires a peer identity".to_string(),
                )
            }),
            "project" => project_id
                .map(|project_id| Self::Project { project_id })
                .ok_or_else(|| {
                    ChatClientError::InvalidConfiguration(
                        "project mode requires a project id".to_string(),
                    )
                }),
            other => Err(ChatClientError::InvalidConfiguration(format!(
                "unknown conversation mode: {other}"
            ))),
        }
    }

    /// Returns the peer identity in private mode.
    pub fn peer(&self) -> Option<&Identity> {
        match self {
            Self::Private { peer } => Some(peer),
            _ => None,
        }
    }
}

/// Outbound destination plus the envelope fields the mode requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRoute {
    pub destination: &'static str,
    pub receiver_id: Option<u64>,
    pub project_id: Option<u64>,
}

/// Inbound destinations the session must subscribe to for `mode`.
pub fn inbound_destinations(mode: &ConversationMode, local_user_id: u64) -> Vec<String> {
    match mode {
        ConversationMode::Public => vec![proto::DEST_TOPIC_PUBLIC.to_string()],
        ConversationMode::Private { .. } => vec![
            proto::private_inbox(local_user_id),
            proto::typing_inbox(local_user_id),
        ],
        ConversationMode::Project { project_id } => vec![proto::project_topic(*project_id)],
    }
}

/// Outbound route for `sendMessage` in `mode`.
pub fn outbound_route(mode: &ConversationMode) -> OutboundRoute {
    match mode {
        ConversationMode::Public => OutboundRoute {
            destination: proto::DEST_SEND_PUBLIC,
            receiver_id: None,
            project_id: None,
        },
        ConversationMode::Private { peer } => OutboundRoute {
            destination: proto::DEST_SEND_PRIVATE,
            receiver_id: Some(peer.id),
            project_id: None,
        },
        ConversationMode::Project { project_id } => OutboundRoute {
            destination: proto::DEST_SEND_PROJECT,
            receiver_id: None,
            project_id: Some(*project_id),
        },
    }
}

/// Whether outbound typing signals are emitted in `mode`.
///
/// Typing signals always go to `app/chat.typing` and only exist in private
/// conversations.
pub fn emits_typing_signals(mode: &ConversationMode) -> bool {
    matches!(mode, ConversationMode::Private { .. })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> Identity {
        Identity::new(2, "Jane")
    }

    #[test]
    fn public_mode_routes_to_broadcast_and_send_message() {
        assert_eq!(
            inbound_destinations(&ConversationMode::Public, 1),
            vec!["broadcast/public".to_string()]
        );
        let route = outbound_route(&ConversationMode::Public);
        assert_eq!(route.destination, "app/chat.sendMessage");
        assert_eq!(route.receiver_id, None);
        assert_eq!(route.project_id, None);
    }

    #[test]
    fn private_mode_subscribes_both_inboxes_and_targets_the_peer() {
        let mode = ConversationMode::Private { peer: peer() };
        assert_eq!(
            inbound_destinations(&mode, 1),
            vec!["inbox/private/1".to_string(), "inbox/typing/1".to_string()]
        );
        let route = outbound_route(&mode);
        assert_eq!(route.destination, "app/chat.private");
        assert_eq!(route.receiver_id, Some(2));
        assert_eq!(route.project_id, None);
    }

    #[test]
    fn project_mode_routes_by_project_id() {
        let mode = ConversationMode::Project { project_id: 7 };
        assert_eq!(
            inbound_destinations(&mode, 1),
            vec!["broadcast/project/7".to_string()]
        );
        let route = outbound_route(&mode);
        assert_eq!(route.destination, "app/chat.project");
        assert_eq!(route.project_id, Some(7));
    }

    #[test]
    fn typing_signals_are_private_mode_only() {
        assert!(emits_typing_signals(&ConversationMode::Private { peer: peer() }));
        assert!(!emits_typing_signals(&ConversationMode::Public));
        assert!(!emits_typing_signals(&ConversationMode::Project { project_id: 7 }));
    }

    #[test]
    fn from_parts_accepts_complete_modes() {
        assert_eq!(
            ConversationMode::from_parts("public", None, None).expect("public"),
            ConversationMode::Public
        );
        assert_eq!(
            ConversationMode::from_parts("private", Some(peer()), None).expect("private"),
            ConversationMode::Private { peer: peer() }
        );
        assert_eq!(
            ConversationMode::from_parts("project", None, Some(7)).expect("project"),
            ConversationMode::Project { project_id: 7 }
        );
    }

    #[test]
    fn from_parts_rejects_private_without_peer() {
        let err = ConversationMode::from_parts("private", None, None).expect_err("must fail");
        assert!(matches!(err, ChatClientError::InvalidConfiguration(_)));
    }

    #[test]
    fn from_parts_rejects_unknown_kind() {
        let err = ConversationMode::from_parts("group", None, None).expect_err("must fail");
        assert!(matches!(err, ChatClientError::InvalidConfiguration(_)));
    }
}

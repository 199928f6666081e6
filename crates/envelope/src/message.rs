/// The sole wire object exchanged between nodes.
///
/// `request_id` is preserved end-to-end within one request; `from_node` is overwritten on every
/// hop to the current node's name; `tracking` is append-only. An `ERROR` envelope always carries
/// a non-empty `error` and an undefined `payload`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Envelope {
    /// Identifies one logical request across all hops of a workflow.
    #[prost(string, tag = "1")]
    pub tracking_id: String,
    /// Identifies one message instance; carried unchanged across hops within one request.
    #[prost(string, tag = "2")]
    pub request_id: String,
    /// Name of the node that produced this envelope.
    #[prost(string, tag = "3")]
    pub from_node: String,
    #[prost(enumeration = "MessageType", tag = "4")]
    pub message_type: i32,
    /// The user payload, self-describing via a type URL.
    #[prost(message, optional, tag = "5")]
    pub payload: Option<::prost_types::Any>,
    /// Non-empty iff `message_type == ERROR`.
    #[prost(string, tag = "6")]
    pub error: String,
    /// Append-only per-hop audit trail.
    #[prost(message, repeated, tag = "7")]
    pub tracking: Vec<TrackingEntry>,
}

/// One hop's entry in an envelope's audit trail.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TrackingEntry {
    #[prost(string, tag = "1")]
    pub node_name: String,
    /// RFC 3339 timestamp recorded when the hop began.
    #[prost(string, tag = "2")]
    pub start_timestamp: String,
    /// RFC 3339 timestamp recorded when the hop finished.
    #[prost(string, tag = "3")]
    pub end_timestamp: String,
}

/// Declares the semantic role of an envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ::prost::Enumeration)]
#[repr(i32)]
pub enum MessageType {
    Ok = 0,
    Error = 1,
    EarlyReply = 2,
    EarlyExit = 3,
}

impl Envelope {
    /// Builds a fresh request envelope: a new `tracking_id`, the given `request_id`, and a single
    /// opening tracking entry for `node_name`.
    pub fn new_request(
        request_id: impl Into<String>,
        node_name: impl Into<String>,
        payload: ::prost_types::Any,
        start_timestamp: impl Into<String>,
    ) -> Self {
        let node_name = node_name.into();
        Self {
            tracking_id: uuid::Uuid::new_v4().to_string(),
            request_id: request_id.into(),
            from_node: node_name.clone(),
            message_type: MessageType::Ok as i32,
            payload: Some(payload),
            error: String::new(),
            tracking: vec![TrackingEntry {
                node_name,
                start_timestamp: start_timestamp.into(),
                end_timestamp: String::new(),
            }],
        }
    }

    /// Builds a response envelope that preserves `request_id` and `tracking_id` from `self`,
    /// stamping `from_node` as the current node, per invariant 2.
    pub fn respond(
        &self,
        from_node: impl Into<String>,
        message_type: MessageType,
        payload: Option<::prost_types::Any>,
    ) -> Self {
        Self {
            tracking_id: self.tracking_id.clone(),
            request_id: self.request_id.clone(),
            from_node: from_node.into(),
            message_type: message_type as i32,
            payload,
            error: String::new(),
            tracking: self.tracking.clone(),
        }
    }

    /// Builds an `ERROR` envelope preserving `request_id`, per the error-propagation policy.
    pub fn error_response(
        request_id: impl Into<String>,
        tracking_id: impl Into<String>,
        from_node: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            tracking_id: tracking_id.into(),
            request_id: request_id.into(),
            from_node: from_node.into(),
            message_type: MessageType::Error as i32,
            payload: None,
            error: message.into(),
            tracking: Vec::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.message_type == MessageType::Error as i32
    }
}

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::RespotError;
use crate::message::PacketType;

/// Outbound half of an ordered, reliable packet transport.
///
/// Implementations serialise concurrent writers themselves; callers never
/// coordinate with each other before sending.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send_packet(&self, packet_type: PacketType, payload: Bytes) -> Result<(), RespotError>;
}

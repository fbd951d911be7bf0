/*
 *
 *    Copyright (c) 2020-2022 Project CHIP Authors
 *
 *    Licensed under the Apache License, Version 2.0 (the "License");
 *    you may not use this file except in compliance with the License.
 *    You may obtain a copy of the License at
 *
 *        http://www.apache.org/licenses/LICENSE-2.0
 *
 *    Unless required by applicable law or agreed to in writing, software
 *    distributed under the License is distributed on an "AS IS" BASIS,
 *    WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *    See the License for the specific language governing permissions and
 *    limitations under the License.
 */

//! The seam between the engine and the secure session / exchange layer.
//!
//! The engine never touches sockets, message counters or retransmissions. It
//! hands complete IM payloads to a [`Transport`] and is called back by the
//! owner of the transport when acknowledgements, failures or session
//! closures happen.

use core::fmt;

use crate::error::{Error, ErrorCode};
use crate::im::{FabricIndex, NodeId, OpCode, PROTO_ID_INTERACTION_MODEL};

/// Identifies a secure session.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SessionId(pub u32);

/// An exchange identifier, uniquely identifying a session and an exchange within that session.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ExchangeId(u32);

impl ExchangeId {
    const SESSION_MASK: u32 = 0x0fff_ffff;
    const INDEX_SHIFT: u32 = 28;

    pub fn new(session: SessionId, exchange_index: usize) -> Result<Self, Error> {
        if session.0 > Self::SESSION_MASK || exchange_index >= 16 {
            Err(ErrorCode::InvalidArgument)?;
        }

        Ok(Self(((exchange_index as u32) << Self::INDEX_SHIFT) | session.0))
    }

    pub const fn session(&self) -> SessionId {
        SessionId(self.0 & Self::SESSION_MASK)
    }

    pub const fn exchange_index(&self) -> usize {
        (self.0 >> Self::INDEX_SHIFT) as _
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.session().0, self.exchange_index())
    }
}

/// What the engine needs to know about the session a request arrived on.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SessionInfo {
    pub id: SessionId,
    /// The accessing fabric; 0 for sessions not bound to a fabric
    pub fabric_idx: FabricIndex,
    pub peer_node_id: NodeId,
}

impl SessionInfo {
    pub const fn new(id: SessionId, fabric_idx: FabricIndex, peer_node_id: NodeId) -> Self {
        Self {
            id,
            fabric_idx,
            peer_node_id,
        }
    }
}

/// Meta-data of an incoming message: the protocol ID, the protocol opcode and
/// whether it was sent reliably.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MessageMeta {
    pub proto_id: u16,
    pub proto_opcode: u8,
    pub reliable: bool,
}

impl MessageMeta {
    pub const fn new(proto_id: u16, proto_opcode: u8, reliable: bool) -> Self {
        Self {
            proto_id,
            proto_opcode,
            reliable,
        }
    }

    /// Cast the opcode of an Interaction Model message.
    pub fn im_opcode(&self) -> Result<OpCode, Error> {
        if self.proto_id != PROTO_ID_INTERACTION_MODEL {
            Err(ErrorCode::InvalidOpcode)?;
        }

        OpCode::from_u8(self.proto_opcode)
    }
}

impl From<OpCode> for MessageMeta {
    fn from(opcode: OpCode) -> Self {
        // All IM messages are reliable
        Self::new(PROTO_ID_INTERACTION_MODEL, opcode as u8, true)
    }
}

/// The outgoing half of the transport, as used by the engine.
pub trait Transport {
    /// Hand `payload` to the exchange for reliable delivery.
    ///
    /// `Ok` means the message was accepted; the acknowledgement (or its absence)
    /// is reported back through `Engine::on_status_response` and
    /// `Engine::on_exchange_failed`.
    fn send(&mut self, exchange: ExchangeId, opcode: OpCode, payload: &[u8]) -> Result<(), Error>;

    /// Open a new exchange on `session`, for unsolicited subscription reports.
    fn new_exchange(&mut self, session: SessionId) -> Result<ExchangeId, Error>;

    /// Release an exchange the engine has no further use for.
    fn close_exchange(&mut self, exchange: ExchangeId);
}

impl<T> Transport for &mut T
where
    T: Transport,
{
    fn send(&mut self, exchange: ExchangeId, opcode: OpCode, payload: &[u8]) -> Result<(), Error> {
        (**self).send(exchange, opcode, payload)
    }

    fn new_exchange(&mut self, session: SessionId) -> Result<ExchangeId, Error> {
        (**self).new_exchange(session)
    }

    fn close_exchange(&mut self, exchange: ExchangeId) {
        (**self).close_exchange(exchange)
    }
}

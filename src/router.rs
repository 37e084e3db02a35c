//! Contracts toward the nucleus: route resolution, frame sinks and stream-id
//! supply, plus the façade the client factory drives them through

use crate::frame::Begin;
use crate::{MessageHandler, ReceiverId, StreamId};

/// An outbound route resolved for an application-side Begin
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Route {
    /// Identity of the network-side binding the session correlates with
    pub correlation_id: u64,
}

/// Route table and stream registry maintained by the nucleus
pub trait RouteManager {
    /// Resolve the outbound route for an application-side Begin, matching
    /// its route id and authorization
    fn resolve_app(&mut self, begin: &Begin) -> Option<Route>;

    /// The sink that frames emitted on `stream_id` should be addressed to
    fn supply_receiver(&mut self, stream_id: StreamId) -> ReceiverId;

    /// Register the handler for throttle frames flowing against `stream_id`
    fn set_throttle(&mut self, stream_id: StreamId, handler: MessageHandler);
}

/// Source of correlated stream identifiers
pub trait StreamIdSupplier {
    /// Produce a fresh initial-direction (odd) id for a stream opened on
    /// `route_id`
    fn supply_initial_id(&mut self, route_id: u64) -> StreamId;

    /// The reply id deterministically paired with `initial_id`
    fn supply_reply_id(&self, initial_id: StreamId) -> StreamId;
}

/// Default id supply: odd initial ids from a counter, replies paired by
/// flipping the low bit
pub struct SequentialIdSupplier {
    next: u64,
}

impl SequentialIdSupplier {
    pub fn new() -> Self {
        Self { next: 1 }
    }
}

impl Default for SequentialIdSupplier {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamIdSupplier for SequentialIdSupplier {
    fn supply_initial_id(&mut self, _route_id: u64) -> StreamId {
        let id = StreamId(self.next);
        self.next = self.next.wrapping_add(2);
        id
    }

    fn supply_reply_id(&self, initial_id: StreamId) -> StreamId {
        StreamId(initial_id.0 ^ 1)
    }
}

/// Façade bundling the route manager with id supply
pub(crate) struct Router<R> {
    manager: R,
    ids: Box<dyn StreamIdSupplier + Send>,
}

impl<R: RouteManager> Router<R> {
    pub(crate) fn new(manager: R, ids: Box<dyn StreamIdSupplier + Send>) -> Self {
        Self { manager, ids }
    }

    pub(crate) fn resolve_app(&mut self, begin: &Begin) -> Option<Route> {
        self.manager.resolve_app(begin)
    }

    pub(crate) fn supply_receiver(&mut self, stream_id: StreamId) -> ReceiverId {
        self.manager.supply_receiver(stream_id)
    }

    pub(crate) fn set_throttle(&mut self, stream_id: StreamId, handler: MessageHandler) {
        self.manager.set_throttle(stream_id, handler);
    }

    pub(crate) fn supply_initial_id(&mut self, route_id: u64) -> StreamId {
        self.ids.supply_initial_id(route_id)
    }

    pub(crate) fn supply_reply_id(&self, initial_id: StreamId) -> StreamId {
        self.ids.supply_reply_id(initial_id)
    }
}

//! The egress client: session admission, the App/Net half state machines,
//! and the correlation table
//!
//! One [`Session`] bridges an application-side stream pair onto a freshly
//! opened network-side pair. The application half terminates frames from the
//! app peer; the network half owns the upstream pair, the PROXY v2 header
//! and the pending-header slot. All emissions are queued as [`Transmit`]s
//! and drained by the embedding dispatcher.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use rustc_hash::FxHashMap;
use slab::Slab;
use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::frame::{
    Abort, Begin, Challenge, Data, DataFlags, End, Flush, Frame, FrameType, Reset, Window,
};
use crate::header;
use crate::pool::{BufferPool, Slot};
use crate::proxy::ProxyBeginEx;
use crate::router::{RouteManager, Router, StreamIdSupplier};
use crate::{ReceiverId, StreamId, Transmit};

/// Opaque token naming the frame handler for one half of a session
///
/// Returned by [`ClientFactory::new_stream`] and registered as a throttle
/// with the route manager; the dispatcher passes it back to
/// [`ClientFactory::handle`] with every frame for that stream.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct MessageHandler {
    session: usize,
    half: Half,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
enum Half {
    App,
    Net,
}

/// The main entry point to the library
///
/// Performs no I/O. The dispatcher feeds inbound frames through
/// [`Self::new_stream`] and [`Self::handle`]; encoded outbound frames are
/// collected via [`Self::poll_transmit`].
pub struct ClientFactory<R: RouteManager> {
    router: Router<R>,
    pool: BufferPool,
    scratch: BytesMut,
    sessions: Slab<Session>,
    correlations: FxHashMap<StreamId, MessageHandler>,
    transmits: VecDeque<Transmit>,
}

impl<R: RouteManager> ClientFactory<R> {
    pub fn new(config: Config, manager: R, ids: Box<dyn StreamIdSupplier + Send>) -> Self {
        Self {
            router: Router::new(manager, ids),
            pool: BufferPool::new(config.encode_slot_size, config.encode_slot_count),
            scratch: BytesMut::with_capacity(config.scratch_capacity),
            sessions: Slab::new(),
            correlations: FxHashMap::default(),
            transmits: VecDeque::new(),
        }
    }

    /// Get the next frame to deliver
    pub fn poll_transmit(&mut self) -> Option<Transmit> {
        self.transmits.pop_front()
    }

    /// Admit a new stream opened by `sender`
    ///
    /// `contents` must be a Begin frame. An odd (initial-direction) stream id
    /// starts a fresh session if a route resolves; an even id is matched
    /// against the correlation table, consuming the entry. `None` rejects
    /// the stream.
    pub fn new_stream(
        &mut self,
        frame_type: FrameType,
        mut contents: Bytes,
        sender: ReceiverId,
    ) -> Option<MessageHandler> {
        if frame_type != FrameType::BEGIN {
            return None;
        }
        let begin = match Begin::decode(&mut contents) {
            Ok(begin) => begin,
            Err(_) => {
                debug!("dropping malformed Begin");
                return None;
            }
        };

        if begin.stream_id.is_initial() {
            let route = match self.router.resolve_app(&begin) {
                Some(route) => route,
                None => {
                    debug!(stream = %begin.stream_id, route = begin.route_id, "no route");
                    return None;
                }
            };
            let entry = self.sessions.vacant_entry();
            let handle = entry.key();
            entry.insert(Session::new(
                &mut self.router,
                handle,
                begin.route_id,
                begin.stream_id,
                sender,
                route.correlation_id,
            ));
            trace!(stream = %begin.stream_id, session = handle, "session admitted");
            Some(MessageHandler {
                session: handle,
                half: Half::App,
            })
        } else {
            let handler = self.correlations.remove(&begin.stream_id);
            if handler.is_none() {
                debug!(stream = %begin.stream_id, "no correlation for reply");
            }
            handler
        }
    }

    /// Deliver a frame to a previously admitted handler
    pub fn handle(&mut self, handler: MessageHandler, frame_type: FrameType, contents: Bytes) {
        let Self {
            router,
            pool,
            scratch,
            sessions,
            correlations,
            transmits,
        } = self;

        let Some(session) = sessions.get_mut(handler.session) else {
            trace!(?handler, "frame for drained session ignored");
            return;
        };
        let mut cx = Context {
            router,
            pool,
            scratch,
            correlations,
            transmits,
        };
        match handler.half {
            Half::App => session.on_app_message(&mut cx, frame_type, contents),
            Half::Net => session.on_net_message(&mut cx, frame_type, contents),
        }
        if session.is_drained() {
            session.release_resources(&mut cx);
            sessions.remove(handler.session);
            trace!(session = handler.session, "session drained");
        }
    }

    #[cfg(test)]
    pub(crate) fn session_count(&self) -> usize {
        self.sessions.len()
    }

    #[cfg(test)]
    pub(crate) fn slots_in_use(&self) -> usize {
        self.pool.in_use()
    }

    #[cfg(test)]
    pub(crate) fn has_correlation(&self, stream_id: StreamId) -> bool {
        self.correlations.contains_key(&stream_id)
    }
}

/// Mutable factory state handed down to the session handlers
struct Context<'a, R: RouteManager> {
    router: &'a mut Router<R>,
    pool: &'a mut BufferPool,
    scratch: &'a mut BytesMut,
    correlations: &'a mut FxHashMap<StreamId, MessageHandler>,
    transmits: &'a mut VecDeque<Transmit>,
}

impl<R: RouteManager> Context<'_, R> {
    /// Build `frame` in the shared scratch buffer and queue it for `receiver`
    fn emit(&mut self, receiver: ReceiverId, frame: Frame) {
        let frame_type = frame.ty();
        self.scratch.clear();
        frame.encode(&mut *self.scratch);
        self.transmits.push_back(Transmit {
            receiver,
            frame_type,
            contents: self.scratch.split().freeze(),
        });
    }
}

/// Application-side terminus of a session
struct AppHalf {
    receiver: ReceiverId,
    route_id: u64,
    initial_id: StreamId,
    reply_id: StreamId,
    initial_budget: i32,
    reply_budget: i32,
    reply_padding: i32,
}

/// Network-side terminus, owner of the pending PROXY v2 header
struct NetHalf {
    receiver: ReceiverId,
    route_id: u64,
    initial_id: StreamId,
    reply_id: StreamId,
    encode_slot: Option<Slot>,
    encode_slot_offset: usize,
    initial_budget: i32,
    initial_padding: i32,
    reply_budget: i32,
}

struct Session {
    handle: usize,
    app: AppHalf,
    net: NetHalf,
    /// app-to-upstream direction has terminated
    outbound_closed: bool,
    /// upstream-to-app direction has terminated
    inbound_closed: bool,
}

impl Session {
    fn new<R: RouteManager>(
        router: &mut Router<R>,
        handle: usize,
        app_route_id: u64,
        app_initial_id: StreamId,
        sender: ReceiverId,
        resolved_id: u64,
    ) -> Self {
        let app_reply_id = router.supply_reply_id(app_initial_id);
        let net_initial_id = router.supply_initial_id(resolved_id);
        let net_reply_id = router.supply_reply_id(net_initial_id);
        let net_receiver = router.supply_receiver(net_initial_id);
        Self {
            handle,
            app: AppHalf {
                receiver: sender,
                route_id: app_route_id,
                initial_id: app_initial_id,
                reply_id: app_reply_id,
                initial_budget: 0,
                reply_budget: 0,
                reply_padding: 0,
            },
            net: NetHalf {
                receiver: net_receiver,
                route_id: resolved_id,
                initial_id: net_initial_id,
                reply_id: net_reply_id,
                encode_slot: None,
                encode_slot_offset: 0,
                initial_budget: 0,
                initial_padding: 0,
                reply_budget: 0,
            },
            outbound_closed: false,
            inbound_closed: false,
        }
    }

    fn app_handler(&self) -> MessageHandler {
        MessageHandler {
            session: self.handle,
            half: Half::App,
        }
    }

    fn net_handler(&self) -> MessageHandler {
        MessageHandler {
            session: self.handle,
            half: Half::Net,
        }
    }

    fn is_drained(&self) -> bool {
        self.outbound_closed && self.inbound_closed
    }

    /// Mark the app-to-upstream direction terminated, releasing the
    /// pending-header slot it may still hold
    fn close_outbound<R: RouteManager>(&mut self, cx: &mut Context<'_, R>) {
        self.outbound_closed = true;
        if let Some(slot) = self.net.encode_slot.take() {
            cx.pool.release(slot);
            self.net.encode_slot_offset = 0;
        }
    }

    fn close_inbound(&mut self) {
        self.inbound_closed = true;
    }

    /// Final teardown: drop whatever terminal transitions did not already
    fn release_resources<R: RouteManager>(&mut self, cx: &mut Context<'_, R>) {
        if let Some(slot) = self.net.encode_slot.take() {
            cx.pool.release(slot);
        }
        cx.correlations.remove(&self.net.reply_id);
    }

    // --- application-side handlers -------------------------------------

    fn on_app_message<R: RouteManager>(
        &mut self,
        cx: &mut Context<'_, R>,
        frame_type: FrameType,
        mut contents: Bytes,
    ) {
        let buf = &mut contents;
        let result = match frame_type {
            FrameType::BEGIN => Begin::decode(buf).map(|f| self.on_app_begin(cx, f)),
            FrameType::DATA => Data::decode(buf).map(|f| self.on_app_data(cx, f)),
            FrameType::END => End::decode(buf).map(|f| self.on_app_end(cx, f)),
            FrameType::ABORT => Abort::decode(buf).map(|f| self.on_app_abort(cx, f)),
            FrameType::FLUSH => Flush::decode(buf).map(|f| self.on_app_flush(cx, f)),
            FrameType::WINDOW => Window::decode(buf).map(|f| self.on_app_window(cx, f)),
            FrameType::RESET => Reset::decode(buf).map(|f| self.on_app_reset(cx, f)),
            FrameType::CHALLENGE => Challenge::decode(buf).map(|f| self.on_app_challenge(cx, f)),
            _ => {
                trace!(ty = %frame_type, "ignoring unknown frame");
                Ok(())
            }
        };
        if result.is_err() {
            debug!(ty = %frame_type, "dropping malformed frame");
        }
    }

    fn on_app_begin<R: RouteManager>(&mut self, cx: &mut Context<'_, R>, begin: Begin) {
        let Begin {
            trace_id,
            authorization,
            affinity,
            extension,
            ..
        } = begin;

        let begin_ex = if extension.is_empty() {
            None
        } else {
            let mut extension = extension;
            match ProxyBeginEx::decode(&mut extension) {
                Ok(begin_ex) => Some(begin_ex),
                Err(err) => {
                    debug!(stream = %self.app.initial_id, %err, "rejecting Begin extension");
                    self.do_app_reset(cx, trace_id, authorization);
                    self.close_outbound(cx);
                    self.close_inbound();
                    return;
                }
            }
        };

        cx.router.set_throttle(self.app.reply_id, self.app_handler());

        self.do_net_begin(cx, trace_id, authorization, affinity, begin_ex);
    }

    fn on_app_data<R: RouteManager>(&mut self, cx: &mut Context<'_, R>, data: Data) {
        let Data {
            trace_id,
            authorization,
            flags,
            budget_id,
            reserved,
            payload,
            ..
        } = data;

        self.app.initial_budget -= reserved;

        if self.app.initial_budget < 0 {
            debug!(
                stream = %self.app.initial_id,
                budget = self.app.initial_budget,
                reserved,
                "application data exceeds budget"
            );
            self.do_app_reset(cx, trace_id, authorization);
            self.do_net_abort(cx, trace_id, authorization);
            self.close_outbound(cx);
        } else {
            self.do_net_data(cx, trace_id, authorization, budget_id, flags, reserved, payload);
        }
    }

    fn on_app_end<R: RouteManager>(&mut self, cx: &mut Context<'_, R>, end: End) {
        self.do_net_end(cx, end.trace_id, end.authorization);
        self.close_outbound(cx);
    }

    fn on_app_abort<R: RouteManager>(&mut self, cx: &mut Context<'_, R>, abort: Abort) {
        self.do_net_abort(cx, abort.trace_id, abort.authorization);
        self.close_outbound(cx);
    }

    fn on_app_flush<R: RouteManager>(&mut self, cx: &mut Context<'_, R>, flush: Flush) {
        self.do_net_flush(cx, flush.trace_id, flush.authorization, flush.budget_id, flush.reserved);
    }

    fn on_app_window<R: RouteManager>(&mut self, cx: &mut Context<'_, R>, window: Window) {
        let Window {
            trace_id,
            authorization,
            budget_id,
            credit,
            padding,
            ..
        } = window;

        self.app.reply_budget += credit;
        self.app.reply_padding = padding;

        let max_budget = self.app.reply_budget;
        let min_padding = self.app.reply_padding;
        self.do_net_window(cx, trace_id, authorization, budget_id, max_budget, min_padding);
    }

    fn on_app_reset<R: RouteManager>(&mut self, cx: &mut Context<'_, R>, reset: Reset) {
        self.do_net_reset(cx, reset.trace_id, reset.authorization);
        self.close_inbound();
    }

    fn on_app_challenge<R: RouteManager>(&mut self, cx: &mut Context<'_, R>, challenge: Challenge) {
        self.do_net_challenge(cx, challenge.trace_id, challenge.authorization, challenge.extension);
    }

    // --- application-side emissions ------------------------------------

    fn do_app_begin<R: RouteManager>(
        &mut self,
        cx: &mut Context<'_, R>,
        trace_id: u64,
        authorization: u64,
        affinity: u64,
    ) {
        cx.emit(
            self.app.receiver,
            Frame::Begin(Begin {
                route_id: self.app.route_id,
                stream_id: self.app.reply_id,
                trace_id,
                authorization,
                affinity,
                extension: Bytes::new(),
            }),
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn do_app_data<R: RouteManager>(
        &mut self,
        cx: &mut Context<'_, R>,
        trace_id: u64,
        authorization: u64,
        flags: DataFlags,
        budget_id: u64,
        reserved: i32,
        payload: Bytes,
    ) {
        self.app.reply_budget -= reserved;
        assert!(self.app.reply_budget >= 0, "reply budget overdrawn on send");

        cx.emit(
            self.app.receiver,
            Frame::Data(Data {
                route_id: self.app.route_id,
                stream_id: self.app.reply_id,
                trace_id,
                authorization,
                flags,
                budget_id,
                reserved,
                payload,
            }),
        );
    }

    fn do_app_end<R: RouteManager>(
        &mut self,
        cx: &mut Context<'_, R>,
        trace_id: u64,
        authorization: u64,
    ) {
        cx.emit(
            self.app.receiver,
            Frame::End(End {
                route_id: self.app.route_id,
                stream_id: self.app.reply_id,
                trace_id,
                authorization,
            }),
        );
    }

    fn do_app_abort<R: RouteManager>(
        &mut self,
        cx: &mut Context<'_, R>,
        trace_id: u64,
        authorization: u64,
    ) {
        cx.emit(
            self.app.receiver,
            Frame::Abort(Abort {
                route_id: self.app.route_id,
                stream_id: self.app.reply_id,
                trace_id,
                authorization,
            }),
        );
    }

    fn do_app_flush<R: RouteManager>(
        &mut self,
        cx: &mut Context<'_, R>,
        trace_id: u64,
        authorization: u64,
        budget_id: u64,
        reserved: i32,
    ) {
        cx.emit(
            self.app.receiver,
            Frame::Flush(Flush {
                route_id: self.app.route_id,
                stream_id: self.app.reply_id,
                trace_id,
                authorization,
                budget_id,
                reserved,
            }),
        );
    }

    /// Reset travels in the reply-of-reply direction, against the app's
    /// initial stream
    fn do_app_reset<R: RouteManager>(
        &mut self,
        cx: &mut Context<'_, R>,
        trace_id: u64,
        authorization: u64,
    ) {
        cx.emit(
            self.app.receiver,
            Frame::Reset(Reset {
                route_id: self.app.route_id,
                stream_id: self.app.initial_id,
                trace_id,
                authorization,
            }),
        );
    }

    /// Convert an absolute budget maximum from the net half into
    /// incremental credit toward the app
    fn do_app_window<R: RouteManager>(
        &mut self,
        cx: &mut Context<'_, R>,
        trace_id: u64,
        authorization: u64,
        budget_id: u64,
        max_budget: i32,
        min_padding: i32,
    ) {
        let initial_credit = max_budget - self.app.initial_budget;
        if initial_credit > 0 {
            self.app.initial_budget += initial_credit;
            let initial_padding = min_padding;

            cx.emit(
                self.app.receiver,
                Frame::Window(Window {
                    route_id: self.app.route_id,
                    stream_id: self.app.initial_id,
                    trace_id,
                    authorization,
                    budget_id,
                    credit: initial_credit,
                    padding: initial_padding,
                }),
            );
        }
    }

    fn do_app_challenge<R: RouteManager>(
        &mut self,
        cx: &mut Context<'_, R>,
        trace_id: u64,
        authorization: u64,
        extension: Bytes,
    ) {
        cx.emit(
            self.app.receiver,
            Frame::Challenge(Challenge {
                route_id: self.app.route_id,
                stream_id: self.app.initial_id,
                trace_id,
                authorization,
                extension,
            }),
        );
    }

    // --- network-side handlers -----------------------------------------

    fn on_net_message<R: RouteManager>(
        &mut self,
        cx: &mut Context<'_, R>,
        frame_type: FrameType,
        mut contents: Bytes,
    ) {
        let buf = &mut contents;
        let result = match frame_type {
            FrameType::BEGIN => Begin::decode(buf).map(|f| self.on_net_begin(cx, f)),
            FrameType::DATA => Data::decode(buf).map(|f| self.on_net_data(cx, f)),
            FrameType::END => End::decode(buf).map(|f| self.on_net_end(cx, f)),
            FrameType::ABORT => Abort::decode(buf).map(|f| self.on_net_abort(cx, f)),
            FrameType::FLUSH => Flush::decode(buf).map(|f| self.on_net_flush(cx, f)),
            FrameType::WINDOW => Window::decode(buf).map(|f| self.on_net_window(cx, f)),
            FrameType::RESET => Reset::decode(buf).map(|f| self.on_net_reset(cx, f)),
            FrameType::CHALLENGE => Challenge::decode(buf).map(|f| self.on_net_challenge(cx, f)),
            _ => {
                trace!(ty = %frame_type, "ignoring unknown frame");
                Ok(())
            }
        };
        if result.is_err() {
            debug!(ty = %frame_type, "dropping malformed frame");
        }
    }

    fn on_net_begin<R: RouteManager>(&mut self, cx: &mut Context<'_, R>, begin: Begin) {
        self.do_app_begin(cx, begin.trace_id, begin.authorization, begin.affinity);
    }

    fn on_net_data<R: RouteManager>(&mut self, cx: &mut Context<'_, R>, data: Data) {
        let Data {
            trace_id,
            authorization,
            flags,
            budget_id,
            reserved,
            payload,
            ..
        } = data;

        self.net.reply_budget -= reserved;

        if self.net.reply_budget < 0 {
            debug!(
                stream = %self.net.reply_id,
                budget = self.net.reply_budget,
                reserved,
                "upstream data exceeds budget"
            );
            self.do_net_reset(cx, trace_id, authorization);
            self.do_app_abort(cx, trace_id, authorization);
            self.close_inbound();
        } else {
            self.do_app_data(cx, trace_id, authorization, flags, budget_id, reserved, payload);
        }
    }

    fn on_net_end<R: RouteManager>(&mut self, cx: &mut Context<'_, R>, end: End) {
        self.do_app_end(cx, end.trace_id, end.authorization);
        self.close_inbound();
    }

    fn on_net_abort<R: RouteManager>(&mut self, cx: &mut Context<'_, R>, abort: Abort) {
        self.do_app_abort(cx, abort.trace_id, abort.authorization);
        self.close_inbound();
    }

    fn on_net_flush<R: RouteManager>(&mut self, cx: &mut Context<'_, R>, flush: Flush) {
        self.do_app_flush(cx, flush.trace_id, flush.authorization, flush.budget_id, flush.reserved);
    }

    fn on_net_window<R: RouteManager>(&mut self, cx: &mut Context<'_, R>, window: Window) {
        let Window {
            trace_id,
            authorization,
            budget_id,
            credit,
            padding,
            ..
        } = window;

        self.net.initial_budget += credit;
        self.net.initial_padding = padding;

        if let Some(slot) = self.net.encode_slot {
            let header_len = self.net.encode_slot_offset;
            let reserved = header_len as i32 + padding;
            if self.net.initial_budget < reserved {
                trace!(
                    stream = %self.net.initial_id,
                    budget = self.net.initial_budget,
                    reserved,
                    "pending header awaits further credit"
                );
                return;
            }
            let payload = Bytes::copy_from_slice(&cx.pool.buffer(slot)[..header_len]);

            self.do_net_data(
                cx,
                trace_id,
                authorization,
                budget_id,
                DataFlags::FUSED,
                reserved,
                payload,
            );

            cx.pool.release(slot);
            self.net.encode_slot = None;
            self.net.encode_slot_offset = 0;
        }

        let max_budget = self.net.initial_budget;
        let min_padding = self.net.initial_padding;
        self.do_app_window(cx, trace_id, authorization, budget_id, max_budget, min_padding);
    }

    fn on_net_reset<R: RouteManager>(&mut self, cx: &mut Context<'_, R>, reset: Reset) {
        self.do_app_reset(cx, reset.trace_id, reset.authorization);
        self.close_outbound(cx);
    }

    fn on_net_challenge<R: RouteManager>(&mut self, cx: &mut Context<'_, R>, challenge: Challenge) {
        self.do_app_challenge(cx, challenge.trace_id, challenge.authorization, challenge.extension);
    }

    // --- network-side emissions ----------------------------------------

    fn do_net_begin<R: RouteManager>(
        &mut self,
        cx: &mut Context<'_, R>,
        trace_id: u64,
        authorization: u64,
        affinity: u64,
        begin_ex: Option<ProxyBeginEx>,
    ) {
        debug_assert!(self.net.encode_slot.is_none(), "encode slot already held");
        let Some(slot) = cx.pool.acquire(self.net.initial_id.0) else {
            warn!(stream = %self.net.initial_id, "no encode slot available");
            self.do_app_reset(cx, trace_id, authorization);
            self.close_outbound(cx);
            self.close_inbound();
            return;
        };

        let buffer = cx.pool.buffer_mut(slot);
        let encoded = match begin_ex {
            Some(ref begin_ex) => header::encode_proxy(buffer, begin_ex),
            None => header::encode_local(buffer),
        };
        let offset = match encoded {
            Ok(offset) => offset,
            Err(err) => {
                warn!(stream = %self.net.initial_id, %err, "header encoding failed");
                cx.pool.release(slot);
                self.do_app_reset(cx, trace_id, authorization);
                self.close_outbound(cx);
                self.close_inbound();
                return;
            }
        };
        self.net.encode_slot = Some(slot);
        self.net.encode_slot_offset = offset;

        cx.correlations.insert(self.net.reply_id, self.net_handler());
        cx.router.set_throttle(self.net.initial_id, self.net_handler());

        cx.emit(
            self.net.receiver,
            Frame::Begin(Begin {
                route_id: self.net.route_id,
                stream_id: self.net.initial_id,
                trace_id,
                authorization,
                affinity,
                extension: Bytes::new(),
            }),
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn do_net_data<R: RouteManager>(
        &mut self,
        cx: &mut Context<'_, R>,
        trace_id: u64,
        authorization: u64,
        budget_id: u64,
        flags: DataFlags,
        reserved: i32,
        payload: Bytes,
    ) {
        self.net.initial_budget -= reserved;
        assert!(self.net.initial_budget >= 0, "initial budget overdrawn on send");

        cx.emit(
            self.net.receiver,
            Frame::Data(Data {
                route_id: self.net.route_id,
                stream_id: self.net.initial_id,
                trace_id,
                authorization,
                flags,
                budget_id,
                reserved,
                payload,
            }),
        );
    }

    fn do_net_end<R: RouteManager>(
        &mut self,
        cx: &mut Context<'_, R>,
        trace_id: u64,
        authorization: u64,
    ) {
        cx.emit(
            self.net.receiver,
            Frame::End(End {
                route_id: self.net.route_id,
                stream_id: self.net.initial_id,
                trace_id,
                authorization,
            }),
        );
    }

    fn do_net_abort<R: RouteManager>(
        &mut self,
        cx: &mut Context<'_, R>,
        trace_id: u64,
        authorization: u64,
    ) {
        cx.emit(
            self.net.receiver,
            Frame::Abort(Abort {
                route_id: self.net.route_id,
                stream_id: self.net.initial_id,
                trace_id,
                authorization,
            }),
        );
    }

    fn do_net_flush<R: RouteManager>(
        &mut self,
        cx: &mut Context<'_, R>,
        trace_id: u64,
        authorization: u64,
        budget_id: u64,
        reserved: i32,
    ) {
        cx.emit(
            self.net.receiver,
            Frame::Flush(Flush {
                route_id: self.net.route_id,
                stream_id: self.net.initial_id,
                trace_id,
                authorization,
                budget_id,
                reserved,
            }),
        );
    }

    /// Cancel the inbound direction, dropping the correlation entry so the
    /// upstream reply can no longer attach
    fn do_net_reset<R: RouteManager>(
        &mut self,
        cx: &mut Context<'_, R>,
        trace_id: u64,
        authorization: u64,
    ) {
        cx.correlations.remove(&self.net.reply_id);
        cx.emit(
            self.net.receiver,
            Frame::Reset(Reset {
                route_id: self.net.route_id,
                stream_id: self.net.reply_id,
                trace_id,
                authorization,
            }),
        );
    }

    fn do_net_window<R: RouteManager>(
        &mut self,
        cx: &mut Context<'_, R>,
        trace_id: u64,
        authorization: u64,
        budget_id: u64,
        max_budget: i32,
        min_padding: i32,
    ) {
        let reply_credit = max_budget - self.net.reply_budget;
        if reply_credit > 0 {
            self.net.reply_budget += reply_credit;
            let reply_padding = min_padding;

            cx.emit(
                self.net.receiver,
                Frame::Window(Window {
                    route_id: self.net.route_id,
                    stream_id: self.net.reply_id,
                    trace_id,
                    authorization,
                    budget_id,
                    credit: reply_credit,
                    padding: reply_padding,
                }),
            );
        }
    }

    fn do_net_challenge<R: RouteManager>(
        &mut self,
        cx: &mut Context<'_, R>,
        trace_id: u64,
        authorization: u64,
        extension: Bytes,
    ) {
        cx.emit(
            self.net.receiver,
            Frame::Challenge(Challenge {
                route_id: self.net.route_id,
                stream_id: self.net.reply_id,
                trace_id,
                authorization,
                extension,
            }),
        );
    }
}

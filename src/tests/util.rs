use std::cell::RefCell;
use std::rc::Rc;

use bytes::{Bytes, BytesMut};
use rustc_hash::FxHashMap;
use tracing::subscriber::DefaultGuard;

use crate::config::Config;
use crate::frame::{Begin, Frame, FrameType, Window};
use crate::router::{Route, RouteManager, SequentialIdSupplier};
use crate::{ClientFactory, MessageHandler, ReceiverId, StreamId};

pub(super) fn subscribe() -> DefaultGuard {
    let sub = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .finish();
    tracing::subscriber::set_default(sub)
}

pub(super) const APP_RECEIVER: ReceiverId = ReceiverId(0xa99);
pub(super) const APP_ROUTE: u64 = 0x10;
pub(super) const APP_INITIAL: StreamId = StreamId(5);
pub(super) const APP_REPLY: StreamId = StreamId(4);
pub(super) const RESOLVED: u64 = 0x77;

// ids handed out by the sequential supplier to the first session
pub(super) const NET_INITIAL: StreamId = StreamId(1);
pub(super) const NET_REPLY: StreamId = StreamId(0);
pub(super) const NET_RECEIVER: ReceiverId = ReceiverId(NET_INITIAL.0);

#[derive(Default)]
struct RouterInner {
    routes: FxHashMap<u64, Route>,
    throttles: FxHashMap<StreamId, MessageHandler>,
}

/// Shared-handle route manager so tests can observe throttle registrations
/// after the factory takes ownership
#[derive(Clone, Default)]
pub(super) struct TestRouter(Rc<RefCell<RouterInner>>);

impl TestRouter {
    pub(super) fn install_route(&self, route_id: u64, correlation_id: u64) {
        self.0
            .borrow_mut()
            .routes
            .insert(route_id, Route { correlation_id });
    }

    pub(super) fn throttle(&self, stream_id: StreamId) -> Option<MessageHandler> {
        self.0.borrow().throttles.get(&stream_id).copied()
    }
}

impl RouteManager for TestRouter {
    fn resolve_app(&mut self, begin: &Begin) -> Option<Route> {
        self.0.borrow().routes.get(&begin.route_id).copied()
    }

    fn supply_receiver(&mut self, stream_id: StreamId) -> ReceiverId {
        ReceiverId(stream_id.0)
    }

    fn set_throttle(&mut self, stream_id: StreamId, handler: MessageHandler) {
        self.0.borrow_mut().throttles.insert(stream_id, handler);
    }
}

pub(super) struct Driver {
    pub(super) factory: ClientFactory<TestRouter>,
    pub(super) router: TestRouter,
}

impl Driver {
    pub(super) fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub(super) fn with_config(config: Config) -> Self {
        let router = TestRouter::default();
        router.install_route(APP_ROUTE, RESOLVED);
        let factory = ClientFactory::new(
            config,
            router.clone(),
            Box::new(SequentialIdSupplier::new()),
        );
        Self { factory, router }
    }

    pub(super) fn encode(frame: &Frame) -> Bytes {
        let mut out = BytesMut::new();
        frame.encode(&mut out);
        out.freeze()
    }

    /// Open an app-side session: admission through `new_stream`, then the
    /// dispatcher's redelivery of the Begin to the returned handler
    pub(super) fn connect(&mut self, extension: Bytes) -> MessageHandler {
        self.connect_on(APP_INITIAL, extension)
            .expect("route should resolve")
    }

    pub(super) fn connect_on(
        &mut self,
        stream_id: StreamId,
        extension: Bytes,
    ) -> Option<MessageHandler> {
        let begin = Frame::Begin(Begin {
            route_id: APP_ROUTE,
            stream_id,
            trace_id: 1,
            authorization: 0,
            affinity: 0,
            extension,
        });
        let contents = Self::encode(&begin);
        let handler = self
            .factory
            .new_stream(FrameType::BEGIN, contents.clone(), APP_RECEIVER)?;
        self.factory.handle(handler, FrameType::BEGIN, contents);
        Some(handler)
    }

    pub(super) fn deliver(&mut self, handler: MessageHandler, frame: Frame) {
        self.factory.handle(handler, frame.ty(), Self::encode(&frame));
    }

    pub(super) fn window(
        &mut self,
        handler: MessageHandler,
        stream_id: StreamId,
        credit: i32,
        padding: i32,
    ) {
        self.deliver(
            handler,
            Frame::Window(Window {
                route_id: 0,
                stream_id,
                trace_id: 2,
                authorization: 0,
                budget_id: 9,
                credit,
                padding,
            }),
        );
    }

    /// The handler registered as throttle for the upstream initial stream
    pub(super) fn net_throttle(&self) -> MessageHandler {
        self.router
            .throttle(NET_INITIAL)
            .expect("net throttle registered")
    }

    pub(super) fn drain(&mut self) -> Vec<(ReceiverId, Frame)> {
        let mut out = Vec::new();
        while let Some(transmit) = self.factory.poll_transmit() {
            let mut contents = transmit.contents;
            let frame = Frame::decode(transmit.frame_type, &mut contents)
                .expect("emitted frame type is known")
                .expect("emitted frame is well-formed");
            out.push((transmit.receiver, frame));
        }
        out
    }
}

use assert_matches::assert_matches;
use bytes::Bytes;
use hex_literal::hex;

use crate::frame::{
    Abort, Begin, Challenge, Data, DataFlags, End, Flush, Frame, FrameType, Reset,
};
use crate::proxy::{ProxyAddress, ProxyAddressInet, ProxyBeginEx, Transport};
use crate::{Config, ReceiverId, StreamId};

mod util;
use util::*;

fn inet_extension() -> Bytes {
    let ex = ProxyBeginEx {
        address: ProxyAddress::Inet(ProxyAddressInet {
            protocol: Transport::Stream,
            source: [10, 0, 0, 1].into(),
            destination: [10, 0, 0, 2].into(),
            source_port: 1111,
            destination_port: 80,
        }),
        infos: Vec::new(),
    };
    let mut out = bytes::BytesMut::new();
    ex.encode(&mut out);
    out.freeze()
}

#[test]
fn local_command_flushes_on_first_window() {
    let _guard = subscribe();
    let mut driver = Driver::new();
    let _app = driver.connect(Bytes::new());

    // Begin precedes any Data on the upstream initial stream
    let out = driver.drain();
    assert_matches!(
        out.as_slice(),
        [(NET_RECEIVER, Frame::Begin(Begin { stream_id: NET_INITIAL, .. }))]
    );
    assert_eq!(driver.factory.slots_in_use(), 1);

    let net = driver.net_throttle();
    driver.window(net, NET_INITIAL, 64, 0);

    let out = driver.drain();
    assert_eq!(out.len(), 2);
    assert_matches!(
        &out[0],
        (NET_RECEIVER, Frame::Data(data))
            if data.stream_id == NET_INITIAL
                && data.flags == DataFlags::FUSED
                && data.reserved == 16
                && data.payload[..] == hex!("0d0a0d0a 000d0a51 5549540a 20000000")[..]
    );
    // capacity left after the flush reaches the app as incremental credit
    assert_matches!(
        &out[1],
        (APP_RECEIVER, Frame::Window(window))
            if window.stream_id == APP_INITIAL && window.credit == 48
    );
    assert_eq!(driver.factory.slots_in_use(), 0);
}

#[test]
fn proxy_command_header_precedes_data() {
    let _guard = subscribe();
    let mut driver = Driver::new();
    let app = driver.connect(inet_extension());
    driver.drain();

    let net = driver.net_throttle();
    driver.window(net, NET_INITIAL, 64, 0);

    let out = driver.drain();
    assert_matches!(
        &out[0],
        (NET_RECEIVER, Frame::Data(data))
            if data.flags == DataFlags::FUSED
                && data.reserved == 28
                && data.payload[..] == hex!(
                    "0d0a0d0a 000d0a51 5549540a"
                    "21 11 000c"
                    "0a000001 0a000002"
                    "0457 0050"
                )[..]
    );
    assert_matches!(
        &out[1],
        (APP_RECEIVER, Frame::Window(window)) if window.credit == 36
    );

    // application payload flows after the header, flags and bytes untouched
    driver.deliver(
        app,
        Frame::Data(Data {
            route_id: 0,
            stream_id: APP_INITIAL,
            trace_id: 3,
            authorization: 0,
            flags: DataFlags(0x01),
            budget_id: 0,
            reserved: 20,
            payload: Bytes::from_static(b"ping"),
        }),
    );
    let out = driver.drain();
    assert_matches!(
        out.as_slice(),
        [(NET_RECEIVER, Frame::Data(data))]
            if data.stream_id == NET_INITIAL
                && data.flags == DataFlags(0x01)
                && data.reserved == 20
                && data.payload[..] == b"ping"[..]
    );
}

#[test]
fn insufficient_window_holds_header() {
    let _guard = subscribe();
    let mut driver = Driver::new();
    driver.connect(Bytes::new());
    driver.drain();

    let net = driver.net_throttle();
    driver.window(net, NET_INITIAL, 10, 0);

    // slot stays held; neither Data nor an app Window may be emitted, or
    // application bytes could overtake the header
    assert!(driver.drain().is_empty());
    assert_eq!(driver.factory.slots_in_use(), 1);

    // topping the budget up to exactly header length flushes and leaves
    // nothing for the app
    driver.window(net, NET_INITIAL, 6, 0);
    let out = driver.drain();
    assert_matches!(
        out.as_slice(),
        [(NET_RECEIVER, Frame::Data(data))] if data.reserved == 16
    );
    assert_eq!(driver.factory.slots_in_use(), 0);
}

#[test]
fn flush_reserves_header_plus_padding() {
    let _guard = subscribe();
    let mut driver = Driver::new();
    driver.connect(Bytes::new());
    driver.drain();

    let net = driver.net_throttle();
    driver.window(net, NET_INITIAL, 20, 4);

    let out = driver.drain();
    assert_matches!(
        out.as_slice(),
        [(NET_RECEIVER, Frame::Data(data))]
            if data.reserved == 20 && data.payload.len() == 16
    );
}

#[test]
fn window_credit_is_incremental() {
    let _guard = subscribe();
    let mut driver = Driver::new();
    driver.connect(Bytes::new());
    driver.drain();

    let net = driver.net_throttle();
    driver.window(net, NET_INITIAL, 66, 0);
    let out = driver.drain();
    assert_matches!(
        &out[1],
        (APP_RECEIVER, Frame::Window(window)) if window.credit == 50
    );

    // a further absolute maximum of 60 yields only the 10-byte delta
    driver.window(net, NET_INITIAL, 10, 0);
    let out = driver.drain();
    assert_matches!(
        out.as_slice(),
        [(APP_RECEIVER, Frame::Window(window))] if window.credit == 10
    );
}

#[test]
fn app_budget_violation_resets_and_aborts() {
    let _guard = subscribe();
    let mut driver = Driver::new();
    let app = driver.connect(Bytes::new());
    driver.drain();

    let net = driver.net_throttle();
    driver.window(net, NET_INITIAL, 66, 0);
    driver.drain();

    // the app was granted 50 bytes; overspending must not reach the upstream
    driver.deliver(
        app,
        Frame::Data(Data {
            route_id: 0,
            stream_id: APP_INITIAL,
            trace_id: 4,
            authorization: 0,
            flags: DataFlags(0),
            budget_id: 0,
            reserved: 100,
            payload: Bytes::from_static(&[0; 100]),
        }),
    );

    let out = driver.drain();
    assert_matches!(
        out.as_slice(),
        [
            (APP_RECEIVER, Frame::Reset(Reset { stream_id: APP_INITIAL, .. })),
            (NET_RECEIVER, Frame::Abort(Abort { stream_id: NET_INITIAL, .. })),
        ]
    );
    assert_eq!(driver.factory.session_count(), 1);
}

#[test]
fn reply_begin_consumes_correlation() {
    let _guard = subscribe();
    let mut driver = Driver::new();
    driver.connect(Bytes::new());
    driver.drain();
    assert!(driver.factory.has_correlation(NET_REPLY));

    let begin = Frame::Begin(Begin {
        route_id: RESOLVED,
        stream_id: NET_REPLY,
        trace_id: 6,
        authorization: 0,
        affinity: 0,
        extension: Bytes::new(),
    });
    let contents = Driver::encode(&begin);
    let net = driver
        .factory
        .new_stream(FrameType::BEGIN, contents.clone(), ReceiverId(0xbeef))
        .expect("correlated handler");
    assert!(!driver.factory.has_correlation(NET_REPLY));

    // a second Begin for the same reply id finds nothing
    assert!(driver
        .factory
        .new_stream(FrameType::BEGIN, contents.clone(), ReceiverId(0xbeef))
        .is_none());

    driver.factory.handle(net, FrameType::BEGIN, contents);
    let out = driver.drain();
    assert_matches!(
        out.as_slice(),
        [(APP_RECEIVER, Frame::Begin(Begin { stream_id: APP_REPLY, .. }))]
    );
}

#[test]
fn reply_data_forwarding_and_violation() {
    let _guard = subscribe();
    let mut driver = Driver::new();
    let app = driver.connect(Bytes::new());
    driver.drain();

    // the app's Window propagates upstream as reply credit
    driver.window(app, APP_REPLY, 100, 8);
    let out = driver.drain();
    assert_matches!(
        out.as_slice(),
        [(NET_RECEIVER, Frame::Window(window))]
            if window.stream_id == NET_REPLY && window.credit == 100 && window.padding == 8
    );

    let begin = Frame::Begin(Begin {
        route_id: RESOLVED,
        stream_id: NET_REPLY,
        trace_id: 6,
        authorization: 0,
        affinity: 0,
        extension: Bytes::new(),
    });
    let contents = Driver::encode(&begin);
    let net = driver
        .factory
        .new_stream(FrameType::BEGIN, contents.clone(), ReceiverId(0xbeef))
        .unwrap();
    driver.factory.handle(net, FrameType::BEGIN, contents);
    driver.drain();

    driver.deliver(
        net,
        Frame::Data(Data {
            route_id: RESOLVED,
            stream_id: NET_REPLY,
            trace_id: 7,
            authorization: 0,
            flags: DataFlags(0x03),
            budget_id: 0,
            reserved: 40,
            payload: Bytes::from_static(b"pong"),
        }),
    );
    let out = driver.drain();
    assert_matches!(
        out.as_slice(),
        [(APP_RECEIVER, Frame::Data(data))]
            if data.stream_id == APP_REPLY && data.reserved == 40 && data.payload[..] == b"pong"[..]
    );

    // 60 bytes of reply budget remain; a 100-byte frame is a violation
    driver.deliver(
        net,
        Frame::Data(Data {
            route_id: RESOLVED,
            stream_id: NET_REPLY,
            trace_id: 8,
            authorization: 0,
            flags: DataFlags(0),
            budget_id: 0,
            reserved: 100,
            payload: Bytes::from_static(&[0; 100]),
        }),
    );
    let out = driver.drain();
    assert_matches!(
        out.as_slice(),
        [
            (NET_RECEIVER, Frame::Reset(Reset { stream_id: NET_REPLY, .. })),
            (APP_RECEIVER, Frame::Abort(Abort { stream_id: APP_REPLY, .. })),
        ]
    );
}

#[test]
fn end_propagates_and_releases_slot() {
    let _guard = subscribe();
    let mut driver = Driver::new();
    let app = driver.connect(Bytes::new());
    driver.drain();
    assert_eq!(driver.factory.slots_in_use(), 1);

    driver.deliver(
        app,
        Frame::End(End {
            route_id: 0,
            stream_id: APP_INITIAL,
            trace_id: 9,
            authorization: 0,
        }),
    );
    let out = driver.drain();
    assert_matches!(
        out.as_slice(),
        [(NET_RECEIVER, Frame::End(End { stream_id: NET_INITIAL, .. }))]
    );
    assert_eq!(driver.factory.slots_in_use(), 0);
}

#[test]
fn abort_before_window_releases_slot() {
    let _guard = subscribe();
    let mut driver = Driver::new();
    let app = driver.connect(Bytes::new());
    driver.drain();

    driver.deliver(
        app,
        Frame::Abort(Abort {
            route_id: 0,
            stream_id: APP_INITIAL,
            trace_id: 9,
            authorization: 0,
        }),
    );
    let out = driver.drain();
    assert_matches!(
        out.as_slice(),
        [(NET_RECEIVER, Frame::Abort(Abort { stream_id: NET_INITIAL, .. }))]
    );
    assert_eq!(driver.factory.slots_in_use(), 0);
}

#[test]
fn reset_teardown_is_symmetric() {
    let _guard = subscribe();
    let mut driver = Driver::new();
    let app = driver.connect(Bytes::new());
    driver.drain();

    // upstream cancels the outbound direction
    let net = driver.net_throttle();
    driver.deliver(
        net,
        Frame::Reset(Reset {
            route_id: RESOLVED,
            stream_id: NET_INITIAL,
            trace_id: 10,
            authorization: 0,
        }),
    );
    let out = driver.drain();
    assert_matches!(
        out.as_slice(),
        [(APP_RECEIVER, Frame::Reset(Reset { stream_id: APP_INITIAL, .. }))]
    );
    assert_eq!(driver.factory.slots_in_use(), 0);
    assert!(driver.factory.has_correlation(NET_REPLY));

    // the app cancels the inbound direction; the correlation entry goes
    // with it and the session drains
    driver.deliver(
        app,
        Frame::Reset(Reset {
            route_id: 0,
            stream_id: APP_REPLY,
            trace_id: 11,
            authorization: 0,
        }),
    );
    let out = driver.drain();
    assert_matches!(
        out.as_slice(),
        [(NET_RECEIVER, Frame::Reset(Reset { stream_id: NET_REPLY, .. }))]
    );
    assert!(!driver.factory.has_correlation(NET_REPLY));
    assert_eq!(driver.factory.session_count(), 0);

    // late frames for the drained session are ignored
    driver.deliver(
        app,
        Frame::End(End {
            route_id: 0,
            stream_id: APP_INITIAL,
            trace_id: 12,
            authorization: 0,
        }),
    );
    assert!(driver.drain().is_empty());
}

#[test]
fn challenge_and_flush_pass_through() {
    let _guard = subscribe();
    let mut driver = Driver::new();
    let app = driver.connect(Bytes::new());
    driver.drain();
    let net = driver.net_throttle();

    driver.deliver(
        app,
        Frame::Flush(Flush {
            route_id: 0,
            stream_id: APP_INITIAL,
            trace_id: 13,
            authorization: 0,
            budget_id: 3,
            reserved: 7,
        }),
    );
    let out = driver.drain();
    assert_matches!(
        out.as_slice(),
        [(NET_RECEIVER, Frame::Flush(flush))]
            if flush.stream_id == NET_INITIAL && flush.budget_id == 3 && flush.reserved == 7
    );

    driver.deliver(
        net,
        Frame::Challenge(Challenge {
            route_id: RESOLVED,
            stream_id: NET_INITIAL,
            trace_id: 14,
            authorization: 0,
            extension: Bytes::from_static(b"auth me"),
        }),
    );
    let out = driver.drain();
    assert_matches!(
        out.as_slice(),
        [(APP_RECEIVER, Frame::Challenge(challenge))]
            if challenge.stream_id == APP_INITIAL && challenge.extension[..] == b"auth me"[..]
    );

    driver.deliver(
        app,
        Frame::Challenge(Challenge {
            route_id: 0,
            stream_id: APP_INITIAL,
            trace_id: 15,
            authorization: 0,
            extension: Bytes::from_static(b"response"),
        }),
    );
    let out = driver.drain();
    assert_matches!(
        out.as_slice(),
        [(NET_RECEIVER, Frame::Challenge(challenge))]
            if challenge.stream_id == NET_REPLY && challenge.extension[..] == b"response"[..]
    );
}

#[test]
fn slot_exhaustion_aborts_session() {
    let _guard = subscribe();
    let mut config = Config::default();
    config.encode_slot_count(1);
    let mut driver = Driver::with_config(config);

    driver.connect(Bytes::new());
    driver.drain();
    assert_eq!(driver.factory.slots_in_use(), 1);

    driver.connect_on(StreamId(7), Bytes::new()).unwrap();
    let out = driver.drain();
    assert_matches!(
        out.as_slice(),
        [(APP_RECEIVER, Frame::Reset(Reset { stream_id: StreamId(7), .. }))]
    );
    assert_eq!(driver.factory.session_count(), 1);
    assert_eq!(driver.factory.slots_in_use(), 1);
}

#[test]
fn malformed_begin_extension_rejected() {
    let _guard = subscribe();
    let mut driver = Driver::new();
    driver.connect(Bytes::from_static(&[0xff]));

    let out = driver.drain();
    assert_matches!(
        out.as_slice(),
        [(APP_RECEIVER, Frame::Reset(Reset { stream_id: APP_INITIAL, .. }))]
    );
    assert_eq!(driver.factory.session_count(), 0);
    assert_eq!(driver.factory.slots_in_use(), 0);
}

#[test]
fn admission_rejects_unroutable_and_uncorrelated() {
    let _guard = subscribe();
    let mut driver = Driver::new();

    let begin = Frame::Begin(Begin {
        route_id: 0xdead,
        stream_id: APP_INITIAL,
        trace_id: 1,
        authorization: 0,
        affinity: 0,
        extension: Bytes::new(),
    });
    assert!(driver
        .factory
        .new_stream(FrameType::BEGIN, Driver::encode(&begin), APP_RECEIVER)
        .is_none());

    let begin = Frame::Begin(Begin {
        route_id: APP_ROUTE,
        stream_id: StreamId(8),
        trace_id: 1,
        authorization: 0,
        affinity: 0,
        extension: Bytes::new(),
    });
    assert!(driver
        .factory
        .new_stream(FrameType::BEGIN, Driver::encode(&begin), APP_RECEIVER)
        .is_none());

    assert!(driver
        .factory
        .new_stream(FrameType::DATA, Bytes::new(), APP_RECEIVER)
        .is_none());
}

#[test]
fn unknown_frame_type_ignored() {
    let _guard = subscribe();
    let mut driver = Driver::new();
    let app = driver.connect(Bytes::new());
    driver.drain();

    driver
        .factory
        .handle(app, FrameType::from_id(0x7f), Bytes::new());
    assert!(driver.drain().is_empty());
    assert_eq!(driver.factory.session_count(), 1);
}

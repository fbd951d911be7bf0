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

use rs_matter_im::dm::{ImConfig, ManualTimer};
use rs_matter_im::im::{GenericPath, IMStatusCode, OpCode};
use rs_matter_im::transport::MessageMeta;

use common::*;

mod common;

fn read_once(req: &[u8]) -> Vec<Sent> {
    let handler = OnOffHandler::new();
    let transport = RecordingTransport::default();
    let timer = ManualTimer::new();
    let mut engine = engine::<4>(ImConfig::new(), &handler, &transport, &timer);

    let session = session(1, 0x1234);

    engine
        .on_read_request(session, exchange(&session, 0), req)
        .unwrap();

    transport.take_sent()
}

#[test]
fn test_read_single_attribute() {
    init_env_logger();

    let handler = OnOffHandler::new();
    let transport = RecordingTransport::default();
    let timer = ManualTimer::new();
    let mut engine = engine::<4>(ImConfig::new(), &handler, &transport, &timer);

    handler.set(1, true);

    let session = session(1, 0x1234);
    let exchange = exchange(&session, 0);

    engine
        .on_message(
            session,
            exchange,
            &MessageMeta::from(OpCode::ReadRequest),
            &read_req(&[on_off(1, ATTR_ON_OFF)], &[], &[]),
        )
        .unwrap();

    let sent = transport.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].exchange, exchange);

    let report = report_of(&sent[0].payload);
    assert_eq!(report.subscription_id, None);
    assert_eq!(report.attrs, vec![Item::Data(on_off(1, ATTR_ON_OFF), Some(true))]);
    assert!(!report.more_chunks);
    assert!(report.suppress_response);

    assert_eq!(transport.take_closed(), vec![exchange]);
    assert_eq!(engine.handler_count(), 0);
}

#[test]
fn test_read_is_deterministic() {
    init_env_logger();

    let req = read_req(&[GenericPath::default()], &[], &[]);

    let first = read_once(&req);
    let second = read_once(&req);

    assert_eq!(first.len(), 1);
    assert_eq!(first[0].payload, second[0].payload);
}

#[test]
fn test_overlapping_wildcards_report_each_attribute_once() {
    init_env_logger();

    let sent = read_once(&read_req(
        &[
            GenericPath::new(None, Some(ON_OFF), Some(ATTR_ON_OFF)),
            GenericPath::new(Some(1), None, None),
        ],
        &[],
        &[],
    ));

    let paths = reports(&sent)
        .into_iter()
        .flat_map(|(_, report)| report.attrs)
        .map(|item| item.path())
        .collect::<Vec<_>>();

    assert_eq!(
        paths,
        vec![
            on_off(1, ATTR_ON_OFF),
            on_off(2, ATTR_ON_OFF),
            on_off(1, ATTR_REVISION),
        ]
    );
}

#[test]
fn test_unsupported_concrete_paths() {
    init_env_logger();

    let sent = read_once(&read_req(
        &[
            on_off(3, ATTR_ON_OFF),
            GenericPath::new(Some(1), Some(8), Some(0)),
            on_off(2, ATTR_REVISION),
            // Wildcards never report what the node does not have
            GenericPath::new(None, Some(8), None),
        ],
        &[],
        &[],
    ));

    let (_, report) = reports(&sent).remove(0);

    assert_eq!(
        report.attrs,
        vec![
            Item::Status(on_off(3, ATTR_ON_OFF), IMStatusCode::UnsupportedEndpoint),
            Item::Status(
                GenericPath::new(Some(1), Some(8), Some(0)),
                IMStatusCode::UnsupportedCluster
            ),
            Item::Status(on_off(2, ATTR_REVISION), IMStatusCode::UnsupportedAttribute),
        ]
    );
}

#[test]
fn test_dataver_filter() {
    init_env_logger();

    let handler = OnOffHandler::new();
    let transport = RecordingTransport::default();
    let timer = ManualTimer::new();
    let mut engine = engine::<4>(ImConfig::new(), &handler, &transport, &timer);

    handler.set(1, true);

    let session = session(1, 0x1234);
    let wildcard = GenericPath::new(None, Some(ON_OFF), Some(ATTR_ON_OFF));

    // Up to date on endpoint 1, stale on endpoint 2
    let filters = [
        (1, ON_OFF, handler.dataver(1)),
        (2, ON_OFF, handler.dataver(2).wrapping_add(5)),
    ];

    engine
        .on_read_request(
            session,
            exchange(&session, 0),
            &read_req(&[wildcard], &[], &filters),
        )
        .unwrap();

    let (_, report) = reports(&transport.take_sent()).remove(0);
    assert_eq!(report.attrs, vec![Item::Data(on_off(2, ATTR_ON_OFF), Some(false))]);

    handler.set(1, false);

    engine
        .on_read_request(
            session,
            exchange(&session, 1),
            &read_req(&[wildcard], &[], &filters),
        )
        .unwrap();

    let (_, report) = reports(&transport.take_sent()).remove(0);
    assert_eq!(
        report.attrs,
        vec![
            Item::Data(on_off(1, ATTR_ON_OFF), Some(false)),
            Item::Data(on_off(2, ATTR_ON_OFF), Some(false)),
        ]
    );
}

#[test]
fn test_chunked_read_resumes_where_it_stopped() {
    init_env_logger();

    let req = read_req(&[GenericPath::default()], &[], &[]);

    let (_, whole) = reports(&read_once(&req)).remove(0);
    assert_eq!(whole.attrs.len(), 3);

    let handler = OnOffHandler::new();
    let transport = RecordingTransport::default();
    let timer = ManualTimer::new();

    let config = ImConfig {
        max_chunk_size: 64,
        ..ImConfig::new()
    };

    let mut engine = engine::<4>(config, &handler, &transport, &timer);

    let session = session(1, 0x1234);
    let exchange = exchange(&session, 0);

    engine.on_read_request(session, exchange, &req).unwrap();

    let mut chunks = Vec::new();

    loop {
        let sent = transport.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].exchange, exchange);

        let report = report_of(&sent[0].payload);
        assert!(!report.attrs.is_empty());

        let more = report.more_chunks;
        chunks.push(report);

        if !more {
            break;
        }

        assert!(transport.take_closed().is_empty());

        engine
            .on_status_response(exchange, &status_resp(IMStatusCode::Success))
            .unwrap();
    }

    assert!(chunks.len() > 1);
    assert!(chunks.iter().rev().skip(1).all(|chunk| !chunk.suppress_response));
    assert!(chunks.last().unwrap().suppress_response);

    let items = chunks
        .into_iter()
        .flat_map(|chunk| chunk.attrs)
        .collect::<Vec<_>>();

    assert_eq!(items, whole.attrs);
    assert_eq!(transport.take_closed(), vec![exchange]);
    assert_eq!(engine.handler_count(), 0);
}

#[test]
fn test_peer_aborts_chunked_read() {
    init_env_logger();

    let handler = OnOffHandler::new();
    let transport = RecordingTransport::default();
    let timer = ManualTimer::new();

    let config = ImConfig {
        max_chunk_size: 64,
        ..ImConfig::new()
    };

    let mut engine = engine::<4>(config, &handler, &transport, &timer);

    let session = session(1, 0x1234);
    let exchange = exchange(&session, 0);

    engine
        .on_read_request(session, exchange, &read_req(&[GenericPath::default()], &[], &[]))
        .unwrap();

    assert!(report_of(&transport.take_sent()[0].payload).more_chunks);

    engine
        .on_status_response(exchange, &status_resp(IMStatusCode::Failure))
        .unwrap();

    assert!(transport.take_sent().is_empty());
    assert_eq!(transport.take_closed(), vec![exchange]);
    assert_eq!(engine.handler_count(), 0);

    assert_eq!(
        engine
            .on_status_response(exchange, &status_resp(IMStatusCode::Success))
            .map_err(|e| e.code()),
        Err(rs_matter_im::error::ErrorCode::NoHandler)
    );
}

#[test]
fn test_read_events() {
    init_env_logger();

    let handler = OnOffHandler::new();
    let transport = RecordingTransport::default();
    let timer = ManualTimer::new();
    let mut engine = engine::<4>(ImConfig::new(), &handler, &transport, &timer);

    handler.emit(true);
    handler.emit(false);

    let session = session(1, 0x1234);

    engine
        .on_read_request(
            session,
            exchange(&session, 0),
            &read_req(
                &[],
                &[GenericPath::new(Some(1), Some(ON_OFF), None)],
                &[],
            ),
        )
        .unwrap();

    let (_, report) = reports(&transport.take_sent()).remove(0);

    assert!(report.attrs.is_empty());
    assert_eq!(report.events, vec![(1, true), (2, false)]);
}

#[test]
fn test_malformed_and_empty_requests() {
    init_env_logger();

    let handler = OnOffHandler::new();
    let transport = RecordingTransport::default();
    let timer = ManualTimer::new();
    let mut engine = engine::<4>(ImConfig::new(), &handler, &transport, &timer);

    let session = session(1, 0x1234);

    let malformed = exchange(&session, 0);

    engine
        .on_read_request(session, malformed, &[0x15, 0x24])
        .unwrap();

    let sent = transport.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].opcode, OpCode::StatusResponse);
    assert_eq!(status_of(&sent[0].payload), IMStatusCode::InvalidAction);
    assert_eq!(transport.take_closed(), vec![malformed]);

    // A read without paths is answered with an empty report
    let empty = exchange(&session, 1);

    engine
        .on_read_request(session, empty, &read_req(&[], &[], &[]))
        .unwrap();

    let (_, report) = reports(&transport.take_sent()).remove(0);
    assert!(report.attrs.is_empty());
    assert!(report.events.is_empty());
    assert!(report.suppress_response);
    assert_eq!(transport.take_closed(), vec![empty]);

    assert_eq!(engine.handler_count(), 0);
}

#[test]
fn test_handler_pool_exhaustion() {
    init_env_logger();

    let handler = OnOffHandler::new();
    let transport = RecordingTransport::default();
    let timer = ManualTimer::new();
    let mut engine = engine::<2>(ImConfig::new(), &handler, &transport, &timer);

    let subscribe = subscribe_req(true, 1, 60, &[on_off(1, ATTR_ON_OFF)], &[]);

    let first = session(1, 0x1234);
    let second = session(2, 0x5678);

    establish(&mut engine, &transport, &first, 0, &subscribe);
    establish(&mut engine, &transport, &second, 0, &subscribe);

    assert_eq!(engine.subscription_count(), 2);

    let read = read_req(&[on_off(1, ATTR_ON_OFF)], &[], &[]);

    engine
        .on_read_request(first, exchange(&first, 1), &read)
        .unwrap();

    let sent = transport.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].opcode, OpCode::StatusResponse);
    assert_eq!(status_of(&sent[0].payload), IMStatusCode::ResourceExhausted);

    engine.on_session_closed(second.id);
    assert_eq!(engine.subscription_count(), 1);

    engine
        .on_read_request(first, exchange(&first, 2), &read)
        .unwrap();

    let sent = transport.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].opcode, OpCode::ReportData);
    assert_eq!(engine.subscription_count(), 1);
}

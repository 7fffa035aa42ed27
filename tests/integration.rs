//! Integration tests for wbchannel-client.
//!
//! A scripted server plays the other end of an in-memory transport; one
//! test runs the whole flow over a real loopback WebSocket.

use std::collections::HashSet;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use wbchannel_client::api::{StartTaskResponse, TaskStatusReport};
use wbchannel_client::protocol::{decode, encode, Context, Message, MessageName};
use wbchannel_client::task::{TaskPhase, TaskStatus};
use wbchannel_client::transport::{MemoryConnector, MemoryListener, MemoryPeer};
use wbchannel_client::{ChannelError, Orchestrator, OrchestratorBuilder};

fn builder(connector: MemoryConnector) -> OrchestratorBuilder {
    Orchestrator::builder()
        .endpoint("memory://wbchannel")
        .invoker_id("306177")
        .exchange_timeout(Duration::from_secs(2))
        .shutdown_grace(Duration::from_millis(500))
        .connector(connector)
}

fn orchestrator() -> (Orchestrator, MemoryListener) {
    let (connector, listener) = MemoryConnector::pair();
    (builder(connector).build().unwrap(), listener)
}

/// Next message that is not client keep-alive traffic.
async fn recv_request(peer: &mut MemoryPeer) -> Option<Message> {
    loop {
        let msg = peer.recv_message().await?;
        if !msg.message_name.is_heartbeat() {
            return Some(msg);
        }
    }
}

/// Accept the connection and answer both handshake steps.
async fn accept_and_handshake(listener: &mut MemoryListener) -> MemoryPeer {
    let mut peer = listener.accept().await.unwrap();

    let register = recv_request(&mut peer).await.unwrap();
    assert_eq!(register.message_name, MessageName::RegisterChannel);
    peer.send_message(&Message::new(MessageName::RegisterChannelResp).with_context(Context {
        channel_id: Some("C1".to_string()),
        ..Context::default()
    }));

    let get_key = recv_request(&mut peer).await.unwrap();
    assert_eq!(get_key.message_name, MessageName::GetUserApiKey);
    peer.send_message(
        &Message::new(MessageName::GetUserApiKeyResp).with_payload(json!({"apiKey": "K1"})),
    );

    peer
}

/// Receive one business request and acknowledge it, echoing its reqId.
async fn ack_one(peer: &mut MemoryPeer) -> Message {
    let request = recv_request(peer).await.unwrap();
    assert_eq!(request.message_name, MessageName::UserActivityNotify);
    peer.send_message(&Message::new(MessageName::UserActivityNotifyResp).with_context(Context {
        req_id: request.req_id().map(str::to_string),
        ..Context::default()
    }));
    request
}

async fn wait_idle(orchestrator: &Orchestrator) {
    for _ in 0..300 {
        if !orchestrator.is_busy() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("orchestrator still busy");
}

#[tokio::test]
async fn test_three_units_complete() {
    let (orchestrator, mut listener) = orchestrator();

    let server = tokio::spawn(async move {
        let mut peer = accept_and_handshake(&mut listener).await;
        let mut requests = Vec::new();
        for _ in 0..3 {
            requests.push(ack_one(&mut peer).await);
        }
        // Wait for the client to hang up.
        while peer.recv().await.is_some() {}
        requests
    });

    let ticket = orchestrator.start_task(3, "sess-1").await.unwrap();
    let task_id = ticket.task_id.clone();
    let report = ticket.wait().await.unwrap();
    assert!(report.is_complete(), "{report:?}");

    wait_idle(&orchestrator).await;
    assert_eq!(
        orchestrator.task_status(),
        TaskStatusReport {
            status: TaskStatus::Finished,
            task_id: Some(task_id),
            sent: 3,
            total: 3,
        }
    );

    let requests = server.await.unwrap();
    let req_ids: HashSet<_> = requests
        .iter()
        .map(|r| r.req_id().unwrap().to_string())
        .collect();
    assert_eq!(req_ids.len(), 3);
    for request in &requests {
        let context = request.context.as_ref().unwrap();
        assert_eq!(context.channel_id.as_deref(), Some("C1"));
        assert_eq!(context.api_key.as_deref(), Some("K1"));
        assert_eq!(context.invoker_id.as_deref(), Some("306177"));
        let payload = request.payload.as_ref().unwrap();
        assert_eq!(payload["activityType"], "code_display");
        assert_eq!(payload["client"]["type"], "vscode");
    }
}

#[tokio::test]
async fn test_transport_closes_after_first_response() {
    let (orchestrator, mut listener) = orchestrator();

    let server = tokio::spawn(async move {
        let mut peer = accept_and_handshake(&mut listener).await;
        ack_one(&mut peer).await;
        peer.close();
        peer
    });

    let ticket = orchestrator.start_task(3, "sess-1").await.unwrap();
    let report = ticket.wait().await.unwrap();
    assert_eq!(report.sent, 1);
    assert!(report.error.is_some());

    wait_idle(&orchestrator).await;
    let status = orchestrator.task_status();
    assert_eq!(status.status, TaskStatus::Finished);
    assert_eq!((status.sent, status.total), (1, 3));
    assert!(!orchestrator.is_connected());
    let _peer = server.await.unwrap();
}

#[tokio::test]
async fn test_second_start_is_busy() {
    let (orchestrator, mut listener) = orchestrator();

    let server = tokio::spawn(async move {
        let mut peer = accept_and_handshake(&mut listener).await;
        // Take the first request and never answer it.
        recv_request(&mut peer).await;
        peer
    });

    let first = orchestrator.start_task(3, "sess-1").await.unwrap();
    let second = orchestrator.start_task(3, "sess-1").await;
    assert!(matches!(second, Err(ChannelError::Busy)));
    assert!(StartTaskResponse::from(&second).is_busy());
    assert_eq!(
        serde_json::to_value(StartTaskResponse::from(&second)).unwrap(),
        json!({"error": "busy"})
    );

    // No record was created for the rejected start.
    assert_eq!(orchestrator.task_status().task_id, Some(first.task_id.clone()));
    assert_eq!(orchestrator.task_status().status, TaskStatus::Running);

    let _peer = server.await.unwrap();
    orchestrator.logout().await;
}

#[tokio::test]
async fn test_server_heartbeat_answered_once() {
    let (orchestrator, mut listener) = orchestrator();

    let server = tokio::spawn(async move {
        let mut peer = accept_and_handshake(&mut listener).await;

        let request = recv_request(&mut peer).await.unwrap();
        // A heartbeat right before the real answer must not be taken for it.
        peer.send_message(&Message::new(MessageName::ServerHeartbeat));
        peer.send_message(&Message::new(MessageName::UserActivityNotifyResp).with_context(
            Context {
                req_id: request.req_id().map(str::to_string),
                ..Context::default()
            },
        ));

        let mut replies = 0;
        while let Some(msg) = peer.recv_message().await {
            if msg.message_name == MessageName::ClientHeartbeatResponse {
                replies += 1;
            }
        }
        replies
    });

    let report = orchestrator
        .start_task(1, "sess-1")
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert!(report.is_complete(), "{report:?}");
    assert_eq!(server.await.unwrap(), 1);
}

#[tokio::test]
async fn test_connect_refused_releases_guard() {
    let (orchestrator, listener) = orchestrator();
    drop(listener);

    let ticket = orchestrator.start_task(4, "sess-1").await.unwrap();
    let report = ticket.wait().await.unwrap();
    assert_eq!(report.sent, 0);
    assert!(matches!(report.error, Some(ChannelError::Connect { .. })));

    wait_idle(&orchestrator).await;
    let status = orchestrator.task_status();
    assert_eq!(status.status, TaskStatus::Finished);
    assert_eq!((status.sent, status.total), (0, 4));
}

#[tokio::test]
async fn test_handshake_failure_sends_no_business_traffic() {
    let (orchestrator, mut listener) = orchestrator();

    let server = tokio::spawn(async move {
        let mut peer = listener.accept().await.unwrap();
        recv_request(&mut peer).await.unwrap();
        // No channelId.
        peer.send_message(&Message::new(MessageName::RegisterChannelResp));

        let mut later = Vec::new();
        while let Some(msg) = recv_request(&mut peer).await {
            later.push(msg.message_name);
        }
        later
    });

    let report = orchestrator
        .start_task(2, "sess-1")
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert!(matches!(report.error, Some(ChannelError::Handshake { .. })));
    assert_eq!(report.sent, 0);

    let later = server.await.unwrap();
    assert!(
        !later.contains(&MessageName::UserActivityNotify),
        "business traffic after failed handshake: {later:?}"
    );
    wait_idle(&orchestrator).await;
}

#[tokio::test]
async fn test_closed_message_stops_task() {
    let (orchestrator, mut listener) = orchestrator();

    let server = tokio::spawn(async move {
        let mut peer = accept_and_handshake(&mut listener).await;
        ack_one(&mut peer).await;
        ack_one(&mut peer).await;
        recv_request(&mut peer).await;
        peer.send_message(&Message::new(MessageName::Closed));
        peer
    });

    let report = orchestrator
        .start_task(5, "sess-1")
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(report.sent, 2);
    assert!(matches!(report.error, Some(ChannelError::Disconnected)));

    wait_idle(&orchestrator).await;
    assert_eq!(orchestrator.task_status().status, TaskStatus::Finished);
    let _peer = server.await.unwrap();
}

#[tokio::test]
async fn test_unanswered_request_times_out() {
    let (connector, mut listener) = MemoryConnector::pair();
    let orchestrator = builder(connector)
        .exchange_timeout(Duration::from_millis(200))
        .build()
        .unwrap();

    let server = tokio::spawn(async move {
        let mut peer = accept_and_handshake(&mut listener).await;
        ack_one(&mut peer).await;
        // Swallow the rest without answering.
        while peer.recv().await.is_some() {}
    });

    let report = orchestrator
        .start_task(3, "sess-1")
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(report.sent, 1);
    match report.error {
        Some(ChannelError::ExchangeTimeout { expected, timeout_ms }) => {
            assert_eq!(expected, "UserActivityNotify_resp");
            assert_eq!(timeout_ms, 200);
        }
        other => panic!("expected timeout, got {other:?}"),
    }

    wait_idle(&orchestrator).await;
    server.await.unwrap();
}

#[tokio::test]
async fn test_logout_while_stalled() {
    let (orchestrator, mut listener) = orchestrator();

    let server = tokio::spawn(async move {
        let mut peer = accept_and_handshake(&mut listener).await;
        recv_request(&mut peer).await;
        // Never answer; wait for the client to hang up.
        while peer.recv().await.is_some() {}
        listener
    });

    let ticket = orchestrator.start_task(3, "sess-1").await.unwrap();
    while orchestrator.task(&ticket.task_id).map(|t| t.phase) != Some(TaskPhase::Running) {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let response = orchestrator.logout().await;
    assert_eq!(serde_json::to_value(&response).unwrap(), json!({"status": "logged_out"}));
    assert!(!orchestrator.is_busy());
    assert!(!orchestrator.is_connected());
    assert_eq!(orchestrator.task_status(), TaskStatusReport::idle());

    // The task record survives logout, finished.
    let task = orchestrator.task(&ticket.task_id).unwrap();
    assert_eq!(task.status, TaskStatus::Finished);
    assert_eq!(task.sent, 0);

    // The channel is free again.
    let mut listener = server.await.unwrap();
    let next = orchestrator.start_task(1, "sess-2").await.unwrap();
    let mut peer = accept_and_handshake(&mut listener).await;
    ack_one(&mut peer).await;
    assert!(next.wait().await.unwrap().is_complete());
}

#[tokio::test]
async fn test_client_heartbeats_sent() {
    let (connector, mut listener) = MemoryConnector::pair();
    let orchestrator = builder(connector)
        .heartbeat_interval(Duration::from_millis(20))
        .heartbeat_jitter(Duration::ZERO)
        .build()
        .unwrap();

    let server = tokio::spawn(async move {
        let mut peer = accept_and_handshake(&mut listener).await;
        let request = loop {
            let msg = peer.recv_message().await.unwrap();
            if msg.message_name == MessageName::UserActivityNotify {
                break msg;
            }
        };

        // Hold the answer until two heartbeats have arrived.
        let mut beats = 0;
        while beats < 2 {
            let msg = peer.recv_message().await.unwrap();
            if msg.message_name == MessageName::ClientHeartbeat {
                assert!(msg.context.is_none() && msg.payload.is_none());
                beats += 1;
            }
        }

        peer.send_message(&Message::new(MessageName::UserActivityNotifyResp).with_context(
            Context {
                req_id: request.req_id().map(str::to_string),
                ..Context::default()
            },
        ));
        peer
    });

    let report = orchestrator
        .start_task(1, "sess-1")
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert!(report.is_complete(), "{report:?}");
    let _peer = server.await.unwrap();
}

#[tokio::test]
async fn test_full_flow_over_websocket() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let mut acked = 0;

        while let Some(Ok(frame)) = ws.next().await {
            let WsMessage::Text(text) = frame else {
                continue;
            };
            let request = decode(text.as_str()).unwrap();
            let reply = match request.message_name {
                MessageName::RegisterChannel => Message::new(MessageName::RegisterChannelResp)
                    .with_context(Context {
                        channel_id: Some("C1".to_string()),
                        ..Context::default()
                    }),
                MessageName::GetUserApiKey => Message::new(MessageName::GetUserApiKeyResp)
                    .with_payload(json!({"apiKey": "K1"})),
                MessageName::UserActivityNotify => {
                    acked += 1;
                    Message::new(MessageName::UserActivityNotifyResp).with_context(Context {
                        req_id: request.req_id().map(str::to_string),
                        ..Context::default()
                    })
                }
                _ => continue,
            };
            if ws.send(WsMessage::text(encode(&reply))).await.is_err() {
                break;
            }
        }
        acked
    });

    let orchestrator = Orchestrator::builder()
        .endpoint(format!("ws://{addr}"))
        .invoker_id("306177")
        .exchange_timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    let report = orchestrator.run_task(2, "sess-ws").await.unwrap();
    assert!(report.is_complete(), "{report:?}");
    assert!(!orchestrator.is_busy());

    let status = orchestrator.task_status();
    assert_eq!(status.status, TaskStatus::Finished);
    assert_eq!((status.sent, status.total), (2, 2));

    assert_eq!(server.await.unwrap(), 2);
}

#[tokio::test]
async fn test_acks_taken_in_order_whatever_their_id() {
    let (orchestrator, mut listener) = orchestrator();

    let server = tokio::spawn(async move {
        let mut peer = accept_and_handshake(&mut listener).await;
        for _ in 0..2 {
            recv_request(&mut peer).await.unwrap();
            peer.send_message(
                &Message::new(MessageName::from("UserActivityNotify_ack")).with_context(
                    Context {
                        req_id: Some("server-own-id".to_string()),
                        ..Context::default()
                    },
                ),
            );
        }
        peer
    });

    let report = orchestrator
        .start_task(2, "sess-1")
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert!(report.is_complete(), "{report:?}");
    let _peer = server.await.unwrap();
}

#[tokio::test]
async fn test_concurrent_logouts_keep_single_flight() {
    let (orchestrator, mut listener) = orchestrator();

    let server = tokio::spawn(async move {
        let mut peer = accept_and_handshake(&mut listener).await;
        recv_request(&mut peer).await;
        while peer.recv().await.is_some() {}
        listener
    });

    let ticket = orchestrator.start_task(3, "sess-1").await.unwrap();
    while orchestrator.task(&ticket.task_id).map(|t| t.phase) != Some(TaskPhase::Running) {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let (first, second) = tokio::join!(orchestrator.logout(), orchestrator.logout());
    assert_eq!(first, second);
    assert!(!orchestrator.is_busy());
    assert_eq!(orchestrator.task_status(), TaskStatusReport::idle());

    let mut listener = server.await.unwrap();
    let next = orchestrator.start_task(2, "sess-2").await.unwrap();
    assert!(matches!(
        orchestrator.start_task(1, "sess-3").await,
        Err(ChannelError::Busy)
    ));

    let mut peer = accept_and_handshake(&mut listener).await;
    ack_one(&mut peer).await;
    ack_one(&mut peer).await;
    assert!(next.wait().await.unwrap().is_complete());
    assert!(listener.try_accept().is_none());
}

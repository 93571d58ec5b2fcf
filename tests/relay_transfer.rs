use altbit::engine::{ArqEngine, Completion, EngineConfig, ReceiverReport, SenderReport};
use altbit::relay::Relay;
use altbit::session::{PeerRole, SessionParams, open_channel};
use altbit::util::random_text;
use bytes::Bytes;
use std::net::SocketAddr;
use std::time::Duration;

async fn spawn_relay(seed: u64) -> SocketAddr {
    let relay = Relay::bind("127.0.0.1:0").await.unwrap().with_seed(seed);
    let addr = relay.local_addr().unwrap();
    tokio::spawn(relay.run());
    addr
}

fn conditions(session_id: &str, loss_rate: f64, corrupt_rate: f64) -> SessionParams {
    SessionParams {
        loss_rate,
        corrupt_rate,
        ..SessionParams::new(PeerRole::Sender, session_id)
    }
}

/// Runs both peers of one session. Both announce the same impairment.
async fn transfer(
    relay: SocketAddr,
    conditions: SessionParams,
    payload: Bytes,
    config: EngineConfig,
) -> (SenderReport, ReceiverReport) {
    let sender = SessionParams {
        role: PeerRole::Sender,
        ..conditions.clone()
    };
    let receiver = SessionParams {
        role: PeerRole::Receiver,
        ..conditions
    };
    let connect_timeout = Duration::from_secs(10);

    let (sending, receiving) = tokio::join!(
        async {
            let channel = open_channel(relay, &sender, connect_timeout).await.unwrap();
            ArqEngine::new(channel, config.clone()).send(payload).await.unwrap()
        },
        async {
            let channel = open_channel(relay, &receiver, connect_timeout).await.unwrap();
            ArqEngine::new(channel, config.clone()).receive().await.unwrap()
        },
    );
    (sending, receiving)
}

#[tokio::test]
async fn clean_transfer_through_relay() {
    let relay = spawn_relay(1).await;
    let payload =
        Bytes::from_static(b"That was the time for all good men to come to the aid of the party.");

    let (sent, received) = transfer(
        relay,
        conditions("clean", 0.0, 0.0),
        payload.clone(),
        EngineConfig::default(),
    )
    .await;

    assert_eq!(sent.completion, Completion::Finished);
    assert_eq!(sent.stats.sent, 4);
    assert_eq!(sent.stats.received, 4);
    assert_eq!(sent.stats.timeouts, 0);
    assert_eq!(sent.stats.corrupted, 0);

    // Without a length bound the last segment keeps its padding.
    assert_eq!(received.data.len(), 80);
    assert!(received.data.starts_with(&payload));
    assert_eq!(received.completion, Completion::ChannelClosed);
}

#[tokio::test]
async fn lossy_transfer_through_relay() {
    let relay = spawn_relay(2).await;
    let payload = Bytes::from(random_text(200));
    let config = EngineConfig {
        transmission_timeout: Duration::from_millis(40),
        expected_len: Some(payload.len()),
        linger: Duration::from_secs(2),
        ..Default::default()
    };

    let (sent, received) =
        transfer(relay, conditions("lossy", 0.2, 0.2), payload.clone(), config).await;

    assert_eq!(sent.completion, Completion::Finished);
    assert_eq!(received.data, payload);
    assert_eq!(sent.checksum, received.checksum);
    assert!(sent.stats.sent > 10);
}

/// Delays longer than the retransmission timeout put duplicate segments and
/// stale acks on the wire; the payload must still arrive exactly once.
#[tokio::test]
async fn delayed_transfer_through_relay() {
    let relay = spawn_relay(5).await;
    let payload = Bytes::from(random_text(40));
    let config = EngineConfig {
        transmission_timeout: Duration::from_millis(300),
        expected_len: Some(payload.len()),
        linger: Duration::from_secs(3),
        ..Default::default()
    };
    let delayed = SessionParams {
        max_delay: 1,
        ..conditions("delayed", 0.0, 0.0)
    };

    let (sent, received) = transfer(relay, delayed, payload.clone(), config).await;

    assert_eq!(sent.completion, Completion::Finished);
    assert_eq!(sent.delivered, payload.len());
    assert_eq!(received.data, payload);
    assert_eq!(sent.checksum, received.checksum);
}

/// Many concurrent sessions under several impairment settings.
#[cfg(feature = "slow-tests")]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sessions_agree_on_checksums() {
    let relay = spawn_relay(3).await;
    let settings = [(0.0, 0.0), (0.1, 0.0), (0.0, 0.1), (0.3, 0.3), (0.5, 0.2)];

    let mut handles = Vec::new();
    for (index, (loss_rate, corrupt_rate)) in settings.into_iter().cycle().take(20).enumerate() {
        let payload = Bytes::from(random_text(200));
        let config = EngineConfig {
            transmission_timeout: Duration::from_millis(100),
            expected_len: Some(payload.len()),
            linger: Duration::from_secs(3),
            ..Default::default()
        };
        handles.push(tokio::spawn(async move {
            let session_id = format!("harness-{index}");
            let (sent, received) = transfer(
                relay,
                conditions(&session_id, loss_rate, corrupt_rate),
                payload.clone(),
                config,
            )
            .await;
            (payload, sent, received)
        }));
    }

    for handle in handles {
        let (payload, sent, received) = handle.await.unwrap();
        assert_eq!(sent.completion, Completion::Finished);
        assert_eq!(sent.checksum, received.checksum);
        assert_eq!(received.data, payload);
    }
}

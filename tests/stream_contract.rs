//! HTTP contract of the stream endpoint, checked against both adapters.

use std::time::{Duration, Instant};

mod common;

use common::{counting_source, http_client, reads, spawn_server, Adapter, LineReader, ADAPTERS};
use streaming_relay::streaming::SourceError;
use streaming_relay::ReadCallback;

#[derive(serde::Serialize)]
struct Reading {
    sensor: &'static str,
    celsius: f64,
    tags: [&'static str; 2],
}

#[tokio::test]
async fn test_first_record_arrives_before_first_tick() {
    for adapter in ADAPTERS {
        let (source, counter) = counting_source(None);
        let server = spawn_server(adapter, source).await;

        let started = Instant::now();
        let res = http_client()
            .get(server.url("/ping?interval=1h"))
            .send()
            .await
            .expect("server unreachable");

        assert_eq!(res.status(), 200, "{adapter:?}");
        assert_eq!(res.headers()["content-type"], "application/json");
        assert_eq!(res.headers()["cache-control"], "no-cache");
        assert_eq!(res.headers()["x-accel-buffering"], "no");

        let mut lines = LineReader::new(res);
        assert_eq!(lines.expect_line(Duration::from_secs(5)).await, "{\"seq\":1}\n");
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(reads(&counter), 1, "{adapter:?}");
    }
}

#[tokio::test]
async fn test_records_are_json_lines_in_order() {
    for adapter in ADAPTERS {
        let (source, _counter) = counting_source(None);
        let server = spawn_server(adapter, source).await;

        let res = http_client()
            .get(server.url("/ping?interval=20ms"))
            .send()
            .await
            .unwrap();
        let mut lines = LineReader::new(res);

        for seq in 1..=5 {
            let line = lines.expect_line(Duration::from_secs(5)).await;
            assert_eq!(line, format!("{{\"seq\":{seq}}}\n"), "{adapter:?}");
        }
    }
}

#[tokio::test]
async fn test_records_are_paced_by_interval() {
    for adapter in ADAPTERS {
        let (source, _counter) = counting_source(None);
        let server = spawn_server(adapter, source).await;

        let res = http_client()
            .get(server.url("/ping?interval=200ms"))
            .send()
            .await
            .unwrap();
        let mut lines = LineReader::new(res);
        lines.expect_line(Duration::from_secs(5)).await;

        let started = Instant::now();
        lines.expect_line(Duration::from_secs(5)).await;
        lines.expect_line(Duration::from_secs(5)).await;
        let elapsed = started.elapsed();
        assert!(
            elapsed >= Duration::from_millis(300),
            "{adapter:?}: two records in {elapsed:?}"
        );
    }
}

#[tokio::test]
async fn test_fixed_record_arrives_byte_identical() {
    let expected = "{\"sensor\":\"boiler\",\"celsius\":71.5,\"tags\":[\"east\",\"ü\"]}\n";
    for adapter in ADAPTERS {
        let source = ReadCallback::plain(|| async {
            Ok::<_, SourceError>(Reading {
                sensor: "boiler",
                celsius: 71.5,
                tags: ["east", "ü"],
            })
        });
        let server = spawn_server(adapter, source).await;

        let res = http_client()
            .get(server.url("/ping?interval=10ms"))
            .send()
            .await
            .unwrap();
        let mut lines = LineReader::new(res);
        for _ in 0..5 {
            let line = lines.expect_line(Duration::from_secs(5)).await;
            assert_eq!(line, expected, "{adapter:?}");
        }
    }
}

#[tokio::test]
async fn test_panicking_source_aborts_stream() {
    for adapter in ADAPTERS {
        let (counting, counter) = counting_source(None);
        let source = ReadCallback::with_context(move |ctx| {
            let counting = counting.clone();
            async move {
                let tick = counting.read(&ctx).await?;
                if tick.seq == 3 {
                    panic!("sensor bus reset");
                }
                Ok::<_, SourceError>(tick)
            }
        });
        let server = spawn_server(adapter, source).await;

        let res = http_client()
            .get(server.url("/ping?interval=20ms"))
            .send()
            .await
            .unwrap();
        let mut lines = LineReader::new(res);
        assert_eq!(lines.expect_line(Duration::from_secs(5)).await, "{\"seq\":1}\n");
        assert_eq!(lines.expect_line(Duration::from_secs(5)).await, "{\"seq\":2}\n");

        let end = tokio::time::timeout(Duration::from_secs(5), lines.next_line())
            .await
            .expect("stream neither ended nor failed");
        assert!(
            matches!(end, Some(Err(_))),
            "{adapter:?}: expected an aborted body, got {end:?}"
        );
        assert_eq!(reads(&counter), 3);
    }
}

#[tokio::test]
async fn test_malformed_interval_is_rejected_without_reading() {
    for adapter in ADAPTERS {
        let (source, counter) = counting_source(None);
        let server = spawn_server(adapter, source).await;

        let res = http_client()
            .get(server.url("/ping?interval=fast"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 400, "{adapter:?}");

        match adapter {
            Adapter::Axum => {
                let body: serde_json::Value = res.json().await.unwrap();
                assert_eq!(body["message"], "invalid duration \"fast\"");
            }
            Adapter::Hyper => {
                assert_eq!(res.headers()["content-type"], "text/plain; charset=utf-8");
                assert_eq!(res.text().await.unwrap(), "invalid duration \"fast\"\n");
            }
        }
        assert_eq!(reads(&counter), 0, "{adapter:?}");
    }
}

#[tokio::test]
async fn test_non_positive_interval_is_rejected() {
    for adapter in ADAPTERS {
        let (source, counter) = counting_source(None);
        let server = spawn_server(adapter, source).await;

        for interval in ["0s", "-5ms"] {
            let res = http_client()
                .get(server.url(&format!("/ping?interval={interval}")))
                .send()
                .await
                .unwrap();
            assert_eq!(res.status(), 400, "{adapter:?} {interval}");
        }
        assert_eq!(reads(&counter), 0);
    }
}

#[tokio::test]
async fn test_first_read_failure_is_500() {
    for adapter in ADAPTERS {
        let (source, counter) = counting_source(Some(1));
        let server = spawn_server(adapter, source).await;

        let res = http_client().get(server.url("/ping")).send().await.unwrap();
        assert_eq!(res.status(), 500, "{adapter:?}");

        let body = res.text().await.unwrap();
        assert!(body.contains("read 1 failed"), "{adapter:?}: {body}");
        assert_eq!(reads(&counter), 1);
    }
}

#[tokio::test]
async fn test_later_read_failure_aborts_stream() {
    for adapter in ADAPTERS {
        let (source, counter) = counting_source(Some(3));
        let server = spawn_server(adapter, source).await;

        let res = http_client()
            .get(server.url("/ping?interval=20ms"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        let mut lines = LineReader::new(res);

        assert_eq!(lines.expect_line(Duration::from_secs(5)).await, "{\"seq\":1}\n");
        assert_eq!(lines.expect_line(Duration::from_secs(5)).await, "{\"seq\":2}\n");

        let end = tokio::time::timeout(Duration::from_secs(5), lines.next_line())
            .await
            .expect("stream neither ended nor failed");
        assert!(
            matches!(end, Some(Err(_))),
            "{adapter:?}: expected an aborted body, got {end:?}"
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(reads(&counter), 3, "{adapter:?}: source read after failure");
    }
}

#[tokio::test]
async fn test_shutdown_ends_stream_cleanly() {
    for adapter in ADAPTERS {
        let (source, _counter) = counting_source(None);
        let server = spawn_server(adapter, source).await;

        let res = http_client()
            .get(server.url("/ping?interval=1h"))
            .send()
            .await
            .unwrap();
        let mut lines = LineReader::new(res);
        lines.expect_line(Duration::from_secs(5)).await;

        server.shutdown.trigger();
        let end = tokio::time::timeout(Duration::from_secs(5), lines.next_line())
            .await
            .expect("stream kept running after shutdown");
        assert!(end.is_none(), "{adapter:?}: expected clean end, got {end:?}");
    }
}

#[tokio::test]
async fn test_index_and_unknown_paths() {
    for adapter in ADAPTERS {
        let (source, counter) = counting_source(None);
        let server = spawn_server(adapter, source).await;
        let client = http_client();

        let res = client.get(server.url("/")).send().await.unwrap();
        assert_eq!(res.status(), 200);
        assert_eq!(res.text().await.unwrap().trim_end(), "OK");

        let res = client.get(server.url("/nope")).send().await.unwrap();
        assert_eq!(res.status(), 404, "{adapter:?}");

        let res = client.post(server.url("/ping")).send().await.unwrap();
        assert_eq!(res.status(), 405, "{adapter:?}");

        let res = client.head(server.url("/ping")).send().await.unwrap();
        assert_eq!(res.status(), 405, "{adapter:?}");
        assert_eq!(res.headers()["allow"], "GET", "{adapter:?}");
        assert_eq!(reads(&counter), 0, "{adapter:?}: HEAD read the source");
    }
}

#[tokio::test]
async fn test_request_id_is_returned() {
    for adapter in ADAPTERS {
        let (source, _counter) = counting_source(None);
        let server = spawn_server(adapter, source).await;

        let res = http_client()
            .get(server.url("/"))
            .header("x-request-id", "it-42")
            .send()
            .await
            .unwrap();
        assert_eq!(res.headers()["x-request-id"], "it-42", "{adapter:?}");
    }
}

//! Integration tests for the event collector HTTP server

#[cfg(all(feature = "server", feature = "client"))]
mod server_tests {
    use pagebeacon::collector::MemorySink;
    use pagebeacon::config::Config;
    use pagebeacon::event::LogRecord;
    use pagebeacon::server::{run, ServerConfig};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    async fn start() -> (SocketAddr, tokio::sync::oneshot::Sender<()>, Arc<MemorySink>) {
        let config = Config {
            port: 0,
            ..Config::default()
        };
        let sink = Arc::new(MemorySink::new());
        let server_config = ServerConfig::new(config, sink.clone());

        let (addr, shutdown_tx) = run(server_config).await.expect("Failed to start server");

        // Give server time to start
        tokio::time::sleep(Duration::from_millis(100)).await;

        (addr, shutdown_tx, sink)
    }

    const PAGE_QUERY: &str = "site=42&type=page&name=http%3A//shop.test/cart&desc=Cart%7Cstep%201\
                              &visit_id=v100&user_id=u200&new_visit=true&clock_time=10%3A05%3A00\
                              &resolution=1280x800&color_bits=24";

    #[tokio::test]
    async fn test_health_endpoint() {
        let (addr, shutdown_tx, _sink) = start().await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["status"], "ok");
        assert!(body["version"].as_str().is_some());

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_event_script_records_and_seeds_global_id() {
        let (addr, shutdown_tx, sink) = start().await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/event?{}", addr, PAGE_QUERY))
            .header("User-Agent", "TestBrowser/1.0")
            .header("Accept-Language", "en-US")
            .send()
            .await
            .expect("Failed to send request");

        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let headers = response.headers().clone();
        assert_eq!(headers["content-type"], "text/javascript");
        assert_eq!(headers["cache-control"], "no-cache");
        let set_cookie = headers["set-cookie"].to_str().unwrap().to_string();
        assert!(set_cookie.starts_with("pb_global_id=u200;"));
        assert!(set_cookie.contains("Path=/"));
        assert!(set_cookie.contains("Expires="));
        // host is an IP address, so the cookie stays host-only
        assert!(!set_cookie.contains("Domain="));

        let body = response.text().await.unwrap();
        assert!(body.contains("data.globalId = 'u200';"));
        assert!(body.contains("data.eventDesc = 'Cart|step 1';"));
        assert!(body.contains("data.clockTime = '10:05:00';"));
        assert!(body.contains("onEvent"));

        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        let record = LogRecord::parse(&lines[0]).unwrap();
        assert_eq!(record.get("si"), Some("42"));
        assert_eq!(record.get("et"), Some("page"));
        assert_eq!(record.get("gi"), Some("u200"));
        assert_eq!(record.get("co"), Some("yes"));
        assert_eq!(record.get("ed"), Some("Cart&#124;step 1"));
        assert_eq!(record.get("ua"), Some("TestBrowser/1.0"));
        assert_eq!(record.get("la"), Some("en-US"));
        assert!(record.has_environment());

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_existing_global_id_is_kept() {
        let (addr, shutdown_tx, sink) = start().await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/event.json?{}", addr, PAGE_QUERY))
            .header("Cookie", "other=1; pb_global_id=g-existing")
            .send()
            .await
            .expect("Failed to send request");

        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert!(response.headers().get("set-cookie").is_none());

        let ack: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(ack["globalId"], "g-existing");
        assert_eq!(ack["visitId"], "v100");
        assert_eq!(ack["eventType"], "page");
        assert_eq!(ack["newVisit"], true);

        let record = LogRecord::parse(&sink.lines()[0]).unwrap();
        assert_eq!(record.get("gi"), Some("g-existing"));

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_opt_out_records_nothing() {
        let (addr, shutdown_tx, sink) = start().await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/event?{}", addr, PAGE_QUERY))
            .header("Cookie", "pb_global_id=optout")
            .send()
            .await
            .expect("Failed to send request");

        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert!(response.headers().get("set-cookie").is_none());
        assert!(response.text().await.unwrap().is_empty());
        assert!(sink.is_empty());

        let json = client
            .get(format!("http://{}/event.json?{}", addr, PAGE_QUERY))
            .header("Cookie", "pb_global_id=optout")
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(json.status(), reqwest::StatusCode::NO_CONTENT);
        assert!(sink.is_empty());

        let stats: serde_json::Value = client
            .get(format!("http://{}/stats", addr))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stats["opt_outs_honored"], 2);
        assert_eq!(stats["events_recorded"], 0);

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_missing_site_is_ignored() {
        let (addr, shutdown_tx, sink) = start().await;

        let client = reqwest::Client::new();
        for query in ["type=page&name=x", "site=0&type=page", ""] {
            let response = client
                .get(format!("http://{}/event?{}", addr, query))
                .send()
                .await
                .expect("Failed to send request");

            assert_eq!(response.status(), reqwest::StatusCode::OK);
            assert!(response.headers().get("set-cookie").is_none());
            assert!(response.text().await.unwrap().is_empty());
        }
        assert!(sink.is_empty());

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_cookieless_sensor_gets_server_id() {
        let (addr, shutdown_tx, sink) = start().await;

        let client = reqwest::Client::new();
        let ack: serde_json::Value = client
            .get(format!("http://{}/event.json?site=42&type=user&name=ping", addr))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        let visit_id = ack["visitId"].as_str().unwrap();
        assert!(!visit_id.is_empty());
        assert!(visit_id.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(ack["userId"], visit_id);
        // no clock was sent, so no time zone is reported
        assert_eq!(ack["clockTime"], "");
        assert!(ack["timeZone"].is_null());

        let record = LogRecord::parse(&sink.lines()[0]).unwrap();
        assert_eq!(record.get("co"), Some("no"));
        assert!(!record.has_environment());

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_sensor_bootstrap() {
        let (addr, shutdown_tx, _sink) = start().await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/sensor?12345/2", addr))
            .send()
            .await
            .expect("Failed to send request");

        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(response.headers()["cache-control"], "public, max-age=7776000");
        assert!(response.headers().get("expires").is_some());

        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["site"], "12345");
        assert_eq!(body["channel"], "2");
        assert_eq!(body["namespace"], "PageBeacon");
        assert_eq!(body["cookie_prefix"], "pb_");

        let missing = client
            .get(format!("http://{}/sensor", addr))
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(missing.status(), reqwest::StatusCode::BAD_REQUEST);
        let error: serde_json::Value = missing.json().await.unwrap();
        assert_eq!(error["code"], "MISSING_SITE");

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_concurrent_events_reach_file_log() {
        let path = std::env::temp_dir()
            .join(format!("pagebeacon-server-{}", uuid::Uuid::new_v4()))
            .join("events.log");
        let config = Config {
            port: 0,
            event_log_path: Some(path.clone()),
            ..Config::default()
        };
        let server_config = ServerConfig::from_config(config).expect("Failed to open event log");
        let (addr, shutdown_tx) = run(server_config).await.expect("Failed to start server");
        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = reqwest::Client::new();
        let requests = (0..20).map(|i| {
            let client = client.clone();
            async move {
                client
                    .get(format!(
                        "http://{}/event.json?site=42&type=user&name=n{}&visit_id=v{}&user_id=u{}",
                        addr, i, i, i
                    ))
                    .send()
                    .await
                    .expect("Failed to send request")
                    .status()
            }
        });
        let statuses = spawn_all(requests).await;
        assert!(statuses.iter().all(|s| *s == reqwest::StatusCode::OK));

        let content = std::fs::read_to_string(&path).unwrap();
        let records: Vec<LogRecord> = content
            .lines()
            .map(|line| LogRecord::parse(line).unwrap())
            .collect();
        assert_eq!(records.len(), 20);
        for i in 0..20 {
            let name = format!("n{}", i);
            assert!(records.iter().any(|r| r.event_name().as_deref() == Some(name.as_str())));
        }

        let _ = shutdown_tx.send(());
    }

    /// Await a batch of requests concurrently on the test runtime.
    async fn spawn_all<F>(requests: impl Iterator<Item = F>) -> Vec<F::Output>
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let handles: Vec<_> = requests.map(tokio::spawn).collect();
        let mut outputs = Vec::with_capacity(handles.len());
        for handle in handles {
            outputs.push(handle.await.expect("Request task failed"));
        }
        outputs
    }
}

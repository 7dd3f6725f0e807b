//! A short browsing session against a local collector.
//!
//! Starts the collector on a free port, then drives a sensor through a page
//! view, a download, a tracked link and an exit. Event log lines are printed
//! through tracing.
//!
//! Run with: cargo run --example page_session

use pagebeacon::client::{
    ClientConfig, Document, HttpTransport, Link, SensorClient, StaticEnvironment,
};
use pagebeacon::collector::TracingSink;
use pagebeacon::config::Config;
use pagebeacon::event::EventType;
use pagebeacon::identity::MemoryCookieJar;
use pagebeacon::server::{run, ServerConfig};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pagebeacon=info".into()),
        )
        .init();

    let config = Config {
        port: 0,
        ..Config::default()
    };
    let (addr, shutdown_tx) = run(ServerConfig::new(config, Arc::new(TracingSink))).await?;
    println!("Collector on http://{addr}");

    let transport = HttpTransport::new()?;
    let config = ClientConfig::new(format!("http://{addr}")).with_site("12345", None);
    let sensor = SensorClient::new(config, Arc::new(MemoryCookieJar::new()), Arc::new(transport))
        .with_probe(Arc::new(StaticEnvironment {
            resolution: "1920x1080".to_string(),
            color_depth: 24,
            java: "no".to_string(),
            flash: "no".to_string(),
        }));

    sensor.callbacks().set_on_event(|ack| {
        println!(
            "ack: {:<4} {:<40} visit={} global={} tz={:?}",
            ack.event_type, ack.event_name, ack.visit_id, ack.global_id, ack.time_zone
        );
    });

    let document = Document {
        url: "http://shop.example.com/index.html?campaign=newsletter".to_string(),
        title: "Shop".to_string(),
        referrer: "http://search.example.com/?q=shop".to_string(),
        links: vec![
            Link::new("http://shop.example.com/catalog.pdf", "Catalog"),
            Link::new("http://shop.example.com/about.html", "About us"),
        ],
    };

    let watch = sensor.on_page_load(&document);
    pause().await;

    sensor.on_link_mousedown(&watch, 0)?;
    pause().await;

    sensor.send_data(&[("plan", "pro"), ("seats", "3")])?;
    pause().await;

    sensor.on_link_mousedown(&watch, 1)?;
    sensor.on_page_unload();
    pause().await;

    sensor.record_event(EventType::Page, "http://shop.example.com/about.html", Some("About"))?;
    pause().await;

    println!("Form fields: {:?}", sensor.form_fields()?);

    let _ = shutdown_tx.send(());
    Ok(())
}

async fn pause() {
    tokio::time::sleep(Duration::from_millis(200)).await;
}

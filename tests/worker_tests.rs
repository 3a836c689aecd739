// Worker: cycle publication rules and spawn/shutdown

mod common;

use common::{FailingSource, FixedSource, device_stats, encode};
use netdev_exporter::collector::Collector;
use netdev_exporter::collector::netdev::NetDevCollector;
use netdev_exporter::worker::{ScrapeMetrics, WorkerConfig, WorkerDeps, run_cycle, spawn};
use prometheus::Registry;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[tokio::test]
async fn test_run_cycle_publishes_samples() {
    let registry = Registry::new();
    let scrape = ScrapeMetrics::register(&registry).unwrap();
    let source = FixedSource::new(device_stats(&[(
        "eth0",
        &[("receive_bytes", "1000"), ("transmit_bytes", "2000")],
    )]));
    let collectors: Vec<Arc<dyn Collector>> =
        vec![Arc::new(NetDevCollector::new(Box::new(source), registry.clone()))];

    let summary = run_cycle(&collectors, &scrape).await;
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.samples, 2);

    let text = encode(&registry);
    assert!(text.contains("node_network_receive_bytes{device=\"eth0\"} 1000"));
    assert!(text.contains("node_network_transmit_bytes{device=\"eth0\"} 2000"));
    assert!(text.contains("node_scrape_collector_success{collector=\"netdev\"} 1"));
    assert!(text.contains("node_scrape_collector_duration_seconds{collector=\"netdev\"}"));
}

#[tokio::test]
async fn test_run_cycle_drops_vanished_devices() {
    let registry = Registry::new();
    let scrape = ScrapeMetrics::register(&registry).unwrap();
    let source = FixedSource::new(device_stats(&[
        ("eth0", &[("receive_bytes", "1")]),
        ("veth1", &[("receive_bytes", "2")]),
    ]));
    let handle = source.handle();
    let collectors: Vec<Arc<dyn Collector>> =
        vec![Arc::new(NetDevCollector::new(Box::new(source), registry.clone()))];

    run_cycle(&collectors, &scrape).await;
    assert!(encode(&registry).contains("device=\"veth1\""));

    handle.replace(device_stats(&[("eth0", &[("receive_bytes", "3")])]));
    run_cycle(&collectors, &scrape).await;
    let text = encode(&registry);
    assert!(!text.contains("device=\"veth1\""));
    assert!(text.contains("node_network_receive_bytes{device=\"eth0\"} 3"));
}

#[tokio::test]
async fn test_concurrent_scrapes_always_see_every_device() {
    const DEVICES: usize = 200;

    fn stats(value: &str) -> netdev_exporter::netdev::DeviceStats {
        (0..DEVICES)
            .map(|i| {
                let counters: netdev_exporter::netdev::CounterSet =
                    [("receive_bytes".to_string(), value.to_string())].into();
                (format!("veth{i}"), counters)
            })
            .collect()
    }

    let registry = Registry::new();
    let scrape = ScrapeMetrics::register(&registry).unwrap();
    let source = FixedSource::new(stats("1"));
    let handle = source.handle();
    let collectors: Vec<Arc<dyn Collector>> =
        vec![Arc::new(NetDevCollector::new(Box::new(source), registry.clone()))];
    run_cycle(&collectors, &scrape).await;

    let stop = Arc::new(AtomicBool::new(false));
    let scraper = {
        let registry = registry.clone();
        let stop = stop.clone();
        std::thread::spawn(move || {
            let mut incomplete = 0;
            while !stop.load(Ordering::Relaxed) {
                let seen = encode(&registry)
                    .lines()
                    .filter(|l| l.starts_with("node_network_receive_bytes{"))
                    .count();
                if seen != DEVICES {
                    incomplete += 1;
                }
            }
            incomplete
        })
    };

    for cycle in 0..200 {
        handle.replace(stats(if cycle % 2 == 0 { "2" } else { "3" }));
        run_cycle(&collectors, &scrape).await;
    }
    stop.store(true, Ordering::Relaxed);
    assert_eq!(scraper.join().unwrap(), 0);
}

#[tokio::test]
async fn test_failed_cycle_keeps_previous_samples() {
    let registry = Registry::new();
    let scrape = ScrapeMetrics::register(&registry).unwrap();
    let source = FixedSource::new(device_stats(&[("eth0", &[("receive_bytes", "10")])]));
    let handle = source.handle();
    let collectors: Vec<Arc<dyn Collector>> =
        vec![Arc::new(NetDevCollector::new(Box::new(source), registry.clone()))];
    run_cycle(&collectors, &scrape).await;

    // One good counter and one bad one: nothing from this update is published.
    handle.replace(device_stats(&[(
        "eth0",
        &[("receive_bytes", "20"), ("transmit_bytes", "n/a")],
    )]));
    let summary = run_cycle(&collectors, &scrape).await;
    assert_eq!(summary.failed, 1);

    let text = encode(&registry);
    assert!(text.contains("node_network_receive_bytes{device=\"eth0\"} 10"));
    assert!(text.contains("node_scrape_collector_success{collector=\"netdev\"} 0"));
}

#[tokio::test]
async fn test_run_cycle_source_failure() {
    let registry = Registry::new();
    let scrape = ScrapeMetrics::register(&registry).unwrap();
    let collectors: Vec<Arc<dyn Collector>> =
        vec![Arc::new(NetDevCollector::new(Box::new(FailingSource), registry.clone()))];

    let summary = run_cycle(&collectors, &scrape).await;
    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.samples, 0);
    assert!(!encode(&registry).contains("node_network_"));
}

#[tokio::test]
async fn test_worker_spawn_ticks_and_shuts_down() {
    let registry = Registry::new();
    let scrape_metrics = ScrapeMetrics::register(&registry).unwrap();
    let source = FixedSource::new(device_stats(&[("lo", &[("receive_packets", "42")])]));
    let collectors: Vec<Arc<dyn Collector>> =
        vec![Arc::new(NetDevCollector::new(Box::new(source), registry.clone()))];

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = spawn(
        WorkerDeps {
            collectors,
            scrape_metrics,
            shutdown_rx,
        },
        WorkerConfig {
            sample_interval_ms: 25,
            stats_log_interval_secs: 3600,
        },
    );
    tokio::time::sleep(tokio::time::Duration::from_millis(150)).await;
    let _ = shutdown_tx.send(());
    handle.await.unwrap();

    assert!(
        encode(&registry).contains("node_network_receive_packets{device=\"lo\"} 42"),
        "worker should have published at least one cycle"
    );
}

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `alerts.rs`

#[cfg(test)]
mod tests {
    use crate::alerts::{alert_channel_with_capacity, random_suffix, AlertEvent, AlertSink};
    use crate::writer::RecordingWriter;
    use k8s_openapi::jiff::Timestamp;
    use std::sync::Arc;
    use std::time::Duration;

    fn alert(kind: &str, namespace: &str, name: &str) -> AlertEvent {
        AlertEvent {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            message: "cpu usage 90% exceeds threshold 80%".to_string(),
            reason: "ThresholdExceeded",
        }
    }

    #[test]
    fn test_random_suffix_is_lowercase_alphanumeric() {
        let suffix = random_suffix(16);
        assert_eq!(suffix.len(), 16);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_build_event_addresses_agent_pod() {
        let sink = AlertSink::new(
            Arc::new(RecordingWriter::default()),
            "cluster-agent-0".to_string(),
            "cluster-agent-system".to_string(),
        );
        let event = sink.build_event(&alert("Namespace", "", "team-a"));

        let name = event.metadata.name.clone().unwrap();
        assert!(name.starts_with("cluster-agent-0."));
        assert_eq!(name.len(), "cluster-agent-0.".len() + 16);
        assert_eq!(event.type_.as_deref(), Some("Warning"));
        assert_eq!(event.reason.as_deref(), Some("ThresholdExceeded"));
        assert_eq!(event.involved_object.kind.as_deref(), Some("Pod"));
        assert_eq!(
            event.involved_object.name.as_deref(),
            Some("cluster-agent-0")
        );
        assert_eq!(
            event.message.as_deref(),
            Some("Namespace team-a: cpu usage 90% exceeds threshold 80%")
        );
    }

    #[test]
    fn test_build_event_stamps_current_time() {
        let sink = AlertSink::new(
            Arc::new(RecordingWriter::default()),
            "cluster-agent-0".to_string(),
            "cluster-agent-system".to_string(),
        );
        let before = Timestamp::now();
        let event = sink.build_event(&alert("Node", "", "worker-1"));
        let after = Timestamp::now();

        let first = event.first_timestamp.clone().unwrap().0;
        assert!(before <= first && first <= after);
        assert_eq!(event.last_timestamp, event.first_timestamp);
        assert_eq!(event.count, Some(1));
    }

    #[tokio::test]
    async fn test_sink_writes_every_alert_in_order() {
        let writer = Arc::new(RecordingWriter::default());
        let sink = AlertSink::new(
            writer.clone(),
            "cluster-agent-0".to_string(),
            "cluster-agent-system".to_string(),
        );
        let (sender, rx) = alert_channel_with_capacity(1);
        let handle = tokio::spawn(sink.run(rx));

        for name in ["a", "b", "c"] {
            sender.emit(alert("Pod", "default", name)).await;
        }
        drop(sender);
        handle.await.unwrap().unwrap();

        let messages: Vec<String> = writer
            .events()
            .into_iter()
            .filter_map(|e| e.message)
            .collect();
        assert_eq!(messages.len(), 3);
        assert!(messages[0].starts_with("Pod default/a:"));
        assert!(messages[2].starts_with("Pod default/c:"));
    }

    #[tokio::test]
    async fn test_full_channel_blocks_sender() {
        let (sender, mut rx) = alert_channel_with_capacity(1);
        sender.emit(alert("Node", "", "n1")).await;

        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            sender.emit(alert("Node", "", "n2")),
        )
        .await;
        assert!(blocked.is_err(), "second alert should wait for capacity");

        assert_eq!(rx.recv().await.map(|a| a.name), Some("n1".to_string()));
    }
}

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the mesh integration

#[cfg(test)]
mod tests {
    use crate::errors::FrameError;
    use crate::mesh::proto::{
        BasicStats, Edge, EdgesOk, EdgesResponse, PodGroup, Resource, ResourceError, StatRow,
        StatSummaryOk, StatSummaryRequest, StatSummaryResponse, StatTable,
    };
    use crate::mesh::{decode_frame, encode_frame, is_mesh_workload, LinkerdClient};
    use k8s_openapi::api::core::v1::{Container, ContainerPort, PodSpec, PodTemplateSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn resource(kind: &str, name: &str) -> Option<Resource> {
        Some(Resource {
            namespace: "default".to_string(),
            r#type: kind.to_string(),
            name: name.to_string(),
        })
    }

    fn template(annotations: &[(&str, &str)], port: Option<&str>) -> PodTemplateSpec {
        PodTemplateSpec {
            metadata: Some(ObjectMeta {
                annotations: Some(
                    annotations
                        .iter()
                        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                        .collect::<BTreeMap<_, _>>(),
                ),
                ..Default::default()
            }),
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "app".to_string(),
                    ports: port.map(|name| {
                        vec![ContainerPort {
                            name: Some(name.to_string()),
                            container_port: 4191,
                            ..Default::default()
                        }]
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_mesh_workload_detection() {
        assert!(is_mesh_workload(&template(&[("linkerd.io/inject", "enabled")], None)));
        assert!(is_mesh_workload(&template(&[], Some("linkerd-admin"))));
        assert!(!is_mesh_workload(&template(&[("linkerd.io/inject", "disabled")], Some("http"))));
        assert!(!is_mesh_workload(&PodTemplateSpec::default()));
    }

    #[test]
    fn test_frame_layout_is_little_endian_length_prefix() {
        let request = StatSummaryRequest {
            time_window: "1m".to_string(),
            ..Default::default()
        };
        let frame = encode_frame(&request);
        let declared = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        assert_eq!(declared, frame.len() - 4);

        let decoded: StatSummaryRequest = decode_frame(&frame).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_decode_rejects_short_and_truncated_frames() {
        assert!(matches!(
            decode_frame::<StatSummaryRequest>(&[1, 0]),
            Err(FrameError::TooShort(2))
        ));
        assert!(matches!(
            decode_frame::<StatSummaryRequest>(&[10, 0, 0, 0, 1, 2]),
            Err(FrameError::Truncated {
                declared: 10,
                available: 2
            })
        ));
        assert!(matches!(
            decode_frame::<StatSummaryRequest>(&[2, 0, 0, 0, 0xff, 0xff]),
            Err(FrameError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_stat_summary_maps_rows() {
        let server = MockServer::start().await;
        let response = StatSummaryResponse {
            ok: Some(StatSummaryOk {
                stat_tables: vec![StatTable {
                    pod_group: Some(PodGroup {
                        rows: vec![StatRow {
                            resource: resource("deployment", "web"),
                            time_window: "1m".to_string(),
                            meshed_pod_count: 2,
                            running_pod_count: 3,
                            failed_pod_count: 0,
                            stats: Some(BasicStats {
                                success_count: 9,
                                failure_count: 1,
                                latency_ms_p50: 5,
                                latency_ms_p95: 20,
                                latency_ms_p99: 40,
                            }),
                        }],
                    }),
                }],
            }),
            error: None,
        };
        Mock::given(method("POST"))
            .and(path("/api/v1/StatSummary"))
            .and(|req: &Request| {
                decode_frame::<StatSummaryRequest>(&req.body)
                    .map(|r| r.time_window == "1m")
                    .unwrap_or(false)
            })
            .respond_with(ResponseTemplate::new(200).set_body_bytes(encode_frame(&response)))
            .mount(&server)
            .await;

        let client = LinkerdClient::new(server.uri(), reqwest::Client::new());
        let stats = client
            .stat_summary("default", "deployment", "1m")
            .await
            .unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].name, "web");
        assert_eq!(stats[0].meshed_pods, 2);
        assert_eq!(stats[0].success_rate, Some(0.9));
        assert_eq!(stats[0].latency_ms_p99, 40);
    }

    #[tokio::test]
    async fn test_remote_error_is_reported() {
        let server = MockServer::start().await;
        let response = EdgesResponse {
            ok: None,
            error: Some(ResourceError {
                resource: None,
                error: "namespace not found".to_string(),
            }),
        };
        Mock::given(method("POST"))
            .and(path("/api/v1/Edges"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(encode_frame(&response)))
            .mount(&server)
            .await;

        let client = LinkerdClient::new(server.uri(), reqwest::Client::new());
        let err = client.edges("missing", "deployment").await.unwrap_err();
        assert!(matches!(err, FrameError::Remote(msg) if msg == "namespace not found"));
    }

    #[tokio::test]
    async fn test_edges_are_labelled_by_kind_and_name() {
        let server = MockServer::start().await;
        let response = EdgesResponse {
            ok: Some(EdgesOk {
                edges: vec![Edge {
                    src: resource("deployment", "web"),
                    dst: resource("deployment", "api"),
                    client_id: "web.default.serviceaccount.identity".to_string(),
                    server_id: "api.default.serviceaccount.identity".to_string(),
                    no_identity_msg: String::new(),
                }],
            }),
            error: None,
        };
        Mock::given(method("POST"))
            .and(path("/api/v1/Edges"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(encode_frame(&response)))
            .mount(&server)
            .await;

        let client = LinkerdClient::new(server.uri(), reqwest::Client::new());
        let edges = client.edges("default", "deployment").await.unwrap();
        assert_eq!(edges[0].src, "deployment/web");
        assert_eq!(edges[0].dst, "deployment/api");
    }

    #[tokio::test]
    async fn test_http_failure_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = LinkerdClient::new(server.uri(), reqwest::Client::new());
        let err = client
            .stat_summary("default", "deployment", "1m")
            .await
            .unwrap_err();
        assert!(matches!(err, FrameError::Http(_)));
    }
}

use crate::{Bridge, BridgeError};
use async_trait::async_trait;

/// The narrow surface a generated gRPC service stub drives. Each concrete implementation binds
/// one workflow to its request/response message types; [`call_workflow`] is the glue a stub's
/// unary handler calls to run the bridge and map its outcome onto a [`tonic::Status`].
///
/// The actual `tonic`-generated server traits (one per workflow, produced from a `.proto`
/// describing that workflow's external surface) are out of this repo's scope per SPEC_FULL.md
/// §6; this trait and [`call_workflow`] are what a generated stub's method body would invoke.
#[async_trait]
pub trait WorkflowService: Send + Sync {
    type Request: ::prost::Message + Default + Send + 'static;
    type Response: ::prost::Message + Send + 'static;

    /// Name of the workflow this service bridges external calls into.
    fn workflow(&self) -> &str;
}

/// Runs one external call through `bridge` on behalf of `service`, mapping a bridge failure onto
/// `Status::INTERNAL` with the envelope's error string as message, per §6's External surface and
/// §7's propagation policy for `ReplyTimeout`/remote errors.
pub async fn call_workflow<S: WorkflowService>(
    bridge: &Bridge,
    service: &S,
    request: tonic::Request<S::Request>,
) -> Result<tonic::Response<S::Response>, tonic::Status> {
    let response = bridge
        .call::<S::Request, S::Response>(service.workflow(), request.get_ref())
        .await
        .map_err(to_status)?;
    Ok(tonic::Response::new(response))
}

fn to_status(err: BridgeError) -> tonic::Status {
    tonic::Status::internal(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use krt_bus::fake::FakeBus;
    use krt_bus::{Bus, DeliverPolicy};
    use krt_config::EntrypointConfig;
    use krt_envelope::{CompressionLimit, Envelope, MessageType};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Clone, PartialEq, Default, ::prost::Message)]
    struct GreetRequest {
        #[prost(string, tag = "1")]
        name: String,
    }

    #[derive(Clone, PartialEq, Default, ::prost::Message)]
    struct GreetResponse {
        #[prost(string, tag = "1")]
        greeting: String,
    }

    struct GreetingService;

    #[async_trait]
    impl WorkflowService for GreetingService {
        type Request = GreetRequest;
        type Response = GreetResponse;

        fn workflow(&self) -> &str {
            "greet"
        }
    }

    fn test_config() -> EntrypointConfig {
        use clap::Parser;
        EntrypointConfig::parse_from([
            "entrypoint",
            "--runner-name",
            "entry",
            "--runtime-id",
            "rt",
            "--krt-version-id",
            "v1",
            "--krt-version",
            "1.0.0",
            "--reply-timeout-secs",
            "2",
        ])
    }

    #[tokio::test]
    async fn call_workflow_maps_a_successful_reply_to_a_tonic_response() {
        let bus = FakeBus::new();
        let config = test_config();
        let stream = config.stream_name("greet");
        let bridge = Bridge::new(Arc::new(bus.clone()), config.clone());
        bridge.register_workflow("greet").await.unwrap();

        let runner_name = config.runner_name.clone();
        let bus_for_node = bus.clone();
        bus.subscribe_durable(
            &stream,
            &format!("{stream}.entrypoint"),
            "node-a",
            "node-a",
            DeliverPolicy::New,
            Duration::from_secs(60),
            Box::new(move |delivery| {
                let bus = bus_for_node.clone();
                let stream = stream.clone();
                let runner_name = runner_name.clone();
                let payload = delivery.payload().to_vec();
                tokio::spawn(async move {
                    let request = krt_envelope::decode(&payload).await.unwrap();
                    let greet: GreetRequest =
                        krt_envelope::unpack(request.payload.as_ref().unwrap()).unwrap();
                    let reply_payload = krt_envelope::pack(&GreetResponse {
                        greeting: format!("hello, {}", greet.name),
                    })
                    .unwrap();
                    let reply = request.respond("node-a", MessageType::Ok, Some(reply_payload));
                    let reply_subject = format!("{stream}.{runner_name}");
                    let bytes = krt_envelope::encode(&reply, CompressionLimit::default())
                        .await
                        .unwrap();
                    bus.publish(&stream, &reply_subject, bytes).await.unwrap();
                });
            }),
        )
        .await
        .unwrap();

        let service = GreetingService;
        let request = tonic::Request::new(GreetRequest {
            name: "ada".to_string(),
        });
        let response = call_workflow(&bridge, &service, request).await.unwrap();

        assert_eq!(response.into_inner().greeting, "hello, ada");
    }

    #[tokio::test]
    async fn call_workflow_maps_a_remote_error_to_status_internal() {
        let bus = FakeBus::new();
        let config = test_config();
        let stream = config.stream_name("greet");
        let bridge = Bridge::new(Arc::new(bus.clone()), config.clone());
        bridge.register_workflow("greet").await.unwrap();

        let runner_name = config.runner_name.clone();
        let bus_for_node = bus.clone();
        bus.subscribe_durable(
            &stream,
            &format!("{stream}.entrypoint"),
            "node-a",
            "node-a",
            DeliverPolicy::New,
            Duration::from_secs(60),
            Box::new(move |delivery| {
                let bus = bus_for_node.clone();
                let stream = stream.clone();
                let runner_name = runner_name.clone();
                let payload = delivery.payload().to_vec();
                tokio::spawn(async move {
                    let request = krt_envelope::decode(&payload).await.unwrap();
                    let reply = Envelope::error_response(
                        request.request_id.clone(),
                        request.tracking_id.clone(),
                        "node-a",
                        "boom",
                    );
                    let reply_subject = format!("{stream}.{runner_name}");
                    let bytes = krt_envelope::encode(&reply, CompressionLimit::default())
                        .await
                        .unwrap();
                    bus.publish(&stream, &reply_subject, bytes).await.unwrap();
                });
            }),
        )
        .await
        .unwrap();

        let service = GreetingService;
        let request = tonic::Request::new(GreetRequest {
            name: "ada".to_string(),
        });
        let status = call_workflow(&bridge, &service, request)
            .await
            .unwrap_err();

        assert_eq!(status.code(), tonic::Code::Internal);
        assert!(status.message().contains("boom"));
    }
}

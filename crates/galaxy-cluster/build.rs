//! Generates the tonic client and server stubs for the Galaxy services.
//!
//! Messages are declared by hand in `src/proto.rs`, so only the service
//! plumbing is generated here and no `protoc` is required.

use tonic_build::manual::{Builder, Method, Service};

const CODEC: &str = "tonic::codec::ProstCodec";

fn heartbeat() -> Method {
    Method::builder()
        .name("heartbeat")
        .route_name("Heartbeat")
        .input_type("crate::proto::Empty")
        .output_type("crate::proto::HeartbeatResponse")
        .codec_path(CODEC)
        .build()
}

fn main() {
    let control = Service::builder()
        .name("ControlService")
        .package("galaxy")
        .method(heartbeat())
        .method(
            Method::builder()
                .name("register")
                .route_name("Register")
                .input_type("crate::proto::Node")
                .output_type("crate::proto::RegisterResponse")
                .codec_path(CODEC)
                .build(),
        )
        .method(
            Method::builder()
                .name("deregister")
                .route_name("Deregister")
                .input_type("crate::proto::Node")
                .output_type("crate::proto::RegisterResponse")
                .codec_path(CODEC)
                .build(),
        )
        .method(
            Method::builder()
                .name("list_nodes")
                .route_name("ListNodes")
                .input_type("crate::proto::Node")
                .output_type("crate::proto::Node")
                .codec_path(CODEC)
                .server_streaming()
                .build(),
        )
        .build();

    let node = Service::builder()
        .name("NodeService")
        .package("galaxy")
        .method(heartbeat())
        .build();

    Builder::new().compile(&[control, node]);
}

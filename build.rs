use std::env;
use std::path::PathBuf;

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR not set"));

    // Build servers for the services this crate provides. The descriptor set
    // feeds gRPC reflection so generic clients (grpcurl) can discover them.
    tonic_build::configure()
        .build_server(true)
        .build_client(false)
        .file_descriptor_set_path(out_dir.join("interaction_descriptor.bin"))
        .compile(&["proto/stream.proto", "proto/chat.proto"], &["proto"])
        .expect("Failed to compile stream/chat protos");

    // Build client for the user directory (this crate consumes it).
    tonic_build::configure()
        .build_server(false)
        .build_client(true)
        .compile(&["proto/user.proto"], &["proto"])
        .expect("Failed to compile user.proto");
}

//! Build script for insight-sync-core.
//!
//! Compiles the `controltower.v1` protobuf definitions into client code.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure()
        // Only the client side of ToolService is used
        .build_server(false)
        .build_client(true)
        .compile_protos(&["proto/controltower.proto"], &["proto/"])?;

    println!("cargo:rerun-if-changed=proto/");

    Ok(())
}

//! Regenerates the checked in Sparkplug B protobuf module of `spbnode-types`.

use std::io::{Error, ErrorKind, Result};
use std::path::PathBuf;

fn main() -> Result<()> {
    let dir = PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").map_err(Error::other)?);
    let workspace = dir
        .parent()
        .ok_or_else(|| Error::new(ErrorKind::NotFound, "workspace root not found"))?;
    let protodir = workspace.join("protos");
    let sparkplug_proto = "sparkplug_b.proto";

    let outdir = workspace.join("spbnode-types/src/generated");

    prost_build::Config::new()
        .out_dir(&outdir)
        .compile_protos(&[sparkplug_proto], &[protodir])?;

    std::fs::rename(
        outdir.join("org.eclipse.tahu.protobuf.rs"),
        outdir.join("sparkplug_payload.rs"),
    )?;

    Ok(())
}

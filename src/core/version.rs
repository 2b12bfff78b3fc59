//! Build metadata accessors.
//! Includes the generated version.rs from the build script.

include!(concat!(env!("OUT_DIR"), "/version.rs"));

/// Crate version from Cargo.toml
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Build time string from the build script (UTC)
pub fn build_time() -> &'static str {
    BUILD_TIME
}

/// Short git hash captured by the build script
pub fn git_hash() -> &'static str {
    GIT_HASH
}

/// Cargo profile the binary was built with
pub fn build_profile() -> &'static str {
    BUILD_PROFILE
}

/// One-line version banner used by the binary
pub fn banner() -> String {
    format!(
        "fanout {} ({}, {} build {})",
        version(),
        git_hash(),
        build_profile(),
        build_time()
    )
}

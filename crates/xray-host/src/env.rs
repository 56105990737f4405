use std::ffi::OsStr;
use std::path::Path;

/// Environment key the engine reads its geo/asset files location from.
pub const ASSET_LOCATION_ENV: &str = "xray.location.asset";

/// Points the engine at its asset directory (geoip/geosite files).
pub fn set_assets_directory(path: impl AsRef<Path>) {
    set_engine_env(ASSET_LOCATION_ENV, path.as_ref().as_os_str());
}

/// Sets an engine environment key such as `xray.location.config` or
/// `xray.buf.readv`. Must be called before the engine starts.
pub fn set_engine_env(key: &str, value: impl AsRef<OsStr>) {
    let value = value.as_ref();
    tracing::debug!(target: "xray.host", key, value = ?value, "engine environment set");
    std::env::set_var(key, value);
}

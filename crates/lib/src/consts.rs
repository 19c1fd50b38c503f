/// Application name used for store and data directories.
pub const APP_NAME: &str = "stagehand";

/// Recipe file looked up when no path is given.
pub const DEFAULT_RECIPE: &str = "stage.lua";

/// Length of the truncated hashes used for store directory names.
pub const OBJ_HASH_PREFIX_LEN: usize = 20;

/// Marker file written once a promoted artifact is complete.
pub const ARTIFACT_COMPLETE_MARKER: &str = ".stagehand-complete";

/// Artifact contract file, next to the promoted binary in the store.
pub const ARTIFACT_MANIFEST_FILE: &str = "artifact.json";

/// Runtime image manifest file, at the image root.
pub const IMAGE_MANIFEST_FILE: &str = "image.json";

/// Root filesystem directory inside a runtime image.
pub const IMAGE_ROOTFS_DIR: &str = "rootfs";

/// Environment variable set for the compiler when a schema fixture stands in
/// for the live resource.
pub const SCHEMA_FIXTURE_ENV: &str = "STAGEHAND_SCHEMA_FIXTURE";

/// `SOURCE_DATE_EPOCH` exported to builds: 1980-01-01T00:00:00Z (ZIP epoch).
pub const SOURCE_DATE_EPOCH: &str = "315532800";

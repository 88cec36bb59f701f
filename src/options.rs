use crate::error::{DiskError, Result};
use crate::vdi::header::BLOCK_SIZE;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configuration accepted by [`crate::vdi::VdiDisk::create`]. Mirrors the
/// driver surface's `Create(path, options)` operation: a small set of
/// enumerated, validated keys rather than an open-ended bag of settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOptions {
    /// Virtual disk size in bytes. Must be a positive multiple of 1 MiB.
    pub size: u64,
    /// If true, pre-allocate every block at creation time.
    #[serde(default, rename = "static")]
    pub static_image: bool,
    /// Reserved: only the canonical 1 MiB block size is accepted.
    #[serde(default)]
    pub cluster_size: Option<u64>,
}

impl CreateOptions {
    pub fn new(size: u64) -> Self {
        Self { size, static_image: false, cluster_size: None }
    }

    pub fn is_static(&self) -> bool {
        self.static_image
    }

    /// Builds options from a string-keyed map, the shape a CLI option parser
    /// or a JSON/TOML config file would hand the driver. Recognized keys:
    /// `size` (required), `static`, `cluster_size`.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self> {
        let size = map
            .get("size")
            .ok_or_else(|| DiskError::NotSupported("missing required option \"size\"".to_string()))?
            .parse::<u64>()
            .map_err(|_| DiskError::NotSupported("option \"size\" is not a valid integer".to_string()))?;

        let static_image = match map.get("static") {
            None => false,
            Some(v) => v
                .parse::<bool>()
                .map_err(|_| DiskError::NotSupported("option \"static\" is not a valid bool".to_string()))?,
        };

        let cluster_size = match map.get("cluster_size") {
            None => None,
            Some(v) => Some(
                v.parse::<u64>()
                    .map_err(|_| DiskError::NotSupported("option \"cluster_size\" is not a valid integer".to_string()))?,
            ),
        };

        for key in map.keys() {
            if !matches!(key.as_str(), "size" | "static" | "cluster_size") {
                return Err(DiskError::NotSupported(format!("unrecognized option \"{key}\"")));
            }
        }

        let opts = Self { size, static_image, cluster_size };
        opts.validate()?;
        Ok(opts)
    }

    /// Validates the combination without constructing a disk.
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 || self.size % BLOCK_SIZE as u64 != 0 {
            return Err(DiskError::NotSupported(
                "\"size\" must be a positive multiple of the block size".to_string(),
            ));
        }
        if let Some(cluster_size) = self.cluster_size {
            if cluster_size != BLOCK_SIZE as u64 {
                return Err(DiskError::NotSupported(
                    "\"cluster_size\" must equal the canonical 1 MiB block size".to_string(),
                ));
            }
        }
        Ok(())
    }
}

//! Session configuration and per-field transfer options.
//!
//! Everything here is plain data with `serde` support so a coupling setup can
//! be kept in a JSON file next to the simulation inputs:
//!
//! ```json
//! {
//!   "search_grid": { "nx": 20, "ny": 20 },
//!   "recv_timeout_ms": 60000,
//!   "native_to_internal": {
//!     "transfer_method": "copy",
//!     "evaluation_method": "nearest_neighbor"
//!   },
//!   "internal_to_native": {
//!     "transfer_method": "interpolate",
//!     "evaluation_method": { "lagrange": 1 }
//!   }
//! }
//! ```

use std::io::Read;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::coupling_error::CouplingError;
use crate::data::search_grid::GridResolution;

/// How values move between a native field and its internal field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldTransferMethod {
    /// Match entities by gid and copy values.
    #[default]
    Copy,
    /// Evaluate the source at the destination's coordinates.
    Interpolate,
}

/// Interpolation kernel used by [`FieldTransferMethod::Interpolate`] and by
/// conversions between internal fields of different element types.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMethod {
    #[default]
    NearestNeighbor,
    /// Lagrange interpolation of the given order; only order 1 is available.
    Lagrange(u8),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferOptions {
    pub transfer_method: FieldTransferMethod,
    pub evaluation_method: EvaluationMethod,
}

impl TransferOptions {
    pub const fn new(
        transfer_method: FieldTransferMethod,
        evaluation_method: EvaluationMethod,
    ) -> Self {
        Self {
            transfer_method,
            evaluation_method,
        }
    }

    /// Gid-matched copy.
    pub const fn copy() -> Self {
        Self::new(FieldTransferMethod::Copy, EvaluationMethod::NearestNeighbor)
    }

    pub const fn interpolate(evaluation_method: EvaluationMethod) -> Self {
        Self::new(FieldTransferMethod::Interpolate, evaluation_method)
    }
}

/// Settings shared by every field of a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CouplerConfig {
    /// Resolution of the search grids built for internal fields.
    pub search_grid: GridResolution,
    /// Upper bound on a single blocking receive; `None` waits forever.
    pub recv_timeout_ms: Option<u64>,
    /// Defaults used by `add_field_default`.
    pub native_to_internal: TransferOptions,
    pub internal_to_native: TransferOptions,
}

impl Default for CouplerConfig {
    fn default() -> Self {
        Self {
            search_grid: GridResolution::default(),
            recv_timeout_ms: None,
            native_to_internal: TransferOptions::copy(),
            internal_to_native: TransferOptions::copy(),
        }
    }
}

impl CouplerConfig {
    pub fn from_json_str(s: &str) -> Result<Self, CouplingError> {
        let cfg: Self = serde_json::from_str(s)
            .map_err(|e| CouplingError::InvalidConfig(format!("coupler config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, CouplingError> {
        let cfg: Self = serde_json::from_reader(reader)
            .map_err(|e| CouplingError::InvalidConfig(format!("coupler config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn to_json_string(&self) -> Result<String, CouplingError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CouplingError::InvalidConfig(format!("coupler config: {e}")))
    }

    /// Reject grids with an empty axis.
    pub fn validate(&self) -> Result<(), CouplingError> {
        if self.search_grid.nx == 0 || self.search_grid.ny == 0 {
            return Err(CouplingError::InvalidConfig(format!(
                "search grid {}x{} has an empty axis",
                self.search_grid.nx, self.search_grid.ny
            )));
        }
        Ok(())
    }

    pub fn recv_timeout(&self) -> Option<Duration> {
        self.recv_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_ten_by_ten_grid() {
        let cfg = CouplerConfig::default();
        assert_eq!(cfg.search_grid, GridResolution { nx: 10, ny: 10 });
        assert_eq!(cfg.recv_timeout(), None);
        assert_eq!(cfg.native_to_internal, TransferOptions::copy());
    }

    #[test]
    fn parses_partial_json() {
        let cfg = CouplerConfig::from_json_str(
            r#"{
                "recv_timeout_ms": 250,
                "internal_to_native": {
                    "transfer_method": "interpolate",
                    "evaluation_method": { "lagrange": 1 }
                }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.recv_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(
            cfg.internal_to_native,
            TransferOptions::interpolate(EvaluationMethod::Lagrange(1))
        );
        assert_eq!(cfg.search_grid, GridResolution::default());
    }

    #[test]
    fn json_roundtrip_and_validation() {
        let mut cfg = CouplerConfig::default();
        cfg.search_grid = GridResolution { nx: 4, ny: 8 };
        let text = cfg.to_json_string().unwrap();
        assert_eq!(CouplerConfig::from_reader(text.as_bytes()).unwrap(), cfg);

        let err = CouplerConfig::from_json_str(r#"{"search_grid": {"nx": 0, "ny": 3}}"#)
            .unwrap_err();
        assert!(matches!(err, CouplingError::InvalidConfig(_)));
        assert!(CouplerConfig::from_json_str("{").is_err());
    }
}

//! Versioned capability surface for embedders.
//!
//! Consumers compiled against one revision of the scheduling API declare the
//! version they expect before touching anything else. Binding succeeds only
//! when the provided major matches exactly and the provided minor is at least
//! the required one; a major bump breaks every existing consumer on purpose.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// API revision pair. The major gates compatibility, the minor only grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiVersion {
    /// Incompatible-change counter.
    pub major: u16,
    /// Additive-change counter within a major.
    pub minor: u16,
}

impl ApiVersion {
    /// Construct a version pair.
    #[must_use]
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

impl std::fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Feature switches advertised alongside the version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSet {
    /// Ready hook installation is available.
    pub ready_hook: bool,
    /// Schedule-like operations can be driven through the protocol.
    pub slf_protocol: bool,
    /// Per-context environment save masks are honored.
    pub env_save_mask: bool,
}

/// The capability table a successful bind hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityTable {
    /// Revision this build provides.
    pub version: ApiVersion,
    /// What this build can do.
    pub features: FeatureSet,
}

/// The one table this build provides. Older revisions are not kept around;
/// consumers of a previous major must rebuild.
static TABLE: CapabilityTable = CapabilityTable {
    version: ApiVersion::new(7, 0),
    features: FeatureSet {
        ready_hook: true,
        slf_protocol: true,
        env_save_mask: true,
    },
};

/// Why a bind was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BindError {
    /// The consumer was built against a different major.
    #[error("api major mismatch: consumer requires {required}, this build provides {provided}")]
    MajorMismatch {
        /// Version the consumer asked for.
        required: ApiVersion,
        /// Version this build provides.
        provided: ApiVersion,
    },
    /// Same major, but the consumer needs a newer minor.
    #[error("api minor too old: consumer requires {required}, this build provides {provided}")]
    MinorTooOld {
        /// Version the consumer asked for.
        required: ApiVersion,
        /// Version this build provides.
        provided: ApiVersion,
    },
}

/// The table this build advertises, without any compatibility check.
#[must_use]
pub fn table() -> &'static CapabilityTable {
    &TABLE
}

/// Compatibility rule for any `(required, provided)` pair: majors equal,
/// provided minor at least the required one.
const fn check_compat(required: ApiVersion, provided: ApiVersion) -> Result<(), BindError> {
    if required.major != provided.major {
        return Err(BindError::MajorMismatch { required, provided });
    }
    if required.minor > provided.minor {
        return Err(BindError::MinorTooOld { required, provided });
    }
    Ok(())
}

/// Bind against the advertised table.
///
/// # Errors
///
/// [`BindError::MajorMismatch`] when the majors differ,
/// [`BindError::MinorTooOld`] when the consumer needs a minor this build
/// does not reach.
pub fn try_bind(required: ApiVersion) -> Result<&'static CapabilityTable, BindError> {
    check_compat(required, TABLE.version)?;
    Ok(&TABLE)
}

/// Bind at module load time, where refusal means the process cannot work.
///
/// # Panics
///
/// Panics with a message naming `module` when [`try_bind`] refuses, since a
/// consumer compiled against an incompatible revision must not limp on.
#[must_use]
pub fn bind(module: &str, required: ApiVersion) -> &'static CapabilityTable {
    match try_bind(required) {
        Ok(table) => {
            tracing::debug!("module {module} bound api {required}");
            table
        }
        Err(e) => panic!("module {module} cannot bind scheduling api: {e}"),
    }
}

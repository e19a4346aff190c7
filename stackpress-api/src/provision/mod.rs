//! WordPress + MySQL stack provisioning
//!
//! - `naming`: suffixes, bounded resource names, credentials
//! - `descriptors`: Kubernetes object builders
//! - `readiness`: deployment readiness polling
//! - `sequencer`: the ordered provisioning pipeline

pub mod descriptors;
pub mod error;
pub mod naming;
pub mod readiness;
pub mod sequencer;
pub mod types;

pub use error::{GatewayAction, ProvisionError};
pub use naming::{EntropySource, OsEntropy, RandomSourceError};
pub use readiness::{ReadinessError, ReadinessPoller};
pub use sequencer::{Sequencer, Stage};
pub use types::{
    CredentialSet, ManifestEntry, ProvisionRequest, ProvisioningOutcome, ResourceKind, StackNames,
    Tier,
};

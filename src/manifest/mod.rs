//! Durable record of a run: identity, step statuses, artifact references.

pub mod model;
pub mod store;

pub use model::{
    ArtifactUpdate, Artifacts, FailureContext, MANIFEST_VERSION, Manifest, MinutesRefs, Step,
    StepError, StepRecord, StepStatus, TranscriptRefs,
};
pub use store::{ManifestStore, Persistence};

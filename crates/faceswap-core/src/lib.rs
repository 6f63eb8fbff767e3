//! faceswap-core: shared pieces of the face swap service.
//!
//! Upload staging in the shared storage location, the external processing
//! command, and the client workflow that drives a submission.

pub mod runner;
pub mod storage;
pub mod types;
pub mod workflow;

pub use runner::{CommandOutput, RunnerError, SwapCommand, SwapJob};
pub use storage::{SharedStorage, StorageError, StoredFile, SweepReport};
pub use types::{ErrorBody, ImageRole, SwapParams, SwapResponse};
pub use workflow::{SelectedImage, SubmitRequest, Workflow, WorkflowError, WorkflowState};

use serde::{Deserialize, Serialize};

/// How an idempotent pipeline step finished: it either mutated the remote
/// state or found its target state already satisfied and skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Performed,
    AlreadyExists,
}

impl StepOutcome {
    pub fn did_work(self) -> bool {
        matches!(self, StepOutcome::Performed)
    }
}

/// Per-step booleans of the publish response. `true` means the step actually
/// did work; a skipped step (target state already present) reports `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepFlags {
    pub file_upload: bool,
    pub page_update: bool,
    pub flipbook_creation: bool,
    pub page_two_update: bool,
}

/// Wire shape of a completed publish. Field names are a compatibility
/// contract with the existing front-end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishReport {
    pub success: bool,
    pub message: String,
    pub data: StepFlags,
}

//! Upload pipeline: stages the remote call for a file or token and feeds
//! the outcome back into the transcript and the live form.
//!
//! Every call is split in two. The claim runs under the state lock in the
//! same section that checked the persona and the live form: it validates
//! the input, takes the control, and records the epoch. The run stage then
//! makes the remote call without the lock and applies the outcome only if
//! the epoch is still current. A second submission while one is in flight
//! is a no-op (`InputError::Busy`).

use std::result::Result as StdResult;
use std::sync::Arc;

use secrecy::SecretString;
use tracing::{debug, info, warn};

use crate::controller::{Shared, WidgetState};
use crate::error::{InputError, Result};
use crate::forms::{ColumnMapping, DynamicForm, FileKind, FileRef};
use crate::gateway::{ImportSummary, ScanResult, UploadReply};
use crate::session::Persona;
use crate::surface::Control;
use crate::transcript::Turn;

const TOKEN_ACCEPTED_TEXT: &str =
    "Token accepted. Drop a business card or a spreadsheet to get started.";

/// A control taken under the state lock, with the token its call uses.
pub(crate) struct Claim {
    epoch: u64,
    token: SecretString,
}

/// Which file form a submission belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileForm {
    Notes,
    Mapping,
}

/// Claim the send control for a token candidate.
pub(crate) fn claim_token(
    state: &mut WidgetState,
    candidate: &str,
) -> StdResult<Claim, InputError> {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return Err(InputError::EmptyToken);
    }
    if state.session.persona != Persona::Ingest {
        return Err(InputError::IngestOnly);
    }
    if !state.session.state().expects_token() {
        return Err(InputError::WrongForm);
    }
    let epoch = state.begin(Control::Send)?;
    Ok(Claim {
        epoch,
        token: SecretString::from(candidate.to_string()),
    })
}

/// Claim the upload control for a call made with the stored token.
fn claim_upload(state: &mut WidgetState) -> StdResult<Claim, InputError> {
    if state.session.persona != Persona::Ingest {
        return Err(InputError::IngestOnly);
    }
    let token = Shared::token_copy(state).ok_or(InputError::MissingToken)?;
    let epoch = state.begin(Control::Upload)?;
    Ok(Claim { epoch, token })
}

/// Claim the upload control for a mapping suggestion and stage `file`.
pub(crate) fn claim_mapping(
    state: &mut WidgetState,
    file: &FileRef,
) -> StdResult<Claim, InputError> {
    if file.kind != FileKind::Spreadsheet {
        return Err(InputError::WrongForm);
    }
    let claim = claim_upload(state)?;
    state.session.pending_file = Some(file.clone());
    Ok(claim)
}

/// Claim the upload control for the file waiting behind the live `form`.
fn claim_pending(
    state: &mut WidgetState,
    form: FileForm,
) -> StdResult<(Claim, FileRef), InputError> {
    let form_matches = matches!(
        (state.form.live(), form),
        (DynamicForm::NotesAndFileConfirm { .. }, FileForm::Notes)
            | (DynamicForm::SpreadsheetMapping { .. }, FileForm::Mapping)
    );
    if !form_matches {
        return Err(InputError::WrongForm);
    }
    let file = state
        .session
        .pending_file
        .clone()
        .ok_or(InputError::NoPendingFile)?;
    let expected = match form {
        FileForm::Notes => FileKind::Scan,
        FileForm::Mapping => FileKind::Spreadsheet,
    };
    if file.kind != expected {
        return Err(InputError::WrongForm);
    }
    let claim = claim_upload(state)?;
    Ok((claim, file))
}

/// Remote-call orchestration for the ingest persona.
#[derive(Clone)]
pub struct UploadPipeline {
    shared: Arc<Shared>,
}

impl UploadPipeline {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Check a candidate token with the service.
    ///
    /// On acceptance the token is persisted and the widget moves to
    /// `IngestReady`. On rejection an error turn is appended and nothing else
    /// changes. No retry is attempted.
    pub async fn validate_token(&self, candidate: &str) -> Result<()> {
        let claim = {
            let mut state = self.shared.state.lock().await;
            claim_token(&mut state, candidate)?
        };
        self.run_token(claim).await
    }

    pub(crate) async fn run_token(&self, claim: Claim) -> Result<()> {
        let Claim { epoch, token } = claim;
        debug!(epoch, "Validating token");
        let result = self.shared.gateway.validate_token(&token).await;

        let mut state = self.shared.state.lock().await;
        if state.is_current(epoch) {
            match &result {
                Ok(()) => {
                    if let Err(e) = self.shared.tokens.set(&mut state.session, token).await {
                        warn!("Failed to persist token: {}", e);
                    }
                    info!(to = %state.session.state(), "Token accepted");
                    state.log.append(Turn::system(TOKEN_ACCEPTED_TEXT));
                    state.form.show(DynamicForm::FileDrop);
                }
                Err(e) => {
                    info!("Token rejected");
                    state
                        .log
                        .append(Turn::error(format!("Token rejected: {}", e.reason())));
                }
            }
        } else {
            debug!(epoch, "Dropping stale token validation");
        }
        state.settle(Control::Send);
        state.surface.clear_input();
        Ok(result?)
    }

    /// Ask the service how the spreadsheet's columns map onto contact fields.
    ///
    /// Success opens an editable mapping form; failure returns to the drop surface.
    pub(crate) async fn suggest_mapping(
        &self,
        claim: Claim,
        file: FileRef,
    ) -> Result<ColumnMapping> {
        let epoch = claim.epoch;
        info!(file = %file.name, bytes = file.len(), "Requesting mapping suggestion");
        let result = self.shared.gateway.suggest_mapping(&file).await;

        let mut state = self.shared.state.lock().await;
        if state.is_current(epoch) {
            match &result {
                Ok(suggested) => {
                    state.form.show(DynamicForm::SpreadsheetMapping {
                        file_name: file.name.clone(),
                        suggested: suggested.clone(),
                    });
                }
                Err(e) => {
                    state.session.pending_file = None;
                    state.log.append(Turn::error(format!(
                        "Could not read the columns of {}: {}",
                        file.name,
                        e.reason()
                    )));
                    state.form.show(DynamicForm::FileDrop);
                }
            }
        } else {
            debug!(epoch, "Dropping stale mapping suggestion");
        }
        state.settle(Control::Upload);
        Ok(result?)
    }

    /// Scan the staged business card into a contact and show the follow-up email.
    pub async fn scan_and_import(&self, notes: &str) -> Result<ScanResult> {
        let (Claim { epoch, token }, file) = {
            let mut state = self.shared.state.lock().await;
            claim_pending(&mut state, FileForm::Notes)?
        };

        info!(file = %file.name, bytes = file.len(), "Uploading business card");
        let result = self
            .shared
            .gateway
            .upload_business_card(&file, &token, notes.trim())
            .await;

        let mut state = self.shared.state.lock().await;
        if state.is_current(epoch) {
            state.session.pending_file = None;
            match &result {
                Ok(scan) => {
                    state.log.append(Turn::assistant(
                        Persona::Ingest,
                        format!(
                            "Contact saved from {}. Here's a follow-up email you can send:\n\n{}",
                            file.name, scan.follow_up_email
                        ),
                    ));
                }
                Err(e) => {
                    state
                        .log
                        .append(Turn::error(format!("Upload failed: {}", e.reason())));
                }
            }
            state.form.show(DynamicForm::FileDrop);
        } else {
            debug!(epoch, "Dropping stale scan result");
        }
        state.settle(Control::Upload);
        Ok(result?)
    }

    /// Import every row of the staged spreadsheet with the confirmed mapping.
    ///
    /// On failure the mapping form stays live so the user can resubmit.
    pub async fn bulk_import(&self, mapping: ColumnMapping) -> Result<ImportSummary> {
        let (Claim { epoch, token }, file) = {
            let mut state = self.shared.state.lock().await;
            claim_pending(&mut state, FileForm::Mapping)?
        };

        info!(file = %file.name, columns = mapping.len(), "Starting bulk import");
        let result = self
            .shared
            .gateway
            .bulk_import(&file, &token, &mapping)
            .await;

        let mut state = self.shared.state.lock().await;
        if state.is_current(epoch) {
            match &result {
                Ok(summary) => {
                    info!(processed = summary.processed, "Bulk import finished");
                    state.session.pending_file = None;
                    state.log.append(Turn::assistant(
                        Persona::Ingest,
                        format!(
                            "Bulk import complete: {} records processed from {}.",
                            summary.processed, file.name
                        ),
                    ));
                    state.form.show(DynamicForm::FileDrop);
                }
                Err(e) => {
                    state
                        .log
                        .append(Turn::error(format!("Import failed: {}", e.reason())));
                }
            }
        } else {
            debug!(epoch, "Dropping stale import result");
        }
        state.settle(Control::Upload);
        Ok(result?)
    }

    /// OCR preview of the staged card through the generic upload endpoint;
    /// nothing is imported and the notes form stays live.
    pub async fn preview(&self) -> Result<UploadReply> {
        let (claim, file) = {
            let mut state = self.shared.state.lock().await;
            claim_pending(&mut state, FileForm::Notes)?
        };
        let epoch = claim.epoch;

        info!(file = %file.name, "Requesting OCR preview");
        let result = self.shared.gateway.upload(&file).await;

        let mut state = self.shared.state.lock().await;
        if state.is_current(epoch) {
            match &result {
                Ok(reply) => {
                    let text = match reply.ocr_text.as_deref().filter(|t| !t.trim().is_empty()) {
                        Some(ocr) => format!("{}\n\n{}", reply.message, ocr),
                        None => reply.message.clone(),
                    };
                    state.log.append(Turn::assistant(Persona::Ingest, text));
                }
                Err(e) => {
                    state
                        .log
                        .append(Turn::error(format!("Preview failed: {}", e.reason())));
                }
            }
        } else {
            debug!(epoch, "Dropping stale preview");
        }
        state.settle(Control::Upload);
        Ok(result?)
    }
}

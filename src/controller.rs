//! PersonaController: owns the session and routes every user action.
//!
//! All mutation happens under one lock that is never held across a remote
//! call. A call records the session epoch when it starts; persona switches
//! and token changes bump the epoch, and a result that comes back under a
//! different epoch is dropped instead of applied.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::WidgetConfig;
use crate::error::{Error, InputError, ServiceError};
use crate::forms::{DynamicForm, FileRef, FormRegistry, FormSlot, FormSubmission, NextForm};
use crate::gateway::{ChatAction, RequestGateway, Settings};
use crate::session::{Persona, PersonaState, Session};
use crate::storage::{self, DurableStore, TokenStore};
use crate::surface::{Control, Surface};
use crate::transcript::{MessageLog, Turn};
use crate::upload::{self, UploadPipeline};

const HOST_PROMPT_TEXT: &str = "Would you like to connect your RealNex account so Goose can \
     import contacts for you? (yes / no)";
const HOST_PROMPT_DECLINED_TEXT: &str =
    "No problem. You can switch to Goose whenever you want to import contacts.";
const FILES_NEED_INGEST_TEXT: &str =
    "File uploads are handled by Goose. Switch to Goose to scan cards or import spreadsheets.";
const TOKEN_REQUIRED_TEXT: &str = "Please enter your access token before uploading files.";

/// User actions the host forwards to the widget.
#[async_trait]
pub trait Dispatch: Send + Sync {
    /// Send button or Enter in the text input.
    async fn on_send_message(&self, text: &str);

    /// File dropped or picked; `None` when the picker closed without a file.
    async fn on_file_selected(&self, file: Option<FileRef>);

    /// A dynamic form was submitted.
    async fn on_form_submit(&self, submission: FormSubmission);

    /// Explicit persona switch.
    async fn on_persona_toggle(&self, persona: Persona);
}

/// Mutable widget state, guarded by `Shared::state`.
pub(crate) struct WidgetState {
    pub session: Session,
    pub log: MessageLog,
    pub form: FormSlot,
    pub surface: Arc<dyn Surface>,
    mounted: bool,
}

impl WidgetState {
    /// Claim `control` for a call. Returns the epoch the call belongs to.
    pub fn begin(&mut self, control: Control) -> Result<u64, InputError> {
        let flag = match control {
            Control::Send => &mut self.session.sending,
            Control::Upload => &mut self.session.uploading,
        };
        if *flag {
            debug!(control = %control, "Control busy, ignoring action");
            return Err(InputError::Busy);
        }
        *flag = true;
        self.surface.set_control_enabled(control, false);
        Ok(self.session.epoch)
    }

    /// Release `control` after its call settled, whatever the outcome.
    pub fn settle(&mut self, control: Control) {
        match control {
            Control::Send => self.session.sending = false,
            Control::Upload => self.session.uploading = false,
        }
        self.surface.set_control_enabled(control, true);
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.session.epoch == epoch
    }

    /// Show `err` inline. `Busy` stays silent; its control is already disabled.
    pub fn notice(&self, err: &InputError) {
        if *err == InputError::Busy {
            return;
        }
        self.surface.show_notice(&err.to_string());
    }

    /// Render the welcome turn and resting form of the current state.
    fn enter_current(&mut self) {
        let persona = self.session.persona;
        self.log.append(Turn::assistant(persona, persona.welcome_text()));
        self.form
            .show(FormRegistry::resting_form(persona, self.session.has_token()));
    }
}

/// Everything the controller and the upload pipeline share.
pub(crate) struct Shared {
    pub state: Mutex<WidgetState>,
    pub gateway: Arc<dyn RequestGateway>,
    pub store: Arc<dyn DurableStore>,
    pub tokens: TokenStore,
    pub config: WidgetConfig,
}

impl Shared {
    fn schedule_host_prompt(self: &Arc<Self>) {
        let shared = Arc::clone(self);
        let delay = self.config.host_prompt_delay;
        debug!(delay_ms = delay.as_millis() as u64, "Host-integration prompt scheduled");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shared.show_host_prompt().await;
        });
    }

    async fn show_host_prompt(&self) {
        let mut state = self.state.lock().await;
        let session = &state.session;
        if !session.host_prompt_due()
            || session.host_prompt_pending
            || session.persona != Persona::Qa
        {
            debug!("Host-integration prompt no longer due");
            return;
        }
        state.session.host_prompt_pending = true;
        state.log.append(Turn::assistant(Persona::Qa, HOST_PROMPT_TEXT));
        info!("Host-integration prompt shown");
    }

    fn switch_persona(self: &Arc<Self>, state: &mut WidgetState, target: Persona) {
        if state.session.persona == target {
            return;
        }
        let from = state.session.state();
        state.session.persona = target;
        state.session.pending_file = None;
        state.session.host_prompt_pending = false;
        let epoch = state.session.bump_epoch();
        let to = state.session.state();
        if !from.can_transition_to(to) {
            warn!(from = %from, to = %to, "Unexpected persona transition");
        }
        info!(from = %from, to = %to, epoch, "Persona switched");

        state.enter_current();
        if target == Persona::Qa && state.session.host_prompt_due() {
            self.schedule_host_prompt();
        }
    }

    async fn answer_host_prompt(self: &Arc<Self>, state: &mut WidgetState, accept: bool) {
        if !state.session.host_prompt_pending {
            debug!("No host-integration prompt is open");
            return;
        }
        state.session.host_prompt_pending = false;
        state.session.has_prompted_for_host_integration = true;
        if !accept {
            state.session.declined_host_integration = true;
        }
        if let Err(e) = storage::persist_host_flags(self.store.as_ref(), &state.session).await {
            warn!("Failed to persist host-integration flags: {}", e);
        }
        info!(accepted = accept, "Host-integration prompt answered");

        state.log.append(Turn::user(if accept { "Yes" } else { "No" }));
        if accept {
            self.switch_persona(state, Persona::Ingest);
        } else {
            state
                .log
                .append(Turn::assistant(Persona::Qa, HOST_PROMPT_DECLINED_TEXT));
        }
    }

    pub(crate) fn token_copy(state: &WidgetState) -> Option<SecretString> {
        state
            .session
            .token
            .as_ref()
            .map(|t| SecretString::from(t.expose_secret().to_string()))
    }
}

/// Read-only view of the widget, for hosts and tests.
#[derive(Debug, Clone)]
pub struct WidgetSnapshot {
    pub persona: Persona,
    pub state: PersonaState,
    pub has_token: bool,
    pub sending: bool,
    pub uploading: bool,
    pub host_prompt_pending: bool,
    pub has_prompted_for_host_integration: bool,
    pub declined_host_integration: bool,
    pub pending_file: Option<String>,
    pub live_form: DynamicForm,
    pub turns: Vec<Turn>,
    pub epoch: u64,
}

/// The persona/session state machine behind one widget instance.
#[derive(Clone)]
pub struct PersonaController {
    shared: Arc<Shared>,
    uploads: UploadPipeline,
}

impl PersonaController {
    /// Build a controller, restoring the token and host flags from `store`.
    ///
    /// Unreadable storage starts a fresh session instead of failing.
    pub async fn new(
        config: WidgetConfig,
        gateway: Arc<dyn RequestGateway>,
        store: Arc<dyn DurableStore>,
        surface: Arc<dyn Surface>,
    ) -> Self {
        let tokens = TokenStore::new(Arc::clone(&store));
        let session = match tokens.restore_session().await {
            Ok(session) => session,
            Err(e) => {
                warn!("Failed to restore session, starting fresh: {}", e);
                Session::default()
            }
        };
        info!(
            has_token = session.has_token(),
            prompted = session.has_prompted_for_host_integration,
            declined = session.declined_host_integration,
            "Session restored"
        );

        let state = WidgetState {
            session,
            log: MessageLog::new(Arc::clone(&surface)),
            form: FormSlot::new(Arc::clone(&surface)),
            surface,
            mounted: false,
        };
        let shared = Arc::new(Shared {
            state: Mutex::new(state),
            gateway,
            tokens,
            store,
            config,
        });
        let uploads = UploadPipeline::new(Arc::clone(&shared));
        Self { shared, uploads }
    }

    /// First render: welcome turn, resting form, and the delayed host prompt.
    pub async fn mount(&self) {
        let mut state = self.shared.state.lock().await;
        if state.mounted {
            return;
        }
        state.mounted = true;
        state.enter_current();
        if state.session.host_prompt_due() {
            self.shared.schedule_host_prompt();
        }
    }

    /// Resolve the open host-integration prompt.
    pub async fn answer_host_prompt(&self, accept: bool) {
        let mut state = self.shared.state.lock().await;
        self.shared.answer_host_prompt(&mut state, accept).await;
    }

    /// Forget the token; `IngestReady` falls back to `IngestNoToken`.
    pub async fn clear_token(&self) {
        let mut state = self.shared.state.lock().await;
        let from = state.session.state();
        if let Err(e) = self.shared.tokens.clear(&mut state.session).await {
            warn!("Failed to remove persisted token: {}", e);
        }
        state.session.pending_file = None;
        info!(from = %from, to = %state.session.state(), "Token cleared");

        state.log.append(Turn::system("Access token cleared."));
        if state.session.persona == Persona::Ingest {
            state.form.show(DynamicForm::TokenEntry);
        }
    }

    pub async fn snapshot(&self) -> WidgetSnapshot {
        let state = self.shared.state.lock().await;
        let session = &state.session;
        WidgetSnapshot {
            persona: session.persona,
            state: session.state(),
            has_token: session.has_token(),
            sending: session.sending,
            uploading: session.uploading,
            host_prompt_pending: session.host_prompt_pending,
            has_prompted_for_host_integration: session.has_prompted_for_host_integration,
            declined_host_integration: session.declined_host_integration,
            pending_file: session.pending_file.as_ref().map(|f| f.name.clone()),
            live_form: state.form.live().clone(),
            turns: state.log.turns().to_vec(),
            epoch: session.epoch,
        }
    }

    /// Fetch the account settings with the stored token.
    pub async fn load_settings(&self) -> crate::error::Result<Settings> {
        let token = {
            let state = self.shared.state.lock().await;
            Shared::token_copy(&state).ok_or(InputError::MissingToken)?
        };
        Ok(self.shared.gateway.settings_data(&token).await?)
    }

    /// Save account settings with the stored token.
    pub async fn save_settings(&self, settings: &Settings) -> crate::error::Result<String> {
        let token = {
            let state = self.shared.state.lock().await;
            Shared::token_copy(&state).ok_or(InputError::MissingToken)?
        };
        Ok(self.shared.gateway.save_settings(&token, settings).await?)
    }

    async fn send_chat(&self, epoch: u64, persona: Persona, text: &str) {
        debug!(persona = %persona, epoch, "Chat request issued");
        let result = self.shared.gateway.chat(text, persona).await;

        let mut state = self.shared.state.lock().await;
        if state.is_current(epoch) {
            match result {
                Ok(reply) => {
                    state.log.append(Turn::assistant(persona, reply.response));
                    if reply.action == Some(ChatAction::ShowDashboard) {
                        info!("Chat reply requested the dashboard");
                        state.surface.open_dashboard(&self.shared.config.dashboard_url);
                    }
                }
                Err(e) => {
                    state.log.append(Turn::error(chat_failure_text(&e)));
                }
            }
        } else {
            debug!(epoch, current = state.session.epoch, "Dropping stale chat reply");
        }
        state.settle(Control::Send);
        state.surface.clear_input();
    }

    /// Report an input-level failure from the pipeline; service failures are already turns.
    async fn report(&self, result: crate::error::Result<()>) {
        match result {
            Ok(()) | Err(Error::Service(_)) => {}
            Err(Error::Input(e)) => self.shared.state.lock().await.notice(&e),
            Err(e) => warn!("Unexpected widget error: {}", e),
        }
    }
}

#[async_trait]
impl Dispatch for PersonaController {
    async fn on_send_message(&self, text: &str) {
        let text = text.trim();
        let mut state = self.shared.state.lock().await;
        if text.is_empty() {
            state.notice(&InputError::EmptyMessage);
            return;
        }
        if state.session.sending {
            debug!("Send ignored while a message is in flight");
            return;
        }
        if state.session.host_prompt_pending && state.session.persona == Persona::Qa {
            if let Some(accept) = parse_yes_no(text) {
                state.surface.clear_input();
                self.shared.answer_host_prompt(&mut state, accept).await;
                return;
            }
        }

        // Text typed while a token is expected is a token candidate, never a chat message.
        if state.session.state().expects_token() {
            let claim = match upload::claim_token(&mut state, text) {
                Ok(claim) => claim,
                Err(e) => return state.notice(&e),
            };
            drop(state);
            let result = self.uploads.run_token(claim).await;
            self.report(result).await;
            return;
        }

        let Ok(epoch) = state.begin(Control::Send) else {
            return;
        };
        state.log.append(Turn::user(text));
        let persona = state.session.persona;
        drop(state);
        self.send_chat(epoch, persona, text).await;
    }

    async fn on_file_selected(&self, file: Option<FileRef>) {
        let mut state = self.shared.state.lock().await;
        let Some(file) = file else {
            state.notice(&InputError::NoFile);
            return;
        };
        let persona = state.session.persona;
        if !persona.accepts_files() {
            info!(file = %file.name, "File ignored outside the ingest persona");
            state.log.append(Turn::system(FILES_NEED_INGEST_TEXT));
            return;
        }
        if !state.session.has_token() {
            state.log.append(Turn::system(TOKEN_REQUIRED_TEXT));
            state.form.show(DynamicForm::TokenEntry);
            return;
        }
        if state.session.uploading {
            debug!(file = %file.name, "File ignored while an upload is in flight");
            return;
        }

        match FormRegistry::next_form(persona, true, Some(&file)) {
            NextForm::Unsupported => {
                if let Err(e) = file.ensure_supported() {
                    state.notice(&e);
                }
            }
            NextForm::Show(form) => {
                info!(file = %file.name, kind = ?file.kind, "File staged");
                state.session.pending_file = Some(file);
                state.form.show(form);
            }
            NextForm::AwaitMappingSuggestion => {
                let claim = match upload::claim_mapping(&mut state, &file) {
                    Ok(claim) => claim,
                    Err(e) => return state.notice(&e),
                };
                drop(state);
                let result = self.uploads.suggest_mapping(claim, file).await.map(|_| ());
                self.report(result).await;
            }
        }
    }

    async fn on_form_submit(&self, submission: FormSubmission) {
        let result = match submission {
            FormSubmission::Token(candidate) => self.uploads.validate_token(&candidate).await,
            FormSubmission::Notes { notes } => {
                self.uploads.scan_and_import(&notes).await.map(|_| ())
            }
            FormSubmission::Preview => self.uploads.preview().await.map(|_| ()),
            FormSubmission::Mapping(mapping) => {
                self.uploads.bulk_import(mapping).await.map(|_| ())
            }
            FormSubmission::Cancel => {
                let mut state = self.shared.state.lock().await;
                if state.session.uploading {
                    Err(InputError::Busy.into())
                } else if state.session.pending_file.take().is_some() {
                    debug!("Pending file discarded");
                    let has_token = state.session.has_token();
                    let persona = state.session.persona;
                    state
                        .form
                        .show(FormRegistry::resting_form(persona, has_token));
                    Ok(())
                } else {
                    Err(InputError::NoPendingFile.into())
                }
            }
        };
        self.report(result).await;
    }

    async fn on_persona_toggle(&self, persona: Persona) {
        let mut state = self.shared.state.lock().await;
        self.shared.switch_persona(&mut state, persona);
    }
}

fn chat_failure_text(err: &ServiceError) -> String {
    match err {
        ServiceError::Rejected { reason, .. } => reason.clone(),
        ServiceError::Transport { reason, .. } => {
            format!("Sorry, I couldn't reach the assistant: {reason}")
        }
    }
}

/// Interpret a typed answer to the host-integration prompt.
fn parse_yes_no(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "sure" | "ok" => Some(true),
        "n" | "no" | "nope" | "no thanks" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yes_no_parsing() {
        assert_eq!(parse_yes_no("Yes"), Some(true));
        assert_eq!(parse_yes_no(" y "), Some(true));
        assert_eq!(parse_yes_no("NO"), Some(false));
        assert_eq!(parse_yes_no("no thanks"), Some(false));
        assert_eq!(parse_yes_no("what is RealNex?"), None);
    }

    #[test]
    fn chat_failure_keeps_service_reason() {
        let rejected = ServiceError::rejected("/chat", "quota exceeded");
        assert_eq!(chat_failure_text(&rejected), "quota exceeded");

        let transport = ServiceError::transport("/chat", "connection refused");
        assert!(chat_failure_text(&transport).contains("connection refused"));
    }
}

//! Integration tests for the widget against a mock remote service.
//!
//! Each test spins up an Axum server on a random port that speaks the
//! service's JSON and multipart contract, then drives a real
//! `PersonaController` wired to `HttpGateway`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::{Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use persona_widget::config::WidgetConfig;
use persona_widget::controller::{Dispatch, PersonaController};
use persona_widget::forms::{DynamicForm, FileRef, FormSubmission};
use persona_widget::gateway::{HttpGateway, RequestGateway, Settings};
use persona_widget::session::{Persona, PersonaState, storage_keys};
use persona_widget::storage::{DurableStore, FileStore, MemoryStore};
use persona_widget::surface::{RecordingSurface, SurfaceEvent};
use persona_widget::transcript::Speaker;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// The only token the mock service accepts.
const GOOD_TOKEN: &str = "abc";

/// One request the mock service received.
#[derive(Debug, Clone)]
struct Hit {
    path: &'static str,
    /// Multipart text fields, or the file name for file parts.
    fields: BTreeMap<String, String>,
}

#[derive(Clone, Default)]
struct MockService {
    hits: Arc<Mutex<Vec<Hit>>>,
}

impl MockService {
    fn record(&self, path: &'static str, fields: BTreeMap<String, String>) {
        self.hits.lock().unwrap().push(Hit { path, fields });
    }

    fn paths(&self) -> Vec<&'static str> {
        self.hits.lock().unwrap().iter().map(|h| h.path).collect()
    }

    fn last(&self, path: &str) -> Option<Hit> {
        self.hits
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|h| h.path == path)
            .cloned()
    }
}

async fn read_fields(mut multipart: Multipart) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let value = match file_name {
            Some(file_name) => file_name,
            None => field.text().await.unwrap(),
        };
        fields.insert(name, value);
    }
    fields
}

fn rejected(status: StatusCode, reason: &str) -> Response {
    (status, Json(json!({ "error": reason }))).into_response()
}

async fn chat(State(mock): State<MockService>, Json(body): Json<Value>) -> Response {
    let message = body["message"].as_str().unwrap_or_default().to_string();
    let persona = body["persona"].as_str().unwrap_or_default().to_string();
    mock.record(
        "/chat",
        BTreeMap::from([
            ("message".to_string(), message.clone()),
            ("persona".to_string(), persona.clone()),
        ]),
    );

    if message.contains("boom") {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response();
    }
    if message.contains("dashboard") {
        return Json(json!({ "response": "Opening your dashboard.", "action": "show_dashboard" }))
            .into_response();
    }
    // The alias spelling is still accepted by the widget.
    Json(json!({ "answer": format!("{persona} heard: {message}") })).into_response()
}

async fn validate_token(State(mock): State<MockService>, Json(body): Json<Value>) -> Response {
    let token = body["token"].as_str().unwrap_or_default().to_string();
    mock.record(
        "/validate-token",
        BTreeMap::from([("token".to_string(), token.clone())]),
    );
    if token == GOOD_TOKEN {
        Json(json!({ "valid": true })).into_response()
    } else {
        Json(json!({ "valid": false, "error": "bad token" })).into_response()
    }
}

async fn upload(State(mock): State<MockService>, multipart: Multipart) -> Response {
    mock.record("/upload", read_fields(multipart).await);
    Json(json!({ "message": "Scanned the card.", "ocrText": "Jane Doe\nAcme Realty" }))
        .into_response()
}

async fn suggest_mapping(State(mock): State<MockService>, multipart: Multipart) -> Response {
    let fields = read_fields(multipart).await;
    let empty = fields.get("file").is_some_and(|f| f.contains("empty"));
    mock.record("/suggest-mapping", fields);
    if empty {
        return rejected(StatusCode::BAD_REQUEST, "no header row found");
    }
    Json(json!({
        "suggestedMapping": { "Full Name": "name", "E-mail": "email", "Cell": "phone" }
    }))
    .into_response()
}

async fn bulk_import(State(mock): State<MockService>, multipart: Multipart) -> Response {
    let fields = read_fields(multipart).await;
    let authorized = fields.get("token").map(String::as_str) == Some(GOOD_TOKEN);
    mock.record("/bulk-import", fields);
    if !authorized {
        return rejected(StatusCode::UNAUTHORIZED, "invalid token");
    }
    Json(json!({ "processed": 42 })).into_response()
}

async fn upload_business_card(State(mock): State<MockService>, multipart: Multipart) -> Response {
    let fields = read_fields(multipart).await;
    let authorized = fields.get("token").map(String::as_str) == Some(GOOD_TOKEN);
    mock.record("/upload-business-card", fields);
    if !authorized {
        return rejected(StatusCode::UNAUTHORIZED, "invalid token");
    }
    Json(json!({ "followUpEmail": "Hi Jane, it was great meeting you at the expo." }))
        .into_response()
}

fn bearer_ok(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {GOOD_TOKEN}"))
}

async fn settings_data(State(mock): State<MockService>, headers: HeaderMap) -> Response {
    mock.record("/settings-data", BTreeMap::new());
    if !bearer_ok(&headers) {
        return rejected(StatusCode::UNAUTHORIZED, "missing bearer token");
    }
    Json(json!({ "email_signature": "Jane @ Acme", "follow_up_days": 3 })).into_response()
}

async fn save_settings(
    State(mock): State<MockService>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let fields: BTreeMap<String, String> = body
        .as_object()
        .map(|o| o.iter().map(|(k, v)| (k.clone(), v.to_string())).collect())
        .unwrap_or_default();
    mock.record("/save-settings", fields);
    if !bearer_ok(&headers) {
        return rejected(StatusCode::UNAUTHORIZED, "missing bearer token");
    }
    Json(json!({ "status": "Settings saved" })).into_response()
}

/// Start the mock service on a random port, return (base_url, mock).
async fn start_server() -> (String, MockService) {
    let mock = MockService::default();
    let app = Router::new()
        .route("/chat", post(chat))
        .route("/validate-token", post(validate_token))
        .route("/upload", post(upload))
        .route("/suggest-mapping", post(suggest_mapping))
        .route("/bulk-import", post(bulk_import))
        .route("/upload-business-card", post(upload_business_card))
        .route("/settings-data", get(settings_data))
        .route("/save-settings", post(save_settings))
        .with_state(mock.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("http://127.0.0.1:{port}"), mock)
}

/// Build and mount a widget on `store`, with the host prompt already answered.
async fn mount_widget(
    base_url: &str,
    store: Arc<dyn DurableStore>,
) -> (PersonaController, Arc<RecordingSurface>) {
    store
        .set(storage_keys::HOST_PROMPTED, Value::Bool(true))
        .await
        .unwrap();
    let surface = Arc::new(RecordingSurface::new());
    let config = WidgetConfig {
        base_url: base_url.to_string(),
        dashboard_url: format!("{base_url}/static/dashboard/index.html"),
        ..WidgetConfig::default()
    };
    let controller = PersonaController::new(
        config,
        Arc::new(HttpGateway::new(base_url)),
        store,
        surface.clone(),
    )
    .await;
    controller.mount().await;
    (controller, surface)
}

async fn widget(base_url: &str) -> (PersonaController, Arc<RecordingSurface>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let (controller, surface) = mount_widget(base_url, store.clone()).await;
    (controller, surface, store)
}

/// A widget in `IngestReady` with the good token.
async fn ready_widget(base_url: &str) -> (PersonaController, Arc<RecordingSurface>) {
    let (controller, surface, _store) = widget(base_url).await;
    controller.on_persona_toggle(Persona::Ingest).await;
    controller.on_send_message(GOOD_TOKEN).await;
    assert_eq!(controller.snapshot().await.state, PersonaState::IngestReady);
    (controller, surface)
}

fn file(name: &str) -> FileRef {
    FileRef::new(name, None, b"test payload".to_vec())
}

async fn last_text(controller: &PersonaController) -> String {
    controller
        .snapshot()
        .await
        .turns
        .last()
        .map(|t| t.text.clone())
        .unwrap_or_default()
}

// ── Chat ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn chat_reaches_service_with_persona() {
    timeout(TEST_TIMEOUT, async {
        let (base_url, mock) = start_server().await;
        let (controller, _surface, _store) = widget(&base_url).await;

        controller.on_send_message("How do webinars work?").await;

        let hit = mock.last("/chat").expect("chat was not called");
        assert_eq!(hit.fields["message"], "How do webinars work?");
        assert_eq!(hit.fields["persona"], "maverick");

        let snap = controller.snapshot().await;
        let reply = snap.turns.last().unwrap();
        assert_eq!(reply.speaker, Speaker::Assistant(Persona::Qa));
        assert_eq!(reply.text, "maverick heard: How do webinars work?");
        assert!(reply.rendered_as_html);
        assert!(!snap.sending);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn whitespace_message_never_reaches_service() {
    timeout(TEST_TIMEOUT, async {
        let (base_url, mock) = start_server().await;
        let (controller, surface, _store) = widget(&base_url).await;
        let turns_before = controller.snapshot().await.turns.len();

        controller.on_send_message("    ").await;

        assert!(mock.paths().is_empty());
        assert_eq!(controller.snapshot().await.turns.len(), turns_before);
        assert_eq!(surface.notices().len(), 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn server_error_becomes_error_turn() {
    timeout(TEST_TIMEOUT, async {
        let (base_url, _mock) = start_server().await;
        let (controller, _surface, _store) = widget(&base_url).await;

        controller.on_send_message("boom").await;

        let snap = controller.snapshot().await;
        let last = snap.turns.last().unwrap();
        assert!(last.is_error);
        assert!(!last.rendered_as_html);
        assert!(!snap.sending);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn dashboard_action_opens_dashboard() {
    timeout(TEST_TIMEOUT, async {
        let (base_url, _mock) = start_server().await;
        let (controller, surface, _store) = widget(&base_url).await;

        controller.on_send_message("open my dashboard").await;

        let expected = format!("{base_url}/static/dashboard/index.html");
        assert!(surface.events().contains(&SurfaceEvent::Dashboard(expected)));
        assert_eq!(last_text(&controller).await, "Opening your dashboard.");
    })
    .await
    .expect("test timed out");
}

// ── Token ────────────────────────────────────────────────────────────

#[tokio::test]
async fn token_rejected_then_accepted() {
    timeout(TEST_TIMEOUT, async {
        let (base_url, mock) = start_server().await;
        let (controller, _surface, store) = widget(&base_url).await;
        controller.on_persona_toggle(Persona::Ingest).await;

        controller.on_send_message("wrong").await;

        assert_eq!(mock.paths(), vec!["/validate-token"]);
        assert!(last_text(&controller).await.contains("bad token"));
        assert!(store.get(storage_keys::TOKEN).await.unwrap().is_none());
        assert_eq!(
            controller.snapshot().await.state,
            PersonaState::IngestNoToken
        );

        controller
            .on_form_submit(FormSubmission::Token(GOOD_TOKEN.into()))
            .await;

        assert_eq!(
            store.get(storage_keys::TOKEN).await.unwrap(),
            Some(Value::String(GOOD_TOKEN.into()))
        );
        let snap = controller.snapshot().await;
        assert_eq!(snap.state, PersonaState::IngestReady);
        assert_eq!(snap.live_form, DynamicForm::FileDrop);
        assert!(mock.paths().iter().all(|p| *p != "/chat"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn token_survives_restart_with_file_store() {
    timeout(TEST_TIMEOUT, async {
        let (base_url, _mock) = start_server().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        {
            let store = Arc::new(FileStore::open(path.clone()).await.unwrap());
            let (controller, _surface) = mount_widget(&base_url, store).await;
            controller.on_persona_toggle(Persona::Ingest).await;
            controller.on_send_message(GOOD_TOKEN).await;
            assert!(controller.snapshot().await.has_token);
        }

        let store = Arc::new(FileStore::open(path).await.unwrap());
        let (controller, _surface) = mount_widget(&base_url, store).await;
        controller.on_persona_toggle(Persona::Ingest).await;

        let snap = controller.snapshot().await;
        assert_eq!(snap.state, PersonaState::IngestReady);
        assert_eq!(snap.live_form, DynamicForm::FileDrop);
    })
    .await
    .expect("test timed out");
}

// ── Files ────────────────────────────────────────────────────────────

#[tokio::test]
async fn file_in_qa_persona_makes_no_request() {
    timeout(TEST_TIMEOUT, async {
        let (base_url, mock) = start_server().await;
        let (controller, _surface, _store) = widget(&base_url).await;

        controller.on_file_selected(Some(file("card.png"))).await;
        controller.on_file_selected(Some(file("contacts.xlsx"))).await;

        assert!(mock.paths().is_empty());
        let snap = controller.snapshot().await;
        assert_eq!(snap.turns.last().unwrap().speaker, Speaker::System);
        assert!(snap.pending_file.is_none());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn spreadsheet_is_mapped_then_imported() {
    timeout(TEST_TIMEOUT, async {
        let (base_url, mock) = start_server().await;
        let (controller, _surface) = ready_widget(&base_url).await;

        controller.on_file_selected(Some(file("leads.xlsx"))).await;

        assert_eq!(mock.paths().last(), Some(&"/suggest-mapping"));
        assert_eq!(mock.last("/suggest-mapping").unwrap().fields["file"], "leads.xlsx");
        let suggested = match controller.snapshot().await.live_form {
            DynamicForm::SpreadsheetMapping { suggested, .. } => suggested,
            other => panic!("expected mapping form, got {other:?}"),
        };
        assert_eq!(suggested["Cell"], "phone");

        let mut edited = suggested.clone();
        edited.remove("Cell");
        controller
            .on_form_submit(FormSubmission::Mapping(edited))
            .await;

        let hit = mock.last("/bulk-import").expect("bulk import was not called");
        assert_eq!(hit.fields["token"], GOOD_TOKEN);
        assert_eq!(hit.fields["file"], "leads.xlsx");
        let sent: BTreeMap<String, String> = serde_json::from_str(&hit.fields["mapping"]).unwrap();
        assert_eq!(sent.len(), 2);
        assert!(!sent.contains_key("Cell"));

        assert!(last_text(&controller).await.contains("42"));
        let snap = controller.snapshot().await;
        assert_eq!(snap.live_form, DynamicForm::FileDrop);
        assert!(snap.pending_file.is_none());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unreadable_spreadsheet_returns_to_file_drop() {
    timeout(TEST_TIMEOUT, async {
        let (base_url, mock) = start_server().await;
        let (controller, _surface) = ready_widget(&base_url).await;

        controller.on_file_selected(Some(file("empty.csv"))).await;

        assert!(last_text(&controller).await.contains("no header row found"));
        let snap = controller.snapshot().await;
        assert_eq!(snap.live_form, DynamicForm::FileDrop);
        assert!(snap.pending_file.is_none());
        assert!(mock.last("/bulk-import").is_none());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn business_card_is_scanned_with_notes() {
    timeout(TEST_TIMEOUT, async {
        let (base_url, mock) = start_server().await;
        let (controller, _surface) = ready_widget(&base_url).await;

        for name in ["card.png", "card.pdf"] {
            controller.on_file_selected(Some(file(name))).await;
            assert_eq!(
                controller.snapshot().await.live_form,
                DynamicForm::NotesAndFileConfirm {
                    file_name: name.to_string()
                }
            );
        }
        assert!(mock.last("/suggest-mapping").is_none());

        controller
            .on_form_submit(FormSubmission::Notes {
                notes: "Met at the spring expo".into(),
            })
            .await;

        let hit = mock
            .last("/upload-business-card")
            .expect("scan was not called");
        assert_eq!(hit.fields["file"], "card.pdf");
        assert_eq!(hit.fields["notes"], "Met at the spring expo");
        assert_eq!(hit.fields["token"], GOOD_TOKEN);

        let snap = controller.snapshot().await;
        let last = snap.turns.last().unwrap();
        assert_eq!(last.speaker, Speaker::Assistant(Persona::Ingest));
        assert!(last.text.contains("great meeting you at the expo"));
        assert_eq!(snap.live_form, DynamicForm::FileDrop);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn preview_shows_ocr_text() {
    timeout(TEST_TIMEOUT, async {
        let (base_url, mock) = start_server().await;
        let (controller, _surface) = ready_widget(&base_url).await;
        controller.on_file_selected(Some(file("card.jpg"))).await;

        controller.on_form_submit(FormSubmission::Preview).await;

        assert_eq!(mock.last("/upload").unwrap().fields["file"], "card.jpg");
        assert!(last_text(&controller).await.contains("Acme Realty"));
        let snap = controller.snapshot().await;
        assert!(matches!(
            snap.live_form,
            DynamicForm::NotesAndFileConfirm { .. }
        ));
        assert_eq!(snap.pending_file.as_deref(), Some("card.jpg"));
    })
    .await
    .expect("test timed out");
}

// ── Settings ─────────────────────────────────────────────────────────

#[tokio::test]
async fn settings_round_trip_with_bearer_token() {
    timeout(TEST_TIMEOUT, async {
        let (base_url, mock) = start_server().await;
        let (controller, _surface) = ready_widget(&base_url).await;

        let settings = controller.load_settings().await.unwrap();
        assert_eq!(settings["email_signature"], "Jane @ Acme");

        let mut update = Settings::new();
        update.insert("follow_up_days".into(), json!(5));
        let status = controller.save_settings(&update).await.unwrap();

        assert_eq!(status, "Settings saved");
        assert_eq!(mock.last("/save-settings").unwrap().fields["follow_up_days"], "5");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn gateway_reports_rejection_reason() {
    timeout(TEST_TIMEOUT, async {
        let (base_url, _mock) = start_server().await;
        let gateway = HttpGateway::new(&base_url);

        let err = gateway
            .settings_data(&SecretString::from("nope".to_string()))
            .await
            .unwrap_err();

        assert_eq!(err.reason(), "missing bearer token");
    })
    .await
    .expect("test timed out");
}

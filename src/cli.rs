//! Terminal host: stdin/stdout REPL driving the widget.

use std::path::Path;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::controller::{Dispatch, PersonaController};
use crate::forms::{ColumnMapping, DynamicForm, FileRef, FormSubmission};
use crate::gateway::Settings;
use crate::session::Persona;
use crate::surface::{Control, Surface};
use crate::transcript::{Speaker, Turn};

const HELP: &str = "\
Commands:
  <text>                  send a message (or your token, when Goose asks for it)
  /maverick, /goose       switch persona
  /token <value>          submit an access token
  /file <path>            upload a file (Goose only)
  /scan [notes]           import the staged business card
  /preview                OCR preview of the staged card
  /map [col=field,...]    confirm the column mapping, with optional edits
  /cancel                 drop the staged file
  /yes, /no               answer the RealNex connection question
  /logout                 forget the access token
  /settings               show account settings
  /set key=value          save one account setting
  /quit                   exit";

/// Renders the widget as plain terminal output.
///
/// Turns go to stdout; form hints and notices go to stderr.
pub struct TerminalSurface;

impl TerminalSurface {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TerminalSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl Surface for TerminalSurface {
    fn render_turn(&self, turn: &Turn) {
        let label = match turn.speaker {
            Speaker::Assistant(persona) => format!("{} {}", persona.icon(), persona.name()),
            Speaker::System if turn.is_error => "⚠️  Error".to_string(),
            other => other.to_string(),
        };
        println!("\n{label}: {}", turn.text);
    }

    fn scroll_to_latest(&self) {}

    fn render_form(&self, form: &DynamicForm) {
        match form {
            DynamicForm::TextPrompt => eprintln!("(type a message)"),
            DynamicForm::TokenEntry => eprintln!("(enter your access token)"),
            DynamicForm::FileDrop => eprintln!("(/file <path> to upload a card or spreadsheet)"),
            DynamicForm::NotesAndFileConfirm { file_name } => {
                eprintln!("(staged {file_name}: /scan [notes] to import, /preview, /cancel)")
            }
            DynamicForm::SpreadsheetMapping {
                file_name,
                suggested,
            } => {
                eprintln!("Suggested mapping for {file_name}:");
                for (column, field) in suggested {
                    eprintln!("  {column} → {field}");
                }
                eprintln!("(/map to import, /map col=field,... to edit first, /cancel)");
            }
        }
    }

    fn show_notice(&self, text: &str) {
        eprintln!("ℹ️  {text}");
    }

    fn set_control_enabled(&self, control: Control, enabled: bool) {
        if !enabled {
            eprintln!("⏳ working ({control})...");
        }
    }

    fn clear_input(&self) {}

    fn open_dashboard(&self, url: &str) {
        eprintln!("📊 Dashboard: {url}");
    }
}

/// A parsed REPL line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Message(String),
    Switch(Persona),
    Token(String),
    File(Option<String>),
    Scan(String),
    Preview,
    Map(ColumnMapping),
    Cancel,
    Answer(bool),
    Logout,
    ShowSettings,
    SaveSetting(String, String),
    Help,
    Quit,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Command {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return Command::Message(line.to_string());
        };
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        match name {
            "maverick" | "qa" => Command::Switch(Persona::Qa),
            "goose" | "ingest" => Command::Switch(Persona::Ingest),
            "token" => Command::Token(arg.to_string()),
            "file" => Command::File((!arg.is_empty()).then(|| arg.to_string())),
            "scan" => Command::Scan(arg.to_string()),
            "preview" => Command::Preview,
            "map" => Command::Map(parse_mapping_edits(arg)),
            "cancel" => Command::Cancel,
            "yes" => Command::Answer(true),
            "no" => Command::Answer(false),
            "logout" => Command::Logout,
            "settings" => Command::ShowSettings,
            "set" => match arg.split_once('=') {
                Some((k, v)) if !k.trim().is_empty() => {
                    Command::SaveSetting(k.trim().to_string(), v.trim().to_string())
                }
                _ => Command::Unknown(line.to_string()),
            },
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            _ => Command::Unknown(line.to_string()),
        }
    }
}

/// Parse `col=field,col2=field2` edits; malformed pairs are skipped.
pub fn parse_mapping_edits(raw: &str) -> ColumnMapping {
    raw.split(',')
        .filter_map(|pair| {
            let (column, field) = pair.split_once('=')?;
            let (column, field) = (column.trim(), field.trim());
            (!column.is_empty()).then(|| (column.to_string(), field.to_string()))
        })
        .collect()
}

/// Apply edits on top of the suggestion. An empty field removes the column.
pub fn merge_mapping(suggested: &ColumnMapping, edits: ColumnMapping) -> ColumnMapping {
    let mut merged = suggested.clone();
    for (column, field) in edits {
        if field.is_empty() {
            merged.remove(&column);
        } else {
            merged.insert(column, field);
        }
    }
    merged
}

/// Run one command against the controller. Returns false when the REPL should stop.
pub async fn execute(controller: &PersonaController, command: Command) -> bool {
    match command {
        Command::Message(text) => controller.on_send_message(&text).await,
        Command::Switch(persona) => controller.on_persona_toggle(persona).await,
        Command::Token(token) => {
            controller
                .on_form_submit(FormSubmission::Token(token))
                .await
        }
        Command::File(path) => {
            let file = match path {
                Some(path) => match FileRef::from_path(Path::new(&path)).await {
                    Ok(file) => Some(file),
                    Err(e) => {
                        eprintln!("ℹ️  Cannot read {path}: {e}");
                        return true;
                    }
                },
                None => None,
            };
            controller.on_file_selected(file).await;
        }
        Command::Scan(notes) => {
            controller
                .on_form_submit(FormSubmission::Notes { notes })
                .await
        }
        Command::Preview => controller.on_form_submit(FormSubmission::Preview).await,
        Command::Map(edits) => {
            let snapshot = controller.snapshot().await;
            let suggested = match snapshot.live_form {
                DynamicForm::SpreadsheetMapping { suggested, .. } => suggested,
                _ => ColumnMapping::new(),
            };
            let mapping = merge_mapping(&suggested, edits);
            controller
                .on_form_submit(FormSubmission::Mapping(mapping))
                .await;
        }
        Command::Cancel => controller.on_form_submit(FormSubmission::Cancel).await,
        Command::Answer(accept) => controller.answer_host_prompt(accept).await,
        Command::Logout => controller.clear_token().await,
        Command::ShowSettings => match controller.load_settings().await {
            Ok(settings) => print_settings(&settings),
            Err(e) => eprintln!("ℹ️  {e}"),
        },
        Command::SaveSetting(key, value) => {
            let mut settings = Settings::new();
            settings.insert(key, serde_json::Value::String(value));
            match controller.save_settings(&settings).await {
                Ok(status) => eprintln!("ℹ️  {status}"),
                Err(e) => eprintln!("ℹ️  {e}"),
            }
        }
        Command::Help => eprintln!("{HELP}"),
        Command::Quit => return false,
        Command::Unknown(line) => eprintln!("ℹ️  Unknown command: {line} (try /help)"),
    }
    true
}

fn print_settings(settings: &Settings) {
    if settings.is_empty() {
        println!("(no settings saved)");
        return;
    }
    for (key, value) in settings {
        match value {
            serde_json::Value::String(s) => println!("{key} = {s}"),
            other => println!("{key} = {other}"),
        }
    }
}

/// Read commands from stdin until EOF or `/quit`.
///
/// Each command runs on its own task so a slow call does not block
/// persona switches or other input.
pub async fn run_repl(controller: PersonaController) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    eprintln!("{HELP}\n");

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let command = Command::parse(&line);
        if command == Command::Quit {
            break;
        }
        let controller = controller.clone();
        tokio::spawn(async move {
            execute(&controller, command).await;
        });
    }
    Ok(())
}

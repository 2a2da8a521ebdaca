//! HTTP JSON API for a running session
//!
//! `wildcrafter serve` → binds 127.0.0.1 and answers `/api/...` requests
//! against one in-memory [`Session`]. Every reply uses the same
//! `{ok, data, error}` envelope.

use crate::llm::{Completer, LlmError};
use crate::session::{Session, SessionError, SettingsUpdate};
use crate::tree::{Suggestion, TreeError};
use colored::Colorize;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tiny_http::{Header, Method, Request, Response, Server};
use tracing::{debug, warn};

#[derive(Serialize)]
struct ApiResponse<T> {
    ok: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn failure(message: String) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Status code plus serialized envelope
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub body: String,
}

impl Reply {
    fn ok(data: Value) -> Self {
        Self::json(200, &ApiResponse::success(data))
    }

    fn error(status: u16, message: String) -> Self {
        Self::json(status, &ApiResponse::failure(message))
    }

    fn json<T: Serialize>(status: u16, response: &ApiResponse<T>) -> Self {
        match serde_json::to_string(response) {
            Ok(body) => Self { status, body },
            Err(e) => Self {
                status: 500,
                body: format!(r#"{{"ok":false,"data":null,"error":"{}"}}"#, e),
            },
        }
    }
}

/// Handler failure with the status it maps to
#[derive(Debug)]
struct ApiError {
    status: u16,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: 400,
            message: message.into(),
        }
    }
}

impl From<TreeError> for ApiError {
    fn from(e: TreeError) -> Self {
        let status = match e {
            TreeError::NotFound(_) => 404,
            _ => 400,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Tree(e) => e.into(),
            SessionError::Llm(LlmError::Config(message)) => Self::bad_request(message),
            SessionError::Llm(e) => Self {
                status: 502,
                message: e.to_string(),
            },
            SessionError::Codec(e) => Self {
                status: 500,
                message: e.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        Self {
            status: 500,
            message: e.to_string(),
        }
    }
}

type ApiResult = std::result::Result<Value, ApiError>;

#[derive(Deserialize, Default)]
struct SearchQuery {
    #[serde(default)]
    q: String,
}

#[derive(Deserialize)]
struct PathQuery {
    path: String,
}

#[derive(Deserialize)]
struct PathBody {
    path: String,
}

#[derive(Deserialize)]
struct WordsBody {
    path: String,
    words: Vec<String>,
}

#[derive(Deserialize)]
struct InstructionBody {
    path: String,
    instruction: String,
}

#[derive(Deserialize)]
struct AcceptBody {
    path: String,
    suggestions: Vec<Suggestion>,
}

#[derive(Deserialize)]
struct ImportBody {
    document: String,
}

fn parse_query<T: DeserializeOwned>(query: &str) -> std::result::Result<T, ApiError> {
    serde_urlencoded::from_str(query)
        .map_err(|e| ApiError::bad_request(format!("Invalid query: {}", e)))
}

fn parse_body<T: DeserializeOwned>(body: &str) -> std::result::Result<T, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::bad_request(format!("Invalid JSON: {}", e)))
}

/// Dispatch one request against the session
pub fn route(
    session: &mut Session,
    completer: &dyn Completer,
    method: &Method,
    path: &str,
    query: &str,
    body: &str,
) -> Reply {
    let result: ApiResult = match (method, path) {
        (&Method::Get, "/api/paths") => get_paths(session, query),
        (&Method::Get, "/api/category") => get_category(session, query),
        (&Method::Get, "/api/tree") => serde_json::to_value(&session.tree).map_err(ApiError::from),
        (&Method::Post, "/api/wildcards") => add_wildcards(session, body),
        (&Method::Post, "/api/wildcards/delete") => remove_wildcards(session, body),
        (&Method::Post, "/api/categories") => create_category(session, body),
        (&Method::Post, "/api/categories/delete") => delete_category(session, body),
        (&Method::Post, "/api/instruction") => set_instruction(session, body),
        (&Method::Post, "/api/generate") => generate(session, completer, body),
        (&Method::Post, "/api/suggest") => suggest(session, completer, body),
        (&Method::Post, "/api/suggestions/accept") => accept_suggestions(session, body),
        (&Method::Post, "/api/save") => save(session),
        (&Method::Post, "/api/export") => export(session),
        (&Method::Post, "/api/import") => import(session, body),
        (&Method::Get, "/api/settings") => {
            serde_json::to_value(session.settings_view()).map_err(ApiError::from)
        }
        (&Method::Post, "/api/settings") => update_settings(session, body),
        _ => return Reply::error(404, format!("No route for {} {}", method, path)),
    };

    match result {
        Ok(data) => Reply::ok(data),
        Err(e) => Reply::error(e.status, e.message),
    }
}

fn get_paths(session: &Session, query: &str) -> ApiResult {
    let search: SearchQuery = parse_query(query)?;
    let paths = if search.q.trim().is_empty() {
        session.tree.paths()
    } else {
        session.tree.search_paths(&search.q)
    };
    Ok(serde_json::to_value(paths)?)
}

fn get_category(session: &Session, query: &str) -> ApiResult {
    let PathQuery { path } = parse_query(query)?;
    let category = session
        .tree
        .get(&path)
        .ok_or_else(|| TreeError::NotFound(path.clone()))?;
    Ok(serde_json::to_value(category)?)
}

fn add_wildcards(session: &mut Session, body: &str) -> ApiResult {
    let req: WordsBody = parse_body(body)?;
    let added = session.tree.merge_wildcards(&req.path, &req.words)?;
    Ok(serde_json::to_value(added)?)
}

fn remove_wildcards(session: &mut Session, body: &str) -> ApiResult {
    let req: WordsBody = parse_body(body)?;
    let removed = session.tree.remove_wildcards(&req.path, &req.words)?;
    Ok(serde_json::to_value(removed)?)
}

fn create_category(session: &mut Session, body: &str) -> ApiResult {
    let PathBody { path } = parse_body(body)?;
    let created = session.tree.create_category(&path)?;
    Ok(serde_json::to_value(created)?)
}

fn delete_category(session: &mut Session, body: &str) -> ApiResult {
    let PathBody { path } = parse_body(body)?;
    let removed = session.tree.delete_category(&path)?;
    Ok(serde_json::to_value(removed)?)
}

fn set_instruction(session: &mut Session, body: &str) -> ApiResult {
    let req: InstructionBody = parse_body(body)?;
    session.tree.set_instruction(&req.path, &req.instruction)?;
    Ok(Value::Bool(true))
}

fn generate(session: &mut Session, completer: &dyn Completer, body: &str) -> ApiResult {
    let PathBody { path } = parse_body(body)?;
    let added = session.generate_more(completer, &path)?;
    Ok(serde_json::to_value(added)?)
}

fn suggest(session: &Session, completer: &dyn Completer, body: &str) -> ApiResult {
    let PathBody { path } = parse_body(body)?;
    let suggestions = session.suggest(completer, &path)?;
    Ok(serde_json::to_value(suggestions)?)
}

fn accept_suggestions(session: &mut Session, body: &str) -> ApiResult {
    let req: AcceptBody = parse_body(body)?;
    let added = session.accept_suggestions(&req.path, &req.suggestions)?;
    Ok(serde_json::to_value(added)?)
}

fn save(session: &Session) -> ApiResult {
    let path = session.save()?;
    Ok(Value::String(path.display().to_string()))
}

fn export(session: &Session) -> ApiResult {
    let path = session.export()?;
    Ok(Value::String(path.display().to_string()))
}

fn import(session: &mut Session, body: &str) -> ApiResult {
    let ImportBody { document } = parse_body(body)?;
    session
        .import(&document)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    Ok(serde_json::to_value(session.tree.paths())?)
}

fn update_settings(session: &mut Session, body: &str) -> ApiResult {
    let update: SettingsUpdate = parse_body(body)?;
    session.update_settings(update);
    Ok(serde_json::to_value(session.settings_view())?)
}

/// Bind the API on 127.0.0.1; port 0 picks a free one
pub fn bind(port: u16) -> std::io::Result<Server> {
    let addr = format!("127.0.0.1:{}", port);
    Server::http(&addr).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
}

/// Base URL of a bound server; falls back to the requested port
pub fn local_url(server: &Server, port: u16) -> String {
    let port = server.server_addr().to_ip().map_or(port, |addr| addr.port());
    format!("http://localhost:{}", port)
}

/// Start the API server and block
pub fn start_api_server(session: Session, completer: &dyn Completer, port: u16) -> std::io::Result<()> {
    let server = bind(port)?;

    eprintln!("\n{}", "Wildcrafter".bold().green());
    eprintln!("   API: {}/api", local_url(&server, port));
    eprintln!("   Data: {}", session.data_path.display());
    eprintln!("   Press Ctrl+C to stop\n");

    run(&server, session, completer);
    Ok(())
}

/// Answer requests until the server shuts down
pub fn run(server: &Server, mut session: Session, completer: &dyn Completer) {
    for request in server.incoming_requests() {
        if let Err(e) = handle_request(&mut session, completer, request) {
            warn!(error = %e, "failed to answer request");
        }
    }
}

fn handle_request(
    session: &mut Session,
    completer: &dyn Completer,
    mut request: Request,
) -> std::io::Result<()> {
    let url = request.url().to_string();
    let (path, query) = url.split_once('?').unwrap_or((url.as_str(), ""));
    let method = request.method().clone();
    debug!(%method, path, "request");

    let mut body = String::new();
    let reply = match request.as_reader().read_to_string(&mut body) {
        Ok(_) => route(session, completer, &method, path, query, &body),
        Err(e) => Reply::error(400, format!("Failed to read body: {}", e)),
    };

    let mut response = Response::from_string(reply.body).with_status_code(reply.status);
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        response.add_header(header);
    }
    request.respond(response)
}

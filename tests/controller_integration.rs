use axum::{
    Json, Router,
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    routing::post,
};
use docchat::AppState;
use docchat::bubble::{Bubble, Role};
use docchat::client::terminal;
use docchat::client::{
    Answer, ChatFormController, ChatSurface, ChatTransport, HttpTransport, MemorySurface, ReplyOrdering,
    SurfaceEvent, TerminalSurface, TurnOutcome,
};
use docchat::config::AppConfig;
use docchat::error::ClientError;
use docchat::llm::Answerer;
use docchat::server::build_router;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

type Reply = Result<Answer, ClientError>;

/// Transport whose replies are released one by one by the test.
#[derive(Default)]
struct ScriptedTransport {
    waiting: Mutex<HashMap<String, oneshot::Sender<Reply>>>,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    /// Resolve the in-flight request for `query`, waiting for it to be sent.
    async fn release(&self, query: &str, reply: Reply) {
        loop {
            let sender = self.waiting.lock().unwrap().remove(query);
            if let Some(tx) = sender {
                let _ = tx.send(reply);
                return;
            }
            tokio::task::yield_now().await;
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ChatTransport for ScriptedTransport {
    async fn ask(&self, query: &str) -> Reply {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.waiting.lock().unwrap().insert(query.to_string(), tx);
        rx.await.unwrap_or_else(|_| {
            Err(ClientError::Status {
                status: 499,
                body: "reply dropped".to_string(),
            })
        })
    }
}

/// Transport answering every query with the same payload.
struct FixedTransport(Value);

#[async_trait::async_trait]
impl ChatTransport for FixedTransport {
    async fn ask(&self, _query: &str) -> Reply {
        Ok(Answer::from_json(&self.0))
    }
}

/// Transport that panics on a chosen query and echoes every other one.
struct PanickingTransport {
    poison: &'static str,
}

#[async_trait::async_trait]
impl ChatTransport for PanickingTransport {
    async fn ask(&self, query: &str) -> Reply {
        if query == self.poison {
            panic!("transport exploded on {query}");
        }
        tokio::task::yield_now().await;
        Ok(Answer::new(format!("echo: {query}")))
    }
}

/// Transport echoing the query back.
struct EchoTransport;

#[async_trait::async_trait]
impl ChatTransport for EchoTransport {
    async fn ask(&self, query: &str) -> Reply {
        Ok(Answer::new(format!("echo: {query}")))
    }
}

struct EchoAnswerer;

#[async_trait::async_trait]
impl Answerer for EchoAnswerer {
    async fn answer(&self, query: &str) -> anyhow::Result<String> {
        Ok(format!("echo: {query}"))
    }
}

fn scripted(
    ordering: ReplyOrdering,
) -> (
    ChatFormController<MemorySurface, ScriptedTransport>,
    Arc<ScriptedTransport>,
) {
    let transport = Arc::new(ScriptedTransport::default());
    let controller =
        ChatFormController::bind_shared(MemorySurface::new(), Arc::clone(&transport), ordering)
            .expect("surface has a form");
    (controller, transport)
}

fn type_query<T: ChatTransport>(controller: &ChatFormController<MemorySurface, T>, text: &str) {
    controller.with_surface_mut(|surface| surface.set_query(text));
}

fn texts(controller: &ChatFormController<MemorySurface, impl ChatTransport>, role: Role) -> Vec<String> {
    controller.with_surface(|surface| {
        surface
            .bubbles_with_role(role)
            .into_iter()
            .map(|b| b.text.clone())
            .collect()
    })
}

async fn spawn_app(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_empty_query_does_nothing() {
    let (controller, transport) = scripted(ReplyOrdering::Arrival);

    assert!(controller.submit().is_none());
    tokio::task::yield_now().await;

    controller.with_surface(|surface| {
        assert!(surface.bubbles().is_empty());
        assert!(surface.events().is_empty());
    });
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_whitespace_query_is_submitted() {
    let (controller, _transport) = scripted(ReplyOrdering::Arrival);

    type_query(&controller, " ");
    assert!(controller.submit().is_some());
    assert_eq!(texts(&controller, Role::User), vec![" ".to_string()]);
}

#[tokio::test]
async fn test_user_bubble_renders_before_response() {
    let (controller, transport) = scripted(ReplyOrdering::Arrival);

    type_query(&controller, "hello");
    let turn = controller.submit().expect("non-empty query");

    controller.with_surface(|surface| {
        assert_eq!(surface.bubbles(), &[Bubble::user("hello")]);
        assert_eq!(surface.query_value(), "");
        assert!(surface.is_scrolled_to_end());
    });
    assert_eq!(controller.turns_in_flight(), 1);

    transport.release("hello", Ok(Answer::new("hi there"))).await;
    assert_eq!(
        turn.finished().await,
        TurnOutcome::Answered("hi there".to_string())
    );
}

#[tokio::test]
async fn test_bot_bubble_follows_user_bubble() {
    let (controller, transport) = scripted(ReplyOrdering::Arrival);

    type_query(&controller, "hello");
    let turn = controller.submit().unwrap();
    transport
        .release("hello", Ok(Answer::from_json(&json!({ "answer": "hi there" }))))
        .await;
    turn.finished().await;

    controller.with_surface(|surface| {
        assert_eq!(
            surface.bubbles(),
            &[Bubble::user("hello"), Bubble::bot("hi there")]
        );
    });
    assert_eq!(controller.turns_in_flight(), 0);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_log_scrolled_after_every_bubble() {
    let (controller, transport) = scripted(ReplyOrdering::Arrival);

    type_query(&controller, "hello");
    let turn = controller.submit().unwrap();
    transport.release("hello", Ok(Answer::new("hi"))).await;
    turn.finished().await;

    controller.with_surface(|surface| {
        assert_eq!(
            surface.events(),
            &[
                SurfaceEvent::Appended(Role::User),
                SurfaceEvent::Cleared,
                SurfaceEvent::Scrolled,
                SurfaceEvent::Appended(Role::Bot),
                SurfaceEvent::Scrolled,
            ]
        );
        assert!(surface.is_scrolled_to_end());
        assert_eq!(surface.scroll_top(), 2);
    });
}

#[tokio::test]
async fn test_overlapping_turns_render_in_arrival_order() {
    let (controller, transport) = scripted(ReplyOrdering::Arrival);

    type_query(&controller, "a");
    let first = controller.submit().unwrap();
    type_query(&controller, "b");
    let second = controller.submit().unwrap();

    // Both user bubbles are in, in submission order, before any reply.
    assert_eq!(texts(&controller, Role::User), vec!["a", "b"]);
    assert!(texts(&controller, Role::Bot).is_empty());

    transport.release("b", Ok(Answer::new("B"))).await;
    second.finished().await;
    transport.release("a", Ok(Answer::new("A"))).await;
    first.finished().await;

    let mut replies = texts(&controller, Role::Bot);
    // No FIFO guarantee between the two replies, only that each arrived once.
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0], "B", "arrival order renders the first response first");
    replies.sort();
    assert_eq!(replies, vec!["A", "B"]);
}

#[tokio::test]
async fn test_submission_ordering_holds_late_replies() {
    let (controller, transport) = scripted(ReplyOrdering::Submission);

    type_query(&controller, "a");
    let first = controller.submit().unwrap();
    type_query(&controller, "b");
    let second = controller.submit().unwrap();

    transport.release("b", Ok(Answer::new("B"))).await;
    second.finished().await;
    assert!(texts(&controller, Role::Bot).is_empty());
    assert_eq!(controller.turns_in_flight(), 2);

    transport.release("a", Ok(Answer::new("A"))).await;
    first.finished().await;

    controller.with_surface(|surface| {
        assert_eq!(
            surface.bubbles(),
            &[
                Bubble::user("a"),
                Bubble::user("b"),
                Bubble::bot("A"),
                Bubble::bot("B"),
            ]
        );
    });
    assert_eq!(controller.turns_in_flight(), 0);
}

#[tokio::test]
async fn test_missing_answer_renders_undefined() {
    let controller = ChatFormController::bind(
        MemorySurface::new(),
        FixedTransport(json!({ "retrieved": [] })),
        ReplyOrdering::Arrival,
    )
    .unwrap();

    type_query(&controller, "hello");
    let outcome = controller.submit().unwrap().finished().await;

    assert_eq!(outcome, TurnOutcome::Answered("undefined".to_string()));
    assert_eq!(texts(&controller, Role::Bot), vec!["undefined"]);
}

#[tokio::test]
async fn test_failed_exchange_renders_error_bubble() {
    let (controller, transport) = scripted(ReplyOrdering::Arrival);

    type_query(&controller, "hello");
    let turn = controller.submit().unwrap();
    transport
        .release(
            "hello",
            Err(ClientError::Status {
                status: 503,
                body: "unavailable".to_string(),
            }),
        )
        .await;

    let outcome = turn.finished().await;
    assert_eq!(
        outcome,
        TurnOutcome::Failed("Request failed: server returned 503: unavailable".to_string())
    );
    controller.with_surface(|surface| {
        assert_eq!(surface.bubbles().len(), 2);
        assert_eq!(surface.bubbles()[1].role, Role::Error);
        assert!(surface.is_scrolled_to_end());
    });
    assert!(texts(&controller, Role::Bot).is_empty());
}

#[tokio::test]
async fn test_teardown_cancels_in_flight_turns() {
    let (controller, transport) = scripted(ReplyOrdering::Arrival);

    type_query(&controller, "hello");
    let turn = controller.submit().unwrap();
    controller.teardown();

    assert_eq!(turn.finished().await, TurnOutcome::Cancelled);
    assert_eq!(texts(&controller, Role::User), vec!["hello"]);
    assert!(texts(&controller, Role::Bot).is_empty());
    assert_eq!(controller.turns_in_flight(), 0);

    type_query(&controller, "again");
    assert!(controller.submit().is_none());
    assert!(transport.calls() <= 1);
}

#[tokio::test]
async fn test_teardown_drops_parked_replies() {
    let (controller, transport) = scripted(ReplyOrdering::Submission);

    type_query(&controller, "a");
    let first = controller.submit().unwrap();
    type_query(&controller, "b");
    let second = controller.submit().unwrap();

    // "b" answers first and is held back behind "a".
    transport.release("b", Ok(Answer::new("B"))).await;
    assert_eq!(
        second.finished().await,
        TurnOutcome::Answered("B".to_string())
    );
    assert!(texts(&controller, Role::Bot).is_empty());
    assert_eq!(controller.turns_in_flight(), 2);

    controller.teardown();
    assert_eq!(first.finished().await, TurnOutcome::Cancelled);

    controller.with_surface(|surface| {
        assert_eq!(surface.bubbles(), &[Bubble::user("a"), Bubble::user("b")]);
    });
    assert_eq!(controller.turns_in_flight(), 0);
}

#[tokio::test]
async fn test_panicking_transport_settles_turn() {
    let controller = ChatFormController::bind(
        MemorySurface::new(),
        PanickingTransport { poison: "a" },
        ReplyOrdering::Submission,
    )
    .unwrap();

    type_query(&controller, "a");
    let first = controller.submit().unwrap();
    type_query(&controller, "b");
    let second = controller.submit().unwrap();

    assert_eq!(
        first.finished().await,
        TurnOutcome::Failed("Request failed: transport panicked".to_string())
    );
    second.finished().await;

    controller.with_surface(|surface| {
        assert_eq!(
            surface.bubbles(),
            &[
                Bubble::user("a"),
                Bubble::user("b"),
                Bubble::error("Request failed: transport panicked"),
                Bubble::bot("echo: b"),
            ]
        );
    });
    assert_eq!(controller.turns_in_flight(), 0);
}

#[tokio::test]
async fn test_request_is_form_encoded_query() {
    let seen: Arc<Mutex<Vec<(String, String)>>> = Arc::default();
    let captured = Arc::clone(&seen);
    let app = Router::new().route(
        "/chat",
        post(move |headers: HeaderMap, body: String| {
            let captured = Arc::clone(&captured);
            async move {
                let content_type = headers
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                captured.lock().unwrap().push((content_type, body));
                Json(json!({ "answer": "ok" }))
            }
        }),
    );
    let base_url = spawn_app(app).await;

    let controller = ChatFormController::bind(
        MemorySurface::new(),
        HttpTransport::new(&base_url).unwrap(),
        ReplyOrdering::Arrival,
    )
    .unwrap();
    type_query(&controller, "a b&c=d/é");
    controller.submit().unwrap().finished().await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "application/x-www-form-urlencoded");
    assert_eq!(seen[0].1, "query=a+b%26c%3Dd%2F%C3%A9");
}

#[tokio::test]
async fn test_bind_without_form_is_noop() {
    let controller = ChatFormController::bind(
        MemorySurface::without_form(),
        EchoTransport,
        ReplyOrdering::Arrival,
    );
    assert!(controller.is_none());
}

#[tokio::test]
async fn test_http_round_trip_against_server() {
    let state = AppState::new(
        Arc::new(EchoAnswerer),
        Arc::new(AppConfig::load_from_args(["docchat"]).unwrap()),
    )
    .unwrap();
    let base_url = spawn_app(build_router(state)).await;

    let transport = HttpTransport::new(&base_url).unwrap();
    let controller =
        ChatFormController::bind(MemorySurface::new(), transport, ReplyOrdering::Arrival).unwrap();

    type_query(&controller, "hello world & more = 100%");
    let outcome = controller.submit().unwrap().finished().await;

    assert_eq!(
        outcome,
        TurnOutcome::Answered("echo: hello world & more = 100%".to_string())
    );
    assert_eq!(
        texts(&controller, Role::Bot),
        vec!["echo: hello world & more = 100%"]
    );
}

#[tokio::test]
async fn test_unreachable_server_renders_error_bubble() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let transport = HttpTransport::new(format!("http://{addr}")).unwrap();
    let controller =
        ChatFormController::bind(MemorySurface::new(), transport, ReplyOrdering::Arrival).unwrap();

    type_query(&controller, "hello");
    let outcome = controller.submit().unwrap().finished().await;

    match outcome {
        TurnOutcome::Failed(text) => assert!(text.starts_with("Request failed: network error")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(texts(&controller, Role::Error).len(), 1);
}

#[tokio::test]
async fn test_non_json_reply_renders_error_bubble() {
    let app = Router::new().route("/chat", post(|| async { "plain text" }));
    let base_url = spawn_app(app).await;

    let transport = HttpTransport::new(&base_url).unwrap();
    let controller =
        ChatFormController::bind(MemorySurface::new(), transport, ReplyOrdering::Arrival).unwrap();

    type_query(&controller, "hello");
    let outcome = controller.submit().unwrap().finished().await;

    match outcome {
        TurnOutcome::Failed(text) => assert!(text.starts_with("Request failed: malformed response")),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_error_status_with_json_answer_is_rendered() {
    let app = Router::new().route(
        "/chat",
        post(|| async {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "answer": "Error during query: index offline" })),
            )
        }),
    );
    let base_url = spawn_app(app).await;

    let transport = HttpTransport::new(&base_url).unwrap();
    let controller =
        ChatFormController::bind(MemorySurface::new(), transport, ReplyOrdering::Arrival).unwrap();

    type_query(&controller, "hello");
    controller.submit().unwrap().finished().await;

    assert_eq!(
        texts(&controller, Role::Bot),
        vec!["Error during query: index offline"]
    );
}

#[tokio::test]
async fn test_terminal_submits_each_line() {
    let input: &[u8] = b"hello\n\nworld\n";
    let outcomes = terminal::run_with(
        TerminalSurface::new(Vec::<u8>::new()),
        EchoTransport,
        ReplyOrdering::Submission,
        input,
    )
    .await
    .unwrap();

    assert_eq!(
        outcomes,
        vec![
            TurnOutcome::Answered("echo: hello".to_string()),
            TurnOutcome::Answered("echo: world".to_string()),
        ]
    );
}

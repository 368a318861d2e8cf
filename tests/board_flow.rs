//! Board flows end to end: session, HTTP gateway, task cache and the
//! reorder coordinator wired together against a mock task server.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use taskboard::board::TaskBoard;
use taskboard::error::{BoardError, GatewayError};
use taskboard::gateway::{HttpGateway, HttpGatewayConfig};
use taskboard::notification::{MemoryNotifier, NoticeLevel};
use taskboard::projector::{column_for, project_board};
use taskboard::reorder::ReorderOutcome;
use taskboard::session::SessionContext;
use taskboard::types::{TaskId, TaskStatus};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn task_json(id: i64, status: &str, position: u32) -> Value {
    json!({
        "id": id,
        "title": format!("Task {id}"),
        "description": null,
        "status": status,
        "priority": "MEDIUM",
        "position": position,
        "dueDate": null,
        "createdAt": "2026-10-01T09:00:00Z",
        "updatedAt": "2026-10-01T09:00:00Z"
    })
}

struct Harness {
    session: Arc<SessionContext>,
    notifier: Arc<MemoryNotifier>,
    board: TaskBoard,
}

fn harness(server: &MockServer) -> Harness {
    let session = SessionContext::new();
    session.set_token("test-token", Some("ana".to_string()), None);
    let gateway = HttpGateway::new(
        HttpGatewayConfig {
            base_url: server.uri(),
            request_timeout: Duration::from_secs(5),
        },
        Arc::clone(&session),
    )
    .expect("client should build");
    let notifier = Arc::new(MemoryNotifier::default());
    let board = TaskBoard::new(Arc::new(gateway), Arc::clone(&session), notifier.clone());
    Harness {
        session,
        notifier,
        board,
    }
}

fn todo_ids(board: &TaskBoard) -> Vec<TaskId> {
    let view = board.cache().get();
    let snapshot = view.snapshot().expect("cache should be loaded");
    let columns = project_board(&snapshot.tasks);
    column_for(&columns, TaskStatus::Todo)
        .map(|column| column.tasks.iter().map(|task| task.id).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_overlapping_refreshes_share_one_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tasks"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([task_json(1, "TODO", 0)]))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server);
    let (first, second) = tokio::join!(h.board.refresh(), h.board.refresh());

    let first = first.expect("first refresh");
    let second = second.expect("second refresh");
    assert_eq!(first.version, second.version);
    assert_eq!(h.board.cache().version(), 1);
}

#[tokio::test]
async fn test_drag_to_top_reorders_after_reload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tasks"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([task_json(1, "TODO", 0), task_json(2, "TODO", 1)])),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/tasks/2/move"))
        .and(body_json(json!({ "status": "TODO", "newPosition": 0 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(task_json(2, "TODO", 0)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tasks"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([task_json(2, "TODO", 0), task_json(1, "TODO", 1)])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server);
    h.board.refresh().await.expect("initial load");
    assert_eq!(todo_ids(&h.board), vec![1, 2]);

    let outcome = h
        .board
        .move_task(2, TaskStatus::Todo, Some(0))
        .await
        .expect("move should succeed");

    assert!(matches!(outcome, ReorderOutcome::Moved { refreshed: true, .. }));
    assert_eq!(todo_ids(&h.board), vec![2, 1]);
    assert_eq!(h.board.cache().version(), 2);
}

#[tokio::test]
async fn test_move_finishing_during_reload_gets_its_own_fetch() {
    let server = MockServer::start().await;
    // Sent right after the first move, before the second one is applied.
    Mock::given(method("GET"))
        .and(path("/api/tasks"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([task_json(1, "DONE", 0), task_json(2, "TODO", 0)]))
                .set_delay(Duration::from_millis(300)),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tasks"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([task_json(1, "DONE", 0), task_json(2, "DONE", 1)])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/tasks/1/move"))
        .respond_with(ResponseTemplate::new(200).set_body_json(task_json(1, "DONE", 0)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/tasks/2/move"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(task_json(2, "DONE", 1))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server);
    let second_move = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.board.move_task(2, TaskStatus::Done, None).await
    };
    let (first, second) = tokio::join!(h.board.move_task(1, TaskStatus::Done, None), second_move);

    assert!(matches!(first, Ok(ReorderOutcome::Moved { refreshed: true, .. })));
    assert!(matches!(second, Ok(ReorderOutcome::Moved { refreshed: true, .. })));
    let view = h.board.cache().get();
    let snapshot = view.snapshot().expect("cache should be loaded");
    assert_eq!(snapshot.task(2).map(|task| task.status), Some(TaskStatus::Done));
    assert_eq!(h.board.cache().version(), 2);
}

#[tokio::test]
async fn test_drop_on_origin_sends_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tasks"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([task_json(1, "TODO", 0), task_json(2, "TODO", 1)])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(&server);
    let outcome = h
        .board
        .move_task(2, TaskStatus::Todo, Some(1))
        .await
        .expect("no-op move");

    assert_eq!(outcome, ReorderOutcome::Unchanged);
}

#[tokio::test]
async fn test_rejected_move_keeps_board_and_reports_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tasks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([task_json(1, "TODO", 0)])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/tasks/1/move"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "message": "Status invalido" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server);
    let before = h.board.refresh().await.expect("initial load");

    let err = h
        .board
        .move_task(1, TaskStatus::Done, None)
        .await
        .expect_err("move should fail");

    assert!(matches!(
        err,
        BoardError::Gateway(GatewayError::Validation { status: 400, .. })
    ));
    assert_eq!(h.board.cache().version(), before.version);
    let notices = h.notifier.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Error);
    assert_eq!(notices[0].message, "Status invalido");
}

#[tokio::test]
async fn test_unauthorized_move_logs_out_and_clears_board() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tasks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([task_json(1, "TODO", 0)])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/tasks/1/move"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "unauthorized",
            "message": "Token expirado"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server);
    h.board.refresh().await.expect("initial load");

    let err = h
        .board
        .advance(1)
        .await
        .expect_err("advance should fail");

    assert!(err.as_gateway().is_some_and(GatewayError::is_auth));
    assert!(!h.session.is_authenticated());
    assert!(h.board.cache().get().snapshot().is_none());
    assert!(h.notifier.notices().is_empty());
}

#[tokio::test]
async fn test_list_arriving_after_logout_is_dropped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tasks"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([task_json(1, "TODO", 0)]))
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    let h = harness(&server);
    let logout = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.session.logout();
    };
    let (outcome, ()) = tokio::join!(h.board.refresh(), logout);

    assert_eq!(outcome, Err(BoardError::SessionChanged));
    assert!(h.board.cache().get().snapshot().is_none());
}

use std::time::Duration;

use gardenlink_api::Channel;
use gardenlink_api::models::{OutputMode, OutputState, Role, SessionStatus};
use gardenlink_client::error::ClientError;
use gardenlink_client::guard::GuardDecision;
use gardenlink_client::notify::Level;
use gardenlink_client::session::{SIGN_IN_PATH, SessionEvent};
use gardenlink_client::draft::DraftStore;
use gardenlink_client::stream::ConnectionState;
use gardenlink_client::validation::ValidationError;
use gardenlink_mock::state::Audience;
use serde_json::json;
use time::OffsetDateTime;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

mod common;
use common::*;

#[tokio::test]
async fn test_toggle_reaches_the_view_through_the_stream() {
    let (addr, _state) = spawn_backend().await;
    let client = signed_in_client(addr, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let outputs = client.sync().outputs().unwrap();
    let mut view = outputs.view();
    let snapshot = wait_for(&mut view, |view| view.outputs.len() == 3).await;

    let lamp = snapshot.get("1").unwrap().clone();
    assert_eq!(lamp.state, OutputState::Unknown);
    assert_eq!(lamp.mode, OutputMode::AutoSun);

    let mut drafts = DraftStore::new();
    drafts.open(snapshot.get("3").unwrap()).mode = OutputMode::AutoSun;

    let response = client.outputs().toggle(&lamp).await.unwrap();
    assert_eq!(response, json!({ "message": "Output updated" }));

    let updated = wait_for(&mut view, |view| {
        view.get("1").is_some_and(|lamp| lamp.state == OutputState::On)
    })
    .await;
    assert!(updated.get("1").unwrap().state_id.is_some());
    assert_eq!(drafts.get("3").unwrap().mode, OutputMode::AutoSun);
    assert_eq!(outputs.status(), ConnectionState::Open);

    outputs.close().await;
}

#[tokio::test]
async fn test_account_view_marks_the_current_session() {
    let (addr, _state) = spawn_backend().await;
    let client = signed_in_client(addr, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let account = client.sync().account().unwrap();
    let mut view = account.view();
    let snapshot = wait_for(&mut view, |view| !view.sessions.is_empty()).await;

    let current = snapshot.current().unwrap();
    assert_eq!(snapshot.sessions.len(), 1);
    assert_eq!(current.status(OffsetDateTime::now_utc()), SessionStatus::Online);

    let other = signed_in_client(addr, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let snapshot = wait_for(&mut view, |view| view.sessions.len() == 2).await;
    assert_eq!(snapshot.current().unwrap().id, current.id);

    other.account().logout().await.unwrap();
    wait_for(&mut view, |view| view.sessions.len() == 1).await;
}

#[tokio::test]
async fn test_malformed_account_push_keeps_the_session_list() {
    let (addr, state) = spawn_backend().await;
    let client = signed_in_client(addr, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let account = client.sync().account().unwrap();
    let mut view = account.view();
    let before = wait_for(&mut view, |view| view.sessions.len() == 1).await;
    assert!(before.current().is_some());

    state.publish_text(
        Some(Channel::SessionAccount),
        Audience::All,
        r#"{"iv":"zz","content":"00"}"#,
    );
    state.publish(
        Channel::SessionAccount,
        Audience::All,
        &json!({ "account": { "sessions": "garbage" } }),
    );
    state.publish(Channel::SessionAccount, Audience::All, &json!({ "account": {} }));
    state.publish(Channel::SessionAccount, Audience::All, &json!({ "account": [] }));

    while let Ok(changed) = tokio::time::timeout(Duration::from_secs(1), view.changed()).await {
        changed.unwrap();
        assert_eq!(view.borrow_and_update().sessions.len(), before.sessions.len());
    }

    let after = account.snapshot();
    assert_eq!(after.sessions.len(), before.sessions.len());
    assert_eq!(after.session_now, before.session_now);
    assert_eq!(account.status(), ConnectionState::Open);
}

#[tokio::test]
async fn test_malformed_frames_leave_the_view_alone() {
    let (addr, state) = spawn_backend().await;
    let client = signed_in_client(addr, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let outputs = client.sync().outputs().unwrap();
    let mut view = outputs.view();
    wait_for(&mut view, |view| view.outputs.len() == 3).await;

    state.publish_text(
        Some(Channel::Output),
        Audience::All,
        r#"{"iv":"zz","content":"00112233445566778899aabbccddeeff"}"#,
    );
    state.publish(
        Channel::Output,
        Audience::All,
        &json!([
            { "id": "", "name": "No id" },
            { "id": "9", "name": "" },
            { "id": 9, "name": "Fan", "state": false, "mode": "SOMETHING_NEW" },
        ]),
    );

    let snapshot = wait_for(&mut view, |view| view.outputs.len() == 1).await;
    let fan = &snapshot.outputs[0];
    assert_eq!(fan.id, "9");
    assert_eq!(fan.state, OutputState::Off);
    assert_eq!(fan.mode, OutputMode::Manual);
    assert_eq!(outputs.status(), ConnectionState::Open);
}

#[tokio::test]
async fn test_rejected_session_forces_logout() {
    let (addr, state) = spawn_backend().await;
    let client = signed_in_client(addr, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let mut events = client.session().subscribe();

    let user_id = state.store.read().await.users[0].id.clone();
    state.end_sessions(&user_id, |_| true).await;

    let result = client.account().account().await;
    assert!(matches!(result, Err(ClientError::Auth(status)) if status.as_u16() == 401));
    assert!(!client.session().is_signed_in());
    assert_eq!(
        events.recv().await.unwrap(),
        SessionEvent::ForcedLogout {
            reason: "/api/users/account rejected with 401 Unauthorized".into(),
            redirect: SIGN_IN_PATH.into(),
        }
    );

    assert!(matches!(
        client.account().account().await,
        Err(ClientError::Unauthenticated)
    ));
}

#[tokio::test]
async fn test_server_errors_become_notifications() {
    let (addr, _state) = spawn_backend().await;
    let client = signed_in_client(addr, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let result = client
        .account()
        .edit(gardenlink_api::models::EditAccountRequest {
            name: None,
            email: Some(STUDENT_EMAIL.into()),
        })
        .await;
    assert!(matches!(result, Err(ClientError::Server { ref message, .. }) if message == "Email already used"));

    let active = client.notifier().active(OffsetDateTime::now_utc());
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].level, Level::Error);
    assert_eq!(active[0].message, "Email already used");
    assert!(client.session().is_signed_in());
}

#[tokio::test]
async fn test_undecryptable_response_is_an_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = vec![0; 4096];
        let _ = socket.read(&mut request).await;

        let body = r#"{"iv":"000102030405060708090a0b0c0d0e0f","content":"00112233445566778899aabbccddeeff"}"#;
        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
    });

    let client = client_for(addr);
    client.session().sign_in("token", None);

    let result = client.account().account().await;
    assert!(matches!(result, Err(ClientError::Decrypt(_))));
    assert!(client.session().is_signed_in());
    assert!(client.notifier().active(OffsetDateTime::now_utc()).is_empty());
}

#[tokio::test]
async fn test_failed_login_keeps_the_session_store_empty() {
    let (addr, _state) = spawn_backend().await;
    let client = client_for(addr);

    let result = client.account().login(ADMIN_EMAIL, "wrong").await;
    assert!(matches!(result, Err(ClientError::Server { .. })));
    assert!(!client.session().is_signed_in());

    let result = client.account().login("", "").await;
    assert!(matches!(result, Err(ClientError::Validation(ValidationError::Empty("email")))));
}

#[tokio::test]
async fn test_remote_logout_closes_the_other_clients_streams() {
    let (addr, _state) = spawn_backend().await;
    let laptop = signed_in_client(addr, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let phone = signed_in_client(addr, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let mut phone_events = phone.session().subscribe();

    let phone_account = phone.sync().account().unwrap();
    let mut view = phone_account.view();
    let phone_session = wait_for(&mut view, |view| view.current().is_some())
        .await
        .session_now
        .unwrap();
    let phone_outputs = phone.sync().outputs().unwrap();
    wait_for(&mut phone_outputs.view(), |view| !view.outputs.is_empty()).await;

    laptop.account().remote_logout(&phone_session).await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), phone_events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event, SessionEvent::ForcedLogout { ref redirect, .. } if redirect == SIGN_IN_PATH));
    assert!(!phone.session().is_signed_in());

    tokio::time::timeout(Duration::from_secs(5), async {
        while !(phone_outputs.is_closed() && phone_account.is_closed()) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_save_draft() {
    let (addr, _state) = spawn_backend().await;
    let client = signed_in_client(addr, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let outputs = client.sync().outputs().unwrap();
    let mut view = outputs.view();
    let snapshot = wait_for(&mut view, |view| view.outputs.len() == 3).await;

    let mut drafts = DraftStore::new();
    let draft = drafts.open(snapshot.get("3").unwrap());
    draft.mode = OutputMode::AutoDatetime;
    draft.turn_on_time = Some("18:00".into());

    let result = client.outputs().save_draft(&mut drafts, "3").await;
    assert!(matches!(result, Err(ClientError::Validation(ValidationError::Required { .. }))));
    assert!(drafts.is_open("3"));

    drafts.get_mut("3").unwrap().turn_off_time = Some("23:30".into());
    client.outputs().save_draft(&mut drafts, "3").await.unwrap();
    assert!(!drafts.is_open("3"));

    let updated = wait_for(&mut view, |view| {
        view.get("3").is_some_and(|porch| porch.mode == OutputMode::AutoDatetime)
    })
    .await;
    assert_eq!(updated.get("3").unwrap().turn_off_time.as_deref(), Some("23:30"));

    let notifications = client.notifier().active(OffsetDateTime::now_utc());
    assert!(notifications.iter().any(|n| n.level == Level::Success));
}

#[tokio::test]
async fn test_power_view_follows_resets() {
    let (addr, _state) = spawn_backend().await;
    let client = signed_in_client(addr, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let meters = client.pzem().list().await.unwrap();
    assert_eq!(meters.len(), 2);
    assert!(client.pzem().latest("1").await.unwrap().is_none());

    let power = client.sync().power().unwrap();
    let mut view = power.view();
    // The empty snapshot still counts as a change.
    tokio::time::timeout(Duration::from_secs(5), view.changed())
        .await
        .unwrap()
        .unwrap();
    assert!(view.borrow_and_update().meters.is_empty());

    client.pzem().reset("1").await.unwrap();

    let snapshot = wait_for(&mut view, |view| view.latest("1").is_some()).await;
    assert_eq!(snapshot.latest("1").unwrap().energy, 0.0);
    assert_eq!(client.pzem().chart("1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_guard_uses_the_validated_role() {
    let (addr, _state) = spawn_backend().await;
    let student = signed_in_client(addr, STUDENT_EMAIL, STUDENT_PASSWORD).await;
    let account = student.account();

    assert_eq!(account.validate_token().await.unwrap().role, Role::Mahasiswa);
    assert_eq!(
        student.guard().authorize("/dashboard/home", &account).await.unwrap(),
        GuardDecision::Allow
    );
    assert_eq!(
        student.guard().authorize("/dashboard/logs", &account).await.unwrap(),
        GuardDecision::Redirect("/dashboard/home".into())
    );

    account.logout().await.unwrap();
    assert_eq!(
        student.guard().authorize("/dashboard/home", &account).await.unwrap(),
        GuardDecision::Redirect(SIGN_IN_PATH.into())
    );
    assert_eq!(
        student.guard().authorize("/auth/signin", &account).await.unwrap(),
        GuardDecision::Allow
    );
}

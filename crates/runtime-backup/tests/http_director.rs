//! Tests for the director HTTP client
//!

#![allow(missing_docs)]

use base64::{Engine, engine::general_purpose::STANDARD};
use common::{StubResponse, StubServer};
use runtime_backup::director::{
    Director, DirectorError, DirectorLogin, HttpDirector, JobState, TaskState, VmObject,
};

mod common;

#[test]
fn info_sends_basic_auth() {
    let server = StubServer::start(vec![StubResponse::body(200, r#"{"name":"p-bosh"}"#)]);
    let director = HttpDirector::new(&server.login(), None).unwrap();

    let info = director.info().unwrap();
    assert_eq!(info, br#"{"name":"p-bosh"}"#);

    let requests = server.finish();
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].path, "/info");

    let expected = format!("Basic {}", STANDARD.encode("director:director-pass"));
    assert_eq!(requests[0].header("authorization"), Some(expected.as_str()));
}

#[test]
fn rejected_credentials_are_a_status_error() {
    let server = StubServer::start(vec![StubResponse::body(401, "Not authorized")]);
    let director = HttpDirector::new(&server.login(), None).unwrap();

    let result = director.info();
    assert!(matches!(result, Err(DirectorError::Status(401, ref url)) if url.ends_with("/info")));

    server.finish();
}

#[test]
fn change_job_state_follows_the_task_location() {
    let server = StubServer::start(vec![StubResponse::redirect(
        "https://10.0.0.2:25555/tasks/42",
    )]);
    let director = HttpDirector::new(&server.login(), None).unwrap();

    let task_id = director
        .change_job_state(
            "cf-5f3c9a",
            "cloud_controller-partition-1",
            1,
            JobState::Stopped,
            b"name: cf-5f3c9a",
        )
        .unwrap();
    assert_eq!(task_id, 42);

    let requests = server.finish();
    let request = &requests[0];
    assert_eq!(request.method, "PUT");
    assert_eq!(
        request.path,
        "/deployments/cf-5f3c9a/jobs/cloud_controller-partition-1/1?state=stopped"
    );
    assert_eq!(request.header("content-type"), Some("text/yaml"));
    assert_eq!(request.body, b"name: cf-5f3c9a");
}

#[test]
fn task_location_without_an_id_is_rejected() {
    let server = StubServer::start(vec![
        StubResponse::redirect("/tasks/0"),
        StubResponse::redirect("/deployments/cf-5f3c9a"),
    ]);
    let director = HttpDirector::new(&server.login(), None).unwrap();

    for _ in 0..2 {
        let result = director.change_job_state("cf-5f3c9a", "router", 0, JobState::Started, b"");
        assert!(matches!(result, Err(DirectorError::InvalidTaskId(_))));
    }

    server.finish();
}

#[test]
fn state_change_without_a_redirect_is_a_status_error() {
    let server = StubServer::start(vec![StubResponse::body(200, "")]);
    let director = HttpDirector::new(&server.login(), None).unwrap();

    let result = director.change_job_state("cf-5f3c9a", "router", 0, JobState::Stopped, b"");
    assert!(matches!(
        result,
        Err(DirectorError::Status(200, ref url)) if url.contains("/jobs/router/0?state=stopped")
    ));

    server.finish();
}

#[test]
fn task_status_is_parsed() {
    let server = StubServer::start(vec![
        StubResponse::body(200, r#"{"id":42,"state":"processing","description":"stop job"}"#),
        StubResponse::body(200, r#"{"id":42,"state":"cancelled"}"#),
    ]);
    let director = HttpDirector::new(&server.login(), None).unwrap();

    let task = director.task_status(42).unwrap();
    assert_eq!(task.id, 42);
    assert_eq!(task.state, TaskState::Processing);
    assert_eq!(task.description, "stop job");

    let task = director.task_status(42).unwrap();
    assert_eq!(task.state, TaskState::Unknown("cancelled".into()));
    assert!(task.description.is_empty());

    let requests = server.finish();
    assert!(requests.iter().all(|request| request.path == "/tasks/42"));
}

#[test]
fn deployment_vms_and_manifest() {
    let server = StubServer::start(vec![
        StubResponse::body(
            200,
            r#"[{"job":"cloud_controller-partition-1","index":0,"agent_id":"a1"},{"job":"router-partition-1","index":0}]"#,
        ),
        StubResponse::body(200, "name: cf-5f3c9a\n"),
    ]);
    let director = HttpDirector::new(&server.login(), None).unwrap();

    let vms = director.deployment_vms("cf-5f3c9a").unwrap();
    assert_eq!(
        vms,
        vec![
            VmObject {
                job: "cloud_controller-partition-1".into(),
                index: 0
            },
            VmObject {
                job: "router-partition-1".into(),
                index: 0
            },
        ]
    );

    let manifest = director.deployment_manifest("cf-5f3c9a").unwrap();
    assert_eq!(manifest, b"name: cf-5f3c9a\n");

    let requests = server.finish();
    assert_eq!(requests[0].path, "/deployments/cf-5f3c9a/vms");
    assert_eq!(requests[1].path, "/deployments/cf-5f3c9a");
}

#[test]
fn malformed_task_is_a_deserialize_error() {
    let server = StubServer::start(vec![StubResponse::body(200, "not json")]);
    let director = HttpDirector::new(&server.login(), None).unwrap();

    assert!(matches!(
        director.task_status(3),
        Err(DirectorError::Deserialize(_, "task status"))
    ));

    server.finish();
}

#[test]
fn missing_ca_certificate_fails_to_connect() {
    let login = DirectorLogin {
        address: "10.0.0.2".into(),
        port: 25555,
        username: "director".into(),
        password: "director-pass".into(),
    };
    let directory = tempfile::tempdir().unwrap();

    let result = HttpDirector::new(&login, Some(&directory.path().join("ca.pem")));
    assert!(matches!(result, Err(DirectorError::Certificate(_))));
}

mod common;

use common::{MockServer, Recorded, Reply};
use ipcam_cgi::{AuthMethod, CameraError, Client, ClientConfig};
use std::net::TcpListener;
use std::time::Duration;

const NAME_PATH: &str = "/cgi-bin/magicBox.cgi?action=getMachineName";
const SERIAL_PATH: &str = "/cgi-bin/magicBox.cgi?action=getSerialNo";

fn config(server: &MockServer) -> ClientConfig {
    ClientConfig::new("127.0.0.1", server.port(), "admin", "secret")
        .with_timeout(Duration::from_secs(2))
}

/// Device that only speaks Digest and answers signed requests with `body`.
fn digest_device(body: &'static str) -> MockServer {
    MockServer::start(move |req: &Recorded| {
        if req.is_digest() {
            Reply::ok(body)
        } else {
            Reply::digest_challenge()
        }
    })
}

#[test]
fn basic_success_skips_digest() {
    let server = MockServer::start(|req: &Recorded| match req.path.as_str() {
        NAME_PATH if req.is_basic() => Reply::ok("name=Front Door\r\n"),
        SERIAL_PATH if req.is_basic() => Reply::ok("sn=ABC123\r\n"),
        _ => Reply::status(401),
    });

    let client = Client::new(config(&server)).unwrap();

    assert_eq!(client.auth_method(), AuthMethod::Basic);
    assert!(server.requests().iter().all(Recorded::is_basic));
    assert_eq!(client.identity().name.as_deref(), Some("Front Door"));
    assert_eq!(client.identity().serial.as_deref(), Some("ABC123"));
    assert_eq!(client.to_string(), "<Front Door: ABC123>");
}

#[test]
fn rejected_basic_falls_back_to_digest() {
    let server = digest_device("OK");

    let client = Client::new(config(&server)).unwrap();

    assert_eq!(client.auth_method(), AuthMethod::Digest);

    let probes = server.requests_to(NAME_PATH);
    assert_eq!(probes.iter().filter(|r| r.is_basic()).count(), 1);
    assert!(probes.iter().any(Recorded::is_digest));

    let signed = probes.iter().find(|r| r.is_digest()).unwrap();
    let authorization = signed.authorization.as_deref().unwrap();
    assert!(authorization.contains("username=\"admin\""));
    assert!(authorization.contains("realm=\"Login to CAM\""));
    assert!(authorization.contains("uri=\"/cgi-bin/magicBox.cgi?action=getMachineName\""));
    assert!(authorization.contains("opaque=\"abcdef\""));
    assert!(authorization.contains("qop=auth"));
}

#[test]
fn digest_body_with_invalid_marker_fails_construction() {
    let server = digest_device("Invalid Authority!");

    let err = Client::new(config(&server)).unwrap_err();

    assert!(matches!(err, CameraError::Authentication(_)), "{err:?}");
}

#[test]
fn digest_body_with_error_marker_fails_construction() {
    let server = digest_device("ERROR: bad credentials");

    let err = Client::new(config(&server)).unwrap_err();

    assert!(matches!(err, CameraError::Authentication(_)), "{err:?}");
}

#[test]
fn digest_http_error_fails_construction() {
    let server = MockServer::start(|_: &Recorded| Reply::digest_challenge());

    let err = Client::new(config(&server)).unwrap_err();

    assert!(matches!(err, CameraError::Authentication(_)), "{err:?}");
    // One Basic probe, one signed Digest probe, nothing else.
    let requests = server.requests();
    assert_eq!(requests.iter().filter(|r| r.is_basic()).count(), 1);
    assert_eq!(requests.iter().filter(|r| r.is_digest()).count(), 1);
}

#[test]
fn identity_failure_does_not_block_construction() {
    let server = MockServer::start(|req: &Recorded| match req.path.as_str() {
        NAME_PATH => Reply::ok("name=Yard"),
        _ => Reply::status(500),
    });

    let client = Client::new(config(&server).with_retries(0)).unwrap();

    assert!(client.identity().name.is_none());
    assert!(client.identity().serial.is_none());
    assert_eq!(client.to_string(), "<None: None>");
}

#[test]
fn unreachable_device_is_a_transport_error() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let err = Client::connect("127.0.0.1", port, "admin", "secret").unwrap_err();

    assert!(matches!(err, CameraError::Transport { .. }), "{err:?}");
}

#[test]
fn diagnostics_mask_secrets() {
    let server = MockServer::start(|_: &Recorded| Reply::ok("name=Cam"));
    let client = Client::new(config(&server)).unwrap();

    let debug = format!("{:?}", client);
    assert!(!debug.contains("secret"));
    assert!(debug.contains("**********"));

    let json = serde_json::to_value(client.redacted()).unwrap();
    assert_eq!(json["password"], "**********");
    assert_eq!(json["token"], "**********");
    assert_eq!(json["auth_method"], "basic");
    assert_eq!(json["username"], "admin");
    assert!(!json.to_string().contains("secret"));
}

use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::{Form, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use escrow_core::{submit, EscrowError, EscrowPoster, EscrowRecord, ServerEndpoint};
use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// What the mock Crypt Server saw for one request.
#[derive(Debug, Clone)]
struct Checkin {
    method: Method,
    path: String,
    content_type: Option<String>,
    authorization: Option<String>,
    basic_auth: Option<(String, String)>,
    fields: HashMap<String, String>,
}

#[derive(Clone)]
struct MockState {
    seen: Arc<Mutex<Vec<Checkin>>>,
    reply: StatusCode,
    delay: Duration,
}

struct MockCryptServer {
    url: String,
    seen: Arc<Mutex<Vec<Checkin>>>,
}

impl MockCryptServer {
    fn start(reply: StatusCode) -> Self {
        Self::start_with_delay(reply, Duration::ZERO)
    }

    fn start_with_delay(reply: StatusCode, delay: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            seen: seen.clone(),
            reply,
            delay,
        };
        let app = Router::new().fallback(checkin).with_state(state);

        thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).unwrap();
                axum::serve(listener, app).await.unwrap();
            });
        });

        Self {
            url: format!("http://{addr}"),
            seen,
        }
    }

    fn checkins(&self) -> Vec<Checkin> {
        self.seen.lock().unwrap().clone()
    }
}

async fn checkin(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Form(fields): Form<HashMap<String, String>>,
) -> (StatusCode, &'static str) {
    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let basic_auth = authorization.as_deref().and_then(decode_basic);

    state.seen.lock().unwrap().push(Checkin {
        method,
        path: uri.path().to_string(),
        content_type,
        authorization,
        basic_auth,
        fields,
    });

    (state.reply, "checked in")
}

fn decode_basic(value: &str) -> Option<(String, String)> {
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = String::from_utf8(STANDARD.decode(encoded).ok()?).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

fn sample_record() -> EscrowRecord {
    EscrowRecord::new(
        "2345.1234.6566.foo",
        "1234foobar",
        "testing.example.com",
        "tester",
    )
}

fn assert_fields(checkin: &Checkin, record: &EscrowRecord) {
    assert_eq!(checkin.fields.len(), 4, "{:?}", checkin.fields);
    assert_eq!(checkin.fields["recovery_password"], record.recovery_password);
    assert_eq!(checkin.fields["serial"], record.serial_number);
    assert_eq!(checkin.fields["macname"], record.hostname);
    assert_eq!(checkin.fields["username"], record.username);
}

#[test]
fn posts_form_without_auth() {
    let server = MockCryptServer::start(StatusCode::OK);
    let record = sample_record();
    let endpoint = ServerEndpoint::new(server.url.clone(), "/checkin/");

    let response = submit(&record, &endpoint).unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.is_success());
    assert_eq!(response.body_text(), "checked in");

    let checkins = server.checkins();
    assert_eq!(checkins.len(), 1);
    let seen = &checkins[0];
    assert_eq!(seen.method, Method::POST);
    assert_eq!(seen.path, "/checkin/");
    assert_eq!(
        seen.content_type.as_deref(),
        Some("application/x-www-form-urlencoded")
    );
    assert_eq!(seen.authorization, None);
    assert_fields(seen, &record);
}

#[test]
fn posts_form_with_basic_auth() {
    let server = MockCryptServer::start(StatusCode::OK);
    let record = sample_record();
    let endpoint =
        ServerEndpoint::new(server.url.clone(), "/checkin/").with_basic_auth("DarthHelmet", "12345");

    let response = EscrowPoster::new().unwrap().submit(&record, &endpoint).unwrap();
    assert_eq!(response.status, StatusCode::OK);

    let checkins = server.checkins();
    assert_eq!(checkins.len(), 1);
    assert_eq!(
        checkins[0].basic_auth,
        Some(("DarthHelmet".to_string(), "12345".to_string()))
    );
    assert_fields(&checkins[0], &record);
}

#[test]
fn empty_credentials_send_no_auth_header() {
    let server = MockCryptServer::start(StatusCode::OK);
    let endpoint = ServerEndpoint::new(server.url.clone(), "/checkin/").with_basic_auth("", "");

    submit(&sample_record(), &endpoint).unwrap();

    assert_eq!(server.checkins()[0].authorization, None);
}

#[test]
fn awkward_values_survive_form_encoding() {
    let server = MockCryptServer::start(StatusCode::OK);
    let record = EscrowRecord::new("a b&c%d=e+f", "", "host name/with?query#frag", "ünïcødé");
    let endpoint = ServerEndpoint::new(server.url.clone(), "/checkin/");

    submit(&record, &endpoint).unwrap();

    let checkins = server.checkins();
    assert_eq!(checkins.len(), 1);
    assert_fields(&checkins[0], &record);
}

#[test]
fn error_statuses_are_returned_not_raised() {
    let server = MockCryptServer::start(StatusCode::INTERNAL_SERVER_ERROR);
    let endpoint = ServerEndpoint::new(server.url.clone(), "/checkin/");

    let response = submit(&sample_record(), &endpoint).unwrap();
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!response.is_success());
    assert_eq!(response.body_text(), "checked in");
    assert_eq!(server.checkins().len(), 1);
}

#[test]
fn custom_uri_is_appended_verbatim() {
    let server = MockCryptServer::start(StatusCode::OK);
    let endpoint = ServerEndpoint::new(server.url.clone(), "/api/v2/checkin/");

    submit(&sample_record(), &endpoint).unwrap();

    assert_eq!(server.checkins()[0].path, "/api/v2/checkin/");
}

#[test]
fn unreachable_server_is_transport_error() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let endpoint = ServerEndpoint::new(format!("http://{addr}"), "/checkin/");

    let err = submit(&sample_record(), &endpoint).unwrap_err();
    assert!(matches!(err, EscrowError::Transport { .. }), "{err:?}");
    assert_eq!(err.code(), "ES3000");
}

#[test]
fn caller_timeout_becomes_transport_error() {
    let server = MockCryptServer::start_with_delay(StatusCode::OK, Duration::from_secs(3));
    let endpoint = ServerEndpoint::new(server.url.clone(), "/checkin/");
    let poster = EscrowPoster::with_timeout(Duration::from_millis(200)).unwrap();

    let err = poster.submit(&sample_record(), &endpoint).unwrap_err();
    assert!(err.is_transport(), "{err:?}");
}

#[test]
fn url_userinfo_is_sent_as_basic_auth() {
    let server = MockCryptServer::start(StatusCode::OK);
    let endpoint = ServerEndpoint::new(server.url.replace("http://", "http://x:y@"), "/checkin/");
    assert_eq!(endpoint.basic_auth(), None);

    submit(&sample_record(), &endpoint).unwrap();

    let checkins = server.checkins();
    assert_eq!(checkins[0].authorization.as_deref(), Some("Basic eDp5"));
    assert_eq!(
        checkins[0].basic_auth,
        Some(("x".to_string(), "y".to_string()))
    );
}

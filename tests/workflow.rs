//! The full challenge workflow: register an account, present and clean up values over HTTP,
//! and check what the DNS server answers after each step.

use acmetxt::api::{router, AppState};
use acmetxt::config::Config;
use acmetxt::dns::{server, Handler, StaticHandler};
use acmetxt::storage::{self, DynStorage, StorageConfig};
use acmetxt::Metrics;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use std::io;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;
use trust_dns_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use trust_dns_proto::rr::{Name, RData, Record, RecordType};
use trust_dns_proto::serialize::binary::{BinDecodable, BinEncoder};
use trust_dns_server::authority::{MessageRequest, MessageResponse};
use trust_dns_server::server::{Protocol, Request as DnsRequest, RequestHandler, ResponseHandler, ResponseInfo};

const FIRST: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
const SECOND: &str = "LPsIwTo7o8BoG0-vjCyGQGBWSVIPxI-i_X336eUOQZo";
const CHALLENGE: &str = "_acme-challenge.example.org.";

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Option<Message>>>);

#[async_trait::async_trait]
impl ResponseHandler for Capture {
    async fn send_response<'a>(
        &mut self,
        response: MessageResponse<
            '_,
            'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
        >,
    ) -> io::Result<ResponseInfo> {
        let mut bytes = Vec::new();
        let info = {
            let mut encoder = BinEncoder::new(&mut bytes);
            response
                .destructive_emit(&mut encoder)
                .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?
        };
        let message =
            Message::from_vec(&bytes).map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        *self.0.lock().unwrap() = Some(message);
        Ok(info)
    }
}

struct Deployment {
    api: Router,
    dns: Handler<StaticHandler>,
    _dir: TempDir,
}

fn deployment(fallthrough: bool, storage: DynStorage, dir: TempDir) -> Deployment {
    let config = json!({
        "zones": ["example.org"],
        "fallthrough": fallthrough,
        "dns_udp_bind_addr": "127.0.0.1:5353",
        "dns_tcp_bind_addr": "127.0.0.1:5353",
        "api_bind_addr": "127.0.0.1:8080",
        "require_auth": true,
        "enable_registration": true,
        "password_cost": 1,
    });
    let config = Arc::new(Config::from_str(&config.to_string()).unwrap());
    let metrics = Metrics::new().unwrap();
    let fallback = StaticHandler::from_config(&config).unwrap();
    Deployment {
        dns: server::handler(&config, storage.clone(), metrics.clone(), fallback),
        api: router(AppState::new(config, storage, metrics)),
        _dir: dir,
    }
}

async fn open(backend: &str, dir: &TempDir) -> DynStorage {
    let config = match backend {
        "memory" => StorageConfig::Memory,
        "sqlite" => StorageConfig::Sqlite {
            path: dir.path().join("acme.db"),
        },
        _ => StorageConfig::Redb {
            path: dir.path().join("acme.redb"),
            gc_interval: std::time::Duration::from_secs(300),
        },
    };
    storage::open(&config, false).await.unwrap()
}

impl Deployment {
    async fn post(&self, uri: &str, headers: &[(&str, String)], body: Value) -> (StatusCode, Value) {
        let mut builder = Request::builder().method("POST").uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, value.as_str());
        }
        let mut request = builder.body(Body::from(body.to_string())).unwrap();
        let peer: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));

        let response = self.api.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn txt(&self, name: &str) -> Message {
        let mut message = Message::new();
        message
            .set_id(7)
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .add_query(Query::query(Name::from_ascii(name).unwrap(), RecordType::TXT));
        let bytes = message.to_vec().unwrap();
        let request = DnsRequest::new(
            MessageRequest::from_bytes(&bytes).unwrap(),
            "127.0.0.1:53000".parse().unwrap(),
            Protocol::Udp,
        );
        let capture = Capture::default();
        self.dns.handle_request(&request, capture.clone()).await;
        let response = capture.0.lock().unwrap().clone();
        response.unwrap()
    }
}

fn values(message: &Message) -> Vec<String> {
    message
        .answers()
        .iter()
        .filter_map(|record| match record.data() {
            Some(RData::TXT(txt)) => Some(
                txt.txt_data()
                    .iter()
                    .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
                    .collect(),
            ),
            _ => None,
        })
        .collect()
}

fn basic(username: &str, password: &str) -> Vec<(&'static str, String)> {
    let encoded = STANDARD.encode(format!("{username}:{password}"));
    vec![("authorization", format!("Basic {encoded}"))]
}

fn record(value: &str) -> Value {
    json!({"fqdn": CHALLENGE, "value": value})
}

#[tokio::test]
async fn challenge_lifecycle() {
    for backend in ["memory", "sqlite", "redb"] {
        let dir = tempfile::tempdir().unwrap();
        let storage = open(backend, &dir).await;
        let deployment = deployment(false, storage.clone(), dir);

        let (status, _) = deployment
            .post(
                "/register",
                &[],
                json!({"username": "alice", "password": "secret", "zone": "example.org."}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{backend}");
        let alice = basic("alice", "secret");

        let (status, _) = deployment.post("/present", &alice, record(FIRST)).await;
        assert_eq!(status, StatusCode::OK, "{backend}");
        let response = deployment.txt(CHALLENGE).await;
        assert_eq!(response.response_code(), ResponseCode::NoError, "{backend}");
        assert!(response.authoritative(), "{backend}");
        assert_eq!(values(&response), vec![FIRST], "{backend}");

        let (status, _) = deployment.post("/present", &alice, record(SECOND)).await;
        assert_eq!(status, StatusCode::OK, "{backend}");
        let mut answered = values(&deployment.txt(CHALLENGE).await);
        answered.sort();
        assert_eq!(answered, vec![FIRST, SECOND], "{backend}");

        let (status, _) = deployment.post("/cleanup", &alice, record(FIRST)).await;
        assert_eq!(status, StatusCode::OK, "{backend}");
        assert_eq!(values(&deployment.txt(CHALLENGE).await), vec![SECOND], "{backend}");

        let (status, _) = deployment.post("/cleanup", &alice, record(SECOND)).await;
        assert_eq!(status, StatusCode::OK, "{backend}");
        let response = deployment.txt(CHALLENGE).await;
        assert_eq!(response.response_code(), ResponseCode::NXDomain, "{backend}");
        assert!(response.answers().is_empty(), "{backend}");

        storage.close().await.unwrap();
    }
}

#[tokio::test]
async fn missing_records_fall_through() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open("memory", &dir).await;
    let deployment = deployment(true, storage, dir);

    // Forwarded to the static records, which don't know the name either.
    let response = deployment.txt(CHALLENGE).await;
    assert_eq!(response.response_code(), ResponseCode::NXDomain);

    let response = deployment.txt("_acme-challenge.example.com.").await;
    assert_eq!(response.response_code(), ResponseCode::Refused);
}

#[tokio::test]
async fn rejected_writes_change_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open("sqlite", &dir).await;
    let deployment = deployment(false, storage.clone(), dir);

    for (username, allowfrom) in [("alice", json!([])), ("bob", json!(["10.0.0.0/8"]))] {
        let (status, _) = deployment
            .post(
                "/register",
                &[],
                json!({
                    "username": username,
                    "password": "secret",
                    "zone": "example.org",
                    "allowfrom": allowfrom,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = deployment
        .post("/present", &basic("alice", "wrong"), record(FIRST))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"error": "unauthorized"}));

    // Requests come from 127.0.0.1, outside bob's allow-list.
    let (status, body) = deployment
        .post("/present", &basic("bob", "secret"), record(FIRST))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({"error": "forbidden_ip"}));

    assert_eq!(
        deployment.txt(CHALLENGE).await.response_code(),
        ResponseCode::NXDomain
    );
    storage.close().await.unwrap();
}

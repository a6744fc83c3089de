//! Shared helpers for integration tests: synthetic captures and a stub
//! Elasticsearch server.

#![allow(dead_code)]

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use etherparse::PacketBuilder;
use pcap_file::pcap::{PcapHeader, PcapPacket, PcapWriter};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const SRC_MAC: [u8; 6] = [2, 0, 0, 0, 0, 1];
const DST_MAC: [u8; 6] = [2, 0, 0, 0, 0, 2];

/// TCP 10.0.0.1:1234 → 10.0.0.2:80 (100 bytes), UDP 10.0.0.1:5353 →
/// 10.0.0.3:53 (64 bytes), unknown ethertype (40 bytes)
pub fn mixed_capture() -> Vec<u8> {
    let tcp = PacketBuilder::ethernet2(SRC_MAC, DST_MAC)
        .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
        .tcp(1234, 80, 1, 65535);
    let mut tcp_frame = Vec::new();
    tcp.write(&mut tcp_frame, &[0u8; 46]).unwrap();

    let udp = PacketBuilder::ethernet2(SRC_MAC, DST_MAC)
        .ipv4([10, 0, 0, 1], [10, 0, 0, 3], 64)
        .udp(5353, 53);
    let mut udp_frame = Vec::new();
    udp.write(&mut udp_frame, &[0u8; 22]).unwrap();

    let mut opaque = Vec::new();
    opaque.extend_from_slice(&DST_MAC);
    opaque.extend_from_slice(&SRC_MAC);
    opaque.extend_from_slice(&[0x88, 0xb5]);
    opaque.resize(40, 0);

    assert_eq!((tcp_frame.len(), udp_frame.len()), (100, 64));
    pcap(&[tcp_frame, udp_frame, opaque])
}

/// In-memory Ethernet pcap with one-second spaced timestamps
pub fn pcap(frames: &[Vec<u8>]) -> Vec<u8> {
    let mut writer = PcapWriter::with_header(Vec::new(), PcapHeader::default()).unwrap();
    for (i, frame) in frames.iter().enumerate() {
        let timestamp = Duration::from_secs(1_700_000_000 + i as u64);
        writer.write_packet(&PcapPacket::new(timestamp, frame.len() as u32, frame)).unwrap();
    }
    writer.into_writer()
}

/// How the stub answers document writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubMode {
    Healthy,
    /// Answer every write with 503
    Unavailable,
    /// Answer every write with 400
    BadRequest,
    /// Accept bulk requests but reject every second document
    RejectOdd,
    /// Answer bulk requests with 200 and a body that is not JSON
    GarbledBulk,
}

/// Request the stub received
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub path: String,
    pub authorization: Option<String>,
    pub body: String,
}

#[derive(Clone)]
struct StubState {
    mode: StubMode,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
    writes: Arc<AtomicUsize>,
}

impl StubState {
    fn remember(&self, path: String, headers: &HeaderMap, body: &Bytes) {
        let authorization = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.seen.lock().unwrap().push(SeenRequest {
            path,
            authorization,
            body: String::from_utf8_lossy(body).into_owned(),
        });
    }

    fn failure(&self) -> Option<(StatusCode, Json<Value>)> {
        match self.mode {
            StubMode::Unavailable => Some((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": { "reason": "cluster unavailable" }, "status": 503 })),
            )),
            StubMode::BadRequest => Some((
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": { "reason": "invalid index name" }, "status": 400 })),
            )),
            _ => None,
        }
    }
}

async fn root() -> Json<Value> {
    Json(json!({ "name": "stub", "version": { "number": "8.11.0" } }))
}

async fn index_doc(
    State(state): State<StubState>,
    Path(index): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    state.writes.fetch_add(1, Ordering::SeqCst);
    state.remember(format!("/{}/_doc", index), &headers, &body);
    if let Some(failure) = state.failure() {
        return failure;
    }
    (StatusCode::CREATED, Json(json!({ "_index": index, "result": "created" })))
}

async fn bulk(State(state): State<StubState>, headers: HeaderMap, body: Bytes) -> Response {
    state.writes.fetch_add(1, Ordering::SeqCst);
    state.remember("/_bulk".to_string(), &headers, &body);
    if let Some(failure) = state.failure() {
        return failure.into_response();
    }
    if state.mode == StubMode::GarbledBulk {
        return (StatusCode::OK, "<html>upstream proxy</html>").into_response();
    }

    let text = String::from_utf8_lossy(&body);
    let documents = text.lines().filter(|l| !l.is_empty()).count() / 2;
    let items: Vec<Value> = (0..documents)
        .map(|i| {
            if state.mode == StubMode::RejectOdd && i % 2 == 1 {
                json!({ "index": { "status": 400, "error": { "reason": "mapper_parsing_exception" } } })
            } else {
                json!({ "index": { "status": 201, "result": "created" } })
            }
        })
        .collect();
    let errors = items.iter().any(|item| item["index"]["status"] != 201);

    (StatusCode::OK, Json(json!({ "took": 1, "errors": errors, "items": items }))).into_response()
}

/// Elasticsearch stand-in bound to an ephemeral localhost port
pub struct StubElastic {
    pub addr: SocketAddr,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
    writes: Arc<AtomicUsize>,
    cancel: CancellationToken,
}

impl StubElastic {
    pub async fn start(mode: StubMode) -> Self {
        let state = StubState {
            mode,
            seen: Arc::new(Mutex::new(Vec::new())),
            writes: Arc::new(AtomicUsize::new(0)),
        };
        let seen = Arc::clone(&state.seen);
        let writes = Arc::clone(&state.writes);

        let app = Router::new()
            .route("/", get(root))
            .route("/_bulk", post(bulk))
            .route("/{index}/_doc", post(index_doc))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
                .unwrap();
        });

        Self { addr, seen, writes, cancel }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }

    /// Number of `_doc` and `_bulk` requests received
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Documents carried by every write request, in arrival order
    pub fn documents(&self) -> Vec<Value> {
        self.seen()
            .iter()
            .flat_map(|req| {
                let lines: Vec<Value> = req
                    .body
                    .lines()
                    .filter(|l| !l.is_empty())
                    .map(|l| serde_json::from_str(l).unwrap())
                    .collect();
                if req.path == "/_bulk" {
                    lines.into_iter().skip(1).step_by(2).collect::<Vec<_>>()
                } else {
                    lines
                }
            })
            .collect()
    }
}

impl Drop for StubElastic {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

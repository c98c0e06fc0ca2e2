// Integration tests for the remote upload API client, run against a stub server

use anyhow::Result;
use axum::body::Bytes as Body;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{post, put};
use axum::{Json, Router};
use bytes::Bytes;
use recording_uploader::upload::http::{
    CompleteUploadRequest, CompleteUploadResponse, InitUploadRequest, InitUploadResponse,
};
use recording_uploader::{HttpTransport, RecordingKind, UploadPart, UploadTarget, UploadTransport};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use uuid::Uuid;

#[derive(Clone, Default)]
struct Stub {
    log: Arc<Mutex<Vec<String>>>,
    reject_part: Option<u32>,
}

impl Stub {
    fn push(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }

    fn entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

async fn init(stub: &Stub, mode: &str, req: InitUploadRequest) -> Json<InitUploadResponse> {
    stub.push(format!("init {} {}", mode, req.key));
    Json(InitUploadResponse {
        upload_id: format!("{}-1", mode),
    })
}

async fn init_multipart(
    State(stub): State<Stub>,
    Json(req): Json<InitUploadRequest>,
) -> Json<InitUploadResponse> {
    init(&stub, "multipart", req).await
}

async fn init_direct(
    State(stub): State<Stub>,
    Json(req): Json<InitUploadRequest>,
) -> Json<InitUploadResponse> {
    init(&stub, "direct", req).await
}

async fn part(
    State(stub): State<Stub>,
    Path((id, number)): Path<(String, u32)>,
    body: Body,
) -> StatusCode {
    if stub.reject_part == Some(number) {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    stub.push(format!("part {} {} {}", id, number, body.len()));
    StatusCode::OK
}

async fn direct(State(stub): State<Stub>, Path(id): Path<String>, body: Body) -> StatusCode {
    stub.push(format!("direct {} {}", id, body.len()));
    StatusCode::OK
}

async fn complete(
    stub: &Stub,
    mode: &str,
    id: String,
    req: CompleteUploadRequest,
) -> Json<CompleteUploadResponse> {
    stub.push(format!(
        "complete {} {} {} {:?}",
        mode, id, req.total_size, req.parts
    ));
    Json(CompleteUploadResponse {
        url: Some(format!("https://cdn.test/{}", id)),
    })
}

async fn complete_multipart(
    State(stub): State<Stub>,
    Path(id): Path<String>,
    Json(req): Json<CompleteUploadRequest>,
) -> Json<CompleteUploadResponse> {
    complete(&stub, "multipart", id, req).await
}

async fn complete_direct(
    State(stub): State<Stub>,
    Path(id): Path<String>,
    Json(req): Json<CompleteUploadRequest>,
) -> Json<CompleteUploadResponse> {
    complete(&stub, "direct", id, req).await
}

async fn serve(stub: Stub) -> String {
    let app = Router::new()
        .route("/uploads/multipart", post(init_multipart))
        .route("/uploads/direct", post(init_direct))
        .route("/uploads/multipart/:id/parts/:number", put(part))
        .route("/uploads/multipart/:id/complete", post(complete_multipart))
        .route("/uploads/direct/:id", put(direct))
        .route("/uploads/direct/:id/complete", post(complete_direct))
        .with_state(stub);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}/", addr)
}

fn target() -> UploadTarget {
    UploadTarget {
        recording_id: Uuid::new_v4(),
        kind: RecordingKind::Screen,
    }
}

#[tokio::test]
async fn test_multipart_upload_round() -> Result<()> {
    let stub = Stub::default();
    let transport = HttpTransport::new(serve(stub.clone()).await);
    let target = target();

    transport.init_multipart(&target).await?;
    transport
        .upload_part(&UploadPart::new(1, Bytes::from(vec![1u8; 8])))
        .await?;
    transport
        .upload_part(&UploadPart::new(2, Bytes::from(vec![2u8; 3])))
        .await?;
    transport.set_total_size(11);

    let url = transport.complete().await?;

    assert_eq!(url.as_deref(), Some("https://cdn.test/multipart-1"));
    assert_eq!(
        stub.entries(),
        vec![
            format!("init multipart {}", target.key()),
            "part multipart-1 1 8".to_string(),
            "part multipart-1 2 3".to_string(),
            "complete multipart multipart-1 11 Some(2)".to_string(),
        ]
    );

    Ok(())
}

#[tokio::test]
async fn test_direct_upload_round() -> Result<()> {
    let stub = Stub::default();
    let transport = HttpTransport::new(serve(stub.clone()).await);
    let target = target();

    transport.init_direct(&target).await?;
    transport.upload_direct(Bytes::from_static(b"short")).await?;
    transport.set_total_size(5);

    let url = transport.complete().await?;

    assert_eq!(url.as_deref(), Some("https://cdn.test/direct-1"));
    assert_eq!(
        stub.entries(),
        vec![
            format!("init direct {}", target.key()),
            "direct direct-1 5".to_string(),
            "complete direct direct-1 5 None".to_string(),
        ]
    );

    Ok(())
}

#[tokio::test]
async fn test_bytes_sent_are_reported_while_parts_stream() -> Result<()> {
    let stub = Stub::default();
    let transport = HttpTransport::new(serve(stub.clone()).await);

    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reports);
    transport.set_progress_callback(Some(Arc::new(move |sent: u64| {
        sink.lock().unwrap().push(sent);
    })));

    transport.init_multipart(&target()).await?;
    transport
        .upload_part(&UploadPart::new(1, Bytes::from(vec![7u8; 200 * 1024])))
        .await?;
    transport
        .upload_part(&UploadPart::new(2, Bytes::from(vec![8u8; 10])))
        .await?;

    let reports = reports.lock().unwrap().clone();
    assert!(reports.len() > 2, "{:?}", reports);
    assert!(reports.windows(2).all(|w| w[0] < w[1]), "{:?}", reports);
    assert_eq!(reports.last(), Some(&(200 * 1024 + 10)));
    // The server still receives every byte
    assert_eq!(
        stub.entries()[1..].to_vec(),
        vec![
            "part multipart-1 1 204800".to_string(),
            "part multipart-1 2 10".to_string(),
        ]
    );

    Ok(())
}

#[tokio::test]
async fn test_byte_count_restarts_with_each_upload() -> Result<()> {
    let transport = HttpTransport::new(serve(Stub::default()).await);

    let last = Arc::new(AtomicU64::new(0));
    let sink = Arc::clone(&last);
    transport.set_progress_callback(Some(Arc::new(move |sent: u64| {
        sink.store(sent, Ordering::SeqCst);
    })));

    transport.init_direct(&target()).await?;
    transport.upload_direct(Bytes::from(vec![1u8; 300])).await?;
    assert_eq!(last.load(Ordering::SeqCst), 300);

    transport.init_direct(&target()).await?;
    transport.upload_direct(Bytes::from(vec![1u8; 40])).await?;
    assert_eq!(last.load(Ordering::SeqCst), 40);

    Ok(())
}

#[tokio::test]
async fn test_rejected_part_is_an_error() -> Result<()> {
    let stub = Stub {
        reject_part: Some(2),
        ..Stub::default()
    };
    let transport = HttpTransport::new(serve(stub.clone()).await);

    transport.init_multipart(&target()).await?;
    transport
        .upload_part(&UploadPart::new(1, Bytes::from_static(b"ok")))
        .await?;
    let err = transport
        .upload_part(&UploadPart::new(2, Bytes::from_static(b"no")))
        .await
        .unwrap_err();

    assert!(format!("{:#}", err).contains("503"), "{:#}", err);

    Ok(())
}

#[tokio::test]
async fn test_calls_without_upload_are_rejected() {
    let transport = HttpTransport::new("http://127.0.0.1:9");

    assert!(transport
        .upload_part(&UploadPart::new(1, Bytes::from_static(b"x")))
        .await
        .is_err());
    assert!(transport.upload_direct(Bytes::from_static(b"x")).await.is_err());
    assert!(transport.complete().await.is_err());
}

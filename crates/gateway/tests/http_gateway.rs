use cryptopay_core::{PaymentError, PaymentStatus, SupportedCurrency};
use gateway::http::HttpGateway;
use gateway::{CheckPaymentRequest, CreatePaymentRequest, PaymentGateway};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Answers exactly one HTTP request with `status` and `body`, returning the raw request.
async fn serve_once(status: &'static str, body: &'static str) -> (SocketAddr, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);
            if request_complete(&raw) {
                break;
            }
        }

        let response = format!(
            "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        String::from_utf8_lossy(&raw).to_string()
    });

    (addr, handle)
}

fn request_complete(raw: &[u8]) -> bool {
    let text = String::from_utf8_lossy(raw);
    let Some(header_end) = text.find("\r\n\r\n") else {
        return false;
    };
    let content_length = text[..header_end]
        .lines()
        .find_map(|l| {
            let (name, value) = l.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    raw.len() >= header_end + 4 + content_length
}

fn gateway(addr: SocketAddr) -> std::sync::Arc<HttpGateway> {
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    HttpGateway::with_client(format!("http://{}/api", addr), client)
}

#[tokio::test]
async fn create_posts_amount_and_currency() {
    let (addr, server) = serve_once(
        "200 OK",
        r#"{"id":"pay_1","address":"0xabc","currency":"ETH","amount":0.0333,"expiresAt":"2030-01-01T00:30:00Z"}"#,
    )
    .await;

    let intent = gateway(addr)
        .create_payment(&CreatePaymentRequest {
            amount: 0.0333,
            currency: SupportedCurrency::Eth,
        })
        .await
        .unwrap();

    assert_eq!(intent.id, "pay_1");
    assert_eq!(intent.address, "0xabc");
    assert!(intent.expires_at.is_some());

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /api/payment/create"));
    assert!(request.contains(r#""currency":"ETH""#));
}

#[tokio::test]
async fn check_maps_response_to_status() {
    let (addr, server) = serve_once(
        "200 OK",
        r#"{"isReceived":true,"status":"completed","txHash":"0xdead","confirmations":2}"#,
    )
    .await;

    let resp = gateway(addr)
        .check_payment(&CheckPaymentRequest {
            address: "0xabc".into(),
            currency: SupportedCurrency::Eth,
            expected_amount: 0.0333,
        })
        .await
        .unwrap();

    let status = PaymentStatus::from(resp);
    assert!(status.is_confirmed());
    assert_eq!(status.tx_hash(), Some("0xdead"));

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /api/payment/check"));
    assert!(request.contains(r#""expectedAmount":0.0333"#));
}

#[tokio::test]
async fn non_success_is_backend_rejection() {
    let (addr, server) = serve_once("503 Service Unavailable", r#"{"error":"down"}"#).await;

    let err = gateway(addr)
        .create_payment(&CreatePaymentRequest {
            amount: 1.0,
            currency: SupportedCurrency::Usdc,
        })
        .await
        .unwrap_err();

    assert_eq!(
        err,
        PaymentError::BackendRejected {
            status: 503,
            body: r#"{"error":"down"}"#.to_string()
        }
    );
    server.await.unwrap();
}

#[tokio::test]
async fn too_many_requests_is_rate_limited() {
    let (addr, server) = serve_once("429 Too Many Requests", r#"{"error":"slow down"}"#).await;

    let err = gateway(addr)
        .check_payment(&CheckPaymentRequest {
            address: "0xabc".into(),
            currency: SupportedCurrency::Eth,
            expected_amount: 0.1,
        })
        .await
        .unwrap_err();

    assert_eq!(err, PaymentError::RateLimited);
    assert!(err.is_transient());
    server.await.unwrap();
}

#[tokio::test]
async fn malformed_body_is_invalid_response() {
    let (addr, server) = serve_once("200 OK", r#"{"unexpected":true}"#).await;

    let err = gateway(addr)
        .check_payment(&CheckPaymentRequest {
            address: "0xabc".into(),
            currency: SupportedCurrency::Btc,
            expected_amount: 0.001,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, PaymentError::InvalidResponse(_)), "{err:?}");
    server.await.unwrap();
}

#[tokio::test]
async fn unreachable_service_is_network_error() {
    // bind then drop to get a port with nothing listening
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = gateway(addr)
        .check_payment(&CheckPaymentRequest {
            address: "0xabc".into(),
            currency: SupportedCurrency::Eth,
            expected_amount: 0.1,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, PaymentError::Network(_)), "{err:?}");
}

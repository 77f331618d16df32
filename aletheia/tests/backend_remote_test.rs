use aletheia::backend::remote::RemoteBackend;
use aletheia::backend::{AnalysisBackend, ImageUpload};
use mockito::Matcher;

const VERDICT_BODY: &str = r#"{
    "is_misinformation": true,
    "confidence": 0.91,
    "is_news": true,
    "summary": "The quoted statistic does not appear in the cited report.",
    "evidence": ["Report published 2023 says otherwise", "No matching press release"],
    "sources_checked": ["who.int", "reuters.com"],
    "recommendation": "Check the original report before sharing.",
    "extracted_text": null,
    "image_description": null,
    "message_type": "text"
}"#;

#[tokio::test]
async fn analyze_text_posts_json() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("POST", "/analyze/text")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(serde_json::json!({
            "text": "WHO says 90% of adults are infected"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(VERDICT_BODY)
        .create_async()
        .await;

    let backend = RemoteBackend::new(server.url());
    let verdict = backend
        .analyze_text("WHO says 90% of adults are infected")
        .await
        .expect("verdict");

    assert!(verdict.is_misinformation);
    assert!(verdict.is_news);
    assert_eq!(verdict.confidence, 0.91);
    assert_eq!(verdict.evidence.len(), 2);
    assert_eq!(verdict.sources_checked[1], "reuters.com");
    assert!(verdict.extracted_text.is_none());

    mock.assert_async().await;
}

#[tokio::test]
async fn trailing_slash_in_base_url_is_ignored() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/analyze/text")
        .with_status(200)
        .with_body(VERDICT_BODY)
        .create_async()
        .await;

    let backend = RemoteBackend::new(format!("{}/", server.url()));
    assert!(backend.analyze_text("some headline to check").await.is_ok());
    mock.assert_async().await;
}

#[tokio::test]
async fn analyze_image_uploads_multipart_file() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("POST", "/analyze/image")
        .match_header("content-type", Matcher::Regex("^multipart/form-data; boundary=".into()))
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#"name="file"; filename="image.jpg""#.into()),
            Matcher::Regex("Content-Type: image/gif".into()),
        ]))
        .with_status(200)
        .with_body(
            r#"{"is_misinformation": false, "confidence": 0.2, "is_news": true,
                "extracted_text": "SALE 50% OFF", "image_description": "a shop poster",
                "message_type": "image"}"#,
        )
        .create_async()
        .await;

    let backend = RemoteBackend::new(server.url());
    let verdict = backend
        .analyze_image(ImageUpload {
            data: b"GIF89a-rest-of-image".to_vec(),
            mime_type: Some("image/gif".into()),
        })
        .await
        .expect("verdict");

    assert_eq!(verdict.message_type, "image");
    assert_eq!(verdict.extracted_text.as_deref(), Some("SALE 50% OFF"));
    assert!(verdict.summary.is_empty());

    mock.assert_async().await;
}

#[tokio::test]
async fn non_200_is_an_error() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("POST", "/analyze/text")
        .with_status(422)
        .with_body(r#"{"detail": "field required"}"#)
        .create_async()
        .await;

    let backend = RemoteBackend::new(server.url());
    let err = backend.analyze_text("anything at all here").await.unwrap_err();
    assert!(err.to_string().contains("422"));

    mock.assert_async().await;
}

#[tokio::test]
async fn malformed_body_is_an_error() {
    let mut server = mockito::Server::new_async().await;

    let _mock = server
        .mock("POST", "/analyze/text")
        .with_status(200)
        .with_body("<html>proxy page</html>")
        .create_async()
        .await;

    let backend = RemoteBackend::new(server.url());
    let err = backend.analyze_text("anything at all here").await.unwrap_err();
    assert!(err.to_string().contains("decode"));
}

#[tokio::test]
async fn unreachable_backend_is_an_error() {
    // Nothing listens on port 9 (discard) in the test environment
    let backend = RemoteBackend::new("http://127.0.0.1:9");
    let err = backend.analyze_text("anything at all here").await.unwrap_err();
    assert!(err.to_string().contains("failed to call backend"));
}

#[tokio::test]
async fn configured_timeout_applies() {
    let mut server = mockito::Server::new_async().await;

    let _mock = server
        .mock("POST", "/analyze/text")
        .with_status(200)
        .with_chunked_body(|w| {
            std::thread::sleep(std::time::Duration::from_secs(3));
            w.write_all(b"too late")
        })
        .create_async()
        .await;

    let backend = RemoteBackend::new(server.url()).with_timeout(Some(1));
    let err = backend.analyze_text("anything at all here").await.unwrap_err();
    assert!(err.to_string().contains("timed out"));
}

#[tokio::test]
async fn startup_probe_reports_reachable_backend() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/")
        .with_status(200)
        .with_body(r#"{"message": "Aletheia API is running"}"#)
        .create_async()
        .await;

    assert!(RemoteBackend::new(server.url()).check_reachable().await);
    mock.assert_async().await;
}

#[tokio::test]
async fn startup_probe_gives_up_on_a_silent_backend() {
    // Accepts connections and never answers
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let holder = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    // No request timeout configured: only the probe's own bound applies
    let backend = RemoteBackend::new(format!("http://{}", addr));
    let reachable = tokio::time::timeout(std::time::Duration::from_secs(15), backend.check_reachable())
        .await
        .expect("probe must not hang");
    assert!(!reachable);

    holder.abort();
}

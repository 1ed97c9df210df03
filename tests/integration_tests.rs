mod test_helpers;

use std::time::Duration;

use comfy_prompt::*;
use serde_json::json;
use test_helpers::{executed, executed_for, png_bytes, progress, FakeComfy, Reply, CLOSE};

fn generator_for(server: &FakeComfy) -> Generator {
    let config = GeneratorConfig::builder()
        .with_base_url(server.base_url.clone())
        .build();
    Generator::new(config).unwrap()
}

// --- Happy path ---

#[tokio::test]
async fn test_completion_resolves_image_url() {
    let server = FakeComfy::start(Reply::Accept, vec![executed("9", "a.png")]).await;
    let mut generator = generator_for(&server);

    let result = generator
        .generate(&GenerationParameters::new("a red fox"))
        .await
        .unwrap();

    assert!(result.image_url.contains("filename=a.png"));
    assert!(result.image_url.starts_with(&server.base_url));
    assert_eq!(result.image.filename, "a.png");
    assert_eq!(result.prompt_id.as_deref(), Some("prompt-1"));
    assert!(matches!(generator.status(), GenerationStatus::Completed(r) if *r == result));
}

#[tokio::test]
async fn test_submission_carries_workflow_and_session() {
    let server = FakeComfy::start(Reply::Accept, vec![executed("9", "a.png")]).await;
    let mut generator = generator_for(&server);

    let result = generator
        .generate(&GenerationParameters::new("a red fox").seed(777))
        .await
        .unwrap();
    assert_eq!(result.seed, 777);

    let prompts = server.prompts();
    assert_eq!(prompts.len(), 1);
    let body = &prompts[0];
    assert_eq!(body["prompt"]["6"]["inputs"]["text"], "a red fox");
    assert_eq!(body["prompt"]["3"]["inputs"]["seed"], 777);
    assert_eq!(body["prompt"]["9"]["class_type"], "SaveImage");

    let client_id = body["client_id"].as_str().unwrap();
    assert_eq!(client_id, generator.client().session().as_str());
    assert_eq!(server.ws_clients(), vec![client_id.to_string()]);
}

#[tokio::test]
async fn test_random_seed_is_reported() {
    let server = FakeComfy::start(Reply::Accept, vec![executed("9", "a.png")]).await;
    let mut generator = generator_for(&server);

    let result = generator
        .generate(&GenerationParameters::new("a red fox"))
        .await
        .unwrap();

    let sent = server.prompts()[0]["prompt"]["3"]["inputs"]["seed"].as_i64().unwrap();
    assert_eq!(sent, result.seed);
    assert!((0..workflow::MAX_RANDOM_SEED).contains(&sent));
}

#[tokio::test]
async fn test_updates_follow_the_state_machine() {
    let server = FakeComfy::start(
        Reply::Accept,
        vec![progress(1, 2), progress(2, 2), executed("9", "a.png")],
    )
    .await;
    let mut generator = generator_for(&server);

    let mut seen = Vec::new();
    generator
        .generate_with_updates(&GenerationParameters::new("a red fox"), |status| {
            seen.push(status.to_string())
        })
        .await
        .unwrap();

    assert_eq!(seen[0], "Submitting workflow...");
    assert_eq!(seen[1], "Generating...");
    assert!(seen.contains(&"Generating: step 1/2 (50%)".to_string()));
    assert!(seen.contains(&"Generating: step 2/2 (100%)".to_string()));
    assert!(seen.last().unwrap().starts_with("Image ready: "));
}

#[tokio::test]
async fn test_channel_reused_across_generations() {
    let server = FakeComfy::start(Reply::Accept, vec![executed("9", "a.png")]).await;
    let mut generator = generator_for(&server);

    for prompt in ["first", "second", "third"] {
        generator
            .generate(&GenerationParameters::new(prompt))
            .await
            .unwrap();
    }

    assert_eq!(server.prompts().len(), 3);
    assert_eq!(server.ws_clients().len(), 1);
}

#[tokio::test]
async fn test_save_downloads_image() {
    let server = FakeComfy::start(Reply::Accept, vec![executed("9", "a.png")]).await;
    let mut generator = generator_for(&server);
    let dir = tempfile::tempdir().unwrap();

    let result = generator
        .generate(&GenerationParameters::new("a red fox"))
        .await
        .unwrap();
    let path = generator.save(&result, dir.path()).await.unwrap();

    assert_eq!(path, dir.path().join(&result.download_name));
    assert_eq!(std::fs::read(&path).unwrap(), png_bytes());
}

#[tokio::test]
async fn test_health() {
    let server = FakeComfy::start(Reply::Accept, vec![]).await;
    let generator = generator_for(&server);
    assert!(generator.client().health().await.unwrap());
}

// --- Ignored notifications ---

#[tokio::test]
async fn test_other_nodes_do_not_complete() {
    let no_images = json!({"type": "executed", "data": {"node": "9", "output": {"images": []}}});
    let no_output = json!({"type": "executed", "data": {"node": "9"}});
    let server = FakeComfy::start(
        Reply::Accept,
        vec![
            executed("12", "preview.png"),
            no_images.to_string(),
            no_output.to_string(),
        ],
    )
    .await;
    let mut generator = generator_for(&server);

    let pending = tokio::time::timeout(
        Duration::from_millis(300),
        generator.generate(&GenerationParameters::new("a red fox")),
    )
    .await;

    assert!(pending.is_err(), "generation should still be waiting");
    assert!(matches!(
        generator.status(),
        GenerationStatus::AwaitingCompletion { .. }
    ));
}

#[tokio::test]
async fn test_abandoned_prompt_does_not_resolve_the_next() {
    let server = FakeComfy::start(Reply::Accept, vec![]).await;
    let mut generator = generator_for(&server);

    let abandoned = tokio::time::timeout(
        Duration::from_millis(200),
        generator.generate(&GenerationParameters::new("first").seed(1)),
    )
    .await;
    assert!(abandoned.is_err());

    // The first job finishes while the second one is being submitted.
    server.set_script(
        Reply::Accept,
        vec![
            executed_for("prompt-1", "9", "old-job.png"),
            executed("9", "new-job.png"),
        ],
    );
    let result = generator
        .generate(&GenerationParameters::new("second").seed(2))
        .await
        .unwrap();

    assert_eq!(result.image.filename, "new-job.png");
    assert_eq!(result.prompt_id.as_deref(), Some("prompt-2"));
    assert_eq!(result.seed, 2);
}

#[tokio::test]
async fn test_untagged_completion_still_resolves() {
    let untagged = json!({
        "type": "executed",
        "data": {"node": "9", "output": {"images": [{"filename": "a.png", "subfolder": "", "type": "output"}]}}
    });
    let server = FakeComfy::start(Reply::Accept, vec![untagged.to_string()]).await;
    let mut generator = generator_for(&server);

    let result = generator
        .generate(&GenerationParameters::new("a red fox"))
        .await
        .unwrap();
    assert_eq!(result.image.filename, "a.png");
}

// --- Failures ---

#[tokio::test]
async fn test_http_error_fails_with_status_and_body() {
    let server = FakeComfy::start(Reply::Status(500, "out of memory".into()), vec![]).await;
    let mut generator = generator_for(&server);

    let err = generator
        .generate(&GenerationParameters::new("a red fox"))
        .await
        .unwrap_err();
    assert!(matches!(err, ComfyError::Http { status: 500, .. }));

    match generator.status() {
        GenerationStatus::Failed(message) => {
            assert!(message.contains("500"));
            assert!(message.contains("out of memory"));
        }
        other => panic!("unexpected status {:?}", other),
    }
    assert!(!generator.state().is_generating());
}

#[tokio::test]
async fn test_error_field_on_success_fails() {
    let server = FakeComfy::start(
        Reply::Body(json!({"error": "Prompt outputs failed validation"})),
        vec![],
    )
    .await;
    let mut generator = generator_for(&server);

    let err = generator
        .generate(&GenerationParameters::new("a red fox"))
        .await
        .unwrap_err();
    assert!(matches!(err, ComfyError::ServerReported(_)));
    assert_eq!(
        generator.status(),
        &GenerationStatus::Failed("Prompt outputs failed validation".into())
    );
}

#[tokio::test]
async fn test_recovers_after_failure() {
    let server = FakeComfy::start(Reply::Status(500, "out of memory".into()), vec![]).await;
    let mut generator = generator_for(&server);

    assert!(generator
        .generate(&GenerationParameters::new("a red fox"))
        .await
        .is_err());

    server.set_script(Reply::Accept, vec![executed("9", "a.png")]);
    let result = generator
        .generate(&GenerationParameters::new("a red fox"))
        .await
        .unwrap();
    assert_eq!(generator.status(), &GenerationStatus::Completed(result));
}

#[tokio::test]
async fn test_blank_prompt_sends_nothing() {
    let server = FakeComfy::start(Reply::Accept, vec![executed("9", "a.png")]).await;
    let mut generator = generator_for(&server);

    let err = generator
        .generate(&GenerationParameters::new("  \n "))
        .await
        .unwrap_err();

    assert!(matches!(err, ComfyError::Validation(_)));
    assert_eq!(generator.status(), &GenerationStatus::Idle);
    assert!(generator.state().validation().is_some());
    assert!(server.prompts().is_empty());
    assert!(server.ws_clients().is_empty());
}

#[tokio::test]
async fn test_connection_error() {
    // Reserve a port, then free it so nothing is listening there.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = GeneratorConfig::builder()
        .with_base_url(format!("http://{}", addr))
        .build();
    let mut generator = Generator::new(config).unwrap();

    let err = generator
        .generate(&GenerationParameters::new("a red fox"))
        .await
        .unwrap_err();
    assert!(matches!(err, ComfyError::Connection { .. }));
    assert!(matches!(generator.status(), GenerationStatus::Failed(_)));
}

#[tokio::test]
async fn test_dropped_channel_fails_then_reconnects() {
    let server = FakeComfy::start(Reply::Accept, vec![CLOSE.to_string()]).await;
    let mut generator = generator_for(&server);

    let err = generator
        .generate(&GenerationParameters::new("a red fox"))
        .await
        .unwrap_err();
    assert!(matches!(err, ComfyError::ChannelClosed));

    server.set_script(Reply::Accept, vec![executed("9", "a.png")]);
    let result = generator
        .generate(&GenerationParameters::new("a red fox"))
        .await
        .unwrap();
    assert!(result.image_url.contains("filename=a.png"));
    assert_eq!(server.ws_clients().len(), 2);
}

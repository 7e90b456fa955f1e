// CLI commands for driving the Praxis session service
use anyhow::{bail, Context, Result};
use praxis_common::types::{ExerciseKind, ExerciseSession, SessionStatus};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::fs;

#[derive(Debug, Deserialize)]
struct SessionResponse {
    session_id: String,
    session: ExerciseSession,
}

fn parse_kind(kind: &str) -> Result<ExerciseKind> {
    match kind.to_lowercase().as_str() {
        "teach" => Ok(ExerciseKind::Teach),
        "quiz" => Ok(ExerciseKind::Quiz),
        "code" => Ok(ExerciseKind::Code),
        "debug" => Ok(ExerciseKind::Debug),
        other => bail!("Invalid kind '{}'. Valid options: teach, quiz, code, debug", other),
    }
}

async fn parse_response(response: reqwest::Response) -> Result<SessionResponse> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("Service returned {}: {}", status, body);
    }
    response
        .json::<SessionResponse>()
        .await
        .context("Failed to parse service response")
}

fn print_session(response: &SessionResponse) {
    let session = &response.session;
    println!("🆔 Session: {}", response.session_id);
    println!("📚 Kind: {}  Topic: {}", session.kind, session.topic.as_deref().unwrap_or("-"));

    if let Some(title) = &session.title {
        println!("📝 {}", title);
    }
    if let Some(description) = &session.description {
        println!("   {}", description);
    }

    match &session.status {
        SessionStatus::Redirecting { view } => println!("🔀 Status: redirecting -> {}", view),
        SessionStatus::FailedToLoad { message } => println!("❌ Status: failed to load ({})", message),
        other => println!("⚙️  Status: {:?}", other),
    }

    if let Some(report) = &session.report {
        println!("📊 Result: {}/{} passed", report.pass_count, report.total);
    }
    if let Some(console) = &session.console {
        println!("\n─── console ───");
        println!("{}", console);
        println!("───────────────");
    }
    if let Some(feedback) = &session.feedback {
        println!("💬 {}", feedback);
    }
    if let Some(warning) = &session.warning {
        println!("⚠️  {}", warning);
    }
    if let Some(fatal) = &session.fatal {
        println!("❌ {}", fatal);
    }
}

/// Open a new exercise session
pub async fn open_session(
    server: &str,
    kind: &str,
    topic: Option<&str>,
    seed: Option<&str>,
) -> Result<()> {
    let kind = parse_kind(kind)?;
    println!("🚀 Opening {} session...", kind);

    let response = Client::new()
        .post(format!("{}/session", server))
        .json(&json!({
            "kind": kind,
            "topic": topic,
            "seed_message": seed,
        }))
        .send()
        .await
        .context("Failed to reach session service")?;

    let parsed = parse_response(response).await?;
    println!("✅ Session opened!");
    print_session(&parsed);
    Ok(())
}

/// Show the current state of a session
pub async fn show_session(server: &str, id: &str) -> Result<()> {
    let response = Client::new()
        .get(format!("{}/session/{}", server, id))
        .send()
        .await
        .context("Failed to reach session service")?;

    let parsed = parse_response(response).await?;
    print_session(&parsed);
    Ok(())
}

/// Run a source file against the session's test cases
pub async fn run_file(server: &str, id: &str, file: &str) -> Result<()> {
    let source_code =
        fs::read_to_string(file).with_context(|| format!("Failed to read {}", file))?;

    println!("🏃 Running {} ({} bytes)...", file, source_code.len());

    let response = Client::new()
        .post(format!("{}/session/{}/run", server, id))
        .json(&json!({ "source_code": source_code }))
        .send()
        .await
        .context("Failed to reach session service")?;

    let parsed = parse_response(response).await?;
    print_session(&parsed);
    Ok(())
}

/// Switch the active phase of a multi-phase coding plan
pub async fn select_phase(server: &str, id: &str, index: usize) -> Result<()> {
    println!("📑 Switching to phase {}...", index);

    let response = Client::new()
        .post(format!("{}/session/{}/phase", server, id))
        .json(&json!({ "index": index }))
        .send()
        .await
        .context("Failed to reach session service")?;

    let parsed = parse_response(response).await?;
    print_session(&parsed);
    Ok(())
}

/// Record a passed quiz
pub async fn quiz_result(server: &str, id: &str, failed: Vec<String>) -> Result<()> {
    println!("🎓 Recording quiz pass ({} failed topic(s))...", failed.len());

    let response = Client::new()
        .post(format!("{}/session/{}/quiz", server, id))
        .json(&json!({ "failed_topics": failed }))
        .send()
        .await
        .context("Failed to reach session service")?;

    let parsed = parse_response(response).await?;
    print_session(&parsed);
    Ok(())
}

/// Submit an explanation for the current debug challenge
pub async fn explain(server: &str, id: &str, text: &str) -> Result<()> {
    println!("🔍 Submitting explanation...");

    let response = Client::new()
        .post(format!("{}/session/{}/explain", server, id))
        .json(&json!({ "explanation": text }))
        .send()
        .await
        .context("Failed to reach session service")?;

    let parsed = parse_response(response).await?;
    print_session(&parsed);
    Ok(())
}

/// Re-trigger a failed engine acquisition
pub async fn retry(server: &str, id: &str) -> Result<()> {
    println!("🔁 Retrying bootstrap...");

    let response = Client::new()
        .post(format!("{}/session/{}/retry", server, id))
        .send()
        .await
        .context("Failed to reach session service")?;

    let parsed = parse_response(response).await?;
    print_session(&parsed);
    Ok(())
}

/// Replace the session with a new exercise
pub async fn navigate(
    server: &str,
    id: &str,
    kind: &str,
    topic: Option<&str>,
    seed: Option<&str>,
) -> Result<()> {
    let kind = parse_kind(kind)?;
    println!("🧭 Navigating to a {} exercise...", kind);

    let response = Client::new()
        .post(format!("{}/session/{}/navigate", server, id))
        .json(&json!({
            "kind": kind,
            "topic": topic,
            "seed_message": seed,
        }))
        .send()
        .await
        .context("Failed to reach session service")?;

    let parsed = parse_response(response).await?;
    print_session(&parsed);
    Ok(())
}

/// Close a session and drop its state
pub async fn close(server: &str, id: &str) -> Result<()> {
    let response = Client::new()
        .delete(format!("{}/session/{}", server, id))
        .send()
        .await
        .context("Failed to reach session service")?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("Service returned {}: {}", status, body);
    }
    println!("🗑️  Session closed");
    Ok(())
}

/// Check service health
pub async fn status(server: &str) -> Result<()> {
    let response = Client::new()
        .get(format!("{}/status", server))
        .send()
        .await
        .context("Failed to reach session service")?;

    let status = response.status();
    let body: serde_json::Value = response.json().await.unwrap_or(json!({}));

    if status.is_success() {
        println!("✅ Service healthy");
        println!(
            "   Engine initialized: {}",
            body["engine_initialized"].as_bool().unwrap_or(false)
        );
        println!("   Open sessions: {}", body["sessions"].as_u64().unwrap_or(0));
    } else {
        bail!("Service unhealthy: {}", status);
    }
    Ok(())
}

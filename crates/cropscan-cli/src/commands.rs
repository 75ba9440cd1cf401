//! Subcommand implementations.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use cropscan_ai_client::AiClient;
use cropscan_backend::{BackendClient, ImageAttachment};
use cropscan_models::{DetectionResult, DiseaseInfo, DiseaseLogRequest, LoginCredentials};
use cropscan_stream::frame::mime_for_path;
use cropscan_stream::{
    channel_consumer, open_source, Decision, DecisionPolicy, SessionEvent, SessionHandle,
    StopReason, StreamConfig,
};

pub async fn health() -> Result<()> {
    let ai = AiClient::from_env()?;
    if ai.health_check().await {
        println!("AI service at {} is ready", ai.config().base_url);
        Ok(())
    } else {
        bail!("AI service at {} is not ready", ai.config().base_url)
    }
}

pub async fn detect(image: &Path) -> Result<()> {
    let ai = AiClient::from_env()?;
    let result = detect_file(&ai, image).await?;
    print_result(&result);
    Ok(())
}

pub async fn stream(frames: &Path, act_above: Option<f64>, max_duration: Option<u64>) -> Result<()> {
    let ai = Arc::new(AiClient::from_env()?);
    let source = open_source(frames).await?;
    let policy = act_above
        .map(DecisionPolicy::ActAbove)
        .unwrap_or(DecisionPolicy::Continue);

    let (consumer, mut events) = channel_consumer(policy);
    let handle = SessionHandle::for_service(ai, source, StreamConfig::from_env(), consumer)?;
    handle.start().await.context("could not start streaming")?;
    println!("Streaming frames from {} (Ctrl-C to stop)", frames.display());

    let deadline = tokio::time::sleep(
        max_duration
            .map(Duration::from_secs)
            .unwrap_or(Duration::MAX),
    );
    tokio::pin!(deadline);

    let mut accepted: Option<DetectionResult> = None;
    let mut stopping = false;
    let reason = loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SessionEvent::Detection { result, decision }) => {
                    print_result(&result);
                    if decision == Decision::Act {
                        accepted = Some(result);
                    }
                }
                Some(SessionEvent::Final(result)) => {
                    println!("Final result:");
                    print_result(&result);
                    accepted = Some(result);
                }
                Some(SessionEvent::Error(e)) => warn!("{}", e),
                Some(SessionEvent::Stopped(reason)) => break reason,
                None => bail!("session ended unexpectedly"),
            },
            _ = tokio::signal::ctrl_c(), if !stopping => {
                info!("Interrupted, stopping stream");
                stopping = true;
                handle.cancel().await;
            }
            _ = &mut deadline, if !stopping => {
                info!("Time limit reached, stopping stream");
                stopping = true;
                handle.stop().await;
            }
        }
    };

    let frames_sent = handle.snapshot().frame_counter;
    println!("Session ended after {} frames: {}", frames_sent, reason);
    if reason.is_failure() {
        bail!("{}", reason);
    }

    if let Some(result) = accepted.filter(|_| {
        matches!(reason, StopReason::FinalResult | StopReason::DetectionAccepted)
    }) {
        let backend = BackendClient::from_env()?;
        match backend.disease_for_detection(&result).await {
            Ok(Some(disease)) => print_disease(&disease),
            Ok(None) => println!("No disease information for this detection"),
            Err(e) => warn!("Disease lookup failed: {}", e),
        }
    }
    Ok(())
}

pub async fn login(username: String, password: String) -> Result<()> {
    let backend = BackendClient::from_env()?;
    backend.initialize().await?;

    let user = backend
        .login(&LoginCredentials { username, password })
        .await
        .context("login failed")?;
    println!("Logged in as {} ({})", user.name, user.role);
    Ok(())
}

pub async fn logout() -> Result<()> {
    BackendClient::from_env()?.logout().await?;
    println!("Logged out");
    Ok(())
}

pub async fn whoami() -> Result<()> {
    match BackendClient::from_env()?.current_user().await? {
        Some(user) => {
            println!("{} (id {}, employee {})", user.name, user.id, user.employee_id);
            println!("role: {}", user.role);
            if let Some(email) = user.email {
                println!("email: {}", email);
            }
        }
        None => println!("Not logged in"),
    }
    Ok(())
}

pub async fn disease(label: &str) -> Result<()> {
    let diseases = BackendClient::from_env()?.disease_by_label(label).await?;
    if diseases.is_empty() {
        println!("No disease registered for label {}", label);
    }
    for disease in &diseases {
        print_disease(disease);
    }
    Ok(())
}

pub async fn report(image: &Path, plot: i64, notes: Option<String>) -> Result<()> {
    let backend = BackendClient::from_env()?;
    let user = backend
        .current_user()
        .await?
        .ok_or_else(|| anyhow!("not logged in; run `cropscan login` first"))?;

    let ai = AiClient::from_env()?;
    let result = detect_file(&ai, image).await?;
    print_result(&result);

    let disease = backend
        .disease_for_detection(&result)
        .await?
        .ok_or_else(|| anyhow!("no known disease matches this image"))?;
    print_disease(&disease);

    let request = DiseaseLogRequest {
        disease_id: disease.id,
        plant_plot_id: plot,
        employee_ids: user.employee_id,
        image_ids: Vec::new(),
        date_report: Utc::now(),
        notes,
    };
    let attachment = ImageAttachment {
        data: tokio::fs::read(image).await?,
        file_name: format!("disease_{}.jpg", Utc::now().timestamp_millis()),
    };

    let record = backend
        .create_disease_log_with_image(request, Some(attachment))
        .await
        .context("could not file disease report")?;
    println!("Filed disease report {}", record.id);
    Ok(())
}

async fn detect_file(ai: &AiClient, image: &Path) -> Result<DetectionResult> {
    let data = tokio::fs::read(image)
        .await
        .with_context(|| format!("failed to read {}", image.display()))?;
    let file_name = image
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("image.jpg");
    let mime = mime_for_path(image).unwrap_or("image/jpeg");

    Ok(ai.detect_image(&data, file_name, mime).await?)
}

fn print_result(result: &DetectionResult) {
    if result.count() == 0 {
        println!("  no detections");
        return;
    }
    for detection in result.items() {
        println!(
            "  {:<16} {:>5.1}%",
            detection.label,
            detection.confidence * 100.0
        );
    }
}

fn print_disease(disease: &DiseaseInfo) {
    println!("{} [{}]", disease.name, disease.label);
    if let Some(name) = &disease.scientific_name {
        println!("  scientific name: {}", name);
    }
    if let Some(category) = &disease.disease_category_name {
        println!("  category: {}", category);
    }
    if let Some(symptoms) = &disease.symptoms {
        println!("  symptoms: {}", symptoms);
    }
    if let Some(treatment) = &disease.treatment_measures {
        println!("  treatment: {}", treatment);
    }
    if let Some(prevention) = &disease.prevention_measures {
        println!("  prevention: {}", prevention);
    }
}

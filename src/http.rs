//! The HTTP control surface.
//!
//! Handlers only ever touch the [`Station`], never the serial link.

use std::sync::Arc;

use actix_files::NamedFile;
use actix_web::{
    http::header::{ContentDisposition, DispositionParam, DispositionType},
    middleware, web, App, HttpResponse, HttpServer,
};
use anyhow::Result;
use chrono::Local;
use serde::Serialize;

use crate::{
    archive,
    core::{config, shutdown::ShutdownHandle},
    station::Station,
};

pub mod error;

pub use error::ApiError;

#[derive(Serialize)]
struct Reading {
    reading: Option<String>,
    timestamp: String,
}

#[derive(Serialize)]
struct Status {
    status: &'static str,
}

#[derive(Serialize)]
struct Files {
    files: Vec<String>,
}

fn status(status: &'static str) -> HttpResponse {
    HttpResponse::Ok().json(Status { status })
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/get_reading", web::get().to(get_reading))
        .route("/start_recording", web::post().to(start_recording))
        .route("/stop_recording", web::post().to(stop_recording))
        .route("/pause_recording", web::post().to(pause_recording))
        .route("/resume_recording", web::post().to(resume_recording))
        .route("/recording_status", web::get().to(recording_status))
        .route("/list_csv_files", web::get().to(list_csv_files))
        // match everything after the prefix, so traversal attempts reach the handler and get rejected there
        .route("/view_csv_file/{filename:.*}", web::get().to(view_csv_file));
}

async fn get_reading(station: web::Data<Station>) -> HttpResponse {
    let reading = station.latest().await;
    HttpResponse::Ok().json(Reading {
        reading,
        timestamp: archive::format_timestamp(&Local::now().naive_local()),
    })
}

async fn start_recording(station: web::Data<Station>) -> Result<HttpResponse, ApiError> {
    station.start_recording().await?;
    Ok(status("recording started"))
}

async fn stop_recording(station: web::Data<Station>) -> HttpResponse {
    station.stop_recording().await;
    status("recording stopped")
}

async fn pause_recording(station: web::Data<Station>) -> Result<HttpResponse, ApiError> {
    station.set_paused(true).await?;
    Ok(status("recording paused"))
}

async fn resume_recording(station: web::Data<Station>) -> Result<HttpResponse, ApiError> {
    station.set_paused(false).await?;
    Ok(status("recording resumed"))
}

async fn recording_status(station: web::Data<Station>) -> HttpResponse {
    HttpResponse::Ok().json(station.recording_status().await)
}

async fn list_csv_files(station: web::Data<Station>) -> Result<HttpResponse, ApiError> {
    let files = station.archive().list().await?;
    Ok(HttpResponse::Ok().json(Files { files }))
}

async fn view_csv_file(
    station: web::Data<Station>,
    filename: web::Path<String>,
) -> Result<NamedFile, ApiError> {
    let filename = filename.into_inner();
    let Some(path) = station.archive().locate(&filename).await else {
        debug!(%filename, "requested file is not a recording");
        return Err(ApiError::NotFound);
    };
    let file = NamedFile::open_async(&path)
        .await
        .map_err(|_| ApiError::NotFound)?;
    Ok(file.set_content_disposition(ContentDisposition {
        disposition: DispositionType::Attachment,
        parameters: vec![DispositionParam::Filename(filename)],
    }))
}

/// Run the HTTP server until shutdown is triggered
pub async fn serve(
    cfg: &config::Http,
    station: Arc<Station>,
    mut shutdown: ShutdownHandle,
) -> Result<()> {
    let data = web::Data::from(station);
    let server = HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(data.clone())
            .configure(routes)
    })
    // ctrl+c is handled by the shutdown handle
    .disable_signals()
    .bind((cfg.host.as_str(), cfg.port))?
    .run();
    info!("HTTP control surface listening on {}:{}", cfg.host, cfg.port);

    let handle = server.handle();
    tokio::spawn(async move {
        shutdown.wait_for_shutdown().await;
        debug!("stopping HTTP server");
        handle.stop(true).await;
    });
    server.await?;
    Ok(())
}

#[cfg(test)]
mod test {
    use std::{path::PathBuf, sync::Arc};

    use actix_web::{
        body::MessageBody,
        dev::ServiceResponse,
        http::{header, StatusCode},
        test::{self, TestRequest},
        web, App,
    };
    use serde_json::Value;
    use tracing_test::traced_test;

    use super::routes;
    use crate::{
        archive::{test::scratch_dir, Archive},
        misc::RecordsPath,
        station::Station,
    };

    fn station() -> (Arc<Station>, PathBuf) {
        let dir = scratch_dir();
        (
            Arc::new(Station::new(Archive::new(RecordsPath::new(dir.clone())))),
            dir,
        )
    }

    macro_rules! app {
        ($station:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::from($station))
                    .configure(routes),
            )
            .await
        };
    }

    macro_rules! call_json {
        ($app:expr, $req:expr) => {
            into_json(test::call_service(&$app, $req.to_request()).await).await
        };
    }

    async fn into_json<B: MessageBody>(resp: ServiceResponse<B>) -> (StatusCode, Value) {
        let status = resp.status();
        let body = test::read_body(resp).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[actix_web::test]
    #[traced_test]
    async fn reading_absent_then_present() {
        let (station, _dir) = station();
        let app = app!(station.clone());

        let (status, body) = call_json!(app, TestRequest::get().uri("/get_reading"));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reading"], Value::Null);
        assert!(body["timestamp"].is_string());

        station.publish(Some("20.9".into())).await;
        let (_, body) = call_json!(app, TestRequest::get().uri("/get_reading"));
        assert_eq!(body["reading"], "20.9");
    }

    #[actix_web::test]
    #[traced_test]
    async fn list_on_fresh_environment() {
        let (station, dir) = station();
        let app = app!(station);
        let (status, body) = call_json!(app, TestRequest::get().uri("/list_csv_files"));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({ "files": [] }));
        assert!(dir.is_dir());
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[actix_web::test]
    #[traced_test]
    async fn record_list_and_download() {
        let (station, dir) = station();
        let app = app!(station.clone());

        for _ in 0..2 {
            let (status, body) = call_json!(app, TestRequest::post().uri("/start_recording"));
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], "recording started");
        }
        let (_, body) = call_json!(app, TestRequest::get().uri("/recording_status"));
        assert_eq!(body["recording"], true);
        assert_eq!(body["paused"], false);

        station.publish(Some("12.3".into())).await;
        station.publish(Some("12.7".into())).await;

        for _ in 0..2 {
            let (status, body) = call_json!(app, TestRequest::post().uri("/stop_recording"));
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], "recording stopped");
        }

        let (_, body) = call_json!(app, TestRequest::get().uri("/list_csv_files"));
        let files = body["files"].as_array().unwrap();
        assert_eq!(files.len(), 1);
        let name = files[0].as_str().unwrap().to_owned();

        let resp = test::call_service(
            &app,
            TestRequest::get()
                .uri(&format!("/view_csv_file/{name}"))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let disposition = resp
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_owned();
        assert!(disposition.starts_with("attachment"));
        assert!(disposition.contains(&name));
        let body = test::read_body(resp).await;
        let text = std::str::from_utf8(&body).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Timestamp,Reading");
        assert!(lines[1].ends_with(",12.3"));
        assert!(lines[2].ends_with(",12.7"));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[actix_web::test]
    #[traced_test]
    async fn download_rejects_traversal() {
        let (station, dir) = station();
        station.archive().list().await.unwrap();
        let app = app!(station);
        for uri in [
            "/view_csv_file/../../etc/passwd",
            "/view_csv_file/..%2F..%2Fetc%2Fpasswd",
            "/view_csv_file/missing.csv",
            "/view_csv_file/",
        ] {
            let resp = test::call_service(&app, TestRequest::get().uri(uri).to_request()).await;
            assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{uri}");
            let body = test::read_body(resp).await;
            assert!(!String::from_utf8_lossy(&body).contains("root:"));
        }
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[actix_web::test]
    #[traced_test]
    async fn pause_requires_recording() {
        let (station, dir) = station();
        let app = app!(station);
        let (status, body) = call_json!(app, TestRequest::post().uri("/pause_recording"));
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "not recording");

        call_json!(app, TestRequest::post().uri("/start_recording"));
        let (status, body) = call_json!(app, TestRequest::post().uri("/pause_recording"));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "recording paused");
        let (_, body) = call_json!(app, TestRequest::get().uri("/recording_status"));
        assert_eq!(body["paused"], true);
        let (_, body) = call_json!(app, TestRequest::post().uri("/resume_recording"));
        assert_eq!(body["status"], "recording resumed");
        call_json!(app, TestRequest::post().uri("/stop_recording"));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[actix_web::test]
    #[traced_test]
    async fn start_failure_is_reported() {
        let (station, dir) = station();
        // a regular file where the data directory should be
        std::fs::write(&dir, "").unwrap();
        let app = app!(station.clone());
        let (status, body) = call_json!(app, TestRequest::post().uri("/start_recording"));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].is_string());
        assert!(!station.recording_status().await.recording);
        std::fs::remove_file(dir).unwrap();
    }

    #[actix_web::test]
    #[traced_test]
    async fn wrong_method_is_rejected() {
        let (station, _dir) = station();
        let app = app!(station.clone());
        let resp =
            test::call_service(&app, TestRequest::get().uri("/start_recording").to_request()).await;
        assert!(resp.status().is_client_error());
        assert!(!station.recording_status().await.recording);
    }
}

use std::io::Write;
use std::path::{Path, PathBuf};

use actix_web::{http::header, web, HttpResponse, Responder};
use serde::Deserialize;
use tokio::sync::oneshot;
use utoipa::ToSchema;

use crate::state::AppState;
use crate::worker::{JobError, JobRequest};
use crate::ErrorResponse;

#[derive(Debug, Deserialize, ToSchema)]
pub struct GeneratePdfRequest {
    /// Platform URL copied from the browser (budgets, costs, or forms page).
    pub url: String,
}

#[utoipa::path(
    tag = "Documents",
    post,
    path = "/generate-pdf",
    request_body = GeneratePdfRequest,
    responses(
        (status = 200, description = "Rendered PDF document"),
        (status = 400, description = "Missing or unrecognized URL", body = ErrorResponse),
        (status = 404, description = "No matching records", body = ErrorResponse),
        (status = 500, description = "Render failed", body = ErrorResponse)
    )
)]
pub async fn generate_pdf(
    req: web::Json<GeneratePdfRequest>,
    data: web::Data<AppState>,
) -> impl Responder {
    let reference = req.url.trim().to_string();
    if reference.is_empty() {
        return HttpResponse::BadRequest().json(ErrorResponse::bad_request("url is required"));
    }

    let (tx, rx) = oneshot::channel();
    if data.jobs.send((JobRequest { reference }, tx)).await.is_err() {
        return HttpResponse::ServiceUnavailable()
            .json(ErrorResponse::internal_error("job queue is closed"));
    }

    match rx.await {
        Err(_) => HttpResponse::InternalServerError()
            .json(ErrorResponse::internal_error("job was dropped before completing")),
        Ok(Err(job_error)) => job_error_response(job_error),
        Ok(Ok(pdf_path)) => serve_pdf(pdf_path).await,
    }
}

async fn serve_pdf(pdf_path: PathBuf) -> HttpResponse {
    let read = web::block(move || std::fs::read(&pdf_path).map(|bytes| (pdf_path, bytes))).await;
    match read {
        Ok(Ok((path, bytes))) => {
            let filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("output.pdf");
            HttpResponse::Ok()
                .content_type("application/pdf")
                .insert_header((
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{filename}\""),
                ))
                .body(bytes)
        }
        _ => HttpResponse::InternalServerError()
            .json(ErrorResponse::internal_error("rendered PDF could not be read")),
    }
}

fn job_error_response(err: JobError) -> HttpResponse {
    match err.status {
        400 => HttpResponse::BadRequest().json(ErrorResponse::bad_request(&err.message)),
        404 => HttpResponse::NotFound().json(ErrorResponse::not_found(&err.message)),
        _ => HttpResponse::InternalServerError().json(ErrorResponse::internal_error(&err.message)),
    }
}

#[utoipa::path(
    tag = "Documents",
    get,
    path = "/download-zips",
    responses(
        (status = 200, description = "All archives from the synced tree, bundled"),
        (status = 404, description = "No archives found", body = ErrorResponse),
        (status = 500, description = "Bundling failed", body = ErrorResponse)
    )
)]
pub async fn download_zips(data: web::Data<AppState>) -> impl Responder {
    let publisher = data.publisher.clone();
    let bundled = web::block(move || -> anyhow::Result<Option<Vec<u8>>> {
        let archives = publisher.discover_archives(None)?;
        if archives.is_empty() {
            return Ok(None);
        }
        bundle_archives(&archives, publisher.root()).map(Some)
    })
    .await;

    match bundled {
        Ok(Ok(Some(bytes))) => HttpResponse::Ok()
            .content_type("application/zip")
            .insert_header((
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"all_archives.zip\"",
            ))
            .body(bytes),
        Ok(Ok(None)) => HttpResponse::NotFound()
            .json(ErrorResponse::not_found("no archives in the synced tree")),
        Ok(Err(e)) => {
            log::error!("archive bundling failed: {e}");
            HttpResponse::InternalServerError()
                .json(ErrorResponse::internal_error(&e.to_string()))
        }
        Err(e) => HttpResponse::InternalServerError()
            .json(ErrorResponse::internal_error(&e.to_string())),
    }
}

/// One zip containing every discovered archive, paths relative to the
/// synced root.
fn bundle_archives(archives: &[PathBuf], root: &Path) -> anyhow::Result<Vec<u8>> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    let mut writer = zip::ZipWriter::new(&mut cursor);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for path in archives {
        let name = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        writer.start_file(name, options)?;
        writer.write_all(&std::fs::read(path)?)?;
    }
    writer.finish()?;
    Ok(cursor.into_inner())
}

#[utoipa::path(
    tag = "Health",
    get,
    path = "/health",
    responses((status = 200, description = "Service is up"))
)]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().body("Server is up and running!")
}

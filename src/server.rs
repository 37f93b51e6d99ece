use actix_cors::Cors;
use actix_multipart::Multipart;
use actix_web::{delete, get, post, web, App, HttpResponse, HttpServer, Responder};
use futures::{StreamExt, TryStreamExt};
use serde::Deserialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use xcp_runner::RunConfig;

mod run_manager;
use run_manager::RunManager;

struct AppState {
    run_manager: Arc<RunManager>,
}

#[get("/api/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json("Server is running")
}

/// Accepts the input spreadsheet/CSV and immediately starts a run over it.
/// Only the first `file` field is taken.
#[post("/api/upload")]
async fn upload_file(mut payload: Multipart, data: web::Data<AppState>) -> impl Responder {
    let uploads_dir = PathBuf::from("uploads");
    std::fs::create_dir_all(&uploads_dir).unwrap_or_default();

    let run_id = Uuid::new_v4().to_string();
    let mut saved_path = None;

    while let Ok(Some(mut field)) = payload.try_next().await {
        let content_disposition = field.content_disposition();
        if content_disposition.get_name().unwrap_or("") != "file" {
            continue;
        }
        let mut extension = "csv";
        if let Some(original_name) = content_disposition.get_filename() {
            let lower = original_name.to_lowercase();
            if lower.ends_with(".xlsx") {
                extension = "xlsx";
            } else if lower.ends_with(".xls") {
                extension = "xls";
            }
        }

        let file_path = uploads_dir.join(format!("{}.{}", run_id, extension));
        let mut f = match std::fs::File::create(&file_path) {
            Ok(f) => f,
            Err(e) => {
                return HttpResponse::InternalServerError()
                    .json(format!("Could not save upload: {}", e))
            }
        };
        while let Some(chunk) = field.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    return HttpResponse::BadRequest().json(format!("Upload failed: {}", e))
                }
            };
            if let Err(e) = f.write_all(&chunk) {
                return HttpResponse::InternalServerError()
                    .json(format!("Could not save upload: {}", e));
            }
        }
        saved_path = Some(file_path);
        break;
    }

    let Some(file_path) = saved_path else {
        return HttpResponse::BadRequest().json("No 'file' field in upload");
    };

    let output_base = PathBuf::from("outputs").join(&run_id);
    data.run_manager
        .start_run(run_id.clone(), file_path, output_base);

    HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "run_id": run_id,
        "message": "File uploaded and run started."
    }))
}

#[get("/api/status/{run_id}")]
async fn get_status(path: web::Path<String>, data: web::Data<AppState>) -> impl Responder {
    let run_id = path.into_inner();
    let runs = data.run_manager.runs.lock().unwrap();

    if let Some(status) = runs.get(&run_id) {
        HttpResponse::Ok().json(status)
    } else {
        HttpResponse::NotFound().json("Run not found")
    }
}

#[post("/api/stop/{run_id}")]
async fn stop_run(path: web::Path<String>, data: web::Data<AppState>) -> impl Responder {
    let run_id = path.into_inner();
    if data.run_manager.stop(&run_id) {
        HttpResponse::Ok().json("Stop requested")
    } else {
        HttpResponse::NotFound().json("Run not found")
    }
}

/// Serves the collated CSV once the run has produced one.
#[get("/api/download/{run_id}")]
async fn download_result(path: web::Path<String>, data: web::Data<AppState>) -> impl Responder {
    let run_id = path.into_inner();
    let collated = {
        let runs = data.run_manager.runs.lock().unwrap();
        runs.get(&run_id).and_then(|s| s.collated_file.clone())
    };

    match collated {
        Some(path) if path.exists() => match std::fs::read_to_string(&path) {
            Ok(content) => HttpResponse::Ok()
                .content_type("text/csv")
                .append_header((
                    "Content-Disposition",
                    format!("attachment; filename=\"collated_{}.csv\"", run_id),
                ))
                .body(content),
            Err(e) => HttpResponse::InternalServerError()
                .json(format!("Could not read collated file: {}", e)),
        },
        _ => HttpResponse::NotFound().body("Collated file not generated yet."),
    }
}

#[derive(Deserialize)]
struct SuffixEntry {
    entry: String,
}

#[get("/api/suffixes")]
async fn list_suffixes(data: web::Data<AppState>) -> impl Responder {
    let suffixes = data.run_manager.suffixes.lock().unwrap();
    HttpResponse::Ok().json(suffixes.suffixes())
}

/// Adds one or more suffixes; the entry may contain several separated by
/// comma, semicolon or whitespace.
#[post("/api/suffixes")]
async fn add_suffixes(body: web::Json<SuffixEntry>, data: web::Data<AppState>) -> impl Responder {
    let mut suffixes = data.run_manager.suffixes.lock().unwrap();
    let added = suffixes.add(&body.entry);
    HttpResponse::Ok().json(serde_json::json!({ "added": added }))
}

#[delete("/api/suffixes/{suffix}")]
async fn remove_suffix(path: web::Path<String>, data: web::Data<AppState>) -> impl Responder {
    let suffix = path.into_inner();
    let mut suffixes = data.run_manager.suffixes.lock().unwrap();
    if suffixes.remove(&suffix) {
        HttpResponse::Ok().json("Suffix removed")
    } else {
        HttpResponse::NotFound().json("Suffix not found")
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    xcp_runner::logger::init();

    let run_manager = Arc::new(RunManager::new(RunConfig::default()));
    let state = web::Data::new(AppState { run_manager });

    log::info!("Starting control server at http://0.0.0.0:8080");

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();

        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .service(health_check)
            .service(upload_file)
            .service(get_status)
            .service(stop_run)
            .service(download_result)
            .service(list_suffixes)
            .service(add_suffixes)
            .service(remove_suffix)
    })
    .bind(("0.0.0.0", 8080))?
    .run()
    .await
}

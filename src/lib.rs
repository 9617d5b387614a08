use worker::*;

pub mod config;
pub mod handlers;
pub mod responses;
pub mod services;
pub mod types;
pub mod utils;

#[cfg(test)]
pub mod test_utils;

pub use config::GrantSyncConfig;
pub use services::core::{GrantSyncService, ScheduledSyncOutcome};
pub use types::*;
pub use utils::{SyncError, SyncResult};

use std::cell::OnceCell;
use std::rc::Rc;
use std::sync::Arc;

use handlers::{JsonReply, VINNOVA_ROUTE_PREFIX};
use services::core::alert_sink_for;
use services::core::infrastructure::{D1RecordStore, RecordStore};
use services::core::upstream::transport::{HttpTransport, ReqwestTransport};
use utils::logger::{init_logger, logger};

/// D1 binding holding the synced tables and the sync bookkeeping tables
pub const D1_BINDING: &str = "DB";

thread_local! {
    // One service per isolate so breakers and caches survive between requests.
    static SERVICE: OnceCell<Rc<GrantSyncService>> = const { OnceCell::new() };
}

fn build_service(env: &Env) -> SyncResult<GrantSyncService> {
    let config = GrantSyncConfig::from_worker_env(env)?;
    init_logger(config.log_level.clone());

    let store: Arc<dyn RecordStore> = Arc::new(D1RecordStore::new(env.d1(D1_BINDING)?));
    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(config.api.timeout_ms)?);
    let alerts = alert_sink_for(&config, transport.clone());
    GrantSyncService::new(config, store, transport, alerts)
}

fn get_service(env: &Env) -> SyncResult<Rc<GrantSyncService>> {
    if let Some(service) = SERVICE.with(|cell| cell.get().cloned()) {
        return Ok(service);
    }
    let service = Rc::new(build_service(env)?);
    SERVICE.with(|cell| {
        let _ = cell.set(service.clone());
    });
    Ok(service)
}

fn set_cors_headers(headers: &mut Headers) -> Result<()> {
    headers.set("Access-Control-Allow-Origin", "*")?;
    headers.set("Access-Control-Allow-Methods", "GET, POST, OPTIONS")?;
    headers.set(
        "Access-Control-Allow-Headers",
        "Content-Type, X-Cron-Secret",
    )?;
    Ok(())
}

#[event(fetch)]
pub async fn main(req: Request, env: Env, _ctx: Context) -> Result<Response> {
    utils::logger::set_panic_hook();

    let url = req.url()?;
    let path = url.path().to_string();
    let method = req.method();

    if method == Method::Options {
        let mut response = Response::empty()?;
        set_cors_headers(response.headers_mut())?;
        return Ok(response);
    }

    let service = match get_service(&env) {
        Ok(service) => service,
        Err(e) => {
            crate::log_error!(&format!("Service initialization failed: {}", e));
            return JsonReply::from_error(&e).into_response();
        }
    };

    let mut response = match (method.clone(), path.as_str()) {
        (Method::Get, "/health") => handlers::handle_health(&service).await,
        (Method::Post, "/api/cron/sync") => handlers::handle_cron_sync(&req, &service).await,
        (Method::Post, "/api/cron/retry-failures") => {
            handlers::handle_retry_failures(&req, &service).await
        }
        (Method::Get, path) if path.starts_with(VINNOVA_ROUTE_PREFIX) => {
            let endpoint = path.trim_start_matches(VINNOVA_ROUTE_PREFIX);
            handlers::handle_vinnova_query(&req, &service, endpoint).await
        }
        _ => {
            crate::log_debug!(&format!("Route not found: {} {}", method, path));
            Response::error("Not Found", 404)
        }
    };

    if let Ok(ref mut resp) = response {
        set_cors_headers(resp.headers_mut())?;
    }
    response
}

#[event(scheduled)]
pub async fn scheduled(event: ScheduledEvent, env: Env, _ctx: ScheduleContext) {
    utils::logger::set_panic_hook();
    crate::log_info!(&format!("Scheduled sync triggered by '{}'", event.cron()));
    let log = logger().component("scheduled");

    let service = match get_service(&env) {
        Ok(service) => service,
        Err(e) => {
            log.error(&format!("Service initialization failed: {}", e));
            return;
        }
    };

    match service.run_scheduled_sync().await {
        Ok(outcome) => log.info_with_meta(
            "Scheduled sync finished",
            Some(&serde_json::to_value(&outcome).unwrap_or_default()),
        ),
        Err(e) => log.error_with_meta(
            "Scheduled sync failed",
            Some(&serde_json::json!({ "kind": e.kind.as_str(), "error": e.message })),
        ),
    }
}

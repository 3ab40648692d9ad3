use actix_web::{web, App, HttpServer};
use actix_web_prom::PrometheusMetricsBuilder;
use std::env;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use bazar_dispatch_rs::config::Settings;
use bazar_dispatch_rs::context::DispatchContext;
use bazar_dispatch_rs::coordinator::{CoordinatorConfig, DispatchCoordinator};
use bazar_dispatch_rs::courier::pathao::PathaoAdapter;
use bazar_dispatch_rs::courier::registry::CourierRegistry;
use bazar_dispatch_rs::courier::steadfast::SteadfastAdapter;
use bazar_dispatch_rs::store::MemoryOrderStore;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    info!("╔═══════════════════════════════════════════════════════════════╗");
    info!("║              BAZAR DISPATCH RS                                ║");
    info!("║              Order Fulfillment & Courier Dispatch             ║");
    info!("╚═══════════════════════════════════════════════════════════════╝");

    dotenv::dotenv().ok();

    let settings = Settings::new().unwrap_or_else(|e| {
        warn!("Failed to load settings, continuing with defaults: {}", e);
        Settings::default()
    });

    // Register every courier the config enables; a provider without
    // credentials is skipped, not fatal.
    let registry = Arc::new(CourierRegistry::new());
    let couriers = settings.couriers.clone().unwrap_or_default();

    if let Some(steadfast) = couriers.steadfast.as_ref().filter(|c| c.enabled) {
        match SteadfastAdapter::new(Some(steadfast)) {
            Ok(adapter) => registry.register(Arc::new(adapter)),
            Err(e) => warn!("Steadfast not registered: {}", e),
        }
    }
    if let Some(pathao) = couriers.pathao.as_ref().filter(|c| c.enabled) {
        match PathaoAdapter::new(Some(pathao)) {
            Ok(adapter) => registry.register(Arc::new(adapter)),
            Err(e) => warn!("Pathao not registered: {}", e),
        }
    }
    if registry.provider_ids().is_empty() {
        warn!("No courier providers registered; dispatch calls will fail with configuration_missing");
    }

    let dispatch_tuning = settings.dispatch.clone().unwrap_or_default();
    let coordinator_config = CoordinatorConfig {
        max_attempts: dispatch_tuning
            .max_attempts
            .unwrap_or(CoordinatorConfig::default().max_attempts),
        retry_backoff_ms: dispatch_tuning
            .retry_backoff_ms
            .unwrap_or(CoordinatorConfig::default().retry_backoff_ms),
    };

    let store = Arc::new(MemoryOrderStore::new());
    let coordinator = Arc::new(DispatchCoordinator::new(
        store.clone(),
        registry.clone(),
        Some(coordinator_config),
    ));
    let ctx = DispatchContext::with_coordinator(store, registry, coordinator);

    info!("✅ Core components initialized");

    let prometheus = PrometheusMetricsBuilder::new("bazar_dispatch")
        .endpoint("/metrics")
        .build()
        .expect("prometheus middleware");

    let api_port = settings
        .service
        .and_then(|s| s.port)
        .or_else(|| env::var("PORT").ok().and_then(|p| p.parse().ok()))
        .unwrap_or(3004);
    let bind_address = format!("0.0.0.0:{}", api_port);
    info!("🚀 Starting API server on {}", bind_address);

    HttpServer::new(move || {
        let cors = actix_cors::Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();

        App::new()
            .wrap(cors)
            .wrap(prometheus.clone())
            .app_data(web::Data::new(ctx.clone()))
            .configure(bazar_dispatch_rs::api::config)
    })
    .bind(&bind_address)?
    .run()
    .await
}

//! # vibehunt Binary
//!
//! The entry point that assembles the application from settings and
//! compile-time features.

use actix_web::{web, App, HttpServer};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use vh_api::{configure_routes, middleware, AppState};
use vh_config::{Backend, Settings};
use vh_core::store::MemoryStore;
use vh_core::{EntityStore, Showcase};

// Feature-gated imports
#[cfg(feature = "db-sqlite")]
use vh_db_sqlite::SqliteEntityStore;

/// `RUST_LOG` wins over `log.filter`.
fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log.filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if settings.log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn open_store(settings: &Settings) -> anyhow::Result<Arc<dyn EntityStore>> {
    match settings.database.backend {
        Backend::Memory => {
            tracing::warn!("memory backend selected; data is lost on exit");
            Ok(Arc::new(MemoryStore::new()))
        }
        #[cfg(feature = "db-sqlite")]
        Backend::Sqlite => {
            let store = SqliteEntityStore::connect(&settings.database.url, settings.database.max_connections).await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "db-sqlite"))]
        Backend::Sqlite => anyhow::bail!("database.backend = \"sqlite\" needs the db-sqlite feature"),
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    init_tracing(&settings);

    // 1. Initialize the Entity Store implementation
    let store = open_store(&settings).await?;

    // 2. Assemble the managers
    let showcase = Showcase::with_max_depth(store, settings.comments.max_depth);

    // 3. Maintenance
    if settings.maintenance.backfill_slugs {
        let updated = showcase.projects.backfill_slugs().await?;
        tracing::info!(updated, "slug backfill finished");
    }

    let state = web::Data::new(AppState::new(showcase));
    let allowed_origin = settings.server.allowed_origin.clone();
    let (host, port) = settings.bind_addr();

    tracing::info!(%host, port, backend = ?settings.database.backend, "vibehunt starting");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::cors_policy(&allowed_origin))
            .wrap(middleware::security_headers())
            .wrap(middleware::standard_middleware())
            .configure(configure_routes)
    })
    .bind((host, port))?
    .run()
    .await?;

    Ok(())
}

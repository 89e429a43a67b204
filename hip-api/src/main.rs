//! HIP API server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use hip_api::{
    create_api_router, store, AdmissionGate, ApiConfig, ApiError, ApiResult, AppState,
    AuthConfig, BcryptHasher, DbConfig, PgDocumentStore, PgTransactionalStore, RedisConfig,
    StoreFacade, Stores,
};
use hip_api::telemetry::{init_tracer, TelemetryConfig};
use hip_storage::RedisBackend;

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::default();
    init_tracer(&telemetry_config)?;

    let api_config = ApiConfig::from_env();
    let auth_config = AuthConfig::from_env();

    let redis_config = RedisConfig::from_env();
    let redis = Arc::new(RedisBackend::connect(&redis_config.url).await.map_err(|e| {
        ApiError::service_unavailable(format!("Failed to connect to redis: {}", e))
    })?);

    let db_config = DbConfig::from_env();
    let pool = db_config
        .create_pool()
        .map_err(|e| ApiError::internal_error(e.to_string()))?;
    store::migrate(&pool)
        .await
        .map_err(|e| ApiError::service_unavailable(format!("Schema migration failed: {}", e)))?;

    let stores = Stores {
        transactional: Arc::new(PgTransactionalStore::new(pool.clone())),
        documents: Arc::new(PgDocumentStore::new(pool)),
        cache: redis.clone(),
        audit: redis.clone(),
    };
    let hasher = Arc::new(BcryptHasher::new(api_config.bcrypt_cost));
    let facade = StoreFacade::new(stores, hasher, &api_config);
    let gate = AdmissionGate::new(redis, api_config.admission.clone());

    let state = AppState::new(facade, gate, auth_config, api_config);
    let app = create_api_router(state)?;

    let addr = resolve_bind_addr()?;
    tracing::info!(%addr, "Starting HIP API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("HIP_API_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port_str = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("HIP_API_PORT").ok())
        .unwrap_or_else(|| "3000".to_string());
    let port = port_str
        .parse::<u16>()
        .map_err(|_| ApiError::invalid_input(format!("Invalid port value: {}", port_str)))?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
}

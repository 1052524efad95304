use actix_web::{middleware::Condition, web, App, HttpResponse, HttpServer};
use scale_from_zero::config::GatewayConfig;
use scale_from_zero::handlers::proxy::{forward_request, Upstream};
use scale_from_zero::scaling::{ExternalServiceQuery, FunctionScaler, ScaleFromZero, ScalingConfig};
use std::io;
use std::sync::Arc;

fn to_io<E: std::fmt::Display>(err: E) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err.to_string())
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = GatewayConfig::from_env().map_err(to_io)?;

    let service_query = ExternalServiceQuery::new(
        config.functions_provider_url.clone(),
        config.auth_token.clone(),
        config.function_namespace.clone(),
    )
    .map_err(to_io)?;

    let mut scaling_config = ScalingConfig::new(Arc::new(service_query));
    scaling_config.max_poll_count = config.max_poll_count;
    scaling_config.function_poll_interval = config.function_poll_interval;
    scaling_config.cache_expiry = config.cache_expiry;
    scaling_config.single_flight = config.single_flight;
    let scaler = Arc::new(FunctionScaler::new(scaling_config));

    if let Some(every) = config.cache_sweep_interval {
        let scaler = Arc::clone(&scaler);
        actix_web::rt::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let purged = scaler.cache().purge_expired();
                if purged > 0 {
                    log::debug!("purged {} stale replica cache entries", purged);
                }
            }
        });
    }

    let upstream = Upstream::new(config.functions_provider_url.clone(), config.upstream_timeout)
        .map_err(to_io)?;

    log::info!(
        "listening on {} (provider={}, scale_from_zero={}, max_poll_count={}, poll_interval={:?}, cache_expiry={:?})",
        config.bind_addr,
        config.functions_provider_url,
        config.scale_from_zero,
        config.max_poll_count,
        config.function_poll_interval,
        config.cache_expiry
    );

    let scale_from_zero = config.scale_from_zero;
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(upstream.clone()))
            .route("/healthz", web::get().to(HttpResponse::Ok))
            .service(
                web::scope("/function")
                    .wrap(Condition::new(
                        scale_from_zero,
                        ScaleFromZero::new(Arc::clone(&scaler)),
                    ))
                    .route("/{name}", web::to(forward_request))
                    .route("/{name}/{tail:.*}", web::to(forward_request)),
            )
    })
    .bind(&config.bind_addr)?
    .run()
    .await
}

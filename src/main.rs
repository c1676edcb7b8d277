use actix_cors::Cors;
use actix_web::{middleware, App, HttpServer};
use log::info;

use barbershop_backend::config::AppConfig;
use barbershop_backend::{db, routes, seed, AppServices};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if let Err(err) = run().await {
        eprintln!("Startup error: {err:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env()?;
    let pool = db::connect(&config.database_url).await?;
    seed::run(&pool, &config).await?;

    if !config.push.enabled() {
        info!("VAPID keys not configured, push notifications disabled");
    }

    let services = AppServices::new(pool, &config);
    info!("Starting server at http://{}", config.bind_addr);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            // Path without the query string: `?token=` must stay out of the logs.
            .wrap(
                middleware::Logger::new(r#"%a "%{method}xi %U" %s %b %T"#)
                    .custom_request_replace("method", |req| req.method().to_string()),
            )
            .configure(|cfg| services.register(cfg))
            .configure(routes::config)
    })
    .bind(&config.bind_addr)?
    .run()
    .await?;

    Ok(())
}

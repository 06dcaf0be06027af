mod handlers;

use std::time::Duration;

use actix_web::{middleware, web, App, HttpServer};
use clap::Parser;

use auth::identity::IdentityClient;
use common::config::AppConfig;
use relay::client::UpstreamClient;

#[derive(Parser, Clone)]
#[command(name = "ragchat")]
pub struct Args {
    #[arg(long, default_value = "8080")]
    pub port: u16,

    #[arg(long, default_value = "ragchat.db")]
    pub db: String,

    #[arg(long, default_value = "ragchat.toml")]
    pub config: String,
}

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Hourly sweep of sessions idle past the configured max age.
fn start_session_sweep(pool: sqlx::SqlitePool, max_age_secs: i64) {
    actix_web::rt::spawn(async move {
        let mut interval = actix_web::rt::time::interval(SESSION_SWEEP_INTERVAL);
        interval.tick().await; // the first tick fires immediately
        loop {
            interval.tick().await;
            match db::sessions::sweep_expired_sessions(&pool, max_age_secs * 1000).await {
                Ok(0) => {}
                Ok(removed) => log::info!("session sweep removed {} expired session(s)", removed),
                Err(e) => log::error!("session sweep failed: {}", e),
            }
        }
    });
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let args = Args::parse();
    let port = args.port;

    let config = AppConfig::load(&args.config)?;
    let pool = db::init_pool(&args.db).await?;

    let http = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    let upstream = UpstreamClient::new(http.clone(), config.upstream.clone());
    let identity = IdentityClient::new(http, config.auth.clone());

    start_session_sweep(pool.clone(), config.session.max_age_secs);

    log::info!("RAG chat listening on http://localhost:{}", port);

    let pool_data = web::Data::new(pool);
    let upstream_data = web::Data::new(upstream);
    let identity_data = web::Data::new(identity);
    let config_data = web::Data::new(config);

    HttpServer::new(move || {
        let payload_cfg = web::PayloadConfig::new(256 * 1024); // 256 KB
        App::new()
            .wrap(middleware::NormalizePath::trim())
            .app_data(payload_cfg)
            .app_data(pool_data.clone())
            .app_data(upstream_data.clone())
            .app_data(identity_data.clone())
            .app_data(config_data.clone())
            .route("/", web::get().to(handlers::home))
            .route("/auth/login", web::get().to(handlers::login))
            .route("/auth/callback", web::get().to(handlers::callback))
            .route("/auth/logout", web::post().to(handlers::logout))
            .route("/chat", web::get().to(handlers::chat_page))
            .route("/chat", web::post().to(handlers::chat_submit))
            .route("/conversations", web::get().to(handlers::conversations_page))
            .route("/conversations", web::post().to(handlers::conversations_action))
            .route("/static/chat.js", web::get().to(handlers::chat_script))
            .service(web::resource("/api/chat-stream").route(web::post().to(relay::chat_stream)))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await?;

    Ok(())
}

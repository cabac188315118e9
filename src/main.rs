#[macro_use]
extern crate lazy_static;

use actix_files::{Files, NamedFile};
use actix_identity::IdentityMiddleware;
use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::{
    http::{Method, StatusCode},
    middleware,
    web::{self, Data},
    App, Either, HttpResponse, HttpServer, Responder,
};
use log::info;
use sqlx::SqlitePool;
use tera::Tera;

mod config;
mod db;
mod errors;
mod routes;
mod storage;
mod structs;
mod timeline;
mod utils;
mod vehicle;

use config::Config;
use storage::Storage;

#[derive(Debug, Clone)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub storage: Storage,
    pub config: Config,
}

lazy_static! {
    pub static ref TEMPLATES: Tera = {
        let mut tera = match Tera::new("templates/**/*") {
            Ok(t) => t,
            Err(e) => {
                log::error!("Parsing error(s): {}", e);
                ::std::process::exit(1);
            }
        };
        tera.autoescape_on(vec![".html"]);
        tera.register_filter("status_color", utils::status_color_filter);
        tera.register_filter("status_label", utils::status_label_filter);
        tera.register_filter("money", utils::money_filter);
        tera
    };
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::from_env().map_err(|e| {
        log::error!("FATAL: {}", e);
        e
    })?;

    let db_pool = db::connect(&config.database_url).await?;
    db::migrate(&db_pool).await?;
    info!("Database migrated successfully");

    let storage = Storage::new(&config.upload_dir);
    tokio::fs::create_dir_all(storage.root()).await?;
    info!("Storing uploads under {}", storage.root().display());

    // fail on template errors before binding the port
    lazy_static::initialize(&TEMPLATES);

    let state = AppState {
        db_pool,
        storage,
        config: config.clone(),
    };
    let session_key = config.cookie_key();
    let max_upload_bytes = config.max_upload_bytes;
    let secure_cookies = config.secure_cookies;

    info!(
        "Starting HTTP server on http://{}:{}/",
        config.bind_addr, config.port
    );

    HttpServer::new(move || {
        App::new()
            // enable automatic response compression - usually register this first
            .wrap(middleware::Compress::default())
            .wrap(IdentityMiddleware::default())
            .wrap(
                SessionMiddleware::builder(CookieSessionStore::default(), session_key.clone())
                    .cookie_secure(secure_cookies)
                    .build(),
            )
            // enable logger - always register Actix Web Logger middleware last
            .wrap(middleware::Logger::default())
            .app_data(Data::new(state.clone()))
            .app_data(web::PayloadConfig::new(max_upload_bytes))
            .service(Files::new("/static", "static"))
            .configure(routes::configure)
            .default_service(web::to(default_handler))
    })
    .bind((config.bind_addr.as_str(), config.port))?
    .run()
    .await
}

async fn default_handler(req_method: Method) -> Result<impl Responder, std::io::Error> {
    match req_method {
        Method::GET => {
            let file = NamedFile::open("static/404.html")?
                .customize()
                .with_status(StatusCode::NOT_FOUND);
            Ok(Either::Left(file))
        }
        _ => Ok(Either::Right(HttpResponse::MethodNotAllowed().finish())),
    }
}

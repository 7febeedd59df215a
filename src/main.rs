use actix_web::{web, App, HttpServer};
use clap::Parser;

mod api;
mod cli;
mod error;
mod metrics;
mod models;
mod services;
mod state;
mod store;
mod ws;

use cli::CommandArgs;
use services::retention::{spawn_retention_task, RetentionPolicy};
use state::new_state;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = CommandArgs::parse();
    let bind_address = format!("{}:{}", args.address, args.port);
    let ws_address = format!("{}:{}", args.address, args.ws_port);

    log::info!("🔄 Initializing {:?} supervisor...", args.supervisor);
    let state = match new_state(&args) {
        Ok(state) => state,
        Err(e) => {
            log::error!("❌ Failed to initialize: {}", e);
            for cause in e.chain().skip(1) {
                log::error!("     - {}", cause);
            }
            return Err(e);
        }
    };

    spawn_retention_task(
        state.config_store.clone(),
        RetentionPolicy {
            metric_days: args.metric_retention_days,
            log_days: args.log_retention_days,
            interval: args.purge_interval(),
        },
    );

    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        if let Err(e) = ws::run(&ws_address, sessions).await {
            log::error!("❌ Observer channel stopped: {}", e);
        }
    });

    print_banner(&args);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(api::configure)
    })
    .bind(&bind_address)?
    .run()
    .await?;

    Ok(())
}

fn print_banner(args: &CommandArgs) {
    println!("╔═══════════════════════════════════════════════════════════╗");
    println!("║      PM Dashboard v{:<39}║", env!("CARGO_PKG_VERSION"));
    println!("║      Live process monitoring and log streaming            ║");
    println!("╚═══════════════════════════════════════════════════════════╝");
    println!();
    println!("🚀 HTTP API on http://{}:{}", args.address, args.port);
    println!("🔌 Observer channel on ws://{}:{}", args.address, args.ws_port);
    println!();
    println!("📋 Available endpoints:");
    println!("  GET    /api/processes                      - Merged process list");
    println!("  POST   /api/processes/batch                - Batch start/stop/restart/delete");
    println!("  GET    /api/processes/{{id}}/metrics         - Metric history");
    println!("  GET    /api/processes/{{id}}/logs            - Log history");
    println!("  PUT    /api/processes/{{id}}/group           - Assign group");
    println!("  PUT    /api/processes/{{id}}/restart-policy  - Restart policy");
    println!("  GET    /api/groups                         - List groups");
    println!("  POST   /api/groups                         - Create group");
    println!("  PUT    /api/groups/{{id}}                    - Update group");
    println!("  DELETE /api/groups/{{id}}                    - Delete group");
    println!("  GET    /metrics                            - Prometheus metrics");
    println!("  GET    /health                             - Health check");
    println!();
    println!("💡 Observer commands:");
    println!("  start-monitoring | stop-monitoring | start-log-stream | stop-log-stream");
    println!("═══════════════════════════════════════════════════════════");
}

use diameter_core::cli::Opts;
use diameter_core::config::Config;
use diameter_core::logger;
use diameter_core::server::Server;
use tracing::error;

#[tokio::main]
async fn main() {
    let opts = Opts::read();

    let config = match Config::load(&opts.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("fatal: {err}");
            std::process::exit(1);
        }
    };

    logger::init_tracing(&opts.log_level, opts.json_logs);

    if let Err(err) = Server::new(config).run().await {
        error!(%err, "server exited");
        std::process::exit(1);
    }
}

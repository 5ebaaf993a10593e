use imgproc_backend::api::server::serve;
use imgproc_backend::config::resolve_service_config;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    if std::env::args()
        .skip(1)
        .any(|arg| matches!(arg.as_str(), "-h" | "--help"))
    {
        print_usage();
        return Ok(());
    }

    let config = resolve_service_config()?;
    serve(config).await?;
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init();
}

fn print_usage() {
    eprintln!(concat!(
        "Usage:\n",
        "  imgproc-backend\n\n",
        "Environment:\n",
        "  IMGPROC_CONFIG              optional TOML file (bind, read_timeout_secs, write_timeout_secs,\n",
        "                              max_dimension, strict_params)\n",
        "  IMGPROC_BIND                listen address (default 127.0.0.1:8000)\n",
        "  IMGPROC_READ_TIMEOUT_SECS   request body read timeout (default 30)\n",
        "  IMGPROC_WRITE_TIMEOUT_SECS  whole-request timeout, also bounds the fetch (default 30)\n",
        "  IMGPROC_MAX_DIMENSION       largest output width/height in pixels (default 16384)\n",
        "  IMGPROC_STRICT_PARAMS       reject unparsable numeric parameters (1|true|yes|on)\n",
        "  RUST_LOG                    tracing filter (default info)\n"
    ));
}

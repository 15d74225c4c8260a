use speaker_sync::cli::parse_cli;
use speaker_sync::{PipelineError, pipeline, resolve_settings};
use speaker_sync_decoder::Configuration;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), PipelineError> {
    let (cli, sources) = parse_cli();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if cli.list_backends {
        print_available_backends();
        return Ok(());
    }

    let settings = resolve_settings(&cli, &sources)?;
    if let Some(path) = &settings.config_path {
        tracing::debug!(config = %path.display(), "loaded configuration file");
    }
    pipeline::run(&settings).await
}

fn print_available_backends() {
    let names: Vec<&str> = Configuration::available_backends()
        .iter()
        .map(|backend| backend.as_str())
        .collect();
    println!("available backends: {}", names.join(", "));
}

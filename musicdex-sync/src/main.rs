use musicdex_sync::config::SyncConfig;
use musicdex_sync::worker::{SyncWorker, WorkOutcome};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CliMode {
    Run,
    Once,
    Help,
}

fn parse_cli_mode<I>(args: I) -> anyhow::Result<CliMode>
where
    I: IntoIterator<Item = String>,
{
    let mut mode = CliMode::Run;
    for arg in args.into_iter().skip(1) {
        match arg.as_str() {
            "--once" => mode = CliMode::Once,
            "--help" | "-h" => mode = CliMode::Help,
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(mode)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mode = parse_cli_mode(std::env::args())?;
    if mode == CliMode::Help {
        println!("Usage: musicdex-sync [--once]");
        println!("  --once   Run a single sync attempt without retrying");
        return Ok(());
    }

    let config = SyncConfig::from_env()?;
    let worker = SyncWorker::bootstrap(config).await?;
    let outcome = match mode {
        // past the attempt ceiling, so a failed run is final
        CliMode::Once => worker.run_attempt(u32::MAX).await,
        _ => worker.run_with_retries().await,
    };
    match outcome {
        WorkOutcome::Success => Ok(()),
        WorkOutcome::Retry | WorkOutcome::Failure => anyhow::bail!("sync did not complete"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Vec<String> {
        std::iter::once("musicdex-sync")
            .chain(extra.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn parse_cli_mode_defaults_to_run() {
        assert_eq!(parse_cli_mode(args(&[])).unwrap(), CliMode::Run);
    }

    #[test]
    fn parse_cli_mode_supports_once_and_help() {
        assert_eq!(parse_cli_mode(args(&["--once"])).unwrap(), CliMode::Once);
        assert_eq!(parse_cli_mode(args(&["-h"])).unwrap(), CliMode::Help);
    }

    #[test]
    fn parse_cli_mode_rejects_unknown_flags() {
        assert!(parse_cli_mode(args(&["--daemon"])).is_err());
    }
}

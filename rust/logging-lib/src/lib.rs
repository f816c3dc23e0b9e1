use clap::{Parser, ValueEnum};
use is_terminal::IsTerminal;
use tracing::{Dispatch, dispatcher};
use tracing_log::AsLog;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
pub struct LoggingOpts {
    #[clap(long, env = "XFER_LOG_FORMAT", default_value = "text")]
    pub log_format: LogFormat,

    #[clap(long, env = "XFER_LOG_COLOR", default_value = "auto")]
    pub log_color: LogColor,

    /// Per-target level directives in RUST_LOG syntax. Anything set in the
    /// RUST_LOG env var takes priority over these.
    #[clap(long)]
    pub log_directives: Option<String>,
}

pub fn init(opts: &LoggingOpts) -> Result<(), anyhow::Error> {
    let color = match opts.log_color {
        // tracing_subscriber::fmt probes stdout for its default writer.
        LogColor::Auto => std::io::stdout().is_terminal(),
        LogColor::Always => true,
        LogColor::Never => false,
    };

    let mut filter_builder = EnvFilter::builder();
    if let Some(directives) = &opts.log_directives {
        filter_builder = filter_builder.with_default_directive(directives.parse()?);
    }
    let filter = filter_builder.from_env_lossy();

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    #[cfg(test)]
    let builder = builder.with_test_writer();

    #[cfg(not(test))]
    let builder = builder.with_writer(std::io::stderr);

    let dispatch: Dispatch = match opts.log_format {
        LogFormat::Text => builder.with_ansi(color).finish().into(),
        LogFormat::Json => builder.json().finish().into(),
    };
    dispatcher::set_global_default(dispatch)?;

    // Must run after the global default is set so the max level hint is
    // already known.
    tracing_log::LogTracer::builder()
        .with_max_level(tracing_core::LevelFilter::current().as_log())
        .init()?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogColor {
    Auto,
    Always,
    Never,
}

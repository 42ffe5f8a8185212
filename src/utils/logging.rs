use std::fs;
use std::path::PathBuf;
use anyhow::Result;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Logging knobs assembled from the CLI flags
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub verbose: bool,
    /// Mirror all output to this file as well
    pub file: Option<PathBuf>,
    /// Extra filter directives appended to the defaults, comma separated
    /// (e.g. "hyper=off,rendercrawl::schedule=trace")
    pub filter: Option<String>,
}

fn build_filter(verbose: bool, extra: Option<&str>) -> Result<EnvFilter> {
    let level = if verbose { "debug" } else { "info" };
    let mut env_filter = EnvFilter::from_default_env()
        .add_directive(format!("rendercrawl={level}").parse()?)
        .add_directive("warn".parse()?);

    if let Some(extra) = extra {
        for directive in extra.split(',') {
            let directive = directive.trim();
            if !directive.is_empty() {
                env_filter = env_filter.add_directive(directive.parse()?);
            }
        }
    }

    Ok(env_filter)
}

/// Initialize the logging system
pub fn init_logging(options: &LogOptions) -> Result<()> {
    let env_filter = build_filter(options.verbose, options.filter.as_deref())?;
    let fmt_layer = fmt::layer().with_target(true);

    match &options.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = fs::File::create(path)?;
            let file_layer = fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(file);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .with(file_layer)
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .init();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extra_directives_are_accepted() {
        assert!(build_filter(false, None).is_ok());
        assert!(build_filter(true, Some("hyper=off, reqwest=warn")).is_ok());
        assert!(build_filter(true, Some("  ,  ")).is_ok());
    }

    #[test]
    fn malformed_directives_are_rejected() {
        assert!(build_filter(false, Some("not a directive!")).is_err());
    }
}

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

use crate::cli::Cli;
use crate::matcher::{DEFAULT_MAX_DISTANCE, DEFAULT_MAX_SKIP, MatchOptions};

pub const MAX_DISTANCE_ENV: &str = "JAR_SENTRY_MAX_DISTANCE";
pub const MAX_SKIP_ENV: &str = "JAR_SENTRY_MAX_SKIP";
pub const THREADS_ENV: &str = "JAR_SENTRY_THREADS";

pub fn resolve_match_options(cli: &Cli) -> Result<MatchOptions> {
    let max_distance = match cli.max_distance {
        Some(n) => n,
        None => env_value(MAX_DISTANCE_ENV)?.unwrap_or(DEFAULT_MAX_DISTANCE),
    };
    let max_skip = match cli.max_skip {
        Some(n) => n,
        None => env_value(MAX_SKIP_ENV)?.unwrap_or(DEFAULT_MAX_SKIP),
    };

    Ok(MatchOptions {
        max_distance,
        max_skip: (max_skip > 0).then_some(max_skip),
    })
}

/// `None` leaves the rayon default in place.
pub fn resolve_threads(cli: &Cli) -> Result<Option<usize>> {
    if let Some(n) = cli.threads {
        return Ok(Some(n));
    }
    env_value(THREADS_ENV)
}

fn env_value<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("Invalid value for {name}: {raw:?}")),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("jar-sentry").chain(args.iter().copied()))
    }

    #[test]
    fn flags_take_precedence() {
        let options =
            resolve_match_options(&cli(&["--max-distance", "3", "--max-skip", "7", "signatures"]))
                .unwrap();
        assert_eq!(options.max_distance, 3);
        assert_eq!(options.max_skip, Some(7));
    }

    #[test]
    fn zero_skip_disables_the_bound() {
        let options = resolve_match_options(&cli(&["--max-skip", "0", "signatures"])).unwrap();
        assert_eq!(options.max_skip, None);
    }

    #[test]
    fn threads_flag_is_passed_through() {
        assert_eq!(
            resolve_threads(&cli(&["--threads", "2", "signatures"])).unwrap(),
            Some(2)
        );
    }
}

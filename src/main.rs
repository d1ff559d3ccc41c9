use anyhow::{Context, Result};
use clap::Parser;
use jar_sentry::cli::{Cli, Commands, OutputFormat};
use jar_sentry::config::{resolve_match_options, resolve_threads};
use jar_sentry::detect::Detector;
use jar_sentry::report::ScanReport;
use jar_sentry::scan::collect_units;
use jar_sentry::signature::{OpcodeRestriction, catalog};
use rayon::prelude::*;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;

fn main() -> Result<ExitCode> {
    env_logger::init();
    let cli = parse_cli()?;

    if let Some(threads) = resolve_threads(&cli)? {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to configure worker threads")?;
    }

    match &cli.command {
        Commands::Signatures => {
            let content = render_signatures(cli.format)?;
            write_output(&content, cli.output.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Scan { paths } => {
            let options = resolve_match_options(&cli)?;
            let units = collect_units(paths)?;
            let start = Instant::now();

            let detector = Detector::new(options);
            let settled: Vec<_> = units
                .into_par_iter()
                .map(|unit| detector.detect(unit))
                .collect();
            log::info!(
                "scanned {} unit(s) in {} ms",
                settled.len(),
                start.elapsed().as_millis()
            );

            let report = ScanReport::new(&settled);
            let content = match cli.format {
                OutputFormat::Json => serde_json::to_string_pretty(&report)?,
                OutputFormat::Text => report.to_text(),
            };
            write_output(&content, cli.output.as_deref())?;

            Ok(if report.any_infected() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            })
        }
    }
}

fn parse_cli() -> Result<Cli> {
    let args: Vec<String> = std::env::args().collect();
    Ok(Cli::parse_from(rewrite_args_for_implicit_scan(args)))
}

fn rewrite_args_for_implicit_scan(mut args: Vec<String>) -> Vec<String> {
    if args.len() <= 1 {
        return args;
    }

    let subcommands = ["scan", "signatures", "help"];
    let takes_value = [
        "--max-distance",
        "--max-skip",
        "--threads",
        "-f",
        "--format",
        "-o",
        "--output",
    ];

    let mut idx = 1usize;
    while idx < args.len() {
        let a = args[idx].as_str();
        if a == "--" {
            idx += 1;
            break;
        }

        if takes_value.contains(&a) {
            idx += 2;
            continue;
        }

        if a.starts_with('-') {
            idx += 1;
            continue;
        }

        break;
    }

    if idx < args.len() {
        let token = args[idx].as_str();
        if !subcommands.contains(&token) {
            args.insert(idx, "scan".to_string());
        }
    }

    args
}

#[derive(Debug, Serialize)]
struct SignatureInfo<'a> {
    name: &'a str,
    description: &'a str,
    length: usize,
    restriction: &'a OpcodeRestriction,
}

fn render_signatures(format: OutputFormat) -> Result<String> {
    let infos: Vec<SignatureInfo<'_>> = catalog()
        .iter()
        .map(|s| SignatureInfo {
            name: &s.name,
            description: &s.description,
            length: s.len(),
            restriction: &s.restriction,
        })
        .collect();

    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(&infos)?,
        OutputFormat::Text => {
            let mut out = String::new();
            for info in &infos {
                let scope = match info.restriction {
                    OpcodeRestriction::Restricted(opcodes) => opcodes
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(","),
                    OpcodeRestriction::Unrestricted => "all".to_string(),
                };
                writeln!(
                    out,
                    "{}: {} ({} instructions, opcodes: {scope})",
                    info.name, info.description, info.length
                )?;
            }
            out
        }
    })
}

fn write_output(content: &str, output: Option<&Path>) -> Result<()> {
    if let Some(path) = output {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
    } else {
        print!("{content}");
        if !content.ends_with('\n') {
            println!();
        }
    }
    Ok(())
}

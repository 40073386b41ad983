mod log;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use subsniper::config::{default_engines, parse_engines, EnumerationConfig, DEFAULT_ENGINES};
use subsniper::model::{ensure_dir, export, Domain, OutputFormat};
use subsniper::{EnumerationReport, Enumerator, Error, Result};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Command::new(clap::crate_name!())
        .version(clap::crate_version!())
        .about("Passive subdomain enumeration through search engine results")
        .subcommand(Command::new("engines").about("List the default search engines"))
        .subcommand(
            Command::new("scan")
                .about("Enumerate the subdomains of a target")
                .arg(
                    Arg::new("target")
                        .help("The domain name to enumerate")
                        .value_name("TARGET")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .help("Save discovered subdomains to a file")
                        .value_name("FILE"),
                )
                .arg(
                    Arg::new("format")
                        .short('f')
                        .long("format")
                        .help("Output format")
                        .value_name("FORMAT")
                        .value_parser(OutputFormat::VALUES)
                        .default_value("txt"),
                )
                .arg(
                    Arg::new("engine")
                        .short('e')
                        .long("engine")
                        .help("Search engine url with a {} placeholder (repeatable, replaces defaults)")
                        .value_name("TEMPLATE")
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("query-concurrency")
                        .long("query-concurrency")
                        .help("Concurrent search engine queries")
                        .value_name("N")
                        .value_parser(value_parser!(usize)),
                )
                .arg(
                    Arg::new("resolve-concurrency")
                        .long("resolve-concurrency")
                        .help("Concurrent DNS resolutions")
                        .value_name("N")
                        .value_parser(value_parser!(usize)),
                )
                .arg(
                    Arg::new("logs")
                        .short('s')
                        .long("logs")
                        .action(ArgAction::SetTrue)
                        .help("Save logs into a .log file"),
                ),
        )
        .arg_required_else_help(true)
        .get_matches();

    match cli.subcommand() {
        Some(("engines", _)) => {
            println!("\nDefault search engines");
            for template in DEFAULT_ENGINES {
                println!("- {}", template);
            }
        }
        Some(("scan", args)) => run_scan(args).await?,

        // fallback if a cmd is not handled (should not possible)
        _ => return Err(Error::CliUsage("Command not handled".into())),
    }

    Ok(())
}

async fn run_scan(args: &ArgMatches) -> Result<()> {
    // everything fatal is checked before the first request
    let target = args
        .get_one::<String>("target")
        .ok_or_else(|| Error::CliUsage("missing TARGET".into()))?;
    let domain = Domain::parse(target)?;
    let config = build_config(args)?;
    config.validate()?;

    let format: OutputFormat = args
        .get_one::<String>("format")
        .map(|format| format.parse::<OutputFormat>())
        .transpose()?
        .unwrap_or(OutputFormat::Txt);

    // create filename
    let timestamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    let filename = format!("{}", timestamp);

    let save_logs = args.get_flag("logs");
    let output_dir = format!("output/subsniper/{}", domain);
    if save_logs {
        ensure_dir(output_dir.as_ref())?;
    }
    let dispatch = log::build_dispatch(save_logs, output_dir.as_ref(), &filename);

    let enumerator = Enumerator::from_config(&config)?.with_dispatch(dispatch.clone());
    let report = enumerator.run(&domain).await;

    tracing::dispatcher::with_default(&dispatch, || {
        let output = args.get_one::<String>("output").map(Path::new);
        report_results(&report, output, format)
    })
}

fn build_config(args: &ArgMatches) -> Result<EnumerationConfig> {
    let engines = match args.get_many::<String>("engine") {
        Some(raw) => parse_engines(&raw.collect::<Vec<&String>>())?,
        None => default_engines(),
    };

    let mut config = EnumerationConfig::default().with_engines(engines);
    if let Some(concurrency) = args.get_one::<usize>("query-concurrency") {
        config = config.with_query_concurrency(*concurrency);
    }
    if let Some(concurrency) = args.get_one::<usize>("resolve-concurrency") {
        config = config.with_resolve_concurrency(*concurrency);
    }
    Ok(config)
}

fn report_results(
    report: &EnumerationReport,
    output: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    if report.confirmed.is_empty() {
        info!("No subdomains discovered.");
        return Ok(());
    }

    info!(
        "Subdomain enumeration completed in {:.2} seconds. Discovered subdomains:",
        report.elapsed.as_secs_f64()
    );
    for subdomain in &report.confirmed {
        println!("{}", subdomain);
    }

    if let Some(path) = output {
        if let Err(err) = export(&report.confirmed, format, path) {
            error!("Writing {}: {}", path.display(), err);
            return Err(err);
        }
        info!("Subdomains saved to {}", path.display());
    }

    Ok(())
}

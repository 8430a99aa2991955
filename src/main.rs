use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::*;
use nmap_sd::{
    build_service,
    logging::Logger,
    output::render_document,
    server, CycleOutcome, NmapEngine, ProbeEngine, ScanOrchestrator, SdConfig,
};
use std::process;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn cli() -> Command {
    Command::new("nmap-sd")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Prometheus service discovery backed by periodic nmap sweeps")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file (default: ~/.nmap-sd.toml)"),
        )
        .arg(
            Arg::new("cidr")
                .long("cidr")
                .value_name("CIDR")
                .help("Network range to scan, e.g. 10.0.0.0/24"),
        )
        .arg(
            Arg::new("listen")
                .short('l')
                .long("listen")
                .value_name("ADDR")
                .help("HTTP listen address (default: 0.0.0.0:8080)"),
        )
        .arg(
            Arg::new("interval")
                .short('i')
                .long("interval")
                .value_name("MINUTES")
                .help("Minutes between discovery cycles")
                .value_parser(clap::value_parser!(i64))
                .allow_negative_numbers(true),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("DEBUG, INFO, WARN or ERROR"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Also write the discovery document to FILE after each cycle"),
        )
        .arg(
            Arg::new("once")
                .long("once")
                .help("Run a single cycle, print the document and exit")
                .action(ArgAction::SetTrue),
        )
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<SdConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => SdConfig::from_toml_file(path)?,
        None => SdConfig::load_default_config(),
    };

    if let Some(cidr) = matches.get_one::<String>("cidr") {
        config.cidr = cidr.clone();
    }
    if let Some(listen) = matches.get_one::<String>("listen") {
        config.listen = listen.clone();
    }
    if let Some(interval) = matches.get_one::<i64>("interval") {
        config.scan_interval = *interval;
    }
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.log_level = level.clone();
    }
    if let Some(output) = matches.get_one::<String>("output") {
        config.output_file = Some(output.into());
    }

    Ok(config)
}

fn print_summary(outcome: &CycleOutcome) {
    eprintln!(
        "{} {} live hosts, {} service groups in {:.2}s",
        "[✓]".bright_green(),
        outcome.live_hosts.to_string().bright_cyan(),
        outcome.groups.len().to_string().bright_cyan(),
        outcome.elapsed.as_secs_f64()
    );

    for host in &outcome.hosts {
        let open: Vec<String> = host
            .ports
            .iter()
            .map(|p| match &p.service {
                Some(service) => format!("{}/{} ({})", p.port, p.state, service),
                None => format!("{}/{}", p.port, p.state),
            })
            .collect();
        eprintln!(
            "    {:<40} {:<24} {}",
            host.ip.to_string().bright_white().bold(),
            host.hostname.as_deref().unwrap_or("-"),
            open.join(", ").bright_yellow()
        );
    }
}

async fn run_once(config: &SdConfig, engine: Arc<dyn ProbeEngine>) -> anyhow::Result<()> {
    let orchestrator = ScanOrchestrator::new(engine, &config.cidr, config.catalog())
        .with_timeout(config.cycle_timeout())
        .with_label_policy(config.label_policy());

    let outcome = orchestrator.run_cycle().await?;
    println!("{}", render_document(&outcome.groups)?);

    if let Some(publisher) = config.publisher() {
        publisher.publish(&outcome.groups).await?;
        eprintln!(
            "{} Wrote {}",
            "[~]".bright_blue(),
            publisher.path().display()
        );
    }

    print_summary(&outcome);
    Ok(())
}

async fn run_server(config: &SdConfig, engine: Arc<dyn ProbeEngine>) -> anyhow::Result<()> {
    let (refresher, app) = build_service(config, engine);
    let shutdown = CancellationToken::new();

    let scheduler = Arc::clone(&refresher).spawn(shutdown.clone());

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Shutdown requested");
        }
        ctrl_c.cancel();
    });

    let served = server::serve(app, config.listen_addr(), shutdown.clone()).await;
    shutdown.cancel();
    scheduler.await?;
    served?;
    Ok(())
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();

    let config = match load_config(&matches) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "[!]".bright_red(), e);
            process::exit(2);
        }
    };

    // Initialized before normalizing so fallbacks get logged
    Logger::init(&config.log_level);
    let config = config.normalize();

    let catalog = config.catalog();
    Logger::log_startup(&config.cidr, &catalog.port_list(), config.scan_interval);

    let engine: Arc<dyn ProbeEngine> = Arc::new(NmapEngine::new(config.nmap_config()));

    let result = if matches.get_flag("once") {
        run_once(&config, engine).await
    } else {
        run_server(&config, engine).await
    };

    if let Err(e) = result {
        eprintln!("{} {}", "[!] ERROR:".bright_red(), e);
        process::exit(1);
    }
}

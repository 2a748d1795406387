use clap::Parser;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "eoka-e2e")]
#[command(about = "End-to-end CRUD scenarios for admin consoles")]
#[command(version)]
struct Cli {
    /// Suite config file
    config: PathBuf,

    /// Run in headless mode (overrides config)
    #[arg(long)]
    headless: bool,

    /// Console origin (overrides config)
    #[arg(long, env = "E2E_BASE_URL")]
    base_url: Option<String>,

    /// Run only this scenario (can be used multiple times)
    #[arg(short = 's', long = "scenario", value_name = "NAME")]
    scenarios: Vec<String>,

    /// List built-in scenarios and exit
    #[arg(long)]
    list: bool,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Validate config without running
    #[arg(long)]
    check: bool,

    /// Quiet mode (only errors)
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> eoka_e2e::Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    let catalog = eoka_e2e::scenario::catalog();

    if cli.list {
        for scenario in &catalog {
            println!("{:<34} {}", scenario.name, scenario.description);
        }
        return Ok(());
    }

    let mut config = eoka_e2e::Config::load(&cli.config)?;
    if cli.headless {
        config.browser.headless = true;
    }
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url.trim_end_matches('/').to_string();
    }
    if !cli.scenarios.is_empty() {
        config.scenarios = cli.scenarios;
    }
    config.validate()?;

    let runner = eoka_e2e::Runner::new(&config);

    if cli.check {
        println!("Config valid: {}", config.name);
        println!("  Base URL: {}", config.base_url);
        println!("  Mocks: {}", config.mocks.len());
        let selected = runner.select(&catalog);
        println!("  Scenarios: {}", selected.len());
        for scenario in selected {
            println!("    - {}", scenario.name);
        }
        return Ok(());
    }

    println!("Running: {}", config.name);
    let result = runner.run(&catalog).await?;

    println!();
    for outcome in &result.outcomes {
        if outcome.passed {
            println!("✓ {} ({}ms)", outcome.name, outcome.duration_ms);
        } else {
            println!("✗ {} ({}ms)", outcome.name, outcome.duration_ms);
            if let Some(ref error) = outcome.error {
                println!("  Error: {}", error);
            }
        }
    }
    println!();
    println!(
        "  {} passed, {} failed in {}ms",
        result.passed(),
        result.failed(),
        result.duration_ms
    );

    if !result.success() {
        std::process::exit(1);
    }

    Ok(())
}

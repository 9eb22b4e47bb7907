use atty::Stream;
use clap::Parser;
use color_eyre::Result;

mod cli;
mod dispatch;
mod style;

use cli::LyrCli;
use dispatch::Outcome;
use style::Style;

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = LyrCli::parse();
    init_tracing(cli.trace, cli.verbose);

    let outcome = dispatch::execute(cli.config.as_deref(), &cli.command);
    let code = emit_output(&cli, &outcome)?;

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(trace: bool, verbose: u8) {
    let level = if trace {
        "trace"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = format!("lyr={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn emit_output(cli: &LyrCli, outcome: &Outcome) -> Result<i32> {
    let code = outcome.status.exit_code();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcome.to_json())?);
        return Ok(code);
    }

    let style = Style::new(cli.no_color, atty::is(Stream::Stdout));
    if code != 0 {
        eprintln!("{}", style.status(outcome.status, &outcome.message));
    } else if !cli.quiet {
        if outcome.passthrough {
            println!("{}", outcome.message);
        } else {
            println!("{}", style.status(outcome.status, &outcome.message));
        }
    }

    Ok(code)
}

//! Tavern terminal front end.
//!
//! A line-oriented interface for playing with an AI narrator, suitable for
//! manual play and scripted runs:
//!
//! ```bash
//! cargo run -p tavern -- --name "Elara Swiftblade" --race elf --class ranger
//! ```

mod headless;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Narrative goes to stdout, diagnostics to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    if std::env::var("ANTHROPIC_API_KEY").is_err() {
        eprintln!("Error: ANTHROPIC_API_KEY environment variable not set.");
        eprintln!("Please set it in .env file or with: export ANTHROPIC_API_KEY=your_key_here");
        std::process::exit(1);
    }

    let options = headless::parse_options_from_args(&args);
    headless::run_headless(options).await.map_err(|e| e.into())
}

fn print_help() {
    println!("tavern - play a tabletop adventure with an AI narrator");
    println!();
    println!("USAGE:");
    println!("    tavern [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --name <NAME>         Protagonist name (default: Adventurer)");
    println!("    --race <RACE>         Protagonist race (default: Human)");
    println!("    --class <CLASS>       Protagonist class (default: Fighter)");
    println!("    --gender <GENDER>     Protagonist gender");
    println!("    --campaign <ID>       lost-mine-of-phandelver, frozen-sick,");
    println!("                          beginner-journey, crossroads-of-destiny");
    println!("    --language <CODE>     Narration language (default: en)");
    println!("    --load <PATH>         Resume a saved game");
    println!("    -h, --help            Print this help");
    println!();
    println!("ENVIRONMENT:");
    println!("    ANTHROPIC_API_KEY     Narrator API key (required)");
    println!("    TAVERN_MODEL          Narrator model override");
    println!("    TAVERN_IMAGE_ENDPOINT Scene image endpoint (optional)");
    println!("    RUST_LOG              Log filter for stderr (default: warn)");
}

use clap::Parser;
use lab_cli::{execute, Cli};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    // Cargar .env si existe (LABFLOW_*)
    lab_core::config::init_dotenv();
    let cli = Cli::parse();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = execute(cli, &mut out) {
        eprintln!("[lab] error: {e}");
        std::process::exit(e.exit_code());
    }
}

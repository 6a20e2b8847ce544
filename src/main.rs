//! Command-line entry point: reports the schema version of a sandbox.

use std::process::ExitCode;

use annostore::StoreConfig;
use annostore_sandbox::SandboxMigrator;

fn main() -> ExitCode {
    let config = StoreConfig::load_from_default_path().unwrap_or_default();
    env_logger::Builder::new()
        .filter_level(config.log_level.to_level_filter())
        .parse_default_env()
        .init();

    let Some(sandbox_root) = std::env::args().nth(1) else {
        eprintln!("usage: annostore <sandbox root>");
        return ExitCode::FAILURE;
    };

    let migrator = SandboxMigrator::new(&sandbox_root, config.sandbox_layout())
        .with_supported_versions(config.sandbox.supported_versions.clone());
    match migrator.detect_version() {
        Ok(version) => {
            let note = if migrator.supports(&version) { "" } else { " (not supported)" };
            println!("{}: version {}{}", sandbox_root, version, note);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error {}: {}", e.code(), e);
            ExitCode::FAILURE
        }
    }
}

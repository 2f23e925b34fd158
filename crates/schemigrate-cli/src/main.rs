//! Stock schemigrate binary.
//!
//! It carries no migrations of its own: `validate` checks a configuration file
//! and `status` reads the ledger, while `up` and `down` report that nothing is
//! loaded. Applications embed [`schemigrate_cli::run_cli`] with their loader.

use std::process::ExitCode;

use schemigrate::MigrationLoader;

#[tokio::main]
async fn main() -> ExitCode {
    schemigrate_cli::run_cli(MigrationLoader::new()).await
}

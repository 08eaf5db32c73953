//! Copy command - duplicate a database

use crate::cli::args::CopyArgs;
use crate::config::Config;
use crate::error::PgstampResult;
use crate::store::{connect_store, Cloner};
use crate::ui::{TaskSpinner, UiContext};

/// Execute the copy command
pub async fn execute(args: CopyArgs, config: &Config) -> PgstampResult<()> {
    let ctx = UiContext::detect();
    let store = connect_store(&config.database).await?;
    let cloner = Cloner::new(store);

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Copying {} to {}...", args.source, args.dest));

    match cloner
        .copy(&args.source, &args.dest, args.force_disconnect)
        .await
    {
        Ok(()) => {
            spinner.stop(&format!("Copied {} to {}", args.source, args.dest));
            Ok(())
        }
        Err(e) => {
            spinner.stop_error("Copy failed");
            Err(e)
        }
    }
}

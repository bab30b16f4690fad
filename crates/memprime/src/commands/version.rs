//! Version command

use anyhow::Result;

use crate::cli::VersionArgs;
use crate::output;

pub fn run(args: VersionArgs) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");

    if args.json {
        let info = serde_json::json!({
            "name": "memprime",
            "version": version,
            "engine": memprime_backup::VERSION,
        });
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        output::kv("memprime", version);
        output::kv("engine", memprime_backup::VERSION);
    }
    Ok(())
}

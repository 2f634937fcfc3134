//! 🚀 jlx-cli: the front door.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 Thin wrapper: set up logging, find the config, hand off to [`jlx::run`].
//! Like a manager. 🦆

use anyhow::{Context, Result};
use tracing::error;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_FILE: &str = "jlx.toml";

/// 🚀 main(): the "I pressed F5 and held my breath" moment.
///
/// 1. Init tracing (`RUST_LOG` picks the volume)
/// 2. First arg is the config path, `jlx.toml` if absent; a missing file means env vars only
/// 3. Load config, run the server
/// 4. On failure, print every cause and exit 1
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let the_path_arg = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

    let the_config_file = std::path::Path::new(&the_path_arg);
    let the_config_file_if_it_exists = match the_config_file.try_exists().context(format!(
        "💀 Couldn't check whether the config file exists. If it's a relative path, \
         the working directory may not be what you think. Was checking here: '{}'",
        the_config_file.display()
    ))? {
        true => Some(the_config_file),
        false => None,
    };

    let app_config = jlx::app_config::load_config(the_config_file_if_it_exists).context(
        "💀 In jlx-cli, main, we couldn't load the configuration. Check the TOML file and any JLX_* env vars.",
    )?;

    if let Err(err) = jlx::run(app_config).await {
        error!("💀 error: {}", err);
        // 🧅 peel the onion, one layer at a time
        let mut the_vibes_are_giving_port_issues = false;
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
            let cause_str = cause.to_string();
            if cause_str.contains("Address already in use")
                || cause_str.contains("address in use")
                || cause_str.contains("Permission denied")
                || cause_str.contains("invalid socket address")
            {
                the_vibes_are_giving_port_issues = true;
            }
        }

        if the_vibes_are_giving_port_issues {
            error!(
                "🔧 hint: the bind address looks taken or off-limits. \
                 Set [server].bind_address in the config, or JLX_SERVER__BIND_ADDRESS, \
                 to something free. `ss -ltnp` shows who's sitting in our chair. ☕"
            );
        }

        std::process::exit(1);
    }

    Ok(())
}

mod core_cli;

use crate::core_cli::{Cli, Command};
use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use rouilleftp::core_log::init_logger;
use rouilleftp::{ClientConfig, Config, Entry, EntryType, FtpClient, TransferMode};
use std::path::Path;
use tokio::io::AsyncWriteExt;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Cli::parse();

    init_logger(args.verbose);

    let mut client_config = load_client_config(&args)?;
    if args.active {
        client_config.mode = TransferMode::Active;
    }

    let mut client = FtpClient::connect(client_config)
        .await
        .context("Failed to open FTP session")?;

    let result = run(&mut client, args.command).await;
    client.disconnect().await?;
    result
}

/// The URL wins over the configuration file.
fn load_client_config(args: &Cli) -> Result<ClientConfig> {
    if let Some(url) = &args.url {
        return ClientConfig::from_url(url).with_context(|| format!("Invalid server URL: {}", url));
    }

    // Determine the default config path based on the OS
    let default_config_path = if cfg!(target_os = "windows") {
        "C:\\rouilleftp\\rouilleftp.conf"
    } else {
        "/etc/rouilleftp.conf"
    };
    let config_path = if args.config.is_empty() {
        default_config_path
    } else {
        args.config.as_str()
    };
    Ok(Config::load_from_file(config_path)?.client)
}

async fn run(client: &mut FtpClient, command: Command) -> Result<()> {
    match command {
        Command::Ls { path } => {
            let entries = client
                .list_entries(&path)
                .await
                .with_context(|| format!("Failed to list '{}'", path))?;
            print_entries(&entries);
        }
        Command::Stat { path } => {
            let entries = client
                .stat_entries(&path)
                .await
                .with_context(|| format!("Failed to stat '{}'", path))?;
            print_entries(&entries);
        }
        Command::Get { remote, local } => {
            let local = match local {
                Some(local) => local,
                None => Path::new(&remote)
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .with_context(|| format!("No file name in '{}'", remote))?,
            };
            let mut file = tokio::fs::File::create(&local)
                .await
                .with_context(|| format!("Failed to create local file: {}", local))?;
            let bytes = client
                .download(&remote, &mut file)
                .await
                .with_context(|| format!("Failed to download '{}'", remote))?;
            file.flush().await?;
            println!("{} -> {} ({} bytes)", remote, local, bytes);
        }
        Command::Put { local, remote } => {
            let mut file = tokio::fs::File::open(&local)
                .await
                .with_context(|| format!("Failed to open local file: {}", local))?;
            let bytes = client
                .upload(&remote, &mut file)
                .await
                .with_context(|| format!("Failed to upload '{}'", local))?;
            println!("{} -> {} ({} bytes)", local, remote, bytes);
        }
        Command::Rm { path } => {
            if !client.delete(&path).await? {
                bail!("Could not delete '{}'", path);
            }
        }
        Command::Mkdir { path } => {
            if !client.mkd(&path).await? {
                bail!("Could not create directory '{}'", path);
            }
        }
        Command::Rmdir { path } => {
            if !client.rmd(&path).await? {
                bail!("Could not remove directory '{}'", path);
            }
        }
        Command::Mv { from, to } => {
            if !client.rename(&from, &to).await? {
                bail!("Could not rename '{}' to '{}'", from, to);
            }
        }
        Command::Quote { verb, arg } => {
            let reply = client.send_single_command(&verb, &arg).await?;
            println!("{}", reply);
        }
    }
    Ok(())
}

fn print_entries(entries: &[Entry]) {
    for entry in entries {
        let size = entry
            .size
            .map(|size| size.to_string())
            .unwrap_or_else(|| "-".to_string());
        let modified = entry
            .modified_at
            .map(|date| date.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let name = match entry.entry_type {
            EntryType::Directory => entry.name.blue().bold().to_string(),
            EntryType::Link => match &entry.link_target {
                Some(target) => format!("{} -> {}", entry.name.cyan(), target),
                None => entry.name.cyan().to_string(),
            },
            EntryType::File => entry.name.clone(),
        };
        println!("{:>12}  {:<16}  {}", size, modified, name);
    }
}

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use ipcam_cgi::{
    Client, ClientConfig,
    config::{self, CameraProfile, Config},
};

#[derive(Parser)]
#[command(name = "ipcam-cgi")]
#[command(about = "Command line interface for IP cameras with a CGI control API")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    target: Target,

    /// Log every request attempt
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Target {
    /// Saved camera profile to use instead of --host/--username/--password
    #[arg(short, long, global = true)]
    camera: Option<String>,

    /// Hostname or IP address of the camera
    #[arg(short = 'H', long, global = true)]
    host: Option<String>,

    /// Port of the camera
    #[arg(short = 'P', long, global = true, default_value = "80")]
    port: u16,

    /// Username for the camera
    #[arg(short, long, global = true)]
    username: Option<String>,

    /// Password for the camera
    #[arg(short, long, global = true)]
    password: Option<String>,

    /// Protocol scheme (http or https)
    #[arg(long, global = true)]
    protocol: Option<String>,

    /// Retries per command
    #[arg(long, global = true)]
    retries: Option<u32>,

    /// Per-attempt timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate and show the device identity
    Probe {
        /// Print the redacted client state as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a raw CGI command and print the response body
    #[command(name = "command")]
    Exec {
        /// Path after /cgi-bin/, e.g. "magicBox.cgi?action=getSerialNo"
        path: String,

        /// Save the response body to a file instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Upload a file to a CGI command without waiting for a reply
    Upload {
        /// Path after /cgi-bin/
        path: String,

        /// File whose content is sent as the request body
        file: PathBuf,

        /// Extra request header as "Name: value" (repeatable)
        #[arg(long = "header")]
        headers: Vec<String>,
    },

    /// Save camera connection settings to the config file
    SaveCamera {
        /// Profile name
        name: String,
    },

    /// Show saved configuration
    ShowConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Probe { json } => cmd_probe(&cli.target, json),
        Commands::Exec { path, output } => cmd_command(&cli.target, &path, output.as_deref()),
        Commands::Upload {
            path,
            file,
            headers,
        } => cmd_upload(&cli.target, &path, &file, &headers),
        Commands::SaveCamera { name } => cmd_save_camera(&cli.target, &name),
        Commands::ShowConfig => cmd_show_config(),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn client_config(target: &Target) -> Result<ClientConfig> {
    let mut config = match target.camera {
        Some(ref name) => {
            let cfg = Config::load()?;
            let Some(profile) = cfg.find_camera(name) else {
                bail!("No saved camera named '{}'", name);
            };
            profile.client_config()
        }
        None => {
            let (Some(host), Some(username), Some(password)) =
                (&target.host, &target.username, &target.password)
            else {
                bail!("Either --camera or all of --host, --username and --password are required");
            };
            ClientConfig::new(host, target.port, username, password)
        }
    };

    if let Some(ref protocol) = target.protocol {
        config = config.with_protocol(protocol);
    }
    if let Some(retries) = target.retries {
        config = config.with_retries(retries);
    }
    if let Some(secs) = target.timeout {
        let timeout = Duration::try_from_secs_f64(secs)
            .with_context(|| format!("Invalid timeout: {}", secs))?;
        config = config.with_timeout(timeout);
    }

    Ok(config)
}

fn connect(target: &Target) -> Result<Client> {
    let config = client_config(target)?;
    let host = config.host.clone();
    Client::new(config).with_context(|| format!("Failed to connect to {}", host))
}

fn cmd_probe(target: &Target, json: bool) -> Result<()> {
    let client = connect(target)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&client.redacted())?);
        return Ok(());
    }

    println!("Camera:  {}", client);
    println!("URL:     {}", client.base_url());
    println!("Auth:    {}", client.auth_method());

    Ok(())
}

fn cmd_command(target: &Target, path: &str, output: Option<&Path>) -> Result<()> {
    let client = connect(target)?;
    let response = client.command(path, None, None)?;

    let mut body = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut body)
        .context("Failed to read response body")?;

    match output {
        Some(output) => {
            fs::write(output, &body)
                .with_context(|| format!("Failed to write output file: {}", output.display()))?;
            println!("Saved to {}", output.display());
        }
        None => io::stdout().write_all(&body)?,
    }

    Ok(())
}

fn cmd_upload(target: &Target, path: &str, file: &Path, headers: &[String]) -> Result<()> {
    let payload =
        fs::read(file).with_context(|| format!("Failed to read file: {}", file.display()))?;
    let headers = headers
        .iter()
        .map(|h| parse_header(h))
        .collect::<Result<Vec<_>>>()?;

    let client = connect(target)?;
    client.command_with_payload(path, &payload, &headers, None)?;
    println!("Uploaded {} bytes to {}", payload.len(), path);

    Ok(())
}

fn parse_header(raw: &str) -> Result<(String, String)> {
    match raw.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => bail!("Invalid header '{}', expected \"Name: value\"", raw),
    }
}

fn cmd_save_camera(target: &Target, name: &str) -> Result<()> {
    let (Some(host), Some(username), Some(password)) =
        (&target.host, &target.username, &target.password)
    else {
        bail!("--host, --username and --password are required to save a camera");
    };

    let path = config::config_path()?;
    Config::store_camera_at(
        &path,
        CameraProfile {
            name: name.to_string(),
            host: host.clone(),
            port: target.port,
            username: username.clone(),
            password: password.clone(),
            protocol: target.protocol.clone(),
        },
    )?;

    println!("Saved camera '{}' to {}", name, path.display());

    Ok(())
}

fn cmd_show_config() -> Result<()> {
    let path = config::config_path()?;
    println!("Config file: {}", path.display());
    println!();

    let cfg = Config::load()?;

    if cfg.cameras.is_empty() {
        println!("No saved cameras.");
    } else {
        println!("{:<16} {:<28} {:<16} {}", "NAME", "ADDRESS", "USERNAME", "PASSWORD");
        println!("{}", "-".repeat(72));
        for camera in &cfg.cameras {
            let protocol = camera.protocol.as_deref().unwrap_or("http");
            let address = format!("{}://{}:{}", protocol, camera.host, camera.port);
            let masked_pw = "*".repeat(camera.password.len().min(12));
            println!(
                "{:<16} {:<28} {:<16} {}",
                camera.name, address, camera.username, masked_pw
            );
        }
    }

    Ok(())
}

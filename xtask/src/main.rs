use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

const BINARY: &str = "tripwire";
const CONFIG_DIR: &str = "/etc/tripwire";
const EXAMPLE_CONFIG: &str = "tripwire.example.yaml";

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build and package tripwire")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the agent binary with the eBPF object embedded
    Build {
        /// Build in release mode
        #[arg(long)]
        release: bool,

        /// Target triple for cross-compilation (e.g. aarch64-unknown-linux-gnu)
        #[arg(long)]
        target: Option<String>,
    },

    /// Build a release tarball with install scripts and a systemd unit
    Package {
        /// Target triple
        #[arg(long)]
        target: Option<String>,

        /// Output directory
        #[arg(long, default_value = "dist")]
        output: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { release, target } => {
            build(release, target.as_deref())?;
        }
        Commands::Package { target, output } => {
            package(target.as_deref(), &output)?;
        }
    }

    Ok(())
}

fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .to_path_buf()
}

fn binary_path(root: &Path, release: bool, target: Option<&str>) -> PathBuf {
    let profile = if release { "release" } else { "debug" };
    match target {
        Some(t) => root.join("target").join(t).join(profile).join(BINARY),
        None => root.join("target").join(profile).join(BINARY),
    }
}

fn default_config_path() -> String {
    format!("{}/{}.yaml", CONFIG_DIR, BINARY)
}

fn build(release: bool, target: Option<&str>) -> Result<PathBuf> {
    let root = project_root();

    println!("Building {}...", BINARY);

    // Linux targets from a non-Linux host go through `cross`
    let is_cross_compile =
        target.is_some_and(|t| t.contains("linux")) && !cfg!(target_os = "linux");

    let build_cmd = if is_cross_compile {
        if which::which("cross").is_ok() {
            println!("   Using 'cross' for cross-compilation");
            "cross"
        } else {
            bail!(
                "Cross-compilation to Linux requires 'cross' tool.\n\
                 Install with: cargo install cross\n\
                 Also requires Docker to be running."
            );
        }
    } else {
        "cargo"
    };

    let mut cmd = Command::new(build_cmd);
    cmd.current_dir(&root);
    cmd.arg("build");

    if release {
        cmd.arg("--release");
    }

    if let Some(t) = target {
        cmd.arg("--target").arg(t);
        println!("   Target: {}", t);
    }

    cmd.arg("-p").arg(BINARY);

    let status = cmd.status().context("Failed to run cargo build")?;
    if !status.success() {
        bail!("Build failed");
    }

    let binary = binary_path(&root, release, target);
    println!("Build complete: {}", binary.display());
    Ok(binary)
}

fn systemd_unit(config_path: &str) -> String {
    format!(
        r#"[Unit]
Description=tripwire exec tracing agent
After=network.target

[Service]
Type=simple
ExecStart=/usr/local/bin/{binary} --config {config}
Restart=on-failure
RestartSec=5

CapabilityBoundingSet=CAP_BPF CAP_PERFMON CAP_SYS_RESOURCE CAP_SYS_ADMIN
AmbientCapabilities=CAP_BPF CAP_PERFMON CAP_SYS_RESOURCE CAP_SYS_ADMIN

[Install]
WantedBy=multi-user.target
"#,
        binary = BINARY,
        config = config_path
    )
}

fn install_script() -> String {
    format!(
        r#"#!/bin/bash
set -e

INSTALL_DIR="${{INSTALL_DIR:-/usr/local/bin}}"
CONFIG_DIR="${{CONFIG_DIR:-{config_dir}}}"

echo "Installing {binary}..."

sudo install -m 755 {binary} "$INSTALL_DIR/{binary}"

sudo mkdir -p "$CONFIG_DIR"
sudo cp {binary}.yaml.example "$CONFIG_DIR/{binary}.yaml.example"
if [ ! -f "$CONFIG_DIR/{binary}.yaml" ]; then
    sudo cp {binary}.yaml.example "$CONFIG_DIR/{binary}.yaml"
fi

echo "Installed to $INSTALL_DIR/{binary}"
echo ""
echo "To install as a systemd service, run:"
echo "  sudo ./install-service.sh"
"#,
        binary = BINARY,
        config_dir = CONFIG_DIR
    )
}

fn service_script() -> String {
    format!(
        r#"#!/bin/bash
set -e

sudo install -m 644 {binary}.service /etc/systemd/system/{binary}.service
sudo systemctl daemon-reload
sudo systemctl enable {binary}

echo "Systemd service installed"
echo "   Start with: sudo systemctl start {binary}"
"#,
        binary = BINARY
    )
}

fn package(target: Option<&str>, output_dir: &str) -> Result<()> {
    let binary = build(true, target)?;
    if !binary.exists() {
        bail!("Binary not found at: {}", binary.display());
    }

    let root = project_root();
    let output_path = root.join(output_dir);
    fs::create_dir_all(&output_path).context("Failed to create output directory")?;

    let arch = target.unwrap_or(std::env::consts::ARCH);
    let version = env!("CARGO_PKG_VERSION");
    let package_name = format!("{}-{}-{}", BINARY, version, arch);

    let package_dir = output_path.join(&package_name);
    fs::create_dir_all(&package_dir)?;

    fs::copy(&binary, package_dir.join(BINARY))?;
    fs::copy(
        root.join(EXAMPLE_CONFIG),
        package_dir.join(format!("{}.yaml.example", BINARY)),
    )
    .with_context(|| format!("Failed to copy {}", EXAMPLE_CONFIG))?;

    fs::write(package_dir.join("install.sh"), install_script())?;
    fs::write(package_dir.join("install-service.sh"), service_script())?;
    fs::write(
        package_dir.join(format!("{}.service", BINARY)),
        systemd_unit(&default_config_path()),
    )?;

    let tarball = output_path.join(format!("{}.tar.gz", package_name));
    let status = Command::new("tar")
        .current_dir(&output_path)
        .args(["-czf", &tarball.to_string_lossy(), &package_name])
        .status()
        .context("Failed to create tarball")?;

    if !status.success() {
        bail!("Failed to create tarball");
    }

    fs::remove_dir_all(&package_dir)?;

    println!("Package created: {}", tarball.display());
    Ok(())
}

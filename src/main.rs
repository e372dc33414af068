use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use hostgate::capability::builtin;
use hostgate::capability::registry::{CapabilityRegistry, RegistryBuilder};
use hostgate::config::Config;
use hostgate::manifest::ModuleManifest;
use hostgate::trust::{TrustEvaluator, TrustVerdict};

const DEFAULT_CONFIG_PATH: &str = "config/hostgate.toml";

fn print_help() {
    println!(
        "\
hostgate v{}

A host runtime that executes sandboxed guest modules behind a
trust-gated capability gateway.

USAGE:
    hostgate [OPTIONS] <COMMAND>

COMMANDS:
    catalog              Print the registered capability catalog
    config               Validate and print the effective configuration
    verify <MANIFEST>    Evaluate a module manifest's trust and show the
                         per-capability disposition its guest would receive

OPTIONS:
    -c, --config <PATH>  Path to TOML configuration file
                         [default: {DEFAULT_CONFIG_PATH}]
    -h, --help           Print this help message and exit
    -V, --version        Print version and exit

ENVIRONMENT VARIABLES:
    Variables are referenced in the config file via ${{VAR_NAME}} syntax.

    RUST_LOG             Log level filter for tracing
                         (e.g. debug, hostgate=debug,warn)

EXAMPLES:
    hostgate catalog                      # builtin catalog, default config
    hostgate -c /etc/hostgate.toml config
    hostgate verify modules/job.toml      # trust dry run for one module",
        env!("CARGO_PKG_VERSION"),
    );
}

fn main() -> Result<()> {
    let mut config_path = DEFAULT_CONFIG_PATH.to_string();
    let mut positionals: Vec<String> = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("hostgate v{}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--config" | "-c" => {
                config_path = args
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a path"))?;
            }
            other if other.starts_with('-') => {
                bail!("Unknown option: {other}\nTry 'hostgate --help'");
            }
            other => positionals.push(other.to_string()),
        }
    }

    // Initialize logging (RUST_LOG=debug for debug mode)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hostgate=info")),
        )
        .init();

    println!(
        r#"
   _               _              _
  | |__   ___  ___| |_ __ _  __ _| |_ ___
  | '_ \ / _ \/ __| __/ _` |/ _` | __/ _ \
  | | | | (_) \__ \ || (_| | (_| | ||  __/
  |_| |_|\___/|___/\__\__, |\__,_|\__\___|
                      |___/   v{}
"#,
        env!("CARGO_PKG_VERSION")
    );

    info!("Loading configuration from {config_path}");
    let config = Config::load_or_default(&config_path)?;

    info!(
        "Trust policy: default {}, {} signers, {} origins",
        config.trust.default_level,
        config.trust.signers.len(),
        config.trust.origins.len()
    );

    let mut builder = RegistryBuilder::new();
    builtin::register_defaults(&mut builder, &config)?;
    let registry = Arc::new(builder.build());
    info!("Capabilities: {} registered", registry.len());

    match positionals.first().map(String::as_str) {
        Some("catalog") => cmd_catalog(&registry),
        Some("config") => cmd_config(&config_path, &config),
        Some("verify") => {
            let manifest_path = positionals
                .get(1)
                .ok_or_else(|| anyhow!("verify requires a manifest path"))?;
            cmd_verify(&config, &registry, Path::new(manifest_path))
        }
        Some(other) => bail!("Unknown command: {other}\nTry 'hostgate --help'"),
        None => {
            print_help();
            Ok(())
        }
    }
}

/// `catalog` — every registered capability, with its gate parameters.
fn cmd_catalog(registry: &CapabilityRegistry) -> Result<()> {
    println!("Capability catalog ({} entries):\n", registry.len());
    for descriptor in registry.descriptors() {
        println!(
            "  {:<12} effect: {:<10} min trust: {:<10} degraded: {}",
            descriptor.name, descriptor.effect, descriptor.min_trust, descriptor.degraded
        );
        println!("               {}", descriptor.description);
    }
    Ok(())
}

/// `config` — the effective configuration after defaults and expansion.
fn cmd_config(config_path: &str, config: &Config) -> Result<()> {
    println!("Configuration from {config_path}:");
    println!("{config:#?}");
    Ok(())
}

/// `verify` — a trust dry run: evaluate the manifest, then show what the
/// gateway would answer for each capability. No real effect runs.
fn cmd_verify(config: &Config, registry: &CapabilityRegistry, manifest_path: &Path) -> Result<()> {
    let manifest = ModuleManifest::load(manifest_path)?;
    let bytes = manifest.read_module_bytes(manifest_path)?;
    let identity = manifest.identity(&bytes);

    let evaluator = TrustEvaluator::new(config.trust.clone());
    let verdict = evaluator.evaluate(&identity, &manifest.evidence());

    println!("module    {}", manifest.name);
    println!("model     {}", manifest.model);
    println!("sha256    {}", identity.hash_hex());
    println!("verdict   {}", serde_json::to_string_pretty(&verdict)?);
    println!("\nCapability dispositions at this verdict:");
    print_dispositions(registry, &verdict);
    Ok(())
}

fn print_dispositions(registry: &CapabilityRegistry, verdict: &TrustVerdict) {
    for descriptor in registry.descriptors() {
        let disposition = if verdict.meets(descriptor.min_trust) {
            "honored".to_string()
        } else {
            format!("degraded: {}", descriptor.degraded)
        };
        println!("  {:<12} {disposition}", descriptor.name);
    }
}

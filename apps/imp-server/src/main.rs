use anyhow::Result;
use clap::{Parser, Subcommand};
use impkit::{Imp, ImpOptions, ModelRegistry, SourceCatalog};
use impkit_bootstrap::paths::resolve_instance_dir;
use impkit_bootstrap::{CliArgs, ImpConfig, LoadOptions};
use mimalloc::MiMalloc;

use std::path::{Path, PathBuf};

mod app;
mod host;

use host::{AxumHost, RecordedDatabases};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const BLUEPRINTS_FOLDER: &str = "blueprints";
const MODELS_FOLDER: &str = "models";

/// Imp Server - composes an application from its folder tree and serves it
#[derive(Parser)]
#[command(name = "imp-server")]
#[command(about = "Imp Server - composes an application from its folder tree and serves it")]
#[command(version = "0.1.0")]
struct Cli {
    /// Application root (defaults to the bundled demo application)
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Path to configuration file, relative to the root
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port override for HTTP server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Print effective configuration (TOML) and exit
    #[arg(long)]
    print_config: bool,

    /// Accept `<VAR>` placeholders whose variable is not set
    #[arg(long)]
    ignore_missing_env: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compose the application and serve it
    Run,
    /// Compose the application, report what was mounted and exit
    Check,
}

fn default_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("src").join("app")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let root = cli.root.clone().unwrap_or_else(default_root);
    let config_path = root.join(
        cli.config
            .clone()
            .unwrap_or_else(|| PathBuf::from(impkit::engine::DEFAULT_CONFIG_FILE)),
    );
    let load = LoadOptions {
        ignore_missing_env_variables: cli.ignore_missing_env,
    };

    let args = CliArgs {
        port: cli.port,
        verbose: cli.verbose,
    };

    // TOML -> env (IMP__*) -> CLI overrides
    let mut config = ImpConfig::load(&config_path, load)?;
    config.apply_cli_overrides(&args);

    let instance_dir = resolve_instance_dir(
        config.setting_str("INSTANCE_PATH").map(str::to_string),
        &root,
        true,
    )?;
    impkit_bootstrap::init_logging(&config.logging, &instance_dir);

    tracing::info!(root = %root.display(), "Imp Server starting");

    if cli.print_config {
        println!("{}", config.to_toml()?);
        return Ok(());
    }

    let options = ImpOptions {
        config_file: Some(config_path),
        load,
        instance_path: None,
    };

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_server(&root, options, &config).await,
        Commands::Check => check_app(&root, options),
    }
}

/// One composition pass over the app tree.
fn compose(root: &Path, options: ImpOptions) -> Result<(AxumHost, RecordedDatabases, ModelRegistry)> {
    let mut host = AxumHost::new();
    let mut imp = Imp::new(root, SourceCatalog::discover());

    imp.init(&mut host, options)?;
    imp.import_app_resources(&mut host, None, &[], None)?;
    imp.import_blueprints(&mut host, BLUEPRINTS_FOLDER)?;
    if root.join(MODELS_FOLDER).is_dir() {
        let count = imp.import_models(MODELS_FOLDER)?;
        tracing::info!(count, "Models imported");
    }

    let mut databases = RecordedDatabases::default();
    imp.init_database(&mut databases)?;
    Ok((host, databases, imp.into_assembly().models))
}

async fn run_server(root: &Path, options: ImpOptions, config: &ImpConfig) -> Result<()> {
    let (host, databases, models) = compose(root, options)?;
    let models = impkit::model::install_global(models)?;
    tracing::info!(models = ?models.names(), "Model registry installed");
    let router = host.into_router(&databases);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("HTTP server bound on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = impkit_bootstrap::wait_for_shutdown().await {
                tracing::error!(error = %e, "Signal handling failed");
            }
            tracing::info!("HTTP server shutting down gracefully");
        })
        .await
        .map_err(|e| anyhow::anyhow!(e))
}

fn check_app(root: &Path, options: ImpOptions) -> Result<()> {
    tracing::info!("Checking application…");
    let (host, databases, models) = compose(root, options)?;

    println!("Application is valid");
    println!("Models: {}", models.names().join(", "));
    if let Some(templates) = host.template_folder() {
        println!("App templates: {}", templates.display());
    }
    for mount in host.mounts() {
        match &mount.parent {
            Some(parent) => println!("  {} -> {} (under {})", mount.name, mount.mount_path, parent),
            None => println!("  {} -> {}", mount.name, mount.mount_path),
        }
        if let Some(templates) = &mount.template_folder {
            println!("    templates: {}", templates.display());
        }
    }
    println!("{}", serde_json::to_string_pretty(&databases.redacted())?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_app_composes() {
        let tmp = tempfile::tempdir().unwrap();
        let options = ImpOptions {
            instance_path: Some(tmp.path().to_string_lossy().to_string()),
            ..ImpOptions::default()
        };

        let (host, databases, models) = compose(&default_root(), options).unwrap();

        let mounted: Vec<_> = host
            .mounts()
            .iter()
            .map(|m| (m.name.as_str(), m.mount_path.as_str()))
            .collect();
        assert_eq!(mounted, vec![("account", "/www/account"), ("www", "/www")]);

        assert!(databases
            .main_uri
            .as_deref()
            .is_some_and(|uri| uri.ends_with("/imp.sqlite3")));
        assert_eq!(databases.binds.keys().collect::<Vec<_>>(), vec!["www"]);
        assert_eq!(models.names(), vec!["Customer", "Order"]);
    }

    #[tokio::test]
    async fn bundled_app_serves_app_and_unit_routes() {
        use axum::body::Body;
        use axum::http::{Request, StatusCode};
        use tower::ServiceExt;

        let tmp = tempfile::tempdir().unwrap();
        let options = ImpOptions {
            instance_path: Some(tmp.path().to_string_lossy().to_string()),
            ..ImpOptions::default()
        };
        let (host, databases, _) = compose(&default_root(), options).unwrap();
        let router = host.into_router(&databases);

        for uri in ["/", "/www/hello", "/www/models", "/www/account/profile", host::STATUS_PATH] {
            let response = router
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
        }
    }
}
